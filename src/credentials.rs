use std::sync::Arc;

use crate::error::AppError;
use crate::models::Credentials;
use crate::storage::{KeyValueStore, CREDENTIALS_KEY};

pub const REGISTERED_NOTICE: &str = "Registration successful! You can now log in.";

/// Holds at most one registered user. Passwords are stored as typed.
pub struct CredentialStore {
    store: Arc<dyn KeyValueStore>,
}

impl CredentialStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Overwrites any previously registered user.
    pub fn register(&self, name: &str, password: &str) -> Result<&'static str, AppError> {
        if name.is_empty() || password.is_empty() {
            return Err(AppError::MissingFields);
        }

        let record = Credentials {
            name: name.to_string(),
            password: password.to_string(),
        };
        let json = serde_json::to_string(&record).map_err(|e| AppError::Internal(e.to_string()))?;
        self.store.set(CREDENTIALS_KEY, &json)?;
        log::info!("Registered user {}", name);

        Ok(REGISTERED_NOTICE)
    }

    pub fn login(&self, name: &str, password: &str) -> Result<(), AppError> {
        match self.stored()? {
            Some(stored) if stored.name == name && stored.password == password => Ok(()),
            _ => {
                log::warn!("Rejected login attempt for {:?}", name);
                Err(AppError::InvalidCredentials)
            }
        }
    }

    pub fn stored(&self) -> Result<Option<Credentials>, AppError> {
        let raw = match self.store.get(CREDENTIALS_KEY)? {
            Some(raw) => raw,
            None => return Ok(None),
        };

        match serde_json::from_str(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(err) => {
                log::warn!("Ignoring unreadable credential record: {}", err);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn credentials() -> (Arc<MemoryStore>, CredentialStore) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), CredentialStore::new(store))
    }

    #[test]
    fn empty_fields_do_not_overwrite() {
        let (_, creds) = credentials();
        creds.register("alice", "pw").unwrap();

        for (name, password) in [("", "x"), ("bob", ""), ("", "")] {
            let err = creds.register(name, password).unwrap_err();
            assert!(matches!(err, AppError::MissingFields));
        }

        let stored = creds.stored().unwrap().unwrap();
        assert_eq!(stored.name, "alice");
        assert_eq!(stored.password, "pw");
    }

    #[test]
    fn login_requires_exact_match() {
        let (_, creds) = credentials();
        creds.register("alice", "pw").unwrap();

        assert!(creds.login("alice", "pw").is_ok());
        assert!(matches!(
            creds.login("alice", "PW"),
            Err(AppError::InvalidCredentials)
        ));
        assert!(matches!(
            creds.login("Alice", "pw"),
            Err(AppError::InvalidCredentials)
        ));
    }

    #[test]
    fn login_without_registration_fails() {
        let (_, creds) = credentials();
        assert!(matches!(
            creds.login("alice", "pw"),
            Err(AppError::InvalidCredentials)
        ));
    }

    #[test]
    fn second_registration_replaces_first() {
        let (_, creds) = credentials();
        creds.register("alice", "pw").unwrap();
        creds.register("bob", "hunter2").unwrap();

        assert!(creds.login("alice", "pw").is_err());
        assert!(creds.login("bob", "hunter2").is_ok());
    }

    #[test]
    fn corrupt_record_counts_as_unregistered() {
        let (store, creds) = credentials();
        store.set(CREDENTIALS_KEY, "{not json").unwrap();
        assert_eq!(creds.stored().unwrap(), None);
        assert!(creds.login("alice", "pw").is_err());
    }
}

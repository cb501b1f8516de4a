use std::sync::Arc;

use serde::Serialize;

use crate::models::Session;
use crate::storage::{KeyValueStore, StorageError, SESSION_KEY};

/// What the front page shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "view", rename_all = "camelCase")]
pub enum GateView {
    Application { user: String },
    Login,
    Register,
    Prompt { message: String },
}

/// Decides between the credential forms and the application, backed by the
/// persisted `loggedInUser` key.
pub struct SessionGate {
    store: Arc<dyn KeyValueStore>,
    session: Option<Session>,
    show_login: bool,
    show_register: bool,
}

impl SessionGate {
    pub fn load(store: Arc<dyn KeyValueStore>) -> Result<Self, StorageError> {
        let session = store
            .get(SESSION_KEY)?
            .map(|username| Session { username });
        if let Some(session) = &session {
            log::info!("Restored session for {}", session.username);
        }

        Ok(Self {
            store,
            session,
            show_login: false,
            show_register: false,
        })
    }

    pub fn current_user(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.username.as_str())
    }

    pub fn login(&mut self, username: &str) -> Result<(), StorageError> {
        self.store.set(SESSION_KEY, username)?;
        self.session = Some(Session {
            username: username.to_string(),
        });
        self.show_login = false;
        self.show_register = false;
        Ok(())
    }

    pub fn logout(&mut self) -> Result<(), StorageError> {
        self.store.remove(SESSION_KEY)?;
        self.session = None;
        Ok(())
    }

    pub fn show_login(&mut self) {
        self.show_register = false;
        self.show_login = true;
    }

    pub fn show_register(&mut self) {
        self.show_login = false;
        self.show_register = true;
    }

    pub fn view(&self) -> GateView {
        match &self.session {
            Some(session) => GateView::Application {
                user: session.username.clone(),
            },
            None if self.show_login => GateView::Login,
            None if self.show_register => GateView::Register,
            None => GateView::Prompt {
                message: "Please log in or register to use the DApp.".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn store() -> Arc<dyn KeyValueStore> {
        Arc::new(MemoryStore::new())
    }

    #[test]
    fn fresh_gate_prompts() {
        let gate = SessionGate::load(store()).unwrap();
        assert!(matches!(gate.view(), GateView::Prompt { .. }));
        assert_eq!(gate.current_user(), None);
    }

    #[test]
    fn login_survives_reload() {
        let store = store();
        let mut gate = SessionGate::load(store.clone()).unwrap();
        gate.show_login();
        gate.login("alice").unwrap();

        let reloaded = SessionGate::load(store).unwrap();
        assert_eq!(reloaded.current_user(), Some("alice"));
        assert_eq!(
            reloaded.view(),
            GateView::Application {
                user: "alice".to_string()
            }
        );
    }

    #[test]
    fn logout_shows_credential_ui_after_reload() {
        let store = store();
        let mut gate = SessionGate::load(store.clone()).unwrap();
        gate.login("alice").unwrap();
        gate.logout().unwrap();

        let reloaded = SessionGate::load(store.clone()).unwrap();
        assert!(matches!(reloaded.view(), GateView::Prompt { .. }));
        assert_eq!(store.get(SESSION_KEY).unwrap(), None);
    }

    #[test]
    fn forms_are_mutually_exclusive() {
        let mut gate = SessionGate::load(store()).unwrap();
        gate.show_register();
        assert_eq!(gate.view(), GateView::Register);
        gate.show_login();
        assert_eq!(gate.view(), GateView::Login);
    }

    #[test]
    fn login_clears_pending_forms() {
        let mut gate = SessionGate::load(store()).unwrap();
        gate.show_register();
        gate.login("bob").unwrap();
        gate.logout().unwrap();
        assert!(matches!(gate.view(), GateView::Prompt { .. }));
    }
}

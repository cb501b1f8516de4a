use serde::{Deserialize, Serialize};

/// A candidate as returned by the contract's `getCandidates()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: u64,
    pub name: String,
    pub image: String,
    pub age: u64,
    pub description: String,
    pub vote_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Winner {
    pub name: String,
    pub vote_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionStatus {
    pub ended: bool,
    pub winner: Winner,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub username: String,
}

/// The single registered user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub name: String,
    pub password: String,
}

/// Candidate fields as typed into the admin form. `age` stays textual until submit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub age: String,
    #[serde(default)]
    pub description: String,
}

/// A validated candidate form, ready to be sent to the contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateDraft {
    pub name: String,
    pub image: String,
    pub age: u64,
    pub description: String,
}

impl CandidateForm {
    pub fn from_candidate(candidate: &Candidate) -> Self {
        Self {
            name: candidate.name.clone(),
            image: candidate.image.clone(),
            age: candidate.age.to_string(),
            description: candidate.description.clone(),
        }
    }

    /// Checks that every field is filled in and that `age` is a number.
    pub fn validate(&self) -> Result<CandidateDraft, String> {
        let fields = [
            ("name", &self.name),
            ("image", &self.image),
            ("age", &self.age),
            ("description", &self.description),
        ];
        if let Some((field, _)) = fields.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(format!("Candidate {} is required", field));
        }

        let age = self
            .age
            .trim()
            .parse::<u64>()
            .map_err(|_| format!("Candidate age must be a whole number, got {:?}", self.age))?;

        Ok(CandidateDraft {
            name: self.name.clone(),
            image: self.image.clone(),
            age,
            description: self.description.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> CandidateForm {
        CandidateForm {
            name: "Alice".to_string(),
            image: "https://x/img.png".to_string(),
            age: "40".to_string(),
            description: "...".to_string(),
        }
    }

    #[test]
    fn complete_form_validates() {
        let draft = alice().validate().unwrap();
        assert_eq!(draft.age, 40);
        assert_eq!(draft.name, "Alice");
    }

    #[test]
    fn empty_field_is_rejected() {
        let mut form = alice();
        form.image = "  ".to_string();
        let err = form.validate().unwrap_err();
        assert!(err.contains("image"));
    }

    #[test]
    fn non_numeric_age_is_rejected() {
        let mut form = alice();
        form.age = "forty".to_string();
        assert!(form.validate().is_err());
    }

    #[test]
    fn candidate_serializes_vote_count_in_camel_case() {
        let candidate = Candidate {
            id: 1,
            name: "Alice".to_string(),
            image: String::new(),
            age: 40,
            description: String::new(),
            vote_count: 3,
        };
        let json = serde_json::to_value(&candidate).unwrap();
        assert_eq!(json["voteCount"], 3);
    }
}

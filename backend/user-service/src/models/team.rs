use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: String,
    pub name: String,
    /// User ids, creator first
    pub members: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Team {
    pub fn has_member(&self, user_id: &str) -> bool {
        self.members.iter().any(|m| m == user_id)
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTeamRequest {
    #[validate(length(min = 2, max = 100))]
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_team_name_length() {
        assert!(CreateTeamRequest { name: "A".into() }.validate().is_err());
        assert!(CreateTeamRequest { name: "x".repeat(101) }.validate().is_err());
        assert!(CreateTeamRequest { name: "Core".into() }.validate().is_ok());
    }

    #[test]
    fn test_membership() {
        let team = Team {
            id: "t1".into(),
            name: "Core".into(),
            members: vec!["u1".into(), "u2".into()],
            created_at: Utc::now(),
        };
        assert!(team.has_member("u2"));
        assert!(!team.has_member("u3"));
    }
}

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Faculty,
    Admin,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Student => write!(f, "student"),
            Role::Faculty => write!(f, "faculty"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

/// Collection a user's profile record lives in.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssociatedCollection {
    Students,
    Faculties,
    Admins,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_use_stored_lowercase_names() {
        assert_eq!(serde_json::to_string(&Role::Student).unwrap(), "\"student\"");
        let role: Role = serde_json::from_str("\"faculty\"").unwrap();
        assert_eq!(role, Role::Faculty);
        assert_eq!(Role::Admin.to_string(), "admin");

        let collection: AssociatedCollection = serde_json::from_str("\"students\"").unwrap();
        assert_eq!(collection, AssociatedCollection::Students);
    }
}

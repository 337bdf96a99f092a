use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A role identifier carried in the access token's `roles` claim.
///
/// The five dashboard roles are named variants. Anything else the backend
/// issues is kept verbatim in [`Role::Other`] so that a newer backend never
/// makes a token undecodable.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    SuperAdmin,
    Admin,
    Manager,
    Recruiter,
    Interviewer,
    Other(String),
}

impl Role {
    /// Wire identifier, e.g. `SUPER_ADMIN`.
    pub fn as_str(&self) -> &str {
        match self {
            Role::SuperAdmin => "SUPER_ADMIN",
            Role::Admin => "ADMIN",
            Role::Manager => "MANAGER",
            Role::Recruiter => "RECRUITER",
            Role::Interviewer => "INTERVIEWER",
            Role::Other(name) => name,
        }
    }

    /// Rank used to pick a landing dashboard; lower wins.
    pub(crate) fn priority(&self) -> u8 {
        match self {
            Role::SuperAdmin => 0,
            Role::Admin => 1,
            Role::Manager => 2,
            Role::Recruiter => 3,
            Role::Interviewer => 4,
            Role::Other(_) => u8::MAX,
        }
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        // Some tenants were provisioned with a `ROLE_` prefix.
        let trimmed = value.trim();
        let name = trimmed.strip_prefix("ROLE_").unwrap_or(trimmed);
        match name.to_ascii_uppercase().as_str() {
            "SUPER_ADMIN" => Role::SuperAdmin,
            "ADMIN" => Role::Admin,
            "MANAGER" => Role::Manager,
            "RECRUITER" => Role::Recruiter,
            "INTERVIEWER" => Role::Interviewer,
            _ => Role::Other(value),
        }
    }
}

impl From<&str> for Role {
    fn from(value: &str) -> Self {
        Role::from(value.to_owned())
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        match role {
            Role::Other(name) => name,
            known => known.as_str().to_owned(),
        }
    }
}

impl FromStr for Role {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Role::from(s))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

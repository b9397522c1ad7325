use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha256};
use uuid::Uuid;

const TOKEN_LENGTH: usize = 40;

/// Model permissions checked by the API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    ViewFlow,
    AddFlow,
    ViewFlowResponse,
    AddFlowResponse,
}

impl Permission {
    pub const ALL: [Permission; 4] = [
        Self::ViewFlow,
        Self::AddFlow,
        Self::ViewFlowResponse,
        Self::AddFlowResponse,
    ];

    pub fn codename(self) -> &'static str {
        match self {
            Self::ViewFlow => "view_flow",
            Self::AddFlow => "add_flow",
            Self::ViewFlowResponse => "view_flowresponse",
            Self::AddFlowResponse => "add_flowresponse",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.codename())
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.codename() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|p| p.codename()).collect();
                format!("unknown permission '{s}' (expected one of: {})", known.join(", "))
            })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: Option<String>,
    pub is_active: bool,
    pub is_superuser: bool,
    pub permissions: HashSet<Permission>,
}

impl User {
    /// Inactive users hold no permissions; superusers hold all of them
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.is_active && (self.is_superuser || self.permissions.contains(&permission))
    }
}

/// Generates a 40 character hex API token key
pub fn generate_token_key(secret_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret_key.as_bytes());
    hasher.update(Uuid::new_v4().as_bytes());
    hasher.update(Uuid::new_v4().as_bytes());
    let digest: String = format!("{:x}", hasher.finalize());
    digest[..TOKEN_LENGTH].to_string()
}

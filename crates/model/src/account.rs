use std::{fmt, str::FromStr};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use utility::id::{HasId, Id};

/// An account known to the identity provider in front of this service. Only its
/// id is ever stored here.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Account;

impl HasId for Account {
    type IdType = String;
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Driver,
    Owner,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Driver => "driver",
            Role::Owner => "owner",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown role `{}`", self.0)
    }
}

impl std::error::Error for UnknownRole {}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "driver" | "user" => Ok(Role::Driver),
            "owner" => Ok(Role::Owner),
            "admin" => Ok(Role::Admin),
            other => Err(UnknownRole(other.to_owned())),
        }
    }
}

/// The identity a write is performed on behalf of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub account: Id<Account>,
    pub role: Role,
}

impl Caller {
    pub fn new(account: Id<Account>, role: Role) -> Self {
        Self { account, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Only owners and admins list parking spots.
    pub fn may_create(&self) -> bool {
        matches!(self.role, Role::Owner | Role::Admin)
    }

    /// Writes to an existing spot are reserved to its owner and admins.
    pub fn may_edit(&self, owner: &Id<Account>) -> bool {
        self.is_admin() || &self.account == owner
    }
}

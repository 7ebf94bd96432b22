//! Identity, token scope and permission types shared by the access pipeline.
//!
//! Scopes and permission codes travel as strings on the wire and in the
//! database. They are parsed once at that boundary into closed enums so a typo
//! can never create a category that silently matches nothing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use tracing::debug;
use utoipa::ToSchema;
use uuid::Uuid;

/// Operation a token is allowed to authorize.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenScope {
    Authentication,
    Activation,
}

impl TokenScope {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::Activation => "activation",
        }
    }
}

impl fmt::Display for TokenScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown token scope: {0}")]
pub struct UnknownScope(pub String);

impl FromStr for TokenScope {
    type Err = UnknownScope;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "authentication" => Ok(Self::Authentication),
            "activation" => Ok(Self::Activation),
            other => Err(UnknownScope(other.to_string())),
        }
    }
}

/// A single allowed action on one resource class, written `<resource>:<verb>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Permission {
    MoviesRead,
    MoviesWrite,
}

impl Permission {
    pub const ALL: [Self; 2] = [Self::MoviesRead, Self::MoviesWrite];

    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::MoviesRead => "movies:read",
            Self::MoviesWrite => "movies:write",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown permission code: {0}")]
pub struct UnknownPermission(pub String);

impl FromStr for Permission {
    type Err = UnknownPermission;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|permission| permission.code() == code)
            .ok_or_else(|| UnknownPermission(code.to_string()))
    }
}

/// Permissions granted to one user. Membership is exact; there is no wildcard
/// or hierarchy between codes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PermissionSet(BTreeSet<Permission>);

impl PermissionSet {
    /// Build a set from raw codes, dropping codes this build does not know.
    pub fn from_codes<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = BTreeSet::new();
        for code in codes {
            match code.as_ref().parse::<Permission>() {
                Ok(permission) => {
                    set.insert(permission);
                }
                Err(err) => debug!("Ignoring stored permission: {err}"),
            }
        }
        Self(set)
    }

    #[must_use]
    pub fn contains(&self, permission: Permission) -> bool {
        self.0.contains(&permission)
    }

    pub fn insert(&mut self, permission: Permission) {
        self.0.insert(permission);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Codes in a stable order, for responses.
    #[must_use]
    pub fn codes(&self) -> Vec<String> {
        self.0.iter().map(|p| p.code().to_string()).collect()
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<T: IntoIterator<Item = Permission>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Account resolved from a token. `version` is the optimistic-concurrency
/// counter owned by the user store; the pipeline only carries it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub activated: bool,
    pub version: i32,
}

/// Who the current request acts as. Inserted into request extensions by the
/// authenticator and read by guards and handlers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Identity {
    Anonymous,
    Authenticated(User),
}

impl Identity {
    #[must_use]
    pub const fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }

    #[must_use]
    pub const fn user(&self) -> Option<&User> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated(user) => Some(user),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_parses_its_own_name() {
        for scope in [TokenScope::Authentication, TokenScope::Activation] {
            assert_eq!(scope.as_str().parse::<TokenScope>(), Ok(scope));
        }
        assert_eq!(
            "Authentication".parse::<TokenScope>(),
            Err(UnknownScope("Authentication".to_string()))
        );
    }

    #[test]
    fn permission_codes_match_exactly() {
        assert_eq!("movies:read".parse(), Ok(Permission::MoviesRead));
        assert_eq!("movies:write".parse(), Ok(Permission::MoviesWrite));
        assert!("movies:*".parse::<Permission>().is_err());
        assert!("movies".parse::<Permission>().is_err());
        assert!("MOVIES:READ".parse::<Permission>().is_err());
    }

    #[test]
    fn permission_set_drops_unknown_codes() {
        let set = PermissionSet::from_codes(["movies:read", "movies:delete", "admin"]);
        assert!(set.contains(Permission::MoviesRead));
        assert!(!set.contains(Permission::MoviesWrite));
        assert_eq!(set.codes(), vec!["movies:read".to_string()]);
    }

    #[test]
    fn anonymous_has_no_user() {
        assert!(Identity::Anonymous.is_anonymous());
        assert!(Identity::Anonymous.user().is_none());

        let user = User {
            id: Uuid::new_v4(),
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            activated: false,
            version: 1,
        };
        let identity = Identity::Authenticated(user.clone());
        assert!(!identity.is_anonymous());
        assert_eq!(identity.user(), Some(&user));
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};

/// Role a user holds on a dataset.
///
/// Ranked roles form a strict hierarchy
/// `owner > admin > maintainer > contributor > preview > none`.
/// `Blocked` sits outside the hierarchy and satisfies no requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Blocked,
    None,
    Preview,
    Contributor,
    Maintainer,
    Admin,
    Owner,
}

impl Role {
    /// Position in the hierarchy. `None` for `Blocked`, which has no rank.
    #[must_use]
    pub const fn rank(self) -> Option<u8> {
        match self {
            Role::Blocked => None,
            Role::None => Some(0),
            Role::Preview => Some(1),
            Role::Contributor => Some(2),
            Role::Maintainer => Some(3),
            Role::Admin => Some(4),
            Role::Owner => Some(5),
        }
    }

    /// Returns true if this role meets the required role.
    #[must_use]
    pub const fn satisfies(self, required: Role) -> bool {
        match (self.rank(), required.rank()) {
            (Some(have), Some(need)) => have >= need,
            _ => false,
        }
    }

    /// The higher-ranked of two roles. Blocked wins over everything.
    #[must_use]
    pub fn max(self, other: Role) -> Role {
        match (self.rank(), other.rank()) {
            (None, _) => self,
            (_, None) => other,
            (Some(a), Some(b)) if a >= b => self,
            _ => other,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Blocked => "blocked",
            Role::None => "none",
            Role::Preview => "preview",
            Role::Contributor => "contributor",
            Role::Maintainer => "maintainer",
            Role::Admin => "admin",
            Role::Owner => "owner",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "blocked" => Some(Role::Blocked),
            "none" => Some(Role::None),
            "preview" => Some(Role::Preview),
            "contributor" => Some(Role::Contributor),
            "maintainer" => Some(Role::Maintainer),
            "admin" => Some(Role::Admin),
            "owner" => Some(Role::Owner),
            _ => None,
        }
    }

    pub const ALL: [Role; 7] = [
        Role::Blocked,
        Role::None,
        Role::Preview,
        Role::Contributor,
        Role::Maintainer,
        Role::Admin,
        Role::Owner,
    ];
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_satisfies_hierarchy() {
        assert!(Role::Owner.satisfies(Role::Admin));
        assert!(Role::Maintainer.satisfies(Role::Contributor));
        assert!(Role::Contributor.satisfies(Role::Contributor));
        assert!(!Role::Preview.satisfies(Role::Contributor));
        assert!(Role::None.satisfies(Role::None));
    }

    #[test]
    fn test_blocked_satisfies_nothing() {
        for required in Role::ALL {
            assert!(!Role::Blocked.satisfies(required));
        }
    }

    #[test]
    fn test_max_prefers_blocked() {
        assert_eq!(Role::Blocked.max(Role::Owner), Role::Blocked);
        assert_eq!(Role::Preview.max(Role::Blocked), Role::Blocked);
        assert_eq!(Role::Preview.max(Role::Contributor), Role::Contributor);
    }

    #[test]
    fn test_parse_round_trips_names() {
        for role in Role::ALL {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("superuser"), None);
    }
}

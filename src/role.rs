use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Privilege tier of a group member.
///
/// Variants are declared in ascending order, so the derived `Ord` is the
/// privilege order `Member < Moderator < Manager`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Role {
    /// Regular member.
    Member,
    /// May manage tracks, subgroups, events and announcements.
    Moderator,
    /// Full control over the group, its token and its members.
    Manager,
}

impl Role {
    /// Returns whether the role may create or change group content.
    pub fn can_moderate(self) -> bool {
        matches!(self, Self::Moderator | Self::Manager)
    }

    /// Returns whether the role is `Manager`.
    pub fn is_manager(self) -> bool {
        self == Self::Manager
    }

    /// Returns whether the role meets `required`.
    pub fn satisfies(self, required: Role) -> bool {
        self >= required
    }

    /// Returns the lowercase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Moderator => "moderator",
            Self::Manager => "manager",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "member" => Ok(Self::Member),
            "moderator" => Ok(Self::Moderator),
            "manager" => Ok(Self::Manager),
            other => Err(Error::Invalid(format!(
                "unknown role `{other}`; expected manager, moderator or member"
            ))),
        }
    }
}

impl TryFrom<&str> for Role {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        value.parse()
    }
}

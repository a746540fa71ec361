use crate::error::{Error, Result};
use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;

const MAX_NAME_LEN: usize = 128;

/// Trims a display name and checks it is non-empty and bounded.
pub(crate) fn validate_name(value: &str, kind: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::Invalid(format!("{kind} must not be empty")));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(Error::Invalid(format!(
            "{kind} length must be <= {MAX_NAME_LEN}"
        )));
    }
    Ok(trimmed.to_string())
}

/// Drops repeated ids, keeping the first occurrence of each.
pub(crate) fn unique<T: Copy + Eq + Hash>(ids: &[T]) -> Vec<T> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

macro_rules! define_id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[cfg_attr(feature = "serde", serde(transparent))]
        pub struct $name(u64);

        impl $name {
            /// Wraps a raw store key.
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            /// Returns the raw store key.
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

define_id_type!(
    /// User identifier.
    UserId
);
define_id_type!(
    /// Group identifier.
    GroupId
);
define_id_type!(
    /// Subgroup identifier.
    SubgroupId
);
define_id_type!(
    /// Track identifier.
    TrackId
);
define_id_type!(
    /// Notesheet identifier.
    NotesheetId
);
define_id_type!(
    /// Event identifier.
    EventId
);
define_id_type!(
    /// Announcement identifier.
    AnnouncementId
);

/// Opaque join secret of a group.
///
/// Only grants the right to join; it never identifies anyone. `Debug` output
/// is redacted so tokens do not leak into logs.
#[derive(Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct AccessToken(String);

impl AccessToken {
    /// Creates a token from a trusted string.
    pub fn from_string(value: String) -> Self {
        Self(value)
    }

    /// Returns the underlying string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

impl AsRef<str> for AccessToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for AccessToken {
    fn from(value: String) -> Self {
        Self::from_string(value)
    }
}

impl From<&str> for AccessToken {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Identifier assigned by the external calendar provider.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ExternalEventId(String);

impl ExternalEventId {
    /// Creates an id from the provider's string.
    pub fn from_string(value: String) -> Self {
        Self(value)
    }

    /// Returns the underlying string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExternalEventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ExternalEventId {
    fn from(value: String) -> Self {
        Self::from_string(value)
    }
}

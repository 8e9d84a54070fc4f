//! The per-entity version counter.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Monotonic version counter for optimistic locking.
///
/// Versions start at 1 on create and advance by exactly 1 on each accepted
/// write. A writer supplies the version it last saw as its expected version;
/// the store rejects the write if that no longer matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    /// The version assigned to a freshly created entity.
    pub const FIRST: Version = Version(1);

    /// Creates a version from a raw counter value.
    pub const fn new(value: u64) -> Self {
        Version(value)
    }

    /// Returns the raw counter value.
    pub const fn get(&self) -> u64 {
        self.0
    }

    /// Returns the version that follows an accepted write.
    pub const fn next(&self) -> Version {
        Version(self.0 + 1)
    }
}

impl Default for Version {
    fn default() -> Self {
        Version::FIRST
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_is_one() {
        assert_eq!(Version::FIRST.get(), 1);
        assert_eq!(Version::default(), Version::FIRST);
    }

    #[test]
    fn next_advances_by_one() {
        let v = Version::FIRST;
        assert_eq!(v.next().get(), 2);
        assert_eq!(v.next().next().get(), 3);
    }

    #[test]
    fn display_format() {
        assert_eq!(Version::new(7).to_string(), "v7");
    }
}

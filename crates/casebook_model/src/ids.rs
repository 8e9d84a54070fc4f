//! Identifier newtypes.
//!
//! Every entity that can be created offline gets a globally unique identifier
//! minted by the creating device. Auto-increment integers cannot work here:
//! two offline devices would hand out the same number.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Mints a fresh random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an identifier minted elsewhere (e.g. by another device).
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner UUID.
            pub const fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

uuid_id!(
    /// Identity of a `Book` (top-level container).
    BookId
);

uuid_id!(
    /// Canonical identity of a `Record` (person/case).
    ///
    /// All devices referring to the same person must eventually agree on one
    /// `RecordId`; the server-side identity resolver owns that convergence.
    RecordId
);

uuid_id!(
    /// Identity of a single scheduled `Event`.
    EventId
);

uuid_id!(
    /// Identity of a client device, issued at registration.
    DeviceId
);

// File: src/resonance/core/ids.rs

//! Identifier types for the resonance engine.
//!
//! Strongly-typed ID newtypes with helpers for generation, parsing, and formatting.
//!
//! - `SessionId` is always random (`UUIDv4`): it must never collide across
//!   concurrent sessions within the process lifetime.
//! - `RecordId` is time-ordered with the `uuid_v7` feature, random otherwise.
//! - `UserId` is a caller-provided string (e-mail-like handles are common), validated
//!   but otherwise opaque.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generate an ID intended to have good insert locality.
///
/// With feature `uuid_v7` enabled, this uses `Uuid::now_v7()`.
/// Otherwise it falls back to `Uuid::new_v4()`.
#[inline]
#[must_use]
fn uuid_time_ordered() -> Uuid {
    #[cfg(feature = "uuid_v7")]
    {
        Uuid::now_v7()
    }
    #[cfg(not(feature = "uuid_v7"))]
    {
        Uuid::new_v4()
    }
}

/// Generate a random UUID (v4).
#[inline]
#[must_use]
fn uuid_random() -> Uuid {
    Uuid::new_v4()
}

/// Declare a UUID newtype with a consistent API.
macro_rules! define_uuid_id {
    (
        $(#[$meta:meta])*
        $name:ident,
        generator = $generator:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[repr(transparent)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl Default for $name {
            #[inline]
            fn default() -> Self {
                Self::new()
            }
        }

        impl $name {
            /// Create a new identifier.
            #[inline]
            #[must_use]
            pub fn new() -> Self {
                Self($generator())
            }

            /// Wrap an existing UUID.
            #[inline]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Borrow the underlying UUID.
            #[inline]
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            #[inline]
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            #[inline]
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

define_uuid_id!(
    /// Identifier for a transactional session.
    ///
    /// Always `UUIDv4` so identifiers are unguessable and collision-resistant.
    SessionId,
    generator = uuid_random
);

define_uuid_id!(
    /// Identifier for a stored memory record.
    RecordId,
    generator = uuid_time_ordered
);

/// Errors returned when parsing/validating a [`UserId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserIdError {
    /// Empty (or whitespace-only) identifier.
    Empty,
    /// Exceeds the maximum accepted length.
    TooLong {
        /// Maximum allowed length.
        max: usize,
        /// Actual length received.
        got: usize,
    },
    /// Contains a control character.
    ControlChar {
        /// The index where it was found.
        index: usize,
    },
}

impl fmt::Display for UserIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "user id must not be empty"),
            Self::TooLong { max, got } => write!(f, "user id too long: got {got}, max {max}"),
            Self::ControlChar { index } => {
                write!(f, "user id contains a control character at index {index}")
            }
        }
    }
}

impl std::error::Error for UserIdError {}

/// Identifier of the user owning a query.
///
/// Examples: `seema@threshold`, `42`, `team/alice`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Hard ceiling to prevent pathological payloads.
    pub const MAX_LEN: usize = 256;

    /// Build a validated `UserId`.
    ///
    /// Rules:
    /// - Non-empty after trimming.
    /// - At most [`Self::MAX_LEN`] bytes.
    /// - No control characters.
    ///
    /// # Errors
    /// Returns `UserIdError` if the input is empty, too long, or contains control characters.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, UserIdError> {
        let s = raw.as_ref().trim();

        if s.is_empty() {
            return Err(UserIdError::Empty);
        }
        if s.len() > Self::MAX_LEN {
            return Err(UserIdError::TooLong {
                max: Self::MAX_LEN,
                got: s.len(),
            });
        }
        if let Some((index, _)) = s.char_indices().find(|(_, ch)| ch.is_control()) {
            return Err(UserIdError::ControlChar { index });
        }

        Ok(Self(s.to_owned()))
    }

    /// Borrow as `&str`.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserId {
    type Err = UserIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl From<UserId> for String {
    fn from(value: UserId) -> Self {
        value.0
    }
}

impl TryFrom<String> for UserId {
    type Error = UserIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

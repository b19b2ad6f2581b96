//! Strongly-typed identifiers for the Strand runtime.
//!
//! Each identifier type is a thin wrapper around a UUID with a phantom type
//! parameter, so an actor identifier can never be passed where a request
//! identifier is expected.
//!
//! # Examples
//!
//! ```
//! use strand_core::id::{ActorId, RequestId};
//! use std::str::FromStr;
//!
//! let actor_id = ActorId::new();
//! let request_id = RequestId::new();
//! assert_ne!(actor_id.to_string(), request_id.to_string());
//!
//! let id_str = "550e8400-e29b-41d4-a716-446655440000";
//! let actor_id = ActorId::from_str(id_str).unwrap();
//! assert_eq!(actor_id.to_string(), id_str);
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::{Ord, PartialOrd};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A type-safe identifier based on UUID.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct Id<T> {
    uuid: Uuid,
    #[serde(skip)]
    _marker: std::marker::PhantomData<T>,
}

impl<T> Id<T> {
    /// Create a new random identifier.
    pub fn new() -> Self {
        Self {
            uuid: Uuid::new_v4(),
            _marker: std::marker::PhantomData,
        }
    }

    /// Create an identifier from a specific UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self {
            uuid,
            _marker: std::marker::PhantomData,
        }
    }

    /// Get the underlying UUID.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Short form used in thread names and log lines.
    ///
    /// ```
    /// use strand_core::id::ActorId;
    ///
    /// let id = ActorId::new();
    /// assert_eq!(id.short().len(), 8);
    /// ```
    pub fn short(&self) -> String {
        self.uuid.simple().to_string()[..8].to_string()
    }
}

impl<T> Default for Id<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uuid)
    }
}

impl<T> FromStr for Id<T> {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self {
            uuid: Uuid::parse_str(s)?,
            _marker: std::marker::PhantomData,
        })
    }
}

/// Marker type for actors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorMarker;
/// Identifier for an actor (its `aid`).
pub type ActorId = Id<ActorMarker>;

/// Marker type for mailbox requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestMarker;
/// Identifier for a request delivered through a mailbox.
pub type RequestId = Id<RequestMarker>;

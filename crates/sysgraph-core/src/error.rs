//! Error types for tree splicing, relation editing, XML and configuration

use thiserror::Error;

use crate::topology::{ComponentId, RelationId};

/// Consistency failures detected while splicing a component into the tree.
///
/// The numeric codes returned by [`SpliceError::code`] are stable and are
/// what callers historically switch on.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpliceError {
    /// The child is listed under the parent, but its parent link points elsewhere.
    #[error("component {child:?} is listed under {parent:?} but its parent link differs")]
    NotParentsChild {
        parent: ComponentId,
        child: ComponentId,
    },
    /// The child neither points to the parent nor is listed under it.
    #[error("component {child:?} is not a child of {parent:?}")]
    Unrelated {
        parent: ComponentId,
        child: ComponentId,
    },
    /// The child points to the parent, but the parent does not list it.
    #[error("component {child:?} points to {parent:?} but is missing from its children")]
    MissingFromChildren {
        parent: ComponentId,
        child: ComponentId,
    },
    /// One of the handles refers to a deleted component.
    #[error("stale component handle {0:?}")]
    StaleHandle(ComponentId),
}

impl SpliceError {
    pub fn code(&self) -> i32 {
        match self {
            SpliceError::NotParentsChild { .. } => 1,
            SpliceError::Unrelated { .. } => 2,
            SpliceError::MissingFromChildren { .. } => 3,
            SpliceError::StaleHandle(_) => 4,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelationError {
    #[error("stale relation handle {0:?}")]
    StaleRelation(RelationId),
    #[error("stale component handle {0:?}")]
    StaleComponent(ComponentId),
    #[error("participant index {index} out of range (relation has {len} participants)")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("component {0:?} does not participate in the relation")]
    ParticipantNotFound(ComponentId),
    #[error("{kind} requires {expected} participants, got {actual}")]
    InvalidArity {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("component {0:?} cannot take part in a coupling map")]
    NotQubitLike(ComponentId),
}

#[derive(Error, Debug)]
pub enum XmlError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse XML: {0}")]
    Parse(String),
    #[error("Failed to serialize XML: {0}")]
    Serialize(String),
    #[error("<{element}> is missing required attribute '{attribute}'")]
    MissingAttribute { element: String, attribute: String },
    #[error("<{element}> attribute '{attribute}' has invalid value '{value}'")]
    InvalidValue {
        element: String,
        attribute: String,
        value: String,
    },
    #[error("document has no <{0}> section")]
    MissingSection(&'static str),
    #[error("unknown component element <{0}>")]
    UnknownComponent(String),
    #[error("invalid <{element}> relation: {reason}")]
    InvalidRelation { element: String, reason: String },
    #[error("identity token '{0}' does not resolve to any component")]
    UnresolvedToken(String),
    #[error("cannot export stale component handle {0:?}")]
    StaleRoot(ComponentId),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

//! # Core Type Definitions
//!
//! This module contains the core types shared by every Topica component:
//! - Handles into the store (`TopicId`, `AssociationId`, `RoleId`, ...)
//! - Addresses and literals (`Locator`, `Literal`)
//! - Scopes (`Scope`)
//! - Error types (`TopicMapError`)
//!
//! ## Determinism Guarantees
//!
//! All handle types implement `Ord` so they can key `BTreeMap`/`BTreeSet`.
//! Iteration order over the store is therefore allocation order, and merge
//! decisions taken while iterating are reproducible run to run.

use crate::primitives::{XSD_ANY_URI, XSD_STRING};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

// =============================================================================
// HANDLES
// =============================================================================

/// Handle of a topic inside a store.
///
/// Handles survive merges: a handle whose topic was merged away keeps
/// resolving to the survivor through the store's forwarding table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TopicId(pub u64);

/// Handle of an association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssociationId(pub u64);

/// Handle of an association role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoleId(pub u64);

/// Handle of a topic name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NameId(pub u64);

/// Handle of an occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OccurrenceId(pub u64);

/// Handle of a name variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VariantId(pub u64);

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "topic#{}", self.0)
    }
}

/// Reference to any reifiable, non-topic construct.
///
/// The topic map itself is reifiable and carries item identifiers, so it
/// is one of the variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ConstructRef {
    TopicMap,
    Association(AssociationId),
    Role(RoleId),
    Name(NameId),
    Occurrence(OccurrenceId),
    Variant(VariantId),
}

impl ConstructRef {
    /// The kind of construct this reference points at.
    #[must_use]
    pub const fn kind(self) -> ConstructKind {
        match self {
            Self::TopicMap => ConstructKind::TopicMap,
            Self::Association(_) => ConstructKind::Association,
            Self::Role(_) => ConstructKind::Role,
            Self::Name(_) => ConstructKind::Name,
            Self::Occurrence(_) => ConstructKind::Occurrence,
            Self::Variant(_) => ConstructKind::Variant,
        }
    }
}

impl fmt::Display for ConstructRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TopicMap => write!(f, "topic map"),
            Self::Association(id) => write!(f, "association#{}", id.0),
            Self::Role(id) => write!(f, "role#{}", id.0),
            Self::Name(id) => write!(f, "name#{}", id.0),
            Self::Occurrence(id) => write!(f, "occurrence#{}", id.0),
            Self::Variant(id) => write!(f, "variant#{}", id.0),
        }
    }
}

/// Construct kinds, including topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstructKind {
    TopicMap,
    Topic,
    Association,
    Role,
    Name,
    Occurrence,
    Variant,
}

impl fmt::Display for ConstructKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::TopicMap => "topic map",
            Self::Topic => "topic",
            Self::Association => "association",
            Self::Role => "role",
            Self::Name => "name",
            Self::Occurrence => "occurrence",
            Self::Variant => "variant",
        };
        f.write_str(label)
    }
}

// =============================================================================
// ADDRESSES & LITERALS
// =============================================================================

/// An address (IRI or IRI reference) used as an identity key.
///
/// Locators are compared as plain strings. Resolving relative references
/// against a document base is the job of the parser that produced the
/// event stream.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locator(String);

impl Locator {
    /// Create a locator from an address.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Get the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Locator {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

/// The three identity-key namespaces of a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IdentityKind {
    #[serde(rename = "iid")]
    ItemIdentifier,
    #[serde(rename = "sid")]
    SubjectIdentifier,
    #[serde(rename = "slo")]
    SubjectLocator,
}

impl fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::ItemIdentifier => "item identifier",
            Self::SubjectIdentifier => "subject identifier",
            Self::SubjectLocator => "subject locator",
        };
        f.write_str(label)
    }
}

/// A literal value with its datatype, as carried by occurrences and variants.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Literal {
    pub value: String,
    pub datatype: Locator,
}

impl Literal {
    /// Create a literal with an explicit datatype.
    #[must_use]
    pub fn new(value: impl Into<String>, datatype: Locator) -> Self {
        Self {
            value: value.into(),
            datatype,
        }
    }

    /// Create an `xsd:string` literal.
    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self::new(value, Locator::new(XSD_STRING))
    }

    /// Create an `xsd:anyURI` literal.
    #[must_use]
    pub fn iri(value: impl Into<String>) -> Self {
        Self::new(value, Locator::new(XSD_ANY_URI))
    }
}

// =============================================================================
// SCOPE
// =============================================================================

/// A set of theme topics limiting the validity of a statement.
///
/// The empty scope is the unconstrained scope. Themes are kept sorted by
/// handle, which makes two scopes over the same theme set compare equal
/// regardless of assertion order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope(BTreeSet<TopicId>);

impl Scope {
    /// The unconstrained scope.
    #[must_use]
    pub fn unconstrained() -> Self {
        Self::default()
    }

    /// Check if this is the unconstrained scope.
    #[must_use]
    pub fn is_unconstrained(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the themes in handle order.
    pub fn themes(&self) -> impl Iterator<Item = TopicId> + '_ {
        self.0.iter().copied()
    }

    /// Number of themes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the scope has no themes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check if `theme` is part of this scope.
    #[must_use]
    pub fn contains(&self, theme: TopicId) -> bool {
        self.0.contains(&theme)
    }

    /// Check if this scope contains every theme of `other` and at least
    /// one more.
    #[must_use]
    pub fn is_strict_superset(&self, other: &Self) -> bool {
        self.0.len() > other.0.len() && self.0.is_superset(&other.0)
    }

    /// The union of both scopes.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self(self.0.union(&other.0).copied().collect())
    }

    /// Replace `from` with `to`. Returns `true` if the scope changed.
    pub fn replace(&mut self, from: TopicId, to: TopicId) -> bool {
        if self.0.remove(&from) {
            self.0.insert(to);
            true
        } else {
            false
        }
    }
}

impl FromIterator<TopicId> for Scope {
    fn from_iter<I: IntoIterator<Item = TopicId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors raised while building a topic map.
///
/// Every variant is fatal: once returned, ingestion must stop. Duplicate
/// topics and structurally equal constructs are not errors; they are merged.
#[derive(Debug, Error)]
pub enum TopicMapError {
    /// An end event did not match the state on top of the stack.
    #[error("Protocol error: expected end of {expected}, but the open state is {found}")]
    StateMismatch { expected: State, found: State },

    /// A leaf or start event is not allowed in the current state.
    #[error("Protocol error: event `{event}` is not allowed in state {state}")]
    UnexpectedEvent { event: &'static str, state: State },

    /// A construct was closed without one of its mandatory parts.
    #[error("Protocol error: {construct} has no {property}")]
    MissingProperty {
        construct: ConstructKind,
        property: &'static str,
    },

    /// The stream ended while a state was still open.
    #[error("Protocol error: stream ended inside {open}")]
    UnterminatedStream { open: State },

    /// The stream nests deeper than the configured limit.
    #[error("Protocol error: nesting deeper than {limit} levels")]
    NestingTooDeep { limit: usize },

    /// Themes were collected but never attached to a construct.
    #[error("Internal error: {themes} pending theme(s) at end of stream")]
    DanglingScope { themes: usize },

    /// An address is bound to a construct that cannot be merged with the
    /// construct now claiming it.
    #[error("Identity conflict on <{address}>: bound to {existing}, claimed by {attempted}")]
    IdentityConflict {
        address: Locator,
        existing: ConstructKind,
        attempted: ConstructKind,
    },

    /// A topic already reifies a construct that is not equal to the one it
    /// is now asked to reify.
    #[error("Reifier conflict: {reifier} already reifies {existing}, cannot also reify {attempted}")]
    ReifierConflict {
        reifier: TopicId,
        existing: ConstructRef,
        attempted: ConstructRef,
    },

    /// A variant does not narrow the scope of its name.
    #[error("Constraint violation: variant scope must strictly extend the scope of its name")]
    VariantScope,

    /// A topic handle does not belong to this store.
    #[error("Topic not found: {0}")]
    TopicNotFound(TopicId),

    /// A construct handle does not belong to this store.
    #[error("Construct not found: {0}")]
    ConstructNotFound(ConstructRef),

    /// Two constructs of different kinds were asked to merge.
    #[error("Cannot merge {merged} into {survivor}")]
    IncompatibleMerge {
        merged: ConstructRef,
        survivor: ConstructRef,
    },

    /// An event arrived after a fatal error.
    #[error("Ingestion aborted by an earlier error")]
    Aborted,

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

/// Tags of the construction state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    Initial,
    Topic,
    Association,
    Role,
    Occurrence,
    Name,
    Variant,
    Scope,
    Theme,
    Reifier,
    Player,
    Isa,
    Type,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Initial => "INITIAL",
            Self::Topic => "TOPIC",
            Self::Association => "ASSOCIATION",
            Self::Role => "ROLE",
            Self::Occurrence => "OCCURRENCE",
            Self::Name => "NAME",
            Self::Variant => "VARIANT",
            Self::Scope => "SCOPE",
            Self::Theme => "THEME",
            Self::Reifier => "REIFIER",
            Self::Player => "PLAYER",
            Self::Isa => "ISA",
            Self::Type => "TYPE",
        };
        f.write_str(label)
    }
}

// =============================================================================
// TESTS
// =============================================================================

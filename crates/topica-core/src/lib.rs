//! # topica-core
//!
//! The deterministic topic map construction engine for Topica.
//!
//! This crate turns a stream of nested construct-boundary events into a
//! merged, deduplicated topic map: one topic per subject, one statement per
//! distinct fact.
//!
//! ## Architecture
//!
//! - `ingestor` - the construction state machine (events → drafts)
//! - `handler` - the creation contract between the engine and a store
//! - `identity` - identity-key indexes and the merge-on-collision decision
//! - `signature` - canonical fingerprints of non-topic constructs
//! - `merge` - topic, construct and topic map merges
//! - `topicmap` - the in-memory reference store
//! - `session` - all-or-nothing ingestion with rollback
//! - `snapshot` - a serializable inspection view
//!
//! ## Constraints
//!
//! - Single-threaded and synchronous; no I/O
//! - `BTreeMap`/`BTreeSet` only, so iteration and merge order are
//!   reproducible
//! - The engine never installs a `tracing` subscriber

// =============================================================================
// MODULES
// =============================================================================

pub mod event;
pub mod handler;
pub mod identity;
pub mod ingestor;
pub mod merge;
pub mod model;
pub mod primitives;
pub mod session;
pub mod signature;
pub mod snapshot;
pub mod topicmap;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    AssociationId, ConstructKind, ConstructRef, IdentityKind, Literal, Locator, NameId,
    OccurrenceId, RoleId, Scope, State, TopicId, TopicMapError, VariantId,
};

// =============================================================================
// RE-EXPORTS: Model & Events
// =============================================================================

pub use event::Event;
pub use model::{Association, Name, Occurrence, Reifiable, Role, Scoped, Topic, Typed, Variant};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use handler::{
    AssociationDraft, CreatedAssociation, NameDraft, OccurrenceDraft, RoleDraft,
    TopicMapHandler, VariantDraft,
};
pub use identity::{IdentityIndex, Resolution};
pub use ingestor::{IngestConfig, Ingestor};
pub use merge::{MergeEngine, merge_topic_maps};
pub use signature::Signature;
pub use topicmap::{MergeStats, TopicMap};

// =============================================================================
// RE-EXPORTS: Session & Snapshot
// =============================================================================

pub use session::{IngestReport, Session};
pub use snapshot::{
    AssociationSnapshot, NameSnapshot, OccurrenceSnapshot, RoleSnapshot, TopicMapSnapshot,
    TopicSnapshot, VariantSnapshot,
};

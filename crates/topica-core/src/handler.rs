//! # Creation Contract
//!
//! The `TopicMapHandler` trait is the only thing the construction state
//! machine knows about the store it builds into.
//!
//! The engine decides *when* a construct is finished and *what* it
//! consists of; the handler allocates, indexes and merges. The in-memory
//! [`TopicMap`](crate::TopicMap) is the reference implementation. Another
//! backend (a persistent store, an adapter to a foreign engine) implements
//! this trait and reuses the ingestor unchanged.
//!
//! Topic handles passed in may be stale (merged away since they were
//! obtained); implementations must resolve them to the surviving topic.

use crate::types::{
    AssociationId, Literal, Locator, NameId, OccurrenceId, RoleId, TopicId, TopicMapError,
};

// =============================================================================
// DRAFTS
// =============================================================================

/// A finished occurrence, ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccurrenceDraft {
    pub type_id: TopicId,
    pub literal: Literal,
    pub scope: Vec<TopicId>,
    pub reifier: Option<TopicId>,
    pub item_identifiers: Vec<Locator>,
}

/// A finished variant, stored together with its name.
///
/// `scope` holds the themes declared on the variant itself; the stored
/// scope is their union with the name's scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantDraft {
    pub literal: Literal,
    pub scope: Vec<TopicId>,
    pub reifier: Option<TopicId>,
    pub item_identifiers: Vec<Locator>,
}

/// A finished name with its variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameDraft {
    pub type_id: TopicId,
    pub value: String,
    pub scope: Vec<TopicId>,
    pub reifier: Option<TopicId>,
    pub item_identifiers: Vec<Locator>,
    pub variants: Vec<VariantDraft>,
}

/// A finished role. Item identifiers and reifier of roles are applied
/// after the association exists; see [`CreatedAssociation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleDraft {
    pub type_id: TopicId,
    pub player: TopicId,
}

/// A finished association with its roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationDraft {
    pub type_id: TopicId,
    pub scope: Vec<TopicId>,
    pub reifier: Option<TopicId>,
    pub item_identifiers: Vec<Locator>,
    pub roles: Vec<RoleDraft>,
}

/// Handles of a stored association and of its roles.
///
/// `roles[i]` is the stored role for `AssociationDraft::roles[i]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedAssociation {
    pub association: AssociationId,
    pub roles: Vec<RoleId>,
}

// =============================================================================
// HANDLER TRAIT
// =============================================================================

/// The store-side creation and attachment contract.
///
/// Every method may merge. Identity assertions on a topic return the
/// topic that survives the assertion, which is not necessarily the one
/// passed in.
pub trait TopicMapHandler {
    /// Get or create the topic denoted by an item identifier.
    fn create_topic_by_item_identifier(&mut self, iid: &Locator)
    -> Result<TopicId, TopicMapError>;

    /// Get or create the topic denoted by a subject identifier.
    fn create_topic_by_subject_identifier(
        &mut self,
        sid: &Locator,
    ) -> Result<TopicId, TopicMapError>;

    /// Get or create the topic denoted by a subject locator.
    fn create_topic_by_subject_locator(&mut self, slo: &Locator)
    -> Result<TopicId, TopicMapError>;

    /// Create a topic without identity. Identities asserted later may
    /// merge it into an existing topic.
    fn create_topic(&mut self) -> Result<TopicId, TopicMapError>;

    /// Record that `instance` is an instance of `type_id`.
    fn handle_type_instance(
        &mut self,
        instance: TopicId,
        type_id: TopicId,
    ) -> Result<(), TopicMapError>;

    /// Add an item identifier to a topic.
    fn handle_item_identifier(
        &mut self,
        topic: TopicId,
        iid: &Locator,
    ) -> Result<TopicId, TopicMapError>;

    /// Add a subject identifier to a topic.
    fn handle_subject_identifier(
        &mut self,
        topic: TopicId,
        sid: &Locator,
    ) -> Result<TopicId, TopicMapError>;

    /// Add a subject locator to a topic.
    fn handle_subject_locator(
        &mut self,
        topic: TopicId,
        slo: &Locator,
    ) -> Result<TopicId, TopicMapError>;

    /// Add an item identifier to the topic map itself.
    fn handle_topic_map_item_identifier(&mut self, iid: &Locator) -> Result<(), TopicMapError>;

    /// Make `reifier` the reifier of the topic map itself.
    fn handle_topic_map_reifier(&mut self, reifier: TopicId) -> Result<(), TopicMapError>;

    /// Store an occurrence of `parent`.
    fn create_occurrence(
        &mut self,
        parent: TopicId,
        draft: OccurrenceDraft,
    ) -> Result<OccurrenceId, TopicMapError>;

    /// Store a name of `parent`, with its variants.
    fn create_name(&mut self, parent: TopicId, draft: NameDraft)
    -> Result<NameId, TopicMapError>;

    /// Store an association and its roles.
    fn create_association(
        &mut self,
        draft: AssociationDraft,
    ) -> Result<CreatedAssociation, TopicMapError>;

    /// Add an item identifier to a stored role.
    fn handle_role_item_identifier(
        &mut self,
        role: RoleId,
        iid: &Locator,
    ) -> Result<(), TopicMapError>;

    /// Make `reifier` the reifier of a stored role.
    fn handle_role_reifier(&mut self, role: RoleId, reifier: TopicId)
    -> Result<(), TopicMapError>;
}

impl<H: TopicMapHandler + ?Sized> TopicMapHandler for &mut H {
    fn create_topic_by_item_identifier(
        &mut self,
        iid: &Locator,
    ) -> Result<TopicId, TopicMapError> {
        (**self).create_topic_by_item_identifier(iid)
    }

    fn create_topic_by_subject_identifier(
        &mut self,
        sid: &Locator,
    ) -> Result<TopicId, TopicMapError> {
        (**self).create_topic_by_subject_identifier(sid)
    }

    fn create_topic_by_subject_locator(
        &mut self,
        slo: &Locator,
    ) -> Result<TopicId, TopicMapError> {
        (**self).create_topic_by_subject_locator(slo)
    }

    fn create_topic(&mut self) -> Result<TopicId, TopicMapError> {
        (**self).create_topic()
    }

    fn handle_type_instance(
        &mut self,
        instance: TopicId,
        type_id: TopicId,
    ) -> Result<(), TopicMapError> {
        (**self).handle_type_instance(instance, type_id)
    }

    fn handle_item_identifier(
        &mut self,
        topic: TopicId,
        iid: &Locator,
    ) -> Result<TopicId, TopicMapError> {
        (**self).handle_item_identifier(topic, iid)
    }

    fn handle_subject_identifier(
        &mut self,
        topic: TopicId,
        sid: &Locator,
    ) -> Result<TopicId, TopicMapError> {
        (**self).handle_subject_identifier(topic, sid)
    }

    fn handle_subject_locator(
        &mut self,
        topic: TopicId,
        slo: &Locator,
    ) -> Result<TopicId, TopicMapError> {
        (**self).handle_subject_locator(topic, slo)
    }

    fn handle_topic_map_item_identifier(&mut self, iid: &Locator) -> Result<(), TopicMapError> {
        (**self).handle_topic_map_item_identifier(iid)
    }

    fn handle_topic_map_reifier(&mut self, reifier: TopicId) -> Result<(), TopicMapError> {
        (**self).handle_topic_map_reifier(reifier)
    }

    fn create_occurrence(
        &mut self,
        parent: TopicId,
        draft: OccurrenceDraft,
    ) -> Result<OccurrenceId, TopicMapError> {
        (**self).create_occurrence(parent, draft)
    }

    fn create_name(
        &mut self,
        parent: TopicId,
        draft: NameDraft,
    ) -> Result<NameId, TopicMapError> {
        (**self).create_name(parent, draft)
    }

    fn create_association(
        &mut self,
        draft: AssociationDraft,
    ) -> Result<CreatedAssociation, TopicMapError> {
        (**self).create_association(draft)
    }

    fn handle_role_item_identifier(
        &mut self,
        role: RoleId,
        iid: &Locator,
    ) -> Result<(), TopicMapError> {
        (**self).handle_role_item_identifier(role, iid)
    }

    fn handle_role_reifier(
        &mut self,
        role: RoleId,
        reifier: TopicId,
    ) -> Result<(), TopicMapError> {
        (**self).handle_role_reifier(role, reifier)
    }
}

//! # Topic Map Store
//!
//! The in-memory backing store for Topica.
//!
//! This module implements the `TopicMapHandler` trait over an arena of
//! topics and constructs keyed by handle. All data structures use
//! `BTreeMap` for deterministic ordering.
//!
//! ## Handle Indirection
//!
//! Merges never invalidate handles. When a topic or construct is merged
//! away, its handle is recorded in a forwarding table pointing at the
//! survivor, and every lookup resolves through that table first. Handles
//! sitting on the ingestor's construct stack therefore stay usable across
//! merges without being rewritten.

use crate::handler::{
    AssociationDraft, CreatedAssociation, NameDraft, OccurrenceDraft, TopicMapHandler,
};
use crate::identity::{IdentityIndex, Resolution};
use crate::merge::MergeEngine;
use crate::model::{Association, Name, Occurrence, Reifiable, Role, Topic, Variant};
use crate::signature::{self, Signature};
use crate::types::{
    AssociationId, ConstructRef, IdentityKind, Locator, NameId, OccurrenceId, RoleId, Scope,
    TopicId, TopicMapError, VariantId,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Counters of merges performed by a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStats {
    /// Topics merged into another topic.
    pub topic_merges: u64,
    /// Non-topic constructs merged into an equal construct, including
    /// duplicates folded into an existing characteristic on creation.
    pub construct_merges: u64,
}

// =============================================================================
// TOPIC MAP
// =============================================================================

/// An in-memory topic map.
///
/// Cloning is cheap enough to serve as a checkpoint; see
/// [`Session`](crate::Session).
#[derive(Debug, Clone, Default)]
pub struct TopicMap {
    pub(crate) item_identifiers: BTreeSet<Locator>,
    pub(crate) reifier: Option<TopicId>,

    pub(crate) topics: BTreeMap<TopicId, Topic>,
    pub(crate) associations: BTreeMap<AssociationId, Association>,
    pub(crate) roles: BTreeMap<RoleId, Role>,
    pub(crate) names: BTreeMap<NameId, Name>,
    pub(crate) occurrences: BTreeMap<OccurrenceId, Occurrence>,
    pub(crate) variants: BTreeMap<VariantId, Variant>,

    pub(crate) index: IdentityIndex,

    /// Merged topic handle -> survivor (possibly itself merged later).
    pub(crate) topic_forwards: BTreeMap<TopicId, TopicId>,
    /// Merged construct handle -> survivor of the same kind.
    pub(crate) construct_forwards: BTreeMap<ConstructRef, ConstructRef>,

    pub(crate) stats: MergeStats,

    /// Next handle value; shared by every construct kind.
    next_id: u64,
}

impl Reifiable for TopicMap {
    fn construct(&self) -> ConstructRef {
        ConstructRef::TopicMap
    }

    fn item_identifiers(&self) -> &BTreeSet<Locator> {
        &self.item_identifiers
    }

    fn item_identifiers_mut(&mut self) -> &mut BTreeSet<Locator> {
        &mut self.item_identifiers
    }

    fn reifier(&self) -> Option<TopicId> {
        self.reifier
    }

    fn set_reifier(&mut self, reifier: Option<TopicId>) {
        self.reifier = reifier;
    }
}

impl TopicMap {
    /// Create an empty topic map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);
        id
    }

    // =========================================================================
    // HANDLE RESOLUTION
    // =========================================================================

    /// Follow the forwarding table to the surviving topic.
    #[must_use]
    pub fn resolve(&self, topic: TopicId) -> TopicId {
        let mut current = topic;
        while let Some(&next) = self.topic_forwards.get(&current) {
            current = next;
        }
        current
    }

    /// Follow the forwarding table to the surviving construct.
    #[must_use]
    pub fn resolve_construct(&self, construct: ConstructRef) -> ConstructRef {
        let mut current = construct;
        while let Some(&next) = self.construct_forwards.get(&current) {
            current = next;
        }
        current
    }

    /// Resolve a role handle.
    #[must_use]
    pub fn resolve_role(&self, role: RoleId) -> RoleId {
        match self.resolve_construct(ConstructRef::Role(role)) {
            ConstructRef::Role(id) => id,
            _ => role,
        }
    }

    pub(crate) fn resolve_association(&self, association: AssociationId) -> AssociationId {
        match self.resolve_construct(ConstructRef::Association(association)) {
            ConstructRef::Association(id) => id,
            _ => association,
        }
    }

    /// Resolve a topic handle and check that the topic exists.
    pub(crate) fn require_topic(&self, topic: TopicId) -> Result<TopicId, TopicMapError> {
        let resolved = self.resolve(topic);
        if self.topics.contains_key(&resolved) {
            Ok(resolved)
        } else {
            Err(TopicMapError::TopicNotFound(topic))
        }
    }

    fn resolve_scope(&self, themes: &[TopicId]) -> Result<Scope, TopicMapError> {
        themes.iter().map(|&t| self.require_topic(t)).collect()
    }

    // =========================================================================
    // READ API
    // =========================================================================

    /// Get a topic by handle. Stale handles resolve to the survivor.
    #[must_use]
    pub fn topic(&self, id: TopicId) -> Option<&Topic> {
        self.topics.get(&self.resolve(id))
    }

    /// All topics in handle order.
    pub fn topics(&self) -> impl Iterator<Item = &Topic> {
        self.topics.values()
    }

    /// The topic owning a subject identifier.
    #[must_use]
    pub fn topic_by_subject_identifier(&self, sid: &Locator) -> Option<&Topic> {
        self.index
            .topic(IdentityKind::SubjectIdentifier, sid)
            .and_then(|id| self.topic(id))
    }

    /// The topic owning a subject locator.
    #[must_use]
    pub fn topic_by_subject_locator(&self, slo: &Locator) -> Option<&Topic> {
        self.index
            .topic(IdentityKind::SubjectLocator, slo)
            .and_then(|id| self.topic(id))
    }

    /// The topic owning an item identifier.
    #[must_use]
    pub fn topic_by_item_identifier(&self, iid: &Locator) -> Option<&Topic> {
        self.index
            .topic(IdentityKind::ItemIdentifier, iid)
            .and_then(|id| self.topic(id))
    }

    /// The non-topic construct owning an item identifier.
    #[must_use]
    pub fn construct_by_item_identifier(&self, iid: &Locator) -> Option<ConstructRef> {
        self.index
            .construct(iid)
            .map(|c| self.resolve_construct(c))
    }

    #[must_use]
    pub fn association(&self, id: AssociationId) -> Option<&Association> {
        match self.resolve_construct(ConstructRef::Association(id)) {
            ConstructRef::Association(id) => self.associations.get(&id),
            _ => None,
        }
    }

    /// All associations in handle order.
    pub fn associations(&self) -> impl Iterator<Item = &Association> {
        self.associations.values()
    }

    #[must_use]
    pub fn role(&self, id: RoleId) -> Option<&Role> {
        self.roles.get(&self.resolve_role(id))
    }

    /// Roles of an association in handle order.
    pub fn roles_of(&self, association: &Association) -> impl Iterator<Item = &Role> {
        association
            .roles
            .iter()
            .filter_map(|id| self.roles.get(id))
    }

    /// Roles a topic plays, in handle order.
    pub fn roles_played_by(&self, topic: TopicId) -> impl Iterator<Item = &Role> {
        self.topic(topic)
            .into_iter()
            .flat_map(|t| t.roles_played.iter())
            .filter_map(|id| self.roles.get(id))
    }

    #[must_use]
    pub fn name(&self, id: NameId) -> Option<&Name> {
        match self.resolve_construct(ConstructRef::Name(id)) {
            ConstructRef::Name(id) => self.names.get(&id),
            _ => None,
        }
    }

    /// Names of a topic in handle order.
    pub fn names_of(&self, topic: TopicId) -> impl Iterator<Item = &Name> {
        self.topic(topic)
            .into_iter()
            .flat_map(|t| t.names.iter())
            .filter_map(|id| self.names.get(id))
    }

    #[must_use]
    pub fn occurrence(&self, id: OccurrenceId) -> Option<&Occurrence> {
        match self.resolve_construct(ConstructRef::Occurrence(id)) {
            ConstructRef::Occurrence(id) => self.occurrences.get(&id),
            _ => None,
        }
    }

    /// Occurrences of a topic in handle order.
    pub fn occurrences_of(&self, topic: TopicId) -> impl Iterator<Item = &Occurrence> {
        self.topic(topic)
            .into_iter()
            .flat_map(|t| t.occurrences.iter())
            .filter_map(|id| self.occurrences.get(id))
    }

    #[must_use]
    pub fn variant(&self, id: VariantId) -> Option<&Variant> {
        match self.resolve_construct(ConstructRef::Variant(id)) {
            ConstructRef::Variant(id) => self.variants.get(&id),
            _ => None,
        }
    }

    /// Variants of a name in handle order.
    pub fn variants_of(&self, name: &Name) -> impl Iterator<Item = &Variant> {
        name.variants.iter().filter_map(|id| self.variants.get(id))
    }

    /// All names in handle order.
    pub fn names(&self) -> impl Iterator<Item = &Name> {
        self.names.values()
    }

    /// All occurrences in handle order.
    pub fn occurrences(&self) -> impl Iterator<Item = &Occurrence> {
        self.occurrences.values()
    }

    /// All roles in handle order.
    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.values()
    }

    /// All variants in handle order.
    pub fn variants(&self) -> impl Iterator<Item = &Variant> {
        self.variants.values()
    }

    /// Item identifiers of the topic map itself.
    #[must_use]
    pub fn item_identifiers(&self) -> &BTreeSet<Locator> {
        &self.item_identifiers
    }

    /// The topic reifying the topic map itself.
    #[must_use]
    pub fn reifier(&self) -> Option<TopicId> {
        self.reifier.map(|r| self.resolve(r))
    }

    /// The topic reifying `construct`, if any.
    #[must_use]
    pub fn reifier_of(&self, construct: ConstructRef) -> Option<TopicId> {
        self.reifiable(construct)
            .ok()
            .and_then(|c| c.reifier())
            .map(|r| self.resolve(r))
    }

    /// The construct reified by `topic`, if any.
    #[must_use]
    pub fn reified_by(&self, topic: TopicId) -> Option<ConstructRef> {
        self.topic(topic)
            .and_then(|t| t.reified)
            .map(|c| self.resolve_construct(c))
    }

    /// Signature of a stored construct. The topic map itself has none.
    #[must_use]
    pub fn signature(&self, construct: ConstructRef) -> Option<Signature> {
        match self.resolve_construct(construct) {
            ConstructRef::TopicMap => None,
            ConstructRef::Association(id) => self.association_signature(id),
            ConstructRef::Role(id) => self.roles.get(&id).map(signature::role),
            ConstructRef::Name(id) => self.names.get(&id).map(signature::name),
            ConstructRef::Occurrence(id) => self.occurrences.get(&id).map(signature::occurrence),
            ConstructRef::Variant(id) => self.variants.get(&id).map(signature::variant),
        }
    }

    /// Sorted `(type, player)` pairs of an association's roles.
    fn role_facts(&self, id: AssociationId) -> Vec<(TopicId, TopicId)> {
        let mut facts: Vec<(TopicId, TopicId)> = self
            .associations
            .get(&id)
            .into_iter()
            .flat_map(|a| self.roles_of(a))
            .map(|r| (self.resolve(r.type_id), self.resolve(r.player)))
            .collect();
        facts.sort();
        facts
    }

    fn association_signature(&self, id: AssociationId) -> Option<Signature> {
        self.associations
            .get(&id)
            .map(|a| signature::association(a, self.roles_of(a)))
    }

    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    #[must_use]
    pub fn association_count(&self) -> usize {
        self.associations.len()
    }

    #[must_use]
    pub fn role_count(&self) -> usize {
        self.roles.len()
    }

    #[must_use]
    pub fn name_count(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn occurrence_count(&self) -> usize {
        self.occurrences.len()
    }

    #[must_use]
    pub fn variant_count(&self) -> usize {
        self.variants.len()
    }

    /// Merge counters since creation.
    #[must_use]
    pub fn stats(&self) -> MergeStats {
        self.stats
    }

    // =========================================================================
    // REIFIABLE ACCESS (crate-internal)
    // =========================================================================

    pub(crate) fn reifiable(
        &self,
        construct: ConstructRef,
    ) -> Result<&dyn Reifiable, TopicMapError> {
        let found: Option<&dyn Reifiable> = match construct {
            ConstructRef::TopicMap => Some(self as &dyn Reifiable),
            ConstructRef::Association(id) => {
                self.associations.get(&id).map(|c| c as &dyn Reifiable)
            }
            ConstructRef::Role(id) => self.roles.get(&id).map(|c| c as &dyn Reifiable),
            ConstructRef::Name(id) => self.names.get(&id).map(|c| c as &dyn Reifiable),
            ConstructRef::Occurrence(id) => {
                self.occurrences.get(&id).map(|c| c as &dyn Reifiable)
            }
            ConstructRef::Variant(id) => self.variants.get(&id).map(|c| c as &dyn Reifiable),
        };
        found.ok_or(TopicMapError::ConstructNotFound(construct))
    }

    pub(crate) fn reifiable_mut(
        &mut self,
        construct: ConstructRef,
    ) -> Result<&mut dyn Reifiable, TopicMapError> {
        let found: Option<&mut dyn Reifiable> = match construct {
            ConstructRef::TopicMap => Some(self as &mut dyn Reifiable),
            ConstructRef::Association(id) => self
                .associations
                .get_mut(&id)
                .map(|c| c as &mut dyn Reifiable),
            ConstructRef::Role(id) => self.roles.get_mut(&id).map(|c| c as &mut dyn Reifiable),
            ConstructRef::Name(id) => self.names.get_mut(&id).map(|c| c as &mut dyn Reifiable),
            ConstructRef::Occurrence(id) => self
                .occurrences
                .get_mut(&id)
                .map(|c| c as &mut dyn Reifiable),
            ConstructRef::Variant(id) => self
                .variants
                .get_mut(&id)
                .map(|c| c as &mut dyn Reifiable),
        };
        found.ok_or(TopicMapError::ConstructNotFound(construct))
    }

    // =========================================================================
    // EQUALITY
    // =========================================================================

    /// Check if two constructs denote the same statement.
    ///
    /// Signatures must match. Names and occurrences must also belong to
    /// the same topic, variants to equal names. Roles must share a player
    /// and belong to one association, or to two associations with the same
    /// role types and players.
    pub(crate) fn constructs_equal(
        &self,
        a: ConstructRef,
        b: ConstructRef,
    ) -> Result<bool, TopicMapError> {
        let a = self.resolve_construct(a);
        let b = self.resolve_construct(b);
        if a == b {
            return Ok(true);
        }

        match (a, b) {
            (ConstructRef::Occurrence(x), ConstructRef::Occurrence(y)) => {
                let x = self.occurrences.get(&x).ok_or(TopicMapError::ConstructNotFound(a))?;
                let y = self.occurrences.get(&y).ok_or(TopicMapError::ConstructNotFound(b))?;
                Ok(self.resolve(x.parent) == self.resolve(y.parent)
                    && signature::occurrence(x) == signature::occurrence(y))
            }
            (ConstructRef::Name(x), ConstructRef::Name(y)) => {
                let x = self.names.get(&x).ok_or(TopicMapError::ConstructNotFound(a))?;
                let y = self.names.get(&y).ok_or(TopicMapError::ConstructNotFound(b))?;
                Ok(self.resolve(x.parent) == self.resolve(y.parent)
                    && signature::name(x) == signature::name(y))
            }
            (ConstructRef::Variant(x), ConstructRef::Variant(y)) => {
                let x = self.variants.get(&x).ok_or(TopicMapError::ConstructNotFound(a))?;
                let y = self.variants.get(&y).ok_or(TopicMapError::ConstructNotFound(b))?;
                if signature::variant(x) != signature::variant(y) {
                    return Ok(false);
                }
                self.constructs_equal(ConstructRef::Name(x.parent), ConstructRef::Name(y.parent))
            }
            (ConstructRef::Association(x), ConstructRef::Association(y)) => {
                let x = self
                    .association_signature(x)
                    .ok_or(TopicMapError::ConstructNotFound(a))?;
                let y = self
                    .association_signature(y)
                    .ok_or(TopicMapError::ConstructNotFound(b))?;
                Ok(x == y)
            }
            (ConstructRef::Role(x), ConstructRef::Role(y)) => {
                let x = self.roles.get(&x).ok_or(TopicMapError::ConstructNotFound(a))?;
                let y = self.roles.get(&y).ok_or(TopicMapError::ConstructNotFound(b))?;
                if self.resolve(x.player) != self.resolve(y.player)
                    || signature::role(x) != signature::role(y)
                {
                    return Ok(false);
                }
                let (px, py) = (
                    self.resolve_association(x.parent),
                    self.resolve_association(y.parent),
                );
                if px == py {
                    return Ok(true);
                }
                // Roles of two associations are equal only when the
                // associations state the same fact, players included.
                Ok(self.role_facts(px) == self.role_facts(py)
                    && self.constructs_equal(
                        ConstructRef::Association(px),
                        ConstructRef::Association(py),
                    )?)
            }
            _ => Ok(false),
        }
    }

    // =========================================================================
    // IDENTITY & REIFICATION (crate-internal)
    // =========================================================================

    /// Assert an identity key on a topic, merging as the resolver decides.
    /// Returns the surviving topic.
    pub(crate) fn assert_identity(
        &mut self,
        topic: TopicId,
        kind: IdentityKind,
        address: &Locator,
    ) -> Result<TopicId, TopicMapError> {
        let mut topic = self.require_topic(topic)?;
        loop {
            match self.index.resolve(topic, kind, address)? {
                Resolution::Unchanged => return Ok(topic),
                Resolution::Assign => {
                    let entry = self
                        .topics
                        .get_mut(&topic)
                        .ok_or(TopicMapError::TopicNotFound(topic))?;
                    let keys = match kind {
                        IdentityKind::ItemIdentifier => &mut entry.item_identifiers,
                        IdentityKind::SubjectIdentifier => &mut entry.subject_identifiers,
                        IdentityKind::SubjectLocator => &mut entry.subject_locators,
                    };
                    keys.insert(address.clone());
                    self.index.bind_topic(kind, address.clone(), topic);
                    return Ok(topic);
                }
                Resolution::MergeInto(owner) => {
                    topic = MergeEngine::merge_topics(self, topic, owner)?;
                }
            }
        }
    }

    fn topic_by_reference(
        &mut self,
        kind: IdentityKind,
        address: &Locator,
    ) -> Result<TopicId, TopicMapError> {
        let topic = match self.index.lookup_reference(kind, address)? {
            Some(existing) => existing,
            None => self.create_topic()?,
        };
        self.assert_identity(topic, kind, address)
    }

    /// Attach an item identifier to a non-topic construct.
    ///
    /// If another construct already holds the address and is equal, the
    /// construct is merged into it. Returns the surviving construct.
    pub(crate) fn attach_item_identifier(
        &mut self,
        construct: ConstructRef,
        iid: &Locator,
    ) -> Result<ConstructRef, TopicMapError> {
        let construct = self.resolve_construct(construct);
        match self.index.check_construct_claim(construct, iid)? {
            Some(existing) => {
                let existing = self.resolve_construct(existing);
                if existing == construct {
                    return Ok(construct);
                }
                if self.constructs_equal(construct, existing)? {
                    debug!(%construct, %existing, address = %iid, "item identifier links equal constructs");
                    return MergeEngine::merge_constructs(self, construct, existing);
                }
                Err(TopicMapError::IdentityConflict {
                    address: iid.clone(),
                    existing: existing.kind(),
                    attempted: construct.kind(),
                })
            }
            None => {
                self.reifiable_mut(construct)?
                    .item_identifiers_mut()
                    .insert(iid.clone());
                self.index.bind_construct(iid.clone(), construct);
                Ok(construct)
            }
        }
    }

    /// Make `reifier` the reifier of `construct`.
    ///
    /// A reifier already reifying an equal construct merges the two
    /// constructs; a construct already reified by another topic merges the
    /// two reifier topics. Returns the surviving construct.
    pub(crate) fn attach_reifier(
        &mut self,
        construct: ConstructRef,
        reifier: TopicId,
    ) -> Result<ConstructRef, TopicMapError> {
        let construct = self.resolve_construct(construct);
        let reifier = self.require_topic(reifier)?;
        let current = self.reifiable(construct)?.reifier().map(|r| self.resolve(r));
        if current == Some(reifier) {
            return Ok(construct);
        }

        let reified = self.reified_by(reifier);
        if let Some(other) = reified.filter(|&other| other != construct) {
            if self.constructs_equal(construct, other)? {
                debug!(%construct, %other, %reifier, "reifier links equal constructs");
                return MergeEngine::merge_constructs(self, construct, other);
            }
            return Err(TopicMapError::ReifierConflict {
                reifier,
                existing: other,
                attempted: construct,
            });
        }

        match current {
            Some(existing) => {
                MergeEngine::merge_topics(self, reifier, existing)?;
            }
            None => {
                self.reifiable_mut(construct)?.set_reifier(Some(reifier));
                if let Some(topic) = self.topics.get_mut(&reifier) {
                    topic.reified = Some(construct);
                }
            }
        }
        Ok(construct)
    }

    /// Apply item identifiers and reifier to a freshly stored construct.
    fn decorate(
        &mut self,
        construct: ConstructRef,
        item_identifiers: &[Locator],
        reifier: Option<TopicId>,
    ) -> Result<ConstructRef, TopicMapError> {
        let mut construct = construct;
        for iid in item_identifiers {
            construct = self.attach_item_identifier(construct, iid)?;
        }
        if let Some(reifier) = reifier {
            construct = self.attach_reifier(construct, reifier)?;
        }
        Ok(self.resolve_construct(construct))
    }
}

// =============================================================================
// HANDLER IMPLEMENTATION
// =============================================================================

impl TopicMapHandler for TopicMap {
    fn create_topic_by_item_identifier(
        &mut self,
        iid: &Locator,
    ) -> Result<TopicId, TopicMapError> {
        self.topic_by_reference(IdentityKind::ItemIdentifier, iid)
    }

    fn create_topic_by_subject_identifier(
        &mut self,
        sid: &Locator,
    ) -> Result<TopicId, TopicMapError> {
        self.topic_by_reference(IdentityKind::SubjectIdentifier, sid)
    }

    fn create_topic_by_subject_locator(
        &mut self,
        slo: &Locator,
    ) -> Result<TopicId, TopicMapError> {
        self.topic_by_reference(IdentityKind::SubjectLocator, slo)
    }

    fn create_topic(&mut self) -> Result<TopicId, TopicMapError> {
        let id = TopicId(self.allocate());
        self.topics.insert(id, Topic::new(id));
        Ok(id)
    }

    fn handle_type_instance(
        &mut self,
        instance: TopicId,
        type_id: TopicId,
    ) -> Result<(), TopicMapError> {
        let type_id = self.require_topic(type_id)?;
        let instance = self.require_topic(instance)?;
        if let Some(topic) = self.topics.get_mut(&instance) {
            topic.types.insert(type_id);
        }
        Ok(())
    }

    fn handle_item_identifier(
        &mut self,
        topic: TopicId,
        iid: &Locator,
    ) -> Result<TopicId, TopicMapError> {
        self.assert_identity(topic, IdentityKind::ItemIdentifier, iid)
    }

    fn handle_subject_identifier(
        &mut self,
        topic: TopicId,
        sid: &Locator,
    ) -> Result<TopicId, TopicMapError> {
        self.assert_identity(topic, IdentityKind::SubjectIdentifier, sid)
    }

    fn handle_subject_locator(
        &mut self,
        topic: TopicId,
        slo: &Locator,
    ) -> Result<TopicId, TopicMapError> {
        self.assert_identity(topic, IdentityKind::SubjectLocator, slo)
    }

    fn handle_topic_map_item_identifier(&mut self, iid: &Locator) -> Result<(), TopicMapError> {
        self.attach_item_identifier(ConstructRef::TopicMap, iid)?;
        Ok(())
    }

    fn handle_topic_map_reifier(&mut self, reifier: TopicId) -> Result<(), TopicMapError> {
        self.attach_reifier(ConstructRef::TopicMap, reifier)?;
        Ok(())
    }

    fn create_occurrence(
        &mut self,
        parent: TopicId,
        draft: OccurrenceDraft,
    ) -> Result<OccurrenceId, TopicMapError> {
        let parent = self.require_topic(parent)?;
        let type_id = self.require_topic(draft.type_id)?;
        let scope = self.resolve_scope(&draft.scope)?;
        let signature = signature::occurrence_parts(type_id, &scope, &draft.literal);

        let duplicate = self
            .occurrences_of(parent)
            .find(|o| signature::occurrence(o) == signature)
            .map(|o| o.id);

        let id = match duplicate {
            Some(existing) => {
                debug!(occurrence = existing.0, %parent, "folding duplicate occurrence");
                self.stats.construct_merges = self.stats.construct_merges.saturating_add(1);
                existing
            }
            None => {
                let id = OccurrenceId(self.allocate());
                self.occurrences.insert(
                    id,
                    Occurrence {
                        id,
                        parent,
                        type_id,
                        literal: draft.literal,
                        scope,
                        reifier: None,
                        item_identifiers: BTreeSet::new(),
                    },
                );
                if let Some(topic) = self.topics.get_mut(&parent) {
                    topic.occurrences.insert(id);
                }
                id
            }
        };

        match self.decorate(
            ConstructRef::Occurrence(id),
            &draft.item_identifiers,
            draft.reifier,
        )? {
            ConstructRef::Occurrence(id) => Ok(id),
            other => Err(TopicMapError::ConstructNotFound(other)),
        }
    }

    fn create_name(
        &mut self,
        parent: TopicId,
        draft: NameDraft,
    ) -> Result<NameId, TopicMapError> {
        let parent = self.require_topic(parent)?;
        let type_id = self.require_topic(draft.type_id)?;
        let scope = self.resolve_scope(&draft.scope)?;

        // Validate every variant before touching the store.
        let mut variants = Vec::with_capacity(draft.variants.len());
        for variant in draft.variants {
            let declared = self.resolve_scope(&variant.scope)?;
            let effective = scope.union(&declared);
            if !effective.is_strict_superset(&scope) {
                return Err(TopicMapError::VariantScope);
            }
            variants.push((effective, variant));
        }

        let signature = signature::name_parts(type_id, &scope, &draft.value);
        let duplicate = self
            .names_of(parent)
            .find(|n| signature::name(n) == signature)
            .map(|n| n.id);

        let mut id = match duplicate {
            Some(existing) => {
                debug!(name = existing.0, %parent, "folding duplicate name");
                self.stats.construct_merges = self.stats.construct_merges.saturating_add(1);
                existing
            }
            None => {
                let id = NameId(self.allocate());
                self.names.insert(
                    id,
                    Name {
                        id,
                        parent,
                        type_id,
                        value: draft.value,
                        scope,
                        variants: BTreeSet::new(),
                        reifier: None,
                        item_identifiers: BTreeSet::new(),
                    },
                );
                if let Some(topic) = self.topics.get_mut(&parent) {
                    topic.names.insert(id);
                }
                id
            }
        };

        for (scope, variant) in variants {
            let signature = signature::variant_parts(&scope, &variant.literal);
            let existing = self
                .names
                .get(&id)
                .into_iter()
                .flat_map(|n| n.variants.iter())
                .filter_map(|v| self.variants.get(v))
                .find(|v| signature::variant(v) == signature)
                .map(|v| v.id);

            let variant_id = match existing {
                Some(existing) => {
                    self.stats.construct_merges = self.stats.construct_merges.saturating_add(1);
                    existing
                }
                None => {
                    let variant_id = VariantId(self.allocate());
                    self.variants.insert(
                        variant_id,
                        Variant {
                            id: variant_id,
                            parent: id,
                            literal: variant.literal,
                            scope,
                            reifier: None,
                            item_identifiers: BTreeSet::new(),
                        },
                    );
                    if let Some(name) = self.names.get_mut(&id) {
                        name.variants.insert(variant_id);
                    }
                    variant_id
                }
            };

            self.decorate(
                ConstructRef::Variant(variant_id),
                &variant.item_identifiers,
                variant.reifier,
            )?;
            // Decoration may cascade into a merge of the name itself.
            if let ConstructRef::Name(survivor) = self.resolve_construct(ConstructRef::Name(id)) {
                id = survivor;
            }
        }

        match self.decorate(ConstructRef::Name(id), &draft.item_identifiers, draft.reifier)? {
            ConstructRef::Name(id) => Ok(id),
            other => Err(TopicMapError::ConstructNotFound(other)),
        }
    }

    fn create_association(
        &mut self,
        draft: AssociationDraft,
    ) -> Result<CreatedAssociation, TopicMapError> {
        let type_id = self.require_topic(draft.type_id)?;
        let scope = self.resolve_scope(&draft.scope)?;
        let mut roles = Vec::with_capacity(draft.roles.len());
        for role in &draft.roles {
            roles.push((self.require_topic(role.type_id)?, self.require_topic(role.player)?));
        }

        let id = AssociationId(self.allocate());
        let mut role_ids = Vec::with_capacity(roles.len());
        for (type_id, player) in roles {
            let role_id = RoleId(self.allocate());
            self.roles.insert(
                role_id,
                Role {
                    id: role_id,
                    parent: id,
                    type_id,
                    player,
                    reifier: None,
                    item_identifiers: BTreeSet::new(),
                },
            );
            if let Some(topic) = self.topics.get_mut(&player) {
                topic.roles_played.insert(role_id);
            }
            role_ids.push(role_id);
        }
        self.associations.insert(
            id,
            Association {
                id,
                type_id,
                scope,
                roles: role_ids.iter().copied().collect(),
                reifier: None,
                item_identifiers: BTreeSet::new(),
            },
        );

        let association = match self.decorate(
            ConstructRef::Association(id),
            &draft.item_identifiers,
            draft.reifier,
        )? {
            ConstructRef::Association(id) => id,
            other => return Err(TopicMapError::ConstructNotFound(other)),
        };

        Ok(CreatedAssociation {
            association,
            roles: role_ids.into_iter().map(|r| self.resolve_role(r)).collect(),
        })
    }

    fn handle_role_item_identifier(
        &mut self,
        role: RoleId,
        iid: &Locator,
    ) -> Result<(), TopicMapError> {
        let role = ConstructRef::Role(self.resolve_role(role));
        self.reifiable(role)?;
        self.attach_item_identifier(role, iid)?;
        Ok(())
    }

    fn handle_role_reifier(
        &mut self,
        role: RoleId,
        reifier: TopicId,
    ) -> Result<(), TopicMapError> {
        let role = ConstructRef::Role(self.resolve_role(role));
        self.reifiable(role)?;
        self.attach_reifier(role, reifier)?;
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{RoleDraft, VariantDraft};
    use crate::types::{ConstructKind, Literal};

    fn loc(s: &str) -> Locator {
        Locator::new(s)
    }

    fn sid_topic(map: &mut TopicMap, sid: &str) -> TopicId {
        map.create_topic_by_subject_identifier(&loc(sid))
            .expect("create topic")
    }

    fn occurrence(type_id: TopicId, value: &str, scope: Vec<TopicId>) -> OccurrenceDraft {
        OccurrenceDraft {
            type_id,
            literal: Literal::string(value),
            scope,
            reifier: None,
            item_identifiers: Vec::new(),
        }
    }

    #[test]
    fn create_by_sid_is_idempotent() {
        let mut map = TopicMap::new();
        let a = sid_topic(&mut map, "http://ex/s1");
        let b = sid_topic(&mut map, "http://ex/s1");

        assert_eq!(a, b);
        assert_eq!(map.topic_count(), 1);
    }

    #[test]
    fn create_by_sid_finds_topic_by_iid() {
        let mut map = TopicMap::new();
        let a = map
            .create_topic_by_item_identifier(&loc("http://ex/s1"))
            .expect("create");
        let b = sid_topic(&mut map, "http://ex/s1");

        assert_eq!(a, b);
        let topic = map.topic(a).expect("topic");
        assert!(topic.subject_identifiers.contains(&loc("http://ex/s1")));
        assert!(topic.item_identifiers.contains(&loc("http://ex/s1")));
    }

    #[test]
    fn shared_key_merges_and_forwards_handle() {
        let mut map = TopicMap::new();
        let a = sid_topic(&mut map, "http://ex/a");
        let b = sid_topic(&mut map, "http://ex/b");

        let survivor = map
            .handle_subject_identifier(a, &loc("http://ex/b"))
            .expect("assert");

        assert_eq!(survivor, b);
        assert_eq!(map.resolve(a), b);
        assert_eq!(map.topic_count(), 1);
        assert_eq!(map.stats().topic_merges, 1);
        let topic = map.topic(a).expect("stale handle resolves");
        assert_eq!(topic.subject_identifiers.len(), 2);
    }

    #[test]
    fn duplicate_occurrence_is_folded() {
        let mut map = TopicMap::new();
        let topic = sid_topic(&mut map, "http://ex/t");
        let ty = sid_topic(&mut map, "http://ex/homepage");

        let first = map
            .create_occurrence(topic, occurrence(ty, "Semagia", vec![]))
            .expect("create");
        let mut again = occurrence(ty, "Semagia", vec![]);
        again.item_identifiers.push(loc("#o2"));
        let second = map.create_occurrence(topic, again).expect("create");

        assert_eq!(first, second);
        assert_eq!(map.occurrence_count(), 1);
        let stored = map.occurrence(first).expect("occurrence");
        assert!(stored.item_identifiers.contains(&loc("#o2")));
    }

    #[test]
    fn variant_must_extend_name_scope() {
        let mut map = TopicMap::new();
        let topic = sid_topic(&mut map, "http://ex/t");
        let ty = sid_topic(&mut map, "http://ex/name");
        let theme = sid_topic(&mut map, "http://ex/en");

        let draft = NameDraft {
            type_id: ty,
            value: "Topic".to_string(),
            scope: vec![theme],
            reifier: None,
            item_identifiers: Vec::new(),
            variants: vec![VariantDraft {
                literal: Literal::string("topic"),
                scope: vec![theme],
                reifier: None,
                item_identifiers: Vec::new(),
            }],
        };

        let err = map.create_name(topic, draft).expect_err("must fail");
        assert!(matches!(err, TopicMapError::VariantScope));
        assert_eq!(map.name_count(), 0);
        assert_eq!(map.variant_count(), 0);
    }

    #[test]
    fn construct_iid_on_topic_address_conflicts() {
        let mut map = TopicMap::new();
        let topic = map
            .create_topic_by_item_identifier(&loc("#t"))
            .expect("create");
        let ty = sid_topic(&mut map, "http://ex/type");

        let mut draft = occurrence(ty, "x", vec![]);
        draft.item_identifiers.push(loc("#t"));
        let err = map.create_occurrence(topic, draft).expect_err("conflict");
        assert!(matches!(err, TopicMapError::IdentityConflict { .. }));
    }

    #[test]
    fn shared_reifier_merges_equal_associations() {
        let mut map = TopicMap::new();
        let ty = sid_topic(&mut map, "http://ex/likes");
        let r1 = sid_topic(&mut map, "http://ex/r1");
        let p1 = sid_topic(&mut map, "http://ex/p1");
        let reifier = sid_topic(&mut map, "http://ex/statement");

        let draft = AssociationDraft {
            type_id: ty,
            scope: Vec::new(),
            reifier: Some(reifier),
            item_identifiers: Vec::new(),
            roles: vec![RoleDraft {
                type_id: r1,
                player: p1,
            }],
        };

        let first = map.create_association(draft.clone()).expect("create");
        let second = map.create_association(draft).expect("create");

        assert_eq!(first.association, second.association);
        assert_eq!(first.roles, second.roles);
        assert_eq!(map.association_count(), 1);
        assert_eq!(map.role_count(), 1);
    }

    fn likes(ty: TopicId, role: TopicId, player: TopicId) -> AssociationDraft {
        AssociationDraft {
            type_id: ty,
            scope: Vec::new(),
            reifier: None,
            item_identifiers: Vec::new(),
            roles: vec![RoleDraft {
                type_id: role,
                player,
            }],
        }
    }

    #[test]
    fn role_iid_does_not_join_associations_with_different_players() {
        let mut map = TopicMap::new();
        let ty = sid_topic(&mut map, "http://ex/likes");
        let r1 = sid_topic(&mut map, "http://ex/r1");
        let p1 = sid_topic(&mut map, "http://ex/p1");
        let p2 = sid_topic(&mut map, "http://ex/p2");

        let a = map.create_association(likes(ty, r1, p1)).expect("a");
        let b = map.create_association(likes(ty, r1, p2)).expect("b");
        map.handle_role_item_identifier(a.roles[0], &loc("#r"))
            .expect("first claim");
        let err = map
            .handle_role_item_identifier(b.roles[0], &loc("#r"))
            .expect_err("different statements");

        assert!(matches!(
            err,
            TopicMapError::IdentityConflict {
                existing: ConstructKind::Role,
                attempted: ConstructKind::Role,
                ..
            }
        ));
        assert_eq!(map.association_count(), 2);
        assert_eq!(map.role_count(), 2);
        let b = map.association(b.association).expect("b is intact");
        let players: Vec<TopicId> = map.roles_of(b).map(|r| r.player).collect();
        assert_eq!(players, vec![p2]);
    }

    #[test]
    fn role_reifier_does_not_join_associations_with_different_players() {
        let mut map = TopicMap::new();
        let ty = sid_topic(&mut map, "http://ex/likes");
        let r1 = sid_topic(&mut map, "http://ex/r1");
        let p1 = sid_topic(&mut map, "http://ex/p1");
        let p2 = sid_topic(&mut map, "http://ex/p2");
        let reifier = sid_topic(&mut map, "http://ex/about-role");

        let a = map.create_association(likes(ty, r1, p1)).expect("a");
        let b = map.create_association(likes(ty, r1, p2)).expect("b");
        map.handle_role_reifier(a.roles[0], reifier).expect("first");
        let err = map
            .handle_role_reifier(b.roles[0], reifier)
            .expect_err("different statements");

        assert!(matches!(err, TopicMapError::ReifierConflict { .. }));
        assert_eq!(map.role_count(), 2);
    }

    #[test]
    fn role_iid_links_equal_associations() {
        let mut map = TopicMap::new();
        let ty = sid_topic(&mut map, "http://ex/likes");
        let r1 = sid_topic(&mut map, "http://ex/r1");
        let p1 = sid_topic(&mut map, "http://ex/p1");

        let a = map.create_association(likes(ty, r1, p1)).expect("a");
        let b = map.create_association(likes(ty, r1, p1)).expect("b");
        assert_ne!(a.association, b.association);
        map.handle_role_item_identifier(a.roles[0], &loc("#r"))
            .expect("first claim");
        map.handle_role_item_identifier(b.roles[0], &loc("#r"))
            .expect("same statement");

        assert_eq!(map.association_count(), 1);
        assert_eq!(map.role_count(), 1);
        assert_eq!(map.role(b.roles[0]).map(|r| r.id), Some(a.roles[0]));
        let survivor = map.association(b.association).expect("forwarded");
        assert_eq!(survivor.id, a.association);
        assert_eq!(survivor.roles.len(), 1);
    }

    #[test]
    fn topic_sid_on_construct_iid_conflicts() {
        let mut map = TopicMap::new();
        let topic = sid_topic(&mut map, "http://ex/t");
        let ty = sid_topic(&mut map, "http://ex/type");
        let mut draft = occurrence(ty, "x", vec![]);
        draft.item_identifiers.push(loc("http://ex/x"));
        map.create_occurrence(topic, draft).expect("occurrence");

        let err = map
            .create_topic_by_subject_identifier(&loc("http://ex/x"))
            .expect_err("new topic");
        assert!(matches!(
            err,
            TopicMapError::IdentityConflict {
                existing: ConstructKind::Occurrence,
                attempted: ConstructKind::Topic,
                ..
            }
        ));
        let err = map
            .handle_subject_identifier(topic, &loc("http://ex/x"))
            .expect_err("existing topic");
        assert!(matches!(err, TopicMapError::IdentityConflict { .. }));
        assert!(
            map.topic_by_subject_identifier(&loc("http://ex/x"))
                .is_none()
        );
        assert_eq!(map.topic_count(), 2);
    }

    #[test]
    fn unequal_constructs_cannot_share_reifier() {
        let mut map = TopicMap::new();
        let topic = sid_topic(&mut map, "http://ex/t");
        let ty = sid_topic(&mut map, "http://ex/type");
        let reifier = sid_topic(&mut map, "http://ex/r");

        let mut a = occurrence(ty, "a", vec![]);
        a.reifier = Some(reifier);
        let mut b = occurrence(ty, "b", vec![]);
        b.reifier = Some(reifier);

        map.create_occurrence(topic, a).expect("first");
        let err = map.create_occurrence(topic, b).expect_err("second");
        assert!(matches!(err, TopicMapError::ReifierConflict { .. }));
    }

    #[test]
    fn topic_map_reifier_and_iids() {
        let mut map = TopicMap::new();
        let reifier = sid_topic(&mut map, "http://ex/map");
        map.handle_topic_map_item_identifier(&loc("#map"))
            .expect("iid");
        map.handle_topic_map_reifier(reifier).expect("reifier");

        assert_eq!(map.reifier(), Some(reifier));
        assert_eq!(map.reified_by(reifier), Some(ConstructRef::TopicMap));
        assert!(map.item_identifiers().contains(&loc("#map")));
        assert_eq!(
            map.construct_by_item_identifier(&loc("#map")),
            Some(ConstructRef::TopicMap)
        );
    }

    #[test]
    fn stale_topic_handles_are_accepted() {
        let mut map = TopicMap::new();
        let a = sid_topic(&mut map, "http://ex/a");
        let b = sid_topic(&mut map, "http://ex/b");
        let ty = sid_topic(&mut map, "http://ex/type");
        map.handle_subject_identifier(a, &loc("http://ex/b"))
            .expect("merge");

        // `a` is stale now but still usable.
        map.create_occurrence(a, occurrence(ty, "x", vec![]))
            .expect("create");
        assert_eq!(map.occurrences_of(b).count(), 1);
    }
}

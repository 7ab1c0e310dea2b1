//! # Merge Engine
//!
//! Topic merges, construct merges and topic map merges.
//!
//! Merging is where the store keeps its invariants: identity keys stay
//! unique per namespace, every stored handle names a surviving topic, and
//! no topic carries two equal names or occurrences. A merge may cascade:
//! two constructs with different reifiers merge the reifier topics, which
//! may in turn fold their characteristics.

use crate::handler::{
    AssociationDraft, NameDraft, OccurrenceDraft, RoleDraft, TopicMapHandler, VariantDraft,
};
use crate::model::Reifiable;
use crate::signature::{self, Signature};
use crate::topicmap::TopicMap;
use crate::types::{
    AssociationId, ConstructRef, IdentityKind, Locator, NameId, OccurrenceId, RoleId, Scope,
    TopicId, TopicMapError, VariantId,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace};

/// Stateless merge operations over a [`TopicMap`].
pub struct MergeEngine;

impl MergeEngine {
    // =========================================================================
    // TOPICS
    // =========================================================================

    /// Merge `source` into `target` and return the survivor.
    ///
    /// Identity keys, types, characteristics and played roles move to the
    /// target; every reference to the source is rewritten; the source
    /// handle forwards to the target. Fails without mutating anything if
    /// both topics reify constructs that are not equal, or if the merge
    /// would leave a variant scope no wider than its name's.
    pub fn merge_topics(
        map: &mut TopicMap,
        source: TopicId,
        target: TopicId,
    ) -> Result<TopicId, TopicMapError> {
        let source = map.require_topic(source)?;
        let target = map.require_topic(target)?;
        if source == target {
            return Ok(target);
        }

        let source_reified = map.reified_by(source);
        let target_reified = map.reified_by(target);
        let pending = match (source_reified, target_reified) {
            (Some(s), Some(t)) if s != t => {
                if !map.constructs_equal(s, t)? {
                    return Err(TopicMapError::ReifierConflict {
                        reifier: target,
                        existing: t,
                        attempted: s,
                    });
                }
                Some((s, t))
            }
            _ => None,
        };
        Self::check_variant_scopes(map, source, target)?;

        let Some(src) = map.topics.remove(&source) else {
            return Err(TopicMapError::TopicNotFound(source));
        };
        map.topic_forwards.insert(source, target);
        map.stats.topic_merges = map.stats.topic_merges.saturating_add(1);
        debug!(%source, %target, "merging topics");

        for sid in &src.subject_identifiers {
            map.index
                .bind_topic(IdentityKind::SubjectIdentifier, sid.clone(), target);
        }
        for slo in &src.subject_locators {
            map.index
                .bind_topic(IdentityKind::SubjectLocator, slo.clone(), target);
        }
        for iid in &src.item_identifiers {
            map.index
                .bind_topic(IdentityKind::ItemIdentifier, iid.clone(), target);
        }
        for id in &src.names {
            if let Some(name) = map.names.get_mut(id) {
                name.parent = target;
            }
        }
        for id in &src.occurrences {
            if let Some(occurrence) = map.occurrences.get_mut(id) {
                occurrence.parent = target;
            }
        }

        let tgt = map
            .topics
            .get_mut(&target)
            .ok_or(TopicMapError::TopicNotFound(target))?;
        tgt.subject_identifiers.extend(src.subject_identifiers);
        tgt.subject_locators.extend(src.subject_locators);
        tgt.item_identifiers.extend(src.item_identifiers);
        tgt.types.extend(src.types);
        tgt.names.extend(src.names);
        tgt.occurrences.extend(src.occurrences);
        tgt.roles_played.extend(src.roles_played);

        match (source_reified, target_reified) {
            (Some(construct), None) => {
                tgt.reified = Some(construct);
                map.reifiable_mut(construct)?.set_reifier(Some(target));
            }
            (Some(s), Some(_)) if pending.is_some() => {
                map.reifiable_mut(s)?.set_reifier(None);
            }
            _ => {}
        }

        let mut touched = Self::rewrite_topic_references(map, source, target);
        touched.insert(target);
        for topic in touched {
            Self::dedupe_characteristics(map, topic)?;
        }

        if let Some((s, t)) = pending {
            debug!(source = %s, target = %t, "merging constructs reified by merged topics");
            Self::merge_constructs(map, s, t)?;
        }

        Ok(map.resolve(target))
    }

    /// Themes that collapse into one may shrink a variant scope onto its
    /// name's scope.
    fn check_variant_scopes(
        map: &TopicMap,
        from: TopicId,
        to: TopicId,
    ) -> Result<(), TopicMapError> {
        let rewritten = |scope: &Scope| {
            let mut scope = scope.clone();
            scope.replace(from, to);
            scope
        };
        for variant in map.variants.values() {
            let Some(name) = map.names.get(&variant.parent) else {
                continue;
            };
            if !variant.scope.contains(from) && !name.scope.contains(from) {
                continue;
            }
            if !rewritten(&variant.scope).is_strict_superset(&rewritten(&name.scope)) {
                return Err(TopicMapError::VariantScope);
            }
        }
        Ok(())
    }

    /// Replace `from` with `to` in every stored topic reference. Returns
    /// the topics whose names or occurrences changed and need deduping.
    fn rewrite_topic_references(
        map: &mut TopicMap,
        from: TopicId,
        to: TopicId,
    ) -> BTreeSet<TopicId> {
        let mut touched = BTreeSet::new();

        for topic in map.topics.values_mut() {
            if topic.types.remove(&from) {
                topic.types.insert(to);
            }
        }
        for association in map.associations.values_mut() {
            if association.type_id == from {
                association.type_id = to;
            }
            association.scope.replace(from, to);
        }
        for role in map.roles.values_mut() {
            if role.type_id == from {
                role.type_id = to;
            }
            if role.player == from {
                role.player = to;
            }
        }
        for name in map.names.values_mut() {
            let mut changed = name.scope.replace(from, to);
            if name.type_id == from {
                name.type_id = to;
                changed = true;
            }
            if changed {
                touched.insert(name.parent);
            }
        }
        for occurrence in map.occurrences.values_mut() {
            let mut changed = occurrence.scope.replace(from, to);
            if occurrence.type_id == from {
                occurrence.type_id = to;
                changed = true;
            }
            if changed {
                touched.insert(occurrence.parent);
            }
        }

        let mut touched_names = BTreeSet::new();
        for variant in map.variants.values_mut() {
            if variant.scope.replace(from, to) {
                touched_names.insert(variant.parent);
            }
        }
        for name in touched_names {
            if let Some(name) = map.names.get(&name) {
                touched.insert(name.parent);
            }
        }

        touched
    }

    /// Fold equal names, occurrences and variants of one topic.
    ///
    /// The construct with the lowest handle survives each group.
    pub(crate) fn dedupe_characteristics(
        map: &mut TopicMap,
        topic: TopicId,
    ) -> Result<(), TopicMapError> {
        let topic = map.resolve(topic);
        let Some(entry) = map.topics.get(&topic) else {
            return Ok(());
        };
        let names: Vec<NameId> = entry.names.iter().copied().collect();
        let occurrences: Vec<OccurrenceId> = entry.occurrences.iter().copied().collect();

        let mut seen: BTreeMap<Signature, ConstructRef> = BTreeMap::new();
        for id in occurrences {
            let Some(occurrence) = map.occurrences.get(&id) else {
                continue;
            };
            let sig = signature::occurrence(occurrence);
            match seen.get(&sig) {
                Some(&keep) => {
                    Self::merge_constructs(map, ConstructRef::Occurrence(id), keep)?;
                }
                None => {
                    seen.insert(sig, ConstructRef::Occurrence(id));
                }
            }
        }

        seen.clear();
        let mut survivors = Vec::new();
        for id in names {
            let Some(name) = map.names.get(&id) else {
                continue;
            };
            let sig = signature::name(name);
            match seen.get(&sig) {
                Some(&keep) => {
                    Self::merge_constructs(map, ConstructRef::Name(id), keep)?;
                }
                None => {
                    seen.insert(sig, ConstructRef::Name(id));
                    survivors.push(id);
                }
            }
        }

        for id in survivors {
            if let ConstructRef::Name(id) = map.resolve_construct(ConstructRef::Name(id)) {
                Self::dedupe_variants(map, id)?;
            }
        }
        Ok(())
    }

    fn dedupe_variants(map: &mut TopicMap, name: NameId) -> Result<(), TopicMapError> {
        let Some(entry) = map.names.get(&name) else {
            return Ok(());
        };
        let variants: Vec<VariantId> = entry.variants.iter().copied().collect();

        let mut seen: BTreeMap<Signature, ConstructRef> = BTreeMap::new();
        for id in variants {
            let Some(variant) = map.variants.get(&id) else {
                continue;
            };
            let sig = signature::variant(variant);
            match seen.get(&sig) {
                Some(&keep) => {
                    Self::merge_constructs(map, ConstructRef::Variant(id), keep)?;
                }
                None => {
                    seen.insert(sig, ConstructRef::Variant(id));
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // CONSTRUCTS
    // =========================================================================

    /// Merge construct `source` into the equal construct `target` and
    /// return the survivor.
    ///
    /// Equality is the caller's judgment; this only checks the kinds.
    pub fn merge_constructs(
        map: &mut TopicMap,
        source: ConstructRef,
        target: ConstructRef,
    ) -> Result<ConstructRef, TopicMapError> {
        let source = map.resolve_construct(source);
        let target = map.resolve_construct(target);
        if source == target {
            return Ok(target);
        }
        if let (ConstructRef::Role(s), ConstructRef::Role(t)) = (source, target) {
            if let Some(survivor) = Self::merge_role_parents(map, s, t)? {
                return Ok(survivor);
            }
        }

        // Forward first: cascades triggered below may look the source up.
        map.construct_forwards.insert(source, target);
        map.stats.construct_merges = map.stats.construct_merges.saturating_add(1);
        trace!(%source, %target, "merging constructs");

        match (source, target) {
            (ConstructRef::Association(s), ConstructRef::Association(t)) => {
                Self::merge_associations(map, s, t)?;
            }
            (ConstructRef::Role(s), ConstructRef::Role(t)) => {
                Self::merge_roles(map, s, t)?;
            }
            (ConstructRef::Name(s), ConstructRef::Name(t)) => {
                Self::merge_names(map, s, t)?;
            }
            (ConstructRef::Occurrence(s), ConstructRef::Occurrence(t)) => {
                Self::merge_occurrences(map, s, t)?;
            }
            (ConstructRef::Variant(s), ConstructRef::Variant(t)) => {
                Self::merge_variants(map, s, t)?;
            }
            _ => {
                map.construct_forwards.remove(&source);
                return Err(TopicMapError::IncompatibleMerge {
                    merged: source,
                    survivor: target,
                });
            }
        }

        Ok(map.resolve_construct(target))
    }

    /// Roles of two different associations merge by merging the
    /// associations; a role is never moved out of its own association.
    ///
    /// Returns `None` when both roles already share an association.
    fn merge_role_parents(
        map: &mut TopicMap,
        source: RoleId,
        target: RoleId,
    ) -> Result<Option<ConstructRef>, TopicMapError> {
        let parent = |map: &TopicMap, role: RoleId| {
            map.roles
                .get(&role)
                .map(|r| map.resolve_association(r.parent))
                .ok_or(TopicMapError::ConstructNotFound(ConstructRef::Role(role)))
        };
        let (sp, tp) = (parent(map, source)?, parent(map, target)?);
        if sp == tp {
            return Ok(None);
        }

        Self::merge_constructs(
            map,
            ConstructRef::Association(sp),
            ConstructRef::Association(tp),
        )?;
        let source = map.resolve_construct(ConstructRef::Role(source));
        let target = map.resolve_construct(ConstructRef::Role(target));
        Self::merge_constructs(map, source, target).map(Some)
    }

    fn merge_associations(
        map: &mut TopicMap,
        source: AssociationId,
        target: AssociationId,
    ) -> Result<(), TopicMapError> {
        let Some(src) = map.associations.remove(&source) else {
            return Err(TopicMapError::ConstructNotFound(ConstructRef::Association(
                source,
            )));
        };
        let target_roles: Vec<(RoleId, Signature, TopicId)> = map
            .associations
            .get(&target)
            .into_iter()
            .flat_map(|a| a.roles.iter())
            .filter_map(|id| {
                map.roles
                    .get(id)
                    .map(|r| (*id, signature::role(r), map.resolve(r.player)))
            })
            .collect();

        // Pair each source role with an unused target role of equal type,
        // preferring one with the same player.
        let mut used: BTreeSet<RoleId> = BTreeSet::new();
        let mut pairs = Vec::new();
        let mut orphans = Vec::new();
        for id in &src.roles {
            let Some(role) = map.roles.get(id) else {
                continue;
            };
            let sig = signature::role(role);
            let player = map.resolve(role.player);
            let free: Vec<&(RoleId, Signature, TopicId)> = target_roles
                .iter()
                .filter(|(candidate, s, _)| *s == sig && !used.contains(candidate))
                .collect();
            match free
                .iter()
                .find(|(_, _, p)| *p == player)
                .or_else(|| free.first())
            {
                Some(&&(candidate, _, _)) => {
                    used.insert(candidate);
                    pairs.push((*id, candidate));
                }
                None => orphans.push(*id),
            }
        }

        for id in orphans {
            if let Some(role) = map.roles.get_mut(&id) {
                role.parent = target;
            }
            if let Some(association) = map.associations.get_mut(&target) {
                association.roles.insert(id);
            }
        }

        Self::absorb(
            map,
            src.item_identifiers,
            src.reifier,
            ConstructRef::Association(target),
        )?;

        for (s, t) in pairs {
            Self::merge_constructs(map, ConstructRef::Role(s), ConstructRef::Role(t))?;
        }
        Ok(())
    }

    fn merge_roles(map: &mut TopicMap, source: RoleId, target: RoleId) -> Result<(), TopicMapError> {
        let Some(src) = map.roles.remove(&source) else {
            return Err(TopicMapError::ConstructNotFound(ConstructRef::Role(source)));
        };
        if let Some(association) = map.associations.get_mut(&src.parent) {
            association.roles.remove(&source);
        }
        let player = map.resolve(src.player);
        if let Some(player) = map.topics.get_mut(&player) {
            player.roles_played.remove(&source);
        }
        Self::absorb(map, src.item_identifiers, src.reifier, ConstructRef::Role(target))
    }

    fn merge_names(map: &mut TopicMap, source: NameId, target: NameId) -> Result<(), TopicMapError> {
        let Some(src) = map.names.remove(&source) else {
            return Err(TopicMapError::ConstructNotFound(ConstructRef::Name(source)));
        };
        let parent = map.resolve(src.parent);
        if let Some(topic) = map.topics.get_mut(&parent) {
            topic.names.remove(&source);
        }

        let mut target_variants: BTreeMap<Signature, VariantId> = map
            .names
            .get(&target)
            .into_iter()
            .flat_map(|n| n.variants.iter())
            .filter_map(|id| map.variants.get(id).map(|v| (signature::variant(v), *id)))
            .collect();

        let mut pairs = Vec::new();
        for id in &src.variants {
            let Some(variant) = map.variants.get_mut(id) else {
                continue;
            };
            let sig = signature::variant(variant);
            match target_variants.get(&sig) {
                Some(&existing) => pairs.push((*id, existing)),
                None => {
                    variant.parent = target;
                    target_variants.insert(sig, *id);
                    if let Some(name) = map.names.get_mut(&target) {
                        name.variants.insert(*id);
                    }
                }
            }
        }

        Self::absorb(map, src.item_identifiers, src.reifier, ConstructRef::Name(target))?;

        for (s, t) in pairs {
            Self::merge_constructs(map, ConstructRef::Variant(s), ConstructRef::Variant(t))?;
        }
        Ok(())
    }

    fn merge_occurrences(
        map: &mut TopicMap,
        source: OccurrenceId,
        target: OccurrenceId,
    ) -> Result<(), TopicMapError> {
        let Some(src) = map.occurrences.remove(&source) else {
            return Err(TopicMapError::ConstructNotFound(ConstructRef::Occurrence(
                source,
            )));
        };
        let parent = map.resolve(src.parent);
        if let Some(topic) = map.topics.get_mut(&parent) {
            topic.occurrences.remove(&source);
        }
        Self::absorb(
            map,
            src.item_identifiers,
            src.reifier,
            ConstructRef::Occurrence(target),
        )
    }

    fn merge_variants(
        map: &mut TopicMap,
        source: VariantId,
        target: VariantId,
    ) -> Result<(), TopicMapError> {
        let Some(src) = map.variants.remove(&source) else {
            return Err(TopicMapError::ConstructNotFound(ConstructRef::Variant(source)));
        };
        if let Some(name) = map.names.get_mut(&src.parent) {
            name.variants.remove(&source);
        }
        Self::absorb(map, src.item_identifiers, src.reifier, ConstructRef::Variant(target))
    }

    /// Move the item identifiers and reifier of a removed construct onto
    /// its survivor.
    fn absorb(
        map: &mut TopicMap,
        item_identifiers: BTreeSet<Locator>,
        reifier: Option<TopicId>,
        target: ConstructRef,
    ) -> Result<(), TopicMapError> {
        for iid in item_identifiers {
            map.index.bind_construct(iid.clone(), target);
            map.reifiable_mut(target)?.item_identifiers_mut().insert(iid);
        }

        let Some(reifier) = reifier else {
            return Ok(());
        };
        let reifier = map.resolve(reifier);
        if let Some(topic) = map.topics.get_mut(&reifier) {
            topic.reified = None;
        }

        let current = map.reifiable(target)?.reifier().map(|r| map.resolve(r));
        match current {
            None => {
                map.reifiable_mut(target)?.set_reifier(Some(reifier));
                if let Some(topic) = map.topics.get_mut(&reifier) {
                    topic.reified = Some(target);
                }
            }
            Some(existing) if existing != reifier => {
                Self::merge_topics(map, reifier, existing)?;
            }
            Some(_) => {
                if let Some(topic) = map.topics.get_mut(&reifier) {
                    topic.reified = Some(target);
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// TOPIC MAP MERGE
// =============================================================================

fn iids<R: Reifiable>(construct: &R) -> Vec<Locator> {
    construct.item_identifiers().iter().cloned().collect()
}

/// Merge every construct of `source` into `target` through the handler
/// contract.
///
/// Topics are matched by identity: each source topic is re-created in the
/// target through its keys, so topics sharing a key merge. Characteristics
/// and associations are then re-created and deduplicated as on ingest.
/// The source is left untouched.
pub fn merge_topic_maps<H: TopicMapHandler>(
    target: &mut H,
    source: &TopicMap,
) -> Result<(), TopicMapError> {
    let mut topics: BTreeMap<TopicId, TopicId> = BTreeMap::new();

    for topic in source.topics() {
        let mut handle: Option<TopicId> = None;
        for sid in &topic.subject_identifiers {
            handle = Some(match handle {
                None => target.create_topic_by_subject_identifier(sid)?,
                Some(h) => target.handle_subject_identifier(h, sid)?,
            });
        }
        for slo in &topic.subject_locators {
            handle = Some(match handle {
                None => target.create_topic_by_subject_locator(slo)?,
                Some(h) => target.handle_subject_locator(h, slo)?,
            });
        }
        for iid in &topic.item_identifiers {
            handle = Some(match handle {
                None => target.create_topic_by_item_identifier(iid)?,
                Some(h) => target.handle_item_identifier(h, iid)?,
            });
        }
        let handle = match handle {
            Some(h) => h,
            None => target.create_topic()?,
        };
        topics.insert(topic.id, handle);
    }

    let map_topic = |id: TopicId| -> Result<TopicId, TopicMapError> {
        topics
            .get(&source.resolve(id))
            .copied()
            .ok_or(TopicMapError::TopicNotFound(id))
    };
    let map_scope = |scope: &Scope| -> Result<Vec<TopicId>, TopicMapError> {
        scope.themes().map(&map_topic).collect()
    };
    let map_reifier = |reifier: Option<TopicId>| -> Result<Option<TopicId>, TopicMapError> {
        reifier.map(&map_topic).transpose()
    };

    for topic in source.topics() {
        let instance = map_topic(topic.id)?;
        for &type_id in &topic.types {
            target.handle_type_instance(instance, map_topic(type_id)?)?;
        }
    }

    for topic in source.topics() {
        let parent = map_topic(topic.id)?;

        for name in source.names_of(topic.id) {
            let mut variants = Vec::new();
            for variant in source.variants_of(name) {
                variants.push(VariantDraft {
                    literal: variant.literal.clone(),
                    scope: map_scope(&variant.scope)?,
                    reifier: map_reifier(variant.reifier)?,
                    item_identifiers: iids(variant),
                });
            }
            target.create_name(
                parent,
                NameDraft {
                    type_id: map_topic(name.type_id)?,
                    value: name.value.clone(),
                    scope: map_scope(&name.scope)?,
                    reifier: map_reifier(name.reifier)?,
                    item_identifiers: iids(name),
                    variants,
                },
            )?;
        }

        for occurrence in source.occurrences_of(topic.id) {
            target.create_occurrence(
                parent,
                OccurrenceDraft {
                    type_id: map_topic(occurrence.type_id)?,
                    literal: occurrence.literal.clone(),
                    scope: map_scope(&occurrence.scope)?,
                    reifier: map_reifier(occurrence.reifier)?,
                    item_identifiers: iids(occurrence),
                },
            )?;
        }
    }

    for association in source.associations() {
        let roles: Vec<_> = source.roles_of(association).collect();
        let mut drafts = Vec::with_capacity(roles.len());
        for role in &roles {
            drafts.push(RoleDraft {
                type_id: map_topic(role.type_id)?,
                player: map_topic(role.player)?,
            });
        }

        let created = target.create_association(AssociationDraft {
            type_id: map_topic(association.type_id)?,
            scope: map_scope(&association.scope)?,
            reifier: map_reifier(association.reifier)?,
            item_identifiers: iids(association),
            roles: drafts,
        })?;

        for (role, &stored) in roles.iter().zip(&created.roles) {
            for iid in &role.item_identifiers {
                target.handle_role_item_identifier(stored, iid)?;
            }
            if let Some(reifier) = map_reifier(role.reifier)? {
                target.handle_role_reifier(stored, reifier)?;
            }
        }
    }

    for iid in source.item_identifiers() {
        target.handle_topic_map_item_identifier(iid)?;
    }
    if let Some(reifier) = map_reifier(source.reifier())? {
        target.handle_topic_map_reifier(reifier)?;
    }

    debug!(topics = topics.len(), "merged topic map");
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

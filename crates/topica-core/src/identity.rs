//! # Identity Resolver
//!
//! The identity-key indexes of a store and the decision procedure run on
//! every identity assertion.
//!
//! The resolver only decides. It answers "does this address already denote
//! a topic, and which one?"; the store then performs the merge or the
//! insert. Lookups follow a fixed priority:
//!
//! | Assertion | First lookup     | Then           |
//! |-----------|------------------|----------------|
//! | IID       | topic by IID     | topic by SID   |
//! | SID       | topic by SID     | topic by IID   |
//! | SLO       | topic by SLO     | none           |
//!
//! An IID and a SID on the same address denote the same subject, hence the
//! cross lookup. Subject locators live in their own namespace.
//!
//! Non-topic constructs share the IID namespace with topics, and through
//! the cross lookup the SID namespace too. An address cannot denote both a
//! topic and a non-topic construct; that collision is the one identity
//! clash that is never merged, whichever side claims the address first.

use crate::types::{ConstructKind, ConstructRef, IdentityKind, Locator, TopicId, TopicMapError};
use std::collections::BTreeMap;

/// Outcome of resolving an identity assertion for an existing topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The topic already owns the key.
    Unchanged,
    /// No topic owns the address; add the key to the asserting topic.
    Assign,
    /// Another topic denotes the same subject; merge the asserting topic
    /// into it, then assert again on the survivor.
    MergeInto(TopicId),
}

/// The three topic identity indexes plus the construct IID index.
#[derive(Debug, Clone, Default)]
pub struct IdentityIndex {
    by_subject_identifier: BTreeMap<Locator, TopicId>,
    by_subject_locator: BTreeMap<Locator, TopicId>,
    by_item_identifier: BTreeMap<Locator, TopicId>,
    constructs: BTreeMap<Locator, ConstructRef>,
}

impl IdentityIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // LOOKUPS
    // =========================================================================

    /// The topic holding `address` in the namespace of `kind`.
    #[must_use]
    pub fn topic(&self, kind: IdentityKind, address: &Locator) -> Option<TopicId> {
        self.namespace(kind).get(address).copied()
    }

    /// The non-topic construct holding `address` as item identifier.
    #[must_use]
    pub fn construct(&self, address: &Locator) -> Option<ConstructRef> {
        self.constructs.get(address).copied()
    }

    /// The topic denoted by `address` when used as an item identifier:
    /// the IID owner, else the SID owner.
    #[must_use]
    pub fn topic_denoted_by(&self, address: &Locator) -> Option<TopicId> {
        self.topic(IdentityKind::ItemIdentifier, address)
            .or_else(|| self.topic(IdentityKind::SubjectIdentifier, address))
    }

    // =========================================================================
    // DECISIONS
    // =========================================================================

    /// Find the topic an identity reference denotes, if any.
    ///
    /// Used by the `create_topic_by_*` operations: a hit means "use this
    /// topic", a miss means "create one".
    pub fn lookup_reference(
        &self,
        kind: IdentityKind,
        address: &Locator,
    ) -> Result<Option<TopicId>, TopicMapError> {
        match kind {
            IdentityKind::ItemIdentifier => {
                self.reject_construct(address)?;
                Ok(self.topic_denoted_by(address))
            }
            IdentityKind::SubjectIdentifier => {
                self.reject_construct(address)?;
                Ok(self
                    .topic(IdentityKind::SubjectIdentifier, address)
                    .or_else(|| self.topic(IdentityKind::ItemIdentifier, address)))
            }
            IdentityKind::SubjectLocator => Ok(self.topic(IdentityKind::SubjectLocator, address)),
        }
    }

    /// Decide what asserting `address` as a `kind` key of `topic` means.
    ///
    /// `topic` must already be canonical.
    pub fn resolve(
        &self,
        topic: TopicId,
        kind: IdentityKind,
        address: &Locator,
    ) -> Result<Resolution, TopicMapError> {
        // IIDs and SIDs share the address space of construct IIDs.
        if kind != IdentityKind::SubjectLocator {
            self.reject_construct(address)?;
        }

        if let Some(owner) = self.topic(kind, address) {
            return Ok(if owner == topic {
                Resolution::Unchanged
            } else {
                Resolution::MergeInto(owner)
            });
        }

        let cross = match kind {
            IdentityKind::ItemIdentifier => self.topic(IdentityKind::SubjectIdentifier, address),
            IdentityKind::SubjectIdentifier => self.topic(IdentityKind::ItemIdentifier, address),
            IdentityKind::SubjectLocator => None,
        };

        Ok(match cross {
            Some(owner) if owner != topic => Resolution::MergeInto(owner),
            _ => Resolution::Assign,
        })
    }

    /// Check that a non-topic construct may claim `address`.
    ///
    /// Returns the construct already holding it, if any. An address held
    /// by a topic (as IID or SID) is a fatal conflict.
    pub fn check_construct_claim(
        &self,
        claimant: ConstructRef,
        address: &Locator,
    ) -> Result<Option<ConstructRef>, TopicMapError> {
        if self.topic_denoted_by(address).is_some() {
            return Err(TopicMapError::IdentityConflict {
                address: address.clone(),
                existing: ConstructKind::Topic,
                attempted: claimant.kind(),
            });
        }
        Ok(self.construct(address))
    }

    fn reject_construct(&self, address: &Locator) -> Result<(), TopicMapError> {
        match self.constructs.get(address) {
            Some(existing) => Err(TopicMapError::IdentityConflict {
                address: address.clone(),
                existing: existing.kind(),
                attempted: ConstructKind::Topic,
            }),
            None => Ok(()),
        }
    }

    // =========================================================================
    // MUTATIONS (store only)
    // =========================================================================

    /// Bind `address` to `topic` in the namespace of `kind`.
    pub(crate) fn bind_topic(&mut self, kind: IdentityKind, address: Locator, topic: TopicId) {
        self.namespace_mut(kind).insert(address, topic);
    }

    /// Bind `address` to a non-topic construct.
    pub(crate) fn bind_construct(&mut self, address: Locator, construct: ConstructRef) {
        self.constructs.insert(address, construct);
    }

    fn namespace(&self, kind: IdentityKind) -> &BTreeMap<Locator, TopicId> {
        match kind {
            IdentityKind::ItemIdentifier => &self.by_item_identifier,
            IdentityKind::SubjectIdentifier => &self.by_subject_identifier,
            IdentityKind::SubjectLocator => &self.by_subject_locator,
        }
    }

    fn namespace_mut(&mut self, kind: IdentityKind) -> &mut BTreeMap<Locator, TopicId> {
        match kind {
            IdentityKind::ItemIdentifier => &mut self.by_item_identifier,
            IdentityKind::SubjectIdentifier => &mut self.by_subject_identifier,
            IdentityKind::SubjectLocator => &mut self.by_subject_locator,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AssociationId;

    fn loc(s: &str) -> Locator {
        Locator::new(s)
    }

    #[test]
    fn unknown_address_is_assigned() {
        let index = IdentityIndex::new();
        let resolution = index
            .resolve(TopicId(1), IdentityKind::SubjectIdentifier, &loc("http://ex/a"))
            .expect("resolve");
        assert_eq!(resolution, Resolution::Assign);
    }

    #[test]
    fn own_key_is_unchanged() {
        let mut index = IdentityIndex::new();
        index.bind_topic(IdentityKind::SubjectIdentifier, loc("http://ex/a"), TopicId(1));
        let resolution = index
            .resolve(TopicId(1), IdentityKind::SubjectIdentifier, &loc("http://ex/a"))
            .expect("resolve");
        assert_eq!(resolution, Resolution::Unchanged);
    }

    #[test]
    fn same_key_elsewhere_merges() {
        let mut index = IdentityIndex::new();
        index.bind_topic(IdentityKind::ItemIdentifier, loc("#a"), TopicId(1));
        let resolution = index
            .resolve(TopicId(2), IdentityKind::ItemIdentifier, &loc("#a"))
            .expect("resolve");
        assert_eq!(resolution, Resolution::MergeInto(TopicId(1)));
    }

    #[test]
    fn iid_matches_sid_on_same_address() {
        let mut index = IdentityIndex::new();
        index.bind_topic(IdentityKind::SubjectIdentifier, loc("http://ex/a"), TopicId(1));

        let resolution = index
            .resolve(TopicId(2), IdentityKind::ItemIdentifier, &loc("http://ex/a"))
            .expect("resolve");
        assert_eq!(resolution, Resolution::MergeInto(TopicId(1)));

        // The owner asserting the IID on its own SID address just adds it.
        let resolution = index
            .resolve(TopicId(1), IdentityKind::ItemIdentifier, &loc("http://ex/a"))
            .expect("resolve");
        assert_eq!(resolution, Resolution::Assign);
    }

    #[test]
    fn subject_locators_do_not_cross_namespaces() {
        let mut index = IdentityIndex::new();
        index.bind_topic(IdentityKind::SubjectIdentifier, loc("http://ex/a"), TopicId(1));
        let resolution = index
            .resolve(TopicId(2), IdentityKind::SubjectLocator, &loc("http://ex/a"))
            .expect("resolve");
        assert_eq!(resolution, Resolution::Assign);
    }

    #[test]
    fn topic_iid_on_construct_address_conflicts() {
        let mut index = IdentityIndex::new();
        index.bind_construct(loc("#x"), ConstructRef::Association(AssociationId(5)));

        let err = index
            .resolve(TopicId(1), IdentityKind::ItemIdentifier, &loc("#x"))
            .expect_err("conflict");
        assert!(matches!(
            err,
            TopicMapError::IdentityConflict {
                existing: ConstructKind::Association,
                attempted: ConstructKind::Topic,
                ..
            }
        ));
        assert!(
            index
                .lookup_reference(IdentityKind::ItemIdentifier, &loc("#x"))
                .is_err()
        );
    }

    #[test]
    fn topic_sid_on_construct_address_conflicts() {
        let mut index = IdentityIndex::new();
        index.bind_construct(loc("http://ex/x"), ConstructRef::Association(AssociationId(5)));

        let err = index
            .resolve(TopicId(1), IdentityKind::SubjectIdentifier, &loc("http://ex/x"))
            .expect_err("conflict");
        assert!(matches!(
            err,
            TopicMapError::IdentityConflict {
                existing: ConstructKind::Association,
                attempted: ConstructKind::Topic,
                ..
            }
        ));
        assert!(
            index
                .lookup_reference(IdentityKind::SubjectIdentifier, &loc("http://ex/x"))
                .is_err()
        );
        // Subject locators are a namespace of their own.
        assert_eq!(
            index
                .lookup_reference(IdentityKind::SubjectLocator, &loc("http://ex/x"))
                .expect("lookup"),
            None
        );
    }

    #[test]
    fn construct_claim_on_topic_address_conflicts() {
        let mut index = IdentityIndex::new();
        index.bind_topic(IdentityKind::SubjectIdentifier, loc("http://ex/a"), TopicId(1));

        let err = index
            .check_construct_claim(
                ConstructRef::Association(AssociationId(2)),
                &loc("http://ex/a"),
            )
            .expect_err("conflict");
        assert!(matches!(err, TopicMapError::IdentityConflict { .. }));
    }

    #[test]
    fn lookup_reference_prefers_own_namespace() {
        let mut index = IdentityIndex::new();
        index.bind_topic(IdentityKind::ItemIdentifier, loc("http://ex/a"), TopicId(1));
        index.bind_topic(IdentityKind::SubjectIdentifier, loc("http://ex/a"), TopicId(2));

        let by_sid = index
            .lookup_reference(IdentityKind::SubjectIdentifier, &loc("http://ex/a"))
            .expect("lookup");
        let by_iid = index
            .lookup_reference(IdentityKind::ItemIdentifier, &loc("http://ex/a"))
            .expect("lookup");
        assert_eq!(by_sid, Some(TopicId(2)));
        assert_eq!(by_iid, Some(TopicId(1)));
    }
}

//! # Data Model
//!
//! The stored form of every construct of a topic map.
//!
//! Topics are nodes. Associations, roles, names, occurrences and variants
//! are statements about topics; they reference topics only through
//! [`TopicId`] handles, never by pointer. The store rewrites these handles
//! when topics merge, so a stored construct always names surviving topics.

use crate::types::{
    AssociationId, ConstructRef, Literal, Locator, NameId, OccurrenceId, RoleId, Scope, TopicId,
    VariantId,
};
use std::collections::BTreeSet;

// =============================================================================
// SHARED TRAITS
// =============================================================================

/// A construct that can carry item identifiers and a reifier.
pub trait Reifiable {
    /// The construct's own reference.
    fn construct(&self) -> ConstructRef;

    fn item_identifiers(&self) -> &BTreeSet<Locator>;

    fn item_identifiers_mut(&mut self) -> &mut BTreeSet<Locator>;

    fn reifier(&self) -> Option<TopicId>;

    fn set_reifier(&mut self, reifier: Option<TopicId>);
}

/// A construct with exactly one type.
pub trait Typed {
    fn type_id(&self) -> TopicId;
}

/// A construct valid only within a scope.
pub trait Scoped {
    fn scope(&self) -> &Scope;
}

macro_rules! impl_reifiable {
    ($ty:ident, $variant:ident) => {
        impl Reifiable for $ty {
            fn construct(&self) -> ConstructRef {
                ConstructRef::$variant(self.id)
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
    };
}

macro_rules! impl_typed {
    ($ty:ident) => {
        impl Typed for $ty {
            fn type_id(&self) -> TopicId {
                self.type_id
            }
        }
    };
}

macro_rules! impl_scoped {
    ($ty:ident) => {
        impl Scoped for $ty {
            fn scope(&self) -> &Scope {
                &self.scope
            }
        }
    };
}

// =============================================================================
// TOPIC
// =============================================================================

/// A node of the topic map.
///
/// The three identity sets are disjoint namespaces. Within one store a
/// locator appears in at most one topic's set of a given kind; the store
/// merges topics rather than break that rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub id: TopicId,
    pub subject_identifiers: BTreeSet<Locator>,
    pub subject_locators: BTreeSet<Locator>,
    pub item_identifiers: BTreeSet<Locator>,
    pub types: BTreeSet<TopicId>,
    pub names: BTreeSet<NameId>,
    pub occurrences: BTreeSet<OccurrenceId>,
    /// Derived back-reference; the role's `player` field is primary.
    pub roles_played: BTreeSet<RoleId>,
    /// The construct this topic reifies, if any.
    pub reified: Option<ConstructRef>,
}

impl Topic {
    /// Create a topic without identities or characteristics.
    #[must_use]
    pub fn new(id: TopicId) -> Self {
        Self {
            id,
            subject_identifiers: BTreeSet::new(),
            subject_locators: BTreeSet::new(),
            item_identifiers: BTreeSet::new(),
            types: BTreeSet::new(),
            names: BTreeSet::new(),
            occurrences: BTreeSet::new(),
            roles_played: BTreeSet::new(),
            reified: None,
        }
    }

    /// Check if the topic has no identity key of any kind.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.subject_identifiers.is_empty()
            && self.subject_locators.is_empty()
            && self.item_identifiers.is_empty()
    }
}

// =============================================================================
// ASSOCIATION & ROLE
// =============================================================================

/// An n-ary typed relationship between topics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    pub id: AssociationId,
    pub type_id: TopicId,
    pub scope: Scope,
    pub roles: BTreeSet<RoleId>,
    pub reifier: Option<TopicId>,
    pub item_identifiers: BTreeSet<Locator>,
}

/// The participation of one player in an association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub id: RoleId,
    pub parent: AssociationId,
    pub type_id: TopicId,
    pub player: TopicId,
    pub reifier: Option<TopicId>,
    pub item_identifiers: BTreeSet<Locator>,
}

impl_reifiable!(Association, Association);
impl_typed!(Association);
impl_scoped!(Association);

impl_reifiable!(Role, Role);
impl_typed!(Role);

// =============================================================================
// NAME & VARIANT
// =============================================================================

/// A name of a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Name {
    pub id: NameId,
    pub parent: TopicId,
    pub type_id: TopicId,
    pub value: String,
    pub scope: Scope,
    pub variants: BTreeSet<VariantId>,
    pub reifier: Option<TopicId>,
    pub item_identifiers: BTreeSet<Locator>,
}

/// An alternative form of a name for a narrower scope.
///
/// The stored scope always contains the owning name's scope plus at least
/// one more theme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub id: VariantId,
    pub parent: NameId,
    pub literal: Literal,
    pub scope: Scope,
    pub reifier: Option<TopicId>,
    pub item_identifiers: BTreeSet<Locator>,
}

impl_reifiable!(Name, Name);
impl_typed!(Name);
impl_scoped!(Name);

impl_reifiable!(Variant, Variant);
impl_scoped!(Variant);

// =============================================================================
// OCCURRENCE
// =============================================================================

/// A typed literal property of a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence {
    pub id: OccurrenceId,
    pub parent: TopicId,
    pub type_id: TopicId,
    pub literal: Literal,
    pub scope: Scope,
    pub reifier: Option<TopicId>,
    pub item_identifiers: BTreeSet<Locator>,
}

impl_reifiable!(Occurrence, Occurrence);
impl_typed!(Occurrence);
impl_scoped!(Occurrence);

//! # Signature Generator
//!
//! Canonical fingerprints for non-topic constructs.
//!
//! Two constructs of the same kind denote the same statement when their
//! signatures are byte-equal. Signatures are built from the canonical
//! handles of the topics a construct references, so they are only
//! meaningful inside one store, and only while those handles are current
//! (the store rewrites handles on every topic merge).
//!
//! Layout, with `|` between parts:
//!
//! | Construct   | Parts                                          |
//! |-------------|------------------------------------------------|
//! | occurrence  | `o`, type, scope, literal                      |
//! | name        | `n`, type, scope, value                        |
//! | variant     | `v`, scope, literal                            |
//! | role        | `r`, type, type                                |
//! | association | `a`, type, scope, sorted role signatures       |
//!
//! Free-text parts are length-prefixed, so no value can forge a separator.
//! Role signatures ignore the player: within an association merge, roles
//! are paired by type alone.

use crate::model::{Association, Name, Occurrence, Role, Scoped, Typed, Variant};
use crate::types::{Literal, Scope, TopicId};
use std::fmt;

/// A canonical construct fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Signature(String);

impl Signature {
    /// Get the signature text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// PARTS
// =============================================================================

fn type_part(type_id: TopicId) -> String {
    type_id.0.to_string()
}

/// Theme handles, ascending, comma-separated. Empty for the unconstrained
/// scope.
fn scope_part(scope: &Scope) -> String {
    scope
        .themes()
        .map(|theme| theme.0.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn text_part(text: &str) -> String {
    format!("{}:{}", text.len(), text)
}

fn literal_part(literal: &Literal) -> String {
    format!(
        "{}^{}",
        text_part(&literal.value),
        text_part(literal.datatype.as_str())
    )
}

// =============================================================================
// CONSTRUCT SIGNATURES
// =============================================================================

/// Signature of an occurrence.
#[must_use]
pub fn occurrence(occurrence: &Occurrence) -> Signature {
    occurrence_parts(occurrence.type_id(), occurrence.scope(), &occurrence.literal)
}

/// Signature of an occurrence that is not stored yet.
#[must_use]
pub fn occurrence_parts(type_id: TopicId, scope: &Scope, literal: &Literal) -> Signature {
    Signature(format!(
        "o|{}|{}|{}",
        type_part(type_id),
        scope_part(scope),
        literal_part(literal)
    ))
}

/// Signature of a name.
#[must_use]
pub fn name(name: &Name) -> Signature {
    name_parts(name.type_id(), name.scope(), &name.value)
}

/// Signature of a name that is not stored yet.
#[must_use]
pub fn name_parts(type_id: TopicId, scope: &Scope, value: &str) -> Signature {
    Signature(format!(
        "n|{}|{}|{}",
        type_part(type_id),
        scope_part(scope),
        text_part(value)
    ))
}

/// Signature of a variant.
#[must_use]
pub fn variant(variant: &Variant) -> Signature {
    variant_parts(variant.scope(), &variant.literal)
}

/// Signature of a variant that is not stored yet.
#[must_use]
pub fn variant_parts(scope: &Scope, literal: &Literal) -> Signature {
    Signature(format!("v|{}|{}", scope_part(scope), literal_part(literal)))
}

/// Signature of a role.
#[must_use]
pub fn role(role: &Role) -> Signature {
    role_parts(role.type_id())
}

/// Signature of a role given only its type.
#[must_use]
pub fn role_parts(type_id: TopicId) -> Signature {
    let type_id = type_part(type_id);
    Signature(format!("r|{}|{}", type_id, type_id))
}

/// Signature of an association over the given roles.
///
/// Role signatures are sorted before joining, so role order is irrelevant.
#[must_use]
pub fn association<'a>(
    association: &Association,
    roles: impl IntoIterator<Item = &'a Role>,
) -> Signature {
    let mut role_signatures: Vec<Signature> = roles.into_iter().map(role).collect();
    role_signatures.sort();
    let roles = role_signatures
        .iter()
        .map(Signature::as_str)
        .collect::<Vec<_>>()
        .join(";");

    Signature(format!(
        "a|{}|{}|{}",
        type_part(association.type_id()),
        scope_part(association.scope()),
        roles
    ))
}

// =============================================================================
// TESTS
// =============================================================================

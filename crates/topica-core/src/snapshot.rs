//! # Snapshot
//!
//! A serializable, comparable view of a [`TopicMap`].
//!
//! Everything is listed in handle order. Handles are allocated in event
//! order, so two maps built from the same stream yield equal snapshots.
//! This is an inspection format only; there is no way back from a snapshot
//! to a live map.

use crate::topicmap::TopicMap;
use crate::types::{Literal, Locator, Scope, TopicId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicMapSnapshot {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item_identifiers: Vec<Locator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reifier: Option<TopicId>,
    pub topics: Vec<TopicSnapshot>,
    pub associations: Vec<AssociationSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicSnapshot {
    pub id: TopicId,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subject_identifiers: Vec<Locator>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subject_locators: Vec<Locator>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item_identifiers: Vec<Locator>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<TopicId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<NameSnapshot>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub occurrences: Vec<OccurrenceSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameSnapshot {
    pub type_id: TopicId,
    pub value: String,
    #[serde(default, skip_serializing_if = "Scope::is_unconstrained")]
    pub scope: Scope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reifier: Option<TopicId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item_identifiers: Vec<Locator>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<VariantSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantSnapshot {
    pub literal: Literal,
    pub scope: Scope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reifier: Option<TopicId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item_identifiers: Vec<Locator>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccurrenceSnapshot {
    pub type_id: TopicId,
    pub literal: Literal,
    #[serde(default, skip_serializing_if = "Scope::is_unconstrained")]
    pub scope: Scope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reifier: Option<TopicId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item_identifiers: Vec<Locator>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationSnapshot {
    pub type_id: TopicId,
    #[serde(default, skip_serializing_if = "Scope::is_unconstrained")]
    pub scope: Scope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reifier: Option<TopicId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item_identifiers: Vec<Locator>,
    pub roles: Vec<RoleSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSnapshot {
    pub type_id: TopicId,
    pub player: TopicId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reifier: Option<TopicId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item_identifiers: Vec<Locator>,
}

fn locators<'a>(set: impl IntoIterator<Item = &'a Locator>) -> Vec<Locator> {
    set.into_iter().cloned().collect()
}

impl TopicMapSnapshot {
    /// Capture the current state of `map`.
    #[must_use]
    pub fn capture(map: &TopicMap) -> Self {
        let topics = map
            .topics()
            .map(|topic| TopicSnapshot {
                id: topic.id,
                subject_identifiers: locators(&topic.subject_identifiers),
                subject_locators: locators(&topic.subject_locators),
                item_identifiers: locators(&topic.item_identifiers),
                types: topic.types.iter().copied().collect(),
                names: map
                    .names_of(topic.id)
                    .map(|name| NameSnapshot {
                        type_id: name.type_id,
                        value: name.value.clone(),
                        scope: name.scope.clone(),
                        reifier: name.reifier,
                        item_identifiers: locators(&name.item_identifiers),
                        variants: map
                            .variants_of(name)
                            .map(|variant| VariantSnapshot {
                                literal: variant.literal.clone(),
                                scope: variant.scope.clone(),
                                reifier: variant.reifier,
                                item_identifiers: locators(&variant.item_identifiers),
                            })
                            .collect(),
                    })
                    .collect(),
                occurrences: map
                    .occurrences_of(topic.id)
                    .map(|occurrence| OccurrenceSnapshot {
                        type_id: occurrence.type_id,
                        literal: occurrence.literal.clone(),
                        scope: occurrence.scope.clone(),
                        reifier: occurrence.reifier,
                        item_identifiers: locators(&occurrence.item_identifiers),
                    })
                    .collect(),
            })
            .collect();

        let associations = map
            .associations()
            .map(|association| AssociationSnapshot {
                type_id: association.type_id,
                scope: association.scope.clone(),
                reifier: association.reifier,
                item_identifiers: locators(&association.item_identifiers),
                roles: map
                    .roles_of(association)
                    .map(|role| RoleSnapshot {
                        type_id: role.type_id,
                        player: role.player,
                        reifier: role.reifier,
                        item_identifiers: locators(&role.item_identifiers),
                    })
                    .collect(),
            })
            .collect();

        Self {
            item_identifiers: locators(map.item_identifiers()),
            reifier: map.reifier(),
            topics,
            associations,
        }
    }

    /// Total number of names across all topics.
    #[must_use]
    pub fn name_count(&self) -> usize {
        self.topics.iter().map(|t| t.names.len()).sum()
    }

    /// Total number of occurrences across all topics.
    #[must_use]
    pub fn occurrence_count(&self) -> usize {
        self.topics.iter().map(|t| t.occurrences.len()).sum()
    }
}

impl From<&TopicMap> for TopicMapSnapshot {
    fn from(map: &TopicMap) -> Self {
        Self::capture(map)
    }
}

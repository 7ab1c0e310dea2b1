//! # Event Vocabulary
//!
//! The events an external parser pushes into the [`Ingestor`](crate::Ingestor).
//!
//! Start/end events must be well nested. Leaf events are interpreted
//! according to the state they arrive in; see the ingestor for the rules.
//!
//! Events serialize as internally tagged JSON objects:
//!
//! ```json
//! {"event": "start_topic"}
//! {"event": "identity", "kind": "sid", "address": "http://ex/s1"}
//! {"event": "value", "value": "Semagia", "datatype": "http://www.w3.org/2001/XMLSchema#string"}
//! ```

use crate::types::{IdentityKind, Locator};
use serde::{Deserialize, Serialize};

/// One event of a construct-boundary stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    StartTopicMap,
    EndTopicMap,
    StartTopic,
    EndTopic,
    StartAssociation,
    EndAssociation,
    StartRole,
    EndRole,
    StartOccurrence,
    EndOccurrence,
    StartName,
    EndName,
    StartVariant,
    EndVariant,
    StartScope,
    EndScope,
    StartTheme,
    EndTheme,
    StartReifier,
    EndReifier,
    StartPlayer,
    EndPlayer,
    StartIsa,
    EndIsa,
    StartType,
    EndType,

    /// An identity assertion. Inside a TOPIC block it adds an identity to
    /// that topic; everywhere else it references (and if needed creates)
    /// a topic.
    Identity { kind: IdentityKind, address: Locator },

    /// An item identifier for the construct currently open: a topic, a
    /// non-topic construct, or the topic map itself at top level.
    ItemIdentifier { address: Locator },

    /// The value of a name (no datatype) or of an occurrence or variant.
    Value {
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        datatype: Option<Locator>,
    },
}

impl Event {
    /// Subject identifier assertion or reference.
    #[must_use]
    pub fn sid(address: &str) -> Self {
        Self::Identity {
            kind: IdentityKind::SubjectIdentifier,
            address: Locator::new(address),
        }
    }

    /// Subject locator assertion or reference.
    #[must_use]
    pub fn slo(address: &str) -> Self {
        Self::Identity {
            kind: IdentityKind::SubjectLocator,
            address: Locator::new(address),
        }
    }

    /// Item identifier used as a topic identity or reference.
    #[must_use]
    pub fn iid(address: &str) -> Self {
        Self::Identity {
            kind: IdentityKind::ItemIdentifier,
            address: Locator::new(address),
        }
    }

    /// Item identifier of the current construct.
    #[must_use]
    pub fn item_identifier(address: &str) -> Self {
        Self::ItemIdentifier {
            address: Locator::new(address),
        }
    }

    /// A name value.
    #[must_use]
    pub fn value(value: &str) -> Self {
        Self::Value {
            value: value.to_string(),
            datatype: None,
        }
    }

    /// An occurrence or variant value with an explicit datatype.
    #[must_use]
    pub fn typed_value(value: &str, datatype: &str) -> Self {
        Self::Value {
            value: value.to_string(),
            datatype: Some(Locator::new(datatype)),
        }
    }

    /// The event's tag, as used in diagnostics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::StartTopicMap => "start_topic_map",
            Self::EndTopicMap => "end_topic_map",
            Self::StartTopic => "start_topic",
            Self::EndTopic => "end_topic",
            Self::StartAssociation => "start_association",
            Self::EndAssociation => "end_association",
            Self::StartRole => "start_role",
            Self::EndRole => "end_role",
            Self::StartOccurrence => "start_occurrence",
            Self::EndOccurrence => "end_occurrence",
            Self::StartName => "start_name",
            Self::EndName => "end_name",
            Self::StartVariant => "start_variant",
            Self::EndVariant => "end_variant",
            Self::StartScope => "start_scope",
            Self::EndScope => "end_scope",
            Self::StartTheme => "start_theme",
            Self::EndTheme => "end_theme",
            Self::StartReifier => "start_reifier",
            Self::EndReifier => "end_reifier",
            Self::StartPlayer => "start_player",
            Self::EndPlayer => "end_player",
            Self::StartIsa => "start_isa",
            Self::EndIsa => "end_isa",
            Self::StartType => "start_type",
            Self::EndType => "end_type",
            Self::Identity { .. } => "identity",
            Self::ItemIdentifier { .. } => "item_identifier",
            Self::Value { .. } => "value",
        }
    }
}

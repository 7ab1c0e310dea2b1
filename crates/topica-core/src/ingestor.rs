//! # Ingestor Module
//!
//! The construction state machine of Topica.
//!
//! - Consume a well-nested event stream
//! - Assemble constructs on a stack of tagged frames
//! - Hand finished constructs to a [`TopicMapHandler`]
//! - Stop at the first fatal error
//!
//! Each frame carries only what its state needs: a topic handle for TOPIC,
//! a builder for ASSOCIATION/ROLE/OCCURRENCE/NAME/VARIANT, nothing for the
//! marker states. An end event must match the frame on top of the stack;
//! the finished construct is then dispatched by the frame now exposed.

use crate::handler::{
    AssociationDraft, NameDraft, OccurrenceDraft, RoleDraft, TopicMapHandler, VariantDraft,
};
use crate::event::Event;
use crate::primitives::{DEFAULT_NAME_TYPE, MAX_NESTING_DEPTH, XSD_STRING};
use crate::types::{
    ConstructKind, ConstructRef, IdentityKind, Literal, Locator, State, TopicId, TopicMapError,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Settings of one ingestor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Subject identifier of the topic used as type of untyped names.
    pub default_name_type: Locator,
    /// Maximum depth of the frame stack, INITIAL included.
    pub max_depth: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            default_name_type: Locator::new(DEFAULT_NAME_TYPE),
            max_depth: MAX_NESTING_DEPTH,
        }
    }
}

// =============================================================================
// FRAMES
// =============================================================================

/// Item identifiers and reifier of a role, applied once the association
/// is stored.
#[derive(Debug, Default)]
struct RoleDecoration {
    index: usize,
    item_identifiers: Vec<Locator>,
    reifier: Option<TopicId>,
}

#[derive(Debug, Default)]
struct AssociationBuilder {
    type_id: Option<TopicId>,
    scope: Vec<TopicId>,
    reifier: Option<TopicId>,
    item_identifiers: Vec<Locator>,
    roles: Vec<RoleDraft>,
    decorations: Vec<RoleDecoration>,
}

#[derive(Debug, Default)]
struct RoleBuilder {
    type_id: Option<TopicId>,
    player: Option<TopicId>,
    reifier: Option<TopicId>,
    item_identifiers: Vec<Locator>,
}

#[derive(Debug, Default)]
struct OccurrenceBuilder {
    type_id: Option<TopicId>,
    literal: Option<Literal>,
    scope: Vec<TopicId>,
    reifier: Option<TopicId>,
    item_identifiers: Vec<Locator>,
}

#[derive(Debug, Default)]
struct NameBuilder {
    type_id: Option<TopicId>,
    value: Option<String>,
    scope: Vec<TopicId>,
    reifier: Option<TopicId>,
    item_identifiers: Vec<Locator>,
    variants: Vec<VariantDraft>,
}

#[derive(Debug, Default)]
struct VariantBuilder {
    literal: Option<Literal>,
    scope: Vec<TopicId>,
    reifier: Option<TopicId>,
    item_identifiers: Vec<Locator>,
}

/// One entry of the construction stack.
#[derive(Debug)]
enum Frame {
    Initial,
    /// `None` until the first identity or characteristic needs the topic.
    Topic(Option<TopicId>),
    Association(AssociationBuilder),
    Role(RoleBuilder),
    Occurrence(OccurrenceBuilder),
    Name(NameBuilder),
    Variant(VariantBuilder),
    Scope,
    Theme,
    Reifier,
    Player,
    Isa,
    Type,
}

impl Frame {
    fn state(&self) -> State {
        match self {
            Self::Initial => State::Initial,
            Self::Topic(_) => State::Topic,
            Self::Association(_) => State::Association,
            Self::Role(_) => State::Role,
            Self::Occurrence(_) => State::Occurrence,
            Self::Name(_) => State::Name,
            Self::Variant(_) => State::Variant,
            Self::Scope => State::Scope,
            Self::Theme => State::Theme,
            Self::Reifier => State::Reifier,
            Self::Player => State::Player,
            Self::Isa => State::Isa,
            Self::Type => State::Type,
        }
    }

    fn type_slot(&mut self) -> Option<&mut Option<TopicId>> {
        match self {
            Self::Association(b) => Some(&mut b.type_id),
            Self::Role(b) => Some(&mut b.type_id),
            Self::Occurrence(b) => Some(&mut b.type_id),
            Self::Name(b) => Some(&mut b.type_id),
            _ => None,
        }
    }

    fn scope_slot(&mut self) -> Option<&mut Vec<TopicId>> {
        match self {
            Self::Association(b) => Some(&mut b.scope),
            Self::Occurrence(b) => Some(&mut b.scope),
            Self::Name(b) => Some(&mut b.scope),
            Self::Variant(b) => Some(&mut b.scope),
            _ => None,
        }
    }

    fn reifier_slot(&mut self) -> Option<&mut Option<TopicId>> {
        match self {
            Self::Association(b) => Some(&mut b.reifier),
            Self::Role(b) => Some(&mut b.reifier),
            Self::Occurrence(b) => Some(&mut b.reifier),
            Self::Name(b) => Some(&mut b.reifier),
            Self::Variant(b) => Some(&mut b.reifier),
            _ => None,
        }
    }

    fn item_identifier_slot(&mut self) -> Option<&mut Vec<Locator>> {
        match self {
            Self::Association(b) => Some(&mut b.item_identifiers),
            Self::Role(b) => Some(&mut b.item_identifiers),
            Self::Occurrence(b) => Some(&mut b.item_identifiers),
            Self::Name(b) => Some(&mut b.item_identifiers),
            Self::Variant(b) => Some(&mut b.item_identifiers),
            _ => None,
        }
    }

    /// States a frame of this kind may be opened in.
    fn allowed_parents(state: State) -> &'static [State] {
        match state {
            State::Initial => &[],
            State::Topic | State::Association => &[State::Initial],
            State::Role => &[State::Association],
            State::Occurrence | State::Name | State::Isa => &[State::Topic],
            State::Variant => &[State::Name],
            State::Scope => &[
                State::Association,
                State::Occurrence,
                State::Name,
                State::Variant,
            ],
            State::Theme => &[State::Scope],
            State::Reifier => &[
                State::Initial,
                State::Association,
                State::Role,
                State::Occurrence,
                State::Name,
                State::Variant,
            ],
            State::Player => &[State::Role],
            State::Type => &[
                State::Association,
                State::Role,
                State::Occurrence,
                State::Name,
            ],
        }
    }
}

// =============================================================================
// INGESTOR
// =============================================================================

/// The construction state machine.
///
/// Owns (or borrows, through `&mut H`) the handler it builds into. After a
/// fatal error the ingestor is poisoned and rejects every further event;
/// the handler may hold a partial graph at that point and no rollback is
/// attempted here. See [`Session`](crate::Session) for an all-or-nothing
/// wrapper.
pub struct Ingestor<H: TopicMapHandler> {
    handler: H,
    frames: Vec<Frame>,
    pending_scope: Vec<TopicId>,
    config: IngestConfig,
    failed: bool,
}

impl<H: TopicMapHandler> Ingestor<H> {
    /// Create an ingestor positioned at the INITIAL state.
    pub fn new(handler: H, config: IngestConfig) -> Self {
        Self {
            handler,
            frames: vec![Frame::Initial],
            pending_scope: Vec::new(),
            config,
            failed: false,
        }
    }

    /// The handler being built into.
    #[must_use]
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Current depth of the frame stack, INITIAL included.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Check if a fatal error has been raised.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.failed
    }

    /// Consume one event.
    pub fn handle(&mut self, event: Event) -> Result<(), TopicMapError> {
        if self.failed {
            return Err(TopicMapError::Aborted);
        }
        trace!(event = event.name(), depth = self.frames.len(), "event");

        let result = self.dispatch(event);
        if let Err(err) = &result {
            debug!(error = %err, state = %self.state(), "ingestion failed");
            self.failed = true;
        }
        result
    }

    /// Consume events until the iterator ends or an event fails.
    ///
    /// Returns the number of events consumed.
    pub fn ingest<I>(&mut self, events: I) -> Result<usize, TopicMapError>
    where
        I: IntoIterator<Item = Event>,
    {
        let mut count = 0usize;
        for event in events {
            self.handle(event)?;
            count = count.saturating_add(1);
        }
        Ok(count)
    }

    /// Check the terminal condition and hand the handler back.
    ///
    /// The stack must hold only INITIAL and no theme may be pending.
    pub fn finish(self) -> Result<H, TopicMapError> {
        if self.failed {
            return Err(TopicMapError::Aborted);
        }
        if self.frames.len() != 1 {
            return Err(TopicMapError::UnterminatedStream {
                open: self.state(),
            });
        }
        if !self.pending_scope.is_empty() {
            return Err(TopicMapError::DanglingScope {
                themes: self.pending_scope.len(),
            });
        }
        Ok(self.handler)
    }

    // =========================================================================
    // DISPATCH
    // =========================================================================

    fn state(&self) -> State {
        self.frames.last().map_or(State::Initial, Frame::state)
    }

    fn dispatch(&mut self, event: Event) -> Result<(), TopicMapError> {
        let name = event.name();
        match event {
            Event::StartTopicMap => {
                if self.frames.len() != 1 {
                    return Err(TopicMapError::UnexpectedEvent {
                        event: name,
                        state: self.state(),
                    });
                }
                Ok(())
            }
            Event::EndTopicMap => {
                if self.frames.len() != 1 {
                    return Err(TopicMapError::StateMismatch {
                        expected: State::Initial,
                        found: self.state(),
                    });
                }
                if !self.pending_scope.is_empty() {
                    return Err(TopicMapError::DanglingScope {
                        themes: self.pending_scope.len(),
                    });
                }
                Ok(())
            }

            Event::StartTopic => self.push(name, Frame::Topic(None)),
            Event::StartAssociation => {
                self.push(name, Frame::Association(AssociationBuilder::default()))
            }
            Event::StartRole => self.push(name, Frame::Role(RoleBuilder::default())),
            Event::StartOccurrence => {
                self.push(name, Frame::Occurrence(OccurrenceBuilder::default()))
            }
            Event::StartName => self.push(name, Frame::Name(NameBuilder::default())),
            Event::StartVariant => self.push(name, Frame::Variant(VariantBuilder::default())),
            Event::StartScope => self.push(name, Frame::Scope),
            Event::StartTheme => self.push(name, Frame::Theme),
            Event::StartReifier => self.push(name, Frame::Reifier),
            Event::StartPlayer => self.push(name, Frame::Player),
            Event::StartIsa => self.push(name, Frame::Isa),
            Event::StartType => self.push(name, Frame::Type),

            Event::EndTopic => self.end_topic(),
            Event::EndAssociation => self.end_association(),
            Event::EndRole => self.end_role(),
            Event::EndOccurrence => self.end_occurrence(),
            Event::EndName => self.end_name(),
            Event::EndVariant => self.end_variant(),
            Event::EndScope => self.end_scope(),
            Event::EndTheme => self.pop(State::Theme).map(drop),
            Event::EndReifier => self.pop(State::Reifier).map(drop),
            Event::EndPlayer => self.pop(State::Player).map(drop),
            Event::EndIsa => self.pop(State::Isa).map(drop),
            Event::EndType => self.pop(State::Type).map(drop),

            Event::Identity { kind, address } => self.identity(name, kind, &address),
            Event::ItemIdentifier { address } => self.item_identifier(name, address),
            Event::Value { value, datatype } => self.value(name, value, datatype),
        }
    }

    fn push(&mut self, event: &'static str, frame: Frame) -> Result<(), TopicMapError> {
        let parent = self.state();
        if !Frame::allowed_parents(frame.state()).contains(&parent) {
            return Err(TopicMapError::UnexpectedEvent {
                event,
                state: parent,
            });
        }
        if self.frames.len() >= self.config.max_depth {
            return Err(TopicMapError::NestingTooDeep {
                limit: self.config.max_depth,
            });
        }
        self.frames.push(frame);
        Ok(())
    }

    fn pop(&mut self, expected: State) -> Result<Frame, TopicMapError> {
        let found = self.state();
        if found != expected || self.frames.len() <= 1 {
            return Err(TopicMapError::StateMismatch { expected, found });
        }
        self.frames
            .pop()
            .ok_or(TopicMapError::StateMismatch { expected, found })
    }

    /// The frame `offset` levels below the top (0 = top).
    fn frame_below(&mut self, offset: usize) -> Option<&mut Frame> {
        let index = self.frames.len().checked_sub(offset.saturating_add(1))?;
        self.frames.get_mut(index)
    }

    /// The topic of the TOPIC frame `offset` levels below the top,
    /// created anonymously if no identity has been seen yet.
    fn topic_at(&mut self, offset: usize, event: &'static str) -> Result<TopicId, TopicMapError> {
        let state = self.state();
        let current = match self.frame_below(offset) {
            Some(Frame::Topic(current)) => *current,
            _ => return Err(TopicMapError::UnexpectedEvent { event, state }),
        };
        match current {
            Some(topic) => Ok(topic),
            None => {
                let topic = self.handler.create_topic()?;
                if let Some(Frame::Topic(slot)) = self.frame_below(offset) {
                    *slot = Some(topic);
                }
                Ok(topic)
            }
        }
    }

    fn topic_by_reference(
        &mut self,
        kind: IdentityKind,
        address: &Locator,
    ) -> Result<TopicId, TopicMapError> {
        match kind {
            IdentityKind::ItemIdentifier => self.handler.create_topic_by_item_identifier(address),
            IdentityKind::SubjectIdentifier => {
                self.handler.create_topic_by_subject_identifier(address)
            }
            IdentityKind::SubjectLocator => self.handler.create_topic_by_subject_locator(address),
        }
    }

    /// Assert an identity on the topic of the TOPIC frame on top.
    fn assert_on_topic(
        &mut self,
        kind: IdentityKind,
        address: &Locator,
    ) -> Result<(), TopicMapError> {
        let current = match self.frames.last() {
            Some(Frame::Topic(current)) => *current,
            _ => None,
        };
        let topic = match current {
            None => self.topic_by_reference(kind, address)?,
            Some(topic) => match kind {
                IdentityKind::ItemIdentifier => self.handler.handle_item_identifier(topic, address)?,
                IdentityKind::SubjectIdentifier => {
                    self.handler.handle_subject_identifier(topic, address)?
                }
                IdentityKind::SubjectLocator => {
                    self.handler.handle_subject_locator(topic, address)?
                }
            },
        };
        if let Some(Frame::Topic(slot)) = self.frames.last_mut() {
            *slot = Some(topic);
        }
        Ok(())
    }

    // =========================================================================
    // LEAF EVENTS
    // =========================================================================

    fn identity(
        &mut self,
        event: &'static str,
        kind: IdentityKind,
        address: &Locator,
    ) -> Result<(), TopicMapError> {
        let state = self.state();
        match state {
            State::Topic => self.assert_on_topic(kind, address),
            State::Initial => self.topic_by_reference(kind, address).map(drop),
            State::Isa => {
                let type_id = self.topic_by_reference(kind, address)?;
                let instance = self.topic_at(1, event)?;
                self.handler.handle_type_instance(instance, type_id)
            }
            State::Type => {
                let type_id = self.topic_by_reference(kind, address)?;
                match self.frame_below(1).and_then(Frame::type_slot) {
                    Some(slot) => {
                        *slot = Some(type_id);
                        Ok(())
                    }
                    None => Err(TopicMapError::UnexpectedEvent { event, state }),
                }
            }
            State::Player => {
                let player = self.topic_by_reference(kind, address)?;
                match self.frame_below(1) {
                    Some(Frame::Role(role)) => {
                        role.player = Some(player);
                        Ok(())
                    }
                    _ => Err(TopicMapError::UnexpectedEvent { event, state }),
                }
            }
            State::Theme => {
                let theme = self.topic_by_reference(kind, address)?;
                self.pending_scope.push(theme);
                Ok(())
            }
            State::Reifier => {
                let reifier = self.topic_by_reference(kind, address)?;
                if matches!(self.frame_below(1), Some(Frame::Initial)) {
                    return self.handler.handle_topic_map_reifier(reifier);
                }
                match self.frame_below(1).and_then(Frame::reifier_slot) {
                    Some(slot) => {
                        *slot = Some(reifier);
                        Ok(())
                    }
                    None => Err(TopicMapError::UnexpectedEvent { event, state }),
                }
            }
            _ => Err(TopicMapError::UnexpectedEvent { event, state }),
        }
    }

    fn item_identifier(
        &mut self,
        event: &'static str,
        address: Locator,
    ) -> Result<(), TopicMapError> {
        let state = self.state();
        match state {
            State::Topic => self.assert_on_topic(IdentityKind::ItemIdentifier, &address),
            State::Initial => self.handler.handle_topic_map_item_identifier(&address),
            _ => match self.frames.last_mut().and_then(Frame::item_identifier_slot) {
                Some(slot) => {
                    slot.push(address);
                    Ok(())
                }
                None => Err(TopicMapError::UnexpectedEvent { event, state }),
            },
        }
    }

    fn value(
        &mut self,
        event: &'static str,
        value: String,
        datatype: Option<Locator>,
    ) -> Result<(), TopicMapError> {
        let state = self.state();
        let literal = |value: String, datatype: Option<Locator>| {
            Literal::new(value, datatype.unwrap_or_else(|| Locator::new(XSD_STRING)))
        };
        match self.frames.last_mut() {
            Some(Frame::Occurrence(b)) => {
                b.literal = Some(literal(value, datatype));
                Ok(())
            }
            Some(Frame::Variant(b)) => {
                b.literal = Some(literal(value, datatype));
                Ok(())
            }
            Some(Frame::Name(b)) if datatype.is_none() => {
                b.value = Some(value);
                Ok(())
            }
            _ => Err(TopicMapError::UnexpectedEvent { event, state }),
        }
    }

    // =========================================================================
    // END EVENTS
    // =========================================================================

    fn end_topic(&mut self) -> Result<(), TopicMapError> {
        if let Frame::Topic(None) = self.pop(State::Topic)? {
            // An empty TOPIC block still denotes a topic.
            self.handler.create_topic()?;
        }
        Ok(())
    }

    fn end_scope(&mut self) -> Result<(), TopicMapError> {
        self.pop(State::Scope)?;
        let themes = std::mem::take(&mut self.pending_scope);
        let state = self.state();
        match self.frames.last_mut().and_then(Frame::scope_slot) {
            Some(slot) => {
                slot.extend(themes);
                Ok(())
            }
            None => Err(TopicMapError::UnexpectedEvent {
                event: "end_scope",
                state,
            }),
        }
    }

    fn end_role(&mut self) -> Result<(), TopicMapError> {
        let Frame::Role(role) = self.pop(State::Role)? else {
            return Err(TopicMapError::StateMismatch {
                expected: State::Role,
                found: self.state(),
            });
        };
        let type_id = role.type_id.ok_or(TopicMapError::MissingProperty {
            construct: ConstructKind::Role,
            property: "type",
        })?;
        let player = role.player.ok_or(TopicMapError::MissingProperty {
            construct: ConstructKind::Role,
            property: "player",
        })?;

        let state = self.state();
        let Some(Frame::Association(association)) = self.frames.last_mut() else {
            return Err(TopicMapError::UnexpectedEvent {
                event: "end_role",
                state,
            });
        };
        if !role.item_identifiers.is_empty() || role.reifier.is_some() {
            association.decorations.push(RoleDecoration {
                index: association.roles.len(),
                item_identifiers: role.item_identifiers,
                reifier: role.reifier,
            });
        }
        association.roles.push(RoleDraft { type_id, player });
        Ok(())
    }

    fn end_association(&mut self) -> Result<(), TopicMapError> {
        let Frame::Association(builder) = self.pop(State::Association)? else {
            return Err(TopicMapError::StateMismatch {
                expected: State::Association,
                found: self.state(),
            });
        };
        let type_id = builder.type_id.ok_or(TopicMapError::MissingProperty {
            construct: ConstructKind::Association,
            property: "type",
        })?;

        let created = self.handler.create_association(AssociationDraft {
            type_id,
            scope: builder.scope,
            reifier: builder.reifier,
            item_identifiers: builder.item_identifiers,
            roles: builder.roles,
        })?;

        // Deferred role decoration, before the next event is looked at.
        for decoration in builder.decorations {
            let role = created.roles.get(decoration.index).copied().ok_or(
                TopicMapError::ConstructNotFound(ConstructRef::Association(created.association)),
            )?;
            for iid in &decoration.item_identifiers {
                self.handler.handle_role_item_identifier(role, iid)?;
            }
            if let Some(reifier) = decoration.reifier {
                self.handler.handle_role_reifier(role, reifier)?;
            }
        }
        Ok(())
    }

    fn end_occurrence(&mut self) -> Result<(), TopicMapError> {
        let Frame::Occurrence(builder) = self.pop(State::Occurrence)? else {
            return Err(TopicMapError::StateMismatch {
                expected: State::Occurrence,
                found: self.state(),
            });
        };
        let type_id = builder.type_id.ok_or(TopicMapError::MissingProperty {
            construct: ConstructKind::Occurrence,
            property: "type",
        })?;
        let literal = builder.literal.ok_or(TopicMapError::MissingProperty {
            construct: ConstructKind::Occurrence,
            property: "value",
        })?;

        let parent = self.topic_at(0, "end_occurrence")?;
        self.handler.create_occurrence(
            parent,
            OccurrenceDraft {
                type_id,
                literal,
                scope: builder.scope,
                reifier: builder.reifier,
                item_identifiers: builder.item_identifiers,
            },
        )?;
        Ok(())
    }

    fn end_name(&mut self) -> Result<(), TopicMapError> {
        let Frame::Name(builder) = self.pop(State::Name)? else {
            return Err(TopicMapError::StateMismatch {
                expected: State::Name,
                found: self.state(),
            });
        };
        let value = builder.value.ok_or(TopicMapError::MissingProperty {
            construct: ConstructKind::Name,
            property: "value",
        })?;
        let type_id = match builder.type_id {
            Some(type_id) => type_id,
            None => {
                let default = self.config.default_name_type.clone();
                self.handler.create_topic_by_subject_identifier(&default)?
            }
        };

        let parent = self.topic_at(0, "end_name")?;
        self.handler.create_name(
            parent,
            NameDraft {
                type_id,
                value,
                scope: builder.scope,
                reifier: builder.reifier,
                item_identifiers: builder.item_identifiers,
                variants: builder.variants,
            },
        )?;
        Ok(())
    }

    fn end_variant(&mut self) -> Result<(), TopicMapError> {
        let Frame::Variant(builder) = self.pop(State::Variant)? else {
            return Err(TopicMapError::StateMismatch {
                expected: State::Variant,
                found: self.state(),
            });
        };
        let literal = builder.literal.ok_or(TopicMapError::MissingProperty {
            construct: ConstructKind::Variant,
            property: "value",
        })?;

        let state = self.state();
        let Some(Frame::Name(name)) = self.frames.last_mut() else {
            return Err(TopicMapError::UnexpectedEvent {
                event: "end_variant",
                state,
            });
        };
        name.variants.push(VariantDraft {
            literal,
            scope: builder.scope,
            reifier: builder.reifier,
            item_identifiers: builder.item_identifiers,
        });
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

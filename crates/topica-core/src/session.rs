//! # Session Module
//!
//! All-or-nothing ingestion on top of the raw [`Ingestor`].
//!
//! The ingestor stops at the first fatal error and leaves whatever it built
//! so far in its handler. A `Session` checkpoints its topic map before every
//! stream or merge and restores the checkpoint when the operation fails, so
//! a session's map only ever reflects complete, successful operations.

use crate::event::Event;
use crate::ingestor::{IngestConfig, Ingestor};
use crate::merge::merge_topic_maps;
use crate::snapshot::TopicMapSnapshot;
use crate::topicmap::{MergeStats, TopicMap};
use crate::types::TopicMapError;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Outcome of one successful session operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Events consumed (0 for a map merge).
    pub events: usize,
    /// Topics in the map afterwards.
    pub topics: usize,
    /// Associations in the map afterwards.
    pub associations: usize,
    /// Topic merges performed by this operation.
    pub topic_merges: u64,
    /// Construct merges performed by this operation.
    pub construct_merges: u64,
}

/// A topic map plus the configuration used to build into it.
#[derive(Debug, Clone, Default)]
pub struct Session {
    map: TopicMap,
    config: IngestConfig,
}

impl Session {
    /// Create a session over an empty topic map.
    #[must_use]
    pub fn new(config: IngestConfig) -> Self {
        Self {
            map: TopicMap::new(),
            config,
        }
    }

    /// Create a session over an existing topic map.
    #[must_use]
    pub fn with_map(map: TopicMap, config: IngestConfig) -> Self {
        Self { map, config }
    }

    #[must_use]
    pub fn map(&self) -> &TopicMap {
        &self.map
    }

    #[must_use]
    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Give up the session and keep its map.
    #[must_use]
    pub fn into_map(self) -> TopicMap {
        self.map
    }

    /// Serializable view of the current map.
    #[must_use]
    pub fn snapshot(&self) -> TopicMapSnapshot {
        TopicMapSnapshot::capture(&self.map)
    }

    /// Ingest one complete event stream.
    ///
    /// On error the map is restored to its state before the call.
    pub fn ingest<I>(&mut self, events: I) -> Result<IngestReport, TopicMapError>
    where
        I: IntoIterator<Item = Event>,
    {
        let checkpoint = self.map.clone();
        let before = self.map.stats();

        let mut ingestor = Ingestor::new(&mut self.map, self.config.clone());
        let result = ingestor
            .ingest(events)
            .and_then(|count| ingestor.finish().map(|_| count));

        match result {
            Ok(events) => {
                let report = self.report(events, before);
                debug!(
                    events = report.events,
                    topics = report.topics,
                    topic_merges = report.topic_merges,
                    "stream ingested"
                );
                Ok(report)
            }
            Err(err) => {
                warn!(error = %err, "stream rejected, restoring checkpoint");
                self.map = checkpoint;
                Err(err)
            }
        }
    }

    /// Merge another topic map into this session's map.
    ///
    /// On error the map is restored to its state before the call.
    pub fn merge(&mut self, other: &TopicMap) -> Result<IngestReport, TopicMapError> {
        let checkpoint = self.map.clone();
        let before = self.map.stats();

        match merge_topic_maps(&mut self.map, other) {
            Ok(()) => Ok(self.report(0, before)),
            Err(err) => {
                warn!(error = %err, "merge rejected, restoring checkpoint");
                self.map = checkpoint;
                Err(err)
            }
        }
    }

    fn report(&self, events: usize, before: MergeStats) -> IngestReport {
        let after = self.map.stats();
        IngestReport {
            events,
            topics: self.map.topic_count(),
            associations: self.map.association_count(),
            topic_merges: after.topic_merges.saturating_sub(before.topic_merges),
            construct_merges: after
                .construct_merges
                .saturating_sub(before.construct_merges),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Locator;

    fn topic(sid: &str, iid: &str) -> Vec<Event> {
        vec![
            Event::StartTopic,
            Event::sid(sid),
            Event::iid(iid),
            Event::EndTopic,
        ]
    }

    #[test]
    fn report_counts_merges_of_one_stream() {
        let mut session = Session::default();
        let mut events = vec![Event::StartTopicMap];
        events.extend(topic("http://ex/s1", "#a"));
        events.extend(topic("http://ex/s2", "#a"));
        events.push(Event::EndTopicMap);

        let report = session.ingest(events).expect("ingest");

        assert_eq!(report.topics, 1);
        assert_eq!(report.topic_merges, 1);
        assert_eq!(report.events, 10);
    }

    #[test]
    fn failed_stream_leaves_map_untouched() {
        let mut session = Session::default();
        session
            .ingest(topic("http://ex/s1", "#a"))
            .expect("first stream");
        let before = session.snapshot();

        let mut bad = topic("http://ex/s2", "#b");
        bad.push(Event::EndName);
        let err = session.ingest(bad).expect_err("protocol error");

        assert!(matches!(err, TopicMapError::StateMismatch { .. }));
        assert_eq!(session.snapshot(), before);
        assert!(
            session
                .map()
                .topic_by_subject_identifier(&Locator::new("http://ex/s2"))
                .is_none()
        );
    }

    #[test]
    fn unterminated_stream_is_rolled_back() {
        let mut session = Session::default();
        let err = session
            .ingest([Event::StartTopic, Event::sid("http://ex/s1")])
            .expect_err("unterminated");

        assert!(matches!(err, TopicMapError::UnterminatedStream { .. }));
        assert_eq!(session.map().topic_count(), 0);
    }

    #[test]
    fn merge_reports_and_keeps_source() {
        let mut other = Session::default();
        other.ingest(topic("http://ex/s1", "#a")).expect("other");

        let mut session = Session::default();
        session.ingest(topic("http://ex/s1", "#b")).expect("own");
        let report = session.merge(other.map()).expect("merge");

        assert_eq!(report.events, 0);
        assert_eq!(report.topics, 1);
        assert_eq!(other.map().topic_count(), 1);
        let merged = session
            .map()
            .topic_by_item_identifier(&Locator::new("#a"))
            .expect("merged topic");
        assert_eq!(merged.item_identifiers.len(), 2);
    }
}

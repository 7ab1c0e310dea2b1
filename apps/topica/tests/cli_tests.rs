//! Tests for CLI parsing, configuration and the file-level operations.

#![allow(clippy::unwrap_used, clippy::panic)]

use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use tempfile::{NamedTempFile, TempDir};
use topica::cli::{Cli, Commands, ingest_files, merge_files, read_events};
use topica::config::{Config, Limits};
use topica_core::{Event, Locator, TopicMapError};

// =============================================================================
// HELPERS
// =============================================================================

fn topic(sid: &str, iid: &str) -> Vec<Event> {
    vec![
        Event::StartTopic,
        Event::sid(sid),
        Event::iid(iid),
        Event::EndTopic,
    ]
}

fn stream(blocks: Vec<Vec<Event>>) -> Vec<Event> {
    let mut events = vec![Event::StartTopicMap];
    events.extend(blocks.into_iter().flatten());
    events.push(Event::EndTopicMap);
    events
}

fn write_stream(events: &[Event]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&serde_json::to_vec(events).unwrap()).unwrap();
    file.flush().unwrap();
    file
}

fn paths(files: &[&NamedTempFile]) -> Vec<PathBuf> {
    files.iter().map(|f| f.path().to_path_buf()).collect()
}

// =============================================================================
// ARGUMENT PARSING
// =============================================================================

#[test]
fn test_ingest_accepts_repeated_files() {
    let cli = Cli::try_parse_from([
        "topica", "--json-mode", "ingest", "-f", "a.json", "--file", "b.json", "--dump",
    ])
    .unwrap();

    assert!(cli.json_mode);
    match cli.command {
        Commands::Ingest { files, dump } => {
            assert_eq!(files, vec![PathBuf::from("a.json"), PathBuf::from("b.json")]);
            assert!(dump);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn test_merge_requires_files() {
    assert!(Cli::try_parse_from(["topica", "merge"]).is_err());
}

#[test]
fn test_global_config_flag_after_subcommand() {
    let cli =
        Cli::try_parse_from(["topica", "check", "-f", "s.json", "--config", "topica.toml"])
            .unwrap();

    assert_eq!(cli.config, Some(PathBuf::from("topica.toml")));
    assert!(matches!(cli.command, Commands::Check { .. }));
}

// =============================================================================
// CONFIGURATION
// =============================================================================

#[test]
fn test_config_file_is_loaded() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("topica.toml");
    std::fs::write(&path, "[limits]\nmax_file_size = 10\n").unwrap();

    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.limits.max_file_size, 10);
}

#[test]
fn test_missing_config_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    let err = Config::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
    assert!(matches!(err, TopicMapError::IoError(_)));
}

// =============================================================================
// INPUT FILES
// =============================================================================

#[test]
fn test_read_events_round_trips_stream() {
    let events = stream(vec![topic("http://ex/a", "#a")]);
    let file = write_stream(&events);

    let read = read_events(file.path(), &Limits::default()).unwrap();
    assert_eq!(read, events);
}

#[test]
fn test_oversized_file_is_rejected_before_parsing() {
    let file = write_stream(&stream(vec![topic("http://ex/a", "#a")]));
    let limits = Limits { max_file_size: 8 };

    let err = read_events(file.path(), &limits).unwrap_err();
    assert!(matches!(err, TopicMapError::SerializationError(_)));
}

#[test]
fn test_malformed_json_is_serialization_error() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"[{\"event\": \"no_such_event\"}]").unwrap();

    let err = read_events(file.path(), &Limits::default()).unwrap_err();
    assert!(matches!(err, TopicMapError::SerializationError(_)));
}

#[test]
fn test_directory_is_not_an_input_file() {
    let dir = TempDir::new().unwrap();
    let err = read_events(dir.path(), &Limits::default()).unwrap_err();
    assert!(matches!(err, TopicMapError::IoError(_)));
}

// =============================================================================
// OPERATIONS
// =============================================================================

#[test]
fn test_ingest_files_share_one_session() {
    let first = write_stream(&stream(vec![topic("http://ex/a", "#a")]));
    let second = write_stream(&stream(vec![topic("http://ex/a", "#b")]));

    let (session, reports) = ingest_files(&paths(&[&first, &second]), &Config::default()).unwrap();

    assert_eq!(reports.len(), 2);
    assert_eq!(session.map().topic_count(), 1);
    let topic = session
        .map()
        .topic_by_subject_identifier(&Locator::new("http://ex/a"))
        .unwrap();
    assert_eq!(topic.item_identifiers.len(), 2);
}

#[test]
fn test_invalid_stream_stops_ingestion() {
    let good = write_stream(&stream(vec![topic("http://ex/a", "#a")]));
    let bad = write_stream(&[Event::StartTopicMap, Event::EndTopic]);

    let err = ingest_files(&paths(&[&good, &bad]), &Config::default()).unwrap_err();
    assert!(matches!(err, TopicMapError::StateMismatch { .. }));
}

#[test]
fn test_merge_files_combines_by_identity() {
    let left = write_stream(&stream(vec![topic("http://ex/a", "#a")]));
    let right = write_stream(&stream(vec![
        topic("http://ex/a", "#b"),
        topic("http://ex/c", "#c"),
    ]));

    let (session, report) = merge_files(&paths(&[&left, &right]), &Config::default()).unwrap();

    assert_eq!(report.topics, 2);
    assert_eq!(session.map().topic_count(), 2);
    assert!(
        session
            .map()
            .topic_by_item_identifier(&Locator::new("#b"))
            .is_some()
    );
}

#[test]
fn test_config_controls_default_name_type() {
    let mut config = Config::default();
    config.ingest.default_name_type = Locator::new("http://ex/label");
    let file = write_stream(&stream(vec![vec![
        Event::StartTopic,
        Event::sid("http://ex/a"),
        Event::StartName,
        Event::value("A"),
        Event::EndName,
        Event::EndTopic,
    ]]));

    let (session, _) = ingest_files(&paths(&[&file]), &config).unwrap();

    let label = session
        .map()
        .topic_by_subject_identifier(&Locator::new("http://ex/label"))
        .unwrap();
    let name = session.map().names().next().unwrap();
    assert_eq!(name.type_id, label.id);
}

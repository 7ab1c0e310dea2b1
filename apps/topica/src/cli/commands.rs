//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.
//!
//! The `*_files` functions do the work and return the session; the `cmd_*`
//! functions print.

use crate::config::{Config, Limits};
use std::path::{Path, PathBuf};
use serde::Serialize;
use topica_core::{Event, IngestReport, Session, TopicMapError};

// =============================================================================
// INPUT VALIDATION
// =============================================================================

/// Resolve `path` to an existing regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, TopicMapError> {
    let canonical = path.canonicalize().map_err(|e| {
        TopicMapError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(TopicMapError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), TopicMapError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| TopicMapError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(TopicMapError::SerializationError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Read one event stream: a JSON array of events.
pub fn read_events(path: &Path, limits: &Limits) -> Result<Vec<Event>, TopicMapError> {
    let path = validate_file_path(path)?;
    validate_file_size(&path, limits.max_file_size)?;

    let contents = std::fs::read(&path)
        .map_err(|e| TopicMapError::IoError(format!("Read file: {}", e)))?;

    serde_json::from_slice(&contents).map_err(|e| {
        TopicMapError::SerializationError(format!(
            "Invalid event stream '{}': {}",
            path.display(),
            e
        ))
    })
}

// =============================================================================
// OPERATIONS
// =============================================================================

/// Ingest every file, in order, into one session.
pub fn ingest_files(
    files: &[PathBuf],
    config: &Config,
) -> Result<(Session, Vec<IngestReport>), TopicMapError> {
    let mut session = Session::new(config.ingest.clone());
    let mut reports = Vec::with_capacity(files.len());

    for file in files {
        tracing::info!("Ingesting {:?}", file);
        let events = read_events(file, &config.limits)?;
        reports.push(session.ingest(events)?);
    }

    Ok((session, reports))
}

/// Build one topic map per file and merge the rest into the first.
pub fn merge_files(
    files: &[PathBuf],
    config: &Config,
) -> Result<(Session, IngestReport), TopicMapError> {
    let Some((first, rest)) = files.split_first() else {
        return Err(TopicMapError::IoError("No input files".to_string()));
    };

    let (mut session, mut reports) = ingest_files(std::slice::from_ref(first), config)?;
    let mut report = reports.pop().unwrap_or_default();

    for file in rest {
        let (other, _) = ingest_files(std::slice::from_ref(file), config)?;
        tracing::info!("Merging {:?}", file);
        let merged = session.merge(other.map())?;
        report.topic_merges = report.topic_merges.saturating_add(merged.topic_merges);
        report.construct_merges = report
            .construct_merges
            .saturating_add(merged.construct_merges);
        report.topics = merged.topics;
        report.associations = merged.associations;
    }

    Ok((session, report))
}

// =============================================================================
// OUTPUT
// =============================================================================

fn render_json<T: Serialize + ?Sized>(value: &T) -> Result<String, TopicMapError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| TopicMapError::SerializationError(e.to_string()))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), TopicMapError> {
    println!("{}", render_json(value)?);
    Ok(())
}

fn print_summary(title: &str, session: &Session) {
    let map = session.map();
    let stats = map.stats();

    println!("{}", title);
    println!("{}", "=".repeat(title.len()));
    println!("Topics:        {}", map.topic_count());
    println!("Associations:  {}", map.association_count());
    println!("Roles:         {}", map.role_count());
    println!("Names:         {}", map.name_count());
    println!("Occurrences:   {}", map.occurrence_count());
    println!("Variants:      {}", map.variant_count());
    println!();
    println!("Topic Merges:      {}", stats.topic_merges);
    println!("Construct Merges:  {}", stats.construct_merges);
}

fn summary_json(session: &Session) -> serde_json::Value {
    let map = session.map();
    serde_json::json!({
        "topics": map.topic_count(),
        "associations": map.association_count(),
        "roles": map.role_count(),
        "names": map.name_count(),
        "occurrences": map.occurrence_count(),
        "variants": map.variant_count(),
        "stats": map.stats(),
    })
}

// =============================================================================
// INGEST COMMAND
// =============================================================================

/// Ingest event streams into one topic map.
pub fn cmd_ingest(
    files: &[PathBuf],
    config: &Config,
    json_mode: bool,
    dump: bool,
) -> Result<(), TopicMapError> {
    let (session, reports) = ingest_files(files, config)?;
    let events: usize = reports.iter().map(|r| r.events).sum();

    if json_mode {
        let mut output = summary_json(&session);
        output["streams"] = serde_json::json!(reports.len());
        output["events"] = serde_json::json!(events);
        if dump {
            output["snapshot"] = serde_json::to_value(session.snapshot())
                .map_err(|e| TopicMapError::SerializationError(e.to_string()))?;
        }
        return print_json(&output);
    }

    print_summary("Topica Ingest", &session);
    println!("Streams:           {}", reports.len());
    println!("Events:            {}", events);

    if dump {
        println!();
        print_json(&session.snapshot())?;
    }

    Ok(())
}

// =============================================================================
// MERGE COMMAND
// =============================================================================

/// Build one topic map per stream and merge them into the first.
pub fn cmd_merge(
    files: &[PathBuf],
    config: &Config,
    json_mode: bool,
    dump: bool,
) -> Result<(), TopicMapError> {
    let (session, report) = merge_files(files, config)?;

    if json_mode {
        let mut output = summary_json(&session);
        output["maps"] = serde_json::json!(files.len());
        output["merge"] = serde_json::json!(report);
        if dump {
            output["snapshot"] = serde_json::to_value(session.snapshot())
                .map_err(|e| TopicMapError::SerializationError(e.to_string()))?;
        }
        return print_json(&output);
    }

    print_summary("Topica Merge", &session);
    println!("Maps:              {}", files.len());

    if dump {
        println!();
        print_json(&session.snapshot())?;
    }

    Ok(())
}

// =============================================================================
// CHECK COMMAND
// =============================================================================

/// Validate one event stream.
///
/// Prints the verdict and returns the first fatal error, so the process
/// exits non-zero for an invalid stream.
pub fn cmd_check(file: &Path, config: &Config, json_mode: bool) -> Result<(), TopicMapError> {
    let result = read_events(file, &config.limits)
        .and_then(|events| Session::new(config.ingest.clone()).ingest(events));

    match &result {
        Ok(report) if json_mode => print_json(&serde_json::json!({
            "valid": true,
            "report": report,
        }))?,
        Ok(report) => {
            println!("{}: OK", file.display());
            println!("Events:  {}", report.events);
            println!("Topics:  {}", report.topics);
        }
        Err(e) if json_mode => print_json(&serde_json::json!({
            "valid": false,
            "error": e.to_string(),
        }))?,
        Err(e) => println!("{}: INVALID ({})", file.display(), e),
    }

    result.map(|_| ())
}

// =============================================================================
// TESTS
// =============================================================================

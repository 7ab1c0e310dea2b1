//! # Ingest Benchmarks
//!
//! Performance benchmarks for stream ingestion and merging.
//!
//! Run with: `cargo bench -p topica-core`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use topica_core::{Event, IngestConfig, Session, TopicMap, TopicMapSnapshot};

/// N topics, each with a name, an occurrence and one association to the
/// previous topic.
fn linked_stream(size: usize) -> Vec<Event> {
    let mut events = vec![Event::StartTopicMap];
    for i in 0..size {
        let sid = format!("http://ex/t{i}");
        events.extend([
            Event::StartTopic,
            Event::sid(&sid),
            Event::StartName,
            Event::value(&format!("Topic {i}")),
            Event::EndName,
            Event::StartOccurrence,
            Event::StartType,
            Event::sid("http://ex/homepage"),
            Event::EndType,
            Event::value(&format!("http://ex/page/{i}")),
            Event::EndOccurrence,
            Event::EndTopic,
        ]);
        if i > 0 {
            events.extend([
                Event::StartAssociation,
                Event::StartType,
                Event::sid("http://ex/follows"),
                Event::EndType,
                Event::StartRole,
                Event::StartType,
                Event::sid("http://ex/next"),
                Event::EndType,
                Event::StartPlayer,
                Event::sid(&sid),
                Event::EndPlayer,
                Event::EndRole,
                Event::StartRole,
                Event::StartType,
                Event::sid("http://ex/previous"),
                Event::EndType,
                Event::StartPlayer,
                Event::sid(&format!("http://ex/t{}", i - 1)),
                Event::EndPlayer,
                Event::EndRole,
                Event::EndAssociation,
            ]);
        }
    }
    events.push(Event::EndTopicMap);
    events
}

/// N topics asserted under item identifiers, then linked in a chain by
/// subject identifiers so every block triggers a merge.
fn merging_stream(size: usize) -> Vec<Event> {
    let mut events = vec![Event::StartTopicMap];
    for i in 0..size {
        events.extend([
            Event::StartTopic,
            Event::iid(&format!("#t{i}")),
            Event::StartOccurrence,
            Event::StartType,
            Event::sid("http://ex/label"),
            Event::EndType,
            Event::value("shared"),
            Event::EndOccurrence,
            Event::EndTopic,
        ]);
    }
    for i in 1..size {
        events.extend([
            Event::StartTopic,
            Event::iid(&format!("#t{}", i - 1)),
            Event::iid(&format!("#t{i}")),
            Event::EndTopic,
        ]);
    }
    events.push(Event::EndTopicMap);
    events
}

fn build(events: Vec<Event>) -> TopicMap {
    let mut session = Session::new(IngestConfig::default());
    session.ingest(events).expect("ingest");
    session.into_map()
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_stream_ingestion(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_ingestion");

    for size in [100, 1000, 5000].iter() {
        let events = linked_stream(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &events, |b, events| {
            b.iter(|| black_box(build(events.clone())));
        });
    }

    group.finish();
}

fn bench_topic_merging(c: &mut Criterion) {
    let mut group = c.benchmark_group("topic_merging");

    for size in [100, 500, 1000].iter() {
        let events = merging_stream(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &events, |b, events| {
            b.iter(|| black_box(build(events.clone())));
        });
    }

    group.finish();
}

fn bench_topic_map_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("topic_map_merge");

    for size in [100, 1000].iter() {
        let source = build(linked_stream(*size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &source, |b, source| {
            b.iter(|| {
                let mut session = Session::default();
                session.merge(source).expect("merge");
                black_box(session)
            });
        });
    }

    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");

    for size in [100, 1000].iter() {
        let map = build(linked_stream(*size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &map, |b, map| {
            b.iter(|| black_box(TopicMapSnapshot::capture(map)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_stream_ingestion,
    bench_topic_merging,
    bench_topic_map_merge,
    bench_snapshot,
);
criterion_main!(benches);

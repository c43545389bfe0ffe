//! Integration tests for the durable result store.

use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;

use harvester_core::queue::Job;
use harvester_core::resolver::SlotValue;
use harvester_core::sink::{
    OutputSchema, ResolvedRecord, ResultSink, SinkError, missing_jobs, read_records,
};
use tempfile::TempDir;

fn record(identifier: &str, reference: Option<&str>) -> ResolvedRecord {
    let job = Job::new(identifier, format!("https://listing.example.com/{identifier}"));
    match reference {
        Some(reference) => ResolvedRecord::new(
            &job,
            [
                SlotValue::found(reference),
                SlotValue::Missing,
                SlotValue::Missing,
            ],
        ),
        None => ResolvedRecord::all_missing(&job),
    }
}

#[tokio::test]
async fn test_concurrent_appends_never_interleave() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("results.csv");
    let sink = Arc::new(ResultSink::open(&path, OutputSchema::default()).unwrap());

    let mut handles = Vec::new();
    for task in 0..8 {
        let sink = Arc::clone(&sink);
        handles.push(tokio::spawn(async move {
            for i in 0..25 {
                // Quotes and commas force escaping, making torn rows detectable.
                let identifier = format!("co \"{task}\", {i}");
                sink.append(&record(&identifier, Some("https://cdn/a,b.pdf")))
                    .await
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(sink.appended(), 200);
    drop(sink);

    let records = read_records(&path, &OutputSchema::default()).unwrap();
    assert_eq!(records.len(), 200);
    let identifiers: HashSet<&str> = records.iter().map(|r| r.identifier.as_str()).collect();
    assert_eq!(identifiers.len(), 200);
    assert!(
        records
            .iter()
            .all(|r| r.slots[0] == SlotValue::found("https://cdn/a,b.pdf"))
    );
}

#[tokio::test]
async fn test_appended_rows_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("results.csv");

    {
        let sink = ResultSink::open(&path, OutputSchema::default()).unwrap();
        sink.append(&record("A", Some("x.pdf"))).await.unwrap();
        sink.append(&record("B", None)).await.unwrap();
    }

    let sink = ResultSink::open(&path, OutputSchema::default()).unwrap();
    let index = sink.completion_index();
    assert_eq!(index.len(), 2);
    assert!(index.contains_identifier("A"));
    assert!(index.contains(&Job::new("B", "https://listing.example.com/B")));
    assert!(!index.contains_identifier("C"));
}

#[tokio::test]
async fn test_crash_mid_row_keeps_complete_rows() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("results.csv");
    {
        let sink = ResultSink::open(&path, OutputSchema::default()).unwrap();
        sink.append(&record("A", Some("x.pdf"))).await.unwrap();
    }
    // Simulate a crash halfway through the next row.
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(&path)
        .unwrap();
    file.write_all(b"B,https://listing.example.com/B,--,").unwrap();
    drop(file);

    let sink = ResultSink::open(&path, OutputSchema::default()).unwrap();
    sink.append(&record("C", None)).await.unwrap();
    drop(sink);

    let records = read_records(&path, &OutputSchema::default()).unwrap();
    let identifiers: Vec<&str> = records.iter().map(|r| r.identifier.as_str()).collect();
    assert_eq!(identifiers, vec!["A", "C"]);
}

#[tokio::test]
async fn test_crash_inside_quoted_multiline_field_keeps_complete_rows() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("results.csv");
    {
        let sink = ResultSink::open(&path, OutputSchema::default()).unwrap();
        sink.append(&record("A", Some("x.pdf"))).await.unwrap();
    }
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(&path)
        .unwrap();
    file.write_all(b"\"Acme\n").unwrap();
    drop(file);

    for _ in 0..2 {
        let sink = ResultSink::open(&path, OutputSchema::default()).unwrap();
        assert_eq!(sink.completion_index().len(), 1);
    }
    let records = read_records(&path, &OutputSchema::default()).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].identifier, "A");
}

#[test]
fn test_foreign_header_is_rejected_and_left_untouched() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("results.csv");
    let original = "name,url,a,b,c\nA,u,--,--,--\n";
    std::fs::write(&path, original).unwrap();

    let result = ResultSink::open(&path, OutputSchema::default());

    assert!(matches!(result, Err(SinkError::Corrupt { .. })));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), original);
}

#[test]
fn test_second_writer_is_locked_out() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("results.csv");
    let _first = ResultSink::open(&path, OutputSchema::default()).unwrap();

    let second = ResultSink::open(&path, OutputSchema::default());

    assert!(matches!(second, Err(SinkError::Locked { .. })));
}

#[tokio::test]
async fn test_missing_jobs_selects_all_missing_rows() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("results.csv");
    {
        let sink = ResultSink::open(&path, OutputSchema::default()).unwrap();
        sink.append(&record("A", Some("x.pdf"))).await.unwrap();
        sink.append(&record("B", None)).await.unwrap();
        sink.append(&record("C", None)).await.unwrap();
    }

    let jobs = missing_jobs(&path, &OutputSchema::default()).unwrap();

    let identifiers: Vec<&str> = jobs.iter().map(|j| j.identifier.as_str()).collect();
    assert_eq!(identifiers, vec!["B", "C"]);
    assert_eq!(jobs[0].target, "https://listing.example.com/B");
}

#[tokio::test]
async fn test_custom_schema_round_trips_through_store() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("results.csv");
    let schema = OutputSchema {
        header: ["company", "url", "filing", "meeting", "registration"]
            .iter()
            .map(|s| (*s).to_string())
            .collect(),
        missing_sentinel: "N/A".to_string(),
    };
    {
        let sink = ResultSink::open(&path, schema.clone()).unwrap();
        sink.append(&record("A", None)).await.unwrap();
    }

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("company,url,filing,meeting,registration\n"));
    assert!(text.contains("A,https://listing.example.com/A,N/A,N/A,N/A\n"));

    let records = read_records(&path, &schema).unwrap();
    assert!(records[0].is_all_missing());
    assert!(matches!(
        read_records(&path, &OutputSchema::default()),
        Err(SinkError::Corrupt { .. })
    ));
}

//! Live window behaviour against real queue files written while tailing.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use acomms_core::{
    queue_path, FieldValue, LiveWindow, ParsedRecord, QueueStore, QueueType, TimeRange,
    WindowConfig, WindowStatus, Zoom,
};
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::watch;

fn at(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 10, 3, 12, 0, 0).unwrap() + chrono::Duration::seconds(secs)
}

/// Seconds past `at(0)`; test records are stamped with their line number.
fn line_of(record: &ParsedRecord) -> u64 {
    (record.timestamp - at(0)).num_seconds() as u64
}

fn science(line: u64) -> ParsedRecord {
    ParsedRecord::new(at(line as i64), QueueType::Science, line)
        .with_field("oxygen_concentration", FieldValue::Float(200.0 + line as f64))
}

fn fix(line: u64) -> ParsedRecord {
    ParsedRecord::new(at(line as i64), QueueType::PositionFix, line)
        .with_field("id", FieldValue::Text("SENTRY".into()))
        .with_field("latitude", FieldValue::Float(31.4 + line as f64 * 1e-4))
        .with_field("longitude", FieldValue::Float(-111.9))
        .with_field("depth", FieldValue::Float(1500.0))
}

fn append_raw(path: &Path, text: &str) {
    let mut f = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    f.write_all(text.as_bytes()).unwrap();
}

fn config(capacity: usize) -> WindowConfig {
    WindowConfig::default().with_capacity(capacity).unwrap()
}

#[test]
fn scenario_zoom_recent_and_back() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = QueueStore::open(dir.path()).unwrap();
    for line in 0..1000 {
        store.append(&science(line)).unwrap();
    }

    let mut window = LiveWindow::open(dir.path(), &[QueueType::Science], &config(3600));
    assert_eq!(window.tail().unwrap(), 1000);

    window.zoom(Some(Zoom::recent(10)));
    let zoomed: Vec<u64> = window
        .view(QueueType::Science)
        .iter()
        .map(|r| line_of(r))
        .collect();
    assert_eq!(zoomed, (990..1000).collect::<Vec<_>>());

    window.zoom(None);
    assert_eq!(window.view(QueueType::Science).len(), 1000);
}

#[test]
fn buffer_never_exceeds_capacity() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = QueueStore::open(dir.path()).unwrap();
    let mut window = LiveWindow::open(dir.path(), &[QueueType::Science], &config(50));

    for batch in 0..5u64 {
        for line in batch * 40..(batch + 1) * 40 {
            store.append(&science(line)).unwrap();
        }
        window.tail().unwrap();
        assert!(window.len(QueueType::Science) <= 50);
    }

    let kept: Vec<u64> = window
        .buffer(QueueType::Science)
        .map(line_of)
        .collect();
    assert_eq!(kept, (150..200).collect::<Vec<_>>());
}

#[test]
fn zoom_round_trip_restores_full_view() {
    let dir = tempfile::tempdir().unwrap();
    let mut window = LiveWindow::open(
        dir.path(),
        &[QueueType::Science, QueueType::PositionFix],
        &config(100),
    );
    for line in 0..30 {
        window.push(if line % 3 == 0 { fix(line) } else { science(line) });
    }
    let queues = [QueueType::Science, QueueType::PositionFix];
    let full: Vec<ParsedRecord> = window.merged_view(&queues).into_iter().cloned().collect();

    for zoom in [
        Zoom::recent(0),
        Zoom::recent(5),
        Zoom::recent(500),
        Zoom::range(TimeRange::between(at(10), at(12))),
        Zoom::range(TimeRange::since(at(100))),
    ] {
        window.zoom(Some(zoom));
        assert!(window.merged_view(&queues).len() <= full.len());
        window.zoom(None);
        let restored: Vec<ParsedRecord> =
            window.merged_view(&queues).into_iter().cloned().collect();
        assert_eq!(restored, full);
    }
}

#[test]
fn merged_view_is_time_ordered_across_queues() {
    let dir = tempfile::tempdir().unwrap();
    let mut window = LiveWindow::open(
        dir.path(),
        &[QueueType::Science, QueueType::PositionFix],
        &config(100),
    );
    window.push(science(5));
    window.push(fix(2));
    window.push(science(1));
    window.push(fix(5));

    let merged = window.merged_view(&[QueueType::Science, QueueType::PositionFix]);
    let order: Vec<(u64, QueueType)> = merged.iter().map(|r| (r.source_line, r.queue)).collect();
    assert_eq!(
        order,
        vec![
            (1, QueueType::Science),
            (2, QueueType::PositionFix),
            (5, QueueType::Science),
            (5, QueueType::PositionFix),
        ]
    );
}

#[test]
fn tails_file_created_after_open_and_waits_for_partial_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = queue_path(dir.path(), QueueType::Science);
    let mut window = LiveWindow::open(dir.path(), &[QueueType::Science], &config(10));

    assert_eq!(window.tail().unwrap(), 0);

    let first = science(0).to_line().unwrap();
    let second = science(1).to_line().unwrap();
    let (head, rest) = second.split_at(second.len() / 2);
    append_raw(&path, &format!("{first}\n{head}"));
    assert_eq!(window.tail().unwrap(), 1);

    append_raw(&path, &format!("{rest}\n"));
    assert_eq!(window.tail().unwrap(), 1);
    assert_eq!(window.len(QueueType::Science), 2);
}

#[test]
fn replaced_queue_file_restarts_buffer() {
    let dir = tempfile::tempdir().unwrap();
    let path = queue_path(dir.path(), QueueType::Science);
    let mut store = QueueStore::open(dir.path()).unwrap();
    for line in 0..5 {
        store.append(&science(line)).unwrap();
    }
    drop(store);

    let mut window = LiveWindow::open(dir.path(), &[QueueType::Science], &config(10));
    window.tail().unwrap();
    assert_eq!(window.len(QueueType::Science), 5);

    std::fs::write(&path, format!("{}\n", science(40).to_line().unwrap())).unwrap();
    window.tail().unwrap();
    let kept: Vec<u64> = window
        .buffer(QueueType::Science)
        .map(line_of)
        .collect();
    assert_eq!(kept, vec![40]);
}

#[tokio::test]
async fn run_renders_until_shutdown_then_closes() {
    let dir = tempfile::tempdir().unwrap();
    let path = queue_path(dir.path(), QueueType::Science);
    append_raw(&path, &format!("{}\n", science(0).to_line().unwrap()));

    let mut window = LiveWindow::open(dir.path(), &[QueueType::Science], &config(10));
    let (tx, rx) = watch::channel(false);

    let writer = {
        let path = path.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            append_raw(&path, &format!("{}\n", science(1).to_line().unwrap()));
            tokio::time::sleep(Duration::from_millis(60)).await;
            tx.send(true).unwrap();
        })
    };

    let mut seen = Vec::new();
    window
        .run(Duration::from_millis(5), rx, |w| {
            seen.push(w.len(QueueType::Science));
        })
        .await
        .unwrap();
    writer.await.unwrap();

    assert_eq!(seen.first(), Some(&1));
    assert_eq!(seen.last(), Some(&2));
    assert_eq!(window.status(), WindowStatus::Closed);
    assert_eq!(window.total_len(), 0);
}

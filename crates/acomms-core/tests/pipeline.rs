//! End-to-end classification tests: raw log in, queue files out.
//!
//! Covers determinism across runs, resuming from any point in the raw log,
//! and isolation of malformed lines.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use acomms_core::{
    digest_queue_files, Classifier, ClassifierConfig, ClassifierCursor, CursorFile, FieldValue,
    ParsedRecord, QueueStore, QueueType, RawLogWriter, RuleSet,
};
use chrono::{TimeZone, Utc};

const RAW_LOG: &str = "\
2021-10-03T12:00:01.123,USBL,SENTRY,31.402,-111.933,1500.2
2021-10-03T12:01:15.000,SENTRY,STATUS,battery=85,heading=270
garbage-no-delimiter
2021-10-03T12:01:16.000,SMS:5509,B1,R1,A0|SDQ 0:1294,3653,2514,64.6,352.0,1.00,-0.05,A0,0,31.5,1287,3688,2514,0,0,0,0,0,0,0,260
2021-10-03T12:01:17.000,SMS:5509,B1,R1,A0|SDQ 34:201.5 12.25 40.1 2.31 34.6 1840.0
2021-10-03T12:01:18.000,USBL,SHIP,31.400,-111.930,0.0

2021-10-03T12:01:19.000,VFR 2021/10/03 12:01:18.900 2 0 SOLN_USBL -111.934 31.403 -1501.0 0.000 10 0.00 0.00
2021-10-03T12:01:20.000,USBL,JASON,31.401,-111.931,1480.5
2021-10-03T12:01:21.000,SENTRY,SCIENCE,o2=201.5,temp=2.31,note=ok
2021-10-03T12:01:22.000,SMS:5509,B1,R1,A0|SDQ 7:1,2,3
2021-10-03T12:01:23.000,SMS:5509,B1,R1,A0|SDQ 100:20210904T142137,5.9555,917
";

struct Workspace {
    dir: tempfile::TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn raw(&self) -> PathBuf {
        self.dir.path().join("raw.txt")
    }

    fn queues(&self) -> PathBuf {
        self.dir.path().join("queues")
    }

    fn cursor_file(&self) -> CursorFile {
        CursorFile::new(self.queues().join("cursor.json"))
    }

    fn append(&self, bytes: &[u8]) {
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.raw())
            .unwrap();
        f.write_all(bytes).unwrap();
    }

    fn classifier(&self) -> Classifier {
        Classifier::open(
            self.raw(),
            QueueStore::open(self.queues()).unwrap(),
            self.cursor_file(),
            RuleSet::new(ClassifierConfig::default()),
        )
        .unwrap()
    }

    fn classify(&self) {
        self.classifier().classify_pending().unwrap();
    }

    fn digests(&self) -> BTreeMap<QueueType, String> {
        digest_queue_files(&self.queues()).unwrap()
    }

    fn records(&self, queue: QueueType) -> Vec<ParsedRecord> {
        read_records(&self.queues(), queue)
    }
}

fn read_records(dir: &Path, queue: QueueType) -> Vec<ParsedRecord> {
    match std::fs::read_to_string(dir.join(queue.file_name())) {
        Ok(text) => text
            .lines()
            .map(|l| ParsedRecord::from_line(l).unwrap())
            .collect(),
        Err(_) => Vec::new(),
    }
}

fn single_pass_digests() -> BTreeMap<QueueType, String> {
    let ws = Workspace::new();
    ws.append(RAW_LOG.as_bytes());
    ws.classify();
    ws.digests()
}

#[test]
fn scenario_usbl_position_fix() {
    let ws = Workspace::new();
    ws.append(RAW_LOG.as_bytes());
    ws.classify();

    let fixes = ws.records(QueueType::PositionFix);
    let fix = &fixes[0];
    assert_eq!(
        fix.timestamp,
        Utc.with_ymd_and_hms(2021, 10, 3, 12, 0, 1).unwrap() + chrono::Duration::milliseconds(123)
    );
    assert_eq!(fix.field("id"), Some(&FieldValue::Text("SENTRY".into())));
    assert_eq!(fix.field("latitude"), Some(&FieldValue::Float(31.402)));
    assert_eq!(fix.field("longitude"), Some(&FieldValue::Float(-111.933)));
    assert_eq!(fix.field("depth"), Some(&FieldValue::Float(1500.2)));
}

#[test]
fn scenario_key_value_status() {
    let ws = Workspace::new();
    ws.append(RAW_LOG.as_bytes());
    ws.classify();

    let status = ws.records(QueueType::Status);
    let kv = status
        .iter()
        .find(|r| r.field("battery").is_some())
        .unwrap();
    assert_eq!(kv.fields.len(), 2);
    assert_eq!(kv.field("battery"), Some(&FieldValue::Int(85)));
    assert_eq!(kv.field("heading"), Some(&FieldValue::Int(270)));
}

#[test]
fn every_queue_receives_its_lines() {
    let ws = Workspace::new();
    ws.append(RAW_LOG.as_bytes());
    let summary = ws.classifier().classify_pending().unwrap();

    assert_eq!(summary.lines, 12);
    assert_eq!(summary.rejected, 2);
    assert_eq!(summary.routed, 9);

    let seconds = |q| -> Vec<u32> {
        ws.records(q)
            .iter()
            .map(|r| chrono::Timelike::second(&r.timestamp))
            .collect()
    };
    assert_eq!(seconds(QueueType::PositionFix), vec![1, 19]);
    assert_eq!(seconds(QueueType::Status), vec![15, 16]);
    assert_eq!(seconds(QueueType::Science), vec![17, 21]);
    assert_eq!(seconds(QueueType::Ship), vec![18]);
    assert_eq!(seconds(QueueType::OtherAsset), vec![20]);
    assert_eq!(seconds(QueueType::Experimental), vec![23]);
}

#[test]
fn replay_is_byte_identical() {
    let first = single_pass_digests();
    let second = single_pass_digests();
    assert_eq!(first, second);
    assert_eq!(first.len(), QueueType::ALL.len());
}

#[test]
fn rerun_from_zero_cursor_changes_nothing() {
    let ws = Workspace::new();
    ws.append(RAW_LOG.as_bytes());
    ws.classify();
    let before = ws.digests();

    let mut again = Classifier::with_cursor(
        ws.raw(),
        QueueStore::open(ws.queues()).unwrap(),
        ws.cursor_file(),
        RuleSet::new(ClassifierConfig::default()),
        ClassifierCursor::default(),
    )
    .unwrap();
    let summary = again.classify_pending().unwrap();
    assert_eq!(summary.routed, 9);
    assert_eq!(ws.digests(), before);
}

#[test]
fn resumes_from_any_split_point() {
    let expected = single_pass_digests();
    let bytes = RAW_LOG.as_bytes();

    for split in 0..=bytes.len() {
        let ws = Workspace::new();
        ws.append(&bytes[..split]);
        ws.classify();
        ws.append(&bytes[split..]);
        ws.classify();
        assert_eq!(ws.digests(), expected, "split at byte {split}");
    }
}

#[test]
fn stale_cursor_after_crash_converges() {
    let expected = single_pass_digests();
    let lines: Vec<&str> = RAW_LOG.split_inclusive('\n').collect();

    // Cursors as they were persisted after each prefix of the log.
    let snapshots: Vec<ClassifierCursor> = (0..=lines.len())
        .map(|n| {
            let ws = Workspace::new();
            ws.append(lines[..n].concat().as_bytes());
            let mut classifier = ws.classifier();
            classifier.classify_pending().unwrap();
            classifier.cursor().clone()
        })
        .collect();

    // Crash after queue appends but before the cursor write: the cursor on
    // disk lags behind what the queue files already hold.
    for stale in &snapshots {
        let ws = Workspace::new();
        ws.append(RAW_LOG.as_bytes());
        ws.classify();
        ws.cursor_file().store(stale).unwrap();
        ws.classify();
        assert_eq!(ws.digests(), expected, "cursor stale at line {}", stale.line);
    }
}

const MALFORMED: [&str; 3] = [
    "garbage-no-delimiter",
    "2021-10-03T12:01:30.000,USBL,SENTRY,north,-111.933,1500.2",
    "2021-10-03T12:01:31.000,SMS:5509,B1,R1,A0|SDQ 34:201.5 12.25",
];

#[test]
fn malformed_line_at_any_position_leaves_queues_identical() {
    let clean: String = RAW_LOG
        .lines()
        .filter(|l| *l != "garbage-no-delimiter")
        .map(|l| format!("{l}\n"))
        .collect();
    let expected = {
        let ws = Workspace::new();
        ws.append(clean.as_bytes());
        ws.classify();
        ws.digests()
    };

    let lines: Vec<&str> = clean.lines().collect();
    for at in 0..=lines.len() {
        let bad = MALFORMED[at % MALFORMED.len()];
        let mut raw = lines.clone();
        raw.insert(at, bad);
        let text: String = raw.iter().map(|l| format!("{l}\n")).collect();

        let ws = Workspace::new();
        ws.append(text.as_bytes());
        let summary = ws.classifier().classify_pending().unwrap();
        assert_eq!(summary.routed, 9, "{bad:?} at line {at}");
        assert_eq!(ws.digests(), expected, "{bad:?} at line {at}");
    }
}

#[test]
fn garbage_before_a_fix_does_not_change_its_record() {
    let fix = "2021-10-03T12:00:01.123,USBL,SENTRY,31.402,-111.933,1500.2\n";

    let alone = Workspace::new();
    alone.append(fix.as_bytes());
    alone.classify();

    let after_garbage = Workspace::new();
    after_garbage.append(format!("garbage-no-delimiter\n{fix}").as_bytes());
    after_garbage.classify();

    let digests = alone.digests();
    assert_eq!(digests.len(), 1);
    assert_eq!(after_garbage.digests(), digests);
}

#[test]
fn torn_raw_line_is_rejected_after_writer_restart() {
    let ws = Workspace::new();
    // Listener died while writing a fix; the depth was cut from 1500.2 to 15.
    ws.append(b"2021-10-03T12:00:01.123000Z,USBL,SENTRY,31.402,-111.933,15");

    let mut writer = RawLogWriter::open(ws.raw()).unwrap();
    writer
        .append_datagram(
            Utc.with_ymd_and_hms(2021, 10, 3, 12, 0, 2).unwrap(),
            "127.0.0.1:5000",
            "USBL,SENTRY,31.403,-111.934,1500.4",
        )
        .unwrap();

    let summary = ws.classifier().classify_pending().unwrap();
    assert_eq!(summary.lines, 2);
    assert_eq!(summary.rejected, 1);
    assert_eq!(summary.routed, 1);

    let fixes = ws.records(QueueType::PositionFix);
    assert_eq!(fixes.len(), 1);
    assert_eq!(fixes[0].field("depth"), Some(&FieldValue::Float(1500.4)));
}

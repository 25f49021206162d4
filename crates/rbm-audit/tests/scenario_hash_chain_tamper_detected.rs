//! Audit hash chain integrity.
//!
//! GREEN when:
//! - an untampered log of reconcile events verifies with the right line count
//! - editing one payload breaks verification at exactly that line
//! - deleting a line breaks verification at the line after the gap

use rbm_audit::{verify_hash_chain, verify_hash_chain_str, AuditSink, AuditWriter, VerifyResult};
use rbm_reconcile::{EventSink, ItemType, ReconcileEvent};
use uuid::Uuid;

fn write_five_events(path: &std::path::Path) {
    let mut sink = AuditSink::new(AuditWriter::new(path, true).unwrap(), Uuid::new_v4());
    for i in 0..5 {
        sink.emit(&ReconcileEvent::Created {
            name: format!("perm_{i}"),
            item_type: ItemType::Permission,
        });
    }
    sink.finish().unwrap();
}

#[test]
fn untampered_chain_verifies_valid() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");
    write_five_events(&path);

    assert_eq!(
        verify_hash_chain(&path).unwrap(),
        VerifyResult::Valid { lines: 5 }
    );
}

#[test]
fn tampered_payload_detected_at_its_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");
    write_five_events(&path);

    let content = std::fs::read_to_string(&path).unwrap();
    let tampered: Vec<String> = content
        .lines()
        .enumerate()
        .map(|(i, l)| {
            if i == 2 {
                l.replace("perm_2", "perm_X")
            } else {
                l.to_string()
            }
        })
        .collect();

    match verify_hash_chain_str(&tampered.join("\n")).unwrap() {
        VerifyResult::Broken { line, reason } => {
            assert_eq!(line, 3);
            assert!(reason.contains("hash_self mismatch"), "got: {reason}");
        }
        other => panic!("tampering must be detected, got {other:?}"),
    }
}

#[test]
fn deleted_line_detected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");
    write_five_events(&path);

    let content = std::fs::read_to_string(&path).unwrap();
    let without_second: Vec<&str> = content
        .lines()
        .enumerate()
        .filter(|(i, _)| *i != 1)
        .map(|(_, l)| l)
        .collect();

    match verify_hash_chain_str(&without_second.join("\n")).unwrap() {
        VerifyResult::Broken { line, reason } => {
            assert_eq!(line, 2);
            assert!(reason.contains("hash_prev mismatch"), "got: {reason}");
        }
        other => panic!("deletion must be detected, got {other:?}"),
    }
}

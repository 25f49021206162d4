use anyhow::{anyhow, Result};
use tracing::error;
use uuid::Uuid;

use rbm_reconcile::{EventSink, ReconcileEvent};

use crate::AuditWriter;

/// Topic under which reconcile events are written.
pub const RBAC_TOPIC: &str = "rbac";

/// [`EventSink`] that appends every reconcile event to an audit log.
///
/// `emit` cannot fail, so the first write error is kept and every later event
/// is dropped. [`AuditSink::finish`] hands the error back.
pub struct AuditSink {
    writer: AuditWriter,
    run_id: Uuid,
    written: usize,
    failure: Option<anyhow::Error>,
}

impl AuditSink {
    pub fn new(writer: AuditWriter, run_id: Uuid) -> Self {
        Self {
            writer,
            run_id,
            written: 0,
            failure: None,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn written(&self) -> usize {
        self.written
    }

    /// The writer back, or the first error hit while writing.
    pub fn finish(self) -> Result<AuditWriter> {
        match self.failure {
            Some(e) => Err(e.context(format!(
                "audit log {:?} is incomplete after {} event(s)",
                self.writer.path(),
                self.written
            ))),
            None => Ok(self.writer),
        }
    }

    fn record(&mut self, event: &ReconcileEvent) -> Result<()> {
        let payload = serde_json::to_value(event)
            .map_err(|e| anyhow!("serialize reconcile event: {e}"))?;
        self.writer
            .append(self.run_id, RBAC_TOPIC, event.kind(), payload)?;
        Ok(())
    }
}

impl EventSink for AuditSink {
    fn emit(&mut self, event: &ReconcileEvent) {
        if self.failure.is_some() {
            return;
        }
        match self.record(event) {
            Ok(()) => self.written += 1,
            Err(e) => {
                error!(error = %e, event = event.kind(), "audit write failed");
                self.failure = Some(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rbm_reconcile::ItemType;

    #[test]
    fn events_land_under_rbac_topic_with_kind_as_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let mut sink = AuditSink::new(AuditWriter::new(&path, true).unwrap(), Uuid::new_v4());

        sink.emit(&ReconcileEvent::Created {
            name: "editor".to_string(),
            item_type: ItemType::Role,
        });
        assert_eq!(sink.written(), 1);
        sink.finish().unwrap();

        let line = std::fs::read_to_string(&path).unwrap();
        let v: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(v["topic"], "rbac");
        assert_eq!(v["event_type"], "created");
        assert_eq!(v["payload"]["name"], "editor");
    }

    #[test]
    fn first_write_error_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened for appending.
        let mut sink = AuditSink::new(AuditWriter::new(dir.path(), false).unwrap(), Uuid::new_v4());

        sink.emit(&ReconcileEvent::RuleUnchanged {
            name: "r".to_string(),
        });
        sink.emit(&ReconcileEvent::RuleUnchanged {
            name: "r".to_string(),
        });

        assert_eq!(sink.written(), 0);
        assert!(sink.finish().is_err());
    }
}

use std::sync::{Arc, Mutex};

use stagegate_core::errors::AuditError;
use stagegate_core::record::{EvaluationRecord, NewEvaluation};
use stagegate_core::traits::{AuditSink, Clock, SystemClock};

/// In-process audit log. Ids start at 1 and follow insertion order.
pub struct MemoryAuditSink {
    records: Mutex<Vec<EvaluationRecord>>,
    clock: Arc<dyn Clock>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            clock,
        }
    }

    /// Snapshot of every stored record, oldest first.
    pub fn records(&self) -> Vec<EvaluationRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for MemoryAuditSink {
    fn append(&self, evaluation: NewEvaluation) -> Result<EvaluationRecord, AuditError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| AuditError::WriteFailure("audit log lock poisoned".into()))?;
        let record = evaluation.into_record(records.len() as u64 + 1, self.clock.now());
        records.push(record.clone());
        Ok(record)
    }
}

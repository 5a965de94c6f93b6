use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use stagegate_core::errors::AuditError;
use stagegate_core::record::{EvaluationRecord, NewEvaluation};
use stagegate_core::traits::{AuditSink, Clock, SystemClock};

const GENESIS: &str = "genesis";

fn line_hash(line: &str) -> String {
    format!("sha256:{:x}", Sha256::digest(line.as_bytes()))
}

fn non_empty_lines(content: &str) -> impl Iterator<Item = (usize, &str)> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
}

fn read_log(path: &Path) -> Result<String> {
    if !path.exists() {
        return Ok(String::new());
    }
    std::fs::read_to_string(path).with_context(|| format!("cannot read audit {}", path.display()))
}

/// Append one evaluation record to a JSONL log, maintaining the hash chain.
///
/// Each line carries a `prev_hash` field holding the SHA-256 of the previous
/// line; the first line uses "genesis". Returns the hash of the new line.
pub fn append_entry(path: &Path, record: &EvaluationRecord) -> Result<String> {
    let content = read_log(path)?;
    let prev_hash = non_empty_lines(&content)
        .last()
        .map(|(_, line)| line_hash(line))
        .unwrap_or_else(|| GENESIS.to_string());

    let mut entry = serde_json::to_value(record)?;
    if let Some(obj) = entry.as_object_mut() {
        obj.insert("prev_hash".into(), Value::String(prev_hash));
    }
    let line = serde_json::to_string(&entry)?;

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("cannot open audit {}", path.display()))?;
    if !content.is_empty() && !content.ends_with('\n') {
        file.write_all(b"\n")?;
    }
    writeln!(file, "{line}").with_context(|| format!("cannot write audit {}", path.display()))?;

    Ok(line_hash(&line))
}

/// Verify the hash chain in an audit log file.
///
/// Every entry is checked against its predecessor, which leaves the newest
/// entry unanchored; use [`verify_checkpoint`] to pin the head.
///
/// Returns the number of valid entries.
pub fn verify_chain(path: &Path) -> Result<u64> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read audit {}", path.display()))?;
    Ok(chain_hashes(&content)?.len() as u64)
}

/// Walk the chain and return each entry's line hash, oldest first.
fn chain_hashes(content: &str) -> Result<Vec<String>> {
    let mut hashes: Vec<String> = Vec::new();
    let mut prev_hash = GENESIS.to_string();

    for (i, line) in non_empty_lines(content) {
        let entry: Value = serde_json::from_str(line)
            .with_context(|| format!("invalid JSON at line {}", i + 1))?;
        let entry_prev = entry
            .get("prev_hash")
            .and_then(Value::as_str)
            .unwrap_or(GENESIS);

        if entry_prev != prev_hash {
            return Err(AuditError::ChainCorruption {
                entry: hashes.len() as u64,
                expected: prev_hash,
                found: entry_prev.to_string(),
            }
            .into());
        }

        prev_hash = line_hash(line);
        hashes.push(prev_hash.clone());
    }

    Ok(hashes)
}

/// Chain head and entry count recorded at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub audit_file: String,
    pub entries: u64,
    pub chain_head: String,
    pub created_at: DateTime<Utc>,
}

/// Verify the chain and write a checkpoint recording its current head.
pub fn create_checkpoint(
    audit_path: &Path,
    checkpoint_path: &Path,
    clock: &dyn Clock,
) -> Result<Checkpoint> {
    let content = std::fs::read_to_string(audit_path)
        .with_context(|| format!("cannot read audit {}", audit_path.display()))?;
    let hashes = chain_hashes(&content)?;

    let checkpoint = Checkpoint {
        audit_file: audit_path.display().to_string(),
        entries: hashes.len() as u64,
        chain_head: hashes.last().cloned().unwrap_or_else(|| GENESIS.to_string()),
        created_at: clock.now(),
    };
    let json = serde_json::to_string_pretty(&checkpoint)?;
    std::fs::write(checkpoint_path, json)
        .with_context(|| format!("cannot write checkpoint {}", checkpoint_path.display()))?;
    Ok(checkpoint)
}

/// Verify the chain and that its first `entries` entries still end at the
/// checkpoint's head. Entries appended after the checkpoint are accepted.
///
/// Returns the total number of entries.
pub fn verify_checkpoint(audit_path: &Path, checkpoint_path: &Path) -> Result<u64> {
    let raw = std::fs::read_to_string(checkpoint_path)
        .with_context(|| format!("cannot read checkpoint {}", checkpoint_path.display()))?;
    let checkpoint: Checkpoint = serde_json::from_str(&raw)
        .with_context(|| format!("{}: invalid checkpoint", checkpoint_path.display()))?;

    let content = std::fs::read_to_string(audit_path)
        .with_context(|| format!("cannot read audit {}", audit_path.display()))?;
    let hashes = chain_hashes(&content)?;

    let head = match checkpoint.entries {
        0 => Some(GENESIS.to_string()),
        n => usize::try_from(n - 1)
            .ok()
            .and_then(|i| hashes.get(i))
            .cloned(),
    };
    if head.as_deref() != Some(checkpoint.chain_head.as_str()) {
        return Err(AuditError::CheckpointMismatch {
            entries: checkpoint.entries,
            expected: checkpoint.chain_head,
            found: head.unwrap_or_else(|| format!("log has only {} entries", hashes.len())),
        }
        .into());
    }
    Ok(hashes.len() as u64)
}

/// Read every record back, oldest first. Does not verify the chain.
pub fn read_records(path: &Path) -> Result<Vec<EvaluationRecord>> {
    let content = read_log(path)?;
    non_empty_lines(&content)
        .map(|(i, line)| {
            let mut entry: Value = serde_json::from_str(line)
                .with_context(|| format!("invalid JSON at line {}", i + 1))?;
            if let Some(obj) = entry.as_object_mut() {
                obj.remove("prev_hash");
            }
            serde_json::from_value(entry)
                .with_context(|| format!("invalid evaluation record at line {}", i + 1))
        })
        .collect()
}

/// Audit sink writing hash-chained JSONL. Single writer per file.
pub struct JsonlAuditSink {
    path: PathBuf,
    clock: Arc<dyn Clock>,
    next_id: Mutex<u64>,
}

impl JsonlAuditSink {
    /// Open (or prepare to create) a log, continuing ids after the last record.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with_clock(path, Arc::new(SystemClock))
    }

    pub fn open_with_clock(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Result<Self> {
        let path = path.into();
        let last_id = read_records(&path)?
            .iter()
            .map(|r| r.id)
            .max()
            .unwrap_or(0);
        Ok(Self {
            path,
            clock,
            next_id: Mutex::new(last_id + 1),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonlAuditSink {
    fn append(&self, evaluation: NewEvaluation) -> Result<EvaluationRecord, AuditError> {
        let mut next_id = self
            .next_id
            .lock()
            .map_err(|_| AuditError::WriteFailure("audit log lock poisoned".into()))?;
        let record = evaluation.into_record(*next_id, self.clock.now());
        append_entry(&self.path, &record)
            .map_err(|e| AuditError::WriteFailure(format!("{e:#}")))?;
        *next_id += 1;
        Ok(record)
    }
}

//! Append-only evaluation audit sinks.

pub mod audit_log;
pub mod memory;

pub use audit_log::JsonlAuditSink;
pub use memory::MemoryAuditSink;

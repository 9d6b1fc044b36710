//! Write-only destination for structured episode records.

use contracts::LogRecord;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("log sink rejected record: {0}")]
    Rejected(String),
}

/// Receives records in causal order; the environment never reads them back.
pub trait StructuredLogSink {
    fn append(&mut self, record: LogRecord) -> Result<(), SinkError>;

    /// Called once per settlement after the round's records were appended.
    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

impl<S: StructuredLogSink + ?Sized> StructuredLogSink for Box<S> {
    fn append(&mut self, record: LogRecord) -> Result<(), SinkError> {
        (**self).append(record)
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        (**self).flush()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryLogSink {
    records: Vec<LogRecord>,
    flushes: usize,
}

impl MemoryLogSink {
    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    pub fn flush_count(&self) -> usize {
        self.flushes
    }
}

impl StructuredLogSink for MemoryLogSink {
    fn append(&mut self, record: LogRecord) -> Result<(), SinkError> {
        self.records.push(record);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.flushes += 1;
        Ok(())
    }
}

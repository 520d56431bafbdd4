//! Progress and diagnostic reporting
//!
//! Pipeline stages describe what they did as [`Record`]s and hand them to a
//! [`Reporter`]. The caller decides where records go: the `log` facade, a
//! markdown file, memory, or nowhere.

use crate::types::CentumResult;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

/// One reported event: a title and ordered key/value details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub title: String,
    pub fields: Vec<(String, String)>,
}

impl Record {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.fields.push((key.into(), value.to_string()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Markdown rendering: a header followed by one bullet per field
    pub fn to_markdown(&self) -> String {
        let mut out = format!("# {}\n", self.title);
        for (key, value) in &self.fields {
            out.push_str(&format!("- **{}:** {}\n", key, value));
        }
        out
    }
}

/// Sink for pipeline records
pub trait Reporter: Send + Sync {
    fn report(&self, record: &Record);
}

/// Discards every record
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn report(&self, _record: &Record) {}
}

/// Forwards records to the `log` facade at info level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&self, record: &Record) {
        if record.fields.is_empty() {
            log::info!("{}", record.title);
            return;
        }
        let details: Vec<String> = record
            .fields
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        log::info!("{}: {}", record.title, details.join(", "));
    }
}

/// Keeps records in memory
#[derive(Debug, Default)]
pub struct MemoryReporter {
    records: Mutex<Vec<Record>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<Record> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn titles(&self) -> Vec<String> {
        self.records().into_iter().map(|r| r.title).collect()
    }
}

impl Reporter for MemoryReporter {
    fn report(&self, record: &Record) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
    }
}

/// Appends a markdown section per record to a file
pub struct MarkdownReporter {
    writer: Mutex<BufWriter<File>>,
}

impl MarkdownReporter {
    /// Create (or truncate) the report file
    pub fn create<P: AsRef<Path>>(path: P) -> CentumResult<Self> {
        log::debug!("Writing analysis report to {}", path.as_ref().display());
        let file = File::create(path)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Open the report file for appending
    pub fn append<P: AsRef<Path>>(path: P) -> CentumResult<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl Reporter for MarkdownReporter {
    fn report(&self, record: &Record) {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let written = writer
            .write_all(record.to_markdown().as_bytes())
            .and_then(|_| writer.flush());
        if let Err(e) = written {
            log::warn!("Failed to write report record '{}': {}", record.title, e);
        }
    }
}

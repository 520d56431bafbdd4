//! Output sinks for pipeline reporting

pub mod report;

pub use report::{LogReporter, MarkdownReporter, MemoryReporter, NullReporter, Record, Reporter};

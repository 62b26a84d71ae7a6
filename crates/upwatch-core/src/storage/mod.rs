pub mod model;
pub mod store;

pub use model::{LogRecord, Partition, ProbeResult};
pub use store::{CorruptPartition, LoadOutcome, LogStore, PARTITION_EXTENSION};

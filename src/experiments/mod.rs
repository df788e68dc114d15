pub mod config;
pub mod ingest;
pub mod report;
pub mod significance;
pub mod stats;

pub mod ingest;
pub mod setup;

//! Entity storage: the deduplicating repository, the author visit queue and
//! the tabular export sink.

mod export;
mod queue;
mod repository;

pub use export::{CsvExporter, ExportError, ExportPaths};
pub use queue::AuthorQueue;
pub use repository::{ExportSummary, ExportTables, Repository, RepositoryError};

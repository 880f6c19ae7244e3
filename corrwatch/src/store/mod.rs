//! Append-only sample persistence
//!
//! Every append is one durable write with no batching, so throughput is bounded by one storage
//! round-trip per sample. That is fine at sub-minute polling cadences.

mod memory;
mod sqlite;

pub use memory::InMemorySampleStore;
pub use sqlite::SqliteSampleStore;

use crate::{error::PersistenceError, sample::Sample};

/// Ordered, append-only collection of samples.
///
/// Implementations use interior mutability so a writer and concurrent readers can share one
/// handle. Reads see a consistent snapshot and never block on the writer for longer than a
/// single append.
pub trait SampleStore: Send + Sync {
    /// Idempotent initialisation of the underlying storage.
    fn ensure_schema(&self) -> Result<(), PersistenceError>;

    /// Durably record one sample.
    fn append(&self, sample: &Sample) -> Result<(), PersistenceError>;

    /// At most `limit` most recent samples in ascending timestamp order, empty if none exist.
    fn read_recent(&self, limit: usize) -> Result<Vec<Sample>, PersistenceError>;

    /// Number of recorded samples.
    fn len(&self) -> Result<usize, PersistenceError>;

    fn is_empty(&self) -> Result<bool, PersistenceError> {
        self.len().map(|len| len == 0)
    }
}

impl<S> SampleStore for std::sync::Arc<S>
where
    S: SampleStore + ?Sized,
{
    fn ensure_schema(&self) -> Result<(), PersistenceError> {
        (**self).ensure_schema()
    }

    fn append(&self, sample: &Sample) -> Result<(), PersistenceError> {
        (**self).append(sample)
    }

    fn read_recent(&self, limit: usize) -> Result<Vec<Sample>, PersistenceError> {
        (**self).read_recent(limit)
    }

    fn len(&self) -> Result<usize, PersistenceError> {
        (**self).len()
    }
}

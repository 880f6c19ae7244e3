use parking_lot::RwLock;

use super::SampleStore;
use crate::{error::PersistenceError, sample::Sample};

/// Process-local [`SampleStore`], used by tests and for dry runs without a database.
#[derive(Debug, Default)]
pub struct InMemorySampleStore {
    samples: RwLock<Vec<Sample>>,
}

impl InMemorySampleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SampleStore for InMemorySampleStore {
    fn ensure_schema(&self) -> Result<(), PersistenceError> {
        Ok(())
    }

    fn append(&self, sample: &Sample) -> Result<(), PersistenceError> {
        self.samples.write().push(sample.clone());
        Ok(())
    }

    fn read_recent(&self, limit: usize) -> Result<Vec<Sample>, PersistenceError> {
        let mut samples = self.samples.read().clone();
        samples.sort_by_key(|sample| sample.timestamp);
        let start = samples.len().saturating_sub(limit);
        Ok(samples.split_off(start))
    }

    fn len(&self) -> Result<usize, PersistenceError> {
        Ok(self.samples.read().len())
    }
}

//! Tracked state reader.

use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::error::Result;

use super::source::TrackedStateSource;
use super::types::{TrackedMap, TrackedState};

/// Reads what the declarative engine has recorded.
#[derive(Debug)]
pub struct TrackedStateReader<S: TrackedStateSource> {
    source: S,
}

impl<S: TrackedStateSource> TrackedStateReader<S> {
    /// Creates a reader over a state source.
    #[must_use]
    pub const fn new(source: S) -> Self {
        Self { source }
    }

    /// Returns the underlying source.
    #[must_use]
    pub const fn source(&self) -> &S {
        &self.source
    }

    /// Loads and parses the whole state. A missing state is empty.
    ///
    /// # Errors
    ///
    /// Returns a configuration-class error if the state is malformed or of
    /// an unsupported version, or a backend error if it cannot be fetched.
    pub async fn load(&self) -> Result<TrackedState> {
        match self.source.load_raw().await? {
            Some(raw) => {
                let state = TrackedState::parse(&raw)?;
                info!(
                    "Tracked state at {} has {} managed instances",
                    self.source.location(),
                    state.len()
                );
                Ok(state)
            }
            None => {
                debug!("No tracked state at {}", self.source.location());
                Ok(TrackedState::default())
            }
        }
    }

    /// Maps each catalog resource to its tracked state, if any.
    ///
    /// # Errors
    ///
    /// See [`TrackedStateReader::load`].
    pub async fn read_tracked(&self, catalog: &Catalog) -> Result<TrackedMap> {
        let state = self.load().await?;
        let tracked = state.for_catalog(catalog);
        debug!("{} of {} catalog resources are tracked", tracked.len(), catalog.len());
        Ok(tracked)
    }
}

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::debug;

use crate::stores::catalog::CatalogStore;

/// Delays list refetches until search input has settled.
///
/// The search text is applied to the catalog immediately,
/// so the list empties as soon as the user types.
/// The fetch is only issued once no newer input arrived within the window.
#[derive(Debug)]
pub struct SearchDebouncer {
    catalog: Arc<CatalogStore>,
    window: Duration,
    generation: AtomicU64,
}

impl SearchDebouncer {
    pub fn new(catalog: Arc<CatalogStore>, window: Duration) -> Self {
        Self {
            catalog,
            window,
            generation: AtomicU64::new(0),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Apply `search_query` and fetch the first page once the input settled.
    ///
    /// Returns whether this input led to a fetch,
    /// `false` if it was superseded by a later call.
    pub async fn search(&self, search_query: impl Into<String>) -> bool {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.catalog.set_search_query(search_query);

        tokio::time::sleep(self.window).await;

        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(generation, "search input superseded");
            return false;
        }
        self.catalog.fetch_list(true).await;
        true
    }
}

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use super::engine::Projection;

/// Generation handed out when a refresh starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RefreshTicket(u64);

impl RefreshTicket {
    pub fn generation(&self) -> u64 {
        self.0
    }
}

/// Holds the latest complete projection.
///
/// Results are swapped in whole; a refresh that finishes after a newer one has
/// already been published is discarded.
#[derive(Debug, Default)]
pub struct ProjectionSlot {
    issued: AtomicU64,
    published: Mutex<Option<(RefreshTicket, Arc<Projection>)>>,
}

impl ProjectionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> RefreshTicket {
        RefreshTicket(self.issued.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Publishes `projection` unless a newer refresh already did. Returns whether it was kept.
    pub fn publish(&self, ticket: RefreshTicket, projection: Projection) -> bool {
        let mut guard = self.published.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((current, _)) = guard.as_ref() {
            if *current >= ticket {
                debug!(
                    target: "engine",
                    stale = ticket.generation(),
                    current = current.generation(),
                    "dropping superseded projection"
                );
                return false;
            }
        }
        *guard = Some((ticket, Arc::new(projection)));
        true
    }

    pub fn current(&self) -> Option<Arc<Projection>> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|(_, projection)| Arc::clone(projection))
    }

    pub fn published_generation(&self) -> Option<u64> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|(ticket, _)| ticket.generation())
    }
}

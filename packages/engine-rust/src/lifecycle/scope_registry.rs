use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use opforge_core::{Event, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{InitialiserScopeProvider, ScopeError};

/// Default [`InitialiserScopeProvider`] that tracks open scopes.
///
/// Each acquisition gets a fresh correlation id and is recorded until it is
/// completed. Events share the registry's configuration properties, exposed
/// to expressions as `props`.
#[derive(Debug)]
pub struct ScopeRegistry {
    properties: Arc<BTreeMap<String, Value>>,
    open: DashMap<String, Instant>,
    /// Reserved before a scope is inserted into `open`, so `limit` holds
    /// under concurrent acquisition.
    reserved: AtomicUsize,
    acquired: AtomicU64,
    completed: AtomicU64,
    limit: Option<usize>,
}

impl ScopeRegistry {
    #[must_use]
    pub fn new(properties: Arc<BTreeMap<String, Value>>) -> Self {
        Self {
            properties,
            open: DashMap::new(),
            reserved: AtomicUsize::new(0),
            acquired: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            limit: None,
        }
    }

    /// Caps the number of simultaneously open scopes.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Scopes acquired but not yet completed.
    #[must_use]
    pub fn open_scopes(&self) -> usize {
        self.reserved.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn acquired_count(&self) -> u64 {
        self.acquired.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn completed_count(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    fn reserve(&self) -> Result<(), ScopeError> {
        let Some(limit) = self.limit else {
            self.reserved.fetch_add(1, Ordering::AcqRel);
            return Ok(());
        };
        self.reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |open| {
                (open < limit).then_some(open + 1)
            })
            .map(|_| ())
            .map_err(|_| ScopeError::Exhausted { limit })
    }
}

impl Default for ScopeRegistry {
    fn default() -> Self {
        Self::new(Arc::new(BTreeMap::new()))
    }
}

impl InitialiserScopeProvider for ScopeRegistry {
    fn acquire(&self) -> Result<Event, ScopeError> {
        self.reserve()?;

        let correlation_id = Uuid::new_v4().to_string();
        self.open.insert(correlation_id.clone(), Instant::now());
        self.acquired.fetch_add(1, Ordering::Relaxed);
        debug!(correlation_id = %correlation_id, "initialiser scope acquired");

        Ok(Event::new(correlation_id, Arc::clone(&self.properties)))
    }

    fn complete(&self, event: &Event) {
        match self.open.remove(event.correlation_id()) {
            Some((_, opened_at)) => {
                self.reserved.fetch_sub(1, Ordering::AcqRel);
                self.completed.fetch_add(1, Ordering::Relaxed);
                #[allow(clippy::cast_possible_truncation)]
                let held_us = opened_at.elapsed().as_micros() as u64;
                debug!(
                    correlation_id = event.correlation_id(),
                    held_us,
                    "initialiser scope completed"
                );
            }
            None => warn!(
                correlation_id = event.correlation_id(),
                "completion for unknown or already completed initialiser scope"
            ),
        }
    }
}

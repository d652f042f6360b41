//! Value-keyed memoization of limiter instances.

use std::sync::{
    Arc, OnceLock,
    atomic::{AtomicBool, Ordering},
};

use dashmap::DashMap;

use crate::{RequotaError, RuleSet};

/// Closed marker shared between a factory and every limiter it produced.
#[derive(Debug, Clone, Default)]
pub(crate) struct ClosedFlag(Arc<AtomicBool>);

impl ClosedFlag {
    pub fn is_closed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn ensure_open(&self) -> Result<(), RequotaError> {
        if self.is_closed() {
            return Err(RequotaError::ClosedFactory);
        }

        Ok(())
    }

    /// Mark as closed. Returns `true` for the call that performed the transition.
    pub fn close(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }
}

/// Cache that hands out exactly one limiter per distinct [`RuleSet`].
///
/// The map shard lock is only held while fetching or inserting the empty
/// [`OnceLock`] cell for a rule set. Construction happens inside the cell, so
/// racing first callers for the same rule set wait on that cell alone while
/// lookups for unrelated rule sets proceed.
#[derive(Debug)]
pub(crate) struct InstanceCache<L> {
    instances: DashMap<RuleSet, Arc<OnceLock<Arc<L>>>>,
    closed: ClosedFlag,
}

impl<L> InstanceCache<L> {
    pub fn new() -> Self {
        Self {
            instances: DashMap::new(),
            closed: ClosedFlag::default(),
        }
    }

    pub fn closed_flag(&self) -> &ClosedFlag {
        &self.closed
    }

    /// Return the limiter for `rules`, building it with `create` on first use.
    pub fn get_or_create(
        &self,
        rules: &RuleSet,
        create: impl FnOnce(&RuleSet) -> L,
    ) -> Result<Arc<L>, RequotaError> {
        self.closed.ensure_open()?;

        let cell = match self.instances.get(rules) {
            Some(cell) => Arc::clone(cell.value()),
            None => {
                let entry = self.instances.entry(rules.clone()).or_default();
                Arc::clone(entry.value())
            }
        };

        let instance = cell.get_or_init(|| {
            tracing::debug!(rules = rules.rules().len(), "requota.factory.create");
            Arc::new(create(rules))
        });

        // A close that raced with this lookup wins. The cell may have been
        // inserted after close cleared the map, so drop it again.
        if self.closed.is_closed() {
            self.instances.remove(rules);
            return Err(RequotaError::ClosedFactory);
        }

        Ok(Arc::clone(instance))
    }

    /// Number of distinct rule sets seen so far.
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Mark closed and drop every cached instance. Returns `true` on the first call.
    pub fn close(&self) -> bool {
        let transitioned = self.closed.close();
        self.instances.clear();
        transitioned
    }
}

//! Persistence boundary for experiments and variants
//!
//! Follows the same trait-at-the-seam pattern as the clock and cache:
//! - `Store` for reads and for opening transactions
//! - `StoreTransaction` for every write; dropping it without `commit` rolls back
//! - `InMemoryStore` as the bundled implementation (also used by tests)
//!
//! Status guards are part of the write: `update_experiment` and
//! `delete_experiment` take the status the row must still have and fail with
//! `StatusConflict` otherwise, the equivalent of
//! `UPDATE ... WHERE id = $1 AND status = $2`.

use crate::model::{
    Experiment, ExperimentStats, ExperimentStatus, ListQuery, PageWindow, SortField, SortOrder,
    Variant, VariantCounters,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Experiment {0} not found")]
    ExperimentNotFound(Uuid),

    #[error("Variant {0} not found")]
    VariantNotFound(Uuid),

    #[error("Experiment {id} is {actual}, expected {expected}")]
    StatusConflict {
        id: Uuid,
        expected: ExperimentStatus,
        actual: ExperimentStatus,
    },

    #[error("Record {0} already exists")]
    Duplicate(Uuid),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Field changes for `update_experiment`; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExperimentUpdate {
    pub status: Option<ExperimentStatus>,
    pub started_at: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_days: Option<u32>,
    pub winner_variant_id: Option<Uuid>,
    pub stop_reason: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ExperimentUpdate {
    pub fn apply_to(&self, experiment: &mut Experiment) {
        if let Some(status) = self.status {
            experiment.status = status;
        }
        if let Some(started_at) = self.started_at {
            experiment.started_at = Some(started_at);
        }
        if let Some(end_date) = self.end_date {
            experiment.end_date = Some(end_date);
        }
        if let Some(completed_at) = self.completed_at {
            experiment.completed_at = Some(completed_at);
        }
        if let Some(duration_days) = self.duration_days {
            experiment.duration_days = duration_days;
        }
        if let Some(winner) = self.winner_variant_id {
            experiment.winner_variant_id = Some(winner);
        }
        if let Some(reason) = &self.stop_reason {
            experiment.stop_reason = Some(reason.clone());
        }
        if let Some(updated_at) = self.updated_at {
            experiment.updated_at = updated_at;
        }
    }
}

/// Read access and transaction entry point
#[async_trait]
pub trait Store: Send + Sync {
    /// Open a transaction; writes are only visible after `commit`
    async fn begin(&self) -> Result<Box<dyn StoreTransaction + '_>, StoreError>;

    async fn find_experiment(&self, id: Uuid) -> Result<Option<Experiment>, StoreError>;

    async fn find_variant(&self, id: Uuid) -> Result<Option<Variant>, StoreError>;

    /// Variants of an experiment in creation order
    async fn list_variants(&self, experiment_id: Uuid) -> Result<Vec<Variant>, StoreError>;

    async fn count_variants(&self, experiment_id: Uuid) -> Result<usize, StoreError>;

    /// One page of experiments matching the query, plus the total match count
    async fn list_experiments(
        &self,
        query: &ListQuery,
        window: PageWindow,
    ) -> Result<(Vec<Experiment>, usize), StoreError>;

    /// Experiment counts per status for an organisation
    async fn status_counts(&self, org_id: &str) -> Result<ExperimentStats, StoreError>;
}

/// Unit of work against the store
#[async_trait]
pub trait StoreTransaction: Send {
    async fn create_experiment(&mut self, experiment: &Experiment) -> Result<(), StoreError>;

    async fn find_experiment(&mut self, id: Uuid) -> Result<Option<Experiment>, StoreError>;

    /// Apply `update` if the experiment is still in `expected` status
    ///
    /// `expected = None` skips the status check. Returns the updated row.
    async fn update_experiment(
        &mut self,
        id: Uuid,
        expected: Option<ExperimentStatus>,
        update: &ExperimentUpdate,
    ) -> Result<Experiment, StoreError>;

    /// Delete the experiment row if it is still in `expected` status
    async fn delete_experiment(
        &mut self,
        id: Uuid,
        expected: Option<ExperimentStatus>,
    ) -> Result<(), StoreError>;

    async fn create_variant(&mut self, variant: &Variant) -> Result<(), StoreError>;

    async fn list_variants(&mut self, experiment_id: Uuid) -> Result<Vec<Variant>, StoreError>;

    /// Delete every variant of an experiment, returning how many were removed
    async fn delete_variants(&mut self, experiment_id: Uuid) -> Result<usize, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Exported store contents, used to seed an `InMemoryStore`
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
pub struct Snapshot {
    #[serde(default)]
    pub experiments: Vec<Experiment>,
    #[serde(default)]
    pub variants: Vec<Variant>,
}

#[derive(Debug, Default)]
struct StoreState {
    experiments: HashMap<Uuid, Experiment>,
    /// Kept in insertion order so variant listings are stable
    variants: Vec<Variant>,
}

impl StoreState {
    fn variants_of(&self, experiment_id: Uuid) -> Vec<Variant> {
        self.variants
            .iter()
            .filter(|v| v.experiment_id == experiment_id)
            .cloned()
            .collect()
    }

    fn check_status(
        &self,
        id: Uuid,
        expected: Option<ExperimentStatus>,
    ) -> Result<&Experiment, StoreError> {
        let experiment = self
            .experiments
            .get(&id)
            .ok_or(StoreError::ExperimentNotFound(id))?;
        match expected {
            Some(expected) if experiment.status != expected => Err(StoreError::StatusConflict {
                id,
                expected,
                actual: experiment.status,
            }),
            _ => Ok(experiment),
        }
    }
}

/// Write operations that can be made to fail in tests
#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    Begin,
    CreateExperiment,
    CreateVariant,
    UpdateExperiment,
    DeleteExperiment,
    DeleteVariants,
}

/// Store backed by process memory
///
/// Transactions hold the store lock from `begin` until commit or drop, so
/// they are fully serialised. Writes apply in place and record an undo
/// entry per touched row; dropping an uncommitted transaction replays them.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
    #[cfg(test)]
    faults: std::sync::Mutex<Vec<FaultPoint>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated from a snapshot
    pub fn from_snapshot(snapshot: Snapshot) -> Result<Self, StoreError> {
        let mut state = StoreState::default();
        for experiment in snapshot.experiments {
            if state.experiments.contains_key(&experiment.id) {
                return Err(StoreError::Duplicate(experiment.id));
            }
            state.experiments.insert(experiment.id, experiment);
        }
        for variant in snapshot.variants {
            if !state.experiments.contains_key(&variant.experiment_id) {
                return Err(StoreError::ExperimentNotFound(variant.experiment_id));
            }
            if state.variants.iter().any(|v| v.id == variant.id) {
                return Err(StoreError::Duplicate(variant.id));
            }
            state.variants.push(variant);
        }
        Ok(Self {
            state: Mutex::new(state),
            #[cfg(test)]
            faults: std::sync::Mutex::new(Vec::new()),
        })
    }

    /// Add ingested performance to a variant's counters
    ///
    /// This is the ingestion pipeline's entry point; the experiment service
    /// itself never writes counters.
    pub async fn record_counters(
        &self,
        variant_id: Uuid,
        delta: &VariantCounters,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let variant = state
            .variants
            .iter_mut()
            .find(|v| v.id == variant_id)
            .ok_or(StoreError::VariantNotFound(variant_id))?;
        variant.counters.accumulate(delta);
        debug!(variant_id = %variant_id, impressions = variant.counters.impressions, "Recorded variant counters");
        Ok(())
    }

    /// Make the next operation at `point` fail with a backend error
    #[cfg(test)]
    pub fn inject_fault(&self, point: FaultPoint) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.push(point);
        }
    }

    #[cfg(test)]
    fn take_fault(&self, point: FaultPoint) -> Result<(), StoreError> {
        let mut faults = match self.faults.lock() {
            Ok(faults) => faults,
            Err(_) => return Err(StoreError::Backend("fault registry lock poisoned".into())),
        };
        match faults.iter().position(|f| *f == point) {
            Some(index) => {
                faults.remove(index);
                Err(StoreError::Backend(format!("injected fault at {:?}", point)))
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction + '_>, StoreError> {
        #[cfg(test)]
        self.take_fault(FaultPoint::Begin)?;
        Ok(Box::new(InMemoryTransaction {
            guard: self.state.lock().await,
            undo: Vec::new(),
            #[cfg(test)]
            store: self,
        }))
    }

    async fn find_experiment(&self, id: Uuid) -> Result<Option<Experiment>, StoreError> {
        Ok(self.state.lock().await.experiments.get(&id).cloned())
    }

    async fn find_variant(&self, id: Uuid) -> Result<Option<Variant>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.variants.iter().find(|v| v.id == id).cloned())
    }

    async fn list_variants(&self, experiment_id: Uuid) -> Result<Vec<Variant>, StoreError> {
        Ok(self.state.lock().await.variants_of(experiment_id))
    }

    async fn count_variants(&self, experiment_id: Uuid) -> Result<usize, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .variants
            .iter()
            .filter(|v| v.experiment_id == experiment_id)
            .count())
    }

    async fn list_experiments(
        &self,
        query: &ListQuery,
        window: PageWindow,
    ) -> Result<(Vec<Experiment>, usize), StoreError> {
        let state = self.state.lock().await;

        let mut matching: Vec<&Experiment> = state
            .experiments
            .values()
            .filter(|e| matches_query(e, query))
            .collect();

        matching.sort_by(|a, b| {
            let ordering = compare_by(a, b, query.sort_by).then_with(|| a.id.cmp(&b.id));
            match query.sort_order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });

        let total = matching.len();
        let page = matching
            .into_iter()
            .skip(window.offset())
            .take(window.per_page)
            .cloned()
            .collect();

        Ok((page, total))
    }

    async fn status_counts(&self, org_id: &str) -> Result<ExperimentStats, StoreError> {
        let state = self.state.lock().await;
        let mut stats = ExperimentStats::default();
        for experiment in state.experiments.values().filter(|e| e.org_id == org_id) {
            stats.total += 1;
            match experiment.status {
                ExperimentStatus::Draft => stats.draft += 1,
                ExperimentStatus::Running => stats.running += 1,
                ExperimentStatus::Paused => stats.paused += 1,
                ExperimentStatus::Completed => stats.completed += 1,
            }
            if experiment.winner_variant_id.is_some() {
                stats.with_winner += 1;
            }
        }
        Ok(stats)
    }
}

fn matches_query(experiment: &Experiment, query: &ListQuery) -> bool {
    query.org_id.as_ref().map_or(true, |org| &experiment.org_id == org)
        && query.status.map_or(true, |s| experiment.status == s)
        && query
            .experiment_type
            .as_ref()
            .map_or(true, |t| &experiment.experiment_type == t)
        && query.entity_type.map_or(true, |t| experiment.entity_type == t)
}

fn compare_by(a: &Experiment, b: &Experiment, field: SortField) -> Ordering {
    match field {
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::Name => a.name.cmp(&b.name),
        SortField::Status => a.status.as_str().cmp(b.status.as_str()),
        SortField::StartedAt => a.started_at.cmp(&b.started_at),
    }
}

/// Reverses one write of an uncommitted transaction
enum Undo {
    RemoveExperiment(Uuid),
    RestoreExperiment(Experiment),
    RemoveVariant(Uuid),
    /// Variants removed by a cascade, with their original positions
    RestoreVariants(Vec<(usize, Variant)>),
}

struct InMemoryTransaction<'a> {
    guard: MutexGuard<'a, StoreState>,
    undo: Vec<Undo>,
    #[cfg(test)]
    store: &'a InMemoryStore,
}

impl Drop for InMemoryTransaction<'_> {
    fn drop(&mut self) {
        if self.undo.is_empty() {
            return;
        }
        debug!(writes = self.undo.len(), "Rolling back uncommitted transaction");
        let state = &mut *self.guard;
        while let Some(entry) = self.undo.pop() {
            match entry {
                Undo::RemoveExperiment(id) => {
                    state.experiments.remove(&id);
                }
                Undo::RestoreExperiment(experiment) => {
                    state.experiments.insert(experiment.id, experiment);
                }
                Undo::RemoveVariant(id) => state.variants.retain(|v| v.id != id),
                Undo::RestoreVariants(removed) => {
                    for (index, variant) in removed {
                        state.variants.insert(index, variant);
                    }
                }
            }
        }
    }
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction<'_> {
    async fn create_experiment(&mut self, experiment: &Experiment) -> Result<(), StoreError> {
        #[cfg(test)]
        self.store.take_fault(FaultPoint::CreateExperiment)?;
        if self.guard.experiments.contains_key(&experiment.id) {
            return Err(StoreError::Duplicate(experiment.id));
        }
        self.guard
            .experiments
            .insert(experiment.id, experiment.clone());
        self.undo.push(Undo::RemoveExperiment(experiment.id));
        Ok(())
    }

    async fn find_experiment(&mut self, id: Uuid) -> Result<Option<Experiment>, StoreError> {
        Ok(self.guard.experiments.get(&id).cloned())
    }

    async fn update_experiment(
        &mut self,
        id: Uuid,
        expected: Option<ExperimentStatus>,
        update: &ExperimentUpdate,
    ) -> Result<Experiment, StoreError> {
        #[cfg(test)]
        self.store.take_fault(FaultPoint::UpdateExperiment)?;
        let before = self.guard.check_status(id, expected)?.clone();
        let experiment = self
            .guard
            .experiments
            .get_mut(&id)
            .ok_or(StoreError::ExperimentNotFound(id))?;
        update.apply_to(experiment);
        let updated = experiment.clone();
        self.undo.push(Undo::RestoreExperiment(before));
        Ok(updated)
    }

    async fn delete_experiment(
        &mut self,
        id: Uuid,
        expected: Option<ExperimentStatus>,
    ) -> Result<(), StoreError> {
        #[cfg(test)]
        self.store.take_fault(FaultPoint::DeleteExperiment)?;
        self.guard.check_status(id, expected)?;
        if let Some(removed) = self.guard.experiments.remove(&id) {
            self.undo.push(Undo::RestoreExperiment(removed));
        }
        Ok(())
    }

    async fn create_variant(&mut self, variant: &Variant) -> Result<(), StoreError> {
        #[cfg(test)]
        self.store.take_fault(FaultPoint::CreateVariant)?;
        if !self.guard.experiments.contains_key(&variant.experiment_id) {
            return Err(StoreError::ExperimentNotFound(variant.experiment_id));
        }
        if self.guard.variants.iter().any(|v| v.id == variant.id) {
            return Err(StoreError::Duplicate(variant.id));
        }
        self.guard.variants.push(variant.clone());
        self.undo.push(Undo::RemoveVariant(variant.id));
        Ok(())
    }

    async fn list_variants(&mut self, experiment_id: Uuid) -> Result<Vec<Variant>, StoreError> {
        Ok(self.guard.variants_of(experiment_id))
    }

    async fn delete_variants(&mut self, experiment_id: Uuid) -> Result<usize, StoreError> {
        #[cfg(test)]
        self.store.take_fault(FaultPoint::DeleteVariants)?;
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.guard.variants.len());
        for (index, variant) in self.guard.variants.drain(..).enumerate() {
            if variant.experiment_id == experiment_id {
                removed.push((index, variant));
            } else {
                kept.push(variant);
            }
        }
        self.guard.variants = kept;
        let count = removed.len();
        if count > 0 {
            self.undo.push(Undo::RestoreVariants(removed));
        }
        Ok(count)
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        self.undo.clear();
        Ok(())
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;

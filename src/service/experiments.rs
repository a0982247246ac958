//! Experiment operations over the store
//!
//! Each operation runs its writes in one store transaction, invalidates the
//! cached results after commit, and returns the uniform envelope. Errors are
//! logged and counted once, at the operation boundary.

use super::cache::{results_cache_key, Cache};
use super::clock::Clock;
use super::error::ExperimentError;
use super::response::OperationResult;
use super::store::{ExperimentUpdate, Store};
use super::validation::{validate_experiment_spec, validate_extension, validate_variant_spec};
use crate::engine::{self, aggregator, lifecycle, significance, winner, Transition};
use crate::model::{
    Experiment, ExperimentDetail, ExperimentPage, ExperimentResults, ExperimentSpec,
    ExperimentStats, ExperimentStatus, ExperimentSummary, ListQuery, PageWindow, Pagination, Variant, VariantSpec,
};
use crate::server::SharedMetrics;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Largest page `list_experiments` returns
pub const MAX_PAGE_SIZE: usize = 100;

/// Tunables for `ExperimentService`
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub results_cache_ttl: Duration,
    pub default_page_size: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            results_cache_ttl: Duration::from_secs(300),
            default_page_size: 20,
        }
    }
}

pub struct ExperimentService {
    store: Arc<dyn Store>,
    cache: Arc<dyn Cache>,
    clock: Arc<dyn Clock>,
    config: ServiceConfig,
    /// When Some, records operation counts, durations and cache behaviour
    metrics: Option<SharedMetrics>,
}

impl ExperimentService {
    pub fn new(
        store: Arc<dyn Store>,
        cache: Arc<dyn Cache>,
        clock: Arc<dyn Clock>,
        config: ServiceConfig,
        metrics: Option<SharedMetrics>,
    ) -> Self {
        ExperimentService {
            store,
            cache,
            clock,
            config,
            metrics,
        }
    }

    /// Create a draft experiment, with its inline variants if any
    ///
    /// The first inline variant becomes the control. A failed variant insert
    /// rolls back the experiment row.
    pub async fn create_experiment(
        &self,
        spec: ExperimentSpec,
    ) -> OperationResult<ExperimentDetail> {
        let started = Instant::now();
        let result = self.try_create_experiment(&spec).await;
        self.finish("create_experiment", started, result, "Experiment created")
    }

    async fn try_create_experiment(
        &self,
        spec: &ExperimentSpec,
    ) -> Result<ExperimentDetail, ExperimentError> {
        validate_experiment_spec(spec).map_err(ExperimentError::InvalidInput)?;

        let now = self.clock.now();
        let experiment = Experiment::from_spec(spec, now);
        let variants: Vec<Variant> = spec
            .variants
            .iter()
            .enumerate()
            .map(|(i, v)| Variant::from_spec(experiment.id, v, i == 0, now))
            .collect();

        let mut tx = self.store.begin().await?;
        tx.create_experiment(&experiment).await?;
        for variant in &variants {
            tx.create_variant(variant).await?;
        }
        tx.commit().await?;

        info!(
            experiment_id = %experiment.id,
            org_id = %experiment.org_id,
            variants = variants.len(),
            "Experiment created"
        );
        Ok(ExperimentDetail {
            experiment,
            variants,
        })
    }

    /// Attach a variant to a draft experiment
    pub async fn add_variant(
        &self,
        experiment_id: Uuid,
        spec: VariantSpec,
        is_control: bool,
    ) -> OperationResult<Variant> {
        let started = Instant::now();
        let result = self.try_add_variant(experiment_id, &spec, is_control).await;
        self.finish("add_variant", started, result, "Variant added")
    }

    async fn try_add_variant(
        &self,
        experiment_id: Uuid,
        spec: &VariantSpec,
        is_control: bool,
    ) -> Result<Variant, ExperimentError> {
        validate_variant_spec(spec).map_err(ExperimentError::InvalidInput)?;
        let transition = Transition::AddVariant;
        let now = self.clock.now();

        let mut tx = self.store.begin().await?;
        let experiment = tx
            .find_experiment(experiment_id)
            .await?
            .ok_or(ExperimentError::NotFound(experiment_id))?;
        if !transition.is_allowed_from(experiment.status) {
            return Err(ExperimentError::invalid_state(transition, experiment.status));
        }

        // Touch the row under the draft guard so a concurrent start cannot slip in
        let touch = ExperimentUpdate {
            updated_at: Some(now),
            ..Default::default()
        };
        tx.update_experiment(experiment_id, transition.required_status(), &touch)
            .await
            .map_err(|e| ExperimentError::from_store(transition, e))?;

        let variant = Variant::from_spec(experiment_id, spec, is_control, now);
        tx.create_variant(&variant).await?;
        tx.commit().await?;
        self.invalidate(experiment_id);

        info!(
            experiment_id = %experiment_id,
            variant_id = %variant.id,
            is_control = is_control,
            "Variant added"
        );
        Ok(variant)
    }

    /// Move a draft experiment with at least two variants to running
    pub async fn start_experiment(&self, experiment_id: Uuid) -> OperationResult<Experiment> {
        let started = Instant::now();
        let result = self.try_start_experiment(experiment_id).await;
        self.finish("start_experiment", started, result, "Experiment started")
    }

    async fn try_start_experiment(&self, experiment_id: Uuid) -> Result<Experiment, ExperimentError> {
        let transition = Transition::Start;
        let now = self.clock.now();

        let mut tx = self.store.begin().await?;
        let experiment = tx
            .find_experiment(experiment_id)
            .await?
            .ok_or(ExperimentError::NotFound(experiment_id))?;
        if !transition.is_allowed_from(experiment.status) {
            return Err(ExperimentError::invalid_state(transition, experiment.status));
        }

        let count = tx.list_variants(experiment_id).await?.len();
        if !lifecycle::has_enough_variants(count) {
            return Err(ExperimentError::InsufficientVariants { count });
        }

        let update = ExperimentUpdate {
            status: transition.target_status(),
            started_at: Some(now),
            end_date: Some(now + chrono::Duration::days(i64::from(experiment.duration_days))),
            updated_at: Some(now),
            ..Default::default()
        };
        let updated = tx
            .update_experiment(experiment_id, transition.required_status(), &update)
            .await
            .map_err(|e| ExperimentError::from_store(transition, e))?;
        tx.commit().await?;
        self.invalidate(experiment_id);

        info!(
            experiment_id = %experiment_id,
            variants = count,
            end_date = ?updated.end_date,
            "Experiment started"
        );
        Ok(updated)
    }

    /// Stop a running experiment without choosing a winner
    pub async fn stop_experiment(
        &self,
        experiment_id: Uuid,
        reason: Option<String>,
    ) -> OperationResult<Experiment> {
        let started = Instant::now();
        let result = self.try_stop_experiment(experiment_id, reason).await;
        self.finish("stop_experiment", started, result, "Experiment stopped")
    }

    async fn try_stop_experiment(
        &self,
        experiment_id: Uuid,
        reason: Option<String>,
    ) -> Result<Experiment, ExperimentError> {
        let transition = Transition::Stop;
        let now = self.clock.now();

        let mut tx = self.store.begin().await?;
        let update = ExperimentUpdate {
            status: transition.target_status(),
            completed_at: Some(now),
            stop_reason: reason,
            updated_at: Some(now),
            ..Default::default()
        };
        let updated = tx
            .update_experiment(experiment_id, transition.required_status(), &update)
            .await
            .map_err(|e| ExperimentError::from_store(transition, e))?;
        tx.commit().await?;
        self.invalidate(experiment_id);

        info!(
            experiment_id = %experiment_id,
            reason = updated.stop_reason.as_deref().unwrap_or(""),
            "Experiment stopped"
        );
        Ok(updated)
    }

    /// Full analysis of an experiment, served from cache when fresh
    pub async fn get_results(&self, experiment_id: Uuid) -> OperationResult<ExperimentResults> {
        let started = Instant::now();
        let result = self.try_get_results(experiment_id).await;
        self.finish("get_results", started, result, "Results computed")
    }

    async fn try_get_results(
        &self,
        experiment_id: Uuid,
    ) -> Result<ExperimentResults, ExperimentError> {
        let key = results_cache_key(experiment_id);

        if let Some(cached) = self.cache.get(&key) {
            match serde_json::from_value::<ExperimentResults>(cached) {
                Ok(results) => {
                    debug!(experiment_id = %experiment_id, "Results cache hit");
                    if let Some(ref metrics) = self.metrics {
                        metrics.record_cache_hit();
                    }
                    return Ok(results);
                }
                Err(e) => {
                    warn!(experiment_id = %experiment_id, error = %e, "Discarding unreadable cached results");
                    self.cache.invalidate(&key);
                }
            }
        }
        debug!(experiment_id = %experiment_id, "Results cache miss");
        if let Some(ref metrics) = self.metrics {
            metrics.record_cache_miss();
        }

        // Read before the store so a mutation committed meanwhile cancels the put
        let generation = self.cache.generation(&key);
        let experiment = self
            .store
            .find_experiment(experiment_id)
            .await?
            .ok_or(ExperimentError::NotFound(experiment_id))?;
        let variants = self.store.list_variants(experiment_id).await?;

        let results = engine::analyze(&experiment, &variants, self.clock.now());

        match serde_json::to_value(&results) {
            Ok(value) => {
                let ttl = self.config.results_cache_ttl;
                self.cache.put_if_current(&key, value, ttl, generation);
            }
            Err(e) => warn!(experiment_id = %experiment_id, error = %e, "Results not cached"),
        }
        Ok(results)
    }

    /// Mark a winner and complete the experiment
    ///
    /// With an explicit `variant_id` this is allowed from any status. Without
    /// one the winner is chosen from the data, which needs a completed
    /// experiment with significant results.
    pub async fn select_winner(
        &self,
        experiment_id: Uuid,
        variant_id: Option<Uuid>,
    ) -> OperationResult<Experiment> {
        let started = Instant::now();
        let result = self.try_select_winner(experiment_id, variant_id).await;
        self.finish("select_winner", started, result, "Winner selected")
    }

    async fn try_select_winner(
        &self,
        experiment_id: Uuid,
        variant_id: Option<Uuid>,
    ) -> Result<Experiment, ExperimentError> {
        let transition = Transition::SelectWinner;
        let now = self.clock.now();

        let mut tx = self.store.begin().await?;
        let experiment = tx
            .find_experiment(experiment_id)
            .await?
            .ok_or(ExperimentError::NotFound(experiment_id))?;
        let variants = tx.list_variants(experiment_id).await?;

        let winner_id = match variant_id {
            Some(id) => variants
                .iter()
                .find(|v| v.id == id)
                .map(|v| v.id)
                .ok_or(ExperimentError::VariantNotFound(id))?,
            None => pick_winner(&experiment, &variants)?,
        };

        let update = ExperimentUpdate {
            status: transition.target_status(),
            winner_variant_id: Some(winner_id),
            completed_at: Some(now),
            updated_at: Some(now),
            ..Default::default()
        };
        let updated = tx
            .update_experiment(experiment_id, transition.required_status(), &update)
            .await
            .map_err(|e| ExperimentError::from_store(transition, e))?;
        tx.commit().await?;
        self.invalidate(experiment_id);

        info!(
            experiment_id = %experiment_id,
            winner_variant_id = %winner_id,
            automatic = variant_id.is_none(),
            "Winner selected"
        );
        Ok(updated)
    }

    /// Push out the end of a running experiment
    pub async fn extend_experiment(
        &self,
        experiment_id: Uuid,
        additional_days: i64,
    ) -> OperationResult<Experiment> {
        let started = Instant::now();
        let result = self.try_extend_experiment(experiment_id, additional_days).await;
        self.finish("extend_experiment", started, result, "Experiment extended")
    }

    async fn try_extend_experiment(
        &self,
        experiment_id: Uuid,
        additional_days: i64,
    ) -> Result<Experiment, ExperimentError> {
        let days = validate_extension(additional_days).map_err(ExperimentError::InvalidInput)?;
        let transition = Transition::Extend;
        let now = self.clock.now();

        let mut tx = self.store.begin().await?;
        let experiment = tx
            .find_experiment(experiment_id)
            .await?
            .ok_or(ExperimentError::NotFound(experiment_id))?;
        if !transition.is_allowed_from(experiment.status) {
            return Err(ExperimentError::invalid_state(transition, experiment.status));
        }

        let duration_days = experiment.duration_days.checked_add(days).ok_or_else(|| {
            ExperimentError::InvalidInput("duration_days would overflow".to_string())
        })?;
        let current_end = experiment.end_date.or_else(|| {
            experiment
                .started_at
                .map(|s| s + chrono::Duration::days(i64::from(experiment.duration_days)))
        });
        let update = ExperimentUpdate {
            end_date: current_end.map(|end| end + chrono::Duration::days(i64::from(days))),
            duration_days: Some(duration_days),
            updated_at: Some(now),
            ..Default::default()
        };
        let updated = tx
            .update_experiment(experiment_id, transition.required_status(), &update)
            .await
            .map_err(|e| ExperimentError::from_store(transition, e))?;
        tx.commit().await?;
        self.invalidate(experiment_id);

        info!(
            experiment_id = %experiment_id,
            additional_days = days,
            duration_days = duration_days,
            "Experiment extended"
        );
        Ok(updated)
    }

    /// Filtered, sorted, paginated experiment summaries
    pub async fn list_experiments(&self, query: ListQuery) -> OperationResult<ExperimentPage> {
        let started = Instant::now();
        let result = self.try_list_experiments(&query).await;
        self.finish("list_experiments", started, result, "Experiments listed")
    }

    async fn try_list_experiments(
        &self,
        query: &ListQuery,
    ) -> Result<ExperimentPage, ExperimentError> {
        let window = self.page_window(query);
        let (experiments, total) = self.store.list_experiments(query, window).await?;

        let mut summaries = Vec::with_capacity(experiments.len());
        for experiment in &experiments {
            let count = self.store.count_variants(experiment.id).await?;
            summaries.push(ExperimentSummary::new(experiment, count));
        }

        Ok(ExperimentPage {
            experiments: summaries,
            pagination: Pagination::new(total, window.per_page, window.page),
        })
    }

    fn page_window(&self, query: &ListQuery) -> PageWindow {
        PageWindow {
            page: query.page.unwrap_or(1).max(1),
            per_page: query
                .per_page
                .unwrap_or(self.config.default_page_size)
                .clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Hard-delete a draft experiment and all its variants
    pub async fn delete_experiment(&self, experiment_id: Uuid) -> OperationResult<Experiment> {
        let started = Instant::now();
        let result = self.try_delete_experiment(experiment_id).await;
        self.finish("delete_experiment", started, result, "Experiment deleted")
    }

    async fn try_delete_experiment(
        &self,
        experiment_id: Uuid,
    ) -> Result<Experiment, ExperimentError> {
        let transition = Transition::Delete;

        let mut tx = self.store.begin().await?;
        let experiment = tx
            .find_experiment(experiment_id)
            .await?
            .ok_or(ExperimentError::NotFound(experiment_id))?;
        if !transition.is_allowed_from(experiment.status) {
            return Err(ExperimentError::invalid_state(transition, experiment.status));
        }

        let removed = tx.delete_variants(experiment_id).await?;
        tx.delete_experiment(experiment_id, transition.required_status())
            .await
            .map_err(|e| ExperimentError::from_store(transition, e))?;
        tx.commit().await?;
        self.invalidate(experiment_id);

        info!(experiment_id = %experiment_id, variants = removed, "Experiment deleted");
        Ok(experiment)
    }

    /// Counts per status for an organisation
    pub async fn experiment_stats(&self, org_id: &str) -> OperationResult<ExperimentStats> {
        let started = Instant::now();
        let result = self
            .store
            .status_counts(org_id)
            .await
            .map_err(ExperimentError::from);
        self.finish("experiment_stats", started, result, "Statistics computed")
    }

    fn invalidate(&self, experiment_id: Uuid) {
        self.cache.invalidate(&results_cache_key(experiment_id));
    }

    fn finish<T>(
        &self,
        operation: &str,
        started: Instant,
        result: Result<T, ExperimentError>,
        success_message: &str,
    ) -> OperationResult<T> {
        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => {
                e.log(operation);
                e.code()
            }
        };

        if let Some(ref metrics) = self.metrics {
            metrics.record_operation(operation, outcome, started.elapsed().as_secs_f64());
            if matches!(result, Err(ExperimentError::Persistence(_))) {
                metrics.record_persistence_failure();
            }
        }

        match result {
            Ok(data) => OperationResult::ok_with_message(data, success_message),
            Err(e) => OperationResult::failure(&e),
        }
    }
}

/// Winner chosen from the data for `select_winner` without an explicit variant
fn pick_winner(experiment: &Experiment, variants: &[Variant]) -> Result<Uuid, ExperimentError> {
    if experiment.status != ExperimentStatus::Completed {
        return Err(ExperimentError::Unresolvable(format!(
            "Cannot determine winner automatically. Experiment is {}, not completed.",
            experiment.status
        )));
    }

    let performances: Vec<_> = variants
        .iter()
        .map(aggregator::variant_performance)
        .collect();
    let metric = experiment.optimization_metric;

    let summary = significance::calculate_significance(&performances, metric);
    if !summary.is_significant {
        return Err(ExperimentError::Unresolvable(
            "Cannot determine winner automatically. Results are not statistically significant."
                .to_string(),
        ));
    }

    winner::identify_winner(&performances, metric)
        .map(|w| w.variant_id)
        .ok_or_else(|| {
            ExperimentError::Unresolvable("Experiment has no variants to choose from".to_string())
        })
}

#[cfg(test)]
#[path = "experiments_test.rs"]
mod tests;

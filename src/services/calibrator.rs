use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::time::Instant;
use tracing::instrument;

use crate::models::{
    Candidate, CalibrationResponse, ItemRecord, RankedItem, RankedList, Transaction,
    UserFailure, UserId,
};

use super::distribution::WeightedRow;
use super::{
    CalibrationConfig, CalibrationError, Components, DistributionBuilder, ItemBias, ItemCatalog,
    PoolItem, WeightContext,
};

/// Users handed to one blocking worker when no batch size is configured
pub const DEFAULT_BATCH_SIZE: usize = 128;

/// Read-only inputs of one run, grouped by user
#[derive(Debug)]
pub struct CalibrationData {
    catalog: Arc<ItemCatalog>,
    bias: ItemBias,
    transactions: HashMap<UserId, Vec<Transaction>>,
    /// Keyed by user in sorted order so runs are reproducible
    candidates: BTreeMap<UserId, Vec<Candidate>>,
}

impl CalibrationData {
    pub fn new(
        transactions: Vec<Transaction>,
        candidates: Vec<Candidate>,
        items: &[ItemRecord],
    ) -> Result<Self, CalibrationError> {
        let catalog = Arc::new(ItemCatalog::new(items)?);
        let bias = ItemBias::fit(&transactions);

        let mut by_user_transactions: HashMap<UserId, Vec<Transaction>> = HashMap::new();
        for transaction in transactions {
            by_user_transactions
                .entry(transaction.user_id.clone())
                .or_default()
                .push(transaction);
        }

        let mut by_user_candidates: BTreeMap<UserId, Vec<Candidate>> = BTreeMap::new();
        for candidate in candidates {
            by_user_candidates
                .entry(candidate.user_id.clone())
                .or_default()
                .push(candidate);
        }

        Ok(Self {
            catalog,
            bias,
            transactions: by_user_transactions,
            candidates: by_user_candidates,
        })
    }

    pub fn catalog(&self) -> &Arc<ItemCatalog> {
        &self.catalog
    }

    /// Mean and item biases over every user's transactions
    pub fn bias(&self) -> &ItemBias {
        &self.bias
    }

    /// Users with at least one candidate, in sorted order
    pub fn users(&self) -> impl Iterator<Item = &UserId> {
        self.candidates.keys()
    }

    pub fn user_count(&self) -> usize {
        self.candidates.len()
    }

    fn transactions_of(&self, user_id: &str) -> &[Transaction] {
        self.transactions
            .get(user_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn candidates_of(&self, user_id: &str) -> &[Candidate] {
        self.candidates
            .get(user_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

enum UserOutcome {
    Calibrated(RankedList),
    Failed(CalibrationError),
    TimedOut,
}

/// Runs the calibration pipeline for every user of a [`CalibrationData`]
///
/// Components are resolved once, before any user is processed, so an unknown
/// component name fails the whole run. Everything after that is per user.
#[derive(Debug, Clone)]
pub struct Calibrator {
    data: Arc<CalibrationData>,
    components: Components,
    builder: DistributionBuilder,
    batch_size: usize,
    deadline: Option<Instant>,
}

impl Calibrator {
    pub fn new(
        data: Arc<CalibrationData>,
        config: &CalibrationConfig,
    ) -> Result<Self, CalibrationError> {
        let components = config.resolve()?;
        let builder = DistributionBuilder::new(components.distribution, Arc::clone(data.catalog()));

        Ok(Self {
            data,
            components,
            builder,
            batch_size: DEFAULT_BATCH_SIZE,
            deadline: None,
        })
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Users not finished by `deadline` are reported as timed out
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn components(&self) -> &Components {
        &self.components
    }

    /// Calibrates one user's candidate list
    #[instrument(skip(self), fields(list_size = self.components.list_size))]
    pub fn calibrate_user(&self, user_id: &str) -> Result<RankedList, CalibrationError> {
        let catalog = self.data.catalog();
        let bias = self.data.bias();

        let mut pool: Vec<PoolItem<'_>> = Vec::new();
        let mut positions: HashMap<&str, usize> = HashMap::new();
        for candidate in self.data.candidates_of(user_id) {
            if !candidate.predicted_value.is_finite() {
                return Err(CalibrationError::NonFiniteValue {
                    context: format!("predicted value of item {}", candidate.item_id),
                });
            }
            let genres = catalog.genre_weights(&candidate.item_id)?;

            // Repeated candidates keep their best score
            match positions.get(candidate.item_id.as_str()) {
                Some(&ix) => {
                    if candidate.predicted_value > pool[ix].score {
                        pool[ix].score = candidate.predicted_value;
                        pool[ix].residual =
                            bias.residual(&candidate.item_id, candidate.predicted_value);
                    }
                }
                None => {
                    positions.insert(candidate.item_id.as_str(), pool.len());
                    pool.push(PoolItem {
                        item_id: &candidate.item_id,
                        score: candidate.predicted_value,
                        genres,
                        residual: bias.residual(&candidate.item_id, candidate.predicted_value),
                    });
                }
            }
        }

        let history: Vec<&Transaction> = self.data.transactions_of(user_id).iter().collect();
        if let Some(bad) = history.iter().find(|t| !t.transaction_value.is_finite()) {
            return Err(CalibrationError::NonFiniteValue {
                context: format!("transaction value of item {}", bad.item_id),
            });
        }
        let target = self.builder.target(&history)?;

        let scores: Vec<f64> = pool.iter().map(|item| item.score).collect();
        let candidate_distribution = if self.components.tradeoff_weight.needs_candidate_distribution() {
            Some(self.builder.build(pool.iter().map(|item| WeightedRow {
                genres: item.genres,
                value: item.score,
                time: 1.0,
            })))
        } else {
            None
        };
        let context = WeightContext {
            candidate_scores: &scores,
            candidate_distribution: candidate_distribution.as_ref(),
        };
        let alpha = self.components.tradeoff_weight.alpha(&target, &context)?;

        let selection =
            self.components
                .selector
                .select(&self.components, &self.builder, &target, &pool, alpha)?;

        tracing::debug!(
            history = history.len(),
            candidates = pool.len(),
            selected = selection.picks.len(),
            alpha,
            divergence = selection.divergence,
            "Calibrated user"
        );

        let items = selection
            .picks
            .iter()
            .enumerate()
            .map(|(rank, &ix)| RankedItem {
                item_id: pool[ix].item_id.to_string(),
                order: rank + 1,
                user_id: user_id.to_string(),
                transaction_value: pool[ix].score,
            })
            .collect();

        Ok(RankedList {
            user_id: user_id.to_string(),
            alpha,
            divergence: selection.divergence,
            relevance: selection.relevance,
            items,
        })
    }

    fn calibrate_batch(&self, users: Vec<UserId>) -> Vec<(UserId, UserOutcome)> {
        users
            .into_iter()
            .map(|user_id| {
                if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                    return (user_id, UserOutcome::TimedOut);
                }
                let outcome = match self.calibrate_user(&user_id) {
                    Ok(list) => UserOutcome::Calibrated(list),
                    Err(e) => UserOutcome::Failed(e),
                };
                (user_id, outcome)
            })
            .collect()
    }

    /// Calibrates every user, spreading batches over blocking worker threads
    ///
    /// Data problems of one user are reported in `failures` and never stop
    /// the other users.
    pub async fn run(&self) -> CalibrationResponse {
        let users: Vec<UserId> = self.data.users().cloned().collect();

        tracing::info!(
            users = users.len(),
            batch_size = self.batch_size,
            distribution = self.components.distribution.name(),
            fairness = self.components.divergence.name(),
            relevance = self.components.relevance.name(),
            tradeoff_weight = %self.components.tradeoff_weight,
            list_size = self.components.list_size,
            "Starting calibration run"
        );

        let mut tasks = Vec::new();
        for batch in users.chunks(self.batch_size) {
            let batch = batch.to_vec();
            let calibrator = self.clone();
            let worker_batch = batch.clone();
            let task = tokio::task::spawn_blocking(move || calibrator.calibrate_batch(worker_batch));
            tasks.push((batch, task));
        }

        let mut response = CalibrationResponse::default();

        for (batch, task) in tasks {
            let joined = match self.deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, task).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        tracing::warn!(users = batch.len(), "Run deadline expired before batch finished");
                        response.timed_out.extend(batch);
                        continue;
                    }
                },
                None => task.await,
            };

            match joined {
                Ok(outcomes) => {
                    for (user_id, outcome) in outcomes {
                        match outcome {
                            UserOutcome::Calibrated(list) => {
                                response.lists.insert(user_id, list);
                            }
                            UserOutcome::Failed(e) => {
                                tracing::warn!(user_id = %user_id, error = %e, "Calibration failed for user");
                                response.failures.push(UserFailure {
                                    user_id,
                                    error: e.to_string(),
                                });
                            }
                            UserOutcome::TimedOut => response.timed_out.push(user_id),
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Calibration worker join error");
                    response
                        .failures
                        .extend(batch.into_iter().map(|user_id| UserFailure {
                            user_id,
                            error: format!("Calibration worker failed: {e}"),
                        }));
                }
            }
        }

        if !response.failures.is_empty() || !response.timed_out.is_empty() {
            tracing::warn!(
                success_count = response.lists.len(),
                failure_count = response.failures.len(),
                timed_out_count = response.timed_out.len(),
                "Partial calibration run"
            );
        }

        tracing::info!(lists = response.lists.len(), "Calibration run finished");

        response
    }
}

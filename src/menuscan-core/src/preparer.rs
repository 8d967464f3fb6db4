use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::InstallConfig;
use crate::generator::{GenerationSummary, RestaurantGenerator, COUNTRY_GROUP_SIZE};
use crate::index::restaurant_indexes;
use crate::models::{InstallMode, InstallRequest};
use crate::store::{InstallTarget, Result, StoreError};

/// Requested full-install counts must be whole country groups
pub const DOCUMENT_COUNT_ALIGNMENT: u64 = COUNTRY_GROUP_SIZE;

/// Rejected install requests
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InstallError {
    #[error("Install required: full or dummy")]
    MissingMode,

    #[error("{0}")]
    InvalidMode(String),

    #[error("documentCount must be a positive multiple of 10000, got {0}")]
    UnalignedCount(i64),
}

/// What an install run should produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallPlan {
    pub mode: InstallMode,
    pub load_indexes: bool,
    pub document_count: u64,
}

impl InstallPlan {
    /// Validate a request against the configured install sizes
    pub fn from_request(
        req: &InstallRequest,
        settings: &InstallConfig,
    ) -> std::result::Result<Self, InstallError> {
        if req.install.trim().is_empty() {
            return Err(InstallError::MissingMode);
        }
        let mode: InstallMode = req.install.parse().map_err(InstallError::InvalidMode)?;

        let requested = match req.document_count {
            Some(n) if n <= 0 || n as u64 % DOCUMENT_COUNT_ALIGNMENT != 0 => {
                return Err(InstallError::UnalignedCount(n));
            }
            Some(n) => Some(n as u64),
            None => None,
        };

        let document_count = match mode {
            InstallMode::Full => requested.unwrap_or(settings.full_document_count),
            InstallMode::Dummy => settings.dummy_document_count,
        };

        Ok(Self {
            mode,
            load_indexes: req.load_indexes,
            document_count,
        })
    }
}

/// Result of one install run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareOutcome {
    /// Data and (if requested) indexes are in place and committed
    pub success: bool,
    /// False when the collection already held the target count
    pub regenerated: bool,
    pub deleted: u64,
    pub inserted: u64,
    pub batches: u64,
    /// `None` when no rebuild was requested
    pub indexes_built: Option<bool>,
    pub summary: Option<GenerationSummary>,
    pub elapsed_ms: u64,
}

/// A contiguous slice of the dataset handled by one worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchRange {
    pub number: u64,
    pub start: u64,
    pub count: u64,
}

/// Split `total` records into batches of at most `batch_size`
pub fn batch_ranges(total: u64, batch_size: u64) -> Vec<BatchRange> {
    let batch_size = batch_size.max(1);
    (0..total.div_ceil(batch_size))
        .map(|number| {
            let start = number * batch_size;
            BatchRange {
                number,
                start,
                count: batch_size.min(total - start),
            }
        })
        .collect()
}

/// What a single insert worker reports back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub number: u64,
    pub expected: u64,
    pub inserted: u64,
}

impl BatchReport {
    pub fn succeeded(&self) -> bool {
        self.inserted == self.expected
    }
}

/// Fan-in of every worker's report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertReport {
    pub batches: u64,
    pub inserted: u64,
    pub all_succeeded: bool,
}

impl InsertReport {
    pub fn reduce(reports: &[BatchReport]) -> Self {
        Self {
            batches: reports.len() as u64,
            inserted: reports.iter().map(|r| r.inserted).sum(),
            all_succeeded: reports.iter().all(BatchReport::succeeded),
        }
    }
}

/// Entry point used by the HTTP layer
#[async_trait]
pub trait Installer: Send + Sync {
    async fn install(&self, plan: InstallPlan) -> Result<PrepareOutcome>;
}

/// Ensures the collection holds the expected data and indexes, idempotently.
///
/// Index DDL cannot share the collection with an open transaction, so the
/// index set is rebuilt first and restored by the target if the build fails.
/// Only then is the data replaced inside one majority-write-concern
/// transaction.
pub struct CollectionPreparer<T: InstallTarget> {
    target: Arc<T>,
    generator: RestaurantGenerator,
    workers: usize,
    batch_size: u64,
}

impl<T: InstallTarget> CollectionPreparer<T> {
    pub fn new(target: Arc<T>, generator: RestaurantGenerator) -> Self {
        Self {
            target,
            generator,
            workers: 1,
            batch_size: DOCUMENT_COUNT_ALIGNMENT,
        }
    }

    pub fn from_config(target: Arc<T>, settings: &InstallConfig) -> Self {
        Self::new(target, RestaurantGenerator::new(settings.seed))
            .with_workers(settings.workers)
            .with_batch_size(settings.batch_size)
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Run the install; the collection changes only if every requested step succeeded
    pub async fn prepare(&self, plan: &InstallPlan) -> Result<PrepareOutcome> {
        let started = Instant::now();
        info!(
            mode = %plan.mode,
            documents = plan.document_count,
            load_indexes = plan.load_indexes,
            "Preparing collection"
        );

        let indexes_built = if plan.load_indexes {
            let built = self.target.rebuild_indexes(&restaurant_indexes()).await?;
            if !built {
                warn!("Index rebuild failed, leaving the collection unchanged");
                return Ok(PrepareOutcome {
                    indexes_built: Some(false),
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    ..PrepareOutcome::default()
                });
            }
            Some(true)
        } else {
            None
        };

        let txn = Arc::new(Mutex::new(self.target.begin().await?));
        let result = self.run(&txn, plan).await.map(|mut outcome| {
            outcome.indexes_built = indexes_built;
            outcome
        });

        // Every worker has finished by now, so this is the last handle
        let txn = Arc::try_unwrap(txn)
            .map_err(|_| StoreError::Worker("transaction still held by a worker".to_string()))?
            .into_inner();

        match result {
            Ok(mut outcome) => {
                if outcome.success {
                    self.target.commit(txn).await?;
                    info!("Install transaction committed");
                } else {
                    self.target.abort(txn).await?;
                    warn!("Install incomplete, transaction aborted");
                }
                outcome.elapsed_ms = started.elapsed().as_millis() as u64;
                Ok(outcome)
            }
            Err(e) => {
                if let Err(abort_err) = self.target.abort(txn).await {
                    warn!("Failed to abort install transaction: {}", abort_err);
                }
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        txn: &Arc<Mutex<T::Transaction>>,
        plan: &InstallPlan,
    ) -> Result<PrepareOutcome> {
        let mut outcome = PrepareOutcome::default();

        let existing = {
            let mut guard = txn.lock().await;
            self.target.count(&mut guard).await?
        };

        let data_ok = if existing == plan.document_count {
            info!(
                "Collection already holds {} documents, skipping generation",
                existing
            );
            true
        } else {
            outcome.deleted = {
                let mut guard = txn.lock().await;
                self.target.clear(&mut guard).await?
            };
            info!("Cleared {} existing documents", outcome.deleted);

            let report = self.insert_all(txn, plan.document_count).await?;
            outcome.regenerated = true;
            outcome.inserted = report.inserted;
            outcome.batches = report.batches;
            outcome.summary = Some(GenerationSummary::for_count(plan.document_count));

            let ok = report.all_succeeded && report.inserted == plan.document_count;
            if !ok {
                warn!(
                    "Inserted {} of {} documents",
                    report.inserted, plan.document_count
                );
            }
            ok
        };

        outcome.success = data_ok;
        Ok(outcome)
    }

    /// Fan the batches out to at most `workers` tasks, then reduce their
    /// reports once all of them have completed.
    async fn insert_all(
        &self,
        txn: &Arc<Mutex<T::Transaction>>,
        total: u64,
    ) -> Result<InsertReport> {
        let mut pending = batch_ranges(total, self.batch_size).into_iter();
        let mut tasks = JoinSet::new();
        let mut reports = Vec::new();

        loop {
            while tasks.len() < self.workers {
                let Some(batch) = pending.next() else {
                    break;
                };
                tasks.spawn(insert_batch(
                    Arc::clone(&self.target),
                    Arc::clone(txn),
                    self.generator,
                    batch,
                ));
            }

            let outcome = match tasks.join_next().await {
                Some(outcome) => outcome,
                None => break,
            };

            match outcome {
                Ok(Ok(report)) => {
                    debug!(
                        batch = report.number,
                        inserted = report.inserted,
                        "Batch complete"
                    );
                    reports.push(report);
                }
                Ok(Err(e)) => {
                    tasks.shutdown().await;
                    return Err(e);
                }
                Err(join_err) => {
                    tasks.shutdown().await;
                    return Err(StoreError::Worker(join_err.to_string()));
                }
            }
        }

        let report = InsertReport::reduce(&reports);
        info!(
            "Inserted {} documents in {} batches",
            report.inserted, report.batches
        );
        Ok(report)
    }
}

async fn insert_batch<T: InstallTarget>(
    target: Arc<T>,
    txn: Arc<Mutex<T::Transaction>>,
    generator: RestaurantGenerator,
    batch: BatchRange,
) -> Result<BatchReport> {
    let records = tokio::task::spawn_blocking(move || generator.generate(batch.start, batch.count))
        .await
        .map_err(|e| StoreError::Worker(e.to_string()))?;

    let inserted = {
        let mut guard = txn.lock().await;
        target.insert_many(&mut guard, &records).await?
    };

    Ok(BatchReport {
        number: batch.number,
        expected: batch.count,
        inserted,
    })
}

#[async_trait]
impl<T: InstallTarget> Installer for CollectionPreparer<T> {
    async fn install(&self, plan: InstallPlan) -> Result<PrepareOutcome> {
        self.prepare(&plan).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;
    use std::collections::HashSet;

    fn request(install: &str, load_indexes: bool, count: Option<i64>) -> InstallRequest {
        InstallRequest {
            install: install.to_string(),
            load_indexes,
            document_count: count,
        }
    }

    fn plan(count: u64, load_indexes: bool) -> InstallPlan {
        InstallPlan {
            mode: InstallMode::Full,
            load_indexes,
            document_count: count,
        }
    }

    #[test]
    fn test_plan_validation() {
        let settings = InstallConfig::default();

        assert_eq!(
            InstallPlan::from_request(&request("", false, None), &settings),
            Err(InstallError::MissingMode)
        );
        assert!(matches!(
            InstallPlan::from_request(&request("partial", false, None), &settings),
            Err(InstallError::InvalidMode(_))
        ));
        assert_eq!(
            InstallPlan::from_request(&request("full", false, Some(12_345)), &settings),
            Err(InstallError::UnalignedCount(12_345))
        );
        assert_eq!(
            InstallPlan::from_request(&request("full", false, Some(0)), &settings),
            Err(InstallError::UnalignedCount(0))
        );

        let full = InstallPlan::from_request(&request("full", true, Some(20_000)), &settings)
            .unwrap();
        assert_eq!(full.document_count, 20_000);
        assert!(full.load_indexes);

        let default_full =
            InstallPlan::from_request(&request("full", false, None), &settings).unwrap();
        assert_eq!(default_full.document_count, 1_000_000);

        let dummy = InstallPlan::from_request(&request("dummy", false, None), &settings).unwrap();
        assert_eq!(dummy.mode, InstallMode::Dummy);
        assert_eq!(dummy.document_count, 100);
    }

    #[test]
    fn test_batch_ranges_cover_total() {
        let ranges = batch_ranges(25_000, 10_000);
        assert_eq!(ranges.len(), 3);
        assert_eq!(ranges[0].start, 0);
        assert_eq!(ranges[2].start, 20_000);
        assert_eq!(ranges[2].count, 5_000);
        assert_eq!(ranges.iter().map(|r| r.count).sum::<u64>(), 25_000);

        assert!(batch_ranges(0, 10_000).is_empty());
        assert_eq!(batch_ranges(100, 10_000).len(), 1);
    }

    #[test]
    fn test_reduce_requires_every_batch() {
        let ok = BatchReport {
            number: 0,
            expected: 10,
            inserted: 10,
        };
        let short = BatchReport {
            number: 1,
            expected: 10,
            inserted: 7,
        };

        let report = InsertReport::reduce(&[ok, ok]);
        assert!(report.all_succeeded);
        assert_eq!(report.inserted, 20);

        let report = InsertReport::reduce(&[ok, short]);
        assert!(!report.all_succeeded);
        assert_eq!(report.batches, 2);
        assert_eq!(report.inserted, 17);
    }

    #[tokio::test]
    async fn test_full_install_holds_exact_count_with_unique_ids() {
        let store = Arc::new(MemoryStore::new());
        let preparer = CollectionPreparer::new(Arc::clone(&store), RestaurantGenerator::new(3))
            .with_workers(4)
            .with_batch_size(2_500);

        let outcome = preparer.prepare(&plan(20_000, true)).await.unwrap();
        assert!(outcome.success);
        assert!(outcome.regenerated);
        assert_eq!(outcome.inserted, 20_000);
        assert_eq!(outcome.batches, 8);
        assert_eq!(outcome.indexes_built, Some(true));
        assert_eq!(
            outcome.summary.unwrap().distinct("address.country"),
            Some(2)
        );

        let records = store.records();
        assert_eq!(records.len(), 20_000);
        let ids: HashSet<&str> = records.iter().map(|r| r.restaurant_id.as_str()).collect();
        assert_eq!(ids.len(), 20_000);
        assert_eq!(store.index_names().len(), 5);
    }

    #[tokio::test]
    async fn test_rerun_at_target_skips_generation_but_rebuilds_indexes() {
        let store = Arc::new(MemoryStore::new());
        let preparer = CollectionPreparer::new(Arc::clone(&store), RestaurantGenerator::new(3));

        preparer.prepare(&plan(10_000, false)).await.unwrap();
        let before = store.records();
        assert!(store.index_names().is_empty());

        let outcome = preparer.prepare(&plan(10_000, true)).await.unwrap();
        assert!(outcome.success);
        assert!(!outcome.regenerated);
        assert_eq!(outcome.inserted, 0);
        assert_eq!(outcome.indexes_built, Some(true));
        assert_eq!(store.records(), before);
        assert_eq!(store.index_names()[0], "restaurantId_1");
    }

    #[tokio::test]
    async fn test_count_mismatch_replaces_existing_records() {
        let generator = RestaurantGenerator::new(11);
        let store = Arc::new(MemoryStore::with_records(generator.generate(0, 37)));
        let preparer = CollectionPreparer::new(Arc::clone(&store), generator);

        let outcome = preparer.prepare(&plan(100, false)).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.deleted, 37);
        assert_eq!(store.len(), 100);
        assert_eq!(outcome.indexes_built, None);
    }

    #[tokio::test]
    async fn test_index_failure_leaves_data_and_indexes_unchanged() {
        let generator = RestaurantGenerator::new(5);
        let store = Arc::new(MemoryStore::new());
        let preparer = CollectionPreparer::new(Arc::clone(&store), generator).with_workers(2);

        assert!(preparer.prepare(&plan(10, true)).await.unwrap().success);
        let records_before = store.records();
        let indexes_before = store.index_names();
        assert_eq!(indexes_before.len(), 5);

        store.fail_index_builds(true);
        let outcome = preparer.prepare(&plan(100, true)).await.unwrap();

        assert!(!outcome.success);
        assert!(!outcome.regenerated);
        assert_eq!(outcome.indexes_built, Some(false));
        assert_eq!(store.records(), records_before);
        assert_eq!(store.index_names(), indexes_before);
        assert_eq!(store.open_transactions(), 0);
    }

    #[tokio::test]
    async fn test_index_rebuild_never_overlaps_the_transaction() {
        let store = Arc::new(MemoryStore::with_records(RestaurantGenerator::new(1).generate(0, 7)));
        let preparer = CollectionPreparer::new(Arc::clone(&store), RestaurantGenerator::new(1));

        // MemoryStore rejects index DDL while a transaction is open
        let outcome = preparer.prepare(&plan(50, true)).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.deleted, 7);
        assert_eq!(outcome.indexes_built, Some(true));
        assert_eq!(store.len(), 50);
        assert_eq!(store.open_transactions(), 0);
    }

    #[tokio::test]
    async fn test_installer_trait_delegates_to_prepare() {
        let store = Arc::new(MemoryStore::new());
        let settings = InstallConfig {
            workers: 2,
            batch_size: 50,
            ..InstallConfig::default()
        };
        let installer: Arc<dyn Installer> =
            Arc::new(CollectionPreparer::from_config(Arc::clone(&store), &settings));

        let outcome = installer
            .install(InstallPlan {
                mode: InstallMode::Dummy,
                load_indexes: false,
                document_count: 100,
            })
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.batches, 2);
        assert_eq!(store.len(), 100);
    }
}

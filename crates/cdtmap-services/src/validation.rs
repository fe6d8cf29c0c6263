use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use cdtmap_benchmark::{analyze, evaluate_record, ConcurrentRunner, RequestDispatcher, RunnerEvent};
use cdtmap_core::{
    AccuracySummary, AccuracyVerdict, ConsistencySummary, ConsistencyVerdict, HarnessConfig,
    ResultRecord, Result, StoreSummary, TestCase,
};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

use crate::results_store::ResultStore;

/// Repetition whose response is scored for accuracy.
pub const CANONICAL_RUN: u32 = 1;

/// Cases chosen for a batch, and the ones left out.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub cases: Vec<Arc<TestCase>>,
    /// Catalog cases skipped because they already pass.
    pub skipped: Vec<String>,
    /// Requested names the catalog does not contain.
    pub unknown: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub model: String,
    pub selected: usize,
    pub skipped: usize,
    pub runs_per_test: u32,
    pub accuracy: Vec<AccuracyVerdict>,
    pub consistency: Vec<ConsistencyVerdict>,
    pub accuracy_summary: AccuracySummary,
    pub consistency_summary: ConsistencySummary,
    pub elapsed_seconds: f64,
    pub store_summary: StoreSummary,
}

impl ValidationReport {
    /// Nothing was selected: every known case already passes.
    pub fn all_passing(&self) -> bool {
        self.selected == 0
    }
}

/// Runs the skip-passing validation workflow against one model.
pub struct ValidationService {
    runner: ConcurrentRunner,
    store: ResultStore,
    harness: HarnessConfig,
}

impl ValidationService {
    pub fn new(dispatcher: Arc<RequestDispatcher>, store: ResultStore, harness: HarnessConfig) -> Self {
        Self {
            runner: ConcurrentRunner::new(dispatcher),
            store,
            harness,
        }
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    pub fn model(&self) -> &str {
        self.runner.dispatcher().model()
    }

    /// Every catalog case unless it passed both checks last time; all of them when `force`.
    pub fn select_cases(&self, catalog: &[Arc<TestCase>], force: bool) -> Selection {
        if force {
            return Selection {
                cases: catalog.to_vec(),
                ..Default::default()
            };
        }

        let passed: HashSet<String> = self.store.passed_names().into_iter().collect();
        let (skipped, cases): (Vec<_>, Vec<_>) =
            catalog.iter().cloned().partition(|tc| passed.contains(&tc.name));

        Selection {
            cases,
            skipped: skipped.iter().map(|tc| tc.name.clone()).collect(),
            unknown: Vec::new(),
        }
    }

    /// Exactly the named cases, regardless of their stored status.
    pub fn select_named(&self, catalog: &[Arc<TestCase>], names: &[String]) -> Selection {
        let mut selection = Selection::default();
        for name in names {
            match catalog.iter().find(|tc| &tc.name == name) {
                Some(tc) if !selection.cases.iter().any(|c| &c.name == name) => {
                    selection.cases.push(tc.clone())
                }
                Some(_) => {}
                None => selection.unknown.push(name.clone()),
            }
        }
        selection
    }

    pub async fn validate(&mut self, selection: &Selection) -> Result<ValidationReport> {
        self.execute(selection, None).await
    }

    /// Like [`validate`](Self::validate), forwarding runner progress on `tx`.
    pub async fn validate_streaming(
        &mut self,
        selection: &Selection,
        tx: mpsc::Sender<RunnerEvent>,
    ) -> Result<ValidationReport> {
        self.execute(selection, Some(tx)).await
    }

    #[instrument(skip_all, fields(cases = selection.cases.len()))]
    async fn execute(
        &mut self,
        selection: &Selection,
        tx: Option<mpsc::Sender<RunnerEvent>>,
    ) -> Result<ValidationReport> {
        let model = self.model().to_string();

        if selection.cases.is_empty() {
            info!("All selected test cases already pass");
            return Ok(self.report(selection, Vec::new(), Vec::new(), 0.0));
        }

        self.warmup(&model).await;

        let start = Instant::now();
        let runs = self.harness.runs_per_test;
        let workers = self.harness.max_workers;
        let records = match tx {
            Some(tx) => {
                self.runner
                    .run_streaming(&selection.cases, runs, workers, tx)
                    .await
            }
            None => self.runner.run(&selection.cases, runs, workers).await,
        };
        let elapsed_seconds = start.elapsed().as_secs_f64();

        let mut consistency = analyze(&records);
        let accuracy = score_canonical_runs(&records);

        let mut accuracy_out = Vec::with_capacity(selection.cases.len());
        let mut consistency_out = Vec::with_capacity(selection.cases.len());
        for tc in &selection.cases {
            let (Some(acc), Some(cons)) = (accuracy.get(&tc.name), consistency.remove(&tc.name))
            else {
                warn!(test = %tc.name, "No results recorded for test case");
                continue;
            };
            self.store.update(&tc.name, acc, &cons);
            accuracy_out.push(acc.clone());
            consistency_out.push(cons);
        }

        self.store.recompute_summary();
        self.store.save(&model)?;

        let report = self.report(selection, accuracy_out, consistency_out, elapsed_seconds);
        info!(
            accuracy_passed = report.accuracy_summary.passed,
            consistent = report.consistency_summary.consistent,
            elapsed = elapsed_seconds,
            "Validation complete"
        );
        Ok(report)
    }

    async fn warmup(&self, model: &str) {
        let client = self.runner.dispatcher().client();
        for attempt in 0..self.harness.warmup_runs {
            if let Err(e) = client.warmup(model).await {
                warn!(attempt, "Warmup failed: {}", e);
            }
        }
    }

    fn report(
        &self,
        selection: &Selection,
        accuracy: Vec<AccuracyVerdict>,
        consistency: Vec<ConsistencyVerdict>,
        elapsed_seconds: f64,
    ) -> ValidationReport {
        ValidationReport {
            model: self.model().to_string(),
            selected: selection.cases.len(),
            skipped: selection.skipped.len(),
            runs_per_test: self.harness.runs_per_test,
            accuracy_summary: AccuracySummary::from_verdicts(&accuracy),
            consistency_summary: ConsistencySummary::from_verdicts(&consistency),
            accuracy,
            consistency,
            elapsed_seconds,
            store_summary: self.store.summary().clone(),
        }
    }
}

/// Accuracy verdict per case from its canonical run, or its lowest run if that one is absent.
fn score_canonical_runs(records: &[ResultRecord]) -> BTreeMap<String, AccuracyVerdict> {
    let mut chosen: BTreeMap<&str, &ResultRecord> = BTreeMap::new();
    for record in records {
        let slot = chosen.entry(record.test_name()).or_insert(record);
        let better = record.run_index == CANONICAL_RUN
            || (slot.run_index != CANONICAL_RUN && record.run_index < slot.run_index);
        if better {
            *slot = record;
        }
    }

    chosen
        .into_iter()
        .map(|(name, record)| (name.to_string(), evaluate_record(record)))
        .collect()
}

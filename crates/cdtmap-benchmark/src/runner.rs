use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use cdtmap_core::{ResultRecord, TaskUnit, TestCase};
use serde::Serialize;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

use crate::dispatcher::RequestDispatcher;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunnerEvent {
    Started {
        total: usize,
    },
    TaskFinished {
        completed: usize,
        total: usize,
        test_name: String,
        run_index: u32,
        elapsed_seconds: f64,
        error: Option<String>,
    },
    Finished {
        total: usize,
        elapsed_seconds: f64,
    },
}

/// Fans test cases x repetitions out over a bounded pool of in-flight requests.
pub struct ConcurrentRunner {
    dispatcher: Arc<RequestDispatcher>,
}

impl ConcurrentRunner {
    pub fn new(dispatcher: Arc<RequestDispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Arc<RequestDispatcher> {
        &self.dispatcher
    }

    /// Dispatch every (case, run) pair and return the records in completion order.
    pub async fn run(
        &self,
        test_cases: &[Arc<TestCase>],
        runs_per_test: u32,
        worker_count: usize,
    ) -> Vec<ResultRecord> {
        self.execute(test_cases, runs_per_test, worker_count, None)
            .await
    }

    /// Like [`run`](Self::run), reporting each completion on `tx`.
    pub async fn run_streaming(
        &self,
        test_cases: &[Arc<TestCase>],
        runs_per_test: u32,
        worker_count: usize,
        tx: mpsc::Sender<RunnerEvent>,
    ) -> Vec<ResultRecord> {
        self.execute(test_cases, runs_per_test, worker_count, Some(tx))
            .await
    }

    async fn execute(
        &self,
        test_cases: &[Arc<TestCase>],
        runs_per_test: u32,
        worker_count: usize,
        tx: Option<mpsc::Sender<RunnerEvent>>,
    ) -> Vec<ResultRecord> {
        let tasks = TaskUnit::expand(test_cases, runs_per_test);
        let total = tasks.len();
        let start = Instant::now();

        tracing::info!(
            cases = test_cases.len(),
            runs_per_test,
            workers = worker_count,
            "Submitting {} requests",
            total
        );
        emit(&tx, RunnerEvent::Started { total }).await;

        let permits = Arc::new(Semaphore::new(worker_count.max(1)));
        let mut join_set = JoinSet::new();

        for task in tasks.iter().cloned() {
            let permits = permits.clone();
            let dispatcher = self.dispatcher.clone();
            join_set.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                dispatcher.dispatch(&task).await
            });
        }

        let mut records = Vec::with_capacity(total);
        let mut join_errors = Vec::new();

        while let Some(joined) = join_set.join_next().await {
            let record = match joined {
                Ok(record) => record,
                Err(e) => {
                    tracing::error!("Worker task failed: {}", e);
                    join_errors.push(e.to_string());
                    continue;
                }
            };

            records.push(record);
            let record = &records[records.len() - 1];
            emit(
                &tx,
                RunnerEvent::TaskFinished {
                    completed: records.len(),
                    total,
                    test_name: record.test_name().to_string(),
                    run_index: record.run_index,
                    elapsed_seconds: record.elapsed_seconds,
                    error: record.error().map(str::to_string),
                },
            )
            .await;
        }

        if !join_errors.is_empty() {
            records.extend(orphaned_records(&tasks, &records, &join_errors.join("; ")));
        }

        let elapsed_seconds = start.elapsed().as_secs_f64();
        tracing::info!(
            "Completed {} requests in {:.2}s ({} failed)",
            records.len(),
            elapsed_seconds,
            records.iter().filter(|r| !r.is_success()).count()
        );
        emit(
            &tx,
            RunnerEvent::Finished {
                total,
                elapsed_seconds,
            },
        )
        .await;

        records
    }
}

async fn emit(tx: &Option<mpsc::Sender<RunnerEvent>>, event: RunnerEvent) {
    if let Some(tx) = tx {
        let _ = tx.send(event).await;
    }
}

/// Error records for tasks whose worker died before returning one.
fn orphaned_records(tasks: &[TaskUnit], records: &[ResultRecord], reason: &str) -> Vec<ResultRecord> {
    let finished: HashSet<(&str, u32)> = records
        .iter()
        .map(|r| (r.test_name(), r.run_index))
        .collect();

    tasks
        .iter()
        .filter(|t| !finished.contains(&(t.test_name(), t.run_index)))
        .map(|t| {
            ResultRecord::failure(
                t.test_case.clone(),
                t.run_index,
                format!("Worker task failed: {}", reason),
                0.0,
            )
        })
        .collect()
}

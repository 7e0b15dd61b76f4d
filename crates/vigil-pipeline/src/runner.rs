// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Job execution and the worker pool.
//!
//! Each registered [`JobWorker`] gets its own set of polling tasks. A task
//! claims one job at a time with `dequeue`, runs it under a deadline, and
//! reports the result back to the queue. Retry scheduling belongs to the
//! queue, not to the workers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use vigil_config::model::QueueConfig;
use vigil_core::{Job, JobKind, VigilError};
use vigil_storage::Database;
use vigil_storage::queries::jobs::{self, FailOutcome};

use crate::shutdown::drain_tasks;

/// How long shutdown waits for in-flight jobs before aborting them.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// A handler for one job kind.
#[async_trait]
pub trait JobWorker: Send + Sync + 'static {
    fn kind(&self) -> JobKind;

    /// Deadline for one attempt. `None` uses the queue default.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Delay before retrying a failed attempt. `None` uses the queue default.
    fn next_retry(&self, _job: &Job) -> Option<Duration> {
        None
    }

    /// Do the work. Long-running workers check `cancel` between steps and
    /// return [`VigilError::Cancelled`] once it fires.
    async fn work(&self, job: &Job, cancel: &CancellationToken) -> Result<(), VigilError>;
}

/// Error for a job routed to a worker of another kind.
pub(crate) fn unexpected_job(expected: JobKind, job: &Job) -> VigilError {
    VigilError::Internal(format!(
        "{expected} worker received {} job {}",
        job.kind(),
        job.id
    ))
}

/// Queue-wide execution defaults.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub poll_interval: Duration,
    pub job_timeout: Duration,
    pub retry_backoff: Duration,
    pub finalized_retention: Duration,
    pub prune_interval: Duration,
}

impl From<&QueueConfig> for RunnerSettings {
    fn from(config: &QueueConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            job_timeout: config.job_timeout(),
            retry_backoff: config.retry_backoff(),
            finalized_retention: config.finalized_retention(),
            prune_interval: config.prune_interval(),
        }
    }
}

/// What happened to a job after one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed(FailOutcome),
}

/// Run one claimed job to completion and record the result.
pub async fn execute(
    db: &Database,
    worker: &dyn JobWorker,
    job: &Job,
    settings: &RunnerSettings,
    cancel: &CancellationToken,
) -> Result<JobOutcome, VigilError> {
    let deadline = worker.timeout().unwrap_or(settings.job_timeout);
    debug!(job_id = job.id, kind = %job.kind(), attempt = job.attempt, "job started");

    let result = match tokio::time::timeout(deadline, worker.work(job, cancel)).await {
        Ok(result) => result,
        Err(_) => Err(VigilError::Timeout { duration: deadline }),
    };

    match result {
        Ok(()) => {
            jobs::complete(db, job.id).await?;
            debug!(job_id = job.id, kind = %job.kind(), "job completed");
            Ok(JobOutcome::Completed)
        }
        Err(VigilError::Cancelled) => {
            // Shutdown is not the job's fault: requeue without spending an attempt.
            let outcome = jobs::release(db, job.id, &VigilError::Cancelled.to_string()).await?;
            info!(job_id = job.id, kind = %job.kind(), ?outcome, "job interrupted, released");
            Ok(JobOutcome::Failed(outcome))
        }
        Err(e) => {
            let retry_in = worker.next_retry(job).unwrap_or(settings.retry_backoff);
            let outcome = jobs::fail(db, job.id, &e.to_string(), retry_in).await?;
            match outcome {
                FailOutcome::Discarded => error!(
                    job_id = job.id,
                    kind = %job.kind(),
                    attempt = job.attempt,
                    error = %e,
                    "job failed permanently"
                ),
                _ if e.is_transient() => warn!(
                    job_id = job.id,
                    kind = %job.kind(),
                    attempt = job.attempt,
                    error = %e,
                    ?retry_in,
                    "job attempt failed, will retry"
                ),
                _ => error!(
                    job_id = job.id,
                    kind = %job.kind(),
                    attempt = job.attempt,
                    error = %e,
                    ?retry_in,
                    "job attempt failed, will retry"
                ),
            }
            Ok(JobOutcome::Failed(outcome))
        }
    }
}

/// Claim and run one job of `worker`'s kind, if any is due.
pub async fn run_once(
    db: &Database,
    worker: &dyn JobWorker,
    settings: &RunnerSettings,
    cancel: &CancellationToken,
) -> Result<Option<JobOutcome>, VigilError> {
    match jobs::dequeue(db, worker.kind()).await? {
        Some(job) => execute(db, worker, &job, settings, cancel).await.map(Some),
        None => Ok(None),
    }
}

/// Runs registered workers until cancelled.
pub struct WorkerPool {
    db: Database,
    settings: RunnerSettings,
    workers: Vec<(Arc<dyn JobWorker>, usize)>,
}

impl WorkerPool {
    pub fn new(db: Database, settings: RunnerSettings) -> Self {
        Self {
            db,
            settings,
            workers: Vec::new(),
        }
    }

    /// Register `worker` with `concurrency` polling tasks.
    pub fn register(&mut self, worker: Arc<dyn JobWorker>, concurrency: usize) {
        self.workers.push((worker, concurrency.max(1)));
    }

    pub fn kinds(&self) -> Vec<JobKind> {
        self.workers.iter().map(|(w, _)| w.kind()).collect()
    }

    /// Requeue jobs orphaned by a previous process, then poll until `cancel`
    /// fires. In-flight jobs get a grace period to observe the token.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), VigilError> {
        let rescued = jobs::rescue_running(&self.db).await?;
        if rescued > 0 {
            warn!(rescued, "requeued jobs left running by a previous process");
        }

        let mut tasks = JoinSet::new();
        for (worker, concurrency) in &self.workers {
            for slot in 0..*concurrency {
                tasks.spawn(poll_loop(
                    self.db.clone(),
                    worker.clone(),
                    self.settings.clone(),
                    cancel.clone(),
                    slot,
                ));
            }
        }
        tasks.spawn(prune_loop(
            self.db.clone(),
            self.settings.clone(),
            cancel.clone(),
        ));
        info!(tasks = tasks.len(), kinds = ?self.kinds(), "worker pool running");

        cancel.cancelled().await;
        info!("shutdown signal received, stopping worker pool");
        drain_tasks(&mut tasks, DRAIN_TIMEOUT).await;
        info!("worker pool stopped");
        Ok(())
    }
}

async fn poll_loop(
    db: Database,
    worker: Arc<dyn JobWorker>,
    settings: RunnerSettings,
    cancel: CancellationToken,
    slot: usize,
) {
    let kind = worker.kind();
    debug!(%kind, slot, "worker started");
    while !cancel.is_cancelled() {
        let idle = match run_once(&db, worker.as_ref(), &settings, &cancel).await {
            Ok(Some(_)) => false,
            Ok(None) => true,
            Err(e) => {
                error!(%kind, error = %e, "queue error");
                true
            }
        };
        if idle {
            tokio::select! {
                _ = tokio::time::sleep(settings.poll_interval) => {}
                _ = cancel.cancelled() => break,
            }
        }
    }
    debug!(%kind, slot, "worker stopped");
}

async fn prune_loop(db: Database, settings: RunnerSettings, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(settings.prune_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = cancel.cancelled() => break,
        }
        match jobs::prune_finalized(&db, settings.finalized_retention).await {
            Ok(0) => {}
            Ok(pruned) => info!(pruned, "pruned finalized jobs"),
            Err(e) => warn!(error = %e, "failed to prune finalized jobs"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;
    use vigil_core::JobArgs;
    use vigil_core::jobs::{ChannelInfoArgs, InsertOpts, JobState};
    use vigil_storage::queries::channels;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        channels::add_channel(&db, "C1").await.unwrap();
        (db, dir)
    }

    fn settings() -> RunnerSettings {
        RunnerSettings {
            poll_interval: Duration::from_millis(10),
            job_timeout: Duration::from_secs(5),
            retry_backoff: Duration::from_secs(30),
            finalized_retention: Duration::from_secs(3600),
            prune_interval: Duration::from_secs(3600),
        }
    }

    enum Behaviour {
        Succeed,
        Fail,
        Hang,
        WaitForCancel,
    }

    struct TestWorker {
        behaviour: Behaviour,
        calls: AtomicUsize,
    }

    impl TestWorker {
        fn new(behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                behaviour,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl JobWorker for TestWorker {
        fn kind(&self) -> JobKind {
            JobKind::ChannelInfo
        }

        fn timeout(&self) -> Option<Duration> {
            Some(Duration::from_millis(50))
        }

        async fn work(&self, _job: &Job, cancel: &CancellationToken) -> Result<(), VigilError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Succeed => Ok(()),
                Behaviour::Fail => Err(VigilError::Chat {
                    message: "channel_not_found".into(),
                    source: None,
                }),
                Behaviour::Hang => {
                    std::future::pending::<()>().await;
                    Ok(())
                }
                Behaviour::WaitForCancel => {
                    cancel.cancelled().await;
                    Err(VigilError::Cancelled)
                }
            }
        }
    }

    async fn enqueue_info(db: &Database) -> i64 {
        let args = JobArgs::ChannelInfo(ChannelInfoArgs {
            channel_id: "C1".into(),
        });
        jobs::enqueue(db, &args, &InsertOpts::default()).await.unwrap()
    }

    #[tokio::test]
    async fn successful_job_is_completed() {
        let (db, _dir) = setup_db().await;
        let id = enqueue_info(&db).await;
        let worker = TestWorker::new(Behaviour::Succeed);

        let outcome = run_once(&db, worker.as_ref(), &settings(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, Some(JobOutcome::Completed));
        assert_eq!(
            jobs::get_job(&db, id).await.unwrap().unwrap().state,
            JobState::Completed
        );
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn failed_job_is_rescheduled_with_its_error() {
        let (db, _dir) = setup_db().await;
        let id = enqueue_info(&db).await;
        let worker = TestWorker::new(Behaviour::Fail);

        let outcome = run_once(&db, worker.as_ref(), &settings(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, Some(JobOutcome::Failed(FailOutcome::Retrying)));

        let job = jobs::get_job(&db, id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Available);
        assert!(job.last_error.unwrap().contains("channel_not_found"));
        // Backoff keeps it out of reach for now.
        assert!(jobs::dequeue(&db, JobKind::ChannelInfo).await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn hung_job_times_out() {
        let (db, _dir) = setup_db().await;
        let id = enqueue_info(&db).await;
        let worker = TestWorker::new(Behaviour::Hang);

        let outcome = run_once(&db, worker.as_ref(), &settings(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, Some(JobOutcome::Failed(FailOutcome::Retrying)));
        let job = jobs::get_job(&db, id).await.unwrap().unwrap();
        assert!(job.last_error.unwrap().contains("timed out"));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn empty_queue_runs_nothing() {
        let (db, _dir) = setup_db().await;
        let worker = TestWorker::new(Behaviour::Succeed);
        let outcome = run_once(&db, worker.as_ref(), &settings(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, None);
        assert_eq!(worker.calls.load(Ordering::SeqCst), 0);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn pool_drains_queue_and_stops_on_cancel() {
        let (db, _dir) = setup_db().await;
        let id = enqueue_info(&db).await;
        let worker = TestWorker::new(Behaviour::Succeed);

        let mut pool = WorkerPool::new(db.clone(), settings());
        pool.register(worker.clone(), 2);
        assert_eq!(pool.kinds(), vec![JobKind::ChannelInfo]);

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(pool.run(cancel.clone()));

        for _ in 0..200 {
            if jobs::get_job(&db, id).await.unwrap().unwrap().state == JobState::Completed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cancel.cancel();
        handle.await.unwrap().unwrap();

        assert_eq!(worker.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            jobs::get_job(&db, id).await.unwrap().unwrap().state,
            JobState::Completed
        );
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn cancelled_job_is_available_again_without_spending_an_attempt() {
        let (db, _dir) = setup_db().await;
        let id = enqueue_info(&db).await;
        let worker = TestWorker::new(Behaviour::WaitForCancel);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = run_once(&db, worker.as_ref(), &settings(), &cancel)
            .await
            .unwrap();
        assert_eq!(outcome, Some(JobOutcome::Failed(FailOutcome::Retrying)));
        let again = jobs::dequeue(&db, JobKind::ChannelInfo).await.unwrap().unwrap();
        assert_eq!(again.id, id);
        // The interrupted attempt was refunded.
        assert_eq!(again.attempt, 1);
        assert_eq!(again.max_attempts, vigil_core::jobs::DEFAULT_MAX_ATTEMPTS);
        db.close().await.unwrap();
    }
}

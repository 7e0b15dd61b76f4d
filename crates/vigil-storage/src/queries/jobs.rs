// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable job queue with priorities, scheduling, and uniqueness.
//!
//! Jobs move `available -> running -> completed`, or back to `available`
//! on a retryable failure, or to `failed` once the attempt budget is spent.
//! At most one `available` job exists per `(kind, unique_key)`.

use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use rusqlite::{OptionalExtension, params};
use vigil_core::jobs::{DEFAULT_MAX_ATTEMPTS, InsertOpts, format_timestamp};
use vigil_core::{Job, JobArgs, JobKind, JobState, Priority, VigilError};

use crate::database::{Database, TxError, json_err, map_tr_err, map_tx_err, now_timestamp};

const JOB_COLUMNS: &str =
    "id, args, priority, state, attempt, max_attempts, scheduled_at, last_error";

type JobRow = (i64, String, i64, String, i64, i64, String, Option<String>);

fn row_to_job(row: &rusqlite::Row<'_>) -> Result<JobRow, rusqlite::Error> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn decode_job(
    (id, args, priority, state, attempt, max_attempts, scheduled_at, last_error): JobRow,
) -> Result<Job, VigilError> {
    Ok(Job {
        id,
        args: serde_json::from_str(&args).map_err(VigilError::storage)?,
        priority: Priority(u8::try_from(priority).unwrap_or(Priority::BACKFILL.0)),
        state: JobState::from_str(&state)
            .map_err(|_| VigilError::Internal(format!("unknown job state `{state}`")))?,
        attempt: u32::try_from(attempt).unwrap_or(0),
        max_attempts: u32::try_from(max_attempts).unwrap_or(DEFAULT_MAX_ATTEMPTS),
        scheduled_at,
        last_error,
    })
}

/// Insert a job inside an open transaction.
///
/// When the job has a unique key and `opts.unique_by_args` is set, a
/// pending job with the same `(kind, unique_key)` absorbs the insert and its
/// id is returned instead. The pending job keeps the earlier of the two
/// schedules and the more urgent of the two priorities.
pub(crate) fn insert_job_tx(
    conn: &rusqlite::Connection,
    args: &JobArgs,
    opts: &InsertOpts,
) -> Result<i64, TxError> {
    let kind = args.kind().to_string();
    let payload = serde_json::to_string(args).map_err(json_err)?;
    let unique_key = if opts.unique_by_args {
        args.unique_key()
    } else {
        None
    };
    let scheduled_at = opts
        .scheduled_at
        .map(format_timestamp)
        .unwrap_or_else(now_timestamp);
    let max_attempts = opts.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS);

    let changed = conn.execute(
        "INSERT INTO jobs (kind, args, unique_key, priority, max_attempts, scheduled_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT DO NOTHING",
        params![
            kind,
            payload,
            unique_key,
            i64::from(opts.priority.0),
            i64::from(max_attempts),
            scheduled_at
        ],
    )?;
    if changed == 1 {
        return Ok(conn.last_insert_rowid());
    }

    let existing = conn.query_row(
        "SELECT id FROM jobs WHERE kind = ?1 AND unique_key = ?2 AND state = 'available'",
        params![kind, unique_key],
        |row| row.get(0),
    )?;
    conn.execute(
        "UPDATE jobs SET scheduled_at = MIN(scheduled_at, ?1), priority = MIN(priority, ?2)
         WHERE id = ?3",
        params![scheduled_at, i64::from(opts.priority.0), existing],
    )?;
    Ok(existing)
}

/// Enqueue a job on its own. Returns the job id (possibly of an existing
/// pending duplicate).
pub async fn enqueue(db: &Database, args: &JobArgs, opts: &InsertOpts) -> Result<i64, VigilError> {
    let args = args.clone();
    let opts = opts.clone();
    db.connection()
        .call(move |conn| -> Result<i64, TxError> {
            let tx = conn.transaction()?;
            let id = insert_job_tx(&tx, &args, &opts)?;
            tx.commit()?;
            Ok(id)
        })
        .await
        .map_err(map_tx_err)
}

/// Claim the next runnable job of `kind`.
///
/// Picks the highest priority (lowest number) job whose scheduled time has
/// passed, oldest first, and marks it running. Returns `None` when nothing
/// is runnable.
pub async fn dequeue(db: &Database, kind: JobKind) -> Result<Option<Job>, VigilError> {
    let kind = kind.to_string();
    let row = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let now = now_timestamp();

            let row = tx
                .query_row(
                    &format!(
                        "SELECT {JOB_COLUMNS} FROM jobs
                         WHERE kind = ?1 AND state = 'available' AND scheduled_at <= ?2
                         ORDER BY priority ASC, scheduled_at ASC, id ASC
                         LIMIT 1"
                    ),
                    params![kind, now],
                    row_to_job,
                )
                .optional()?;

            let Some(row) = row else {
                tx.commit()?;
                return Ok(None);
            };

            tx.execute(
                "UPDATE jobs SET state = 'running', attempt = attempt + 1, attempted_at = ?1
                 WHERE id = ?2",
                params![now, row.0],
            )?;
            tx.commit()?;

            let (id, args, priority, _, attempt, max_attempts, scheduled_at, last_error) = row;
            Ok(Some((
                id,
                args,
                priority,
                JobState::Running.to_string(),
                attempt + 1,
                max_attempts,
                scheduled_at,
                last_error,
            )))
        })
        .await
        .map_err(map_tr_err)?;
    row.map(decode_job).transpose()
}

/// Mark a running job as completed.
pub async fn complete(db: &Database, id: i64) -> Result<(), VigilError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE jobs SET state = 'completed', finalized_at = ?1 WHERE id = ?2",
                params![now_timestamp(), id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// What [`fail`] did with the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    /// Rescheduled for another attempt.
    Retrying,
    /// Attempt budget exhausted; left `failed` for inspection.
    Discarded,
    /// A pending duplicate already covers the same work.
    Superseded,
}

/// Record a failed attempt.
///
/// The job returns to `available` after `retry_in` unless its attempt
/// budget is spent, in which case it stays `failed` with `error` kept for
/// operator inspection.
pub async fn fail(
    db: &Database,
    id: i64,
    error: &str,
    retry_in: Duration,
) -> Result<FailOutcome, VigilError> {
    let error = error.to_string();
    let retry_at = chrono::Duration::from_std(retry_in)
        .map(|d| format_timestamp(Utc::now() + d))
        .unwrap_or_else(|_| now_timestamp());
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let (attempt, max_attempts): (i64, i64) = tx.query_row(
                "SELECT attempt, max_attempts FROM jobs WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            let outcome = if attempt >= max_attempts {
                tx.execute(
                    "UPDATE jobs SET state = 'failed', last_error = ?1, finalized_at = ?2
                     WHERE id = ?3",
                    params![error, now_timestamp(), id],
                )?;
                FailOutcome::Discarded
            } else {
                // OR IGNORE: a pending job with the same unique key wins.
                let changed = tx.execute(
                    "UPDATE OR IGNORE jobs SET state = 'available', last_error = ?1, scheduled_at = ?2
                     WHERE id = ?3",
                    params![error, retry_at, id],
                )?;
                if changed == 1 {
                    FailOutcome::Retrying
                } else {
                    tx.execute(
                        "UPDATE jobs SET state = 'cancelled', last_error = ?1, finalized_at = ?2
                         WHERE id = ?3",
                        params![error, now_timestamp(), id],
                    )?;
                    FailOutcome::Superseded
                }
            };
            tx.commit()?;
            Ok(outcome)
        })
        .await
        .map_err(map_tr_err)
}

/// Return a running job interrupted by shutdown to the queue.
///
/// The interrupted attempt is refunded and the job is runnable at once.
pub async fn release(db: &Database, id: i64, reason: &str) -> Result<FailOutcome, VigilError> {
    let reason = reason.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let now = now_timestamp();
            let changed = tx.execute(
                "UPDATE OR IGNORE jobs
                 SET state = 'available', attempt = MAX(attempt - 1, 0), last_error = ?1,
                     scheduled_at = ?2
                 WHERE id = ?3 AND state = 'running'",
                params![reason, now, id],
            )?;
            let outcome = if changed == 1 {
                FailOutcome::Retrying
            } else {
                tx.execute(
                    "UPDATE jobs SET state = 'cancelled', last_error = ?1, finalized_at = ?2
                     WHERE id = ?3 AND state = 'running'",
                    params![reason, now, id],
                )?;
                FailOutcome::Superseded
            };
            tx.commit()?;
            Ok(outcome)
        })
        .await
        .map_err(map_tr_err)
}

/// Return jobs left `running` by a previous process to the queue.
///
/// Only safe while no worker of this process is running.
pub async fn rescue_running(db: &Database) -> Result<usize, VigilError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let rescued = tx.execute(
                "UPDATE OR IGNORE jobs SET state = 'available', scheduled_at = ?1
                 WHERE state = 'running'",
                params![now_timestamp()],
            )?;
            // Whatever is still running collided with a pending duplicate.
            tx.execute(
                "UPDATE jobs SET state = 'cancelled', finalized_at = ?1,
                 last_error = 'superseded by pending duplicate'
                 WHERE state = 'running'",
                params![now_timestamp()],
            )?;
            tx.commit()?;
            Ok(rescued)
        })
        .await
        .map_err(map_tr_err)
}

/// Delete finalized jobs older than `older_than`. Returns the number removed.
pub async fn prune_finalized(db: &Database, older_than: Duration) -> Result<usize, VigilError> {
    let cutoff = chrono::Duration::from_std(older_than)
        .map(|d| format_timestamp(Utc::now() - d))
        .map_err(|e| VigilError::Internal(format!("retention out of range: {e}")))?;
    db.connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM jobs
                 WHERE state IN ('completed', 'failed', 'cancelled') AND finalized_at < ?1",
                params![cutoff],
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch a single job by id.
pub async fn get_job(db: &Database, id: i64) -> Result<Option<Job>, VigilError> {
    let row = db
        .connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
                params![id],
                row_to_job,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)?;
    row.map(decode_job).transpose()
}

/// List jobs in insertion order, optionally filtered by kind.
pub async fn list_jobs(db: &Database, kind: Option<JobKind>) -> Result<Vec<Job>, VigilError> {
    let kind = kind.map(|k| k.to_string());
    let rows = db
        .connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {JOB_COLUMNS} FROM jobs
                 WHERE ?1 IS NULL OR kind = ?1
                 ORDER BY id ASC"
            ))?;
            let rows = stmt.query_map(params![kind], row_to_job)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)?;
    rows.into_iter().map(decode_job).collect()
}

/// Number of jobs per state for `kind`, for health reporting.
pub async fn count_by_state(db: &Database, kind: JobKind) -> Result<Vec<(JobState, i64)>, VigilError> {
    let kind = kind.to_string();
    let rows = db
        .connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT state, COUNT(*) FROM jobs WHERE kind = ?1 GROUP BY state ORDER BY state",
            )?;
            let rows = stmt.query_map(params![kind], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)?;
    Ok(rows
        .into_iter()
        .filter_map(|(state, n)| JobState::from_str(&state).ok().map(|s| (s, n)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use vigil_core::SlackTs;
    use vigil_core::jobs::{ClassifyMessageArgs, IngestChannelArgs};

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn ingest(channel: &str) -> JobArgs {
        JobArgs::IngestChannel(IngestChannelArgs {
            channel_id: channel.into(),
        })
    }

    fn classify(ts: &str, is_backfill: bool) -> JobArgs {
        JobArgs::ClassifyMessage(ClassifyMessageArgs {
            channel_id: "C1".into(),
            ts: SlackTs::parse(ts).unwrap(),
            is_backfill,
        })
    }

    #[tokio::test]
    async fn enqueue_and_dequeue_lifecycle() {
        let (db, _dir) = setup_db().await;

        let id = enqueue(&db, &ingest("C1"), &InsertOpts::default()).await.unwrap();
        assert!(id > 0);

        let job = dequeue(&db, JobKind::IngestChannel).await.unwrap().unwrap();
        assert_eq!(job.id, id);
        assert_eq!(job.state, JobState::Running);
        assert_eq!(job.attempt, 1);
        assert_eq!(job.args, ingest("C1"));

        // Nothing else is runnable.
        assert!(dequeue(&db, JobKind::IngestChannel).await.unwrap().is_none());

        complete(&db, id).await.unwrap();
        let job = get_job(&db, id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Completed);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn dequeue_only_returns_requested_kind() {
        let (db, _dir) = setup_db().await;
        enqueue(&db, &ingest("C1"), &InsertOpts::default()).await.unwrap();
        assert!(dequeue(&db, JobKind::ClassifyMessage).await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn pending_duplicates_collapse() {
        let (db, _dir) = setup_db().await;

        let first = enqueue(&db, &ingest("C1"), &InsertOpts::default()).await.unwrap();
        let second = enqueue(&db, &ingest("C1"), &InsertOpts::default()).await.unwrap();
        let other = enqueue(&db, &ingest("C2"), &InsertOpts::default()).await.unwrap();
        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(list_jobs(&db, Some(JobKind::IngestChannel)).await.unwrap().len(), 2);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn a_running_job_does_not_block_its_successor() {
        let (db, _dir) = setup_db().await;

        let first = enqueue(&db, &ingest("C1"), &InsertOpts::default()).await.unwrap();
        dequeue(&db, JobKind::IngestChannel).await.unwrap().unwrap();
        let next = enqueue(&db, &ingest("C1"), &InsertOpts::default()).await.unwrap();
        assert_ne!(first, next);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn live_jobs_run_before_backfill() {
        let (db, _dir) = setup_db().await;

        let backfill = InsertOpts::default().with_priority(Priority::BACKFILL);
        enqueue(&db, &classify("1.0", true), &backfill).await.unwrap();
        enqueue(&db, &classify("2.0", true), &backfill).await.unwrap();
        let live = enqueue(&db, &classify("3.0", false), &InsertOpts::default())
            .await
            .unwrap();

        let job = dequeue(&db, JobKind::ClassifyMessage).await.unwrap().unwrap();
        assert_eq!(job.id, live);
        let job = dequeue(&db, JobKind::ClassifyMessage).await.unwrap().unwrap();
        assert_eq!(job.args, classify("1.0", true));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn future_jobs_are_not_dequeued() {
        let (db, _dir) = setup_db().await;
        let opts = InsertOpts::default().scheduled_in(Duration::from_secs(60));
        enqueue(&db, &ingest("C1"), &opts).await.unwrap();
        assert!(dequeue(&db, JobKind::IngestChannel).await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn fail_reschedules_with_backoff() {
        let (db, _dir) = setup_db().await;

        let id = enqueue(&db, &ingest("C1"), &InsertOpts::default()).await.unwrap();
        dequeue(&db, JobKind::IngestChannel).await.unwrap().unwrap();

        let outcome = fail(&db, id, "rate limited", Duration::from_secs(30)).await.unwrap();
        assert_eq!(outcome, FailOutcome::Retrying);

        let job = get_job(&db, id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Available);
        assert_eq!(job.last_error.as_deref(), Some("rate limited"));
        assert!(job.scheduled_at > now_timestamp());
        // Not runnable until the backoff elapses.
        assert!(dequeue(&db, JobKind::IngestChannel).await.unwrap().is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn fail_marks_permanently_failed_at_max_attempts() {
        let (db, _dir) = setup_db().await;

        let opts = InsertOpts {
            max_attempts: Some(2),
            ..InsertOpts::default()
        };
        let id = enqueue(&db, &ingest("C1"), &opts).await.unwrap();

        for expected in [FailOutcome::Retrying, FailOutcome::Discarded] {
            dequeue(&db, JobKind::IngestChannel).await.unwrap().unwrap();
            let outcome = fail(&db, id, "boom", Duration::ZERO).await.unwrap();
            assert_eq!(outcome, expected);
        }

        let job = get_job(&db, id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.attempt, 2);
        assert_eq!(job.last_error.as_deref(), Some("boom"));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn retry_yields_to_pending_duplicate() {
        let (db, _dir) = setup_db().await;

        let id = enqueue(&db, &ingest("C1"), &InsertOpts::default()).await.unwrap();
        dequeue(&db, JobKind::IngestChannel).await.unwrap().unwrap();
        let pending = enqueue(&db, &ingest("C1"), &InsertOpts::default()).await.unwrap();

        let outcome = fail(&db, id, "boom", Duration::ZERO).await.unwrap();
        assert_eq!(outcome, FailOutcome::Superseded);
        assert_eq!(get_job(&db, id).await.unwrap().unwrap().state, JobState::Cancelled);
        assert_eq!(get_job(&db, pending).await.unwrap().unwrap().state, JobState::Available);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn immediate_duplicate_pulls_a_delayed_job_forward() {
        let (db, _dir) = setup_db().await;

        let delayed = InsertOpts::default()
            .scheduled_in(Duration::from_secs(60))
            .with_priority(Priority::BACKFILL);
        let id = enqueue(&db, &ingest("C1"), &delayed).await.unwrap();
        assert!(dequeue(&db, JobKind::IngestChannel).await.unwrap().is_none());

        let again = enqueue(&db, &ingest("C1"), &InsertOpts::default()).await.unwrap();
        assert_eq!(again, id);
        let job = dequeue(&db, JobKind::IngestChannel).await.unwrap().unwrap();
        assert_eq!(job.id, id);
        assert_eq!(job.priority, Priority::LIVE);
        assert_eq!(list_jobs(&db, Some(JobKind::IngestChannel)).await.unwrap().len(), 1);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn delayed_duplicate_does_not_push_a_due_job_back() {
        let (db, _dir) = setup_db().await;

        let id = enqueue(&db, &ingest("C1"), &InsertOpts::default()).await.unwrap();
        let delayed = InsertOpts::default().scheduled_in(Duration::from_secs(60));
        enqueue(&db, &ingest("C1"), &delayed).await.unwrap();

        let job = dequeue(&db, JobKind::IngestChannel).await.unwrap().unwrap();
        assert_eq!(job.id, id);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn released_job_gets_its_attempt_back() {
        let (db, _dir) = setup_db().await;
        let id = enqueue(&db, &ingest("C1"), &InsertOpts::default()).await.unwrap();
        dequeue(&db, JobKind::IngestChannel).await.unwrap().unwrap();

        let outcome = release(&db, id, "cancelled").await.unwrap();
        assert_eq!(outcome, FailOutcome::Retrying);
        let job = get_job(&db, id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Available);
        assert_eq!(job.attempt, 0);
        assert_eq!(job.last_error.as_deref(), Some("cancelled"));

        let job = dequeue(&db, JobKind::IngestChannel).await.unwrap().unwrap();
        assert_eq!(job.attempt, 1);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn released_job_yields_to_pending_duplicate() {
        let (db, _dir) = setup_db().await;
        let id = enqueue(&db, &ingest("C1"), &InsertOpts::default()).await.unwrap();
        dequeue(&db, JobKind::IngestChannel).await.unwrap().unwrap();
        let pending = enqueue(&db, &ingest("C1"), &InsertOpts::default()).await.unwrap();

        assert_eq!(release(&db, id, "cancelled").await.unwrap(), FailOutcome::Superseded);
        assert_eq!(get_job(&db, id).await.unwrap().unwrap().state, JobState::Cancelled);
        assert_eq!(get_job(&db, pending).await.unwrap().unwrap().state, JobState::Available);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn rescue_returns_orphaned_jobs_to_the_queue() {
        let (db, _dir) = setup_db().await;
        let id = enqueue(&db, &ingest("C1"), &InsertOpts::default()).await.unwrap();
        dequeue(&db, JobKind::IngestChannel).await.unwrap().unwrap();

        assert_eq!(rescue_running(&db).await.unwrap(), 1);
        let job = dequeue(&db, JobKind::IngestChannel).await.unwrap().unwrap();
        assert_eq!(job.id, id);
        assert_eq!(job.attempt, 2);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn prune_removes_only_old_finalized_jobs() {
        let (db, _dir) = setup_db().await;
        let done = enqueue(&db, &ingest("C1"), &InsertOpts::default()).await.unwrap();
        dequeue(&db, JobKind::IngestChannel).await.unwrap().unwrap();
        complete(&db, done).await.unwrap();
        enqueue(&db, &ingest("C2"), &InsertOpts::default()).await.unwrap();

        // Nothing is old enough yet.
        assert_eq!(prune_finalized(&db, Duration::from_secs(3600)).await.unwrap(), 0);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(prune_finalized(&db, Duration::ZERO).await.unwrap(), 1);
        assert_eq!(list_jobs(&db, None).await.unwrap().len(), 1);

        let counts = count_by_state(&db, JobKind::IngestChannel).await.unwrap();
        assert_eq!(counts, vec![(JobState::Available, 1)]);

        db.close().await.unwrap();
    }
}

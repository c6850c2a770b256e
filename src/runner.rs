//! Job registry and dispatch loop.
//!
//! The runner owns the set of registered jobs and fires one independent
//! tick-handler task per scheduled occurrence. The handler brackets the
//! job's work function with the lock coordinator: acquire, run, release.

use std::future::Future;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    config::{MutexConfig, OutagePolicy},
    error::CronError,
    mutex::CronMutex,
    schedule,
    traits::LockStore,
};

const TICK_INTERVAL: Duration = Duration::from_millis(500);

pub type WorkError = Box<dyn std::error::Error + Send + Sync>;

type WorkFn =
    Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, Result<(), WorkError>> + Send + Sync>;

/// Immutable per-job value handed into each tick handler: identity, schedule
/// and work function bound together at registration time.
#[derive(Clone)]
struct JobSpec {
    name: String,
    schedule: String,
    work: WorkFn,
    /// Set while an occurrence runs on this replica; consulted only when
    /// `serialize_local` is enabled.
    is_running: Arc<AtomicBool>,
}

struct JobState {
    spec: JobSpec,
    parsed: cron::Schedule,
    next_fire: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy)]
struct TickOptions {
    outage_policy: OutagePolicy,
    serialize_local: bool,
    work_timeout: Option<Duration>,
}

/// Clears the `is_running` flag when dropped, so the flag resets on every
/// exit path of the work task, panics included.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct Cron<S: LockStore> {
    mutex: Arc<CronMutex<S>>,
    jobs: Vec<JobState>,
    opts: TickOptions,
    shutdown: CancellationToken,
}

impl<S: LockStore> Cron<S> {
    pub fn new(conf: MutexConfig, store: S) -> Self {
        let conf = conf.normalized();
        let opts = TickOptions {
            outage_policy: conf.outage_policy,
            serialize_local: conf.serialize_local,
            work_timeout: conf.work_timeout_sec.map(Duration::from_secs),
        };
        Self {
            mutex: Arc::new(CronMutex::new(store, &conf)),
            jobs: Vec::new(),
            opts,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token cancelled when the runner shuts down. Cancelling it externally
    /// also stops [`run`](Self::run).
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Add a job to the registry.
    ///
    /// The expression is parsed eagerly: an unschedulable job is a
    /// configuration error the process must not start with, so callers
    /// should treat an `Err` here as fatal at startup rather than a runtime
    /// condition to recover from.
    pub fn register<W, F>(
        &mut self,
        schedule_expr: &str,
        job_name: &str,
        work: W,
    ) -> Result<(), CronError>
    where
        W: Fn(CancellationToken) -> F + Send + Sync + 'static,
        F: Future<Output = Result<(), WorkError>> + Send + 'static,
    {
        let parsed = schedule::parse(schedule_expr)?;
        if self.jobs.iter().any(|j| j.spec.name == job_name) {
            return Err(CronError::DuplicateJob {
                name: job_name.to_string(),
            });
        }
        let work: WorkFn = Arc::new(move |ctx| Box::pin(work(ctx)));
        self.jobs.push(JobState {
            spec: JobSpec {
                name: job_name.to_string(),
                schedule: schedule_expr.to_string(),
                work,
                is_running: Arc::new(AtomicBool::new(false)),
            },
            parsed,
            next_fire: None,
        });
        Ok(())
    }

    /// Dispatch loop. Blocks until SIGINT/SIGTERM or until the
    /// [`shutdown_token`](Self::shutdown_token) is cancelled.
    pub async fn run(mut self) -> Result<(), CronError> {
        let now = Utc::now();
        for job in &mut self.jobs {
            job.next_fire = job.parsed.after(&now).next();
        }

        info!(
            node_id = %self.mutex.node_id(),
            job_count = self.jobs.len(),
            "Cron runner starting"
        );

        let shutdown = self.shutdown.clone();
        let mut tick = tokio::time::interval(TICK_INTERVAL);

        loop {
            tokio::select! {
                _ = shutdown_signal() => {
                    info!("Shutdown signal received, cancelling in-flight work");
                    self.shutdown.cancel();
                    break;
                }

                _ = shutdown.cancelled() => {
                    break;
                }

                _ = tick.tick() => {
                    let now = Utc::now();
                    let mutex = Arc::clone(&self.mutex);
                    let opts = self.opts;
                    for job in &mut self.jobs {
                        if job.next_fire.is_some_and(|t| now >= t) {
                            job.next_fire = job.parsed.after(&now).next();
                            tokio::spawn(handle_tick(
                                Arc::clone(&mutex),
                                job.spec.clone(),
                                opts,
                                shutdown.clone(),
                            ));
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

/// One scheduled occurrence: acquire, run the work, release.
///
/// Acquire always precedes the work invocation; once past the acquire
/// decision, release is attempted exactly once on every exit path. A lock
/// held by another replica is left untouched.
async fn handle_tick<S: LockStore>(
    mutex: Arc<CronMutex<S>>,
    job: JobSpec,
    opts: TickOptions,
    shutdown: CancellationToken,
) {
    let mut running_guard = None;
    if opts.serialize_local {
        if job.is_running.swap(true, Ordering::SeqCst) {
            info!(
                job = %job.name,
                "Previous occurrence still running on this replica, skipping tick"
            );
            return;
        }
        running_guard = Some(RunningGuard(Arc::clone(&job.is_running)));
    }

    match mutex.acquire(&job.name, &job.schedule).await {
        Ok(()) => {
            debug!(job = %job.name, "Acquired cron lock");
        }
        Err(CronError::AlreadyLocked) => {
            info!(
                job = %job.name,
                "Another replica holds the lock for this occurrence, skipping"
            );
            return;
        }
        Err(e) => match opts.outage_policy {
            OutagePolicy::FailOpen => {
                warn!(
                    job = %job.name,
                    error = %e,
                    "Lock acquisition failed, running without the lock"
                );
            }
            OutagePolicy::FailClosed => {
                warn!(
                    job = %job.name,
                    error = %e,
                    "Lock acquisition failed, skipping occurrence"
                );
                return;
            }
        },
    }

    // The work runs in its own task: a panic surfaces here as a JoinError
    // instead of unwinding past the release.
    let cancel = shutdown.child_token();
    let work_fut = (job.work)(cancel.clone());
    let handle = tokio::spawn(async move {
        let _running = running_guard;
        work_fut.await
    });

    let outcome = match opts.work_timeout {
        Some(limit) => match tokio::time::timeout(limit, handle).await {
            Ok(outcome) => outcome,
            Err(_) => {
                // Cancellation is cooperative: signal it and release the
                // lock; the work task is not force-terminated.
                cancel.cancel();
                error!(
                    job = %job.name,
                    timeout = ?limit,
                    "Job work timed out, cancellation requested"
                );
                release(&mutex, &job.name).await;
                return;
            }
        },
        None => handle.await,
    };

    match outcome {
        Ok(Ok(())) => debug!(job = %job.name, "Job work completed"),
        Ok(Err(e)) => error!(job = %job.name, error = %e, "Job work failed"),
        Err(e) if e.is_panic() => error!(job = %job.name, "Job work panicked"),
        Err(e) => error!(job = %job.name, error = %e, "Job work task aborted"),
    }

    release(&mutex, &job.name).await;
}

async fn release<S: LockStore>(mutex: &CronMutex<S>, job_name: &str) {
    if let Err(e) = mutex.release(job_name).await {
        warn!(job = %job_name, error = %e, "Failed to release cron lock");
    }
}

/// Resolves when the process receives SIGINT or SIGTERM.
///
/// On Unix both signals are handled so container orchestrators trigger a
/// clean shutdown; elsewhere only Ctrl-C is available.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c  => {}
        _ = sigterm => {}
    }
}

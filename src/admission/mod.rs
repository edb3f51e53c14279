//! Admission control and the bounded worker pool.
//!
//! # Data Flow
//! ```text
//! admit(site)
//!     → site disabled?            → Rejection::SiteDisabled (404)
//!     → slots.try_acquire()       → Rejection::Saturated (503) when W + Q are taken
//!     → Ticket
//! Ticket::spawn(job)
//!     → wait for a worker permit  (queued: counts against the backlog)
//!     → run job                   (running: counts against W)
//!     → permits released on completion, error, or cancellation
//! ```
//!
//! # Design Decisions
//! - One admission decision point: a non-blocking `try_acquire` on a
//!   semaphore of `workers + backlog` slots; it never waits on the pool
//! - Workers are a second semaphore of `workers` permits, FIFO, so queued
//!   jobs start in arrival order
//! - Shutdown closes both semaphores and cancels running jobs; nothing is
//!   awaited

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

use crate::config::PoolConfig;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::site::Site;

/// Why a job was not admitted.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    #[error("site is disabled")]
    SiteDisabled,

    #[error("worker pool and backlog are full")]
    Saturated,

    #[error("worker pool is shut down")]
    Closed,
}

impl Rejection {
    pub fn status(&self) -> StatusCode {
        match self {
            Rejection::SiteDisabled => StatusCode::NOT_FOUND,
            Rejection::Saturated | Rejection::Closed => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Metric label.
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::SiteDisabled => "site_disabled",
            Rejection::Saturated => "saturated",
            Rejection::Closed => "closed",
        }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        self.status().into_response()
    }
}

/// Bounded task admission with independent concurrency and backlog limits.
#[derive(Debug)]
pub struct Admission {
    slots: Arc<Semaphore>,
    workers: Arc<Semaphore>,
    running: Arc<AtomicUsize>,
    shutdown: Shutdown,
    capacity: usize,
}

/// Largest permit count a semaphore accepts.
pub fn clamp_permits(permits: usize) -> usize {
    permits.min(Semaphore::MAX_PERMITS)
}

impl Admission {
    pub fn new(config: PoolConfig) -> Self {
        tracing::info!(
            workers = config.workers,
            backlog = config.backlog,
            "Worker pool created"
        );
        let capacity = clamp_permits(config.workers.saturating_add(config.backlog));
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            workers: Arc::new(Semaphore::new(clamp_permits(config.workers))),
            running: Arc::new(AtomicUsize::new(0)),
            shutdown: Shutdown::new(),
            capacity,
        }
    }

    /// Admit a job for `site`, or reject it without blocking.
    pub fn admit(&self, site: &Site) -> Result<Ticket, Rejection> {
        if !site.is_enabled() {
            return Err(Rejection::SiteDisabled);
        }
        self.try_admit()
    }

    /// Take a pool slot if one is free.
    pub fn try_admit(&self) -> Result<Ticket, Rejection> {
        match Arc::clone(&self.slots).try_acquire_owned() {
            Ok(slot) => Ok(Ticket {
                slot,
                workers: Arc::clone(&self.workers),
                running: Arc::clone(&self.running),
                shutdown: self.shutdown.clone(),
            }),
            Err(tokio::sync::TryAcquireError::NoPermits) => Err(Rejection::Saturated),
            Err(tokio::sync::TryAcquireError::Closed) => Err(Rejection::Closed),
        }
    }

    /// Jobs currently executing.
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Jobs admitted but not yet running.
    pub fn queued(&self) -> usize {
        let admitted = self.capacity() - self.slots.available_permits();
        admitted.saturating_sub(self.running())
    }

    /// Total jobs that can be admitted at once (`workers + backlog`).
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.slots.is_closed()
    }

    /// Stop admitting, drop queued jobs and cancel running ones.
    pub fn shutdown(&self) {
        if self.slots.is_closed() {
            return;
        }
        tracing::info!(
            running = self.running(),
            queued = self.queued(),
            "Worker pool shutting down, cancelling outstanding jobs"
        );
        self.slots.close();
        self.workers.close();
        self.shutdown.trigger();
    }
}

/// Proof of admission. Holds a pool slot until the job it spawns is done.
#[derive(Debug)]
pub struct Ticket {
    slot: OwnedSemaphorePermit,
    workers: Arc<Semaphore>,
    running: Arc<AtomicUsize>,
    shutdown: Shutdown,
}

impl Ticket {
    /// Queue `job` for the next free worker.
    pub fn spawn<F>(self, job: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Ticket {
            slot,
            workers,
            running,
            shutdown,
        } = self;
        let mut cancelled = shutdown.subscribe();

        tokio::spawn(async move {
            let _slot = slot;

            let worker = tokio::select! {
                permit = workers.acquire_owned() => permit,
                _ = cancelled.recv() => return,
            };
            let Ok(_worker) = worker else {
                tracing::debug!("Worker pool closed before job started");
                return;
            };

            let _running = RunningGuard::enter(running);
            tokio::select! {
                _ = job => {}
                _ = cancelled.recv() => {
                    tracing::debug!("Job cancelled by shutdown");
                }
            }
        })
    }
}

/// Counts a running job; decrements on drop so cancellation is accounted for.
struct RunningGuard {
    running: Arc<AtomicUsize>,
}

impl RunningGuard {
    fn enter(running: Arc<AtomicUsize>) -> Self {
        running.fetch_add(1, Ordering::SeqCst);
        metrics::job_started();
        Self { running }
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.running.fetch_sub(1, Ordering::SeqCst);
        metrics::job_finished();
    }
}

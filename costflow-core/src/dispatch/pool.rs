//! Worker pool executing recalculation units
//!
//! ```text
//! enqueue ──► crossbeam channel ──► recalc-worker-0..N ──► Recalculator::execute
//!                    ▲                      │
//!                    └── follow-up units ◄──┤
//!                    └── redelivery (backoff) on Err, until max_attempts ──► dead letters
//! ```
//!
//! Delivery is at-least-once. A unit counts as in flight from enqueue until
//! it succeeds or is dead-lettered; redeliveries keep it in flight.

use super::job::RecalcJob;
use super::queue::RecalcQueue;
use super::recalculator::Recalculator;
use crate::core::DispatchError;
use crate::monitoring::EngineMetrics;
use crate::resilience::BackoffConfig;
use anyhow::{ensure, Context, Result};
use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub workers: usize,
    /// Deliveries per unit before it is dead-lettered
    pub max_attempts: u32,
    pub backoff: BackoffConfig,
    /// Log a warning when this many units are in flight
    pub queue_warning_depth: usize,
    /// How often idle workers check for shutdown
    pub poll_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_attempts: 5,
            backoff: BackoffConfig::default(),
            queue_warning_depth: 10_000,
            poll_interval: Duration::from_millis(50),
        }
    }
}

/// A unit abandoned after `attempts` failed deliveries
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub job: RecalcJob,
    pub attempts: u32,
    pub error: String,
}

struct Envelope {
    job: RecalcJob,
    /// Failed deliveries so far
    failures: u32,
}

struct Shared {
    sender: Sender<Envelope>,
    in_flight: AtomicUsize,
    idle_lock: Mutex<()>,
    idle: Condvar,
    accepting: AtomicBool,
    stopping: AtomicBool,
    dead_letters: Mutex<Vec<DeadLetter>>,
    config: PoolConfig,
    metrics: Option<Arc<EngineMetrics>>,
}

impl Shared {
    fn submit(&self, job: RecalcJob) -> Result<(), DispatchError> {
        let depth = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        if self.sender.send(Envelope { job, failures: 0 }).is_err() {
            self.finish();
            return Err(DispatchError::Closed);
        }

        if let Some(metrics) = &self.metrics {
            metrics.queue_depth.set(depth as i64);
        }
        if depth == self.config.queue_warning_depth {
            warn!(depth, "Recalculation queue is backing up");
        }
        Ok(())
    }

    /// A unit left the pool for good
    fn finish(&self) {
        let _guard = self.idle_lock.lock();
        let remaining = self.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
        if let Some(metrics) = &self.metrics {
            metrics.queue_depth.set(remaining as i64);
        }
        if remaining == 0 {
            self.idle.notify_all();
        }
    }
}

/// External handle; refuses work once the pool shuts down
#[derive(Clone)]
pub struct PoolHandle {
    shared: Arc<Shared>,
}

impl RecalcQueue for PoolHandle {
    fn enqueue(&self, job: RecalcJob) -> Result<(), DispatchError> {
        if !self.shared.accepting.load(Ordering::SeqCst) {
            return Err(DispatchError::Closed);
        }
        self.shared.submit(job)
    }
}

/// Queue handed to running units; follow-ups are accepted while draining
struct FollowUps<'a>(&'a Shared);

impl RecalcQueue for FollowUps<'_> {
    fn enqueue(&self, job: RecalcJob) -> Result<(), DispatchError> {
        self.0.submit(job)
    }
}

struct Worker {
    id: usize,
    recalculator: Arc<Recalculator>,
    shared: Arc<Shared>,
    receiver: Receiver<Envelope>,
}

impl Worker {
    fn run(self) {
        debug!(worker = self.id, "Recalculation worker started");
        loop {
            match self.receiver.recv_timeout(self.shared.config.poll_interval) {
                Ok(envelope) => self.process(envelope),
                Err(RecvTimeoutError::Timeout) => {
                    if self.shared.stopping.load(Ordering::SeqCst) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!(worker = self.id, "Recalculation worker stopping");
    }

    fn process(&self, envelope: Envelope) {
        let job = envelope.job;
        let error = match self.recalculator.execute(job, &FollowUps(&self.shared)) {
            Ok(_) => {
                self.shared.finish();
                return;
            }
            Err(e) => e,
        };

        let attempts = envelope.failures + 1;
        let config = &self.shared.config;
        if attempts >= config.max_attempts {
            error!(worker = self.id, %job, attempts, error = %error, "Recalculation unit dead-lettered");
            self.shared.dead_letters.lock().push(DeadLetter {
                job,
                attempts,
                error: error.to_string(),
            });
            if let Some(metrics) = &self.shared.metrics {
                metrics.dead_letters_total.inc();
            }
            self.shared.finish();
            return;
        }

        let delay = config.backoff.delay_for_attempt(attempts);
        warn!(
            worker = self.id,
            %job,
            attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Recalculation unit failed, redelivering"
        );
        thread::sleep(delay);
        if let Some(metrics) = &self.shared.metrics {
            metrics.redeliveries_total.inc();
        }
        if self
            .shared
            .sender
            .send(Envelope {
                job,
                failures: attempts,
            })
            .is_err()
        {
            self.shared.finish();
        }
    }
}

pub struct WorkerPool {
    shared: Arc<Shared>,
    handles: Vec<thread::JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(recalculator: Arc<Recalculator>, config: PoolConfig) -> Result<Self> {
        ensure!(config.workers > 0, "worker pool needs at least one worker");
        ensure!(config.max_attempts > 0, "max_attempts must be at least 1");

        // Unbounded: workers enqueue follow-ups into their own pool
        let (sender, receiver) = unbounded();
        let workers = config.workers;
        let shared = Arc::new(Shared {
            sender,
            in_flight: AtomicUsize::new(0),
            idle_lock: Mutex::new(()),
            idle: Condvar::new(),
            accepting: AtomicBool::new(true),
            stopping: AtomicBool::new(false),
            dead_letters: Mutex::new(Vec::new()),
            metrics: recalculator.metrics().cloned(),
            config,
        });

        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let worker = Worker {
                id,
                recalculator: recalculator.clone(),
                shared: shared.clone(),
                receiver: receiver.clone(),
            };
            let handle = thread::Builder::new()
                .name(format!("recalc-worker-{}", id))
                .spawn(move || worker.run())
                .with_context(|| format!("Failed to spawn recalculation worker {}", id))?;
            handles.push(handle);
        }

        info!(workers, "Recalculation worker pool started");
        Ok(Self { shared, handles })
    }

    pub fn handle(&self) -> PoolHandle {
        PoolHandle {
            shared: self.shared.clone(),
        }
    }

    /// Units queued, running or waiting for redelivery
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::SeqCst)
    }

    /// Block until nothing is in flight; false if `timeout` elapsed first
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.shared.idle_lock.lock();
        while self.shared.in_flight.load(Ordering::SeqCst) > 0 {
            if self.shared.idle.wait_until(&mut guard, deadline).timed_out() {
                return self.shared.in_flight.load(Ordering::SeqCst) == 0;
            }
        }
        true
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.shared.dead_letters.lock().clone()
    }

    /// Stop accepting work, let workers drain the channel, join them
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.shared.accepting.store(false, Ordering::SeqCst);
        self.shared.stopping.store(true, Ordering::SeqCst);
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                error!("Recalculation worker panicked");
            }
        }
    }
}

impl RecalcQueue for WorkerPool {
    fn enqueue(&self, job: RecalcJob) -> Result<(), DispatchError> {
        self.handle().enqueue(job)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

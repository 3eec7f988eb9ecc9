//! # Worker Pool Module
//!
//! Runs wave generation (many modules at once) on a bounded set of `may`
//! coroutines so bulk runs do not thrash the filesystem.
//!
//! ## Features
//!
//! - **Bounded concurrency**: N worker coroutines share one job channel
//! - **Ordered results**: [`GenerationPool::generate_wave`] returns results in
//!   request order regardless of completion order
//! - **Panic isolation**: a panicking generation becomes a failed
//!   [`GenerationResult`]; the worker keeps serving
//! - **Metrics**: dispatched, completed and panicked counters
//!
//! ## Configuration
//!
//! - `MODFORGE_WORKERS`: number of worker coroutines (default: 4)
//! - `MODFORGE_STACK_SIZE`: coroutine stack size, decimal or `0x` hex
//!   (default: `0x40000`)

use may::sync::mpsc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::config::{GeneratorConfig, DEFAULT_STACK_SIZE, DEFAULT_WORKERS};
use crate::pipeline::{GenerationRequest, GenerationResult, Generator};

/// Configuration for a generation pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPoolConfig {
    /// Number of worker coroutines
    pub num_workers: usize,
    /// Stack size for worker coroutines
    pub stack_size: usize,
}

impl WorkerPoolConfig {
    pub fn new(num_workers: usize, stack_size: usize) -> Self {
        Self {
            num_workers: num_workers.max(1),
            stack_size,
        }
    }

    pub fn from_config(config: &GeneratorConfig) -> Self {
        Self::new(config.workers, config.stack_size)
    }
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS, DEFAULT_STACK_SIZE)
    }
}

/// Counters for monitoring a pool
#[derive(Debug, Default)]
pub struct WorkerPoolMetrics {
    dispatched: AtomicU64,
    completed: AtomicU64,
    panicked: AtomicU64,
}

impl WorkerPoolMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_dispatch(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    fn record_completion(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_panic(&self) {
        self.panicked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_dispatched_count(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    pub fn get_completed_count(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn get_panicked_count(&self) -> u64 {
        self.panicked.load(Ordering::Relaxed)
    }

    /// Jobs dispatched but not yet completed
    pub fn get_in_flight(&self) -> u64 {
        self.get_dispatched_count()
            .saturating_sub(self.get_completed_count())
    }
}

struct Job {
    index: usize,
    request: GenerationRequest,
    reply: mpsc::Sender<(usize, GenerationResult)>,
}

/// A fixed set of worker coroutines sharing one [`Generator`].
pub struct GenerationPool {
    config: WorkerPoolConfig,
    sender: mpsc::Sender<Job>,
    metrics: Arc<WorkerPoolMetrics>,
}

impl GenerationPool {
    /// Spawn the worker coroutines.
    ///
    /// # Safety
    ///
    /// Spawns coroutines with `may::coroutine::Builder::spawn()`, which is
    /// unsafe in the `may` runtime. The caller must ensure the `may` runtime
    /// is usable and that the configured stack size fits the generation work
    /// (template rendering and `syn` parsing recurse).
    pub unsafe fn new(generator: Arc<Generator>, config: WorkerPoolConfig) -> Self {
        let (tx, rx) = mpsc::channel::<Job>();
        let rx = Arc::new(rx);
        let metrics = Arc::new(WorkerPoolMetrics::new());

        info!(
            num_workers = config.num_workers,
            stack_size = config.stack_size,
            "Creating generation pool"
        );

        for worker_id in 0..config.num_workers {
            let rx = Arc::clone(&rx);
            let generator = Arc::clone(&generator);
            let metrics = Arc::clone(&metrics);

            let spawn_result = may::coroutine::Builder::new()
                .name(format!("modforge-worker-{worker_id}"))
                .stack_size(config.stack_size)
                .spawn(move || {
                    debug!(worker_id, "Worker coroutine started");
                    // All workers share the receiver and load balance on it
                    while let Ok(job) = rx.recv() {
                        let Job {
                            index,
                            request,
                            reply,
                        } = job;
                        debug!(worker_id, request_id = %request.id, module = %request.spec.name, "Worker processing request");

                        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                            generator.generate(&request)
                        }));
                        let result = match outcome {
                            Ok(result) => result,
                            Err(panic) => {
                                metrics.record_panic();
                                let message = panic
                                    .downcast_ref::<&str>()
                                    .map(|s| s.to_string())
                                    .or_else(|| panic.downcast_ref::<String>().cloned())
                                    .unwrap_or_else(|| "unknown panic".to_string());
                                error!(
                                    worker_id,
                                    request_id = %request.id,
                                    panic_message = %message,
                                    "Generation panicked"
                                );
                                GenerationResult::panicked(&request, &message)
                            }
                        };
                        metrics.record_completion();
                        if reply.send((index, result)).is_err() {
                            debug!(worker_id, "Wave caller went away before the result arrived");
                        }
                    }
                    debug!(worker_id, "Worker coroutine exiting");
                });

            if let Err(e) = spawn_result {
                error!(worker_id, error = %e, "Failed to spawn worker coroutine");
            }
        }

        Self {
            config,
            sender: tx,
            metrics,
        }
    }

    /// Generate every request, returning results in request order.
    pub fn generate_wave(&self, requests: Vec<GenerationRequest>) -> Vec<GenerationResult> {
        let total = requests.len();
        let (reply_tx, reply_rx) = mpsc::channel();
        let mut results: Vec<Option<GenerationResult>> = Vec::with_capacity(total);
        let mut fallbacks = Vec::with_capacity(total);

        for (index, request) in requests.into_iter().enumerate() {
            results.push(None);
            fallbacks.push((request.id, request.module_root.clone(), request.spec.name.clone()));
            self.metrics.record_dispatch();
            let job = Job {
                index,
                request,
                reply: reply_tx.clone(),
            };
            if let Err(e) = self.sender.send(job) {
                error!(index, error = %e, "Generation pool channel disconnected");
            }
        }
        drop(reply_tx);

        for _ in 0..total {
            match reply_rx.recv() {
                Ok((index, result)) => {
                    if let Some(slot) = results.get_mut(index) {
                        *slot = Some(result);
                    }
                }
                Err(_) => break,
            }
        }

        results
            .into_iter()
            .zip(fallbacks)
            .map(|(result, (id, root, name))| {
                result.unwrap_or_else(|| GenerationResult::lost(id, &root, &name))
            })
            .collect()
    }

    pub fn metrics(&self) -> &Arc<WorkerPoolMetrics> {
        &self.metrics
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_clamps_workers() {
        assert_eq!(WorkerPoolConfig::new(0, 1024).num_workers, 1);
        let cfg = WorkerPoolConfig::from_config(&GeneratorConfig {
            workers: 8,
            stack_size: 0x80000,
            ..GeneratorConfig::default()
        });
        assert_eq!(cfg, WorkerPoolConfig::new(8, 0x80000));
    }

    #[test]
    fn test_metrics() {
        let metrics = WorkerPoolMetrics::new();
        metrics.record_dispatch();
        metrics.record_dispatch();
        metrics.record_completion();
        metrics.record_panic();
        assert_eq!(metrics.get_dispatched_count(), 2);
        assert_eq!(metrics.get_completed_count(), 1);
        assert_eq!(metrics.get_in_flight(), 1);
        assert_eq!(metrics.get_panicked_count(), 1);
    }
}

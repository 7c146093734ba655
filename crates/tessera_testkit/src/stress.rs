//! Stress helpers for the transaction layer.
//!
//! These run many transactions from many threads and report how many
//! succeeded, so tests can check invariants under contention.

use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tessera_core::{Adapter, AdapterError, AdapterResult, RequestContext};

use crate::fixtures::doc;

/// Collection written by the stress helpers.
pub const STRESS_COLLECTION: &str = "stress";

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of transactions to run in total.
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
    /// Documents written per transaction.
    pub writes_per_transaction: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 400,
            threads: 4,
            writes_per_transaction: 3,
        }
    }
}

/// Outcome of [`stress_shared_context`].
#[derive(Debug, Clone)]
pub struct SharedContextResult {
    /// Counts of writes issued under the shared context.
    pub result: StressTestResult,
    /// How many `init_transaction` calls reported starting the transaction.
    pub started: usize,
    /// Highest join count observed in the registry entry.
    pub refs: usize,
}

/// Runs independent transactions, one request context each, from many threads.
pub fn stress_independent_contexts(adapter: &Adapter, config: &StressConfig) -> StressTestResult {
    let successful = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let per_thread = config.operations / config.threads.max(1);

    let start = Instant::now();
    thread::scope(|s| {
        for t in 0..config.threads {
            let successful = &successful;
            let failed = &failed;
            s.spawn(move || {
                for i in 0..per_thread {
                    let ctx = RequestContext::new();
                    let outcome = adapter.transaction(&ctx, |ctx| {
                        for w in 0..config.writes_per_transaction {
                            adapter.operations().create(
                                Some(ctx),
                                STRESS_COLLECTION,
                                doc(json!({ "thread": t, "txn": i, "write": w })),
                            )?;
                        }
                        Ok(())
                    });
                    match outcome {
                        Ok(()) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            });
        }
    });

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Joins one request context from many threads, writes, then commits once.
///
/// # Errors
///
/// Returns the commit error.
pub fn stress_shared_context(
    adapter: &Adapter,
    config: &StressConfig,
) -> AdapterResult<SharedContextResult> {
    let ctx = RequestContext::new();
    let successful = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let started = AtomicUsize::new(0);
    let refs = AtomicUsize::new(0);

    let start = Instant::now();
    thread::scope(|s| {
        for t in 0..config.threads {
            let ctx = ctx.clone();
            let (successful, failed, started, refs) = (&successful, &failed, &started, &refs);
            s.spawn(move || {
                match adapter.init_transaction(&ctx) {
                    Ok(txn) if txn.started => {
                        started.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(_) => {}
                    Err(_) => {
                        failed.fetch_add(1, Ordering::Relaxed);
                        return;
                    }
                }
                if let Some(info) = adapter.registry().get_session(ctx.id()) {
                    refs.fetch_max(info.refs, Ordering::Relaxed);
                }
                for w in 0..config.writes_per_transaction {
                    let created = adapter.operations().create(
                        Some(&ctx),
                        STRESS_COLLECTION,
                        doc(json!({ "thread": t, "write": w })),
                    );
                    match created {
                        Ok(_) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            });
        }
    });
    adapter.commit_transaction(&ctx)?;

    Ok(SharedContextResult {
        result: StressTestResult::new(
            successful.load(Ordering::Relaxed),
            failed.load(Ordering::Relaxed),
            start.elapsed(),
        ),
        started: started.load(Ordering::Relaxed),
        refs: refs.load(Ordering::Relaxed),
    })
}

/// Runs transactions where every other one fails after writing.
///
/// Failed transactions must leave nothing behind, so afterwards the
/// collection holds exactly `successful_ops * writes_per_transaction` rows.
pub fn stress_transaction_aborts(adapter: &Adapter, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for i in 0..config.operations {
        let ctx = RequestContext::new();
        let outcome = adapter.transaction(&ctx, |ctx| {
            for w in 0..config.writes_per_transaction {
                adapter.operations().create(
                    Some(ctx),
                    STRESS_COLLECTION,
                    doc(json!({ "txn": i, "write": w })),
                )?;
            }
            if i % 2 == 1 {
                return Err(AdapterError::invalid_operation("deliberate abort"));
            }
            Ok(())
        });
        match outcome {
            Ok(()) => successful += 1,
            Err(_) => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

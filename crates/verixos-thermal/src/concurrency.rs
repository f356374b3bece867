//! Worker pool, cancellation and deadline plumbing (§5).
//!
//! thermal@: the public drivers are synchronous from the caller's side and
//! internally fan independent sub-runs out onto a `std::thread::scope`-based
//! pool — no async runtime, mirroring §9's guidance that async control flow
//! is re-expressed here as a synchronous loop with explicit polling points.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cooperative cancellation flag, polled between accepted transient steps
/// and between Newton outer iterations of the steady-state solver.
///
/// Cloning shares the same underlying flag; cancelling any clone cancels
/// every other.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// A token that is never cancelled unless [`CancellationToken::cancel`] is called.
    pub fn new() -> Self {
        CancellationToken { flag: Arc::new(AtomicBool::new(false)) }
    }

    /// Request cancellation. Visible to every clone of this token.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// A wall-clock deadline for one run. Polled alongside [`CancellationToken`]
/// at the same boundary.
#[derive(Debug, Clone, Copy)]
pub struct RunDeadline {
    at: Option<Instant>,
}

impl RunDeadline {
    /// No deadline: the run never times out on its own.
    pub fn none() -> Self {
        RunDeadline { at: None }
    }

    /// A deadline `duration` from now.
    pub fn after(duration: Duration) -> Self {
        RunDeadline { at: Some(Instant::now() + duration) }
    }

    /// Whether the deadline, if any, has elapsed.
    pub fn is_expired(&self) -> bool {
        self.at.map(|at| Instant::now() >= at).unwrap_or(false)
    }
}

/// A bounded pool of OS threads shared by the sensitivity and failure-sweep
/// drivers. Unlike the transient/steady-state solvers (which run
/// single-threaded and cooperatively), the pool dispatches whole independent
/// runs concurrently; within a run there is no shared mutable state (§5).
pub struct WorkerPool {
    size: usize,
}

impl WorkerPool {
    /// Create a pool with `size` workers (minimum 1).
    pub fn new(size: usize) -> Self {
        WorkerPool { size: size.max(1) }
    }

    /// Create a pool sized to the process-wide [`verixos::config::Config`]
    /// default (hardware parallelism, or 1 if undetectable).
    pub fn from_config(config: &verixos::config::Config) -> Self {
        WorkerPool::new(config.effective_worker_threads())
    }

    /// Configured worker count.
    pub fn size(&self) -> usize {
        self.size
    }
}

/// Run `f` over every item in `jobs` across up to `pool.size()` threads,
/// reassembling results in input order (§5 ordering guarantee). A job whose
/// thread panics contributes `None` at its slot rather than poisoning the
/// others.
pub fn run_on_pool<I, T, R, F>(pool: &WorkerPool, jobs: I, f: F) -> Vec<Option<R>>
where
    I: IntoIterator<Item = T>,
    T: Send,
    R: Send,
    F: Fn(T) -> R + Sync,
{
    let items: Vec<(usize, T)> = jobs.into_iter().enumerate().collect();
    let n = items.len();
    if n == 0 {
        return Vec::new();
    }
    let worker_count = pool.size().min(n).max(1);

    let mut buckets: Vec<Vec<(usize, T)>> = (0..worker_count).map(|_| Vec::new()).collect();
    for (worker, item) in items.into_iter().enumerate().map(|(i, item)| (i % worker_count, item)) {
        buckets[worker].push(item);
    }

    let mut results: Vec<Option<R>> = (0..n).map(|_| None).collect();

    std::thread::scope(|scope| {
        let f = &f;
        let handles: Vec<_> = buckets
            .into_iter()
            .map(|bucket| {
                scope.spawn(move || {
                    bucket
                        .into_iter()
                        .map(|(idx, item)| {
                            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(item))).ok();
                            (idx, outcome)
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        for handle in handles {
            if let Ok(batch) = handle.join() {
                for (idx, result) in batch {
                    results[idx] = result;
                }
            }
        }
    });

    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_token_is_shared_across_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn deadline_none_never_expires() {
        let deadline = RunDeadline::none();
        assert!(!deadline.is_expired());
    }

    #[test]
    fn deadline_after_zero_is_immediately_expired() {
        let deadline = RunDeadline::after(Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert!(deadline.is_expired());
    }
}

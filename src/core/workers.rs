//! Background thread pool for work that must stay off the control thread
//! (USalign pre-alignment before a load).
//!
//! Work-stealing deques from crossbeam: jobs go into a global injector,
//! idle workers steal from each other. An epoch counter cancels jobs that
//! were queued for a load the user has since replaced or abandoned. Results
//! never touch player state here; jobs send them back over a channel that
//! the control loop drains.

use crossbeam::deque::{Injector, Stealer, Worker};
use log::trace;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct Workers {
    injector: Arc<Injector<Job>>,
    handles: Vec<thread::JoinHandle<()>>,
    epoch: Arc<AtomicU64>,
    shutdown: Arc<AtomicBool>,
}

impl Workers {
    /// Spawn `num_threads` workers (at least one).
    pub fn new(num_threads: usize) -> Self {
        let num_threads = num_threads.max(1);
        let injector: Arc<Injector<Job>> = Arc::new(Injector::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let locals: Vec<Worker<Job>> = (0..num_threads).map(|_| Worker::new_fifo()).collect();
        let stealers: Vec<Stealer<Job>> = locals.iter().map(|w| w.stealer()).collect();

        let handles = locals
            .into_iter()
            .enumerate()
            .map(|(worker_id, local)| {
                let injector = Arc::clone(&injector);
                let shutdown = Arc::clone(&shutdown);
                let stealers = stealers.clone();

                thread::Builder::new()
                    .name(format!("ames-worker-{}", worker_id))
                    .spawn(move || {
                        trace!("Worker {} started", worker_id);
                        worker_loop(&local, &injector, &stealers, &shutdown);
                        trace!("Worker {} stopped", worker_id);
                    })
                    .expect("Failed to spawn worker thread")
            })
            .collect();

        trace!("Workers initialized: {} threads", num_threads);

        Self {
            injector,
            handles,
            epoch: Arc::new(AtomicU64::new(0)),
            shutdown,
        }
    }

    /// Pool sized for background alignment: a quarter of the cores, 1..=4.
    pub fn for_background() -> Self {
        Self::new((num_cpus::get() / 4).clamp(1, 4))
    }

    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.injector.push(Box::new(f));
    }

    pub fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::Relaxed)
    }

    /// Invalidate every job queued with an older epoch; returns the new epoch.
    pub fn bump_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Shared epoch counter, for jobs that poll for cancellation mid-run
    pub fn epoch_ref(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.epoch)
    }

    /// Run `f` only if the epoch still equals `epoch` when a worker picks it up.
    pub fn execute_with_epoch<F>(&self, epoch: u64, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let current = Arc::clone(&self.epoch);
        self.injector.push(Box::new(move || {
            if current.load(Ordering::Relaxed) == epoch {
                f();
            } else {
                trace!("Skipping stale job (epoch {})", epoch);
            }
        }));
    }
}

fn worker_loop(
    local: &Worker<Job>,
    injector: &Injector<Job>,
    stealers: &[Stealer<Job>],
    shutdown: &AtomicBool,
) {
    loop {
        let job = local
            .pop()
            .or_else(|| injector.steal_batch_and_pop(local).success())
            .or_else(|| stealers.iter().find_map(|s| s.steal().success()));

        if let Some(job) = job {
            job();
            continue;
        }
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        thread::sleep(Duration::from_millis(1));
    }
}

impl Drop for Workers {
    fn drop(&mut self) {
        let num_threads = self.handles.len();
        trace!("Workers shutting down ({} threads)...", num_threads);

        // Cancel queued epoch jobs, then stop
        self.bump_epoch();
        self.shutdown.store(true, Ordering::SeqCst);

        // A running alignment may take a while; don't hang the exit on it
        let deadline = Instant::now() + Duration::from_millis(500);
        for handle in std::mem::take(&mut self.handles) {
            while !handle.is_finished() {
                if Instant::now() >= deadline {
                    trace!("Shutdown timeout reached, exiting anyway");
                    return;
                }
                thread::sleep(Duration::from_millis(1));
            }
            let _ = handle.join();
        }
        trace!("All {} workers stopped", num_threads);
    }
}

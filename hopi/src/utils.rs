use hytra::TrAdder;
use indicatif::{ProgressBar, ProgressFinish, ProgressStyle};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// State of a running inference, shared with the progress bar thread.
pub(crate) struct SweepProgress {
    sweeps: TrAdder<u64>,
    // bits of the last free energy
    free_energy: AtomicU64,
}

impl SweepProgress {
    fn new(free_energy: f64) -> Self {
        Self {
            sweeps: TrAdder::new(),
            free_energy: AtomicU64::new(free_energy.to_bits()),
        }
    }
    /// Record a finished sweep and the free energy it reached.
    pub(crate) fn sweep_done(&self, free_energy: f64) {
        self.free_energy
            .store(free_energy.to_bits(), Ordering::Relaxed);
        self.sweeps.inc(1);
    }
    pub(crate) fn sweeps(&self) -> u64 {
        self.sweeps.get()
    }
    pub(crate) fn free_energy(&self) -> f64 {
        f64::from_bits(self.free_energy.load(Ordering::Relaxed))
    }
    fn message(&self) -> String {
        format!("VMP F = {:.6e}", self.free_energy())
    }
}

/// Run the sweeps of `f`, showing a progress bar out of `max_sweeps` with the current free
/// energy if `f` takes longer than `config.progress_min_time`.
pub(crate) fn with_sweep_progress<F, T>(
    f: F,
    max_sweeps: u64,
    initial_free_energy: f64,
    config: &crate::Config,
) -> T
where
    F: FnOnce(&SweepProgress) -> T + Send,
    T: Send,
{
    let progress = SweepProgress::new(initial_free_energy);
    let finished = AtomicBool::new(false);
    thread::scope(|s| {
        let progress = &progress;
        let finished = &finished;
        let pb_thread = config.show_progress.then(|| {
            s.spawn(move || {
                let start = Instant::now();
                while start.elapsed() < config.progress_min_time {
                    let remaining = config.progress_min_time.saturating_sub(start.elapsed());
                    thread::park_timeout(remaining);
                    if finished.load(Ordering::Acquire) {
                        return;
                    }
                }
                let style = ProgressStyle::default_bar()
                    .template("{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} sweeps")
                    .unwrap_or_else(|_| ProgressStyle::default_bar());
                let pb = ProgressBar::new(max_sweeps)
                    .with_style(style)
                    .with_finish(ProgressFinish::AndClear);
                while !finished.load(Ordering::Acquire) {
                    pb.set_position(progress.sweeps());
                    pb.set_message(progress.message());
                    thread::park_timeout(Duration::from_millis(50));
                }
                pb.finish_and_clear();
            })
        });
        let res = f(progress);
        finished.store(true, Ordering::Release);
        if let Some(handle) = pb_thread {
            handle.thread().unpark();
        }
        res
    })
}

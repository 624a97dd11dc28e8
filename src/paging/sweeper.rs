//! Dedicated-thread pressure sweep.
//!
//! Polls the manager's memory monitor every interval and runs a free crawl
//! while either tier is above the paging threshold. Stopping is cooperative:
//! the flag is checked between sleep slices, an in-flight crawl completes.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::manager::BufferManager;

/// Background sweeper configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweeperConfig {
    /// Time between pressure checks.
    #[serde(with = "millis")]
    pub interval: Duration,
    /// Sleep granularity; bounds how long `stop` waits.
    #[serde(with = "millis")]
    pub slice: Duration,
    /// Percentage of buffers each crawl considers.
    pub crawl_percentage: f32,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            slice: Duration::from_millis(10),
            crawl_percentage: 10.0,
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Handle to a running sweeper thread. Dropping it stops the thread.
pub struct BackgroundSweeper {
    stop: Arc<AtomicBool>,
    sweeps: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundSweeper {
    pub fn start(manager: Arc<BufferManager>, config: SweeperConfig) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let sweeps = Arc::new(AtomicU64::new(0));

        let handle = {
            let stop = stop.clone();
            let sweeps = sweeps.clone();
            thread::Builder::new()
                .name("hd-pager-sweeper".to_string())
                .spawn(move || Self::run(manager, config, stop, sweeps))?
        };

        Ok(Self { stop, sweeps, handle: Some(handle) })
    }

    fn run(manager: Arc<BufferManager>, config: SweeperConfig, stop: Arc<AtomicBool>, sweeps: Arc<AtomicU64>) {
        tracing::debug!(interval_ms = config.interval.as_millis() as u64, "sweeper started");
        let slice = config.slice.max(Duration::from_millis(1));

        while !stop.load(Ordering::SeqCst) {
            if manager.memory_monitor().needs_paging() {
                let report = manager.free_crawl(config.crawl_percentage);
                sweeps.fetch_add(1, Ordering::SeqCst);
                tracing::debug!(?report, "sweep");
            }

            let wake = Instant::now() + config.interval;
            while !stop.load(Ordering::SeqCst) {
                let now = Instant::now();
                if now >= wake {
                    break;
                }
                thread::sleep(slice.min(wake - now));
            }
        }
        tracing::debug!("sweeper stopped");
    }

    /// Number of crawls run so far.
    pub fn sweep_count(&self) -> u64 {
        self.sweeps.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the thread and wait for it to exit. Idempotent.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("sweeper thread panicked");
            }
        }
    }
}

impl Drop for BackgroundSweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

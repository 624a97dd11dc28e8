//! hd-pager
//!
//! Paged buffer memory manager for large scene data. Every buffer can live
//! in three tiers at once:
//!
//! - **Scene memory**: host-side working copy
//! - **Renderer memory**: copy owned by the rendering backend
//! - **Disk**: a range inside a shared page file
//!
//! A [`paging::BufferManager`] tracks the buffers, a [`memory::MemoryMonitor`]
//! tracks both memory tiers against their limits, and paging strategies
//! decide what to evict when pressure or age demands it. Operations run
//! synchronously or on the manager's thread pool.

pub mod cli;
pub mod config;
pub mod memory;
pub mod paging;
pub mod scheduler;
pub mod telemetry;

use std::sync::Arc;

use thiserror::Error;

pub use config::{EffectiveConfig, EnvConfig};
pub use memory::{MemoryMonitor, PressureThresholds};
pub use paging::{
    BackgroundSweeper, BufferHandle, BufferKey, BufferManager, BufferManagerConfig, BufferState,
    BufferUsage, PageableBuffer, PagingError, SweeperConfig,
};
pub use scheduler::{OperationHandle, ThreadPoolError};

#[derive(Debug, Error)]
pub enum PagerError {
    #[error("Thread pool startup failed: {0}")]
    ThreadPool(#[from] ThreadPoolError),
    #[error("Sweeper thread failed to start: {0}")]
    Sweeper(#[from] std::io::Error),
}

/// A buffer manager together with its optional background sweeper.
pub struct Pager {
    manager: Arc<BufferManager>,
    sweeper_config: SweeperConfig,
    sweeper: Option<BackgroundSweeper>,
}

impl Pager {
    /// Create the manager. The sweeper is not started.
    pub fn new(config: &EnvConfig) -> Result<Self, PagerError> {
        let manager = Arc::new(BufferManager::new(config.buffer_manager.clone())?);
        Ok(Self { manager, sweeper_config: config.sweeper.clone(), sweeper: None })
    }

    pub fn manager(&self) -> &Arc<BufferManager> {
        &self.manager
    }

    /// Start the background sweeper if it is not running yet.
    pub fn start_sweeper(&mut self) -> Result<(), PagerError> {
        if self.sweeper.is_none() {
            let sweeper = BackgroundSweeper::start(self.manager.clone(), self.sweeper_config.clone())?;
            self.sweeper = Some(sweeper);
        }
        Ok(())
    }

    /// Stop the sweeper and wait for its thread. No-op when not running.
    pub fn stop_sweeper(&mut self) {
        if let Some(mut sweeper) = self.sweeper.take() {
            sweeper.stop();
        }
    }

    pub fn is_sweeping(&self) -> bool {
        self.sweeper.as_ref().is_some_and(|s| s.is_running())
    }

    /// Crawls run by the current sweeper.
    pub fn sweep_count(&self) -> u64 {
        self.sweeper.as_ref().map_or(0, |s| s.sweep_count())
    }
}

impl Drop for Pager {
    fn drop(&mut self) {
        self.stop_sweeper();
        self.manager.wait_for_all_operations();
    }
}

//! Buffer registry, asynchronous paging and the free-crawl sweep.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::buffer::{BufferBase, DestructionCallback, PageableBuffer};
use super::error::PagingError;
use super::key::BufferKey;
use super::page_file::{PageFileConfig, PageFileManager, PageFileStats, DEFAULT_MAX_PAGE_FILE_SIZE};
use super::payload::RawBuffer;
use super::selection::{BufferHandle, SelectionStrategy};
use super::state::{BufferState, BufferUsage};
use super::strategy::{PagingContext, PagingDecision, PagingStrategy, PagingStrategyKind};
use crate::memory::{MemoryMonitor, PressureThresholds};
use crate::scheduler::{OperationHandle, ThreadPool, ThreadPoolConfig, ThreadPoolError};
use crate::telemetry::{self, PagingSpan, SpanExt};

const GIB: usize = 1024 * 1024 * 1024;

/// Buffer manager configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferManagerConfig {
    /// Page-file directory. Unset means a private temp directory.
    pub page_file_directory: Option<PathBuf>,
    pub scene_memory_limit: usize,
    pub renderer_memory_limit: usize,
    /// Frames without a touch before a buffer counts as over age.
    pub age_limit: u64,
    /// Worker threads for async operations (0 = CPU count).
    pub num_threads: usize,
    pub max_page_file_size: u64,
    /// Page-file cap (0 = unlimited).
    pub max_page_files: usize,
    pub paging_strategy: PagingStrategyKind,
    pub selection_strategy: SelectionStrategy,
    pub thresholds: PressureThresholds,
}

impl Default for BufferManagerConfig {
    fn default() -> Self {
        Self {
            page_file_directory: None,
            scene_memory_limit: 2 * GIB,
            renderer_memory_limit: GIB,
            age_limit: 100,
            num_threads: 0,
            max_page_file_size: DEFAULT_MAX_PAGE_FILE_SIZE,
            max_page_files: 0,
            paging_strategy: PagingStrategyKind::Hybrid,
            selection_strategy: SelectionStrategy::Lru,
            thresholds: PressureThresholds::default(),
        }
    }
}

/// Outcome of one synchronous free crawl.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CrawlReport {
    /// Candidates handed out by the selection strategy.
    pub selected: usize,
    /// Candidates the paging strategy acted on.
    pub actions: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Point-in-time view of the manager.
#[derive(Debug, Clone, Serialize)]
pub struct BufferManagerStats {
    pub buffers: usize,
    pub scene_resident: usize,
    pub renderer_resident: usize,
    pub disk_resident: usize,
    pub pending_operations: usize,
    pub current_frame: u64,
    pub scene_memory_used: usize,
    pub renderer_memory_used: usize,
    pub scene_pressure: f32,
    pub renderer_pressure: f32,
    pub disk: PageFileStats,
}

type DestroyHook = Arc<dyn Fn(&BufferKey) + Send + Sync>;

/// Owns the page files, the memory monitor and every registered buffer.
///
/// The registry holds one strong reference per buffer. Removing a buffer
/// drops that reference; its tiers are freed once the last outside handle
/// goes away.
pub struct BufferManager {
    // Declared first so workers are joined before the registry drops.
    pool: ThreadPool,
    config: BufferManagerConfig,
    page_files: Arc<PageFileManager>,
    monitor: Arc<MemoryMonitor>,
    registry: DashMap<BufferKey, BufferHandle>,
    frame: AtomicU64,
    next_serial: AtomicU64,
    paging_strategy: Box<dyn PagingStrategy>,
    selection: SelectionStrategy,
    on_destroy: Arc<RwLock<Option<DestroyHook>>>,
}

impl BufferManager {
    pub fn new(config: BufferManagerConfig) -> Result<Self, ThreadPoolError> {
        let page_files = Arc::new(PageFileManager::new(PageFileConfig {
            directory: config.page_file_directory.clone(),
            max_file_size: config.max_page_file_size,
            max_files: config.max_page_files,
        }));
        let monitor = Arc::new(MemoryMonitor::with_thresholds(
            config.scene_memory_limit,
            config.renderer_memory_limit,
            config.thresholds,
        ));
        let pool = ThreadPool::new(ThreadPoolConfig::with_threads(config.num_threads))?;

        tracing::info!(
            directory = %page_files.directory().display(),
            scene_limit = config.scene_memory_limit,
            renderer_limit = config.renderer_memory_limit,
            threads = pool.num_threads(),
            strategy = %config.paging_strategy,
            selection = %config.selection_strategy,
            "buffer manager started"
        );

        Ok(Self {
            pool,
            paging_strategy: config.paging_strategy.build(),
            selection: config.selection_strategy,
            config,
            page_files,
            monitor,
            registry: DashMap::new(),
            frame: AtomicU64::new(0),
            next_serial: AtomicU64::new(0),
            on_destroy: Arc::new(RwLock::new(None)),
        })
    }

    /// Replace the configured paging strategy.
    pub fn with_paging_strategy(mut self, strategy: Box<dyn PagingStrategy>) -> Self {
        self.paging_strategy = strategy;
        self
    }

    pub fn with_selection_strategy(mut self, selection: SelectionStrategy) -> Self {
        self.selection = selection;
        self
    }

    pub fn config(&self) -> &BufferManagerConfig {
        &self.config
    }

    pub fn memory_monitor(&self) -> &Arc<MemoryMonitor> {
        &self.monitor
    }

    pub fn page_file_manager(&self) -> &Arc<PageFileManager> {
        &self.page_files
    }

    pub fn paging_strategy(&self) -> &dyn PagingStrategy {
        self.paging_strategy.as_ref()
    }

    pub fn selection_strategy(&self) -> SelectionStrategy {
        self.selection
    }

    // Registry

    /// Register a zero-filled opaque buffer resident in scene memory.
    pub fn create_buffer(
        &self,
        key: BufferKey,
        size: usize,
        usage: BufferUsage,
    ) -> Result<Arc<RawBuffer>, PagingError> {
        self.create_buffer_with(key, size, usage, RawBuffer::new)
    }

    /// Register a buffer built by `build` around a fresh scene-resident base.
    ///
    /// `build` runs while the key's registry slot is locked and must not call
    /// back into this manager's registry.
    pub fn create_buffer_with<B, F>(
        &self,
        key: BufferKey,
        size: usize,
        usage: BufferUsage,
        build: F,
    ) -> Result<Arc<B>, PagingError>
    where
        B: PageableBuffer,
        F: FnOnce(BufferBase) -> B,
    {
        match self.registry.entry(key) {
            Entry::Occupied(slot) => Err(PagingError::AlreadyExists(slot.key().clone())),
            Entry::Vacant(slot) => {
                let key = slot.key().clone();
                let base = BufferBase::new(
                    key.clone(),
                    size,
                    usage,
                    self.next_serial.fetch_add(1, Ordering::SeqCst),
                    self.current_frame(),
                    self.page_files.clone(),
                    self.monitor.clone(),
                    Some(self.destruction_callback()),
                );
                let buffer = Arc::new(build(base));
                slot.insert(buffer.clone());
                tracing::debug!(%key, size, ?usage, "buffer created");
                Ok(buffer)
            }
        }
    }

    pub fn find_buffer(&self, key: &BufferKey) -> Option<BufferHandle> {
        self.registry.get(key).map(|entry| entry.value().clone())
    }

    /// Drop the registry's reference and hand it to the caller.
    pub fn remove_buffer(&self, key: &BufferKey) -> Option<BufferHandle> {
        let removed = self.registry.remove(key).map(|(_, buffer)| buffer);
        if removed.is_some() {
            tracing::debug!(%key, "buffer removed");
        }
        removed
    }

    pub fn contains(&self, key: &BufferKey) -> bool {
        self.registry.contains_key(key)
    }

    pub fn buffer_count(&self) -> usize {
        self.registry.len()
    }

    /// Registered keys in path order.
    pub fn keys(&self) -> Vec<BufferKey> {
        let mut keys: Vec<BufferKey> = self.registry.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Snapshot of every registered buffer in creation order.
    pub fn buffers(&self) -> Vec<BufferHandle> {
        let mut all: Vec<BufferHandle> = self.registry.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|b| b.base().serial());
        all
    }

    /// Callback invoked with a buffer's key when it is destroyed.
    ///
    /// Applies to every buffer of this manager that has not been destroyed
    /// yet, including ones created before the call.
    pub fn set_destruction_callback<F>(&self, callback: F)
    where
        F: Fn(&BufferKey) + Send + Sync + 'static,
    {
        *self.on_destroy.write() = Some(Arc::new(callback));
    }

    fn destruction_callback(&self) -> DestructionCallback {
        let hook = self.on_destroy.clone();
        Box::new(move |key: &BufferKey| {
            tracing::debug!(%key, "buffer destroyed");
            let hook = hook.read().clone();
            if let Some(hook) = hook {
                hook(key);
            }
        })
    }

    // Frames

    /// Advance the frame counter and return the new frame.
    pub fn advance_frame(&self, count: u64) -> u64 {
        self.frame.fetch_add(count, Ordering::SeqCst) + count
    }

    pub fn current_frame(&self) -> u64 {
        self.frame.load(Ordering::SeqCst)
    }

    /// Stamp `buffer` with the current frame.
    pub fn touch<B: PageableBuffer + ?Sized>(&self, buffer: &B) {
        buffer.update_frame_stamp(self.current_frame());
    }

    // Sweeping

    pub fn paging_context<B: PageableBuffer + ?Sized>(&self, buffer: &B) -> PagingContext {
        PagingContext::capture(buffer, self.current_frame(), self.config.age_limit, &self.monitor)
    }

    /// Number of candidates a crawl over `percentage` percent selects.
    pub fn crawl_count(&self, percentage: f32) -> usize {
        let total = self.registry.len();
        if !percentage.is_finite() || percentage <= 0.0 {
            return 0;
        }
        let pct = f64::from(percentage.min(100.0));
        ((total as f64 * pct / 100.0).ceil() as usize).min(total)
    }

    fn crawl_candidates(&self, percentage: f32) -> Vec<BufferHandle> {
        let count = self.crawl_count(percentage);
        self.selection.select(self.buffers(), count, self.current_frame())
    }

    /// Select candidates and execute each recommended action in turn.
    ///
    /// Pressure is re-read for every candidate, so early evictions can make
    /// later candidates unnecessary. A failed action does not stop the crawl.
    pub fn free_crawl(&self, percentage: f32) -> CrawlReport {
        let candidates = self.crawl_candidates(percentage);
        let span = PagingSpan::crawl(percentage, candidates.len());
        let _enter = span.enter();

        let mut report = CrawlReport { selected: candidates.len(), ..Default::default() };
        for buffer in candidates {
            let decision = self.paging_strategy.decide(&self.paging_context(&*buffer));
            if !decision.should_page {
                continue;
            }
            report.actions += 1;
            match decision.action.execute(&*buffer, decision.force) {
                Ok(()) => {
                    report.succeeded += 1;
                    telemetry::record_crawl_action(true);
                }
                Err(e) => {
                    report.failed += 1;
                    telemetry::record_crawl_action(false);
                    tracing::warn!(key = %buffer.key(), action = decision.action.as_str(), error = %e, "crawl action failed");
                }
            }
        }

        span.record("actions", report.actions);
        tracing::debug!(?report, "free crawl finished");
        report
    }

    /// Decide on the calling thread, then run every recommended action on
    /// the pool. Returns one handle per submitted action.
    pub fn free_crawl_async(&self, percentage: f32) -> Vec<OperationHandle<Result<(), PagingError>>> {
        let candidates = self.crawl_candidates(percentage);
        let decisions: Vec<(BufferHandle, PagingDecision)> = candidates
            .into_iter()
            .map(|buffer| {
                let decision = self.paging_strategy.decide(&self.paging_context(&*buffer));
                (buffer, decision)
            })
            .filter(|(_, decision)| decision.should_page)
            .collect();

        tracing::debug!(percentage, actions = decisions.len(), "free crawl submitted");
        decisions
            .into_iter()
            .map(|(buffer, decision)| {
                self.spawn_paging(&buffer, decision.action.as_str(), move |b| {
                    let result = decision.action.execute(b, decision.force);
                    telemetry::record_crawl_action(result.is_ok());
                    result
                })
            })
            .collect()
    }

    // Async wrappers

    fn spawn_paging<B, F>(&self, buffer: &Arc<B>, operation: &'static str, f: F) -> OperationHandle<Result<(), PagingError>>
    where
        B: PageableBuffer + ?Sized,
        F: FnOnce(&B) -> Result<(), PagingError> + Send + 'static,
    {
        let buffer = buffer.clone();
        self.pool.submit(move || {
            let span = PagingSpan::new(buffer.key(), operation);
            let _enter = span.enter();
            let result = f(&*buffer);
            span.record_result(&result);
            result
        })
    }

    fn spawn_release<B, F>(&self, buffer: &Arc<B>, operation: &'static str, f: F) -> OperationHandle<()>
    where
        B: PageableBuffer + ?Sized,
        F: FnOnce(&B) + Send + 'static,
    {
        let buffer = buffer.clone();
        self.pool.submit(move || {
            let span = PagingSpan::new(buffer.key(), operation);
            let _enter = span.enter();
            f(&*buffer);
            span.record("status", "ok");
        })
    }

    pub fn page_to_scene_memory_async<B>(&self, buffer: &Arc<B>, force: bool) -> OperationHandle<Result<(), PagingError>>
    where
        B: PageableBuffer + ?Sized,
    {
        self.spawn_paging(buffer, "page_to_scene_memory", move |b| b.page_to_scene_memory(force))
    }

    pub fn page_to_renderer_memory_async<B>(&self, buffer: &Arc<B>, force: bool) -> OperationHandle<Result<(), PagingError>>
    where
        B: PageableBuffer + ?Sized,
    {
        self.spawn_paging(buffer, "page_to_renderer_memory", move |b| b.page_to_renderer_memory(force))
    }

    pub fn page_to_disk_async<B>(&self, buffer: &Arc<B>, force: bool) -> OperationHandle<Result<(), PagingError>>
    where
        B: PageableBuffer + ?Sized,
    {
        self.spawn_paging(buffer, "page_to_disk", move |b| b.page_to_disk(force))
    }

    pub fn swap_scene_to_disk_async<B>(
        &self,
        buffer: &Arc<B>,
        force: bool,
        release: BufferState,
    ) -> OperationHandle<Result<(), PagingError>>
    where
        B: PageableBuffer + ?Sized,
    {
        self.spawn_paging(buffer, "swap_scene_to_disk", move |b| b.swap_scene_to_disk(force, release))
    }

    pub fn swap_renderer_to_disk_async<B>(
        &self,
        buffer: &Arc<B>,
        force: bool,
        release: BufferState,
    ) -> OperationHandle<Result<(), PagingError>>
    where
        B: PageableBuffer + ?Sized,
    {
        self.spawn_paging(buffer, "swap_renderer_to_disk", move |b| b.swap_renderer_to_disk(force, release))
    }

    pub fn swap_to_scene_memory_async<B>(
        &self,
        buffer: &Arc<B>,
        force: bool,
        release: BufferState,
    ) -> OperationHandle<Result<(), PagingError>>
    where
        B: PageableBuffer + ?Sized,
    {
        self.spawn_paging(buffer, "swap_to_scene_memory", move |b| b.swap_to_scene_memory(force, release))
    }

    pub fn swap_to_renderer_memory_async<B>(
        &self,
        buffer: &Arc<B>,
        force: bool,
        release: BufferState,
    ) -> OperationHandle<Result<(), PagingError>>
    where
        B: PageableBuffer + ?Sized,
    {
        self.spawn_paging(buffer, "swap_to_renderer_memory", move |b| b.swap_to_renderer_memory(force, release))
    }

    pub fn release_scene_buffer_async<B>(&self, buffer: &Arc<B>) -> OperationHandle<()>
    where
        B: PageableBuffer + ?Sized,
    {
        self.spawn_release(buffer, "release_scene_buffer", |b| b.release_scene_buffer())
    }

    pub fn release_renderer_buffer_async<B>(&self, buffer: &Arc<B>) -> OperationHandle<()>
    where
        B: PageableBuffer + ?Sized,
    {
        self.spawn_release(buffer, "release_renderer_buffer", |b| b.release_renderer_buffer())
    }

    pub fn release_disk_page_async<B>(&self, buffer: &Arc<B>) -> OperationHandle<()>
    where
        B: PageableBuffer + ?Sized,
    {
        self.spawn_release(buffer, "release_disk_page", |b| b.release_disk_page())
    }

    /// Block until every submitted operation has finished.
    pub fn wait_for_all_operations(&self) {
        self.pool.wait_idle();
    }

    pub fn pending_operations(&self) -> usize {
        self.pool.pending()
    }

    pub fn stats(&self) -> BufferManagerStats {
        let mut stats = BufferManagerStats {
            buffers: 0,
            scene_resident: 0,
            renderer_resident: 0,
            disk_resident: 0,
            pending_operations: self.pool.pending(),
            current_frame: self.current_frame(),
            scene_memory_used: self.monitor.scene_memory_used(),
            renderer_memory_used: self.monitor.renderer_memory_used(),
            scene_pressure: self.monitor.scene_memory_pressure(),
            renderer_pressure: self.monitor.renderer_memory_pressure(),
            disk: self.page_files.stats(),
        };
        for entry in self.registry.iter() {
            let state = entry.value().state();
            stats.buffers += 1;
            stats.scene_resident += usize::from(state.contains(BufferState::SCENE));
            stats.renderer_resident += usize::from(state.contains(BufferState::RENDERER));
            stats.disk_resident += usize::from(state.contains(BufferState::DISK));
        }
        stats
    }
}

impl std::fmt::Debug for BufferManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferManager")
            .field("buffers", &self.registry.len())
            .field("frame", &self.current_frame())
            .field("paging_strategy", &self.paging_strategy.name())
            .field("selection", &self.selection)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> BufferManager {
        BufferManager::new(BufferManagerConfig {
            scene_memory_limit: 1000,
            renderer_memory_limit: 1000,
            num_threads: 2,
            ..Default::default()
        })
        .unwrap()
    }

    fn key(path: &str) -> BufferKey {
        BufferKey::new(path).unwrap()
    }

    #[test]
    fn test_create_starts_in_scene() {
        let m = manager();
        let b = m.create_buffer(key("/a"), 100, BufferUsage::Static).unwrap();
        assert_eq!(b.state(), BufferState::SCENE);
        assert_eq!(m.memory_monitor().scene_memory_used(), 100);
        assert!(m.contains(&key("/a")));
    }

    #[test]
    fn test_duplicate_create_fails() {
        let m = manager();
        let _a = m.create_buffer(key("/a"), 10, BufferUsage::Static).unwrap();
        let err = m.create_buffer(key("/a"), 10, BufferUsage::Static).unwrap_err();
        assert!(matches!(err, PagingError::AlreadyExists(k) if k == key("/a")));
        assert_eq!(m.buffer_count(), 1);
    }

    #[test]
    fn test_crawl_count_rounds_up_and_clamps() {
        let m = manager();
        for i in 0..13 {
            let _ = m.create_buffer(key(&format!("/b{}", i)), 1, BufferUsage::Static).unwrap();
        }
        assert_eq!(m.crawl_count(90.0), 12);
        assert_eq!(m.crawl_count(1.0), 1);
        assert_eq!(m.crawl_count(0.0), 0);
        assert_eq!(m.crawl_count(250.0), 13);
        assert_eq!(m.crawl_count(f32::NAN), 0);
    }

    #[test]
    fn test_remove_keeps_outside_handle_alive() {
        let m = manager();
        let b = m.create_buffer(key("/a"), 10, BufferUsage::Static).unwrap();
        let removed = m.remove_buffer(&key("/a")).unwrap();
        assert!(m.find_buffer(&key("/a")).is_none());
        drop(removed);
        assert_eq!(m.memory_monitor().scene_memory_used(), 10);
        drop(b);
        assert_eq!(m.memory_monitor().scene_memory_used(), 0);
    }

    #[test]
    fn test_frames() {
        let m = manager();
        assert_eq!(m.current_frame(), 0);
        assert_eq!(m.advance_frame(1), 1);
        assert_eq!(m.advance_frame(4), 5);
        let b = m.create_buffer(key("/a"), 1, BufferUsage::Static).unwrap();
        assert_eq!(b.frame_stamp(), 5);
    }
}

//! Tri-tier pageable buffers.
//!
//! A buffer's content can live in scene memory, renderer memory and a page
//! file at the same time. [`BufferBase`] owns that storage and performs the
//! transitions; [`PageableBuffer`] exposes them as default methods so that a
//! payload type only has to provide its disk encoding.
//!
//! Each buffer serializes its own transitions behind a mutex: two operations
//! racing on the same buffer end in the state of one of their serial orders.

use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::error::PagingError;
use super::key::BufferKey;
use super::page_file::{BufferPageHandle, PageFileManager};
use super::state::{BufferState, BufferUsage};
use crate::memory::MemoryMonitor;

/// Invoked exactly once, with the buffer's key, when a buffer is destroyed.
pub type DestructionCallback = Box<dyn FnOnce(&BufferKey) + Send>;

/// In-memory tier selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MemoryTier {
    Scene,
    Renderer,
}

impl MemoryTier {
    fn flag(self) -> BufferState {
        match self {
            Self::Scene => BufferState::SCENE,
            Self::Renderer => BufferState::RENDERER,
        }
    }

    fn other(self) -> Self {
        match self {
            Self::Scene => Self::Renderer,
            Self::Renderer => Self::Scene,
        }
    }
}

struct TierStorage {
    scene: Option<Vec<u8>>,
    renderer: Option<Vec<u8>>,
    // Valid exactly when the DISK bit is set.
    page: BufferPageHandle,
}

impl TierStorage {
    fn memory(&self, tier: MemoryTier) -> Option<&Vec<u8>> {
        match tier {
            MemoryTier::Scene => self.scene.as_ref(),
            MemoryTier::Renderer => self.renderer.as_ref(),
        }
    }

    fn memory_mut(&mut self, tier: MemoryTier) -> &mut Option<Vec<u8>> {
        match tier {
            MemoryTier::Scene => &mut self.scene,
            MemoryTier::Renderer => &mut self.renderer,
        }
    }

    /// Renderer copy first, then scene copy.
    fn disk_source(&self) -> Option<&Vec<u8>> {
        self.renderer.as_ref().or(self.scene.as_ref())
    }
}

/// Storage and bookkeeping shared by every pageable buffer.
pub struct BufferBase {
    key: BufferKey,
    usage: BufferUsage,
    serial: u64,
    // Lock-free mirrors of the storage, updated when a transition commits.
    size: AtomicUsize,
    state: AtomicU8,
    frame_stamp: AtomicU64,
    storage: Mutex<TierStorage>,
    page_files: Arc<PageFileManager>,
    monitor: Arc<MemoryMonitor>,
    on_destroy: Mutex<Option<DestructionCallback>>,
}

impl BufferBase {
    /// Create a buffer resident in scene memory only, zero-filled.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        key: BufferKey,
        size: usize,
        usage: BufferUsage,
        serial: u64,
        frame: u64,
        page_files: Arc<PageFileManager>,
        monitor: Arc<MemoryMonitor>,
        on_destroy: Option<DestructionCallback>,
    ) -> Self {
        monitor.add_scene_memory(size);
        Self {
            key,
            usage,
            serial,
            size: AtomicUsize::new(size),
            state: AtomicU8::new(BufferState::SCENE.bits()),
            frame_stamp: AtomicU64::new(frame),
            storage: Mutex::new(TierStorage {
                scene: Some(vec![0u8; size]),
                renderer: None,
                page: BufferPageHandle::INVALID,
            }),
            page_files,
            monitor,
            on_destroy: Mutex::new(on_destroy),
        }
    }

    pub fn key(&self) -> &BufferKey {
        &self.key
    }

    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    /// Logical size in bytes.
    pub fn size(&self) -> usize {
        self.size.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> BufferState {
        BufferState::from_bits_truncate(self.state.load(Ordering::SeqCst))
    }

    /// Creation order within the owning manager.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn frame_stamp(&self) -> u64 {
        self.frame_stamp.load(Ordering::SeqCst)
    }

    pub fn update_frame_stamp(&self, frame: u64) {
        self.frame_stamp.store(frame, Ordering::SeqCst);
    }

    /// True if more than `age_limit` frames passed since the last touch.
    pub fn is_over_age(&self, current_frame: u64, age_limit: u64) -> bool {
        current_frame.saturating_sub(self.frame_stamp()) > age_limit
    }

    /// Disk location of the current copy, if one exists.
    pub fn page_handle(&self) -> Option<BufferPageHandle> {
        let storage = self.storage.lock();
        storage.page.is_valid().then_some(storage.page)
    }

    /// Run `f` over the scene copy.
    pub fn with_scene_memory<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        self.storage.lock().scene.as_deref().map(f)
    }

    /// Run `f` over the renderer copy.
    pub fn with_renderer_memory<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        self.storage.lock().renderer.as_deref().map(f)
    }

    /// Run `f` over whichever in-memory copy exists, scene first.
    pub fn with_memory<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        let storage = self.storage.lock();
        storage.scene.as_deref().or(storage.renderer.as_deref()).map(f)
    }

    pub(crate) fn swap_to_memory<D>(
        &self,
        target: MemoryTier,
        force: bool,
        release: BufferState,
        decode: D,
    ) -> Result<(), PagingError>
    where
        D: FnOnce(&[u8]) -> Option<Vec<u8>>,
    {
        let mut storage = self.storage.lock();
        self.fill_memory(&mut storage, target, force, decode)?;
        self.release_locked(&mut storage, release - target.flag());
        self.publish(&storage);
        Ok(())
    }

    pub(crate) fn swap_to_disk<E>(
        &self,
        force: bool,
        release: BufferState,
        encode: E,
    ) -> Result<(), PagingError>
    where
        E: FnOnce(&[u8]) -> Vec<u8>,
    {
        let mut storage = self.storage.lock();
        self.write_disk(&mut storage, force, encode)?;
        self.release_locked(&mut storage, release - BufferState::DISK);
        self.publish(&storage);
        Ok(())
    }

    /// Free the tiers in `tiers`. Never fails; absent tiers are skipped.
    pub(crate) fn release(&self, tiers: BufferState) {
        let mut storage = self.storage.lock();
        self.release_locked(&mut storage, tiers);
        self.publish(&storage);
    }

    /// Replace the logical content in every populated tier.
    ///
    /// With no in-memory copy the content lands in scene memory. A disk copy
    /// is rewritten in place when the encoded size is unchanged and moved to
    /// a new range otherwise. The disk write happens first; if it fails the
    /// memory tiers keep the old content. A failed move keeps the old disk
    /// copy, a failed in-place rewrite drops it.
    pub(crate) fn write_contents<E>(&self, bytes: Vec<u8>, encode: E) -> Result<(), PagingError>
    where
        E: FnOnce(&[u8]) -> Vec<u8>,
    {
        let mut storage = self.storage.lock();

        if storage.page.is_valid() {
            let encoded = encode(&bytes);
            let old = storage.page;
            if encoded.len() as u64 == old.size() {
                if let Err(e) = self.page_files.update_page(&old, &encoded) {
                    // The range may be partly overwritten.
                    tracing::warn!(key = %self.key, error = %e, "disk copy dropped after failed rewrite");
                    self.release_locked(&mut storage, BufferState::DISK);
                    self.publish(&storage);
                    return Err(PagingError::Disk(e));
                }
            } else {
                let moved = self.page_files.create_page_handle(&encoded).map_err(|e| {
                    tracing::warn!(key = %self.key, error = %e, "content rewrite failed, old copy kept");
                    PagingError::Disk(e)
                })?;
                self.page_files.delete_page(&old);
                storage.page = moved;
            }
        }

        let new_size = bytes.len();
        let populated: Vec<MemoryTier> = [MemoryTier::Scene, MemoryTier::Renderer]
            .into_iter()
            .filter(|t| storage.memory(*t).is_some())
            .collect();
        let targets = if populated.is_empty() { vec![MemoryTier::Scene] } else { populated };

        let mut content = Some(bytes);
        for (i, tier) in targets.iter().enumerate() {
            let data = if i + 1 == targets.len() {
                content.take().unwrap_or_default()
            } else {
                content.clone().unwrap_or_default()
            };
            if let Some(old) = storage.memory_mut(*tier).replace(data) {
                self.untally(*tier, old.len());
            }
            self.tally(*tier, new_size);
        }

        self.size.store(new_size, Ordering::SeqCst);
        self.publish(&storage);
        Ok(())
    }

    fn fill_memory<D>(
        &self,
        storage: &mut TierStorage,
        target: MemoryTier,
        force: bool,
        decode: D,
    ) -> Result<(), PagingError>
    where
        D: FnOnce(&[u8]) -> Option<Vec<u8>>,
    {
        let present = storage.memory(target).is_some();
        if present && !force {
            return Ok(());
        }

        let data = if let Some(source) = storage.memory(target.other()) {
            source.clone()
        } else if storage.page.is_valid() {
            let raw = self.page_files.read_page(&storage.page)?;
            let data = decode(&raw).ok_or_else(|| PagingError::Corrupt {
                key: self.key.clone(),
                reason: "page does not decode".to_string(),
            })?;
            if data.len() != self.size() {
                return Err(PagingError::Corrupt {
                    key: self.key.clone(),
                    reason: format!("decoded {} bytes, expected {}", data.len(), self.size()),
                });
            }
            data
        } else if present {
            // Forced refresh with nothing to refresh from keeps the copy.
            return Ok(());
        } else {
            return Err(PagingError::NoSource { key: self.key.clone() });
        };

        let len = data.len();
        if storage.memory_mut(target).replace(data).is_none() {
            self.tally(target, len);
        }
        tracing::trace!(key = %self.key, tier = ?target, force, "paged to memory");
        Ok(())
    }

    fn write_disk<E>(&self, storage: &mut TierStorage, force: bool, encode: E) -> Result<(), PagingError>
    where
        E: FnOnce(&[u8]) -> Vec<u8>,
    {
        let Some(source) = storage.disk_source() else {
            if storage.page.is_valid() {
                return Ok(());
            }
            return Err(PagingError::NoSource { key: self.key.clone() });
        };
        let encoded = encode(source);

        if storage.page.is_valid() {
            // Write-through refresh of the existing copy.
            let old = storage.page;
            if encoded.len() as u64 == old.size() {
                self.page_files.update_page(&old, &encoded)?;
            } else {
                let new = self.page_files.create_page_handle(&encoded)?;
                self.page_files.delete_page(&old);
                storage.page = new;
            }
        } else {
            storage.page = self.page_files.create_page_handle(&encoded)?;
        }

        tracing::trace!(key = %self.key, force, bytes = encoded.len(), "paged to disk");
        Ok(())
    }

    fn release_locked(&self, storage: &mut TierStorage, tiers: BufferState) {
        for tier in [MemoryTier::Scene, MemoryTier::Renderer] {
            if tiers.contains(tier.flag()) {
                if let Some(old) = storage.memory_mut(tier).take() {
                    self.untally(tier, old.len());
                }
            }
        }
        if tiers.contains(BufferState::DISK) && storage.page.is_valid() {
            self.page_files.delete_page(&storage.page);
            storage.page = BufferPageHandle::INVALID;
        }
    }

    fn publish(&self, storage: &TierStorage) {
        let mut state = BufferState::empty();
        state.set(BufferState::SCENE, storage.scene.is_some());
        state.set(BufferState::RENDERER, storage.renderer.is_some());
        state.set(BufferState::DISK, storage.page.is_valid());
        self.state.store(state.bits(), Ordering::SeqCst);
    }

    fn tally(&self, tier: MemoryTier, bytes: usize) {
        match tier {
            MemoryTier::Scene => self.monitor.add_scene_memory(bytes),
            MemoryTier::Renderer => self.monitor.add_renderer_memory(bytes),
        }
    }

    fn untally(&self, tier: MemoryTier, bytes: usize) {
        match tier {
            MemoryTier::Scene => self.monitor.reduce_scene_memory(bytes),
            MemoryTier::Renderer => self.monitor.reduce_renderer_memory(bytes),
        }
    }
}

impl Drop for BufferBase {
    fn drop(&mut self) {
        let storage = self.storage.get_mut();
        if let Some(scene) = storage.scene.take() {
            self.monitor.reduce_scene_memory(scene.len());
        }
        if let Some(renderer) = storage.renderer.take() {
            self.monitor.reduce_renderer_memory(renderer.len());
        }
        if storage.page.is_valid() {
            self.page_files.delete_page(&storage.page);
            storage.page = BufferPageHandle::INVALID;
        }
        if let Some(callback) = self.on_destroy.get_mut().take() {
            callback(&self.key);
        }
    }
}

impl std::fmt::Debug for BufferBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferBase")
            .field("key", &self.key)
            .field("usage", &self.usage)
            .field("size", &self.size())
            .field("state", &self.state())
            .field("frame_stamp", &self.frame_stamp())
            .finish()
    }
}

/// A buffer that can move between scene memory, renderer memory and disk.
///
/// Implementors supply [`base`](Self::base) and, when their disk format is
/// not the raw in-memory bytes, [`encode`](Self::encode) and
/// [`decode`](Self::decode). Everything else is provided.
///
/// Transitions return `Ok(())` on success. On failure the buffer keeps every
/// tier it held before the call. The one exception is a content write whose
/// in-place disk rewrite fails: that disk copy can no longer be trusted and
/// is dropped (see [`write_contents`](Self::write_contents)).
pub trait PageableBuffer: Send + Sync + 'static {
    fn base(&self) -> &BufferBase;

    /// Serialize in-memory bytes for a page file.
    fn encode(&self, memory: &[u8]) -> Vec<u8> {
        memory.to_vec()
    }

    /// Rebuild in-memory bytes from a page file. `None` rejects the page.
    fn decode(&self, disk: &[u8]) -> Option<Vec<u8>> {
        Some(disk.to_vec())
    }

    fn key(&self) -> &BufferKey {
        self.base().key()
    }

    fn size(&self) -> usize {
        self.base().size()
    }

    fn usage(&self) -> BufferUsage {
        self.base().usage()
    }

    fn state(&self) -> BufferState {
        self.base().state()
    }

    fn frame_stamp(&self) -> u64 {
        self.base().frame_stamp()
    }

    fn update_frame_stamp(&self, frame: u64) {
        self.base().update_frame_stamp(frame)
    }

    fn is_over_age(&self, current_frame: u64, age_limit: u64) -> bool {
        self.base().is_over_age(current_frame, age_limit)
    }

    fn has_scene_buffer(&self) -> bool {
        self.state().contains(BufferState::SCENE)
    }

    fn has_renderer_buffer(&self) -> bool {
        self.state().contains(BufferState::RENDERER)
    }

    fn has_disk_page(&self) -> bool {
        self.state().contains(BufferState::DISK)
    }

    /// Ensure a scene copy exists, filling it from renderer memory or disk.
    fn page_to_scene_memory(&self, force: bool) -> Result<(), PagingError> {
        self.base()
            .swap_to_memory(MemoryTier::Scene, force, BufferState::empty(), |d| self.decode(d))
    }

    /// Ensure a renderer copy exists, filling it from scene memory or disk.
    fn page_to_renderer_memory(&self, force: bool) -> Result<(), PagingError> {
        self.base()
            .swap_to_memory(MemoryTier::Renderer, force, BufferState::empty(), |d| self.decode(d))
    }

    /// Ensure a disk copy exists. An existing disk copy is refreshed from
    /// memory whenever an in-memory copy is present.
    fn page_to_disk(&self, force: bool) -> Result<(), PagingError> {
        self.base().swap_to_disk(force, BufferState::empty(), |m| self.encode(m))
    }

    /// Page to disk, then release `release` (see [`BufferState::SWAP_SCENE_TO_DISK`]).
    fn swap_scene_to_disk(&self, force: bool, release: BufferState) -> Result<(), PagingError> {
        self.base().swap_to_disk(force, release, |m| self.encode(m))
    }

    /// Page to disk, then release `release` (see [`BufferState::SWAP_RENDERER_TO_DISK`]).
    fn swap_renderer_to_disk(&self, force: bool, release: BufferState) -> Result<(), PagingError> {
        self.base().swap_to_disk(force, release, |m| self.encode(m))
    }

    /// Page to scene memory, then release `release` (see [`BufferState::SWAP_TO_SCENE`]).
    fn swap_to_scene_memory(&self, force: bool, release: BufferState) -> Result<(), PagingError> {
        self.base()
            .swap_to_memory(MemoryTier::Scene, force, release, |d| self.decode(d))
    }

    /// Page to renderer memory, then release `release` (see [`BufferState::SWAP_TO_RENDERER`]).
    fn swap_to_renderer_memory(&self, force: bool, release: BufferState) -> Result<(), PagingError> {
        self.base()
            .swap_to_memory(MemoryTier::Renderer, force, release, |d| self.decode(d))
    }

    fn release_scene_buffer(&self) {
        self.base().release(BufferState::SCENE)
    }

    fn release_renderer_buffer(&self) {
        self.base().release(BufferState::RENDERER)
    }

    fn release_disk_page(&self) {
        self.base().release(BufferState::DISK)
    }

    /// Replace the buffer's content (and size) in every populated tier.
    fn write_contents(&self, bytes: Vec<u8>) -> Result<(), PagingError> {
        self.base().write_contents(bytes, |m| self.encode(m))
    }

    /// Copy of the in-memory content, scene first.
    fn memory_contents(&self) -> Option<Vec<u8>> {
        self.base().with_memory(|bytes| bytes.to_vec())
    }
}

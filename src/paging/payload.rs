//! Concrete buffer payloads.
//!
//! [`RawBuffer`] stores opaque bytes. [`ArrayBuffer`] stores a typed element
//! array and prefixes its page-file copy with a small header so a page can be
//! validated before it is trusted. [`SampledBuffer`] stores a sequence of
//! time samples, each an element array.

use std::marker::PhantomData;
use std::mem::size_of;

use bytemuck::Pod;

use super::buffer::{BufferBase, PageableBuffer};
use super::error::PagingError;

/// Opaque byte payload; disk bytes equal memory bytes.
#[derive(Debug)]
pub struct RawBuffer {
    base: BufferBase,
}

impl RawBuffer {
    pub fn new(base: BufferBase) -> Self {
        Self { base }
    }
}

impl PageableBuffer for RawBuffer {
    fn base(&self) -> &BufferBase {
        &self.base
    }
}

/// Magic bytes at the start of an [`ArrayBuffer`] page.
pub const ARRAY_PAGE_MAGIC: [u8; 4] = *b"HDPA";

/// Size of the [`ArrayBuffer`] page header.
pub const ARRAY_HEADER_LEN: usize = 16;

/// Typed element array.
///
/// Page layout: magic (4 bytes), element size (u32 LE), body length in
/// bytes (u64 LE), then the raw elements. A trailing partial element is
/// stored as-is.
pub struct ArrayBuffer<T: Pod> {
    base: BufferBase,
    _element: PhantomData<fn() -> T>,
}

impl<T: Pod> ArrayBuffer<T> {
    pub fn new(base: BufferBase) -> Self {
        Self { base, _element: PhantomData }
    }

    /// Number of whole elements in the buffer.
    pub fn len(&self) -> usize {
        match size_of::<T>() {
            0 => 0,
            n => self.base.size() / n,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the contents with `values`.
    pub fn write(&self, values: &[T]) -> Result<(), PagingError> {
        self.write_contents(bytemuck::cast_slice(values).to_vec())
    }

    /// Elements from the in-memory copy, or `None` while paged out.
    pub fn read(&self) -> Option<Vec<T>> {
        self.base.with_memory(elements_from_bytes)
    }
}

impl<T: Pod> PageableBuffer for ArrayBuffer<T> {
    fn base(&self) -> &BufferBase {
        &self.base
    }

    fn encode(&self, memory: &[u8]) -> Vec<u8> {
        let mut page = Vec::with_capacity(ARRAY_HEADER_LEN + memory.len());
        page.extend_from_slice(&ARRAY_PAGE_MAGIC);
        page.extend_from_slice(&(size_of::<T>() as u32).to_le_bytes());
        page.extend_from_slice(&(memory.len() as u64).to_le_bytes());
        page.extend_from_slice(memory);
        page
    }

    fn decode(&self, disk: &[u8]) -> Option<Vec<u8>> {
        if disk.len() < ARRAY_HEADER_LEN || disk[..4] != ARRAY_PAGE_MAGIC {
            return None;
        }
        let elem = u32::from_le_bytes(disk[4..8].try_into().ok()?) as usize;
        let len = u64::from_le_bytes(disk[8..16].try_into().ok()?);
        let body = &disk[ARRAY_HEADER_LEN..];
        if elem != size_of::<T>() || len != body.len() as u64 {
            return None;
        }
        Some(body.to_vec())
    }
}

impl<T: Pod> std::fmt::Debug for ArrayBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrayBuffer")
            .field("element", &std::any::type_name::<T>())
            .field("base", &self.base)
            .finish()
    }
}

fn elements_from_bytes<T: Pod>(bytes: &[u8]) -> Vec<T> {
    let elem = size_of::<T>();
    if elem == 0 {
        return Vec::new();
    }
    bytes.chunks_exact(elem).map(bytemuck::pod_read_unaligned).collect()
}

/// One time sample of a [`SampledBuffer`].
#[derive(Debug, Clone, PartialEq)]
pub struct Sample<T> {
    pub time: f64,
    pub values: Vec<T>,
}

/// Time-sampled element arrays.
///
/// Memory and page layout are identical: sample count (u32 LE), then per
/// sample its time (f64 LE), element count (u64 LE) and elements.
pub struct SampledBuffer<T: Pod> {
    base: BufferBase,
    _element: PhantomData<fn() -> T>,
}

impl<T: Pod> SampledBuffer<T> {
    pub fn new(base: BufferBase) -> Self {
        Self { base, _element: PhantomData }
    }

    /// Replace every sample. Samples are stored sorted by time.
    pub fn write_samples(&self, samples: &[Sample<T>]) -> Result<(), PagingError> {
        let mut sorted: Vec<&Sample<T>> = samples.iter().collect();
        sorted.sort_by(|a, b| a.time.total_cmp(&b.time));

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(sorted.len() as u32).to_le_bytes());
        for sample in sorted {
            bytes.extend_from_slice(&sample.time.to_le_bytes());
            bytes.extend_from_slice(&(sample.values.len() as u64).to_le_bytes());
            bytes.extend_from_slice(bytemuck::cast_slice(&sample.values));
        }
        self.write_contents(bytes)
    }

    /// All samples from the in-memory copy.
    pub fn read_samples(&self) -> Option<Vec<Sample<T>>> {
        self.base.with_memory(parse_samples::<T>).flatten()
    }

    /// Values of the last sample at or before `time`, or the first sample
    /// when `time` precedes them all.
    pub fn sample_at(&self, time: f64) -> Option<Vec<T>> {
        let samples = self.read_samples()?;
        let idx = samples.partition_point(|s| s.time <= time);
        let pick = idx.saturating_sub(1);
        samples.into_iter().nth(pick).map(|s| s.values)
    }

    pub fn sample_count(&self) -> usize {
        self.read_samples().map_or(0, |s| s.len())
    }
}

impl<T: Pod> PageableBuffer for SampledBuffer<T> {
    fn base(&self) -> &BufferBase {
        &self.base
    }

    fn decode(&self, disk: &[u8]) -> Option<Vec<u8>> {
        // An empty page is a buffer that was never written.
        if disk.iter().all(|b| *b == 0) || parse_samples::<T>(disk).is_some() {
            Some(disk.to_vec())
        } else {
            None
        }
    }
}

impl<T: Pod> std::fmt::Debug for SampledBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampledBuffer")
            .field("element", &std::any::type_name::<T>())
            .field("base", &self.base)
            .finish()
    }
}

fn parse_samples<T: Pod>(bytes: &[u8]) -> Option<Vec<Sample<T>>> {
    let elem = size_of::<T>();
    let (count, mut rest) = split_u32(bytes)?;
    let mut samples = Vec::with_capacity((count as usize).min(rest.len() / 16));
    for _ in 0..count {
        let (time_bytes, tail) = rest.split_first_chunk::<8>()?;
        let time = f64::from_le_bytes(*time_bytes);
        let (len_bytes, tail) = tail.split_first_chunk::<8>()?;
        let len = u64::from_le_bytes(*len_bytes) as usize;
        let body_len = len.checked_mul(elem)?;
        if tail.len() < body_len {
            return None;
        }
        let (body, tail) = tail.split_at(body_len);
        samples.push(Sample { time, values: elements_from_bytes(body) });
        rest = tail;
    }
    rest.is_empty().then_some(samples)
}

fn split_u32(bytes: &[u8]) -> Option<(u32, &[u8])> {
    let (head, tail) = bytes.split_first_chunk::<4>()?;
    Some((u32::from_le_bytes(*head), tail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::memory::MemoryMonitor;
    use crate::paging::{BufferKey, BufferUsage, PageFileConfig, PageFileManager};

    fn base(size: usize) -> BufferBase {
        BufferBase::new(
            BufferKey::new("/payload").unwrap(),
            size,
            BufferUsage::Static,
            0,
            0,
            Arc::new(PageFileManager::new(PageFileConfig::default())),
            Arc::new(MemoryMonitor::new(1 << 20, 1 << 20)),
            None,
        )
    }

    #[test]
    fn test_array_survives_disk() {
        let buffer: ArrayBuffer<f32> = ArrayBuffer::new(base(0));
        buffer.write(&[1.0, 2.5, -3.0]).unwrap();
        assert_eq!(buffer.len(), 3);

        buffer.swap_scene_to_disk(false, crate::paging::BufferState::SWAP_SCENE_TO_DISK).unwrap();
        assert_eq!(buffer.read(), None);
        let handle = buffer.base().page_handle().unwrap();
        assert_eq!(handle.size() as usize, ARRAY_HEADER_LEN + 12);

        buffer.page_to_scene_memory(false).unwrap();
        assert_eq!(buffer.read(), Some(vec![1.0, 2.5, -3.0]));
    }

    #[test]
    fn test_array_rejects_foreign_page() {
        let buffer: ArrayBuffer<u32> = ArrayBuffer::new(base(8));
        assert!(buffer.decode(&[0u8; 8]).is_none());

        let mut page = buffer.encode(&[0u8; 8]);
        page[4] = 2;
        assert!(buffer.decode(&page).is_none());
    }

    #[test]
    fn test_array_header_layout() {
        let buffer: ArrayBuffer<u16> = ArrayBuffer::new(base(0));
        let page = buffer.encode(&[1, 0, 2, 0]);
        assert_eq!(&page[..4], b"HDPA");
        assert_eq!(u32::from_le_bytes(page[4..8].try_into().unwrap()), 2);
        assert_eq!(u64::from_le_bytes(page[8..16].try_into().unwrap()), 4);
        assert_eq!(buffer.decode(&page), Some(vec![1, 0, 2, 0]));

        let ragged = buffer.encode(&[1, 0, 2]);
        assert_eq!(buffer.decode(&ragged), Some(vec![1, 0, 2]));
    }

    #[test]
    fn test_samples_sorted_and_looked_up() {
        let buffer: SampledBuffer<i32> = SampledBuffer::new(base(0));
        buffer
            .write_samples(&[
                Sample { time: 2.0, values: vec![20, 21] },
                Sample { time: 1.0, values: vec![10] },
            ])
            .unwrap();

        assert_eq!(buffer.sample_count(), 2);
        assert_eq!(buffer.sample_at(0.0), Some(vec![10]));
        assert_eq!(buffer.sample_at(1.5), Some(vec![10]));
        assert_eq!(buffer.sample_at(9.0), Some(vec![20, 21]));
    }

    #[test]
    fn test_samples_survive_renderer_and_disk() {
        let buffer: SampledBuffer<u8> = SampledBuffer::new(base(0));
        buffer.write_samples(&[Sample { time: 0.5, values: vec![1, 2, 3] }]).unwrap();

        buffer.swap_to_renderer_memory(false, crate::paging::BufferState::SWAP_TO_RENDERER).unwrap();
        buffer.swap_renderer_to_disk(false, crate::paging::BufferState::SWAP_RENDERER_TO_DISK).unwrap();
        assert!(buffer.read_samples().is_none());

        buffer.page_to_scene_memory(false).unwrap();
        assert_eq!(buffer.read_samples().unwrap()[0].values, vec![1, 2, 3]);
    }

    #[test]
    fn test_truncated_samples_rejected() {
        let buffer: SampledBuffer<u32> = SampledBuffer::new(base(0));
        let mut bytes = 1u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&0.0f64.to_le_bytes());
        bytes.extend_from_slice(&4u64.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 3]);
        assert!(buffer.decode(&bytes).is_none());
    }
}

//! Tier transitions of individual buffers.

use std::sync::Arc;

use hd_pager::paging::{
    ArrayBuffer, BufferKey, BufferManager, BufferManagerConfig, BufferState, BufferUsage,
    PageableBuffer, PagingError, Sample, SampledBuffer,
};

fn manager(dir: &tempfile::TempDir) -> BufferManager {
    BufferManager::new(BufferManagerConfig {
        page_file_directory: Some(dir.path().to_path_buf()),
        scene_memory_limit: 1 << 20,
        renderer_memory_limit: 1 << 20,
        num_threads: 1,
        ..Default::default()
    })
    .unwrap()
}

fn key(path: &str) -> BufferKey {
    BufferKey::new(path).unwrap()
}

#[test]
fn repeated_transitions_are_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(&dir);
    let buffer = mgr.create_buffer(key("/mesh/points"), 1024, BufferUsage::Static).unwrap();
    let monitor = mgr.memory_monitor();

    buffer.page_to_renderer_memory(false).unwrap();
    buffer.page_to_renderer_memory(false).unwrap();
    assert_eq!(monitor.renderer_memory_used(), 1024);

    buffer.page_to_disk(false).unwrap();
    buffer.page_to_disk(false).unwrap();
    assert_eq!(mgr.page_file_manager().stats().allocated_bytes, 1024);

    buffer.release_scene_buffer();
    buffer.release_scene_buffer();
    assert_eq!(monitor.scene_memory_used(), 0);
    assert_eq!(buffer.state(), BufferState::RENDERER | BufferState::DISK);
}

#[test]
fn swap_chain_through_every_tier_keeps_contents() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(&dir);
    let buffer = mgr.create_buffer(key("/volume"), 8, BufferUsage::Static).unwrap();
    buffer.write_contents(b"abcdefgh".to_vec()).unwrap();

    buffer.swap_to_renderer_memory(false, BufferState::SWAP_TO_RENDERER).unwrap();
    assert_eq!(buffer.state(), BufferState::RENDERER);

    buffer.swap_renderer_to_disk(false, BufferState::SWAP_RENDERER_TO_DISK).unwrap();
    assert_eq!(buffer.state(), BufferState::DISK);
    assert_eq!(buffer.memory_contents(), None);

    buffer.swap_to_scene_memory(false, BufferState::empty()).unwrap();
    assert_eq!(buffer.state(), BufferState::SCENE | BufferState::DISK);
    assert_eq!(buffer.memory_contents().unwrap(), b"abcdefgh");
}

#[test]
fn buffer_with_no_tier_cannot_page() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(&dir);
    let buffer = mgr.create_buffer(key("/empty"), 64, BufferUsage::Static).unwrap();
    buffer.release_scene_buffer();
    assert!(buffer.state().is_empty());

    let err = buffer.page_to_scene_memory(true).unwrap_err();
    assert!(matches!(err, PagingError::NoSource { .. }));
    assert!(buffer.state().is_empty());
    assert!(matches!(buffer.page_to_disk(false), Err(PagingError::NoSource { .. })));
}

#[test]
fn array_buffer_survives_disk_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(&dir);
    let values: Vec<f32> = (0..256).map(|i| i as f32 * 0.5).collect();
    let buffer: Arc<ArrayBuffer<f32>> = mgr
        .create_buffer_with(key("/mesh/normals"), 0, BufferUsage::Static, ArrayBuffer::new)
        .unwrap();
    buffer.write(&values).unwrap();
    assert_eq!(buffer.len(), 256);

    buffer.swap_scene_to_disk(false, BufferState::SWAP_SCENE_TO_DISK).unwrap();
    assert_eq!(buffer.read(), None);
    assert_eq!(mgr.memory_monitor().scene_memory_used(), 0);

    buffer.page_to_scene_memory(false).unwrap();
    assert_eq!(buffer.read().unwrap(), values);
}

#[test]
fn array_buffer_rejects_foreign_page() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(&dir);
    let buffer: Arc<ArrayBuffer<u32>> = mgr
        .create_buffer_with(key("/ids"), 0, BufferUsage::Static, ArrayBuffer::new)
        .unwrap();

    assert!(buffer.decode(&[0u8; 32]).is_none());

    let mut page = buffer.encode(&[1, 0, 0, 0, 2, 0, 0, 0]);
    assert!(buffer.decode(&page).is_some());
    page.pop();
    assert!(buffer.decode(&page).is_none());
}

#[test]
fn sampled_buffer_keeps_samples_sorted() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(&dir);
    let buffer: Arc<SampledBuffer<f64>> = mgr
        .create_buffer_with(key("/xform"), 0, BufferUsage::Static, SampledBuffer::new)
        .unwrap();
    buffer
        .write_samples(&[
            Sample { time: 2.0, values: vec![20.0] },
            Sample { time: 1.0, values: vec![10.0, 11.0] },
        ])
        .unwrap();

    buffer.swap_scene_to_disk(false, BufferState::SWAP_SCENE_TO_DISK).unwrap();
    buffer.page_to_scene_memory(false).unwrap();

    assert_eq!(buffer.sample_count(), 2);
    assert_eq!(buffer.sample_at(0.0).unwrap(), vec![10.0, 11.0]);
    assert_eq!(buffer.sample_at(1.5).unwrap(), vec![10.0, 11.0]);
    assert_eq!(buffer.sample_at(9.0).unwrap(), vec![20.0]);
}

#[test]
fn ragged_array_buffer_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(&dir);
    let buffer: Arc<ArrayBuffer<f32>> = mgr
        .create_buffer_with(key("/ragged"), 10, BufferUsage::Static, ArrayBuffer::new)
        .unwrap();
    buffer.write_contents((1..=10).collect()).unwrap();

    buffer.swap_scene_to_disk(false, BufferState::SWAP_SCENE_TO_DISK).unwrap();
    assert_eq!(buffer.state(), BufferState::DISK);

    buffer.page_to_scene_memory(false).unwrap();
    assert_eq!(buffer.memory_contents().unwrap(), (1..=10).collect::<Vec<u8>>());
    assert_eq!(buffer.len(), 2);
}

fn tight_manager(dir: &tempfile::TempDir) -> BufferManager {
    BufferManager::new(BufferManagerConfig {
        page_file_directory: Some(dir.path().to_path_buf()),
        scene_memory_limit: 1 << 20,
        renderer_memory_limit: 1 << 20,
        num_threads: 1,
        max_page_file_size: 1024,
        max_page_files: 1,
        ..Default::default()
    })
    .unwrap()
}

#[test]
fn failed_swap_to_disk_keeps_memory_tiers() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = tight_manager(&dir);
    let filler = mgr.create_buffer(key("/filler"), 1000, BufferUsage::Static).unwrap();
    filler.page_to_disk(false).unwrap();

    let buffer = mgr.create_buffer(key("/victim"), 100, BufferUsage::Static).unwrap();
    buffer.write_contents(vec![42u8; 100]).unwrap();
    buffer.page_to_renderer_memory(false).unwrap();
    let scene_before = mgr.memory_monitor().scene_memory_used();
    let renderer_before = mgr.memory_monitor().renderer_memory_used();

    let err = buffer.swap_scene_to_disk(false, BufferState::SWAP_SCENE_TO_DISK).unwrap_err();
    assert!(matches!(err, PagingError::Disk(_)));
    assert!(err.is_retryable());
    assert_eq!(buffer.state(), BufferState::SCENE | BufferState::RENDERER);
    assert_eq!(mgr.memory_monitor().scene_memory_used(), scene_before);
    assert_eq!(mgr.memory_monitor().renderer_memory_used(), renderer_before);
    assert_eq!(buffer.memory_contents().unwrap(), vec![42u8; 100]);
}

#[test]
fn failed_content_resize_keeps_old_copies() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = tight_manager(&dir);
    let buffer = mgr.create_buffer(key("/grow"), 600, BufferUsage::Static).unwrap();
    buffer.write_contents(vec![1u8; 600]).unwrap();
    buffer.page_to_disk(false).unwrap();

    let err = buffer.write_contents(vec![2u8; 900]).unwrap_err();
    assert!(matches!(err, PagingError::Disk(_)));
    assert_eq!(buffer.state(), BufferState::SCENE | BufferState::DISK);
    assert_eq!(buffer.size(), 600);
    assert_eq!(mgr.memory_monitor().scene_memory_used(), 600);

    buffer.release_scene_buffer();
    buffer.page_to_scene_memory(false).unwrap();
    assert_eq!(buffer.memory_contents().unwrap(), vec![1u8; 600]);
}

//! Page-file and buffer transition throughput.
//!
//! Measures raw page writes, free-list reuse and full scene/disk swaps.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use hd_pager::paging::{
    BufferKey, BufferManager, BufferManagerConfig, BufferState, BufferUsage, PageFileConfig,
    PageFileManager, PageableBuffer,
};

const SIZES: [(&str, usize); 3] = [("4kb", 4 * 1024), ("64kb", 64 * 1024), ("1mb", 1024 * 1024)];

fn bench_page_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("page_write");

    for (name, size) in SIZES {
        let pages = PageFileManager::new(PageFileConfig::default());
        let data = vec![0xA5u8; size];

        // Delete after each write so the free-list is exercised, not file growth.
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(BenchmarkId::new("create_delete", name), |b| {
            b.iter(|| {
                let handle = pages.create_page_handle(black_box(&data)).unwrap();
                pages.delete_page(&handle);
            })
        });
    }

    group.finish();
}

fn bench_page_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("page_read");

    for (name, size) in SIZES {
        let pages = PageFileManager::new(PageFileConfig::default());
        let handle = pages.create_page_handle(&vec![0x5Au8; size]).unwrap();
        let mut out = vec![0u8; size];

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(BenchmarkId::new("load", name), |b| {
            b.iter(|| {
                pages.load_page(&handle, &mut out).unwrap();
                black_box(out[0])
            })
        });
    }

    group.finish();
}

fn bench_swap_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("swap_cycle");
    let manager = BufferManager::new(BufferManagerConfig { num_threads: 1, ..Default::default() }).unwrap();

    for (name, size) in SIZES {
        let buffer = manager
            .create_buffer(BufferKey::new(format!("/bench/{}", name)).unwrap(), size, BufferUsage::Static)
            .unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(BenchmarkId::new("scene_disk_scene", name), |b| {
            b.iter(|| {
                buffer.swap_scene_to_disk(false, BufferState::SWAP_SCENE_TO_DISK).unwrap();
                buffer.page_to_scene_memory(false).unwrap();
                buffer.release_disk_page();
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_page_write, bench_page_read, bench_swap_cycle);
criterion_main!(benches);

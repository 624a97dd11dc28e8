//! Fuzz target for page-file payload validation.
//!
//! Arbitrary page bytes handed to the array and sampled decoders must be
//! accepted or rejected, never panic.

#![no_main]

use std::sync::{Arc, OnceLock};

use hd_pager::paging::{
    ArrayBuffer, BufferKey, ARRAY_HEADER_LEN, BufferManager, BufferManagerConfig, BufferUsage, PageableBuffer,
    SampledBuffer,
};
use libfuzzer_sys::fuzz_target;

struct Decoders {
    _manager: BufferManager,
    array: Arc<ArrayBuffer<f32>>,
    sampled: Arc<SampledBuffer<u16>>,
}

fn decoders() -> &'static Decoders {
    static DECODERS: OnceLock<Decoders> = OnceLock::new();
    DECODERS.get_or_init(|| {
        let manager =
            BufferManager::new(BufferManagerConfig { num_threads: 1, ..Default::default() })
                .expect("manager");
        let array = manager
            .create_buffer_with(BufferKey::new("/fuzz/array").expect("key"), 0, BufferUsage::Static, ArrayBuffer::new)
            .expect("array buffer");
        let sampled = manager
            .create_buffer_with(BufferKey::new("/fuzz/sampled").expect("key"), 0, BufferUsage::Static, SampledBuffer::new)
            .expect("sampled buffer");
        Decoders { _manager: manager, array, sampled }
    })
}

fuzz_target!(|data: &[u8]| {
    let d = decoders();
    if let Some(body) = d.array.decode(data) {
        assert_eq!(body.len() + ARRAY_HEADER_LEN, data.len());
    }
    let _ = d.sampled.decode(data);
});

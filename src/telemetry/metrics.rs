//! Metric recording through the `metrics` facade.
//!
//! Nothing is exported unless the embedding application installs a
//! recorder; without one every call here is a no-op.

/// Gauge holding the scene-memory tally in bytes.
pub const SCENE_MEMORY_GAUGE: &str = "hd_pager_scene_memory_bytes";
/// Gauge holding the renderer-memory tally in bytes.
pub const RENDERER_MEMORY_GAUGE: &str = "hd_pager_renderer_memory_bytes";

const PAGE_WRITES: &str = "hd_pager_page_writes_total";
const PAGE_READS: &str = "hd_pager_page_reads_total";
const PAGE_BYTES_WRITTEN: &str = "hd_pager_page_bytes_written_total";
const PAGE_BYTES_READ: &str = "hd_pager_page_bytes_read_total";
const PAGE_FILES_CREATED: &str = "hd_pager_page_files_created_total";
const CRAWL_ACTIONS: &str = "hd_pager_crawl_actions_total";

/// Describe every metric so exporters can attach units and help text.
pub fn init_metrics() {
    metrics::describe_counter!(PAGE_WRITES, "Pages written to page files");
    metrics::describe_counter!(PAGE_READS, "Pages read back from page files");
    metrics::describe_counter!(PAGE_BYTES_WRITTEN, metrics::Unit::Bytes, "Bytes written to page files");
    metrics::describe_counter!(PAGE_BYTES_READ, metrics::Unit::Bytes, "Bytes read from page files");
    metrics::describe_counter!(PAGE_FILES_CREATED, "Page files created");
    metrics::describe_counter!(CRAWL_ACTIONS, "Paging actions executed by free crawls");
    metrics::describe_gauge!(SCENE_MEMORY_GAUGE, metrics::Unit::Bytes, "Scene memory in use");
    metrics::describe_gauge!(RENDERER_MEMORY_GAUGE, metrics::Unit::Bytes, "Renderer memory in use");
}

/// Record the current tally of one memory tier.
pub fn record_memory_usage(gauge: &'static str, bytes: usize) {
    metrics::gauge!(gauge).set(bytes as f64);
}

pub fn record_page_write(bytes: u64) {
    metrics::counter!(PAGE_WRITES).increment(1);
    metrics::counter!(PAGE_BYTES_WRITTEN).increment(bytes);
}

pub fn record_page_read(bytes: u64) {
    metrics::counter!(PAGE_READS).increment(1);
    metrics::counter!(PAGE_BYTES_READ).increment(bytes);
}

pub fn record_page_file_created() {
    metrics::counter!(PAGE_FILES_CREATED).increment(1);
}

/// Record one strategy action taken during a free crawl.
pub fn record_crawl_action(succeeded: bool) {
    let result = if succeeded { "ok" } else { "error" };
    metrics::counter!(CRAWL_ACTIONS, "result" => result).increment(1);
}

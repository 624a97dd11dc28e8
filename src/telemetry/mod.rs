//! Structured logging, tracing spans and metrics.

mod logging;
mod metrics;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use metrics::{
    init_metrics, record_crawl_action, record_memory_usage, record_page_file_created,
    record_page_read, record_page_write, RENDERER_MEMORY_GAUGE, SCENE_MEMORY_GAUGE,
};
pub use spans::{PagingSpan, SpanExt};

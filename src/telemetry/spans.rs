//! Span helpers for paging operations.

use tracing::{info_span, Span};

use crate::paging::BufferKey;

/// Extension trait for adding outcome fields to spans.
pub trait SpanExt {
    /// Record the result of an operation into the span.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Factory for paging operation spans.
pub struct PagingSpan;

impl PagingSpan {
    /// Span for one operation on one buffer.
    ///
    /// `status` and `error.message` are filled by [`SpanExt::record_result`].
    pub fn new(key: &BufferKey, operation: &'static str) -> Span {
        info_span!(
            "paging_operation",
            key = %key,
            operation,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
        )
    }

    /// Span covering one free crawl.
    pub fn crawl(percentage: f32, candidates: usize) -> Span {
        info_span!(
            "free_crawl",
            percentage = f64::from(percentage),
            candidates,
            actions = tracing::field::Empty,
        )
    }
}

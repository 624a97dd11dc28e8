//! Tri-tier buffer paging.
//!
//! Buffers live in scene memory, renderer memory and page files. The
//! [`BufferManager`] owns the registry and drives eviction through a
//! [`PagingStrategy`] and a [`SelectionStrategy`].

mod buffer;
mod error;
mod key;
mod manager;
mod page_file;
mod payload;
mod selection;
mod state;
mod strategy;
mod sweeper;

pub use buffer::{BufferBase, DestructionCallback, PageableBuffer};
pub use error::{KeyError, PageFileError, PagingError};
pub use key::BufferKey;
pub use manager::{BufferManager, BufferManagerConfig, BufferManagerStats, CrawlReport};
pub use page_file::{
    BufferPageHandle, PageFileConfig, PageFileManager, PageFileStats, DEFAULT_MAX_PAGE_FILE_SIZE,
};
pub use payload::{ArrayBuffer, RawBuffer, Sample, SampledBuffer, ARRAY_HEADER_LEN, ARRAY_PAGE_MAGIC};
pub use selection::{BufferHandle, SelectionCandidate, SelectionStrategy};
pub use state::{BufferState, BufferUsage};
pub use strategy::{
    AgeBasedStrategy, ConservativeStrategy, HybridStrategy, PagingAction, PagingContext,
    PagingDecision, PagingStrategy, PagingStrategyKind, PressureBasedStrategy,
};
pub use sweeper::{BackgroundSweeper, SweeperConfig};

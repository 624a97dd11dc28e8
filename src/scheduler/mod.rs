//! Work scheduling for asynchronous paging operations.

mod thread_pool;

pub use thread_pool::{
    OperationHandle, Task, ThreadPool, ThreadPoolConfig, ThreadPoolError, ThreadPoolStats,
};

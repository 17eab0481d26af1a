//! # Functions
//!
//! Function registry, versioned code, execution records and the Lua
//! sandbox that runs them.

pub mod cancel;
pub mod errors;
pub mod execution;
pub mod function;
pub mod invoker;
pub mod marshal;
pub mod runtime;
pub mod scheduler;
pub mod store;

pub use cancel::{CancelToken, CancellationController, Cancelled};
pub use errors::{FunctionError, FunctionResult};
pub use execution::{Execution, ExecutionOutcome, ExecutionStatus, LogEntry, LogLevel};
pub use function::{Function, FunctionVersion, Pagination, RetentionDays, DEFAULT_RETENTION_DAYS};
pub use invoker::{InvocationResult, Invoker};
pub use runtime::{ExecutionContext, FunctionRuntime, InvocationRequest, LuaRuntime, RuntimeConfig};
pub use scheduler::{RetentionHousekeeper, DEFAULT_SCHEDULE};
pub use store::{ExecutionStore, FileExecutionStore, MemoryExecutionStore};

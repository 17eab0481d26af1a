//! moonhost - a multi-tenant host for sandboxed Lua functions
//!
//! Functions are stored as versioned Lua source. Each invocation runs the
//! active version in a fresh sandbox with a deadline and a fixed set of
//! capability modules, and is recorded as a masked execution.

pub mod capabilities;
pub mod cli;
pub mod config;
pub mod functions;
pub mod jsonfile;
pub mod kv;
pub mod masking;
pub mod outbound;

pub use config::EngineConfig;
pub use functions::{
    Execution, ExecutionStatus, ExecutionStore, FunctionError, FunctionResult, Invoker, LuaRuntime,
    RetentionHousekeeper,
};

//! # Function Invoker
//!
//! Owns the execution lifecycle: a `pending` record is written before the
//! sandbox is touched, flipped to `running` right before the guest starts,
//! and finalized exactly once with the masked outcome.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::errors::{FunctionError, FunctionResult};
use super::execution::{Execution, ExecutionOutcome, ExecutionStatus, LogEntry, LogLevel};
use super::function::Pagination;
use super::runtime::{ExecutionContext, FunctionRuntime, InvocationRequest, RuntimeConfig};
use super::store::ExecutionStore;
use crate::masking::{mask_json, mask_logs, mask_text};

/// Result of function invocation
#[derive(Debug, Clone)]
pub struct InvocationResult {
    /// The persisted, masked record
    pub execution: Execution,

    /// The guest's unmasked return value, for the caller only
    pub output: Option<Value>,
}

impl InvocationResult {
    pub fn status(&self) -> ExecutionStatus {
        self.execution.status
    }
}

/// Function invoker
#[derive(Clone)]
pub struct Invoker {
    store: Arc<dyn ExecutionStore>,
    runtime: Arc<dyn FunctionRuntime>,
    config: RuntimeConfig,
}

impl std::fmt::Debug for Invoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invoker")
            .field("runtime", &self.runtime.name())
            .field("config", &self.config)
            .finish()
    }
}

impl Invoker {
    pub fn new(
        store: Arc<dyn ExecutionStore>,
        runtime: Arc<dyn FunctionRuntime>,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            store,
            runtime,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn ExecutionStore> {
        &self.store
    }

    /// Invoke the active version of a function with `event`
    ///
    /// Returns an error only when the function or its code cannot be found
    /// or the store fails; guest errors and timeouts are recorded outcomes.
    pub async fn invoke(&self, function_id: &str, event: Value) -> FunctionResult<InvocationResult> {
        let function = self.store.get_function(function_id)?;
        let version = self.store.active_version(function_id)?;

        let execution = self.store.create_execution(Execution::new(
            &function.id,
            &version.id,
            Some(mask_json(&event)),
        ))?;
        let execution_id = execution.id.clone();
        debug!(function_id = %function.id, execution_id = %execution_id, "execution created");

        if let Err(e) = self.store.mark_running(&execution_id) {
            self.abandon(&execution_id, &e);
            return Err(e);
        }

        let request = InvocationRequest {
            function_id: function.id.clone(),
            code: version.code.clone(),
            event,
            timeout: self.config.timeout,
            context: ExecutionContext::new(&execution_id, &function, &version, &self.config.base_url),
        };
        let mut outcome = self.runtime.invoke(request).await;

        if let Some(error) = &outcome.error {
            if outcome.status != ExecutionStatus::Success {
                outcome.logs.push(LogEntry::new(LogLevel::Error, error.clone()));
            }
        }

        let output = outcome.output.clone();
        outcome.output = outcome.output.as_ref().map(mask_json);
        outcome.error = outcome.error.as_deref().map(mask_text);
        outcome.logs = mask_logs(outcome.logs);

        let status = outcome.status;
        let duration_ms = outcome.duration_ms;
        let execution = match self.store.finalize_execution(&execution_id, outcome) {
            Ok(execution) => execution,
            Err(e) => {
                self.abandon(&execution_id, &e);
                return Err(e);
            }
        };

        match status {
            ExecutionStatus::Success => info!(
                function_id = %function.id,
                execution_id = %execution_id,
                status = %status,
                duration_ms,
                "execution finished"
            ),
            _ => warn!(
                function_id = %function.id,
                execution_id = %execution_id,
                status = %status,
                duration_ms,
                "execution did not succeed"
            ),
        }

        Ok(InvocationResult { execution, output })
    }

    /// Best-effort close of a record whose lifecycle broke off as `failure`
    ///
    /// The caller still receives `cause`; a second store failure is only logged.
    fn abandon(&self, execution_id: &str, cause: &FunctionError) {
        let message = mask_text(&format!("execution aborted: {}", cause));
        let outcome = ExecutionOutcome {
            status: ExecutionStatus::Failure,
            output: None,
            error: Some(message.clone()),
            logs: vec![LogEntry::new(LogLevel::Error, message)],
            duration_ms: 0,
        };

        if let Err(e) = self.store.finalize_execution(execution_id, outcome) {
            warn!(execution_id, error = %e, "could not close aborted execution");
        }
    }

    /// One page of a function's executions, newest first
    pub fn list_executions(
        &self,
        function_id: &str,
        page: Pagination,
    ) -> FunctionResult<(Vec<Execution>, usize)> {
        self.store.list_executions(function_id, page)
    }

    pub fn get_execution(&self, id: &str) -> FunctionResult<Execution> {
        self.store.get_execution(id)
    }
}

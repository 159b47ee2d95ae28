use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use stagehand_types::{
    ErrorDetail, ExecutionResult, ExecutionStatus, FailureClass, PartitionDescriptor, SchemaDescriptor,
};

use crate::{ExecutionContext, ExecutionError, Executor};

/// Retry contract for retryable executor failures
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total executor invocations allowed per partition
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_backoff_ms() -> u64 {
    5_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            multiplier: default_multiplier(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff(mut self, initial_ms: u64, multiplier: f64, max_ms: u64) -> Self {
        self.initial_backoff_ms = initial_ms;
        self.multiplier = multiplier;
        self.max_backoff_ms = max_ms;
        self
    }

    /// Delay before attempt `attempt + 1`, after `attempt` has failed
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let raw = self.initial_backoff_ms as f64 * self.multiplier.max(1.0).powi(exponent);
        let capped = raw.min(self.max_backoff_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Run `executor` on `partition` under `policy`.
///
/// Never fails: every outcome, including cancellation and exhausted
/// retries, is folded into the returned [`ExecutionResult`]. Successful
/// outputs that do not match `output_schema` are fatal failures.
pub async fn run_with_retry(
    executor: &dyn Executor,
    partition: &PartitionDescriptor,
    ctx: &ExecutionContext,
    policy: &RetryPolicy,
    output_schema: &SchemaDescriptor,
) -> ExecutionResult {
    let started = Instant::now();
    let max_attempts = policy.attempts();
    let elapsed = |start: Instant| start.elapsed().as_millis() as u64;

    let mut attempt = 0;
    loop {
        if ctx.cancel.is_cancelled() {
            return cancelled(partition, attempt, elapsed(started));
        }
        attempt += 1;

        let outcome = executor.execute(partition, &ctx.for_attempt(attempt)).await;
        match outcome {
            Ok(output) => return check_output(partition, output, output_schema, attempt, elapsed(started)),
            Err(ExecutionError::Cancelled) => return cancelled(partition, attempt, elapsed(started)),
            Err(err @ ExecutionError::Retryable(_)) if attempt < max_attempts => {
                let delay = policy.backoff_after(attempt);
                tracing::debug!(
                    partition_id = %partition.partition_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retryable failure, backing off"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = ctx.cancel.cancelled() => {
                        return cancelled(partition, attempt, elapsed(started));
                    }
                }
            }
            Err(err @ ExecutionError::Retryable(_)) => {
                tracing::warn!(
                    partition_id = %partition.partition_id,
                    attempts = attempt,
                    error = %err,
                    "Retries exhausted"
                );
                return ExecutionResult::failed(
                    partition,
                    ExecutionStatus::Failed(FailureClass::Retryable),
                    ErrorDetail::new("retries_exhausted", err.to_string()),
                    attempt,
                    elapsed(started),
                );
            }
            Err(err) => {
                tracing::warn!(
                    partition_id = %partition.partition_id,
                    attempt,
                    error = %err,
                    "Fatal execution failure"
                );
                return ExecutionResult::failed(
                    partition,
                    ExecutionStatus::Failed(FailureClass::Fatal),
                    ErrorDetail::new(err.code().as_str(), err.to_string()),
                    attempt,
                    elapsed(started),
                );
            }
        }
    }
}

fn check_output(
    partition: &PartitionDescriptor,
    output: Value,
    schema: &SchemaDescriptor,
    attempts: u32,
    duration_ms: u64,
) -> ExecutionResult {
    let problems = schema.check(&output);
    if problems.is_empty() {
        return ExecutionResult::succeeded(partition, output, attempts, duration_ms);
    }
    ExecutionResult::failed(
        partition,
        ExecutionStatus::Failed(FailureClass::Fatal),
        ErrorDetail::new("output_schema_violation", problems.join("; ")),
        attempts,
        duration_ms,
    )
}

fn cancelled(partition: &PartitionDescriptor, attempts: u32, duration_ms: u64) -> ExecutionResult {
    ExecutionResult::failed(
        partition,
        ExecutionStatus::Cancelled,
        ErrorDetail::new("cancelled", "plan cancelled"),
        attempts,
        duration_ms,
    )
}

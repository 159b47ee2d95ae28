//! Plan execution
//!
//! One task per dispatched plan walks its stages in order. Each stage is
//! partitioned, its partitions run on the shared worker pool, and the
//! results collected until all arrive, the stage SLA expires or the plan
//! is cancelled.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use stagehand_executor::{run_with_retry, CancellationToken, ExecutionContext};
use stagehand_health::FallbackResolution;
use stagehand_types::{
    ErrorCode, ErrorDetail, ExecutionResult, FailurePolicy, FallbackAction, JobKind, LifecycleEvent, Plan,
    PlanStatus, Stage, StageId, StageStatus, Topic,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::aggregate::{aggregate, StageAggregate};
use crate::orchestrator::{Inner, PlanHandle};
use crate::LateResult;

pub(crate) async fn run_plan(inner: Arc<Inner>, handle: Arc<PlanHandle>, plan: Plan) {
    let plan_id = plan.id.clone();

    if let Err(e) = inner.commit(&handle, |r| r.transition(PlanStatus::Running)).await {
        debug!(plan_id = %plan_id, reason = %e, "Plan not started");
        inner.release(&plan_id, &handle);
        return;
    }
    inner
        .publish(LifecycleEvent::new(
            Topic::PLAN_RUNNING,
            plan_id.clone(),
            PlanStatus::Running.as_str(),
        ))
        .await;
    info!(plan_id = %plan_id, stages = plan.stages.len(), dry_run = plan.dry_run, "Plan running");

    // Channels on fallback during this plan, for once-per-plan events.
    let mut degraded = BTreeSet::new();
    let mut failed: Vec<StageId> = Vec::new();
    let mut aborted = false;

    for stage in &plan.stages {
        if handle.cancel.is_cancelled() {
            skip_stage(&inner, &handle, &stage.id, StageStatus::Cancelled).await;
            continue;
        }
        if aborted {
            skip_stage(&inner, &handle, &stage.id, StageStatus::Skipped).await;
            continue;
        }

        let status = run_stage(&inner, &handle, &plan, stage, &mut degraded).await;
        if status.is_failure() {
            failed.push(stage.id.clone());
            if plan.failure_policy == FailurePolicy::AbortOnFailure {
                aborted = true;
            }
        }
    }

    if !handle.cancel.is_cancelled() {
        let (status, topic) = if failed.is_empty() {
            (PlanStatus::Completed, Topic::PLAN_COMPLETED)
        } else {
            (PlanStatus::Failed, Topic::PLAN_FAILED)
        };
        match inner.commit(&handle, |r| r.transition(status)).await {
            Ok(()) => {
                let failed_ids: Vec<&str> = failed.iter().map(StageId::as_str).collect();
                info!(plan_id = %plan_id, status = %status, failed_stages = ?failed_ids, "Plan finished");
                inner
                    .publish(
                        LifecycleEvent::new(topic, plan_id.clone(), status.as_str())
                            .with_detail(json!({"failed_stages": failed_ids})),
                    )
                    .await;
            }
            Err(e) => debug!(plan_id = %plan_id, reason = %e, "Final status not applied"),
        }
    }
    inner.release(&plan_id, &handle);
}

async fn skip_stage(inner: &Inner, handle: &PlanHandle, stage_id: &StageId, status: StageStatus) {
    let result = inner
        .commit(handle, |r| {
            if let Some(stage) = r.stage_mut(stage_id) {
                stage.finish(status, None);
            }
            Ok(())
        })
        .await;
    if let Err(e) = result {
        error!(stage_id = %stage_id, error = %e, "Failed to persist stage status");
    }
}

/// Record the stage's terminal state and publish the matching event
async fn finish_stage(
    inner: &Inner,
    handle: &PlanHandle,
    plan: &Plan,
    stage: &Stage,
    status: StageStatus,
    error: Option<ErrorDetail>,
    outcome: Option<StageAggregate>,
) -> StageStatus {
    let topic = match status {
        StageStatus::Succeeded => Topic::STAGE_COMPLETED,
        StageStatus::TimedOut => Topic::STAGE_TIMED_OUT,
        StageStatus::Cancelled => Topic::STAGE_CANCELLED,
        _ => Topic::STAGE_FAILED,
    };

    let mut detail = json!({});
    if let Some(err) = &error {
        detail["error"] = json!({"code": err.code, "message": err.message});
    }
    if let Some(agg) = &outcome {
        detail["merkle_root"] = json!(agg.merkle_root);
        detail["output"] = agg.output.clone();
    }

    let result = inner
        .commit(handle, |r| {
            if let Some(record) = r.stage_mut(&stage.id) {
                if let Some(agg) = outcome {
                    record.results = agg.results;
                    record.aggregated = agg.output;
                    record.merkle_root = Some(agg.merkle_root);
                }
                record.finish(status, error);
            }
            Ok(())
        })
        .await;
    if let Err(e) = result {
        error!(plan_id = %plan.id, stage_id = %stage.id, error = %e, "Failed to persist stage result");
    }

    match status {
        StageStatus::Succeeded => info!(plan_id = %plan.id, stage_id = %stage.id, "Stage succeeded"),
        StageStatus::Cancelled => info!(plan_id = %plan.id, stage_id = %stage.id, "Stage cancelled"),
        _ => warn!(plan_id = %plan.id, stage_id = %stage.id, status = ?status, "Stage did not succeed"),
    }
    inner
        .publish(
            LifecycleEvent::new(topic, plan.id.clone(), stage_status_str(status))
                .with_stage(stage.id.clone())
                .with_detail(detail),
        )
        .await;
    status
}

fn stage_status_str(status: StageStatus) -> &'static str {
    match status {
        StageStatus::Pending => "pending",
        StageStatus::Running => "running",
        StageStatus::Succeeded => "succeeded",
        StageStatus::Failed => "failed",
        StageStatus::TimedOut => "timed_out",
        StageStatus::Cancelled => "cancelled",
        StageStatus::Skipped => "skipped",
    }
}

async fn run_stage(
    inner: &Arc<Inner>,
    handle: &Arc<PlanHandle>,
    plan: &Plan,
    stage: &Stage,
    degraded: &mut BTreeSet<String>,
) -> StageStatus {
    let fail = |code: &str, message: String| Some(ErrorDetail::new(code, message));

    let kind = match inner.registry.get(&stage.kind_id) {
        Ok(kind) => kind,
        Err(e) => {
            let error = fail(e.code().as_str(), e.to_string());
            return finish_stage(inner, handle, plan, stage, StageStatus::Failed, error, None).await;
        }
    };

    let fallbacks = match resolve_channels(inner, plan, stage, &kind, degraded).await {
        Ok(fallbacks) => fallbacks,
        Err(error) => {
            return finish_stage(inner, handle, plan, stage, StageStatus::Failed, Some(error), None).await;
        }
    };

    let partitions = match inner
        .partitioners
        .get(&stage.partitioner)
        .and_then(|p| p.partition(stage))
    {
        Ok(partitions) => partitions,
        Err(e) => {
            let error = fail(ErrorCode::ValidationError.as_str(), e.to_string());
            return finish_stage(inner, handle, plan, stage, StageStatus::Failed, error, None).await;
        }
    };
    if let Some(max) = plan.max_partitions {
        if partitions.len() > max {
            let error = fail(
                ErrorCode::ExecutionFatal.as_str(),
                format!("stage produced {} partitions, plan allows at most {max}", partitions.len()),
            );
            return finish_stage(inner, handle, plan, stage, StageStatus::Failed, error, None).await;
        }
    }

    let executor = match inner.executors.get(&stage.executor) {
        Ok(executor) => executor,
        Err(e) => {
            let error = fail(e.code().as_str(), e.to_string());
            return finish_stage(inner, handle, plan, stage, StageStatus::Failed, error, None).await;
        }
    };

    let sla_ms = inner.config.effective_sla_ms(stage.sla_ms, kind.default_sla_ms);
    let count = partitions.len();
    let started = inner
        .commit(handle, |r| {
            if let Some(record) = r.stage_mut(&stage.id) {
                record.status = StageStatus::Running;
                record.partitions = count;
                record.fallbacks = fallbacks.clone();
                record.sla_ms = sla_ms;
                record.started_at = Some(Utc::now());
            }
            Ok(())
        })
        .await;
    if let Err(e) = started {
        error!(plan_id = %plan.id, stage_id = %stage.id, error = %e, "Failed to persist stage start");
    }
    info!(
        plan_id = %plan.id,
        stage_id = %stage.id,
        partitions = count,
        sla_ms,
        fallbacks = fallbacks.len(),
        "Stage started"
    );
    inner
        .publish(
            LifecycleEvent::new(Topic::STAGE_STARTED, plan.id.clone(), "running")
                .with_stage(stage.id.clone())
                .with_detail(json!({
                    "partitions": count,
                    "sla_ms": sla_ms,
                    "fallbacks": fallbacks,
                })),
        )
        .await;

    if count == 0 {
        let agg = aggregate(Vec::new());
        return finish_stage(inner, handle, plan, stage, StageStatus::Succeeded, None, Some(agg)).await;
    }

    // Cancelled on plan cancel or SLA expiry; queued partitions never start.
    let stage_cancel = CancellationToken::new();
    let ctx = ExecutionContext::new(plan.id.clone(), stage.id.clone())
        .with_dry_run(plan.dry_run)
        .with_non_idempotent(stage.non_idempotent)
        .with_fallbacks(fallbacks)
        .with_cancel(stage_cancel.clone());

    let (tx, mut rx) = mpsc::channel(inner.config.result_buffer.max(1));
    for partition in partitions {
        let pool = inner.pool.clone();
        let executor = executor.clone();
        let ctx = ctx.clone();
        let policy = inner.config.retry.clone();
        let schema = kind.output_schema.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let permit = tokio::select! {
                permit = pool.acquire_owned() => permit.ok(),
                _ = ctx.cancel.cancelled() => None,
            };
            // Never started: nothing to report.
            let Some(_permit) = permit else {
                return;
            };
            let result = run_with_retry(executor.as_ref(), &partition, &ctx, &policy, &schema).await;
            let _ = tx.send(result).await;
        });
    }
    drop(tx);

    let deadline = tokio::time::sleep(Duration::from_millis(sla_ms));
    tokio::pin!(deadline);
    let mut results = Vec::with_capacity(count);
    let mut interrupted = None;

    while results.len() < count {
        tokio::select! {
            biased;
            _ = handle.cancel.cancelled() => {
                interrupted = Some(StageStatus::Cancelled);
                break;
            }
            received = rx.recv() => match received {
                Some(result) => {
                    publish_partition(inner, plan, &stage.id, &result).await;
                    results.push(result);
                }
                None => break,
            },
            _ = &mut deadline => {
                interrupted = Some(StageStatus::TimedOut);
                break;
            }
        }
    }

    if interrupted.is_some() {
        stage_cancel.cancel();
        collect_late(inner.clone(), handle.clone(), stage.id.clone(), rx);
    }

    let finished = results.len();
    let agg = aggregate(results);
    let (status, error) = match interrupted {
        Some(StageStatus::Cancelled) => (
            StageStatus::Cancelled,
            fail("cancelled", format!("plan cancelled with {finished}/{count} partitions finished")),
        ),
        Some(_) => {
            inner.health.record_sla_breach(&plan.id, &stage.id, sla_ms);
            (
                StageStatus::TimedOut,
                fail(
                    ErrorCode::Timeout.as_str(),
                    format!("stage exceeded its {sla_ms} ms SLA with {finished}/{count} partitions finished"),
                ),
            )
        }
        None if finished < count => (
            StageStatus::Failed,
            fail(
                ErrorCode::ExecutionFatal.as_str(),
                format!("only {finished}/{count} partitions reported a result"),
            ),
        ),
        None => match agg.first_failure() {
            Some(failure) => (
                StageStatus::Failed,
                Some(failure.error.clone().unwrap_or_else(|| {
                    ErrorDetail::new(
                        ErrorCode::ExecutionFatal.as_str(),
                        format!("partition {} {}", failure.partition_id, failure.status.as_str()),
                    )
                })),
            ),
            None => (StageStatus::Succeeded, None),
        },
    };

    finish_stage(inner, handle, plan, stage, status, error, Some(agg)).await
}

async fn publish_partition(inner: &Inner, plan: &Plan, stage_id: &StageId, result: &ExecutionResult) {
    let (topic, detail) = if result.status.is_success() {
        (
            Topic::PARTITION_COMPLETED,
            json!({
                "content_id": result.content_id,
                "attempts": result.attempts,
                "duration_ms": result.duration_ms,
            }),
        )
    } else {
        (
            Topic::PARTITION_FAILED,
            json!({
                "content_id": result.content_id,
                "attempts": result.attempts,
                "duration_ms": result.duration_ms,
                "error": result.error,
            }),
        )
    };
    inner
        .publish(
            LifecycleEvent::new(topic, plan.id.clone(), result.status.as_str())
                .with_stage(stage_id.clone())
                .with_partition(result.partition_id.clone())
                .with_detail(detail),
        )
        .await;
}

/// Record results that arrive after the stage stopped collecting.
/// They never change the stage's outcome.
fn collect_late(
    inner: Arc<Inner>,
    handle: Arc<PlanHandle>,
    stage_id: StageId,
    mut rx: mpsc::Receiver<ExecutionResult>,
) {
    tokio::spawn(async move {
        while let Some(result) = rx.recv().await {
            debug!(
                stage_id = %stage_id,
                partition_id = %result.partition_id,
                status = result.status.as_str(),
                "Late partition result"
            );
            let late = LateResult {
                stage_id: stage_id.clone(),
                result,
                received_at: Utc::now(),
            };
            let saved = inner
                .commit(&handle, |r| {
                    r.late_results.push(late);
                    Ok(())
                })
                .await;
            if let Err(e) = saved {
                error!(stage_id = %stage_id, error = %e, "Failed to record late result");
            }
        }
    });
}

/// Resolve every channel the stage depends on, returning the fallbacks
/// in force. A critical channel that is down fails the stage.
async fn resolve_channels(
    inner: &Inner,
    plan: &Plan,
    stage: &Stage,
    kind: &JobKind,
    degraded: &mut BTreeSet<String>,
) -> Result<Vec<(String, FallbackAction)>, ErrorDetail> {
    let names: BTreeSet<&str> = kind
        .required_channels
        .iter()
        .chain(plan.channels.iter())
        .map(String::as_str)
        .collect();

    let mut fallbacks = Vec::new();
    for name in names {
        let resolution = inner
            .health
            .resolve(name)
            .map_err(|e| ErrorDetail::new(e.code().as_str(), e.to_string()))?;
        match resolution {
            FallbackResolution::Healthy => {
                if degraded.remove(name) {
                    inner
                        .publish(
                            LifecycleEvent::new(Topic::CHANNEL_RECOVERED, plan.id.clone(), "healthy")
                                .with_stage(stage.id.clone())
                                .with_detail(json!({"channel": name})),
                        )
                        .await;
                }
            }
            FallbackResolution::Fallback {
                channel,
                health,
                action,
            } => {
                if degraded.insert(channel.clone()) {
                    inner
                        .publish(
                            LifecycleEvent::new(Topic::CHANNEL_DEGRADED, plan.id.clone(), health.as_str())
                                .with_stage(stage.id.clone())
                                .with_detail(json!({
                                    "channel": channel,
                                    "health": health,
                                    "fallback": action,
                                })),
                        )
                        .await;
                }
                fallbacks.push((channel, action));
            }
            FallbackResolution::Escalate { channel, health } => {
                inner
                    .publish(
                        LifecycleEvent::new(Topic::CHANNEL_DOWN, plan.id.clone(), health.as_str())
                            .with_stage(stage.id.clone())
                            .with_detail(json!({"channel": channel, "health": health})),
                    )
                    .await;
                return Err(ErrorDetail::new(
                    ErrorCode::ExecutionFatal.as_str(),
                    format!("critical channel '{channel}' is {health} and declares no fallback"),
                ));
            }
        }
    }
    Ok(fallbacks)
}

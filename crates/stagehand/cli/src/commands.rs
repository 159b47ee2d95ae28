//! Subcommand handlers
//!
//! Results go to stdout as JSON; logs go to stderr.

use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use serde::Serialize;
use stagehand_engine::EngineError;
use stagehand_types::{JobKind, Plan, PlanId, PlanStatus, Violation};

use crate::app::App;

pub async fn kinds(app: &App) -> anyhow::Result<ExitCode> {
    let kinds = app.orchestrator.list_job_kinds();
    let kinds: Vec<&JobKind> = kinds.iter().map(|k| k.as_ref()).collect();
    print_json(&kinds)?;
    Ok(ExitCode::SUCCESS)
}

#[derive(Serialize)]
struct ValidationOutput<'a> {
    plan_id: &'a PlanId,
    fingerprint: &'a str,
    valid: bool,
    violations: Vec<Violation>,
}

pub async fn validate(app: &App, path: &Path) -> anyhow::Result<ExitCode> {
    let plan = read_plan(path).await?;
    let violations = app.orchestrator.validate_plan(&plan);
    let valid = violations.is_empty();
    print_json(&ValidationOutput {
        plan_id: &plan.id,
        fingerprint: &plan.fingerprint,
        valid,
        violations,
    })?;
    Ok(exit_code(valid))
}

pub struct RunArgs<'a> {
    pub path: &'a Path,
    pub dry_run: bool,
    pub id: Option<String>,
    pub events: bool,
}

pub async fn run(app: &App, args: RunArgs<'_>) -> anyhow::Result<ExitCode> {
    let mut plan = read_plan(args.path).await?;
    if args.dry_run {
        plan = plan.as_dry_run();
    }
    if let Some(id) = args.id {
        plan.id = PlanId::new(id);
    }
    let requested = plan.id.clone();

    let plan_id = match app.orchestrator.submit_plan(plan).await {
        Ok(plan_id) => plan_id,
        Err(e) => {
            if args.events {
                print_events(app, &requested)?;
            }
            return report_error(&e);
        }
    };
    tracing::info!(plan_id = %plan_id, "Plan dispatched");

    let report = tokio::select! {
        report = app.orchestrator.wait_for_plan(&plan_id) => report?,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!(plan_id = %plan_id, "Interrupted, cancelling plan");
            app.orchestrator.cancel_plan(&plan_id).await?;
            app.orchestrator.wait_for_plan(&plan_id).await?
        }
    };

    if args.events {
        print_events(app, &plan_id)?;
    }
    print_json(&report)?;
    Ok(exit_code(report.status == PlanStatus::Completed))
}

pub async fn status(app: &App, plan_id: String) -> anyhow::Result<ExitCode> {
    match app.orchestrator.get_plan_status(&PlanId::new(plan_id)).await {
        Ok(report) => {
            print_json(&report)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => report_error(&e),
    }
}

pub async fn plans(app: &App) -> anyhow::Result<ExitCode> {
    let ids = app.orchestrator.list_plans().await?;
    print_json(&ids)?;
    Ok(ExitCode::SUCCESS)
}

pub async fn cancel(app: &App, plan_id: String) -> anyhow::Result<ExitCode> {
    let plan_id = PlanId::new(plan_id);
    if let Err(e) = app.orchestrator.cancel_plan(&plan_id).await {
        return report_error(&e);
    }
    print_json(&app.orchestrator.get_plan_status(&plan_id).await?)?;
    Ok(ExitCode::SUCCESS)
}

// ── helpers ──

async fn read_plan(path: &Path) -> anyhow::Result<Plan> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read plan {}", path.display()))?;
    let mut plan: Plan =
        serde_json::from_str(&contents).with_context(|| format!("invalid plan file {}", path.display()))?;
    if plan.fingerprint.is_empty() {
        plan.fingerprint = plan.compute_fingerprint();
    }
    Ok(plan)
}

fn report_error(error: &EngineError) -> anyhow::Result<ExitCode> {
    tracing::error!(code = %error.code(), "{error}");
    print_json(&error.to_public())?;
    Ok(ExitCode::FAILURE)
}

fn print_events(app: &App, plan_id: &PlanId) -> anyhow::Result<()> {
    for event in app.bus.events_for(plan_id) {
        println!("{}", serde_json::to_string(&event)?);
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn exit_code(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

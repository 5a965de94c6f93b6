#![forbid(unsafe_code)]

mod checks;
mod telemetry;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;

use stagegate_core::settings::{WorkspaceSettings, WORKSPACE_SETTINGS};
use stagegate_core::traits::{Subject, SystemClock};
use stagegate_core::types::EvaluationType;
use stagegate_engine::audit::{audit_log, JsonlAuditSink};
use stagegate_engine::definitions::StaticDefinitions;
use stagegate_engine::gates::{GateEvaluationResult, GateEvaluator};
use stagegate_engine::requirements::checker::RequirementChecker;
use stagegate_engine::subject::JsonSubject;

#[derive(Parser)]
#[command(
    name = "sgate",
    version,
    about = "Stage gate evaluation: check gate configs, evaluate projects, audit results."
)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Bootstrap workspace settings (.stagegate/settings.json).
    Init,

    /// Validate a gate config: schema + identity + lint.
    Check {
        /// Path to gate config .json file.
        config: String,

        /// Output structured JSON report.
        #[arg(long)]
        json: bool,

        /// Fail on warnings (not just errors).
        #[arg(long)]
        strict: bool,
    },

    /// Evaluate one gate of the subject's current stage.
    Evaluate {
        /// Path to gate config .json file.
        config: String,

        #[command(flatten)]
        target: Target,

        /// Gate key within the current stage.
        #[arg(long)]
        gate: String,

        /// Evaluation type: manual, automatic, scheduled.
        #[arg(long = "type", default_value = "manual")]
        evaluation_type: EvaluationType,
    },

    /// Evaluate every gate of the subject's current stage.
    Stage {
        config: String,

        #[command(flatten)]
        target: Target,
    },

    /// Check whether all blocking gates pass. Exits 1 when blocked.
    Advance {
        config: String,

        #[command(flatten)]
        target: Target,
    },

    /// List failing blocking gates and their failure reasons.
    Blockers {
        config: String,

        #[command(flatten)]
        target: Target,
    },

    /// Show per-gate status for the current stage.
    Status {
        config: String,

        #[command(flatten)]
        target: Target,

        /// Output JSON.
        #[arg(long)]
        json: bool,
    },

    /// Verify an evaluation audit log hash-chain, or anchor its head.
    Audit {
        /// Path to .audit.jsonl file.
        log: String,

        /// Verify the hash chain.
        #[arg(long)]
        verify: bool,

        /// Write a checkpoint recording the current chain head.
        #[arg(long, conflicts_with_all = ["verify", "checkpoint_verify"])]
        checkpoint_create: bool,

        /// Verify the chain against a checkpoint.
        #[arg(long, conflicts_with = "verify")]
        checkpoint_verify: bool,

        /// Checkpoint file (default: log path with .checkpoint.json).
        #[arg(long)]
        checkpoint: Option<String>,
    },
}

#[derive(clap::Args)]
struct Target {
    /// Path to subject snapshot .json file.
    #[arg(long)]
    subject: String,

    /// Audit log path (default: subject path with its extension replaced by .audit.jsonl).
    #[arg(long)]
    audit: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let loaded = stagegate_core::settings::load_workspace_settings();
    let settings = loaded
        .as_ref()
        .ok()
        .and_then(|s| s.clone())
        .unwrap_or_default();
    telemetry::init(&settings.log)?;
    if let Err(e) = &loaded {
        tracing::warn!(error = %format!("{e:#}"), "ignoring workspace settings");
    }

    match cli.cmd {
        Cmd::Init => cmd_init(),

        Cmd::Check {
            config,
            json,
            strict,
        } => cmd_check(&config, json, strict),

        Cmd::Evaluate {
            config,
            target,
            gate,
            evaluation_type,
        } => cmd_evaluate(&settings, &config, &target, &gate, evaluation_type),

        Cmd::Stage { config, target } => cmd_stage(&settings, &config, &target),

        Cmd::Advance { config, target } => cmd_advance(&settings, &config, &target),

        Cmd::Blockers { config, target } => cmd_blockers(&settings, &config, &target),

        Cmd::Status {
            config,
            target,
            json,
        } => cmd_status(&settings, &config, &target, json),

        Cmd::Audit {
            log,
            verify,
            checkpoint_create,
            checkpoint_verify,
            checkpoint,
        } => cmd_audit(
            &log,
            AuditMode::from_flags(verify, checkpoint_create, checkpoint_verify)?,
            checkpoint.as_deref(),
        ),
    }
}

/// Loaded config, subject and evaluator for one command.
struct Session {
    definitions: Arc<StaticDefinitions>,
    subject: JsonSubject,
    evaluator: GateEvaluator,
}

impl Session {
    fn open(settings: &WorkspaceSettings, config: &str, target: &Target) -> Result<Self> {
        let definitions = Arc::new(
            StaticDefinitions::new(stagegate_core::config::load_config(config)?)
                .with_context(|| format!("{config}: invalid gate config"))?,
        );
        let subject = JsonSubject::load(Path::new(&target.subject), &settings.subject_model)?;
        let audit_path = target
            .audit
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| default_audit_path(&target.subject));
        tracing::debug!(
            config,
            subject = %target.subject,
            audit = %audit_path.display(),
            "opening session"
        );
        let audit = Arc::new(JsonlAuditSink::open(audit_path)?);
        let checker = RequirementChecker::new(checks::registry()?);

        Ok(Self {
            evaluator: GateEvaluator::new(checker, definitions.clone(), audit),
            definitions,
            subject,
        })
    }
}

/// `<dir>/<stem>.audit.jsonl` next to the subject file.
fn default_audit_path(subject: &str) -> PathBuf {
    Path::new(subject).with_extension("audit.jsonl")
}

fn result_json(result: &GateEvaluationResult) -> serde_json::Value {
    json!({
        "gate_key": result.gate().gate_key,
        "name": result.gate().name,
        "passed": result.passed(),
        "is_blocking": result.gate().is_blocking,
        "total_count": result.total_count(),
        "passed_count": result.passed_count(),
        "failed_count": result.failed_count(),
        "progress_percentage": result.progress_percentage(),
        "blocker_messages": result.blocker_messages(),
        "tasks_to_create": result.tasks_to_create(),
        "locks_to_apply": result.locks_to_apply(),
        "evaluation": result.evaluation(),
    })
}

fn cmd_init() -> Result<()> {
    let path = Path::new(WORKSPACE_SETTINGS);
    if path.exists() {
        bail!("{WORKSPACE_SETTINGS} already exists");
    }
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(&WorkspaceSettings::default())?;
    std::fs::write(path, &json)?;
    eprintln!("created {WORKSPACE_SETTINGS}");
    Ok(())
}

fn cmd_check(file: &str, json_out: bool, strict: bool) -> Result<()> {
    let data = stagegate_core::config::load_value(file)?;
    let report = stagegate_core::schema::check(&data, file, strict);

    if json_out {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        if report.pass {
            eprintln!("  ok  {file} (v{})", report.version);
        } else {
            eprintln!("  FAIL {file} (v{})", report.version);
        }
        for e in &report.errors {
            eprintln!(
                "  error {}: {} {}",
                e.code,
                e.message,
                e.path.as_deref().unwrap_or("")
            );
        }
        for w in &report.warnings {
            eprintln!(
                "  warn  {}: {} {}",
                w.code,
                w.message,
                w.path.as_deref().unwrap_or("")
            );
        }
    }

    if !report.pass {
        bail!("check failed for {file}");
    }
    Ok(())
}

fn cmd_evaluate(
    settings: &WorkspaceSettings,
    config: &str,
    target: &Target,
    gate_key: &str,
    evaluation_type: EvaluationType,
) -> Result<()> {
    let session = Session::open(settings, config, target)?;
    let stage_id = session
        .subject
        .stage_id()
        .ok_or_else(|| anyhow!("subject {} has no current stage", session.subject.subject_id()))?;
    let gate = session
        .definitions
        .gate(stage_id, gate_key)
        .ok_or_else(|| anyhow!("no active gate '{gate_key}' in stage {stage_id}"))?;

    let result = session
        .evaluator
        .evaluate_as(&session.subject, gate, evaluation_type)?;
    println!("{}", serde_json::to_string_pretty(&result_json(&result))?);
    Ok(())
}

fn cmd_stage(settings: &WorkspaceSettings, config: &str, target: &Target) -> Result<()> {
    let session = Session::open(settings, config, target)?;
    let results = session
        .evaluator
        .evaluate_current_stage_gates(&session.subject)?;
    let out: serde_json::Map<String, serde_json::Value> = results
        .iter()
        .map(|(key, result)| (key.clone(), result_json(result)))
        .collect();
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn cmd_advance(settings: &WorkspaceSettings, config: &str, target: &Target) -> Result<()> {
    let session = Session::open(settings, config, target)?;
    let can_advance = session.evaluator.can_advance(&session.subject)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "subject_id": session.subject.subject_id(),
            "stage_id": session.subject.stage_id(),
            "can_advance": can_advance,
        }))?
    );
    if !can_advance {
        bail!("subject {} is blocked", session.subject.subject_id());
    }
    Ok(())
}

fn cmd_blockers(settings: &WorkspaceSettings, config: &str, target: &Target) -> Result<()> {
    let session = Session::open(settings, config, target)?;
    let blockers = session.evaluator.get_blockers(&session.subject)?;
    println!("{}", serde_json::to_string_pretty(&blockers)?);
    Ok(())
}

fn cmd_status(
    settings: &WorkspaceSettings,
    config: &str,
    target: &Target,
    json_out: bool,
) -> Result<()> {
    let session = Session::open(settings, config, target)?;
    let status = session.evaluator.get_gate_status(&session.subject)?;

    if json_out {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    let stage = session
        .subject
        .stage_id()
        .and_then(|id| session.definitions.config().stage(id))
        .map(|s| s.name.clone())
        .unwrap_or_else(|| "(none)".into());
    eprintln!("  Subject:  {}", session.subject.subject_id());
    eprintln!("  Stage:    {stage}");
    if status.is_empty() {
        eprintln!("  (no gates)");
    }
    for row in &status {
        let mark = if row.passed { "ok  " } else { "FAIL" };
        let kind = if row.is_blocking { "blocking" } else { "advisory" };
        eprintln!(
            "  {mark} {:<24} {}/{} ({:.1}%) {kind}",
            row.gate_key, row.requirements_passed, row.requirements_total, row.progress_percentage
        );
        for message in &row.blocker_messages {
            eprintln!("         - {message}");
        }
    }
    Ok(())
}

enum AuditMode {
    Verify,
    CheckpointCreate,
    CheckpointVerify,
}

impl AuditMode {
    fn from_flags(verify: bool, create: bool, against: bool) -> Result<Self> {
        match (verify, create, against) {
            (_, true, _) => Ok(Self::CheckpointCreate),
            (_, _, true) => Ok(Self::CheckpointVerify),
            (true, _, _) => Ok(Self::Verify),
            _ => bail!("specify --verify, --checkpoint-create or --checkpoint-verify"),
        }
    }
}

fn cmd_audit(log: &str, mode: AuditMode, checkpoint: Option<&str>) -> Result<()> {
    let path = Path::new(log);
    let checkpoint_path = checkpoint
        .map(PathBuf::from)
        .unwrap_or_else(|| path.with_extension("checkpoint.json"));

    match mode {
        AuditMode::Verify => {
            if !path.exists() {
                eprintln!("  no audit log found at {log}");
                return Ok(());
            }
            let count = audit_log::verify_chain(path)?;
            eprintln!("  audit chain valid ({count} entries)");
        }
        AuditMode::CheckpointCreate => {
            let created = audit_log::create_checkpoint(path, &checkpoint_path, &SystemClock)?;
            println!("{}", serde_json::to_string_pretty(&created)?);
            eprintln!(
                "  checkpoint written to {} ({} entries)",
                checkpoint_path.display(),
                created.entries
            );
        }
        AuditMode::CheckpointVerify => {
            let count = audit_log::verify_checkpoint(path, &checkpoint_path)?;
            eprintln!("  audit chain matches checkpoint ({count} entries)");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_audit_path_replaces_only_the_extension() {
        assert_eq!(
            default_audit_path("demos/project.json"),
            PathBuf::from("demos/project.audit.jsonl")
        );
        assert_eq!(
            default_audit_path("exports.json/p1.snapshot"),
            PathBuf::from("exports.json/p1.audit.jsonl")
        );
        assert_eq!(default_audit_path("p1"), PathBuf::from("p1.audit.jsonl"));
    }
}

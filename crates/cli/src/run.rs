//! `casebook run` and `casebook check-config`.

use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use casebook_io::{parse_findings, JsonStore, SchemaSet, FINDINGS_ARTIFACT};
use casebook_recon::artifacts::REGISTRY;
use casebook_recon::config::IdentityMode;
use casebook_recon::load::{load_case_rows, load_daily_rows, load_snapshot_rows, DATE_FORMAT};
use casebook_recon::publish::{self, TIMESTAMP_FORMAT};
use casebook_recon::{
    reconcile, Finding, FindingIdentity, MessageIdentity, PipelineConfig, PipelineInput,
    PreviousState, RunOutcome, StructuralIdentity,
};

use crate::exit_codes::EXIT_INVALID_CONFIG;
use crate::notify::{self, LogNotifier, Notifier, WebhookNotifier};
use crate::previous::HttpPrevious;
use crate::CliError;

pub struct RunArgs {
    pub config: PathBuf,
    pub today: Option<String>,
    pub as_of: Option<String>,
    pub dry_run: bool,
    pub json: bool,
    pub previous_dir: Option<PathBuf>,
    pub webhook_url: Option<String>,
}

/// Machine-readable summary printed by `run --json`.
#[derive(Serialize)]
struct RunReport<'a> {
    config: &'a str,
    today: NaiveDate,
    outcome: RunOutcome,
    message: &'static str,
    new: usize,
    newly_fixed: usize,
    already_fixed: usize,
    still_open: usize,
    artifacts_changed: Vec<&'a str>,
    last_update: &'a Value,
    dry_run: bool,
    findings: &'a [Finding],
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

pub fn cmd_run(args: RunArgs) -> Result<(), CliError> {
    let config = load_config(&args.config)?;
    let base_dir = config_dir(&args.config);

    let offset = config.offset().ok_or_else(|| CliError {
        code: EXIT_INVALID_CONFIG,
        message: format!("invalid utc_offset_hours {}", config.utc_offset_hours),
        hint: None,
    })?;
    let now = Utc::now().with_timezone(&offset);
    let today = match args.today.as_deref() {
        Some(s) => parse_today(s)?,
        None => now.date_naive(),
    };
    let as_of = args.as_of.as_deref().map(parse_as_of).transpose()?;

    info!(config = %config.name, %today, dry_run = args.dry_run, "starting run");

    // Sources
    let sources = &config.sources;
    let cases = load_case_rows(&read_source(&base_dir, &sources.cases.file)?, &sources.cases)?;
    let daily = load_daily_rows(&read_source(&base_dir, &sources.daily.file)?, &sources.daily)?;
    let snapshots = load_snapshot_rows(
        &read_source(&base_dir, &sources.cumulative.file)?,
        &sources.cumulative,
    )?;

    let result = casebook_recon::run(
        &config,
        &PipelineInput {
            cases,
            daily,
            snapshots,
            today,
            as_of,
        },
    )?;

    // Lifecycle
    let store = JsonStore::new(base_dir.join(&config.publish.output_dir));
    let previous = previous_state(&config, args.previous_dir.as_deref(), &store)?;

    let prior = parse_findings(previous.previous(FINDINGS_ARTIFACT)?)
        .map_err(|e| CliError::io(format!("cannot decode previous findings: {e}")))?;
    let identity: &dyn FindingIdentity = match config.publish.identity {
        IdentityMode::Message => &MessageIdentity,
        IdentityMode::Structural => &StructuralIdentity,
    };
    let reconciliation = reconcile(&prior, &result.findings, identity);

    let fresh_start = reconciliation.findings.len() - reconciliation.new_count;
    for finding in &reconciliation.findings[fresh_start..] {
        warn!(source = %finding.source, "{}", finding.message);
    }

    // Publication
    let schemas = SchemaSet::load(&base_dir.join(&config.publish.schema_dir))?;
    let stamp = match as_of {
        Some(t) => t.format(TIMESTAMP_FORMAT).to_string(),
        None => now.format(TIMESTAMP_FORMAT).to_string(),
    };
    let plan = publish::plan(REGISTRY, &result, previous.as_ref(), &schemas, &stamp)?;

    if args.dry_run {
        info!("dry run; nothing written");
    } else {
        let mut sink = store.clone();
        publish::commit(&plan, &mut sink)?;
        store.save_findings(&reconciliation.findings)?;
    }

    // Report
    let changed = plan.changed_names();
    if args.json {
        let report = RunReport {
            config: &config.name,
            today,
            outcome: reconciliation.outcome,
            message: reconciliation.outcome.message(),
            new: reconciliation.new_count,
            newly_fixed: reconciliation.newly_fixed,
            already_fixed: reconciliation.already_fixed,
            still_open: reconciliation.still_open,
            artifacts_changed: changed.clone(),
            last_update: &plan.last_update,
            dry_run: args.dry_run,
            findings: &reconciliation.findings,
        };
        let text = serde_json::to_string_pretty(&report)
            .map_err(|e| CliError::io(format!("cannot encode report: {e}")))?;
        println!("{text}");
    } else {
        eprintln!(
            "{}: {} ({} new, {} fixed, {} open); {}/{} artifacts changed",
            config.name,
            reconciliation.outcome.message(),
            reconciliation.new_count,
            reconciliation.newly_fixed,
            reconciliation.still_open,
            changed.len(),
            plan.artifacts.len(),
        );
    }

    // Notification
    if reconciliation.outcome.should_notify() && !args.dry_run {
        let message = notify::render(&config.name, &reconciliation);
        match args.webhook_url.or_else(|| config.notify.webhook_url.clone()) {
            Some(url) => WebhookNotifier::new(url)?.notify(&message)?,
            None => LogNotifier.notify(&message)?,
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// check-config
// ---------------------------------------------------------------------------

pub fn cmd_check_config(config_path: PathBuf) -> Result<(), CliError> {
    let config = load_config(&config_path)?;
    let base_dir = config_dir(&config_path);

    let schemas = SchemaSet::load(&base_dir.join(&config.publish.schema_dir))?;
    let missing: Vec<&str> = REGISTRY
        .iter()
        .map(|spec| spec.schema)
        .filter(|name| !schemas.contains(name))
        .collect();
    if !missing.is_empty() {
        return Err(CliError {
            code: EXIT_INVALID_CONFIG,
            message: format!("schema directory has no schema for: {}", missing.join(", ")),
            hint: Some(format!(
                "add <name>.json files under {}",
                base_dir.join(&config.publish.schema_dir).display()
            )),
        });
    }

    eprintln!(
        "{}: ok ({} metrics, {} sum rules, {} summary nodes, {} schemas)",
        config.name,
        config.sources.cumulative.metrics.len(),
        config.checks.sum.len(),
        config.summary_nodes().len(),
        schemas.len(),
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn load_config(path: &Path) -> Result<PipelineConfig, CliError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| CliError::io(format!("cannot read config {}: {e}", path.display())))?;
    Ok(PipelineConfig::from_toml(&content)?)
}

/// Source, schema and output paths in the config resolve against its directory.
fn config_dir(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf()
}

fn read_source(base_dir: &Path, file: &str) -> Result<String, CliError> {
    let path = base_dir.join(file);
    std::fs::read_to_string(&path)
        .map_err(|e| CliError::io(format!("cannot read source {}: {e}", path.display())))
}

fn previous_state(
    config: &PipelineConfig,
    previous_dir: Option<&Path>,
    store: &JsonStore,
) -> Result<Box<dyn PreviousState>, CliError> {
    if let Some(dir) = previous_dir {
        return Ok(Box::new(JsonStore::new(dir)));
    }
    if !config.publish.previous_urls.is_empty() {
        let http = HttpPrevious::new(config.publish.previous_urls.clone())
            .map_err(|e| CliError::io(format!("cannot build HTTP client: {e}")))?;
        return Ok(Box::new(http));
    }
    Ok(Box::new(store.clone()))
}

fn parse_today(value: &str) -> Result<NaiveDate, CliError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| {
        CliError::usage(format!("invalid --today '{value}'")).with_hint("expected YYYY-MM-DD")
    })
}

fn parse_as_of(value: &str) -> Result<NaiveDateTime, CliError> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).map_err(|_| {
        CliError::usage(format!("invalid --as-of '{value}'")).with_hint("expected 'YYYY/MM/DD HH:MM'")
    })
}

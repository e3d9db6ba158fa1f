use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde_json::{Map, Value, json};
use strata_analysis::{DriftMonitor, LocalJob, MonitorOutcome};
use strata_config::{
    StrataConfig, config_path, ensure_workspace_config, load_workspace_config, sqlite_path,
    validate_config,
};
use strata_core::rfc3339_from_millis;
use strata_observe::alert_sink_from_config;
use strata_store::SqliteStore;

use crate::cli::{Commands, MetricsArgs, RollbacksArgs, RunArgs};

const MAX_LIST_LIMIT: u32 = 500;

/// `init` runs on the raw path since the workspace may not exist yet.
pub fn run_command(workspace: &Path, command: &Commands, out: &mut dyn Write) -> Result<()> {
    match command {
        Commands::Init => run_init(workspace, out),
        Commands::Run(args) => {
            let (workspace, config) = load_config(workspace)?;
            run_monitor(&workspace, &config, args, out)
        }
        Commands::Metrics(args) => {
            let (workspace, config) = load_config(workspace)?;
            run_metrics(&workspace, &config, args, out)
        }
        Commands::Rollbacks(args) => {
            let (workspace, config) = load_config(workspace)?;
            run_rollbacks(&workspace, &config, args, out)
        }
    }
}

/// Resolves the workspace root and loads its config with process env overrides applied.
pub fn load_config(workspace: &Path) -> Result<(PathBuf, StrataConfig)> {
    let workspace = workspace
        .canonicalize()
        .with_context(|| format!("failed to resolve workspace path {}", workspace.display()))?;
    let mut config = load_workspace_config(&workspace).with_context(|| {
        format!(
            "failed to load workspace config at {}",
            config_path(&workspace).display()
        )
    })?;
    config
        .monitor
        .apply_process_env()
        .context("invalid STRATA_* environment override")?;
    for warning in validate_config(&config) {
        tracing::warn!(code = warning.code, "{}", warning.message);
    }
    Ok((workspace, config))
}

pub fn open_store(workspace: &Path, config: &StrataConfig) -> Result<SqliteStore> {
    let path = sqlite_path(workspace, config);
    SqliteStore::open(&path)
        .with_context(|| format!("failed to open drift store at {}", path.display()))
}

pub fn run_init(workspace: &Path, out: &mut dyn Write) -> Result<()> {
    fs::create_dir_all(workspace)
        .with_context(|| format!("failed to create workspace {}", workspace.display()))?;
    let config = ensure_workspace_config(workspace).with_context(|| {
        format!(
            "failed to create workspace config at {}",
            config_path(workspace).display()
        )
    })?;
    let store = open_store(workspace, &config)?;
    writeln!(out, "config: {}", config_path(workspace).display())?;
    writeln!(out, "store: {}", store.sqlite_path().display())?;
    Ok(())
}

pub fn parse_payload(args: &RunArgs) -> Result<Map<String, Value>> {
    let raw = match (args.payload.as_deref(), args.payload_file.as_deref()) {
        (Some(inline), _) => inline.to_owned(),
        (None, Some(path)) => fs::read_to_string(path)
            .with_context(|| format!("failed to read payload file {}", path.display()))?,
        (None, None) => return Ok(Map::new()),
    };
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(&raw).context("payload is not valid JSON")? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => bail!("payload must be a JSON object, got {other}"),
    }
}

pub fn build_monitor(workspace: &Path, config: &StrataConfig) -> Result<DriftMonitor> {
    let store = Rc::new(open_store(workspace, config)?);
    let sink = alert_sink_from_config(workspace, &config.alerts);
    Ok(DriftMonitor::new(config.monitor.clone())
        .with_sqlite(store)
        .with_alert_sink(Rc::new(sink)))
}

/// Runs one monitor pass and prints the job result as JSON.
pub fn run_once(
    monitor: &DriftMonitor,
    payload: Map<String, Value>,
    out: &mut dyn Write,
) -> Result<MonitorOutcome> {
    let job = LocalJob::new(payload);
    let outcome = monitor
        .run_job(&job)
        .context("structural drift monitor run failed")?;
    serde_json::to_writer_pretty(&mut *out, &outcome.to_value())?;
    writeln!(out)?;
    Ok(outcome)
}

pub fn run_monitor(
    workspace: &Path,
    config: &StrataConfig,
    args: &RunArgs,
    out: &mut dyn Write,
) -> Result<()> {
    let payload = parse_payload(args)?;
    let monitor = build_monitor(workspace, config)?;

    let Some(interval_secs) = args.interval_secs else {
        run_once(&monitor, payload, out)?;
        return Ok(());
    };

    let interval = Duration::from_secs(interval_secs.max(1));
    tracing::info!(interval_secs = interval.as_secs(), "drift monitor loop started");
    loop {
        if let Err(err) = run_once(&monitor, payload.clone(), out) {
            let message = format!("{err:#}");
            tracing::error!(error = %message, "drift monitor pass failed");
        }
        std::thread::sleep(interval);
    }
}

pub fn run_metrics(
    workspace: &Path,
    config: &StrataConfig,
    args: &MetricsArgs,
    out: &mut dyn Write,
) -> Result<()> {
    let store = open_store(workspace, config)?;
    let rows = if args.latest {
        store.latest_drift_metrics(&args.graph_version)?
    } else {
        store.list_drift_metrics(&args.graph_version, args.limit.clamp(1, MAX_LIST_LIMIT))?
    };
    let rows = rows
        .into_iter()
        .map(|row| {
            json!({
                "id": row.id,
                "created_at": rfc3339_from_millis(row.created_at),
                "graph_version": row.record.graph_version,
                "metric_name": row.record.metric_name,
                "window_start": rfc3339_from_millis(row.record.window_start),
                "window_end": rfc3339_from_millis(row.record.window_end),
                "value": row.record.value,
                "threshold": row.record.threshold,
                "status": row.record.status.as_str(),
                "metadata": row.record.metadata,
            })
        })
        .collect::<Vec<_>>();
    serde_json::to_writer_pretty(&mut *out, &rows)?;
    writeln!(out)?;
    Ok(())
}

pub fn run_rollbacks(
    workspace: &Path,
    config: &StrataConfig,
    args: &RollbacksArgs,
    out: &mut dyn Write,
) -> Result<()> {
    let store = open_store(workspace, config)?;
    let events = store
        .list_rollback_events(&args.graph_version, args.limit.clamp(1, MAX_LIST_LIMIT))?
        .into_iter()
        .map(|event| {
            json!({
                "id": event.id,
                "graph_version_from": event.graph_version_from,
                "trigger": event.trigger,
                "status": event.status,
                "notes": event.notes,
                "created_at": rfc3339_from_millis(event.created_at),
            })
        })
        .collect::<Vec<_>>();
    serde_json::to_writer_pretty(&mut *out, &events)?;
    writeln!(out)?;
    Ok(())
}

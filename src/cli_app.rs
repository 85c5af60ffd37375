//! Top-level CLI definition and dispatch.

use std::fs::File;
use std::io::{self, BufRead, BufReader, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use san_workload_monitor::core::config::Config;
use san_workload_monitor::daemon::ingest::{
    EventSource, decode_line, for_each_record, source_exists,
};
use san_workload_monitor::daemon::loop_main::{DaemonArgs as LoopArgs, MonitorDaemon};
use san_workload_monitor::daemon::publisher::{PublishedState, read_state};
use san_workload_monitor::monitor::engine::WorkloadEngine;
use san_workload_monitor::monitor::event::RawEvent;
use san_workload_monitor::monitor::path_stats::PathStatistics;
use san_workload_monitor::monitor::snapshot::{
    EngineCounters, PathReport, SummaryStats, WorkloadSnapshot,
};
use san_workload_monitor::monitor::window::TimeWindow;

/// SAN Workload Monitor: windowed load and burst detection for file-system events.
#[derive(Debug, Parser)]
#[command(
    name = "swm",
    author,
    version,
    about = "SAN Workload Monitor - windowed file-system activity analysis",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Run the monitoring daemon over one or more JSONL event streams.
    Daemon(DaemonArgs),
    /// Replay a recorded JSONL event file and report the result.
    Replay(ReplayArgs),
    /// Show the state published by a running daemon.
    Status(StatusArgs),
    /// View and validate configuration.
    Config(ConfigArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args)]
struct DaemonArgs {
    /// Event sources: file paths or `-` for stdin.
    #[arg(value_name = "SOURCE", default_value = "-")]
    sources: Vec<String>,
    /// Keep running after every source has ended.
    #[arg(long)]
    linger: bool,
}

#[derive(Debug, Clone, Args)]
struct ReplayArgs {
    /// JSONL file of raw events (`-` for stdin).
    #[arg(value_name = "FILE")]
    file: String,
    /// Closed windows to include in the report and summary.
    #[arg(long, default_value_t = 10, value_name = "N")]
    history: usize,
    /// Report statistics for this path (repeatable).
    #[arg(long = "path", value_name = "PATH")]
    paths: Vec<String>,
    /// Leave the final window open instead of closing it at its end.
    #[arg(long)]
    keep_open: bool,
}

#[derive(Debug, Clone, Args)]
struct StatusArgs {
    /// Override the state file location.
    #[arg(long, value_name = "PATH")]
    state_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print the config file path.
    Path,
    /// Print the effective configuration.
    Show,
    /// Validate the configuration.
    Validate,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input at runtime.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Json(_) => 3,
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color || !io::stdout().is_terminal() {
        control::set_override(false);
    }

    match &cli.command {
        Command::Daemon(args) => run_daemon(cli, args),
        Command::Replay(args) => run_replay(cli, args),
        Command::Status(args) => run_status(cli, args),
        Command::Config(args) => run_config(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config, CliError> {
    Config::load(cli.config.as_deref()).map_err(|e| CliError::Runtime(e.to_string()))
}

// ──────────────────── daemon ────────────────────

fn run_daemon(cli: &Cli, args: &DaemonArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    if let Some(missing) = args.sources.iter().find(|s| !source_exists(s.as_str())) {
        return Err(CliError::User(format!("event source not found: {missing}")));
    }
    let sources: Vec<EventSource> = args.sources.iter().map(|s| EventSource::parse(s)).collect();
    if sources.iter().filter(|s| **s == EventSource::Stdin).count() > 1 {
        return Err(CliError::User("stdin (`-`) may be given only once".to_string()));
    }

    let loop_args = LoopArgs {
        sources,
        linger: args.linger,
    };
    let daemon =
        MonitorDaemon::init(config, loop_args).map_err(|e| CliError::Runtime(e.to_string()))?;
    let report = daemon.run().map_err(|e| CliError::Runtime(e.to_string()))?;

    match output_mode(cli) {
        OutputMode::Human => {
            println!(
                "swm daemon stopped: {} after {}s",
                report.reason.as_str(),
                report.uptime_secs
            );
            for source in &report.sources {
                println!(
                    "  {:<30} lines={} queued={} undecodable={}",
                    source.source, source.lines, source.queued, source.undecodable
                );
            }
            print_counters(&report.counters);
        }
        OutputMode::Json => {
            let sources: Vec<Value> = report
                .sources
                .iter()
                .map(|s| {
                    json!({
                        "source": s.source,
                        "lines": s.lines,
                        "queued": s.queued,
                        "undecodable": s.undecodable,
                    })
                })
                .collect();
            let payload = json!({
                "command": "daemon",
                "reason": report.reason.as_str(),
                "uptime_secs": report.uptime_secs,
                "sources": sources,
                "writer_processed": report.writer.map(|w| w.processed),
                "counters": serde_json::to_value(report.counters)?,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

// ──────────────────── replay ────────────────────

/// A decoded replay input: raw events in file order plus the undecodable line count.
struct ReplayInput {
    events: Vec<RawEvent>,
    undecodable: u64,
}

fn read_replay_input(file: &str) -> Result<ReplayInput, CliError> {
    let reader: Box<dyn BufRead> = if file == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let handle = File::open(file)
            .map_err(|e| CliError::User(format!("cannot open {file}: {e}")))?;
        Box::new(BufReader::new(handle))
    };

    let mut input = ReplayInput {
        events: Vec::new(),
        undecodable: 0,
    };
    for_each_record(reader, |line| match decode_line(line) {
        None => {}
        Some(Ok(raw)) => input.events.push(raw),
        Some(Err(_)) => input.undecodable += 1,
    })
    .map_err(|e| CliError::Runtime(format!("read {file}: {e}")))?;
    Ok(input)
}

/// Result of feeding a recorded stream through a fresh engine.
struct ReplayOutcome {
    snapshot: WorkloadSnapshot,
    summary: SummaryStats,
    reports: Vec<(String, Option<PathReport>)>,
}

fn replay(config: &Config, input: &ReplayInput, args: &ReplayArgs) -> ReplayOutcome {
    let first_ts = input
        .events
        .iter()
        .filter_map(|raw| raw.timestamp)
        .find(|ts| ts.is_finite() && *ts >= 0.0);
    let engine = Arc::new(match first_ts {
        Some(ts) => WorkloadEngine::starting_at(config, ts),
        None => WorkloadEngine::new(config),
    });

    engine.start();
    for _ in 0..input.undecodable {
        engine.record_malformed();
    }
    for raw in &input.events {
        // Rejections are already counted by the engine.
        let _ = engine.notify(raw);
    }
    if !args.keep_open {
        let open = engine.snapshot_with_history(0).current_window;
        engine.tick_at(open.end_time());
    }
    engine.stop();

    let reports = args
        .paths
        .iter()
        .map(|path| (path.clone(), engine.path_report(path)))
        .collect();
    ReplayOutcome {
        snapshot: engine.snapshot_with_history(args.history),
        summary: engine.summary(args.history),
        reports,
    }
}

fn run_replay(cli: &Cli, args: &ReplayArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let input = read_replay_input(&args.file)?;
    let outcome = replay(&config, &input, args);

    match output_mode(cli) {
        OutputMode::Human => {
            println!("Replay of {}", args.file);
            println!(
                "  Events: {} decoded, {} undecodable",
                input.events.len(),
                input.undecodable
            );
            print_snapshot(&outcome.snapshot);
            print_summary(&outcome.summary);
            for (path, report) in &outcome.reports {
                print_path_report(path, report.as_ref());
            }
        }
        OutputMode::Json => {
            let reports: Vec<Value> = outcome
                .reports
                .iter()
                .map(|(path, report)| json!({ "path": path, "report": report }))
                .collect();
            let payload = json!({
                "command": "replay",
                "file": args.file,
                "decoded": input.events.len(),
                "undecodable": input.undecodable,
                "snapshot": serde_json::to_value(&outcome.snapshot)?,
                "summary": serde_json::to_value(&outcome.summary)?,
                "paths": reports,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

// ──────────────────── status ────────────────────

fn run_status(cli: &Cli, args: &StatusArgs) -> Result<(), CliError> {
    let state_file = match &args.state_file {
        Some(path) => path.clone(),
        None => load_config(cli)?.paths.state_file,
    };
    let state = read_state(&state_file).map_err(|e| {
        CliError::Runtime(format!(
            "no daemon state at {}: {e}",
            state_file.display()
        ))
    })?;

    match output_mode(cli) {
        OutputMode::Human => print_status(&state),
        OutputMode::Json => {
            let payload = json!({
                "command": "status",
                "stale": state.is_stale(),
                "state": serde_json::to_value(&state)?,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn print_status(state: &PublishedState) {
    println!("swm {} (pid {})", state.version, state.pid);
    println!("  Started: {}", state.started_at);
    println!("  Uptime: {}s", state.uptime_seconds);
    if state.is_stale() {
        println!(
            "  Updated: {} {}",
            state.last_updated,
            "(stale: daemon may be stalled)".yellow()
        );
    } else {
        println!("  Updated: {}", state.last_updated);
    }
    print_snapshot(&state.snapshot);
    print_summary(&state.summary);
    if state.dropped_log_events > 0 {
        println!("\nActivity log events dropped: {}", state.dropped_log_events);
    }
}

// ──────────────────── config ────────────────────

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    match &args.command {
        None | Some(ConfigCommand::Path) => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            let exists = path.exists();

            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{}", path.display());
                    if !exists {
                        println!("  (file does not exist; defaults will be used)");
                    }
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config path",
                        "path": path.to_string_lossy(),
                        "exists": exists,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Show) => {
            let config = load_config(cli)?;
            match output_mode(cli) {
                OutputMode::Human => {
                    let toml_str = toml::to_string_pretty(&config)
                        .map_err(|e| CliError::Runtime(format!("serialize config: {e}")))?;
                    println!("{toml_str}");
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config show",
                        "config": serde_json::to_value(&config)?,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Validate) => match Config::load(cli.config.as_deref()) {
            Ok(config) => {
                let hash = config
                    .stable_hash()
                    .map_err(|e| CliError::Runtime(e.to_string()))?;
                match output_mode(cli) {
                    OutputMode::Human => {
                        println!("Configuration is valid.");
                        println!("  Source: {}", config.paths.config_file.display());
                        println!("  Hash: {hash}");
                    }
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": true,
                            "path": config.paths.config_file.to_string_lossy(),
                            "hash": hash,
                        });
                        write_json_line(&payload)?;
                    }
                }
                Ok(())
            }
            Err(e) => {
                match output_mode(cli) {
                    OutputMode::Human => eprintln!("Configuration is INVALID: {e}"),
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": false,
                            "code": e.code(),
                            "error": e.to_string(),
                        });
                        write_json_line(&payload)?;
                    }
                }
                Err(CliError::User(format!("invalid config: {e}")))
            }
        },
    }
}

// ──────────────────── human rendering ────────────────────

fn window_flags(window: &TimeWindow) -> String {
    let mut flags = Vec::new();
    if window.is_high_load {
        flags.push("HIGH".red().bold().to_string());
    }
    if window.is_burst {
        flags.push("BURST".yellow().bold().to_string());
    }
    if flags.is_empty() {
        "-".to_string()
    } else {
        flags.join(" ")
    }
}

fn format_epoch(ts: f64) -> String {
    #[allow(clippy::cast_possible_truncation)]
    let millis = (ts * 1_000.0).round() as i64;
    chrono::DateTime::from_timestamp_millis(millis).map_or_else(
        || format!("{ts:.3}"),
        |dt| dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
    )
}

fn print_window_row(window: &TimeWindow) {
    let c = &window.counts;
    println!(
        "  {:<24}  {:>7}  {:>7}  {:>7}  {:>6}  {:>6}  {:>6}  {}",
        format_epoch(window.start_time),
        c.read_count,
        c.write_count,
        c.modification_count,
        c.create_count,
        c.delete_count,
        c.rename_count,
        window_flags(window),
    );
}

fn print_window_header() {
    println!(
        "  {:<24}  {:>7}  {:>7}  {:>7}  {:>6}  {:>6}  {:>6}  Flags",
        "Window start", "Reads", "Writes", "Mods", "Create", "Delete", "Rename"
    );
    println!("  {}", "-".repeat(86));
}

fn print_snapshot(snapshot: &WorkloadSnapshot) {
    let state = if snapshot.monitoring_active {
        "active".green().to_string()
    } else {
        "stopped".dimmed().to_string()
    };
    println!("\nMonitoring: {state}");
    println!(
        "  Window: {}s  Paths tracked: {}",
        snapshot.current_window.duration_seconds, snapshot.total_paths_monitored
    );

    println!("\nCurrent Window:");
    print_window_header();
    print_window_row(&snapshot.current_window);
    if let Some(dominant) = &snapshot.current_window.dominant_path {
        println!("  dominant path: {dominant}");
    }

    if !snapshot.recent_history.is_empty() {
        println!("\nRecent Windows:");
        print_window_header();
        for window in &snapshot.recent_history {
            print_window_row(window);
        }
    }

    if snapshot.hotspot_paths.is_empty() {
        println!("\nHotspots: none");
    } else {
        println!("\nHotspots:");
        for stats in &snapshot.hotspot_paths {
            print_hotspot(stats);
        }
    }
    print_counters(&snapshot.counters);
}

fn print_hotspot(stats: &PathStatistics) {
    let mut flags = Vec::new();
    if stats.is_high_load {
        flags.push("high-load");
    }
    if stats.is_burst {
        flags.push("burst");
    }
    println!(
        "  {:<40}  reads={:<7} writes={:<7} last={:<7} [{}]",
        stats.path,
        stats.total_reads,
        stats.total_writes,
        stats.last_operation(),
        flags.join(",").red(),
    );
}

fn print_counters(counters: &EngineCounters) {
    println!("\nCounters:");
    println!("  Accepted: {}", counters.events_accepted);
    println!("  Windows closed: {}", counters.windows_closed);
    let dropped = counters.dropped_total();
    if dropped > 0 {
        println!(
            "  Dropped: {} (malformed={}, late={}, out-of-scope={}, overflow={})",
            dropped.to_string().yellow(),
            counters.dropped_malformed,
            counters.dropped_late,
            counters.out_of_scope,
            counters.queue_overflow,
        );
    } else {
        println!("  Dropped: 0");
    }
    if counters.paths_evicted > 0 {
        println!("  Paths evicted: {}", counters.paths_evicted);
    }
}

fn print_summary(summary: &SummaryStats) {
    println!("\nSummary (last {} windows):", summary.windows_analyzed);
    println!(
        "  Totals: reads={} writes={} mods={} creates={} deletes={} renames={}",
        summary.total_reads,
        summary.total_writes,
        summary.total_modifications,
        summary.total_creates,
        summary.total_deletes,
        summary.total_renames,
    );
    println!(
        "  Per window: reads={:.1} writes={:.1} mods={:.1}",
        summary.avg_reads_per_window,
        summary.avg_writes_per_window,
        summary.avg_modifications_per_window,
    );
    println!(
        "  High-load windows: {}  Burst windows: {}  Hotspots: {}  Paths: {}",
        summary.high_load_windows,
        summary.burst_windows,
        summary.hotspot_count,
        summary.paths_monitored,
    );
}

fn print_path_report(path: &str, report: Option<&PathReport>) {
    println!("\nPath {path}:");
    let Some(report) = report else {
        println!("  not tracked");
        return;
    };
    let s = &report.stats;
    println!(
        "  Lifetime: reads={} writes={} mods={} creates={} deletes={} renames={}",
        s.total_reads,
        s.total_writes,
        s.total_modifications,
        s.total_creates,
        s.total_deletes,
        s.total_renames,
    );
    println!(
        "  Last: {} at {}{}",
        s.last_operation(),
        format_epoch(s.last_accessed),
        if s.is_directory { " (directory)" } else { "" }
    );
    let c = &report.current_window;
    println!(
        "  Open window {}: reads={} writes={} mods={}",
        format_epoch(report.window_start),
        c.read_count,
        c.write_count,
        c.modification_count,
    );
    if s.is_hotspot() {
        println!("  {}", "HOTSPOT".red().bold());
    }
}

// ──────────────────── output plumbing ────────────────────

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("SWM_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}

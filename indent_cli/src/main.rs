mod acquire;
mod cli;
mod error_fmt;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::{Result, WrapErr};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::acquire::{LinkOptions, connect, csv_target, run_moves, summary_json, summary_text};
use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    if !cli.json {
        let _ = color_eyre::install();
    }

    let code = match real_main(cli) {
        Ok(()) => 0,
        Err(err) => {
            tracing::debug!(error = ?err, "command failed");
            if JSON_MODE.get().copied().unwrap_or(false) {
                eprintln!("{}", format_error_json(&err));
            } else {
                eprintln!("{}", humanize(&err));
            }
            exit_code_for_error(&err)
        }
    };
    std::process::exit(code);
}

fn real_main(cli: Cli) -> Result<()> {
    let cfg = indent_config::load_file(&cli.config)?;
    let level = cli
        .log_level
        .clone()
        .or_else(|| cfg.logging.level.clone())
        .unwrap_or_else(|| "info".to_string());
    init_tracing(cli.json, &level, &cfg.logging)?;

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);
        }) {
            tracing::warn!(error = %e, "failed to install Ctrl-C handler");
        }
    }

    let mut opts = LinkOptions {
        sim: cli.sim,
        ..LinkOptions::default()
    };
    match cli.cmd {
        Commands::Tare => {
            let mut c = connect(&cfg, &opts, running)?;
            c.tare()?;
            c.shutdown()?;
            report(cli.json, "tared", serde_json::json!({ "command": "tare" }));
        }
        Commands::Calibrate { factor } => {
            let factor = factor.unwrap_or(cfg.device.calibration_factor);
            let mut c = connect(&cfg, &opts, running)?;
            c.set_calibration(factor)?;
            c.shutdown()?;
            report(
                cli.json,
                &format!("calibration factor {factor} sent"),
                serde_json::json!({ "command": "calibrate", "factor": factor }),
            );
        }
        Commands::Move { mm, csv } => {
            opts.calibrate = true;
            opts.csv = csv;
            let csv = csv_target(&cfg, &opts);
            let c = connect(&cfg, &opts, running)?;
            let signs = c.signs();
            let summary = run_moves(c, &[mm], signs)?;
            emit_summary(cli.json, &summary, csv.as_deref());
        }
        Commands::Run {
            moves,
            csv,
            no_display,
        } => {
            opts.calibrate = true;
            opts.csv = csv;
            opts.display = !no_display && !cli.json;
            let csv = csv_target(&cfg, &opts);
            let c = connect(&cfg, &opts, running)?;
            let signs = c.signs();
            let summary = run_moves(c, &moves, signs)?;
            emit_summary(cli.json, &summary, csv.as_deref());
        }
        Commands::Stop => {
            // Shutdown sends the stop command before closing.
            let mut c = connect(&cfg, &opts, running)?;
            c.shutdown()?;
            report(cli.json, "motor stopped", serde_json::json!({ "command": "stop" }));
        }
        Commands::SelfCheck => {
            let mut c = connect(&cfg, &opts, running)?;
            c.shutdown().wrap_err("self-check")?;
            let link = if cli.sim { "sim" } else { cfg.serial.port.as_str() };
            report(
                cli.json,
                &format!("OK ({link})"),
                serde_json::json!({ "command": "self-check", "ok": true, "link": link }),
            );
        }
    }
    Ok(())
}

fn report(json: bool, text: &str, value: serde_json::Value) {
    if json {
        println!("{value}");
    } else {
        println!("{text}");
    }
}

fn emit_summary(json: bool, summary: &indent_core::PlanSummary, csv: Option<&Path>) {
    if json {
        println!("{}", summary_json(summary, csv));
    } else {
        println!("{}", summary_text(summary));
        if let Some(p) = csv {
            println!("trace appended to {}", p.display());
        }
    }
}

/// Console layer on stderr (pretty or JSON) plus an optional JSON-lines file layer.
fn init_tracing(json: bool, level: &str, logging: &indent_config::Logging) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .wrap_err_with(|| format!("invalid log level {level:?}"))?;

    let console = if json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let file_layer = match logging.file.as_deref() {
        Some(file) => {
            let path = Path::new(file);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre::eyre!("logging.file has no file name: {file}"))?;
            let appender = match logging.rotation.as_deref().unwrap_or("never") {
                "never" => tracing_appender::rolling::never(dir, name),
                "daily" => tracing_appender::rolling::daily(dir, name),
                "hourly" => tracing_appender::rolling::hourly(dir, name),
                other => eyre::bail!("logging.rotation must be never, daily or hourly (got {other})"),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            Some(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| eyre::eyre!("init tracing: {e}"))
}

//! `knowrep-cli` – Knowledge Store Command Line Interface
//!
//! This binary opens the robot's long-term knowledge store and lets an
//! operator inspect it.  It:
//!
//! 1. Checks for `~/.knowrep/config.toml`; runs a **First-Run Wizard** when the
//!    file is absent.
//! 2. Opens the SQLite knowledge database named by the config.
//! 3. Drops the user into an **interactive REPL** with slash-commands
//!    (`/concepts`, `/maps`, `/attrs`, `/sql`, `/help`, …).
//! 4. Intercepts **Ctrl-C** so the REPL exits after the current command.

mod config;
mod repl;

use colored::Colorize;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, warn};

use knowrep_memory::LongTermMemory;

fn main() {
    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG selects the filter (default "info"); KNOWREP_LOG_FORMAT=json
    // switches to newline-delimited JSON.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    if std::env::var("KNOWREP_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .compact()
            .init();
    }

    print_banner();

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – closing the knowledge store …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    // ── Configuration ─────────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => run_first_run_wizard(),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };

    // ── Knowledge store ───────────────────────────────────────────────────
    let db_path = Path::new(&cfg.database_path);
    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
        && let Err(e) = std::fs::create_dir_all(parent) {
            warn!(error = %e, dir = %parent.display(), "Failed to create database directory");
        }

    let ltm = match LongTermMemory::open_with(db_path, cfg.store_options()) {
        Ok(ltm) => ltm,
        Err(e) => {
            error!(error = %e, path = %cfg.database_path, "failed to open knowledge store");
            println!("{}: {}", "Cannot open knowledge store".red().bold(), e);
            std::process::exit(1);
        }
    };

    let entities = ltm.get_all_entities().map(|e| e.len()).unwrap_or(0);
    println!(
        "  Knowledge store {} ({} entities)",
        cfg.database_path.bold(),
        entities
    );
    println!();
    println!(
        "  Type {} for a list of commands.\n",
        "/help".bold().cyan()
    );

    // ── Interactive REPL ──────────────────────────────────────────────────
    repl::run(&ltm, shutdown);
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() -> config::Config {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║      knowrep First-Run Wizard        ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's set up the knowledge store.\n");

    let mut cfg = config::Config::default();
    config::apply_env_overrides(&mut cfg);

    cfg.database_path = repl::prompt_str(
        &format!("  Database path [{}]: ", cfg.database_path),
        &cfg.database_path,
    );

    let timeout = repl::prompt_str(
        &format!("  Busy timeout in ms [{}]: ", cfg.busy_timeout_ms),
        &cfg.busy_timeout_ms.to_string(),
    );
    if let Ok(ms) = timeout.parse::<u64>() {
        cfg.busy_timeout_ms = ms;
    }

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   __                                  "#.bold().cyan());
    println!("{}", r#"  / /__ ___  ___ _    _________ ___    "#.bold().cyan());
    println!("{}", r#" /  '_// _ \/ _ \ |/|/ / __/ -_) _ \   "#.bold().cyan());
    println!("{}", r#"/_/\_\/_//_/\___/__,__/_/  \__/ .__/   "#.bold().cyan());
    println!("{}", r#"                             /_/       "#.bold().cyan());
    println!();
    println!("  {} {}",
        "knowrep".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Long-Term Knowledge Store for Robots");
    println!();
}

use std::path::Path;

use chrono::Local;
use notify::Watcher;
use tracing::{info, warn};

use crate::cli::args::{
    ConfigAction, ConfigArgs, EvalArgs, InitArgs, OutputFormat, RunArgs, ScratchAction,
    ScratchArgs, WatchArgs,
};
use crate::config::loader::get_config_path;
use crate::config::types::PlaypenConfig;
use crate::error::{PlaypenError, Result};
use crate::playground::Playground;
use crate::session::ScratchStore;

// ============================================================================
// Execution Commands
// ============================================================================

/// Execute a script file once
pub async fn run(args: RunArgs, config: PlaypenConfig, format: OutputFormat) -> Result<()> {
    info!(file = %args.file.display(), "Running script");

    let text = read_script(&args.file).await?;
    let playground = Playground::new(&config, Some(ScratchStore::new()));
    playground.set_script(text);
    playground.run_now().await?;

    print_console(&playground.console_lines(), &format);
    Ok(())
}

/// Execute an inline snippet once
pub async fn eval(args: EvalArgs, config: PlaypenConfig, format: OutputFormat) -> Result<()> {
    info!("Evaluating inline snippet");

    let playground = Playground::new(&config, Some(ScratchStore::new()));
    playground.set_script(args.code);
    playground.run_now().await?;

    print_console(&playground.console_lines(), &format);
    Ok(())
}

/// Watch a script file and re-run it on every change
pub async fn watch(args: WatchArgs, mut config: PlaypenConfig) -> Result<()> {
    if let Some(debounce_ms) = args.debounce_ms {
        config.trigger.debounce_ms = debounce_ms;
    }

    let text = read_script(&args.file).await?;
    let playground = Playground::new(&config, Some(ScratchStore::new()));
    playground.set_script(text);
    playground.run_now().await?;
    print_run_banner();
    print_console(&playground.console_lines(), &OutputFormat::Text);

    // File changes are the edit stream; the playground debounces them
    let (changes_tx, mut changes_rx) = tokio::sync::mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(
        move |result: std::result::Result<notify::Event, notify::Error>| match result {
            Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                let _ = changes_tx.send(());
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "file watcher error"),
        },
    )
    .map_err(|e| PlaypenError::Watch(e.to_string()))?;
    watcher
        .watch(&args.file, notify::RecursiveMode::NonRecursive)
        .map_err(|e| PlaypenError::Watch(e.to_string()))?;

    info!(path = %args.file.display(), "Watching for changes");

    let mut runs = playground.runs();
    loop {
        tokio::select! {
            change = changes_rx.recv() => {
                if change.is_none() {
                    break;
                }
                match tokio::fs::read_to_string(&args.file).await {
                    Ok(text) => playground.set_script(text),
                    Err(e) => warn!(error = %e, "failed to re-read script"),
                }
            }
            changed = runs.changed() => {
                if changed.is_err() {
                    break;
                }
                print_run_banner();
                print_console(&playground.console_lines(), &OutputFormat::Text);
            }
        }
    }

    Ok(())
}

// ============================================================================
// Scratch Commands
// ============================================================================

pub async fn scratch(args: ScratchArgs, format: OutputFormat) -> Result<()> {
    let store = ScratchStore::new();

    match args.action {
        ScratchAction::Show => match store.load().await {
            Some(text) => match format {
                OutputFormat::Text => println!("{}", text),
                OutputFormat::Json => println!("{}", serde_json::json!({ "text": text })),
            },
            None => match format {
                OutputFormat::Text => println!("No scratch script saved"),
                OutputFormat::Json => println!("{}", serde_json::json!({ "text": null })),
            },
        },
        ScratchAction::Path => {
            println!("{}", store.path().display());
        }
        ScratchAction::Clear => {
            store.clear().await?;
            println!("Scratch script cleared");
        }
    }

    Ok(())
}

// ============================================================================
// Config Commands
// ============================================================================

pub async fn init(args: InitArgs) -> Result<()> {
    let config_path = get_config_path();

    if config_path.exists() && !args.force {
        println!("Configuration already exists at: {}", config_path.display());
        println!("Use --force to overwrite");
        return Ok(());
    }

    // Create parent directories if needed
    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Write default configuration
    let default_config = PlaypenConfig::default();
    let toml_str = toml::to_string_pretty(&default_config)
        .map_err(|e| PlaypenError::Config(e.to_string()))?;

    std::fs::write(&config_path, toml_str)?;

    println!("Created configuration at: {}", config_path.display());
    println!("\nQuick start:");
    println!("  # Run an inline snippet");
    println!("  playpen eval \"console.log(1 + 1)\"");
    println!();
    println!("  # Run a script file");
    println!("  playpen run script.js");
    println!();
    println!("  # Re-run automatically while you edit");
    println!("  playpen watch script.js");

    Ok(())
}

pub async fn config(args: ConfigArgs, config: PlaypenConfig) -> Result<()> {
    match args.action {
        ConfigAction::Show => {
            let toml_str = toml::to_string_pretty(&config)
                .map_err(|e| PlaypenError::Config(e.to_string()))?;
            println!("{}", toml_str);
        }
        ConfigAction::Path => {
            println!("{}", get_config_path().display());
        }
    }
    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

async fn read_script(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| PlaypenError::ScriptRead {
            path: path.display().to_string(),
            source,
        })
}

fn print_console(lines: &[String], format: &OutputFormat) {
    match format {
        OutputFormat::Text => {
            for line in lines {
                println!("{}", line);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!({ "lines": lines }));
        }
    }
}

fn print_run_banner() {
    println!("--- {} ---", Local::now().format("%H:%M:%S"));
}

use actix::prelude::*;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use clap::{Parser, Subcommand};
use harvest_client::{
    Browser, ClientError, Command, ControllerActor, JobFamily, Response, RowStore, Settings, StoreError, dispatch, open_store,
    run_console, start_session, write_json,
};
use harvest_core::{CoreError, load_config, logging};
use log::{error, info};
use serde::Serialize;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::io::BufReader;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./harvest.toml when present).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides `global.log_level`.
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    action: Option<Action>,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Read commands from stdin, one per line (default).
    Console,
    /// Collect contacts from the active tab rightwards.
    Collect,
    /// Print every open resume preview tab to PDF.
    ExportOpen,
    /// Download the resume in the active tab.
    DownloadCurrent,
    /// Download resumes from the active tab rightwards.
    DownloadRight,
    /// Collected contact rows.
    Rows {
        #[command(subcommand)]
        action: RowsAction,
    },
    /// Saved job settings.
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand, Debug)]
enum RowsAction {
    /// Print the rows as TSV and copy them to the terminal clipboard.
    Export,
    Clear,
    Count,
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    Show,
    /// Merge a JSON object such as `{"filenamePrefix":"PM"}` into the settings.
    Set { json: String },
}

#[derive(Error, Debug)]
enum AppError {
    #[error(transparent)]
    Config(#[from] CoreError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Console I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Rejected(String),
}

fn print_json<T: Serialize>(value: &T) {
    if let Err(e) = write_json(&mut std::io::stdout(), value) {
        error!("Could not write response: {}", e);
    }
}

/// OSC 52: asks the terminal to put `text` on the clipboard.
fn copy_to_terminal_clipboard(text: &str) {
    eprint!("\x1b]52;c;{}\x07", STANDARD.encode(text));
}

fn offline(action: Action, cfg: &harvest_core::Config) -> Result<(), AppError> {
    let kv = open_store(cfg);
    match action {
        Action::Rows { action } => {
            let rows = RowStore::new(kv);
            match action {
                RowsAction::Export => {
                    let text = rows.export_tsv()?;
                    if !text.is_empty() {
                        println!("{}", text);
                        if std::io::stderr().is_terminal() {
                            copy_to_terminal_clipboard(&text);
                        }
                    }
                    info!("Exported {} rows", rows.count()?);
                }
                RowsAction::Clear => {
                    rows.clear()?;
                    print_json(&Response::ok());
                }
                RowsAction::Count => println!("{}", rows.count()?),
            }
        }
        Action::Settings { action } => {
            if let SettingsAction::Set { json } = action {
                let value: serde_json::Value = serde_json::from_str(&json)?;
                Settings::load(kv.as_ref()).merge(&value).save(kv.as_ref())?;
            }
            print_json(&Settings::load(kv.as_ref()));
        }
        _ => {}
    }
    Ok(())
}

async fn console(
    controller: &Addr<ControllerActor>,
    poll: Duration,
    until_done: bool,
) -> Result<(), AppError> {
    let input = BufReader::new(tokio::io::stdin());
    Ok(run_console(controller, input, &mut std::io::stdout(), poll, until_done).await?)
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let cfg = load_config(cli.config.as_deref())?;
    let level = cli.log_level.clone().unwrap_or_else(|| cfg.global.log_level.clone());
    if let Err(e) = logging::setup_logging(&level) {
        eprintln!("Warning: failed to initialise logging: {}", e);
    }

    let action = cli.action.unwrap_or(Action::Console);
    let (job, family) = match action {
        Action::Rows { .. } | Action::Settings { .. } => return offline(action, &cfg),
        Action::Console => (None, JobFamily::Export),
        Action::Collect => (Some(Command::CollectRight), JobFamily::Collect),
        Action::ExportOpen => (Some(Command::Start), JobFamily::Export),
        Action::DownloadCurrent => (Some(Command::DownloadCurrent), JobFamily::Export),
        Action::DownloadRight => (Some(Command::DownloadRight), JobFamily::Export),
    };

    let session = start_session(&cfg, family).await?;
    dispatch(&session.controller, Command::InitBadge).await;

    let result = match job {
        Some(command) => {
            let response = dispatch(&session.controller, command).await;
            print_json(&response);
            if let Response::Ack {
                ok: false,
                error: Some(e),
            } = response
            {
                Err(AppError::Rejected(e))
            } else {
                console(&session.controller, cfg.timing.status_poll, true).await
            }
        }
        None => {
            info!("Console ready; type a command such as getStatus, collectRight, pause or quit");
            console(&session.controller, cfg.timing.status_poll, false).await
        }
    };

    if let Err(e) = session.browser.disconnect().await {
        error!("Disconnect failed: {}", e);
    }
    result
}

#[actix::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

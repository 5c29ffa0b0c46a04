//! Console command protocol: one JSON object (or a bare command word) per
//! request, one JSON response.

use crate::controller::{
    ApplySettings, ClearRows, ControllerActor, CountRows, ExportRows, GetStatus, InitBadge, JobKind,
    Pause, Resume, StartJob, StatusSnapshot, Stop,
};
use crate::settings::Settings;
use actix::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "cmd", rename_all = "camelCase")]
pub enum Command {
    GetStatus,
    ApplySettings {
        #[serde(default)]
        settings: Option<Value>,
    },
    /// Export every open preview tab.
    Start,
    DownloadCurrent,
    DownloadRight,
    CollectRight,
    Pause,
    Resume,
    Stop,
    InitBadge,
    ExportRows,
    ClearRows,
    CountRows,
}

impl Command {
    /// Accepts `{"cmd":"pause"}` or just `pause`.
    pub fn parse(line: &str) -> Result<Command, String> {
        let line = line.trim();
        let value: Value = if line.starts_with('{') {
            serde_json::from_str(line).map_err(|e| format!("invalid JSON: {}", e))?
        } else {
            serde_json::json!({ "cmd": line })
        };
        serde_json::from_value(value).map_err(|e| format!("unknown command: {}", e))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Status(StatusSnapshot),
    Settings {
        ok: bool,
        settings: Settings,
    },
    Rows {
        ok: bool,
        count: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    Ack {
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl Response {
    pub fn ok() -> Self {
        Response::Ack { ok: true, error: None }
    }

    pub fn error(message: impl ToString) -> Self {
        Response::Ack {
            ok: false,
            error: Some(message.to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        match self {
            Response::Status(_) => true,
            Response::Settings { ok, .. } | Response::Rows { ok, .. } | Response::Ack { ok, .. } => *ok,
        }
    }
}

async fn start(controller: &Addr<ControllerActor>, kind: JobKind) -> Result<Response, MailboxError> {
    Ok(match controller.send(StartJob(kind)).await? {
        Ok(()) => Response::ok(),
        Err(e) => Response::error(e),
    })
}

async fn run(controller: &Addr<ControllerActor>, command: Command) -> Result<Response, MailboxError> {
    let response = match command {
        Command::GetStatus => Response::Status(controller.send(GetStatus).await?),
        Command::ApplySettings { settings } => match controller.send(ApplySettings(settings)).await? {
            Ok(settings) => Response::Settings { ok: true, settings },
            Err(e) => Response::error(e),
        },
        Command::Start => start(controller, JobKind::ExportOpen).await?,
        Command::DownloadCurrent => start(controller, JobKind::DownloadCurrent).await?,
        Command::DownloadRight => start(controller, JobKind::DownloadRight).await?,
        Command::CollectRight => start(controller, JobKind::CollectRight).await?,
        Command::Pause => {
            controller.send(Pause).await?;
            Response::ok()
        }
        Command::Resume => {
            controller.send(Resume).await?;
            Response::ok()
        }
        Command::Stop => {
            controller.send(Stop).await?;
            Response::ok()
        }
        Command::InitBadge => {
            controller.send(InitBadge).await?;
            Response::ok()
        }
        Command::ExportRows => match controller.send(ExportRows).await? {
            Ok((count, text)) => Response::Rows {
                ok: true,
                count,
                text: Some(text),
            },
            Err(e) => Response::error(e),
        },
        Command::ClearRows => match controller.send(ClearRows).await? {
            Ok(()) => Response::ok(),
            Err(e) => Response::error(e),
        },
        Command::CountRows => match controller.send(CountRows).await? {
            Ok(count) => Response::Rows {
                ok: true,
                count,
                text: None,
            },
            Err(e) => Response::error(e),
        },
    };
    Ok(response)
}

/// Runs one command. Every failure comes back as `{ok:false, error}`.
pub async fn dispatch(controller: &Addr<ControllerActor>, command: Command) -> Response {
    run(controller, command)
        .await
        .unwrap_or_else(|e| Response::error(format!("controller unavailable: {}", e)))
}

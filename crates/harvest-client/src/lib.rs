//! # Harvest Client
//!
//! The batch jobs run against vip.104.com.tw tabs in a user's Chrome:
//! contact collection into a de-duplicated row store, and resume export to
//! PDF. Ties together the connection stack (`harvest-transport`,
//! `harvest-protocol`, `harvest-chrome`) and exposes a controller actor
//! driven by a small command protocol.

pub use harvest_core::Config;
pub use harvest_interfaces::{ApiError, Browser, Page, PdfOptions, TabInfo};

pub mod badge;
pub mod command;
mod console;
pub mod controller;
pub mod dom;
mod error;
pub mod export;
pub mod extract;
mod launch;
pub mod settings;
pub mod store;
mod supervisor;
pub mod targets;

#[cfg(test)]
pub(crate) mod testing;

pub use badge::{BadgeActor, BadgeState, BadgeView, JobFamily};
pub use command::{Command, Response, dispatch};
pub use console::{run_console, write_json};
pub use controller::{ControllerActor, JobKind, JobOutcome, JobReport, StatusSnapshot};
pub use error::{ClientError, ExportError, JobError, StoreError, TargetError};
pub use launch::{LaunchMode, Session, connect, open_store, start_session};
pub use settings::Settings;
pub use store::{JsonFileStore, KvStore, MemoryStore, RowStore};

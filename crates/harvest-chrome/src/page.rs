//! `harvest_interfaces::Page` for an attached Chrome tab.

use crate::actors::{ChromePageActor, DetachPage, EvaluateScript, PrintToPdf, WaitForLoad};
use actix::prelude::*;
use async_trait::async_trait;
use harvest_interfaces::{ApiError, Page, PdfOptions};
use serde_json::Value;
use std::time::Duration;

fn mailbox(err: MailboxError) -> ApiError {
    // the page actor stops after detaching
    match err {
        MailboxError::Closed => ApiError::TargetClosed,
        MailboxError::Timeout => ApiError::Timeout,
    }
}

#[derive(Debug)]
pub struct ChromePage {
    actor_addr: Addr<ChromePageActor>,
    target_id: String,
}

impl ChromePage {
    pub(crate) fn new(actor_addr: Addr<ChromePageActor>, target_id: String) -> Self {
        Self {
            actor_addr,
            target_id,
        }
    }
}

#[async_trait]
impl Page for ChromePage {
    fn id(&self) -> &str {
        &self.target_id
    }

    async fn evaluate_script(&self, script: &str) -> Result<Value, ApiError> {
        Ok(self
            .actor_addr
            .send(EvaluateScript(script.to_string()))
            .await
            .map_err(mailbox)??)
    }

    async fn wait_for_load(&self, timeout: Duration) -> Result<(), ApiError> {
        Ok(self
            .actor_addr
            .send(WaitForLoad(timeout))
            .await
            .map_err(mailbox)??)
    }

    async fn print_to_pdf(&self, options: &PdfOptions) -> Result<Vec<u8>, ApiError> {
        Ok(self
            .actor_addr
            .send(PrintToPdf(options.clone()))
            .await
            .map_err(mailbox)??)
    }

    async fn detach(&self) -> Result<(), ApiError> {
        match self.actor_addr.send(DetachPage).await {
            Ok(result) => Ok(result?),
            Err(MailboxError::Closed) => Ok(()),
            Err(e) => Err(mailbox(e)),
        }
    }
}

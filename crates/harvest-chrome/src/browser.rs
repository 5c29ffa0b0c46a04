//! `harvest_interfaces::Browser` for Chrome.

use crate::actors::{
    ActivateTab, AttachTab, ChromeBrowserActor, CloseTab, GetActiveTab, GetVersion, ListTabs,
    OpenTab, ShutdownBrowser,
};
use crate::page::ChromePage;
use actix::prelude::*;
use async_trait::async_trait;
use harvest_interfaces::{ApiError, Browser, Page, TabInfo};
use log::debug;

fn mailbox(err: MailboxError) -> ApiError {
    ApiError::InternalError(format!("browser actor mailbox: {}", err))
}

#[derive(Debug, Clone)]
pub struct ChromeBrowser {
    actor_addr: Addr<ChromeBrowserActor>,
}

impl ChromeBrowser {
    pub fn new(actor_addr: Addr<ChromeBrowserActor>) -> Self {
        Self { actor_addr }
    }
}

#[async_trait]
impl Browser for ChromeBrowser {
    async fn version(&self) -> Result<String, ApiError> {
        Ok(self.actor_addr.send(GetVersion).await.map_err(mailbox)??)
    }

    async fn tabs(&self) -> Result<Vec<TabInfo>, ApiError> {
        Ok(self.actor_addr.send(ListTabs).await.map_err(mailbox)??)
    }

    async fn active_tab(&self) -> Result<Option<TabInfo>, ApiError> {
        Ok(self.actor_addr.send(GetActiveTab).await.map_err(mailbox)??)
    }

    async fn activate(&self, tab_id: &str) -> Result<(), ApiError> {
        debug!("Activating tab {}", tab_id);
        Ok(self
            .actor_addr
            .send(ActivateTab(tab_id.to_string()))
            .await
            .map_err(mailbox)??)
    }

    async fn open_tab(&self, url: &str, background: bool) -> Result<TabInfo, ApiError> {
        Ok(self
            .actor_addr
            .send(OpenTab {
                url: url.to_string(),
                background,
            })
            .await
            .map_err(mailbox)??)
    }

    async fn attach(&self, tab_id: &str) -> Result<Box<dyn Page>, ApiError> {
        let page_actor = self
            .actor_addr
            .send(AttachTab(tab_id.to_string()))
            .await
            .map_err(mailbox)??;
        Ok(Box::new(ChromePage::new(page_actor, tab_id.to_string())))
    }

    async fn close_tab(&self, tab_id: &str) -> Result<(), ApiError> {
        debug!("Closing tab {}", tab_id);
        Ok(self
            .actor_addr
            .send(CloseTab(tab_id.to_string()))
            .await
            .map_err(mailbox)??)
    }

    async fn disconnect(&self) -> Result<(), ApiError> {
        self.actor_addr.send(ShutdownBrowser).await.map_err(mailbox)
    }
}

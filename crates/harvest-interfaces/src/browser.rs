use crate::common::TabInfo;
use crate::error::ApiError;
use crate::page::Page;
use std::fmt::Debug;

/// Control over a running browser's tabs.
///
/// Connecting is done by a separate launch function that hands out an
/// implementation of this trait.
#[async_trait::async_trait]
pub trait Browser: Send + Sync + Debug {
    /// Gets the browser product string.
    ///
    /// # Returns
    /// - `Ok(String)` such as `Chrome/126.0.6478.127`.
    /// - `Err(ApiError)` if the browser could not be queried.
    async fn version(&self) -> Result<String, ApiError>;

    /// Lists page tabs ordered by position, left to right.
    ///
    /// # Returns
    /// - `Ok(Vec<TabInfo>)`; `position` equals the index in the returned list.
    /// - `Err(ApiError)` if the tab list could not be read.
    async fn tabs(&self) -> Result<Vec<TabInfo>, ApiError>;

    /// Returns the tab the user is looking at.
    ///
    /// # Returns
    /// - `Ok(Some(TabInfo))` for the focused page tab.
    /// - `Ok(None)` if no page tab is open.
    /// - `Err(ApiError)` if the browser could not be queried.
    async fn active_tab(&self) -> Result<Option<TabInfo>, ApiError>;

    /// Brings a tab to the foreground.
    ///
    /// # Arguments
    /// * `tab_id` - Target id from `TabInfo::id`.
    async fn activate(&self, tab_id: &str) -> Result<(), ApiError>;

    /// Opens a new tab.
    ///
    /// # Arguments
    /// * `url` - Address to load.
    /// * `background` - Open without taking focus.
    ///
    /// # Returns
    /// - `Ok(TabInfo)` for the created tab. Its `position` is not meaningful.
    async fn open_tab(&self, url: &str, background: bool) -> Result<TabInfo, ApiError>;

    /// Attaches a protocol session to a tab for script evaluation and printing.
    ///
    /// # Returns
    /// - `Ok(Box<dyn Page>)`; call `Page::detach` when done.
    /// - `Err(ApiError::TargetClosed)` if the tab no longer exists.
    async fn attach(&self, tab_id: &str) -> Result<Box<dyn Page>, ApiError>;

    /// Closes a tab. Closing a tab that is already gone is not an error.
    async fn close_tab(&self, tab_id: &str) -> Result<(), ApiError>;

    /// Drops the debugging connection. The browser keeps running.
    async fn disconnect(&self) -> Result<(), ApiError>;
}

use crate::common::PdfOptions;
use crate::error::ApiError;
use serde_json::Value;
use std::fmt::Debug;
use std::time::Duration;

/// A protocol session attached to one tab.
#[async_trait::async_trait]
pub trait Page: Send + Sync + Debug {
    /// Target id of the tab this session is attached to.
    fn id(&self) -> &str;

    /// Evaluates a JavaScript expression in the page's main world.
    ///
    /// Promises are awaited and the result is returned by value.
    ///
    /// # Returns
    /// - `Ok(Value)` with the JSON form of the result (`Null` for `undefined`).
    /// - `Err(ApiError::ScriptError)` if the expression threw.
    async fn evaluate_script(&self, script: &str) -> Result<Value, ApiError>;

    /// Waits until the document finished loading.
    ///
    /// # Returns
    /// - `Ok(())` once the load event fired, or immediately if it already had.
    /// - `Err(ApiError::Timeout)` when `timeout` elapsed first.
    /// - `Err(ApiError::TargetClosed)` if the tab disappeared while waiting.
    async fn wait_for_load(&self, timeout: Duration) -> Result<(), ApiError>;

    /// Renders the page to PDF.
    ///
    /// # Returns
    /// - `Ok(Vec<u8>)` with the PDF bytes; empty if the browser produced no data.
    async fn print_to_pdf(&self, options: &PdfOptions) -> Result<Vec<u8>, ApiError>;

    /// Ends the session. The tab stays open.
    async fn detach(&self) -> Result<(), ApiError>;
}

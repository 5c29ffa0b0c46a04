//! # Harvest Chrome
//!
//! Implements the `harvest-interfaces` traits for Chrome over the DevTools
//! Protocol, plus discovery of the DevTools endpoint of a running browser.

pub mod actors;
pub mod browser;
pub mod discovery;
pub mod error;
pub mod page;
pub mod protocol;

pub use actors::{ChromeBrowserActor, PageTimeouts};
pub use browser::ChromeBrowser;
pub use discovery::DevToolsHttp;
pub use error::ChromeError;
pub use page::ChromePage;

//! # Harvest Interfaces
//!
//! Protocol-agnostic handles for driving a browser: `Browser` for the tab
//! strip, `Page` for an attached tab, `ApiError` for everything that can go
//! wrong in between.

mod browser;
mod common;
mod error;
mod page;

pub use browser::*;
pub use common::*;
pub use error::*;
pub use page::*;

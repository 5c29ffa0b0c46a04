use serde::{Deserialize, Serialize};

/// A page tab as seen from the browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabInfo {
    /// Protocol target id.
    pub id: String,
    /// Zero-based position among the page tabs, left to right.
    pub position: usize,
    pub url: String,
    pub title: String,
}

/// Options for rendering a page to PDF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfOptions {
    /// Render CSS backgrounds.
    pub print_background: bool,
    /// Honour `@page` size rules declared by the document.
    pub prefer_css_page_size: bool,
}

impl Default for PdfOptions {
    fn default() -> Self {
        Self {
            print_background: true,
            prefer_css_page_size: true,
        }
    }
}

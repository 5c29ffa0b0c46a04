//! In-memory stand-ins for the browser, the badge, the download folder and
//! the contact reader.

use crate::badge::{BadgeSink, BadgeView};
use crate::error::ExportError;
use crate::export::DownloadSink;
use crate::extract::{ContactReader, ExtractOutcome, tsv_line};
use async_trait::async_trait;
use harvest_interfaces::{ApiError, Browser, Page, PdfOptions, TabInfo};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default, Clone)]
pub struct RecordingSink {
    pub views: Arc<Mutex<Vec<BadgeView>>>,
}

impl BadgeSink for RecordingSink {
    fn render(&mut self, view: &BadgeView) {
        self.views.lock().unwrap().push(view.clone());
    }
}

/// How an attached page behaves.
#[derive(Debug, Clone)]
pub struct PageScript {
    pub name: String,
    pub pdf: Vec<u8>,
    pub load_error: Option<ApiError>,
    pub print_delay: Duration,
}

impl PageScript {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            pdf: b"%PDF".to_vec(),
            load_error: None,
            print_delay: Duration::ZERO,
        }
    }

    pub fn with_pdf(mut self, pdf: Vec<u8>) -> Self {
        self.pdf = pdf;
        self
    }

    pub fn with_load_error(mut self, err: ApiError) -> Self {
        self.load_error = Some(err);
        self
    }

    pub fn with_print_delay(mut self, delay: Duration) -> Self {
        self.print_delay = delay;
        self
    }
}

#[derive(Debug, Default)]
struct BrowserState {
    tabs: Vec<TabInfo>,
    active: Option<String>,
    /// (URL substring, behaviour); first match wins.
    scripts: Vec<(String, PageScript)>,
    log: Vec<String>,
    next_id: usize,
}

/// Tabs in a vector, actions in a log.
#[derive(Debug, Clone, Default)]
pub struct FakeBrowser {
    state: Arc<Mutex<BrowserState>>,
}

impl FakeBrowser {
    /// `(id, url)` pairs, left to right.
    pub fn new(tabs: Vec<(String, String)>) -> Self {
        let tabs = tabs
            .into_iter()
            .enumerate()
            .map(|(position, (id, url))| TabInfo {
                id,
                position,
                url,
                title: String::new(),
            })
            .collect();
        let browser = Self::default();
        browser.state.lock().unwrap().tabs = tabs;
        browser
    }

    pub fn with_active(self, id: &str) -> Self {
        self.state.lock().unwrap().active = Some(id.to_string());
        self
    }

    pub fn script_url(&self, needle: &str, script: PageScript) {
        self.state
            .lock()
            .unwrap()
            .scripts
            .push((needle.to_string(), script));
    }

    pub fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn activations(&self) -> Vec<String> {
        self.log()
            .into_iter()
            .filter_map(|l| l.strip_prefix("activate ").map(str::to_string))
            .collect()
    }

    fn push(&self, entry: String) {
        self.state.lock().unwrap().log.push(entry);
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn version(&self) -> Result<String, ApiError> {
        Ok("FakeChrome/1.0".into())
    }

    async fn tabs(&self) -> Result<Vec<TabInfo>, ApiError> {
        Ok(self.state.lock().unwrap().tabs.clone())
    }

    async fn active_tab(&self) -> Result<Option<TabInfo>, ApiError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .active
            .as_ref()
            .and_then(|id| state.tabs.iter().find(|t| &t.id == id).cloned()))
    }

    async fn activate(&self, tab_id: &str) -> Result<(), ApiError> {
        self.push(format!("activate {}", tab_id));
        let mut state = self.state.lock().unwrap();
        if !state.tabs.iter().any(|t| t.id == tab_id) {
            return Err(ApiError::TargetClosed);
        }
        state.active = Some(tab_id.to_string());
        Ok(())
    }

    async fn open_tab(&self, url: &str, background: bool) -> Result<TabInfo, ApiError> {
        self.push(format!("open {}", url));
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let tab = TabInfo {
            id: format!("N{}", state.next_id),
            position: state.tabs.len(),
            url: url.to_string(),
            title: String::new(),
        };
        state.tabs.push(tab.clone());
        if !background {
            state.active = Some(tab.id.clone());
        }
        Ok(tab)
    }

    async fn attach(&self, tab_id: &str) -> Result<Box<dyn Page>, ApiError> {
        self.push(format!("attach {}", tab_id));
        let state = self.state.lock().unwrap();
        let tab = state
            .tabs
            .iter()
            .find(|t| t.id == tab_id)
            .ok_or(ApiError::TargetClosed)?;
        let script = state
            .scripts
            .iter()
            .find(|(needle, _)| tab.url.contains(needle.as_str()))
            .map(|(_, s)| s.clone())
            .unwrap_or_else(|| PageScript::named(""));
        Ok(Box::new(FakePage {
            id: tab_id.to_string(),
            script,
            browser: self.clone(),
        }))
    }

    async fn close_tab(&self, tab_id: &str) -> Result<(), ApiError> {
        self.push(format!("close {}", tab_id));
        self.state.lock().unwrap().tabs.retain(|t| t.id != tab_id);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ApiError> {
        Ok(())
    }
}

#[derive(Debug)]
pub struct FakePage {
    id: String,
    script: PageScript,
    browser: FakeBrowser,
}

#[async_trait]
impl Page for FakePage {
    fn id(&self) -> &str {
        &self.id
    }

    async fn evaluate_script(&self, _script: &str) -> Result<Value, ApiError> {
        Ok(Value::String(self.script.name.clone()))
    }

    async fn wait_for_load(&self, _timeout: Duration) -> Result<(), ApiError> {
        match &self.script.load_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn print_to_pdf(&self, _options: &PdfOptions) -> Result<Vec<u8>, ApiError> {
        self.browser.push(format!("print {}", self.id));
        tokio::time::sleep(self.script.print_delay).await;
        Ok(self.script.pdf.clone())
    }

    async fn detach(&self) -> Result<(), ApiError> {
        self.browser.push(format!("detach {}", self.id));
        Ok(())
    }
}

/// Keeps saved files in order of arrival.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    files: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
}

impl MemorySink {
    pub fn files(&self) -> Vec<(String, Vec<u8>)> {
        self.files.lock().unwrap().clone()
    }
}

#[async_trait]
impl DownloadSink for MemorySink {
    async fn save(&self, relative_path: &str, bytes: &[u8], _wait: bool) -> Result<String, ExportError> {
        self.files
            .lock()
            .unwrap()
            .push((relative_path.to_string(), bytes.to_vec()));
        Ok(relative_path.to_string())
    }
}

/// Answers per tab id: a failure, a chosen resume code, or `code-{id}`.
#[derive(Debug, Default)]
pub struct FakeReader {
    failing: HashSet<String>,
    codes: HashMap<String, String>,
}

impl FakeReader {
    pub fn failing(mut self, tab_id: &str) -> Self {
        self.failing.insert(tab_id.to_string());
        self
    }

    pub fn with_code(mut self, tab_id: &str, code: &str) -> Self {
        self.codes.insert(tab_id.to_string(), code.to_string());
        self
    }
}

#[async_trait]
impl ContactReader for FakeReader {
    async fn read_contact(&self, page: &dyn Page) -> ExtractOutcome {
        let id = page.id();
        if self.failing.contains(id) {
            return ExtractOutcome::Failed {
                error: "contact button not found".into(),
            };
        }
        let code = self
            .codes
            .get(id)
            .cloned()
            .unwrap_or_else(|| format!("code-{}", id));
        let name = format!("Name {}", id);
        ExtractOutcome::Ok {
            line: tsv_line(&[&name, "x@example.com", "0912345678", &code]),
            resume_code: code,
        }
    }
}

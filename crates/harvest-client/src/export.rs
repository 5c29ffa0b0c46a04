//! Printing resume pages to PDF and saving them under the download root.

use crate::controller::{Control, checkpoint};
use crate::error::{ExportError, JobError, TargetError};
use crate::settings::Settings;
use crate::targets::ResumeRef;
use async_trait::async_trait;
use harvest_interfaces::{ApiError, Browser, Page, PdfOptions};
use log::{debug, info, warn};
use regex::Regex;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;

/// Candidate name on the resume preview page.
pub const NAME_SELECTOR: &str = "#app > div.container.page-container.container-3 > section > div > section > div > div.vip-resume-card.resume-block.resume-card.size-medium > div.resume-card-item.resume-card__center > div > h2 > p";

static UNSAFE_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"[\\/:*?"<>|]"#).unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

const MAX_NAME_CHARS: usize = 80;

/// Replaces characters file systems reject, collapses whitespace and caps the
/// length at 80 characters.
pub fn sanitize_filename(name: &str) -> String {
    let safe = UNSAFE_CHARS.replace_all(name, "_");
    let collapsed = WHITESPACE.replace_all(&safe, " ");
    collapsed.trim().chars().take(MAX_NAME_CHARS).collect()
}

/// `{prefix_}{name}{_suffix}.pdf`, or `resume.pdf` when all parts are empty.
pub fn build_filename(prefix: &str, name: &str, suffix: &str) -> String {
    let parts: Vec<&str> = [prefix, name, suffix]
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect();
    let base = if parts.is_empty() {
        "resume".to_string()
    } else {
        parts.join("_")
    };
    format!("{}.pdf", base)
}

/// Trimmed, relative, ending in `/`. Empty stays empty. `..` is refused.
pub fn normalize_subdir(subdir: &str) -> Result<String, ExportError> {
    let trimmed = subdir.trim().trim_start_matches('/');
    if trimmed.is_empty() {
        return Ok(String::new());
    }
    if trimmed.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(ExportError::InvalidPath(format!(
            "'{}' leaves the download folder",
            subdir
        )));
    }
    let mut normalized = trimmed.to_string();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    Ok(normalized)
}

/// Relative output path for a candidate `name` under the settings.
pub fn output_path(settings: &Settings, name: &str) -> Result<String, ExportError> {
    let prefix = sanitize_filename(settings.filename_prefix.trim());
    let suffix = sanitize_filename(settings.filename_suffix.trim());
    let file = build_filename(&prefix, &sanitize_filename(name), &suffix);
    Ok(format!("{}{}", normalize_subdir(&settings.subdir)?, file))
}

/// Where exported PDFs go.
#[async_trait]
pub trait DownloadSink: Send + Sync {
    /// Stores `bytes` at `relative_path`, renaming on collision. With `wait`,
    /// returns only once the data is on disk. Returns the path actually used.
    async fn save(&self, relative_path: &str, bytes: &[u8], wait: bool) -> Result<String, ExportError>;
}

/// Writes files below a root directory.
pub struct FsDownloadSink {
    root: PathBuf,
    flush_timeout: Duration,
}

impl FsDownloadSink {
    pub fn new(root: impl Into<PathBuf>, flush_timeout: Duration) -> Self {
        Self {
            root: root.into(),
            flush_timeout,
        }
    }

    fn checked(relative: &str) -> Result<&Path, ExportError> {
        let path = Path::new(relative);
        let escapes = path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if relative.is_empty() || escapes {
            return Err(ExportError::InvalidPath(relative.to_string()));
        }
        Ok(path)
    }
}

/// `name.pdf`, `name (1).pdf`, `name (2).pdf`, ...
fn numbered(path: &Path, n: usize) -> PathBuf {
    if n == 0 {
        return path.to_path_buf();
    }
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("file");
    let name = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{} ({}).{}", stem, n, ext),
        None => format!("{} ({})", stem, n),
    };
    path.with_file_name(name)
}

#[async_trait]
impl DownloadSink for FsDownloadSink {
    async fn save(&self, relative_path: &str, bytes: &[u8], wait: bool) -> Result<String, ExportError> {
        let relative = Self::checked(relative_path)?;
        let target = self.root.join(relative);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut n = 0;
        let (mut file, path) = loop {
            let candidate = numbered(&target, n);
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
                .await
            {
                Ok(file) => break (file, candidate),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => n += 1,
                Err(e) => return Err(e.into()),
            }
        };

        let write = async {
            file.write_all(bytes).await?;
            file.flush().await?;
            if wait {
                file.sync_all().await?;
            }
            Ok::<_, std::io::Error>(())
        };
        if wait {
            tokio::time::timeout(self.flush_timeout, write)
                .await
                .map_err(|_| ExportError::Timeout)??;
        } else {
            write.await?;
        }

        let saved = path
            .strip_prefix(&self.root)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");
        info!("Saved {} ({} bytes)", saved, bytes.len());
        Ok(saved)
    }
}

/// Bounds for the export flows.
#[derive(Debug, Clone)]
pub struct ExportTiming {
    pub page_load: Duration,
}

impl Default for ExportTiming {
    fn default() -> Self {
        Self {
            page_load: Duration::from_secs(45),
        }
    }
}

fn name_script() -> String {
    format!(
        "(() => {{ const el = document.querySelector({}); return el ? (el.textContent || '').trim() : ''; }})()",
        serde_json::Value::from(NAME_SELECTOR)
    )
}

async fn candidate_name(page: &dyn Page) -> Result<String, TargetError> {
    let value = page.evaluate_script(&name_script()).await?;
    Ok(value.as_str().unwrap_or_default().trim().to_string())
}

async fn print(page: &dyn Page) -> Result<Vec<u8>, TargetError> {
    let bytes = page.print_to_pdf(&PdfOptions::default()).await?;
    if bytes.is_empty() {
        return Err(TargetError::EmptyPdf);
    }
    Ok(bytes)
}

/// A printed page and the name its file will carry.
#[derive(Debug, Clone, PartialEq)]
pub struct PrintedPdf {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Reads the candidate name and prints the page. `fallback` names pages
/// without a candidate name.
pub async fn print_page(page: &dyn Page, fallback: &str) -> Result<PrintedPdf, TargetError> {
    let name = candidate_name(page).await?;
    let name = if name.is_empty() { fallback.to_string() } else { name };
    let bytes = print(page).await?;
    Ok(PrintedPdf { name, bytes })
}

/// Writes a printed page under the configured subdir.
pub async fn save_printed(
    sink: &dyn DownloadSink,
    settings: &Settings,
    printed: &PrintedPdf,
) -> Result<String, TargetError> {
    let path = output_path(settings, &printed.name)?;
    Ok(sink
        .save(&path, &printed.bytes, settings.wait_for_download_completion)
        .await?)
}

fn load_error(err: ApiError) -> TargetError {
    match err {
        ApiError::Timeout => TargetError::LoadTimeout,
        other => other.into(),
    }
}

/// Outer error: the job was stopped. Inner error: this resume failed.
async fn export_attached(
    page: &dyn Page,
    sink: &dyn DownloadSink,
    resume: &ResumeRef,
    settings: &Settings,
    first: bool,
    timing: &ExportTiming,
    control: &mut watch::Receiver<Control>,
) -> Result<Result<String, TargetError>, JobError> {
    if let Err(e) = page.wait_for_load(timing.page_load).await {
        return Ok(Err(load_error(e)));
    }
    tokio::time::sleep(settings.settle(first)).await;
    checkpoint(control).await?;

    let printed = match print_page(page, &resume.fallback_name()).await {
        Ok(printed) => printed,
        Err(e) => return Ok(Err(e)),
    };
    checkpoint(control).await?;
    Ok(save_printed(sink, settings, &printed).await)
}

/// Opens the resume's preview in a background tab, prints it and saves the
/// PDF. Pause and stop are honoured once the page has settled and again
/// before saving. The tab is closed and the session detached whatever
/// happens.
pub async fn export_resume(
    browser: &dyn Browser,
    sink: &dyn DownloadSink,
    resume: &ResumeRef,
    settings: &Settings,
    first: bool,
    timing: &ExportTiming,
    control: &mut watch::Receiver<Control>,
) -> Result<Result<String, TargetError>, JobError> {
    let url = resume.preview_url();
    let tab = match browser.open_tab(&url, true).await {
        Ok(tab) => tab,
        Err(e) => return Ok(Err(e.into())),
    };
    debug!("Opened preview {} in tab {}", url, tab.id);

    let result = match browser.attach(&tab.id).await {
        Ok(page) => {
            let result = export_attached(page.as_ref(), sink, resume, settings, first, timing, control).await;
            if let Err(e) = page.detach().await {
                warn!("Detaching from tab {} failed: {}", tab.id, e);
            }
            result
        }
        Err(e) => Ok(Err(e.into())),
    };

    if let Err(e) = browser.close_tab(&tab.id).await {
        warn!("Closing preview tab {} failed: {}", tab.id, e);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBrowser, MemorySink, PageScript};

    fn running() -> (watch::Sender<Control>, watch::Receiver<Control>) {
        watch::channel(Control::default())
    }

    #[test]
    fn filename_sanitising() {
        assert_eq!(sanitize_filename(r#" a/b\c:d*e?f"g<h>i|j "#), "a_b_c_d_e_f_g_h_i_j");
        assert_eq!(sanitize_filename("王  小\t明"), "王 小 明");
        assert_eq!(sanitize_filename(&"x".repeat(100)).len(), 80);
    }

    #[test]
    fn filename_parts() {
        assert_eq!(build_filename("PM", "Alice", "104"), "PM_Alice_104.pdf");
        assert_eq!(build_filename("", "Alice", ""), "Alice.pdf");
        assert_eq!(build_filename("", "", ""), "resume.pdf");
    }

    #[test]
    fn subdir_rules() {
        assert_eq!(normalize_subdir("  //out/pdf ").unwrap(), "out/pdf/");
        assert_eq!(normalize_subdir("104履歷下載區/").unwrap(), "104履歷下載區/");
        assert_eq!(normalize_subdir("   ").unwrap(), "");
        assert!(normalize_subdir("a/../../etc").is_err());
    }

    #[test]
    fn output_path_combines_settings() {
        let settings = Settings {
            subdir: "out".into(),
            filename_prefix: " Eng/Lead ".into(),
            filename_suffix: "".into(),
            ..Settings::default()
        };
        assert_eq!(output_path(&settings, "Alice").unwrap(), "out/Eng_Lead_Alice.pdf");
    }

    #[actix_rt::test]
    async fn file_sink_renames_on_collision() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FsDownloadSink::new(dir.path(), Duration::from_secs(5));

        let first = sink.save("out/Alice.pdf", b"one", false).await.unwrap();
        let second = sink.save("out/Alice.pdf", b"two", true).await.unwrap();
        let third = sink.save("out/Alice.pdf", b"three", false).await.unwrap();

        assert_eq!(first, "out/Alice.pdf");
        assert_eq!(second, "out/Alice (1).pdf");
        assert_eq!(third, "out/Alice (2).pdf");
        assert_eq!(std::fs::read(dir.path().join("out/Alice (1).pdf")).unwrap(), b"two");
    }

    #[actix_rt::test]
    async fn file_sink_refuses_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FsDownloadSink::new(dir.path(), Duration::from_secs(5));
        assert!(matches!(
            sink.save("../x.pdf", b"x", false).await,
            Err(ExportError::InvalidPath(_))
        ));
        assert!(matches!(
            sink.save("/tmp/x.pdf", b"x", false).await,
            Err(ExportError::InvalidPath(_))
        ));
    }

    fn quick() -> Settings {
        Settings {
            subdir: "r/".into(),
            first_wait_ms: 1,
            next_wait_ms: 1,
            ..Settings::default()
        }
    }

    #[actix_rt::test]
    async fn background_export_saves_and_cleans_up() {
        let browser = FakeBrowser::new(vec![]);
        browser.script_url("snapshotIds=77", PageScript::named("Alice"));
        let sink = MemorySink::default();
        let resume = ResumeRef::Document {
            snapshot_id: "77".into(),
            ec: String::new(),
        };

        let (_tx, mut control) = running();

        let saved = export_resume(&browser, &sink, &resume, &quick(), true, &ExportTiming::default(), &mut control)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(saved, "r/Alice.pdf");
        assert_eq!(sink.files(), vec![("r/Alice.pdf".to_string(), b"%PDF".to_vec())]);
        let log = browser.log();
        assert!(log.iter().any(|l| l.starts_with("open ")));
        assert!(log.iter().any(|l| l.starts_with("detach ")));
        assert!(log.iter().any(|l| l.starts_with("close ")));
    }

    #[actix_rt::test]
    async fn empty_print_fails_but_still_closes_tab() {
        let browser = FakeBrowser::new(vec![]);
        browser.script_url("searchEngineIdNos=5", PageScript::named("").with_pdf(Vec::new()));
        let sink = MemorySink::default();
        let resume = ResumeRef::Search {
            idno: "5".into(),
            ec: String::new(),
        };

        let (_tx, mut control) = running();

        let err = export_resume(&browser, &sink, &resume, &quick(), false, &ExportTiming::default(), &mut control)
            .await
            .unwrap()
            .unwrap_err();

        assert_eq!(err, TargetError::EmptyPdf);
        assert!(sink.files().is_empty());
        assert!(browser.log().iter().any(|l| l.starts_with("close ")));
    }

    #[actix_rt::test]
    async fn load_timeout_and_missing_name() {
        let browser = FakeBrowser::new(vec![]);
        browser.script_url("searchEngineIdNos=8", PageScript::named("").with_load_error(ApiError::Timeout));
        browser.script_url("searchEngineIdNos=9", PageScript::named(""));
        let sink = MemorySink::default();
        let search = |idno: &str| ResumeRef::Search {
            idno: idno.into(),
            ec: String::new(),
        };

        let (_tx, mut control) = running();

        let err = export_resume(&browser, &sink, &search("8"), &quick(), true, &ExportTiming::default(), &mut control)
            .await
            .unwrap()
            .unwrap_err();
        assert_eq!(err, TargetError::LoadTimeout);

        let saved = export_resume(&browser, &sink, &search("9"), &quick(), true, &ExportTiming::default(), &mut control)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(saved, "r/idno_9.pdf");
    }

    #[actix_rt::test]
    async fn stop_during_settle_skips_print_and_closes_tab() {
        let browser = FakeBrowser::new(vec![]);
        browser.script_url("snapshotIds=3", PageScript::named("Carol"));
        let sink = MemorySink::default();
        let resume = ResumeRef::Document {
            snapshot_id: "3".into(),
            ec: String::new(),
        };
        let settings = Settings {
            first_wait_ms: 200,
            ..quick()
        };
        let (tx, mut control) = running();
        actix_rt::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            tx.send_modify(|c| c.stop = true);
        });

        let err = export_resume(&browser, &sink, &resume, &settings, true, &ExportTiming::default(), &mut control)
            .await
            .unwrap_err();

        assert_eq!(err, JobError::Stopped);
        assert!(sink.files().is_empty());
        let log = browser.log();
        assert!(!log.iter().any(|l| l.starts_with("print ")));
        assert!(log.iter().any(|l| l.starts_with("detach ")));
        assert!(log.iter().any(|l| l.starts_with("close ")));
    }

    #[actix_rt::test]
    async fn printed_page_falls_back_to_given_name() {
        let browser = FakeBrowser::new(vec![("P".into(), "https://vip.104.com.tw/x".into())]);
        let page = browser.attach("P").await.unwrap();
        let printed = print_page(page.as_ref(), "untitled").await.unwrap();
        assert_eq!(printed.name, "untitled");

        let sink = MemorySink::default();
        let saved = save_printed(&sink, &quick(), &printed).await.unwrap();
        assert_eq!(saved, "r/untitled.pdf");
    }
}

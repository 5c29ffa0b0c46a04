//! Contact extraction from a candidate resume page.
//!
//! Opens the contact dialog, waits for the mail and phone links, reads the
//! fields through ordered strategy lists and closes the dialog again.

use crate::dom::{ClickTarget, DomNode, PageDom, Scope};
use crate::error::TargetError;
use async_trait::async_trait;
use harvest_interfaces::{ApiError, Page};
use log::{debug, warn};
use regex::Regex;
use std::cmp::Reverse;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::time::Instant;

const RESUME_CODE_SPANS: &str = "span.copy-content";
const CONTACT_ICON: &str = "i.vip-icon-contact";
const CLICKABLE: &str = r#"button,a,[role="button"]"#;
const CONTACT_LABEL: &str = "聯繫方式";

const MODAL_CANDIDATES: &str = r#"div.modal, div[role="dialog"], dialog"#;
const CLOSE_CONTROLS: &str = r#"button.close,button[aria-label="Close"],i.vip-icon-close"#;
const MODAL_TITLE: &str = r#".modal-header .modal-title, h2.modal-title, [class*="modal-title"], #Label"#;
const MAIL_LINK: &str = r#"a[href^="mailto:"]"#;
const TEL_LINK: &str = r#"a[href^="tel:"]"#;
const BACKDROPS: [&str; 2] = [".modal-backdrop.show", ".modal-backdrop"];

const CONTACT_MODAL_BODY: &str = "#app > div:nth-child(1) > div:nth-child(3) > main > div.modal.contact-information-modal.modal-centered > div.modal-dialog.modal-dialog--md > div > div.modal-body > div > div";
static NAME_SELECTOR: LazyLock<String> =
    LazyLock::new(|| format!("{} > div:nth-child(1) > div", CONTACT_MODAL_BODY));
static EMAIL_SELECTOR: LazyLock<String> =
    LazyLock::new(|| format!("{} > div:nth-child(2) > div.col-10 > a", CONTACT_MODAL_BODY));
static PHONE_SELECTOR: LazyLock<String> =
    LazyLock::new(|| format!("{} > div:nth-child(3) > div.col-10 > div > a", CONTACT_MODAL_BODY));

const NAME_IN_MODAL: [&str; 4] = [
    ".information--content .col.t3.font-weight-bold",
    ".information--content .t3.font-weight-bold",
    ".modal-body .t3.font-weight-bold",
    ".modal-body .font-weight-bold",
];

/// (close control, ancestor to click instead)
const CLOSE_BUTTONS: [(&str, Option<&str>); 4] = [
    (r#"button.close[aria-label="Close"]"#, None),
    ("button.close", None),
    (r#"button[aria-label="Close"]"#, None),
    ("i.vip-icon-close", Some("button")),
];

static DIGIT_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{6,12}$").unwrap());
static WORD_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{4,20}$").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static LINE_BREAK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\r?\n").unwrap());
static NAME_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)E-mail|聯絡電話|手機|住家|聯繫方式").unwrap());
static FIELD_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)E-mail|電話|手機|住家|視訊|聯繫方式").unwrap());

/// Waits used while extracting.
#[derive(Debug, Clone)]
pub struct ExtractTiming {
    pub contact_wait: Duration,
    pub poll_interval: Duration,
    pub modal_close: Duration,
}

impl Default for ExtractTiming {
    fn default() -> Self {
        Self {
            contact_wait: Duration::from_millis(7000),
            poll_interval: Duration::from_millis(120),
            modal_close: Duration::from_millis(2500),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExtractOutcome {
    Ok { line: String, resume_code: String },
    Failed { error: String },
}

/// Reads one contact record from an attached page.
#[async_trait]
pub trait ContactReader: Send + Sync {
    async fn read_contact(&self, page: &dyn Page) -> ExtractOutcome;
}

/// Reads contacts through `EvalDom`.
pub struct DomContactReader {
    timing: ExtractTiming,
}

impl DomContactReader {
    pub fn new(timing: ExtractTiming) -> Self {
        Self { timing }
    }
}

#[async_trait]
impl ContactReader for DomContactReader {
    async fn read_contact(&self, page: &dyn Page) -> ExtractOutcome {
        let dom = crate::dom::EvalDom::new(page);
        extract(&dom, &self.timing).await
    }
}

/// Never fails outright: every problem ends up in `Failed`.
pub async fn extract(dom: &dyn PageDom, timing: &ExtractTiming) -> ExtractOutcome {
    match try_extract(dom, timing).await {
        Ok((line, resume_code)) => ExtractOutcome::Ok { line, resume_code },
        Err(e) => {
            debug!("Extraction failed: {}", e);
            ExtractOutcome::Failed {
                error: match e {
                    TargetError::Extraction(msg) => msg,
                    other => other.to_string(),
                },
            }
        }
    }
}

async fn try_extract(
    dom: &dyn PageDom,
    timing: &ExtractTiming,
) -> Result<(String, String), TargetError> {
    let resume_code = resume_code(dom).await?;

    if !open_contact(dom).await? {
        return Err(TargetError::Extraction("contact button not found".into()));
    }

    let ready = poll_until(timing.contact_wait, timing.poll_interval, || contact_ready(dom)).await?;
    if !ready {
        return Err(TargetError::Extraction(
            "contact details never appeared (not loaded, or not permitted)".into(),
        ));
    }

    let root = contact_modal(dom).await?.map(|(scope, _)| scope);
    let name = read_field(dom, root.as_ref(), &name_strategies()).await?;
    let email = read_field(dom, root.as_ref(), &link_strategies(&EMAIL_SELECTOR, "mailto:", MAIL_LINK)).await?;
    let phone = read_field(dom, root.as_ref(), &link_strategies(&PHONE_SELECTOR, "tel:", TEL_LINK)).await?;

    if let Err(e) = close_modal(dom, timing).await {
        warn!("Closing the contact dialog failed: {}", e);
    }

    let line = tsv_line(&[&name, &email, &phone, &resume_code]);
    Ok((line, resume_code))
}

/// Polls `probe` every `every` until it yields `true` or `bound` passes.
pub(crate) async fn poll_until<F, Fut>(
    bound: Duration,
    every: Duration,
    mut probe: F,
) -> Result<bool, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, ApiError>>,
{
    let deadline = Instant::now() + bound;
    loop {
        if probe().await? {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(every).await;
    }
}

// ---- Resume code ----

fn pick_resume_code(texts: &[String]) -> String {
    let texts: Vec<&String> = texts.iter().filter(|t| !t.is_empty()).collect();
    let compact = |t: &str| WHITESPACE.replace_all(t, "").into_owned();
    for pattern in [&*DIGIT_CODE, &*WORD_CODE] {
        if let Some(hit) = texts.iter().map(|t| compact(t)).find(|c| pattern.is_match(c)) {
            return hit;
        }
    }
    texts.first().map(|t| t.trim().to_string()).unwrap_or_default()
}

async fn resume_code(dom: &dyn PageDom) -> Result<String, ApiError> {
    let texts: Vec<String> = dom
        .nodes(&Scope::document(), RESUME_CODE_SPANS)
        .await?
        .into_iter()
        .map(|n| n.text)
        .collect();
    Ok(pick_resume_code(&texts))
}

// ---- Contact dialog ----

async fn open_contact(dom: &dyn PageDom) -> Result<bool, ApiError> {
    let doc = Scope::document();
    if dom.click(&ClickTarget::closest(&doc, CONTACT_ICON, CLICKABLE)).await? {
        return Ok(true);
    }
    let buttons = dom.nodes(&doc, CLICKABLE).await?;
    match buttons.iter().position(|b| b.text.contains(CONTACT_LABEL)) {
        Some(index) => dom.click(&ClickTarget::node(&doc, CLICKABLE, index)).await,
        None => Ok(false),
    }
}

async fn signature_ok(dom: &dyn PageDom, root: &Scope) -> Result<bool, ApiError> {
    if dom.nodes(root, CLOSE_CONTROLS).await?.is_empty() {
        return Ok(false);
    }
    let title = dom.first(root, MODAL_TITLE).await?.map(|n| n.text).unwrap_or_default();
    if title.contains(CONTACT_LABEL) {
        return Ok(true);
    }
    let links = format!("{}, {}", MAIL_LINK, TEL_LINK);
    Ok(!dom.nodes(root, &links).await?.is_empty())
}

/// The visible contact dialog root with the highest z-index.
pub(crate) async fn contact_modal(
    dom: &dyn PageDom,
) -> Result<Option<(Scope, DomNode)>, ApiError> {
    let doc = Scope::document();
    let candidates = dom.nodes(&doc, MODAL_CANDIDATES).await?;
    let mut hits = Vec::new();
    for (index, node) in candidates.into_iter().enumerate() {
        if !node.visible {
            continue;
        }
        let scope = doc.child(MODAL_CANDIDATES, index);
        if signature_ok(dom, &scope).await? {
            hits.push((scope, node));
        }
    }
    hits.sort_by_key(|(_, node)| Reverse(node.z_index));
    Ok(hits.into_iter().next())
}

fn link_ok(node: Option<&DomNode>, scheme: &str) -> bool {
    node.is_some_and(|n| n.href.starts_with(scheme) || !n.text.is_empty())
}

async fn contact_ready(dom: &dyn PageDom) -> Result<bool, ApiError> {
    let Some((root, _)) = contact_modal(dom).await? else {
        return Ok(false);
    };
    let mail = dom.first(&root, MAIL_LINK).await?;
    let tel = dom.first(&root, TEL_LINK).await?;
    Ok(link_ok(mail.as_ref(), "mailto:") && link_ok(tel.as_ref(), "tel:"))
}

// ---- Field strategies ----

/// One way of reading a field. Strategies run in order; the first non-empty
/// value wins.
#[derive(Debug, Clone)]
enum FieldSource {
    /// Text of a fixed document selector.
    Text(String),
    /// `href` of a fixed document selector minus `scheme`, else its text.
    Link { selector: String, scheme: &'static str },
    /// First of `selectors` that exists in the dialog, unless it reads like a label.
    DialogHeading(&'static [&'static str]),
    /// First short dialog text that is not a label.
    DialogShortText,
    /// First dialog link of the scheme: `href` minus scheme, else its text.
    DialogLink { selector: &'static str, scheme: &'static str },
}

fn name_strategies() -> Vec<FieldSource> {
    vec![
        FieldSource::Text(NAME_SELECTOR.clone()),
        FieldSource::DialogHeading(&NAME_IN_MODAL),
        FieldSource::DialogShortText,
    ]
}

fn link_strategies(selector: &str, scheme: &'static str, in_dialog: &'static str) -> Vec<FieldSource> {
    vec![
        FieldSource::Link {
            selector: selector.to_string(),
            scheme,
        },
        FieldSource::DialogLink {
            selector: in_dialog,
            scheme,
        },
    ]
}

fn strip_scheme(href: &str, scheme: &str) -> String {
    let head = href.get(..scheme.len()).unwrap_or("");
    let rest = if head.eq_ignore_ascii_case(scheme) {
        &href[scheme.len()..]
    } else {
        href
    };
    rest.trim().to_string()
}

fn link_value(node: Option<DomNode>, scheme: &str) -> String {
    let Some(node) = node else {
        return String::new();
    };
    let from_href = strip_scheme(&node.href, scheme);
    if from_href.is_empty() { node.text } else { from_href }
}

impl FieldSource {
    async fn read(&self, dom: &dyn PageDom, dialog: Option<&Scope>) -> Result<String, ApiError> {
        let doc = Scope::document();
        match self {
            FieldSource::Text(selector) => {
                Ok(dom.first(&doc, selector).await?.map(|n| n.text).unwrap_or_default())
            }
            FieldSource::Link { selector, scheme } => {
                Ok(link_value(dom.first(&doc, selector).await?, scheme))
            }
            FieldSource::DialogHeading(selectors) => {
                let Some(root) = dialog else {
                    return Ok(String::new());
                };
                for selector in selectors.iter() {
                    if let Some(node) = dom.first(root, selector).await? {
                        let rejected = NAME_LABEL.is_match(&node.text);
                        return Ok(if rejected { String::new() } else { node.text });
                    }
                }
                Ok(String::new())
            }
            FieldSource::DialogShortText => {
                let Some(root) = dialog else {
                    return Ok(String::new());
                };
                let body = if dom.first(root, ".modal-body").await?.is_some() {
                    root.child(".modal-body", 0)
                } else {
                    root.clone()
                };
                Ok(dom
                    .nodes(&body, "div,span")
                    .await?
                    .into_iter()
                    .map(|n| n.text)
                    .find(|t| !t.is_empty() && t.chars().count() <= 10 && !FIELD_LABEL.is_match(t))
                    .unwrap_or_default())
            }
            FieldSource::DialogLink { selector, scheme } => {
                let Some(root) = dialog else {
                    return Ok(String::new());
                };
                Ok(link_value(dom.first(root, selector).await?, scheme))
            }
        }
    }
}

async fn read_field(
    dom: &dyn PageDom,
    dialog: Option<&Scope>,
    strategies: &[FieldSource],
) -> Result<String, ApiError> {
    for strategy in strategies {
        let value = strategy.read(dom, dialog).await?;
        if !value.is_empty() {
            return Ok(value);
        }
    }
    Ok(String::new())
}

// ---- Closing ----

async fn backdrop(dom: &dyn PageDom) -> Result<Option<(&'static str, DomNode)>, ApiError> {
    for selector in BACKDROPS {
        if let Some(node) = dom.first(&Scope::document(), selector).await? {
            return Ok(node.visible.then_some((selector, node)));
        }
    }
    Ok(None)
}

async fn modal_gone(dom: &dyn PageDom) -> Result<bool, ApiError> {
    if contact_modal(dom).await?.is_some() {
        return Ok(false);
    }
    Ok(backdrop(dom).await?.is_none())
}

async fn dialog_of(dom: &dyn PageDom, root: &Scope, root_node: DomNode) -> Result<Option<(Scope, DomNode)>, ApiError> {
    for selector in ["div.modal-dialog", ".modal-dialog"] {
        if let Some(node) = dom.first(root, selector).await? {
            return Ok(node.visible.then(|| (root.child(selector, 0), node)));
        }
    }
    Ok(root_node.visible.then(|| (root.clone(), root_node)))
}

/// Close button, then the dialog's top-right corner, then the backdrop, then
/// Escape, then hiding it by force. Stops at the first step that works.
async fn close_modal(dom: &dyn PageDom, timing: &ExtractTiming) -> Result<(), ApiError> {
    let Some((root, root_node)) = contact_modal(dom).await? else {
        return Ok(());
    };
    let Some((dialog, dialog_node)) = dialog_of(dom, &root, root_node).await? else {
        return Ok(());
    };
    if modal_gone(dom).await? {
        return Ok(());
    }
    let gone = || poll_until(timing.modal_close, timing.poll_interval, || modal_gone(dom));

    for (selector, widen) in CLOSE_BUTTONS {
        let target = ClickTarget::Node {
            scope: dialog.clone(),
            selector: selector.to_string(),
            index: 0,
            closest: widen.map(str::to_string),
            at: None,
        };
        if dom.click(&target).await? {
            debug!("Clicked dialog close control {}", selector);
            if gone().await? {
                return Ok(());
            }
            break;
        }
    }

    let viewport = dom.viewport().await?;
    let x = (viewport.width - 2.0).min(dialog_node.rect.right - 10.0);
    let y = (dialog_node.rect.top + 10.0).max(2.0);
    if dom.click(&ClickTarget::Point { x, y }).await? && gone().await? {
        return Ok(());
    }

    if let Some((selector, node)) = backdrop(dom).await? {
        let target = ClickTarget::Node {
            scope: Scope::document(),
            selector: selector.to_string(),
            index: 0,
            closest: None,
            at: Some((node.rect.left + 10.0, node.rect.top + 10.0)),
        };
        if dom.click(&target).await? && gone().await? {
            return Ok(());
        }
    }

    dom.press_escape().await?;
    if gone().await? {
        return Ok(());
    }

    warn!("Contact dialog would not close; hiding it");
    dom.force_hide(&root).await
}

// ---- Output ----

fn tsv_field(value: &str) -> String {
    LINE_BREAK.replace_all(value, " ").trim().to_string()
}

/// Joins fields with TAB after flattening line breaks.
pub fn tsv_line(fields: &[&str]) -> String {
    fields.iter().map(|f| tsv_field(f)).collect::<Vec<_>>().join("\t")
}

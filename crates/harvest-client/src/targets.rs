//! Which tabs a job works on, and the resume references behind their URLs.

use crate::error::JobError;
use harvest_interfaces::TabInfo;
use std::collections::HashSet;
use url::Url;

pub const SITE_PREFIX: &str = "https://vip.104.com.tw/";
pub const PREVIEW_PREFIX: &str = "https://vip.104.com.tw/ResumeTools/resumePreview?";
const PREVIEW_BASE: &str = "https://vip.104.com.tw/ResumeTools/resumePreview";
const SITE_HOST: &str = "vip.104.com.tw";
const RESUME_PATHS: [&str; 3] = [
    "/resumetools/resumepreview",
    "/search/searchresumemaster",
    "/document/master",
];

/// A tab slated for processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub position: usize,
    pub id: String,
    pub url: String,
}

impl From<&TabInfo> for Target {
    fn from(tab: &TabInfo) -> Self {
        Self {
            position: tab.position,
            id: tab.id.clone(),
            url: tab.url.clone(),
        }
    }
}

pub fn is_site_url(url: &str) -> bool {
    url.starts_with(SITE_PREFIX)
}

pub fn is_preview_url(url: &str) -> bool {
    url.starts_with(PREVIEW_PREFIX)
}

/// A resume page: search master, document master or preview.
pub fn is_resume_page(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    if parsed.host_str() != Some(SITE_HOST) {
        return false;
    }
    let path = parsed.path().to_lowercase();
    RESUME_PATHS.contains(&path.as_str())
}

/// Identifies one resume independently of the page showing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeRef {
    Search { idno: String, ec: String },
    Document { snapshot_id: String, ec: String },
}

// First non-empty value among `names`, in order.
fn query_value(url: &Url, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
            .filter(|v| !v.is_empty())
    })
}

impl ResumeRef {
    /// Reads `sn`/`snapshotIds` (preferred) or `idno`/`searchEngineIdNos`,
    /// plus `ec`.
    pub fn parse(url: &str) -> Option<ResumeRef> {
        let url = Url::parse(url).ok()?;
        let ec = query_value(&url, &["ec"]).unwrap_or_default();
        if let Some(snapshot_id) = query_value(&url, &["sn", "snapshotIds"]) {
            return Some(ResumeRef::Document { snapshot_id, ec });
        }
        query_value(&url, &["idno", "searchEngineIdNos"]).map(|idno| ResumeRef::Search { idno, ec })
    }

    pub fn ec(&self) -> &str {
        match self {
            ResumeRef::Search { ec, .. } | ResumeRef::Document { ec, .. } => ec,
        }
    }

    pub fn dedup_key(&self) -> String {
        match self {
            ResumeRef::Search { idno, ec } => format!("idno:{}|{}", idno, ec),
            ResumeRef::Document { snapshot_id, ec } => format!("sn:{}|{}", snapshot_id, ec),
        }
    }

    /// File name stem used when the page shows no candidate name.
    pub fn fallback_name(&self) -> String {
        match self {
            ResumeRef::Search { idno, .. } => format!("idno_{}", idno),
            ResumeRef::Document { snapshot_id, .. } => format!("sn_{}", snapshot_id),
        }
    }

    pub fn preview_url(&self) -> String {
        let (source, idnos, snapshots) = match self {
            ResumeRef::Search { idno, .. } => ("search", idno.as_str(), ""),
            ResumeRef::Document { snapshot_id, .. } => ("document", "", snapshot_id.as_str()),
        };
        let mut url = match Url::parse(PREVIEW_BASE) {
            Ok(url) => url,
            Err(_) => return PREVIEW_BASE.to_string(),
        };
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("pageSource", source)
                .append_pair("searchEngineIdNos", idnos)
                .append_pair("snapshotIds", snapshots);
            if !self.ec().is_empty() {
                query.append_pair("ec", self.ec());
            }
        }
        url.to_string()
    }
}

fn sorted(tabs: &[TabInfo]) -> Vec<&TabInfo> {
    let mut tabs: Vec<&TabInfo> = tabs.iter().collect();
    tabs.sort_by_key(|t| t.position);
    tabs
}

/// Site tabs at or right of `start`, left to right.
pub fn collect_right(tabs: &[TabInfo], start: usize) -> Vec<Target> {
    sorted(tabs)
        .into_iter()
        .filter(|t| t.position >= start && is_site_url(&t.url))
        .map(Target::from)
        .collect()
}

/// Every preview tab, left to right.
pub fn preview_tabs(tabs: &[TabInfo]) -> Vec<Target> {
    sorted(tabs)
        .into_iter()
        .filter(|t| is_preview_url(&t.url))
        .map(Target::from)
        .collect()
}

/// The active tab's resume reference.
pub fn current_resume(active: Option<&TabInfo>) -> Result<ResumeRef, JobError> {
    let url = active.map(|t| t.url.as_str()).unwrap_or("");
    if !is_resume_page(url) {
        return Err(JobError::Setup(
            "the active tab is not a resume page (searchResumeMaster, document/master or resumePreview)"
                .into(),
        ));
    }
    ResumeRef::parse(url).ok_or_else(|| {
        JobError::Setup("the active resume page has no idno or snapshot id in its URL".into())
    })
}

/// References from the active tab rightwards, up to the first tab that is not
/// a resume page. Unparsable pages are skipped, repeats dropped.
pub fn resumes_right(tabs: &[TabInfo], active_id: &str) -> Result<Vec<ResumeRef>, JobError> {
    let ordered = sorted(tabs);
    let start = ordered
        .iter()
        .position(|t| t.id == active_id)
        .ok_or_else(|| JobError::Setup("could not locate the active tab".into()))?;

    let mut seen = HashSet::new();
    let mut refs = Vec::new();
    for tab in &ordered[start..] {
        if !is_resume_page(&tab.url) {
            break;
        }
        let Some(resume) = ResumeRef::parse(&tab.url) else {
            continue;
        };
        if seen.insert(resume.dedup_key()) {
            refs.push(resume);
        }
    }
    if refs.is_empty() {
        return Err(JobError::Setup(
            "no downloadable resume pages to the right of the active tab".into(),
        ));
    }
    Ok(refs)
}

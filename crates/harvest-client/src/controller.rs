//! The batch controller: one actor owns the job state; the running job is a
//! future spawned on its context that reports back by message.

use crate::badge::{BadgeActor, BadgeState, JobFamily, SetBadge, progress_text};
use crate::error::{JobError, StoreError, TargetError};
use crate::export::{DownloadSink, ExportTiming, export_resume, print_page, save_printed};
use crate::extract::{ContactReader, ExtractOutcome};
use crate::settings::Settings;
use crate::store::{KvStore, RowStore};
use crate::targets::{self, ResumeRef, Target};
use actix::prelude::*;
use harvest_core::TimingConfig;
use harvest_interfaces::{Browser, TabInfo};
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// Contacts from the active tab rightwards.
    CollectRight,
    /// Every open preview tab, printed in place.
    ExportOpen,
    /// The resume in the active tab, printed from a background tab.
    DownloadCurrent,
    /// Resumes from the active tab rightwards, printed from background tabs.
    DownloadRight,
}

impl JobKind {
    pub fn family(self) -> JobFamily {
        match self {
            JobKind::CollectRight => JobFamily::Collect,
            _ => JobFamily::Export,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            JobKind::CollectRight => "Collect contacts",
            JobKind::ExportOpen => "Export preview tabs",
            JobKind::DownloadCurrent => "Download current resume",
            JobKind::DownloadRight => "Download resumes to the right",
        }
    }
}

/// What the console sees of the controller.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub running: bool,
    pub paused: bool,
    pub stop_requested: bool,
    pub current_index: usize,
    pub total: usize,
    pub progress_text: String,
    pub last_message: String,
}

/// Pause and stop flags as the job sees them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Control {
    pub paused: bool,
    pub stop: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    /// `"i/n"`
    pub index: String,
    pub target: String,
    pub error: TargetError,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobReport {
    pub ok: usize,
    pub fail: usize,
    pub failures: Vec<Failure>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Success,
    /// Finished with at least one failed target.
    Partial,
    Stopped,
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobSummary {
    pub kind: JobKind,
    pub outcome: JobOutcome,
    pub report: JobReport,
}

/// Fixed waits of the collection job and the export page load bound.
#[derive(Debug, Clone)]
pub struct JobTiming {
    pub collect_settle: Duration,
    pub collect_gap: Duration,
    pub page_load: Duration,
}

impl Default for JobTiming {
    fn default() -> Self {
        Self {
            collect_settle: Duration::from_millis(350),
            collect_gap: Duration::from_millis(450),
            page_load: Duration::from_secs(45),
        }
    }
}

impl From<&TimingConfig> for JobTiming {
    fn from(t: &TimingConfig) -> Self {
        Self {
            collect_settle: t.collect_settle,
            collect_gap: t.collect_gap,
            page_load: t.page_load,
        }
    }
}

/// Everything a job talks to.
#[derive(Clone)]
pub struct Services {
    pub browser: Arc<dyn Browser>,
    pub kv: Arc<dyn KvStore>,
    pub sink: Arc<dyn DownloadSink>,
    pub reader: Arc<dyn ContactReader>,
    pub timing: JobTiming,
}

// ================= Messages =================

#[derive(Message, Debug)]
#[rtype(result = "Result<(), JobError>")]
pub struct StartJob(pub JobKind);

#[derive(Message, Debug)]
#[rtype(result = "()")]
pub struct Pause;

#[derive(Message, Debug)]
#[rtype(result = "()")]
pub struct Resume;

#[derive(Message, Debug)]
#[rtype(result = "()")]
pub struct Stop;

#[derive(Message, Debug)]
#[rtype(result = "StatusSnapshot")]
pub struct GetStatus;

/// Summary of the last finished job.
#[derive(Message, Debug)]
#[rtype(result = "Option<JobSummary>")]
pub struct GetSummary;

/// Stores the given settings over the current ones and returns the result.
#[derive(Message, Debug)]
#[rtype(result = "Result<Settings, StoreError>")]
pub struct ApplySettings(pub Option<Value>);

#[derive(Message, Debug)]
#[rtype(result = "()")]
pub struct InitBadge;

/// Returns the row count and the newline-joined rows.
#[derive(Message, Debug)]
#[rtype(result = "Result<(usize, String), StoreError>")]
pub struct ExportRows;

#[derive(Message, Debug)]
#[rtype(result = "Result<(), StoreError>")]
pub struct ClearRows;

#[derive(Message, Debug)]
#[rtype(result = "Result<usize, StoreError>")]
pub struct CountRows;

#[derive(Message)]
#[rtype(result = "()")]
struct JobProgress {
    index: usize,
    total: usize,
}

#[derive(Message)]
#[rtype(result = "()")]
struct JobNote(String);

// ================= Controller Actor =================

pub struct ControllerActor {
    services: Services,
    rows: RowStore,
    badge: Addr<BadgeActor>,
    family: JobFamily,
    status: StatusSnapshot,
    /// Present while a job runs.
    control: Option<watch::Sender<Control>>,
    kind: Option<JobKind>,
    last: Option<JobSummary>,
}

impl ControllerActor {
    pub fn new(services: Services, badge: Addr<BadgeActor>, family: JobFamily) -> Self {
        Self {
            rows: RowStore::new(services.kv.clone()),
            services,
            badge,
            family,
            status: StatusSnapshot::default(),
            control: None,
            kind: None,
            last: None,
        }
    }

    fn set_control(&self, f: impl FnOnce(&mut Control)) {
        if let Some(tx) = &self.control {
            tx.send_modify(f);
        }
    }

    fn finish(&mut self, report: JobReport, end: Result<(), JobError>) {
        self.control = None;
        let kind = self.kind.take().unwrap_or(JobKind::DownloadCurrent);

        let outcome = match end {
            Ok(()) if report.fail == 0 => JobOutcome::Success,
            Ok(()) => JobOutcome::Partial,
            Err(JobError::Stopped) => JobOutcome::Stopped,
            Err(e) => JobOutcome::Error(e.to_string()),
        };
        let message = match &outcome {
            JobOutcome::Success => format!("Done: {} ok", report.ok),
            JobOutcome::Partial => format!("Done: {} ok, {} failed", report.ok, report.fail),
            JobOutcome::Stopped => "stopped".to_string(),
            JobOutcome::Error(msg) => msg.clone(),
        };
        let badge = match &outcome {
            JobOutcome::Success => SetBadge::titled(BadgeState::Success, message.clone()),
            _ => SetBadge::titled(BadgeState::Error, message.clone()),
        };

        self.status.running = false;
        self.status.paused = false;
        self.status.stop_requested = false;
        self.status.last_message = message;
        self.badge.do_send(badge);

        log_report(kind, &outcome, &report);
        self.last = Some(JobSummary {
            kind,
            outcome,
            report,
        });
    }
}

fn log_report(kind: JobKind, outcome: &JobOutcome, report: &JobReport) {
    info!(
        "{} finished ({:?}): {} ok, {} failed",
        kind.title(),
        outcome,
        report.ok,
        report.fail
    );
    for failure in &report.failures {
        warn!("  [{}] {}: {}", failure.index, failure.target, failure.error);
    }
}

impl Actor for ControllerActor {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Context<Self>) {
        info!("ControllerActor started");
    }
}

impl Handler<StartJob> for ControllerActor {
    type Result = Result<(), JobError>;

    fn handle(&mut self, msg: StartJob, ctx: &mut Context<Self>) -> Self::Result {
        if self.status.running {
            return Err(JobError::Busy);
        }
        let kind = msg.0;
        info!("Starting job: {}", kind.title());

        let (tx, rx) = watch::channel(Control::default());
        self.control = Some(tx);
        self.kind = Some(kind);
        self.family = kind.family();
        self.status = StatusSnapshot {
            running: true,
            last_message: format!("{}: preparing", kind.title()),
            ..StatusSnapshot::default()
        };
        self.badge.do_send(SetBadge::titled(
            BadgeState::Idle(self.family),
            format!("{}: preparing", kind.title()),
        ));

        let job = Job {
            kind,
            services: self.services.clone(),
            control: rx,
            controller: ctx.address(),
        };
        ctx.spawn(
            job.run()
                .into_actor(self)
                .map(|(report, end), act, _ctx| act.finish(report, end)),
        );
        Ok(())
    }
}

impl Handler<Pause> for ControllerActor {
    type Result = ();

    fn handle(&mut self, _msg: Pause, _ctx: &mut Context<Self>) {
        if !self.status.running {
            debug!("Pause ignored: no job is running");
            return;
        }
        self.status.paused = true;
        self.set_control(|c| c.paused = true);
        self.badge.do_send(SetBadge::new(BadgeState::Paused));
    }
}

impl Handler<Resume> for ControllerActor {
    type Result = ();

    fn handle(&mut self, _msg: Resume, _ctx: &mut Context<Self>) {
        self.status.paused = false;
        self.set_control(|c| c.paused = false);
        let state = if self.status.running {
            BadgeState::Running {
                current: self.status.current_index.max(1),
                total: self.status.total,
            }
        } else {
            BadgeState::Idle(self.family)
        };
        self.badge.do_send(SetBadge::new(state));
    }
}

impl Handler<Stop> for ControllerActor {
    type Result = ();

    fn handle(&mut self, _msg: Stop, _ctx: &mut Context<Self>) {
        if !self.status.running {
            debug!("Stop ignored: no job is running");
            return;
        }
        info!("Stop requested");
        self.status.stop_requested = true;
        self.status.paused = false;
        self.status.last_message = "stopping".to_string();
        self.set_control(|c| {
            c.stop = true;
            c.paused = false;
        });
        self.badge.do_send(SetBadge::new(BadgeState::Stopping));
    }
}

impl Handler<GetStatus> for ControllerActor {
    type Result = MessageResult<GetStatus>;

    fn handle(&mut self, _msg: GetStatus, _ctx: &mut Context<Self>) -> Self::Result {
        MessageResult(self.status.clone())
    }
}

impl Handler<GetSummary> for ControllerActor {
    type Result = MessageResult<GetSummary>;

    fn handle(&mut self, _msg: GetSummary, _ctx: &mut Context<Self>) -> Self::Result {
        MessageResult(self.last.clone())
    }
}

impl Handler<ApplySettings> for ControllerActor {
    type Result = Result<Settings, StoreError>;

    fn handle(&mut self, msg: ApplySettings, _ctx: &mut Context<Self>) -> Self::Result {
        let kv = self.services.kv.as_ref();
        if let Some(value) = msg.0 {
            Settings::load(kv).merge(&value).save(kv)?;
            info!("Settings saved");
        }
        if !self.status.running {
            self.badge.do_send(SetBadge::new(BadgeState::Idle(self.family)));
        }
        Ok(Settings::load(kv))
    }
}

impl Handler<InitBadge> for ControllerActor {
    type Result = ();

    fn handle(&mut self, _msg: InitBadge, _ctx: &mut Context<Self>) {
        if !self.status.running {
            self.badge.do_send(SetBadge::new(BadgeState::Idle(self.family)));
        }
    }
}

impl Handler<ExportRows> for ControllerActor {
    type Result = Result<(usize, String), StoreError>;

    fn handle(&mut self, _msg: ExportRows, _ctx: &mut Context<Self>) -> Self::Result {
        Ok((self.rows.count()?, self.rows.export_tsv()?))
    }
}

impl Handler<ClearRows> for ControllerActor {
    type Result = Result<(), StoreError>;

    fn handle(&mut self, _msg: ClearRows, _ctx: &mut Context<Self>) -> Self::Result {
        self.rows.clear()
    }
}

impl Handler<CountRows> for ControllerActor {
    type Result = Result<usize, StoreError>;

    fn handle(&mut self, _msg: CountRows, _ctx: &mut Context<Self>) -> Self::Result {
        self.rows.count()
    }
}

impl Handler<JobProgress> for ControllerActor {
    type Result = ();

    fn handle(&mut self, msg: JobProgress, _ctx: &mut Context<Self>) {
        // Late delivery after the job has finished.
        if !self.status.running {
            return;
        }
        self.status.current_index = msg.index;
        self.status.total = msg.total;
        self.status.progress_text = format!("{}/{}", msg.index, msg.total);
        if !self.status.paused && !self.status.stop_requested {
            self.badge.do_send(SetBadge::new(BadgeState::Running {
                current: msg.index,
                total: msg.total,
            }));
        }
    }
}

impl Handler<JobNote> for ControllerActor {
    type Result = ();

    fn handle(&mut self, msg: JobNote, _ctx: &mut Context<Self>) {
        if self.status.running && !self.status.stop_requested {
            self.status.last_message = msg.0;
        }
    }
}

// ================= Job =================

/// Returns at once unless paused; waits for a change while paused. Stop
/// wins over pause.
pub(crate) async fn checkpoint(control: &mut watch::Receiver<Control>) -> Result<(), JobError> {
    loop {
        let state = *control.borrow_and_update();
        if state.stop {
            return Err(JobError::Stopped);
        }
        if !state.paused {
            return Ok(());
        }
        if control.changed().await.is_err() {
            return Err(JobError::Stopped);
        }
    }
}

struct Job {
    kind: JobKind,
    services: Services,
    control: watch::Receiver<Control>,
    controller: Addr<ControllerActor>,
}

impl Job {
    async fn run(mut self) -> (JobReport, Result<(), JobError>) {
        let mut report = JobReport::default();
        let settings = Settings::load(self.services.kv.as_ref());
        debug!("Job settings: {:?}", settings);

        let end = match self.kind {
            JobKind::CollectRight => self.collect_right(&mut report).await,
            JobKind::ExportOpen => self.export_open(&settings, &mut report).await,
            JobKind::DownloadCurrent => match self.current_resume().await {
                Ok(resume) => self.download(vec![resume], &settings, &mut report).await,
                Err(e) => Err(e),
            },
            JobKind::DownloadRight => match self.resumes_right().await {
                Ok(refs) => self.download(refs, &settings, &mut report).await,
                Err(e) => Err(e),
            },
        };
        (report, end)
    }

    async fn checkpoint(&mut self) -> Result<(), JobError> {
        checkpoint(&mut self.control).await
    }

    fn progress(&self, index: usize, total: usize) {
        debug!("{}: {}", self.kind.title(), progress_text(index, total));
        self.controller.do_send(JobProgress { index, total });
    }

    fn note(&self, message: String) {
        self.controller.do_send(JobNote(message));
    }

    fn record(
        &self,
        report: &mut JobReport,
        index: usize,
        total: usize,
        target: &str,
        result: Result<String, TargetError>,
    ) {
        match result {
            Ok(message) => {
                report.ok += 1;
                info!("[{}/{}] {}", index, total, message);
                self.note(message);
            }
            Err(error) => {
                report.fail += 1;
                warn!("[{}/{}] {} failed: {}", index, total, target, error);
                self.note(format!("{}/{} failed: {}", index, total, error));
                report.failures.push(Failure {
                    index: format!("{}/{}", index, total),
                    target: target.to_string(),
                    error,
                });
            }
        }
    }

    async fn active_tab(&self) -> Result<TabInfo, JobError> {
        self.services
            .browser
            .active_tab()
            .await?
            .ok_or_else(|| JobError::Setup("no active tab".into()))
    }

    async fn current_resume(&self) -> Result<ResumeRef, JobError> {
        let active = self.active_tab().await?;
        targets::current_resume(Some(&active))
    }

    async fn resumes_right(&self) -> Result<Vec<ResumeRef>, JobError> {
        let active = self.active_tab().await?;
        let tabs = self.services.browser.tabs().await?;
        targets::resumes_right(&tabs, &active.id)
    }

    async fn collect_right(&mut self, report: &mut JobReport) -> Result<(), JobError> {
        let active = self.active_tab().await?;
        let tabs = self.services.browser.tabs().await?;
        let start = tabs
            .iter()
            .find(|t| t.id == active.id)
            .map(|t| t.position)
            .ok_or_else(|| JobError::Setup("could not locate the active tab".into()))?;
        let targets = targets::collect_right(&tabs, start);
        if targets.is_empty() {
            return Err(JobError::Setup(format!(
                "no {} tabs at or right of the active tab",
                targets::SITE_PREFIX
            )));
        }

        let rows = RowStore::new(self.services.kv.clone());
        let total = targets.len();
        for (i, target) in targets.iter().enumerate() {
            let index = i + 1;
            self.checkpoint().await?;
            self.progress(index, total);

            let result = match self.services.browser.activate(&target.id).await {
                Ok(()) => {
                    tokio::time::sleep(self.services.timing.collect_settle).await;
                    self.checkpoint().await?;
                    self.collect_from(target, &rows).await
                }
                Err(e) => Err(e.into()),
            };
            self.record(report, index, total, &target.url, result);

            if index < total {
                tokio::time::sleep(self.services.timing.collect_gap).await;
            }
        }
        Ok(())
    }

    async fn collect_from(&self, target: &Target, rows: &RowStore) -> Result<String, TargetError> {
        let page = self.services.browser.attach(&target.id).await?;
        let outcome = self.services.reader.read_contact(page.as_ref()).await;
        if let Err(e) = page.detach().await {
            warn!("Detaching from tab {} failed: {}", target.id, e);
        }

        match outcome {
            ExtractOutcome::Ok { line, resume_code } => {
                let appended = rows.append(&line)?;
                Ok(if appended.added {
                    format!("Saved {} ({} rows)", resume_code, appended.count)
                } else {
                    format!("Already saved {} ({} rows)", resume_code, appended.count)
                })
            }
            ExtractOutcome::Failed { error } => Err(TargetError::Extraction(error)),
        }
    }

    async fn export_open(&mut self, settings: &Settings, report: &mut JobReport) -> Result<(), JobError> {
        let tabs = self.services.browser.tabs().await?;
        let targets = targets::preview_tabs(&tabs);
        if targets.is_empty() {
            return Err(JobError::Setup("no resume preview tabs are open".into()));
        }

        let total = targets.len();
        for (i, target) in targets.iter().enumerate() {
            let index = i + 1;
            self.checkpoint().await?;
            self.progress(index, total);

            let result = match self.services.browser.activate(&target.id).await {
                Ok(()) => {
                    tokio::time::sleep(settings.settle(i == 0)).await;
                    self.checkpoint().await?;
                    self.print_tab(target, settings).await?
                }
                Err(e) => Err(e.into()),
            };
            self.record(report, index, total, &target.url, result);
        }
        Ok(())
    }

    /// Outer error: the job was stopped between print and save.
    async fn print_tab(
        &mut self,
        target: &Target,
        settings: &Settings,
    ) -> Result<Result<String, TargetError>, JobError> {
        let page = match self.services.browser.attach(&target.id).await {
            Ok(page) => page,
            Err(e) => return Ok(Err(e.into())),
        };
        let printed = print_page(page.as_ref(), "untitled").await;
        if let Err(e) = page.detach().await {
            warn!("Detaching from tab {} failed: {}", target.id, e);
        }
        let printed = match printed {
            Ok(printed) => printed,
            Err(e) => return Ok(Err(e)),
        };

        self.checkpoint().await?;
        Ok(save_printed(self.services.sink.as_ref(), settings, &printed)
            .await
            .map(|path| format!("Saved {}", path)))
    }

    async fn download(
        &mut self,
        refs: Vec<ResumeRef>,
        settings: &Settings,
        report: &mut JobReport,
    ) -> Result<(), JobError> {
        let timing = ExportTiming {
            page_load: self.services.timing.page_load,
        };
        let total = refs.len();
        for (i, resume) in refs.iter().enumerate() {
            let index = i + 1;
            self.checkpoint().await?;
            self.progress(index, total);

            let result = export_resume(
                self.services.browser.as_ref(),
                self.services.sink.as_ref(),
                resume,
                settings,
                i == 0,
                &timing,
                &mut self.control,
            )
            .await?
            .map(|path| format!("Saved {}", path));
            self.record(report, index, total, &resume.dedup_key(), result);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::badge::CurrentBadge;
    use crate::settings::SETTINGS_SLOT;
    use crate::store::MemoryStore;
    use crate::testing::{FakeBrowser, FakeReader, MemorySink, PageScript, RecordingSink};
    use serde_json::json;

    const SITE: &str = "https://vip.104.com.tw/";

    struct Harness {
        controller: Addr<ControllerActor>,
        badge: Addr<BadgeActor>,
        browser: FakeBrowser,
        sink: MemorySink,
        kv: Arc<MemoryStore>,
    }

    fn harness(browser: FakeBrowser, reader: FakeReader, settle: Duration) -> Harness {
        let kv = Arc::new(MemoryStore::default());
        // keep export settles short
        kv.set(SETTINGS_SLOT, json!({"firstWaitMs": 5, "nextWaitMs": 5})).unwrap();
        let sink = MemorySink::default();
        let services = Services {
            browser: Arc::new(browser.clone()),
            kv: kv.clone(),
            sink: Arc::new(sink.clone()),
            reader: Arc::new(reader),
            timing: JobTiming {
                collect_settle: settle,
                collect_gap: Duration::from_millis(1),
                page_load: Duration::from_secs(1),
            },
        };
        let badge = BadgeActor::new(
            Box::new(RecordingSink::default()),
            JobFamily::Collect,
            Duration::from_secs(30),
        )
        .start();
        let controller = ControllerActor::new(services, badge.clone(), JobFamily::Collect).start();
        Harness {
            controller,
            badge,
            browser,
            sink,
            kv,
        }
    }

    async fn wait_until(controller: &Addr<ControllerActor>, done: impl Fn(&StatusSnapshot) -> bool) -> StatusSnapshot {
        for _ in 0..200 {
            let status = controller.send(GetStatus).await.unwrap();
            if done(&status) {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition never reached");
    }

    async fn finished(h: &Harness) -> (StatusSnapshot, JobSummary) {
        let status = wait_until(&h.controller, |s| !s.running).await;
        let summary = h.controller.send(GetSummary).await.unwrap().unwrap();
        (status, summary)
    }

    fn site_tabs(n: usize) -> Vec<(String, String)> {
        (0..n).map(|i| (format!("T{}", i), format!("{}page{}", SITE, i))).collect()
    }

    #[actix_rt::test]
    async fn one_failing_target_does_not_stop_the_batch() {
        let mut tabs = site_tabs(3);
        tabs.push(("X".into(), "https://other.com/".into()));
        let browser = FakeBrowser::new(tabs).with_active("T0");
        let h = harness(browser, FakeReader::default().failing("T1"), Duration::from_millis(1));

        h.controller.send(StartJob(JobKind::CollectRight)).await.unwrap().unwrap();
        let (status, summary) = finished(&h).await;

        assert_eq!(summary.outcome, JobOutcome::Partial);
        assert_eq!((summary.report.ok, summary.report.fail), (2, 1));
        assert_eq!(summary.report.failures[0].index, "2/3");
        assert_eq!(h.browser.activations(), vec!["T0", "T1", "T2"]);
        assert_eq!(h.controller.send(CountRows).await.unwrap().unwrap(), 2);
        assert_eq!(status.last_message, "Done: 2 ok, 1 failed");
        assert_eq!(h.badge.send(CurrentBadge).await.unwrap().text, "ERR");
    }

    #[actix_rt::test]
    async fn clean_run_ends_in_success_and_dedups() {
        let browser = FakeBrowser::new(site_tabs(3)).with_active("T1");
        let reader = FakeReader::default().with_code("T1", "1001").with_code("T2", "1001");
        let h = harness(browser, reader, Duration::from_millis(1));

        h.controller.send(StartJob(JobKind::CollectRight)).await.unwrap().unwrap();
        let (status, summary) = finished(&h).await;

        assert_eq!(summary.outcome, JobOutcome::Success);
        assert_eq!(summary.report.ok, 2);
        assert_eq!(status.progress_text, "2/2");
        let (count, text) = h.controller.send(ExportRows).await.unwrap().unwrap();
        assert_eq!(count, 1);
        assert!(text.ends_with("\t1001"));
        assert_eq!(h.badge.send(CurrentBadge).await.unwrap().text, "OK");
    }

    #[actix_rt::test]
    async fn second_start_is_rejected_while_running() {
        let browser = FakeBrowser::new(site_tabs(2)).with_active("T0");
        let h = harness(browser, FakeReader::default(), Duration::from_millis(100));

        h.controller.send(StartJob(JobKind::CollectRight)).await.unwrap().unwrap();
        let second = h.controller.send(StartJob(JobKind::DownloadRight)).await.unwrap();
        assert_eq!(second, Err(JobError::Busy));
        finished(&h).await;
    }

    #[actix_rt::test]
    async fn pause_holds_the_job_and_stop_ends_it() {
        let browser = FakeBrowser::new(site_tabs(3)).with_active("T0");
        let h = harness(browser, FakeReader::default(), Duration::from_millis(150));

        h.controller.send(StartJob(JobKind::CollectRight)).await.unwrap().unwrap();
        wait_until(&h.controller, |s| s.current_index == 1).await;
        h.controller.send(Pause).await.unwrap();

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(h.browser.activations(), vec!["T0"]);
        let status = h.controller.send(GetStatus).await.unwrap();
        assert!(status.running && status.paused);
        assert_eq!(h.badge.send(CurrentBadge).await.unwrap().text, "||");

        h.controller.send(Stop).await.unwrap();
        let (status, summary) = finished(&h).await;
        assert_eq!(summary.outcome, JobOutcome::Stopped);
        assert_eq!(status.last_message, "stopped");
        assert_eq!(h.browser.activations(), vec!["T0"]);
        assert_eq!(h.badge.send(CurrentBadge).await.unwrap().title, "stopped");
    }

    #[actix_rt::test]
    async fn resume_continues_where_it_paused() {
        let browser = FakeBrowser::new(site_tabs(2)).with_active("T0");
        let h = harness(browser, FakeReader::default(), Duration::from_millis(100));

        h.controller.send(StartJob(JobKind::CollectRight)).await.unwrap().unwrap();
        wait_until(&h.controller, |s| s.current_index == 1).await;
        h.controller.send(Pause).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        h.controller.send(Resume).await.unwrap();

        let (_, summary) = finished(&h).await;
        assert_eq!(summary.outcome, JobOutcome::Success);
        assert_eq!(summary.report.ok, 2);
    }

    #[actix_rt::test]
    async fn setup_error_aborts_before_any_target() {
        let browser = FakeBrowser::new(site_tabs(2)).with_active("T0");
        let h = harness(browser, FakeReader::default(), Duration::from_millis(1));

        h.controller.send(StartJob(JobKind::ExportOpen)).await.unwrap().unwrap();
        let (status, summary) = finished(&h).await;

        assert_eq!(
            summary.outcome,
            JobOutcome::Error("no resume preview tabs are open".into())
        );
        assert_eq!(status.last_message, "no resume preview tabs are open");
        assert!(h.browser.activations().is_empty());
        assert_eq!(h.badge.send(CurrentBadge).await.unwrap().text, "ERR");
    }

    #[actix_rt::test]
    async fn download_right_exports_each_resume_once() {
        let tabs = vec![
            ("A".to_string(), format!("{}search/searchResumeMaster?idno=1", SITE)),
            ("B".to_string(), format!("{}document/master?sn=5", SITE)),
            ("C".to_string(), format!("{}search/searchResumeMaster?idno=1", SITE)),
            ("D".to_string(), "https://other.com/".to_string()),
        ];
        let browser = FakeBrowser::new(tabs).with_active("A");
        browser.script_url("searchEngineIdNos=1", PageScript::named("Alice"));
        browser.script_url("snapshotIds=5", PageScript::named(""));
        let h = harness(browser, FakeReader::default(), Duration::from_millis(1));

        h.controller.send(StartJob(JobKind::DownloadRight)).await.unwrap().unwrap();
        let (_, summary) = finished(&h).await;

        assert_eq!(summary.outcome, JobOutcome::Success);
        let names: Vec<String> = h.sink.files().into_iter().map(|(p, _)| p).collect();
        assert_eq!(names, vec!["104履歷下載區/Alice.pdf", "104履歷下載區/sn_5.pdf"]);
        let closes = h.browser.log().iter().filter(|l| l.starts_with("close ")).count();
        assert_eq!(closes, 2);
    }

    #[actix_rt::test]
    async fn export_open_prints_preview_tabs_in_place() {
        let tabs = vec![
            ("P1".to_string(), format!("{}ResumeTools/resumePreview?snapshotIds=1", SITE)),
            ("S".to_string(), format!("{}search/list", SITE)),
            ("P2".to_string(), format!("{}ResumeTools/resumePreview?snapshotIds=2", SITE)),
        ];
        let browser = FakeBrowser::new(tabs).with_active("S");
        browser.script_url("snapshotIds=1", PageScript::named("Bob"));
        let h = harness(browser, FakeReader::default(), Duration::from_millis(1));

        h.controller.send(StartJob(JobKind::ExportOpen)).await.unwrap().unwrap();
        let (_, summary) = finished(&h).await;

        assert_eq!(summary.report.ok, 2);
        assert_eq!(h.browser.activations(), vec!["P1", "P2"]);
        let names: Vec<String> = h.sink.files().into_iter().map(|(p, _)| p).collect();
        assert_eq!(names, vec!["104履歷下載區/Bob.pdf", "104履歷下載區/untitled.pdf"]);
    }

    async fn wait_for_log(browser: &FakeBrowser, entry: &str) {
        for _ in 0..200 {
            if browser.log().iter().any(|l| l == entry) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{} never logged", entry);
    }

    #[actix_rt::test]
    async fn stop_while_printing_saves_nothing() {
        let tabs = vec![
            ("P1".to_string(), format!("{}ResumeTools/resumePreview?snapshotIds=1", SITE)),
            ("P2".to_string(), format!("{}ResumeTools/resumePreview?snapshotIds=2", SITE)),
        ];
        let browser = FakeBrowser::new(tabs);
        browser.script_url(
            "snapshotIds=1",
            PageScript::named("Bob").with_print_delay(Duration::from_millis(300)),
        );
        let h = harness(browser, FakeReader::default(), Duration::from_millis(1));

        h.controller.send(StartJob(JobKind::ExportOpen)).await.unwrap().unwrap();
        wait_for_log(&h.browser, "print P1").await;
        h.controller.send(Stop).await.unwrap();

        let (_, summary) = finished(&h).await;
        assert_eq!(summary.outcome, JobOutcome::Stopped);
        assert!(h.sink.files().is_empty());
        assert_eq!(h.browser.activations(), vec!["P1"]);
    }

    #[actix_rt::test]
    async fn stop_during_download_settle_skips_print() {
        let tabs = vec![("A".to_string(), format!("{}search/searchResumeMaster?idno=1", SITE))];
        let browser = FakeBrowser::new(tabs).with_active("A");
        let h = harness(browser, FakeReader::default(), Duration::from_millis(1));
        h.controller
            .send(ApplySettings(Some(json!({"firstWaitMs": 300}))))
            .await
            .unwrap()
            .unwrap();

        h.controller.send(StartJob(JobKind::DownloadRight)).await.unwrap().unwrap();
        wait_for_log(&h.browser, "attach N1").await;
        h.controller.send(Stop).await.unwrap();

        let (status, summary) = finished(&h).await;
        assert_eq!(summary.outcome, JobOutcome::Stopped);
        assert_eq!(status.last_message, "stopped");
        assert!(h.sink.files().is_empty());
        let log = h.browser.log();
        assert!(!log.iter().any(|l| l.starts_with("print ")));
        assert!(log.iter().any(|l| l == "close N1"));
    }

    #[actix_rt::test]
    async fn download_current_needs_a_resume_page() {
        let browser = FakeBrowser::new(site_tabs(1)).with_active("T0");
        let h = harness(browser, FakeReader::default(), Duration::from_millis(1));

        h.controller.send(StartJob(JobKind::DownloadCurrent)).await.unwrap().unwrap();
        let (_, summary) = finished(&h).await;
        assert!(matches!(summary.outcome, JobOutcome::Error(_)));
        assert!(h.sink.files().is_empty());
    }

    #[actix_rt::test]
    async fn settings_are_merged_and_persisted() {
        let h = harness(FakeBrowser::new(vec![]), FakeReader::default(), Duration::from_millis(1));

        let applied = h
            .controller
            .send(ApplySettings(Some(json!({"filenamePrefix": "PM", "nextWaitMs": "x"}))))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(applied.filename_prefix, "PM");
        assert_eq!(applied.next_wait_ms, 5);
        assert_eq!(Settings::load(h.kv.as_ref()).filename_prefix, "PM");

        let unchanged = h.controller.send(ApplySettings(None)).await.unwrap().unwrap();
        assert_eq!(unchanged, applied);
        assert_eq!(h.badge.send(CurrentBadge).await.unwrap().text, "COPY");
    }

    #[actix_rt::test]
    async fn checkpoint_prefers_stop() {
        let (tx, mut rx) = watch::channel(Control::default());
        assert!(checkpoint(&mut rx).await.is_ok());
        tx.send_modify(|c| {
            c.paused = true;
            c.stop = true;
        });
        assert_eq!(checkpoint(&mut rx).await, Err(JobError::Stopped));
    }
}

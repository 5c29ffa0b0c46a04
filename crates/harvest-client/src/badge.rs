//! Short status badge: a text label, a color and a tooltip.

use actix::prelude::*;
use log::{debug, info};
use std::time::Duration;

pub const IDLE_COLOR: &str = "#1a73e8";
pub const RUNNING_COLOR: &str = "#1a73e8";
pub const OK_COLOR: &str = "#34a853";
pub const ERR_COLOR: &str = "#d93025";
pub const PAUSED_COLOR: &str = "#f29900";

/// Which job the badge idles for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobFamily {
    Collect,
    #[default]
    Export,
}

impl JobFamily {
    pub fn idle_label(self) -> &'static str {
        match self {
            JobFamily::Collect => "COPY",
            JobFamily::Export => "PDF",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadgeState {
    Idle(JobFamily),
    Running { current: usize, total: usize },
    Paused,
    Stopping,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadgeView {
    pub text: String,
    pub color: &'static str,
    pub title: String,
}

/// `"current/total"` while it fits in four characters, else `current`.
pub fn progress_text(current: usize, total: usize) -> String {
    let full = format!("{}/{}", current, total);
    if full.chars().count() <= 4 {
        full
    } else {
        current.to_string()
    }
}

impl BadgeState {
    pub fn view(self, title: Option<String>) -> BadgeView {
        let (text, color, default_title) = match self {
            BadgeState::Idle(family) => (
                family.idle_label().to_string(),
                IDLE_COLOR,
                family.idle_label().to_string(),
            ),
            BadgeState::Running { current, total } => (
                progress_text(current, total),
                RUNNING_COLOR,
                format!("Processing {}/{}", current, total),
            ),
            BadgeState::Paused => ("||".to_string(), PAUSED_COLOR, "Paused".to_string()),
            BadgeState::Stopping => ("STOP".to_string(), ERR_COLOR, "Stopping…".to_string()),
            BadgeState::Success => ("OK".to_string(), OK_COLOR, "Done".to_string()),
            BadgeState::Error => ("ERR".to_string(), ERR_COLOR, "Error".to_string()),
        };
        BadgeView {
            text,
            color,
            title: title.unwrap_or(default_title),
        }
    }

    fn resets(self) -> bool {
        matches!(self, BadgeState::Success | BadgeState::Error)
    }
}

/// Where badge updates are shown. Must not block.
pub trait BadgeSink {
    fn render(&mut self, view: &BadgeView);
}

/// Renders the badge as a log line.
#[derive(Default)]
pub struct LogBadgeSink;

impl BadgeSink for LogBadgeSink {
    fn render(&mut self, view: &BadgeView) {
        info!("[{}] {} ({})", view.text, view.title, view.color);
    }
}

#[derive(Message, Debug, Clone)]
#[rtype(result = "()")]
pub struct SetBadge {
    pub state: BadgeState,
    pub title: Option<String>,
}

impl SetBadge {
    pub fn new(state: BadgeState) -> Self {
        Self { state, title: None }
    }

    pub fn titled(state: BadgeState, title: impl Into<String>) -> Self {
        Self {
            state,
            title: Some(title.into()),
        }
    }
}

#[derive(Message, Debug)]
#[rtype(result = "BadgeView")]
pub struct CurrentBadge;

#[derive(Message)]
#[rtype(result = "()")]
struct ResetToIdle {
    generation: u64,
}

/// Owns the badge. Success and Error fall back to idle after `reset_after`
/// unless another update arrived in between.
pub struct BadgeActor {
    sink: Box<dyn BadgeSink>,
    family: JobFamily,
    view: BadgeView,
    generation: u64,
    reset_after: Duration,
}

impl BadgeActor {
    pub fn new(sink: Box<dyn BadgeSink>, family: JobFamily, reset_after: Duration) -> Self {
        Self {
            sink,
            family,
            view: BadgeState::Idle(family).view(None),
            generation: 0,
            reset_after,
        }
    }

    fn show(&mut self, view: BadgeView) {
        self.sink.render(&view);
        self.view = view;
    }
}

impl Actor for BadgeActor {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Context<Self>) {
        let view = self.view.clone();
        self.show(view);
    }
}

impl Handler<SetBadge> for BadgeActor {
    type Result = ();

    fn handle(&mut self, msg: SetBadge, ctx: &mut Context<Self>) {
        self.generation += 1;
        if let BadgeState::Idle(family) = msg.state {
            self.family = family;
        }
        self.show(msg.state.view(msg.title));

        if msg.state.resets() {
            let generation = self.generation;
            ctx.run_later(self.reset_after, move |_act, ctx| {
                ctx.notify(ResetToIdle { generation });
            });
        }
    }
}

impl Handler<ResetToIdle> for BadgeActor {
    type Result = ();

    fn handle(&mut self, msg: ResetToIdle, _ctx: &mut Context<Self>) {
        if msg.generation != self.generation {
            debug!("Skipping stale badge reset");
            return;
        }
        let view = BadgeState::Idle(self.family).view(None);
        self.show(view);
    }
}

impl Handler<CurrentBadge> for BadgeActor {
    type Result = MessageResult<CurrentBadge>;

    fn handle(&mut self, _msg: CurrentBadge, _ctx: &mut Context<Self>) -> Self::Result {
        MessageResult(self.view.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSink;

    const RESET: Duration = Duration::from_millis(60);

    #[test]
    fn progress_text_truncates() {
        assert_eq!(progress_text(3, 9), "3/9");
        assert_eq!(progress_text(3, 12), "3/12");
        assert_eq!(progress_text(12, 34), "12");
        assert_eq!(progress_text(100, 250), "100");
    }

    #[test]
    fn views_match_states() {
        let idle = BadgeState::Idle(JobFamily::Collect).view(None);
        assert_eq!((idle.text.as_str(), idle.color), ("COPY", IDLE_COLOR));
        let paused = BadgeState::Paused.view(None);
        assert_eq!((paused.text.as_str(), paused.color), ("||", PAUSED_COLOR));
        let stop = BadgeState::Stopping.view(Some("halt".into()));
        assert_eq!((stop.text.as_str(), stop.title.as_str()), ("STOP", "halt"));
    }

    #[actix_rt::test]
    async fn success_returns_to_idle() {
        let sink = RecordingSink::default();
        let views = sink.views.clone();
        let badge = BadgeActor::new(Box::new(sink), JobFamily::Export, RESET).start();

        badge.send(SetBadge::new(BadgeState::Success)).await.unwrap();
        assert_eq!(badge.send(CurrentBadge).await.unwrap().text, "OK");

        tokio::time::sleep(RESET * 3).await;
        assert_eq!(badge.send(CurrentBadge).await.unwrap().text, "PDF");
        let texts: Vec<String> = views.lock().unwrap().iter().map(|v| v.text.clone()).collect();
        assert_eq!(texts, vec!["PDF", "OK", "PDF"]);
    }

    #[actix_rt::test]
    async fn newer_update_suppresses_reset() {
        let sink = RecordingSink::default();
        let badge = BadgeActor::new(Box::new(sink), JobFamily::Collect, RESET).start();

        badge.send(SetBadge::new(BadgeState::Error)).await.unwrap();
        badge
            .send(SetBadge::new(BadgeState::Running { current: 1, total: 3 }))
            .await
            .unwrap();

        tokio::time::sleep(RESET * 3).await;
        assert_eq!(badge.send(CurrentBadge).await.unwrap().text, "1/3");
    }

    #[actix_rt::test]
    async fn reset_uses_latest_family() {
        let sink = RecordingSink::default();
        let badge = BadgeActor::new(Box::new(sink), JobFamily::Export, RESET).start();

        badge.send(SetBadge::new(BadgeState::Idle(JobFamily::Collect))).await.unwrap();
        badge.send(SetBadge::new(BadgeState::Error)).await.unwrap();
        tokio::time::sleep(RESET * 3).await;
        assert_eq!(badge.send(CurrentBadge).await.unwrap().text, "COPY");
    }
}

//! Line-oriented console over the command protocol.

use crate::command::{Command, Response, dispatch};
use crate::controller::{ControllerActor, StatusSnapshot};
use actix::prelude::*;
use log::{debug, info};
use serde::Serialize;
use std::io::Write;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Writes `value` as one JSON line.
pub fn write_json<W: Write, T: Serialize>(out: &mut W, value: &T) -> std::io::Result<()> {
    let text = serde_json::to_string(value).map_err(std::io::Error::other)?;
    writeln!(out, "{}", text)?;
    out.flush()
}

async fn status(controller: &Addr<ControllerActor>) -> Option<StatusSnapshot> {
    match dispatch(controller, Command::GetStatus).await {
        Response::Status(status) => Some(status),
        _ => None,
    }
}

fn is_running(status: &Option<StatusSnapshot>) -> bool {
    status.as_ref().is_some_and(|s| s.running)
}

/// Reads commands from `input` and writes responses and progress to `out`.
///
/// Returns on `quit`, or once input has ended and no job is running; a job
/// still running at end of input is followed until it finishes. With
/// `until_done`, also returns as soon as the running job finishes.
pub async fn run_console<R, W>(
    controller: &Addr<ControllerActor>,
    input: R,
    out: &mut W,
    poll: Duration,
    until_done: bool,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    let mut input_open = true;
    let mut ticker = tokio::time::interval(poll);
    let mut last = status(controller).await;
    if until_done && !is_running(&last) {
        if let Some(s) = &last {
            write_json(out, s)?;
        }
        return Ok(());
    }

    loop {
        tokio::select! {
            line = lines.next_line(), if input_open => {
                let Some(line) = line? else {
                    input_open = false;
                    let current = status(controller).await;
                    if !is_running(&current) {
                        break;
                    }
                    info!("Input closed; waiting for the running job to finish");
                    continue;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if matches!(line, "quit" | "exit") {
                    break;
                }
                debug!("Console command: {}", line);
                let response = match Command::parse(line) {
                    Ok(command) => dispatch(controller, command).await,
                    Err(e) => Response::error(e),
                };
                write_json(out, &response)?;
            }
            _ = ticker.tick() => {
                let Some(current) = status(controller).await else {
                    continue;
                };
                let was_running = is_running(&last);
                if last.as_ref() != Some(&current) && (current.running || was_running) {
                    write_json(out, &current)?;
                }
                let finished = was_running && !current.running;
                let idle = !current.running;
                last = Some(current);
                if (until_done && finished) || (!input_open && idle) {
                    break;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::badge::{BadgeActor, JobFamily};
    use crate::controller::{GetStatus, GetSummary, JobKind, JobOutcome, JobTiming, Services, StartJob};
    use crate::store::MemoryStore;
    use crate::testing::{FakeBrowser, FakeReader, MemorySink, RecordingSink};
    use std::sync::Arc;

    fn controller(browser: FakeBrowser, settle: Duration) -> Addr<ControllerActor> {
        let services = Services {
            browser: Arc::new(browser),
            kv: Arc::new(MemoryStore::default()),
            sink: Arc::new(MemorySink::default()),
            reader: Arc::new(FakeReader::default()),
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
        ControllerActor::new(services, badge, JobFamily::Collect).start()
    }

    fn site_tabs(n: usize) -> Vec<(String, String)> {
        (0..n)
            .map(|i| (format!("T{}", i), format!("https://vip.104.com.tw/page{}", i)))
            .collect()
    }

    fn output_lines(out: &[u8]) -> Vec<String> {
        String::from_utf8_lossy(out).lines().map(str::to_string).collect()
    }

    #[actix_rt::test]
    async fn closed_input_waits_for_the_running_job() {
        let controller = controller(FakeBrowser::new(site_tabs(3)).with_active("T0"), Duration::from_millis(80));
        controller.send(StartJob(JobKind::CollectRight)).await.unwrap().unwrap();

        let mut out = Vec::new();
        run_console(&controller, &b""[..], &mut out, Duration::from_millis(10), false)
            .await
            .unwrap();

        assert!(!controller.send(GetStatus).await.unwrap().running);
        let summary = controller.send(GetSummary).await.unwrap().unwrap();
        assert_eq!(summary.outcome, JobOutcome::Success);
        assert_eq!(summary.report.ok, 3);
        let last = output_lines(&out).pop().unwrap();
        assert!(last.contains("\"running\":false"), "{}", last);
    }

    #[actix_rt::test]
    async fn job_started_from_input_outlives_end_of_input() {
        let controller = controller(FakeBrowser::new(site_tabs(2)).with_active("T0"), Duration::from_millis(80));

        let mut out = Vec::new();
        run_console(&controller, &b"collectRight\n"[..], &mut out, Duration::from_millis(10), false)
            .await
            .unwrap();

        assert_eq!(output_lines(&out)[0], r#"{"ok":true}"#);
        let summary = controller.send(GetSummary).await.unwrap().unwrap();
        assert_eq!(summary.report.ok, 2);
    }

    #[actix_rt::test]
    async fn idle_console_answers_and_exits_at_end_of_input() {
        let controller = controller(FakeBrowser::new(vec![]), Duration::from_millis(1));

        let mut out = Vec::new();
        run_console(
            &controller,
            &b"countRows\n\n{\"cmd\":\"nope\"}\n"[..],
            &mut out,
            Duration::from_secs(60),
            false,
        )
        .await
        .unwrap();

        let lines = output_lines(&out);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"count\":0"));
        assert!(lines[1].contains("\"ok\":false"));
        assert!(controller.send(GetSummary).await.unwrap().is_none());
    }

    #[actix_rt::test]
    async fn until_done_returns_at_once_when_idle() {
        let controller = controller(FakeBrowser::new(vec![]), Duration::from_millis(1));
        let mut out = Vec::new();
        run_console(&controller, &b""[..], &mut out, Duration::from_secs(60), true)
            .await
            .unwrap();
        assert!(output_lines(&out)[0].contains("\"running\":false"));
    }
}

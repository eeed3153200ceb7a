use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use super::history::{History, HistoryEntry, RunStatus, Trigger};
use super::machine::{Effect, Machine};
use super::{RefreshAction, SchedulerStatus};
use crate::config::SchedulerConfig;

const COMMAND_QUEUE_DEPTH: usize = 32;
const COUNTDOWN_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("scheduler is not running")]
    Stopped,
}

/// Result of a manual "reset and run now" request.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(HistoryEntry),
    /// Another refresh was already in flight; nothing was started.
    AlreadyRefreshing,
}

enum Command {
    Toggle(oneshot::Sender<bool>),
    SetActive(bool, oneshot::Sender<bool>),
    RunNow(oneshot::Sender<RunOutcome>),
}

struct Finished {
    run_id: Uuid,
    trigger: Trigger,
    started_at: DateTime<Utc>,
    result: anyhow::Result<String>,
}

enum Event {
    Command(Command),
    Finished(Finished),
    Tick,
}

/// Cloneable control handle for a running scheduler.
///
/// The scheduler task stops once every handle has been dropped. A refresh
/// already in flight at that point still runs to completion.
#[derive(Clone)]
pub struct SchedulerHandle {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<SchedulerStatus>,
}

impl SchedulerHandle {
    pub fn status(&self) -> SchedulerStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SchedulerStatus> {
        self.status.clone()
    }

    /// Flip auto-refresh on or off. Returns the new active state.
    pub async fn toggle(&self) -> Result<bool, SchedulerError> {
        self.request(Command::Toggle).await
    }

    pub async fn set_active(&self, active: bool) -> Result<bool, SchedulerError> {
        self.request(|reply| Command::SetActive(active, reply)).await
    }

    /// Cancel the pending countdown, run a refresh now and wait for it.
    /// Re-arms afterwards if auto-refresh is still enabled.
    pub async fn reset_and_run_now(&self) -> Result<RunOutcome, SchedulerError> {
        self.request(Command::RunNow).await
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SchedulerError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| SchedulerError::Stopped)?;
        rx.await.map_err(|_| SchedulerError::Stopped)
    }
}

/// Start the scheduler task.
pub fn spawn(
    config: &SchedulerConfig,
    action: Arc<dyn RefreshAction>,
) -> (SchedulerHandle, JoinHandle<()>) {
    let (machine, initial) = Machine::new(config.interval_secs, config.enabled);
    let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
    let (finished_tx, finished_rx) = mpsc::channel(1);

    let history = History::new(config.history_len);
    let (status_tx, status_rx) = watch::channel(status_of(&machine, &history));

    let mut driver = Driver {
        machine,
        history,
        action,
        ticker: None,
        waiters: Vec::new(),
        finished_tx,
        status_tx,
    };
    driver.apply(initial, Trigger::Scheduled);
    driver.publish();

    let task = tokio::spawn(run(driver, command_rx, finished_rx));
    (
        SchedulerHandle {
            commands: command_tx,
            status: status_rx,
        },
        task,
    )
}

/// Owns the machine, the countdown timer and the in-flight refresh.
struct Driver {
    machine: Machine,
    history: History,
    action: Arc<dyn RefreshAction>,
    ticker: Option<Interval>,
    waiters: Vec<oneshot::Sender<RunOutcome>>,
    finished_tx: mpsc::Sender<Finished>,
    status_tx: watch::Sender<SchedulerStatus>,
}

async fn run(
    mut driver: Driver,
    mut commands: mpsc::Receiver<Command>,
    mut finished: mpsc::Receiver<Finished>,
) {
    info!(
        interval_secs = driver.machine.interval_secs(),
        active = driver.machine.is_active(),
        "refresh scheduler started"
    );

    loop {
        let event = tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(cmd) => Event::Command(cmd),
                None => break,
            },
            Some(done) = finished.recv() => Event::Finished(done),
            _ = next_tick(&mut driver.ticker) => Event::Tick,
        };
        driver.handle(event);
    }

    info!("refresh scheduler stopped");
}

impl Driver {
    fn handle(&mut self, event: Event) {
        match event {
            Event::Tick => {
                let effect = self.machine.tick();
                self.apply(effect, Trigger::Scheduled);
                self.publish();
            }
            Event::Command(Command::Toggle(reply)) => {
                let effect = self.machine.toggle();
                self.apply(effect, Trigger::Manual);
                self.publish();
                info!(active = self.machine.is_active(), "auto-refresh toggled");
                let _ = reply.send(self.machine.is_active());
            }
            Event::Command(Command::SetActive(active, reply)) => {
                let effect = if active {
                    self.machine.enable()
                } else {
                    self.machine.disable()
                };
                self.apply(effect, Trigger::Manual);
                self.publish();
                let _ = reply.send(self.machine.is_active());
            }
            Event::Command(Command::RunNow(reply)) => {
                let effect = self.machine.run_now();
                if effect != Effect::StartRefresh {
                    debug!("refresh already in flight, ignoring run-now request");
                    let _ = reply.send(RunOutcome::AlreadyRefreshing);
                    return;
                }
                self.waiters.push(reply);
                self.apply(effect, Trigger::Manual);
                self.publish();
            }
            Event::Finished(done) => {
                let entry = self.record(done);
                let effect = self.machine.refresh_finished();
                self.apply(effect, Trigger::Scheduled);
                self.publish();
                for waiter in self.waiters.drain(..) {
                    let _ = waiter.send(RunOutcome::Completed(entry.clone()));
                }
            }
        }
    }

    fn apply(&mut self, effect: Effect, trigger: Trigger) {
        match effect {
            Effect::None => {}
            Effect::ArmTimer => self.ticker = Some(countdown_ticker()),
            Effect::CancelTimer => self.ticker = None,
            Effect::StartRefresh => {
                self.ticker = None;
                self.launch(trigger);
            }
        }
    }

    fn launch(&self, trigger: Trigger) {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let action = self.action.clone();
        let finished_tx = self.finished_tx.clone();
        let span = info_span!("refresh", %run_id, ?trigger);

        info!(%run_id, ?trigger, "starting refresh");
        tokio::spawn(async move {
            // Inner task so a panicking action still reports completion.
            let result = match tokio::spawn(async move { action.refresh().await }.instrument(span)).await {
                Ok(result) => result,
                Err(e) => Err(anyhow::anyhow!("refresh task aborted: {}", e)),
            };
            let _ = finished_tx
                .send(Finished {
                    run_id,
                    trigger,
                    started_at,
                    result,
                })
                .await;
        });
    }

    fn record(&mut self, done: Finished) -> HistoryEntry {
        let (status, result_summary) = match done.result {
            Ok(summary) => {
                info!(run_id = %done.run_id, %summary, "refresh finished");
                (RunStatus::Success, Some(summary))
            }
            Err(e) => {
                let reason = format!("{:#}", e);
                error!(run_id = %done.run_id, error = %reason, "refresh failed");
                (RunStatus::Failed, Some(reason))
            }
        };
        let entry = HistoryEntry {
            run_id: done.run_id,
            trigger: done.trigger,
            status,
            result_summary,
            started_at: done.started_at,
            finished_at: Utc::now(),
        };
        self.history.record(entry.clone());
        entry
    }

    fn publish(&self) {
        self.status_tx
            .send_replace(status_of(&self.machine, &self.history));
    }
}

fn status_of(machine: &Machine, history: &History) -> SchedulerStatus {
    SchedulerStatus {
        phase: machine.phase(),
        interval_secs: machine.interval_secs(),
        time_left_secs: machine.time_left(),
        is_active: machine.is_active(),
        is_refreshing: machine.is_refreshing(),
        consecutive_failures: history.consecutive_failures(),
        last_run: history.last().cloned(),
        recent_runs: history.entries(),
    }
}

fn countdown_ticker() -> Interval {
    let mut ticker = interval_at(Instant::now() + COUNTDOWN_PERIOD, COUNTDOWN_PERIOD);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

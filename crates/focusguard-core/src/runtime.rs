//! Tokio driver for the two subsystems.
//!
//! The usage monitor and the alarm session each run in their own actor
//! task. An actor owns its state machine outright, takes commands from an
//! unbounded channel and otherwise sleeps until the machine's next deadline.
//! The two actors share nothing, so a slow accounting query never delays a
//! snooze resume.
//!
//! Collaborator calls are synchronous; they run under
//! [`tokio::task::block_in_place`], which requires the multi-thread runtime.

use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{block_in_place, JoinHandle};
use tracing::{debug, info, warn};

use crate::alarm::{
    AlarmClock, AlarmInput, AlarmParts, AlarmReceiver, AlarmScheduler, AlarmSession, AlarmState,
};
use crate::error::{CoreError, Result, ScheduleError};
use crate::platform::WakeLock;
use crate::settings::{DisciplineSettings, PermissionChange, Permissions, SettingsUpdate};
use crate::storage::EngineConfig;
use crate::usage::{MonitorParts, MonitorPhase, UsageMonitor, UsageState};

/// Point-in-time view of the monitor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorStatus {
    pub phase: MonitorPhase,
    pub state: UsageState,
    pub settings: DisciplineSettings,
    pub permissions: Permissions,
}

/// Point-in-time view of the alarm session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlarmStatus {
    pub state: AlarmState,
    pub session_id: Option<String>,
    pub task: Option<String>,
    pub snoozes_remaining: Option<u8>,
    pub playing: bool,
}

enum MonitorCommand {
    Start {
        settings: DisciplineSettings,
        permissions: Permissions,
    },
    ApplySettings(SettingsUpdate),
    SetTasksComplete(bool),
    ResetUsage,
    Permission(PermissionChange),
    Stop,
    Status(oneshot::Sender<MonitorStatus>),
    Shutdown,
}

enum AlarmCommand {
    Deliver(String),
    Input(AlarmInput),
    Status(oneshot::Sender<AlarmStatus>),
    Shutdown,
}

/// Handle to the running engine.
pub struct Engine {
    monitor_tx: mpsc::UnboundedSender<MonitorCommand>,
    alarm_tx: mpsc::UnboundedSender<AlarmCommand>,
    monitor_task: JoinHandle<()>,
    alarm_task: JoinHandle<()>,
}

impl Engine {
    /// Spawn both actors on the current runtime.
    pub fn spawn(monitor: UsageMonitor, alarm: AlarmSession, receiver: AlarmReceiver) -> Self {
        let (monitor_tx, monitor_rx) = mpsc::unbounded_channel();
        let (alarm_tx, alarm_rx) = mpsc::unbounded_channel();
        let monitor_task = tokio::spawn(run_monitor(monitor, monitor_rx));
        let alarm_task = tokio::spawn(run_alarm(alarm, receiver, alarm_rx));
        info!("engine started");
        Self {
            monitor_tx,
            alarm_tx,
            monitor_task,
            alarm_task,
        }
    }

    /// Build both state machines from `config` and spawn them.
    pub fn from_config(
        config: &EngineConfig,
        monitor_parts: MonitorParts,
        alarm_parts: AlarmParts,
        receiver_lock: Box<dyn WakeLock>,
    ) -> Self {
        let monitor = UsageMonitor::new(
            config.monitor.clone(),
            config.discipline.block_message.clone(),
            config.discipline.settings(),
            monitor_parts,
            Local::now(),
        );
        let alarm = AlarmSession::new(config.alarm.clone(), alarm_parts);
        let receiver = AlarmReceiver::new(receiver_lock, config.alarm.receiver_wake_lock());
        Self::spawn(monitor, alarm, receiver)
    }

    // ── Settings and permission ingress ──────────────────────────────

    pub fn start(&self, settings: DisciplineSettings, permissions: Permissions) -> Result<()> {
        self.to_monitor(MonitorCommand::Start {
            settings,
            permissions,
        })
    }

    pub fn apply_settings(&self, update: SettingsUpdate) -> Result<()> {
        self.to_monitor(MonitorCommand::ApplySettings(update))
    }

    pub fn set_tasks_complete(&self, complete: bool) -> Result<()> {
        self.to_monitor(MonitorCommand::SetTasksComplete(complete))
    }

    pub fn reset_usage(&self) -> Result<()> {
        self.to_monitor(MonitorCommand::ResetUsage)
    }

    /// Stop the monitor loop. The engine itself keeps running.
    pub fn stop(&self) -> Result<()> {
        self.to_monitor(MonitorCommand::Stop)
    }

    pub fn set_usage_stats_granted(&self, granted: bool) -> Result<()> {
        self.to_monitor(MonitorCommand::Permission(PermissionChange::UsageStats(granted)))
    }

    pub fn set_overlay_granted(&self, granted: bool) -> Result<()> {
        self.to_monitor(MonitorCommand::Permission(PermissionChange::Overlay(granted)))
    }

    pub async fn monitor_status(&self) -> Result<MonitorStatus> {
        let (tx, rx) = oneshot::channel();
        self.to_monitor(MonitorCommand::Status(tx))?;
        rx.await.map_err(|_| CoreError::EngineClosed)
    }

    // ── Alarm ingress ────────────────────────────────────────────────

    /// Deliver a fired alarm through the receiving edge.
    pub fn fire(&self, task: impl Into<String>) -> Result<()> {
        self.to_alarm(AlarmCommand::Deliver(task.into()))
    }

    pub fn snooze(&self) -> Result<()> {
        self.alarm_input(AlarmInput::Snooze)
    }

    pub fn dismiss(&self) -> Result<()> {
        self.alarm_input(AlarmInput::Dismiss)
    }

    /// Forward a raw state-machine input (focus changes, player errors).
    pub fn alarm_input(&self, input: AlarmInput) -> Result<()> {
        self.to_alarm(AlarmCommand::Input(input))
    }

    pub async fn alarm_status(&self) -> Result<AlarmStatus> {
        let (tx, rx) = oneshot::channel();
        self.to_alarm(AlarmCommand::Status(tx))?;
        rx.await.map_err(|_| CoreError::EngineClosed)
    }

    /// Scheduler whose alarms are delivered to this engine.
    pub fn scheduler(&self, exact_allowed: bool) -> AlarmScheduler<EngineAlarmClock> {
        AlarmScheduler::new(EngineAlarmClock {
            alarm_tx: self.alarm_tx.clone(),
            exact_allowed,
        })
    }

    /// Stop both subsystems and wait for the actors to finish.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.monitor_tx.send(MonitorCommand::Shutdown);
        let _ = self.alarm_tx.send(AlarmCommand::Shutdown);
        for task in [self.monitor_task, self.alarm_task] {
            if let Err(e) = task.await {
                warn!(error = %e, "engine actor ended abnormally");
            }
        }
        info!("engine shut down");
        Ok(())
    }

    fn to_monitor(&self, cmd: MonitorCommand) -> Result<()> {
        self.monitor_tx.send(cmd).map_err(|_| CoreError::EngineClosed)
    }

    fn to_alarm(&self, cmd: AlarmCommand) -> Result<()> {
        self.alarm_tx.send(cmd).map_err(|_| CoreError::EngineClosed)
    }
}

/// Alarm clock backed by tokio timers on the engine's runtime.
pub struct EngineAlarmClock {
    alarm_tx: mpsc::UnboundedSender<AlarmCommand>,
    exact_allowed: bool,
}

impl AlarmClock for EngineAlarmClock {
    fn can_schedule_exact(&self) -> bool {
        self.exact_allowed
    }

    fn schedule_one_shot(&mut self, at: DateTime<Local>, task: &str) -> std::result::Result<(), ScheduleError> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| ScheduleError::Rejected(e.to_string()))?;
        let tx = self.alarm_tx.clone();
        let task = task.to_string();
        let delay = until(at);
        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(AlarmCommand::Deliver(task)).is_err() {
                debug!("engine gone before scheduled alarm fired");
            }
        });
        Ok(())
    }
}

fn until(at: DateTime<Local>) -> Duration {
    (at - Local::now()).to_std().unwrap_or(Duration::ZERO)
}

/// Resolves when `due` passes; never resolves without a deadline.
async fn wait_for(due: Option<DateTime<Local>>) {
    match due {
        Some(at) => tokio::time::sleep(until(at)).await,
        None => std::future::pending().await,
    }
}

async fn run_monitor(mut monitor: UsageMonitor, mut rx: mpsc::UnboundedReceiver<MonitorCommand>) {
    loop {
        tokio::select! {
            cmd = rx.recv() => {
                let Some(cmd) = cmd else { break };
                let now = Local::now();
                match cmd {
                    MonitorCommand::Start { settings, permissions } => {
                        block_in_place(|| monitor.start(settings, permissions, now));
                    }
                    MonitorCommand::ApplySettings(update) => {
                        block_in_place(|| monitor.apply_settings(&update, now));
                    }
                    MonitorCommand::SetTasksComplete(done) => {
                        block_in_place(|| monitor.set_tasks_complete(done, now));
                    }
                    MonitorCommand::ResetUsage => block_in_place(|| monitor.reset_usage(now)),
                    MonitorCommand::Permission(change) => {
                        block_in_place(|| monitor.push_permission(change, now));
                    }
                    MonitorCommand::Stop => block_in_place(|| monitor.stop(now)),
                    MonitorCommand::Status(reply) => {
                        let _ = reply.send(MonitorStatus {
                            phase: monitor.phase(),
                            state: monitor.state().clone(),
                            settings: monitor.settings().clone(),
                            permissions: monitor.permissions(),
                        });
                    }
                    MonitorCommand::Shutdown => break,
                }
            }
            _ = wait_for(monitor.next_due()) => {
                block_in_place(|| monitor.poll(Local::now()));
            }
        }
    }
    block_in_place(|| monitor.stop(Local::now()));
    debug!("monitor actor finished");
}

async fn run_alarm(
    mut session: AlarmSession,
    mut receiver: AlarmReceiver,
    mut rx: mpsc::UnboundedReceiver<AlarmCommand>,
) {
    loop {
        tokio::select! {
            cmd = rx.recv() => {
                let Some(cmd) = cmd else { break };
                let now = Local::now();
                match cmd {
                    AlarmCommand::Deliver(task) => {
                        block_in_place(|| receiver.deliver(&mut session, &task, now));
                    }
                    AlarmCommand::Input(input) => block_in_place(|| session.handle(input, now)),
                    AlarmCommand::Status(reply) => {
                        let _ = reply.send(AlarmStatus {
                            state: session.state(),
                            session_id: session.session_id().map(str::to_string),
                            task: session.task().map(str::to_string),
                            snoozes_remaining: session.snoozes_remaining(),
                            playing: session.is_playing(),
                        });
                    }
                    AlarmCommand::Shutdown => break,
                }
            }
            _ = wait_for(session.next_due()) => {
                block_in_place(|| session.poll(Local::now()));
            }
        }
    }
    block_in_place(|| session.dismiss(Local::now()));
    debug!("alarm actor finished");
}

//! Bot process: the single owner of the connection lifecycle.
//!
//! One coordinator task consumes client events, API commands and timers from a
//! `tokio::select!` loop. Everything else (HTTP API, scheduler) talks to it
//! through a cloneable [`BotHandle`]; status and settings are published on
//! `watch` channels.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    clinical::{HandoffSource, ShiftRecord, ShiftRepository},
    config::Config,
    domain::{MessageRef, SessionId},
    handoff::{format_handoff, HandoffNotification, SendMethod},
    lifecycle::ConnectionState,
    messaging::{
        client::{ClientEvent, DisconnectReason, SessionClient},
        port::MessagingPort,
        types::{GroupInfo, InboundMessage},
    },
    parser::{parse_shift, ParseOutcome, ShiftPeriod},
    session_store::SessionVault,
    settings::{BotSettings, SettingsSource},
    Error, Result,
};

const COMMAND_BUFFER: usize = 32;

#[derive(Clone, Debug)]
pub struct BotConfig {
    pub session_id: SessionId,
    pub backup_interval: Duration,
    pub reconnect_delay: Duration,
    pub settings_refresh: Duration,
}

impl BotConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            session_id: SessionId::for_client(&cfg.client_id),
            backup_interval: cfg.session_backup_interval,
            reconnect_delay: cfg.reconnect_delay,
            settings_refresh: cfg.settings_refresh,
        }
    }
}

/// Collaborators of the bot process. Adapters are chosen at startup.
pub struct BotDeps {
    pub client: Arc<dyn SessionClient>,
    pub messenger: Arc<dyn MessagingPort>,
    pub vault: SessionVault,
    pub shifts: Arc<dyn ShiftRepository>,
    pub handoffs: Arc<dyn HandoffSource>,
    pub settings: Arc<dyn SettingsSource>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftSummary {
    pub date: NaiveDate,
    pub shift_period: Option<ShiftPeriod>,
    pub staff_count: usize,
    pub received_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffReceipt {
    pub date: String,
    pub method: SendMethod,
    pub message: MessageRef,
    pub sent_at: DateTime<Utc>,
}

/// Snapshot published after every state change.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BotStatus {
    #[serde(flatten)]
    pub connection: ConnectionState,
    pub session_id: SessionId,
    pub session_backend: &'static str,
    pub last_backup_at: Option<DateTime<Utc>>,
    pub last_shift: Option<ShiftSummary>,
    pub last_handoff: Option<HandoffReceipt>,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl BotStatus {
    pub fn new(session_id: SessionId, session_backend: &'static str) -> Self {
        Self {
            connection: ConnectionState::Disconnected,
            session_id,
            session_backend,
            last_backup_at: None,
            last_shift: None,
            last_handoff: None,
            last_error: None,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug)]
pub enum BotCommand {
    SendHandoff {
        notification: HandoffNotification,
        reply: oneshot::Sender<Result<MessageRef>>,
    },
    /// Scheduled send for `date`; at most one automatic send per date.
    AutoHandoff {
        date: NaiveDate,
        reply: oneshot::Sender<Result<Option<MessageRef>>>,
    },
    Logout {
        reply: oneshot::Sender<Result<()>>,
    },
    Reconnect,
    ReloadSettings {
        reply: oneshot::Sender<Result<BotSettings>>,
    },
    ListGroups {
        reply: oneshot::Sender<Result<Vec<GroupInfo>>>,
    },
}

/// Cloneable handle to a running [`BotProcess`].
#[derive(Clone)]
pub struct BotHandle {
    commands: mpsc::Sender<BotCommand>,
    status: watch::Receiver<BotStatus>,
    settings: watch::Receiver<BotSettings>,
}

impl BotHandle {
    /// Assemble a handle from raw channels (adapters driving their own loop, tests).
    pub fn from_parts(
        commands: mpsc::Sender<BotCommand>,
        status: watch::Receiver<BotStatus>,
        settings: watch::Receiver<BotSettings>,
    ) -> Self {
        Self {
            commands,
            status,
            settings,
        }
    }

    pub fn status(&self) -> BotStatus {
        self.status.borrow().clone()
    }

    pub fn settings(&self) -> BotSettings {
        self.settings.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<BotStatus> {
        self.status.clone()
    }

    pub fn subscribe_settings(&self) -> watch::Receiver<BotSettings> {
        self.settings.clone()
    }

    pub async fn send_handoff(&self, notification: HandoffNotification) -> Result<MessageRef> {
        self.request(|reply| BotCommand::SendHandoff {
            notification,
            reply,
        })
        .await
    }

    pub async fn trigger_auto_handoff(&self, date: NaiveDate) -> Result<Option<MessageRef>> {
        self.request(|reply| BotCommand::AutoHandoff { date, reply })
            .await
    }

    pub async fn logout(&self) -> Result<()> {
        self.request(|reply| BotCommand::Logout { reply }).await
    }

    /// Fire-and-forget; ignored while connected or while an attempt is running.
    pub async fn reconnect(&self) -> Result<()> {
        self.commands
            .send(BotCommand::Reconnect)
            .await
            .map_err(|_| Error::Stopped)
    }

    pub async fn reload_settings(&self) -> Result<BotSettings> {
        self.request(|reply| BotCommand::ReloadSettings { reply })
            .await
    }

    pub async fn list_groups(&self) -> Result<Vec<GroupInfo>> {
        self.request(|reply| BotCommand::ListGroups { reply }).await
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T>>) -> BotCommand,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| Error::Stopped)?;
        rx.await.map_err(|_| Error::Stopped)?
    }
}

pub struct BotProcess {
    cfg: BotConfig,
    deps: BotDeps,
    events: mpsc::Receiver<ClientEvent>,
    commands: mpsc::Receiver<BotCommand>,
    commands_open: bool,
    status_tx: watch::Sender<BotStatus>,
    settings_tx: watch::Sender<BotSettings>,
    state: ConnectionState,
    /// The running attempt restores a stored session.
    restoring: bool,
    ever_connected: bool,
    reconnect_at: Option<Instant>,
    last_auto_send: Option<NaiveDate>,
}

impl BotProcess {
    pub fn new(
        cfg: BotConfig,
        deps: BotDeps,
        events: mpsc::Receiver<ClientEvent>,
    ) -> (Self, BotHandle) {
        let (commands_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (status_tx, status_rx) = watch::channel(BotStatus::new(
            cfg.session_id.clone(),
            deps.vault.backend_name(),
        ));
        let (settings_tx, settings_rx) = watch::channel(BotSettings::default());

        let process = Self {
            cfg,
            deps,
            events,
            commands,
            commands_open: true,
            status_tx,
            settings_tx,
            state: ConnectionState::Disconnected,
            restoring: false,
            ever_connected: false,
            reconnect_at: None,
            last_auto_send: None,
        };
        let handle = BotHandle::from_parts(commands_tx, status_rx, settings_rx);
        (process, handle)
    }

    /// Run until `shutdown` fires. Returns `Err` on fatal authentication failures.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<()> {
        self.refresh_settings().await;
        self.authenticate().await?;

        let mut backup = interval(self.cfg.backup_interval);
        backup.set_missed_tick_behavior(MissedTickBehavior::Delay);
        backup.tick().await;

        let mut refresh = interval(self.cfg.settings_refresh);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);
        refresh.tick().await;

        loop {
            let reconnect_at = self.reconnect_at;
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => return self.stop().await,
                ev = self.events.recv() => match ev {
                    Some(ev) => self.handle_event(ev).await?,
                    // The event pump shares the shutdown token and may close first.
                    None if shutdown.is_cancelled() => return self.stop().await,
                    None => return Err(Error::External("client event stream closed".to_string())),
                },
                cmd = self.commands.recv(), if self.commands_open => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => self.commands_open = false,
                },
                _ = backup.tick() => self.backup_session().await,
                _ = refresh.tick() => self.refresh_settings().await,
                _ = sleep_until_opt(reconnect_at) => {
                    self.reconnect_at = None;
                    self.reconnect().await?;
                }
            }
        }
    }

    async fn stop(&mut self) -> Result<()> {
        self.backup_session().await;
        tracing::info!("bot process stopped");
        Ok(())
    }

    async fn handle_event(&mut self, ev: ClientEvent) -> Result<()> {
        if let Some(next) = self.state.on_event(&ev) {
            self.set_state(next);
        }

        match ev {
            ClientEvent::Qr(_) => {
                if self.restoring {
                    tracing::warn!("stored session not accepted; QR scan required");
                    self.deps.vault.delete(&self.cfg.session_id).await;
                    self.restoring = false;
                }
                tracing::info!("QR code available; scan it to link the bot");
            }
            ClientEvent::Authenticated => tracing::info!("client authenticated"),
            ClientEvent::AuthFailure(msg) => {
                if !self.restoring {
                    tracing::error!(error = %msg, "authentication failed");
                    self.note_error(format!("authentication failed: {msg}"));
                    return self.retry_later(Error::Auth(msg));
                }
                tracing::warn!(error = %msg, "stored session rejected; starting fresh authentication");
                self.deps.vault.delete(&self.cfg.session_id).await;
                self.restoring = false;
                if let Err(e) = self.authenticate().await {
                    self.retry_later(e)?;
                }
            }
            ClientEvent::Ready => {
                self.ever_connected = true;
                self.restoring = false;
                self.reconnect_at = None;
                tracing::info!(session = %self.cfg.session_id, "client ready");
                self.backup_session().await;
                self.deps.vault.save(&self.cfg.session_id).await;
            }
            ClientEvent::Message(msg) => self.route_message(msg).await,
            ClientEvent::Disconnected(reason) => {
                tracing::warn!(%reason, "client disconnected");
                if reason == DisconnectReason::Logout {
                    self.deps.vault.delete(&self.cfg.session_id).await;
                }
                self.restoring = false;
                self.schedule_reconnect();
            }
        }
        Ok(())
    }

    async fn handle_command(&mut self, cmd: BotCommand) {
        match cmd {
            BotCommand::SendHandoff {
                notification,
                reply,
            } => {
                let res = self.send_handoff(notification).await;
                let _ = reply.send(res);
            }
            BotCommand::AutoHandoff { date, reply } => {
                let res = self.auto_handoff(date).await;
                let _ = reply.send(res);
            }
            BotCommand::Logout { reply } => {
                let res = self.logout().await;
                let _ = reply.send(res);
            }
            BotCommand::Reconnect => {
                if self.state.auth_in_flight() || self.state.is_connected() {
                    tracing::debug!(state = self.state.name(), "reconnect ignored");
                    return;
                }
                self.reconnect_at = None;
                if let Err(e) = self.authenticate().await {
                    tracing::warn!(error = %e, "manual reconnect failed");
                    self.schedule_reconnect();
                }
            }
            BotCommand::ReloadSettings { reply } => {
                let res = self.load_settings().await;
                let _ = reply.send(res);
            }
            BotCommand::ListGroups { reply } => {
                let res = if self.state.is_connected() {
                    self.deps.client.list_groups().await
                } else {
                    Err(Error::NotConnected)
                };
                let _ = reply.send(res);
            }
        }
    }

    /// Start one authentication attempt: restore the stored session if there is
    /// one, otherwise request a fresh QR link.
    async fn authenticate(&mut self) -> Result<()> {
        let stored = match self.deps.vault.extract(&self.cfg.session_id).await {
            Ok(blob) => blob,
            Err(e) => {
                self.note_error(format!("session store unavailable: {e}"));
                None
            }
        };

        let restoring = stored.is_some();
        let Some(next) = self.state.begin_auth(restoring) else {
            tracing::debug!(state = self.state.name(), "authentication already in progress");
            return Ok(());
        };
        self.restoring = restoring;
        self.set_state(next);

        if restoring {
            tracing::info!(session = %self.cfg.session_id, "restoring stored session");
        } else {
            tracing::info!(session = %self.cfg.session_id, "no stored session; requesting QR");
        }

        if let Err(e) = self.deps.client.connect(stored).await {
            tracing::error!(error = %e, "client connect failed");
            self.note_error(format!("connect failed: {e}"));
            self.restoring = false;
            self.set_state(ConnectionState::Disconnected);
            return Err(e);
        }
        Ok(())
    }

    async fn reconnect(&mut self) -> Result<()> {
        tracing::info!("reconnecting");
        match self.authenticate().await {
            Ok(()) => Ok(()),
            Err(e) => self.retry_later(e),
        }
    }

    /// Before the first successful connection a failure is fatal; afterwards we
    /// keep retrying.
    fn retry_later(&mut self, e: Error) -> Result<()> {
        if !self.ever_connected {
            return Err(e);
        }
        self.schedule_reconnect();
        Ok(())
    }

    fn schedule_reconnect(&mut self) {
        let delay = self.cfg.reconnect_delay;
        tracing::info!(delay_ms = delay.as_millis() as u64, "reconnect scheduled");
        self.reconnect_at = Some(Instant::now() + delay);
    }

    async fn backup_session(&mut self) {
        if !self.state.is_connected() {
            return;
        }
        match self.deps.client.export_session().await {
            Ok(Some(blob)) => {
                if self.deps.vault.store(&self.cfg.session_id, &blob).await {
                    self.status_tx
                        .send_modify(|s| s.last_backup_at = Some(Utc::now()));
                }
            }
            Ok(None) => tracing::debug!("client has no session to export yet"),
            Err(e) => tracing::warn!(error = %e, "session export failed"),
        }
    }

    async fn route_message(&mut self, msg: InboundMessage) {
        if !self.state.is_connected() {
            tracing::debug!(message = %msg.message_id.0, "message received while not connected; ignored");
            return;
        }
        let source = self.settings_tx.borrow().shift_source().cloned();
        let Some(source) = source else {
            return;
        };
        if msg.group_id != source {
            return;
        }

        let shift = match parse_shift(&msg) {
            ParseOutcome::Shift(shift) => shift,
            ParseOutcome::NotShift => {
                tracing::debug!(message = %msg.message_id.0, "source group message is not a shift");
                return;
            }
        };

        let date = shift
            .date
            .unwrap_or_else(|| msg.timestamp.with_timezone(&Local).date_naive());
        let summary = ShiftSummary {
            date,
            shift_period: shift.shift_period,
            staff_count: shift.staff_assignments.len(),
            received_at: msg.timestamp,
        };
        let record = ShiftRecord {
            date,
            shift,
            group_id: msg.group_id,
            sender_id: msg.sender_id,
            received_at: msg.timestamp,
        };

        match self.deps.shifts.save_shift(&record).await {
            Ok(()) => {
                tracing::info!(%date, staff = summary.staff_count, "shift saved");
                self.status_tx.send_modify(|s| {
                    s.last_shift = Some(summary);
                    s.updated_at = Utc::now();
                });
            }
            Err(e) => {
                tracing::error!(%date, error = %e, "failed to save shift");
                self.note_error(format!("failed to save shift: {e}"));
            }
        }
    }

    async fn send_handoff(&mut self, notification: HandoffNotification) -> Result<MessageRef> {
        if !self.state.is_connected() {
            return Err(Error::NotConnected);
        }
        let target = self
            .settings_tx
            .borrow()
            .handoff_target()
            .cloned()
            .ok_or_else(|| {
                Error::Disabled("handoff notifications are disabled or have no target group".into())
            })?;

        let text = format_handoff(&notification);
        match self.deps.messenger.send_text(&target, &text).await {
            Ok(message) => {
                tracing::info!(date = %notification.date, method = ?notification.method, chat = %target, "handoff sent");
                let receipt = HandoffReceipt {
                    date: notification.date,
                    method: notification.method,
                    message: message.clone(),
                    sent_at: Utc::now(),
                };
                self.status_tx.send_modify(|s| {
                    s.last_handoff = Some(receipt);
                    s.updated_at = Utc::now();
                });
                Ok(message)
            }
            Err(e) => {
                tracing::error!(chat = %target, error = %e, "handoff send failed");
                self.note_error(format!("handoff send failed: {e}"));
                Err(e)
            }
        }
    }

    async fn auto_handoff(&mut self, date: NaiveDate) -> Result<Option<MessageRef>> {
        if self.last_auto_send == Some(date) {
            tracing::info!(%date, "automatic handoff already sent");
            return Ok(None);
        }
        let Some(mut notification) = self.deps.handoffs.signed_handoff(date).await? else {
            tracing::info!(%date, "no signed handoff; nothing to send");
            return Ok(None);
        };
        notification.method = SendMethod::Auto;
        let message = self.send_handoff(notification).await?;
        self.last_auto_send = Some(date);
        Ok(Some(message))
    }

    async fn logout(&mut self) -> Result<()> {
        tracing::info!("logout requested");
        let res = self.deps.client.logout().await;
        self.deps.vault.delete(&self.cfg.session_id).await;
        self.restoring = false;
        self.set_state(ConnectionState::Disconnected);
        if let Err(e) = &res {
            self.note_error(format!("logout failed: {e}"));
        }
        res
    }

    async fn refresh_settings(&mut self) {
        if let Err(e) = self.load_settings().await {
            tracing::warn!(error = %e, "settings refresh failed; keeping previous settings");
        }
    }

    async fn load_settings(&mut self) -> Result<BotSettings> {
        let settings = self.deps.settings.load().await?;
        let changed = self.settings_tx.send_if_modified(|current| {
            if *current == settings {
                return false;
            }
            *current = settings.clone();
            true
        });
        if changed {
            tracing::info!(
                enabled = settings.enabled,
                source = ?settings.shift_source(),
                target = ?settings.handoff_target(),
                "bot settings updated"
            );
        }
        Ok(settings)
    }

    fn set_state(&mut self, next: ConnectionState) {
        if next == self.state {
            return;
        }
        tracing::debug!(from = self.state.name(), to = next.name(), "connection state");
        self.state = next.clone();
        self.status_tx.send_modify(|s| {
            s.connection = next;
            s.updated_at = Utc::now();
        });
    }

    fn note_error(&self, msg: String) {
        self.status_tx.send_modify(|s| {
            s.last_error = Some(msg);
            s.updated_at = Utc::now();
        });
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

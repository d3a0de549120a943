//! Daily scheduler for automatic handoff notifications.
//!
//! - Fires once a day at `handoffNotifications.autoSendTime` (local time)
//! - Re-plans whenever the bot settings change (time edited, notifications toggled)
//! - Only triggers; the bot process loads the signed handoff and sends it

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::{bot::BotHandle, Error, Result};

/// Wall-clock time of day, minute precision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DailyTime {
    pub hour: u32,
    pub minute: u32,
}

impl DailyTime {
    /// Accepts `H:MM`, `HH:MM` and `HH:MM:SS` (seconds ignored).
    pub fn parse(raw: &str) -> Result<Self> {
        let mut parts = raw.trim().split(':');
        let hour = parse_part(parts.next(), raw)?;
        let minute = parse_part(parts.next(), raw)?;
        if let Some(sec) = parts.next() {
            parse_part(Some(sec), raw)?;
        }
        if parts.next().is_some() || hour > 23 || minute > 59 {
            return Err(Error::Config(format!("invalid time of day: {raw}")));
        }
        Ok(Self { hour, minute })
    }

    fn as_naive(self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or(NaiveTime::MIN)
    }

    /// Next occurrence strictly after `now`.
    pub fn next_naive_after(self, now: NaiveDateTime) -> NaiveDateTime {
        let today = now.date().and_time(self.as_naive());
        if today > now {
            today
        } else {
            today + chrono::Duration::days(1)
        }
    }

    /// Next local occurrence strictly after `now`, skipping times that do not
    /// exist on a DST transition day.
    pub fn next_after(self, now: DateTime<Local>) -> Option<DateTime<Local>> {
        let mut candidate = self.next_naive_after(now.naive_local());
        for _ in 0..3 {
            if let Some(dt) = candidate.and_local_timezone(Local).earliest() {
                if dt > now {
                    return Some(dt);
                }
            }
            candidate += chrono::Duration::days(1);
        }
        None
    }
}

impl std::fmt::Display for DailyTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

fn parse_part(part: Option<&str>, raw: &str) -> Result<u32> {
    part.map(str::trim)
        .filter(|p| !p.is_empty() && p.len() <= 2)
        .and_then(|p| p.parse::<u32>().ok())
        .ok_or_else(|| Error::Config(format!("invalid time of day: {raw}")))
}

#[derive(Clone)]
pub struct HandoffScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    bot: BotHandle,
    state: Mutex<SchedulerState>,
}

#[derive(Default)]
struct SchedulerState {
    job: Option<JoinHandle<()>>,
    cancel: Option<CancellationToken>,
}

impl HandoffScheduler {
    pub fn new(bot: BotHandle) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                bot,
                state: Mutex::new(SchedulerState::default()),
            }),
        }
    }

    /// Start the daily job loop, if not already running.
    pub async fn start(&self) {
        let mut st = self.inner.state.lock().await;
        if st.job.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let scheduler = self.clone();
        let cancel_clone = cancel.clone();
        st.job = Some(tokio::spawn(async move {
            scheduler.job_loop(cancel_clone).await;
        }));
        st.cancel = Some(cancel);
        tracing::info!("handoff scheduler started");
    }

    pub async fn stop(&self) {
        let mut st = self.inner.state.lock().await;
        if let Some(tok) = st.cancel.take() {
            tok.cancel();
        }
        if let Some(job) = st.job.take() {
            job.abort();
        }
    }

    async fn job_loop(&self, cancel: CancellationToken) {
        let mut settings = self.inner.bot.subscribe_settings();
        let mut last_fired: Option<DateTime<Local>> = None;
        loop {
            let from = last_fired.map_or_else(Local::now, |f| f.max(Local::now()));
            let next = settings
                .borrow_and_update()
                .auto_send_time()
                .and_then(|t| t.next_after(from));

            match next {
                Some(at) => tracing::info!(at = %at.format("%Y-%m-%d %H:%M"), "next automatic handoff"),
                None => tracing::debug!("automatic handoff disabled"),
            }

            let wait = next.map(|at| (at - Local::now()).to_std().unwrap_or(Duration::ZERO));

            tokio::select! {
              _ = cancel.cancelled() => break,
              changed = settings.changed() => {
                if changed.is_err() {
                  tracing::debug!("settings channel closed; scheduler stopping");
                  break;
                }
              }
              _ = sleep_or_forever(wait) => {
                let Some(at) = next else { continue };
                last_fired = Some(at);
                self.fire(at.date_naive()).await;
              }
            }
        }
    }

    async fn fire(&self, date: NaiveDate) {
        tracing::info!(%date, "triggering automatic handoff");
        if let Err(e) = self.inner.bot.trigger_auto_handoff(date).await {
            tracing::error!(%date, error = %e, "automatic handoff trigger failed");
        }
    }
}

async fn sleep_or_forever(wait: Option<Duration>) {
    match wait {
        Some(d) => sleep(d).await,
        None => std::future::pending::<()>().await,
    }
}

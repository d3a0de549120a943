//! Ports into the shared clinical datastore (owned by the census application).

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{
    domain::ChatId,
    handoff::HandoffNotification,
    parser::ParsedShift,
    Result,
};

/// A parsed roster plus where it came from, as written to the datastore.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftRecord {
    /// Storage key: the roster's own date, or the posting's local date.
    pub date: NaiveDate,
    pub shift: ParsedShift,
    pub group_id: ChatId,
    pub sender_id: String,
    pub received_at: DateTime<Utc>,
}

/// Persists parsed shifts, keyed by date. A later posting for the same date
/// (e.g. a correction) replaces the earlier one.
#[async_trait]
pub trait ShiftRepository: Send + Sync {
    async fn save_shift(&self, record: &ShiftRecord) -> Result<()>;
}

/// Reads signed handoffs for automatic sends.
#[async_trait]
pub trait HandoffSource: Send + Sync {
    async fn signed_handoff(&self, date: NaiveDate) -> Result<Option<HandoffNotification>>;
}

/// In-memory clinical store for local runs without a shared datastore.
#[derive(Default)]
pub struct MemoryClinicalStore {
    shifts: Mutex<HashMap<NaiveDate, ShiftRecord>>,
    handoffs: Mutex<HashMap<NaiveDate, HandoffNotification>>,
}

impl MemoryClinicalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn shift_for(&self, date: NaiveDate) -> Option<ShiftRecord> {
        self.shifts.lock().await.get(&date).cloned()
    }

    pub async fn put_handoff(&self, date: NaiveDate, handoff: HandoffNotification) {
        self.handoffs.lock().await.insert(date, handoff);
    }
}

#[async_trait]
impl ShiftRepository for MemoryClinicalStore {
    async fn save_shift(&self, record: &ShiftRecord) -> Result<()> {
        self.shifts
            .lock()
            .await
            .insert(record.date, record.clone());
        Ok(())
    }
}

#[async_trait]
impl HandoffSource for MemoryClinicalStore {
    async fn signed_handoff(&self, date: NaiveDate) -> Result<Option<HandoffNotification>> {
        Ok(self.handoffs.lock().await.get(&date).cloned())
    }
}

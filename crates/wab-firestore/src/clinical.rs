use async_trait::async_trait;
use chrono::NaiveDate;

use wab_core::{
    clinical::{HandoffSource, ShiftRecord, ShiftRepository},
    handoff::HandoffNotification,
    Result,
};

use crate::FirestoreClient;

pub const DEFAULT_SHIFTS_COLLECTION: &str = "whatsapp_shifts";
pub const DEFAULT_HANDOFFS_COLLECTION: &str = "handoff_notifications";

/// Clinical collections keyed by `YYYY-MM-DD`.
#[derive(Clone)]
pub struct FirestoreClinicalStore {
    client: FirestoreClient,
    shifts: String,
    handoffs: String,
}

impl FirestoreClinicalStore {
    pub fn new(client: FirestoreClient) -> Self {
        Self {
            client,
            shifts: DEFAULT_SHIFTS_COLLECTION.to_string(),
            handoffs: DEFAULT_HANDOFFS_COLLECTION.to_string(),
        }
    }
}

fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[async_trait]
impl ShiftRepository for FirestoreClinicalStore {
    async fn save_shift(&self, record: &ShiftRecord) -> Result<()> {
        let path = format!("{}/{}", self.shifts, date_key(record.date));
        self.client.set(&path, record).await?;
        Ok(())
    }
}

#[async_trait]
impl HandoffSource for FirestoreClinicalStore {
    /// A handoff counts as signed once the census app has written `signedBy`.
    async fn signed_handoff(&self, date: NaiveDate) -> Result<Option<HandoffNotification>> {
        let path = format!("{}/{}", self.handoffs, date_key(date));
        let handoff: Option<HandoffNotification> = self.client.get(&path).await?;
        Ok(handoff.filter(|h| !h.signed_by.trim().is_empty()))
    }
}

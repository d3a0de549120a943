//! Handoff notification model and its outbound WhatsApp rendering.

use serde::{Deserialize, Serialize};

use crate::formatting::{clock_time, long_date_es_from_str};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendMethod {
    #[default]
    Manual,
    Auto,
}

impl SendMethod {
    /// Fixed marker line distinguishing manual from scheduled sends.
    pub fn marker(self) -> &'static str {
        match self {
            Self::Manual => "✋ Envío manual",
            Self::Auto => "🤖 Envío automático",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffSummary {
    pub hospitalized: u32,
    pub new_admissions: u32,
    pub discharges: u32,
}

/// A signed shift handoff, as produced by the census application.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffNotification {
    /// `YYYY-MM-DD`.
    pub date: String,
    pub signed_by: String,
    /// `HH:MM` or an RFC3339 timestamp.
    pub signed_at: String,
    pub summary: HandoffSummary,
    pub public_url: String,
    #[serde(default)]
    pub method: SendMethod,
}

/// Render a handoff into the outbound group message.
///
/// Pure: identical input always yields byte-identical output.
pub fn format_handoff(n: &HandoffNotification) -> String {
    let mut out = String::new();
    out.push_str("🏥 *Entrega de Turno*\n\n");
    out.push_str(&format!("📅 Fecha: {}\n", long_date_es_from_str(&n.date)));
    out.push_str(&format!("✍️ Firmado por: {}\n", n.signed_by.trim()));
    out.push_str(&format!("🕐 Hora de firma: {}\n", clock_time(&n.signed_at)));
    out.push_str(n.method.marker());
    out.push_str("\n\n");
    out.push_str("📊 *Resumen del turno:*\n");
    out.push_str(&format!(
        "• Hospitalizados: {} pacientes\n",
        n.summary.hospitalized
    ));
    out.push_str(&format!("• Nuevos ingresos: {}\n", n.summary.new_admissions));
    out.push_str(&format!("• Altas: {}\n\n", n.summary.discharges));
    out.push_str("🔗 Ver entrega completa:\n");
    out.push_str(n.public_url.trim());
    out
}

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One decoded telemetry packet. Immutable once constructed; the history
/// store owns every instance after append.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub call_sign: String,
    pub altitude_m: f64,
    pub latitude_d: f64,
    pub longitude_d: f64,
    pub course_d: f64,
    pub horizontal_speed_mps: f64,
    pub symbol: String,
    pub symbol_table: String,
    pub comment: String,
    pub frequency_hz: u32,
    pub timestamp: DateTime<Utc>,
    pub raw: String,
}

impl Message {
    /// Substring match, so a base call sign matches any of its SSIDs
    /// ("KE0FZV" matches "KE0FZV-11").
    pub fn is_from(&self, call_sign: &str) -> bool {
        self.call_sign.contains(call_sign)
    }
}

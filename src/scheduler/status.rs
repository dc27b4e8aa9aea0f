use chrono::{DateTime, Utc};

use crate::kinematics::Estimate;
use crate::telemetry::Message;

/// Read-only snapshot handed to the presentation layer once per tick.
#[derive(Debug)]
pub struct Status<'a> {
    /// Channel currently being monitored.
    pub frequency_hz: u32,
    pub window_start: DateTime<Utc>,
    /// Full ordered message history, oldest first.
    pub messages: &'a [Message],
    /// None until the first own-station fix has been heard.
    pub estimate: Option<Estimate>,
    pub falling: bool,
    pub expected_broadcast: Option<DateTime<Utc>>,
}

/// Implemented by whatever renders the snapshot (dashboard, plain console).
pub trait Presenter {
    fn render(&mut self, status: &Status);
}

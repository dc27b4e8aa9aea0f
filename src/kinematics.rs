//! Motion estimates derived from the two most recent own-station fixes.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::history::{History, LaunchSite};
use crate::telemetry::Message;

const EARTH_RADIUS_M: f64 = 6_371_000.0;
/// Synthetic age of the substitute "previous" fix when only one own-station
/// message has ever been heard, so a rate denominator never reaches zero.
const DEGENERATE_DT_S: f64 = 24.0 * 60.0 * 60.0;
/// Descent onset: falling faster than this above 3000 m latches the alarm.
const FALLING_THRESHOLD_MPS: f64 = -2.0;
const FALLING_MIN_ALTITUDE_M: f64 = 3_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Estimate {
    pub vertical_mps: f64,
    pub horizontal_mps: f64,
    /// Altitude of the latest fix.
    pub altitude_m: f64,
    /// Latest altitude projected forward at the current vertical rate, so
    /// the display keeps moving between fixes.
    pub extrapolated_altitude_m: f64,
    pub distance_from_launch_m: f64,
    pub seconds_since_fix: f64,
    /// False while only a single fix has ever been heard; the speeds and
    /// distance are then placeholders, not measurements.
    pub meaningful: bool,
}

/// Great-circle distance over a spherical Earth (haversine).
pub fn great_circle_distance_m(lat1_d: f64, lon1_d: f64, lat2_d: f64, lon2_d: f64) -> f64 {
    let lat_delta_r = (lat2_d - lat1_d).to_radians();
    let lon_delta_r = (lon2_d - lon1_d).to_radians();
    let a = (lat_delta_r / 2.0).sin().powi(2)
        + lat1_d.to_radians().cos() * lat2_d.to_radians().cos() * (lon_delta_r / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

pub struct Kinematics {
    falling: bool,
}

impl Kinematics {
    pub fn new() -> Self {
        Self { falling: false }
    }

    pub fn falling(&self) -> bool {
        self.falling
    }

    /// Recompute the estimate from the latest own-station fixes. Returns
    /// None until the first fix arrives.
    pub fn estimate(&mut self, history: &mut History, now: DateTime<Utc>) -> Option<Estimate> {
        let launch = history.launch_site();
        let (recent, previous) = history.recent_own();
        let recent = recent?.clone();
        let previous = previous.cloned();
        let meaningful = previous.is_some();

        let mut dt = match &previous {
            Some(p) => (recent.timestamp - p.timestamp).num_milliseconds() as f64 / 1_000.0,
            None => DEGENERATE_DT_S,
        };
        if dt <= 0.0 {
            // Two fixes inside the same ledger second
            dt = DEGENERATE_DT_S;
        }

        let vertical_mps = previous
            .as_ref()
            .map(|p| (recent.altitude_m - p.altitude_m) / dt)
            .unwrap_or(0.0);
        let horizontal_mps = previous
            .as_ref()
            .map(|p| distance_between(&recent, p) / dt)
            .unwrap_or(0.0);

        let seconds_since_fix = (now - recent.timestamp).num_milliseconds() as f64 / 1_000.0;
        let extrapolated_altitude_m = recent.altitude_m + seconds_since_fix * vertical_mps;
        let distance_from_launch_m = launch
            .map(|site| distance_from(&recent, site))
            .unwrap_or(0.0);

        if vertical_mps < FALLING_THRESHOLD_MPS
            && recent.altitude_m > FALLING_MIN_ALTITUDE_M
            && !self.falling
        {
            self.falling = true;
            log::error!("Payload is falling!");
        }

        Some(Estimate {
            vertical_mps,
            horizontal_mps,
            altitude_m: recent.altitude_m,
            extrapolated_altitude_m,
            distance_from_launch_m,
            seconds_since_fix,
            meaningful,
        })
    }
}

fn distance_between(a: &Message, b: &Message) -> f64 {
    great_circle_distance_m(a.latitude_d, a.longitude_d, b.latitude_d, b.longitude_d)
}

fn distance_from(m: &Message, site: LaunchSite) -> f64 {
    great_circle_distance_m(m.latitude_d, m.longitude_d, site.latitude_d, site.longitude_d)
}

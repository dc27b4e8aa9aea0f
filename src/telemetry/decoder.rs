use chrono::{DateTime, Utc};

use crate::telemetry::message::Message;
use crate::telemetry::wire::{self, PacketData};
use crate::telemetry::DecodeError;

const MPS_PER_KNOT: f64 = 0.514_444;

/// Decode one raw packet line heard on `frequency_hz` into a [`Message`].
///
/// Fields the packet does not carry are soft-defaulted (0.0 for numeric,
/// empty for textual). A genuinely malformed frame is a hard failure and
/// produces no message at all.
pub fn decode(raw: &str, frequency_hz: u32, now: DateTime<Utc>) -> Result<Message, DecodeError> {
    let frame = wire::parse_frame(raw)?;
    let data = wire::classify(&frame)?;

    let mut message = Message {
        call_sign: frame.source,
        altitude_m: 0.0,
        latitude_d: 0.0,
        longitude_d: 0.0,
        course_d: 0.0,
        horizontal_speed_mps: 0.0,
        symbol: String::new(),
        symbol_table: String::new(),
        comment: String::new(),
        frequency_hz,
        timestamp: now,
        raw: raw.to_string(),
    };

    match data {
        PacketData::Position(p) => {
            message.latitude_d = p.latitude_d;
            message.longitude_d = p.longitude_d;
            message.altitude_m = p.altitude_m.unwrap_or(0.0);
            message.course_d = p.course_d.unwrap_or(0.0);
            message.horizontal_speed_mps = p.speed_knots.unwrap_or(0.0) * MPS_PER_KNOT;
            message.symbol = p.symbol.to_string();
            message.symbol_table = p.symbol_table.to_string();
            message.comment = p.comment;
        }
        PacketData::Status(text) => message.comment = text,
        PacketData::Telemetry | PacketData::Other => {}
    }

    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_packet_fills_every_field() {
        let now = Utc::now();
        let raw = "KE0FZV-11>APZ41N:!4000.00N/10500.00WO111/036/A=005280/S11T34V2317C00";
        let message = decode(raw, 144_390_000, now).unwrap();
        assert_eq!(message.call_sign, "KE0FZV-11");
        assert!((message.latitude_d - 40.0).abs() < 1e-9);
        assert!((message.longitude_d - (-105.0)).abs() < 1e-9);
        assert!((message.altitude_m - 1_609.344).abs() < 1e-2);
        assert_eq!(message.course_d, 111.0);
        // 36 knots reported over ground
        assert!((message.horizontal_speed_mps - 18.52).abs() < 1e-2);
        assert_eq!(message.symbol, "O");
        assert_eq!(message.symbol_table, "/");
        assert_eq!(message.comment, "/S11T34V2317C00");
        assert_eq!(message.frequency_hz, 144_390_000);
        assert_eq!(message.timestamp, now);
        assert_eq!(message.raw, raw);
    }

    #[test]
    fn status_packet_soft_defaults_numeric_fields() {
        let message = decode("W0SKY-1>APDW17:>In service", 144_390_000, Utc::now()).unwrap();
        assert_eq!(message.call_sign, "W0SKY-1");
        assert_eq!(message.latitude_d, 0.0);
        assert_eq!(message.longitude_d, 0.0);
        assert_eq!(message.altitude_m, 0.0);
        assert_eq!(message.horizontal_speed_mps, 0.0);
        assert_eq!(message.symbol, "");
        assert_eq!(message.comment, "In service");
    }

    #[test]
    fn malformed_packet_is_dropped_whole() {
        assert_eq!(
            decode("complete garbage", 144_390_000, Utc::now()),
            Err(DecodeError::Framing)
        );
        assert_eq!(
            decode("N0CALL>APRS:!49xx.50N/07201.75W-", 144_390_000, Utc::now()),
            Err(DecodeError::Position)
        );
    }

    #[test]
    fn own_station_substring_match() {
        let message = decode(
            "KE0FZV-11>APZ41N:!4000.00N/10500.00WO",
            432_560_000,
            Utc::now(),
        )
        .unwrap();
        assert!(message.is_from("KE0FZV"));
        assert!(!message.is_from("W0RMT"));
    }
}

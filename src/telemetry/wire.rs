//! TNC2 monitor-format parsing: `SRC>DST,PATH:info`.
//!
//! The demodulation pipeline emits one TNC2 line per detected packet; this
//! module turns that text into framed fields and, where the packet carries
//! one, a position report. Uncompressed positions, object reports and Mic-E
//! encoding are understood; everything else framed correctly decodes
//! position-less.

use crate::telemetry::DecodeError;

const FT_PER_M: f64 = 3.280_839_9;

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub source: String,
    pub destination: String,
    pub path: Vec<String>,
    pub info: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PacketData {
    Position(Position),
    Status(String),
    Telemetry,
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub latitude_d: f64,
    pub longitude_d: f64,
    pub symbol_table: char,
    pub symbol: char,
    pub course_d: Option<f64>,
    pub speed_knots: Option<f64>,
    pub altitude_m: Option<f64>,
    pub comment: String,
}

pub fn parse_frame(line: &str) -> Result<Frame, DecodeError> {
    let (header, info) = line.split_once(':').ok_or(DecodeError::Framing)?;
    let (source, rest) = header.split_once('>').ok_or(DecodeError::Framing)?;
    if source.is_empty() || rest.is_empty() || info.is_empty() {
        return Err(DecodeError::Framing);
    }

    let mut parts = rest.split(',');
    let destination = parts.next().unwrap_or_default().to_string();
    let path = parts.map(String::from).collect();

    Ok(Frame {
        source: source.to_string(),
        destination,
        path,
        info: info.to_string(),
    })
}

/// Classify the information field and extract whatever position it carries.
pub fn classify(frame: &Frame) -> Result<PacketData, DecodeError> {
    let info = frame.info.as_str();
    let Some(&first) = info.as_bytes().first() else {
        return Err(DecodeError::Framing);
    };
    match first {
        b'!' | b'=' => Ok(PacketData::Position(parse_position(&info[1..])?)),
        // Position with timestamp: one type byte plus seven timestamp bytes.
        b'/' | b'@' => {
            let body = info.get(8..).ok_or(DecodeError::Position)?;
            Ok(PacketData::Position(parse_position(body)?))
        }
        // Object: name (9), live/killed flag (1), timestamp (7), position.
        b';' => {
            let body = info.get(18..).ok_or(DecodeError::Position)?;
            Ok(PacketData::Position(parse_position(body)?))
        }
        b'`' | b'\'' | 0x1c | 0x1d => Ok(PacketData::Position(parse_mice(
            &frame.destination,
            &info.as_bytes()[1..],
        )?)),
        b'>' => Ok(PacketData::Status(info[1..].to_string())),
        b'T' if info.starts_with("T#") => Ok(PacketData::Telemetry),
        _ => Ok(PacketData::Other),
    }
}

/// Uncompressed position: `DDMM.MMN/DDDMM.MMW$` followed by extensions
/// and free-text comment.
fn parse_position(s: &str) -> Result<Position, DecodeError> {
    let b = s.as_bytes();
    if b.len() < 19 {
        return Err(DecodeError::Position);
    }
    let field = |range: std::ops::Range<usize>| -> Result<f64, DecodeError> {
        std::str::from_utf8(&b[range])
            .ok()
            .and_then(|text| text.parse().ok())
            .ok_or(DecodeError::Position)
    };

    let lat_deg = field(0..2)?;
    let lat_min = field(2..7)?;
    let symbol_table = b[8] as char;
    let lon_deg = field(9..12)?;
    let lon_min = field(12..17)?;
    let symbol = b[18] as char;

    let mut latitude_d = lat_deg + lat_min / 60.0;
    match b[7] {
        b'N' => {}
        b'S' => latitude_d = -latitude_d,
        _ => return Err(DecodeError::Position),
    }

    let mut longitude_d = lon_deg + lon_min / 60.0;
    match b[17] {
        b'E' => {}
        b'W' => longitude_d = -longitude_d,
        _ => return Err(DecodeError::Position),
    }

    let mut comment = String::from_utf8_lossy(&b[19..]).into_owned();
    let (course_d, speed_knots) = take_course_speed(&mut comment);
    let altitude_m = take_altitude(&mut comment);

    Ok(Position {
        latitude_d,
        longitude_d,
        symbol_table,
        symbol,
        course_d,
        speed_knots,
        altitude_m,
        comment,
    })
}

/// Mic-E position. The latitude, message bits and longitude offset ride in
/// the destination call sign; longitude, speed and course ride in the first
/// six information bytes after the type byte.
fn parse_mice(destination: &str, b: &[u8]) -> Result<Position, DecodeError> {
    let d = destination.as_bytes();
    if d.len() < 6 || b.len() < 8 {
        return Err(DecodeError::MicE);
    }

    let mut digits = [0u8; 6];
    for (i, &c) in d[..6].iter().enumerate() {
        digits[i] = match c {
            b'0'..=b'9' => c - b'0',
            b'A'..=b'J' => c - b'A',
            b'P'..=b'Y' => c - b'P',
            // Ambiguity digit; treated as zero.
            b'K' | b'L' | b'Z' => 0,
            _ => return Err(DecodeError::MicE),
        };
    }
    let north = matches!(d[3], b'P'..=b'Z');
    let lon_offset = matches!(d[4], b'P'..=b'Z');
    let west = matches!(d[5], b'P'..=b'Z');

    let lat_min = f64::from(digits[2] * 10 + digits[3]) + f64::from(digits[4] * 10 + digits[5]) / 100.0;
    let mut latitude_d = f64::from(digits[0] * 10 + digits[1]) + lat_min / 60.0;
    if !north {
        latitude_d = -latitude_d;
    }

    let raw = |i: usize| -> Result<i32, DecodeError> {
        let value = i32::from(b[i]) - 28;
        if (0..=99).contains(&value) {
            Ok(value)
        } else {
            Err(DecodeError::MicE)
        }
    };

    let mut deg = raw(0)?;
    if lon_offset {
        deg += 100;
    }
    if (180..=189).contains(&deg) {
        deg -= 80;
    } else if (190..=199).contains(&deg) {
        deg -= 190;
    }
    let mut min = raw(1)?;
    if min >= 60 {
        min -= 60;
    }
    let hmin = raw(2)?;
    if !(0..=179).contains(&deg) {
        return Err(DecodeError::MicE);
    }
    let mut longitude_d = f64::from(deg) + (f64::from(min) + f64::from(hmin) / 100.0) / 60.0;
    if west {
        longitude_d = -longitude_d;
    }

    let mut speed = raw(3)? * 10 + raw(4)? / 10;
    let mut course = 100 * (raw(4)? % 10) + raw(5)?;
    if speed >= 800 {
        speed -= 800;
    }
    if course >= 400 {
        course -= 400;
    }

    let symbol = b[6] as char;
    let symbol_table = b[7] as char;
    let mut comment = String::from_utf8_lossy(&b[8..]).into_owned();
    let altitude_m = take_mice_altitude(&mut comment);

    Ok(Position {
        latitude_d,
        longitude_d,
        symbol_table,
        symbol,
        course_d: Some(f64::from(course)),
        speed_knots: Some(f64::from(speed)),
        altitude_m,
        comment,
    })
}

/// `CSE/SPD` data extension at the start of the comment: three digits of
/// course, a slash, three digits of speed in knots.
fn take_course_speed(comment: &mut String) -> (Option<f64>, Option<f64>) {
    let b = comment.as_bytes();
    if b.len() < 7
        || b[3] != b'/'
        || !b[..3].iter().all(u8::is_ascii_digit)
        || !b[4..7].iter().all(u8::is_ascii_digit)
    {
        return (None, None);
    }
    let course: f64 = comment[..3].parse().unwrap_or(0.0);
    let speed: f64 = comment[4..7].parse().unwrap_or(0.0);
    comment.replace_range(..7, "");
    (Some(course), Some(speed))
}

/// `/A=dddddd` altitude extension, in feet, anywhere in the comment.
fn take_altitude(comment: &mut String) -> Option<f64> {
    let start = comment.find("/A=")?;
    let digits = comment.get(start + 3..start + 9)?;
    let feet: f64 = digits.parse().ok()?;
    comment.replace_range(start..start + 9, "");
    Some(feet / FT_PER_M)
}

/// Mic-E altitude: three base-91 characters terminated by `}`, offset by
/// 10 km, already in metres.
fn take_mice_altitude(comment: &mut String) -> Option<f64> {
    let end = comment.find('}')?;
    if end < 3 {
        return None;
    }
    let b = comment.as_bytes();
    let mut altitude = 0i64;
    for &c in &b[end - 3..end] {
        if !(33..=124).contains(&c) {
            return None;
        }
        altitude = altitude * 91 + i64::from(c - 33);
    }
    comment.replace_range(end - 3..=end, "");
    Some(altitude as f64 - 10_000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(line: &str) -> Position {
        match classify(&parse_frame(line).unwrap()).unwrap() {
            PacketData::Position(p) => p,
            other => panic!("expected a position, got {:?}", other),
        }
    }

    #[test]
    fn frame_fields() {
        let frame = parse_frame("N0CALL>APRS,WIDE1-1,WIDE2-1:!4903.50N/07201.75W-Test").unwrap();
        assert_eq!(frame.source, "N0CALL");
        assert_eq!(frame.destination, "APRS");
        assert_eq!(frame.path, vec!["WIDE1-1", "WIDE2-1"]);
        assert_eq!(frame.info, "!4903.50N/07201.75W-Test");
    }

    #[test]
    fn unframeable_lines() {
        assert_eq!(parse_frame("no delimiters here"), Err(DecodeError::Framing));
        assert_eq!(parse_frame("SRC>DST"), Err(DecodeError::Framing));
        assert_eq!(parse_frame(">DST:info"), Err(DecodeError::Framing));
    }

    #[test]
    fn plain_position() {
        let p = position("N0CALL>APRS:!4903.50N/07201.75W-PHG2360");
        assert!((p.latitude_d - 49.058_333).abs() < 1e-3);
        assert!((p.longitude_d - (-72.029_167)).abs() < 1e-3);
        assert_eq!(p.symbol_table, '/');
        assert_eq!(p.symbol, '-');
        assert_eq!(p.comment, "PHG2360");
    }

    #[test]
    fn balloon_beacon_with_extensions() {
        let p = position("KE0FZV-11>APZ41N:!4000.00N/10500.00WO111/000/A=005280/S11T34V2317C00");
        assert!((p.latitude_d - 40.0).abs() < 1e-9);
        assert!((p.longitude_d - (-105.0)).abs() < 1e-9);
        assert_eq!(p.symbol, 'O');
        assert_eq!(p.course_d, Some(111.0));
        assert_eq!(p.speed_knots, Some(0.0));
        // A=005280 is feet above sea level
        assert!((p.altitude_m.unwrap() - 1_609.344).abs() < 1e-2);
        assert_eq!(p.comment, "/S11T34V2317C00");
    }

    #[test]
    fn position_with_timestamp() {
        let p = position(
            "KB0TVJ-1>APJYC1,WIDE1-1:@215644h4003.25NI10512.42W&144.390MHz TOFF /A=5190 x@y.z",
        );
        assert!((p.latitude_d - (40.0 + 3.25 / 60.0)).abs() < 1e-9);
        assert!((p.longitude_d - (-(105.0 + 12.42 / 60.0))).abs() < 1e-9);
        assert_eq!(p.symbol_table, 'I');
        // A=5190 is not the six-digit form, so it stays in the comment
        assert_eq!(p.altitude_m, None);
        assert!(p.comment.contains("/A=5190"));
    }

    #[test]
    fn object_report() {
        let p = position(
            "W0SKY-1>APDW17:;449.750  *111111z3947.30N/10518.19Wr449.750MHz Toff -500 DMR",
        );
        assert!((p.latitude_d - (39.0 + 47.30 / 60.0)).abs() < 1e-9);
        assert!((p.longitude_d - (-(105.0 + 18.19 / 60.0))).abs() < 1e-9);
        assert_eq!(p.symbol, 'r');
        assert_eq!(p.comment, "449.750MHz Toff -500 DMR");
    }

    #[test]
    fn mic_e_position() {
        let p = position("N2XGL-9>S9UYQU,WIDE1-1,WIDE2-1:`q)up7@>/`\"E{}_1\r");
        // Destination S9UYQU encodes 39 degrees 59.15 minutes north
        assert!((p.latitude_d - (39.0 + 59.15 / 60.0)).abs() < 1e-9);
        assert!((p.longitude_d - (-(105.0 + 13.89 / 60.0))).abs() < 1e-9);
        assert_eq!(p.course_d, Some(336.0));
        assert_eq!(p.speed_knots, Some(42.0));
        assert_eq!(p.symbol, '>');
        assert_eq!(p.symbol_table, '/');
        assert_eq!(p.altitude_m, Some(1_647.0));
    }

    #[test]
    fn mic_e_too_short_is_hard_error() {
        let frame = parse_frame("N2XGL-9>S9UYQU:`q)u").unwrap();
        assert_eq!(classify(&frame), Err(DecodeError::MicE));
    }

    #[test]
    fn truncated_position_is_hard_error() {
        let frame = parse_frame("N0CALL>APRS:!4903.50N/072").unwrap();
        assert_eq!(classify(&frame), Err(DecodeError::Position));
    }

    #[test]
    fn garbage_coordinates_are_hard_errors() {
        let frame = parse_frame("N0CALL>APRS:!49AB.50N/07201.75W-x").unwrap();
        assert_eq!(classify(&frame), Err(DecodeError::Position));
        let frame = parse_frame("N0CALL>APRS:!4903.50X/07201.75W-x").unwrap();
        assert_eq!(classify(&frame), Err(DecodeError::Position));
    }

    #[test]
    fn status_and_telemetry_frames() {
        let frame = parse_frame("W0SKY-1>APRS:>En route").unwrap();
        assert_eq!(
            classify(&frame).unwrap(),
            PacketData::Status("En route".to_string())
        );
        let frame = parse_frame("N0CALL>APRS:T#001,100,200").unwrap();
        assert_eq!(classify(&frame).unwrap(), PacketData::Telemetry);
    }
}

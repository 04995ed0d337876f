//! NMEA-0183 GGA sentence encoding.
//!
//! Produces `$GNGGA` fix sentences from a simulated position. Everything
//! except the time and coordinates is a fixed placeholder: fix quality 1,
//! 10 satellites, HDOP 2.0, altitude 230.1 m, geoid separation 46.9 m.
//!
//! Encoding is pure. The caller supplies the UTC time of day, so
//! identical inputs always yield byte-identical sentences.

use chrono::NaiveTime;
use gpsim_types::GeoPoint;

/// Talker and sentence identifier.
pub const SENTENCE_ID: &str = "GNGGA";

/// Line terminator appended when a sentence is written to a device.
pub const LINE_TERMINATOR: &str = "\r\n";

/// Fixed tail of the GGA body after the coordinates: fix quality,
/// satellites in use, HDOP, altitude, geoid separation, and empty DGPS
/// fields.
const FIX_TAIL: &str = "1,10,2.0,230.1,M,46.9,M,,";

/// Ten-thousandths of an arc-minute per degree.
const UNITS_PER_DEGREE: u64 = 600_000;

/// Ten-thousandths of an arc-minute per minute.
const UNITS_PER_MINUTE: u64 = 10_000;

/// Encode a position and UTC time of day as a checksummed GGA sentence.
///
/// The result has the form `$<body>*<checksum>` with no line terminator.
pub fn encode_position_sentence(position: GeoPoint, time: NaiveTime) -> String {
    let body = format!(
        "{SENTENCE_ID},{}.000,{},{},{FIX_TAIL}",
        time.format("%H%M%S"),
        coordinate_field(position.latitude, 2, 'N', 'S'),
        coordinate_field(position.longitude, 3, 'E', 'W'),
    );
    format!("${body}*{:02X}", checksum(&body))
}

/// XOR of every byte of `body`.
///
/// `body` is the text between `$` and `*`.
pub fn checksum(body: &str) -> u8 {
    body.bytes().fold(0, |acc, b| acc ^ b)
}

/// Check that a full `$...*CS` sentence carries a correct checksum.
pub fn has_valid_checksum(sentence: &str) -> bool {
    let Some(rest) = sentence.strip_prefix('$') else {
        return false;
    };
    let Some((body, cs)) = rest.rsplit_once('*') else {
        return false;
    };
    u8::from_str_radix(cs.trim_end(), 16).is_ok_and(|expected| checksum(body) == expected)
}

/// Render one coordinate as `D..DMM.mmmm,H`.
///
/// Rounding happens on the whole value in ten-thousandths of a minute,
/// so 59.99995 minutes carries into the next degree instead of printing
/// as `60.0000`.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::arithmetic_side_effects
)]
fn coordinate_field(value: f64, degree_width: usize, positive: char, negative: char) -> String {
    let hemisphere = if value >= 0.0 { positive } else { negative };
    let units = (value.abs() * 60.0 * 10_000.0).round() as u64;
    let degrees = units / UNITS_PER_DEGREE;
    let minute_units = units % UNITS_PER_DEGREE;
    format!(
        "{degrees:0width$}{:02}.{:04},{hemisphere}",
        minute_units / UNITS_PER_MINUTE,
        minute_units % UNITS_PER_MINUTE,
        width = degree_width,
    )
}

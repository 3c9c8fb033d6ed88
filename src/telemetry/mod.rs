pub mod collector;
pub mod normalizer;
pub mod producer;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::vehicle_metadata::VehicleMetadata;

pub use collector::{LapRecorder, TickOutcome};
pub use normalizer::SampleNormalizer;
pub use producer::{MockTelemetryReader, ReplayTelemetryReader, TelemetryReader};

/// One tick of unprocessed telemetry as produced by a reader.
///
/// Values may be numbers, numeric strings, `null`, nested per-wheel objects or
/// timestamps. Nothing about its content is guaranteed.
pub type RawSample = Map<String, Value>;

/// Read a numeric value from a raw sample.
///
/// Numbers, numeric strings and booleans are accepted. Missing keys, `null`,
/// unparseable strings and non-finite numbers all come back as `None`.
pub fn raw_f64(raw: &RawSample, key: &str) -> Option<f64> {
    value_f64(raw.get(key)?)
}

pub(crate) fn value_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}

pub(crate) fn raw_string(raw: &RawSample, key: &str) -> Option<String> {
    match raw.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Lap number reported by a raw sample, `0` when absent or invalid.
pub fn raw_lap_number(raw: &RawSample) -> u32 {
    raw_f64(raw, "lap")
        .filter(|lap| *lap >= 0.0)
        .map(|lap| lap.min(u32::MAX as f64) as u32)
        .unwrap_or(0)
}

/// Per-wheel values in rear-left, rear-right, front-left, front-right order.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct WheelSet {
    pub rl: f64,
    pub rr: f64,
    pub fl: f64,
    pub fr: f64,
}

impl WheelSet {
    /// Read a nested four-key mapping. Absent wheels default to zero.
    pub fn from_value(value: Option<&Value>) -> Self {
        let Some(Value::Object(wheels)) = value else {
            return Self::default();
        };
        let wheel = |key: &str| wheels.get(key).and_then(value_f64).unwrap_or(0.0);
        Self {
            rl: wheel("rl"),
            rr: wheel("rr"),
            fl: wheel("fl"),
            fr: wheel("fr"),
        }
    }
}

/// A telemetry sample normalized into the fixed schema.
///
/// Every schema key is a field, so a canonical sample is always complete.
/// Only the position channels may be unknown.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct CanonicalSample {
    /// Meters traveled from S/F this lap
    pub lap_distance: f64,
    /// Seconds elapsed in the current lap
    pub lap_time: f64,
    /// Zero based sector index
    pub sector: u32,
    /// km/h
    pub speed: f64,
    pub engine_revs: f64,
    /// 0-100
    pub throttle: f64,
    /// 0-100
    pub brake: f64,
    /// 0-100
    pub clutch: f64,
    /// Signed percent of full lock, may exceed +/-100
    pub steer: f64,
    pub gear: i32,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,

    pub wheel_speed: WheelSet,
    pub tyre_temp: WheelSet,
    pub tyre_pressure: WheelSet,
    pub tyre_wear: WheelSet,
    pub brake_temp: WheelSet,
    pub suspension_position: WheelSet,
}

/// How a column is rendered in the lap file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldClass {
    /// Distance, time and other physical measures, 3 decimals
    Measure,
    /// Percentages, rounded to 2 decimals without padding
    Percent,
    /// Whole numbers, no decimal point
    Integer,
    /// World coordinates, 2 decimals
    Coordinate,
}

/// Columns of the lap file, in header order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CanonicalField {
    LapDistance,
    LapTime,
    Sector,
    Speed,
    EngineRevs,
    Throttle,
    Brake,
    Steer,
    Gear,
    X,
    Y,
    Z,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 12] = [
        CanonicalField::LapDistance,
        CanonicalField::LapTime,
        CanonicalField::Sector,
        CanonicalField::Speed,
        CanonicalField::EngineRevs,
        CanonicalField::Throttle,
        CanonicalField::Brake,
        CanonicalField::Steer,
        CanonicalField::Gear,
        CanonicalField::X,
        CanonicalField::Y,
        CanonicalField::Z,
    ];

    pub fn header(&self) -> &'static str {
        match self {
            CanonicalField::LapDistance => "LapDistance [m]",
            CanonicalField::LapTime => "LapTime [s]",
            CanonicalField::Sector => "Sector [int]",
            CanonicalField::Speed => "Speed [km/h]",
            CanonicalField::EngineRevs => "EngineRevs [rpm]",
            CanonicalField::Throttle => "ThrottlePercentage [%]",
            CanonicalField::Brake => "BrakePercentage [%]",
            CanonicalField::Steer => "Steer [%]",
            CanonicalField::Gear => "Gear [int]",
            CanonicalField::X => "X [m]",
            CanonicalField::Y => "Y [m]",
            CanonicalField::Z => "Z [m]",
        }
    }

    pub fn class(&self) -> FieldClass {
        match self {
            CanonicalField::LapDistance
            | CanonicalField::LapTime
            | CanonicalField::Speed
            | CanonicalField::EngineRevs => FieldClass::Measure,
            CanonicalField::Throttle | CanonicalField::Brake | CanonicalField::Steer => {
                FieldClass::Percent
            }
            CanonicalField::Sector | CanonicalField::Gear => FieldClass::Integer,
            CanonicalField::X | CanonicalField::Y | CanonicalField::Z => FieldClass::Coordinate,
        }
    }
}

/// Header names of the lap file columns.
pub fn telemetry_header() -> Vec<&'static str> {
    CanonicalField::ALL.iter().map(|f| f.header()).collect()
}

impl CanonicalSample {
    /// Value of an output column, `None` when unknown.
    pub fn value(&self, field: CanonicalField) -> Option<f64> {
        match field {
            CanonicalField::LapDistance => Some(self.lap_distance),
            CanonicalField::LapTime => Some(self.lap_time),
            CanonicalField::Sector => Some(self.sector as f64),
            CanonicalField::Speed => Some(self.speed),
            CanonicalField::EngineRevs => Some(self.engine_revs),
            CanonicalField::Throttle => Some(self.throttle),
            CanonicalField::Brake => Some(self.brake),
            CanonicalField::Steer => Some(self.steer),
            CanonicalField::Gear => Some(self.gear as f64),
            CanonicalField::X => self.x,
            CanonicalField::Y => self.y,
            CanonicalField::Z => self.z,
        }
    }
}

/// Metadata describing one driving session.
///
/// Created once when a session or track is first observed. Only an explicit
/// re-fetch replaces it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SessionInfo {
    pub session_id: String,
    pub player_name: String,
    pub car_name: String,
    pub track_name: String,
    /// Meters, `0.0` when unknown
    pub track_length: f64,
    pub session_type: String,
    pub game_version: String,
    /// Entry name used to look up vehicle metadata
    pub vehicle_name: String,
    pub started_at: DateTime<Utc>,
    pub vehicle: Option<VehicleMetadata>,
}

impl Default for SessionInfo {
    fn default() -> Self {
        Self {
            session_id: String::new(),
            player_name: "Unknown".to_string(),
            car_name: "Unknown".to_string(),
            track_name: "Unknown".to_string(),
            track_length: 0.,
            session_type: String::new(),
            game_version: String::new(),
            vehicle_name: String::new(),
            started_at: DateTime::<Utc>::UNIX_EPOCH,
            vehicle: None,
        }
    }
}

impl SessionInfo {
    /// Build session info from the mapping a reader reports.
    ///
    /// `driver_name` and `driver` are accepted as fallbacks for the player, and
    /// the car name doubles as the vehicle entry name when none is given. A
    /// missing or unparseable `date` falls back to the current time.
    pub fn from_raw(raw: &RawSample, session_id: String) -> Self {
        let player_name = raw_string(raw, "player_name")
            .or_else(|| raw_string(raw, "driver_name"))
            .or_else(|| raw_string(raw, "driver"))
            .unwrap_or_else(|| "Unknown".to_string());
        let car_name = raw_string(raw, "car_name").unwrap_or_else(|| "Unknown".to_string());
        let vehicle_name = raw_string(raw, "vehicle_name").unwrap_or_else(|| car_name.clone());
        let started_at = raw_string(raw, "date")
            .and_then(|date| parse_timestamp(&date))
            .unwrap_or_else(Utc::now);

        Self {
            session_id,
            player_name,
            car_name,
            track_name: raw_string(raw, "track_name").unwrap_or_else(|| "Unknown".to_string()),
            track_length: raw_f64(raw, "track_length")
                .filter(|len| *len > 0.0)
                .unwrap_or(0.0),
            session_type: raw_string(raw, "session_type").unwrap_or_default(),
            game_version: raw_string(raw, "game_version").unwrap_or_default(),
            vehicle_name,
            started_at,
            vehicle: None,
        }
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

//! Lap serializer.
//!
//! Turns a buffered lap into the self-describing lap file: the metadata block
//! (`key,value` lines in caller order), one header line of canonical column
//! names, then one row per sample sorted by lap distance.

use itertools::Itertools;

use crate::{
    LapLoggerError,
    session::LapSummary,
    telemetry::{CanonicalField, CanonicalSample, FieldClass, SessionInfo},
};

pub const FORMAT_NAME: &str = "LMUTelemetry v2";
pub const FORMAT_VERSION: &str = "1";

/// Ordered metadata block written before the CSV header.
///
/// Insertion order is the order the lines appear in the file, which keeps laps
/// from one session diffable.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LapMetadata {
    entries: Vec<(String, String)>,
}

impl LapMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, or replace the value of an existing key in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LapMetadata {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut metadata = LapMetadata::new();
        for (key, value) in iter {
            metadata.insert(key, value);
        }
        metadata
    }
}

/// Standard metadata block for a completed lap.
pub fn build_lap_metadata(
    session: &SessionInfo,
    summary: &LapSummary,
    sector_count: u32,
) -> LapMetadata {
    let mut metadata = LapMetadata::new();
    metadata.insert("Format", FORMAT_NAME);
    metadata.insert("Version", FORMAT_VERSION);
    metadata.insert("Player", session.player_name.as_str());
    metadata.insert("TrackName", session.track_name.as_str());
    metadata.insert("CarName", session.car_name.as_str());
    metadata.insert(
        "SessionUTC",
        session.started_at.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
    );
    metadata.insert("LapTime [s]", format!("{:.3}", summary.lap_time));
    metadata.insert("TrackLen [m]", format!("{:.2}", session.track_length));
    if !session.session_type.is_empty() {
        metadata.insert("Event", session.session_type.as_str());
    }

    if let Some(vehicle) = &session.vehicle {
        metadata.insert("CarModel", vehicle.car_model.as_str());
        metadata.insert("Manufacturer", vehicle.manufacturer.as_str());
        metadata.insert("Team", vehicle.team.as_str());
        metadata.insert("CarClass", vehicle.class.as_str());
    }

    if session.track_length > 0.0 && sector_count > 0 {
        metadata.insert("NumSectors", sector_count.to_string());
        for sector in 1..=sector_count {
            let end = session.track_length * sector as f64 / sector_count as f64;
            metadata.insert(format!("Sector{sector}End [m]"), format!("{end:.2}"));
        }
    }
    metadata
}

/// Render a lap as CSV text.
///
/// An empty lap renders as the empty string so callers never persist a
/// partial file. Rows are sorted by lap distance, whatever order they were
/// buffered in.
pub fn format_lap(
    samples: &[CanonicalSample],
    metadata: &LapMetadata,
) -> Result<String, LapLoggerError> {
    if samples.is_empty() {
        return Ok(String::new());
    }

    let mut csv_writer = csv::WriterBuilder::new()
        .flexible(true)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    for (key, value) in metadata.iter() {
        csv_writer
            .write_record([key, value])
            .map_err(|e| LapLoggerError::CsvFormatError { source: e })?;
    }
    csv_writer
        .write_record(CanonicalField::ALL.iter().map(|f| f.header()))
        .map_err(|e| LapLoggerError::CsvFormatError { source: e })?;

    for sample in samples
        .iter()
        .sorted_by(|a, b| a.lap_distance.total_cmp(&b.lap_distance))
    {
        csv_writer
            .write_record(CanonicalField::ALL.iter().map(|f| format_cell(sample, *f)))
            .map_err(|e| LapLoggerError::CsvFormatError { source: e })?;
    }

    let bytes = csv_writer
        .into_inner()
        .map_err(|e| LapLoggerError::CsvFormatError {
            source: e.into_error().into(),
        })?;
    let mut text = String::from_utf8_lossy(&bytes).into_owned();
    if text.ends_with('\n') {
        text.pop();
    }
    Ok(text)
}

fn format_cell(sample: &CanonicalSample, field: CanonicalField) -> String {
    match sample.value(field) {
        Some(value) => format_value(value, field.class()),
        None => String::new(),
    }
}

/// Render a single value with the rounding of its field class.
pub fn format_value(value: f64, class: FieldClass) -> String {
    if !value.is_finite() {
        return String::new();
    }
    match class {
        FieldClass::Measure => fixed(value, 3),
        FieldClass::Coordinate => fixed(value, 2),
        FieldClass::Integer => format!("{}", value.round() as i64),
        FieldClass::Percent => {
            let rounded = fixed(value, 2);
            if rounded.contains('.') {
                rounded
                    .trim_end_matches('0')
                    .trim_end_matches('.')
                    .to_string()
            } else {
                rounded
            }
        }
    }
}

fn fixed(value: f64, decimals: usize) -> String {
    let text = format!("{value:.decimals$}");
    // "-0.00" and friends
    if text.starts_with('-') && text[1..].chars().all(|c| c == '0' || c == '.') {
        text[1..].to_string()
    } else {
        text
    }
}

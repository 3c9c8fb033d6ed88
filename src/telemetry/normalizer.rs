use log::trace;

use super::{CanonicalSample, RawSample, WheelSet, raw_f64};

pub const DEFAULT_SECTOR_COUNT: u32 = 3;

/// Raw pedal and steering values at or below this magnitude are ratios of
/// full travel and get scaled by 100.
///
/// Ratios slightly past full travel (brake `1.2`, steering `-1.25`) still
/// count as ratios.
const RATIO_LIMIT: f64 = 2.0;

fn ratio_to_percent(value: f64) -> f64 {
    if value.abs() <= RATIO_LIMIT {
        value * 100.0
    } else {
        value
    }
}

/// Converts raw reader samples into the canonical schema.
///
/// Normalization never fails: missing or malformed channels fall back to `0`
/// (or `None` for coordinates).
#[derive(Clone, Debug)]
pub struct SampleNormalizer {
    sector_count: u32,
    track_length: Option<f64>,
}

impl Default for SampleNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_SECTOR_COUNT)
    }
}

impl SampleNormalizer {
    pub fn new(sector_count: u32) -> Self {
        Self {
            sector_count: sector_count.max(1),
            track_length: None,
        }
    }

    /// Track length used for sector estimation when samples carry none.
    pub fn set_track_length(&mut self, track_length: Option<f64>) {
        self.track_length = track_length.filter(|len| len.is_finite() && *len > 0.0);
    }

    pub fn sector_count(&self) -> u32 {
        self.sector_count
    }

    pub fn normalize(&self, raw: &RawSample) -> CanonicalSample {
        let lap_distance = raw_f64(raw, "lap_distance").unwrap_or(0.0);
        let track_length = raw_f64(raw, "track_length")
            .filter(|len| *len > 0.0)
            .or(self.track_length);

        let sector = match raw_f64(raw, "sector").or_else(|| raw_f64(raw, "sector_index")) {
            Some(sector) => self.clamp_sector(sector),
            None => track_length
                .map(|len| self.estimate_sector(lap_distance, len))
                .unwrap_or(0),
        };

        let sample = CanonicalSample {
            lap_distance,
            lap_time: raw_f64(raw, "lap_time").unwrap_or(0.0),
            sector,
            speed: raw_f64(raw, "speed").unwrap_or(0.0),
            engine_revs: raw_f64(raw, "rpm").unwrap_or(0.0),
            throttle: percent_or_fraction(raw_f64(raw, "throttle")),
            brake: percent_or_fraction(raw_f64(raw, "brake")),
            clutch: percent_or_fraction(raw_f64(raw, "clutch")),
            steer: steering_percent(raw_f64(raw, "steering")),
            gear: raw_f64(raw, "gear").map(|g| g.trunc() as i32).unwrap_or(0),
            x: raw_f64(raw, "position_x"),
            y: raw_f64(raw, "position_y"),
            z: raw_f64(raw, "position_z"),
            wheel_speed: WheelSet::from_value(raw.get("wheel_speed")),
            tyre_temp: WheelSet::from_value(raw.get("tyre_temp")),
            tyre_pressure: WheelSet::from_value(raw.get("tyre_pressure")),
            tyre_wear: WheelSet::from_value(raw.get("tyre_wear")),
            brake_temp: WheelSet::from_value(raw.get("brake_temp")),
            suspension_position: WheelSet::from_value(raw.get("suspension_position")),
        };
        trace!(
            "Normalized sample at {:.1}m, sector {}",
            sample.lap_distance,
            sample.sector
        );
        sample
    }

    /// `floor(lap_distance / track_length * sector_count)`, clamped to a valid index.
    ///
    /// Multiplies before dividing so exact boundaries land on the next sector.
    pub fn estimate_sector(&self, lap_distance: f64, track_length: f64) -> u32 {
        if !(track_length > 0.0) {
            return 0;
        }
        self.clamp_sector((lap_distance * self.sector_count as f64 / track_length).floor())
    }

    fn clamp_sector(&self, sector: f64) -> u32 {
        sector.clamp(0.0, (self.sector_count - 1) as f64) as u32
    }
}

/// Pedal style channel to percent, clamped to `[0, 100]`.
///
/// `1.2` scales to `120` and clamps to `100`, `3.2` is already a percentage.
pub fn percent_or_fraction(value: Option<f64>) -> f64 {
    value.map_or(0.0, |v| ratio_to_percent(v).clamp(0.0, 100.0))
}

/// Steering to signed percent, same ratio detection as the pedals. Never
/// clamped.
pub fn steering_percent(value: Option<f64>) -> f64 {
    value.map_or(0.0, ratio_to_percent)
}

use std::{f64::consts::PI, path::Path, time::Duration};

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde_json::{Value, json};

use crate::LapLoggerError;

use super::RawSample;

/// Distance of the synthetic car when the mock session starts, in meters.
const MOCK_TOTAL_DISTANCE_START: f64 = 91576.37;
const MOCK_AVERAGE_SPEED_MPS: f64 = 70.0;
/// Smallest step of the simulated clock, whatever the poll interval.
pub const MIN_MOCK_TICK: Duration = Duration::from_millis(10);

/// A source of raw telemetry samples.
///
/// Implementations can connect to a live game or replay recorded data. The
/// recorder only ever talks to this interface.
///
/// # Lifecycle
///
/// 1. Poll `is_available()` until the source is present
/// 2. Call `session_info()` to retrieve driver, car and track identity
/// 3. Call `read()` once per tick
pub trait TelemetryReader {
    /// Whether the source can currently produce samples.
    fn is_available(&mut self) -> bool;

    /// Next raw sample.
    ///
    /// # Errors
    ///
    /// Returns an error if the source is gone or exhausted.
    fn read(&mut self) -> Result<RawSample, LapLoggerError>;

    /// Session level values: `player_name`, `track_name`, `car_name`,
    /// `track_length`, `session_type`, `date` and optionally `vehicle_name`.
    fn session_info(&mut self) -> Result<RawSample, LapLoggerError>;
}

/// Synthetic telemetry for development without the game running.
///
/// Simulates a car lapping Bahrain at roughly 70 m/s. Every call to `read`
/// advances a simulated clock by `tick` (at least [`MIN_MOCK_TICK`]), so
/// output is fully deterministic.
pub struct MockTelemetryReader {
    tick: Duration,
    elapsed_s: f64,
    lap: u32,
    lap_start_s: f64,
    session_start: DateTime<Utc>,
    pub track_name: String,
    pub track_length: f64,
    pub player_name: String,
    pub car_name: String,
}

impl Default for MockTelemetryReader {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

impl MockTelemetryReader {
    pub fn new(tick: Duration) -> Self {
        Self {
            tick: tick.max(MIN_MOCK_TICK),
            elapsed_s: 0.,
            lap: 1,
            lap_start_s: 0.,
            session_start: Utc::now(),
            track_name: "Bahrain International Circuit".to_string(),
            track_length: 5386.80,
            player_name: "Dev User".to_string(),
            car_name: "Toyota GR010".to_string(),
        }
    }

    /// Override the track, mostly to get short laps in tests.
    pub fn with_track(mut self, track_name: &str, track_length: f64) -> Self {
        self.track_name = track_name.to_string();
        self.track_length = track_length;
        self
    }

    pub fn lap(&self) -> u32 {
        self.lap
    }

    fn sample_at(&self, lap_elapsed: f64) -> RawSample {
        let lap_distance = (lap_elapsed * MOCK_AVERAGE_SPEED_MPS) % self.track_length;
        let total_distance = MOCK_TOTAL_DISTANCE_START + self.elapsed_s * MOCK_AVERAGE_SPEED_MPS;

        // slower in corners, faster on straights
        let speed_variation = (lap_distance / 1000.0).sin() * 20.0;
        let speed = 256.0 + speed_variation;
        let sector_index = ((lap_distance / self.track_length) * 3.0).floor().min(2.0) as u32;
        let rpm = 7267.0 + speed_variation * 10.0;
        let throttle = if speed > 200.0 { 100.0 } else { 55.0 };
        let brake = if speed < 180.0 { 8.0 } else { 0.0 };

        let angle = (lap_distance / self.track_length) * 2.0 * PI;
        let position_x = -269.26 + 1000.0 * angle.cos();
        let position_z = -218.97 + 1000.0 * angle.sin();

        let value = json!({
            "player_name": self.player_name,
            "track_name": self.track_name,
            "car_name": self.car_name,
            "session_type": "Practice",
            "game_version": "0.9",
            "date": self.session_start.to_rfc3339(),

            "lap": self.lap,
            "lap_distance": lap_distance,
            "total_distance": total_distance,
            "lap_time": lap_elapsed,
            "sector_index": sector_index,
            "sector1_time": if sector_index < 1 { 0.0 } else { 33.966 },
            "sector2_time": if sector_index < 2 { 0.0 } else { 51.070 },
            "sector3_time": 0.0,

            "track_length": self.track_length,
            "track_temp": 41.80,
            "ambient_temp": 24.02,

            "speed": speed,
            "rpm": rpm,
            "gear": 6,
            "throttle": throttle,
            "brake": brake,
            "steering": lap_elapsed.sin() * 35.0,
            "clutch": 0.0,

            "position_x": position_x,
            "position_y": 7.30,
            "position_z": position_z,
            "yaw": angle,
            "pitch": -0.002,
            "roll": 0.026,

            "wheel_speed": {
                "rl": speed + 0.2,
                "rr": speed - 0.2,
                "fl": speed + 0.3,
                "fr": speed - 0.1,
            },
            "tyre_temp": {"rl": 70.78, "rr": 68.89, "fl": 75.57, "fr": 66.94},
            "tyre_pressure": {"rl": 23.95, "rr": 23.63, "fl": 24.20, "fr": 23.32},
            "tyre_wear": {"rl": 14.35, "rr": 13.10, "fl": 15.83, "fr": 11.88},
            "brake_temp": {"rl": 611.19, "rr": 611.50, "fl": 474.79, "fr": 475.18},
            "suspension_position": {"rl": 0.018, "rr": 0.017, "fl": 0.009, "fr": 0.009},

            "fuel_remaining": 40.30,
            "in_pits": false,
            "lap_invalid": false,
        });
        match value {
            Value::Object(map) => map,
            _ => RawSample::new(),
        }
    }
}

impl TelemetryReader for MockTelemetryReader {
    fn is_available(&mut self) -> bool {
        true
    }

    fn read(&mut self) -> Result<RawSample, LapLoggerError> {
        self.elapsed_s += self.tick.as_secs_f64();
        let mut lap_elapsed = self.elapsed_s - self.lap_start_s;

        if lap_elapsed * MOCK_AVERAGE_SPEED_MPS >= self.track_length && lap_elapsed > 0.5 {
            self.lap += 1;
            self.lap_start_s = self.elapsed_s;
            lap_elapsed = 0.0;
            debug!("Mock reader starting lap {}", self.lap);
        }

        Ok(self.sample_at(lap_elapsed))
    }

    fn session_info(&mut self) -> Result<RawSample, LapLoggerError> {
        let value = json!({
            "player_name": self.player_name,
            "track_name": self.track_name,
            "car_name": self.car_name,
            "session_type": "Practice",
            "game_version": "0.9",
            "date": self.session_start.to_rfc3339(),
            "track_id": 3,
            "track_length": self.track_length,
        });
        match value {
            Value::Object(map) => Ok(map),
            _ => Err(LapLoggerError::TelemetryReaderError {
                description: "Mock session info is not an object".to_string(),
            }),
        }
    }
}

/// Replays raw samples recorded as JSON Lines, one object per line.
///
/// Session info is taken from the most recently read sample, or the first one
/// before any read. The reader reports itself unavailable once every sample
/// has been returned.
pub struct ReplayTelemetryReader {
    cur_tick: usize,
    samples: Vec<RawSample>,
}

impl ReplayTelemetryReader {
    pub fn from_samples(samples: Vec<RawSample>) -> Self {
        Self {
            cur_tick: 0,
            samples,
        }
    }

    /// Load a JSON Lines file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or a line is not a JSON
    /// object.
    pub fn from_file(path: &Path) -> Result<Self, LapLoggerError> {
        let lines = serde_jsonlines::json_lines::<RawSample, _>(path).map_err(|e| {
            LapLoggerError::ReplayFileError {
                path: path.to_path_buf(),
                source: e,
            }
        })?;
        let samples = lines
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| LapLoggerError::ReplayReadError {
                path: path.to_path_buf(),
                source: e,
            })?;
        info!("Loaded {} samples from {:?}", samples.len(), path);
        Ok(Self::from_samples(samples))
    }

    pub fn remaining(&self) -> usize {
        self.samples.len().saturating_sub(self.cur_tick)
    }
}

impl TelemetryReader for ReplayTelemetryReader {
    fn is_available(&mut self) -> bool {
        self.cur_tick < self.samples.len()
    }

    fn read(&mut self) -> Result<RawSample, LapLoggerError> {
        let sample = self.samples.get(self.cur_tick).cloned().ok_or_else(|| {
            LapLoggerError::TelemetryReaderError {
                description: "End of replay".to_string(),
            }
        })?;
        self.cur_tick += 1;
        Ok(sample)
    }

    fn session_info(&mut self) -> Result<RawSample, LapLoggerError> {
        self.samples
            .get(self.cur_tick.saturating_sub(1))
            .cloned()
            .ok_or_else(|| LapLoggerError::TelemetryReaderError {
                description: "Replay contains no samples".to_string(),
            })
    }
}

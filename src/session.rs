// Session state and lap tracking

use chrono::Local;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::telemetry::{CanonicalSample, RawSample, SampleNormalizer};

/// Lifecycle of a logging session.
///
/// Transitions are driven by source presence and the pause/resume controls,
/// never by lap events. `Error` is reachable from every state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    #[default]
    Idle,
    Detected,
    Logging,
    Paused,
    Error,
}

impl SessionState {
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (_, Error) | (_, Idle) => true,
            (Idle, Detected) => true,
            (Detected, Logging) => true,
            (Logging, Paused) | (Paused, Logging) => true,
            (Error, Logging) => true,
            _ => false,
        }
    }
}

/// Events raised by [`LapSessionTracker::update`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LapEvents {
    pub lap_completed: bool,
}

/// Snapshot of the lap currently buffered.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LapSummary {
    pub lap: u32,
    pub lap_time: f64,
    pub sample_count: usize,
    pub lap_distance: f64,
}

/// Tracks the current lap and buffers its normalized samples.
///
/// The owner serializes a completed lap from [`get_lap_data`](Self::get_lap_data)
/// and calls [`clear_lap_buffer`](Self::clear_lap_buffer) only once that lap
/// has been persisted.
#[derive(Debug, Default)]
pub struct LapSessionTracker {
    current_lap: u32,
    /// Lap the buffered samples were recorded on
    buffered_lap: u32,
    session_id: Option<String>,
    lap_samples: Vec<CanonicalSample>,
    normalizer: SampleNormalizer,
}

impl LapSessionTracker {
    pub fn new(normalizer: SampleNormalizer) -> Self {
        Self {
            current_lap: 0,
            buffered_lap: 0,
            session_id: None,
            lap_samples: Vec::new(),
            normalizer,
        }
    }

    /// Reset lap tracking for a new session and return its id.
    pub fn start_session(&mut self, track_length: Option<f64>) -> String {
        let session_id = Self::generate_session_id();
        info!("Starting session {}", session_id);
        self.current_lap = 0;
        self.buffered_lap = 0;
        self.lap_samples.clear();
        self.normalizer.set_track_length(track_length);
        self.session_id = Some(session_id.clone());
        session_id
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn current_lap(&self) -> u32 {
        self.current_lap
    }

    pub fn normalizer(&self) -> &SampleNormalizer {
        &self.normalizer
    }

    /// Record the lap number reported by the latest tick.
    ///
    /// A lap completes when the number changes and the previous lap was not the
    /// zero sentinel. The stored lap is updated whether or not an event fires.
    pub fn update(&mut self, lap: u32) -> LapEvents {
        let lap_completed = lap != self.current_lap && self.current_lap > 0;
        if lap_completed {
            debug!("Lap {} completed, now on lap {}", self.current_lap, lap);
        }
        self.current_lap = lap;
        LapEvents { lap_completed }
    }

    /// Normalize a raw sample and append it to the current lap.
    pub fn add_sample(&mut self, raw: &RawSample) {
        let sample = self.normalizer.normalize(raw);
        if self.lap_samples.is_empty() {
            self.buffered_lap = self.current_lap;
        }
        self.lap_samples.push(sample);
    }

    /// Copy of the samples buffered for the current lap.
    pub fn get_lap_data(&self) -> Vec<CanonicalSample> {
        self.lap_samples.clone()
    }

    pub fn clear_lap_buffer(&mut self) {
        self.lap_samples.clear();
    }

    /// Summary of the buffered lap, `None` while the buffer is empty.
    ///
    /// `lap` is the lap the buffer was filled on, so a summary taken right after
    /// a boundary still names the completed lap.
    pub fn get_lap_summary(&self) -> Option<LapSummary> {
        let last = self.lap_samples.last()?;
        Some(LapSummary {
            lap: self.buffered_lap,
            lap_time: last.lap_time,
            sample_count: self.lap_samples.len(),
            lap_distance: last.lap_distance,
        })
    }

    /// Timestamp based id with microsecond resolution, e.g. `20250101093015123456`.
    pub fn generate_session_id() -> String {
        Local::now().format("%Y%m%d%H%M%S%6f").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn raw(value: Value) -> RawSample {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_first_lap_does_not_complete() {
        let mut tracker = LapSessionTracker::default();
        assert!(!tracker.update(1).lap_completed);
        assert_eq!(tracker.current_lap(), 1);
        assert!(!tracker.update(1).lap_completed);
        assert!(tracker.update(2).lap_completed);
        assert_eq!(tracker.current_lap(), 2);
    }

    #[test]
    fn test_lap_reset_to_zero_completes_lap() {
        let mut tracker = LapSessionTracker::default();
        tracker.update(4);
        assert!(tracker.update(0).lap_completed);
        // back on the sentinel, the next lap only establishes the start
        assert!(!tracker.update(1).lap_completed);
    }

    #[test]
    fn test_lap_summary_is_empty_without_samples() {
        let tracker = LapSessionTracker::default();
        assert_eq!(tracker.get_lap_summary(), None);
    }

    #[test]
    fn test_lap_data_is_a_snapshot() {
        let mut tracker = LapSessionTracker::default();
        tracker.update(1);
        tracker.add_sample(&raw(json!({"lap": 1, "lap_distance": 10.0})));
        let snapshot = tracker.get_lap_data();
        tracker.add_sample(&raw(json!({"lap": 1, "lap_distance": 20.0})));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(tracker.get_lap_data().len(), 2);
    }

    #[test]
    fn test_three_ticks_then_new_lap() {
        let mut tracker = LapSessionTracker::default();
        let ticks = [
            json!({"lap": 1, "lap_distance": 100.0, "lap_time": 1.0}),
            json!({"lap": 1, "lap_distance": 200.0, "lap_time": 2.0}),
            json!({"lap": 1, "lap_distance": 300.0, "lap_time": 3.0}),
        ];
        for tick in ticks {
            let tick = raw(tick);
            assert!(!tracker.update(1).lap_completed);
            tracker.add_sample(&tick);
        }

        let events = tracker.update(2);
        assert!(events.lap_completed);
        let lap = tracker.get_lap_data();
        assert_eq!(lap.len(), 3);

        let summary = tracker.get_lap_summary().unwrap();
        assert_eq!(summary.lap_time, 3.0);
        assert_eq!(summary.lap_distance, 300.0);
        assert_eq!(summary.sample_count, 3);
        assert_eq!(summary.lap, 1);
        assert_eq!(tracker.current_lap(), 2);

        tracker.clear_lap_buffer();
        assert!(tracker.get_lap_data().is_empty());
    }

    #[test]
    fn test_start_session_resets_tracking() {
        let mut tracker = LapSessionTracker::default();
        tracker.update(3);
        tracker.add_sample(&raw(json!({"lap": 3})));

        let id = tracker.start_session(Some(900.0));
        assert_eq!(tracker.session_id(), Some(id.as_str()));
        assert_eq!(tracker.current_lap(), 0);
        assert!(tracker.get_lap_data().is_empty());

        tracker.add_sample(&raw(json!({"lap_distance": 300.0})));
        assert_eq!(tracker.get_lap_data()[0].sector, 1);
    }

    #[test]
    fn test_session_ids_are_unique() {
        let first = LapSessionTracker::generate_session_id();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = LapSessionTracker::generate_session_id();
        assert_eq!(first.len(), 20);
        assert!(first.chars().all(|c| c.is_ascii_digit()));
        assert_ne!(first, second);
    }

    #[test]
    fn test_state_transitions() {
        use SessionState::*;
        assert!(Idle.can_transition_to(Detected));
        assert!(Detected.can_transition_to(Logging));
        assert!(Logging.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Logging));
        assert!(Paused.can_transition_to(Error));
        assert!(Error.can_transition_to(Logging));
        assert!(!Idle.can_transition_to(Logging));
        assert!(!Detected.can_transition_to(Paused));
    }
}

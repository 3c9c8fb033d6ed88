use std::path::PathBuf;

use log::{debug, error, info, warn};

use crate::{
    LapLoggerError,
    session::{LapSessionTracker, SessionState},
    storage::LapSink,
    vehicle_metadata::VehicleLookup,
    writer::{build_lap_metadata, format_lap},
};

use super::{
    RawSample, SampleNormalizer, SessionInfo, TelemetryReader, raw_f64, raw_lap_number, raw_string,
};

/// What a single [`LapRecorder::tick`] did.
#[derive(Clone, Debug, PartialEq)]
pub enum TickOutcome {
    /// No source present
    Waiting,
    /// A new session was opened with this id
    SessionStarted(String),
    /// A sample was added to the current lap
    Sampled,
    /// A completed lap was written to this path
    LapSaved(PathBuf),
    Paused,
    /// The source disappeared and the partial lap was discarded
    SourceLost,
}

/// Owns the poll loop state: reader, lap tracker and lap sink.
///
/// Call [`tick`](Self::tick) once per poll interval. Completed laps are
/// serialized and handed to the sink before the first sample of the next lap
/// is buffered. When the sink fails the lap stays buffered and the recorder
/// enters [`SessionState::Error`], retrying on every following tick. The
/// sample that crossed the boundary is held back until the retry succeeds.
pub struct LapRecorder<R: TelemetryReader, S: LapSink, L: VehicleLookup> {
    reader: R,
    sink: S,
    vehicles: L,
    tracker: LapSessionTracker,
    state: SessionState,
    session: Option<SessionInfo>,
    /// First sample of the next lap, waiting on a failed save
    pending: Option<RawSample>,
    laps_saved: usize,
}

impl<R: TelemetryReader, S: LapSink, L: VehicleLookup> LapRecorder<R, S, L> {
    pub fn new(reader: R, sink: S, vehicles: L, normalizer: SampleNormalizer) -> Self {
        Self {
            reader,
            sink,
            vehicles,
            tracker: LapSessionTracker::new(normalizer),
            state: SessionState::Idle,
            session: None,
            pending: None,
            laps_saved: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session(&self) -> Option<&SessionInfo> {
        self.session.as_ref()
    }

    pub fn tracker(&self) -> &LapSessionTracker {
        &self.tracker
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn laps_saved(&self) -> usize {
        self.laps_saved
    }

    /// Stop buffering samples. Only valid while logging.
    pub fn pause(&mut self) -> bool {
        self.transition(SessionState::Paused)
    }

    pub fn resume(&mut self) -> bool {
        if self.state != SessionState::Paused {
            return false;
        }
        self.transition(SessionState::Logging)
    }

    /// Advance the recorder by one poll.
    ///
    /// # Errors
    ///
    /// Reader failures leave the state unchanged. Serialization or sink
    /// failures move the recorder to [`SessionState::Error`] with the
    /// completed lap still buffered. That lap is retried even after the source
    /// is gone.
    pub fn tick(&mut self) -> Result<TickOutcome, LapLoggerError> {
        if !self.reader.is_available() {
            return match self.state {
                SessionState::Idle => Ok(TickOutcome::Waiting),
                SessionState::Error => self.flush_after_source_lost(),
                _ => {
                    warn!("Telemetry source lost, discarding partial lap");
                    self.reset();
                    Ok(TickOutcome::SourceLost)
                }
            };
        }

        match self.state {
            SessionState::Idle => {
                info!("Telemetry source detected");
                self.transition(SessionState::Detected);
                self.start_session()
            }
            SessionState::Detected => self.start_session(),
            SessionState::Paused => Ok(TickOutcome::Paused),
            SessionState::Error => self.retry_flush(),
            SessionState::Logging => self.record_sample(),
        }
    }

    fn start_session(&mut self) -> Result<TickOutcome, LapLoggerError> {
        let raw_info = self.reader.session_info()?;
        let track_length = raw_f64(&raw_info, "track_length").filter(|len| *len > 0.0);
        let session_id = self.tracker.start_session(track_length);
        self.pending = None;

        let mut session = SessionInfo::from_raw(&raw_info, session_id.clone());
        session.vehicle = self.vehicles.lookup(&session.vehicle_name);
        info!(
            "Logging {} in {} at {}",
            session.player_name, session.car_name, session.track_name
        );
        self.session = Some(session);
        self.transition(SessionState::Logging);
        Ok(TickOutcome::SessionStarted(session_id))
    }

    fn record_sample(&mut self) -> Result<TickOutcome, LapLoggerError> {
        let raw = self.reader.read()?;

        if self.track_changed(&raw) {
            info!("Track changed, starting a new session");
            return self.start_session();
        }

        let mut outcome = TickOutcome::Sampled;
        if self.tracker.update(raw_lap_number(&raw)).lap_completed {
            match self.flush_completed_lap() {
                Ok(Some(path)) => outcome = TickOutcome::LapSaved(path),
                Ok(None) => {}
                Err(e) => {
                    error!("Could not save lap: {}", e);
                    self.pending = Some(raw);
                    self.transition(SessionState::Error);
                    return Err(e);
                }
            }
        }

        self.tracker.add_sample(&raw);
        Ok(outcome)
    }

    fn retry_flush(&mut self) -> Result<TickOutcome, LapLoggerError> {
        let path = self.flush_completed_lap()?;
        info!("Recovered from save failure");
        if let Some(raw) = self.pending.take() {
            self.tracker.add_sample(&raw);
        }
        self.transition(SessionState::Logging);
        Ok(path.map_or(TickOutcome::Sampled, TickOutcome::LapSaved))
    }

    /// The completed lap outlives the source: keep retrying it, and only go
    /// idle once it is saved.
    fn flush_after_source_lost(&mut self) -> Result<TickOutcome, LapLoggerError> {
        let path = self.flush_completed_lap()?;
        warn!("Telemetry source lost after recovering unsaved lap");
        self.reset();
        Ok(path.map_or(TickOutcome::SourceLost, TickOutcome::LapSaved))
    }

    fn reset(&mut self) {
        self.session = None;
        self.pending = None;
        self.tracker.clear_lap_buffer();
        self.transition(SessionState::Idle);
    }

    /// Serialize and persist the buffered lap, clearing it only on success.
    fn flush_completed_lap(&mut self) -> Result<Option<PathBuf>, LapLoggerError> {
        let (Some(summary), Some(session)) = (self.tracker.get_lap_summary(), &self.session)
        else {
            debug!("Lap completed with an empty buffer, nothing to save");
            return Ok(None);
        };

        let samples = self.tracker.get_lap_data();
        let metadata = build_lap_metadata(
            session,
            &summary,
            self.tracker.normalizer().sector_count(),
        );
        let csv_content = format_lap(&samples, &metadata)?;
        let path = self.sink.save_lap(&csv_content, &summary, session)?;

        self.tracker.clear_lap_buffer();
        self.laps_saved += 1;
        info!(
            "Saved lap {} ({} samples, {:.3}s) to {:?}",
            summary.lap, summary.sample_count, summary.lap_time, path
        );
        Ok(Some(path))
    }

    fn track_changed(&self, raw: &RawSample) -> bool {
        match (raw_string(raw, "track_name"), &self.session) {
            (Some(track), Some(session)) => track != session.track_name,
            _ => false,
        }
    }

    fn transition(&mut self, next: SessionState) -> bool {
        if self.state == next {
            return true;
        }
        if !self.state.can_transition_to(next) {
            warn!("Ignoring state change {:?} -> {:?}", self.state, next);
            return false;
        }
        debug!("State {:?} -> {:?}", self.state, next);
        self.state = next;
        true
    }
}

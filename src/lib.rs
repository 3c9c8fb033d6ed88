// Library interface for lap-logger
// This allows integration tests and benches to access internal modules

pub mod config;
pub mod errors;
pub mod session;
pub mod storage;
pub mod telemetry;
pub mod vehicle_metadata;
pub mod writer;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::LapLoggerError;
pub use session::{LapEvents, LapSessionTracker, LapSummary, SessionState};
pub use storage::{LapFileManager, LapSink};
pub use telemetry::{
    CanonicalSample, LapRecorder, MockTelemetryReader, RawSample, ReplayTelemetryReader,
    SampleNormalizer, SessionInfo, TelemetryReader, TickOutcome,
};
pub use vehicle_metadata::{VehicleCatalog, VehicleLookup, VehicleMetadata};
pub use writer::{LapMetadata, build_lap_metadata, format_lap};

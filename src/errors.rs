// Error types for lap-logger

use snafu::Snafu;
use std::{io, path::PathBuf};

#[derive(Debug, Snafu)]
pub enum LapLoggerError {
    // Errors while reading telemetry from a source
    #[snafu(display("Telemetry reader error: {description}"))]
    TelemetryReaderError { description: String },
    #[snafu(display("Unable to open replay file {path:?}"))]
    ReplayFileError { path: PathBuf, source: io::Error },
    #[snafu(display("Error reading replay file {path:?}"))]
    ReplayReadError { path: PathBuf, source: io::Error },

    // Errors for the lap serializer
    #[snafu(display("Error formatting lap CSV"))]
    CsvFormatError { source: csv::Error },

    // Errors for lap persistence
    #[snafu(display("Could not create output directory {path:?}"))]
    OutputDirError { path: PathBuf, source: io::Error },
    #[snafu(display("Error writing lap file {path:?}"))]
    LapWriteError { path: PathBuf, source: io::Error },
    #[snafu(display("Error listing lap files in {path:?}"))]
    LapListError { path: PathBuf, source: io::Error },
    #[snafu(display("Not a lap file name: {name}"))]
    InvalidLapName { name: String },
    #[snafu(display("Invalid filename template placeholder: {{{placeholder}}}"))]
    InvalidFilenameTemplate { placeholder: String },

    // Vehicle metadata errors
    #[snafu(display("Error reading vehicle catalog {path:?}"))]
    VehicleCatalogIOError { path: PathBuf, source: io::Error },
    #[snafu(display("Error parsing vehicle catalog"))]
    VehicleCatalogParseError { source: serde_json::Error },

    // Config management errors
    #[snafu(display("Could not find application data directory to save config file"))]
    NoConfigDir,
    #[snafu(display("Error reading or writing config file"))]
    ConfigIOError { source: io::Error },
    #[snafu(display("Error serializing config file"))]
    ConfigSerializeError { source: serde_json::Error },
}

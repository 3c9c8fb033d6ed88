// Lap file persistence

use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use log::{debug, info};

use crate::{LapLoggerError, session::LapSummary, telemetry::SessionInfo};

pub const DEFAULT_FILENAME_FORMAT: &str =
    "{date}_{time}_{track}_{car}_{driver}_lap{lap}_t{lap_time}s_{session_id}.csv";

const PLACEHOLDERS: [&str; 8] = [
    "date",
    "time",
    "track",
    "car",
    "driver",
    "lap",
    "lap_time",
    "session_id",
];

const INVALID_FILENAME_CHARS: [char; 10] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*', ' '];

/// Destination for completed laps.
///
/// A failed save must leave the caller's lap buffer untouched so the lap can be
/// retried.
pub trait LapSink {
    fn save_lap(
        &mut self,
        csv_content: &str,
        lap_summary: &LapSummary,
        session_info: &SessionInfo,
    ) -> Result<PathBuf, LapLoggerError>;
}

/// Writes lap files into a single output directory.
pub struct LapFileManager {
    output_dir: PathBuf,
    filename_format: String,
}

impl LapFileManager {
    /// Create the manager and its output directory.
    ///
    /// Fails when the directory cannot be created or the template uses an
    /// unknown placeholder.
    pub fn new(output_dir: PathBuf, filename_format: &str) -> Result<Self, LapLoggerError> {
        validate_template(filename_format)?;
        if !output_dir.exists() {
            fs::create_dir_all(&output_dir).map_err(|e| LapLoggerError::OutputDirError {
                path: output_dir.clone(),
                source: e,
            })?;
        }
        Ok(Self {
            output_dir,
            filename_format: filename_format.to_string(),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Render the filename for a lap.
    pub fn filename_for(&self, lap_summary: &LapSummary, session_info: &SessionInfo) -> String {
        let session_id = if session_info.session_id.is_empty() {
            Utc::now().format("%Y%m%d%H%M%S").to_string()
        } else {
            session_info.session_id.clone()
        };
        let timestamp: DateTime<Utc> = session_info.started_at;

        let mut filename = self.filename_format.clone();
        for placeholder in PLACEHOLDERS {
            let value = match placeholder {
                "date" => timestamp.format("%Y-%m-%d").to_string(),
                "time" => timestamp.format("%H-%M").to_string(),
                "track" => or_unknown(&session_info.track_name, "unknown-track"),
                "car" => or_unknown(&session_info.car_name, "unknown-car"),
                "driver" => or_unknown(&session_info.player_name, "unknown-driver"),
                "lap" => lap_summary.lap.to_string(),
                "lap_time" => format_lap_time(lap_summary.lap_time).to_string(),
                _ => session_id.clone(),
            };
            filename = filename.replace(&format!("{{{placeholder}}}"), &value);
        }
        sanitize_filename(&filename)
    }

    /// Names of all lap files in the output directory, sorted.
    pub fn list_saved_laps(&self) -> Result<Vec<String>, LapLoggerError> {
        self.lap_files(|_| true)
    }

    /// Lap files whose name contains the session id.
    pub fn get_session_laps(&self, session_id: &str) -> Result<Vec<String>, LapLoggerError> {
        self.lap_files(|name| name.contains(session_id))
    }

    /// Delete one lap file. Returns `false` when it does not exist.
    ///
    /// Only bare file names inside the output directory are accepted.
    pub fn delete_lap(&self, filename: &str) -> Result<bool, LapLoggerError> {
        if Path::new(filename).file_name().and_then(|n| n.to_str()) != Some(filename)
            || filename.contains(['/', '\\'])
        {
            return Err(LapLoggerError::InvalidLapName {
                name: filename.to_string(),
            });
        }
        let path = self.output_dir.join(filename);
        if !path.is_file() {
            return Ok(false);
        }
        fs::remove_file(&path).map_err(|e| LapLoggerError::LapWriteError { path, source: e })?;
        Ok(true)
    }

    /// Delete every lap file and return how many were removed.
    pub fn clear_all_laps(&self) -> Result<usize, LapLoggerError> {
        let laps = self.list_saved_laps()?;
        for lap in &laps {
            self.delete_lap(lap)?;
        }
        info!("Deleted {} lap files from {:?}", laps.len(), self.output_dir);
        Ok(laps.len())
    }

    fn lap_files(&self, filter: impl Fn(&str) -> bool) -> Result<Vec<String>, LapLoggerError> {
        if !self.output_dir.exists() {
            return Ok(Vec::new());
        }
        let entries =
            fs::read_dir(&self.output_dir).map_err(|e| LapLoggerError::LapListError {
                path: self.output_dir.clone(),
                source: e,
            })?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| LapLoggerError::LapListError {
                path: self.output_dir.clone(),
                source: e,
            })?;
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if filter(name) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

impl LapSink for LapFileManager {
    fn save_lap(
        &mut self,
        csv_content: &str,
        lap_summary: &LapSummary,
        session_info: &SessionInfo,
    ) -> Result<PathBuf, LapLoggerError> {
        let path = self
            .output_dir
            .join(self.filename_for(lap_summary, session_info));
        fs::write(&path, csv_content).map_err(|e| LapLoggerError::LapWriteError {
            path: path.clone(),
            source: e,
        })?;
        debug!("Wrote {} bytes to {:?}", csv_content.len(), path);
        Ok(path)
    }
}

fn validate_template(template: &str) -> Result<(), LapLoggerError> {
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            return Err(LapLoggerError::InvalidFilenameTemplate {
                placeholder: after.to_string(),
            });
        };
        let placeholder = &after[..end];
        if !PLACEHOLDERS.contains(&placeholder) {
            return Err(LapLoggerError::InvalidFilenameTemplate {
                placeholder: placeholder.to_string(),
            });
        }
        rest = &after[end + 1..];
    }
    Ok(())
}

fn or_unknown(value: &str, fallback: &str) -> String {
    if value.is_empty() || value == "Unknown" {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

/// Whole seconds, `0` for unusable values.
fn format_lap_time(lap_time: f64) -> i64 {
    if lap_time.is_finite() {
        lap_time.round() as i64
    } else {
        0
    }
}

/// Replace characters that are invalid in filenames, and spaces, with `_`.
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| if INVALID_FILENAME_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn session() -> SessionInfo {
        SessionInfo {
            session_id: "20250101093015123456".to_string(),
            player_name: "Dev User".to_string(),
            car_name: "Toyota GR010".to_string(),
            track_name: "Bahrain International Circuit".to_string(),
            track_length: 5386.8,
            started_at: Utc.with_ymd_and_hms(2025, 1, 1, 9, 30, 15).unwrap(),
            ..Default::default()
        }
    }

    fn summary(lap: u32) -> LapSummary {
        LapSummary {
            lap,
            lap_time: 95.6,
            sample_count: 100,
            lap_distance: 5380.0,
        }
    }

    #[test]
    fn test_default_filename() {
        let dir = TempDir::new().unwrap();
        let manager = LapFileManager::new(dir.path().to_path_buf(), DEFAULT_FILENAME_FORMAT).unwrap();
        assert_eq!(
            manager.filename_for(&summary(2), &session()),
            "2025-01-01_09-30_Bahrain_International_Circuit_Toyota_GR010_Dev_User_lap2_t96s_20250101093015123456.csv"
        );
    }

    #[test]
    fn test_unknown_identity_fallbacks() {
        let dir = TempDir::new().unwrap();
        let manager =
            LapFileManager::new(dir.path().to_path_buf(), "{track}_{car}_{driver}.csv").unwrap();
        assert_eq!(
            manager.filename_for(&summary(1), &SessionInfo::default()),
            "unknown-track_unknown-car_unknown-driver.csv"
        );
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("a<b>c:d\"e/f\\g|h?i*j k"), "a_b_c_d_e_f_g_h_i_j_k");
    }

    #[test]
    fn test_rejects_unknown_placeholders() {
        let dir = TempDir::new().unwrap();
        let err = LapFileManager::new(dir.path().to_path_buf(), "{weather}_{lap}.csv");
        assert!(matches!(
            err,
            Err(LapLoggerError::InvalidFilenameTemplate { placeholder }) if placeholder == "weather"
        ));
        assert!(LapFileManager::new(dir.path().to_path_buf(), "{lap.csv").is_err());
    }

    #[test]
    fn test_creates_output_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        let manager = LapFileManager::new(nested.clone(), DEFAULT_FILENAME_FORMAT).unwrap();
        assert!(nested.is_dir());
        assert_eq!(manager.output_dir(), nested.as_path());
    }

    #[test]
    fn test_save_list_and_delete() {
        let dir = TempDir::new().unwrap();
        let mut manager =
            LapFileManager::new(dir.path().to_path_buf(), "lap{lap}_{session_id}.csv").unwrap();

        let path = manager.save_lap("Format,LMUTelemetry v2", &summary(1), &session()).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "Format,LMUTelemetry v2");
        manager.save_lap("x", &summary(2), &session()).unwrap();
        let other = SessionInfo {
            session_id: "other".to_string(),
            ..session()
        };
        manager.save_lap("x", &summary(1), &other).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        assert_eq!(
            manager.list_saved_laps().unwrap(),
            vec![
                "lap1_20250101093015123456.csv",
                "lap1_other.csv",
                "lap2_20250101093015123456.csv",
            ]
        );
        assert_eq!(
            manager.get_session_laps("20250101093015123456").unwrap().len(),
            2
        );

        assert!(manager.delete_lap("lap1_other.csv").unwrap());
        assert!(!manager.delete_lap("lap1_other.csv").unwrap());
        assert_eq!(manager.clear_all_laps().unwrap(), 2);
        assert!(manager.list_saved_laps().unwrap().is_empty());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_delete_rejects_paths_outside_output_dir() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("laps");
        let manager = LapFileManager::new(output, DEFAULT_FILENAME_FORMAT).unwrap();
        let outside = dir.path().join("x.csv");
        fs::write(&outside, "keep").unwrap();

        for name in ["../x.csv", "..", "sub/x.csv", "sub\\x.csv", ""] {
            assert!(
                matches!(
                    manager.delete_lap(name),
                    Err(LapLoggerError::InvalidLapName { .. })
                ),
                "{name} accepted"
            );
        }
        assert!(outside.exists());
    }
}

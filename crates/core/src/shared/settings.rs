use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detection::domain::model_ref::ModelRef;
use crate::shared::constants::{
    DEFAULT_ALERT_JOURNAL_CAPACITY, DEFAULT_ALERT_QUEUE_CAPACITY, DEFAULT_AREA_THRESHOLD,
    DEFAULT_DETECTION_CONFIDENCE, DEFAULT_FACE_CONFIDENCE, DEFAULT_MATCH_TOLERANCE,
    DEFAULT_MOTION_HISTORY, DEFAULT_VAR_THRESHOLD, DEFAULT_WARMUP_FRAMES,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read settings from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionSettings {
    pub area_threshold: u32,
    pub history: u32,
    pub var_threshold: f32,
    pub warmup_frames: u32,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            area_threshold: DEFAULT_AREA_THRESHOLD,
            history: DEFAULT_MOTION_HISTORY,
            var_threshold: DEFAULT_VAR_THRESHOLD,
            warmup_frames: DEFAULT_WARMUP_FRAMES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    pub confidence: f64,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            confidence: DEFAULT_DETECTION_CONFIDENCE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchlistSettings {
    pub tolerance: f64,
    /// Unset: the default face detector, found in the model cache or the
    /// data directory's `models/`, downloaded when `download_models` allows.
    pub face_model: Option<PathBuf>,
    /// Unset: the default embedding model, resolved like `face_model`.
    /// Colour histograms are used when no embedding model is available.
    pub embedding_model: Option<PathBuf>,
    pub face_confidence: f64,
    pub download_models: bool,
    /// Overrides the platform cache directory for downloaded models.
    pub model_cache_dir: Option<PathBuf>,
}

impl Default for WatchlistSettings {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_MATCH_TOLERANCE,
            face_model: None,
            embedding_model: None,
            face_confidence: DEFAULT_FACE_CONFIDENCE,
            download_models: true,
            model_cache_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    pub queue_capacity: usize,
    pub journal_capacity: usize,
    pub jpeg_quality: u8,
    pub bell: bool,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_ALERT_QUEUE_CAPACITY,
            journal_capacity: DEFAULT_ALERT_JOURNAL_CAPACITY,
            jpeg_quality: 90,
            bell: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    pub jpeg_quality: u8,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self { jpeg_quality: 80 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSettings {
    pub workers: usize,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self { workers: 2 }
    }
}

/// Process-wide configuration.
///
/// Every field falls back to its default when absent, so a partial JSON
/// file only needs to name what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub roles: BTreeMap<String, ModelRef>,
    pub motion: MotionSettings,
    pub detection: DetectionSettings,
    pub watchlist: WatchlistSettings,
    pub alerts: AlertSettings,
    pub stream: StreamSettings,
    pub jobs: JobSettings,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = PathBuf::from("vigil-data");
        let roles = ["home", "defence", "farm"]
            .into_iter()
            .map(|role| {
                let path = PathBuf::from("models").join(format!("{role}_model.onnx"));
                (role.to_string(), ModelRef::new(path))
            })
            .collect();
        Self {
            data_dir,
            roles,
            motion: MotionSettings::default(),
            detection: DetectionSettings::default(),
            watchlist: WatchlistSettings::default(),
            alerts: AlertSettings::default(),
            stream: StreamSettings::default(),
            jobs: JobSettings::default(),
        }
    }
}

impl Settings {
    /// Default settings location: `<config_dir>/Vigil/settings.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("Vigil").join("settings.json"))
    }

    /// Loads settings from `path`, or from [`Settings::default_path`] when
    /// `None`. A missing file yields the defaults; a malformed one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path() {
                Some(p) => p,
                None => return Ok(Self::default()),
            },
        };
        if !path.exists() {
            log::debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let json = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&json).map_err(|source| ConfigError::Parse { path, source })
    }

    pub fn alert_dir(&self) -> PathBuf {
        self.data_dir.join("logs").join("alerts")
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    pub fn watchlist_dir(&self) -> PathBuf {
        self.data_dir.join("watchlist")
    }

    pub fn model_dir(&self) -> PathBuf {
        self.data_dir.join("models")
    }

    /// Relative paths are taken from the data directory.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_relative() {
            self.data_dir.join(path)
        } else {
            path.to_path_buf()
        }
    }

    /// Resolves a role to its detection model; relative model paths are
    /// taken from the data directory.
    pub fn model_for_role(&self, role: &str) -> Option<ModelRef> {
        self.roles.get(role).map(|model| ModelRef {
            path: self.resolve_path(&model.path),
            labels: model.labels.clone(),
        })
    }

    /// Creates the persisted directory layout.
    pub fn ensure_dirs(&self) -> Result<(), ConfigError> {
        for dir in [
            self.alert_dir(),
            self.upload_dir(),
            self.watchlist_dir(),
            self.model_dir(),
        ] {
            fs::create_dir_all(&dir).map_err(|source| ConfigError::CreateDir {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults_match_documented_values() {
        let s = Settings::default();
        assert_eq!(s.motion.area_threshold, 800);
        assert_eq!(s.motion.history, 120);
        assert_relative_eq!(s.motion.var_threshold, 32.0);
        assert_relative_eq!(s.watchlist.tolerance, 0.6);
        assert!(s.watchlist.face_model.is_none());
        assert!(s.watchlist.download_models);
        assert_eq!(s.roles.len(), 3);
    }

    #[test]
    fn test_model_for_role_resolves_under_data_dir() {
        let s = Settings {
            data_dir: PathBuf::from("/srv/vigil"),
            ..Settings::default()
        };
        let model = s.model_for_role("farm").unwrap();
        assert_eq!(model.path, PathBuf::from("/srv/vigil/models/farm_model.onnx"));
        assert!(s.model_for_role("unknown").is_none());
        assert_eq!(
            s.resolve_path(Path::new("/opt/face.onnx")),
            PathBuf::from("/opt/face.onnx")
        );
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let s = Settings::load(Some(&dir.path().join("nope.json"))).unwrap();
        assert_eq!(s, Settings::default());
    }

    #[test]
    fn test_load_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{ "motion": { "area_threshold": 1500 }, "watchlist": { "tolerance": 0.45 } }"#,
        )
        .unwrap();

        let s = Settings::load(Some(&path)).unwrap();
        assert_eq!(s.motion.area_threshold, 1500);
        assert_eq!(s.motion.history, 120);
        assert_relative_eq!(s.watchlist.tolerance, 0.45);
        assert_eq!(s.alerts, AlertSettings::default());
    }

    #[test]
    fn test_load_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Settings::load(Some(&path)),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_ensure_dirs_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        let s = Settings {
            data_dir: dir.path().to_path_buf(),
            ..Settings::default()
        };
        s.ensure_dirs().unwrap();
        assert!(s.alert_dir().is_dir());
        assert!(s.upload_dir().is_dir());
        assert!(s.watchlist_dir().is_dir());
    }
}

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default upload size limit (4 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 4 * 1024 * 1024;

/// Highest accepted render tick rate.
pub const MAX_FRAME_RATE: u32 = 1000;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Runtime configuration, from an optional TOML file plus environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Face-mesh model file name inside `model_dir`.
    pub facemesh_model: String,
    /// Replacement product catalog (JSON). Uses the built-in one when unset.
    pub catalog_path: Option<PathBuf>,
    /// Candidates handed to the product matcher.
    pub top_n: usize,
    /// Largest accepted upload in bytes.
    pub max_upload_bytes: usize,
    /// Render loop tick rate.
    pub frame_rate: u32,
    /// Minimum face-presence score for a landmark set to be drawn.
    pub landmark_score_threshold: f32,
    /// JPEG quality of recommendation snapshots.
    pub snapshot_quality: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera_device: "/dev/video0".to_string(),
            model_dir: default_model_dir(),
            facemesh_model: "face_mesh.onnx".to_string(),
            catalog_path: None,
            top_n: 3,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            frame_rate: 30,
            landmark_score_threshold: 0.5,
            snapshot_quality: 95,
        }
    }
}

/// On-disk shape; every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    camera_device: Option<String>,
    model_dir: Option<PathBuf>,
    facemesh_model: Option<String>,
    catalog_path: Option<PathBuf>,
    top_n: Option<usize>,
    max_upload_bytes: Option<usize>,
    frame_rate: Option<u32>,
    landmark_score_threshold: Option<f32>,
    snapshot_quality: Option<u8>,
}

impl Config {
    /// Load `$SHADEMATCH_CONFIG` (if set), then apply `SHADEMATCH_*`
    /// environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("SHADEMATCH_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Defaults plus `SHADEMATCH_*` environment overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let src = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml(&src)?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    pub fn from_toml(src: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(src)?;
        let d = Self::default();
        Ok(Self {
            camera_device: file.camera_device.unwrap_or(d.camera_device),
            model_dir: file.model_dir.unwrap_or(d.model_dir),
            facemesh_model: file.facemesh_model.unwrap_or(d.facemesh_model),
            catalog_path: file.catalog_path.or(d.catalog_path),
            top_n: file.top_n.unwrap_or(d.top_n),
            max_upload_bytes: file.max_upload_bytes.unwrap_or(d.max_upload_bytes),
            frame_rate: file.frame_rate.unwrap_or(d.frame_rate).clamp(1, MAX_FRAME_RATE),
            landmark_score_threshold: file.landmark_score_threshold.unwrap_or(d.landmark_score_threshold),
            snapshot_quality: file.snapshot_quality.unwrap_or(d.snapshot_quality),
        })
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("SHADEMATCH_CAMERA_DEVICE") {
            self.camera_device = v;
        }
        if let Ok(v) = std::env::var("SHADEMATCH_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("SHADEMATCH_FACEMESH_MODEL") {
            self.facemesh_model = v;
        }
        if let Ok(v) = std::env::var("SHADEMATCH_CATALOG") {
            self.catalog_path = Some(PathBuf::from(v));
        }
        self.top_n = env_parse("SHADEMATCH_TOP_N", self.top_n);
        self.max_upload_bytes = env_parse("SHADEMATCH_MAX_UPLOAD_BYTES", self.max_upload_bytes);
        self.frame_rate = env_parse("SHADEMATCH_FRAME_RATE", self.frame_rate).clamp(1, MAX_FRAME_RATE);
        self.landmark_score_threshold =
            env_parse("SHADEMATCH_LANDMARK_SCORE_THRESHOLD", self.landmark_score_threshold);
        self.snapshot_quality = env_parse("SHADEMATCH_SNAPSHOT_QUALITY", self.snapshot_quality);
    }

    /// Path to the face-mesh landmark model.
    pub fn facemesh_model_path(&self) -> String {
        self.model_dir
            .join(&self.facemesh_model)
            .to_string_lossy()
            .into_owned()
    }
}

/// `$XDG_DATA_HOME/shadematch/models`, falling back to `~/.local/share`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("shadematch/models")
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = Config::default();
        assert_eq!(c.top_n, 3);
        assert_eq!(c.max_upload_bytes, 4 * 1024 * 1024);
        assert_eq!(c.frame_rate, 30);
        assert_eq!(c.snapshot_quality, 95);
        assert!(c.facemesh_model_path().ends_with("face_mesh.onnx"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let c = Config::from_toml(
            r#"
            camera_device = "/dev/video4"
            top_n = 5
            frame_rate = 0
            "#,
        )
        .unwrap();
        assert_eq!(c.camera_device, "/dev/video4");
        assert_eq!(c.top_n, 5);
        assert_eq!(c.frame_rate, 1);
        assert_eq!(c.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
    }

    #[test]
    fn test_frame_rate_capped() {
        let c = Config::from_toml("frame_rate = 2000000000").unwrap();
        assert_eq!(c.frame_rate, MAX_FRAME_RATE);
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(matches!(
            Config::from_toml("camera = \"/dev/video0\""),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Config::from_file(Path::new("/nonexistent/shadematch.toml")),
            Err(ConfigError::Io { .. })
        ));
    }
}

//! Engine and load configuration.
//!
//! Levels are modelled as enums so out-of-range values are unrepresentable;
//! the remaining preconditions live in the `validate` methods and run before
//! anything crosses the foreign boundary.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Backend log severity, forwarded to the backend's own logger at init.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warning = 3,
    Error = 4,
    Fatal = 5,
}

impl LogLevel {
    /// Value passed through the C ABI.
    pub fn raw(self) -> i32 {
        self as i32
    }
}

impl TryFrom<u8> for LogLevel {
    type Error = EngineError;

    fn try_from(value: u8) -> std::result::Result<Self, EngineError> {
        match value {
            0 => Ok(LogLevel::Trace),
            1 => Ok(LogLevel::Debug),
            2 => Ok(LogLevel::Info),
            3 => Ok(LogLevel::Warning),
            4 => Ok(LogLevel::Error),
            5 => Ok(LogLevel::Fatal),
            _ => Err(EngineError::Config(
                "log_level must be 0 (trace), 1 (debug), 2 (info), 3 (warning), 4 (error) or 5 (fatal)"
                    .to_string(),
            )),
        }
    }
}

impl From<LogLevel> for u8 {
    fn from(level: LogLevel) -> u8 {
        level as u8
    }
}

/// How much device-specific tuning the backend performs at init.
///
/// Higher levels search longer and produce better kernels; the cost is paid
/// once per process and can be captured in a tuning file for later runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum TuningLevel {
    /// Read existing tuning data only; requires a tuning file.
    ReadOnly = 0,
    Rapid = 1,
    Normal = 2,
    Exhaustive = 3,
}

impl TuningLevel {
    /// Value passed through the C ABI.
    pub fn raw(self) -> i32 {
        self as i32
    }
}

impl TryFrom<u8> for TuningLevel {
    type Error = EngineError;

    fn try_from(value: u8) -> std::result::Result<Self, EngineError> {
        match value {
            0 => Ok(TuningLevel::ReadOnly),
            1 => Ok(TuningLevel::Rapid),
            2 => Ok(TuningLevel::Normal),
            3 => Ok(TuningLevel::Exhaustive),
            _ => Err(EngineError::Config(
                "tuning_level must be 0 (load from tuning_file), 1, 2 or 3".to_string(),
            )),
        }
    }
}

impl From<TuningLevel> for u8 {
    fn from(level: TuningLevel) -> u8 {
        level as u8
    }
}

/// Compiled-graph format, selected by file extension and never by content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFormat {
    ArmNn,
    TfLite,
    Onnx,
}

impl ModelFormat {
    /// Detect the format from a path's extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("armnn") => Some(ModelFormat::ArmNn),
            Some("tflite") => Some(ModelFormat::TfLite),
            Some("onnx") => Some(ModelFormat::Onnx),
            _ => None,
        }
    }

    /// The file extension for this format.
    pub fn extension(self) -> &'static str {
        match self {
            ModelFormat::ArmNn => "armnn",
            ModelFormat::TfLite => "tflite",
            ModelFormat::Onnx => "onnx",
        }
    }
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Options for creating the engine instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Backend log severity.
    pub log_level: LogLevel,

    /// Tuning effort at init.
    pub tuning_level: TuningLevel,

    /// Tuning data file, read at init and written at destroy.
    pub tuning_file: Option<PathBuf>,
}

impl EngineOptions {
    /// Options with the default levels and no tuning file.
    pub fn new() -> Self {
        EngineOptions {
            log_level: LogLevel::Warning,
            tuning_level: TuningLevel::Rapid,
            tuning_file: None,
        }
    }

    /// Set the backend log severity.
    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Set the tuning effort.
    pub fn with_tuning_level(mut self, level: TuningLevel) -> Self {
        self.tuning_level = level;
        self
    }

    /// Set the tuning data file.
    pub fn with_tuning_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.tuning_file = Some(path.into());
        self
    }

    /// Check the init preconditions without touching the backend.
    pub fn validate(&self) -> Result<()> {
        if let Some(file) = &self.tuning_file {
            if !file.exists() {
                return Err(EngineError::Config(
                    "tuning_file must point to an existing (possibly empty) file".to_string(),
                ));
            }
        }
        if self.tuning_level == TuningLevel::ReadOnly && self.tuning_file.is_none() {
            return Err(EngineError::Config(
                "tuning_level 0 reads existing tuning information and requires a tuning_file"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Options for loading one network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    /// Name of the graph's input tensor.
    pub input_name: String,

    /// Name of the graph's output tensor.
    pub output_name: String,

    /// Allow the backend to trade accuracy for speed.
    pub fast_math: bool,

    /// Write the optimized network to `cache_path` after load.
    pub save_cache: bool,

    /// Optimized-network cache file, read at load when non-empty.
    pub cache_path: Option<PathBuf>,
}

impl LoadOptions {
    /// Options with the conventional tensor names and fast math enabled.
    pub fn new() -> Self {
        LoadOptions {
            input_name: "input_tensor".to_string(),
            output_name: "output_tensor".to_string(),
            fast_math: true,
            save_cache: false,
            cache_path: None,
        }
    }

    /// Set the input tensor name.
    pub fn with_input_name(mut self, name: impl Into<String>) -> Self {
        self.input_name = name.into();
        self
    }

    /// Set the output tensor name.
    pub fn with_output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = name.into();
        self
    }

    /// Enable or disable fast math.
    pub fn with_fast_math(mut self, fast_math: bool) -> Self {
        self.fast_math = fast_math;
        self
    }

    /// Request the optimized network to be saved to the cache file.
    pub fn with_save_cache(mut self, save_cache: bool) -> Self {
        self.save_cache = save_cache;
        self
    }

    /// Set the optimized-network cache file.
    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    /// Check the load preconditions without touching the backend.
    ///
    /// Argument-only checks run before any filesystem access, so a missing
    /// `cache_path` is caught even when `model_path` does not exist.
    pub fn validate(&self, model_path: &Path) -> Result<()> {
        if self.save_cache && self.cache_path.is_none() {
            return Err(EngineError::Config(
                "save_cache is set, cache_path must be specified".to_string(),
            ));
        }
        if ModelFormat::from_path(model_path).is_none() || !model_path.exists() {
            return Err(EngineError::Config(
                "model_path must be a file with extension .armnn, .tflite or .onnx".to_string(),
            ));
        }
        if let Some(cache) = &self.cache_path {
            if !cache.exists() {
                return Err(EngineError::Config(
                    "cache_path must point to an existing (possibly empty) file".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Top-level configuration file for annlink tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnlinkConfig {
    /// Engine creation options.
    pub engine: EngineOptions,

    /// Network load options.
    pub load: LoadOptions,
}

impl Default for AnnlinkConfig {
    fn default() -> Self {
        AnnlinkConfig {
            engine: EngineOptions::default(),
            load: LoadOptions::default(),
        }
    }
}

impl AnnlinkConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> std::result::Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> std::result::Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        std::fs::write(path, content)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_engine_defaults() {
        let options = EngineOptions::default();
        assert_eq!(options.log_level, LogLevel::Warning);
        assert_eq!(options.tuning_level, TuningLevel::Rapid);
        assert_eq!(options.tuning_file, None);
    }

    #[test]
    fn test_load_defaults() {
        let options = LoadOptions::default();
        assert_eq!(options.input_name, "input_tensor");
        assert_eq!(options.output_name, "output_tensor");
        assert!(options.fast_math);
        assert!(!options.save_cache);
        assert_eq!(options.cache_path, None);
    }

    #[test]
    fn test_level_ranges() {
        assert_eq!(LogLevel::try_from(0).unwrap(), LogLevel::Trace);
        assert_eq!(LogLevel::try_from(5).unwrap(), LogLevel::Fatal);
        assert!(LogLevel::try_from(6).is_err());

        assert_eq!(TuningLevel::try_from(0).unwrap(), TuningLevel::ReadOnly);
        assert_eq!(TuningLevel::try_from(3).unwrap(), TuningLevel::Exhaustive);
        assert!(TuningLevel::try_from(4).is_err());
    }

    #[test]
    fn test_raw_values() {
        assert_eq!(LogLevel::Warning.raw(), 3);
        assert_eq!(TuningLevel::ReadOnly.raw(), 0);
        assert_eq!(TuningLevel::Exhaustive.raw(), 3);
    }

    #[test]
    fn test_read_only_tuning_requires_file() {
        let options = EngineOptions::default().with_tuning_level(TuningLevel::ReadOnly);
        let err = options.validate().unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_tuning_file_must_exist() {
        let options = EngineOptions::default().with_tuning_file("/nonexistent/gpu.tuning");
        assert!(matches!(
            options.validate(),
            Err(EngineError::Config(_))
        ));

        let file = tempfile::NamedTempFile::new().unwrap();
        let options = EngineOptions::default()
            .with_tuning_level(TuningLevel::ReadOnly)
            .with_tuning_file(file.path());
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_save_cache_checked_before_filesystem() {
        // The model path does not exist; the missing cache_path must still
        // be the error that is reported.
        let options = LoadOptions::default().with_save_cache(true);
        let err = options.validate(Path::new("/nonexistent/model.armnn")).unwrap_err();
        match err {
            EngineError::Config(msg) => assert!(msg.contains("cache_path")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_model_path_validation() {
        let err = LoadOptions::default()
            .validate(Path::new("/nonexistent/model.pb"))
            .unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));

        let err = LoadOptions::default()
            .validate(Path::new("/nonexistent/model.onnx"))
            .unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));

        let model = tempfile::Builder::new().suffix(".onnx").tempfile().unwrap();
        assert!(LoadOptions::default().validate(model.path()).is_ok());
    }

    #[test]
    fn test_cache_path_must_exist() {
        let model = tempfile::Builder::new().suffix(".armnn").tempfile().unwrap();
        let options = LoadOptions::default().with_cache_path("/nonexistent/cached.network");
        assert!(matches!(
            options.validate(model.path()),
            Err(EngineError::Config(_))
        ));

        let cache = tempfile::NamedTempFile::new().unwrap();
        let options = LoadOptions::default()
            .with_save_cache(true)
            .with_cache_path(cache.path());
        assert!(options.validate(model.path()).is_ok());
    }

    #[test]
    fn test_model_format_from_path() {
        assert_eq!(
            ModelFormat::from_path(Path::new("m.armnn")),
            Some(ModelFormat::ArmNn)
        );
        assert_eq!(
            ModelFormat::from_path(Path::new("dir/m.tflite")),
            Some(ModelFormat::TfLite)
        );
        assert_eq!(
            ModelFormat::from_path(Path::new("m.onnx")),
            Some(ModelFormat::Onnx)
        );
        assert_eq!(ModelFormat::from_path(Path::new("m.pb")), None);
        assert_eq!(ModelFormat::from_path(Path::new("armnn")), None);
        assert_eq!(ModelFormat::ArmNn.to_string(), "armnn");
    }

    #[test]
    fn test_levels_serialize_as_numbers() {
        let options: EngineOptions =
            serde_json::from_str(r#"{"log_level": 0, "tuning_level": 3}"#).unwrap();
        assert_eq!(options.log_level, LogLevel::Trace);
        assert_eq!(options.tuning_level, TuningLevel::Exhaustive);

        let json = serde_json::to_value(&EngineOptions::default()).unwrap();
        assert_eq!(json["log_level"], 3);
        assert_eq!(json["tuning_level"], 1);
    }

    #[test]
    fn test_config_file_round_trip() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = AnnlinkConfig {
            engine: EngineOptions::default().with_log_level(LogLevel::Debug),
            load: LoadOptions::default().with_fast_math(false),
        };
        config.save(file.path()).unwrap();

        let loaded = AnnlinkConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded, config);
    }
}

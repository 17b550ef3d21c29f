use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::classify::{Classifier, ViolationRule, DEFAULT_VIOLATION_PREFIX};
use crate::pipeline::{PipelineSettings, DEFAULT_CONFIDENCE_THRESHOLD};

const DEFAULT_SOURCE: &str = "stub://camera";
const DEFAULT_DETECT_URL: &str = "http://localhost:8000/detect/";
const DEFAULT_DETECT_TIMEOUT_MS: u64 = 2000;
const DEFAULT_TARGET_FPS: u32 = 30;
const DEFAULT_MAX_IN_FLIGHT: usize = 8;

#[derive(Debug, Deserialize, Default)]
struct ViewerConfigFile {
    source: Option<String>,
    confidence_threshold: Option<f32>,
    detector: Option<DetectorConfigFile>,
    violation: Option<ViolationConfigFile>,
    pipeline: Option<PipelineConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    url: Option<String>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct ViolationConfigFile {
    prefix: Option<String>,
    pattern: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    target_fps: Option<u32>,
    max_in_flight: Option<usize>,
}

/// Which detector implementation answers detection rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorKind {
    /// Remote detection service over HTTP.
    Http,
    /// In-process deterministic mock.
    Synthetic,
}

impl DetectorKind {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "synthetic" | "mock" => Ok(Self::Synthetic),
            other => Err(anyhow!(
                "unknown detector backend '{}' (expected http or synthetic)",
                other
            )),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Synthetic => "synthetic",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub kind: DetectorKind,
    pub url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ViolationSettings {
    pub prefix: String,
    /// Regex; takes precedence over `prefix` when set.
    pub pattern: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ViewerConfig {
    pub source: String,
    pub detector: DetectorSettings,
    pub confidence_threshold: f32,
    pub violation: ViolationSettings,
    pub target_fps: u32,
    pub max_in_flight: usize,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            source: DEFAULT_SOURCE.to_string(),
            detector: DetectorSettings {
                kind: DetectorKind::Http,
                url: DEFAULT_DETECT_URL.to_string(),
                timeout: Duration::from_millis(DEFAULT_DETECT_TIMEOUT_MS),
            },
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            violation: ViolationSettings {
                prefix: DEFAULT_VIOLATION_PREFIX.to_string(),
                pattern: None,
            },
            target_fps: DEFAULT_TARGET_FPS,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

impl ViewerConfig {
    /// File named by `PPE_CONFIG` (if any), then `PPE_*` env overrides, then
    /// validation.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("PPE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ViewerConfigFile) -> Result<Self> {
        let detector = file.detector.unwrap_or_default();
        let violation = file.violation.unwrap_or_default();
        let pipeline = file.pipeline.unwrap_or_default();
        let kind = match detector.backend.as_deref() {
            Some(kind) => DetectorKind::parse(kind)?,
            None => DetectorKind::Http,
        };
        Ok(Self {
            source: file.source.unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
            detector: DetectorSettings {
                kind,
                url: detector
                    .url
                    .unwrap_or_else(|| DEFAULT_DETECT_URL.to_string()),
                timeout: Duration::from_millis(
                    detector.timeout_ms.unwrap_or(DEFAULT_DETECT_TIMEOUT_MS),
                ),
            },
            confidence_threshold: file
                .confidence_threshold
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
            violation: ViolationSettings {
                prefix: violation
                    .prefix
                    .unwrap_or_else(|| DEFAULT_VIOLATION_PREFIX.to_string()),
                pattern: violation.pattern,
            },
            target_fps: pipeline.target_fps.unwrap_or(DEFAULT_TARGET_FPS),
            max_in_flight: pipeline.max_in_flight.unwrap_or(DEFAULT_MAX_IN_FLIGHT),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(source) = std::env::var("PPE_SOURCE") {
            if !source.trim().is_empty() {
                self.source = source;
            }
        }
        if let Ok(kind) = std::env::var("PPE_DETECTOR") {
            if !kind.trim().is_empty() {
                self.detector.kind = DetectorKind::parse(&kind)
                    .map_err(|e| anyhow!("PPE_DETECTOR: {}", e))?;
            }
        }
        if let Ok(url) = std::env::var("PPE_DETECT_URL") {
            if !url.trim().is_empty() {
                self.detector.url = url;
            }
        }
        if let Ok(timeout) = std::env::var("PPE_DETECT_TIMEOUT_MS") {
            let millis: u64 = timeout.trim().parse().map_err(|_| {
                anyhow!("PPE_DETECT_TIMEOUT_MS must be an integer number of milliseconds")
            })?;
            self.detector.timeout = Duration::from_millis(millis);
        }
        if let Ok(threshold) = std::env::var("PPE_CONFIDENCE_THRESHOLD") {
            self.confidence_threshold = threshold
                .trim()
                .parse()
                .map_err(|_| anyhow!("PPE_CONFIDENCE_THRESHOLD must be a number"))?;
        }
        if let Ok(prefix) = std::env::var("PPE_VIOLATION_PREFIX") {
            if !prefix.is_empty() {
                self.violation.prefix = prefix;
            }
        }
        if let Ok(pattern) = std::env::var("PPE_VIOLATION_PATTERN") {
            if !pattern.trim().is_empty() {
                self.violation.pattern = Some(pattern);
            }
        }
        if let Ok(fps) = std::env::var("PPE_TARGET_FPS") {
            self.target_fps = fps
                .trim()
                .parse()
                .map_err(|_| anyhow!("PPE_TARGET_FPS must be a positive integer"))?;
        }
        if let Ok(max) = std::env::var("PPE_MAX_IN_FLIGHT") {
            self.max_in_flight = max
                .trim()
                .parse()
                .map_err(|_| anyhow!("PPE_MAX_IN_FLIGHT must be a positive integer"))?;
        }
        Ok(())
    }

    /// Check ranges and formats. Also run after CLI overrides are applied.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(anyhow!(
                "confidence threshold must be within [0, 1], got {}",
                self.confidence_threshold
            ));
        }
        if self.detector.timeout.is_zero() {
            return Err(anyhow!("detector timeout must be greater than zero"));
        }
        if self.target_fps == 0 {
            return Err(anyhow!("target fps must be greater than zero"));
        }
        if self.max_in_flight == 0 {
            return Err(anyhow!("max in-flight rounds must be greater than zero"));
        }
        if self.source.trim().is_empty() {
            return Err(anyhow!("source must not be empty"));
        }
        validate_detect_url(&self.detector.url)?;
        if self.violation.pattern.is_none() && self.violation.prefix.is_empty() {
            return Err(anyhow!("violation prefix must not be empty"));
        }
        self.violation_rule()?;
        Ok(())
    }

    pub fn violation_rule(&self) -> Result<ViolationRule> {
        match &self.violation.pattern {
            Some(pattern) => ViolationRule::pattern(pattern),
            None => Ok(ViolationRule::prefix(self.violation.prefix.clone())),
        }
    }

    pub fn classifier(&self) -> Result<Classifier> {
        Ok(Classifier::new(self.violation_rule()?))
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            confidence_threshold: self.confidence_threshold,
            max_in_flight: self.max_in_flight,
            ..PipelineSettings::default()
        }
    }
}

fn validate_detect_url(raw: &str) -> Result<()> {
    #[cfg(feature = "detect-http")]
    {
        let parsed =
            url::Url::parse(raw).map_err(|e| anyhow!("invalid detector url '{}': {}", raw, e))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(anyhow!(
                "detector url must use http or https, got '{}'",
                parsed.scheme()
            ));
        }
    }
    #[cfg(not(feature = "detect-http"))]
    {
        if !(raw.starts_with("http://") || raw.starts_with("https://")) {
            return Err(anyhow!("detector url must use http or https, got '{}'", raw));
        }
    }
    Ok(())
}

fn read_config_file(path: &Path) -> Result<ViewerConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

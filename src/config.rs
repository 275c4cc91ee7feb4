use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::DEFAULT_INPUT_SIZE;
use crate::frame::GeoCoordinate;
use crate::ingest::SourceConfig;
use crate::notify::{SmtpSettings, DEFAULT_RECONNECT_ATTEMPTS, DEFAULT_SMTP_HOST, DEFAULT_SMTP_PORT};

pub const CONFIG_ENV: &str = "FIREWATCH_CONFIG";

const DEFAULT_SOURCE_FPS: u32 = 10;
const DEFAULT_SOURCE_WIDTH: u32 = 640;
const DEFAULT_SOURCE_HEIGHT: u32 = 480;
const DEFAULT_TICK_INTERVAL_MS: u64 = 100;
const DEFAULT_PREVIEW_INTERVAL_MS: u64 = 200;
/// Stub score when no model is configured: above the fire ceiling, so never fire.
const DEFAULT_STUB_SCORE: f32 = 1.0;

#[derive(Debug, Deserialize, Default)]
struct WatchConfigFile {
    source: Option<SourceConfigFile>,
    location: Option<LocationConfigFile>,
    detector: Option<DetectorConfigFile>,
    mail: Option<MailConfigFile>,
    snapshot_dir: Option<PathBuf>,
    preview_path: Option<PathBuf>,
    preview_interval_ms: Option<u64>,
    tick_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    uri: Option<String>,
    device_index: Option<u32>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct LocationConfigFile {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    model_path: Option<PathBuf>,
    input_size: Option<u32>,
    color_prefilter: Option<bool>,
    channels_last: Option<bool>,
    stub_score: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct MailConfigFile {
    host: Option<String>,
    port: Option<u16>,
    recipients: Option<Vec<String>>,
    reconnect_attempts: Option<u32>,
}

/// Resolved daemon configuration.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub source: SourceConfig,
    pub location: GeoCoordinate,
    pub detector: DetectorSettings,
    pub mail: MailSettings,
    pub snapshot_dir: Option<PathBuf>,
    pub preview_path: Option<PathBuf>,
    pub preview_interval: Duration,
    pub tick_interval: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSettings {
    /// ONNX classifier. Without one the stub backend scores every frame `stub_score`.
    pub model_path: Option<PathBuf>,
    pub input_size: u32,
    pub color_prefilter: bool,
    pub channels_last: bool,
    pub stub_score: f32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailSettings {
    pub smtp: SmtpSettings,
    pub recipients: Vec<String>,
    pub reconnect_attempts: u32,
}

impl WatchConfig {
    /// Load from the file named by `FIREWATCH_CONFIG` (if any), then apply env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var(CONFIG_ENV).ok().map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut partial = PartialConfig::from_file(file_cfg.unwrap_or_default());
        partial.apply_env()?;
        partial.finish()
    }
}

/// Everything but the location, which has no default and is checked last.
struct PartialConfig {
    source: SourceConfig,
    latitude: Option<f64>,
    longitude: Option<f64>,
    detector: DetectorSettings,
    mail: MailSettings,
    snapshot_dir: Option<PathBuf>,
    preview_path: Option<PathBuf>,
    preview_interval: Duration,
    tick_interval: Duration,
}

impl PartialConfig {
    fn from_file(file: WatchConfigFile) -> Self {
        let source_file = file.source.unwrap_or_default();
        let source = SourceConfig {
            uri: source_file.uri,
            device_index: source_file.device_index.unwrap_or(0),
            target_fps: source_file.target_fps.unwrap_or(DEFAULT_SOURCE_FPS),
            width: source_file.width.unwrap_or(DEFAULT_SOURCE_WIDTH),
            height: source_file.height.unwrap_or(DEFAULT_SOURCE_HEIGHT),
        };
        let location = file.location.unwrap_or_default();
        let detector_file = file.detector.unwrap_or_default();
        let detector = DetectorSettings {
            model_path: detector_file.model_path,
            input_size: detector_file.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
            color_prefilter: detector_file.color_prefilter.unwrap_or(true),
            channels_last: detector_file.channels_last.unwrap_or(true),
            stub_score: detector_file.stub_score.unwrap_or(DEFAULT_STUB_SCORE),
        };
        let mail_file = file.mail.unwrap_or_default();
        let mail = MailSettings {
            smtp: SmtpSettings {
                host: mail_file
                    .host
                    .unwrap_or_else(|| DEFAULT_SMTP_HOST.to_string()),
                port: mail_file.port.unwrap_or(DEFAULT_SMTP_PORT),
            },
            recipients: mail_file.recipients.unwrap_or_default(),
            reconnect_attempts: mail_file
                .reconnect_attempts
                .unwrap_or(DEFAULT_RECONNECT_ATTEMPTS),
        };
        Self {
            source,
            latitude: location.latitude,
            longitude: location.longitude,
            detector,
            mail,
            snapshot_dir: file.snapshot_dir,
            preview_path: file.preview_path,
            preview_interval: Duration::from_millis(
                file.preview_interval_ms
                    .unwrap_or(DEFAULT_PREVIEW_INTERVAL_MS),
            ),
            tick_interval: Duration::from_millis(
                file.tick_interval_ms.unwrap_or(DEFAULT_TICK_INTERVAL_MS),
            ),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(uri) = env_value("FIREWATCH_SOURCE") {
            self.source.uri = Some(uri);
        }
        if let Some(index) = env_value("FIREWATCH_DEVICE_INDEX") {
            self.source.device_index = index
                .parse()
                .map_err(|_| anyhow!("FIREWATCH_DEVICE_INDEX must be a non-negative integer"))?;
            // An explicit index selects a device node over any configured URI.
            self.source.uri = None;
        }
        if let Some(lat) = env_value("FIREWATCH_LATITUDE") {
            self.latitude = Some(
                lat.parse()
                    .map_err(|_| anyhow!("FIREWATCH_LATITUDE must be a decimal number"))?,
            );
        }
        if let Some(lon) = env_value("FIREWATCH_LONGITUDE") {
            self.longitude = Some(
                lon.parse()
                    .map_err(|_| anyhow!("FIREWATCH_LONGITUDE must be a decimal number"))?,
            );
        }
        if let Some(path) = env_value("FIREWATCH_MODEL_PATH") {
            self.detector.model_path = Some(PathBuf::from(path));
        }
        if let Some(recipients) = env_value("FIREWATCH_RECIPIENTS") {
            let parsed = split_csv(&recipients);
            if !parsed.is_empty() {
                self.mail.recipients = parsed;
            }
        }
        if let Some(dir) = env_value("FIREWATCH_SNAPSHOT_DIR") {
            self.snapshot_dir = Some(PathBuf::from(dir));
        }
        if let Some(path) = env_value("FIREWATCH_PREVIEW_PATH") {
            self.preview_path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    fn finish(self) -> Result<WatchConfig> {
        let (Some(latitude), Some(longitude)) = (self.latitude, self.longitude) else {
            return Err(anyhow!(
                "camera location is required: set location.latitude/longitude or FIREWATCH_LATITUDE/FIREWATCH_LONGITUDE"
            ));
        };
        let cfg = WatchConfig {
            source: self.source,
            location: GeoCoordinate::new(latitude, longitude)?,
            detector: self.detector,
            mail: self.mail,
            snapshot_dir: self.snapshot_dir,
            preview_path: self.preview_path,
            preview_interval: self.preview_interval,
            tick_interval: self.tick_interval,
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

impl WatchConfig {
    fn validate(&self) -> Result<()> {
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("source width and height must be greater than zero"));
        }
        if self.detector.input_size < 16 {
            return Err(anyhow!("detector.input_size must be at least 16"));
        }
        if !self.detector.stub_score.is_finite() {
            return Err(anyhow!("detector.stub_score must be a finite number"));
        }
        if self.mail.smtp.host.trim().is_empty() {
            return Err(anyhow!("mail.host must not be empty"));
        }
        if self.mail.smtp.port == 0 {
            return Err(anyhow!("mail.port must be greater than zero"));
        }
        if self.tick_interval.is_zero() {
            return Err(anyhow!("tick_interval_ms must be greater than zero"));
        }
        if self.preview_interval.is_zero() {
            return Err(anyhow!("preview_interval_ms must be greater than zero"));
        }
        Ok(())
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// JSON by default; TOML when the file ends in `.toml`.
fn read_config_file(path: &Path) -> Result<WatchConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

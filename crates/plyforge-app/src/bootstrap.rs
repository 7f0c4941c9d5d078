//! Application bootstrap: environment configuration and service wiring.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use plyforge_api::ApiServer;
use plyforge_events::ProgressHub;
use plyforge_pipeline::{ConverterConfig, ExtractorConfig, FrameConverter, FrameExtractor};
use plyforge_telemetry::{LogFormat, LoggingConfig, Metrics};
use plyforge_tools::{ProcessRunner, ToolRunner};
use plyforge_workspace::WorkspaceManager;
use tracing::info;

use crate::error::{AppError, AppResult};

const DEFAULT_HTTP_PORT: u16 = 8000;
const DEFAULT_DATA_DIR: &str = "data/batches";

/// Environment-derived application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Address the API listener binds.
    pub bind_addr: IpAddr,
    /// Port the API listener binds.
    pub http_port: u16,
    /// Root directory for batch workspaces (wiped at startup).
    pub data_dir: PathBuf,
    /// Optional directory served as the SPA frontend.
    pub static_dir: Option<PathBuf>,
    /// Frame extraction tool configuration.
    pub extractor: ExtractorConfig,
    /// Reconstruction tool configuration.
    pub converter: ConverterConfig,
    /// Logging output format.
    pub log_format: LogFormat,
}

impl AppConfig {
    /// Load the configuration from `PLYFORGE_*` environment variables,
    /// applying defaults for everything that is unset.
    ///
    /// # Errors
    ///
    /// Returns an error when a set variable fails to parse.
    pub fn from_env() -> AppResult<Self> {
        Self::from_values(&EnvValues::capture())
    }

    fn from_values(values: &EnvValues) -> AppResult<Self> {
        let bind_addr = match values.bind_addr.as_deref() {
            Some(raw) => raw.parse().map_err(|_| AppError::InvalidConfig {
                field: "bind_addr",
                reason: "unparseable",
                value: Some(raw.to_string()),
            })?,
            None => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        };

        let http_port = match values.http_port.as_deref() {
            Some(raw) => {
                let port: u16 = raw.parse().map_err(|_| AppError::InvalidConfig {
                    field: "http_port",
                    reason: "unparseable",
                    value: Some(raw.to_string()),
                })?;
                if port == 0 {
                    return Err(AppError::InvalidConfig {
                        field: "http_port",
                        reason: "zero",
                        value: Some(raw.to_string()),
                    });
                }
                port
            }
            None => DEFAULT_HTTP_PORT,
        };

        let fps = match values.fps.as_deref() {
            Some(raw) => {
                let fps: u32 = raw.parse().map_err(|_| AppError::InvalidConfig {
                    field: "fps",
                    reason: "unparseable",
                    value: Some(raw.to_string()),
                })?;
                if fps == 0 {
                    return Err(AppError::InvalidConfig {
                        field: "fps",
                        reason: "zero",
                        value: Some(raw.to_string()),
                    });
                }
                fps
            }
            None => ExtractorConfig::default().fps,
        };

        let extractor_defaults = ExtractorConfig::default();
        let extractor = ExtractorConfig {
            ffmpeg: values
                .ffmpeg_bin
                .clone()
                .unwrap_or(extractor_defaults.ffmpeg),
            fps,
        };

        let converter_defaults = ConverterConfig::default();
        let converter = ConverterConfig {
            tool: values.recon_bin.clone().unwrap_or(converter_defaults.tool),
            device: values.device.clone().unwrap_or(converter_defaults.device),
        };

        Ok(Self {
            bind_addr,
            http_port,
            data_dir: values
                .data_dir
                .as_deref()
                .map_or_else(|| PathBuf::from(DEFAULT_DATA_DIR), PathBuf::from),
            static_dir: values.static_dir.as_deref().map(PathBuf::from),
            extractor,
            converter,
            log_format: LogFormat::from_config(values.log_format.as_deref()),
        })
    }
}

/// Raw environment values, separated from parsing so tests can inject them.
#[derive(Debug, Default)]
struct EnvValues {
    bind_addr: Option<String>,
    http_port: Option<String>,
    data_dir: Option<String>,
    static_dir: Option<String>,
    ffmpeg_bin: Option<String>,
    recon_bin: Option<String>,
    device: Option<String>,
    fps: Option<String>,
    log_format: Option<String>,
}

impl EnvValues {
    fn capture() -> Self {
        Self {
            bind_addr: env_var("PLYFORGE_BIND_ADDR"),
            http_port: env_var("PLYFORGE_HTTP_PORT"),
            data_dir: env_var("PLYFORGE_DATA_DIR"),
            static_dir: env_var("PLYFORGE_STATIC_DIR"),
            ffmpeg_bin: env_var("PLYFORGE_FFMPEG_BIN"),
            recon_bin: env_var("PLYFORGE_RECON_BIN"),
            device: env_var("PLYFORGE_DEVICE"),
            fps: env_var("PLYFORGE_FPS"),
            log_format: env_var("PLYFORGE_LOG_FORMAT"),
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

/// Entry point for the Plyforge application boot sequence.
///
/// # Errors
///
/// Returns an error if configuration, telemetry, workspace initialisation,
/// or the API listener fails.
pub async fn run_app() -> AppResult<()> {
    let config = AppConfig::from_env()?;
    run_app_with(config).await
}

/// Boot sequence that relies entirely on an injected configuration to
/// simplify testing.
pub(crate) async fn run_app_with(config: AppConfig) -> AppResult<()> {
    let logging = LoggingConfig {
        format: config.log_format,
        ..LoggingConfig::default()
    };
    plyforge_telemetry::init_logging(&logging)
        .map_err(|source| AppError::telemetry("telemetry.init", source))?;

    info!("Plyforge application bootstrap starting");

    let telemetry = Metrics::new().map_err(|source| AppError::telemetry("telemetry.metrics", source))?;
    let hub = ProgressHub::new();

    let workspaces = WorkspaceManager::init(&config.data_dir)
        .map_err(|source| AppError::workspace("workspace.init", source))?;
    info!(root = %workspaces.root().display(), "batch workspace root ready");

    let runner: Arc<dyn ToolRunner> = Arc::new(ProcessRunner::new());
    let extractor = FrameExtractor::new(Arc::clone(&runner), config.extractor.clone());
    let converter = FrameConverter::new(
        runner,
        hub.clone(),
        telemetry.clone(),
        config.converter.clone(),
    );

    let api = ApiServer::new(
        workspaces,
        hub,
        extractor,
        converter,
        telemetry,
        config.static_dir.clone(),
    );

    let addr = SocketAddr::new(config.bind_addr, config.http_port);
    info!(addr = %addr, "launching API listener");
    api.serve(addr)
        .await
        .map_err(|source| AppError::api_server("api_server.serve", source))?;

    info!("API server shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_nothing_is_set() -> AppResult<()> {
        let config = AppConfig::from_values(&EnvValues::default())?;
        assert_eq!(config.bind_addr, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(config.http_port, DEFAULT_HTTP_PORT);
        assert_eq!(config.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
        assert!(config.static_dir.is_none());
        assert_eq!(config.extractor.ffmpeg, "ffmpeg");
        assert_eq!(config.extractor.fps, 12);
        assert_eq!(config.converter.tool, "sharp");
        assert_eq!(config.converter.device, "cpu");
        Ok(())
    }

    #[test]
    fn explicit_values_override_defaults() -> AppResult<()> {
        let values = EnvValues {
            bind_addr: Some("127.0.0.1".to_string()),
            http_port: Some("9100".to_string()),
            data_dir: Some("/tmp/plyforge".to_string()),
            static_dir: Some("web/dist".to_string()),
            ffmpeg_bin: Some("/opt/ffmpeg/bin/ffmpeg".to_string()),
            recon_bin: Some("sharp-nightly".to_string()),
            device: Some("cuda".to_string()),
            fps: Some("24".to_string()),
            log_format: Some("json".to_string()),
        };
        let config = AppConfig::from_values(&values)?;
        assert_eq!(config.bind_addr, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.http_port, 9100);
        assert_eq!(config.static_dir.as_deref(), Some(std::path::Path::new("web/dist")));
        assert_eq!(config.extractor.ffmpeg, "/opt/ffmpeg/bin/ffmpeg");
        assert_eq!(config.extractor.fps, 24);
        assert_eq!(config.converter.tool, "sharp-nightly");
        assert_eq!(config.converter.device, "cuda");
        assert!(matches!(config.log_format, LogFormat::Json));
        Ok(())
    }

    #[test]
    fn invalid_values_are_rejected_with_context() {
        let values = EnvValues {
            http_port: Some("0".to_string()),
            ..EnvValues::default()
        };
        assert!(matches!(
            AppConfig::from_values(&values),
            Err(AppError::InvalidConfig {
                field: "http_port",
                reason: "zero",
                ..
            })
        ));

        let values = EnvValues {
            bind_addr: Some("not-an-address".to_string()),
            ..EnvValues::default()
        };
        assert!(matches!(
            AppConfig::from_values(&values),
            Err(AppError::InvalidConfig {
                field: "bind_addr",
                ..
            })
        ));

        let values = EnvValues {
            fps: Some("sixty".to_string()),
            ..EnvValues::default()
        };
        assert!(matches!(
            AppConfig::from_values(&values),
            Err(AppError::InvalidConfig { field: "fps", .. })
        ));
    }
}

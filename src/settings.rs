use crate::logging::{LogConfig, LogLevel};
use crate::speedtest::base_path::{
    endpoint_url, resolve_base_path, BasePathResolver, EnvBasePath, ProxyPrefixDetector,
    StaticBasePath,
};
use crate::speedtest::samples::DEFAULT_THROTTLE_WINDOW;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable a reverse proxy add-on sets to the app's mount point.
pub const INGRESS_ENV: &str = "INGRESS_PATH";
pub const INGRESS_MARKER: &str = "hassio_ingress";

#[derive(Debug, Clone, Parser)]
#[command(name = "ericspeed-live", version, about = "Watch a running speed test live")]
pub struct Cli {
    /// Origin of the speed test server.
    #[arg(long, env = "ERICSPEED_SERVER", default_value = "http://127.0.0.1:8080")]
    pub server: String,

    /// Path prefix the server is mounted under.
    #[arg(long, env = "ERICSPEED_BASE_PATH")]
    pub base_path: Option<String>,

    /// Page path the client was opened at; used to detect a proxy prefix.
    #[arg(long)]
    pub location: Option<String>,

    /// Progress stream path, relative to the base path.
    #[arg(long, default_value = "api/speedtest/stream")]
    pub stream_path: String,

    #[arg(long, value_enum, default_value_t = LogLevel::Warn)]
    pub log_level: LogLevel,

    /// Write logs here; the terminal UI otherwise keeps logging off.
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Print progress lines instead of drawing the terminal UI.
    #[arg(long)]
    pub plain: bool,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub server: String,
    pub base_path: Option<String>,
    pub location: Option<String>,
    pub stream_path: String,
    pub throttle_window: Duration,
    pub connect_timeout: Duration,
    pub log: LogConfig,
    pub plain: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: "http://127.0.0.1:8080".to_string(),
            base_path: None,
            location: None,
            stream_path: "api/speedtest/stream".to_string(),
            throttle_window: DEFAULT_THROTTLE_WINDOW,
            connect_timeout: Duration::from_secs(10),
            log: LogConfig::default(),
            plain: false,
        }
    }
}

impl From<Cli> for Settings {
    fn from(cli: Cli) -> Self {
        Self {
            server: cli.server,
            base_path: cli.base_path,
            location: cli.location,
            stream_path: cli.stream_path,
            log: LogConfig {
                level: cli.log_level,
                file: cli.log_file,
            },
            plain: cli.plain,
            ..Self::default()
        }
    }
}

impl Settings {
    pub fn resolvers(&self) -> Vec<Box<dyn BasePathResolver>> {
        let mut resolvers: Vec<Box<dyn BasePathResolver>> = Vec::new();
        if let Some(path) = &self.base_path {
            resolvers.push(Box::new(StaticBasePath(path.clone())));
        }
        resolvers.push(Box::new(EnvBasePath::new(INGRESS_ENV)));
        if let Some(location) = &self.location {
            resolvers.push(Box::new(ProxyPrefixDetector::new(
                location.clone(),
                INGRESS_MARKER,
            )));
        }
        resolvers
    }

    pub fn base_path(&self) -> String {
        resolve_base_path(&self.resolvers())
    }

    pub fn stream_url(&self) -> String {
        endpoint_url(&self.server, &self.base_path(), &self.stream_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_base_path_wins() {
        let settings = Settings {
            server: "https://speed.example".into(),
            base_path: Some("/proxy/".into()),
            location: Some("/api/hassio_ingress/tok/".into()),
            ..Settings::default()
        };
        assert_eq!(
            settings.stream_url(),
            "https://speed.example/proxy/api/speedtest/stream"
        );
    }

    #[test]
    fn location_prefix_is_detected() {
        let settings = Settings {
            location: Some("/api/hassio_ingress/tok/history".into()),
            ..Settings::default()
        };
        if std::env::var(INGRESS_ENV).is_err() {
            assert_eq!(
                settings.stream_url(),
                "http://127.0.0.1:8080/api/hassio_ingress/tok/api/speedtest/stream"
            );
        }
    }

    #[test]
    fn cli_maps_into_settings() {
        let cli = Cli::parse_from([
            "ericspeed-live",
            "--server",
            "http://10.0.0.2:9000",
            "--stream-path",
            "/events",
            "--log-level",
            "debug",
            "--plain",
        ]);
        let settings = Settings::from(cli);
        assert_eq!(settings.server, "http://10.0.0.2:9000");
        assert_eq!(settings.stream_path, "/events");
        assert_eq!(settings.log.level, LogLevel::Debug);
        assert!(settings.plain);
        assert_eq!(settings.throttle_window, Duration::from_millis(250));
    }
}

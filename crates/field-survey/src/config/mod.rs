use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::surveys::access::{Principal, PrincipalRole};

const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub media: MediaConfig,
    pub auth: AuthConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let media_root = env::var("MEDIA_ROOT").unwrap_or_else(|_| "./uploads".to_string());
        let public_url = env::var("MEDIA_PUBLIC_URL").unwrap_or_else(|_| "/media".to_string());
        let max_upload_bytes = match env::var("MEDIA_MAX_UPLOAD_BYTES") {
            Ok(raw) => raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|bytes| *bytes > 0)
                .ok_or(ConfigError::InvalidUploadLimit)?,
            Err(_) => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let sessions = match env::var("APP_SESSION_TOKENS") {
            Ok(raw) => parse_session_tokens(&raw)?,
            Err(_) => Vec::new(),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            media: MediaConfig {
                root: PathBuf::from(media_root),
                public_url: public_url.trim_end_matches('/').to_string(),
                max_upload_bytes,
            },
            auth: AuthConfig { sessions },
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Where uploaded audio recordings land and how they are addressed afterwards.
#[derive(Debug, Clone)]
pub struct MediaConfig {
    pub root: PathBuf,
    pub public_url: String,
    pub max_upload_bytes: usize,
}

/// Static bearer tokens accepted by the bundled session verifier.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub sessions: Vec<SessionToken>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    pub token: String,
    pub principal: Principal,
}

/// Parses `token=ROLE:subject` entries separated by `;`.
fn parse_session_tokens(raw: &str) -> Result<Vec<SessionToken>, ConfigError> {
    raw.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let invalid = || ConfigError::InvalidSessionToken(entry.to_string());
            let (token, grant) = entry.split_once('=').ok_or_else(invalid)?;
            let (role, subject) = grant.split_once(':').ok_or_else(invalid)?;
            let role = PrincipalRole::parse(role.trim()).ok_or_else(invalid)?;
            let (token, subject) = (token.trim(), subject.trim());
            if token.is_empty() || subject.is_empty() {
                return Err(invalid());
            }

            Ok(SessionToken {
                token: token.to_string(),
                principal: Principal {
                    subject: subject.to_string(),
                    role,
                },
            })
        })
        .collect()
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidUploadLimit,
    InvalidSessionToken(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidUploadLimit => {
                write!(f, "MEDIA_MAX_UPLOAD_BYTES must be a positive integer")
            }
            ConfigError::InvalidSessionToken(entry) => write!(
                f,
                "APP_SESSION_TOKENS entry '{entry}' must look like token=ROLE:subject"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidUploadLimit
            | ConfigError::InvalidSessionToken(_) => None,
        }
    }
}

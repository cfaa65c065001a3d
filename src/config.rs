use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use thiserror::Error;
use tracing::info;

pub const DEV_JWT_SECRET: &str = "photo-studio-dev-secret";
const DEFAULT_ORIGINS: &str =
    "http://localhost:3000,http://localhost:3001,http://localhost:3002,http://localhost:3003";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid {key} value '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} must be set in release builds")]
    Missing(&'static str),
}

#[derive(Clone, Debug)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

/// Where the settings came from. Collected while loading, before the
/// subscriber exists, and logged by [`Config::log_sources`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoadNotes {
    pub env_file: bool,
    pub defaulted: Vec<(&'static str, String)>,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_addr: String,
    pub port: u16,
    pub data_dir: String,
    pub upload_dir: PathBuf,
    pub jwt_secret: String,
    pub jwt_ttl_secs: u64,
    pub cors_origins: Vec<String>,
    pub max_upload_bytes: usize,
    pub cloudinary: Option<CloudinaryConfig>,
    pub log_json: bool,
    pub log_dir: Option<PathBuf>,
    pub notes: LoadNotes,
}

/// Reads keys from a lookup function, remembering which ones fell back to
/// their default.
struct Source<F> {
    lookup: F,
    notes: LoadNotes,
}

impl<F: Fn(&str) -> Option<String>> Source<F> {
    fn var(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|value| !value.trim().is_empty())
    }

    fn try_load<T: FromStr>(&mut self, key: &'static str, default: &str) -> Result<T, ConfigError>
    where
        T::Err: Display,
    {
        let value = match self.var(key) {
            Some(value) => value,
            None => {
                self.notes.defaulted.push((key, default.to_string()));
                default.to_string()
            }
        };

        match value.parse() {
            Ok(parsed) => Ok(parsed),
            Err(e) => Err(ConfigError::Invalid {
                key,
                reason: e.to_string(),
                value,
            }),
        }
    }

    fn cloudinary(&self) -> Option<CloudinaryConfig> {
        match (
            self.var("CLOUDINARY_CLOUD_NAME"),
            self.var("CLOUDINARY_API_KEY"),
            self.var("CLOUDINARY_API_SECRET"),
        ) {
            (Some(cloud_name), Some(api_key), Some(api_secret)) => Some(CloudinaryConfig {
                cloud_name,
                api_key,
                api_secret,
            }),
            _ => None,
        }
    }
}

impl Config {
    /// Read `.env` (if any) and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let env_file = dotenvy::dotenv().is_ok();
        Self::from_lookup(|key| env::var(key).ok(), env_file)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>, env_file: bool) -> Result<Self, ConfigError> {
        let mut source = Source {
            lookup,
            notes: LoadNotes {
                env_file,
                defaulted: vec![],
            },
        };

        let jwt_secret = match source.var("JWT_SECRET") {
            Some(secret) => secret,
            None if cfg!(debug_assertions) => DEV_JWT_SECRET.to_string(),
            None => return Err(ConfigError::Missing("JWT_SECRET")),
        };

        let bind_addr = source.try_load("BIND_ADDR", "0.0.0.0")?;
        let port = source.try_load("PORT", "5050")?;
        let data_dir = source.try_load("DATA_DIR", "studio_data")?;
        let upload_dir = PathBuf::from(source.try_load::<String>("UPLOAD_DIR", "uploads")?);
        let jwt_ttl_secs = source.try_load("JWT_TTL_SECS", "3600")?;
        let cors_origins = source
            .try_load::<String>("CORS_ORIGINS", DEFAULT_ORIGINS)?
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();
        let max_upload_bytes = source.try_load("MAX_UPLOAD_BYTES", "5242880")?;
        let log_json = source.try_load("LOG_JSON", "false")?;
        let log_dir = source.var("LOG_DIR").map(PathBuf::from);
        let cloudinary = source.cloudinary();

        Ok(Self {
            bind_addr,
            port,
            data_dir,
            upload_dir,
            jwt_secret,
            jwt_ttl_secs,
            cors_origins,
            max_upload_bytes,
            cloudinary,
            log_json,
            log_dir,
            notes: source.notes,
        })
    }

    /// Settings for tests: temp upload dir, fixed secret, local images.
    pub fn for_tests(upload_dir: PathBuf) -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 0,
            data_dir: String::new(),
            upload_dir,
            jwt_secret: "test-secret".to_string(),
            jwt_ttl_secs: 3600,
            cors_origins: vec![],
            max_upload_bytes: 5 * 1024 * 1024,
            cloudinary: None,
            log_json: false,
            log_dir: None,
            notes: LoadNotes::default(),
        }
    }

    /// Log what `load` found; call once tracing is initialized.
    pub fn log_sources(&self) {
        if self.notes.env_file {
            info!("Loaded .env");
        }
        for (key, default) in &self.notes.defaulted {
            info!("{key} not set, using default: {default}");
        }
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

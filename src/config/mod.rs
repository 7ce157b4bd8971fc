use std::env;
use std::path::PathBuf;

use crate::error::AppError;
use crate::study::DisplayFlags;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub study: StudyConfig,
    pub site: SiteConfig,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Study session configuration
#[derive(Debug, Clone, PartialEq)]
pub struct StudyConfig {
    /// Flags used when the visitor has no study session and no ad-hoc override.
    pub defaults: DisplayFlags,
}

/// Site layout configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SiteConfig {
    /// Name of the editorial related list shown on the homepage.
    pub homepage_list: String,
    /// Comparator used by the stories listing when no `sort` is requested.
    pub default_sort: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/story-site.db".to_string()),
            ),
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let baseline = DisplayFlags::baseline();
        let study = StudyConfig {
            defaults: DisplayFlags {
                show_recommended_content: env_flag(
                    "STUDY_SHOW_RECOMMENDED_CONTENT",
                    baseline.show_recommended_content,
                )?,
                show_survey: env_flag("STUDY_SHOW_SURVEY", baseline.show_survey)?,
                show_top_navigation: env_flag(
                    "STUDY_SHOW_TOP_NAVIGATION",
                    baseline.show_top_navigation,
                )?,
                show_content_on_homepage: env_flag(
                    "STUDY_SHOW_CONTENT_ON_HOMEPAGE",
                    baseline.show_content_on_homepage,
                )?,
            },
        };

        let site = SiteConfig {
            homepage_list: env::var("SITE_HOMEPAGE_LIST").unwrap_or_else(|_| "homepage".to_string()),
            default_sort: env::var("SITE_DEFAULT_SORT").unwrap_or_else(|_| "name".to_string()),
        };

        Ok(Config {
            database,
            logging,
            study,
            site,
        })
    }
}

/// Read a boolean flag, rejecting values that are neither true nor false.
fn env_flag(name: &str, default: bool) -> Result<bool, AppError> {
    match env::var(name) {
        Ok(raw) => parse_flag(&raw).ok_or_else(|| AppError::Config {
            message: format!("{} must be a boolean, got '{}'", name, raw),
        }),
        Err(_) => Ok(default),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/story-site.db"),
            max_connections: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            defaults: DisplayFlags::baseline(),
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            homepage_list: "homepage".to_string(),
            default_sort: "name".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            study: StudyConfig::default(),
            site: SiteConfig::default(),
        }
    }
}

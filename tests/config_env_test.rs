//! Config environment variable tests
//!
//! These tests verify that Config::from_env() correctly reads and applies
//! environment variable overrides.
//!
//! Tests use #[serial] to prevent race conditions with shared env vars.

use serial_test::serial;
use std::env;

use story_site::config::{Config, LogFormat};
use story_site::study::DisplayFlags;
use story_site::AppError;

const STUDY_VARS: [&str; 4] = [
    "STUDY_SHOW_RECOMMENDED_CONTENT",
    "STUDY_SHOW_SURVEY",
    "STUDY_SHOW_TOP_NAVIGATION",
    "STUDY_SHOW_CONTENT_ON_HOMEPAGE",
];

fn clear_study_vars() {
    for var in STUDY_VARS {
        env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_config_from_env_loads_successfully() {
    clear_study_vars();
    let config = Config::from_env().expect("config should load");
    assert_eq!(config.study.defaults, DisplayFlags::baseline());
}

#[test]
#[serial]
fn test_config_from_env_custom_database() {
    env::set_var("DATABASE_PATH", "/custom/story.db");
    env::set_var("DATABASE_MAX_CONNECTIONS", "10");

    let config = Config::from_env().unwrap();
    assert_eq!(config.database.path.to_str().unwrap(), "/custom/story.db");
    assert_eq!(config.database.max_connections, 10);

    env::remove_var("DATABASE_PATH");
    env::remove_var("DATABASE_MAX_CONNECTIONS");
}

#[test]
#[serial]
fn test_config_from_env_json_log_format() {
    env::set_var("LOG_FORMAT", "json");

    let config = Config::from_env().unwrap();
    assert_eq!(config.logging.format, LogFormat::Json);

    env::remove_var("LOG_FORMAT");
}

#[test]
#[serial]
fn test_config_from_env_study_defaults() {
    clear_study_vars();
    env::set_var("STUDY_SHOW_SURVEY", "off");
    env::set_var("STUDY_SHOW_CONTENT_ON_HOMEPAGE", "yes");

    let config = Config::from_env().unwrap();
    assert!(!config.study.defaults.show_survey);
    assert!(config.study.defaults.show_content_on_homepage);
    assert!(config.study.defaults.show_recommended_content);
    assert!(config.study.defaults.show_top_navigation);

    clear_study_vars();
}

#[test]
#[serial]
fn test_config_from_env_rejects_invalid_flag() {
    clear_study_vars();
    env::set_var("STUDY_SHOW_TOP_NAVIGATION", "sometimes");

    let result = Config::from_env();
    match result {
        Err(AppError::Config { message }) => {
            assert!(message.contains("STUDY_SHOW_TOP_NAVIGATION"));
        }
        other => panic!("expected config error, got {other:?}"),
    }

    clear_study_vars();
}

#[test]
#[serial]
fn test_config_from_env_site_settings() {
    env::set_var("SITE_HOMEPAGE_LIST", "spring-campaign");
    env::set_var("SITE_DEFAULT_SORT", "age");

    let config = Config::from_env().unwrap();
    assert_eq!(config.site.homepage_list, "spring-campaign");
    assert_eq!(config.site.default_sort, "age");

    env::remove_var("SITE_HOMEPAGE_LIST");
    env::remove_var("SITE_DEFAULT_SORT");
}

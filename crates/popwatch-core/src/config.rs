use std::path::PathBuf;

use crate::app_config::{AppConfig, Credentials};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so tests can drive it from a
/// plain `HashMap`.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let require = |var: &str| -> Result<String, ConfigError> {
        match lookup(var) {
            Ok(v) if !v.trim().is_empty() => Ok(v),
            _ => Err(ConfigError::MissingEnvVar(var.to_string())),
        }
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .trim()
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .trim()
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_secs = |var: &str, default: &str| -> Result<f64, ConfigError> {
        let value = or_default(var, default)
            .trim()
            .parse::<f64>()
            .map_err(|e| invalid(var, e.to_string()))?;
        if value.is_finite() && value >= 0.0 {
            Ok(value)
        } else {
            Err(invalid(var, "must be a non-negative number".to_string()))
        }
    };

    let parse_flag = |var: &str| -> bool {
        or_default(var, "false")
            .trim()
            .eq_ignore_ascii_case("true")
    };

    let bluesky = Credentials {
        handle: require("BLUESKY_HANDLE")?,
        app_password: require("BLUESKY_APP_PASSWORD")?,
    };

    let bluesky_test = match (
        lookup("BLUESKY_TEST_HANDLE").ok().filter(|v| !v.is_empty()),
        lookup("BLUESKY_TEST_APP_PASSWORD").ok().filter(|v| !v.is_empty()),
    ) {
        (Some(handle), Some(app_password)) => Some(Credentials {
            handle,
            app_password,
        }),
        _ => None,
    };

    let bluesky_service_url = or_default("BLUESKY_SERVICE_URL", "https://bsky.social")
        .trim_end_matches('/')
        .to_string();

    let check_interval_minutes = parse_u64("CHECK_INTERVAL_MINUTES", "15")?;
    if check_interval_minutes == 0 {
        return Err(invalid(
            "CHECK_INTERVAL_MINUTES",
            "must be greater than zero".to_string(),
        ));
    }

    let fandoms = split_list(&or_default("FANDOMS", "Marvel,Star Wars,Disney,Anime"));
    let scrape_pages = split_list(&or_default("SCRAPE_PAGES", "sale,new-releases,exclusives"));
    if scrape_pages.is_empty() {
        return Err(invalid(
            "SCRAPE_PAGES",
            "at least one page is required".to_string(),
        ));
    }

    let funko_region = or_default("FUNKO_REGION", "pl").trim().to_lowercase();
    let max_posts_per_check = parse_usize("MAX_POSTS_PER_CHECK", "0")?;
    let post_delay_seconds = parse_u64("POST_DELAY_SECONDS", "0")?;

    let scrape_delay_min_secs = parse_secs("SCRAPE_DELAY_MIN", "2")?;
    let scrape_delay_max_secs = parse_secs("SCRAPE_DELAY_MAX", "5")?;
    if scrape_delay_min_secs > scrape_delay_max_secs {
        return Err(invalid(
            "SCRAPE_DELAY_MIN",
            format!("must not exceed SCRAPE_DELAY_MAX ({scrape_delay_max_secs})"),
        ));
    }

    let dry_run = parse_flag("DRY_RUN");
    let test_mode = parse_flag("TEST_MODE");
    let log_level = or_default("LOG_LEVEL", "info").trim().to_lowercase();
    let data_dir = PathBuf::from(or_default("POPWATCH_DATA_DIR", "./data"));
    let hashtags_path = lookup("POPWATCH_HASHTAGS_PATH")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from);
    let request_timeout_secs = parse_u64("POPWATCH_REQUEST_TIMEOUT_SECS", "30")?;

    Ok(AppConfig {
        bluesky,
        bluesky_test,
        bluesky_service_url,
        check_interval_minutes,
        fandoms,
        scrape_pages,
        funko_region,
        max_posts_per_check,
        post_delay_seconds,
        scrape_delay_min_secs,
        scrape_delay_max_secs,
        dry_run,
        test_mode,
        log_level,
        data_dir,
        hashtags_path,
        request_timeout_secs,
    })
}

/// Splits a comma-separated list, trimming entries and dropping empty ones.
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

// backuptool/src/config/mod.rs
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

pub const DEFAULT_CRON_SCHEDULE: &str = "0 5 * * *";

/// How text on pg_dump's stderr is treated when the exit status is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StderrPolicy {
    /// Any stderr output fails the dump.
    #[default]
    Strict,
    /// Stderr output is logged and the dump is kept.
    Warn,
}

impl FromStr for StderrPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" | "fatal" => Ok(StderrPolicy::Strict),
            "warn" | "warning" => Ok(StderrPolicy::Warn),
            other => Err(anyhow::anyhow!(
                "DUMP_STDERR_POLICY must be 'strict' or 'warn', got '{}'",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub bucket_name: String,
    pub region: String,
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
}

#[derive(Debug, Clone)]
pub struct DumpConfig {
    pub pg_dump_path: Option<PathBuf>,
    pub stderr_policy: StderrPolicy,
}

#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub cron_expression: String,
    pub run_on_startup: bool,
    pub single_shot: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub volume_url: Url,
    pub storage: StorageConfig,
    pub dump: DumpConfig,
    pub temp_dir: PathBuf,
    pub step_timeout: Option<Duration>,
    pub schedule: ScheduleConfig,
}

impl AppConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |key: &str| get(key).with_context(|| format!("{} must be set", key));

        let database_url = require("BACKUP_DATABASE_URL")?;

        let volume_url_raw = require("BACKUP_VOLUME_URL")?;
        let volume_url = Url::parse(&volume_url_raw)
            .with_context(|| format!("BACKUP_VOLUME_URL is not a valid URL: {}", volume_url_raw))?;
        if !matches!(volume_url.scheme(), "http" | "https") {
            anyhow::bail!(
                "BACKUP_VOLUME_URL must use http or https, got scheme '{}'",
                volume_url.scheme()
            );
        }

        let endpoint_url = match get("AWS_S3_ENDPOINT") {
            Some(endpoint) => {
                Url::parse(&endpoint)
                    .with_context(|| format!("AWS_S3_ENDPOINT is not a valid URL: {}", endpoint))?;
                Some(endpoint)
            }
            None => None,
        };

        let storage = StorageConfig {
            bucket_name: require("AWS_S3_BUCKET")?,
            region: require("AWS_S3_REGION")?,
            endpoint_url,
            force_path_style: parse_bool(get("AWS_S3_FORCE_PATH_STYLE"), "AWS_S3_FORCE_PATH_STYLE")?,
        };

        let dump = DumpConfig {
            pg_dump_path: get("PG_DUMP_PATH").map(PathBuf::from),
            stderr_policy: get("DUMP_STDERR_POLICY")
                .map(|v| v.parse::<StderrPolicy>())
                .transpose()?
                .unwrap_or_default(),
        };

        let step_timeout = match get("BACKUP_STEP_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = raw
                    .parse()
                    .with_context(|| format!("BACKUP_STEP_TIMEOUT_SECS must be a whole number of seconds, got '{}'", raw))?;
                if secs == 0 {
                    anyhow::bail!("BACKUP_STEP_TIMEOUT_SECS must be greater than zero");
                }
                Some(Duration::from_secs(secs))
            }
            None => None,
        };

        let schedule = ScheduleConfig {
            cron_expression: normalize_cron_expression(
                &get("BACKUP_CRON_SCHEDULE").unwrap_or_else(|| DEFAULT_CRON_SCHEDULE.to_string()),
            )?,
            run_on_startup: parse_bool(get("RUN_ON_STARTUP"), "RUN_ON_STARTUP")?,
            single_shot: parse_bool(get("SINGLE_SHOT_MODE"), "SINGLE_SHOT_MODE")?,
        };

        Ok(AppConfig {
            database_url,
            volume_url,
            storage,
            dump,
            temp_dir: get("BACKUP_TEMP_DIR").map(PathBuf::from).unwrap_or_else(std::env::temp_dir),
            step_timeout,
            schedule,
        })
    }
}

fn parse_bool(value: Option<String>, key: &str) -> Result<bool> {
    match value.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(false),
        Some("true" | "1" | "yes") => Ok(true),
        Some("false" | "0" | "no") => Ok(false),
        Some(other) => Err(anyhow::anyhow!("{} must be a boolean, got '{}'", key, other)),
    }
}

/// The `cron` crate wants a leading seconds field; classic five-field
/// expressions get `0` seconds prepended. The result is validated.
pub fn normalize_cron_expression(expression: &str) -> Result<String> {
    let fields = expression.split_whitespace().count();
    let normalized = if fields == 5 {
        format!("0 {}", expression.split_whitespace().collect::<Vec<_>>().join(" "))
    } else {
        expression.trim().to_string()
    };

    cron::Schedule::from_str(&normalized)
        .with_context(|| format!("Invalid cron expression: '{}'. Example: '0 5 * * *' for daily at 5am", expression))?;
    Ok(normalized)
}

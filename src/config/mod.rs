//! Configuration loading with layered precedence: files, environment, then CLI flags.

use std::{num::NonZeroU32, str::FromStr, time::Duration};

use apalis_cron::Schedule;
use chrono_tz::Tz;
use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::application::jobs::{DEFAULT_DISPATCH_SCHEDULE, dispatch_schedule};

mod cli;

pub use cli::*;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "dripline";
const ENV_PREFIX: &str = "DRIPLINE";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_BATCH_SIZE: u32 = 50;
const DEFAULT_CLAIM_TIMEOUT_SECS: u64 = 900;
const DEFAULT_TIMEZONE: &str = "UTC";
const DEFAULT_LATE_HOUR: u8 = 20;
const DEFAULT_FALLBACK_DELAY_MINUTES: u64 = 15;
const DEFAULT_TOKEN_TTL_HOURS: u64 = 24;
const DEFAULT_LINKS_BASE_URL: &str = "http://localhost:8080/";
const DEFAULT_MAIL_TIMEOUT_SECS: u64 = 10;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub dispatch: DispatchWorkerSettings,
    pub scheduling: SchedulingSettings,
    pub subscriptions: SubscriptionSettings,
    pub links: LinkSettings,
    pub mail: MailSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct DispatchWorkerSettings {
    pub schedule: Schedule,
    pub batch_size: NonZeroU32,
    pub claim_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct SchedulingSettings {
    pub timezone: Tz,
    pub late_hour: u8,
    pub fallback_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct SubscriptionSettings {
    pub token_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct LinkSettings {
    /// Always ends with a slash so relative joins stay under it.
    pub base_url: Url,
}

#[derive(Debug, Clone)]
pub struct MailSettings {
    /// Without a relay, mail is written to the log instead of delivered.
    pub relay_url: Option<Url>,
    pub timeout: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Dispatch(args)) => {
            raw.apply_database_override(&args.database);
            if let Some(size) = args.batch_size {
                raw.dispatch.batch_size = Some(size.into());
            }
        }
        Some(other) => raw.apply_database_override(other.database()),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    dispatch: RawDispatchSettings,
    scheduling: RawSchedulingSettings,
    subscriptions: RawSubscriptionSettings,
    links: RawLinkSettings,
    mail: RawMailSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(schedule) = overrides.dispatch_schedule.as_ref() {
            self.dispatch.schedule = Some(schedule.clone());
        }
        if let Some(size) = overrides.batch_size {
            self.dispatch.batch_size = Some(size.into());
        }
        if let Some(zone) = overrides.timezone.as_ref() {
            self.scheduling.timezone = Some(zone.clone());
        }
        if let Some(url) = overrides.mail_relay_url.as_ref() {
            self.mail.relay_url = Some(url.clone());
        }
        if let Some(url) = overrides.links_base_url.as_ref() {
            self.links.base_url = Some(url.clone());
        }
        self.apply_database_override(&overrides.database);
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            database,
            dispatch,
            scheduling,
            subscriptions,
            links,
            mail,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            dispatch: build_dispatch_settings(dispatch)?,
            scheduling: build_scheduling_settings(scheduling)?,
            subscriptions: build_subscription_settings(subscriptions)?,
            links: build_link_settings(links)?,
            mail: build_mail_settings(mail)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_dispatch_settings(
    dispatch: RawDispatchSettings,
) -> Result<DispatchWorkerSettings, LoadError> {
    let expression = dispatch
        .schedule
        .unwrap_or_else(|| DEFAULT_DISPATCH_SCHEDULE.to_string());
    let schedule = dispatch_schedule(expression.trim())
        .map_err(|reason| LoadError::invalid("dispatch.schedule", reason))?;

    let batch_size = non_zero_u32(
        dispatch.batch_size.unwrap_or(DEFAULT_BATCH_SIZE.into()),
        "dispatch.batch_size",
    )?;

    let claim_secs = dispatch
        .claim_timeout_seconds
        .unwrap_or(DEFAULT_CLAIM_TIMEOUT_SECS);
    if claim_secs == 0 {
        return Err(LoadError::invalid(
            "dispatch.claim_timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(DispatchWorkerSettings {
        schedule,
        batch_size,
        claim_timeout: Duration::from_secs(claim_secs),
    })
}

fn build_scheduling_settings(
    scheduling: RawSchedulingSettings,
) -> Result<SchedulingSettings, LoadError> {
    let name = scheduling
        .timezone
        .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
    let timezone = Tz::from_str(name.trim()).map_err(|err| {
        LoadError::invalid("scheduling.timezone", format!("unknown zone `{name}`: {err}"))
    })?;

    let late_hour = scheduling.late_hour.unwrap_or(DEFAULT_LATE_HOUR);
    if late_hour > 23 {
        return Err(LoadError::invalid(
            "scheduling.late_hour",
            "must be between 0 and 23",
        ));
    }

    let fallback_minutes = scheduling
        .fallback_delay_minutes
        .unwrap_or(DEFAULT_FALLBACK_DELAY_MINUTES);

    Ok(SchedulingSettings {
        timezone,
        late_hour,
        fallback_delay: Duration::from_secs(fallback_minutes.saturating_mul(60)),
    })
}

fn build_subscription_settings(
    subscriptions: RawSubscriptionSettings,
) -> Result<SubscriptionSettings, LoadError> {
    let hours = subscriptions
        .token_ttl_hours
        .unwrap_or(DEFAULT_TOKEN_TTL_HOURS);
    if hours == 0 {
        return Err(LoadError::invalid(
            "subscriptions.token_ttl_hours",
            "must be greater than zero",
        ));
    }

    Ok(SubscriptionSettings {
        token_ttl: Duration::from_secs(hours.saturating_mul(3600)),
    })
}

fn build_link_settings(links: RawLinkSettings) -> Result<LinkSettings, LoadError> {
    let raw = links
        .base_url
        .unwrap_or_else(|| DEFAULT_LINKS_BASE_URL.to_string());
    let mut base_url = parse_http_url(raw.trim(), "links.base_url")?;
    if !base_url.path().ends_with('/') {
        let path = format!("{}/", base_url.path());
        base_url.set_path(&path);
    }

    Ok(LinkSettings { base_url })
}

fn build_mail_settings(mail: RawMailSettings) -> Result<MailSettings, LoadError> {
    let relay_url = match mail.relay_url.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => Some(parse_http_url(value, "mail.relay_url")?),
        _ => None,
    };

    let timeout_secs = mail.timeout_seconds.unwrap_or(DEFAULT_MAIL_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "mail.timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(MailSettings {
        relay_url,
        timeout: Duration::from_secs(timeout_secs),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDispatchSettings {
    schedule: Option<String>,
    batch_size: Option<u64>,
    claim_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSchedulingSettings {
    timezone: Option<String>,
    late_hour: Option<u8>,
    fallback_delay_minutes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSubscriptionSettings {
    token_ttl_hours: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLinkSettings {
    base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawMailSettings {
    relay_url: Option<String>,
    timeout_seconds: Option<u64>,
}

fn parse_http_url(value: &str, key: &'static str) -> Result<Url, LoadError> {
    let url = Url::parse(value)
        .map_err(|err| LoadError::invalid(key, format!("invalid url `{value}`: {err}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(LoadError::invalid(
            key,
            format!("unsupported scheme `{other}`"),
        )),
    }
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

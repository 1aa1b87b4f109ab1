use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the dripline binary.
#[derive(Debug, Parser)]
#[command(
    name = "dripline",
    version,
    about = "Email journey scheduler and dispatcher"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "DRIPLINE_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the recurring dispatch worker until interrupted.
    Serve(Box<ServeArgs>),
    /// Process a single batch of due sends and exit.
    Dispatch(DispatchArgs),
    /// Schedule the sends of an enrollment.
    Expand(EnrollmentArgs),
    /// Stop every pending send of all enrollments sharing the address.
    #[command(name = "stop-all")]
    StopAll(EnrollmentArgs),
    /// Stop the remaining sends of a step's journey for one enrollment.
    #[command(name = "stop-single")]
    StopSingle(StopSingleArgs),
    /// Move an enrollment into another journey.
    Redirect(RedirectArgs),
    /// Record an open tracking event.
    Open(TrackArgs),
    /// Record a click tracking event and print the destination.
    Click(ClickArgs),
    /// Submit an address to a journey.
    Submit(SubmitArgs),
    /// Confirm a subscription token.
    Confirm(ConfirmArgs),
    /// Unsubscribe an enrollment.
    Unsubscribe(UnsubscribeArgs),
}

impl Command {
    pub fn database(&self) -> &DatabaseOverride {
        match self {
            Command::Serve(args) => &args.overrides.database,
            Command::Dispatch(args) => &args.database,
            Command::Expand(args) | Command::StopAll(args) => &args.database,
            Command::StopSingle(args) => &args.database,
            Command::Redirect(args) => &args.database,
            Command::Open(args) => &args.database,
            Command::Click(args) => &args.track.database,
            Command::Submit(args) => &args.database,
            Command::Confirm(args) => &args.database,
            Command::Unsubscribe(args) => &args.database,
        }
    }
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Override the log level (e.g. info, debug).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Emit logs as JSON.
    #[arg(long = "log-json", value_name = "BOOL", value_parser = BoolishValueParser::new())]
    pub log_json: Option<bool>,

    /// Override the dispatch cron expression (six fields, with seconds).
    #[arg(long = "dispatch-schedule", value_name = "CRON")]
    pub dispatch_schedule: Option<String>,

    /// Override the number of sends processed per batch.
    #[arg(long = "batch-size", value_name = "N")]
    pub batch_size: Option<u32>,

    /// Override the scheduling time zone (IANA name).
    #[arg(long = "timezone", value_name = "TZ")]
    pub timezone: Option<String>,

    /// Override the mail relay endpoint.
    #[arg(long = "mail-relay-url", value_name = "URL", value_hint = ValueHint::Url)]
    pub mail_relay_url: Option<String>,

    /// Override the public base URL used in links.
    #[arg(long = "links-base-url", value_name = "URL", value_hint = ValueHint::Url)]
    pub links_base_url: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct DispatchArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Maximum number of sends to process.
    #[arg(long = "batch-size", value_name = "N")]
    pub batch_size: Option<u32>,
}

#[derive(Debug, Args, Clone)]
pub struct EnrollmentArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    pub enrollment_id: i64,
}

#[derive(Debug, Args, Clone)]
pub struct StopSingleArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    pub enrollment_id: i64,
    pub step_id: i64,
}

#[derive(Debug, Args, Clone)]
pub struct RedirectArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    pub enrollment_id: i64,
    pub journey_id: i64,
}

#[derive(Debug, Args, Clone)]
pub struct TrackArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    pub step_id: i64,
    pub enrollment_id: i64,
}

#[derive(Debug, Args, Clone)]
pub struct ClickArgs {
    #[command(flatten)]
    pub track: TrackArgs,

    /// Destination the tracked link points to.
    #[arg(long = "url", value_name = "URL")]
    pub url: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct SubmitArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    pub journey_id: i64,
    pub email: String,
}

#[derive(Debug, Args, Clone)]
pub struct ConfirmArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    pub token: String,
}

#[derive(Debug, Args, Clone)]
pub struct UnsubscribeArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    pub enrollment_id: i64,

    /// Step the unsubscribe link came from.
    #[arg(long = "step", value_name = "ID")]
    pub step_id: Option<i64>,
}

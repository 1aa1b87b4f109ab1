use std::{process, sync::Arc};

use apalis::prelude::{Monitor, WorkerBuilder, WorkerFactoryFn};
use apalis_cron::CronStream;
use dripline::{
    application::{
        branching::BranchHandler,
        dispatch::{BatchDispatcher, DispatchSettings},
        error::AppError,
        expander::SequenceExpander,
        jobs::{DispatchJobContext, process_dispatch_sends_job},
        lifecycle::EnrollmentLifecycle,
        links::LinkResolver,
        mailer::CampaignMailer,
        repos::{
            EnrollmentsRepo, JourneysRepo, ListEntriesRepo, ScheduledSendsRepo, StatsRepo,
            StepsRepo,
        },
        subscriptions::SubscriptionService,
    },
    config,
    domain::{
        calendar::HolidayCalendar,
        schedule::{SchedulePolicy, SendTimeCalculator},
    },
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        links::BaseUrlLinkResolver,
        mail::{LogMailer, WebhookMailer},
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    let repositories = init_repositories(&settings).await?;
    let app = build_application_context(repositories, &settings)?;

    match command {
        config::Command::Serve(_) => run_serve(app, &settings).await,
        config::Command::Dispatch(args) => {
            let report = app
                .dispatcher
                .run_batch(args.batch_size)
                .await
                .map_err(|err| AppError::from_service("dispatch failed", &err))?;
            println!(
                "selected={} sent={} failed={} not_received={} unsubscribed={} skipped={} \
                 hook_failures={}",
                report.selected,
                report.sent,
                report.failed,
                report.not_received,
                report.unsubscribed,
                report.skipped,
                report.hook_failures
            );
            Ok(())
        }
        config::Command::Expand(args) => {
            let scheduled = app
                .lifecycle
                .expander()
                .try_expand(args.enrollment_id)
                .await
                .map_err(|err| AppError::from_service("expand failed", &err))?;
            println!("scheduled {scheduled} sends");
            Ok(())
        }
        config::Command::StopAll(args) => {
            let stopped = app
                .lifecycle
                .try_stop_all(args.enrollment_id)
                .await
                .map_err(|err| AppError::from_service("stop-all failed", &err))?;
            println!("stopped {stopped} sends");
            Ok(())
        }
        config::Command::StopSingle(args) => {
            let stopped = app
                .lifecycle
                .try_stop_single(args.enrollment_id, args.step_id)
                .await
                .map_err(|err| AppError::from_service("stop-single failed", &err))?;
            println!("stopped {stopped} sends");
            Ok(())
        }
        config::Command::Redirect(args) => {
            let enrollment = app
                .lifecycle
                .try_redirect(args.enrollment_id, args.journey_id)
                .await
                .map_err(|err| AppError::from_service("redirect failed", &err))?;
            println!("enrollment {} created", enrollment.id);
            Ok(())
        }
        config::Command::Open(args) => {
            if !app
                .branching
                .record_open(args.step_id, args.enrollment_id)
                .await
            {
                return Err(AppError::unexpected("open event was not recorded"));
            }
            Ok(())
        }
        config::Command::Click(args) => {
            let destination = app
                .branching
                .follow_click(args.track.step_id, args.track.enrollment_id, args.url.as_deref())
                .await;
            println!("{destination}");
            Ok(())
        }
        config::Command::Submit(args) => {
            let outcome = app
                .subscriptions
                .submit(args.journey_id, &args.email)
                .await
                .map_err(|err| AppError::from_service("submit failed", &err))?;
            println!("{outcome:?}");
            Ok(())
        }
        config::Command::Confirm(args) => {
            let outcome = app
                .subscriptions
                .confirm(&args.token)
                .await
                .map_err(|err| AppError::from_service("confirm failed", &err))?;
            println!(
                "enrollment {} confirmed, {} sends scheduled",
                outcome.enrollment_id, outcome.scheduled
            );
            if let Some(url) = outcome.document_url {
                println!("{url}");
            }
            Ok(())
        }
        config::Command::Unsubscribe(args) => {
            app.subscriptions
                .try_unsubscribe(args.enrollment_id, args.step_id)
                .await
                .map_err(|err| AppError::from_service("unsubscribe failed", &err))?;
            println!("enrollment {} unsubscribed", args.enrollment_id);
            Ok(())
        }
    }
}

struct ApplicationContext {
    lifecycle: EnrollmentLifecycle,
    dispatcher: Arc<BatchDispatcher>,
    branching: BranchHandler,
    subscriptions: SubscriptionService,
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn build_application_context(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> Result<ApplicationContext, AppError> {
    let journeys: Arc<dyn JourneysRepo> = repositories.clone();
    let list_entries: Arc<dyn ListEntriesRepo> = repositories.clone();
    let enrollments: Arc<dyn EnrollmentsRepo> = repositories.clone();
    let steps: Arc<dyn StepsRepo> = repositories.clone();
    let sends: Arc<dyn ScheduledSendsRepo> = repositories.clone();
    let stats: Arc<dyn StatsRepo> = repositories;

    let policy = SchedulePolicy {
        zone: settings.scheduling.timezone,
        late_hour: settings.scheduling.late_hour,
        fallback_delay: to_time_duration(settings.scheduling.fallback_delay)?,
    };
    let calculator = Arc::new(SendTimeCalculator::new(
        Arc::new(HolidayCalendar::new()),
        policy,
    ));

    let expander = SequenceExpander::new(
        enrollments.clone(),
        steps.clone(),
        sends.clone(),
        calculator,
    );
    let lifecycle = EnrollmentLifecycle::new(
        journeys.clone(),
        enrollments.clone(),
        steps.clone(),
        sends.clone(),
        stats.clone(),
        expander,
    );

    let mailer = build_mailer(&settings.mail)?;
    let links: Arc<dyn LinkResolver> =
        Arc::new(BaseUrlLinkResolver::new(settings.links.base_url.clone()));

    let dispatch_settings = DispatchSettings {
        batch_size: settings.dispatch.batch_size.get(),
        claim_timeout: to_time_duration(settings.dispatch.claim_timeout)?,
    };
    let dispatcher = Arc::new(BatchDispatcher::new(
        sends.clone(),
        steps.clone(),
        stats.clone(),
        mailer.clone(),
        links.clone(),
        lifecycle.clone(),
        dispatch_settings,
    ));

    let branching = BranchHandler::new(
        steps.clone(),
        sends.clone(),
        stats.clone(),
        lifecycle.clone(),
    );

    let subscriptions = SubscriptionService::new(
        journeys,
        list_entries,
        enrollments,
        steps,
        sends,
        stats,
        mailer,
        links,
        lifecycle.clone(),
        to_time_duration(settings.subscriptions.token_ttl)?,
    );

    Ok(ApplicationContext {
        lifecycle,
        dispatcher,
        branching,
        subscriptions,
    })
}

fn build_mailer(mail: &config::MailSettings) -> Result<Arc<dyn CampaignMailer>, AppError> {
    match mail.relay_url.as_ref() {
        Some(endpoint) => {
            let mailer = WebhookMailer::new(endpoint.clone(), mail.timeout)?;
            Ok(Arc::new(mailer))
        }
        None => {
            info!(
                target = "dripline::mail",
                "No mail relay configured; mail is written to the log"
            );
            Ok(Arc::new(LogMailer))
        }
    }
}

fn to_time_duration(value: std::time::Duration) -> Result<time::Duration, AppError> {
    time::Duration::try_from(value)
        .map_err(|err| AppError::unexpected(format!("duration out of range: {err}")))
}

async fn run_serve(app: ApplicationContext, settings: &config::Settings) -> Result<(), AppError> {
    let context = DispatchJobContext {
        dispatcher: app.dispatcher.clone(),
        batch_size: None,
    };

    let dispatch_worker = WorkerBuilder::new("dispatch-sends-worker")
        .data(context)
        .backend(CronStream::new(settings.dispatch.schedule.clone()))
        .build_fn(process_dispatch_sends_job);

    let monitor = Monitor::new().register(dispatch_worker);
    let monitor_handle = tokio::spawn(async move {
        if let Err(err) = monitor.run().await {
            error!(error = %err, "job monitor stopped");
        }
    });

    info!(
        target = "dripline::serve",
        batch_size = settings.dispatch.batch_size.get(),
        "Dispatch worker started"
    );

    let result = tokio::signal::ctrl_c()
        .await
        .map_err(|err| AppError::from(InfraError::from(err)));

    info!(target = "dripline::serve", "Shutting down");
    monitor_handle.abort();
    let _ = monitor_handle.await;

    result
}

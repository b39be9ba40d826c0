//! Background job scheduler.
//!
//! Initialises a [`JobScheduler`] at server startup and registers the
//! recurring snapshot pass plus a one-shot pass shortly after boot, so a
//! freshly started instance produces data without waiting up to an hour.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use adwatch_scraper::{run_snapshot_pass, DelayPolicy, PageFetcher};

use crate::store::PgStore;

/// Top-of-hour recurring snapshot pass.
const HOURLY: &str = "0 0 * * * *";

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive
/// for the lifetime of the process — dropping it shuts down all jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// a job cannot be registered, or the scheduler fails to start.
pub async fn build_scheduler(
    pool: PgPool,
    config: Arc<adwatch_core::AppConfig>,
    fetcher: Arc<dyn PageFetcher>,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    let store = Arc::new(PgStore::new(pool));
    let delay = DelayPolicy::new(config.scraper_delay_min_ms, config.scraper_delay_max_ms);
    // Shared between the startup job and the hourly job: at most one pass
    // runs at a time, and an overlapping trigger is skipped, not queued.
    let pass_running = Arc::new(AtomicBool::new(false));

    register_hourly_pass(
        &scheduler,
        Arc::clone(&store),
        Arc::clone(&fetcher),
        delay,
        Arc::clone(&pass_running),
    )
    .await?;
    register_startup_pass(
        &scheduler,
        store,
        fetcher,
        delay,
        pass_running,
        config.startup_scrape_delay_secs,
    )
    .await?;

    scheduler.start().await?;
    Ok(scheduler)
}

/// Register the recurring snapshot pass at the top of every hour.
async fn register_hourly_pass(
    scheduler: &JobScheduler,
    store: Arc<PgStore>,
    fetcher: Arc<dyn PageFetcher>,
    delay: DelayPolicy,
    pass_running: Arc<AtomicBool>,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(HOURLY, move |_uuid, _lock| {
        let store = Arc::clone(&store);
        let fetcher = Arc::clone(&fetcher);
        let pass_running = Arc::clone(&pass_running);

        Box::pin(async move {
            run_guarded_pass(&*store, &*fetcher, delay, &pass_running, "hourly").await;
        })
    })?;

    scheduler.add(job).await?;
    Ok(())
}

/// Register a single pass shortly after boot.
async fn register_startup_pass(
    scheduler: &JobScheduler,
    store: Arc<PgStore>,
    fetcher: Arc<dyn PageFetcher>,
    delay: DelayPolicy,
    pass_running: Arc<AtomicBool>,
    delay_secs: u64,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_one_shot_async(Duration::from_secs(delay_secs), move |_uuid, _lock| {
        let store = Arc::clone(&store);
        let fetcher = Arc::clone(&fetcher);
        let pass_running = Arc::clone(&pass_running);

        Box::pin(async move {
            run_guarded_pass(&*store, &*fetcher, delay, &pass_running, "startup").await;
        })
    })?;

    scheduler.add(job).await?;
    Ok(())
}

/// Run one pass under the single-flight guard. A long pass that overruns
/// into the next trigger causes that trigger to be skipped.
async fn run_guarded_pass(
    store: &PgStore,
    fetcher: &dyn PageFetcher,
    delay: DelayPolicy,
    pass_running: &AtomicBool,
    trigger: &'static str,
) {
    if pass_running
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        tracing::warn!(trigger, "scheduler: previous snapshot pass still running; skipping");
        return;
    }

    tracing::info!(trigger, "scheduler: starting snapshot pass");
    let stats = run_snapshot_pass(store, fetcher, delay).await;
    tracing::info!(
        trigger,
        offers_total = stats.offers_total,
        offers_failed = stats.offers_failed,
        pages_succeeded = stats.pages_succeeded,
        pages_failed = stats.pages_failed,
        "scheduler: snapshot pass finished"
    );

    pass_running.store(false, Ordering::SeqCst);
}

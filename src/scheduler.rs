//! Background jobs. Currently a single cron job that purges archived files
//! past their retention window.

use anyhow::Result;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::registry::Registry;

pub struct Scheduler {
    registry: Arc<Registry>,
    purge_cron: String,
}

impl Scheduler {
    #[must_use]
    pub const fn new(registry: Arc<Registry>, purge_cron: String) -> Self {
        Self {
            registry,
            purge_cron,
        }
    }

    /// Register the jobs and start the tick loop. Returns the running
    /// scheduler so the caller can keep it alive.
    pub async fn start(self) -> Result<JobScheduler> {
        let sched = JobScheduler::new().await?;

        let registry = Arc::clone(&self.registry);
        let purge_job = Job::new_async(self.purge_cron.as_str(), move |_uuid, _lock| {
            let registry = Arc::clone(&registry);
            Box::pin(async move {
                info!(event = "job_started", job_name = "archive_purge");
                match registry.purge_archive().await {
                    Ok(purged) => {
                        info!(
                            event = "job_completed",
                            job_name = "archive_purge",
                            purged,
                            "Archive purge finished"
                        );
                    }
                    Err(e) => {
                        error!(
                            event = "job_failed",
                            job_name = "archive_purge",
                            error = %e,
                            "Archive purge failed"
                        );
                    }
                }
            })
        })?;

        sched.add(purge_job).await?;
        sched.start().await?;
        info!("Background scheduler started");

        Ok(sched)
    }
}

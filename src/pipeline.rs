//! Background deployment: run the script, then purge the CDN.

use tracing::{Instrument, error, info, info_span, warn};

use crate::invalidate::{CacheInvalidator, InvalidationRun};
use crate::job::{DeployReport, DeploymentJob, ScriptExit};
use crate::runner::run_script;

/// What a finished background run did
#[derive(Debug)]
pub struct PipelineOutcome {
    pub report: Option<DeployReport>,
    pub invalidation: Option<InvalidationRun>,
}

/// Runs one deployment job to completion.
///
/// Invalidation follows any run whose process was started, whatever its exit
/// status. It is skipped only when the script could not be started. Nothing
/// here is retried and failures are only logged.
pub async fn run_pipeline(job: DeploymentJob, invalidator: &CacheInvalidator) -> PipelineOutcome {
    let span = info_span!("deploy", job_id = %job.id, git_ref = %job.git_ref);

    async move {
        info!(
            "Starting deployment for commit {}",
            job.commit_sha.as_deref().unwrap_or("(unknown)")
        );

        let report = match run_script(&job).await {
            Ok(report) => report,
            Err(e) => {
                error!("Deployment {} failed: {}", job.id, e);
                return PipelineOutcome {
                    report: None,
                    invalidation: None,
                };
            }
        };

        match &report.exit {
            ScriptExit::Success => info!("Deployment {} completed successfully.", job.id),
            ScriptExit::Failed { code } => warn!(
                "Deployment {} exited with {:?}, invalidating anyway",
                job.id, code
            ),
            ScriptExit::WaitFailed(e) => warn!(
                "Deployment {} could not be waited on ({}), invalidating anyway",
                job.id, e
            ),
        }

        let invalidation = invalidator.invalidate_all().await;
        if invalidation.failed() > 0 {
            warn!(
                "{} of {} cache invalidations failed",
                invalidation.failed(),
                invalidation.attempted()
            );
        }

        info!(
            "Deployment {} done: script {}, {} of {} cache invalidations succeeded",
            job.id,
            if report.exit.is_success() { "succeeded" } else { "failed" },
            invalidation.attempted() - invalidation.failed(),
            invalidation.attempted()
        );
        PipelineOutcome {
            report: Some(report),
            invalidation: Some(invalidation),
        }
    }
    .instrument(span)
    .await
}

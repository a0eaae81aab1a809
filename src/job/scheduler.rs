use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{error, info};

use crate::job::{FeeJob, RunReport};

/// Runs the job back to back with a fixed pause in between. The next run is
/// armed after both success and failure; runs never overlap.
pub struct JobScheduler {
    job: Arc<FeeJob>,
    interval: Duration,
}

impl JobScheduler {
    pub fn new(job: Arc<FeeJob>, interval: Duration) -> Self {
        Self { job, interval }
    }

    /// One run; failures are reported to the notification sink and swallowed
    pub async fn run_once(&self) -> Option<RunReport> {
        match self.job.run().await {
            Ok(report) => {
                info!(
                    "✓ Run {} finished: {} updated, {} unchanged, {} skipped",
                    report.run_id,
                    report.updated.len(),
                    report.unchanged.len(),
                    report.failed.len()
                );
                Some(report)
            }
            Err(e) => {
                error!("❌ An error occurred at minimum-fee-job: {}", e);
                self.job
                    .notifier
                    .send(&format!(
                        "# :warning: An error occurred at minimum-fee-job\n```json\n{}\n```",
                        e
                    ))
                    .await;
                None
            }
        }
    }

    /// Start the loop in the background
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                self.run_once().await;
                info!("⏰ Next run in {}s", self.interval.as_secs());
                sleep(self.interval).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::fixtures::{default_harness, harness, priced_config};
    use crate::testing::{fake_sources, FakePriceSources, StaticConfigReader};

    #[tokio::test]
    async fn test_failed_run_is_reported_and_swallowed() {
        let mut config = priced_config();
        config.minimum_fee.fee_address = config.minimum_fee.config_address.clone();
        let h = harness(
            config,
            fake_sources(FakePriceSources::default()),
            StaticConfigReader::default(),
            vec![],
        );
        let notifier = h.notifier.clone();
        let scheduler = JobScheduler::new(Arc::new(h.job), Duration::from_secs(60));

        assert!(scheduler.run_once().await.is_none());

        let messages = notifier.messages().await;
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("# :warning: An error occurred at minimum-fee-job"));
        assert!(messages[0].contains("cannot be equal"));
    }

    #[tokio::test]
    async fn test_successful_run_returns_report() {
        let h = default_harness();
        let scheduler = JobScheduler::new(Arc::new(h.job), Duration::from_secs(60));

        let report = scheduler.run_once().await.unwrap();
        assert_eq!(report.updated.len(), 3);
    }
}

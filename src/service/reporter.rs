use crate::domain::models::Score;

/// Progress sink for audit runs.
pub trait ProgressReporter: Send + Sync {
    /// Called after every page, successful or not.
    fn page_finished(&self, clinic_id: &str, url: &str, done: usize, total: usize);

    fn run_finished(&self, clinic_id: &str, score: Option<Score>);
}

/// Logs progress percentages.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn page_finished(&self, clinic_id: &str, url: &str, done: usize, total: usize) {
        let progress = if total == 0 {
            100.0
        } else {
            done as f64 / total as f64 * 100.0
        };
        log::info!(
            "[RUN] {}: {:.0}% ({}/{}) finished {}",
            clinic_id,
            progress,
            done,
            total,
            url
        );
    }

    fn run_finished(&self, clinic_id: &str, score: Option<Score>) {
        match score {
            Some(score) => log::info!("[RUN] {} finished with score {}", clinic_id, score),
            None => log::warn!("[RUN] {} finished without a score", clinic_id),
        }
    }
}

//! Progress reporting for batch runs.

use crate::fetcher::{Outcome, RunSummary};
use tracing::{error, info, warn};

/// Progress callback for multi-code runs.
pub trait FetchProgress {
    /// Called when starting to process a code.
    fn on_start(&self, code: &str, index: usize, total: usize);

    /// Called when a code has been processed.
    fn on_complete(&self, code: &str, index: usize, total: usize, outcome: &Outcome);

    /// Called when the entire batch is done.
    fn on_batch_complete(&self, summary: &RunSummary);
}

/// Reports progress through `tracing`.
pub struct LogProgress;

impl FetchProgress for LogProgress {
    fn on_start(&self, code: &str, index: usize, total: usize) {
        info!("[{}/{}] processing {code}", index + 1, total);
    }

    fn on_complete(&self, code: &str, _index: usize, _total: usize, outcome: &Outcome) {
        match outcome {
            Outcome::UpToDate => info!("  {code}: up to date"),
            Outcome::Saved {
                added,
                still_missing,
            } => {
                info!("  {code}: saved, {} field(s) added", added.len());
                if !still_missing.is_empty() {
                    let names: Vec<&str> = still_missing.iter().map(|f| f.as_str()).collect();
                    warn!("  {code}: provider returned no column for {}", names.join(","));
                }
            }
            Outcome::Rejected { group, status } => {
                error!("  {code}: group '{group}' rejected with status {status}")
            }
            Outcome::Abandoned { group, reason } => {
                error!("  {code}: abandoned at group '{group}': {reason}")
            }
        }
    }

    fn on_batch_complete(&self, s: &RunSummary) {
        info!(
            "run complete: {} code(s), {} saved, {} up to date, {} rejected, {} abandoned",
            s.total, s.saved, s.up_to_date, s.rejected, s.abandoned
        );
    }
}

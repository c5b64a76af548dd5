//! Sequential in-host alignment: model i onto model i-1, on one chain.
//!
//! A failed pair is logged and skipped; later pairs still run against the
//! (unaligned) predecessor.

use log::{info, warn};
use serde::Serialize;

use super::AlignError;
use crate::host::{Host, ModelId};

/// Chain used when none is given
pub const DEFAULT_CHAIN: &str = "A";

/// Outcome of a sequential alignment pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlignReport {
    pub chain: String,
    pub aligned: usize,
    /// (moved, reference, reason)
    pub failed: Vec<(ModelId, ModelId, String)>,
}

impl AlignReport {
    pub fn pairs(&self) -> usize {
        self.aligned + self.failed.len()
    }

    pub fn status_text(&self) -> String {
        if self.failed.is_empty() {
            format!("Aligned (chain {})", self.chain)
        } else {
            format!(
                "Aligned {}/{} (chain {})",
                self.aligned,
                self.pairs(),
                self.chain
            )
        }
    }
}

/// `matchmaker #<moved>/<chain> to #<reference>/<chain>`
pub fn matchmaker_command(moved: ModelId, reference: ModelId, chain: &str) -> String {
    format!("matchmaker {}/{} to {}/{}", moved, chain, reference, chain)
}

/// Align every model onto its predecessor, in the given order.
///
/// `progress(done, total)` is called after each pair.
pub fn align_sequential<H: Host>(
    host: &mut H,
    models: &[ModelId],
    chain: &str,
    mut progress: impl FnMut(usize, usize),
) -> Result<AlignReport, AlignError> {
    if models.len() < 2 {
        return Err(AlignError::TooFewStructures(models.len()));
    }

    let total = models.len() - 1;
    info!("Aligning {} structures sequentially (chain {})...", models.len(), chain);

    let mut report = AlignReport {
        chain: chain.to_string(),
        ..Default::default()
    };
    for (i, pair) in models.windows(2).enumerate() {
        let (reference, moved) = (pair[0], pair[1]);
        match host.run(&matchmaker_command(moved, reference, chain)) {
            Ok(_) => {
                info!("Aligned {}/{} to {}/{} ({}/{})", moved, chain, reference, chain, i + 1, total);
                report.aligned += 1;
            }
            Err(e) => {
                warn!("Failed to align {}/{} to {}/{}: {}", moved, chain, reference, chain, e);
                report.failed.push((moved, reference, e.to_string()));
            }
        }
        progress(i + 1, total);
    }

    info!("Sequential alignment complete");
    Ok(report)
}

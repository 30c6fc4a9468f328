//! Largest batch size that fits on the device
//!
//! Candidates double from 1 up to a ceiling until the first failure, then a
//! binary search narrows the gap between the last size that fitted and the
//! first that did not. Every candidate runs one real training step on a batch
//! of the longest input repeated `candidate` times, so the returned size is
//! known to complete a step. The probe updates the trainer's weights; callers
//! rebuild the model and optimizer afterwards.

use std::path::Path;

use super::Trainer;
use crate::data::Batch;
use crate::device::Device;
use crate::error::{Error, Result};
use crate::features::FeatureExtractor;
use crate::logging::RunLog;

/// Default upper bound of the search
pub const DEFAULT_CEILING: usize = 1024;

enum Attempt {
    Fits,
    Exhausted(Error),
}

pub struct BatchSizeProber {
    ceiling: usize,
    log: RunLog,
}

impl BatchSizeProber {
    pub fn new(ceiling: usize, log: RunLog) -> Self {
        Self {
            ceiling: ceiling.max(1),
            log,
        }
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Find the largest batch size in `1..=ceiling` whose training step fits
    ///
    /// Only `ResourceExhausted` failures shrink the search; any other error is
    /// returned as is. Fails with `ResourceExhausted` when not even a single
    /// item fits.
    pub fn probe(
        &self,
        device: &Device,
        extractor: &dyn FeatureExtractor,
        trainer: &mut Trainer,
        worst_case: &Path,
    ) -> Result<usize> {
        let features = extractor.extract(worst_case)?;
        self.log.info(format!(
            "probing batch size on {} with {} ({} frames x {} features)",
            device.name,
            worst_case.display(),
            features.nrows(),
            features.ncols()
        ));

        let mut attempt = |size: usize| -> Result<Attempt> {
            let batch = Batch::repeat(&features, size, 0);
            match trainer.train_step(&batch, device) {
                Ok(_) => {
                    self.log.debug(format!("batch size {size}: ok"));
                    Ok(Attempt::Fits)
                }
                Err(e) if e.is_resource_exhausted() => {
                    self.log.debug(format!("batch size {size}: {e}"));
                    Ok(Attempt::Exhausted(e))
                }
                Err(e) => Err(e),
            }
        };

        if let Attempt::Exhausted(e) = attempt(1)? {
            self.log.error("a single item does not fit on the device");
            return Err(e);
        }

        let mut good = 1;
        let mut bad = None;
        while good < self.ceiling {
            let next = (good * 2).min(self.ceiling);
            match attempt(next)? {
                Attempt::Fits => good = next,
                Attempt::Exhausted(_) => {
                    bad = Some(next);
                    break;
                }
            }
        }

        if let Some(mut bad) = bad {
            while bad - good > 1 {
                let mid = good + (bad - good) / 2;
                match attempt(mid)? {
                    Attempt::Fits => good = mid,
                    Attempt::Exhausted(_) => bad = mid,
                }
            }
        }

        self.log.info(format!("batch size resolved to {good}"));
        Ok(good)
    }
}

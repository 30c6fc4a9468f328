//! Batching and loading
//!
//! Variable-length items are zero-padded to the longest item in each batch.
//! Loaders fetch the items of a batch in parallel on a shared rayon pool.

use ndarray::{s, Array2, Array3};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use rayon::ThreadPool;
use std::sync::Arc;

use super::AudioDataset;
use crate::error::{Error, Result};

/// A padded mini-batch
#[derive(Debug, Clone)]
pub struct Batch {
    /// Inputs, shape `(batch, frames, features)`
    pub inputs: Array3<f32>,
    /// Valid frame count per row
    pub lengths: Vec<usize>,
    /// Targets (absent for unlabelled data)
    pub labels: Option<Vec<usize>>,
    /// Dataset indices of the rows
    pub indices: Vec<usize>,
}

impl Batch {
    pub fn size(&self) -> usize {
        self.lengths.len()
    }

    pub fn frames(&self) -> usize {
        self.inputs.shape()[1]
    }

    pub fn feature_dim(&self) -> usize {
        self.inputs.shape()[2]
    }

    /// Batch of `times` copies of one input
    pub fn repeat(features: &Array2<f32>, times: usize, label: usize) -> Self {
        let (frames, dim) = features.dim();
        let mut inputs = Array3::<f32>::zeros((times, frames, dim));
        for mut row in inputs.outer_iter_mut() {
            row.assign(features);
        }
        Self {
            inputs,
            lengths: vec![frames; times],
            labels: Some(vec![label; times]),
            indices: (0..times).collect(),
        }
    }
}

/// Zero-pad and stack items
pub fn collate(items: Vec<(usize, Array2<f32>, Option<usize>)>) -> Result<Batch> {
    let Some(first) = items.first() else {
        return Err(Error::InvalidParameter("cannot collate an empty batch".to_string()));
    };
    let dim = first.1.ncols();
    let frames = items.iter().map(|(_, x, _)| x.nrows()).max().unwrap_or(0);

    let mut inputs = Array3::<f32>::zeros((items.len(), frames, dim));
    let mut lengths = Vec::with_capacity(items.len());
    let mut indices = Vec::with_capacity(items.len());
    let mut labels = Vec::with_capacity(items.len());
    let mut all_labelled = true;

    for (row, (index, features, label)) in items.into_iter().enumerate() {
        if features.ncols() != dim {
            return Err(Error::ShapeMismatch {
                expected: vec![features.nrows(), dim],
                got: vec![features.nrows(), features.ncols()],
            });
        }
        inputs
            .slice_mut(s![row, ..features.nrows(), ..])
            .assign(&features);
        lengths.push(features.nrows());
        indices.push(index);
        match label {
            Some(l) => labels.push(l),
            None => all_labelled = false,
        }
    }

    Ok(Batch {
        inputs,
        lengths,
        labels: all_labelled.then_some(labels),
        indices,
    })
}

/// Iteration order of a loader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Sequential,
    /// Shuffled with a generator seeded from `seed + epoch`
    Shuffled { seed: u64 },
}

/// Batches over a bound dataset
pub struct DataLoader {
    dataset: Arc<AudioDataset>,
    batch_size: usize,
    order: Order,
    pool: Arc<ThreadPool>,
}

impl DataLoader {
    pub fn new(
        dataset: Arc<AudioDataset>,
        batch_size: usize,
        order: Order,
        pool: Arc<ThreadPool>,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::InvalidParameter("batch size must be > 0".to_string()));
        }
        Ok(Self {
            dataset,
            batch_size,
            order,
            pool,
        })
    }

    pub fn dataset(&self) -> &AudioDataset {
        &self.dataset
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    pub fn num_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    /// Item order for an epoch
    pub fn order_for_epoch(&self, epoch: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        if let Order::Shuffled { seed } = self.order {
            let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(epoch as u64));
            order.shuffle(&mut rng);
        }
        order
    }

    /// Fetch and collate the given items
    pub fn batch(&self, indices: &[usize]) -> Result<Batch> {
        let dataset = &self.dataset;
        let items = self.pool.install(|| {
            indices
                .par_iter()
                .map(|&i| dataset.item(i).map(|(x, y)| (i, x, y)))
                .collect::<Result<Vec<_>>>()
        })?;
        collate(items)
    }

    /// Iterate over the batches of an epoch
    pub fn epoch(&self, epoch: usize) -> impl Iterator<Item = Result<Batch>> + '_ {
        let order = self.order_for_epoch(epoch);
        let chunks: Vec<Vec<usize>> = order
            .chunks(self.batch_size)
            .map(<[usize]>::to_vec)
            .collect();
        chunks.into_iter().map(move |chunk| self.batch(&chunk))
    }
}

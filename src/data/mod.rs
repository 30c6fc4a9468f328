//! Datasets, scalers, batching and input tables

mod batch;
mod dataset;
mod scaler;
mod table;

#[cfg(test)]
pub(crate) mod fixtures;

pub use batch::{collate, Batch, DataLoader, Order};
pub use dataset::{AudioDataset, CorpusStats};
pub use scaler::Scaler;
pub use table::{class_counts, read_test_table, read_train_table, Example, Table};

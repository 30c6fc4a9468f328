//! Model structure for serialization

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::model::Classifier;
use crate::tensor::Tensor;

/// Model metadata containing architecture and training information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Model name/identifier
    pub name: String,

    /// Model architecture type ("linear", "mlp")
    pub architecture: String,

    /// Crate version that wrote the artifact
    pub version: String,

    /// Custom metadata fields
    pub custom: HashMap<String, serde_json::Value>,
}

impl ModelMetadata {
    /// Create new metadata with minimal fields
    pub fn new(name: impl Into<String>, architecture: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            architecture: architecture.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            custom: HashMap::new(),
        }
    }

    /// Add custom metadata field
    pub fn with_custom(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.custom.insert(key.into(), value);
        self
    }
}

/// Information about a model parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterInfo {
    /// Parameter name (e.g. "hidden.weight")
    pub name: String,

    /// Parameter shape
    pub shape: Vec<usize>,

    /// Data type
    pub dtype: String,
}

/// Serializable model state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelState {
    pub metadata: ModelMetadata,

    pub parameters: Vec<ParameterInfo>,

    /// Flattened parameter data
    pub data: Vec<f32>,
}

/// Named parameters of a trained classifier
pub struct Model {
    pub metadata: ModelMetadata,

    pub parameters: Vec<(String, Tensor)>,
}

impl Model {
    pub fn new(metadata: ModelMetadata, parameters: Vec<(String, Tensor)>) -> Self {
        Self {
            metadata,
            parameters,
        }
    }

    /// Snapshot the parameters of a classifier
    pub fn from_classifier(name: impl Into<String>, classifier: &dyn Classifier) -> Self {
        let metadata = ModelMetadata::new(name, classifier.kind().as_str())
            .with_custom("input_size", serde_json::json!(classifier.input_size()))
            .with_custom("output_size", serde_json::json!(classifier.output_size()));
        let parameters = classifier
            .param_names()
            .into_iter()
            .zip(classifier.params())
            .map(|(name, tensor)| (name, Tensor::new(tensor.data().clone(), false)))
            .collect();
        Self::new(metadata, parameters)
    }

    /// Get parameter by name
    pub fn get_parameter(&self, name: &str) -> Option<&Tensor> {
        self.parameters
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| t)
    }

    /// Copy the stored values into a classifier of the same architecture
    pub fn restore_into(&self, classifier: &mut dyn Classifier) -> Result<()> {
        if self.metadata.architecture != classifier.kind().as_str() {
            return Err(Error::Serialization(format!(
                "artifact holds a {} model, not {}",
                self.metadata.architecture,
                classifier.kind()
            )));
        }
        let values = classifier
            .param_names()
            .iter()
            .map(|name| {
                self.get_parameter(name)
                    .map(|t| t.data().clone())
                    .ok_or_else(|| Error::Serialization(format!("missing parameter '{name}'")))
            })
            .collect::<Result<Vec<Array1<f32>>>>()?;
        classifier.load_values(&values)
    }

    /// Convert model to serializable state
    pub fn to_state(&self) -> ModelState {
        let mut data = Vec::new();
        let parameters = self
            .parameters
            .iter()
            .map(|(name, tensor)| {
                data.extend(tensor.data().iter().copied());
                ParameterInfo {
                    name: name.clone(),
                    shape: vec![tensor.len()],
                    dtype: "f32".to_string(),
                }
            })
            .collect();

        ModelState {
            metadata: self.metadata.clone(),
            parameters,
            data,
        }
    }

    /// Create model from serializable state
    pub fn from_state(state: ModelState) -> Result<Self> {
        let total: usize = state
            .parameters
            .iter()
            .map(|p| p.shape.iter().product::<usize>())
            .sum();
        if total != state.data.len() {
            return Err(Error::ShapeMismatch {
                expected: vec![total],
                got: vec![state.data.len()],
            });
        }

        let mut offset = 0;
        let parameters = state
            .parameters
            .into_iter()
            .map(|info| {
                let size: usize = info.shape.iter().product();
                let values = state.data[offset..offset + size].to_vec();
                offset += size;
                (info.name, Tensor::from_vec(values, false))
            })
            .collect();

        Ok(Self::new(state.metadata, parameters))
    }
}

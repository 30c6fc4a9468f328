//! Model saving functionality

use byteorder::{ByteOrder, LittleEndian};
use safetensors::tensor::{Dtype, TensorView};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use super::format::{ModelFormat, SaveConfig};
use super::model::Model;
use crate::error::{Error, Result};

/// Replace `path` with `bytes` so readers never observe a partial file
///
/// The bytes go to a sibling temp file which is synced and then renamed over
/// the target.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::InvalidParameter(format!("not a file path: {}", path.display())))?;
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));

    let mut file = fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp, path)?;
    Ok(())
}

/// Save a model to a file
///
/// ```no_run
/// use foldwise::io::{save_model, Model, ModelFormat, ModelMetadata, SaveConfig};
/// use foldwise::Tensor;
///
/// let params = vec![("linear.bias".to_string(), Tensor::from_vec(vec![0.0, 0.1], false))];
/// let model = Model::new(ModelMetadata::new("1-fold", "linear"), params);
///
/// save_model(&model, "model.json", &SaveConfig::new(ModelFormat::Json)).unwrap();
/// ```
pub fn save_model(model: &Model, path: impl AsRef<Path>, config: &SaveConfig) -> Result<()> {
    let path = path.as_ref();
    let state = model.to_state();

    let bytes = match config.format {
        ModelFormat::SafeTensors => to_safetensors(model)?,
        ModelFormat::Json => {
            let text = if config.pretty {
                serde_json::to_string_pretty(&state)
            } else {
                serde_json::to_string(&state)
            };
            text.map_err(|e| Error::Serialization(format!("JSON serialization failed: {e}")))?
                .into_bytes()
        }
        ModelFormat::Yaml => serde_yaml::to_string(&state)
            .map_err(|e| Error::Serialization(format!("YAML serialization failed: {e}")))?
            .into_bytes(),
    };

    write_atomic(path, &bytes)
}

/// Encode a model in SafeTensors format (HuggingFace compatible)
fn to_safetensors(model: &Model) -> Result<Vec<u8>> {
    let tensor_data: Vec<(String, Vec<u8>, Vec<usize>)> = model
        .parameters
        .iter()
        .map(|(name, tensor)| {
            let values: Vec<f32> = tensor.data().iter().copied().collect();
            let mut bytes = vec![0u8; values.len() * 4];
            LittleEndian::write_f32_into(&values, &mut bytes);
            (name.clone(), bytes, vec![values.len()])
        })
        .collect();

    let views = tensor_data
        .iter()
        .map(|(name, bytes, shape)| {
            TensorView::new(Dtype::F32, shape.clone(), bytes)
                .map(|view| (name.as_str(), view))
                .map_err(|e| Error::Serialization(format!("SafeTensors view failed: {e}")))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut metadata = HashMap::new();
    metadata.insert("name".to_string(), model.metadata.name.clone());
    metadata.insert(
        "architecture".to_string(),
        model.metadata.architecture.clone(),
    );
    metadata.insert("version".to_string(), model.metadata.version.clone());
    for (key, value) in &model.metadata.custom {
        metadata.insert(key.clone(), value.to_string());
    }

    safetensors::serialize(views, Some(metadata))
        .map_err(|e| Error::Serialization(format!("SafeTensors serialization failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::ModelMetadata;
    use crate::Tensor;
    use tempfile::TempDir;

    fn model() -> Model {
        let params = vec![
            (
                "linear.weight".to_string(),
                Tensor::from_vec(vec![1.0, 2.0, 3.0], true),
            ),
            ("linear.bias".to_string(), Tensor::from_vec(vec![0.1], false)),
        ];
        Model::new(ModelMetadata::new("test-model", "linear"), params)
    }

    #[test]
    fn test_save_model_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.json");
        save_model(&model(), &path, &SaveConfig::new(ModelFormat::Json)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("test-model"));
        assert!(content.contains("linear.weight"));
        assert!(content.contains('\n'));
    }

    #[test]
    fn test_save_model_json_compact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.json");
        let config = SaveConfig::new(ModelFormat::Json).with_pretty(false);
        save_model(&model(), &path, &config).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
    }

    #[test]
    fn test_save_model_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.yaml");
        save_model(&model(), &path, &SaveConfig::new(ModelFormat::Yaml)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("architecture: linear"));
    }

    #[test]
    fn test_save_safetensors_has_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.safetensors");
        save_model(&model(), &path, &SaveConfig::new(ModelFormat::SafeTensors)).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let header_len = LittleEndian::read_u64(&bytes[..8]) as usize;
        let header = std::str::from_utf8(&bytes[8..8 + header_len]).unwrap();
        assert!(header.contains("linear.weight"));
        assert!(header.contains("F32"));
    }

    #[test]
    fn test_write_atomic_replaces_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sum.csv");
        write_atomic(&path, b"old").unwrap();
        write_atomic(&path, b"new").unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"new");
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_write_atomic_missing_dir_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent").join("sum.csv");
        assert!(write_atomic(&path, b"x").is_err());
    }
}

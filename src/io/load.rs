//! Model loading functionality

use byteorder::{ByteOrder, LittleEndian};
use std::fs;
use std::path::Path;

use super::format::ModelFormat;
use super::model::{Model, ModelMetadata, ModelState};
use crate::error::{Error, Result};
use crate::tensor::Tensor;

/// Load a model from a file
///
/// The format is detected from the file extension.
///
/// ```no_run
/// use foldwise::io::load_model;
///
/// let model = load_model("result/mlp_0/1-fold/model.json").unwrap();
/// println!("Loaded model: {}", model.metadata.name);
/// ```
pub fn load_model(path: impl AsRef<Path>) -> Result<Model> {
    let path = path.as_ref();

    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::Serialization("File has no extension".to_string()))?;
    let format = ModelFormat::from_extension(ext)
        .ok_or_else(|| Error::Serialization(format!("Unsupported file extension: {ext}")))?;

    let state: ModelState = match format {
        ModelFormat::SafeTensors => return from_safetensors(&fs::read(path)?),
        ModelFormat::Json => serde_json::from_str(&fs::read_to_string(path)?)
            .map_err(|e| Error::Serialization(format!("JSON deserialization failed: {e}")))?,
        ModelFormat::Yaml => serde_yaml::from_str(&fs::read_to_string(path)?)
            .map_err(|e| Error::Serialization(format!("YAML deserialization failed: {e}")))?,
    };

    Model::from_state(state)
}

/// Decode a SafeTensors buffer (HuggingFace compatible)
fn from_safetensors(data: &[u8]) -> Result<Model> {
    let (_, header) = safetensors::SafeTensors::read_metadata(data)
        .map_err(|e| Error::Serialization(format!("SafeTensors parsing failed: {e}")))?;

    let mut info = header.metadata().clone().unwrap_or_default();
    let name = info.remove("name").unwrap_or_else(|| "unknown".to_string());
    let architecture = info
        .remove("architecture")
        .unwrap_or_else(|| "unknown".to_string());
    let version = info.remove("version");

    let mut metadata = ModelMetadata::new(name, architecture);
    if let Some(version) = version {
        metadata.version = version;
    }
    for (key, value) in info {
        let value = serde_json::from_str(&value).unwrap_or(serde_json::Value::String(value));
        metadata.custom.insert(key, value);
    }

    let tensors = safetensors::SafeTensors::deserialize(data)
        .map_err(|e| Error::Serialization(format!("SafeTensors parsing failed: {e}")))?;

    let mut parameters = Vec::new();
    for name in tensors.names() {
        let view = tensors
            .tensor(name)
            .map_err(|e| Error::Serialization(format!("SafeTensors tensor '{name}': {e}")))?;
        let bytes = view.data();
        if bytes.len() % 4 != 0 {
            return Err(Error::Serialization(format!(
                "tensor '{name}' is not f32 data"
            )));
        }
        let mut values = vec![0.0f32; bytes.len() / 4];
        LittleEndian::read_f32_into(bytes, &mut values);
        parameters.push((name.to_string(), Tensor::from_vec(values, false)));
    }
    parameters.sort_by(|a, b| a.0.cmp(&b.0));

    Ok(Model::new(metadata, parameters))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{save_model, SaveConfig};
    use crate::model::{build_model, ModelKind, ModelSpec};
    use tempfile::TempDir;

    fn trained() -> Box<dyn crate::model::Classifier> {
        let spec = ModelSpec {
            kind: ModelKind::Mlp,
            hidden_size: 5,
            input_size: None,
        };
        build_model(&spec, Some(3), 4, 11).unwrap()
    }

    fn round_trip(format: ModelFormat) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(format.file_name());
        let clf = trained();
        let original = Model::from_classifier("2-fold", clf.as_ref());
        save_model(&original, &path, &SaveConfig::new(format)).unwrap();

        let loaded = load_model(&path).unwrap();
        assert_eq!(loaded.metadata.name, "2-fold");
        assert_eq!(loaded.metadata.architecture, "mlp");
        assert_eq!(loaded.metadata.custom["input_size"], serde_json::json!(3));

        let spec = ModelSpec {
            kind: ModelKind::Mlp,
            hidden_size: 5,
            input_size: None,
        };
        let mut fresh = build_model(&spec, Some(3), 4, 0).unwrap();
        loaded.restore_into(fresh.as_mut()).unwrap();
        assert_eq!(fresh.values(), clf.values());
    }

    #[test]
    fn test_json_round_trip() {
        round_trip(ModelFormat::Json);
    }

    #[test]
    fn test_yaml_round_trip() {
        round_trip(ModelFormat::Yaml);
    }

    #[test]
    fn test_safetensors_round_trip() {
        round_trip(ModelFormat::SafeTensors);
    }

    #[test]
    fn test_load_unsupported_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.bin");
        std::fs::write(&path, b"data").unwrap();
        assert!(matches!(load_model(&path), Err(Error::Serialization(_))));
    }

    #[test]
    fn test_load_malformed_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(load_model(&path).is_err());
    }
}

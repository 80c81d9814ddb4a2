//! Tagged-field container backing the persisted model file.
//!
//! A model file is a flat JSON object: each top-level key is a tag and its
//! value may be an integer, a float, an array of floats or an arbitrary
//! nested blob (a classifier's native state, for instance). Readers look up
//! the tags they need and ignore the rest, so the classifier stage and the
//! feature extractor stage can each read their own fields without knowing
//! the other's schema.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// Integer tag holding the classifier family discriminator.
pub const CLASSIFIER_TYPE_TAG: &str = "classifier_type";
/// Blob tag holding the classifier's native state.
pub const CLASSIFIER_MODEL_TAG: &str = "classifier_model";
/// Integer tag holding the feature extractor discriminator.
pub const FEATURE_ID_TAG: &str = "feature_id";
/// Float array tag holding the feature extractor parameters.
pub const FEATURE_PARAMS_TAG: &str = "feature_params";
/// Optional scalar tag holding the random seed used for training.
pub const RANDOM_SEED_TAG: &str = "random_seed";

#[derive(Debug, thiserror::Error)]
pub enum ModelFileError {
    #[error("could not access model file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("model file {} is not a valid tagged-field file: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("could not load the '{0}' tag from file")]
    MissingTag(String),
    #[error("tag '{tag}' does not hold {expected}")]
    InvalidTag { tag: String, expected: &'static str },
    #[error("could not encode tag '{tag}': {source}")]
    Encode {
        tag: String,
        #[source]
        source: serde_json::Error,
    },
}

/// In-memory view of a model file: an ordered map of named fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelFile {
    fields: Map<String, Value>,
}

impl ModelFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads an existing model file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ModelFileError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ModelFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &text)
    }

    /// Reads an existing model file, or starts an empty one if the file does
    /// not exist yet. Used when new tags are appended to a file.
    pub fn open_or_default(path: impl AsRef<Path>) -> Result<Self, ModelFileError> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(text) => Self::parse(path, &text),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self::new()),
            Err(source) => Err(ModelFileError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn parse(path: &Path, text: &str) -> Result<Self, ModelFileError> {
        let value: Value = serde_json::from_str(text).map_err(|source| ModelFileError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            _ => Err(ModelFileError::InvalidTag {
                tag: "<root>".to_string(),
                expected: "a map of tagged fields",
            }),
        }
    }

    /// Writes every field to `path`, replacing any previous content.
    ///
    /// The content goes to a sibling temporary file first and is renamed over
    /// the destination, so readers never observe a half-written model.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), ModelFileError> {
        let path = path.as_ref();
        let io_err = |source: io::Error| ModelFileError::Io {
            path: path.to_path_buf(),
            source,
        };
        let text = serde_json::to_string_pretty(&self.fields).map_err(|source| {
            ModelFileError::Encode {
                tag: "<root>".to_string(),
                source,
            }
        })?;

        let mut tmp_name = path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        tmp_name.push(".tmp");
        let tmp_path = path.with_file_name(tmp_name);

        fs::write(&tmp_path, text).map_err(io_err)?;
        fs::rename(&tmp_path, path).map_err(io_err)?;
        debug!("Wrote {} tags to {:?}", self.fields.len(), path);
        Ok(())
    }

    /// Adds this file's tags to whatever is already stored at `path`.
    /// Existing tags with other names are left untouched.
    pub fn append_to(&self, path: impl AsRef<Path>) -> Result<(), ModelFileError> {
        let path = path.as_ref();
        let mut existing = Self::open_or_default(path)?;
        existing.merge(self.clone());
        existing.write(path)
    }

    /// Copies every tag of `other` into `self`, overwriting same-named tags.
    pub fn merge(&mut self, other: ModelFile) {
        self.fields.extend(other.fields);
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.fields.contains_key(tag)
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn remove(&mut self, tag: &str) -> Option<Value> {
        self.fields.remove(tag)
    }

    pub fn set_int(&mut self, tag: &str, value: i64) {
        self.fields.insert(tag.to_string(), Value::from(value));
    }

    pub fn set_u64(&mut self, tag: &str, value: u64) {
        self.fields.insert(tag.to_string(), Value::from(value));
    }

    pub fn set_float(&mut self, tag: &str, value: f64) {
        self.fields.insert(tag.to_string(), Value::from(value));
    }

    pub fn set_floats(&mut self, tag: &str, values: &[f32]) {
        let array = values.iter().map(|&v| Value::from(f64::from(v))).collect();
        self.fields.insert(tag.to_string(), Value::Array(array));
    }

    pub fn set_value(&mut self, tag: &str, value: Value) {
        self.fields.insert(tag.to_string(), value);
    }

    /// Stores any serializable value as an opaque blob.
    pub fn set_blob<T: Serialize>(&mut self, tag: &str, blob: &T) -> Result<(), ModelFileError> {
        let value = serde_json::to_value(blob).map_err(|source| ModelFileError::Encode {
            tag: tag.to_string(),
            source,
        })?;
        self.set_value(tag, value);
        Ok(())
    }

    pub fn get_value(&self, tag: &str) -> Result<&Value, ModelFileError> {
        self.fields
            .get(tag)
            .ok_or_else(|| ModelFileError::MissingTag(tag.to_string()))
    }

    /// Reads an integer tag. Floats are rejected, even integral ones.
    pub fn get_int(&self, tag: &str) -> Result<i64, ModelFileError> {
        self.get_value(tag)?
            .as_i64()
            .ok_or_else(|| invalid(tag, "an integer"))
    }

    pub fn get_u64(&self, tag: &str) -> Result<u64, ModelFileError> {
        self.get_value(tag)?
            .as_u64()
            .ok_or_else(|| invalid(tag, "an unsigned integer"))
    }

    pub fn get_float(&self, tag: &str) -> Result<f64, ModelFileError> {
        self.get_value(tag)?
            .as_f64()
            .ok_or_else(|| invalid(tag, "a number"))
    }

    pub fn get_floats(&self, tag: &str) -> Result<Vec<f32>, ModelFileError> {
        let array = self
            .get_value(tag)?
            .as_array()
            .ok_or_else(|| invalid(tag, "an array of numbers"))?;
        array
            .iter()
            .map(|v| {
                v.as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| invalid(tag, "an array of numbers"))
            })
            .collect()
    }

    /// Decodes an opaque blob previously stored with [`ModelFile::set_blob`].
    pub fn get_blob<T: DeserializeOwned>(&self, tag: &str) -> Result<T, ModelFileError> {
        let value = self.get_value(tag)?.clone();
        serde_json::from_value(value).map_err(|_| invalid(tag, "a valid blob"))
    }
}

fn invalid(tag: &str, expected: &'static str) -> ModelFileError {
    ModelFileError::InvalidTag {
        tag: tag.to_string(),
        expected,
    }
}

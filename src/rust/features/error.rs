use std::path::PathBuf;

use crate::dataset::DatasetError;
use crate::model_file::ModelFileError;

/// Errors raised by feature extractors and batch extraction.
#[derive(Debug, thiserror::Error)]
pub enum FeatureError {
    #[error("unknown feature id: {0}")]
    UnknownId(i64),
    #[error("trained model for a different feature extractor: expected id {expected}, found {found}")]
    TypeMismatch { expected: i64, found: i64 },
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("invalid feature extractor parameters: {0}")]
    InvalidParams(String),
    #[error("{0} must be trained before extracting features")]
    NotTrained(&'static str),
    #[error("could not train the feature extractor: {0}")]
    Training(String),
    #[error("cannot extract features from an empty dataset")]
    EmptyDataset,
    #[error("first sample image could not be loaded, check image path {}: {source}", .path.display())]
    FirstSample {
        path: PathBuf,
        #[source]
        source: DatasetError,
    },
    #[error("sample {index} ({}) could not be loaded: {source}", .path.display())]
    Sample {
        index: usize,
        path: PathBuf,
        #[source]
        source: DatasetError,
    },
    #[error("sample {index} produced {found} features, expected {expected}")]
    WidthMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error(transparent)]
    ModelFile(#[from] ModelFileError),
}

use crate::model_file::ModelFileError;

/// Represents the different types of errors that can occur while building,
/// training, using or restoring a classifier.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    /// The persisted classifier type tag names no known family
    #[error("unknown classifier id: {0}")]
    UnknownId(i64),
    /// Prediction or persistence was requested before training
    #[error("the classifier has not been trained")]
    NotTrained,
    /// Feature matrix or label vector has the wrong shape or content
    #[error("invalid classifier input: {0}")]
    InvalidInput(String),
    /// A hyperparameter is out of range
    #[error("invalid classifier parameters: {0}")]
    InvalidParams(String),
    /// Training finished without producing a usable model
    #[error("classifier training failed: {0}")]
    Training(String),
    /// Restored native state is structurally inconsistent
    #[error("corrupt classifier state: {0}")]
    Corrupt(String),
    /// The native state could not be serialized
    #[error("could not encode the classifier state: {0}")]
    Encode(#[source] serde_json::Error),
    #[error(transparent)]
    ModelFile(#[from] ModelFileError),
}

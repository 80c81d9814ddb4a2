//! Pollen grain image classification.
//!
//! The pipeline loads a labeled dataset partition, turns every image into a
//! feature vector with a pluggable [`FeatureExtractor`], trains a classifier
//! on the resulting matrix and stores classifier and extractor together in a
//! single model file, from which both can be rebuilt later.
//!
//! # Basic Usage
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use pollen_classifier::{
//!     extract_features, load_model, train_classifier, ClassifierParams, Dataset, FeatureId,
//!     ModelRecord,
//! };
//!
//! let train = Dataset::load("data/pollen", "train")?;
//! let extractor = pollen_classifier::features::create(FeatureId::GreyLevels);
//! let (features, labels) = extract_features(&train, extractor.as_ref())?;
//!
//! let mut classifier = ClassifierParams::default().build(42)?;
//! train_classifier(classifier.as_mut(), features.view(), labels.view())?;
//! ModelRecord::new(classifier.as_ref(), extractor.as_ref())
//!     .with_random_seed(42)
//!     .save("pollen_model.json")?;
//!
//! let model = load_model("pollen_model.json")?;
//! println!("Restored feature extractor {}", model.extractor.name());
//! # Ok(())
//! # }
//! ```

pub mod classifier;
pub mod config;
pub mod dataset;
pub mod features;
pub mod metrics;
pub mod model_file;
pub mod persistence;

pub use classifier::{
    load_classifier_model, load_classifier_model_from_file, predict_labels, save_classifier_model,
    train_classifier, ClassifierError, ClassifierKind, ClassifierParams, StatModel,
};
pub use config::{ExtractionConfig, MissingSamplePolicy};
pub use dataset::{class_label, class_name, save_predictions, Dataset, DatasetError, Sample, CLASS_NAMES};
pub use features::{
    create_by_id, create_from_file, extract_features, extract_features_with, FeatureError,
    FeatureExtractor, FeatureId,
};
pub use metrics::MetricsError;
pub use model_file::{ModelFile, ModelFileError};
pub use persistence::{load_model, model_file_size, LoadedModel, ModelRecord, PersistenceError};

pub fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

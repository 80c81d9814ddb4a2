//! The composite model file: a trained classifier, the feature extractor
//! that produced its training features and auxiliary metadata, written
//! together in one pass.

use std::fs;
use std::io;
use std::path::Path;

use log::info;

use crate::classifier::{load_classifier_model, save_classifier_model, ClassifierError, StatModel};
use crate::features::{create_from_model_file, FeatureError, FeatureExtractor};
use crate::model_file::{ModelFile, ModelFileError, RANDOM_SEED_TAG};

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error(transparent)]
    ModelFile(#[from] ModelFileError),
}

/// Everything that goes into one model file.
#[derive(Debug)]
pub struct ModelRecord<'a> {
    classifier: &'a dyn StatModel,
    extractor: &'a dyn FeatureExtractor,
    random_seed: Option<u64>,
}

impl<'a> ModelRecord<'a> {
    pub fn new(classifier: &'a dyn StatModel, extractor: &'a dyn FeatureExtractor) -> Self {
        Self {
            classifier,
            extractor,
            random_seed: None,
        }
    }

    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    /// Collects the classifier, extractor and metadata tags.
    pub fn to_model_file(&self) -> Result<ModelFile, PersistenceError> {
        let mut file = ModelFile::new();
        save_classifier_model(self.classifier, &mut file)?;
        self.extractor.save(&mut file)?;
        if let Some(seed) = self.random_seed {
            file.set_u64(RANDOM_SEED_TAG, seed);
        }
        Ok(file)
    }

    /// Replaces whatever is stored at `path` with this record.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), PersistenceError> {
        let path = path.as_ref();
        self.to_model_file()?.write(path)?;
        info!(
            "Saved {} classifier and feature extractor {} to {:?}",
            self.classifier.kind(),
            self.extractor.feature_id(),
            path
        );
        Ok(())
    }
}

/// A model file read back into its parts.
#[derive(Debug)]
pub struct LoadedModel {
    pub classifier: Box<dyn StatModel>,
    pub extractor: Box<dyn FeatureExtractor>,
    pub random_seed: Option<u64>,
}

/// Reads the classifier and the extractor stored at `path`.
///
/// Both parts must be present and valid. The seed is optional.
pub fn load_model(path: impl AsRef<Path>) -> Result<LoadedModel, PersistenceError> {
    let file = ModelFile::open(path)?;
    let classifier = load_classifier_model(&file)?;
    let extractor = create_from_model_file(&file)?;
    let random_seed = if file.contains(RANDOM_SEED_TAG) {
        Some(file.get_u64(RANDOM_SEED_TAG)?)
    } else {
        None
    };
    Ok(LoadedModel {
        classifier,
        extractor,
        random_seed,
    })
}

pub fn model_file_size(path: impl AsRef<Path>) -> io::Result<u64> {
    Ok(fs::metadata(path)?.len())
}

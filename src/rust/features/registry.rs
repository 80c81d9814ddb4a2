use std::path::Path;

use log::debug;

use super::{
    FeatureError, FeatureExtractor, FeatureId, GreyLevels, LbpHistogram, MeanStdDevGreyLevels,
};
use crate::model_file::{ModelFile, FEATURE_ID_TAG};

/// Builds a default-configured extractor of the given kind.
pub fn create(id: FeatureId) -> Box<dyn FeatureExtractor> {
    match id {
        FeatureId::GreyLevels => Box::new(GreyLevels::new()),
        FeatureId::MeanStdDevGreyLevels => Box::new(MeanStdDevGreyLevels::new()),
        FeatureId::LbpHistogram => Box::new(LbpHistogram::new()),
    }
}

/// Builds an extractor from its persisted integer discriminator.
///
/// # Arguments
/// * `id` - The discriminator, as stored under the `feature_id` tag
///
/// # Returns
/// * `Result<Box<dyn FeatureExtractor>, FeatureError>` - The extractor, or
///   `UnknownId` when no extractor is registered under `id`
pub fn create_by_id(id: i64) -> Result<Box<dyn FeatureExtractor>, FeatureError> {
    Ok(create(FeatureId::from_id(id)?))
}

/// Reconstructs the extractor stored in the model file at `path`.
pub fn create_from_file(path: impl AsRef<Path>) -> Result<Box<dyn FeatureExtractor>, FeatureError> {
    let path = path.as_ref();
    let file = ModelFile::open(path)?;
    let extractor = create_from_model_file(&file)?;
    debug!("Loaded feature extractor {} from {:?}", extractor.feature_id(), path);
    Ok(extractor)
}

/// Reconstructs an extractor from already parsed model file fields.
pub fn create_from_model_file(file: &ModelFile) -> Result<Box<dyn FeatureExtractor>, FeatureError> {
    let mut extractor = create_by_id(file.get_int(FEATURE_ID_TAG)?)?;
    extractor.load(file)?;
    Ok(extractor)
}

/// Every registered extractor in its default configuration, in id order.
pub fn feature_ids() -> impl Iterator<Item = (FeatureId, Box<dyn FeatureExtractor>)> {
    FeatureId::ALL.into_iter().map(|id| (id, create(id)))
}

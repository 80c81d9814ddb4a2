//! Applies one extractor across a whole dataset partition.

use log::{error, info, warn};
use ndarray::{Array1, Array2};

use super::{FeatureError, FeatureExtractor};
use crate::config::{ExtractionConfig, MissingSamplePolicy};
use crate::dataset::Dataset;

/// Extracts features for every sample with the default [`ExtractionConfig`].
///
/// # Arguments
/// * `dataset` - A non-empty dataset partition
/// * `extractor` - The configured (and trained, if required) extractor
///
/// # Returns
/// * `Result<(Array2<f32>, Array1<i32>), FeatureError>` - One feature row and
///   one label per sample, in dataset order
pub fn extract_features(
    dataset: &Dataset,
    extractor: &dyn FeatureExtractor,
) -> Result<(Array2<f32>, Array1<i32>), FeatureError> {
    extract_features_with(dataset, extractor, &ExtractionConfig::default())
}

/// Extracts features for every sample.
///
/// The first sample fixes the feature width and must load. Samples whose
/// image cannot be read afterwards are handled by
/// `config.missing_sample_policy`; a failure of the extractor itself always
/// aborts the batch.
pub fn extract_features_with(
    dataset: &Dataset,
    extractor: &dyn FeatureExtractor,
    config: &ExtractionConfig,
) -> Result<(Array2<f32>, Array1<i32>), FeatureError> {
    let Some(first) = dataset.samples().first() else {
        return Err(FeatureError::EmptyDataset);
    };
    let image = dataset
        .load_image(0)
        .map_err(|source| FeatureError::FirstSample {
            path: first.path().to_path_buf(),
            source,
        })?;
    let first_features = extractor.extract(&image).map_err(|err| {
        error!("Feature extraction failed on sample 0 ({:?}): {}", first.path(), err);
        err
    })?;
    let width = first_features.len();
    if width == 0 {
        return Err(FeatureError::InvalidImage(format!(
            "{} produced an empty feature vector",
            extractor.name()
        )));
    }

    let mut features = Array2::<f32>::zeros((dataset.len(), width));
    let mut labels = Array1::<i32>::zeros(dataset.len());
    features.row_mut(0).assign(&first_features);
    labels[0] = first.label();

    let mut substituted = 0usize;
    for (index, sample) in dataset.samples().iter().enumerate().skip(1) {
        labels[index] = sample.label();

        let image = match dataset.load_image(index) {
            Ok(image) => image,
            Err(source) => match config.missing_sample_policy {
                MissingSamplePolicy::ZeroFill => {
                    warn!(
                        "Sample {} ({:?}) could not be loaded, using a zero feature vector: {}",
                        index,
                        sample.path(),
                        source
                    );
                    substituted += 1;
                    continue;
                }
                MissingSamplePolicy::Abort => {
                    error!("Sample {} ({:?}) could not be loaded: {}", index, sample.path(), source);
                    return Err(FeatureError::Sample {
                        index,
                        path: sample.path().to_path_buf(),
                        source,
                    });
                }
            },
        };

        let row = extractor.extract(&image).map_err(|err| {
            error!(
                "Feature extraction failed on sample {} ({:?}): {}",
                index,
                sample.path(),
                err
            );
            err
        })?;
        if row.len() != width {
            error!(
                "Sample {} ({:?}) produced {} features instead of {}",
                index,
                sample.path(),
                row.len(),
                width
            );
            return Err(FeatureError::WidthMismatch {
                index,
                expected: width,
                found: row.len(),
            });
        }
        features.row_mut(index).assign(&row);

        if config.progress_interval > 0 && (index + 1) % config.progress_interval == 0 {
            info!("Extracted features for {}/{} samples", index + 1, dataset.len());
        }
    }

    info!(
        "Extracted {} x {} feature matrix ({} samples zero-filled)",
        dataset.len(),
        width,
        substituted
    );
    Ok((features, labels))
}

//! Gray levels standardized with per-pixel statistics learned from the
//! training partition.

use image::GrayImage;
use log::{info, warn};
use ndarray::Array1;

use super::gray_levels::normalized_grey_levels;
use super::{ExtractorBase, FeatureError, FeatureExtractor, FeatureId};
use crate::dataset::Dataset;
use crate::model_file::ModelFile;

const NAME: &str = "Mean/StdDev Standardized Gray Levels Feature Extractor";
const HELP: &str = "  This extractor normalizes the gray levels to [0, 1] and then standardizes every pixel\n  \
                    with the mean and standard deviation learned for that pixel on the training set.\n  \
                    It must be trained.\n  \
                    Parameters: [eps] lower bound for the standard deviation (default 1e-6).\n";

const MEAN_TAG: &str = "feature_mean_stddev_mean";
const STD_TAG: &str = "feature_mean_stddev_std";
const DEFAULT_EPS: f32 = 1e-6;

#[derive(Debug, Clone)]
pub struct MeanStdDevGreyLevels {
    base: ExtractorBase,
    mean: Option<Array1<f32>>,
    std: Option<Array1<f32>>,
}

impl MeanStdDevGreyLevels {
    pub fn new() -> Self {
        Self {
            base: ExtractorBase::new(FeatureId::MeanStdDevGreyLevels, vec![DEFAULT_EPS]),
            mean: None,
            std: None,
        }
    }

    pub fn is_trained(&self) -> bool {
        self.mean.is_some() && self.std.is_some()
    }

    fn eps(&self) -> Result<f32, FeatureError> {
        let eps = self.params().first().copied().unwrap_or(DEFAULT_EPS);
        if eps > 0.0 && eps.is_finite() {
            Ok(eps)
        } else {
            Err(FeatureError::InvalidParams(format!(
                "eps must be a positive number, got {eps}"
            )))
        }
    }
}

impl Default for MeanStdDevGreyLevels {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureExtractor for MeanStdDevGreyLevels {
    fn base(&self) -> &ExtractorBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ExtractorBase {
        &mut self.base
    }

    fn name(&self) -> &'static str {
        NAME
    }

    fn help(&self) -> &'static str {
        HELP
    }

    fn train(&mut self, dataset: &Dataset) -> Result<(), FeatureError> {
        let mut sum: Option<Array1<f64>> = None;
        let mut sum_sq: Option<Array1<f64>> = None;
        let mut count = 0usize;

        for (index, sample) in dataset.samples().iter().enumerate() {
            let image = match dataset.load_image(index) {
                Ok(image) => image,
                Err(err) => {
                    warn!("Skipping sample {} ({:?}) while training: {}", index, sample.path(), err);
                    continue;
                }
            };
            let values = normalized_grey_levels(&image)?.mapv(f64::from);
            match (sum.as_mut(), sum_sq.as_mut()) {
                (Some(sum), Some(sum_sq)) => {
                    if sum.len() != values.len() {
                        return Err(FeatureError::Training(format!(
                            "sample {} has {} pixels, expected {}",
                            index,
                            values.len(),
                            sum.len()
                        )));
                    }
                    *sum += &values;
                    *sum_sq += &values.mapv(|v| v * v);
                }
                _ => {
                    sum_sq = Some(values.mapv(|v| v * v));
                    sum = Some(values);
                }
            }
            count += 1;
        }

        let (Some(sum), Some(sum_sq)) = (sum, sum_sq) else {
            return Err(FeatureError::Training(
                "no readable training images".to_string(),
            ));
        };
        let n = count as f64;
        let mean = sum / n;
        let variance = sum_sq / n - &mean * &mean;
        self.std = Some(variance.mapv(|v| v.max(0.0).sqrt() as f32));
        self.mean = Some(mean.mapv(|v| v as f32));
        info!("Learned pixel statistics from {} training images", count);
        Ok(())
    }

    fn extract(&self, image: &GrayImage) -> Result<Array1<f32>, FeatureError> {
        let (Some(mean), Some(std)) = (&self.mean, &self.std) else {
            return Err(FeatureError::NotTrained(NAME));
        };
        let eps = self.eps()?;
        let values = normalized_grey_levels(image)?;
        if values.len() != mean.len() {
            return Err(FeatureError::InvalidImage(format!(
                "image has {} pixels but the extractor was trained on {}",
                values.len(),
                mean.len()
            )));
        }
        Ok((values - mean) / &std.mapv(|s| s.max(eps)))
    }

    fn save_state(&self, file: &mut ModelFile) -> Result<(), FeatureError> {
        if let (Some(mean), Some(std)) = (&self.mean, &self.std) {
            file.set_floats(MEAN_TAG, &mean.to_vec());
            file.set_floats(STD_TAG, &std.to_vec());
        }
        Ok(())
    }

    fn load_state(&mut self, file: &ModelFile) -> Result<(), FeatureError> {
        if !file.contains(MEAN_TAG) && !file.contains(STD_TAG) {
            self.mean = None;
            self.std = None;
            return Ok(());
        }
        let mean = Array1::from(file.get_floats(MEAN_TAG)?);
        let std = Array1::from(file.get_floats(STD_TAG)?);
        if mean.len() != std.len() {
            return Err(FeatureError::Training(format!(
                "stored mean has {} values but stored std has {}",
                mean.len(),
                std.len()
            )));
        }
        self.mean = Some(mean);
        self.std = Some(std);
        Ok(())
    }
}

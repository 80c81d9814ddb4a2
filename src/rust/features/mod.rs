//! Feature extractors: turn one grayscale image into one feature vector.
//!
//! Every extractor implements [`FeatureExtractor`] and is identified by a
//! [`FeatureId`]. The registry ([`create`], [`create_by_id`],
//! [`create_from_file`]) is the only place that maps ids to concrete types.
//!
//! Adding an extractor means adding a `FeatureId` variant and one arm in
//! [`create`]; nothing else dispatches on the id.

use std::fmt;
use std::path::Path;

use image::GrayImage;
use ndarray::Array1;

use crate::dataset::Dataset;
use crate::model_file::{ModelFile, FEATURE_ID_TAG, FEATURE_PARAMS_TAG};

mod batch;
mod error;
pub mod gray_levels;
pub mod lbp;
pub mod mean_stddev;
mod registry;

pub use batch::{extract_features, extract_features_with};
pub use error::FeatureError;
pub use gray_levels::{normalized_grey_levels, GreyLevels};
pub use lbp::LbpHistogram;
pub use mean_stddev::MeanStdDevGreyLevels;
pub use registry::{create, create_by_id, create_from_file, create_from_model_file, feature_ids};

/// Type discriminator of a feature extractor, persisted as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureId {
    GreyLevels = 0,
    MeanStdDevGreyLevels = 1,
    LbpHistogram = 2,
}

impl FeatureId {
    /// Every registered extractor, in id order.
    pub const ALL: [FeatureId; 3] = [
        FeatureId::GreyLevels,
        FeatureId::MeanStdDevGreyLevels,
        FeatureId::LbpHistogram,
    ];

    pub fn from_id(id: i64) -> Result<Self, FeatureError> {
        Self::ALL
            .into_iter()
            .find(|feature| feature.id() == id)
            .ok_or(FeatureError::UnknownId(id))
    }

    pub fn id(self) -> i64 {
        self as i64
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// State shared by every extractor: its discriminator and parameter list.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractorBase {
    id: FeatureId,
    params: Vec<f32>,
}

impl ExtractorBase {
    pub fn new(id: FeatureId, default_params: Vec<f32>) -> Self {
        Self {
            id,
            params: default_params,
        }
    }
}

/// The extractor contract.
///
/// Implementors provide [`base`](FeatureExtractor::base), the descriptive
/// strings and [`extract`](FeatureExtractor::extract). Extractors that must
/// be fitted override [`train`](FeatureExtractor::train) and persist what
/// they learned through [`save_state`](FeatureExtractor::save_state) and
/// [`load_state`](FeatureExtractor::load_state), using their own
/// `feature_<variant>_*` tags.
pub trait FeatureExtractor: fmt::Debug {
    fn base(&self) -> &ExtractorBase;

    fn base_mut(&mut self) -> &mut ExtractorBase;

    fn name(&self) -> &'static str;

    /// Describes the extractor and its parameters.
    fn help(&self) -> &'static str;

    /// Extracts a non-empty feature vector from a non-empty image.
    ///
    /// For a fixed configuration every image of the same size yields a
    /// vector of the same length.
    fn extract(&self, image: &GrayImage) -> Result<Array1<f32>, FeatureError>;

    fn feature_id(&self) -> FeatureId {
        self.base().id
    }

    fn params(&self) -> &[f32] {
        &self.base().params
    }

    /// Replaces the parameter list. An empty list keeps the current one.
    fn set_params(&mut self, params: &[f32]) {
        if !params.is_empty() {
            self.base_mut().params = params.to_vec();
        }
    }

    fn train(&mut self, _dataset: &Dataset) -> Result<(), FeatureError> {
        Ok(())
    }

    fn save_state(&self, _file: &mut ModelFile) -> Result<(), FeatureError> {
        Ok(())
    }

    fn load_state(&mut self, _file: &ModelFile) -> Result<(), FeatureError> {
        Ok(())
    }

    /// Writes the id, the parameters and any trained state into `file`.
    fn save(&self, file: &mut ModelFile) -> Result<(), FeatureError> {
        file.set_int(FEATURE_ID_TAG, self.feature_id().id());
        file.set_floats(FEATURE_PARAMS_TAG, self.params());
        self.save_state(file)
    }

    /// Restores parameters and trained state from `file`.
    ///
    /// Fails without touching `self` if the stored id belongs to another
    /// extractor or a required tag is missing.
    fn load(&mut self, file: &ModelFile) -> Result<(), FeatureError> {
        let found = file.get_int(FEATURE_ID_TAG)?;
        let expected = self.feature_id().id();
        if found != expected {
            return Err(FeatureError::TypeMismatch { expected, found });
        }
        let params = file.get_floats(FEATURE_PARAMS_TAG)?;
        self.load_state(file)?;
        self.base_mut().params = params;
        Ok(())
    }

    /// Appends this extractor's tags to the model file at `path`.
    fn save_model(&self, path: &Path) -> Result<(), FeatureError> {
        let mut file = ModelFile::new();
        self.save(&mut file)?;
        file.append_to(path)?;
        Ok(())
    }

    fn load_model(&mut self, path: &Path) -> Result<(), FeatureError> {
        let file = ModelFile::open(path)?;
        self.load(&file)
    }
}

/// Rejects images an extractor cannot work on.
pub(crate) fn check_image(image: &GrayImage) -> Result<(), FeatureError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(FeatureError::InvalidImage(format!(
            "empty image ({}x{})",
            image.width(),
            image.height()
        )));
    }
    Ok(())
}

/// Parses a parameter list written as `v1:v2:...` or `v1 v2 ...`.
///
/// NaN and infinities are rejected: the model file cannot hold them.
pub fn parse_params(text: &str) -> Result<Vec<f32>, FeatureError> {
    text.split(|c: char| c == ':' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .map(|token| {
            token
                .parse::<f32>()
                .ok()
                .filter(|value| value.is_finite())
                .ok_or_else(|| FeatureError::InvalidParams(format!("'{token}' is not a finite number")))
        })
        .collect()
}

/// Displays a parameter list as `[ v1 v2 ... ]`.
pub struct Params<'a>(pub &'a [f32]);

impl fmt::Display for Params<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for value in self.0 {
            write!(f, " {value}")?;
        }
        write!(f, " ]")
    }
}

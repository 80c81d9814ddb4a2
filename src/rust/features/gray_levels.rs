use image::GrayImage;
use ndarray::Array1;

use super::{check_image, ExtractorBase, FeatureError, FeatureExtractor, FeatureId};

const NAME: &str = "Gray Levels Feature Extractor";
const HELP: &str = "  This extractor normalizes the gray levels of the input image to the range [0, 1] and\n  \
                    returns the normalized pixel values as a row vector.\n  \
                    Parameters: None.\n";

/// Min-max normalized pixel intensities, flattened row-major.
#[derive(Debug, Clone)]
pub struct GreyLevels {
    base: ExtractorBase,
}

impl GreyLevels {
    pub fn new() -> Self {
        Self {
            base: ExtractorBase::new(FeatureId::GreyLevels, Vec::new()),
        }
    }
}

impl Default for GreyLevels {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureExtractor for GreyLevels {
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

    fn extract(&self, image: &GrayImage) -> Result<Array1<f32>, FeatureError> {
        normalized_grey_levels(image)
    }
}

/// Rescales intensities so the darkest pixel maps to 0.0 and the brightest
/// to 1.0, returning a `width * height` vector. A constant image maps to all
/// zeros.
pub fn normalized_grey_levels(image: &GrayImage) -> Result<Array1<f32>, FeatureError> {
    check_image(image)?;
    let pixels = image.as_raw();
    let (min, max) = pixels
        .iter()
        .fold((u8::MAX, u8::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));

    if min == max {
        return Ok(Array1::zeros(pixels.len()));
    }
    let range = f32::from(max - min);
    Ok(pixels
        .iter()
        .map(|&v| f32::from(v - min) / range)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_normalization() {
        let image = GrayImage::from_raw(2, 2, vec![10, 20, 30, 50]).unwrap();
        let features = GreyLevels::new().extract(&image).unwrap();
        assert_eq!(features.to_vec(), vec![0.0, 0.25, 0.5, 1.0]);
    }

    #[test]
    fn test_row_major_order() {
        let mut image = GrayImage::new(3, 2);
        image.put_pixel(2, 0, Luma([255]));
        let features = normalized_grey_levels(&image).unwrap();
        assert_eq!(features.len(), 6);
        assert_eq!(features[2], 1.0);
        assert_eq!(features.sum(), 1.0);
    }

    #[test]
    fn test_constant_image_is_all_zeros() {
        let image = GrayImage::from_pixel(2, 2, Luma([200]));
        let features = normalized_grey_levels(&image).unwrap();
        assert_eq!(features.to_vec(), vec![0.0; 4]);
    }

    #[test]
    fn test_repeated_extraction_is_stable() {
        let image = GrayImage::from_fn(8, 5, |x, y| Luma([(x * 13 + y * 7) as u8]));
        let extractor = GreyLevels::new();
        let first = extractor.extract(&image).unwrap();
        let second = extractor.extract(&image).unwrap();
        assert_eq!(first.len(), 40);
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_image_is_rejected() {
        let image = GrayImage::new(0, 0);
        assert!(matches!(
            normalized_grey_levels(&image),
            Err(FeatureError::InvalidImage(_))
        ));
    }

    #[test]
    fn test_identity() {
        let extractor = GreyLevels::default();
        assert_eq!(extractor.feature_id(), FeatureId::GreyLevels);
        assert!(extractor.params().is_empty());
        assert!(extractor.help().contains("Parameters: None"));
    }
}

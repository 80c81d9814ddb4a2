use image::GrayImage;
use ndarray::Array1;

use super::{check_image, ExtractorBase, FeatureError, FeatureExtractor, FeatureId};

const NAME: &str = "LBP Histogram Feature Extractor";
const HELP: &str = "  This extractor computes the 8-neighbour local binary pattern of every interior pixel,\n  \
                    splits the image into a grid of cells and concatenates one normalized\n  \
                    256-bin histogram per cell.\n  \
                    Parameters: [cells] number of cells per side (default 4).\n";

const DEFAULT_CELLS: f32 = 4.0;
const BINS: usize = 256;

/// Neighbour offsets, clockwise from the top-left corner. Bit `i` of a code
/// is set when neighbour `i` is at least as bright as the centre.
const NEIGHBOURS: [(i64, i64); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
];

#[derive(Debug, Clone)]
pub struct LbpHistogram {
    base: ExtractorBase,
}

impl LbpHistogram {
    pub fn new() -> Self {
        Self {
            base: ExtractorBase::new(FeatureId::LbpHistogram, vec![DEFAULT_CELLS]),
        }
    }

    fn cells(&self) -> Result<usize, FeatureError> {
        let cells = self.params().first().copied().unwrap_or(DEFAULT_CELLS);
        if cells >= 1.0 && cells.fract() == 0.0 && cells.is_finite() {
            Ok(cells as usize)
        } else {
            Err(FeatureError::InvalidParams(format!(
                "cells must be a positive integer, got {cells}"
            )))
        }
    }
}

impl Default for LbpHistogram {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureExtractor for LbpHistogram {
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
        check_image(image)?;
        let cells = self.cells()?;
        let (width, height) = (image.width() as usize, image.height() as usize);
        if width < 3 || height < 3 {
            return Err(FeatureError::InvalidImage(format!(
                "LBP needs at least 3x3 pixels, got {width}x{height}"
            )));
        }
        let (inner_width, inner_height) = (width - 2, height - 2);
        if cells > inner_width || cells > inner_height {
            return Err(FeatureError::InvalidImage(format!(
                "{inner_width}x{inner_height} interior pixels cannot be split into {cells}x{cells} cells"
            )));
        }

        let mut histograms = vec![0.0f32; cells * cells * BINS];
        for y in 1..height - 1 {
            for x in 1..width - 1 {
                let code = lbp_code(image, x as i64, y as i64);
                let cell_x = (x - 1) * cells / inner_width;
                let cell_y = (y - 1) * cells / inner_height;
                histograms[(cell_y * cells + cell_x) * BINS + code] += 1.0;
            }
        }
        for histogram in histograms.chunks_mut(BINS) {
            let total: f32 = histogram.iter().sum();
            if total > 0.0 {
                histogram.iter_mut().for_each(|bin| *bin /= total);
            }
        }
        Ok(Array1::from(histograms))
    }
}

fn lbp_code(image: &GrayImage, x: i64, y: i64) -> usize {
    let centre = image.get_pixel(x as u32, y as u32).0[0];
    NEIGHBOURS
        .iter()
        .enumerate()
        .fold(0usize, |code, (bit, &(dx, dy))| {
            let neighbour = image.get_pixel((x + dx) as u32, (y + dy) as u32).0[0];
            if neighbour >= centre {
                code | (1 << bit)
            } else {
                code
            }
        })
}

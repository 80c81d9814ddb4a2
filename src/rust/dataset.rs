//! Labeled image manifests for the pollen dataset.
//!
//! A dataset partition is described by `<folder>/<set_name>.csv`: a header
//! line followed by `<image-path>,<label-name>` rows. Image paths are
//! relative to the dataset folder and label names are looked up in the fixed
//! [`CLASS_NAMES`] table.

use std::fs::File;
use std::io;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::GrayImage;
use log::debug;
use ndarray::Array1;

/// Pollen classes, indexed by label. The last entry is the catch-all.
pub const CLASS_NAMES: [&str; 16] = [
    "alnus",
    "betula",
    "carpinus",
    "corylus",
    "cupressaceae",
    "fagus",
    "fraxinus",
    "picea",
    "pinus",
    "poaceae",
    "populus",
    "quercus",
    "salix",
    "tilia",
    "urticaceae",
    "unknown",
];

/// Standard image size of the pollen dataset (width, height).
pub const DEFAULT_IMAGE_SIZE: (u32, u32) = (128, 128);

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("could not open {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed manifest {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("class name \"{0}\" not found in the class table")]
    UnknownLabel(String),
    #[error("label {0} is not a valid class index")]
    InvalidLabel(i32),
    #[error("sample index {index} is out of range for a dataset of {len} samples")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("could not read image {}: {source}", .path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("image {} is empty", .0.display())]
    EmptyImage(PathBuf),
    #[error("got {predictions} predicted labels for {samples} samples")]
    PredictionCount { predictions: usize, samples: usize },
}

/// Returns the class index of `name`. Matching is exact and case-sensitive.
pub fn class_label(name: &str) -> Result<i32, DatasetError> {
    CLASS_NAMES
        .iter()
        .position(|&class| class == name)
        .map(|index| index as i32)
        .ok_or_else(|| DatasetError::UnknownLabel(name.to_string()))
}

pub fn class_name(label: i32) -> Result<&'static str, DatasetError> {
    usize::try_from(label)
        .ok()
        .and_then(|index| CLASS_NAMES.get(index).copied())
        .ok_or(DatasetError::InvalidLabel(label))
}

/// One image reference and its class label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    path: PathBuf,
    label: i32,
}

impl Sample {
    pub fn new(path: impl Into<PathBuf>, label: i32) -> Result<Self, DatasetError> {
        class_name(label)?;
        Ok(Self {
            path: path.into(),
            label,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn label(&self) -> i32 {
        self.label
    }
}

/// An ordered, read-only list of samples. Images are decoded on demand.
#[derive(Debug, Clone)]
pub struct Dataset {
    samples: Vec<Sample>,
    image_size: Option<(u32, u32)>,
}

impl Dataset {
    /// Loads the manifest `<folder>/<set_name>.csv`.
    pub fn load(folder: impl AsRef<Path>, set_name: &str) -> Result<Self, DatasetError> {
        let folder = folder.as_ref();
        let manifest = folder.join(format!("{set_name}.csv"));
        Self::from_manifest(&manifest, folder)
    }

    /// Parses a manifest file, resolving image paths against `folder`.
    pub fn from_manifest(manifest: &Path, folder: &Path) -> Result<Self, DatasetError> {
        let file = File::open(manifest).map_err(|source| DatasetError::Io {
            path: manifest.to_path_buf(),
            source,
        })?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(BufReader::new(file));

        let mut samples = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|source| DatasetError::Csv {
                path: manifest.to_path_buf(),
                source,
            })?;
            if record.len() < 2 {
                continue;
            }
            let last = record.len() - 1;
            let label = &record[last];
            // A path with unquoted commas is split across fields; glue it back.
            let image = record
                .iter()
                .take(last)
                .collect::<Vec<_>>()
                .join(",");
            let image = image.trim_matches('"');
            if image.is_empty() || label.is_empty() {
                continue;
            }
            samples.push(Sample::new(folder.join(image), class_label(label)?)?);
        }

        debug!("Loaded {} samples from {:?}", samples.len(), manifest);
        Ok(Self::from_samples(samples))
    }

    pub fn from_samples(samples: Vec<Sample>) -> Self {
        Self {
            samples,
            image_size: Some(DEFAULT_IMAGE_SIZE),
        }
    }

    /// Sets the size every decoded image is resized to. `None` keeps the
    /// native size of each image file.
    pub fn with_image_size(mut self, image_size: Option<(u32, u32)>) -> Self {
        self.image_size = image_size;
        self
    }

    pub fn image_size(&self) -> Option<(u32, u32)> {
        self.image_size
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn sample(&self, index: usize) -> Result<&Sample, DatasetError> {
        self.samples.get(index).ok_or(DatasetError::IndexOutOfRange {
            index,
            len: self.samples.len(),
        })
    }

    pub fn labels(&self) -> Array1<i32> {
        self.samples.iter().map(Sample::label).collect()
    }

    /// Decodes the image of sample `index` as 8-bit grayscale.
    pub fn load_image(&self, index: usize) -> Result<GrayImage, DatasetError> {
        load_grey_image(self.sample(index)?.path(), self.image_size)
    }
}

/// Decodes `path` as an 8-bit grayscale image, resizing it when `size` is
/// given and differs from the decoded dimensions.
pub fn load_grey_image(path: &Path, size: Option<(u32, u32)>) -> Result<GrayImage, DatasetError> {
    let image = image::open(path)
        .map_err(|source| DatasetError::Image {
            path: path.to_path_buf(),
            source,
        })?
        .to_luma8();
    if image.width() == 0 || image.height() == 0 {
        return Err(DatasetError::EmptyImage(path.to_path_buf()));
    }
    match size {
        Some((width, height)) if image.dimensions() != (width, height) => {
            Ok(imageops::resize(&image, width, height, FilterType::Triangle))
        }
        _ => Ok(image),
    }
}

/// Writes one `<image-basename>,<class-name>` row per sample.
///
/// `header` is written first when given, e.g. `&["sample", "species"]`.
pub fn save_predictions(
    dataset: &Dataset,
    predicted_labels: &Array1<i32>,
    path: impl AsRef<Path>,
    header: Option<&[&str]>,
) -> Result<(), DatasetError> {
    let path = path.as_ref();
    if predicted_labels.len() != dataset.len() {
        return Err(DatasetError::PredictionCount {
            predictions: predicted_labels.len(),
            samples: dataset.len(),
        });
    }
    let names = predicted_labels
        .iter()
        .map(|&label| class_name(label))
        .collect::<Result<Vec<_>, _>>()?;
    let csv_err = |source: csv::Error| DatasetError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(csv_err)?;
    if let Some(header) = header {
        writer.write_record(header).map_err(csv_err)?;
    }
    for (sample, name) in dataset.samples().iter().zip(names) {
        let basename = sample
            .path()
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        writer
            .write_record([basename.as_str(), name])
            .map_err(csv_err)?;
    }
    writer.flush().map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

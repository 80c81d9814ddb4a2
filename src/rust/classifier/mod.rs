//! Trainable classifiers and their persisted form.
//!
//! Three families implement [`StatModel`]: [`KNearest`], [`Svm`] and
//! [`RTrees`]. Every instance reports its own [`ClassifierKind`], which is
//! stored under the `classifier_type` tag next to the family's native state
//! so that a model file can be turned back into the right family without
//! knowing in advance which one trained it.

use std::fmt;
use std::path::Path;

use log::info;
use ndarray::{Array1, ArrayView1, ArrayView2};

use crate::model_file::{ModelFile, CLASSIFIER_MODEL_TAG, CLASSIFIER_TYPE_TAG};

mod error;
pub mod knn;
pub mod rtrees;
pub mod svm;

pub use error::ClassifierError;
pub use knn::KNearest;
pub use rtrees::{RTrees, RTreesParams};
pub use svm::{Svm, SvmKernel, SvmParams};

/// Classifier family discriminator, persisted as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassifierKind {
    KNearest = 0,
    Svm = 1,
    RTrees = 2,
}

impl ClassifierKind {
    pub const ALL: [ClassifierKind; 3] = [
        ClassifierKind::KNearest,
        ClassifierKind::Svm,
        ClassifierKind::RTrees,
    ];

    pub fn from_id(id: i64) -> Result<Self, ClassifierError> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.id() == id)
            .ok_or(ClassifierError::UnknownId(id))
    }

    pub fn id(self) -> i64 {
        self as i64
    }

    pub fn name(self) -> &'static str {
        match self {
            ClassifierKind::KNearest => "K-NN",
            ClassifierKind::Svm => "SVM",
            ClassifierKind::RTrees => "RTrees",
        }
    }
}

impl fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A classifier trained once on a feature matrix and frozen afterwards.
pub trait StatModel: fmt::Debug {
    /// The family this instance belongs to.
    fn kind(&self) -> ClassifierKind;

    /// Fits the model on one feature row per sample and one label per row.
    fn train(&mut self, samples: ArrayView2<f32>, labels: ArrayView1<i32>) -> Result<(), ClassifierError>;

    fn is_trained(&self) -> bool;

    /// Checks that restored state is consistent enough to predict with.
    fn validate(&self) -> Result<(), ClassifierError>;

    /// Predicts one class label per row of `samples`.
    fn predict(&self, samples: ArrayView2<f32>) -> Result<Array1<i32>, ClassifierError>;

    /// One-line summary of the hyperparameters.
    fn describe(&self) -> String;

    /// Native state, stored under the `classifier_model` tag.
    fn to_blob(&self) -> Result<serde_json::Value, ClassifierError>;
}

/// Hyperparameters of every family, and which family to build.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifierParams {
    pub kind: ClassifierKind,
    pub knn_k: usize,
    pub svm: SvmParams,
    pub rtrees: RTreesParams,
}

impl Default for ClassifierParams {
    fn default() -> Self {
        Self {
            kind: ClassifierKind::KNearest,
            knn_k: 1,
            svm: SvmParams::default(),
            rtrees: RTreesParams::default(),
        }
    }
}

impl ClassifierParams {
    /// Creates an untrained classifier of the selected family.
    ///
    /// # Arguments
    /// * `seed` - Seeds the randomized families (SVM, RTrees)
    ///
    /// # Returns
    /// * `Result<Box<dyn StatModel>, ClassifierError>` - The classifier, or
    ///   `InvalidParams` if a hyperparameter is out of range
    pub fn build(&self, seed: u64) -> Result<Box<dyn StatModel>, ClassifierError> {
        let classifier: Box<dyn StatModel> = match self.kind {
            ClassifierKind::KNearest => Box::new(KNearest::new(self.knn_k)?),
            ClassifierKind::Svm => Box::new(Svm::new(self.svm, seed)?),
            ClassifierKind::RTrees => Box::new(RTrees::new(self.rtrees, seed)?),
        };
        info!("Using a {}", classifier.describe());
        Ok(classifier)
    }
}

/// Trains `classifier` and checks that it reports itself trained.
pub fn train_classifier(
    classifier: &mut dyn StatModel,
    samples: ArrayView2<f32>,
    labels: ArrayView1<i32>,
) -> Result<(), ClassifierError> {
    info!(
        "Training a {} classifier on {} samples with {} features",
        classifier.kind(),
        samples.nrows(),
        samples.ncols()
    );
    classifier.train(samples, labels)?;
    if !classifier.is_trained() {
        return Err(ClassifierError::Training(format!(
            "the {} classifier did not report itself trained",
            classifier.kind()
        )));
    }
    Ok(())
}

/// Predicts one label per row of `samples` with a trained classifier.
pub fn predict_labels(
    classifier: &dyn StatModel,
    samples: ArrayView2<f32>,
) -> Result<Array1<i32>, ClassifierError> {
    if !classifier.is_trained() {
        return Err(ClassifierError::NotTrained);
    }
    let predictions = classifier.predict(samples)?;
    if predictions.len() != samples.nrows() {
        return Err(ClassifierError::Training(format!(
            "{} predictions for {} samples",
            predictions.len(),
            samples.nrows()
        )));
    }
    Ok(predictions)
}

/// Writes the classifier's native state and its type tag into `file`.
pub fn save_classifier_model(classifier: &dyn StatModel, file: &mut ModelFile) -> Result<(), ClassifierError> {
    if !classifier.is_trained() {
        return Err(ClassifierError::NotTrained);
    }
    file.set_value(CLASSIFIER_MODEL_TAG, classifier.to_blob()?);
    file.set_int(CLASSIFIER_TYPE_TAG, classifier.kind().id());
    Ok(())
}

/// Restores the classifier stored in `file`, dispatching on its type tag.
pub fn load_classifier_model(file: &ModelFile) -> Result<Box<dyn StatModel>, ClassifierError> {
    let kind = ClassifierKind::from_id(file.get_int(CLASSIFIER_TYPE_TAG)?)?;
    let classifier: Box<dyn StatModel> = match kind {
        ClassifierKind::KNearest => Box::new(file.get_blob::<KNearest>(CLASSIFIER_MODEL_TAG)?),
        ClassifierKind::Svm => Box::new(file.get_blob::<Svm>(CLASSIFIER_MODEL_TAG)?),
        ClassifierKind::RTrees => Box::new(file.get_blob::<RTrees>(CLASSIFIER_MODEL_TAG)?),
    };
    if !classifier.is_trained() {
        return Err(ClassifierError::NotTrained);
    }
    classifier.validate()?;
    info!("Loaded a {}", classifier.describe());
    Ok(classifier)
}

/// Restores the classifier stored in the model file at `path`.
pub fn load_classifier_model_from_file(path: impl AsRef<Path>) -> Result<Box<dyn StatModel>, ClassifierError> {
    load_classifier_model(&ModelFile::open(path)?)
}

/// Rejects empty, ragged or non-finite training input.
pub(crate) fn check_training_input(
    samples: ArrayView2<f32>,
    labels: ArrayView1<i32>,
) -> Result<(), ClassifierError> {
    if samples.nrows() == 0 || samples.ncols() == 0 {
        return Err(ClassifierError::InvalidInput(format!(
            "empty feature matrix ({}x{})",
            samples.nrows(),
            samples.ncols()
        )));
    }
    if samples.nrows() != labels.len() {
        return Err(ClassifierError::InvalidInput(format!(
            "{} feature rows but {} labels",
            samples.nrows(),
            labels.len()
        )));
    }
    if samples.iter().any(|value| !value.is_finite()) {
        return Err(ClassifierError::InvalidInput(
            "feature matrix contains non-finite values".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn check_prediction_input(samples: ArrayView2<f32>, features: usize) -> Result<(), ClassifierError> {
    if samples.ncols() != features {
        return Err(ClassifierError::InvalidInput(format!(
            "expected {} features per sample, got {}",
            features,
            samples.ncols()
        )));
    }
    Ok(())
}

/// Sorted distinct labels.
pub(crate) fn distinct_labels(labels: ArrayView1<i32>) -> Vec<i32> {
    let mut classes = labels.to_vec();
    classes.sort_unstable();
    classes.dedup();
    classes
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_kind_ids() {
        for (index, kind) in ClassifierKind::ALL.iter().enumerate() {
            assert_eq!(ClassifierKind::from_id(index as i64).unwrap(), *kind);
        }
        assert!(matches!(ClassifierKind::from_id(3), Err(ClassifierError::UnknownId(3))));
    }

    #[test]
    fn test_build_reports_family() {
        for kind in ClassifierKind::ALL {
            let params = ClassifierParams {
                kind,
                ..ClassifierParams::default()
            };
            let classifier = params.build(1).unwrap();
            assert_eq!(classifier.kind(), kind);
            assert!(!classifier.is_trained());
        }
        let params = ClassifierParams {
            knn_k: 0,
            ..ClassifierParams::default()
        };
        assert!(matches!(params.build(0), Err(ClassifierError::InvalidParams(_))));
    }

    #[test]
    fn test_training_input_checks() {
        let mut classifier = ClassifierParams::default().build(0).unwrap();
        let samples = array![[1.0f32, 2.0], [3.0, 4.0]];
        assert!(matches!(
            train_classifier(classifier.as_mut(), samples.view(), array![1].view()),
            Err(ClassifierError::InvalidInput(_))
        ));
        let empty = ndarray::Array2::<f32>::zeros((0, 2));
        assert!(matches!(
            train_classifier(classifier.as_mut(), empty.view(), ndarray::Array1::<i32>::zeros(0).view()),
            Err(ClassifierError::InvalidInput(_))
        ));
        let nan = array![[f32::NAN, 1.0]];
        assert!(matches!(
            train_classifier(classifier.as_mut(), nan.view(), array![0].view()),
            Err(ClassifierError::InvalidInput(_))
        ));
        assert!(matches!(
            predict_labels(classifier.as_ref(), samples.view()),
            Err(ClassifierError::NotTrained)
        ));
    }

    #[test]
    fn test_save_and_load_every_family() {
        let samples = array![[0.0f32, 0.0], [0.1, 0.2], [4.0, 4.0], [4.2, 3.9]];
        let labels = array![0, 0, 1, 1];
        for kind in ClassifierKind::ALL {
            let params = ClassifierParams {
                kind,
                ..ClassifierParams::default()
            };
            let mut classifier = params.build(5).unwrap();
            assert!(matches!(
                save_classifier_model(classifier.as_ref(), &mut ModelFile::new()),
                Err(ClassifierError::NotTrained)
            ));
            train_classifier(classifier.as_mut(), samples.view(), labels.view()).unwrap();
            let before = predict_labels(classifier.as_ref(), samples.view()).unwrap();

            let mut file = ModelFile::new();
            save_classifier_model(classifier.as_ref(), &mut file).unwrap();
            assert_eq!(file.get_int(CLASSIFIER_TYPE_TAG).unwrap(), kind.id());

            let restored = load_classifier_model(&file).unwrap();
            assert_eq!(restored.kind(), kind);
            assert_eq!(predict_labels(restored.as_ref(), samples.view()).unwrap(), before);
        }
    }

    fn trained_file(kind: ClassifierKind) -> ModelFile {
        let samples = array![[0.0f32, 0.0], [0.1, 0.2], [4.0, 4.0], [4.2, 3.9]];
        let params = ClassifierParams {
            kind,
            ..ClassifierParams::default()
        };
        let mut classifier = params.build(3).unwrap();
        train_classifier(classifier.as_mut(), samples.view(), array![0, 0, 1, 1].view()).unwrap();
        let mut file = ModelFile::new();
        save_classifier_model(classifier.as_ref(), &mut file).unwrap();
        file
    }

    fn assert_corrupt(file: &ModelFile) {
        assert!(matches!(
            load_classifier_model(file),
            Err(ClassifierError::Corrupt(_))
        ));
    }

    #[test]
    fn test_load_rejects_inconsistent_knn_state() {
        let mut file = trained_file(ClassifierKind::KNearest);
        let mut state = file.get_value(CLASSIFIER_MODEL_TAG).unwrap().clone();
        state["labels"] = serde_json::json!({"v": 1, "dim": [1], "data": [0]});
        file.set_value(CLASSIFIER_MODEL_TAG, state);
        assert_corrupt(&file);
    }

    #[test]
    fn test_load_rejects_inconsistent_svm_state() {
        let mut file = trained_file(ClassifierKind::Svm);
        let mut state = file.get_value(CLASSIFIER_MODEL_TAG).unwrap().clone();
        state["model"]["coefficients"] = serde_json::json!({"v": 1, "dim": [1, 1], "data": [1.0]});
        file.set_value(CLASSIFIER_MODEL_TAG, state);
        assert_corrupt(&file);
    }

    #[test]
    fn test_load_rejects_dangling_tree_nodes() {
        let mut file = trained_file(ClassifierKind::RTrees);
        let original = file.get_value(CLASSIFIER_MODEL_TAG).unwrap().clone();

        let mut state = original.clone();
        state["forest"]["trees"][0]["nodes"] = serde_json::json!([
            {"Split": {"feature": 0, "threshold": 0.5, "left": 7, "right": 8}}
        ]);
        file.set_value(CLASSIFIER_MODEL_TAG, state);
        assert_corrupt(&file);

        let mut state = original.clone();
        state["forest"]["trees"][0]["nodes"] = serde_json::json!([{"Leaf": {"class": 9}}]);
        file.set_value(CLASSIFIER_MODEL_TAG, state);
        assert_corrupt(&file);

        let mut state = original;
        state["forest"]["trees"][0]["nodes"] = serde_json::json!([
            {"Split": {"feature": 0, "threshold": 0.5, "left": 0, "right": 0}}
        ]);
        file.set_value(CLASSIFIER_MODEL_TAG, state);
        assert_corrupt(&file);
    }

    #[test]
    fn test_load_rejects_bad_type_tags() {
        assert!(matches!(
            load_classifier_model(&ModelFile::new()),
            Err(ClassifierError::ModelFile(_))
        ));
        let mut file = ModelFile::new();
        file.set_int(CLASSIFIER_TYPE_TAG, 7);
        assert!(matches!(
            load_classifier_model(&file),
            Err(ClassifierError::UnknownId(7))
        ));
        file.set_int(CLASSIFIER_TYPE_TAG, 0);
        file.set_int(CLASSIFIER_MODEL_TAG, 1);
        assert!(matches!(
            load_classifier_model(&file),
            Err(ClassifierError::ModelFile(_))
        ));
    }
}

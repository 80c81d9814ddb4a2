//! One-vs-rest kernel SVM trained with the kernelized Pegasos sub-gradient
//! method.
//!
//! Each class gets a binary scorer `f_c(x) = sum_i coef[c, i] * (K(x_i, x) + 1)`.
//! The constant added to the kernel plays the role of the bias term. The
//! predicted label is the class with the highest score.

use log::debug;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{
    check_prediction_input, check_training_input, distinct_labels, ClassifierError,
    ClassifierKind, StatModel,
};

/// Kernel function, with the integer ids used on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SvmKernel {
    Linear = 0,
    Poly = 1,
    Rbf = 2,
    Sigmoid = 3,
    Chi2 = 4,
    Inter = 5,
}

impl SvmKernel {
    pub const ALL: [SvmKernel; 6] = [
        SvmKernel::Linear,
        SvmKernel::Poly,
        SvmKernel::Rbf,
        SvmKernel::Sigmoid,
        SvmKernel::Chi2,
        SvmKernel::Inter,
    ];

    pub fn from_id(id: i64) -> Result<Self, ClassifierError> {
        Self::ALL
            .into_iter()
            .find(|kernel| *kernel as i64 == id)
            .ok_or_else(|| ClassifierError::InvalidParams(format!("unknown SVM kernel id {id}")))
    }
}

/// SVM hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SvmParams {
    pub kernel: SvmKernel,
    /// Soft margin penalty.
    pub c: f32,
    /// Degree of the polynomial kernel.
    pub degree: f32,
    /// Scale of the Poly, Rbf, Sigmoid and Chi2 kernels.
    pub gamma: f32,
    /// Passes over the training set.
    pub epochs: usize,
}

impl Default for SvmParams {
    fn default() -> Self {
        Self {
            kernel: SvmKernel::Linear,
            c: 1.0,
            degree: 3.0,
            gamma: 1.0,
            epochs: 10,
        }
    }
}

impl SvmParams {
    fn validate(&self) -> Result<(), ClassifierError> {
        if !(self.c > 0.0 && self.c.is_finite()) {
            return Err(ClassifierError::InvalidParams(format!("C must be positive, got {}", self.c)));
        }
        if !(self.gamma > 0.0 && self.gamma.is_finite()) {
            return Err(ClassifierError::InvalidParams(format!(
                "gamma must be positive, got {}",
                self.gamma
            )));
        }
        if self.kernel == SvmKernel::Poly && !(self.degree > 0.0 && self.degree.is_finite()) {
            return Err(ClassifierError::InvalidParams(format!(
                "degree must be positive, got {}",
                self.degree
            )));
        }
        if self.epochs == 0 {
            return Err(ClassifierError::InvalidParams("epochs must be at least 1".to_string()));
        }
        Ok(())
    }

    fn kernel(&self, x: ArrayView1<f32>, y: ArrayView1<f32>) -> f32 {
        match self.kernel {
            SvmKernel::Linear => x.dot(&y),
            SvmKernel::Poly => (self.gamma * x.dot(&y) + 1.0).powf(self.degree),
            SvmKernel::Rbf => {
                let distance: f32 = x.iter().zip(y.iter()).map(|(a, b)| (a - b) * (a - b)).sum();
                (-self.gamma * distance).exp()
            }
            SvmKernel::Sigmoid => (self.gamma * x.dot(&y)).tanh(),
            SvmKernel::Chi2 => {
                let distance: f32 = x
                    .iter()
                    .zip(y.iter())
                    .filter(|(a, b)| *a + *b > 0.0)
                    .map(|(a, b)| (a - b) * (a - b) / (a + b))
                    .sum();
                (-self.gamma * distance).exp()
            }
            SvmKernel::Inter => x.iter().zip(y.iter()).map(|(a, b)| a.min(*b)).sum(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SvmModel {
    classes: Vec<i32>,
    support_vectors: Array2<f32>,
    /// One row of coefficients per class, one column per support vector.
    coefficients: Array2<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Svm {
    params: SvmParams,
    seed: u64,
    model: Option<SvmModel>,
}

impl Svm {
    pub fn new(params: SvmParams, seed: u64) -> Result<Self, ClassifierError> {
        params.validate()?;
        Ok(Self {
            params,
            seed,
            model: None,
        })
    }

    pub fn params(&self) -> &SvmParams {
        &self.params
    }

    pub fn support_vector_count(&self) -> usize {
        self.model
            .as_ref()
            .map_or(0, |model| model.support_vectors.nrows())
    }

    fn gram_matrix(&self, samples: ArrayView2<f32>) -> Array2<f32> {
        let n = samples.nrows();
        let mut gram = Array2::<f32>::zeros((n, n));
        for i in 0..n {
            for j in i..n {
                let value = self.params.kernel(samples.row(i), samples.row(j)) + 1.0;
                gram[[i, j]] = value;
                gram[[j, i]] = value;
            }
        }
        gram
    }
}

impl StatModel for Svm {
    fn kind(&self) -> ClassifierKind {
        ClassifierKind::Svm
    }

    fn train(&mut self, samples: ArrayView2<f32>, labels: ArrayView1<i32>) -> Result<(), ClassifierError> {
        check_training_input(samples, labels)?;
        let n = samples.nrows();
        let classes = distinct_labels(labels);
        let gram = self.gram_matrix(samples);
        let lambda = 1.0 / (self.params.c * n as f32);
        let steps = self.params.epochs * n;
        let mut rng = StdRng::seed_from_u64(self.seed);

        // alpha[c, i] counts the margin violations of sample i for class c.
        let mut alpha = Array2::<f32>::zeros((classes.len(), n));
        for (class_index, &class) in classes.iter().enumerate() {
            let target: Vec<f32> = labels
                .iter()
                .map(|&label| if label == class { 1.0 } else { -1.0 })
                .collect();
            let mut scores = vec![0.0f32; n];
            for step in 1..=steps {
                let i = rng.gen_range(0..n);
                let decision = scores[i] / (lambda * step as f32);
                if target[i] * decision < 1.0 {
                    alpha[[class_index, i]] += 1.0;
                    for (score, k) in scores.iter_mut().zip(gram.row(i).iter()) {
                        *score += target[i] * k;
                    }
                }
            }
            for (value, y) in alpha.row_mut(class_index).iter_mut().zip(target.iter()) {
                *value *= y / (lambda * steps as f32);
            }
        }

        let support: Vec<usize> = (0..n)
            .filter(|&i| alpha.column(i).iter().any(|&a| a != 0.0))
            .collect();
        if support.is_empty() {
            return Err(ClassifierError::Training(
                "no support vectors were selected".to_string(),
            ));
        }
        debug!(
            "SVM selected {} support vectors out of {} samples for {} classes",
            support.len(),
            n,
            classes.len()
        );
        self.model = Some(SvmModel {
            classes,
            support_vectors: samples.select(Axis(0), &support),
            coefficients: alpha.select(Axis(1), &support),
        });
        Ok(())
    }

    fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    fn validate(&self) -> Result<(), ClassifierError> {
        self.params
            .validate()
            .map_err(|err| ClassifierError::Corrupt(err.to_string()))?;
        let Some(model) = &self.model else {
            return Ok(());
        };
        if model.classes.is_empty() || model.support_vectors.nrows() == 0 {
            return Err(ClassifierError::Corrupt(
                "no classes or no support vectors".to_string(),
            ));
        }
        let expected = (model.classes.len(), model.support_vectors.nrows());
        if model.coefficients.dim() != expected {
            return Err(ClassifierError::Corrupt(format!(
                "coefficients are {:?}, expected {:?}",
                model.coefficients.dim(),
                expected
            )));
        }
        Ok(())
    }

    fn predict(&self, samples: ArrayView2<f32>) -> Result<Array1<i32>, ClassifierError> {
        let model = self.model.as_ref().ok_or(ClassifierError::NotTrained)?;
        check_prediction_input(samples, model.support_vectors.ncols())?;
        Ok(samples
            .outer_iter()
            .map(|row| {
                let kernels: Array1<f32> = model
                    .support_vectors
                    .outer_iter()
                    .map(|support| self.params.kernel(support, row) + 1.0)
                    .collect();
                let scores = model.coefficients.dot(&kernels);
                let best = scores
                    .iter()
                    .enumerate()
                    .fold((0, f32::NEG_INFINITY), |best, (index, &score)| {
                        if score > best.1 {
                            (index, score)
                        } else {
                            best
                        }
                    })
                    .0;
                model.classes[best]
            })
            .collect())
    }

    fn describe(&self) -> String {
        format!(
            "SVM classifier: K={} C={} D={} G={}",
            self.params.kernel as i64, self.params.c, self.params.degree, self.params.gamma
        )
    }

    fn to_blob(&self) -> Result<serde_json::Value, ClassifierError> {
        serde_json::to_value(self).map_err(ClassifierError::Encode)
    }
}

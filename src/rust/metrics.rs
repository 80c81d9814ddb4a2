//! Classification metrics computed from a confusion matrix, and the model
//! size score.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// Size in megabytes of the reference dataset the size score is measured
/// against, multiplied by four.
pub const REFERENCE_SIZE_MB: f64 = 4.0 * 45.06;

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("{truth} ground truth labels but {predicted} predictions")]
    LengthMismatch { truth: usize, predicted: usize },
    #[error("label {label} is outside the range of {classes} classes")]
    LabelOutOfRange { label: i32, classes: usize },
    #[error("confusion matrix must be square with at least two classes, got {rows}x{cols}")]
    InvalidMatrix { rows: usize, cols: usize },
}

/// Counts (ground truth, prediction) pairs. Rows are the ground truth and
/// columns the predictions.
pub fn confusion_matrix(
    true_labels: ArrayView1<i32>,
    predicted_labels: ArrayView1<i32>,
    n_classes: usize,
) -> Result<Array2<f32>, MetricsError> {
    if true_labels.len() != predicted_labels.len() {
        return Err(MetricsError::LengthMismatch {
            truth: true_labels.len(),
            predicted: predicted_labels.len(),
        });
    }
    let index = |label: i32| -> Result<usize, MetricsError> {
        usize::try_from(label)
            .ok()
            .filter(|&index| index < n_classes)
            .ok_or(MetricsError::LabelOutOfRange {
                label,
                classes: n_classes,
            })
    };

    let mut matrix = Array2::<f32>::zeros((n_classes, n_classes));
    for (&truth, &predicted) in true_labels.iter().zip(predicted_labels.iter()) {
        matrix[[index(truth)?, index(predicted)?]] += 1.0;
    }
    Ok(matrix)
}

fn check_matrix(matrix: ArrayView2<f32>) -> Result<(), MetricsError> {
    let (rows, cols) = matrix.dim();
    if rows != cols || rows < 2 {
        return Err(MetricsError::InvalidMatrix { rows, cols });
    }
    Ok(())
}

/// Recognition rate of every class: hits over ground truth samples, 0 for
/// classes without samples.
pub fn recognition_rates(matrix: ArrayView2<f32>) -> Result<Array1<f32>, MetricsError> {
    check_matrix(matrix)?;
    Ok(matrix
        .outer_iter()
        .enumerate()
        .map(|(class, row)| {
            let total = row.sum();
            if total > 0.0 {
                row[class] / total
            } else {
                0.0
            }
        })
        .collect())
}

/// Rate of correct classifications over all samples, 0 for an empty matrix.
pub fn accuracy(matrix: ArrayView2<f32>) -> Result<f32, MetricsError> {
    check_matrix(matrix)?;
    let total = matrix.sum();
    if total > 0.0 {
        Ok(matrix.diag().sum() / total)
    } else {
        Ok(0.0)
    }
}

pub fn mean_recognition_rate(rates: ArrayView1<f32>) -> f32 {
    rates.mean().unwrap_or(0.0)
}

pub fn size_in_mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

/// `max(0, 1 - size / REFERENCE_SIZE_MB)`: 1 for an empty model, 0 for
/// models at least as big as the reference.
pub fn size_score(model_size_mb: f64) -> f64 {
    (1.0 - model_size_mb / REFERENCE_SIZE_MB).max(0.0)
}

/// Harmonic mean of accuracy and size score.
pub fn final_score(accuracy: f64, size_score: f64) -> f64 {
    if accuracy + size_score > 0.0 {
        2.0 * accuracy * size_score / (accuracy + size_score)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_confusion_matrix() {
        let truth = array![0, 0, 1, 2, 2];
        let predicted = array![0, 1, 1, 2, 0];
        let matrix = confusion_matrix(truth.view(), predicted.view(), 3).unwrap();
        assert_eq!(matrix, array![[1.0, 1.0, 0.0], [0.0, 1.0, 0.0], [1.0, 0.0, 1.0]]);
        assert_eq!(matrix.sum(), 5.0);
    }

    #[test]
    fn test_confusion_matrix_errors() {
        let truth = array![0, 1];
        assert!(matches!(
            confusion_matrix(truth.view(), array![0].view(), 2),
            Err(MetricsError::LengthMismatch { truth: 2, predicted: 1 })
        ));
        assert!(matches!(
            confusion_matrix(truth.view(), array![0, 5].view(), 2),
            Err(MetricsError::LabelOutOfRange { label: 5, classes: 2 })
        ));
        assert!(matches!(
            confusion_matrix(truth.view(), array![-1, 0].view(), 2),
            Err(MetricsError::LabelOutOfRange { label: -1, .. })
        ));
    }

    #[test]
    fn test_rates_and_accuracy() {
        let matrix = array![[3.0f32, 1.0, 0.0], [0.0, 2.0, 0.0], [0.0, 0.0, 0.0]];
        let rates = recognition_rates(matrix.view()).unwrap();
        assert_eq!(rates.to_vec(), vec![0.75, 1.0, 0.0]);
        assert_eq!(accuracy(matrix.view()).unwrap(), 5.0 / 6.0);
        assert!((mean_recognition_rate(rates.view()) - 1.75 / 3.0).abs() < 1e-6);

        let empty = Array2::<f32>::zeros((2, 2));
        assert_eq!(accuracy(empty.view()).unwrap(), 0.0);
        assert_eq!(mean_recognition_rate(Array1::<f32>::zeros(0).view()), 0.0);
        assert!(matches!(
            accuracy(Array2::<f32>::zeros((2, 3)).view()),
            Err(MetricsError::InvalidMatrix { rows: 2, cols: 3 })
        ));
    }

    #[test]
    fn test_size_and_final_score() {
        assert_eq!(size_score(0.0), 1.0);
        assert_eq!(size_score(REFERENCE_SIZE_MB * 2.0), 0.0);
        assert!((size_score(REFERENCE_SIZE_MB / 2.0) - 0.5).abs() < 1e-12);
        assert_eq!(size_in_mb(2 * 1024 * 1024), 2.0);
        assert_eq!(final_score(1.0, 1.0), 1.0);
        assert_eq!(final_score(0.0, 0.0), 0.0);
        assert!((final_score(0.5, 1.0) - 2.0 / 3.0).abs() < 1e-12);
    }
}

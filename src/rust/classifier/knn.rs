use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use super::{check_prediction_input, check_training_input, ClassifierError, ClassifierKind, StatModel};

/// Brute-force K nearest neighbours over Euclidean distance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNearest {
    k: usize,
    samples: Option<Array2<f32>>,
    labels: Option<Array1<i32>>,
}

impl KNearest {
    pub fn new(k: usize) -> Result<Self, ClassifierError> {
        if k == 0 {
            return Err(ClassifierError::InvalidParams("K must be at least 1".to_string()));
        }
        Ok(Self {
            k,
            samples: None,
            labels: None,
        })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    fn classify(&self, samples: &Array2<f32>, labels: &Array1<i32>, query: ArrayView1<f32>) -> i32 {
        let mut neighbours: Vec<(f32, usize)> = samples
            .outer_iter()
            .enumerate()
            .map(|(index, row)| {
                let distance = row
                    .iter()
                    .zip(query.iter())
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum::<f32>();
                (distance, index)
            })
            .collect();
        neighbours.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        neighbours.truncate(self.k);

        // (label, votes, rank of its nearest neighbour)
        let mut votes: Vec<(i32, usize, usize)> = Vec::new();
        for (rank, &(_, index)) in neighbours.iter().enumerate() {
            let label = labels[index];
            match votes.iter_mut().find(|(candidate, _, _)| *candidate == label) {
                Some(entry) => entry.1 += 1,
                None => votes.push((label, 1, rank)),
            }
        }
        votes
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then(b.2.cmp(&a.2)))
            .map(|(label, _, _)| label)
            .unwrap_or_default()
    }
}

impl StatModel for KNearest {
    fn kind(&self) -> ClassifierKind {
        ClassifierKind::KNearest
    }

    fn train(&mut self, samples: ArrayView2<f32>, labels: ArrayView1<i32>) -> Result<(), ClassifierError> {
        check_training_input(samples, labels)?;
        self.samples = Some(samples.to_owned());
        self.labels = Some(labels.to_owned());
        Ok(())
    }

    fn is_trained(&self) -> bool {
        self.samples.is_some() && self.labels.is_some()
    }

    fn validate(&self) -> Result<(), ClassifierError> {
        if self.k == 0 {
            return Err(ClassifierError::Corrupt("K is 0".to_string()));
        }
        match (&self.samples, &self.labels) {
            (None, None) => Ok(()),
            (Some(samples), Some(labels)) if samples.nrows() > 0 && samples.nrows() == labels.len() => Ok(()),
            (Some(samples), Some(labels)) => Err(ClassifierError::Corrupt(format!(
                "{} stored samples but {} labels",
                samples.nrows(),
                labels.len()
            ))),
            _ => Err(ClassifierError::Corrupt(
                "stored samples and labels must be present together".to_string(),
            )),
        }
    }

    fn predict(&self, samples: ArrayView2<f32>) -> Result<Array1<i32>, ClassifierError> {
        let (Some(train_samples), Some(train_labels)) = (&self.samples, &self.labels) else {
            return Err(ClassifierError::NotTrained);
        };
        check_prediction_input(samples, train_samples.ncols())?;
        Ok(samples
            .outer_iter()
            .map(|row| self.classify(train_samples, train_labels, row))
            .collect())
    }

    fn describe(&self) -> String {
        format!("KNN classifier: K={}", self.k)
    }

    fn to_blob(&self) -> Result<serde_json::Value, ClassifierError> {
        serde_json::to_value(self).map_err(ClassifierError::Encode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_nearest_neighbour() {
        let mut knn = KNearest::new(1).unwrap();
        let samples = array![[0.0f32, 0.0], [10.0, 10.0], [0.0, 10.0]];
        let labels = array![3, 7, 9];
        knn.train(samples.view(), labels.view()).unwrap();

        let queries = array![[1.0f32, 1.0], [9.0, 9.5], [0.5, 8.0]];
        let predicted = knn.predict(queries.view()).unwrap();
        assert_eq!(predicted.to_vec(), vec![3, 7, 9]);
    }

    #[test]
    fn test_majority_vote_and_tie_break() {
        let samples = array![[0.0f32], [1.0], [2.0], [10.0]];
        let labels = array![1, 2, 2, 1];

        let mut knn = KNearest::new(3).unwrap();
        knn.train(samples.view(), labels.view()).unwrap();
        assert_eq!(knn.predict(array![[0.1f32]].view()).unwrap()[0], 2);

        // One vote each: the nearest neighbour wins.
        let mut knn = KNearest::new(2).unwrap();
        knn.train(samples.view(), labels.view()).unwrap();
        assert_eq!(knn.predict(array![[0.9f32]].view()).unwrap()[0], 2);
        assert_eq!(knn.predict(array![[0.2f32]].view()).unwrap()[0], 1);
    }

    #[test]
    fn test_invalid_usage() {
        assert!(matches!(KNearest::new(0), Err(ClassifierError::InvalidParams(_))));

        let knn = KNearest::new(1).unwrap();
        assert!(!knn.is_trained());
        assert!(matches!(
            knn.predict(array![[1.0f32]].view()),
            Err(ClassifierError::NotTrained)
        ));

        let mut knn = KNearest::new(1).unwrap();
        knn.train(array![[1.0f32, 2.0]].view(), array![0].view()).unwrap();
        assert!(matches!(
            knn.predict(array![[1.0f32]].view()),
            Err(ClassifierError::InvalidInput(_))
        ));
    }
}

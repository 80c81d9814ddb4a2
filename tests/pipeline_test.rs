mod common;

use std::fs;

use pollen_classifier::features::create;
use pollen_classifier::metrics::{accuracy, confusion_matrix, recognition_rates};
use pollen_classifier::{
    class_label, extract_features, load_model, predict_labels, save_predictions, train_classifier,
    ClassifierKind, ClassifierParams, Dataset, DatasetError, FeatureId, ModelRecord, CLASS_NAMES,
};

use common::{gradient_image, init, solid_image, write_manifest};

fn write_pollen_dataset(dir: &std::path::Path) {
    for i in 0..3u8 {
        gradient_image(dir, &format!("alnus_{i}.png"), 8, 8, i);
        solid_image(dir, &format!("betula_{i}.png"), 8, 8, 100 + i);
        let path = gradient_image(dir, &format!("salix_{i}.png"), 8, 8, 2 * i);
        let mut image = image::open(&path).unwrap().to_luma8();
        image::imageops::flip_horizontal_in_place(&mut image);
        image.save(&path).unwrap();
    }
    let train: Vec<(String, &str)> = (0..3)
        .flat_map(|i| {
            [
                (format!("alnus_{i}.png"), "alnus"),
                (format!("betula_{i}.png"), "betula"),
                (format!("salix_{i}.png"), "salix"),
            ]
        })
        .collect();
    let rows: Vec<(&str, &str)> = train.iter().map(|(image, label)| (image.as_str(), *label)).collect();
    write_manifest(dir, "train", &rows);
    write_manifest(dir, "test", &[("salix_1.png", "salix"), ("alnus_2.png", "alnus")]);
}

#[test]
fn test_perfect_training_accuracy_matches_labels() -> Result<(), Box<dyn std::error::Error>> {
    init();
    let dir = tempfile::tempdir()?;
    write_pollen_dataset(dir.path());
    let dataset = Dataset::load(dir.path(), "train")?.with_image_size(None);
    let extractor = create(FeatureId::GreyLevels);
    let (features, labels) = extract_features(&dataset, extractor.as_ref())?;

    let mut classifier = ClassifierParams::default().build(0)?;
    train_classifier(classifier.as_mut(), features.view(), labels.view())?;
    let predicted = predict_labels(classifier.as_ref(), features.view())?;

    let matrix = confusion_matrix(labels.view(), predicted.view(), CLASS_NAMES.len())?;
    assert_eq!(accuracy(matrix.view())?, 1.0);
    assert_eq!(predicted, labels);
    let rates = recognition_rates(matrix.view())?;
    for label in [class_label("alnus")?, class_label("betula")?, class_label("salix")?] {
        assert_eq!(rates[label as usize], 1.0);
    }
    Ok(())
}

#[test]
fn test_train_save_test_cycle() -> Result<(), Box<dyn std::error::Error>> {
    init();
    let dir = tempfile::tempdir()?;
    write_pollen_dataset(dir.path());
    let train = Dataset::load(dir.path(), "train")?.with_image_size(Some((6, 6)));
    let extractor = create(FeatureId::LbpHistogram);
    let (features, labels) = extract_features(&train, extractor.as_ref())?;

    let params = ClassifierParams {
        kind: ClassifierKind::RTrees,
        ..ClassifierParams::default()
    };
    let mut classifier = params.build(99)?;
    train_classifier(classifier.as_mut(), features.view(), labels.view())?;
    let model_path = dir.path().join("model.json");
    ModelRecord::new(classifier.as_ref(), extractor.as_ref())
        .with_random_seed(99)
        .save(&model_path)?;

    let model = load_model(&model_path)?;
    let test = Dataset::load(dir.path(), "test")?.with_image_size(Some((6, 6)));
    let (test_features, _) = extract_features(&test, model.extractor.as_ref())?;
    let predicted = predict_labels(model.classifier.as_ref(), test_features.view())?;
    assert_eq!(
        predicted,
        predict_labels(classifier.as_ref(), test_features.view())?
    );

    let predictions_path = dir.path().join("predictions.csv");
    save_predictions(&test, &predicted, &predictions_path, Some(&["sample", "species"][..]))?;
    let text = fs::read_to_string(&predictions_path)?;
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "sample,species");
    assert!(lines[1].starts_with("salix_1.png,"));
    assert!(lines[2].starts_with("alnus_2.png,"));
    Ok(())
}

#[test]
fn test_unknown_label_in_manifest() -> Result<(), Box<dyn std::error::Error>> {
    init();
    let dir = tempfile::tempdir()?;
    write_manifest(dir.path(), "bad", &[("x.png", "Alnus")]);
    let result = Dataset::load(dir.path(), "bad");
    assert!(matches!(result, Err(DatasetError::UnknownLabel(name)) if name == "Alnus"));
    Ok(())
}

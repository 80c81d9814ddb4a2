mod common;

use ndarray::Array1;
use pollen_classifier::features::{create, GreyLevels, LbpHistogram, MeanStdDevGreyLevels};
use pollen_classifier::{
    extract_features, extract_features_with, Dataset, ExtractionConfig, FeatureError,
    FeatureExtractor, FeatureId, MissingSamplePolicy, Sample,
};

use common::{gradient_image, init, solid_image, write_manifest};

#[test]
fn test_extraction_is_deterministic_for_every_extractor() -> Result<(), Box<dyn std::error::Error>> {
    init();
    let dir = tempfile::tempdir()?;
    let path = gradient_image(dir.path(), "grain.png", 12, 10, 5);
    let dataset = Dataset::from_samples(vec![Sample::new(&path, 0)?]).with_image_size(None);
    let image = dataset.load_image(0)?;

    for id in FeatureId::ALL {
        let mut extractor = create(id);
        extractor.train(&dataset)?;
        let first = extractor.extract(&image)?;
        let second = extractor.extract(&image)?;
        assert!(!first.is_empty(), "{id} produced no features");
        assert_eq!(first.len(), second.len());
        assert_eq!(first, second);
    }
    Ok(())
}

#[test]
fn test_constant_images_give_zero_matrix() -> Result<(), Box<dyn std::error::Error>> {
    init();
    let dir = tempfile::tempdir()?;
    solid_image(dir.path(), "img1.png", 2, 2, 40);
    solid_image(dir.path(), "img2.png", 2, 2, 200);
    write_manifest(dir.path(), "train", &[("img1.png", "alnus"), ("img2.png", "betula")]);

    let dataset = Dataset::load(dir.path(), "train")?.with_image_size(None);
    let (features, labels) = extract_features(&dataset, &GreyLevels::new())?;

    assert_eq!(features.dim(), (2, 4));
    assert!(features.iter().all(|&value| value == 0.0));
    assert_eq!(labels, Array1::from(vec![0, 1]));
    Ok(())
}

#[test]
fn test_missing_sample_is_zero_filled() -> Result<(), Box<dyn std::error::Error>> {
    init();
    let dir = tempfile::tempdir()?;
    let first = gradient_image(dir.path(), "a.png", 4, 4, 0);
    let third = gradient_image(dir.path(), "c.png", 4, 4, 30);
    let dataset = Dataset::from_samples(vec![
        Sample::new(first, 2)?,
        Sample::new(dir.path().join("missing.png"), 7)?,
        Sample::new(third, 4)?,
    ])
    .with_image_size(None);

    let (features, labels) = extract_features(&dataset, &GreyLevels::new())?;
    assert_eq!(features.nrows(), 3);
    assert!(features.row(1).iter().all(|&value| value == 0.0));
    assert!(features.row(0).iter().any(|&value| value != 0.0));
    assert!(features.row(2).iter().any(|&value| value != 0.0));
    assert_eq!(labels.to_vec(), vec![2, 7, 4]);
    Ok(())
}

#[test]
fn test_abort_policy_rejects_missing_sample() -> Result<(), Box<dyn std::error::Error>> {
    init();
    let dir = tempfile::tempdir()?;
    let first = gradient_image(dir.path(), "a.png", 4, 4, 0);
    let dataset = Dataset::from_samples(vec![
        Sample::new(first, 0)?,
        Sample::new(dir.path().join("missing.png"), 1)?,
    ])
    .with_image_size(None);

    let config = ExtractionConfig::default().with_missing_sample_policy(MissingSamplePolicy::Abort);
    let result = extract_features_with(&dataset, &GreyLevels::new(), &config);
    assert!(matches!(result, Err(FeatureError::Sample { index: 1, .. })));
    Ok(())
}

#[test]
fn test_empty_dataset_is_rejected() {
    init();
    let dataset = Dataset::from_samples(Vec::new());
    let result = extract_features(&dataset, &GreyLevels::new());
    assert!(matches!(result, Err(FeatureError::EmptyDataset)));
}

#[test]
fn test_missing_first_sample_is_fatal() -> Result<(), Box<dyn std::error::Error>> {
    init();
    let dir = tempfile::tempdir()?;
    let second = gradient_image(dir.path(), "b.png", 4, 4, 0);
    let dataset = Dataset::from_samples(vec![
        Sample::new(dir.path().join("missing.png"), 0)?,
        Sample::new(second, 1)?,
    ]);
    let result = extract_features(&dataset, &GreyLevels::new());
    assert!(matches!(result, Err(FeatureError::FirstSample { .. })));
    Ok(())
}

#[test]
fn test_extraction_fault_is_not_substituted() -> Result<(), Box<dyn std::error::Error>> {
    init();
    let dir = tempfile::tempdir()?;
    let large = gradient_image(dir.path(), "large.png", 8, 8, 0);
    let small = solid_image(dir.path(), "small.png", 3, 3, 9);
    let dataset = Dataset::from_samples(vec![Sample::new(large, 0)?, Sample::new(small, 1)?])
        .with_image_size(None);

    // 3x3 images have a single interior pixel, too few for a 2x2 grid.
    let mut extractor = LbpHistogram::new();
    extractor.set_params(&[2.0]);
    let result = extract_features(&dataset, &extractor);
    assert!(matches!(result, Err(FeatureError::InvalidImage(_))));
    Ok(())
}

#[test]
fn test_trained_extractor_standardizes_training_set() -> Result<(), Box<dyn std::error::Error>> {
    init();
    let dir = tempfile::tempdir()?;
    let samples = (0..4u8)
        .map(|i| {
            let path = gradient_image(dir.path(), &format!("g{i}.png"), 6, 6, i * 10);
            Sample::new(path, i32::from(i))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let dataset = Dataset::from_samples(samples).with_image_size(None);

    let mut extractor = MeanStdDevGreyLevels::new();
    assert!(matches!(
        extract_features(&dataset, &extractor),
        Err(FeatureError::NotTrained(_))
    ));
    extractor.train(&dataset)?;
    let (features, _) = extract_features(&dataset, &extractor)?;
    assert_eq!(features.dim(), (4, 36));
    for column in features.columns() {
        assert!(column.mean().unwrap_or(0.0).abs() < 1e-4);
    }
    Ok(())
}

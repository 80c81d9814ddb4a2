use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{error, info};
use ndarray::{Array1, Array2};

use pollen_classifier::classifier::{RTreesParams, SvmKernel, SvmParams};
use pollen_classifier::features::{self, feature_ids, parse_params, Params};
use pollen_classifier::metrics::{
    accuracy, confusion_matrix, final_score, mean_recognition_rate, recognition_rates, size_in_mb,
    size_score,
};
use pollen_classifier::{
    load_model, model_file_size, predict_labels, save_predictions, train_classifier,
    ClassifierKind, ClassifierParams, Dataset, ExtractionConfig, FeatureExtractor, FeatureId,
    MissingSamplePolicy, ModelRecord, StatModel, CLASS_NAMES,
};

#[derive(Parser)]
#[command(author, version, about = "Train and test pollen grain image classifiers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train a classifier and save it, with its feature extractor, to a model file
    Train(TrainArgs),
    /// Predict the labels of a dataset partition with a saved model
    Test(TestArgs),
    /// List the available feature extractors
    ListFeatures,
    /// Print the class table
    Labels,
}

#[derive(Args)]
struct TrainArgs {
    /// Path to the dataset
    dataset: PathBuf,
    /// Filename to save the model
    model: PathBuf,
    /// Random seed. 0 means use the current time
    #[arg(long, default_value_t = 0)]
    rseed: u64,
    /// Feature extractor id
    #[arg(long = "f-id", default_value_t = 0)]
    f_id: i64,
    /// Feature extractor parameters, as <value>[:<value>...]
    #[arg(long = "f-params", default_value = "")]
    f_params: String,
    /// Also save the trained feature extractor to this file
    #[arg(long = "f-save-model")]
    f_save_model: Option<PathBuf>,
    /// Load a pre-trained feature extractor instead of training one
    #[arg(long = "f-load-model")]
    f_load_model: Option<PathBuf>,
    /// Classifier: 0 K-NN, 1 SVM, 2 RTrees
    #[arg(long, default_value_t = 0)]
    clf: i64,
    /// Parameter K for K-NN
    #[arg(long = "knn-k", default_value_t = 1)]
    knn_k: usize,
    /// Parameter C for SVM
    #[arg(long = "svm-c", default_value_t = 1.0)]
    svm_c: f32,
    /// SVM kernel: 0 Linear, 1 Poly, 2 RBF, 3 Sigmoid, 4 Chi2, 5 Inter
    #[arg(long = "svm-k", default_value_t = 0)]
    svm_k: i64,
    /// Degree of the SVM polynomial kernel
    #[arg(long = "svm-d", default_value_t = 3.0)]
    svm_d: f32,
    /// Gamma of the SVM kernels
    #[arg(long = "svm-g", default_value_t = 1.0)]
    svm_g: f32,
    /// Features sampled per RTrees node. 0 means sqrt(number of features)
    #[arg(long = "rtrees-v", default_value_t = 0)]
    rtrees_v: usize,
    /// Maximum number of trees
    #[arg(long = "rtrees-t", default_value_t = 50)]
    rtrees_t: usize,
    /// Out-of-bag error at which no more trees are added
    #[arg(long = "rtrees-e", default_value_t = 0.1)]
    rtrees_e: f32,
    /// Dataset partition used for training
    #[arg(long = "train-set", default_value = "train")]
    train_set: String,
    /// Dataset partition used for validation
    #[arg(long = "valid-set", default_value = "valid")]
    valid_set: String,
    /// Fail instead of zero-filling samples whose image cannot be read
    #[arg(long = "abort-on-missing")]
    abort_on_missing: bool,
}

#[derive(Args)]
struct TestArgs {
    /// Path to the dataset
    dataset: PathBuf,
    /// Partition to use (train, valid, train_total, test)
    set: String,
    /// Model filename to test
    model: PathBuf,
    /// Filename where the predictions are saved
    predictions: PathBuf,
    /// Only compute the test labels, without metrics
    #[arg(short = 't')]
    only_labels: bool,
}

impl TrainArgs {
    fn classifier_params(&self) -> Result<ClassifierParams> {
        Ok(ClassifierParams {
            kind: ClassifierKind::from_id(self.clf)?,
            knn_k: self.knn_k,
            svm: SvmParams {
                kernel: SvmKernel::from_id(self.svm_k)?,
                c: self.svm_c,
                degree: self.svm_d,
                gamma: self.svm_g,
                ..SvmParams::default()
            },
            rtrees: RTreesParams {
                active_vars: self.rtrees_v,
                max_trees: self.rtrees_t,
                oob_epsilon: self.rtrees_e,
                ..RTreesParams::default()
            },
        })
    }

    fn extraction_config(&self) -> ExtractionConfig {
        let policy = if self.abort_on_missing {
            MissingSamplePolicy::Abort
        } else {
            MissingSamplePolicy::ZeroFill
        };
        ExtractionConfig::default().with_missing_sample_policy(policy)
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Train(args) => train(&args),
        Command::Test(args) => test(&args),
        Command::ListFeatures => {
            list_features();
            Ok(())
        }
        Command::Labels => {
            for (label, name) in CLASS_NAMES.iter().enumerate() {
                println!("{label:>2} {name}");
            }
            Ok(())
        }
    };

    if let Err(err) = result {
        error!("{err:#}");
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn list_features() {
    for (id, extractor) in feature_ids() {
        println!("Id: {} Name: {}", id, extractor.name());
        println!("{}", extractor.help());
        println!("  Default params: {}", Params(extractor.params()));
        println!();
    }
}

fn effective_seed(seed: u64) -> u64 {
    if seed != 0 {
        return seed;
    }
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(1)
}

fn train(args: &TrainArgs) -> Result<()> {
    let start_time = Instant::now();
    let seed = effective_seed(args.rseed);
    println!("Set the random seed to: {seed}");

    let train_dataset = Dataset::load(&args.dataset, &args.train_set).with_context(|| {
        format!("could not load train set [{}] from {:?}", args.train_set, args.dataset)
    })?;
    println!("Train partition with {} samples.", train_dataset.len());
    let valid_dataset = Dataset::load(&args.dataset, &args.valid_set).with_context(|| {
        format!("could not load validation set [{}] from {:?}", args.valid_set, args.dataset)
    })?;
    println!("Validation partition with {} samples.", valid_dataset.len());

    let extractor = prepare_extractor(args, &train_dataset)?;

    let config = args.extraction_config();
    let (train_features, train_labels) =
        pollen_classifier::extract_features_with(&train_dataset, extractor.as_ref(), &config)
            .context("could not extract features from the train partition")?;
    println!(
        "Extracted features vector dimension: 1x{}",
        train_features.ncols()
    );
    let validation = if valid_dataset.is_empty() {
        None
    } else {
        Some(
            pollen_classifier::extract_features_with(&valid_dataset, extractor.as_ref(), &config)
                .context("could not extract features from the validation partition")?,
        )
    };

    let params = args.classifier_params()?;
    let mut classifier = params.build(seed)?;
    train_classifier(classifier.as_mut(), train_features.view(), train_labels.view())?;

    let mut acc = evaluate(classifier.as_ref(), &train_features, &train_labels)?;
    println!("Training accuracy: {acc}");
    if let Some((valid_features, valid_labels)) = &validation {
        acc = evaluate(classifier.as_ref(), valid_features, valid_labels)?;
        println!("Validation accuracy: {acc}");
    }

    println!("Saving the model to {:?}.", args.model);
    ModelRecord::new(classifier.as_ref(), extractor.as_ref())
        .with_random_seed(seed)
        .save(&args.model)
        .with_context(|| format!("could not save the model to {:?}", args.model))?;

    report_size(&args.model, f64::from(acc), "Predicted final score")?;
    info!("Training finished in {:.2?}", start_time.elapsed());
    Ok(())
}

fn prepare_extractor(args: &TrainArgs, train_dataset: &Dataset) -> Result<Box<dyn FeatureExtractor>> {
    let mut extractor = features::create(FeatureId::from_id(args.f_id)?);
    println!("Feature extractor: {}", extractor.name());
    match &args.f_load_model {
        Some(path) => {
            extractor.load_model(path).with_context(|| {
                format!("could not load the feature extractor model from {path:?}")
            })?;
            println!("Loaded pre-trained feature extractor from {path:?}");
        }
        None => {
            extractor.set_params(&parse_params(&args.f_params)?);
            println!("Feature extractor params: {}", Params(extractor.params()));
            extractor
                .train(train_dataset)
                .context("could not train the feature extractor")?;
        }
    }
    if let Some(path) = &args.f_save_model {
        extractor.save_model(path).with_context(|| {
            format!("could not save the feature extractor model to {path:?}")
        })?;
        println!("Saved the trained feature extractor to {path:?}");
    }
    Ok(extractor)
}

fn evaluate(classifier: &dyn StatModel, features: &Array2<f32>, labels: &Array1<i32>) -> Result<f32> {
    let predicted = predict_labels(classifier, features.view())?;
    let matrix = confusion_matrix(labels.view(), predicted.view(), CLASS_NAMES.len())?;
    Ok(accuracy(matrix.view())?)
}

fn report_size(model: &Path, acc: f64, label: &str) -> Result<()> {
    let bytes = model_file_size(model).with_context(|| format!("could not open the file {model:?}"))?;
    let size_mb = size_in_mb(bytes);
    let score = size_score(size_mb);
    println!("Model size: {size_mb} Mb.");
    println!("Size score max(0.0, 1.0-(model_size_mb/dataset_size_mb)) = {score}");
    println!(
        "{label} 2*(acc*size_score)/(acc+size_score) = {}",
        final_score(acc, score)
    );
    Ok(())
}

fn test(args: &TestArgs) -> Result<()> {
    let dataset = Dataset::load(&args.dataset, &args.set).with_context(|| {
        format!("could not load set [{}] from {:?}", args.set, args.dataset)
    })?;
    println!("Test data with {} samples.", dataset.len());

    let model = load_model(&args.model)
        .with_context(|| format!("could not load the model from {:?}", args.model))?;
    println!("Classifier: {}", model.classifier.describe());
    println!("Feature extractor: {}", model.extractor.name());
    println!("Feature extractor params: {}", Params(model.extractor.params()));
    if let Some(seed) = model.random_seed {
        info!("Model was trained with random seed {seed}");
    }

    let (features, labels) = pollen_classifier::extract_features(&dataset, model.extractor.as_ref())?;
    let predicted = predict_labels(model.classifier.as_ref(), features.view())?;
    save_predictions(&dataset, &predicted, &args.predictions, Some(&["sample", "species"][..]))
        .with_context(|| format!("could not save predictions to {:?}", args.predictions))?;
    println!("Saved predictions to {:?}", args.predictions);
    if args.only_labels {
        return Ok(());
    }

    let matrix = confusion_matrix(labels.view(), predicted.view(), CLASS_NAMES.len())?;
    let rates = recognition_rates(matrix.view())?;
    println!("Recognition rate per class:");
    for (name, rate) in CLASS_NAMES.iter().zip(rates.iter()) {
        println!("  {name:>14}: {rate:.4}");
    }
    let acc = accuracy(matrix.view())?;
    println!("Mean recognition rate: {}", mean_recognition_rate(rates.view()));
    println!("Accuracy: {acc}");
    report_size(&args.model, f64::from(acc), "Test final score")
}

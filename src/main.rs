// AB-SHEET - Turn scanned A/B assessment sheets into structured tables
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use ab_sheet::ml::{self, ModelPaths, TrainConfig};
use ab_sheet::{
    logger, AbClassifier, DirectorySink, ExtractionConfig, Extractor, SheetIdentity, Strategy, TextRecognizer,
};

#[derive(Parser)]
#[command(author, version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract the 18 x 20 table from a sheet image and print it as JSON
    Extract {
        /// JPEG or PNG scan of the sheet
        image: PathBuf,

        #[arg(long, value_enum, default_value_t = Mode::Grid)]
        mode: Mode,

        /// Classifier weights (safetensors); defaults to the data directory
        #[arg(long)]
        weights: Option<PathBuf>,

        /// JSON file overriding extraction settings
        #[arg(long)]
        config: Option<PathBuf>,

        /// Recognition service URL for text mode
        #[arg(long)]
        ocr_endpoint: Option<String>,

        /// Write intermediate images and cell crops here
        #[arg(long)]
        dump_cells: Option<PathBuf>,

        #[arg(long, default_value = "")]
        student: String,

        #[arg(long, default_value = "")]
        register: String,

        #[arg(long, default_value = "")]
        date: String,

        #[arg(long)]
        pretty: bool,
    },
    /// Train the A/B classifier from <DATA>/{train,val}/{A,B}
    Train {
        #[arg(long)]
        data: PathBuf,

        /// Where to write the best weights; defaults to the data directory
        #[arg(long)]
        out: Option<PathBuf>,

        #[arg(long, default_value_t = 15)]
        epochs: usize,

        #[arg(long, default_value_t = 64)]
        batch_size: usize,

        #[arg(long, default_value_t = 0.001)]
        lr: f64,
    },
    /// List the tensors in a weights file and check that it loads
    InspectWeights { path: Option<PathBuf> },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Fixed grid scored by the trained network
    Grid,
    /// Text recognition with row grouping and symbol heuristics
    Text,
}

fn main() -> Result<()> {
    logger::init();
    let args = Args::parse();

    match args.command {
        Command::Extract {
            image,
            mode,
            weights,
            config,
            ocr_endpoint,
            dump_cells,
            student,
            register,
            date,
            pretty,
        } => {
            let config = match config {
                Some(path) => ExtractionConfig::from_file(&path)
                    .with_context(|| format!("loading config {}", path.display()))?,
                None => ExtractionConfig::default(),
            };
            let strategy = match mode {
                Mode::Grid => grid_strategy(weights, &config)?,
                Mode::Text => Strategy::HeuristicText {
                    recognizer: text_recognizer(ocr_endpoint)?,
                },
            };

            let mut extractor = Extractor::new(config, strategy);
            if let Some(dir) = dump_cells {
                let sink = DirectorySink::new(&dir)
                    .with_context(|| format!("creating diagnostics directory {}", dir.display()))?;
                extractor = extractor.with_sink(Arc::new(sink));
            }

            let bytes = std::fs::read(&image).with_context(|| format!("reading {}", image.display()))?;
            let identity = SheetIdentity {
                student_name: student,
                register_number: register,
                assessment_date: date,
            };
            let envelope = extractor.extract(&bytes, &identity);
            println!("{}", envelope.to_json(pretty)?);
            if !envelope.is_success() {
                std::process::exit(1);
            }
        }
        Command::Train {
            data,
            out,
            epochs,
            batch_size,
            lr,
        } => {
            let out = match out {
                Some(path) => path,
                None => default_weights()?.weights_path,
            };
            let config = TrainConfig {
                epochs,
                batch_size,
                learning_rate: lr,
            };
            let device = ml::default_device();
            let summary = ml::train(&data, &out, &config, &device)
                .with_context(|| format!("training from {}", data.display()))?;
            info!(
                "best validation accuracy {:.3}, weights at {}",
                summary.best_val_accuracy,
                summary.weights.display()
            );
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::InspectWeights { path } => {
            let path = match path {
                Some(path) => path,
                None => default_weights()?.weights_path,
            };
            inspect_weights(&path)?;
        }
    }

    Ok(())
}

fn default_weights() -> Result<ModelPaths> {
    ModelPaths::resolve().context("no data directory on this platform; pass a weights path explicitly")
}

fn grid_strategy(weights: Option<PathBuf>, config: &ExtractionConfig) -> Result<Strategy> {
    let path = match weights {
        Some(path) => path,
        None => default_weights()?.weights_path,
    };
    let device = ml::default_device();
    let classifier = AbClassifier::load_with_threshold(&path, &device, config.decision_threshold)
        .with_context(|| format!("loading classifier weights {}", path.display()))?;
    Ok(Strategy::LearnedGrid {
        classifier: Arc::new(classifier),
    })
}

#[allow(unused_variables)]
fn text_recognizer(endpoint: Option<String>) -> Result<Arc<dyn TextRecognizer>> {
    #[cfg(feature = "remote-ocr")]
    {
        if let Some(endpoint) = endpoint {
            let recognizer = ab_sheet::ocr::HttpRecognizer::new(endpoint, std::time::Duration::from_secs(60))?;
            return Ok(Arc::new(recognizer));
        }
    }

    #[cfg(feature = "ocr")]
    {
        use ab_sheet::ocr::models::OcrModelPaths;

        let paths = OcrModelPaths::resolve().context("no cache directory for OCR models")?;
        let missing = paths.missing();
        if !missing.is_empty() {
            let list: Vec<String> = missing
                .iter()
                .map(|(path, url)| format!("  {} (from {})", path.display(), url))
                .collect();
            bail!("OCR models not found:\n{}", list.join("\n"));
        }
        let recognizer = ab_sheet::ocr::OcrsRecognizer::load(&paths).context("loading OCR models")?;
        return Ok(Arc::new(recognizer));
    }

    #[allow(unreachable_code)]
    {
        bail!("text mode needs the `ocr` feature, or `remote-ocr` with --ocr-endpoint")
    }
}

fn inspect_weights(path: &Path) -> Result<()> {
    let infos = ml::inspect(path).with_context(|| format!("reading {}", path.display()))?;
    for info in &infos {
        println!("{:<28} {:<5} {:?}", info.name, info.dtype, info.shape);
    }

    let missing = ml::model_loader::missing_tensors(&infos);
    if !missing.is_empty() {
        bail!("{} is missing {} tensors: {}", path.display(), missing.len(), missing.join(", "));
    }
    AbClassifier::load(path, &ml::default_device()).with_context(|| format!("loading {}", path.display()))?;
    println!("{} tensors, loads cleanly", infos.len());
    Ok(())
}

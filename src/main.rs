use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rand::Rng;

use echo_infer::backend::{BackendKind, BackendResolver, ResolveRequest};
use echo_infer::config::EchoConfig;
use echo_infer::preprocess::{
    audio_to_mfcc, audio_to_spectrogram, preprocess_audio, preprocess_image, AudioOptions,
    ImageOptions, MfccOptions, SpectrogramOptions,
};
use echo_infer::tensor::Tensor;

#[derive(Parser)]
#[command(
    name = "echo-infer",
    about = "Edge inference with accelerator-first backend resolution",
    version,
    long_about = None
)]
struct Cli {
    /// Config file (defaults: $ECHO_CONFIG, then /etc/echo/echo.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Diagnose platform, accelerator, CPU runtimes and media decoders
    Check {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Resolve a backend and run it on random input
    Demo {
        #[command(flatten)]
        model: ModelArgs,
    },

    /// Preprocess an image and run inference on it
    Vision {
        /// Input image file
        #[arg(long, short = 'i')]
        image: PathBuf,

        #[command(flatten)]
        model: ModelArgs,

        /// Target height (default from config)
        #[arg(long)]
        height: Option<u32>,

        /// Target width (default from config)
        #[arg(long)]
        width: Option<u32>,

        /// Convert to single-channel luminance
        #[arg(long)]
        grayscale: bool,
    },

    /// Preprocess an audio file and run inference on it
    Audio {
        /// Input audio file
        #[arg(long, short = 'a')]
        audio: PathBuf,

        #[command(flatten)]
        model: ModelArgs,

        /// Target sample rate in Hz (default from config)
        #[arg(long)]
        sample_rate: Option<u32>,

        /// Trim or pad to this many seconds
        #[arg(long)]
        duration: Option<f32>,

        /// Feature representation fed to the model
        #[arg(long, value_enum, default_value_t = FeatureKind::Raw)]
        features: FeatureKind,
    },

    /// Copy a model into the runtime directory and record it in the manifest
    Deploy {
        /// Logical model ID (e.g. `vision_v1`)
        #[arg(long)]
        model_id: String,

        /// Model file to deploy
        #[arg(long)]
        model_path: PathBuf,

        /// Target backend
        #[arg(long, default_value = "akida", value_parser = echo_infer::deploy::DEPLOY_BACKENDS)]
        backend: String,

        /// Runtime directory
        #[arg(long, default_value = "./runtime")]
        runtime_dir: PathBuf,
    },
}

#[derive(clap::Args)]
struct ModelArgs {
    /// Model file (auto-detected if not provided)
    #[arg(long)]
    model: Option<PathBuf>,

    /// Force a backend (accelerator|akida, onnx, tflite|lite, dummy)
    #[arg(long)]
    backend: Option<BackendKind>,
}

impl ModelArgs {
    fn request(&self) -> ResolveRequest {
        ResolveRequest {
            backend: self.backend,
            model_path: self.model.clone(),
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum FeatureKind {
    Raw,
    Spectrogram,
    Mfcc,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EchoConfig::load(path)?,
        // Config fallback warnings are emitted before init_tracing runs.
        None => {
            tracing::subscriber::with_default(bootstrap_subscriber(), EchoConfig::load_or_default)
        }
    };
    init_tracing(&config, cli.json_logs);

    match cli.command {
        Commands::Check { json } => {
            tracing::info!("Running self-test");
            let report = echo_infer::selftest::run(&config);
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("\nEcho Inference Self-Test");
                println!("{:<22} | {:<6} | Details", "Component", "Status");
                println!("{:-<22}-|-{:-<6}-|-{:-<40}", "", "", "");
                for res in &report.results {
                    println!(
                        "{:<22} | {:<6} | {}",
                        res.component,
                        res.status.label(),
                        res.details
                    );
                    if let Some(rem) = &res.remediation {
                        println!("{:<22} | {:<6} |   -> Recommendation: {}", "", "", rem);
                    }
                }
                println!("\n=== Readiness ===");
                for (capability, ready) in &report.readiness {
                    let mark = if *ready { "READY" } else { "NOT READY" };
                    println!("{:<22} : {}", capability, mark);
                }
                println!();
            }
            let code = report.exit_code();
            if code != 0 {
                std::process::exit(code);
            }
        }
        Commands::Demo { model } => {
            let mut rng = rand::thread_rng();
            let values: Vec<f32> = (0..128).map(|_| rng.gen::<f32>()).collect();
            let input = Tensor::from_shape_vec(&[1, 128], values)?;
            run_inference(&config, &model, &input)?;
        }
        Commands::Vision {
            image,
            model,
            height,
            width,
            grayscale,
        } => {
            let mut options = ImageOptions::from(&config.vision);
            if let Some(h) = height {
                options.target_shape.0 = h;
            }
            if let Some(w) = width {
                options.target_shape.1 = w;
            }
            options.grayscale |= grayscale;

            tracing::info!(image = %image.display(), ?options, "Preprocessing image");
            let input = preprocess_image(&image, &options)
                .with_context(|| format!("failed to preprocess {}", image.display()))?;
            println!("Preprocessed shape: {:?}", input.shape());
            run_inference(&config, &model, &input)?;
        }
        Commands::Audio {
            audio,
            model,
            sample_rate,
            duration,
            features,
        } => {
            let mut options = AudioOptions::from(&config.audio);
            if let Some(sr) = sample_rate {
                options.sample_rate = sr;
            }
            options.duration = duration;

            tracing::info!(audio = %audio.display(), ?options, "Preprocessing audio");
            let samples = preprocess_audio(&audio, &options)
                .with_context(|| format!("failed to preprocess {}", audio.display()))?;
            println!("Preprocessed shape: {:?}", samples.shape());

            let input = match features {
                FeatureKind::Raw => samples,
                FeatureKind::Spectrogram => {
                    let mut spec = SpectrogramOptions::from(&config.audio);
                    spec.sample_rate = options.sample_rate;
                    audio_to_spectrogram(&samples, &spec)?
                }
                FeatureKind::Mfcc => {
                    let mut mfcc = MfccOptions::from(&config.audio);
                    mfcc.sample_rate = options.sample_rate;
                    audio_to_mfcc(&samples, &mfcc)?
                }
            };
            println!("Feature shape: {:?}", input.shape());
            run_inference(&config, &model, &input)?;
        }
        Commands::Deploy {
            model_id,
            model_path,
            backend,
            runtime_dir,
        } => {
            let record =
                echo_infer::deploy::deploy_model(&model_id, &model_path, &backend, &runtime_dir)?;
            println!("Deployed {} ({}) -> {}", record.id, record.backend, record.path.display());
        }
    }

    Ok(())
}

fn bootstrap_subscriber() -> impl tracing::Subscriber + Send + Sync {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish()
}

fn init_tracing(config: &EchoConfig, json_flag: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json_flag || config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run_inference(config: &EchoConfig, model: &ModelArgs, input: &Tensor) -> Result<()> {
    let resolver = BackendResolver::from_config(config);
    let mut resolution = resolver.resolve(&model.request())?;
    println!("Backend: {}", resolution.kind());
    if let Some(source) = resolution.handle.source() {
        println!("Model:   {}", source.display());
    }
    for failure in &resolution.failures {
        println!(
            "  skipped {} ({}): {}",
            failure.candidate.kind,
            failure.candidate.path.display(),
            failure.reason
        );
    }

    let output = resolution.handle.predict(input)?;
    print_output(&output);
    Ok(())
}

fn print_output(output: &Tensor) {
    let summary = output.summary();
    println!("Output shape: {:?}", summary.shape);
    let values = output.as_slice();
    if values.len() <= 20 {
        println!("Output values: {:?}", values);
    } else {
        println!(
            "Output values: {:?} ... ({} total, min {:.4}, max {:.4})",
            &values[..10],
            values.len(),
            summary.min,
            summary.max
        );
    }
    if output.ndim() == 1 {
        println!("Top 5:");
        for (rank, (index, value)) in output.top_k(5).into_iter().enumerate() {
            println!("  {}. class {:>4}: {:.4}", rank + 1, index, value);
        }
    }
}

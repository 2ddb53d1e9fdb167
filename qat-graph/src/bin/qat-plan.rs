use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::PathBuf,
};

use anyhow::Context;
use clap::Parser;
use qat_graph::{
    model_quantizer, BackendType, ExtraQuantizerConfig, GraphModel, ModelDescription,
    PrepareReport,
};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Prepares a model for quantization-aware training and reports where the
/// activation fake-quantizers go.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// JSON description of the model graph and its modules
    #[arg(short, long)]
    model: PathBuf,

    /// JSON file with extra exclusions and inclusions
    #[arg(short, long, env = "QAT_EXTRA_CONFIG")]
    extra_config: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value_t = BackendType::Tpu)]
    backend: BackendType,

    /// Where to write the report, stdout if not set
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Serialize)]
struct Plan {
    report: PrepareReport,
    prepared_model: ModelDescription,
}

fn main() -> anyhow::Result<()> {
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("failed to set global subscriber")?;
    let args = Args::parse();

    let extra = match &args.extra_config {
        Some(path) => ExtraQuantizerConfig::from_path(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ExtraQuantizerConfig::default(),
    };
    let description = ModelDescription::from_path(&args.model)
        .with_context(|| format!("loading {}", args.model.display()))?;
    let mut model = GraphModel::from_description(&description)?;

    let quantizer = model_quantizer(args.backend, &extra);
    let report = quantizer.prepare(&mut model)?;
    info!(
        "{} fake-quantizers inserted, {} weight layers wired",
        report.inserted_fake_quantizers.len(),
        report.attachments.len()
    );

    let plan = Plan {
        report,
        prepared_model: model.to_description(),
    };
    let writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(File::create(path).with_context(|| format!("creating {}", path.display()))?),
        None => Box::new(io::stdout()),
    };
    let mut writer = BufWriter::new(writer);
    serde_json::to_writer_pretty(&mut writer, &plan)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

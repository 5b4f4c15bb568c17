use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::Parser;
use tileblend::{BlendOptions, FormatKind, Layer, PngEncoderKind, QuantMode, TintSpec};

#[derive(Parser, Debug)]
#[command(name = "tileblend", version)]
#[command(about = "Blend raster layers into one PNG/JPEG/WebP image")]
struct Cli {
    /// Input layer images, bottom layer first.
    inputs: Vec<PathBuf>,

    /// JSON job description (layers + options); replaces positional inputs.
    #[arg(long, conflicts_with = "inputs")]
    job: Option<PathBuf>,

    /// Output file path.
    #[arg(long, short)]
    out: PathBuf,

    /// Output format: png, jpeg, jpg or webp.
    #[arg(long)]
    format: Option<FormatKind>,

    /// JPEG/WebP quality (0-100) or PNG color count (2-256).
    #[arg(long)]
    quality: Option<i32>,

    /// Target canvas width (derived from the top visible layer if omitted).
    #[arg(long)]
    width: Option<i32>,

    /// Target canvas height.
    #[arg(long)]
    height: Option<i32>,

    /// Background fill, e.g. "#336699" or "#33669980".
    #[arg(long)]
    matte: Option<String>,

    /// Force a full decode/composite/encode pass.
    #[arg(long)]
    reencode: bool,

    /// PNG quantization mode: octree or hextree.
    #[arg(long)]
    mode: Option<QuantMode>,

    /// PNG encoder backend: default or miniz.
    #[arg(long)]
    encoder: Option<PngEncoderKind>,

    /// Compression level (PNG 0-9/0-10, WebP 0-6).
    #[arg(long)]
    compression: Option<i32>,
}

#[derive(serde::Deserialize, Debug)]
#[serde(default, deny_unknown_fields)]
struct JobFile {
    layers: Vec<LayerDesc>,
    options: BlendOptions,
}

impl Default for JobFile {
    fn default() -> Self {
        Self {
            layers: Vec::new(),
            options: BlendOptions::default(),
        }
    }
}

#[derive(serde::Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct LayerDesc {
    file: PathBuf,
    #[serde(default)]
    x: i32,
    #[serde(default)]
    y: i32,
    #[serde(default)]
    tint: Option<TintSpec>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (layers, options) = match &cli.job {
        Some(path) => read_job_file(path)?,
        None => {
            let mut layers = Vec::with_capacity(cli.inputs.len());
            for path in &cli.inputs {
                layers.push(Layer::new(read_bytes(path)?));
            }
            (layers, options_from_flags(&cli))
        }
    };

    let output = tileblend::blend(layers, &options)?;
    for warning in &output.warnings {
        eprintln!("warning: {warning}");
    }
    std::fs::write(&cli.out, &output.bytes)
        .with_context(|| format!("write output '{}'", cli.out.display()))?;
    Ok(())
}

fn options_from_flags(cli: &Cli) -> BlendOptions {
    let defaults = BlendOptions::default();
    BlendOptions {
        quality: cli.quality.unwrap_or(defaults.quality),
        format: cli.format.unwrap_or(defaults.format),
        reencode: cli.reencode,
        width: cli.width.unwrap_or(defaults.width),
        height: cli.height.unwrap_or(defaults.height),
        matte: cli.matte.clone(),
        palette: None,
        mode: cli.mode.unwrap_or(defaults.mode),
        encoder: cli.encoder.unwrap_or(defaults.encoder),
        compression: cli.compression.unwrap_or(defaults.compression),
    }
}

fn read_job_file(path: &Path) -> anyhow::Result<(Vec<Layer>, BlendOptions)> {
    let f = File::open(path).with_context(|| format!("open job '{}'", path.display()))?;
    let job: JobFile = serde_json::from_reader(BufReader::new(f)).context("parse job JSON")?;

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let mut layers = Vec::with_capacity(job.layers.len());
    for desc in &job.layers {
        let resolved = if desc.file.is_relative() {
            base.join(&desc.file)
        } else {
            desc.file.clone()
        };
        let mut layer = Layer::new(read_bytes(&resolved)?).with_offset(desc.x, desc.y);
        if let Some(tint) = desc.tint {
            layer = layer.with_tint(tint.into());
        }
        layers.push(layer);
    }
    Ok((layers, job.options))
}

fn read_bytes(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("read layer '{}'", path.display()))
}

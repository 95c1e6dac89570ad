use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use strata_core::parsers::{parse_color, ColorValue};
use strata_core::{load_document, RenderOptions};
use tiny_skia::Pixmap;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the JSON element tree
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output PNG path
    #[arg(value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// JSON file with render options
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Resolution for absolute units, both axes
    #[arg(long)]
    dpi: Option<f64>,

    /// Output width in pixels (defaults to the document's size)
    #[arg(long)]
    width: Option<u32>,

    /// Output height in pixels (defaults to the document's size)
    #[arg(long)]
    height: Option<u32>,

    /// Background color, e.g. `white` or `#336699`
    #[arg(long)]
    background: Option<String>,

    /// Log level
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// Log format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Error => write!(f, "error"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Trace => write!(f, "trace"),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
enum LogFormat {
    Pretty,
    Json,
}

fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::builder()
        .with_default_directive(cli.log_level_directive())
        .from_env_lossy();

    let subscriber_builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match cli.log_format {
        LogFormat::Json => subscriber_builder.json().init(),
        LogFormat::Pretty => subscriber_builder.pretty().init(),
    }

    if let Err(e) = run(cli) {
        error!("Render failed: {:#}", e);
        std::process::exit(1);
    }
}

impl Cli {
    fn log_level_directive(&self) -> tracing_subscriber::filter::Directive {
        match self.log_level {
            LogLevel::Error => tracing::Level::ERROR.into(),
            LogLevel::Warn => tracing::Level::WARN.into(),
            LogLevel::Info => tracing::Level::INFO.into(),
            LogLevel::Debug => tracing::Level::DEBUG.into(),
            LogLevel::Trace => tracing::Level::TRACE.into(),
        }
    }

    fn options(&self) -> Result<RenderOptions> {
        let mut options = match &self.config {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("parsing config {}", path.display()))?
            }
            None => RenderOptions::default(),
        };
        if let Some(dpi) = self.dpi {
            options.dpi_x = dpi;
            options.dpi_y = dpi;
        }
        if let Some(raw) = &self.background {
            match parse_color(raw) {
                Some(ColorValue::Color(color)) => options.background = Some(color),
                _ => bail!("invalid background color `{raw}`"),
            }
        }
        Ok(options)
    }
}

fn run(cli: Cli) -> Result<()> {
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| cli.input.with_extension("png"));
    let options = cli.options()?;

    info!("Input: {:?}", cli.input);
    info!("Output: {:?}", output);

    let json = fs::read_to_string(&cli.input)
        .with_context(|| format!("reading {}", cli.input.display()))?;
    let document = load_document(&json, &options)?;

    let (intrinsic_w, intrinsic_h) = document.intrinsic_size(&options).unwrap_or((100, 100));
    let width = cli.width.unwrap_or(intrinsic_w);
    let height = cli.height.unwrap_or(intrinsic_h);
    let mut pixmap =
        Pixmap::new(width, height).ok_or_else(|| anyhow!("invalid output size {width}x{height}"))?;

    let stats = document.render(&mut pixmap, &options)?;
    info!(
        layers = stats.layers_allocated,
        max_layer_depth = stats.max_layer_depth,
        "Render complete."
    );
    save_png(&pixmap, &output)
}

fn save_png(pixmap: &Pixmap, path: &Path) -> Result<()> {
    pixmap
        .save_png(path)
        .with_context(|| format!("writing {}", path.display()))
}

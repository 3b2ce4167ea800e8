use clap::{Parser, Subcommand};
use imgbridge::bridge::{Bridge, EdgeOptions};
use imgbridge::config::{self, BridgeConfig};
use imgbridge::imaging::PixelLayout;
use imgbridge::output;
use imgbridge::request::{BatchTemplate, ImageSource, Request};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "imgbridge")]
#[command(about = "Load, transform and store images through ordered pipelines")]
#[command(long_about = "\
Load, transform and store images through ordered pipelines

Every command decodes its input, runs one or more operations on the worker
pool and writes the result atomically: a failed request never leaves a
partial file at its output path.

Inputs may be filesystem paths or bundled resources written as
`bundle:name` / `bundle:name.ext`, resolved under `resources.bundle_dir`.

Request files (`run`) are JSON:

  {
    \"input\": \"photo.jpg\",
    \"steps\": [
      { \"op\": \"blur\", \"radius\": 5 },
      { \"op\": \"crop\", \"x\": 0, \"y\": 0, \"width\": 320, \"height\": 240 }
    ],
    \"output\": \"out/result.png\"
  }

Batch templates (`batch`) carry only `steps` and an optional `extension`.

Run 'imgbridge gen-config' to generate a documented imgbridge.toml.")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ./imgbridge.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decode an image and print its dimensions and channel count
    Info { input: String },
    /// Gaussian blur
    Blur {
        input: String,
        output: PathBuf,
        /// Kernel width in pixels; must be odd
        #[arg(long, default_value_t = 5)]
        radius: u32,
    },
    /// Canny edge detection
    Edges {
        input: String,
        output: PathBuf,
        #[arg(long, default_value_t = 50.0)]
        low: f32,
        #[arg(long, default_value_t = 150.0)]
        high: f32,
        /// Gaussian kernel width applied before edge detection; must be odd
        #[arg(long)]
        blur: Option<u32>,
        /// Also write the inverted edge map here; OUTPUT then gets the
        /// original with edges outlined
        #[arg(long)]
        edge_map: Option<PathBuf>,
    },
    /// Cut a rectangular region
    Crop {
        input: String,
        output: PathBuf,
        #[arg(long)]
        x: u32,
        #[arg(long)]
        y: u32,
        #[arg(long)]
        width: u32,
        #[arg(long)]
        height: u32,
    },
    /// Composite FIRST over SECOND; both must have the same shape
    Combine {
        first: String,
        second: String,
        output: PathBuf,
    },
    /// Change the pixel layout
    Convert {
        input: String,
        output: PathBuf,
        /// rgba8, rgb8 or luma8
        #[arg(long, default_value_t = PixelLayout::Rgba8)]
        layout: PixelLayout,
    },
    /// Execute a JSON request file
    Run { request: PathBuf },
    /// Apply a JSON template to every image under a directory
    Batch {
        dir: PathBuf,
        out_dir: PathBuf,
        template: PathBuf,
    },
    /// Print a stock imgbridge.toml with all options documented
    GenConfig,
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if matches!(cli.command, Command::GenConfig) {
        print!("{}", config::stock_config_toml());
        return Ok(ExitCode::SUCCESS);
    }

    let config = load_config(cli.config.as_deref())?;
    let bridge = Bridge::from_config(&config)?;
    tracing::debug!(
        threads = bridge.threads(),
        bundle_dir = %config.resources.bundle_dir.display(),
        "bridge ready"
    );

    let (source, pending) = match cli.command {
        Command::Info { input } => {
            let source = ImageSource::from(input);
            (source.clone(), bridge.image_info(source))
        }
        Command::Blur {
            input,
            output,
            radius,
        } => {
            let source = ImageSource::from(input);
            (source.clone(), bridge.blur(source, output, radius))
        }
        Command::Edges {
            input,
            output,
            low,
            high,
            blur,
            edge_map,
        } => {
            let source = ImageSource::from(input);
            let mut options = EdgeOptions::new(low, high);
            options.blur = blur;
            options.edge_map = edge_map;
            let pending = bridge.detect_edges(source.clone(), output, options);
            (source, pending)
        }
        Command::Crop {
            input,
            output,
            x,
            y,
            width,
            height,
        } => {
            let source = ImageSource::from(input);
            let pending = bridge.crop(source.clone(), output, x, y, width, height);
            (source, pending)
        }
        Command::Combine {
            first,
            second,
            output,
        } => {
            let source = ImageSource::from(first);
            let pending = bridge.combine(source.clone(), second, output);
            (source, pending)
        }
        Command::Convert {
            input,
            output,
            layout,
        } => {
            let source = ImageSource::from(input);
            (source.clone(), bridge.convert(source, output, layout))
        }
        Command::Run { request } => {
            let request = Request::from_json(&std::fs::read_to_string(&request)?)?;
            (request.input.clone(), bridge.submit(request))
        }
        Command::Batch {
            dir,
            out_dir,
            template,
        } => {
            let template: BatchTemplate =
                serde_json::from_str(&std::fs::read_to_string(&template)?)?;
            let items = bridge.batch(&dir, &out_dir, &template)?;
            output::print_batch(&items, &dir);
            let all_ok = items
                .iter()
                .all(|item| matches!(item.response, Some(Ok(_))));
            return Ok(exit_code(all_ok));
        }
        Command::GenConfig => return Ok(ExitCode::SUCCESS),
    };

    let response = pending.wait();
    output::print_response(&source, response.as_ref());
    Ok(exit_code(matches!(response, Some(Ok(_)))))
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Install the fmt subscriber on stderr. `--verbose` forces debug; otherwise
/// `RUST_LOG` applies, defaulting to info.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// An explicit `--config` must exist; the default file is optional.
fn load_config(explicit: Option<&Path>) -> Result<BridgeConfig, Box<dyn std::error::Error>> {
    match explicit {
        Some(path) if !path.exists() => {
            Err(format!("config file not found: {}", path.display()).into())
        }
        Some(path) => Ok(config::load_config(path)?),
        None => Ok(config::load_config(Path::new(config::DEFAULT_CONFIG_FILE))?),
    }
}

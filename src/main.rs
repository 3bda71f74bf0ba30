use clap::{Parser, Subcommand};
use std::path::PathBuf;
use wallfit::cache::ArtifactCache;
use wallfit::imaging::ResampleEnlarger;
use wallfit::plan::UpscaleMode;
use wallfit::{config, device, output, process};

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "wallfit")]
#[command(about = "Turn bucket-sized base images into exact-size device wallpapers")]
#[command(long_about = "\
Turn bucket-sized base images into exact-size device wallpapers

Base images are rendered at four aspect-ratio buckets. Each device in the
device table draws from the bucket closest to its aspect ratio; the base is
enlarged once per (bucket, method) and cover-fitted to every device.

Output directory:

  output/
  ├── 000_00_base_896x1920.png                 # Base image, bucket 0
  ├── 000_00_base_1728x960.png                 # Base image, bucket 3
  ├── 000_00_upscaled_upscale2x_1792x3840.png  # Shared enlargement
  ├── 000_00_iphone-15-pro.jpg                 # Final wallpaper
  └── .wallfit-report.json                     # Report of the last run

Every artifact that already exists is skipped, so an interrupted run resumes
where it stopped.

Run 'wallfit gen-config' to generate a documented wallfit.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Output directory holding base images, intermediates and finals
    #[arg(long, default_value = "output", global = true)]
    output_dir: PathBuf,

    /// Configuration file
    #[arg(long, default_value = "wallfit.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the device table with bucket, factor and enlargement per device
    Table {
        /// Override the configured upscale mode
        #[arg(long)]
        mode: Option<UpscaleMode>,
    },
    /// Report cached artifacts and pending work
    Status,
    /// Enlarge and finalize everything that is missing
    Run {
        /// Override the configured upscale mode
        #[arg(long)]
        mode: Option<UpscaleMode>,
    },
    /// Print a stock wallfit.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Table { mode } => {
            let config = config::load_config(&cli.config)?;
            let options = run_options(&config, mode);
            let resolved = device::resolve(&config.devices, &options.enabled_buckets);
            output::print_device_table(&resolved, options.mode, &options.methods);
        }
        Command::Status => {
            let config = config::load_config(&cli.config)?;
            let options = run_options(&config, None);
            let cache = ArtifactCache::new(&cli.output_dir);
            let report = process::status(&cache, &config.devices, &options)?;
            output::print_status(&report);
        }
        Command::Run { mode } => {
            let config = config::load_config(&cli.config)?;
            init_thread_pool(&config.processing);
            let options = run_options(&config, mode);
            let cache = ArtifactCache::new(&cli.output_dir);

            println!("==> Processing {}", cli.output_dir.display());
            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_process_event(&event) {
                        println!("{}", line);
                    }
                }
            });
            let report = process::run(
                &ResampleEnlarger,
                &cache,
                &config.devices,
                &options,
                Some(tx),
            )?;
            printer.join().ok();
            output::print_summary(&report);
            println!(
                "==> Report: {}",
                process::report_path(&cache).display()
            );
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

fn run_options(config: &config::WallfitConfig, mode: Option<UpscaleMode>) -> process::RunOptions {
    let mut options = process::RunOptions::from_config(config);
    if let Some(mode) = mode {
        options.mode = mode;
    }
    options
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

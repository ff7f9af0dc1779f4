use clap::{Parser, Subcommand};
use dotenv::dotenv;
use fwi::config::InversionConfig;
use fwi::postprocess::KernelPostprocessor;
use fwi::FwiResult;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fwi_kernels")]
#[command(about = "Sum, smooth and clip sensitivity kernels", long_about = None)]
struct Cli {
    /// Inversion configuration (JSON)
    #[arg(long, env = "FWI_CONFIG")]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sum per-source kernels in PATH into PATH/sum
    Combine { path: PathBuf },
    /// Gaussian smoothing with the given half-width
    Smooth {
        path: PathBuf,
        #[arg(long)]
        span: f64,
    },
    /// Clip kernel values; omitted bounds are unbounded
    Clip {
        path: PathBuf,
        #[arg(long, allow_hyphen_values = true)]
        min: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        max: Option<f64>,
    },
}

fn main() {
    dotenv().ok();
    fwi::init_tracing("fwi-kernels");
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("[fwi] {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> FwiResult<()> {
    let config = InversionConfig::from_file(&cli.config)?.check()?;
    let post = KernelPostprocessor::from_config(&config);

    match cli.command {
        Commands::Combine { path } => post.combine(&path)?,
        Commands::Smooth { path, span } => post.smooth(&path, span)?,
        Commands::Clip { path, min, max } => post.clip(
            &path,
            min.unwrap_or(f64::NEG_INFINITY),
            max.unwrap_or(f64::INFINITY),
        )?,
    }
    println!("[fwi] done");
    Ok(())
}

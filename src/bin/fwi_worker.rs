use clap::{Parser, Subcommand};
use dotenv::dotenv;
use fwi::config::{InversionConfig, ValidatedConfig};
use fwi::evaluator::Evaluator;
use fwi::model_store::ModelStore;
use fwi::preprocess::ExternalPreprocessor;
use fwi::solver::backend_for;
use fwi::sources::{SourceRegistry, WorkerIdentity};
use fwi::tool_runner::ToolRunner;
use fwi::vector::{load_vector, merge, save_vector, split};
use fwi::{FwiError, FwiResult};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fwi_worker")]
#[command(about = "Per-source solver driver for waveform inversion", long_about = None)]
struct Cli {
    /// Inversion configuration (JSON)
    #[arg(long, env = "FWI_CONFIG")]
    config: PathBuf,
    /// Worker rank assigned by the scheduler
    #[arg(long, env = "FWI_WORKER_INDEX", default_value_t = 0)]
    worker: usize,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and exit
    Check,
    /// List sources and their worker assignment
    Sources,
    /// Prepare the working directory, data and initial model
    Setup,
    /// Forward simulation and misfit for {path}/model
    EvalFunc {
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        export_traces: bool,
    },
    /// Adjoint simulation and kernel export
    EvalGrad {
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        export_traces: bool,
    },
    /// Hessian-vector product for {path}/model
    ApplyHess {
        #[arg(long)]
        path: PathBuf,
    },
    /// Flatten a model directory into an optimizer vector
    Merge {
        #[arg(long)]
        model: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
    /// Write an optimizer vector out as a model directory
    Split {
        #[arg(long)]
        vector: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
}

fn main() {
    dotenv().ok();
    fwi::init_tracing("fwi-worker");
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("[fwi] {}", e);
        std::process::exit(1);
    }
}

fn preprocessor(config: &ValidatedConfig) -> FwiResult<ExternalPreprocessor> {
    let program = config
        .preprocess_exec
        .clone()
        .ok_or_else(|| FwiError::MissingParameter("preprocess_exec".into()))?;
    Ok(ExternalPreprocessor::new(program, ToolRunner::new(Vec::new(), config.tool_timeout)))
}

fn run(cli: Cli) -> FwiResult<()> {
    let config = InversionConfig::from_file(&cli.config)?.check()?;
    let backend = backend_for(config.solver);
    let registry = SourceRegistry::for_prefix(
        &config.paths.specfem_data,
        backend.source_prefix(),
        &config.paths.solver,
    );
    let worker = WorkerIdentity::new(cli.worker);
    let prefix = backend.model_prefix();

    match cli.command {
        Commands::Check => {
            println!(
                "[fwi] configuration ok: solver={} nproc={} parameters={}",
                backend.name(),
                config.nproc,
                config.parameters
            );
        }
        Commands::Sources => {
            for (index, name) in registry.names()?.iter().enumerate() {
                println!("{:>5}  {}  {}", index, name, registry.working_directory(name).display());
            }
        }
        Commands::Setup => {
            let pre = preprocessor(&config)?;
            Evaluator::new(&config, backend.as_ref(), &pre, &registry, worker).setup()?;
        }
        Commands::EvalFunc { path, export_traces } => {
            let pre = preprocessor(&config)?;
            Evaluator::new(&config, backend.as_ref(), &pre, &registry, worker)
                .eval_func(&path, export_traces)?;
        }
        Commands::EvalGrad { path, export_traces } => {
            let pre = preprocessor(&config)?;
            Evaluator::new(&config, backend.as_ref(), &pre, &registry, worker)
                .eval_grad(&path, export_traces)?;
        }
        Commands::ApplyHess { path } => {
            let pre = preprocessor(&config)?;
            Evaluator::new(&config, backend.as_ref(), &pre, &registry, worker).apply_hess(&path)?;
        }
        Commands::Merge { model, output } => {
            let store = ModelStore::from_config(&config);
            let v = merge(&store.load(&model, prefix, "", false)?)?;
            save_vector(&output, &v)?;
            println!("[fwi] wrote {} values to {}", v.len(), output.display());
        }
        Commands::Split { vector, output } => {
            let store = ModelStore::from_config(&config);
            let model = split(&load_vector(&vector)?, store.parameters(), store.nproc())?;
            store.save(&output, &model, prefix, "")?;
            println!("[fwi] wrote model to {}", output.display());
        }
    }
    Ok(())
}

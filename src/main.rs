//! crayfish CLI: run a partitioned COA search and print the aggregate, or
//! act as one stage of a piped run (`tasks | worker | gather`).

use std::io::{self, BufReader};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use u_crayfish::benchmark::Benchmark;
use u_crayfish::coa::Bounds;
use u_crayfish::config::{ExecutionMode, RunConfig};
use u_crayfish::scatter::{serve, ScatterRunner, ServeOptions};
use u_crayfish::transport::{gather_partials, GatherOptions, LineConsumer, LineProducer, WireFormat};

#[derive(Parser)]
#[command(name = "crayfish")]
#[command(about = "Crayfish Optimization Algorithm with scatter/gather execution")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Flags shared by commands that build a run configuration.
#[derive(Args)]
struct RunArgs {
    /// JSON run configuration; flags override its fields
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Execution mode: independent, coupled, distributed or brokered
    #[arg(short, long)]
    mode: Option<ExecutionMode>,

    /// Total population size
    #[arg(short = 'n', long)]
    population: Option<usize>,

    /// Number of partitions
    #[arg(short = 'k', long)]
    partitions: Option<usize>,

    /// Iterations per search
    #[arg(short = 't', long)]
    iterations: Option<usize>,

    /// Benchmark function, e.g. F6
    #[arg(short = 'f', long)]
    function: Option<String>,

    /// Dimension of a scalable function
    #[arg(short, long)]
    dimension: Option<usize>,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Worker-pool size in distributed and brokered modes
    #[arg(short, long)]
    workers: Option<usize>,

    /// Gather deadline in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Payload format in distributed and brokered modes: json or text
    #[arg(long)]
    format: Option<WireFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one optimization and print the aggregate as JSON
    Run {
        #[command(flatten)]
        args: RunArgs,

        /// Also print every partition's result
        #[arg(long)]
        partials: bool,
    },

    /// Partition a run and write one JSON task per line to stdout
    Tasks {
        #[command(flatten)]
        args: RunArgs,
    },

    /// Read JSON tasks from stdin, search each, write JSON results to stdout
    Worker {
        /// Exit after this many tasks
        #[arg(long)]
        max_tasks: Option<usize>,
    },

    /// Read JSON results from stdin and print their aggregate
    Gather {
        /// Number of results to wait for
        #[arg(short = 'k', long, default_value_t = 4)]
        partitions: usize,

        /// Required trace length
        #[arg(short = 't', long)]
        iterations: Option<usize>,

        /// Deadline in milliseconds
        #[arg(long, default_value_t = 30_000)]
        timeout_ms: u64,

        /// Also print every gathered result
        #[arg(long)]
        partials: bool,
    },

    /// List the registered benchmark functions
    Functions,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run { args, partials } => cmd_run(args, partials),
        Commands::Tasks { args } => cmd_tasks(args),
        Commands::Worker { max_tasks } => cmd_worker(max_tasks),
        Commands::Gather {
            partitions,
            iterations,
            timeout_ms,
            partials,
        } => cmd_gather(partitions, iterations, timeout_ms, partials),
        Commands::Functions => {
            cmd_functions();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

impl RunArgs {
    fn into_config(self) -> Result<RunConfig, Box<dyn std::error::Error>> {
        let mut config = match self.config {
            Some(path) => RunConfig::from_path(path)?,
            None => RunConfig::default(),
        };
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(n) = self.population {
            config.population_size = n;
        }
        if let Some(k) = self.partitions {
            config.partitions = k;
        }
        if let Some(t) = self.iterations {
            config.iterations = t;
        }
        if let Some(f) = self.function {
            config.function = f;
        }
        if let Some(dim) = self.dimension {
            config.dimension = Some(dim);
        }
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        if let Some(workers) = self.workers {
            config.workers = Some(workers);
        }
        if let Some(ms) = self.timeout_ms {
            config.timeout_ms = ms;
        }
        if let Some(format) = self.format {
            config.format = format;
        }
        Ok(config)
    }
}

fn cmd_run(args: RunArgs, print_partials: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.into_config()?;
    let objective = config.resolve()?;

    let start = Instant::now();
    let result = ScatterRunner::run(&objective, &config)?;
    let elapsed: Duration = start.elapsed();
    tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "run complete");

    println!("{}", serde_json::to_string_pretty(&result.aggregate)?);
    if print_partials {
        println!("{}", serde_json::to_string_pretty(&result.partials)?);
    }
    Ok(())
}

fn cmd_tasks(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    // Pipes carry one payload per line.
    let config = args.into_config()?.with_format(WireFormat::Json);
    let producer = LineProducer::new(io::stdout());
    ScatterRunner::publish_tasks(&config, &producer)?;
    Ok(())
}

fn cmd_worker(max_tasks: Option<usize>) -> Result<(), Box<dyn std::error::Error>> {
    let mut tasks = LineConsumer::new(BufReader::new(io::stdin()));
    let results = LineProducer::new(io::stdout());
    let mut options = ServeOptions::default();
    if let Some(max) = max_tasks {
        options = options.with_max_tasks(max);
    }
    let stats = serve(&mut tasks, &results, WireFormat::Json, &options)?;
    if stats.rejected > 0 {
        tracing::warn!(rejected = stats.rejected, "some tasks were dropped");
    }
    Ok(())
}

fn cmd_gather(
    partitions: usize,
    iterations: Option<usize>,
    timeout_ms: u64,
    print_partials: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut results = LineConsumer::new(BufReader::new(io::stdin()));
    let mut options =
        GatherOptions::new(partitions).with_timeout(Duration::from_millis(timeout_ms));
    if let Some(t) = iterations {
        options = options.with_iterations(t);
    }
    let (aggregate, partials) = gather_partials(&mut results, WireFormat::Json, &options)?;

    println!("{}", serde_json::to_string_pretty(&aggregate)?);
    if print_partials {
        println!("{}", serde_json::to_string_pretty(&partials)?);
    }
    Ok(())
}

fn format_bounds(bounds: &Bounds) -> String {
    match bounds {
        Bounds::Uniform { lower, upper } => format!("[{lower}, {upper}]"),
        Bounds::PerDimension { lower, upper } => lower
            .iter()
            .zip(upper)
            .map(|(l, u)| format!("[{l}, {u}]"))
            .collect::<Vec<_>>()
            .join(" x "),
    }
}

fn cmd_functions() {
    println!("{:<5} {:<34} {:>5}  bounds", "id", "function", "dim");
    for b in Benchmark::ALL {
        let dim = if b.is_scalable() {
            format!("{}*", b.default_dim())
        } else {
            b.default_dim().to_string()
        };
        println!(
            "{:<5} {:<34} {:>5}  {}",
            b.name(),
            b.description(),
            dim,
            format_bounds(&b.bounds())
        );
    }
    println!();
    println!("* scalable: override with --dimension");
}

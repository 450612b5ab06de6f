use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use common::{aggregate::Aggregator, chart::render_chunk_means, config::Config};
use eyre::{Context, Result};
use tracing::{debug, error, info};
use tracing_subscriber::{
    EnvFilter,
    fmt::{layer, time::ChronoLocal},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

const MODULES: &[&str] = &["common"];

#[derive(Parser)]
#[command(version, about = "Plot file transfer time against chunk size")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Extra tracing directives, ie. `common=trace`
    #[arg(short, long, global = true)]
    log: Vec<String>,
}

#[derive(Args)]
struct Source {
    /// Directory holding the `output_<run>_<chunk>.log` files
    #[arg(short, long)]
    dir: Option<PathBuf>,
    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the transfer time bar chart
    Plot {
        #[command(flatten)]
        source: Source,
        /// Chart image, .png or .svg
        #[arg(short, long, default_value = "chunk-size.png")]
        output: PathBuf,
    },
    /// Print the mean transfer time of every chunk size
    Means {
        #[command(flatten)]
        source: Source,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// List result files found for every chunk size
    Ls {
        #[command(flatten)]
        source: Source,
    },
}

impl Source {
    fn load(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        if let Some(dir) = &self.dir {
            config.results_dir = dir.clone();
        }
        debug!("Using config {config:?}");
        Ok(config)
    }
}

fn main() -> Result<()> {
    let log_level = std::env::var("RUST_LOG").unwrap_or("warn".to_owned());
    let args = Cli::parse();

    let mut env_filter = EnvFilter::new(format!("chunk_plot={log_level}"));
    for log in &args.log {
        env_filter = env_filter.add_directive(log.parse()?);
    }
    for module in MODULES {
        if !args.log.iter().any(|x| x.starts_with(module)) {
            env_filter = env_filter.add_directive(format!("{module}={log_level}").parse()?);
        }
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            layer()
                .with_timer(ChronoLocal::new("%v %k:%M:%S %z".to_owned()))
                .compact(),
        )
        .init();

    let res = match args.command {
        Commands::Plot { source, output } => plot(&source, output),
        Commands::Means { source, json } => print_means(&source, json),
        Commands::Ls { source } => list_results(&source),
    };
    if let Err(err) = res {
        error!("{err:#?}");
        return Err(err);
    }
    Ok(())
}

fn plot(source: &Source, output: PathBuf) -> Result<()> {
    let config = source.load()?;
    let means = Aggregator::new(&config.results_dir)
        .chunk_means(&config.sweep)
        .wrap_err_with(|| format!("Aggregating results in {:?}", config.results_dir))?;
    let chart = render_chunk_means(&means, &config.chart)?;
    chart
        .save(&output)
        .wrap_err_with(|| format!("Rendering {output:?}"))?;
    info!("Plotted {} chunk sizes", means.len());
    println!("Chart written to {}", output.display());
    Ok(())
}

fn print_means(source: &Source, json: bool) -> Result<()> {
    let config = source.load()?;
    let means = Aggregator::new(&config.results_dir)
        .chunk_means(&config.sweep)
        .wrap_err_with(|| format!("Aggregating results in {:?}", config.results_dir))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&means)?);
        return Ok(());
    }
    for mean in means {
        println!(
            "{:>5} {:>10.3} s ({} runs)",
            mean.label, mean.mean, mean.samples
        );
    }
    Ok(())
}

fn list_results(source: &Source) -> Result<()> {
    let config = source.load()?;
    let inventory = Aggregator::new(&config.results_dir).inventory(&config.sweep)?;
    for (chunk_size, files) in inventory {
        println!("{} ({chunk_size} bytes) -> {} files", chunk_size.label(), files.len());
        for file in files {
            println!("  run {:<6} {}", file.run_index, file.path.display());
        }
    }
    Ok(())
}

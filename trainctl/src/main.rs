#[macro_use]
extern crate tracing;

use crate::config::CliConfig;
use crate::output::{OutputFormat, OutputFormatter};
use crate::repository::installer::HelmInstaller;
use crate::repository::job_index::JobIndexConfigMap;
use crate::repository::k8s::{ClusterReader, K8sImpl};
use crate::repository::metrics::{
    KubeNodeMetrics, MetricsSource, PrometheusMetrics,
};
use crate::repository::registry::{ConfigMapRegistry, JobRegistry};
use crate::service::lifecycle::{JobLifecycle, JobLifecycleImpl, SubmitRequest};
use crate::service::registration::RegistrationImpl;
use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use helper::{env_load, env_var};
#[cfg(feature = "mimalloc")]
use mimalloc::MiMalloc;
use model::JobName;
use std::path::PathBuf;
use std::sync::Arc;

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

mod config;
mod controller;
mod output;
mod repository;
mod service;

env_var!(USER);

/// Inspect and submit GPU training workloads
#[derive(Debug, Parser)]
#[command(name = "trainctl", version)]
struct Cli {
    /// Project to work in, defaults to the configured project
    #[arg(short, long, global = true)]
    project: Option<String>,

    /// Work across every project
    #[arg(short = 'A', long, global = true)]
    all_projects: bool,

    #[arg(short, long, value_enum, default_value_t, global = true)]
    output: OutputFormat,

    /// Increase logging, repeat for more
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show resource usage
    Top {
        #[command(subcommand)]
        resource: TopResource,
    },
    /// List jobs
    List,
    /// Show one job
    Get { name: String },
    /// Submit a job
    Submit(SubmitArgs),
    /// Delete jobs and release their names
    Delete {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Delete jobs that stopped running
    Prune {
        #[arg(long, default_value_t = 0)]
        days: i64,
        #[arg(long, default_value_t = 0)]
        hours: i64,
    },
}

#[derive(Debug, Subcommand)]
enum TopResource {
    /// GPU, CPU and memory of every node
    Node {
        /// List the GPU pods of each node
        #[arg(long)]
        details: bool,
    },
}

#[derive(Debug, Args)]
struct SubmitArgs {
    name:          String,
    #[arg(short, long)]
    image:         String,
    /// GPUs to request, a value below 1 asks for a fraction of one GPU
    #[arg(short, long)]
    gpu:           Option<f64>,
    #[arg(long)]
    cpu:           Option<String>,
    #[arg(long)]
    memory:        Option<String>,
    #[arg(long)]
    cpu_limit:     Option<String>,
    #[arg(long)]
    memory_limit:  Option<String>,
    /// Environment variable, KEY=VALUE
    #[arg(short, long = "environment")]
    environment:   Vec<String>,
    /// Extra chart value, KEY=VALUE
    #[arg(long)]
    set:           Vec<String>,
    #[arg(long)]
    user:          Option<String>,
    /// Run an interactive workload instead of a training job
    #[arg(long)]
    interactive:   bool,
    /// Pick a free name when the requested one is taken
    #[arg(long)]
    generate_name: bool,
    /// Print the chart values and stop
    #[arg(long)]
    dry_run:       bool,
}

fn verbosity_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn project(cli: &Cli, config: &CliConfig) -> Result<String> {
    match cli.project.clone().or_else(|| config.default_project.clone()) {
        Some(project) => Ok(project),
        None => bail!(
            "No project selected, use --project or set default_project in \
             the configuration"
        ),
    }
}

/// Namespace the command works in, `None` across all projects.
fn scope(cli: &Cli, config: &CliConfig) -> Result<Option<String>> {
    if cli.all_projects {
        return Ok(None);
    }
    Ok(Some(config.namespace_for(&project(cli, config)?)))
}

fn submit_request(
    args: &SubmitArgs,
    project: String,
) -> Result<SubmitRequest> {
    let user = match &args.user {
        Some(user) => Some(user.clone()),
        None => env_load!(String, USER),
    };
    Ok(SubmitRequest {
        name: JobName::try_new(&args.name)
            .with_context(|| format!("{} is not a valid job name", args.name))?,
        auto_name: args.generate_name,
        image: args.image.clone(),
        gpu: args.gpu,
        cpu: args.cpu.clone(),
        memory: args.memory.clone(),
        cpu_limit: args.cpu_limit.clone(),
        memory_limit: args.memory_limit.clone(),
        environment: args.environment.clone(),
        set: args.set.clone(),
        project,
        user,
        interactive: args.interactive,
    })
}

/// Minimum age of the jobs `prune` removes.
fn prune_threshold(days: i64, hours: i64) -> Result<chrono::Duration> {
    let older_than = chrono::Duration::try_days(days)
        .zip(chrono::Duration::try_hours(hours))
        .and_then(|(days, hours)| days.checked_add(&hours));
    match older_than {
        None => bail!("--days {days} --hours {hours} is out of range"),
        Some(older_than) if older_than <= chrono::Duration::zero() => {
            bail!("Pass --days or --hours to select the jobs to prune")
        }
        Some(older_than) => Ok(older_than),
    }
}

async fn connect() -> Result<kube::Client> {
    kube::Client::try_default()
        .await
        .context("Failed to connect to the cluster")
}

fn lifecycle(client: kube::Client, config: &CliConfig) -> Arc<dyn JobLifecycle> {
    let registry: Arc<dyn JobRegistry> =
        Arc::new(ConfigMapRegistry::new(client.clone()));
    Arc::new(JobLifecycleImpl::new(
        config.chart.clone(),
        Arc::new(RegistrationImpl::new(
            registry.clone(),
            config.registration_retries,
        )),
        registry,
        Arc::new(JobIndexConfigMap::new(
            client,
            config.system_namespace.clone(),
            config.registration_retries,
        )),
        Arc::new(HelmInstaller::new(config.chart.clone())),
    ))
}

fn metrics(
    client: kube::Client,
    config: &CliConfig,
) -> Result<Arc<dyn MetricsSource>> {
    Ok(match &config.prometheus_address {
        Some(address) => Arc::new(PrometheusMetrics::new(
            address.clone(),
            config.prometheus_timeout,
        )?),
        None => {
            debug!("No Prometheus configured, using the metrics server");
            Arc::new(KubeNodeMetrics::new(client))
        }
    })
}

async fn run(cli: Cli) -> Result<()> {
    let config = CliConfig::load(cli.config.as_deref())?;
    debug!("Configuration: {:?}", config);
    let formatter = OutputFormatter::new(cli.output);

    match &cli.command {
        Commands::Top { resource: TopResource::Node { details } } => {
            let client = connect().await?;
            let cluster: Arc<dyn ClusterReader> = Arc::new(K8sImpl::new(
                client.clone(),
                config.scheduler_name.clone(),
            ));
            let metrics = metrics(client, &config)?;
            controller::node::top_nodes(&cluster, &metrics, *details, &formatter)
                .await
        }
        Commands::List => {
            let namespace = scope(&cli, &config)?;
            let cluster: Arc<dyn ClusterReader> = Arc::new(K8sImpl::new(
                connect().await?,
                config.scheduler_name.clone(),
            ));
            controller::job::list_jobs(
                &cluster,
                namespace.as_deref(),
                &config.scheduler_name,
                &formatter,
            )
            .await
        }
        Commands::Get { name } => {
            let namespace = config.namespace_for(&project(&cli, &config)?);
            let cluster: Arc<dyn ClusterReader> = Arc::new(K8sImpl::new(
                connect().await?,
                config.scheduler_name.clone(),
            ));
            controller::job::get_job(
                &cluster,
                &namespace,
                name,
                &config.scheduler_name,
                &formatter,
            )
            .await
        }
        Commands::Submit(args) => {
            let project = project(&cli, &config)?;
            let namespace = config.namespace_for(&project);
            let request = submit_request(args, project)?;
            if args.dry_run {
                return controller::submit::dry_run(&request);
            }
            let lifecycle = lifecycle(connect().await?, &config);
            controller::submit::submit_job(
                &lifecycle, &request, &namespace, &formatter,
            )
            .await
        }
        Commands::Delete { names } => {
            let namespace = config.namespace_for(&project(&cli, &config)?);
            let lifecycle = lifecycle(connect().await?, &config);
            controller::job::delete_jobs(&lifecycle, &namespace, names).await
        }
        Commands::Prune { days, hours } => {
            let older_than = prune_threshold(*days, *hours)?;
            let namespace = scope(&cli, &config)?;
            let client = connect().await?;
            let cluster: Arc<dyn ClusterReader> = Arc::new(K8sImpl::new(
                client.clone(),
                config.scheduler_name.clone(),
            ));
            let lifecycle = lifecycle(client, &config);
            controller::job::prune_jobs(
                &cluster,
                &lifecycle,
                namespace.as_deref(),
                older_than,
            )
            .await
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let guard = match helper::init::init_subscriber(
        "trainctl",
        verbosity_filter(cli.verbose),
    ) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Failed to initialize logging: {err:#}");
            None
        }
    };
    debug!("Tracing initialized.");

    let code = match run(cli).await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("Error: {err:#}");
            1
        }
    };
    drop(guard);
    std::process::exit(code);
}

//! dvpp binary entry point.

use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use dvpp::agent::tls;
use dvpp::config::{self, AgentConfig, OrchestratorConfig};
use dvpp::{telemetry, AgentServer, CnameValidator, Orchestrator, ValidationRequest};
use tracing::{error, info};

/// Domain validation from multiple network vantage points.
#[derive(Parser, Debug)]
#[command(name = "dvpp")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run an agent that performs the validation of a domain requested by the orchestrator.
    Agent(AgentArgs),
    /// Run the orchestrator that sends validation requests to the agents and verifies the result.
    Orchestrator(OrchestratorArgs),
}

#[derive(Args, Debug)]
struct AgentArgs {
    /// Configuration file (TOML or YAML).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// DNS servers; one is picked at random.
    #[arg(short, long, value_delimiter = ',')]
    dns: Vec<String>,

    /// Append logs to this file.
    #[arg(short = 'l', long)]
    logfile: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct OrchestratorArgs {
    /// Configuration file (TOML or YAML).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Append logs to this file.
    #[arg(short = 'l', long)]
    logfile: Option<PathBuf>,

    /// Verbose output.
    #[arg(short, long)]
    verbose: bool,

    /// XML output.
    #[arg(short = 'x', long)]
    xml: bool,

    #[command(subcommand)]
    method: Method,
}

#[derive(Subcommand, Debug)]
enum Method {
    /// Validate that <challenge> is a CNAME for <response>.
    Cname {
        /// Domain under validation.
        domain: String,
        /// Full DNS name carrying the challenge CNAME.
        challenge: String,
        /// Expected CNAME target.
        response: String,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Agent(args) => run_agent(args).await,
        Command::Orchestrator(args) => run_orchestrator(args).await,
    }
}

async fn run_agent(args: AgentArgs) -> Result<ExitCode, Box<dyn Error>> {
    let path = match args.config {
        Some(path) => path,
        None => config::default_config_file("agent")?,
    };
    let mut config: AgentConfig = config::load(&path, config::AGENT_ENV_PREFIX)?;
    if let Some(logfile) = args.logfile {
        config.telemetry.log_file = Some(logfile);
    }

    telemetry::init(&config.telemetry).map_err(|e| e as Box<dyn Error>)?;

    let resolver = config.resolver(&args.dns, &mut rand::thread_rng())?;
    let (cert, key) = config.tls_files()?;
    let tls_config = tls::server_config(&cert, &key)?;
    let policy = config.access_policy()?;
    let listen_addr = config.listen_addr()?;

    info!(
        config_file = %path.display(),
        %listen_addr,
        %resolver,
        authority_port = config.authority_port,
        "Starting dvpp agent"
    );

    let validator = CnameValidator::new(resolver)
        .with_authority_port(config.authority_port)
        .with_query_timeout(config.query_timeout());
    let server = AgentServer::new(listen_addr, tls_config, Arc::new(validator), policy);

    if let Err(e) = server.run(shutdown_signal()).await {
        error!("agent server error: {}", e);
        return Err(e.into());
    }

    info!("dvpp agent shutdown complete");
    Ok(ExitCode::SUCCESS)
}

async fn run_orchestrator(args: OrchestratorArgs) -> Result<ExitCode, Box<dyn Error>> {
    let path = match args.config {
        Some(path) => path,
        None => config::default_config_file("orchestrator")?,
    };
    let mut config: OrchestratorConfig = config::load(&path, config::ORCHESTRATOR_ENV_PREFIX)?;
    if !args.verbose {
        config.telemetry.log_level = "warn".to_string();
    }
    if let Some(logfile) = args.logfile {
        config.telemetry.log_file = Some(logfile);
    }

    telemetry::init(&config.telemetry).map_err(|e| e as Box<dyn Error>)?;

    let registry = config.registry()?;
    let quorum = config.quorum_config(&registry)?;
    info!(
        config_file = %path.display(),
        agents = registry.len(),
        pool_size = quorum.pool_size,
        tolerance = quorum.tolerance,
        "Starting dvpp orchestrator"
    );
    let orchestrator = Orchestrator::new(registry, quorum)?;

    let request = match args.method {
        Method::Cname {
            domain,
            challenge,
            response,
        } => ValidationRequest::new(domain, challenge, response),
    };
    let result = orchestrator.validate_domain(&request).await;

    if args.xml {
        println!("{}", result.to_xml());
    } else {
        println!("{}", result.to_json());
    }

    Ok(if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("cannot listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

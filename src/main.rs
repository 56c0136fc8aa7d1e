use std::net::SocketAddr;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use drover::api::{ClaimResponse, CreateJobResponse, ErrorBody, ReportAck};
use drover::broker::Job;
use drover::config::BrokerConfig;
use drover::server::Broker;

#[derive(Parser, Debug)]
#[command(name = "drover")]
#[command(version)]
#[command(about = "A lease-based job broker for remote workers")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start a broker server
    Server(ServerArgs),

    /// Job operations against a running broker
    Job {
        #[command(flatten)]
        client: ClientArgs,

        #[command(subcommand)]
        command: JobCommands,
    },
}

#[derive(Parser, Debug)]
struct ServerArgs {
    /// Host to bind the HTTP API on
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind the HTTP API on
    #[arg(long, default_value = "7171")]
    port: u16,

    /// Lease duration granted to each claim, in seconds
    #[arg(long, default_value = "60")]
    lease_secs: u64,

    /// Seconds between active lease sweeps (0 disables the sweep;
    /// expired leases are then reclaimed lazily at claim time)
    #[arg(long, default_value = "10")]
    sweep_interval_secs: u64,
}

#[derive(Parser, Debug)]
struct ClientArgs {
    /// Broker address
    #[arg(long, short = 'a', default_value = "http://127.0.0.1:7171")]
    addr: String,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(clap::Subcommand, Debug)]
enum JobCommands {
    /// Submit a new job
    Submit {
        /// Command tag for the worker to execute (e.g. "ping")
        command: String,

        /// Opaque payload handed to the worker
        #[arg(long, default_value = "")]
        payload: String,

        /// Capability tag a worker must declare to claim this job (repeatable)
        #[arg(long = "require")]
        requires: Vec<String>,
    },
    /// Show a job record
    Status {
        /// The job ID (UUID)
        job_id: Uuid,
    },
    /// List jobs, oldest first
    List {
        /// Only show jobs with this status (queued|running|done|failed)
        #[arg(long)]
        status: Option<String>,
    },
    /// Claim the next eligible job (one attempt, no waiting)
    Claim {
        /// Capability tag this worker declares (repeatable)
        #[arg(long = "cap")]
        capabilities: Vec<String>,

        /// Identifier recorded on the claimed job
        #[arg(long)]
        worker_id: Option<String>,
    },
    /// Report a successful result for a claimed job
    Finish {
        /// The job ID (UUID)
        job_id: Uuid,

        /// Result blob to record
        #[arg(long)]
        result: String,
    },
    /// Report a failure for a claimed job
    Fail {
        /// The job ID (UUID)
        job_id: Uuid,

        /// Error message to record
        #[arg(long, default_value = "unknown")]
        error: String,
    },
}

// =============================================================================
// Helpers
// =============================================================================

fn print_job(job: &Job, output: &OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(job)?),
        OutputFormat::Table => {
            println!("Job ID:      {}", job.id);
            println!("Status:      {}", job.status);
            println!("Command:     {}", job.command);
            println!("Created:     {}", job.created_at.to_rfc3339());
            if let Some(started_at) = job.started_at {
                println!("Started:     {}", started_at.to_rfc3339());
            }
            if let Some(finished_at) = job.finished_at {
                println!("Finished:    {}", finished_at.to_rfc3339());
            }
            if let Some(lease_until) = job.lease_until {
                println!("Lease until: {}", lease_until.to_rfc3339());
            }
            if let Some(ref worker_id) = job.worker_id {
                println!("Worker:      {}", worker_id);
            }
            if !job.requires.is_empty() {
                let mut tags: Vec<&str> = job.requires.iter().map(String::as_str).collect();
                tags.sort_unstable();
                println!("Requires:    {}", tags.join(", "));
            }
            if let Some(ref result) = job.result {
                println!("Result:");
                for line in result.lines() {
                    println!("  {}", line);
                }
            }
            if let Some(ref error) = job.error {
                println!("Error:");
                for line in error.lines() {
                    println!("  {}", line);
                }
            }
        }
    }
    Ok(())
}

/// Surface a non-success broker response and exit.
async fn bail_on_error(response: reqwest::Response) -> reqwest::Response {
    if response.status().is_success() {
        return response;
    }
    let status = response.status();
    let message = match response.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => status.to_string(),
    };
    eprintln!("Error: {}", message);
    std::process::exit(1);
}

// =============================================================================
// Client command handlers
// =============================================================================

async fn handle_job_submit(
    client: &reqwest::Client,
    addr: &str,
    command: String,
    payload: String,
    requires: Vec<String>,
    output: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let response = client
        .post(format!("{}/jobs", addr))
        .json(&serde_json::json!({
            "command": command,
            "payload": payload,
            "requires": requires,
        }))
        .send()
        .await?;
    let created: CreateJobResponse = bail_on_error(response).await.json().await?;

    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&created)?),
        OutputFormat::Table => {
            println!("Job submitted.");
            println!("Job ID: {}", created.id);
            println!("Status: {}", created.status);
        }
    }
    Ok(())
}

async fn handle_job_status(
    client: &reqwest::Client,
    addr: &str,
    job_id: Uuid,
    output: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let response = client.get(format!("{}/jobs/{}", addr, job_id)).send().await?;
    let job: Job = bail_on_error(response).await.json().await?;
    print_job(&job, output)
}

async fn handle_job_list(
    client: &reqwest::Client,
    addr: &str,
    status: Option<String>,
    output: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut request = client.get(format!("{}/jobs", addr));
    if let Some(ref status) = status {
        request = request.query(&[("status", status)]);
    }
    let jobs: Vec<Job> = bail_on_error(request.send().await?).await.json().await?;

    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&jobs)?),
        OutputFormat::Table => {
            if jobs.is_empty() {
                println!("No jobs found.");
            } else {
                println!("{:<38} {:<9} {:<12} COMMAND", "JOB ID", "STATUS", "WORKER");
                println!("{}", "-".repeat(78));
                for job in &jobs {
                    let worker = job.worker_id.as_deref().unwrap_or("-");
                    let cmd_display = if job.command.len() > 20 {
                        format!("{}...", &job.command[..17])
                    } else {
                        job.command.clone()
                    };
                    println!(
                        "{:<38} {:<9} {:<12} {}",
                        job.id, job.status, worker, cmd_display
                    );
                }
                println!();
                println!("{} jobs", jobs.len());
            }
        }
    }
    Ok(())
}

async fn handle_job_claim(
    client: &reqwest::Client,
    addr: &str,
    capabilities: Vec<String>,
    worker_id: Option<String>,
    output: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let response = client
        .post(format!("{}/jobs/claim", addr))
        .json(&serde_json::json!({
            "capabilities": capabilities,
            "worker_id": worker_id,
        }))
        .send()
        .await?;
    let claim: ClaimResponse = bail_on_error(response).await.json().await?;

    match claim.job {
        Some(job) => print_job(&job, output)?,
        None => match output {
            OutputFormat::Json => println!("{}", serde_json::json!({ "job": null })),
            OutputFormat::Table => println!("No eligible job available."),
        },
    }
    Ok(())
}

async fn handle_job_report(
    client: &reqwest::Client,
    url: String,
    body: serde_json::Value,
    output: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let response = client.post(url).json(&body).send().await?;
    let ack: ReportAck = bail_on_error(response).await.json().await?;

    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&ack)?),
        OutputFormat::Table => {
            println!("Status: {}", ack.status);
            if let Some(note) = ack.note {
                println!("Note:   {}", note);
            }
        }
    }
    Ok(())
}

// =============================================================================
// Server
// =============================================================================

async fn run_server(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let listen_addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let config = BrokerConfig::new(listen_addr)
        .with_lease_secs(args.lease_secs)
        .with_sweep_interval_secs(args.sweep_interval_secs);

    Broker::new(config).run().await
}

// =============================================================================
// Main entry point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Server(server_args) => {
            run_server(server_args).await?;
        }
        Commands::Job { client, command } => {
            let http = reqwest::Client::new();
            let addr = client.addr.trim_end_matches('/');

            match command {
                JobCommands::Submit {
                    command,
                    payload,
                    requires,
                } => {
                    handle_job_submit(&http, addr, command, payload, requires, &client.output)
                        .await?;
                }
                JobCommands::Status { job_id } => {
                    handle_job_status(&http, addr, job_id, &client.output).await?;
                }
                JobCommands::List { status } => {
                    handle_job_list(&http, addr, status, &client.output).await?;
                }
                JobCommands::Claim {
                    capabilities,
                    worker_id,
                } => {
                    handle_job_claim(&http, addr, capabilities, worker_id, &client.output).await?;
                }
                JobCommands::Finish { job_id, result } => {
                    handle_job_report(
                        &http,
                        format!("{}/jobs/{}/result", addr, job_id),
                        serde_json::json!({ "result": result }),
                        &client.output,
                    )
                    .await?;
                }
                JobCommands::Fail { job_id, error } => {
                    handle_job_report(
                        &http,
                        format!("{}/jobs/{}/fail", addr, job_id),
                        serde_json::json!({ "error": error }),
                        &client.output,
                    )
                    .await?;
                }
            }
        }
    }

    Ok(())
}

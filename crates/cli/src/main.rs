//! conveyorctl - command-line client for the Conveyor daemon

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9627";

#[derive(Parser)]
#[command(name = "conveyorctl")]
#[command(about = "Conveyor job scheduler CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, global = true, env = "CONVEYOR_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,

    /// Print raw JSON results instead of tables
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a job
    Submit {
        /// Target queue
        queue: String,

        /// Job type (selects the handler)
        job_type: String,

        /// Payload as JSON string
        #[arg(long, default_value = "{}")]
        payload: String,

        /// Hold the job this many milliseconds before it becomes runnable
        #[arg(long)]
        delay_ms: Option<u64>,
    },

    /// Show one job
    Status { job_id: String },

    /// Cancel a job
    Cancel { job_id: String },

    /// List jobs
    Jobs {
        #[arg(short, long)]
        queue: Option<String>,

        /// Comma separated statuses (pending,processing,retrying,completed,failed,cancelled)
        #[arg(short, long, value_delimiter = ',')]
        status: Vec<String>,

        #[arg(long, default_value = "0")]
        offset: u64,

        #[arg(short = 'n', long, default_value = "50")]
        limit: u64,
    },

    /// Queue administration
    #[command(subcommand)]
    Queue(QueueCommand),

    /// Show aggregated statistics
    Stats {
        /// Limit to one queue
        queue: Option<String>,
    },
}

#[derive(Subcommand)]
enum QueueCommand {
    /// List registered queues
    List,
    /// Register a queue
    Register(QueueConfigArgs),
    /// Change a queue's configuration
    Update(QueueConfigArgs),
    /// Stop dispatching new jobs
    Pause { queue: String },
    /// Resume dispatching
    Resume { queue: String },
    /// Cancel waiting jobs
    Clear {
        queue: String,
        /// Comma separated statuses; default every non-terminal status
        #[arg(short, long, value_delimiter = ',')]
        status: Vec<String>,
    },
    /// Show worker snapshots
    Workers { queue: String },
    /// Rebuild the worker pool with the current concurrency
    Restart { queue: String },
    /// Remove an idle queue
    Remove { queue: String },
}

#[derive(Args)]
struct QueueConfigArgs {
    queue: String,

    #[arg(long)]
    concurrency: Option<usize>,

    #[arg(long)]
    retry_attempts: Option<u32>,

    #[arg(long)]
    retry_delay_ms: Option<u64>,

    #[arg(long)]
    timeout_ms: Option<u64>,

    /// low | medium | high
    #[arg(long)]
    priority: Option<String>,
}

impl QueueConfigArgs {
    /// Only the fields given on the command line
    fn fields(&self) -> Value {
        let mut fields = serde_json::Map::new();
        if let Some(v) = self.concurrency {
            fields.insert("concurrency".into(), json!(v));
        }
        if let Some(v) = self.retry_attempts {
            fields.insert("retry_attempts".into(), json!(v));
        }
        if let Some(v) = self.retry_delay_ms {
            fields.insert("retry_delay_ms".into(), json!(v));
        }
        if let Some(v) = self.timeout_ms {
            fields.insert("timeout_ms".into(), json!(v));
        }
        if let Some(v) = &self.priority {
            fields.insert("priority".into(), json!(v.to_ascii_lowercase()));
        }
        Value::Object(fields)
    }
}

#[derive(Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

#[derive(Tabled)]
struct JobRow {
    id: String,
    queue: String,
    job_type: String,
    status: String,
    attempts: String,
    last_error: String,
}

impl JobRow {
    fn from_json(job: &Value) -> Self {
        Self {
            id: text(&job["id"]),
            queue: text(&job["queue_name"]),
            job_type: text(&job["job_type"]),
            status: text(&job["status"]),
            attempts: text(&job["attempts"]),
            last_error: text(&job["last_error"]),
        }
    }
}

#[derive(Tabled)]
struct QueueRow {
    name: String,
    concurrency: String,
    retries: String,
    retry_delay_ms: String,
    timeout_ms: String,
    priority: String,
    paused: String,
    workers: String,
}

#[derive(Tabled)]
struct WorkerRow {
    id: String,
    status: String,
    current_job: String,
}

fn text(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

async fn call_rpc(url: &str, method: &str, params: Value) -> Result<Value> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        method: method.to_string(),
        params,
        id: 1,
    };

    let client = reqwest::Client::new();
    let response: JsonRpcResponse = client
        .post(url)
        .json(&request)
        .send()
        .await
        .context("Failed to connect to daemon")?
        .json()
        .await
        .context("Failed to parse response")?;

    if let Some(error) = response.error {
        anyhow::bail!("RPC error ({}): {}", error.code, error.message);
    }

    response
        .result
        .ok_or_else(|| anyhow::anyhow!("No result in response"))
}

/// Build the method name and params for a command
fn request_for(command: &Commands) -> Result<(&'static str, Value)> {
    let request = match command {
        Commands::Submit {
            queue,
            job_type,
            payload,
            delay_ms,
        } => {
            let payload: Value = serde_json::from_str(payload).context("Invalid JSON payload")?;
            (
                "jobs.submit.v1",
                json!({
                    "queue": queue,
                    "job_type": job_type,
                    "payload": payload,
                    "delay_ms": delay_ms,
                }),
            )
        }
        Commands::Status { job_id } => ("jobs.status.v1", json!({ "job_id": job_id })),
        Commands::Cancel { job_id } => ("jobs.cancel.v1", json!({ "job_id": job_id })),
        Commands::Jobs {
            queue,
            status,
            offset,
            limit,
        } => (
            "jobs.list.v1",
            json!({
                "filter": { "queue_name": queue, "statuses": status },
                "offset": offset,
                "limit": limit,
            }),
        ),
        Commands::Stats { queue } => ("queues.stats.v1", json!({ "queue": queue })),
        Commands::Queue(cmd) => match cmd {
            QueueCommand::List => ("queues.list.v1", json!({})),
            QueueCommand::Register(args) => (
                "queues.register.v1",
                json!({ "queue": args.queue, "config": args.fields() }),
            ),
            QueueCommand::Update(args) => (
                "queues.update.v1",
                json!({ "queue": args.queue, "patch": args.fields() }),
            ),
            QueueCommand::Pause { queue } => ("queues.pause.v1", json!({ "queue": queue })),
            QueueCommand::Resume { queue } => ("queues.resume.v1", json!({ "queue": queue })),
            QueueCommand::Clear { queue, status } => {
                let statuses = if status.is_empty() {
                    Value::Null
                } else {
                    json!(status)
                };
                (
                    "queues.clear.v1",
                    json!({ "queue": queue, "statuses": statuses }),
                )
            }
            QueueCommand::Workers { queue } => ("queues.workers.v1", json!({ "queue": queue })),
            QueueCommand::Restart { queue } => ("queues.restart.v1", json!({ "queue": queue })),
            QueueCommand::Remove { queue } => ("queues.remove.v1", json!({ "queue": queue })),
        },
    };
    Ok(request)
}

fn render(command: &Commands, result: &Value) {
    match command {
        Commands::Submit { .. } => {
            println!("{}", "✓ Job submitted".green().bold());
            println!("  {} {}", "Job ID:".bold(), text(&result["job_id"]));
            println!("  {} {}", "Queue:".bold(), text(&result["queue"]));
        }
        Commands::Status { .. } => {
            println!("{}", Table::new(vec![JobRow::from_json(result)]));
            if !result["result"].is_null() {
                println!("{} {}", "Result:".bold(), result["result"]);
            }
        }
        Commands::Cancel { job_id } => {
            if result["cancel_requested"].as_bool().unwrap_or(false) {
                println!(
                    "{}",
                    format!("○ Cancel requested for running job {}", job_id).yellow()
                );
            } else {
                println!("{}", format!("✓ Job {} cancelled", job_id).green().bold());
            }
        }
        Commands::Jobs { .. } => {
            let rows: Vec<JobRow> = result["jobs"]
                .as_array()
                .map(|jobs| jobs.iter().map(JobRow::from_json).collect())
                .unwrap_or_default();
            if rows.is_empty() {
                println!("{}", "No jobs".yellow());
            } else {
                println!("{}", Table::new(rows));
            }
        }
        Commands::Stats { queue } => {
            let title = match queue {
                Some(q) => format!("Queue {}", q),
                None => "All queues".to_string(),
            };
            println!("{}", title.cyan().bold());
            if let Some(counts) = result["counts"].as_object() {
                for (status, count) in counts {
                    println!("  {:<12} {}", format!("{}:", status).bold(), count);
                }
            }
            println!("  {:<12} {}", "Waiting:".bold(), result["channel_depth"]);
            println!(
                "  {:<12} {}/{}",
                "Workers:".bold(),
                result["workers_busy"],
                result["workers_total"]
            );
            if let Some(avg) = result["avg_duration_ms"].as_f64() {
                println!("  {:<12} {:.1} ms", "Avg time:".bold(), avg);
            }
        }
        Commands::Queue(cmd) => render_queue(cmd, result),
    }
}

fn render_queue(cmd: &QueueCommand, result: &Value) {
    match cmd {
        QueueCommand::List => {
            let rows: Vec<QueueRow> = result["queues"]
                .as_array()
                .map(|queues| {
                    queues
                        .iter()
                        .map(|q| {
                            let config = &q["config"];
                            QueueRow {
                                name: text(&q["name"]),
                                concurrency: text(&config["concurrency"]),
                                retries: text(&config["retry_attempts"]),
                                retry_delay_ms: text(&config["retry_delay_ms"]),
                                timeout_ms: text(&config["timeout_ms"]),
                                priority: text(&config["priority"]),
                                paused: text(&config["paused"]),
                                workers: text(&q["workers"]),
                            }
                        })
                        .collect()
                })
                .unwrap_or_default();
            println!("{}", Table::new(rows));
        }
        QueueCommand::Workers { .. } => {
            let rows: Vec<WorkerRow> = result["workers"]
                .as_array()
                .map(|workers| {
                    workers
                        .iter()
                        .map(|w| WorkerRow {
                            id: text(&w["id"]),
                            status: text(&w["status"]),
                            current_job: text(&w["current_job_id"]),
                        })
                        .collect()
                })
                .unwrap_or_default();
            println!("{}", Table::new(rows));
        }
        QueueCommand::Clear { queue, .. } => {
            println!(
                "{}",
                format!("✓ Cleared {} job(s) from {}", result["cleared"], queue)
                    .green()
                    .bold()
            );
        }
        QueueCommand::Restart { queue } => {
            println!(
                "{}",
                format!("✓ Restarted {} with {} worker(s)", queue, result["workers"])
                    .green()
                    .bold()
            );
        }
        QueueCommand::Pause { queue } => println!("{}", format!("⏸ {} paused", queue).yellow()),
        QueueCommand::Resume { queue } => {
            println!("{}", format!("▶ {} resumed", queue).green())
        }
        QueueCommand::Register(args) | QueueCommand::Update(args) => {
            println!("{}", format!("✓ Queue {} saved", args.queue).green().bold());
            println!("{}", serde_json::to_string_pretty(&result["config"]).unwrap_or_default());
        }
        QueueCommand::Remove { queue } => {
            println!("{}", format!("✓ Queue {} removed", queue).green().bold())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (method, params) = request_for(&cli.command)?;
    let result = call_rpc(&cli.rpc_url, method, params).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        render(&cli.command, &result);
    }

    Ok(())
}

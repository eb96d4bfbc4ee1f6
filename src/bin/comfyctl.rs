use clap::builder::PossibleValuesParser;
use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use comfyui_nodes::dispatcher::operations::{DEFAULT_MODEL_TYPE, KNOWN_MODEL_TYPES};
use comfyui_nodes::listener::config::ListenerConfig;
use comfyui_nodes::{listener, Config, Dispatcher};

#[derive(Parser, Debug)]
#[command(name = "comfyctl", about = "CLI for ComfyUI queue, model and event nodes", version)]
struct Cli {
    /// Override COMFYUI_URL
    #[arg(global = true, long)]
    comfyui_url: Option<String>,

    /// Header key overriding the stored credential's key
    #[arg(global = true, long, default_value = "")]
    header_key: String,

    /// Header value overriding the stored credential's value
    #[arg(global = true, long, default_value = "")]
    header_value: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Queue management operations
    Queue {
        #[command(subcommand)]
        cmd: QueueCmd,
        /// Print an error record instead of failing
        #[arg(long)]
        continue_on_fail: bool,
    },
    /// Model inventory operations
    Models {
        #[command(subcommand)]
        cmd: ModelsCmd,
        /// Print an error record instead of failing
        #[arg(long)]
        continue_on_fail: bool,
    },
    /// Subscribe to the event stream and print matching events as JSON lines
    Listen {
        /// Event type to listen for (`all` for every event)
        #[arg(long, default_value = "ky_monitor.queue", conflicts_with = "custom_event")]
        event: String,
        /// Free-text custom event type
        #[arg(long)]
        custom_event: Option<String>,
        /// Seconds to wait before reconnecting
        #[arg(long, default_value_t = 5.0)]
        reconnect_interval: f64,
        /// Maximum reconnect attempts, -1 for unlimited
        #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
        max_retries: i64,
        /// Tag echoed back on every event
        #[arg(long, default_value = "")]
        instance_id: String,
        /// Disable the ping keep-alive
        #[arg(long)]
        no_heartbeat: bool,
        /// Seconds between pings
        #[arg(long, default_value_t = 30.0)]
        heartbeat_interval: f64,
    },
}

#[derive(Subcommand, Debug)]
enum QueueCmd {
    /// Last 5 history entries
    History,
    /// Current queue status
    Status,
    /// Clear all pending queue items
    Clear,
    /// Interrupt the running execution
    Interrupt,
    /// Clear the history
    ClearHistory,
    /// Delete one history entry
    Delete {
        #[arg(long)]
        prompt_id: String,
    },
    /// System and device information
    SystemInfo,
}

#[derive(Subcommand, Debug)]
enum ModelsCmd {
    /// Full object-info map
    All,
    /// Object-info entry for one model type
    ByType {
        #[arg(
            long,
            default_value = DEFAULT_MODEL_TYPE,
            value_parser = PossibleValuesParser::new(KNOWN_MODEL_TYPES.iter().copied())
        )]
        model_type: String,
    },
    Samplers,
    Schedulers,
    Extensions,
    Embeddings,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    Config::dotenv_load();
    let cli = Cli::parse();

    let mut conf = Config::new();
    if let Some(url) = cli.comfyui_url {
        conf.comfyui_url = url;
    }
    let credential = conf.credential();

    let mut params = Map::new();
    params.insert("serverUrl".into(), Value::String(conf.comfyui_url.clone()));
    params.insert("manualHeaderKey".into(), Value::String(cli.header_key));
    params.insert("manualHeaderValue".into(), Value::String(cli.header_value));

    match cli.command {
        Commands::Queue { cmd, continue_on_fail } => {
            params.insert("operationCategory".into(), json!("queue"));
            let op = match cmd {
                QueueCmd::History => "getRecentHistory",
                QueueCmd::Status => "getQueueStatus",
                QueueCmd::Clear => "clearQueue",
                QueueCmd::Interrupt => "interruptExecution",
                QueueCmd::ClearHistory => "clearHistory",
                QueueCmd::Delete { prompt_id } => {
                    params.insert("promptId".into(), Value::String(prompt_id));
                    "deleteHistoryItem"
                }
                QueueCmd::SystemInfo => "getSystemInfo",
            };
            params.insert("queueOperation".into(), json!(op));
            run_dispatch(&params, credential.as_ref(), continue_on_fail).await
        }
        Commands::Models { cmd, continue_on_fail } => {
            params.insert("operationCategory".into(), json!("models"));
            let op = match cmd {
                ModelsCmd::All => "getAllModels",
                ModelsCmd::ByType { model_type } => {
                    params.insert("modelType".into(), Value::String(model_type));
                    "getModelsByType"
                }
                ModelsCmd::Samplers => "getSamplers",
                ModelsCmd::Schedulers => "getSchedulers",
                ModelsCmd::Extensions => "getExtensions",
                ModelsCmd::Embeddings => "getEmbeddings",
            };
            params.insert("modelsOperation".into(), json!(op));
            run_dispatch(&params, credential.as_ref(), continue_on_fail).await
        }
        Commands::Listen {
            event, custom_event, reconnect_interval, max_retries,
            instance_id, no_heartbeat, heartbeat_interval,
        } => {
            match custom_event {
                Some(custom) => {
                    params.insert("eventTypeChoice".into(), json!("custom"));
                    params.insert("customEventType".into(), Value::String(custom));
                }
                None => {
                    params.insert("eventTypeChoice".into(), json!("predefined"));
                    params.insert("predefinedEventType".into(), Value::String(event));
                }
            }
            params.insert("reconnectInterval".into(), json!(reconnect_interval));
            params.insert("maxRetries".into(), json!(max_retries));
            params.insert("instanceId".into(), Value::String(instance_id));
            params.insert("enableHeartbeat".into(), json!(!no_heartbeat));
            params.insert("heartbeatInterval".into(), json!(heartbeat_interval));

            let config = ListenerConfig::from_parameters(&params, credential.as_ref())?;
            let (tx, mut rx) = mpsc::unbounded_channel::<Vec<Value>>();
            let mut handle = listener::activate(config, tx)?;
            eprintln!("Listening as client {} (Ctrl-C to stop)", handle.client_id());

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    batch = rx.recv() => match batch {
                        Some(records) => {
                            for record in records {
                                println!("{}", serde_json::to_string(&record)?);
                            }
                        }
                        None => break,
                    },
                }
            }
            handle.deactivate().await;
            Ok(())
        }
    }
}

async fn run_dispatch(
    params: &Map<String, Value>,
    credential: Option<&comfyui_nodes::host::HeaderCredential>,
    continue_on_fail: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let dispatcher = Dispatcher::new();
    match dispatcher.execute(params, 1, credential, continue_on_fail).await {
        Ok(records) => {
            for record in records {
                println!("{}", serde_json::to_string_pretty(&record)?);
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

//! # Queue Registry CLI
//!
//! Command-line interface for inspecting and exercising registered queues.
//!
//! This module provides CLI commands for:
//! - Sending a message to a named queue
//! - Receiving and acknowledging a single message
//! - Running the receive loop with a logging receiver until Ctrl-C
//! - Printing the full (wire) name of a queue
//! - Printing the resolved configuration
//!
//! Configuration is read from an optional file (`--config` or
//! `QUEUE_REGISTRY_CONFIG`) and from environment variables prefixed with
//! `QUEUE_REGISTRY__`, e.g. `QUEUE_REGISTRY__REGISTRY__DEBUG=true`.

use anyhow::Context;
use clap::{Parser, Subcommand};
use queue_registry::{
    derive_queue_name, full_queue_name, receiver_fn, ConfigurationError, HandlerError,
    InMemoryQueueService, LoopOptions, Message, QueueError, QueueName, QueueOptions,
    QueueRegistry, QueueServiceClient, Receiver, RegistrySettings, SendOptions, ValidationError,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt::Display;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// ============================================================================
// CLI Structure
// ============================================================================

/// Queue Registry CLI - send, receive and inspect registered queues
#[derive(Parser)]
#[command(name = "queue-registry")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Send, receive and inspect registered queues")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "QUEUE_REGISTRY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Logging level or filter directives; overrides the configured level
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Send one message to a queue
    Send {
        /// Logical queue name
        #[arg(short, long)]
        queue: String,

        /// Message body
        #[arg(short, long)]
        body: Option<String>,

        /// Message attribute as key=value; may be repeated
        #[arg(short, long = "attr", value_parser = parse_attribute)]
        attributes: Vec<(String, String)>,

        /// Send to the `full_name__suffix` queue
        #[arg(short, long)]
        suffix: Option<String>,
    },

    /// Receive, print and acknowledge at most one message
    ReceiveSingle {
        /// Logical queue name
        #[arg(short, long)]
        queue: String,

        /// Read from the `full_name__suffix` queue
        #[arg(short, long)]
        suffix: Option<String>,
    },

    /// Run the receive loop with a logging receiver until Ctrl-C
    Listen {
        /// Logical queue name
        #[arg(short, long)]
        queue: String,

        /// Stop after this many messages
        #[arg(short = 'n', long)]
        limit: Option<u64>,

        /// Consume the `full_name__suffix` queue
        #[arg(short, long)]
        suffix: Option<String>,
    },

    /// Print the full name a queue resolves to
    Name {
        /// Logical queue name
        queue: Option<String>,

        /// Module path of a receiver, e.g. `billing::handlers`
        #[arg(long, requires = "function", conflicts_with = "queue")]
        module: Option<String>,

        /// Function name of a receiver
        #[arg(long, requires = "module", conflicts_with = "queue")]
        function: Option<String>,
    },

    /// Print the resolved configuration
    Config {
        /// Output format for configuration
        #[arg(short = 'f', long, default_value = "yaml")]
        format: ConfigFormat,
    },
}

/// Configuration format options
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ConfigFormat {
    /// YAML format
    Yaml,
    /// JSON format
    Json,
    /// TOML format
    Toml,
}

/// Parse a `key=value` attribute argument
pub fn parse_attribute(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{}'", raw)),
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// CLI operation errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Command failed: {message}")]
    CommandFailed { message: String },

    #[error("Invalid argument: {arg} - {message}")]
    InvalidArgument { arg: String, message: String },

    #[error("Output error: {0:#}")]
    Output(#[source] anyhow::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ConfigurationError> for CliError {
    fn from(error: ConfigurationError) -> Self {
        Self::Configuration(ConfigError::Invalid(error))
    }
}

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Could not load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid registry settings: {0}")]
    Invalid(#[from] ConfigurationError),

    #[error("Backend '{backend}' is not available in this build")]
    UnsupportedBackend { backend: String },
}

// ============================================================================
// Configuration Types
// ============================================================================

/// CLI configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CliConfig {
    /// Settings shared by every registered queue
    pub registry: RegistrySettings,

    /// Queue service backend
    pub backend: BackendConfig,

    /// Default logging configuration
    pub logging: LoggingConfig,
}

/// Queue service backend selection
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,

    /// SQS region override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// SQS endpoint override, e.g. a local emulator
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,
}

/// Available queue service backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Process-local queues; messages do not outlive the process
    #[default]
    Memory,
    /// AWS SQS (requires the `aws` feature)
    Sqs,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Log format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

// ============================================================================
// Main Entry Point
// ============================================================================

/// Main CLI entry point
pub async fn run_cli() -> Result<(), CliError> {
    run(Cli::parse()).await
}

/// Execute an already parsed command line
pub async fn run(cli: Cli) -> Result<(), CliError> {
    let config = match load_configuration(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            initialize_logging(&cli, &LoggingConfig::default())?;
            return Err(e.into());
        }
    };
    initialize_logging(&cli, &config.logging)?;

    match cli.command {
        Commands::Send {
            queue,
            body,
            attributes,
            suffix,
        } => execute_send_command(&config, &queue, body, attributes, suffix).await,
        Commands::ReceiveSingle { queue, suffix } => {
            execute_receive_single_command(&config, &queue, suffix).await
        }
        Commands::Listen {
            queue,
            limit,
            suffix,
        } => execute_listen_command(&config, &queue, limit, suffix).await,
        Commands::Name {
            queue,
            module,
            function,
        } => execute_name_command(&config, queue, module, function),
        Commands::Config { format } => execute_config_command(&config, format),
    }
}

// ============================================================================
// Setup
// ============================================================================

/// Initialize logging based on CLI arguments and configuration.
///
/// `RUST_LOG` takes precedence over both. Logs are written to stderr so
/// command output on stdout stays machine readable.
pub fn initialize_logging(cli: &Cli, logging: &LoggingConfig) -> Result<(), CliError> {
    let level = cli.log_level.as_deref().unwrap_or(&logging.level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let json = cli.json_logs || logging.format == LogFormat::Json;

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .try_init()
        .map_err(|e| CliError::CommandFailed {
            message: format!("logging initialization failed: {}", e),
        })
}

/// Load configuration from an optional file and the environment.
///
/// Sources, later ones overriding earlier ones:
/// 1. built-in defaults
/// 2. `path`, format chosen by extension
/// 3. environment variables prefixed `QUEUE_REGISTRY__` with `__` separating
///    nested keys
pub fn load_configuration(path: Option<&Path>) -> Result<CliConfig, ConfigError> {
    let mut builder = config::Config::builder();

    if let Some(path) = path {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        builder = builder.add_source(config::File::from(path).required(true));
    }

    let config: CliConfig = builder
        .add_source(
            config::Environment::with_prefix("QUEUE_REGISTRY")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;

    config.registry.validate()?;
    Ok(config)
}

async fn build_service(backend: &BackendConfig) -> Result<Arc<dyn QueueServiceClient>, CliError> {
    match backend.kind {
        BackendKind::Memory => {
            warn!("Using the in-memory backend; messages do not outlive this process");
            Ok(Arc::new(InMemoryQueueService::new()))
        }
        #[cfg(feature = "aws")]
        BackendKind::Sqs => {
            let sqs = queue_registry::SqsConfig {
                region: backend.region.clone(),
                endpoint_url: backend.endpoint_url.clone(),
            };
            Ok(Arc::new(queue_registry::SqsQueueService::from_config(&sqs).await))
        }
        #[cfg(not(feature = "aws"))]
        BackendKind::Sqs => Err(ConfigError::UnsupportedBackend {
            backend: "sqs".to_string(),
        }
        .into()),
    }
}

async fn build_registry(config: &CliConfig) -> Result<QueueRegistry, CliError> {
    let service = build_service(&config.backend).await?;
    Ok(QueueRegistry::new(service, config.registry.clone())?)
}

/// JSON view of a message for printing and logging
pub fn describe_message(message: &Message) -> Value {
    json!({
        "attributes": message.attributes,
        "body": String::from_utf8_lossy(&message.body),
    })
}

fn printing_receiver() -> Arc<dyn Receiver<Message>> {
    receiver_fn(|message: Message| async move { Ok::<_, HandlerError>(describe_message(&message)) })
}

fn listening_receiver(queue: String) -> Arc<dyn Receiver<Message>> {
    receiver_fn(move |message: Message| {
        let queue = queue.clone();
        async move {
            info!(
                queue = %queue,
                attributes = ?message.attributes,
                body = %String::from_utf8_lossy(&message.body),
                "Message received"
            );
            Ok::<_, HandlerError>(Value::Null)
        }
    })
}

/// Render a serializable value in the requested format
pub fn render<T: Serialize>(value: &T, format: ConfigFormat) -> Result<String, CliError> {
    let rendered = match format {
        ConfigFormat::Yaml => serde_yaml::to_string(value).context("rendering YAML"),
        ConfigFormat::Json => serde_json::to_string_pretty(value).context("rendering JSON"),
        ConfigFormat::Toml => toml::to_string_pretty(value).context("rendering TOML"),
    };
    rendered.map_err(CliError::Output)
}

// ============================================================================
// Command Implementations
// ============================================================================

/// Execute send command
async fn execute_send_command(
    config: &CliConfig,
    queue: &str,
    body: Option<String>,
    attributes: Vec<(String, String)>,
    suffix: Option<String>,
) -> Result<(), CliError> {
    let registry = build_registry(config).await?;
    registry.register::<Message>(queue, None, QueueOptions::default())?;

    let options = SendOptions {
        suffix,
        attributes: attributes.into_iter().collect(),
        body: body.map(Into::into),
    };
    let message_id = registry.send_attributes(queue, options).await?;

    info!(queue = %queue, message_id = %message_id, "Message sent");
    print_line(message_id)?;
    Ok(())
}

/// Execute receive-single command
async fn execute_receive_single_command(
    config: &CliConfig,
    queue: &str,
    suffix: Option<String>,
) -> Result<(), CliError> {
    let registry = build_registry(config).await?;
    let registered =
        registry.register(queue, Some(printing_receiver()), QueueOptions::default())?;

    match registered.receive_single_from(suffix.as_deref()).await? {
        Some((received, value)) => {
            let output = json!({
                "message_id": received.message_id,
                "delivery_count": received.delivery_count,
                "message": value,
            });
            print_line(render(&output, ConfigFormat::Json)?)?;
        }
        None => info!(queue = %queue, "No message available"),
    }
    Ok(())
}

/// Execute listen command
async fn execute_listen_command(
    config: &CliConfig,
    queue: &str,
    limit: Option<u64>,
    suffix: Option<String>,
) -> Result<(), CliError> {
    let registry = build_registry(config).await?;
    let registered = registry.register(
        queue,
        Some(listening_receiver(queue.to_string())),
        QueueOptions::default(),
    )?;

    let options = LoopOptions {
        suffix,
        message_limit: limit,
        outcomes: None,
    };
    let report = registered.receive_loop_with(options, shutdown_signal()).await?;

    print_line(render(&report, ConfigFormat::Json)?)?;
    Ok(())
}

/// Completes on Ctrl-C; never completes when the handler cannot be installed
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Ctrl-C received, shutting down"),
        Err(e) => {
            warn!(error = %e, "Could not listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    }
}

/// Execute name command
fn execute_name_command(
    config: &CliConfig,
    queue: Option<String>,
    module: Option<String>,
    function: Option<String>,
) -> Result<(), CliError> {
    let logical = match (queue, module, function) {
        (Some(queue), None, None) => queue,
        (None, Some(module), Some(function)) => derive_queue_name(&module, &function),
        _ => {
            return Err(CliError::InvalidArgument {
                arg: "queue".to_string(),
                message: "give either a queue name or both --module and --function".to_string(),
            })
        }
    };

    let invalid = |e: ValidationError| CliError::InvalidArgument {
        arg: "queue".to_string(),
        message: e.to_string(),
    };
    let name = QueueName::new(logical).map_err(invalid)?;
    let full_name = full_queue_name(&name, &config.registry.naming_mode()).map_err(invalid)?;

    print_line(full_name)?;
    Ok(())
}

/// Write one line of command output and flush it
fn write_line(mut out: impl Write, line: impl Display) -> Result<(), CliError> {
    writeln!(out, "{}", line)?;
    out.flush()?;
    Ok(())
}

fn print_line(line: impl Display) -> Result<(), CliError> {
    write_line(std::io::stdout().lock(), line)
}

/// Execute config command
fn execute_config_command(config: &CliConfig, format: ConfigFormat) -> Result<(), CliError> {
    print_line(render(config, format)?)?;
    Ok(())
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

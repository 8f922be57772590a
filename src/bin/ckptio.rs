//! ckptio CLI Binary
//!
//! Inspects how a checkpoint context would be set up: which configuration is in
//! effect and which modules the data roots bind to.

use anyhow::Context as _;
use ckptio::component::ComponentRegistry;
use ckptio::context::{destroy_context, ContextBuilder};
use ckptio::logging::{init_logging, LoggingConfig};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::process;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "ckptio", version, about = "Inspect checkpoint/restart I/O contexts")]
struct Cli {
    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log format (text, json)
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create a context, report its configuration and modules, then destroy it
    Info {
        /// Context identifier
        #[arg(long, default_value = "ckptio")]
        name: String,

        /// Configuration file with overrides
        #[arg(long)]
        config: Option<PathBuf>,

        /// Section of the configuration file to use
        #[arg(long)]
        prefix: Option<String>,

        /// Data roots to use when the configuration does not set them
        #[arg(long)]
        data_roots: Option<String>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// List the registered backend components
    Components,
}

fn main() {
    let cli = Cli::parse();

    let logging_config = build_logging_config(&cli);
    if let Err(e) = init_logging(Some(&logging_config)) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    info!("ckptio CLI starting");

    match execute(&cli.command) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            error!("Command failed: {:#}", e);
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

/// Precedence: CLI flags override defaults; CKPTIO_LOG* variables override both.
fn build_logging_config(cli: &Cli) -> LoggingConfig {
    let mut config = LoggingConfig::default();
    if cli.verbose {
        config.level = "debug".to_string();
    }
    if let Some(ref level) = cli.log_level {
        config.level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        config.format = format.clone();
    }
    config
}

fn execute(command: &Command) -> anyhow::Result<String> {
    match command {
        Command::Info {
            name,
            config,
            prefix,
            data_roots,
            json,
        } => {
            let mut builder = ContextBuilder::new(name.clone());
            if let Some(path) = config {
                builder = builder.config_file(path);
            }
            if let Some(prefix) = prefix {
                builder = builder.config_prefix(prefix.clone());
            }
            if let Some(roots) = data_roots {
                builder = builder.default_data_roots(roots.clone());
            }

            let context = builder
                .build()
                .with_context(|| format!("Could not create context {}", name))?;

            let vars = context.config_vars();
            let modules: Vec<(String, String)> = context
                .modules()
                .map(|m| (m.component().to_string(), m.data_root().to_string()))
                .collect();
            let pending = context.file_configuration().to_vec();
            let selected = context.select_module().data_root().to_string();

            let output = if *json {
                serde_json::to_string_pretty(&json!({
                    "identifier": context.identifier(),
                    "rank": context.rank(),
                    "size": context.size(),
                    "variables": vars,
                    "modules": modules
                        .iter()
                        .map(|(component, root)| json!({ "component": component, "data_root": root }))
                        .collect::<Vec<_>>(),
                    "selected": selected,
                    "pending_file_entries": pending,
                }))?
            } else {
                let mut lines = vec![format!(
                    "Context {} (rank {} of {})",
                    context.identifier(),
                    context.rank(),
                    context.size()
                )];
                lines.push("Variables:".to_string());
                for var in &vars {
                    lines.push(format!(
                        "  {} = {} [{}{}] {}",
                        var.key,
                        var.value,
                        var.config_type().as_str(),
                        if var.is_read_only() { ", read-only" } else { "" },
                        var.description
                    ));
                }
                lines.push("Modules:".to_string());
                for (index, (component, root)) in modules.iter().enumerate() {
                    let marker = if *root == selected { "*" } else { " " };
                    lines.push(format!("{} {}: {} ({})", marker, index, root, component));
                }
                for kv in &pending {
                    lines.push(format!(
                        "Pending entry for {}: {} = {}",
                        kv.object_identifier, kv.key, kv.value
                    ));
                }
                lines.join("\n")
            };

            let mut slot = Some(context);
            destroy_context(&mut slot).context("Context teardown reported an error")?;
            Ok(output)
        }
        Command::Components => {
            let registry = ComponentRegistry::global();
            registry.init()?;
            let names = registry.component_names();
            registry.fini()?;
            Ok(names.join("\n"))
        }
    }
}

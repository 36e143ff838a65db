use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;
use slbridge_core::BridgeError;
use std::path::PathBuf;
use std::time::Duration;

use slbridge_manager::commands::{channels, lock, read, watch};
use slbridge_manager::config::{logical_name, semaphore_name, ConnectOptions};

#[derive(Parser)]
#[command(name = "slbridge")]
#[command(about = "Inspect and operate an SL controller's shared memory channels")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Bridge config file (TOML or YAML)
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,

    /// Descriptor file written by the controller
    #[arg(short = 'd', long = "descriptors", global = true)]
    descriptors: Option<PathBuf>,

    /// Robot namespace prefixed to channel names
    #[arg(short = 'n', long = "namespace", global = true)]
    namespace: Option<String>,

    /// Lock timeout in seconds (0 = single attempt)
    #[arg(short = 't', long = "timeout", global = true)]
    timeout: Option<f64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the objects in the descriptor table
    Channels {
        /// Show every namespace, not just the configured one
        #[arg(short = 'a', long = "all")]
        all: bool,
        /// Print JSON
        #[arg(long = "json")]
        json: bool,
    },

    /// Read one channel under its semaphore
    Read {
        /// Channel name (with or without namespace)
        channel: String,
        /// Floats per row
        #[arg(long = "cols")]
        cols: Option<usize>,
        /// Hex dump instead of floats
        #[arg(long = "raw", conflicts_with = "json")]
        raw: bool,
        /// Print JSON
        #[arg(long = "json")]
        json: bool,
    },

    /// Receive the controller's desired commands once
    Commands,

    /// Check whether a channel's semaphore is held
    Probe {
        /// Channel or semaphore name
        channel: String,
    },

    /// Give a channel's semaphore back (no-op when already free)
    Give {
        /// Channel or semaphore name
        channel: String,
    },

    /// Poll the controller's commands
    Watch {
        /// Milliseconds between polls
        #[arg(short = 'i', long = "interval-ms", default_value = "100")]
        interval_ms: u64,
        /// Stop after this many polls
        #[arg(long = "count")]
        count: Option<u64>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("slbridge=info,slbridge_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let options = ConnectOptions {
        config: cli.config,
        descriptors: cli.descriptors,
        namespace: cli.namespace,
        timeout: cli.timeout,
    };

    if let Err(e) = run_command(&options, cli.command) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        if let Some(bridge_err) = e.downcast_ref::<BridgeError>() {
            if bridge_err.is_fatal() {
                eprintln!("{}", "Bridge state is unsafe; not continuing".red());
            }
        }
        std::process::exit(1);
    }
}

fn run_command(options: &ConnectOptions, command: Commands) -> Result<()> {
    match command {
        Commands::Channels { all, json } => {
            let (config, table) = options.load_table()?;
            let namespace = if all { None } else { Some(config.namespace.as_str()) };
            channels::print(&channels::list(&table, namespace), json)
        }

        Commands::Read {
            channel,
            cols,
            raw,
            json,
        } => {
            let bridge = options.connect()?;
            let channel = logical_name(bridge.namespace(), &channel)?;
            let Some(data) = read::read(&bridge, channel)? else {
                println!("{} '{}' is locked", "✗".red(), channel);
                return Ok(());
            };

            if raw {
                print!("{}", read::hex_dump(&data));
            } else {
                let dump = read::to_floats(&data, cols)?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&dump)?);
                } else {
                    print!("{}", read::format_floats(&dump));
                }
            }
            Ok(())
        }

        Commands::Commands => {
            let bridge = options.connect()?;
            match bridge.receive_commands()? {
                Some(frame) => {
                    println!("t = {}", frame.timestamp);
                    println!("{}", frame.data);
                }
                None => println!("{} commands are locked", "✗".red()),
            }
            Ok(())
        }

        Commands::Probe { channel } => {
            let bridge = options.connect()?;
            let semaphore = semaphore_name(logical_name(bridge.namespace(), &channel)?);
            match lock::probe(&bridge, &semaphore)? {
                lock::LockState::Free => println!("{} {} is free", "✓".green(), semaphore),
                lock::LockState::Held => println!("{} {} is held", "●".yellow(), semaphore),
            }
            Ok(())
        }

        Commands::Give { channel } => {
            let bridge = options.connect()?;
            let semaphore = semaphore_name(logical_name(bridge.namespace(), &channel)?);
            lock::release(&bridge, &semaphore)?;
            println!("{} {} released", "✓".green(), semaphore);
            Ok(())
        }

        Commands::Watch { interval_ms, count } => {
            let bridge = options.connect()?;
            let received = watch::watch_commands(
                &bridge,
                Duration::from_millis(interval_ms),
                count,
                |frame| {
                    println!("{} t = {}", "→".cyan(), frame.timestamp);
                    println!("{}", frame.data);
                },
            )?;
            println!(
                "{} {} frames, {} errors",
                "✓".green(),
                received,
                bridge.errors()
            );
            Ok(())
        }
    }
}

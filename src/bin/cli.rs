//! Sirfline CLI
//!
//! Thin shell over the library: detect a receiver, switch its protocol,
//! poll the firmware version, or stream decoded messages to stdout.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use sirfline_core::{
    list_ports, LineParams, LineSettings, Message, Protocol, SerialTransport, Session,
    SessionConfig,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Target protocol for `set-mode`
#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProtocolArg {
    /// NMEA 0183 text sentences
    Nmea,
    /// SiRF binary frames
    Sirf,
}

impl From<ProtocolArg> for Protocol {
    fn from(arg: ProtocolArg) -> Self {
        match arg {
            ProtocolArg::Nmea => Protocol::Nmea,
            ProtocolArg::Sirf => Protocol::Sirf,
        }
    }
}

/// Sirfline CLI
#[derive(Parser, Debug)]
#[command(
    name = "sirfline",
    version,
    about = "SiRF/NMEA GPS receiver protocol tool",
    long_about = None
)]
struct Cli {
    /// Verbose output (debug-level logs)
    #[arg(short, long)]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List available serial ports
    ListPorts {
        /// Emit JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Detect the receiver's mode and print it
    Detect {
        /// Serial port name (e.g. /dev/ttyUSB0, COM3)
        port: String,
    },

    /// Switch the receiver to a protocol and exit
    SetMode {
        /// Serial port name
        port: String,

        /// Target protocol
        #[arg(long, value_enum, default_value_t = ProtocolArg::Sirf)]
        protocol: ProtocolArg,

        /// Target baud rate (defaults to the protocol's usual speed)
        #[arg(long)]
        baud: Option<u32>,
    },

    /// Poll and print the receiver firmware version
    Version {
        /// Serial port name
        port: String,
    },

    /// Stream decoded messages to stdout until interrupted
    Watch {
        /// Serial port name
        port: String,

        /// Only print messages with this id
        #[arg(long)]
        filter: Option<u8>,

        /// Disable the `***` separators printed at cycle boundaries
        #[arg(long)]
        no_separators: bool,

        /// Prefix each message with the local receive time
        #[arg(long)]
        timestamps: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::ListPorts { json } => {
            let ports = list_ports()?;
            if json {
                let entries: Vec<serde_json::Value> = ports
                    .iter()
                    .map(|p| {
                        serde_json::json!({
                            "name": p.port_name,
                            "type": format!("{:?}", p.port_type),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                if ports.is_empty() {
                    eprintln!("No serial ports found.");
                }
                for port in ports {
                    println!("{}", port.port_name);
                }
            }
            Ok(())
        }
        Commands::Detect { port } => {
            let mut session = open_session(&port)?;
            println!("{}", session.mode());
            // Looking should not move the receiver.
            session.close();
            Ok(())
        }
        Commands::SetMode {
            port,
            protocol,
            baud,
        } => set_mode(&port, protocol.into(), baud),
        Commands::Version { port } => version(&port),
        Commands::Watch {
            port,
            filter,
            no_separators,
            timestamps,
        } => watch(&port, filter, no_separators, timestamps),
    }
}

fn open_session(port: &str) -> anyhow::Result<Session> {
    let config = SessionConfig::default();
    let transport = SerialTransport::open(port, LineParams::new(config.nmea_speed))
        .with_context(|| format!("opening {port}"))?;
    Session::open(Box::new(transport), config).context("establishing receiver session")
}

fn cancel_flag() -> anyhow::Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = flag.clone();
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::Relaxed);
    })?;
    Ok(flag)
}

fn set_mode(port: &str, protocol: Protocol, baud: Option<u32>) -> anyhow::Result<()> {
    let mut session = open_session(port)?;

    let target = match protocol {
        Protocol::Nmea => LineSettings::nmea(baud.unwrap_or(4800)),
        Protocol::Sirf => LineSettings::sirf(baud.unwrap_or(19200)),
    };

    if session.mode().settings() == Some(target) {
        println!("Receiver already in {target}");
    } else {
        session.switch_to(target)?;
        println!("Receiver now in {}", session.mode());
    }

    // The receiver should stay where we put it.
    session.close();
    Ok(())
}

fn version(port: &str) -> anyhow::Result<()> {
    let mut session = open_session(port)?;
    if session.mode().protocol() == Some(Protocol::Nmea) {
        session.nmea_to_sirf()?;
    }
    let version = session.poll_software_version()?;
    println!("{version}");
    session.shutdown();
    Ok(())
}

fn watch(port: &str, filter: Option<u8>, no_separators: bool, timestamps: bool) -> anyhow::Result<()> {
    let mut session = open_session(port)?;
    let flag = cancel_flag()?;
    session.set_cancel_flag(flag.clone());

    if session.mode().protocol() == Some(Protocol::Nmea) {
        session.nmea_to_sirf()?;
    }
    session.poll_software_version()?;

    // Same threshold the session uses for cycle boundaries.
    let gap = SessionConfig::default().cycle_gap.as_secs_f64();
    let mut last_time = f64::NAN;
    let mut count: u64 = 0;
    loop {
        if flag.load(Ordering::Relaxed) {
            break;
        }
        let message = match session.read_message(None) {
            Ok(message) => message,
            Err(sirfline_core::SessionError::Cancelled) => break,
            Err(e) => {
                session.shutdown();
                return Err(e.into());
            }
        };

        if filter.is_some_and(|id| message.message_id() != id) {
            continue;
        }

        if let Some(arrival) = session.last_arrival() {
            if !no_separators && arrival - last_time > gap {
                println!("***");
                println!();
            }
            last_time = arrival;
        }

        if timestamps {
            println!("[{}]", chrono::Local::now().format("%H:%M:%S%.3f"));
        }
        print_message(&message);
        count += 1;
    }

    eprintln!("Printed {count} messages");
    session.shutdown();
    Ok(())
}

fn print_message(message: &Message) {
    println!("{message:#?}");
    println!();
}

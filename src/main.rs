use anyhow::Context;
use clap::Parser;
use ipsniff::config::CaptureConfig;
use ipsniff::error::CaptureError;
use ipsniff::host;
use ipsniff::listener::PacketListener;
use ipsniff::reporter::LogReporter;
use ipsniff::socket::CaptureSocket;
use log::{error, info, LevelFilter};
use simplelog::{ColorChoice, Config as LogConfig, TermLogger, TerminalMode};
use std::net::Ipv4Addr;
use std::process;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// List all interfaces and exit
    #[arg(short, long)]
    list: bool,

    /// Index of the network interface to capture on (use --list to list of interfaces)
    #[arg(short, long, conflicts_with = "address")]
    interface: Option<u32>,

    /// Local IPv4 address to bind to. Default: the address the host name resolves to
    #[arg(short, long)]
    address: Option<Ipv4Addr>,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
}

fn main() {
    let args = Args::parse();

    if let Err(e) = TermLogger::init(args.log_level, LogConfig::default(), TerminalMode::Mixed, ColorChoice::Auto) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    if args.list {
        list_interfaces_and_exit();
    }

    if let Err(e) = run(&args) {
        error!("{:#}", e);
        process::exit(1);
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let bind_address = match (args.address, args.interface) {
        (Some(address), _) => address,
        (None, Some(index)) => host::interface_address(index)
            .with_context(|| format!("Could not use interface {}", index))?,
        (None, None) => host::resolve_host_address()
            .context("Could not resolve the local host address")?,
    };

    let config = CaptureConfig::new(bind_address);
    let socket = CaptureSocket::open(&config)?;

    let stop = socket.stop_handle();
    ctrlc::set_handler(move || stop.stop())
        .context("Failed to install the interrupt handler")?;

    // the socket is dropped with the listener, which turns promiscuous capture off
    let mut listener = PacketListener::new(socket, LogReporter, config.buffer_size);
    match listener.run() {
        CaptureError::Interrupted => {
            info!("Interrupted, shutting down");
            Ok(())
        }
        e => Err(e.into()),
    }
}

fn list_interfaces_and_exit() {
    for line in host::list_interfaces() {
        println!("{}", line);
    }

    process::exit(0);
}

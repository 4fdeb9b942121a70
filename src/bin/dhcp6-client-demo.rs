//! A small demonstration binary: wires an in-memory mock IP stack to a
//! `Session` and drives it through SOLICIT / REQUEST, in the spirit of the
//! teacher's `src/client.rs` hand-rolled test client. Not a production
//! client integration (see `collaborators::IpStack` for that seam) — it
//! exists to exercise the state machine end to end against a real DHCPv6
//! server over a real socket, with a pretend address table standing in for
//! the kernel's.

use std::collections::HashMap;
use std::net::Ipv6Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use advmac::MacAddr6;
use tracing::{info, warn, Level};

use dhcpv6_client::collaborators::{
    DadNotifier, IpStack, IpStackError, IpStackIndex, ServerErrorCallback, ServerErrorKind, StateChangeCallback,
};
use dhcpv6_client::config::SessionConfig;
use dhcpv6_client::duid::{DuidType, HardwareType};
use dhcpv6_client::fsm::{ClientState, DadResultSender, Session};
use dhcpv6_client::transport::StdUdpTransport;

const HELP: &str = "\
dhcpv6-client-demo

USAGE:
  dhcpv6-client-demo [OPTIONS]

OPTIONS:
  --interface <NAME>        Interface name to register addresses on [default: eth0]
  --interface-index <IDX>   Interface index for multicast join [default: 0]
  --mac <MAC>               Client MAC address, colon-separated hex [default: 02:00:00:00:00:01]
  --iaid <IAID>             IA_NA identifier [default: 1]
  --rapid-commit            Request rapid commit (single SOLICIT/REPLY exchange)
  --persist <PATH>          Snapshot/restore file path
  -h, --help                Print this help and exit
";

struct Args {
    interface: String,
    interface_index: u32,
    mac: MacAddr6,
    iaid: u32,
    rapid_commit: bool,
    persist: Option<std::path::PathBuf>,
}

fn parse_args() -> Result<Args, String> {
    let mut pargs = pico_args::Arguments::from_env();
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let mac: String = pargs
        .opt_value_from_str("--mac")
        .map_err(|e| e.to_string())?
        .unwrap_or_else(|| "02:00:00:00:00:01".to_string());
    let mac: MacAddr6 = mac.parse().map_err(|_| format!("invalid MAC address `{mac}`"))?;

    let args = Args {
        interface: pargs.opt_value_from_str("--interface").map_err(|e| e.to_string())?.unwrap_or_else(|| "eth0".to_string()),
        interface_index: pargs.opt_value_from_str("--interface-index").map_err(|e| e.to_string())?.unwrap_or(0),
        mac,
        iaid: pargs.opt_value_from_str("--iaid").map_err(|e| e.to_string())?.unwrap_or(1),
        rapid_commit: pargs.contains("--rapid-commit"),
        persist: pargs.opt_value_from_str("--persist").map_err(|e| e.to_string())?,
    };

    let remaining = pargs.finish();
    if !remaining.is_empty() {
        return Err(format!("unexpected arguments: {remaining:?}"));
    }

    Ok(args)
}

/// An in-memory stand-in for the kernel's address table: logs what a real
/// `IpStack` would do, reports Duplicate Address Detection as an immediate
/// success (no kernel to actually probe), and never routes a packet.
struct MockIpStack {
    next_index: IpStackIndex,
    addresses: HashMap<IpStackIndex, Ipv6Addr>,
    dad: Arc<Mutex<Option<DadResultSender>>>,
}

impl MockIpStack {
    fn new(dad: Arc<Mutex<Option<DadResultSender>>>) -> Self {
        MockIpStack { next_index: 1, addresses: HashMap::new(), dad }
    }
}

impl IpStack for MockIpStack {
    fn address_set(&mut self, interface: &str, address: Ipv6Addr, prefix_len: u8) -> Result<IpStackIndex, IpStackError> {
        let index = self.next_index;
        self.next_index += 1;
        self.addresses.insert(index, address);
        info!(%interface, %address, prefix_len, index, "would register address");
        if let Some(sender) = self.dad.lock().unwrap().as_mut() {
            sender.on_dad_result(index, true);
        }
        Ok(index)
    }

    fn address_delete(&mut self, index: IpStackIndex) -> Result<(), IpStackError> {
        match self.addresses.remove(&index) {
            Some(address) => {
                info!(%address, index, "would delete address");
                Ok(())
            }
            None => Err(IpStackError),
        }
    }

    fn default_router_add(&mut self, address: Ipv6Addr, interface: &str, lifetime: Duration) -> Result<(), IpStackError> {
        info!(%address, %interface, lifetime_secs = lifetime.as_secs(), "would add default route");
        Ok(())
    }

    fn default_router_delete(&mut self, address: Ipv6Addr) -> Result<(), IpStackError> {
        info!(%address, "would delete default route");
        Ok(())
    }

    fn select_source_address(&self, _interface: &str, _destination: Ipv6Addr) -> Option<Ipv6Addr> {
        None
    }
}

struct LoggingStateCallback;
impl StateChangeCallback for LoggingStateCallback {
    fn on_state_change(&mut self, old: ClientState, new: ClientState) {
        info!(?old, ?new, "state transition");
    }
}

struct LoggingErrorCallback;
impl ServerErrorCallback for LoggingErrorCallback {
    fn on_server_error(&mut self, kind: ServerErrorKind, status_code: u16, message_type: u8) {
        warn!(?kind, status_code, message_type, "server reported an error status");
    }
}

fn main() {
    dhcpv6_client::logging::init_stdout(Level::INFO);

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {e}\n\n{HELP}");
            std::process::exit(2);
        }
    };

    let config = SessionConfig {
        interface: args.interface,
        interface_index: args.interface_index,
        duid_type: DuidType::LinkLayerPlusTime,
        hw_type: HardwareType::Ethernet,
        duid_time: 0,
        mac: args.mac,
        iaid: args.iaid,
        t1: 0,
        t2: 0,
        rapid_commit: args.rapid_commit,
        dad_enabled: true,
        requested_options: vec![],
        fqdn: None,
        persist_path: args.persist.clone(),
    };

    let mut session = match Session::new(config) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("failed to create session: {e}");
            std::process::exit(1);
        }
    };

    let transport = match StdUdpTransport::bind(args.interface_index) {
        Ok(transport) => Box::new(transport),
        Err(e) => {
            eprintln!("failed to bind UDP transport: {e}");
            std::process::exit(1);
        }
    };

    let dad_cell: Arc<Mutex<Option<DadResultSender>>> = Arc::new(Mutex::new(None));
    let ip_stack = Box::new(MockIpStack::new(Arc::clone(&dad_cell)));

    if let Err(e) = session.start(ip_stack, transport, Box::new(LoggingStateCallback), Box::new(LoggingErrorCallback)) {
        eprintln!("failed to start session: {e}");
        std::process::exit(1);
    }
    *dad_cell.lock().unwrap() = Some(session.dad_result_sender());

    let shutdown = Arc::new(std::sync::atomic::AtomicBool::new(false));
    spawn_signal_handler(Arc::clone(&shutdown));

    session.request_solicit();

    loop {
        if shutdown.load(std::sync::atomic::Ordering::Acquire) {
            info!("shutting down");
            if session.current_state() == ClientState::BoundToAddress {
                session.request_release();
                std::thread::sleep(Duration::from_millis(500));
            }
            break;
        }

        let state = session.current_state();
        if state == ClientState::BoundToAddress {
            if let Some(addr) = session.ipv6_address() {
                info!(%addr, "bound");
            }
        }

        if let Some(path) = &args.persist {
            if let Ok(snapshot) = session.snapshot() {
                let _ = snapshot.save(path);
            }
        }

        std::thread::sleep(Duration::from_secs(1));
    }

    session.stop();
}

/// Mirrors the teacher's `signal::spawn_sighup_handler` thread shape (same
/// `signal_hook::iterator::Signals::new(..).forever()` idiom), but for the
/// demo binary's own graceful-shutdown signals rather than a reload.
#[cfg(unix)]
fn spawn_signal_handler(shutdown: Arc<std::sync::atomic::AtomicBool>) {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    std::thread::Builder::new()
        .name("signal-handler".to_string())
        .spawn(move || {
            let mut signals = Signals::new([SIGINT, SIGTERM]).expect("failed to register signal handler");
            for sig in signals.forever() {
                info!(signal = sig, "received shutdown signal");
                shutdown.store(true, std::sync::atomic::Ordering::Release);
                break;
            }
        })
        .expect("failed to spawn signal handler thread");
}

#[cfg(not(unix))]
fn spawn_signal_handler(_shutdown: Arc<std::sync::atomic::AtomicBool>) {}

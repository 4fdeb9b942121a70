//! C5: the state machine and transaction driver (spec §4.5). `Session` is
//! the public handle; the actual work happens on a worker thread spawned
//! by `start` (see `worker.rs`). `reply_accept.rs` filters incoming
//! replies and `transitions.rs` applies the accepted ones.

pub mod reply_accept;
pub mod transitions;
mod worker;


use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::collaborators::{DadNotifier, IpStack, IpStackIndex, ServerErrorCallback, StateChangeCallback, UdpTransport};
use crate::config::SessionConfig;
use crate::error::{ClientError, ConfigError};
use crate::identity::IdentityStore;
use crate::lease::LeaseTimekeeper;
use crate::persist::PersistedSession;

/// Every state the session can occupy (spec §4.5's state list). `Init` and
/// `BoundToAddress` are the two "resting" states; everything else names
/// the message type currently in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientState {
    Init,
    SendingSolicit,
    SendingRequest,
    SendingConfirm,
    SendingRenew,
    SendingRebind,
    SendingDecline,
    SendingRelease,
    SendingInformationRequest,
    BoundToAddress,
}

/// Commands the public handle sends the worker thread. `DadResult` is the
/// one command the host never issues directly — it arrives via the
/// `DadNotifier` adapter handed to the IP stack collaborator.
enum Command {
    Solicit,
    Confirm,
    Release,
    InformationRequest,
    DadResult { index: IpStackIndex, success: bool },
}

/// Everything the worker mutates under the session mutex. The transport
/// and IP stack collaborators are *not* in here — they are owned directly
/// by the worker thread so a blocking receive never holds this lock (spec
/// §5: "the session mutex is released for the duration of the blocking
/// receive call").
struct SessionInner {
    config: SessionConfig,
    identity: IdentityStore,
    state: ClientState,
    lease: LeaseTimekeeper,
    transaction_id: u32,
    best_preference: Option<u8>,
    started: bool,
}

/// The host-facing handle. Cloning is not supported; a session owns its
/// worker thread for its entire lifetime (spec §5's "exactly one worker
/// thread per session" resource rule).
pub struct Session {
    inner: Arc<Mutex<SessionInner>>,
    cmd_tx: mpsc::Sender<Command>,
    stop_flag: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

/// Adapter handed to the host's IP stack collaborator so DAD completion
/// can be reported back across the thread boundary without giving the
/// collaborator direct access to the session.
pub struct DadResultSender {
    cmd_tx: mpsc::Sender<Command>,
}

impl DadNotifier for DadResultSender {
    fn on_dad_result(&mut self, index: IpStackIndex, success: bool) {
        let _ = self.cmd_tx.send(Command::DadResult { index, success });
    }
}

impl Session {
    /// *create-session* (spec §4.5): builds the identity store from
    /// `config` but does not start the worker thread or touch the
    /// network. Mirrors the teacher's two-step `Config::validate` then
    /// `bind` split.
    pub fn new(config: SessionConfig) -> Result<Session, ClientError> {
        if config.iaid == 0 {
            return Err(ConfigError::ZeroIaid.into());
        }
        if config.t1 > config.t2 && config.t2 != 0 {
            return Err(ConfigError::InvalidT1T2 { t1: config.t1, t2: config.t2 }.into());
        }

        let mut identity = IdentityStore::default();
        identity.create_client_duid(config.duid_type, config.hw_type, config.duid_time, config.mac)?;
        identity.create_client_iana(config.iaid, config.t1, config.t2)?;
        for option in &config.requested_options {
            identity.request_option(*option, true);
        }
        if let Some((domain, op)) = &config.fqdn {
            identity.request_option_fqdn(domain, *op)?;
        }

        let (cmd_tx, _cmd_rx) = mpsc::channel();
        let inner = SessionInner {
            config,
            identity,
            state: ClientState::Init,
            lease: LeaseTimekeeper::default(),
            transaction_id: 0,
            best_preference: None,
            started: false,
        };

        Ok(Session { inner: Arc::new(Mutex::new(inner)), cmd_tx, stop_flag: Arc::new(AtomicBool::new(false)), worker: None })
    }

    /// Rebuild a session from a prior snapshot (spec §6's restore
    /// contract). `elapsed_since_snapshot` is supplied by the host, which
    /// is the only party that knows how long the process was down.
    pub fn restore(
        config: SessionConfig,
        persisted: &PersistedSession,
        elapsed_since_snapshot: Duration,
    ) -> Result<Session, ClientError> {
        let mut session = Session::new(config)?;
        {
            let mut inner = session.inner.lock().unwrap();
            persisted.restore_into(&mut inner.identity);
            inner.state = persisted.state;
            inner.lease.restore(persisted.accrued_seconds, elapsed_since_snapshot.as_secs());
        }
        Ok(session)
    }

    /// *start*: binds the transport, spawns the worker thread. Returns
    /// `ConfigError::AlreadyStarted` if called twice (spec §4.5's startup
    /// paragraph).
    pub fn start(
        &mut self,
        ip_stack: Box<dyn IpStack>,
        transport: Box<dyn UdpTransport>,
        state_cb: Box<dyn StateChangeCallback>,
        error_cb: Box<dyn ServerErrorCallback>,
    ) -> Result<(), ConfigError> {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.started {
                return Err(ConfigError::AlreadyStarted);
            }
            inner.started = true;
        }

        let (cmd_tx, cmd_rx) = mpsc::channel();
        self.cmd_tx = cmd_tx;
        self.stop_flag.store(false, Ordering::Release);

        let inner = Arc::clone(&self.inner);
        let stop_flag = Arc::clone(&self.stop_flag);
        let resources = worker::WorkerResources { ip_stack, transport, state_cb, error_cb };
        self.worker = Some(std::thread::spawn(move || worker::run(inner, resources, cmd_rx, stop_flag)));
        Ok(())
    }

    /// A `DadNotifier` the host hands to its IP stack implementation, so
    /// DAD completions reach the worker thread.
    pub fn dad_result_sender(&self) -> DadResultSender {
        DadResultSender { cmd_tx: self.cmd_tx.clone() }
    }

    /// *stop*: signals the worker to exit and joins it. Idempotent.
    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::Release);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }

    pub fn request_solicit(&self) {
        let _ = self.cmd_tx.send(Command::Solicit);
    }

    pub fn request_confirm(&self) {
        let _ = self.cmd_tx.send(Command::Confirm);
    }

    pub fn request_release(&self) {
        let _ = self.cmd_tx.send(Command::Release);
    }

    pub fn request_information_request(&self) {
        let _ = self.cmd_tx.send(Command::InformationRequest);
    }

    pub fn current_state(&self) -> ClientState {
        self.inner.lock().unwrap().state
    }

    pub fn ipv6_address(&self) -> Option<std::net::Ipv6Addr> {
        self.inner.lock().unwrap().identity.get_ipv6_address()
    }

    /// *snapshot* (spec §6).
    pub fn snapshot(&self) -> Result<PersistedSession, ClientError> {
        let inner = self.inner.lock().unwrap();
        PersistedSession::capture(inner.state, &inner.identity, inner.lease.accrued_seconds()).map_err(Into::into)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}

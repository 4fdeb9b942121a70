//! C5's worker thread: the loop that actually sends, retransmits, and
//! applies replies (spec §4.5/§5). Owns the IP stack and transport
//! collaborators directly, never behind the session mutex, so a blocking
//! receive never stalls a concurrent `Session` method call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::codec::{
    decode_message, encode_message, DecodedMessage, EncodeRequest, MSG_CONFIRM, MSG_DECLINE,
    MSG_INFORMATION_REQUEST, MSG_REBIND, MSG_RELEASE, MSG_RENEW, MSG_REQUEST, MSG_SOLICIT,
};
use crate::collaborators::{
    IpStack, IpStackIndex, ServerErrorCallback, StateChangeCallback, UdpTransport,
    ALL_DHCP_RELAY_AGENTS_AND_SERVERS, SERVER_PORT,
};
use crate::error::ClientError;
use crate::fsm::reply_accept::{accept_reply, AcceptedReply};
use crate::fsm::transitions::{apply_exhaustion, apply_reply, IpStackAction, TransitionResult};
use crate::fsm::{ClientState, Command, SessionInner};
use crate::identity::ia::{IaAddressStatus, IaNa};
use crate::identity::IdentityStore;
use crate::lease::LeaseEvent;
use crate::scheduler::{RetransmitParams, RetransmitState};

/// IPv6's minimum MTU (1280) less a 40-byte IPv6 header and an 8-byte UDP
/// header: the payload budget handed to `encode_message`.
const MAX_MESSAGE_LEN: usize = 1232;

/// Collaborators the worker thread owns for its entire lifetime.
pub struct WorkerResources {
    pub ip_stack: Box<dyn IpStack>,
    pub transport: Box<dyn UdpTransport>,
    pub state_cb: Box<dyn StateChangeCallback>,
    pub error_cb: Box<dyn ServerErrorCallback>,
}

/// One in-flight transaction's retransmission clock: which state it belongs
/// to, its backoff state, and the deadline for the current RT window.
type ActiveTransaction = (ClientState, RetransmitState, Instant);

pub fn run(inner: Arc<Mutex<SessionInner>>, mut resources: WorkerResources, cmd_rx: mpsc::Receiver<Command>, stop_flag: Arc<AtomicBool>) {
    info!("dhcpv6 client worker starting");

    let mut active: Option<ActiveTransaction> = None;
    let mut last_tick = Instant::now();

    while !stop_flag.load(Ordering::Acquire) {
        match cmd_rx.try_recv() {
            Ok(cmd) => handle_command(cmd, &inner, &mut resources),
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => break,
        }

        let state = inner.lock().unwrap().state;
        match state {
            ClientState::Init => {
                active = None;
                park(&cmd_rx, &stop_flag, &inner, &mut resources);
            }
            ClientState::BoundToAddress => {
                active = None;
                tick_lease(&inner, &mut resources, &mut last_tick);
                park(&cmd_rx, &stop_flag, &inner, &mut resources);
            }
            sending => {
                tick_lease(&inner, &mut resources, &mut last_tick);
                drive(sending, &mut active, &inner, &mut resources);
            }
        }
    }

    info!("dhcpv6 client worker stopped");
}

/// Block briefly for the next command so INIT/BOUND don't busy-spin, while
/// still reacting to one that arrives before the deadline.
fn park(cmd_rx: &mpsc::Receiver<Command>, stop_flag: &Arc<AtomicBool>, inner: &Arc<Mutex<SessionInner>>, resources: &mut WorkerResources) {
    match cmd_rx.recv_timeout(Duration::from_millis(500)) {
        Ok(cmd) => handle_command(cmd, inner, resources),
        Err(RecvTimeoutError::Timeout) => {}
        Err(RecvTimeoutError::Disconnected) => stop_flag.store(true, Ordering::Release),
    }
}

fn handle_command(cmd: Command, inner: &Arc<Mutex<SessionInner>>, resources: &mut WorkerResources) {
    match cmd {
        Command::Solicit => request_transition(inner, resources, &[ClientState::Init], ClientState::SendingSolicit),
        Command::Confirm => request_transition(inner, resources, &[ClientState::BoundToAddress], ClientState::SendingConfirm),
        Command::Release => request_transition(inner, resources, &[ClientState::BoundToAddress], ClientState::SendingRelease),
        Command::InformationRequest => {
            request_transition(inner, resources, &[ClientState::Init], ClientState::SendingInformationRequest)
        }
        Command::DadResult { index, success } => handle_dad_result(inner, resources, index, success),
    }
}

fn request_transition(inner: &Arc<Mutex<SessionInner>>, resources: &mut WorkerResources, allowed: &[ClientState], target: ClientState) {
    let mut g = inner.lock().unwrap();
    if !allowed.contains(&g.state) {
        return;
    }
    let old = g.state;
    g.state = target;
    drop(g);
    resources.state_cb.on_state_change(old, target);
}

/// Reacts to a DAD completion reported via `DadNotifier`: marks the address
/// `Valid` or `DadFailure`, and — while BOUND — moves straight to DECLINE
/// for the failed address (spec §4.5's DAD paragraph).
fn handle_dad_result(inner: &Arc<Mutex<SessionInner>>, resources: &mut WorkerResources, index: IpStackIndex, success: bool) {
    let mut g = inner.lock().unwrap();
    let old_state = g.state;
    let mut should_decline = false;
    if let Some(ia) = g.identity.ia.as_mut() {
        for addr in ia.active_mut() {
            if addr.ip_stack_index == Some(index) {
                addr.status = if success { IaAddressStatus::Valid } else { IaAddressStatus::DadFailure };
                should_decline |= !success;
            }
        }
    }
    let new_state = if should_decline && old_state == ClientState::BoundToAddress {
        ClientState::SendingDecline
    } else {
        old_state
    };
    g.state = new_state;
    drop(g);
    if new_state != old_state {
        resources.state_cb.on_state_change(old_state, new_state);
    }
}

/// One coarse (~1s) lease tick (spec §4.4): fires RENEW/REBIND transitions
/// and tears down expired addresses. Runs in both BOUND and the
/// SENDING_RENEW/SENDING_REBIND states, since addresses stay `Valid`
/// throughout those exchanges.
fn tick_lease(inner: &Arc<Mutex<SessionInner>>, resources: &mut WorkerResources, last_tick: &mut Instant) {
    if last_tick.elapsed() < Duration::from_secs(1) {
        return;
    }
    *last_tick = Instant::now();

    let mut g = inner.lock().unwrap();
    let session = &mut *g;
    let old_state = session.state;
    let ia = match session.identity.ia.as_mut() {
        Some(ia) => ia,
        None => return,
    };
    let stack_indices_before: Vec<Option<u64>> = ia.addresses().iter().map(|a| a.ip_stack_index).collect();
    let events = session.lease.tick(ia);

    let mut new_state = old_state;
    for event in &events {
        match event {
            LeaseEvent::RequestRenew if old_state == ClientState::BoundToAddress => new_state = ClientState::SendingRenew,
            LeaseEvent::RequestRebind if old_state == ClientState::SendingRenew => new_state = ClientState::SendingRebind,
            LeaseEvent::AllAddressesExpired => new_state = ClientState::SendingSolicit,
            _ => {}
        }
    }
    session.state = new_state;
    drop(g);

    if new_state != old_state {
        resources.state_cb.on_state_change(old_state, new_state);
    }
    for event in events {
        if let LeaseEvent::AddressExpired { index } = event {
            if let Some(Some(stack_index)) = stack_indices_before.get(index) {
                let _ = resources.ip_stack.address_delete(*stack_index);
            }
        }
    }
}

/// Drive one cycle of the currently in-flight transaction: send on entry or
/// retransmit, otherwise poll for a reply up to the remaining RT window.
fn drive(state: ClientState, active: &mut Option<ActiveTransaction>, inner: &Arc<Mutex<SessionInner>>, resources: &mut WorkerResources) {
    let fresh = active.as_ref().map(|(s, ..)| *s) != Some(state);
    if fresh {
        let params = retransmit_params_for(state, inner);
        {
            let mut g = inner.lock().unwrap();
            g.transaction_id = generate_transaction_id(g.config.mac);
            if state == ClientState::SendingSolicit {
                g.best_preference = None;
            }
        }
        let retransmit = RetransmitState::new(params);
        let deadline = Instant::now() + retransmit.current_rt();
        let elapsed = retransmit.elapsed_time_option();
        *active = Some((state, retransmit, deadline));
        send_message(state, elapsed, inner, resources);
    }

    let (_, retransmit, deadline) = active.as_mut().expect("just populated above");
    let remaining = deadline.saturating_duration_since(Instant::now());

    if remaining.is_zero() {
        if state == ClientState::SendingSolicit && inner.lock().unwrap().best_preference.is_some() {
            finish_solicit_collection(inner, resources);
            *active = None;
            return;
        }
        match retransmit.on_timeout() {
            Ok(()) => {
                *deadline = Instant::now() + retransmit.current_rt();
                let elapsed = retransmit.elapsed_time_option();
                send_message(state, elapsed, inner, resources);
            }
            Err(_) => {
                apply_exhaustion_result(inner, resources);
                *active = None;
            }
        }
        return;
    }

    let poll = remaining.min(Duration::from_millis(500));
    match resources.transport.receive(poll) {
        Ok(Some(bytes)) => {
            if handle_reply(state, &bytes, inner, resources) {
                *active = None;
            }
        }
        Ok(None) => {}
        Err(e) => warn!(error = %e, "transport receive failed"),
    }
}

/// Decode and process one candidate reply datagram. Returns `true` if the
/// transaction concluded (the caller should drop its retransmit state).
fn handle_reply(state: ClientState, bytes: &[u8], inner: &Arc<Mutex<SessionInner>>, resources: &mut WorkerResources) -> bool {
    let msg = match decode_message(bytes) {
        Ok(msg) => msg,
        Err(e) => {
            debug!(?e, "dropped malformed reply");
            return false;
        }
    };

    let (client_duid, tx_id, rapid_commit_requested, best_preference) = {
        let g = inner.lock().unwrap();
        let Some(client_duid) = g.identity.client_duid.clone() else { return false };
        (client_duid, g.transaction_id, g.config.rapid_commit, g.best_preference)
    };

    let accepted = match accept_reply(state, &msg, &client_duid, tx_id, rapid_commit_requested, best_preference) {
        Ok(accepted) => accepted,
        Err(rejection) => {
            debug!(?rejection, "reply rejected");
            return false;
        }
    };

    match &accepted {
        AcceptedReply::Advertise { preference, terminate_collection } => {
            apply_advertise(inner, &msg, *preference);
            if *terminate_collection {
                finish_solicit_collection(inner, resources);
                true
            } else {
                false
            }
        }
        AcceptedReply::RapidCommitReply | AcceptedReply::NormalReply => {
            apply_accepted_reply(&accepted, &msg, inner, resources);
            true
        }
    }
}

/// Merge an ADVERTISE's offer into the identity store without yet changing
/// state — collection continues until the first RT window elapses or a
/// preference-255 advertisement arrives (spec §4.5 rules 4/6).
fn apply_advertise(inner: &Arc<Mutex<SessionInner>>, msg: &DecodedMessage, preference: u8) {
    let mut g = inner.lock().unwrap();
    g.best_preference = Some(preference);
    let accepted = AcceptedReply::Advertise { preference, terminate_collection: preference == 255 };
    let state = g.state;
    let _ = apply_reply(state, &accepted, msg, &mut g.identity);
}

fn finish_solicit_collection(inner: &Arc<Mutex<SessionInner>>, resources: &mut WorkerResources) {
    let mut g = inner.lock().unwrap();
    let old = g.state;
    g.state = ClientState::SendingRequest;
    drop(g);
    if old != ClientState::SendingRequest {
        resources.state_cb.on_state_change(old, ClientState::SendingRequest);
    }
}

fn apply_accepted_reply(accepted: &AcceptedReply, msg: &DecodedMessage, inner: &Arc<Mutex<SessionInner>>, resources: &mut WorkerResources) {
    let (old_state, addrs_before, result) = {
        let mut g = inner.lock().unwrap();
        let old_state = g.state;
        let addrs_before = snapshot_stack_indices(&g.identity);
        let result = apply_reply(old_state, accepted, msg, &mut g.identity);
        g.state = result.new_state;
        if result.reset_accrued {
            g.lease.reset();
        }
        (old_state, addrs_before, result)
    };
    finish_transition(old_state, result, addrs_before, inner, resources);
}

fn apply_exhaustion_result(inner: &Arc<Mutex<SessionInner>>, resources: &mut WorkerResources) {
    let (old_state, addrs_before, result) = {
        let mut g = inner.lock().unwrap();
        let old_state = g.state;
        let addrs_before = snapshot_stack_indices(&g.identity);
        let result = apply_exhaustion(old_state, &mut g.identity);
        g.state = result.new_state;
        (old_state, addrs_before, result)
    };
    finish_transition(old_state, result, addrs_before, inner, resources);
}

fn finish_transition(
    old_state: ClientState,
    result: TransitionResult,
    addrs_before: Vec<Option<u64>>,
    inner: &Arc<Mutex<SessionInner>>,
    resources: &mut WorkerResources,
) {
    if old_state != result.new_state {
        resources.state_cb.on_state_change(old_state, result.new_state);
    }
    for (kind, status, msg_type) in result.server_errors {
        resources.error_cb.on_server_error(kind, status, msg_type);
    }
    for action in &result.ip_actions {
        match action {
            IpStackAction::RegisterInitial => register_initial_addresses(inner, resources),
            IpStackAction::DeregisterAll => deregister_all(resources, &addrs_before),
        }
    }
}

fn snapshot_stack_indices(identity: &IdentityStore) -> Vec<Option<u64>> {
    identity.ia.as_ref().map(|ia| ia.addresses().iter().map(|a| a.ip_stack_index).collect()).unwrap_or_default()
}

fn register_initial_addresses(inner: &Arc<Mutex<SessionInner>>, resources: &mut WorkerResources) {
    let mut g = inner.lock().unwrap();
    let interface = g.config.interface.clone();
    let dad_enabled = g.config.dad_enabled;
    let Some(ia) = g.identity.ia.as_mut() else { return };
    for addr in ia.active_mut() {
        if !matches!(addr.status, IaAddressStatus::Initial) {
            continue;
        }
        match resources.ip_stack.address_set(&interface, addr.address, 64) {
            Ok(index) => {
                addr.ip_stack_index = Some(index);
                addr.status = if dad_enabled { IaAddressStatus::DadTentative } else { IaAddressStatus::Valid };
            }
            Err(e) => warn!(error = %e, address = %addr.address, "address registration failed"),
        }
    }
}

fn deregister_all(resources: &mut WorkerResources, addrs_before: &[Option<u64>]) {
    for index in addrs_before.iter().flatten() {
        let _ = resources.ip_stack.address_delete(*index);
    }
}

fn send_message(state: ClientState, elapsed_centiseconds: u16, inner: &Arc<Mutex<SessionInner>>, resources: &mut WorkerResources) {
    let packet = {
        let g = inner.lock().unwrap();
        compose_message(state, &g, elapsed_centiseconds)
    };
    let packet = match packet {
        Ok(packet) => packet,
        Err(e) => {
            warn!(error = %e, "failed to compose outgoing message, skipping send");
            return;
        }
    };

    let dest = ALL_DHCP_RELAY_AGENTS_AND_SERVERS;
    let source = {
        let g = inner.lock().unwrap();
        resources.ip_stack.select_source_address(&g.config.interface, dest)
    };
    if let Err(e) = resources.transport.send_from_source(&packet, dest, SERVER_PORT, source) {
        warn!(error = %e, "failed to send DHCPv6 message");
    }
}

fn compose_message(state: ClientState, g: &SessionInner, elapsed_centiseconds: u16) -> Result<Vec<u8>, ClientError> {
    let msg_type = msg_type_for(state);
    let rapid_commit = state == ClientState::SendingSolicit && g.config.rapid_commit;

    let declined;
    let identity: &IdentityStore = if state == ClientState::SendingDecline {
        declined = declined_only_identity(&g.identity);
        &declined
    } else {
        &g.identity
    };

    let req = EncodeRequest {
        msg_type,
        transaction_id: g.transaction_id,
        identity,
        elapsed_time_centiseconds: elapsed_centiseconds,
        rapid_commit,
        max_len: MAX_MESSAGE_LEN,
    };
    encode_message(&req)
}

/// DECLINE only ever names the addresses DAD rejected (RFC 8415 §18.2.7);
/// lifetimes are zeroed by `encode_message` regardless, so only the
/// address value matters here.
fn declined_only_identity(identity: &IdentityStore) -> IdentityStore {
    let mut clone = identity.clone();
    if let Some(ia) = &identity.ia {
        if let Ok(mut scratch) = IaNa::create(ia.iaid, 0, 0) {
            for addr in ia.active().filter(|a| matches!(a.status, IaAddressStatus::DadFailure)) {
                let _ = scratch.add_address(addr.address, addr.preferred_lifetime, addr.valid_lifetime);
            }
            clone.ia = Some(scratch);
        }
    }
    clone
}

fn msg_type_for(state: ClientState) -> u8 {
    match state {
        ClientState::SendingSolicit => MSG_SOLICIT,
        ClientState::SendingRequest => MSG_REQUEST,
        ClientState::SendingConfirm => MSG_CONFIRM,
        ClientState::SendingRenew => MSG_RENEW,
        ClientState::SendingRebind => MSG_REBIND,
        ClientState::SendingRelease => MSG_RELEASE,
        ClientState::SendingDecline => MSG_DECLINE,
        ClientState::SendingInformationRequest => MSG_INFORMATION_REQUEST,
        ClientState::Init | ClientState::BoundToAddress => unreachable!("driven only for SENDING_* states"),
    }
}

fn retransmit_params_for(state: ClientState, inner: &Arc<Mutex<SessionInner>>) -> RetransmitParams {
    let g = inner.lock().unwrap();
    match state {
        ClientState::SendingSolicit => RetransmitParams::SOLICIT,
        ClientState::SendingRequest => RetransmitParams::REQUEST,
        ClientState::SendingConfirm => RetransmitParams::CONFIRM,
        ClientState::SendingRelease => RetransmitParams::RELEASE,
        ClientState::SendingDecline => RetransmitParams::DECLINE,
        ClientState::SendingInformationRequest => RetransmitParams::INFORMATION_REQUEST,
        ClientState::SendingRenew => {
            let t2 = g.identity.ia.as_ref().map(|ia| ia.t2 as u64).unwrap_or(0);
            RetransmitParams::renew(t2.saturating_sub(g.lease.accrued_seconds()))
        }
        ClientState::SendingRebind => {
            let max_valid = g
                .identity
                .ia
                .as_ref()
                .map(|ia| ia.active().map(|a| a.valid_lifetime as u64).max().unwrap_or(0))
                .unwrap_or(0);
            RetransmitParams::rebind(max_valid)
        }
        ClientState::Init | ClientState::BoundToAddress => RetransmitParams::SOLICIT,
    }
}

/// RFC 3315 §15.1's non-normative guidance: mix the MAC address into the
/// transaction ID rather than drawing it from a plain counter.
fn generate_transaction_id(mac: advmac::MacAddr6) -> u32 {
    let bytes = mac.to_array();
    let msw = u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]);
    let lsw = u32::from_be_bytes([0, bytes[3], bytes[4], bytes[5]]);
    let r: u32 = rand::random();
    (msw ^ lsw ^ r) & 0x00FF_FFFF
}

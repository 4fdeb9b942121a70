//! Per-state reply-application table (spec §4.5's bulleted outcomes):
//! given an accepted reply, mutate the identity store and return the next
//! state plus the IP-stack actions the worker must carry out.

use crate::codec::decode::DecodedMessage;
use crate::codec::{STATUS_NOT_ON_LINK, STATUS_NO_ADDRS_AVAIL, STATUS_NO_BINDING, STATUS_SUCCESS};
use crate::collaborators::ServerErrorKind;
use crate::fsm::reply_accept::AcceptedReply;
use crate::fsm::ClientState;
use crate::identity::ia::IaAddressStatus;
use crate::identity::IdentityStore;

/// What the worker must do to the IP stack after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpStackAction {
    /// Offer every address currently `Initial` to the IP stack.
    RegisterInitial,
    /// Tear down every address the session currently holds.
    DeregisterAll,
}

#[derive(Debug, Clone)]
pub struct TransitionResult {
    pub new_state: ClientState,
    pub reset_accrued: bool,
    pub ip_actions: Vec<IpStackAction>,
    pub server_errors: Vec<(ServerErrorKind, u16, u8)>,
}

fn merge_ia_from_reply(identity: &mut IdentityStore, msg: &DecodedMessage) {
    let Some(decoded_ia) = &msg.ia_na else { return };
    let Some(ia) = identity.ia.as_mut() else { return };
    if decoded_ia.iaid != ia.iaid {
        return;
    }
    ia.t1 = decoded_ia.t1;
    ia.t2 = decoded_ia.t2;
    for decoded_addr in &decoded_ia.addresses {
        if let Some(existing) = ia.active_mut().find(|a| a.address == decoded_addr.address) {
            existing.preferred_lifetime = decoded_addr.preferred_lifetime;
            existing.valid_lifetime = decoded_addr.valid_lifetime;
        } else {
            let _ = ia.add_address(decoded_addr.address, decoded_addr.preferred_lifetime, decoded_addr.valid_lifetime);
        }
    }
}

/// Apply an accepted reply to `identity`, returning the next state and
/// required side effects. Callers (the worker) still own firing the
/// state-change callback and invoking the IP-stack collaborator.
pub fn apply_reply(
    current: ClientState,
    accepted: &AcceptedReply,
    msg: &DecodedMessage,
    identity: &mut IdentityStore,
) -> TransitionResult {
    match accepted {
        AcceptedReply::Advertise { preference, .. } => {
            identity.preference = *preference;
            identity.server_duid = msg.server_duid.clone();
            merge_ia_from_reply(identity, msg);
            TransitionResult {
                new_state: ClientState::SendingRequest,
                reset_accrued: false,
                ip_actions: vec![],
                server_errors: collect_server_errors(msg),
            }
        }
        AcceptedReply::RapidCommitReply => {
            identity.server_duid = msg.server_duid.clone();
            merge_ia_from_reply(identity, msg);
            TransitionResult {
                new_state: ClientState::BoundToAddress,
                reset_accrued: true,
                ip_actions: vec![IpStackAction::RegisterInitial],
                server_errors: collect_server_errors(msg),
            }
        }
        AcceptedReply::NormalReply => apply_normal_reply(current, msg, identity),
    }
}

fn ia_status(msg: &DecodedMessage) -> Option<u16> {
    msg.ia_na.as_ref().and_then(|ia| ia.status.as_ref()).map(|(code, _)| *code)
}

/// RFC 8415 §18.3.3: a CONFIRM's result travels as a top-level Status Code,
/// not nested inside IA_NA. Fall back to the IA_NA-nested status for
/// servers that nest it anyway, then default to success.
fn confirm_status(msg: &DecodedMessage) -> u16 {
    msg.status.as_ref().map(|(code, _)| *code).or_else(|| ia_status(msg)).unwrap_or(STATUS_SUCCESS)
}

/// Every non-success Status Code in `msg`, tagged with the option category
/// it was found in (top-level, IA_NA, or a specific IA-Address).
fn collect_server_errors(msg: &DecodedMessage) -> Vec<(ServerErrorKind, u16, u8)> {
    let mut errors = Vec::new();
    if let Some((code, _)) = &msg.status {
        if *code != STATUS_SUCCESS {
            errors.push((ServerErrorKind::TopLevelStatus, *code, msg.msg_type));
        }
    }
    if let Some(ia) = &msg.ia_na {
        if let Some((code, _)) = &ia.status {
            if *code != STATUS_SUCCESS {
                errors.push((ServerErrorKind::IaNaStatus, *code, msg.msg_type));
            }
        }
        for addr in &ia.addresses {
            if let Some((code, _)) = &addr.status {
                if *code != STATUS_SUCCESS {
                    errors.push((ServerErrorKind::IaAddressStatus, *code, msg.msg_type));
                }
            }
        }
    }
    errors
}

fn apply_normal_reply(current: ClientState, msg: &DecodedMessage, identity: &mut IdentityStore) -> TransitionResult {
    let status = ia_status(msg).unwrap_or(STATUS_SUCCESS);
    let server_errors = collect_server_errors(msg);

    match current {
        ClientState::SendingRequest => match status {
            STATUS_SUCCESS => {
                identity.server_duid = msg.server_duid.clone();
                merge_ia_from_reply(identity, msg);
                TransitionResult {
                    new_state: ClientState::BoundToAddress,
                    reset_accrued: true,
                    ip_actions: vec![IpStackAction::RegisterInitial],
                    server_errors,
                }
            }
            STATUS_NOT_ON_LINK | STATUS_NO_ADDRS_AVAIL => {
                if let Some(ia) = identity.ia.as_mut() {
                    ia.clear();
                }
                TransitionResult {
                    new_state: ClientState::SendingSolicit,
                    reset_accrued: false,
                    ip_actions: vec![IpStackAction::DeregisterAll],
                    server_errors,
                }
            }
            _ => TransitionResult {
                new_state: current,
                reset_accrued: false,
                ip_actions: vec![],
                server_errors,
            },
        },

        ClientState::SendingRenew | ClientState::SendingRebind => match status {
            STATUS_SUCCESS if msg.ia_na.as_ref().map(|ia| !ia.addresses.is_empty()).unwrap_or(false) => {
                merge_ia_from_reply(identity, msg);
                TransitionResult {
                    new_state: ClientState::BoundToAddress,
                    reset_accrued: true,
                    ip_actions: vec![IpStackAction::RegisterInitial],
                    server_errors,
                }
            }
            STATUS_NO_BINDING => TransitionResult {
                new_state: ClientState::SendingRequest,
                reset_accrued: false,
                ip_actions: vec![],
                server_errors,
            },
            _ => TransitionResult {
                new_state: current,
                reset_accrued: false,
                ip_actions: vec![],
                server_errors,
            },
        },

        ClientState::SendingConfirm => match confirm_status(msg) {
            STATUS_NOT_ON_LINK => {
                if let Some(ia) = identity.ia.as_mut() {
                    ia.clear();
                }
                TransitionResult {
                    new_state: ClientState::SendingSolicit,
                    reset_accrued: false,
                    ip_actions: vec![IpStackAction::DeregisterAll],
                    server_errors,
                }
            }
            _ => TransitionResult {
                new_state: ClientState::BoundToAddress,
                reset_accrued: false,
                ip_actions: vec![],
                server_errors,
            },
        },

        ClientState::SendingRelease | ClientState::SendingDecline => {
            if let Some(ia) = identity.ia.as_mut() {
                ia.clear();
            }
            TransitionResult {
                new_state: ClientState::Init,
                reset_accrued: false,
                ip_actions: vec![IpStackAction::DeregisterAll],
                server_errors,
            }
        }

        ClientState::SendingInformationRequest => {
            let remains_valid = identity
                .ia
                .as_ref()
                .map(|ia| ia.active().any(|a| matches!(a.status, IaAddressStatus::Valid)))
                .unwrap_or(false);
            TransitionResult {
                new_state: if remains_valid { ClientState::BoundToAddress } else { ClientState::Init },
                reset_accrued: false,
                ip_actions: vec![],
                server_errors,
            }
        }

        // SendingSolicit and BoundToAddress/Init don't apply a "normal"
        // reply directly (solicit has its own Advertise/RapidCommit
        // variants; the others have no outstanding transaction).
        other => TransitionResult { new_state: other, reset_accrued: false, ip_actions: vec![], server_errors },
    }
}

/// Retransmission-exhaustion fallback (spec §4.3 step 4 / §4.5 scenario 3):
/// every state falls back to INIT, tearing down any addresses that were
/// only tentatively held for a SENDING_RELEASE/DECLINE transaction.
pub fn apply_exhaustion(current: ClientState, identity: &mut IdentityStore) -> TransitionResult {
    let ip_actions = match current {
        ClientState::SendingRelease | ClientState::SendingDecline => {
            if let Some(ia) = identity.ia.as_mut() {
                ia.clear();
            }
            vec![IpStackAction::DeregisterAll]
        }
        _ => vec![],
    };
    TransitionResult { new_state: ClientState::Init, reset_accrued: false, ip_actions, server_errors: Vec::new() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{
        write_option_header, MessageHeader, OPTION_IAADDR, OPTION_IA_NA, OPTION_STATUS_CODE, MSG_REPLY,
        STATUS_UNSPEC_FAIL,
    };

    fn bound_identity(addr: &str) -> IdentityStore {
        let mut identity = IdentityStore::default();
        identity.create_client_iana(1, 300, 480).unwrap();
        identity.add_client_ia(addr.parse().unwrap(), 600, 900).unwrap();
        identity.ia.as_mut().unwrap().active_mut().next().unwrap().status = IaAddressStatus::Valid;
        identity
    }

    fn reply_with_ia_status(status: u16) -> DecodedMessage {
        let mut ia_body = Vec::new();
        ia_body.extend_from_slice(&1u32.to_be_bytes());
        ia_body.extend_from_slice(&0u32.to_be_bytes());
        ia_body.extend_from_slice(&0u32.to_be_bytes());
        let status_body = status.to_be_bytes();
        write_option_header(&mut ia_body, OPTION_STATUS_CODE, status_body.len() as u16);
        ia_body.extend_from_slice(&status_body);

        let mut opts = Vec::new();
        write_option_header(&mut opts, OPTION_IA_NA, ia_body.len() as u16);
        opts.extend_from_slice(&ia_body);

        let mut buf = vec![0u8; MessageHeader::WIRE_LEN];
        buf[0] = MSG_REPLY;
        buf.extend_from_slice(&opts);
        let mut msg = crate::codec::decode_message(&buf).unwrap();
        msg.msg_type = MSG_REPLY;
        msg
    }

    /// A bare IA_NA (no nested status) plus a top-level Status Code, as a
    /// compliant CONFIRM reply carries it (RFC 8415 §18.3.3).
    fn reply_with_top_level_status(status: u16) -> DecodedMessage {
        let mut ia_body = Vec::new();
        ia_body.extend_from_slice(&1u32.to_be_bytes());
        ia_body.extend_from_slice(&0u32.to_be_bytes());
        ia_body.extend_from_slice(&0u32.to_be_bytes());

        let mut opts = Vec::new();
        write_option_header(&mut opts, OPTION_IA_NA, ia_body.len() as u16);
        opts.extend_from_slice(&ia_body);
        let status_body = status.to_be_bytes();
        write_option_header(&mut opts, OPTION_STATUS_CODE, status_body.len() as u16);
        opts.extend_from_slice(&status_body);

        let mut buf = vec![0u8; MessageHeader::WIRE_LEN];
        buf[0] = MSG_REPLY;
        buf.extend_from_slice(&opts);
        let mut msg = crate::codec::decode_message(&buf).unwrap();
        msg.msg_type = MSG_REPLY;
        msg
    }

    /// An IA_NA carrying one IA-Address with a non-success status nested
    /// inside the address, not the IA_NA itself.
    fn reply_with_ia_address_status(status: u16) -> DecodedMessage {
        let mut addr_body = Vec::new();
        addr_body.extend_from_slice(&"2001:db8::20".parse::<std::net::Ipv6Addr>().unwrap().octets());
        addr_body.extend_from_slice(&600u32.to_be_bytes());
        addr_body.extend_from_slice(&900u32.to_be_bytes());
        let status_body = status.to_be_bytes();
        write_option_header(&mut addr_body, OPTION_STATUS_CODE, status_body.len() as u16);
        addr_body.extend_from_slice(&status_body);

        let mut ia_body = Vec::new();
        ia_body.extend_from_slice(&1u32.to_be_bytes());
        ia_body.extend_from_slice(&0u32.to_be_bytes());
        ia_body.extend_from_slice(&0u32.to_be_bytes());
        write_option_header(&mut ia_body, OPTION_IAADDR, addr_body.len() as u16);
        ia_body.extend_from_slice(&addr_body);

        let mut opts = Vec::new();
        write_option_header(&mut opts, OPTION_IA_NA, ia_body.len() as u16);
        opts.extend_from_slice(&ia_body);

        let mut buf = vec![0u8; MessageHeader::WIRE_LEN];
        buf[0] = MSG_REPLY;
        buf.extend_from_slice(&opts);
        let mut msg = crate::codec::decode_message(&buf).unwrap();
        msg.msg_type = MSG_REPLY;
        msg
    }

    /// Spec §8 scenario 4: NoBinding during RENEW falls back to SendingRequest.
    #[test]
    fn no_binding_during_renew_falls_back_to_request() {
        let mut identity = bound_identity("2001:db8::10");
        let msg = reply_with_ia_status(STATUS_NO_BINDING);
        let result = apply_normal_reply(ClientState::SendingRenew, &msg, &mut identity);
        assert_eq!(result.new_state, ClientState::SendingRequest);
        assert!(result.ip_actions.is_empty());
        assert_eq!(identity.get_valid_ip_address_count(), 1);
    }

    /// Spec §8 scenario 4, rebind side: same fallback applies to REBIND.
    #[test]
    fn no_binding_during_rebind_falls_back_to_request() {
        let mut identity = bound_identity("2001:db8::11");
        let msg = reply_with_ia_status(STATUS_NO_BINDING);
        let result = apply_normal_reply(ClientState::SendingRebind, &msg, &mut identity);
        assert_eq!(result.new_state, ClientState::SendingRequest);
    }

    /// Spec §8 scenario 5: NotOnLink during CONFIRM clears addresses and
    /// restarts at SOLICIT. The result travels as a top-level Status Code
    /// (RFC 8415 §18.3.3), not nested inside IA_NA.
    #[test]
    fn not_on_link_during_confirm_restarts_solicit() {
        let mut identity = bound_identity("2001:db8::12");
        let msg = reply_with_top_level_status(STATUS_NOT_ON_LINK);
        let result = apply_normal_reply(ClientState::SendingConfirm, &msg, &mut identity);
        assert_eq!(result.new_state, ClientState::SendingSolicit);
        assert_eq!(result.ip_actions, vec![IpStackAction::DeregisterAll]);
        assert_eq!(identity.get_valid_ip_address_count(), 0);
        assert_eq!(result.server_errors, vec![(ServerErrorKind::TopLevelStatus, STATUS_NOT_ON_LINK, MSG_REPLY)]);
    }

    /// A CONFIRM reply that nests its status inside IA_NA instead of
    /// carrying it top-level still gets the correct outcome.
    #[test]
    fn not_on_link_during_confirm_falls_back_to_ia_na_status() {
        let mut identity = bound_identity("2001:db8::18");
        let msg = reply_with_ia_status(STATUS_NOT_ON_LINK);
        let result = apply_normal_reply(ClientState::SendingConfirm, &msg, &mut identity);
        assert_eq!(result.new_state, ClientState::SendingSolicit);
    }

    /// CONFIRM success (no status option, defaults to Success) keeps BOUND.
    #[test]
    fn confirm_success_keeps_bound() {
        let mut identity = bound_identity("2001:db8::13");
        let msg = reply_with_top_level_status(STATUS_SUCCESS);
        let result = apply_normal_reply(ClientState::SendingConfirm, &msg, &mut identity);
        assert_eq!(result.new_state, ClientState::BoundToAddress);
        assert!(result.ip_actions.is_empty());
        assert!(result.server_errors.is_empty());
    }

    /// REQUEST with NotOnLink/NoAddrsAvail clears addresses and restarts
    /// at SOLICIT (spec §4.5's REQUEST-reply bullet).
    #[test]
    fn request_not_on_link_restarts_solicit() {
        let mut identity = bound_identity("2001:db8::14");
        let msg = reply_with_ia_status(STATUS_NOT_ON_LINK);
        let result = apply_normal_reply(ClientState::SendingRequest, &msg, &mut identity);
        assert_eq!(result.new_state, ClientState::SendingSolicit);
        assert_eq!(result.ip_actions, vec![IpStackAction::DeregisterAll]);
    }

    /// RELEASE/DECLINE accept any status as a completed exchange and
    /// return to INIT, clearing addresses. The non-success status is still
    /// surfaced to the server-error callback.
    #[test]
    fn release_reply_any_status_returns_to_init() {
        let mut identity = bound_identity("2001:db8::15");
        let msg = reply_with_ia_status(STATUS_UNSPEC_FAIL);
        let result = apply_normal_reply(ClientState::SendingRelease, &msg, &mut identity);
        assert_eq!(result.new_state, ClientState::Init);
        assert_eq!(result.ip_actions, vec![IpStackAction::DeregisterAll]);
        assert_eq!(identity.get_valid_ip_address_count(), 0);
        assert_eq!(result.server_errors, vec![(ServerErrorKind::IaNaStatus, STATUS_UNSPEC_FAIL, MSG_REPLY)]);
    }

    /// A non-success status nested inside an IA-Address is surfaced as
    /// `IaAddressStatus`, distinct from an IA_NA-level status.
    #[test]
    fn ia_address_status_is_surfaced_as_server_error() {
        let mut identity = bound_identity("2001:db8::19");
        let msg = reply_with_ia_address_status(STATUS_NO_ADDRS_AVAIL);
        let result = apply_normal_reply(ClientState::SendingRenew, &msg, &mut identity);
        assert_eq!(
            result.server_errors,
            vec![(ServerErrorKind::IaAddressStatus, STATUS_NO_ADDRS_AVAIL, MSG_REPLY)]
        );
    }

    /// Retransmission exhaustion (spec §8 scenario 3) always falls back to
    /// INIT, tearing down addresses only for RELEASE/DECLINE in flight.
    #[test]
    fn exhaustion_falls_back_to_init() {
        let mut identity = bound_identity("2001:db8::16");
        let result = apply_exhaustion(ClientState::SendingRelease, &mut identity);
        assert_eq!(result.new_state, ClientState::Init);
        assert_eq!(result.ip_actions, vec![IpStackAction::DeregisterAll]);

        let mut identity2 = bound_identity("2001:db8::17");
        let result2 = apply_exhaustion(ClientState::SendingRenew, &mut identity2);
        assert_eq!(result2.new_state, ClientState::Init);
        assert!(result2.ip_actions.is_empty());
    }
}

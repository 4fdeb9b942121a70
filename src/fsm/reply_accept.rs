//! Reply acceptance rules (spec §4.5): pre-processing that happens before
//! any reply is allowed to touch session state.

use crate::codec::decode::DecodedMessage;
use crate::codec::{MSG_ADVERTISE, MSG_RECONFIGURE, MSG_REPLY, STATUS_NO_ADDRS_AVAIL};
use crate::duid::Duid;
use crate::fsm::ClientState;

/// Why a reply was rejected before reaching the transition table. None of
/// these are wire-malformation (`WireError` already ran); they are
/// protocol-level filtering, so the scheduler treats a rejection the same
/// as "no reply yet" rather than a hard error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    IllegalMessageType,
    BadTransactionId,
    NoDuidOption,
    NoAddressesAvailable,
    EqualOrLessPrefValue,
    NotRapidCommit,
    /// RECONFIGURE is a legal message type but reconfigure authentication
    /// is an explicit non-goal; it is accepted at the filter and then
    /// dropped rather than acted on.
    ReconfigureUnsupported,
}

/// What an accepted reply means for the transition table.
#[derive(Debug, Clone)]
pub enum AcceptedReply {
    /// An ADVERTISE collected during SOLICIT. `terminate_collection` is
    /// true when `preference == 255` (spec §4.5 rule 4).
    Advertise { preference: u8, terminate_collection: bool },
    /// A REPLY accepted via the rapid-commit path (SOLICIT with rapid
    /// commit requested, REPLY carries the Rapid-Commit option).
    RapidCommitReply,
    /// A REPLY accepted through the normal path.
    NormalReply,
}

/// Apply spec §4.5's six acceptance rules.
pub fn accept_reply(
    state: ClientState,
    msg: &DecodedMessage,
    client_duid: &Duid,
    current_tx_id: u32,
    rapid_commit_requested: bool,
    best_preference: Option<u8>,
) -> Result<AcceptedReply, Rejection> {
    // Rule 1: message type filter.
    if msg.msg_type != MSG_ADVERTISE && msg.msg_type != MSG_REPLY && msg.msg_type != MSG_RECONFIGURE {
        return Err(Rejection::IllegalMessageType);
    }
    if msg.msg_type == MSG_RECONFIGURE {
        return Err(Rejection::ReconfigureUnsupported);
    }

    // Rule 2: transaction ID.
    if msg.transaction_id != current_tx_id {
        return Err(Rejection::BadTransactionId);
    }

    // Rule 3: DUID presence/match.
    match &msg.client_duid {
        Some(duid) if duid == client_duid => {}
        _ => return Err(Rejection::NoDuidOption),
    }
    if msg.server_duid.is_none() {
        return Err(Rejection::NoDuidOption);
    }

    if msg.msg_type == MSG_ADVERTISE {
        if state != ClientState::SendingSolicit {
            return Err(Rejection::IllegalMessageType);
        }
        // Rule 4: drop advertisements offering nothing.
        if let Some(ia) = &msg.ia_na {
            if ia.status.as_ref().map(|(code, _)| *code) == Some(STATUS_NO_ADDRS_AVAIL) {
                return Err(Rejection::NoAddressesAvailable);
            }
        }
        let preference = msg.preference.unwrap_or(0);
        // Rule 6: preference collection.
        if let Some(best) = best_preference {
            if preference <= best {
                return Err(Rejection::EqualOrLessPrefValue);
            }
        }
        return Ok(AcceptedReply::Advertise { preference, terminate_collection: preference == 255 });
    }

    // msg_type == REPLY from here.
    if state == ClientState::SendingSolicit {
        // Rule 5: rapid-commit-only acceptance while soliciting. A REPLY
        // without a Rapid-Commit option is never meaningful here — if the
        // client didn't request rapid commit, SOLICIT only expects
        // ADVERTISEs (open question in spec §9, resolved in DESIGN.md per
        // RFC 8415 §18.2.9).
        if !rapid_commit_requested || !msg.rapid_commit {
            return Err(Rejection::NotRapidCommit);
        }
        return Ok(AcceptedReply::RapidCommitReply);
    }

    Ok(AcceptedReply::NormalReply)
}

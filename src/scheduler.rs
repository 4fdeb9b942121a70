//! C3: per-transaction retransmission timing, RFC 3315 §14.

use std::time::Duration;

use rand::Rng;

use crate::error::ProtocolError;

/// IRT/MRT/MRC/MRD per transaction kind (spec §4.3's table). `mrd_seconds`
/// is `None` when it depends on session state (RENEW/REBIND derive MRD from
/// T2/valid-lifetime at transaction start, not a fixed constant).
#[derive(Debug, Clone, Copy)]
pub struct RetransmitParams {
    pub irt: u64,
    pub mrt: u64,
    pub mrc: u32,
    pub mrd_seconds: u64,
}

impl RetransmitParams {
    pub const SOLICIT: Self = Self { irt: 1, mrt: 120, mrc: 0, mrd_seconds: 0 };
    pub const REQUEST: Self = Self { irt: 1, mrt: 30, mrc: 10, mrd_seconds: 0 };
    pub const CONFIRM: Self = Self { irt: 1, mrt: 4, mrc: 0, mrd_seconds: 10 };
    pub const RELEASE: Self = Self { irt: 1, mrt: 0, mrc: 5, mrd_seconds: 0 };
    pub const DECLINE: Self = Self { irt: 1, mrt: 0, mrc: 5, mrd_seconds: 0 };
    pub const INFORMATION_REQUEST: Self = Self { irt: 1, mrt: 120, mrc: 0, mrd_seconds: 0 };

    /// RENEW's MRD is `T2 - accrued` at the moment the transaction starts.
    pub fn renew(remaining_until_t2: u64) -> Self {
        Self { irt: 10, mrt: 600, mrc: 0, mrd_seconds: remaining_until_t2 }
    }

    /// REBIND's MRD is the greatest remaining valid-lifetime among tracked
    /// addresses at the moment the transaction starts.
    pub fn rebind(max_valid_lifetime: u64) -> Self {
        Self { irt: 10, mrt: 600, mrc: 0, mrd_seconds: max_valid_lifetime }
    }
}

/// Running state of one in-flight transaction's backoff, per spec §4.3's
/// algorithm and §8's retransmission invariant (`RTₙ₊₁ <= 2*RTₙ + jitter`,
/// `RTₙ <= MRT` whenever `MRT != 0`).
#[derive(Debug, Clone)]
pub struct RetransmitState {
    params: RetransmitParams,
    rt: Duration,
    count: u32,
    elapsed_centiseconds: u64,
}

impl RetransmitState {
    /// Start a fresh transaction: `RT <- IRT`, `count <- 0`, `elapsed <- 0`.
    pub fn new(params: RetransmitParams) -> Self {
        RetransmitState { params, rt: Duration::from_secs(params.irt), count: 0, elapsed_centiseconds: 0 }
    }

    /// Current wait window before the next retransmit.
    pub fn current_rt(&self) -> Duration {
        self.rt
    }

    /// Elapsed-time option value (hundredths of a second since the
    /// transaction began), saturating at `0xFFFF` per spec §3.
    pub fn elapsed_time_option(&self) -> u16 {
        self.elapsed_centiseconds.min(u16::MAX as u64) as u16
    }

    /// Advance the backoff after a timeout with no accepted reply. Returns
    /// `Ok(())` to retransmit (preserving the transaction ID), or `Err`
    /// when the transaction is exhausted and the FSM must fall back to
    /// INIT (spec §4.3 step 3-4).
    pub fn on_timeout(&mut self) -> Result<(), ProtocolError> {
        self.elapsed_centiseconds = self.elapsed_centiseconds.saturating_add(self.rt.as_secs() * 100);

        if self.params.mrc != 0 && self.count >= self.params.mrc {
            return Err(ProtocolError::MaxRetransmitCountReached);
        }
        if self.params.mrd_seconds != 0 && self.elapsed_centiseconds >= self.params.mrd_seconds * 100 {
            return Err(ProtocolError::MaxRetransmitDurationReached);
        }

        self.count += 1;
        let doubled = self.rt.as_secs().saturating_mul(2);
        let next_secs = if self.params.mrt != 0 { doubled.min(self.params.mrt) } else { doubled };
        self.rt = apply_jitter(Duration::from_secs(next_secs.max(1)));
        Ok(())
    }
}

/// RFC 3315 §14's randomisation factor, `-0.1 * RT .. +0.1 * RT`, here
/// discretized as an integer offset in `{-31, ..., +31}` hundredths-of-a-
/// second ticks added to `RT` (spec §4.3's closing sentence).
fn apply_jitter(rt: Duration) -> Duration {
    let jitter_ticks = rand::rng().random_range(-31i64..=31);
    let jitter = Duration::from_millis((jitter_ticks * 10).unsigned_abs());
    if jitter_ticks >= 0 {
        rt + jitter
    } else {
        rt.saturating_sub(jitter)
    }
}

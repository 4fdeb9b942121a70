//! C4: the accrued-time counter and the T1/T2/valid-lifetime firing
//! decisions derived from it (spec §4.4).

use crate::identity::ia::{IaAddressStatus, IaNa, INFINITY};

/// What the timekeeper wants the driver to do this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseEvent {
    RequestRenew,
    RequestRebind,
    AddressExpired { index: usize },
    AllAddressesExpired,
}

/// Tracks "seconds since bound" and compares it against the current IA_NA's
/// T1/T2 and each IA-Address's valid lifetime.
#[derive(Debug, Clone, Default)]
pub struct LeaseTimekeeper {
    accrued_seconds: u64,
    renew_fired: bool,
    rebind_fired: bool,
}

impl LeaseTimekeeper {
    pub fn accrued_seconds(&self) -> u64 {
        self.accrued_seconds
    }

    /// A successful REPLY carrying at least one IA-Address resets accrued
    /// to 0 and clears the renew/rebind latches (spec §4.4, last sentence).
    pub fn reset(&mut self) {
        self.accrued_seconds = 0;
        self.renew_fired = false;
        self.rebind_fired = false;
    }

    /// Restore accrued time from a persisted snapshot, adding the time
    /// elapsed since the snapshot was taken (spec §6's restore contract).
    pub fn restore(&mut self, accrued_seconds: u64, elapsed_since_snapshot: u64) {
        self.accrued_seconds = accrued_seconds.saturating_add(elapsed_since_snapshot);
        self.renew_fired = false;
        self.rebind_fired = false;
    }

    /// One coarse (1s) tick while BOUND. `ia` is sampled only while at
    /// least one address is `Valid` and T1 is neither 0 nor `INFINITY`,
    /// per spec §4.4 paragraph 1. Returns every event the driver should
    /// react to this tick, in firing order.
    pub fn tick(&mut self, ia: &mut IaNa) -> Vec<LeaseEvent> {
        let mut events = Vec::new();

        let has_valid = ia.active().any(|a| matches!(a.status, IaAddressStatus::Valid));
        let t1_active = ia.t1 != 0 && ia.t1 != INFINITY;
        if !has_valid || !t1_active {
            return events;
        }

        self.accrued_seconds = self.accrued_seconds.saturating_add(1);

        if !self.renew_fired && self.accrued_seconds >= ia.t1 as u64 {
            self.renew_fired = true;
            events.push(LeaseEvent::RequestRenew);
        }
        if self.renew_fired
            && !self.rebind_fired
            && ia.t2 != 0
            && ia.t2 != INFINITY
            && self.accrued_seconds >= ia.t2 as u64
        {
            self.rebind_fired = true;
            events.push(LeaseEvent::RequestRebind);
        }

        let mut any_valid_remaining = false;
        let indices: Vec<usize> = (0..ia.addresses().len()).collect();
        for index in indices {
            let addr = &ia.addresses()[index];
            if matches!(addr.status, IaAddressStatus::Empty) {
                continue;
            }
            if addr.valid_lifetime != 0
                && addr.valid_lifetime != INFINITY
                && self.accrued_seconds >= addr.valid_lifetime as u64
            {
                ia.remove(index);
                events.push(LeaseEvent::AddressExpired { index });
            } else {
                any_valid_remaining = true;
            }
        }
        if !any_valid_remaining {
            events.push(LeaseEvent::AllAddressesExpired);
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ia::IaNa;

    fn bound_ia(t1: u32, t2: u32, valid: u32) -> IaNa {
        let mut ia = IaNa::create(1, t1, t2).unwrap();
        ia.add_address("2001:db8::1".parse().unwrap(), valid.saturating_sub(100).max(1), valid).unwrap();
        ia.active_mut().next().unwrap().status = IaAddressStatus::Valid;
        ia
    }

    #[test]
    fn t1_fires_renew_exactly_once() {
        let mut ia = bound_ia(5, 8, 100);
        let mut tk = LeaseTimekeeper::default();
        let mut saw_renew = 0;
        for _ in 0..5 {
            let events = tk.tick(&mut ia);
            saw_renew += events.iter().filter(|e| **e == LeaseEvent::RequestRenew).count();
        }
        assert_eq!(saw_renew, 1);
    }

    #[test]
    fn t2_fires_after_t1() {
        let mut ia = bound_ia(2, 4, 100);
        let mut tk = LeaseTimekeeper::default();
        let mut events_all = Vec::new();
        for _ in 0..4 {
            events_all.extend(tk.tick(&mut ia));
        }
        assert!(events_all.contains(&LeaseEvent::RequestRenew));
        assert!(events_all.contains(&LeaseEvent::RequestRebind));
    }

    #[test]
    fn infinity_t1_never_fires() {
        let mut ia = bound_ia(INFINITY, INFINITY, INFINITY);
        let mut tk = LeaseTimekeeper::default();
        for _ in 0..10 {
            let events = tk.tick(&mut ia);
            assert!(events.is_empty());
        }
    }

    #[test]
    fn address_expiry_removes_and_signals() {
        let mut ia = bound_ia(1, 2, 3);
        let mut tk = LeaseTimekeeper::default();
        let mut saw_expired = false;
        let mut saw_all_expired = false;
        for _ in 0..5 {
            let events = tk.tick(&mut ia);
            if events.iter().any(|e| matches!(e, LeaseEvent::AddressExpired { .. })) {
                saw_expired = true;
            }
            if events.contains(&LeaseEvent::AllAddressesExpired) {
                saw_all_expired = true;
            }
        }
        assert!(saw_expired);
        assert!(saw_all_expired);
    }

    #[test]
    fn reset_clears_accrued_and_latches() {
        let mut ia = bound_ia(2, 4, 100);
        let mut tk = LeaseTimekeeper::default();
        for _ in 0..3 {
            tk.tick(&mut ia);
        }
        tk.reset();
        assert_eq!(tk.accrued_seconds(), 0);
    }

    #[test]
    fn restore_adds_elapsed_since_snapshot() {
        let mut tk = LeaseTimekeeper::default();
        tk.restore(100, 50);
        assert_eq!(tk.accrued_seconds(), 150);
    }
}

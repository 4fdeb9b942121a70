use std::net::Ipv6Addr;

use crate::error::{ClientError, ConfigError, ResourceError, StateError};

/// Sentinel lifetime meaning "infinite" (RFC 8415 §7.7).
pub const INFINITY: u32 = 0xFFFF_FFFF;

/// Maximum number of simultaneously-tracked addresses inside one IA_NA.
/// The spec calls this "N (compile-time, default 1)"; kept as a const
/// generic parameter of `IaNa` so callers can raise it without touching the
/// rest of the store.
pub const DEFAULT_MAX_IA_ADDRESSES: usize = 4;

/// Lifecycle of a single address slot inside the IA_NA, per spec §3 and the
/// DAD handling in §4.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IaAddressStatus {
    Empty,
    Initial,
    DadTentative,
    Valid,
    DadFailure,
}

/// One IA-Address record (RFC 8415 §21.6).
#[derive(Debug, Clone, Copy)]
pub struct IaAddress {
    pub address: Ipv6Addr,
    pub preferred_lifetime: u32,
    pub valid_lifetime: u32,
    pub status: IaAddressStatus,
    /// Opaque index returned by the IP stack collaborator when this address
    /// was registered; `None` while `status` is `Empty`/`Initial`.
    pub ip_stack_index: Option<u64>,
    /// Scratch field used only during reply correlation (spec §3).
    pub map_tag: u32,
}

impl IaAddress {
    fn empty() -> Self {
        IaAddress {
            address: Ipv6Addr::UNSPECIFIED,
            preferred_lifetime: 0,
            valid_lifetime: 0,
            status: IaAddressStatus::Empty,
            ip_stack_index: None,
            map_tag: 0,
        }
    }

    fn is_empty(&self) -> bool {
        matches!(self.status, IaAddressStatus::Empty)
    }
}

/// The Identity Association for Non-temporary Addresses (RFC 8415 §21.4):
/// an IAID, renew/rebind deadlines, and up to `DEFAULT_MAX_IA_ADDRESSES`
/// address slots.
#[derive(Debug, Clone)]
pub struct IaNa {
    pub iaid: u32,
    pub t1: u32,
    pub t2: u32,
    addresses: [IaAddress; DEFAULT_MAX_IA_ADDRESSES],
}

impl IaNa {
    /// *create-client-iana*: validates `iaid != 0` and `T1 <= T2` (when
    /// both are non-zero), discards any prior addresses (last-write-wins,
    /// per spec §8's idempotence law).
    pub fn create(iaid: u32, t1: u32, t2: u32) -> Result<Self, ConfigError> {
        if iaid == 0 {
            return Err(ConfigError::ZeroIaid);
        }
        if t1 != 0 && t2 != 0 && t1 > t2 {
            return Err(ConfigError::InvalidT1T2 { t1, t2 });
        }
        Ok(IaNa {
            iaid,
            t1,
            t2,
            addresses: [IaAddress::empty(); DEFAULT_MAX_IA_ADDRESSES],
        })
    }

    /// *add-client-ia*: slot `address` into the first empty record. Refuses
    /// a zero address (`ConfigError::InvalidIAAddress`), a duplicate already
    /// tracked (`StateError::IaAddressAlreadyExists`), and a full IA
    /// (`ResourceError::ReachedMaxIaAddress`) with their own distinct error
    /// kinds (spec §4.2/§7).
    pub fn add_address(&mut self, address: Ipv6Addr, preferred: u32, valid: u32) -> Result<(), ClientError> {
        if preferred != 0 && valid != 0 && preferred > valid {
            return Err(ConfigError::InvalidLifetimes { preferred, valid }.into());
        }
        if address.is_unspecified() {
            return Err(ConfigError::InvalidIAAddress.into());
        }
        if self.addresses.iter().any(|a| !a.is_empty() && a.address == address) {
            return Err(StateError::IaAddressAlreadyExists.into());
        }
        let slot = self
            .addresses
            .iter_mut()
            .find(|a| a.is_empty())
            .ok_or(ResourceError::ReachedMaxIaAddress)?;
        *slot = IaAddress {
            address,
            preferred_lifetime: preferred,
            valid_lifetime: valid,
            status: IaAddressStatus::Initial,
            ip_stack_index: None,
            map_tag: 0,
        };
        Ok(())
    }

    pub fn addresses(&self) -> &[IaAddress; DEFAULT_MAX_IA_ADDRESSES] {
        &self.addresses
    }

    pub fn addresses_mut(&mut self) -> &mut [IaAddress; DEFAULT_MAX_IA_ADDRESSES] {
        &mut self.addresses
    }

    pub fn active(&self) -> impl Iterator<Item = &IaAddress> {
        self.addresses.iter().filter(|a| !a.is_empty())
    }

    pub fn active_mut(&mut self) -> impl Iterator<Item = &mut IaAddress> {
        self.addresses.iter_mut().filter(|a| !a.is_empty())
    }

    pub fn valid_count(&self) -> usize {
        self.addresses
            .iter()
            .filter(|a| matches!(a.status, IaAddressStatus::Valid))
            .count()
    }

    /// Remove the address at `index` (zeroes the slot so it can be reused).
    pub fn remove(&mut self, index: usize) {
        if let Some(slot) = self.addresses.get_mut(index) {
            *slot = IaAddress::empty();
        }
    }

    /// Remove every address currently tracked, e.g. on `NotOnLink`/restart.
    pub fn clear(&mut self) {
        for slot in self.addresses.iter_mut() {
            *slot = IaAddress::empty();
        }
    }

    /// *get-valid-ip-address-lease-time(index)*: only defined while the
    /// slot is `Valid`.
    pub fn lease_time_at(&self, index: usize) -> Result<(u32, u32), StateError> {
        let a = self.addresses.get(index).ok_or(StateError::IaAddressNotValid)?;
        if !matches!(a.status, IaAddressStatus::Valid) {
            return Err(StateError::IaAddressNotValid);
        }
        Ok((a.preferred_lifetime, a.valid_lifetime))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_iaid_rejected() {
        assert!(matches!(IaNa::create(0, 100, 200), Err(ConfigError::ZeroIaid)));
    }

    #[test]
    fn t1_greater_than_t2_rejected() {
        assert!(matches!(
            IaNa::create(1, 500, 200),
            Err(ConfigError::InvalidT1T2 { .. })
        ));
    }

    #[test]
    fn zero_t1_or_t2_bypasses_ordering_check() {
        assert!(IaNa::create(1, 0, 200).is_ok());
        assert!(IaNa::create(1, 500, 0).is_ok());
    }

    #[test]
    fn add_address_fills_first_empty_slot() {
        let mut ia = IaNa::create(1, 100, 200).unwrap();
        ia.add_address("2001:db8::1".parse().unwrap(), 600, 900).unwrap();
        assert_eq!(ia.active().count(), 1);
    }

    #[test]
    fn add_duplicate_address_rejected() {
        let mut ia = IaNa::create(1, 100, 200).unwrap();
        ia.add_address("2001:db8::1".parse().unwrap(), 600, 900).unwrap();
        assert!(matches!(
            ia.add_address("2001:db8::1".parse().unwrap(), 600, 900),
            Err(ClientError::State(StateError::IaAddressAlreadyExists))
        ));
    }

    #[test]
    fn add_beyond_capacity_rejected() {
        let mut ia = IaNa::create(1, 100, 200).unwrap();
        for i in 0..DEFAULT_MAX_IA_ADDRESSES {
            let addr = Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, i as u16 + 1);
            ia.add_address(addr, 600, 900).unwrap();
        }
        let overflow = Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 0xff);
        assert!(matches!(
            ia.add_address(overflow, 600, 900),
            Err(ClientError::Resource(ResourceError::ReachedMaxIaAddress))
        ));
    }

    #[test]
    fn preferred_greater_than_valid_rejected() {
        let mut ia = IaNa::create(1, 100, 200).unwrap();
        assert!(matches!(
            ia.add_address("2001:db8::1".parse().unwrap(), 900, 600),
            Err(ClientError::Config(ConfigError::InvalidLifetimes { .. }))
        ));
    }

    #[test]
    fn add_zero_address_rejected() {
        let mut ia = IaNa::create(1, 100, 200).unwrap();
        assert!(matches!(
            ia.add_address(Ipv6Addr::UNSPECIFIED, 600, 900),
            Err(ClientError::Config(ConfigError::InvalidIAAddress))
        ));
    }
}

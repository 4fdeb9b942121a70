//! C2: the client DUID, IA_NA record, server DUID, preference, the
//! option-request bitmap, the FQDN record, and received server options
//! (spec §4.2).

pub mod fqdn;
pub mod ia;
pub mod oro;

use std::net::Ipv6Addr;

use advmac::MacAddr6;

use crate::duid::{Duid, DuidType, HardwareType};
use crate::error::{ClientError, ConfigError, StateError};
use fqdn::{ClientFqdn, FqdnOp};
use ia::{IaAddress, IaNa};
use oro::{OptionRequest, RequestableOption};

/// The session's identity data: everything C1 needs to compose a message
/// and everything C5 needs to decide what state to move to next.
#[derive(Debug, Clone, Default)]
pub struct IdentityStore {
    pub client_duid: Option<Duid>,
    pub server_duid: Option<Duid>,
    pub ia: Option<IaNa>,
    pub preference: u8,
    pub oro: OptionRequest,
    pub fqdn: Option<ClientFqdn>,
    pub dns_servers: Vec<Ipv6Addr>,
    pub sntp_servers: Vec<Ipv6Addr>,
    pub timezone: Option<String>,
    pub domain_names: Vec<String>,
}

impl IdentityStore {
    /// *create-client-duid*: must be called before *start*.
    pub fn create_client_duid(
        &mut self,
        duid_type: DuidType,
        hw_type: HardwareType,
        time: u32,
        mac: MacAddr6,
    ) -> Result<(), ConfigError> {
        self.client_duid = Some(Duid::create(duid_type, hw_type, time, mac)?);
        Ok(())
    }

    /// *create-client-iana*.
    pub fn create_client_iana(&mut self, iaid: u32, t1: u32, t2: u32) -> Result<(), ConfigError> {
        self.ia = Some(IaNa::create(iaid, t1, t2)?);
        Ok(())
    }

    /// *add-client-ia*.
    pub fn add_client_ia(&mut self, address: Ipv6Addr, preferred: u32, valid: u32) -> Result<(), ClientError> {
        let ia = self.ia.as_mut().ok_or(ConfigError::MissingIana)?;
        ia.add_address(address, preferred, valid)
    }

    /// *request-option-X(enable)*.
    pub fn request_option(&mut self, option: RequestableOption, enable: bool) {
        self.oro.set(option, enable);
    }

    /// *request-option-FQDN(domain, op)*.
    pub fn request_option_fqdn(&mut self, domain: &str, op: FqdnOp) -> Result<(), ConfigError> {
        self.fqdn = Some(ClientFqdn::create(domain, op)?);
        self.oro.set(RequestableOption::Fqdn, true);
        Ok(())
    }

    /// *get-ipv6-address*: the first `Valid` address, if any.
    pub fn get_ipv6_address(&self) -> Option<Ipv6Addr> {
        self.ia
            .as_ref()?
            .active()
            .find(|a| matches!(a.status, ia::IaAddressStatus::Valid))
            .map(|a| a.address)
    }

    pub fn get_valid_ip_address_count(&self) -> usize {
        self.ia.as_ref().map(|ia| ia.valid_count()).unwrap_or(0)
    }

    /// *get-valid-ip-address-lease-time(index)*.
    pub fn get_valid_ip_address_lease_time(&self, index: usize) -> Result<(u32, u32), StateError> {
        self.ia
            .as_ref()
            .ok_or(StateError::IaAddressNotValid)?
            .lease_time_at(index)
    }

    /// *get-lease-time-data*: (T1, T2) of the current IA_NA.
    pub fn get_lease_time_data(&self) -> Option<(u32, u32)> {
        self.ia.as_ref().map(|ia| (ia.t1, ia.t2))
    }

    /// *get-DNS-server-address(index)*.
    pub fn get_dns_server_address(&self, index: usize) -> Option<Ipv6Addr> {
        self.dns_servers.get(index).copied()
    }

    /// *get-time-server-address(index)* (SNTP servers).
    pub fn get_time_server_address(&self, index: usize) -> Option<Ipv6Addr> {
        self.sntp_servers.get(index).copied()
    }

    /// *get-other-option-data(code, buffer)*: domain-name and time-zone.
    pub fn get_other_option_data(&self, code: u16) -> Option<String> {
        match code {
            crate::codec::OPTION_DOMAIN_LIST => self.domain_names.first().cloned(),
            crate::codec::OPTION_NEW_POSIX_TIMEZONE => self.timezone.clone(),
            _ => None,
        }
    }

    pub fn active_addresses(&self) -> Vec<IaAddress> {
        self.ia.as_ref().map(|ia| ia.active().copied().collect()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_client_ia_without_iana_fails() {
        let mut store = IdentityStore::default();
        assert!(matches!(
            store.add_client_ia("2001:db8::1".parse().unwrap(), 100, 200),
            Err(ClientError::Config(ConfigError::MissingIana))
        ));
    }

    #[test]
    fn get_ipv6_address_requires_valid_status() {
        let mut store = IdentityStore::default();
        store.create_client_iana(1, 100, 200).unwrap();
        store.add_client_ia("2001:db8::1".parse().unwrap(), 600, 900).unwrap();
        assert_eq!(store.get_ipv6_address(), None);
        store.ia.as_mut().unwrap().active_mut().next().unwrap().status = ia::IaAddressStatus::Valid;
        assert_eq!(store.get_ipv6_address(), Some("2001:db8::1".parse().unwrap()));
    }

    #[test]
    fn request_option_toggle_is_idempotent() {
        let mut store = IdentityStore::default();
        store.request_option(RequestableOption::Dns, true);
        store.request_option(RequestableOption::Dns, false);
        assert!(store.oro.is_empty());
    }
}

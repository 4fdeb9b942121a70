//! The snapshot/restore pair the host uses to bridge power cycles (spec
//! §6): captures everything needed to resume a session without
//! re-solicitng, and on restore re-evaluates T1/T2 against time elapsed
//! while the host was down.

use std::net::Ipv6Addr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::duid::Duid;
use crate::error::PersistError;
use crate::fsm::ClientState;
use crate::identity::ia::{IaAddress, IaAddressStatus, IaNa};
use crate::identity::IdentityStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedIaAddress {
    address: Ipv6Addr,
    preferred_lifetime: u32,
    valid_lifetime: u32,
    valid: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedIaNa {
    iaid: u32,
    t1: u32,
    t2: u32,
    addresses: Vec<PersistedIaAddress>,
}

/// Everything the spec §6 snapshot must capture: state, client/server DUID,
/// IA_NA and its addresses, the option-request bitmap, FQDN, recorded
/// DNS/time/timezone/domain options, and accrued lease time. Interface
/// index and IP-stack address indices are host-local and are re-acquired
/// by the restore caller re-registering each `Valid` address, rather than
/// serialized here (an `IpStackIndex` from a previous process has no
/// meaning once that process has exited).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedSession {
    pub state: ClientState,
    pub client_duid: Duid,
    pub server_duid: Option<Duid>,
    pub preference: u8,
    ia: Option<PersistedIaNa>,
    oro_bits: u8,
    pub fqdn_domain: Option<String>,
    pub fqdn_flags: Option<u8>,
    pub dns_servers: Vec<Ipv6Addr>,
    pub sntp_servers: Vec<Ipv6Addr>,
    pub domain_names: Vec<String>,
    pub timezone: Option<String>,
    pub accrued_seconds: u64,
}

impl PersistedSession {
    pub fn capture(
        state: ClientState,
        identity: &IdentityStore,
        accrued_seconds: u64,
    ) -> Result<Self, PersistError> {
        let client_duid = identity.client_duid.clone().ok_or(PersistError::MissingDuid)?;

        let ia = identity.ia.as_ref().map(|ia| PersistedIaNa {
            iaid: ia.iaid,
            t1: ia.t1,
            t2: ia.t2,
            addresses: ia
                .active()
                .map(|a| PersistedIaAddress {
                    address: a.address,
                    preferred_lifetime: a.preferred_lifetime,
                    valid_lifetime: a.valid_lifetime,
                    valid: matches!(a.status, IaAddressStatus::Valid),
                })
                .collect(),
        });

        Ok(PersistedSession {
            state,
            client_duid,
            server_duid: identity.server_duid.clone(),
            preference: identity.preference,
            ia,
            oro_bits: identity.oro.raw_bits(),
            fqdn_domain: identity.fqdn.as_ref().map(|f| f.domain_name.to_string()),
            fqdn_flags: identity.fqdn.as_ref().map(|f| f.flags),
            dns_servers: identity.dns_servers.clone(),
            sntp_servers: identity.sntp_servers.clone(),
            domain_names: identity.domain_names.clone(),
            timezone: identity.timezone.clone(),
            accrued_seconds,
        })
    }

    /// Merge this snapshot back into a freshly-created `IdentityStore`.
    /// Re-registering each `Valid` address with the IP stack is the
    /// caller's responsibility (spec §6: "the restore call ... re-registers
    /// each Valid IA-Address with the IP stack, and returns").
    pub fn restore_into(&self, identity: &mut IdentityStore) {
        identity.client_duid = Some(self.client_duid.clone());
        identity.server_duid = self.server_duid.clone();
        identity.preference = self.preference;
        identity.dns_servers = self.dns_servers.clone();
        identity.sntp_servers = self.sntp_servers.clone();
        identity.domain_names = self.domain_names.clone();
        identity.timezone = self.timezone.clone();
        identity.oro = crate::identity::oro::OptionRequest::from_raw_bits(self.oro_bits);
        if let (Some(domain), Some(flags)) = (&self.fqdn_domain, self.fqdn_flags) {
            identity.fqdn = Some(crate::identity::fqdn::ClientFqdn {
                flags,
                domain_name: compact_str::CompactString::from(domain.as_str()),
            });
        }

        if let Some(persisted_ia) = &self.ia {
            let mut ia = IaNa::create(persisted_ia.iaid, persisted_ia.t1, persisted_ia.t2)
                .unwrap_or_else(|_| IaNa::create(persisted_ia.iaid.max(1), 0, 0).unwrap());
            for addr in &persisted_ia.addresses {
                if ia
                    .add_address(addr.address, addr.preferred_lifetime, addr.valid_lifetime)
                    .is_ok()
                {
                    if addr.valid {
                        if let Some(slot) = ia.active_mut().last() {
                            slot.status = IaAddressStatus::Valid;
                        }
                    }
                }
            }
            identity.ia = Some(ia);
        }
    }

    pub fn restored_addresses(&self) -> Vec<IaAddress> {
        self.ia
            .as_ref()
            .map(|ia| {
                ia.addresses
                    .iter()
                    .filter(|a| a.valid)
                    .map(|a| IaAddress {
                        address: a.address,
                        preferred_lifetime: a.preferred_lifetime,
                        valid_lifetime: a.valid_lifetime,
                        status: IaAddressStatus::Valid,
                        ip_stack_index: None,
                        map_tag: 0,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), PersistError> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    /// Best-effort load: a missing or unparseable file is treated as "no
    /// prior session", matching the teacher's `unwrap_or_default` load
    /// convention for lease state rather than surfacing a hard error.
    pub fn load<P: AsRef<Path>>(path: P) -> Option<Self> {
        let file = std::fs::File::open(path).ok()?;
        serde_json::from_reader(file).ok()
    }
}

use compact_str::CompactString;

use crate::error::ConfigError;

/// RFC 4704 §4.1 flag semantics, named after the client operation the
/// caller requested (the spec's three-way switch, not the raw bit names).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FqdnOp {
    /// Client wants the server to update only the AAAA RR, flags = 0x00.
    DesiresUpdateAaaaRr,
    /// Client wants the server to perform both the AAAA and PTR updates,
    /// the S bit, flags = 0x01.
    DesiresServerDoDnsUpdate,
    /// Client intends to perform the DNS update itself; the N bit is set
    /// (flags = 0x04) to tell the server not to. This is also the fallback
    /// for any op not covered above (spec §4.2).
    ClientPerformsUpdate,
}

impl FqdnOp {
    fn flags(self) -> u8 {
        match self {
            FqdnOp::DesiresUpdateAaaaRr => 0x00,
            FqdnOp::DesiresServerDoDnsUpdate => 0x01,
            FqdnOp::ClientPerformsUpdate => 0x04,
        }
    }
}

/// The Client FQDN option record (RFC 4704).
#[derive(Debug, Clone)]
pub struct ClientFqdn {
    pub flags: u8,
    pub domain_name: CompactString,
}

impl ClientFqdn {
    /// *request-option-FQDN(domain, op)*: validates length and computes
    /// flags from `op`.
    pub fn create(domain: &str, op: FqdnOp) -> Result<Self, ConfigError> {
        if domain.len() > 255 {
            return Err(ConfigError::DomainNameTooLong(domain.len()));
        }
        Ok(ClientFqdn {
            flags: op.flags(),
            domain_name: CompactString::from(domain),
        })
    }

    /// Total on-the-wire option length: 1 (flags) + label-encoded domain +
    /// 2 (the option header is accounted separately by the encoder).
    pub fn encoded_len(&self) -> usize {
        1 + crate::codec::domain_name::encoded_len(&self.domain_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_match_spec_table() {
        assert_eq!(
            ClientFqdn::create("host.example.com", FqdnOp::DesiresUpdateAaaaRr)
                .unwrap()
                .flags,
            0x00
        );
        assert_eq!(
            ClientFqdn::create("host.example.com", FqdnOp::DesiresServerDoDnsUpdate)
                .unwrap()
                .flags,
            0x01
        );
        assert_eq!(
            ClientFqdn::create("host.example.com", FqdnOp::ClientPerformsUpdate)
                .unwrap()
                .flags,
            0x04
        );
    }

    #[test]
    fn domain_too_long_rejected() {
        let domain = "a".repeat(256);
        assert!(ClientFqdn::create(&domain, FqdnOp::ClientPerformsUpdate).is_err());
    }
}

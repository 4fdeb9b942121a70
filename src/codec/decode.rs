use std::net::Ipv6Addr;

use crate::codec::{
    domain_name, read_option_header, MessageHeader, OPTION_CLIENTID, OPTION_DNS_SERVERS,
    OPTION_DOMAIN_LIST, OPTION_ELAPSED_TIME, OPTION_FQDN, OPTION_IAADDR, OPTION_IA_NA,
    OPTION_NEW_POSIX_TIMEZONE, OPTION_ORO, OPTION_PREFERENCE, OPTION_RAPID_COMMIT,
    OPTION_SERVERID, OPTION_SNTP_SERVERS, OPTION_STATUS_CODE,
};
use crate::duid::Duid;
use crate::error::WireError;

#[derive(Debug, Clone, Default)]
pub struct DecodedIaAddress {
    pub address: Ipv6Addr,
    pub preferred_lifetime: u32,
    pub valid_lifetime: u32,
    pub status: Option<(u16, String)>,
}

#[derive(Debug, Clone, Default)]
pub struct DecodedIaNa {
    pub iaid: u32,
    pub t1: u32,
    pub t2: u32,
    pub status: Option<(u16, String)>,
    pub addresses: Vec<DecodedIaAddress>,
}

/// The result of decoding one wire message: every option this client
/// understands, already typed. Fields it did not see are left at their
/// default/empty value; callers applying a reply check which fields are
/// present, not whether decode "succeeded" beyond the header.
#[derive(Debug, Clone, Default)]
pub struct DecodedMessage {
    pub msg_type: u8,
    pub transaction_id: u32,
    pub client_duid: Option<Duid>,
    pub server_duid: Option<Duid>,
    pub ia_na: Option<DecodedIaNa>,
    pub oro_codes: Vec<u16>,
    pub preference: Option<u8>,
    pub elapsed_time: Option<u16>,
    pub rapid_commit: bool,
    pub fqdn: Option<(u8, String)>,
    pub dns_servers: Vec<Ipv6Addr>,
    pub sntp_servers: Vec<Ipv6Addr>,
    pub domain_names: Vec<String>,
    pub timezone: Option<String>,
    /// A Status Code option carried at the top level of the message
    /// (outside any IA_NA/IA-Address), e.g. RFC 8415 §18.3.3's CONFIRM
    /// result (spec §7's "top-level" status category).
    pub status: Option<(u16, String)>,
}

/// Decode a full DHCPv6 message. Validates length at every nesting level
/// *before* dereferencing (spec §4.1's decoder contract / §8's
/// option-nesting invariant).
pub fn decode_message(data: &[u8]) -> Result<DecodedMessage, WireError> {
    let header = MessageHeader::decode(data).ok_or(WireError::IncompleteOptionBlock)?;
    let mut msg = DecodedMessage {
        msg_type: header.msg_type,
        transaction_id: header.transaction_id,
        ..Default::default()
    };

    let mut offset = MessageHeader::WIRE_LEN;
    while offset < data.len() {
        let (code, len, data_start) = read_option_header(data, offset).ok_or(WireError::IncompleteOptionBlock)?;
        let data_end = data_start
            .checked_add(len)
            .ok_or(WireError::IncompleteOptionBlock)?;
        if data_end > data.len() {
            return Err(WireError::IncompleteOptionBlock);
        }
        let body = &data[data_start..data_end];

        match code {
            OPTION_CLIENTID => msg.client_duid = Some(decode_duid(body)?),
            OPTION_SERVERID => msg.server_duid = Some(decode_duid(body)?),
            OPTION_IA_NA => msg.ia_na = Some(decode_ia_na(body)?),
            OPTION_ORO => msg.oro_codes = decode_oro(body)?,
            OPTION_PREFERENCE => msg.preference = Some(decode_preference(body)?),
            OPTION_ELAPSED_TIME => msg.elapsed_time = Some(decode_elapsed_time(body)?),
            OPTION_RAPID_COMMIT => {
                if !body.is_empty() {
                    return Err(WireError::InvalidDataSize);
                }
                msg.rapid_commit = true;
            }
            OPTION_FQDN => msg.fqdn = Some(decode_fqdn(body)?),
            OPTION_DNS_SERVERS => msg.dns_servers = decode_addr_list(body)?,
            OPTION_SNTP_SERVERS => msg.sntp_servers = decode_addr_list(body)?,
            OPTION_DOMAIN_LIST => msg.domain_names = domain_name::decode_all(body)?,
            OPTION_NEW_POSIX_TIMEZONE => {
                msg.timezone = Some(
                    std::str::from_utf8(body)
                        .map_err(|_| WireError::InvalidOptionData)?
                        .to_string(),
                )
            }
            OPTION_STATUS_CODE => msg.status = Some(decode_status(body)?),
            _ => { /* unknown top-level option: tolerated, not fatal (only IA/DUID decode failures are) */ }
        }

        offset = data_end;
    }

    Ok(msg)
}

fn decode_duid(body: &[u8]) -> Result<Duid, WireError> {
    if body.is_empty() || body.len() > crate::duid::MAX_DUID_LEN {
        return Err(WireError::InvalidClientDuid);
    }
    Ok(Duid::from(body))
}

fn decode_oro(body: &[u8]) -> Result<Vec<u16>, WireError> {
    if body.len() % 2 != 0 {
        return Err(WireError::InvalidDataSize);
    }
    Ok(body.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]])).collect())
}

fn decode_preference(body: &[u8]) -> Result<u8, WireError> {
    if body.len() != 1 {
        return Err(WireError::InvalidPreferenceData);
    }
    Ok(body[0])
}

fn decode_elapsed_time(body: &[u8]) -> Result<u16, WireError> {
    if body.len() != 2 {
        return Err(WireError::InvalidDataSize);
    }
    Ok(u16::from_be_bytes([body[0], body[1]]))
}

fn decode_addr_list(body: &[u8]) -> Result<Vec<Ipv6Addr>, WireError> {
    if body.len() % 16 != 0 {
        return Err(WireError::InvalidDataSize);
    }
    Ok(body
        .chunks_exact(16)
        .map(|c| Ipv6Addr::from(<[u8; 16]>::try_from(c).unwrap()))
        .collect())
}

fn decode_fqdn(body: &[u8]) -> Result<(u8, String), WireError> {
    let flags = *body.first().ok_or(WireError::InvalidDataSize)?;
    let (name, _) = domain_name::decode_one(&body[1..])?;
    Ok((flags, name))
}

/// Decode a Status Code sub-option's body: `<status:16><message...>`.
fn decode_status(body: &[u8]) -> Result<(u16, String), WireError> {
    if body.len() < 2 {
        return Err(WireError::InvalidDataSize);
    }
    let status = u16::from_be_bytes([body[0], body[1]]);
    let message = std::str::from_utf8(&body[2..]).unwrap_or_default().to_string();
    Ok((status, message))
}

fn decode_ia_address(body: &[u8]) -> Result<DecodedIaAddress, WireError> {
    if body.len() < 24 {
        return Err(WireError::InvalidIAData);
    }
    let address = Ipv6Addr::from(<[u8; 16]>::try_from(&body[0..16]).unwrap());
    let preferred_lifetime = u32::from_be_bytes(body[16..20].try_into().unwrap());
    let valid_lifetime = u32::from_be_bytes(body[20..24].try_into().unwrap());

    let mut status = None;
    let mut offset = 24;
    while offset < body.len() {
        let (code, len, data_start) =
            read_option_header(body, offset).ok_or(WireError::IncompleteOptionBlock)?;
        let data_end = data_start.checked_add(len).ok_or(WireError::IncompleteOptionBlock)?;
        if data_end > body.len() {
            return Err(WireError::IncompleteOptionBlock);
        }
        if code == OPTION_STATUS_CODE {
            status = Some(decode_status(&body[data_start..data_end])?);
        }
        offset = data_end;
    }

    Ok(DecodedIaAddress { address, preferred_lifetime, valid_lifetime, status })
}

fn decode_ia_na(body: &[u8]) -> Result<DecodedIaNa, WireError> {
    if body.len() < 12 {
        return Err(WireError::InvalidIAData);
    }
    let iaid = u32::from_be_bytes(body[0..4].try_into().unwrap());
    let t1 = u32::from_be_bytes(body[4..8].try_into().unwrap());
    let t2 = u32::from_be_bytes(body[8..12].try_into().unwrap());
    if t1 != 0 && t2 != 0 && t1 > t2 {
        return Err(WireError::InvalidIATime);
    }

    let mut addresses = Vec::new();
    let mut status = None;
    let mut offset = 12;
    while offset < body.len() {
        let (code, len, data_start) =
            read_option_header(body, offset).ok_or(WireError::IncompleteOptionBlock)?;
        let data_end = data_start.checked_add(len).ok_or(WireError::IncompleteOptionBlock)?;
        if data_end > body.len() {
            return Err(WireError::IncompleteOptionBlock);
        }
        match code {
            OPTION_IAADDR => addresses.push(decode_ia_address(&body[data_start..data_end])?),
            OPTION_STATUS_CODE => status = Some(decode_status(&body[data_start..data_end])?),
            _ => {}
        }
        offset = data_end;
    }

    Ok(DecodedIaNa { iaid, t1, t2, status, addresses })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{write_option_header, MSG_REPLY};

    fn minimal_message(options: &[u8]) -> Vec<u8> {
        let mut buf = vec![MSG_REPLY, 0x00, 0xAA, 0xBB];
        buf.extend_from_slice(options);
        buf
    }

    #[test]
    fn truncated_header_is_rejected() {
        assert!(decode_message(&[MSG_REPLY]).is_err());
    }

    #[test]
    fn option_length_exactly_at_boundary_is_accepted() {
        let mut opts = Vec::new();
        write_option_header(&mut opts, OPTION_ELAPSED_TIME, 2);
        opts.extend_from_slice(&0u16.to_be_bytes());
        let msg = minimal_message(&opts);
        assert!(decode_message(&msg).is_ok());
    }

    #[test]
    fn option_length_one_past_boundary_is_rejected() {
        let mut opts = Vec::new();
        write_option_header(&mut opts, OPTION_ELAPSED_TIME, 3);
        opts.extend_from_slice(&0u16.to_be_bytes());
        let msg = minimal_message(&opts);
        assert!(matches!(decode_message(&msg), Err(WireError::IncompleteOptionBlock)));
    }

    #[test]
    fn ia_na_with_nested_address_and_status() {
        let mut ia_body = Vec::new();
        ia_body.extend_from_slice(&0x12345678u32.to_be_bytes());
        ia_body.extend_from_slice(&300u32.to_be_bytes());
        ia_body.extend_from_slice(&480u32.to_be_bytes());

        let mut addr_body = Vec::new();
        addr_body.extend_from_slice(&Ipv6Addr::from([0u8; 16]).octets());
        addr_body.extend_from_slice(&600u32.to_be_bytes());
        addr_body.extend_from_slice(&900u32.to_be_bytes());
        write_option_header(&mut ia_body, OPTION_IAADDR, addr_body.len() as u16);
        ia_body.extend_from_slice(&addr_body);

        let mut opts = Vec::new();
        write_option_header(&mut opts, OPTION_IA_NA, ia_body.len() as u16);
        opts.extend_from_slice(&ia_body);

        let msg = minimal_message(&opts);
        let decoded = decode_message(&msg).unwrap();
        let ia = decoded.ia_na.unwrap();
        assert_eq!(ia.iaid, 0x12345678);
        assert_eq!(ia.addresses.len(), 1);
        assert_eq!(ia.addresses[0].valid_lifetime, 900);
    }

    #[test]
    fn top_level_status_code_is_recorded() {
        let mut opts = Vec::new();
        let mut status_body = Vec::new();
        status_body.extend_from_slice(&4u16.to_be_bytes());
        status_body.extend_from_slice(b"not on link");
        write_option_header(&mut opts, OPTION_STATUS_CODE, status_body.len() as u16);
        opts.extend_from_slice(&status_body);

        let msg = minimal_message(&opts);
        let decoded = decode_message(&msg).unwrap();
        assert_eq!(decoded.status, Some((4, "not on link".to_string())));
    }

    #[test]
    fn inconsistent_t1_t2_rejected() {
        let mut ia_body = Vec::new();
        ia_body.extend_from_slice(&1u32.to_be_bytes());
        ia_body.extend_from_slice(&500u32.to_be_bytes());
        ia_body.extend_from_slice(&200u32.to_be_bytes());
        let mut opts = Vec::new();
        write_option_header(&mut opts, OPTION_IA_NA, ia_body.len() as u16);
        opts.extend_from_slice(&ia_body);
        let msg = minimal_message(&opts);
        assert!(matches!(decode_message(&msg), Err(WireError::InvalidIATime)));
    }

    #[test]
    fn status_code_sub_option_inside_ia_address() {
        let mut addr_body = Vec::new();
        addr_body.extend_from_slice(&Ipv6Addr::from([0u8; 16]).octets());
        addr_body.extend_from_slice(&0u32.to_be_bytes());
        addr_body.extend_from_slice(&0u32.to_be_bytes());
        let mut status_body = Vec::new();
        status_body.extend_from_slice(&4u16.to_be_bytes());
        status_body.extend_from_slice(b"not on link");
        write_option_header(&mut addr_body, OPTION_STATUS_CODE, status_body.len() as u16);
        addr_body.extend_from_slice(&status_body);

        let addr = decode_ia_address(&addr_body).unwrap();
        assert_eq!(addr.status, Some((4, "not on link".to_string())));
    }

    #[test]
    fn rapid_commit_with_nonzero_length_rejected() {
        let mut opts = Vec::new();
        write_option_header(&mut opts, OPTION_RAPID_COMMIT, 1);
        opts.push(0);
        let msg = minimal_message(&opts);
        assert!(matches!(decode_message(&msg), Err(WireError::InvalidDataSize)));
    }

    #[test]
    fn unknown_top_level_option_is_tolerated() {
        let mut opts = Vec::new();
        write_option_header(&mut opts, 9999, 3);
        opts.extend_from_slice(&[1, 2, 3]);
        let msg = minimal_message(&opts);
        assert!(decode_message(&msg).is_ok());
    }
}

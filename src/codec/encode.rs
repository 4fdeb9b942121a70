use std::net::Ipv6Addr;

use crate::codec::{
    domain_name, write_option_header, MessageHeader, MSG_CONFIRM, MSG_DECLINE,
    MSG_INFORMATION_REQUEST, MSG_RELEASE, MSG_SOLICIT, OPTION_CLIENTID, OPTION_ELAPSED_TIME,
    OPTION_FQDN, OPTION_IAADDR, OPTION_IA_NA, OPTION_ORO, OPTION_RAPID_COMMIT, OPTION_SERVERID,
};
use crate::error::{ClientError, ResourceError, WireError};
use crate::identity::ia::IaAddress;
use crate::identity::IdentityStore;

/// Inputs to `encode_message`. Borrows the session's identity store rather
/// than copying it, mirroring the teacher's "encode takes the session"
/// convention.
pub struct EncodeRequest<'a> {
    pub msg_type: u8,
    pub transaction_id: u32,
    pub identity: &'a IdentityStore,
    pub elapsed_time_centiseconds: u16,
    pub rapid_commit: bool,
    /// Remaining payload budget in bytes (pool-payload-size minus IPv6/UDP
    /// headers, already subtracted by the caller).
    pub max_len: usize,
}

fn check_capacity(buf: &[u8], needed: usize, max_len: usize) -> Result<(), ResourceError> {
    if buf.len() + needed > max_len {
        Err(ResourceError::BufferOverflow { needed, remaining: max_len.saturating_sub(buf.len()) })
    } else {
        Ok(())
    }
}

/// Messages whose IA_NA encodes zeroed T1/T2/lifetimes so the server
/// ignores client hints (RFC 3315 §18.1, spec §4.1 table).
fn zero_lifetimes_for(msg_type: u8) -> bool {
    matches!(msg_type, MSG_SOLICIT | MSG_CONFIRM | MSG_DECLINE | MSG_RELEASE)
}

/// Encode a full DHCPv6 message per the option table in spec §4.1.
pub fn encode_message(req: &EncodeRequest) -> Result<Vec<u8>, ClientError> {
    let mut buf = Vec::with_capacity(64);
    let header = MessageHeader { msg_type: req.msg_type, transaction_id: req.transaction_id };
    check_capacity(&buf, MessageHeader::WIRE_LEN, req.max_len)?;
    header.encode(&mut buf);

    encode_client_id(&mut buf, req)?;

    let needs_server_id = matches!(
        req.msg_type,
        crate::codec::MSG_REQUEST | crate::codec::MSG_RENEW | MSG_DECLINE | MSG_RELEASE
    );
    if needs_server_id {
        encode_server_id(&mut buf, req)?;
    }

    encode_elapsed_time(&mut buf, req)?;

    if req.msg_type != MSG_INFORMATION_REQUEST {
        encode_ia_na(&mut buf, req)?;
    }

    if req.msg_type == MSG_SOLICIT && req.rapid_commit {
        encode_rapid_commit(&mut buf, req)?;
    }

    if matches!(
        req.msg_type,
        MSG_SOLICIT | crate::codec::MSG_REQUEST | crate::codec::MSG_RENEW | crate::codec::MSG_REBIND | MSG_CONFIRM
    ) {
        if let Some(fqdn) = &req.identity.fqdn {
            encode_fqdn(&mut buf, req, fqdn)?;
        }
    }

    if matches!(
        req.msg_type,
        MSG_SOLICIT
            | crate::codec::MSG_REQUEST
            | crate::codec::MSG_RENEW
            | crate::codec::MSG_REBIND
            | MSG_CONFIRM
            | MSG_INFORMATION_REQUEST
    ) {
        if !req.identity.oro.is_empty() {
            encode_oro(&mut buf, req)?;
        }
    }

    Ok(buf)
}

fn encode_client_id(buf: &mut Vec<u8>, req: &EncodeRequest) -> Result<(), ClientError> {
    let duid = req.identity.client_duid.as_ref().ok_or(crate::error::ConfigError::MissingDuid)?;
    check_capacity(buf, 4 + duid.bytes.len(), req.max_len)?;
    write_option_header(buf, OPTION_CLIENTID, duid.bytes.len() as u16);
    buf.extend_from_slice(&duid.bytes);
    Ok(())
}

fn encode_server_id(buf: &mut Vec<u8>, req: &EncodeRequest) -> Result<(), ClientError> {
    let duid = req.identity.server_duid.as_ref().ok_or(WireError::InvalidServerDuid)?;
    check_capacity(buf, 4 + duid.bytes.len(), req.max_len)?;
    write_option_header(buf, OPTION_SERVERID, duid.bytes.len() as u16);
    buf.extend_from_slice(&duid.bytes);
    Ok(())
}

fn encode_elapsed_time(buf: &mut Vec<u8>, req: &EncodeRequest) -> Result<(), ClientError> {
    check_capacity(buf, 6, req.max_len)?;
    write_option_header(buf, OPTION_ELAPSED_TIME, 2);
    buf.extend_from_slice(&req.elapsed_time_centiseconds.to_be_bytes());
    Ok(())
}

fn encode_ia_address(buf: &mut Vec<u8>, addr: &IaAddress, zero: bool, max_len: usize) -> Result<(), ClientError> {
    check_capacity(buf, 4 + 24, max_len)?;
    write_option_header(buf, OPTION_IAADDR, 24);
    buf.extend_from_slice(&addr.address.octets());
    let (preferred, valid) = if zero { (0, 0) } else { (addr.preferred_lifetime, addr.valid_lifetime) };
    buf.extend_from_slice(&preferred.to_be_bytes());
    buf.extend_from_slice(&valid.to_be_bytes());
    Ok(())
}

fn encode_ia_na(buf: &mut Vec<u8>, req: &EncodeRequest) -> Result<(), ClientError> {
    let ia = req.identity.ia.as_ref().ok_or(crate::error::ConfigError::MissingIana)?;
    let zero = zero_lifetimes_for(req.msg_type);

    // reserve the IA_NA header (code+length), back-patched once the body
    // length is known, per spec §4.1's "reserve then back-patch" rule.
    check_capacity(buf, 4 + 12, req.max_len)?;
    let header_pos = buf.len();
    write_option_header(buf, OPTION_IA_NA, 0);
    buf.extend_from_slice(&ia.iaid.to_be_bytes());
    let (t1, t2) = if zero { (0, 0) } else { (ia.t1, ia.t2) };
    buf.extend_from_slice(&t1.to_be_bytes());
    buf.extend_from_slice(&t2.to_be_bytes());

    for addr in ia.active() {
        encode_ia_address(buf, addr, zero, req.max_len)?;
    }

    let body_len = (buf.len() - header_pos - 4) as u16;
    buf[header_pos + 2..header_pos + 4].copy_from_slice(&body_len.to_be_bytes());
    Ok(())
}

fn encode_rapid_commit(buf: &mut Vec<u8>, req: &EncodeRequest) -> Result<(), ClientError> {
    check_capacity(buf, 4, req.max_len)?;
    write_option_header(buf, OPTION_RAPID_COMMIT, 0);
    Ok(())
}

fn encode_oro(buf: &mut Vec<u8>, req: &EncodeRequest) -> Result<(), ClientError> {
    let codes = req.identity.oro.requested_codes();
    if codes.is_empty() {
        return Ok(());
    }
    let len = codes.len() * 2;
    check_capacity(buf, 4 + len, req.max_len)?;
    write_option_header(buf, OPTION_ORO, len as u16);
    for code in codes {
        buf.extend_from_slice(&code.to_be_bytes());
    }
    Ok(())
}

fn encode_fqdn(
    buf: &mut Vec<u8>,
    req: &EncodeRequest,
    fqdn: &crate::identity::fqdn::ClientFqdn,
) -> Result<(), ClientError> {
    let body_len = fqdn.encoded_len();
    check_capacity(buf, 4 + body_len, req.max_len)?;
    write_option_header(buf, OPTION_FQDN, body_len as u16);
    buf.push(fqdn.flags);
    domain_name::encode(&fqdn.domain_name, buf).map_err(ClientError::from)?;
    Ok(())
}

#[allow(unused)]
fn addr_is_unspecified(a: &Ipv6Addr) -> bool {
    a.is_unspecified()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duid::{Duid, DuidType, HardwareType};
    use crate::identity::oro::RequestableOption;

    fn sample_identity() -> IdentityStore {
        let mut identity = IdentityStore::default();
        let mac: advmac::MacAddr6 = "02:11:22:33:44:55".parse().unwrap();
        identity.create_client_duid(DuidType::LinkLayerOnly, HardwareType::Ethernet, 0, mac).unwrap();
        identity.create_client_iana(0x12345678, 300, 480).unwrap();
        identity.add_client_ia("2001:db8::1".parse().unwrap(), 600, 900).unwrap();
        identity
    }

    #[test]
    fn solicit_zeroes_ia_lifetimes() {
        let identity = sample_identity();
        let req = EncodeRequest {
            msg_type: MSG_SOLICIT,
            transaction_id: 42,
            identity: &identity,
            elapsed_time_centiseconds: 0,
            rapid_commit: false,
            max_len: 1200,
        };
        let msg = encode_message(&req).unwrap();
        let decoded = crate::codec::decode::decode_message(&msg).unwrap();
        let ia = decoded.ia_na.expect("ia_na present");
        assert_eq!(ia.t1, 0);
        assert_eq!(ia.t2, 0);
        assert_eq!(ia.addresses[0].preferred_lifetime, 0);
        assert_eq!(ia.addresses[0].valid_lifetime, 0);
    }

    #[test]
    fn request_preserves_ia_lifetimes_and_includes_server_id() {
        let mut identity = sample_identity();
        identity.server_duid = Some(Duid::from(vec![0, 3, 0, 1, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]));
        let req = EncodeRequest {
            msg_type: crate::codec::MSG_REQUEST,
            transaction_id: 42,
            identity: &identity,
            elapsed_time_centiseconds: 0,
            rapid_commit: false,
            max_len: 1200,
        };
        let msg = encode_message(&req).unwrap();
        let decoded = crate::codec::decode::decode_message(&msg).unwrap();
        assert!(decoded.server_duid.is_some());
        let ia = decoded.ia_na.unwrap();
        assert_eq!(ia.t1, 300);
        assert_eq!(ia.addresses[0].valid_lifetime, 900);
    }

    #[test]
    fn request_without_server_duid_fails() {
        let identity = sample_identity();
        let req = EncodeRequest {
            msg_type: crate::codec::MSG_REQUEST,
            transaction_id: 1,
            identity: &identity,
            elapsed_time_centiseconds: 0,
            rapid_commit: false,
            max_len: 1200,
        };
        assert!(encode_message(&req).is_err());
    }

    #[test]
    fn information_request_omits_fqdn_but_keeps_oro() {
        use crate::identity::fqdn::FqdnOp;

        let mut identity = sample_identity();
        identity.request_option_fqdn("host.example.com", FqdnOp::ClientPerformsUpdate).unwrap();
        identity.request_option(RequestableOption::Dns, true);
        let req = EncodeRequest {
            msg_type: MSG_INFORMATION_REQUEST,
            transaction_id: 1,
            identity: &identity,
            elapsed_time_centiseconds: 0,
            rapid_commit: false,
            max_len: 1200,
        };
        let msg = encode_message(&req).unwrap();
        let decoded = crate::codec::decode::decode_message(&msg).unwrap();
        assert!(decoded.fqdn.is_none());
        assert_eq!(decoded.oro_codes, vec![crate::codec::OPTION_DNS_SERVERS]);
    }

    #[test]
    fn buffer_overflow_is_reported() {
        let identity = sample_identity();
        let req = EncodeRequest {
            msg_type: MSG_SOLICIT,
            transaction_id: 1,
            identity: &identity,
            elapsed_time_centiseconds: 0,
            rapid_commit: false,
            max_len: 4,
        };
        let err = encode_message(&req).unwrap_err();
        assert!(matches!(err, ClientError::Resource(ResourceError::BufferOverflow { .. })));
    }

    #[test]
    fn oro_included_when_requested() {
        let mut identity = sample_identity();
        identity.request_option(RequestableOption::Dns, true);
        let req = EncodeRequest {
            msg_type: MSG_SOLICIT,
            transaction_id: 1,
            identity: &identity,
            elapsed_time_centiseconds: 0,
            rapid_commit: false,
            max_len: 1200,
        };
        let msg = encode_message(&req).unwrap();
        let decoded = crate::codec::decode::decode_message(&msg).unwrap();
        assert_eq!(decoded.oro_codes, vec![crate::codec::OPTION_DNS_SERVERS]);
    }
}

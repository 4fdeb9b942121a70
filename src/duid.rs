use core::fmt;

use advmac::MacAddr6;
use serde::{de::Visitor, Deserialize, Serialize};

use crate::error::ConfigError;

/// Maximum DUID length per RFC 8415 §11.1.
pub const MAX_DUID_LEN: usize = 130;

/// DUID hardware types this client supports (RFC 8415 §11.1, IANA registry).
pub const HWTYPE_ETHERNET: u16 = 1;
pub const HWTYPE_EUI64: u16 = 27;

/// Seconds between the Unix epoch and 2000-01-01T00:00:00Z, the DUID-LLT
/// time base (RFC 8415 §11.2).
pub const DUID_EPOCH_OFFSET: u64 = 946_684_800;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuidType {
    LinkLayerPlusTime,
    LinkLayerOnly,
}

impl DuidType {
    fn wire_value(self) -> u16 {
        match self {
            DuidType::LinkLayerPlusTime => 1,
            DuidType::LinkLayerOnly => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareType {
    Ethernet,
    Eui64,
}

impl HardwareType {
    fn wire_value(self) -> u16 {
        match self {
            HardwareType::Ethernet => HWTYPE_ETHERNET,
            HardwareType::Eui64 => HWTYPE_EUI64,
        }
    }

    fn link_layer_len(self) -> usize {
        match self {
            HardwareType::Ethernet => 6,
            HardwareType::Eui64 => 8,
        }
    }
}

/// A DHCP Unique Identifier, held opaque as its wire bytes once constructed.
///
/// Validated on construction (type, hardware type, length); stored as raw
/// bytes afterwards so the codec can treat every DUID, client-built or
/// server-received, identically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Duid {
    pub bytes: Vec<u8>,
}

impl Duid {
    /// Build a DUID-LLT or DUID-LL from an interface MAC address.
    ///
    /// `time` is the DUID-LLT time field; when `duid_type` is
    /// `LinkLayerPlusTime` and `time` is 0, a time value is synthesized from
    /// the current wall clock (seconds since 2000-01-01, wrapped to 32 bits)
    /// mixed with a random offset, matching RFC 8415 §11.2's "any 4-octet
    /// integer" allowance.
    pub fn create(
        duid_type: DuidType,
        hw_type: HardwareType,
        time: u32,
        mac: MacAddr6,
    ) -> Result<Self, ConfigError> {
        let mac_bytes = mac.to_array();
        let ll_bytes: Vec<u8> = match hw_type {
            HardwareType::Ethernet => mac_bytes.to_vec(),
            HardwareType::Eui64 => {
                // RFC 2464 §4: insert FF:FE between OUI and NIC portions,
                // flip the universal/local bit, to derive a 64-bit EUI.
                let mut eui = Vec::with_capacity(8);
                eui.push(mac_bytes[0] ^ 0x02);
                eui.push(mac_bytes[1]);
                eui.push(mac_bytes[2]);
                eui.push(0xff);
                eui.push(0xfe);
                eui.push(mac_bytes[3]);
                eui.push(mac_bytes[4]);
                eui.push(mac_bytes[5]);
                eui
            }
        };
        debug_assert_eq!(ll_bytes.len(), hw_type.link_layer_len());

        let mut bytes = Vec::with_capacity(8 + ll_bytes.len());
        bytes.extend_from_slice(&duid_type.wire_value().to_be_bytes());
        bytes.extend_from_slice(&hw_type.wire_value().to_be_bytes());
        if duid_type == DuidType::LinkLayerPlusTime {
            let time = if time == 0 { synthesize_time() } else { time };
            bytes.extend_from_slice(&time.to_be_bytes());
        }
        bytes.extend_from_slice(&ll_bytes);

        Duid::new(bytes).ok_or(ConfigError::UnsupportedDuidType(duid_type.wire_value()))
    }

    /// Wrap raw bytes as a DUID, enforcing the RFC 8415 length ceiling.
    pub fn new(bytes: Vec<u8>) -> Option<Self> {
        if bytes.is_empty() || bytes.len() > MAX_DUID_LEN {
            return None;
        }
        Some(Duid { bytes })
    }
}

fn synthesize_time() -> u32 {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let base = now.saturating_sub(DUID_EPOCH_OFFSET) as u32;
    base.wrapping_add(rand::random::<u16>() as u32)
}

impl fmt::Display for Duid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.bytes.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl Serialize for Duid {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Duid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct DuidVisitor;
        impl<'de> Visitor<'de> for DuidVisitor {
            type Value = Duid;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str(r#"colon separated hex "00:11:22""#)
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Duid::try_from(v).map_err(serde::de::Error::custom)
            }
        }

        deserializer.deserialize_str(DuidVisitor)
    }
}

impl From<Vec<u8>> for Duid {
    fn from(value: Vec<u8>) -> Self {
        Duid { bytes: value }
    }
}

impl From<&[u8]> for Duid {
    fn from(value: &[u8]) -> Self {
        Duid { bytes: value.to_vec() }
    }
}

#[derive(Debug)]
pub struct DuidParseError {
    pub message: &'static str,
}

impl std::error::Error for DuidParseError {}
impl fmt::Display for DuidParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message)
    }
}
impl Default for DuidParseError {
    fn default() -> Self {
        Self { message: "invalid DUID format" }
    }
}

impl TryFrom<&str> for Duid {
    type Error = DuidParseError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let bytes = value
            .trim()
            .split(':')
            .map(|hex| u8::from_str_radix(hex, 16))
            .collect::<Result<Vec<u8>, _>>()
            .map_err(|_| DuidParseError::default())?;
        if bytes.is_empty() || bytes.len() > MAX_DUID_LEN {
            return Err(DuidParseError { message: "DUID length out of range" });
        }
        Ok(Duid { bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_ethernet_llt_has_expected_layout() {
        let mac: MacAddr6 = "02:11:22:33:44:55".parse().unwrap();
        let duid = Duid::create(DuidType::LinkLayerPlusTime, HardwareType::Ethernet, 12345, mac).unwrap();
        assert_eq!(duid.bytes.len(), 4 + 4 + 6);
        assert_eq!(&duid.bytes[0..2], &1u16.to_be_bytes());
        assert_eq!(&duid.bytes[2..4], &HWTYPE_ETHERNET.to_be_bytes());
        assert_eq!(&duid.bytes[4..8], &12345u32.to_be_bytes());
        assert_eq!(&duid.bytes[8..14], &mac.to_array());
    }

    #[test]
    fn create_ll_only_has_no_time_field() {
        let mac: MacAddr6 = "02:11:22:33:44:55".parse().unwrap();
        let duid = Duid::create(DuidType::LinkLayerOnly, HardwareType::Ethernet, 0, mac).unwrap();
        assert_eq!(duid.bytes.len(), 4 + 6);
        assert_eq!(&duid.bytes[0..2], &3u16.to_be_bytes());
    }

    #[test]
    fn eui64_expands_to_eight_bytes() {
        let mac: MacAddr6 = "02:11:22:33:44:55".parse().unwrap();
        let duid = Duid::create(DuidType::LinkLayerOnly, HardwareType::Eui64, 0, mac).unwrap();
        assert_eq!(duid.bytes.len(), 4 + 8);
        let ll = &duid.bytes[4..];
        assert_eq!(ll[3], 0xff);
        assert_eq!(ll[4], 0xfe);
    }

    #[test]
    fn zero_time_is_synthesized_nonzero_given_real_clock() {
        let mac: MacAddr6 = "02:11:22:33:44:55".parse().unwrap();
        let duid = Duid::create(DuidType::LinkLayerPlusTime, HardwareType::Ethernet, 0, mac).unwrap();
        let time = u32::from_be_bytes(duid.bytes[4..8].try_into().unwrap());
        assert_ne!(time, 0);
    }

    #[test]
    fn display_and_parse_round_trip() {
        let duid = Duid::from(vec![0x00, 0x03, 0x00, 0x01, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        let s = duid.to_string();
        let parsed = Duid::try_from(s.as_str()).unwrap();
        assert_eq!(duid, parsed);
    }

    #[test]
    fn oversized_duid_is_rejected() {
        assert!(Duid::new(vec![0u8; MAX_DUID_LEN + 1]).is_none());
    }
}

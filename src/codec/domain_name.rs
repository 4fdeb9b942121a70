use crate::error::WireError;

/// Encode `name` as RFC 1035 §3.1 length-prefixed labels, no compression
/// (forbidden on the wire per RFC 3315 §8). A trailing zero-length label
/// terminates the name, matching the root label.
pub fn encode(name: &str, buf: &mut Vec<u8>) -> Result<(), WireError> {
    for label in name.split('.') {
        if label.is_empty() {
            continue;
        }
        if label.len() > 63 {
            return Err(WireError::ProcessingError("domain label exceeds 63 bytes"));
        }
        buf.push(label.len() as u8);
        buf.extend_from_slice(label.as_bytes());
    }
    buf.push(0);
    Ok(())
}

/// Bytes `encode` would produce for `name`, without allocating the buffer.
pub fn encoded_len(name: &str) -> usize {
    name.split('.')
        .filter(|l| !l.is_empty())
        .map(|l| 1 + l.len())
        .sum::<usize>()
        + 1
}

/// Decode one or more dot-joined domain names packed back-to-back inside
/// `data` (used by both the Domain-Name Search List option and the Client
/// FQDN option), until `data` is exhausted.
pub fn decode_all(data: &[u8]) -> Result<Vec<String>, WireError> {
    let mut names = Vec::new();
    let mut offset = 0;
    while offset < data.len() {
        let (name, consumed) = decode_one(&data[offset..])?;
        names.push(name);
        offset += consumed;
    }
    Ok(names)
}

/// Decode a single length-prefixed name starting at `data[0]`, returning
/// the name and the number of bytes consumed (including the root label).
pub fn decode_one(data: &[u8]) -> Result<(String, usize), WireError> {
    let mut labels = Vec::new();
    let mut offset = 0;
    loop {
        let len = *data.get(offset).ok_or(WireError::IncompleteOptionBlock)? as usize;
        if len == 0 {
            offset += 1;
            break;
        }
        if len > 63 {
            return Err(WireError::ProcessingError("domain label exceeds 63 bytes"));
        }
        // compression pointers (top two bits set) are forbidden on the wire.
        if len & 0xC0 != 0 {
            return Err(WireError::ProcessingError("domain name compression forbidden"));
        }
        let start = offset + 1;
        let end = start + len;
        if end > data.len() {
            return Err(WireError::IncompleteOptionBlock);
        }
        let label = std::str::from_utf8(&data[start..end])
            .map_err(|_| WireError::ProcessingError("domain label is not valid utf-8"))?;
        labels.push(label.to_string());
        offset = end;
    }
    Ok((labels.join("."), offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_simple_name() {
        let mut buf = Vec::new();
        encode("host.example.com", &mut buf).unwrap();
        let (name, consumed) = decode_one(&buf).unwrap();
        assert_eq!(name, "host.example.com");
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn label_of_63_is_accepted() {
        let label = "a".repeat(63);
        let mut buf = Vec::new();
        encode(&label, &mut buf).unwrap();
        let (name, _) = decode_one(&buf).unwrap();
        assert_eq!(name, label);
    }

    #[test]
    fn label_of_64_is_rejected_on_encode() {
        let label = "a".repeat(64);
        let mut buf = Vec::new();
        assert!(encode(&label, &mut buf).is_err());
    }

    #[test]
    fn label_of_64_is_rejected_on_decode() {
        let mut buf = vec![64u8];
        buf.extend_from_slice(&[b'a'; 64]);
        buf.push(0);
        assert!(decode_one(&buf).is_err());
    }

    #[test]
    fn compression_pointer_is_rejected() {
        let buf = vec![0xC0, 0x0C];
        assert!(decode_one(&buf).is_err());
    }

    #[test]
    fn truncated_label_is_incomplete() {
        let buf = vec![10u8, b'a', b'b'];
        assert!(matches!(decode_one(&buf), Err(WireError::IncompleteOptionBlock)));
    }

    #[test]
    fn decode_all_handles_multiple_names() {
        let mut buf = Vec::new();
        encode("a.example.com", &mut buf).unwrap();
        encode("b.example.com", &mut buf).unwrap();
        let names = decode_all(&buf).unwrap();
        assert_eq!(names, vec!["a.example.com".to_string(), "b.example.com".to_string()]);
    }
}

/// Volume label and serial rendering
///
/// Labels are stored in fixed-width fields padded with NUL or spaces. Bad byte
/// sequences are replaced rather than rejected: a mangled label never stops a
/// volume from being identified.

use uuid::Uuid;

/// Decode a fixed-width single-byte label
///
/// Text stops at the first NUL; trailing spaces are trimmed. UTF-8 is
/// decoded lossily. Returns `None` for an empty label.
pub fn fixed_label(raw: &[u8]) -> Option<String> {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    let text = String::from_utf8_lossy(&raw[..end]);
    non_empty(text.trim_end_matches(' '))
}

/// Decode a fixed-width UTF-16 little-endian label
///
/// Text stops at the first NUL code unit; unpaired surrogates become U+FFFD.
pub fn utf16le_label(raw: &[u8]) -> Option<String> {
    let units: Vec<u16> = raw
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|&unit| unit != 0)
        .collect();
    let text = String::from_utf16_lossy(&units);
    non_empty(text.trim_end_matches(' '))
}

/// Render a 16-byte on-disk UUID in mixed-endian GUID form
///
/// The first three groups are read little-endian, which is how these
/// volumes' serials are conventionally reported, e.g. bytes
/// `9e a7 1c 6b 48 70 48 a7 ..` render as `6b1ca79e-7048-a748-..`.
/// An all-zero UUID means "not set" and yields `None`.
pub fn guid_serial(raw: &[u8; 16]) -> Option<String> {
    let guid = Uuid::from_bytes_le(*raw);
    if guid.is_nil() {
        None
    } else {
        Some(guid.hyphenated().to_string())
    }
}

/// Render a 64-bit serial as sixteen upper-case hex digits
pub fn hex_serial_u64(serial: u64) -> Option<String> {
    if serial == 0 {
        None
    } else {
        Some(format!("{:016X}", serial))
    }
}

fn non_empty(text: &str) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_label_trims_padding() {
        let mut raw = [0u8; 16];
        raw[..12].copy_from_slice(b"Volume label");
        assert_eq!(fixed_label(&raw), Some("Volume label".to_string()));

        let padded = *b"DATA            ";
        assert_eq!(fixed_label(&padded), Some("DATA".to_string()));
    }

    #[test]
    fn test_fixed_label_empty() {
        assert_eq!(fixed_label(&[0u8; 16]), None);
        assert_eq!(fixed_label(b"    "), None);
        assert_eq!(fixed_label(&[]), None);
    }

    #[test]
    fn test_fixed_label_invalid_utf8() {
        let raw = [b'A', 0xFF, b'B', 0];
        assert_eq!(fixed_label(&raw), Some("A\u{FFFD}B".to_string()));
    }

    #[test]
    fn test_utf16le_label() {
        let mut raw = vec![0u8; 32];
        for (i, unit) in "Disco".encode_utf16().enumerate() {
            raw[i * 2..i * 2 + 2].copy_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(utf16le_label(&raw), Some("Disco".to_string()));
        assert_eq!(utf16le_label(&[0u8; 32]), None);
    }

    #[test]
    fn test_utf16le_label_unpaired_surrogate() {
        let raw = [0x41, 0x00, 0x00, 0xD8, 0x42, 0x00];
        assert_eq!(utf16le_label(&raw), Some("A\u{FFFD}B".to_string()));
    }

    #[test]
    fn test_guid_serial_mixed_endian() {
        let raw = [
            0x9e, 0xa7, 0x1c, 0x6b, 0x48, 0x70, 0x48, 0xa7, 0x93, 0xa0, 0x89, 0xc7, 0x4b, 0x02,
            0xcb, 0x5a,
        ];
        assert_eq!(
            guid_serial(&raw),
            Some("6b1ca79e-7048-a748-93a0-89c74b02cb5a".to_string())
        );
        assert_eq!(guid_serial(&[0u8; 16]), None);
    }

    #[test]
    fn test_hex_serial() {
        assert_eq!(
            hex_serial_u64(0x1C2D_3E4F_5A6B_7C8D),
            Some("1C2D3E4F5A6B7C8D".to_string())
        );
        assert_eq!(hex_serial_u64(0), None);
    }
}

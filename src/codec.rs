/// Bounds-checked access to fixed-layout on-disk structures
///
/// Every accessor returns `None` rather than panicking when the requested
/// field lies outside the buffer, so superblock decoders can be fed
/// truncated or foreign data.

use std::marker::PhantomData;

use byteorder::ByteOrder;

pub use byteorder::{BigEndian, LittleEndian};

/// Typed view over a byte buffer in a fixed byte order
#[derive(Debug, Clone, Copy)]
pub struct Fields<'a, E: ByteOrder> {
    data: &'a [u8],
    order: PhantomData<E>,
}

impl<'a, E: ByteOrder> Fields<'a, E> {
    /// Wrap a buffer
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            order: PhantomData,
        }
    }

    /// Length of the underlying buffer
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the underlying buffer is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrow `len` bytes at `offset`
    pub fn slice(&self, offset: usize, len: usize) -> Option<&'a [u8]> {
        let end = offset.checked_add(len)?;
        self.data.get(offset..end)
    }

    /// Read a byte
    pub fn u8(&self, offset: usize) -> Option<u8> {
        self.data.get(offset).copied()
    }

    /// Read a 16-bit integer
    pub fn u16(&self, offset: usize) -> Option<u16> {
        self.slice(offset, 2).map(E::read_u16)
    }

    /// Read a 32-bit integer
    pub fn u32(&self, offset: usize) -> Option<u32> {
        self.slice(offset, 4).map(E::read_u32)
    }

    /// Read a 64-bit integer
    pub fn u64(&self, offset: usize) -> Option<u64> {
        self.slice(offset, 8).map(E::read_u64)
    }

    /// Copy a fixed-size byte array
    pub fn array<const N: usize>(&self, offset: usize) -> Option<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.slice(offset, N)?);
        Some(out)
    }
}

/// Copy of `data[..len]` with `width` bytes at `field` zeroed
///
/// Checksums are usually computed over a structure with its own checksum
/// field cleared.
pub(crate) fn with_field_zeroed(
    data: &[u8],
    len: usize,
    field: usize,
    width: usize,
) -> Option<Vec<u8>> {
    let mut copy = data.get(..len)?.to_vec();
    copy.get_mut(field..field.checked_add(width)?)?.fill(0);
    Some(copy)
}

/// Raw little-endian CRC-32 (IEEE) with the given seed and no final inversion
///
/// This is the `crc32_le(seed, data, len)` used by Linux filesystems.
pub(crate) fn crc32_le(seed: u32, data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new_with_initial(!seed);
    hasher.update(data);
    !hasher.finalize()
}

/// Raw CRC-32C seeded with `!0` and no final inversion
///
/// ext4 stores this form; Btrfs and XFS store the conventional
/// [`crc32c::crc32c`] which is its complement.
pub(crate) fn crc32c_raw(data: &[u8]) -> u32 {
    !crc32c::crc32c(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_little_endian() {
        let data = [0x53, 0xEF, 0x01, 0x00, 0x00, 0x00, 0x78, 0x56, 0x34, 0x12];
        let fields = Fields::<LittleEndian>::new(&data);

        assert_eq!(fields.u16(0), Some(0xEF53));
        assert_eq!(fields.u32(2), Some(1));
        assert_eq!(fields.u32(6), Some(0x1234_5678));
        assert_eq!(fields.u64(2), Some(0x1234_5678_0000_0001));
    }

    #[test]
    fn test_fields_big_endian() {
        let data = *b"XFSB\x00\x00\x10\x00";
        let fields = Fields::<BigEndian>::new(&data);

        assert_eq!(fields.u32(0), Some(0x5846_5342));
        assert_eq!(fields.u32(4), Some(4096));
    }

    #[test]
    fn test_fields_out_of_bounds() {
        let data = [0u8; 8];
        let fields = Fields::<LittleEndian>::new(&data);

        assert_eq!(fields.u8(8), None);
        assert_eq!(fields.u16(7), None);
        assert_eq!(fields.u32(5), None);
        assert_eq!(fields.u64(1), None);
        assert_eq!(fields.slice(usize::MAX, 2), None);
        assert!(fields.array::<9>(0).is_none());
        assert_eq!(fields.array::<4>(4), Some([0; 4]));
    }

    #[test]
    fn test_with_field_zeroed() {
        let data = [1u8; 16];
        let copy = with_field_zeroed(&data, 12, 4, 4).unwrap();
        assert_eq!(copy.len(), 12);
        assert_eq!(&copy[4..8], &[0, 0, 0, 0]);
        assert_eq!(copy[8], 1);

        assert!(with_field_zeroed(&data, 32, 0, 4).is_none());
        assert!(with_field_zeroed(&data, 12, 10, 4).is_none());
    }

    #[test]
    fn test_crc32_le_matches_standard_crc() {
        // With seed !0 and a final inversion this is the ordinary CRC-32
        let data = b"123456789";
        assert_eq!(!crc32_le(!0, data), 0xCBF4_3926);
    }

    #[test]
    fn test_crc32c_raw_is_complement() {
        let data = b"123456789";
        assert_eq!(crc32c::crc32c(data), 0xE306_9283);
        assert_eq!(crc32c_raw(data), !0xE306_9283);
    }
}

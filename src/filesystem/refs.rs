/// ReFS volume probe
///
/// ReFS keeps a small boot-sector style header at the start of the volume.
/// Its 16-bit checksum is not verified; the three signatures are distinctive
/// enough on their own.

use log::{debug, trace};

use crate::codec::{Fields, LittleEndian};
use crate::error::Result;
use crate::filesystem::{FileSystem, ProbeContext, ProbeResult};
use crate::text::hex_serial_u64;
use crate::volume::{exact_clusters, FileSystemType, VolumeDescriptor};

/// Bytes read from the start of the volume
pub const REFS_HEADER_SIZE: usize = 0x200;

/// File system signature at offset 3
pub const REFS_SIGNATURE: [u8; 8] = *b"ReFS\0\0\0\0";

/// Structure identifier at offset 16
pub const REFS_IDENTIFIER: [u8; 4] = *b"FSRS";

/// Decoded ReFS volume header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefsVolumeHeader {
    /// File system signature
    pub signature: [u8; 8],
    /// Bytes that must be zero
    pub must_be_zero: [u8; 5],
    /// Structure identifier
    pub identifier: [u8; 4],
    /// Length of the header structure
    pub length: u16,
    /// Header checksum
    pub checksum: u16,
    /// Volume size in sectors
    pub sectors: u64,
    /// Bytes per sector
    pub bytes_per_sector: u32,
    /// Sectors per cluster
    pub sectors_per_cluster: u32,
    /// Major version
    pub major_version: u8,
    /// Minor version
    pub minor_version: u8,
    /// Volume serial number
    pub serial_number: u64,
}

impl RefsVolumeHeader {
    /// Decode the header from the first bytes of the volume
    pub fn decode(raw: &[u8]) -> Option<Self> {
        let f = Fields::<LittleEndian>::new(raw);

        Some(Self {
            signature: f.array(3)?,
            must_be_zero: f.array(11)?,
            identifier: f.array(16)?,
            length: f.u16(20)?,
            checksum: f.u16(22)?,
            sectors: f.u64(24)?,
            bytes_per_sector: f.u32(32)?,
            sectors_per_cluster: f.u32(36)?,
            major_version: f.u8(40)?,
            minor_version: f.u8(41)?,
            serial_number: f.u64(0x38)?,
        })
    }

    /// Check all three signatures
    pub fn is_valid(&self) -> bool {
        self.signature == REFS_SIGNATURE
            && self.must_be_zero == [0; 5]
            && self.identifier == REFS_IDENTIFIER
    }

    /// Build the volume description for a partition of the given length
    pub fn describe(&self, partition_length: u64) -> Option<VolumeDescriptor> {
        let cluster_size = self.bytes_per_sector.checked_mul(self.sectors_per_cluster)?;
        let clusters = exact_clusters(self.sectors, u64::from(self.sectors_per_cluster))?;
        trace!(
            "refs: {} sectors of {} bytes, {} per cluster",
            self.sectors,
            self.bytes_per_sector,
            self.sectors_per_cluster
        );

        VolumeDescriptor::builder(FileSystemType::Refs)
            .variant(format!("{}.{}", self.major_version, self.minor_version))
            .geometry(cluster_size, clusters)
            .volume_serial(hex_serial_u64(self.serial_number))
            .build(partition_length)
    }
}

/// Probe for ReFS
#[derive(Debug, Clone, Copy, Default)]
pub struct RefsFileSystem;

impl RefsFileSystem {
    /// Read and validate the volume header
    pub fn probe(&self, ctx: &ProbeContext<'_>) -> Result<ProbeResult<RefsVolumeHeader>> {
        let raw = match ctx.read_at(0, REFS_HEADER_SIZE)? {
            Some(raw) => raw,
            None => return Ok(ProbeResult::NotRecognized),
        };

        match RefsVolumeHeader::decode(&raw) {
            Some(header) if header.is_valid() => {
                debug!(
                    "refs: found version {}.{} header",
                    header.major_version, header.minor_version
                );
                Ok(ProbeResult::Recognized(header))
            }
            _ => Ok(ProbeResult::NotRecognized),
        }
    }
}

impl FileSystem for RefsFileSystem {
    fn kind(&self) -> FileSystemType {
        FileSystemType::Refs
    }

    fn identify(&self, ctx: &ProbeContext<'_>) -> Result<bool> {
        Ok(self.probe(ctx)?.is_recognized())
    }

    fn information(&self, ctx: &ProbeContext<'_>) -> Result<Option<VolumeDescriptor>> {
        Ok(self
            .probe(ctx)?
            .recognized()
            .and_then(|header| header.describe(ctx.partition_length())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{MemoryImage, Partition};

    fn sample_header(sectors: u64, sectors_per_cluster: u32) -> Vec<u8> {
        let mut raw = vec![0u8; REFS_HEADER_SIZE];
        raw[3..11].copy_from_slice(&REFS_SIGNATURE);
        raw[16..20].copy_from_slice(&REFS_IDENTIFIER);
        raw[20..22].copy_from_slice(&0x40u16.to_le_bytes());
        raw[24..32].copy_from_slice(&sectors.to_le_bytes());
        raw[32..36].copy_from_slice(&512u32.to_le_bytes());
        raw[36..40].copy_from_slice(&sectors_per_cluster.to_le_bytes());
        raw[40] = 3;
        raw[41] = 4;
        raw[0x38..0x40].copy_from_slice(&0x1C2D_3E4F_5A6B_7C8Du64.to_le_bytes());
        raw
    }

    fn image_with(raw: &[u8], sectors: u64) -> MemoryImage {
        let mut image = MemoryImage::new(512, sectors).unwrap();
        image.write_bytes(0, raw).unwrap();
        image
    }

    #[test]
    fn test_identify_and_describe() {
        let image = image_with(&sample_header(262_144, 128), 262_144);
        let ctx = ProbeContext::new(&image, Partition::whole(&image));

        assert!(RefsFileSystem.identify(&ctx).unwrap());
        let info = RefsFileSystem.information(&ctx).unwrap().unwrap();
        assert_eq!(info.cluster_size, 65_536);
        assert_eq!(info.clusters, 2048);
        assert_eq!(info.variant.as_deref(), Some("3.4"));
        assert_eq!(info.volume_serial.as_deref(), Some("1C2D3E4F5A6B7C8D"));
        assert_eq!(info.volume_name, None);
    }

    #[test]
    fn test_uneven_cluster_split_rejected() {
        let image = image_with(&sample_header(262_143, 128), 262_144);
        let ctx = ProbeContext::new(&image, Partition::whole(&image));

        assert!(RefsFileSystem.identify(&ctx).unwrap());
        assert!(RefsFileSystem.information(&ctx).unwrap().is_none());
    }

    #[test]
    fn test_zero_sectors_per_cluster_rejected() {
        let header = RefsVolumeHeader::decode(&sample_header(1024, 0)).unwrap();
        assert!(header.is_valid());
        assert!(header.describe(1 << 20).is_none());
    }

    #[test]
    fn test_nonzero_padding_rejected() {
        let mut raw = sample_header(1024, 8);
        raw[13] = 1;
        assert!(!RefsVolumeHeader::decode(&raw).unwrap().is_valid());
    }

    #[test]
    fn test_short_buffer() {
        assert!(RefsVolumeHeader::decode(&[0u8; 0x3F]).is_none());
        assert!(RefsVolumeHeader::decode(&[0u8; 0x40]).is_some());
    }
}

/// ext2/ext3/ext4 filesystem probe
///
/// The three generations share one superblock layout at byte 1024 of the
/// partition, little-endian, identified by the magic 0xEF53 at offset 0x38.
/// They are told apart by feature flags. ext4 may protect the superblock with
/// a CRC32C in its last four bytes when `metadata_csum` is enabled; older
/// revisions have no checksum at all.

use log::{debug, trace};

use crate::codec::{crc32c_raw, Fields, LittleEndian};
use crate::error::Result;
use crate::filesystem::{FileSystem, ProbeContext, ProbeResult};
use crate::text::{fixed_label, guid_serial};
use crate::volume::{exact_clusters, unix_time, FileSystemType, VolumeDescriptor};

/// Byte offset of the superblock from the start of the partition
pub const EXT_SUPERBLOCK_OFFSET: u64 = 0x400;

/// Size of the superblock in bytes
pub const EXT_SUPERBLOCK_SIZE: usize = 0x400;

/// Superblock magic number
pub const EXT_MAGIC: u16 = 0xEF53;

/// Largest supported `log_block_size` (64 KiB blocks)
pub const EXT_MAX_LOG_BLOCK_SIZE: u32 = 6;

/// Offset of the superblock checksum
const CHECKSUM_OFFSET: usize = 0x3FC;

/// Filesystem was cleanly unmounted
pub const STATE_VALID_FS: u16 = 0x0001;
/// Errors were detected
pub const STATE_ERROR_FS: u16 = 0x0002;

/// Has a journal.
pub const COMPAT_HAS_JOURNAL: u32 = 0x0004;
/// Has indexed directories.
pub const COMPAT_DIR_INDEX: u32 = 0x0020;

/// Filesystem needs journal recovery.
pub const INCOMPAT_RECOVER: u32 = 0x0004;
/// Superblock belongs to an external journal device, not a filesystem.
pub const INCOMPAT_JOURNAL_DEV: u32 = 0x0008;
/// Meta block groups.
pub const INCOMPAT_META_BG: u32 = 0x0010;
/// Files use extents.
pub const INCOMPAT_EXTENTS: u32 = 0x0040;
/// Block counts are 64 bits wide.
pub const INCOMPAT_64BIT: u32 = 0x0080;
/// Multiple mount protection.
pub const INCOMPAT_MMP: u32 = 0x0100;
/// Flexible block groups.
pub const INCOMPAT_FLEX_BG: u32 = 0x0200;

/// Files larger than 2 TiB.
pub const RO_COMPAT_HUGE_FILE: u32 = 0x0008;
/// Group descriptors have checksums.
pub const RO_COMPAT_GDT_CSUM: u32 = 0x0010;
/// No 32,000 subdirectory limit.
pub const RO_COMPAT_DIR_NLINK: u32 = 0x0020;
/// Large inodes.
pub const RO_COMPAT_EXTRA_ISIZE: u32 = 0x0040;
/// Allocation is tracked in clusters of blocks.
pub const RO_COMPAT_BIGALLOC: u32 = 0x0200;
/// Metadata, including the superblock, is checksummed.
pub const RO_COMPAT_METADATA_CSUM: u32 = 0x0400;

/// Generation of the ext filesystem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtType {
    /// Second extended filesystem
    Ext2,
    /// ext2 plus a journal
    Ext3,
    /// Fourth extended filesystem
    Ext4,
}

impl std::fmt::Display for ExtType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtType::Ext2 => write!(f, "ext2"),
            ExtType::Ext3 => write!(f, "ext3"),
            ExtType::Ext4 => write!(f, "ext4"),
        }
    }
}

/// Decoded ext superblock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtSuperblock {
    /// Total inodes
    pub inodes_count: u32,
    /// Total blocks (low 32 bits)
    pub blocks_count_lo: u32,
    /// Free blocks (low 32 bits)
    pub free_blocks_count_lo: u32,
    /// First data block (1 for 1 KiB blocks, otherwise 0)
    pub first_data_block: u32,
    /// Block size is `1024 << log_block_size`
    pub log_block_size: u32,
    /// Cluster size is `1024 << log_cluster_size` with bigalloc
    pub log_cluster_size: u32,
    /// Blocks per group
    pub blocks_per_group: u32,
    /// Last write time
    pub write_time: u32,
    /// Magic number
    pub magic: u16,
    /// Filesystem state flags
    pub state: u16,
    /// Revision level
    pub rev_level: u32,
    /// Compatible features
    pub feature_compat: u32,
    /// Incompatible features
    pub feature_incompat: u32,
    /// Read-only compatible features
    pub feature_ro_compat: u32,
    /// Filesystem UUID
    pub uuid: [u8; 16],
    /// Volume label
    pub volume_name: [u8; 16],
    /// Creation time
    pub mkfs_time: u32,
    /// Total blocks (high 32 bits, 64bit feature only)
    pub blocks_count_hi: u32,
    /// Free blocks (high 32 bits, 64bit feature only)
    pub free_blocks_count_hi: u32,
    /// Superblock checksum
    pub checksum: u32,
}

impl ExtSuperblock {
    /// Decode a superblock from its 1024 raw bytes
    pub fn decode(raw: &[u8]) -> Option<Self> {
        if raw.len() < EXT_SUPERBLOCK_SIZE {
            return None;
        }
        let f = Fields::<LittleEndian>::new(raw);

        Some(Self {
            inodes_count: f.u32(0x00)?,
            blocks_count_lo: f.u32(0x04)?,
            free_blocks_count_lo: f.u32(0x0C)?,
            first_data_block: f.u32(0x14)?,
            log_block_size: f.u32(0x18)?,
            log_cluster_size: f.u32(0x1C)?,
            blocks_per_group: f.u32(0x20)?,
            write_time: f.u32(0x30)?,
            magic: f.u16(0x38)?,
            state: f.u16(0x3A)?,
            rev_level: f.u32(0x4C)?,
            feature_compat: f.u32(0x5C)?,
            feature_incompat: f.u32(0x60)?,
            feature_ro_compat: f.u32(0x64)?,
            uuid: f.array(0x68)?,
            volume_name: f.array(0x78)?,
            mkfs_time: f.u32(0x108)?,
            blocks_count_hi: f.u32(0x150)?,
            free_blocks_count_hi: f.u32(0x158)?,
            checksum: f.u32(CHECKSUM_OFFSET)?,
        })
    }

    /// Check the magic number and basic sanity of the block size
    pub fn is_valid(&self) -> bool {
        self.magic == EXT_MAGIC && self.log_block_size <= EXT_MAX_LOG_BLOCK_SIZE
    }

    /// Check whether the superblock belongs to an external journal device
    pub fn is_journal_device(&self) -> bool {
        self.feature_incompat & INCOMPAT_JOURNAL_DEV != 0
    }

    /// Check whether the superblock carries a checksum
    pub fn has_checksum(&self) -> bool {
        self.feature_ro_compat & RO_COMPAT_METADATA_CSUM != 0
    }

    /// Compare the stored checksum with one computed over `raw`
    ///
    /// Superblocks without `metadata_csum` always pass.
    pub fn checksum_matches(&self, raw: &[u8]) -> bool {
        if !self.has_checksum() {
            return true;
        }
        match raw.get(..CHECKSUM_OFFSET) {
            Some(covered) => crc32c_raw(covered) == self.checksum,
            None => false,
        }
    }

    /// Returns the generation of the ext filesystem
    ///
    /// The three are one format with growing feature sets: any ext4-only
    /// feature makes it ext4, otherwise a journal or hashed directories make
    /// it ext3.
    pub fn ext_type(&self) -> ExtType {
        let ext4_ro_features = [
            RO_COMPAT_BIGALLOC,
            RO_COMPAT_DIR_NLINK,
            RO_COMPAT_EXTRA_ISIZE,
            RO_COMPAT_HUGE_FILE,
            RO_COMPAT_GDT_CSUM,
            RO_COMPAT_METADATA_CSUM,
        ];
        let ext4_incompat_features = [
            INCOMPAT_64BIT,
            INCOMPAT_EXTENTS,
            INCOMPAT_FLEX_BG,
            INCOMPAT_META_BG,
            INCOMPAT_MMP,
        ];

        if has_any(self.feature_ro_compat, &ext4_ro_features)
            || has_any(self.feature_incompat, &ext4_incompat_features)
        {
            ExtType::Ext4
        } else if has_any(self.feature_compat, &[COMPAT_HAS_JOURNAL, COMPAT_DIR_INDEX]) {
            ExtType::Ext3
        } else {
            ExtType::Ext2
        }
    }

    /// Block size in bytes
    pub fn block_size(&self) -> Option<u32> {
        1024u32.checked_shl(self.log_block_size)
    }

    /// Total blocks, including the high word on 64-bit filesystems
    pub fn blocks_count(&self) -> u64 {
        self.wide(self.blocks_count_lo, self.blocks_count_hi)
    }

    /// Free blocks, including the high word on 64-bit filesystems
    pub fn free_blocks_count(&self) -> u64 {
        self.wide(self.free_blocks_count_lo, self.free_blocks_count_hi)
    }

    fn wide(&self, lo: u32, hi: u32) -> u64 {
        if self.feature_incompat & INCOMPAT_64BIT != 0 {
            (u64::from(hi) << 32) | u64::from(lo)
        } else {
            u64::from(lo)
        }
    }

    /// Volume was not cleanly unmounted or has recorded errors
    pub fn is_dirty(&self) -> bool {
        self.state & STATE_VALID_FS == 0
            || self.state & STATE_ERROR_FS != 0
            || self.feature_incompat & INCOMPAT_RECOVER != 0
    }

    /// Build the volume description for a partition of the given length
    pub fn describe(&self, partition_length: u64) -> Option<VolumeDescriptor> {
        let block_size = self.block_size()?;

        // With bigalloc blocks are grouped into larger allocation clusters
        let (cluster_size, blocks_per_cluster) =
            if self.feature_ro_compat & RO_COMPAT_BIGALLOC != 0 {
                let cluster_size = 1024u32.checked_shl(self.log_cluster_size)?;
                if cluster_size < block_size {
                    return None;
                }
                (cluster_size, u64::from(cluster_size / block_size))
            } else {
                (block_size, 1)
            };

        let clusters = exact_clusters(self.blocks_count(), blocks_per_cluster)?;
        let free = self.free_blocks_count() / blocks_per_cluster;
        trace!(
            "ext: {} blocks of {} bytes, {} free",
            self.blocks_count(),
            block_size,
            self.free_blocks_count()
        );

        VolumeDescriptor::builder(FileSystemType::Ext)
            .variant(self.ext_type().to_string())
            .geometry(cluster_size, clusters)
            .free_clusters(Some(free))
            .volume_name(fixed_label(&self.volume_name))
            .volume_serial(guid_serial(&self.uuid))
            .created(unix_time(u64::from(self.mkfs_time)))
            .modified(unix_time(u64::from(self.write_time)))
            .dirty(self.is_dirty())
            .build(partition_length)
    }
}

/// Any bit of `features` set in `flags`
fn has_any(flags: u32, features: &[u32]) -> bool {
    features.iter().any(|feature| flags & feature != 0)
}

/// Probe for ext2, ext3 and ext4
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtFileSystem;

impl ExtFileSystem {
    /// Read and validate the superblock
    pub fn probe(&self, ctx: &ProbeContext<'_>) -> Result<ProbeResult<ExtSuperblock>> {
        let raw = match ctx.read_at(EXT_SUPERBLOCK_OFFSET, EXT_SUPERBLOCK_SIZE)? {
            Some(raw) => raw,
            None => return Ok(ProbeResult::NotRecognized),
        };

        let superblock = match ExtSuperblock::decode(&raw) {
            Some(sb) if sb.is_valid() => sb,
            _ => return Ok(ProbeResult::NotRecognized),
        };

        if superblock.is_journal_device() {
            debug!("ext: superblock belongs to an external journal device");
            return Ok(ProbeResult::NotRecognized);
        }

        if ctx.verify_checksums() && !superblock.checksum_matches(&raw) {
            debug!(
                "ext: superblock checksum mismatch (stored {:08x})",
                superblock.checksum
            );
            return Ok(ProbeResult::NotRecognized);
        }

        debug!("ext: found {} superblock", superblock.ext_type());
        Ok(ProbeResult::Recognized(superblock))
    }
}

impl FileSystem for ExtFileSystem {
    fn kind(&self) -> FileSystemType {
        FileSystemType::Ext
    }

    fn identify(&self, ctx: &ProbeContext<'_>) -> Result<bool> {
        Ok(self.probe(ctx)?.is_recognized())
    }

    fn information(&self, ctx: &ProbeContext<'_>) -> Result<Option<VolumeDescriptor>> {
        Ok(self
            .probe(ctx)?
            .recognized()
            .and_then(|sb| sb.describe(ctx.partition_length())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{MemoryImage, Partition};

    fn sample_superblock(blocks: u32, log_block_size: u32) -> Vec<u8> {
        let mut sb = vec![0u8; EXT_SUPERBLOCK_SIZE];
        sb[0x00..0x04].copy_from_slice(&8192u32.to_le_bytes());
        sb[0x04..0x08].copy_from_slice(&blocks.to_le_bytes());
        sb[0x0C..0x10].copy_from_slice(&(blocks / 2).to_le_bytes());
        sb[0x18..0x1C].copy_from_slice(&log_block_size.to_le_bytes());
        sb[0x20..0x24].copy_from_slice(&8192u32.to_le_bytes());
        sb[0x38..0x3A].copy_from_slice(&EXT_MAGIC.to_le_bytes());
        sb[0x3A..0x3C].copy_from_slice(&STATE_VALID_FS.to_le_bytes());
        sb[0x4C..0x50].copy_from_slice(&1u32.to_le_bytes());
        sb[0x68..0x78].copy_from_slice(&[0x11; 16]);
        sb[0x78..0x84].copy_from_slice(b"Volume label");
        sb
    }

    fn image_with(sb: &[u8], sectors: u64) -> MemoryImage {
        let mut image = MemoryImage::new(512, sectors).unwrap();
        image.write_bytes(EXT_SUPERBLOCK_OFFSET, sb).unwrap();
        image
    }

    fn seal_checksum(sb: &mut [u8]) {
        let ro = u32::from_le_bytes([sb[0x64], sb[0x65], sb[0x66], sb[0x67]]);
        sb[0x64..0x68].copy_from_slice(&(ro | RO_COMPAT_METADATA_CSUM).to_le_bytes());
        let crc = crc32c_raw(&sb[..CHECKSUM_OFFSET]);
        sb[CHECKSUM_OFFSET..].copy_from_slice(&crc.to_le_bytes());
    }

    #[test]
    fn test_decode_sample() {
        let sb = ExtSuperblock::decode(&sample_superblock(131_008, 0)).unwrap();
        assert!(sb.is_valid());
        assert_eq!(sb.block_size(), Some(1024));
        assert_eq!(sb.blocks_count(), 131_008);
        assert_eq!(sb.ext_type(), ExtType::Ext2);
    }

    #[test]
    fn test_decode_short_buffer() {
        assert!(ExtSuperblock::decode(&[0u8; 1023]).is_none());
    }

    #[test]
    fn test_ext_type_from_features() {
        let mut raw = sample_superblock(1000, 0);
        raw[0x5C..0x60].copy_from_slice(&COMPAT_HAS_JOURNAL.to_le_bytes());
        assert_eq!(ExtSuperblock::decode(&raw).unwrap().ext_type(), ExtType::Ext3);

        raw[0x60..0x64].copy_from_slice(&INCOMPAT_EXTENTS.to_le_bytes());
        assert_eq!(ExtSuperblock::decode(&raw).unwrap().ext_type(), ExtType::Ext4);
    }

    #[test]
    fn test_64bit_block_count() {
        let mut raw = sample_superblock(0x10, 2);
        raw[0x60..0x64].copy_from_slice(&INCOMPAT_64BIT.to_le_bytes());
        raw[0x150..0x154].copy_from_slice(&1u32.to_le_bytes());
        let sb = ExtSuperblock::decode(&raw).unwrap();
        assert_eq!(sb.blocks_count(), 0x1_0000_0010);
    }

    #[test]
    fn test_identify_and_describe() {
        let image = image_with(&sample_superblock(131_008, 0), 262_144);
        let ctx = ProbeContext::new(&image, Partition::whole(&image));

        assert!(ExtFileSystem.identify(&ctx).unwrap());
        let info = ExtFileSystem.information(&ctx).unwrap().unwrap();
        assert_eq!(info.kind, FileSystemType::Ext);
        assert_eq!(info.cluster_size, 1024);
        assert_eq!(info.clusters, 131_008);
        assert_eq!(info.free_clusters, Some(65_504));
        assert_eq!(info.volume_name.as_deref(), Some("Volume label"));
        assert_eq!(
            info.volume_serial.as_deref(),
            Some("11111111-1111-1111-1111-111111111111")
        );
        assert_eq!(info.variant.as_deref(), Some("ext2"));
        assert!(!info.dirty);
    }

    #[test]
    fn test_journal_device_rejected() {
        let mut raw = sample_superblock(1000, 0);
        raw[0x60..0x64].copy_from_slice(&INCOMPAT_JOURNAL_DEV.to_le_bytes());
        let image = image_with(&raw, 4096);
        let ctx = ProbeContext::new(&image, Partition::whole(&image));

        assert!(!ExtFileSystem.identify(&ctx).unwrap());
    }

    #[test]
    fn test_metadata_checksum() {
        let mut raw = sample_superblock(1000, 0);
        seal_checksum(&mut raw);
        let image = image_with(&raw, 4096);
        let ctx = ProbeContext::new(&image, Partition::whole(&image));
        assert!(ExtFileSystem.identify(&ctx).unwrap());

        raw[0x78] = b'X';
        let image = image_with(&raw, 4096);
        let ctx = ProbeContext::new(&image, Partition::whole(&image));
        assert!(!ExtFileSystem.identify(&ctx).unwrap());
    }

    #[test]
    fn test_checksum_ignored_when_not_verifying() {
        let mut raw = sample_superblock(1000, 0);
        seal_checksum(&mut raw);
        raw[0x78] = b'X';
        let image = image_with(&raw, 4096);
        let options = crate::filesystem::ProbeOptions {
            verify_checksums: false,
        };
        let ctx = ProbeContext::with_options(&image, Partition::whole(&image), options);

        assert!(ExtFileSystem.identify(&ctx).unwrap());
    }

    #[test]
    fn test_oversized_geometry_not_described() {
        // 4 KiB blocks claiming more space than the partition has
        let image = image_with(&sample_superblock(1_000_000, 2), 4096);
        let ctx = ProbeContext::new(&image, Partition::whole(&image));

        assert!(ExtFileSystem.identify(&ctx).unwrap());
        assert!(ExtFileSystem.information(&ctx).unwrap().is_none());
    }

    #[test]
    fn test_bigalloc_clusters() {
        let mut raw = sample_superblock(4096, 2);
        raw[0x1C..0x20].copy_from_slice(&4u32.to_le_bytes());
        raw[0x64..0x68].copy_from_slice(&RO_COMPAT_BIGALLOC.to_le_bytes());
        let sb = ExtSuperblock::decode(&raw).unwrap();

        let info = sb.describe(16 * 1024 * 1024).unwrap();
        assert_eq!(info.cluster_size, 16_384);
        assert_eq!(info.clusters, 1024);
        assert_eq!(info.variant.as_deref(), Some("ext4"));
    }

    #[test]
    fn test_bigalloc_remainder_rejected() {
        // 4099 blocks of 4 KiB do not split into 16 KiB clusters
        let mut raw = sample_superblock(4099, 2);
        raw[0x1C..0x20].copy_from_slice(&4u32.to_le_bytes());
        raw[0x64..0x68].copy_from_slice(&RO_COMPAT_BIGALLOC.to_le_bytes());
        let sb = ExtSuperblock::decode(&raw).unwrap();

        assert!(sb.is_valid());
        assert!(sb.describe(64 * 1024 * 1024).is_none());
    }

    #[test]
    fn test_dirty_state() {
        let mut raw = sample_superblock(1000, 0);
        raw[0x3A..0x3C].copy_from_slice(&0u16.to_le_bytes());
        assert!(ExtSuperblock::decode(&raw).unwrap().is_dirty());
    }

    #[test]
    fn test_partition_too_small() {
        // Superblock ends at byte 2048, past the end of a 1536-byte partition
        let image = image_with(&sample_superblock(1, 0), 4);
        let ctx = ProbeContext::new(&image, Partition::new(0, 2, 512));
        assert!(!ExtFileSystem.identify(&ctx).unwrap());
    }
}

/// NILFS2 filesystem probe
///
/// NILFS2 keeps two copies of its superblock: the primary at byte 1024 and a
/// secondary in the last 4 KiB-aligned block of the device. Both are
/// little-endian and protected by a CRC32 seeded per filesystem.

use log::{debug, trace};

use crate::codec::{crc32_le, with_field_zeroed, Fields, LittleEndian};
use crate::error::Result;
use crate::filesystem::{FileSystem, ProbeContext, ProbeResult};
use crate::text::{fixed_label, guid_serial};
use crate::volume::{unix_time, FileSystemType, VolumeDescriptor};

/// Byte offset of the primary superblock
pub const NILFS2_SUPERBLOCK_OFFSET: u64 = 0x400;

/// Bytes read for each superblock copy
pub const NILFS2_SUPERBLOCK_SIZE: usize = 0x400;

/// Superblock magic number
pub const NILFS2_MAGIC: u16 = 0x3434;

/// Smallest valid `s_bytes`, the size of the fixed superblock fields
pub const NILFS2_MIN_SUPERBLOCK_BYTES: u16 = 0x118;

/// Largest supported `log_block_size` (64 KiB blocks)
pub const NILFS2_MAX_LOG_BLOCK_SIZE: u32 = 6;

/// Filesystem was cleanly unmounted
pub const STATE_VALID_FS: u16 = 0x0001;
/// Errors were detected
pub const STATE_ERROR_FS: u16 = 0x0002;

const SUM_OFFSET: usize = 0x10;

/// Which superblock copy was used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuperblockCopy {
    /// Primary copy at byte 1024
    Primary,
    /// Secondary copy near the end of the device
    Secondary,
}

/// Decoded NILFS2 superblock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nilfs2Superblock {
    /// Revision level
    pub rev_level: u32,
    /// Minor revision level
    pub minor_rev_level: u16,
    /// Magic number
    pub magic: u16,
    /// Bytes covered by the checksum
    pub bytes: u16,
    /// Flags
    pub flags: u16,
    /// Checksum seed
    pub crc_seed: u32,
    /// Stored checksum
    pub sum: u32,
    /// Block size is `1 << (log_block_size + 10)`
    pub log_block_size: u32,
    /// Number of segments
    pub nsegments: u64,
    /// Device size in bytes
    pub dev_size: u64,
    /// First data block
    pub first_data_block: u64,
    /// Blocks per segment
    pub blocks_per_segment: u32,
    /// Free blocks
    pub free_blocks_count: u64,
    /// Creation time
    pub ctime: u64,
    /// Last mount time
    pub mtime: u64,
    /// Last write time
    pub wtime: u64,
    /// Filesystem state flags
    pub state: u16,
    /// Filesystem UUID
    pub uuid: [u8; 16],
    /// Volume label
    pub volume_name: [u8; 80],
    /// Copy this superblock was read from
    pub copy: SuperblockCopy,
}

impl Nilfs2Superblock {
    /// Decode a superblock copy from its raw bytes
    pub fn decode(raw: &[u8], copy: SuperblockCopy) -> Option<Self> {
        if raw.len() < usize::from(NILFS2_MIN_SUPERBLOCK_BYTES) {
            return None;
        }
        let f = Fields::<LittleEndian>::new(raw);

        Some(Self {
            rev_level: f.u32(0x00)?,
            minor_rev_level: f.u16(0x04)?,
            magic: f.u16(0x06)?,
            bytes: f.u16(0x08)?,
            flags: f.u16(0x0A)?,
            crc_seed: f.u32(0x0C)?,
            sum: f.u32(SUM_OFFSET)?,
            log_block_size: f.u32(0x14)?,
            nsegments: f.u64(0x18)?,
            dev_size: f.u64(0x20)?,
            first_data_block: f.u64(0x28)?,
            blocks_per_segment: f.u32(0x30)?,
            free_blocks_count: f.u64(0x50)?,
            ctime: f.u64(0x58)?,
            mtime: f.u64(0x60)?,
            wtime: f.u64(0x68)?,
            state: f.u16(0x74)?,
            uuid: f.array(0x98)?,
            volume_name: f.array(0xA8)?,
            copy,
        })
    }

    /// Check the magic number and the checksummed length
    pub fn is_valid(&self) -> bool {
        self.magic == NILFS2_MAGIC
            && self.bytes >= NILFS2_MIN_SUPERBLOCK_BYTES
            && usize::from(self.bytes) <= NILFS2_SUPERBLOCK_SIZE
            && self.log_block_size <= NILFS2_MAX_LOG_BLOCK_SIZE
    }

    /// Compare the stored checksum with one computed over `raw`
    pub fn checksum_matches(&self, raw: &[u8]) -> bool {
        match with_field_zeroed(raw, usize::from(self.bytes), SUM_OFFSET, 4) {
            Some(covered) => crc32_le(self.crc_seed, &covered) == self.sum,
            None => false,
        }
    }

    /// Block size in bytes
    pub fn block_size(&self) -> Option<u32> {
        1u32.checked_shl(self.log_block_size.checked_add(10)?)
    }

    /// Volume was not cleanly unmounted or has recorded errors
    pub fn is_dirty(&self) -> bool {
        self.state & STATE_VALID_FS == 0 || self.state & STATE_ERROR_FS != 0
    }

    /// Build the volume description for a partition of the given length
    pub fn describe(&self, partition_length: u64) -> Option<VolumeDescriptor> {
        let block_size = self.block_size()?;
        let clusters = self.dev_size / u64::from(block_size);
        trace!(
            "nilfs2: dev_size {} with {} byte blocks, {} free",
            self.dev_size,
            block_size,
            self.free_blocks_count
        );

        VolumeDescriptor::builder(FileSystemType::Nilfs2)
            .variant(format!("{}.{}", self.rev_level, self.minor_rev_level))
            .geometry(block_size, clusters)
            .free_clusters(Some(self.free_blocks_count))
            .volume_name(fixed_label(&self.volume_name))
            .volume_serial(guid_serial(&self.uuid))
            .created(unix_time(self.ctime))
            .modified(unix_time(self.wtime))
            .dirty(self.is_dirty())
            .build(partition_length)
    }
}

/// Byte offset of the secondary superblock on a device of `dev_size` bytes
pub fn secondary_offset(dev_size: u64) -> Option<u64> {
    ((dev_size >> 12).checked_sub(1)?).checked_shl(12)
}

/// Probe for NILFS2
#[derive(Debug, Clone, Copy, Default)]
pub struct Nilfs2FileSystem;

impl Nilfs2FileSystem {
    /// Read and validate the primary superblock, falling back to the secondary
    pub fn probe(&self, ctx: &ProbeContext<'_>) -> Result<ProbeResult<Nilfs2Superblock>> {
        let primary = self.read_copy(ctx, NILFS2_SUPERBLOCK_OFFSET, SuperblockCopy::Primary)?;
        if let Some(sb) = primary {
            return Ok(ProbeResult::Recognized(sb));
        }

        let offset = match secondary_offset(ctx.partition_length()) {
            Some(offset) if offset > NILFS2_SUPERBLOCK_OFFSET => offset,
            _ => return Ok(ProbeResult::NotRecognized),
        };
        trace!("nilfs2: trying secondary superblock at {}", offset);
        Ok(self.read_copy(ctx, offset, SuperblockCopy::Secondary)?.into())
    }

    fn read_copy(
        &self,
        ctx: &ProbeContext<'_>,
        offset: u64,
        copy: SuperblockCopy,
    ) -> Result<Option<Nilfs2Superblock>> {
        let raw = match ctx.read_at(offset, NILFS2_SUPERBLOCK_SIZE)? {
            Some(raw) => raw,
            None => return Ok(None),
        };

        let superblock = match Nilfs2Superblock::decode(&raw, copy) {
            Some(sb) if sb.is_valid() => sb,
            _ => return Ok(None),
        };

        if ctx.verify_checksums() && !superblock.checksum_matches(&raw) {
            debug!(
                "nilfs2: {:?} superblock checksum mismatch (stored {:08x})",
                copy, superblock.sum
            );
            return Ok(None);
        }

        debug!("nilfs2: found {:?} superblock at {}", copy, offset);
        Ok(Some(superblock))
    }
}

impl FileSystem for Nilfs2FileSystem {
    fn kind(&self) -> FileSystemType {
        FileSystemType::Nilfs2
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

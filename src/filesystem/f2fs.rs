/// F2FS filesystem probe
///
/// F2FS writes two copies of its superblock, at byte 1024 of the first and
/// second 4 KiB blocks. Newer versions append a CRC32 seeded with the magic.

use log::{debug, trace};

use crate::codec::{crc32_le, Fields, LittleEndian};
use crate::error::Result;
use crate::filesystem::{FileSystem, ProbeContext, ProbeResult};
use crate::text::{guid_serial, utf16le_label};
use crate::volume::{FileSystemType, VolumeDescriptor};

/// Superblock magic number
pub const F2FS_MAGIC: u32 = 0xF2F5_2010;

/// Byte offsets of the two superblock copies
pub const F2FS_SUPERBLOCK_OFFSETS: [u64; 2] = [0x400, 0x1400];

/// Bytes read for each superblock copy
pub const F2FS_SUPERBLOCK_SIZE: usize = 0xC00;

/// Only valid non-zero `checksum_offset`
pub const F2FS_CHECKSUM_OFFSET: u32 = 0xBFC;

/// Length of the label in UTF-16 code units
pub const F2FS_VOLUME_NAME_UNITS: usize = 512;

const MIN_LOG_SECTOR_SIZE: u32 = 9;
const MAX_LOG_SECTOR_SIZE: u32 = 12;
const MIN_LOG_BLOCK_SIZE: u32 = 12;
const MAX_LOG_BLOCK_SIZE: u32 = 16;

/// Decoded F2FS superblock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct F2fsSuperblock {
    /// Magic number
    pub magic: u32,
    /// Major version
    pub major_ver: u16,
    /// Minor version
    pub minor_ver: u16,
    /// Sector size is `1 << log_sectorsize`
    pub log_sectorsize: u32,
    /// Sectors per block is `1 << log_sectors_per_block`
    pub log_sectors_per_block: u32,
    /// Block size is `1 << log_blocksize`
    pub log_blocksize: u32,
    /// Offset of the checksum, or zero
    pub checksum_offset: u32,
    /// Total blocks
    pub block_count: u64,
    /// Filesystem UUID
    pub uuid: [u8; 16],
    /// Volume label, UTF-16LE
    pub volume_name: Vec<u8>,
    /// Stored checksum, when `checksum_offset` is non-zero
    pub checksum: Option<u32>,
}

impl F2fsSuperblock {
    /// Decode a superblock copy from its raw bytes
    pub fn decode(raw: &[u8]) -> Option<Self> {
        if raw.len() < F2FS_SUPERBLOCK_SIZE {
            return None;
        }
        let f = Fields::<LittleEndian>::new(raw);
        let checksum_offset = f.u32(0x20)?;
        let checksum = match checksum_offset {
            0 => None,
            offset => f.u32(usize::try_from(offset).ok()?),
        };

        Some(Self {
            magic: f.u32(0x00)?,
            major_ver: f.u16(0x04)?,
            minor_ver: f.u16(0x06)?,
            log_sectorsize: f.u32(0x08)?,
            log_sectors_per_block: f.u32(0x0C)?,
            log_blocksize: f.u32(0x10)?,
            checksum_offset,
            block_count: f.u64(0x24)?,
            uuid: f.array(0x6C)?,
            volume_name: f.slice(0x7C, F2FS_VOLUME_NAME_UNITS * 2)?.to_vec(),
            checksum,
        })
    }

    /// Check the magic and that the size fields agree with each other
    pub fn is_valid(&self) -> bool {
        self.magic == F2FS_MAGIC
            && (MIN_LOG_SECTOR_SIZE..=MAX_LOG_SECTOR_SIZE).contains(&self.log_sectorsize)
            && (MIN_LOG_BLOCK_SIZE..=MAX_LOG_BLOCK_SIZE).contains(&self.log_blocksize)
            && self.log_sectorsize.checked_add(self.log_sectors_per_block)
                == Some(self.log_blocksize)
            && (self.checksum_offset == 0 || self.checksum_offset == F2FS_CHECKSUM_OFFSET)
    }

    /// Compare the stored checksum with one computed over `raw`
    ///
    /// Superblocks without a checksum always pass.
    pub fn checksum_matches(&self, raw: &[u8]) -> bool {
        let stored = match self.checksum {
            Some(stored) => stored,
            None => return true,
        };
        let covered = usize::try_from(self.checksum_offset)
            .ok()
            .and_then(|end| raw.get(..end));
        match covered {
            Some(covered) => crc32_le(F2FS_MAGIC, covered) == stored,
            None => false,
        }
    }

    /// Block size in bytes
    pub fn block_size(&self) -> Option<u32> {
        1u32.checked_shl(self.log_blocksize)
    }

    /// Build the volume description for a partition of the given length
    pub fn describe(&self, partition_length: u64) -> Option<VolumeDescriptor> {
        let block_size = self.block_size()?;
        trace!("f2fs: {} blocks of {} bytes", self.block_count, block_size);

        VolumeDescriptor::builder(FileSystemType::F2fs)
            .variant(format!("{}.{}", self.major_ver, self.minor_ver))
            .geometry(block_size, self.block_count)
            .volume_name(utf16le_label(&self.volume_name))
            .volume_serial(guid_serial(&self.uuid))
            .build(partition_length)
    }
}

/// Probe for F2FS
#[derive(Debug, Clone, Copy, Default)]
pub struct F2fsFileSystem;

impl F2fsFileSystem {
    /// Read and validate the first usable superblock copy
    pub fn probe(&self, ctx: &ProbeContext<'_>) -> Result<ProbeResult<F2fsSuperblock>> {
        for offset in F2FS_SUPERBLOCK_OFFSETS {
            if let Some(sb) = self.read_copy(ctx, offset)? {
                return Ok(ProbeResult::Recognized(sb));
            }
        }
        Ok(ProbeResult::NotRecognized)
    }

    fn read_copy(&self, ctx: &ProbeContext<'_>, offset: u64) -> Result<Option<F2fsSuperblock>> {
        let raw = match ctx.read_at(offset, F2FS_SUPERBLOCK_SIZE)? {
            Some(raw) => raw,
            None => return Ok(None),
        };

        let superblock = match F2fsSuperblock::decode(&raw) {
            Some(sb) if sb.is_valid() => sb,
            _ => return Ok(None),
        };

        if ctx.verify_checksums() && !superblock.checksum_matches(&raw) {
            debug!("f2fs: superblock at {} fails checksum", offset);
            return Ok(None);
        }

        debug!(
            "f2fs: found version {}.{} superblock at {}",
            superblock.major_ver, superblock.minor_ver, offset
        );
        Ok(Some(superblock))
    }
}

impl FileSystem for F2fsFileSystem {
    fn kind(&self) -> FileSystemType {
        FileSystemType::F2fs
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

/// Btrfs filesystem probe
///
/// The primary superblock lives at 64 KiB and covers 4 KiB. The first 32
/// bytes hold a checksum of the rest, in whichever algorithm `csum_type`
/// names; only CRC32C is verified here.

use log::{debug, trace};

use crate::codec::{Fields, LittleEndian};
use crate::error::Result;
use crate::filesystem::{FileSystem, ProbeContext, ProbeResult};
use crate::text::{fixed_label, guid_serial};
use crate::volume::{exact_clusters, FileSystemType, VolumeDescriptor};

/// Byte offset of the primary superblock
pub const BTRFS_SUPERBLOCK_OFFSET: u64 = 0x10000;

/// Size of the superblock in bytes
pub const BTRFS_SUPERBLOCK_SIZE: usize = 0x1000;

/// Superblock magic
pub const BTRFS_MAGIC: [u8; 8] = *b"_BHRfS_M";

const CSUM_START: usize = 0x20;

/// Checksum algorithm used for metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumType {
    /// CRC32C
    Crc32c,
    /// xxHash64
    Xxhash64,
    /// SHA-256
    Sha256,
    /// BLAKE2b
    Blake2b,
    /// Unknown algorithm
    Unknown(u16),
}

impl From<u16> for ChecksumType {
    fn from(value: u16) -> Self {
        match value {
            0 => ChecksumType::Crc32c,
            1 => ChecksumType::Xxhash64,
            2 => ChecksumType::Sha256,
            3 => ChecksumType::Blake2b,
            other => ChecksumType::Unknown(other),
        }
    }
}

/// Decoded Btrfs superblock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BtrfsSuperblock {
    /// Checksum of bytes 0x20..0x1000
    pub csum: [u8; 32],
    /// Filesystem UUID
    pub fsid: [u8; 16],
    /// Physical address of this superblock
    pub bytenr: u64,
    /// Magic
    pub magic: [u8; 8],
    /// Transaction generation
    pub generation: u64,
    /// Size of the filesystem in bytes
    pub total_bytes: u64,
    /// Bytes allocated
    pub bytes_used: u64,
    /// Number of devices
    pub num_devices: u64,
    /// Sector size
    pub sectorsize: u32,
    /// Tree node size
    pub nodesize: u32,
    /// Incompatible features
    pub incompat_flags: u64,
    /// Checksum algorithm
    pub csum_type: u16,
    /// Volume label
    pub label: [u8; 256],
}

impl BtrfsSuperblock {
    /// Decode a superblock from its 4096 raw bytes
    pub fn decode(raw: &[u8]) -> Option<Self> {
        if raw.len() < BTRFS_SUPERBLOCK_SIZE {
            return None;
        }
        let f = Fields::<LittleEndian>::new(raw);

        Some(Self {
            csum: f.array(0x00)?,
            fsid: f.array(0x20)?,
            bytenr: f.u64(0x30)?,
            magic: f.array(0x40)?,
            generation: f.u64(0x48)?,
            total_bytes: f.u64(0x70)?,
            bytes_used: f.u64(0x78)?,
            num_devices: f.u64(0x88)?,
            sectorsize: f.u32(0x90)?,
            nodesize: f.u32(0x94)?,
            incompat_flags: f.u64(0xBC)?,
            csum_type: f.u16(0xC4)?,
            label: f.array(0x12B)?,
        })
    }

    /// Check the magic and that the superblock knows where it lives
    pub fn is_valid(&self) -> bool {
        self.magic == BTRFS_MAGIC && self.bytenr == BTRFS_SUPERBLOCK_OFFSET
    }

    /// Checksum algorithm
    pub fn checksum_type(&self) -> ChecksumType {
        ChecksumType::from(self.csum_type)
    }

    /// Compare the stored checksum with one computed over `raw`
    ///
    /// Only CRC32C is computed; other algorithms are accepted unchecked.
    pub fn checksum_matches(&self, raw: &[u8]) -> bool {
        if self.checksum_type() != ChecksumType::Crc32c {
            return true;
        }
        match raw.get(CSUM_START..BTRFS_SUPERBLOCK_SIZE) {
            Some(covered) => crc32c::crc32c(covered).to_le_bytes() == self.csum[..4],
            None => false,
        }
    }

    /// Build the volume description for a partition of the given length
    pub fn describe(&self, partition_length: u64) -> Option<VolumeDescriptor> {
        let sectorsize = u64::from(self.sectorsize);
        let clusters = exact_clusters(self.total_bytes, sectorsize)?;
        let free = self.total_bytes.saturating_sub(self.bytes_used) / sectorsize;
        trace!(
            "btrfs: {} bytes total, {} used, sector size {}",
            self.total_bytes,
            self.bytes_used,
            self.sectorsize
        );

        VolumeDescriptor::builder(FileSystemType::Btrfs)
            .geometry(self.sectorsize, clusters)
            .free_clusters(Some(free))
            .volume_name(fixed_label(&self.label))
            .volume_serial(guid_serial(&self.fsid))
            .build(partition_length)
    }
}

/// Probe for Btrfs
#[derive(Debug, Clone, Copy, Default)]
pub struct BtrfsFileSystem;

impl BtrfsFileSystem {
    /// Read and validate the primary superblock
    pub fn probe(&self, ctx: &ProbeContext<'_>) -> Result<ProbeResult<BtrfsSuperblock>> {
        let raw = match ctx.read_at(BTRFS_SUPERBLOCK_OFFSET, BTRFS_SUPERBLOCK_SIZE)? {
            Some(raw) => raw,
            None => return Ok(ProbeResult::NotRecognized),
        };

        let superblock = match BtrfsSuperblock::decode(&raw) {
            Some(sb) if sb.is_valid() => sb,
            _ => return Ok(ProbeResult::NotRecognized),
        };

        if ctx.verify_checksums() && !superblock.checksum_matches(&raw) {
            debug!("btrfs: superblock checksum mismatch");
            return Ok(ProbeResult::NotRecognized);
        }

        debug!(
            "btrfs: found superblock, generation {}, {:?} checksums",
            superblock.generation,
            superblock.checksum_type()
        );
        Ok(ProbeResult::Recognized(superblock))
    }
}

impl FileSystem for BtrfsFileSystem {
    fn kind(&self) -> FileSystemType {
        FileSystemType::Btrfs
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

/// XFS filesystem probe
///
/// The superblock is the first sector of allocation group 0, stored
/// big-endian. Version 5 superblocks carry a CRC32C over the whole sector,
/// which is the one field XFS stores little-endian.

use log::{debug, trace};

use crate::codec::{with_field_zeroed, BigEndian, Fields, LittleEndian};
use crate::error::Result;
use crate::filesystem::{FileSystem, ProbeContext, ProbeResult};
use crate::text::{fixed_label, guid_serial};
use crate::volume::{FileSystemType, VolumeDescriptor};

/// Superblock magic "XFSB"
pub const XFS_MAGIC: u32 = 0x5846_5342;

/// Smallest sector size, and the amount read before the real size is known
pub const XFS_MIN_SECTOR_SIZE: u16 = 512;

/// Largest sector size
pub const XFS_MAX_SECTOR_SIZE: u16 = 32_768;

/// Superblock version with metadata checksums
pub const XFS_SB_VERSION_5: u16 = 5;

const VERSION_NUM_MASK: u16 = 0x000F;
const CRC_OFFSET: usize = 0xE0;

/// Decoded XFS superblock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XfsSuperblock {
    /// Magic number
    pub magicnum: u32,
    /// Block size in bytes
    pub blocksize: u32,
    /// Data blocks
    pub dblocks: u64,
    /// Filesystem UUID
    pub uuid: [u8; 16],
    /// Blocks per allocation group
    pub agblocks: u32,
    /// Number of allocation groups
    pub agcount: u32,
    /// Version number and feature bits
    pub versionnum: u16,
    /// Sector size
    pub sectsize: u16,
    /// Volume label
    pub fname: [u8; 12],
    /// mkfs is still running
    pub inprogress: u8,
    /// Free data blocks
    pub fdblocks: u64,
    /// Superblock CRC (version 5 only)
    pub crc: u32,
}

impl XfsSuperblock {
    /// Decode the superblock from the first sector
    pub fn decode(raw: &[u8]) -> Option<Self> {
        if raw.len() < usize::from(XFS_MIN_SECTOR_SIZE) {
            return None;
        }
        let f = Fields::<BigEndian>::new(raw);

        Some(Self {
            magicnum: f.u32(0)?,
            blocksize: f.u32(4)?,
            dblocks: f.u64(8)?,
            uuid: f.array(32)?,
            agblocks: f.u32(84)?,
            agcount: f.u32(88)?,
            versionnum: f.u16(100)?,
            sectsize: f.u16(102)?,
            fname: f.array(108)?,
            inprogress: f.u8(126)?,
            fdblocks: f.u64(144)?,
            crc: Fields::<LittleEndian>::new(raw).u32(CRC_OFFSET)?,
        })
    }

    /// Superblock version, 1 to 5
    pub fn version(&self) -> u16 {
        self.versionnum & VERSION_NUM_MASK
    }

    /// Check the magic, version and sector size
    pub fn is_valid(&self) -> bool {
        self.magicnum == XFS_MAGIC
            && (1..=XFS_SB_VERSION_5).contains(&self.version())
            && self.sectsize.is_power_of_two()
            && (XFS_MIN_SECTOR_SIZE..=XFS_MAX_SECTOR_SIZE).contains(&self.sectsize)
    }

    /// Check whether the superblock carries a CRC
    pub fn has_crc(&self) -> bool {
        self.version() == XFS_SB_VERSION_5
    }

    /// Compare the stored CRC with one computed over `raw`
    ///
    /// `raw` must hold at least `sectsize` bytes. Pre-v5 superblocks always
    /// pass.
    pub fn checksum_matches(&self, raw: &[u8]) -> bool {
        if !self.has_crc() {
            return true;
        }
        match with_field_zeroed(raw, usize::from(self.sectsize), CRC_OFFSET, 4) {
            Some(covered) => crc32c::crc32c(&covered) == self.crc,
            None => false,
        }
    }

    /// Build the volume description for a partition of the given length
    pub fn describe(&self, partition_length: u64) -> Option<VolumeDescriptor> {
        trace!(
            "xfs: {} blocks of {} bytes in {} groups",
            self.dblocks,
            self.blocksize,
            self.agcount
        );

        VolumeDescriptor::builder(FileSystemType::Xfs)
            .variant(format!("v{}", self.version()))
            .geometry(self.blocksize, self.dblocks)
            .free_clusters(Some(self.fdblocks))
            .volume_name(fixed_label(&self.fname))
            .volume_serial(guid_serial(&self.uuid))
            .dirty(self.inprogress != 0)
            .build(partition_length)
    }
}

/// Probe for XFS
#[derive(Debug, Clone, Copy, Default)]
pub struct XfsFileSystem;

impl XfsFileSystem {
    /// Read and validate the superblock
    pub fn probe(&self, ctx: &ProbeContext<'_>) -> Result<ProbeResult<XfsSuperblock>> {
        let raw = match ctx.read_at(0, usize::from(XFS_MIN_SECTOR_SIZE))? {
            Some(raw) => raw,
            None => return Ok(ProbeResult::NotRecognized),
        };

        let superblock = match XfsSuperblock::decode(&raw) {
            Some(sb) if sb.is_valid() => sb,
            _ => return Ok(ProbeResult::NotRecognized),
        };

        if ctx.verify_checksums() && superblock.has_crc() {
            // The CRC covers the whole sector, which may exceed the first read
            let sector = match ctx.read_at(0, usize::from(superblock.sectsize))? {
                Some(sector) => sector,
                None => return Ok(ProbeResult::NotRecognized),
            };
            if !superblock.checksum_matches(&sector) {
                debug!("xfs: superblock CRC mismatch (stored {:08x})", superblock.crc);
                return Ok(ProbeResult::NotRecognized);
            }
        }

        debug!("xfs: found version {} superblock", superblock.version());
        Ok(ProbeResult::Recognized(superblock))
    }
}

impl FileSystem for XfsFileSystem {
    fn kind(&self) -> FileSystemType {
        FileSystemType::Xfs
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

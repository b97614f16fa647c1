/// Sector sources that probes read from

/// Builder for creating in-memory images
pub mod builder;
/// Sparse in-memory image
pub mod memory;
/// Partition bounds within a sector source
pub mod partition;

pub use builder::MemoryImageBuilder;
pub use memory::MemoryImage;
pub use partition::Partition;

use crate::error::{FsError, Result};

/// Read-only, random-access source of fixed-size sectors
///
/// Implementations must be safe to share between threads so that several
/// partitions of the same medium can be probed at once. There is deliberately
/// no way to write through this trait.
pub trait SectorSource: Send + Sync {
    /// Size of one sector in bytes
    fn sector_size(&self) -> u32;

    /// Total number of sectors in the source
    fn sector_count(&self) -> u64;

    /// Read `count` sectors starting at `address`
    ///
    /// Fails with [`FsError::OutOfRange`] when any part of the range lies
    /// outside the source.
    fn read_sectors(&self, address: u64, count: u64) -> Result<Vec<u8>>;

    /// Total size of the source in bytes
    fn total_size(&self) -> u64 {
        self.sector_count()
            .saturating_mul(u64::from(self.sector_size()))
    }

    /// Read the sectors named by a block address
    ///
    /// The address's block size must match the source's sector size.
    fn read(&self, address: BlockAddress, count: u64) -> Result<Vec<u8>> {
        if address.block_size != self.sector_size() {
            return Err(FsError::InvalidSectorSize(address.block_size));
        }
        self.read_sectors(address.block, count)
    }
}

/// Check that a range of sectors fits within a source of `sectors` sectors
pub(crate) fn check_range(address: u64, count: u64, sectors: u64) -> Result<()> {
    match address.checked_add(count) {
        Some(end) if end <= sectors => Ok(()),
        _ => Err(FsError::out_of_range(address, count, sectors)),
    }
}

/// Check that a sector size is a usable power of two
pub(crate) fn check_sector_size(sector_size: u32) -> Result<()> {
    if sector_size == 0 || !sector_size.is_power_of_two() {
        return Err(FsError::InvalidSectorSize(sector_size));
    }
    Ok(())
}

/// Zero-based logical block paired with the block size it is counted in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockAddress {
    /// Logical block index
    pub block: u64,
    /// Size of one block in bytes
    pub block_size: u32,
}

impl BlockAddress {
    /// Create a new block address
    pub fn new(block: u64, block_size: u32) -> Self {
        Self { block, block_size }
    }

    /// Byte offset of the start of this block, if it fits in a u64
    pub fn byte_offset(&self) -> Option<u64> {
        self.block.checked_mul(u64::from(self.block_size))
    }

    /// Address of the block containing `offset` and the offset within it
    pub fn containing(offset: u64, block_size: u32) -> Option<(Self, usize)> {
        let size = u64::from(block_size);
        if size == 0 {
            return None;
        }
        Some((Self::new(offset / size, block_size), (offset % size) as usize))
    }
}

impl std::fmt::Display for BlockAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "block {} ({} bytes)", self.block, self.block_size)
    }
}

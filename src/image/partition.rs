/// Partition bounds within a sector source

use crate::error::{FsError, Result};
use crate::image::SectorSource;

/// Inclusive range of sectors occupied by one filesystem instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Partition {
    /// First sector of the partition
    pub start: u64,
    /// Last sector of the partition (inclusive)
    pub end: u64,
    /// Sector size in bytes
    pub sector_size: u32,
}

impl Partition {
    /// Create a partition from inclusive sector bounds
    pub fn new(start: u64, end: u64, sector_size: u32) -> Self {
        Self {
            start,
            end,
            sector_size,
        }
    }

    /// Partition covering an entire sector source
    pub fn whole(source: &dyn SectorSource) -> Self {
        Self::new(
            0,
            source.sector_count().saturating_sub(1),
            source.sector_size(),
        )
    }

    /// Partition with the given bounds, checked against a sector source
    pub fn within(source: &dyn SectorSource, start: u64, end: u64) -> Result<Self> {
        let sectors = source.sector_count();
        if start > end || end >= sectors {
            return Err(FsError::InvalidPartition {
                start,
                end,
                sectors,
            });
        }
        Ok(Self::new(start, end, source.sector_size()))
    }

    /// Number of sectors in the partition
    pub fn sector_count(&self) -> u64 {
        if self.end < self.start {
            0
        } else {
            self.end - self.start + 1
        }
    }

    /// Length of the partition in bytes
    pub fn length_bytes(&self) -> u64 {
        self.sector_count()
            .saturating_mul(u64::from(self.sector_size))
    }

    /// Check whether a byte range relative to the partition start fits inside it
    pub fn contains_range(&self, offset: u64, len: u64) -> bool {
        offset
            .checked_add(len)
            .map(|end| end <= self.length_bytes())
            .unwrap_or(false)
    }
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "sectors {}..={} ({} bytes each)",
            self.start, self.end, self.sector_size
        )
    }
}

/// Builder for creating in-memory images

use std::collections::BTreeMap;

use crate::error::Result;
use crate::image::{check_sector_size, MemoryImage};

/// Builder for constructing sparse in-memory images
pub struct MemoryImageBuilder {
    sector_size: u32,
    sector_count: u64,
    filler_byte: u8,
}

impl MemoryImageBuilder {
    /// Create a new builder with default values (2880 sectors of 512 bytes)
    pub fn new() -> Self {
        Self {
            sector_size: 512,
            sector_count: 2880,
            filler_byte: 0x00,
        }
    }

    /// Set the sector size
    pub fn sector_size(mut self, sector_size: u32) -> Self {
        self.sector_size = sector_size;
        self
    }

    /// Set the number of sectors
    pub fn sector_count(mut self, sector_count: u64) -> Self {
        self.sector_count = sector_count;
        self
    }

    /// Set the size of the image in bytes, rounded up to whole sectors
    pub fn size_bytes(mut self, size: u64) -> Self {
        let sector_size = u64::from(self.sector_size.max(1));
        self.sector_count = size.div_ceil(sector_size);
        self
    }

    /// Set the byte returned for sectors that were never written
    pub fn filler_byte(mut self, filler_byte: u8) -> Self {
        self.filler_byte = filler_byte;
        self
    }

    /// Build the image with the specified configuration
    pub fn build(self) -> Result<MemoryImage> {
        check_sector_size(self.sector_size)?;

        Ok(MemoryImage {
            sector_size: self.sector_size,
            sector_count: self.sector_count,
            filler_byte: self.filler_byte,
            sectors: BTreeMap::new(),
        })
    }
}

impl Default for MemoryImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::SectorSource;

    #[test]
    fn test_builder_default() {
        let image = MemoryImageBuilder::new().build().unwrap();

        assert_eq!(image.sector_size(), 512);
        assert_eq!(image.sector_count(), 2880);
        assert_eq!(image.filler_byte(), 0);
    }

    #[test]
    fn test_builder_custom() {
        let image = MemoryImageBuilder::new()
            .sector_size(4096)
            .sector_count(100)
            .filler_byte(0xFF)
            .build()
            .unwrap();

        assert_eq!(image.sector_size(), 4096);
        assert_eq!(image.sector_count(), 100);
        assert_eq!(image.total_size(), 409_600);
    }

    #[test]
    fn test_builder_size_bytes() {
        let image = MemoryImageBuilder::new()
            .sector_size(512)
            .size_bytes(1000)
            .build()
            .unwrap();

        assert_eq!(image.sector_count(), 2);
    }

    #[test]
    fn test_builder_rejects_bad_sector_size() {
        assert!(MemoryImageBuilder::new().sector_size(0).build().is_err());
        assert!(MemoryImageBuilder::new().sector_size(1000).build().is_err());
    }
}

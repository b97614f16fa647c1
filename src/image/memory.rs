/// Sparse in-memory sector source
///
/// Only sectors that have been written are stored; every other sector reads
/// back as the filler byte. This keeps large reference geometries (hundreds of
/// megabytes) cheap to construct when only a few metadata sectors matter.

use std::collections::BTreeMap;

use crate::error::{FsError, Result};
use crate::image::{check_range, check_sector_size, MemoryImageBuilder, SectorSource};

/// In-memory image made of fixed-size sectors
#[derive(Debug, Clone)]
pub struct MemoryImage {
    /// Sector size in bytes
    pub(crate) sector_size: u32,
    /// Number of sectors in the image
    pub(crate) sector_count: u64,
    /// Byte returned for sectors that were never written
    pub(crate) filler_byte: u8,
    /// Written sectors keyed by sector index
    pub(crate) sectors: BTreeMap<u64, Vec<u8>>,
}

impl MemoryImage {
    /// Create an empty, zero-filled image
    pub fn new(sector_size: u32, sector_count: u64) -> Result<Self> {
        MemoryImageBuilder::new()
            .sector_size(sector_size)
            .sector_count(sector_count)
            .build()
    }

    /// Create a new builder for constructing images
    pub fn builder() -> MemoryImageBuilder {
        MemoryImageBuilder::new()
    }

    /// Create an image holding a copy of `data`
    ///
    /// The final sector is padded with zeroes if `data` is not a whole
    /// number of sectors.
    pub fn from_bytes(sector_size: u32, data: &[u8]) -> Result<Self> {
        check_sector_size(sector_size)?;
        let sector_count = (data.len() as u64).div_ceil(u64::from(sector_size));
        let mut image = Self::new(sector_size, sector_count)?;
        image.write_bytes(0, data)?;
        Ok(image)
    }

    /// Number of sectors actually stored
    pub fn stored_sectors(&self) -> usize {
        self.sectors.len()
    }

    /// Get the filler byte used for unwritten sectors
    pub fn filler_byte(&self) -> u8 {
        self.filler_byte
    }

    /// Write a whole sector
    ///
    /// Shorter data is padded with the filler byte; longer data is truncated.
    pub fn write_sector(&mut self, address: u64, data: &[u8]) -> Result<()> {
        check_range(address, 1, self.sector_count)?;

        let size = self.sector_size as usize;
        let mut sector = vec![self.filler_byte; size];
        let len = data.len().min(size);
        sector[..len].copy_from_slice(&data[..len]);
        self.sectors.insert(address, sector);
        Ok(())
    }

    /// Write bytes at an absolute byte offset, spanning sectors as needed
    pub fn write_bytes(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }

        let size = u64::from(self.sector_size);
        let first = offset / size;
        let last = offset
            .checked_add(data.len() as u64 - 1)
            .ok_or_else(|| FsError::out_of_range(first, u64::MAX, self.sector_count))?
            / size;
        check_range(first, last - first + 1, self.sector_count)?;

        let mut written = 0usize;
        for address in first..=last {
            let filler = self.filler_byte;
            let sector = self
                .sectors
                .entry(address)
                .or_insert_with(|| vec![filler; size as usize]);

            let start = if address == first {
                (offset % size) as usize
            } else {
                0
            };
            let len = (size as usize - start).min(data.len() - written);
            sector[start..start + len].copy_from_slice(&data[written..written + len]);
            written += len;
        }

        Ok(())
    }

    /// Forget the contents of a sector so it reads back as filler
    pub fn clear_sector(&mut self, address: u64) {
        self.sectors.remove(&address);
    }
}

impl SectorSource for MemoryImage {
    fn sector_size(&self) -> u32 {
        self.sector_size
    }

    fn sector_count(&self) -> u64 {
        self.sector_count
    }

    fn read_sectors(&self, address: u64, count: u64) -> Result<Vec<u8>> {
        check_range(address, count, self.sector_count)?;

        let size = self.sector_size as usize;
        let mut data = Vec::with_capacity(size * count as usize);
        for sector in address..address + count {
            match self.sectors.get(&sector) {
                Some(stored) => data.extend_from_slice(stored),
                None => data.resize(data.len() + size, self.filler_byte),
            }
        }

        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FsError;

    #[test]
    fn test_unwritten_sectors_read_as_filler() {
        let image = MemoryImage::builder()
            .sector_size(512)
            .sector_count(4)
            .filler_byte(0xE5)
            .build()
            .unwrap();

        let data = image.read_sectors(1, 2).unwrap();
        assert_eq!(data.len(), 1024);
        assert!(data.iter().all(|&b| b == 0xE5));
        assert_eq!(image.stored_sectors(), 0);
    }

    #[test]
    fn test_write_bytes_spanning_sectors() {
        let mut image = MemoryImage::new(512, 8).unwrap();
        let pattern: Vec<u8> = (0..=255u8).cycle().take(700).collect();
        image.write_bytes(400, &pattern).unwrap();

        let data = image.read_sectors(0, 3).unwrap();
        assert_eq!(&data[400..1100], pattern.as_slice());
        assert_eq!(data[399], 0);
        assert_eq!(data[1100], 0);
        assert_eq!(image.stored_sectors(), 3);
    }

    #[test]
    fn test_read_out_of_range() {
        let image = MemoryImage::new(512, 8).unwrap();
        let result = image.read_sectors(6, 4);
        assert!(matches!(result, Err(FsError::OutOfRange { .. })));
    }

    #[test]
    fn test_write_out_of_range() {
        let mut image = MemoryImage::new(512, 2).unwrap();
        assert!(image.write_bytes(1000, &[1; 100]).is_err());
        assert!(image.write_sector(2, &[1]).is_err());
    }

    #[test]
    fn test_from_bytes_pads_last_sector() {
        let image = MemoryImage::from_bytes(512, &[0xAA; 600]).unwrap();
        assert_eq!(image.sector_count(), 2);

        let data = image.read_sectors(1, 1).unwrap();
        assert!(data[..88].iter().all(|&b| b == 0xAA));
        assert!(data[88..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_clear_sector() {
        let mut image = MemoryImage::new(512, 2).unwrap();
        image.write_sector(1, &[7; 512]).unwrap();
        image.clear_sector(1);
        assert!(image.read_sectors(1, 1).unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_total_size() {
        let image = MemoryImage::new(4096, 32_768).unwrap();
        assert_eq!(image.total_size(), 134_217_728);
    }
}

/// Filesystem probes

pub mod btrfs;
pub mod ext;
pub mod f2fs;
pub mod nilfs2;
pub mod refs;
pub mod xfs;

pub use btrfs::{BtrfsFileSystem, BtrfsSuperblock};
pub use ext::{ExtFileSystem, ExtSuperblock};
pub use f2fs::{F2fsFileSystem, F2fsSuperblock};
pub use nilfs2::{Nilfs2FileSystem, Nilfs2Superblock};
pub use refs::{RefsFileSystem, RefsVolumeHeader};
pub use xfs::{XfsFileSystem, XfsSuperblock};

use log::trace;

use crate::error::{FsError, Result};
use crate::image::{BlockAddress, Partition, SectorSource};
use crate::volume::{FileSystemType, VolumeDescriptor};

/// Outcome of probing a partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult<T> {
    /// The data does not belong to this format
    NotRecognized,
    /// The format matched
    Recognized(T),
    /// More than one interpretation matched
    Ambiguous(String),
}

impl<T> ProbeResult<T> {
    /// Check if the probe matched
    pub fn is_recognized(&self) -> bool {
        matches!(self, ProbeResult::Recognized(_))
    }

    /// Get the matched value, if any
    pub fn recognized(self) -> Option<T> {
        match self {
            ProbeResult::Recognized(value) => Some(value),
            _ => None,
        }
    }

    /// Map the matched value
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> ProbeResult<U> {
        match self {
            ProbeResult::NotRecognized => ProbeResult::NotRecognized,
            ProbeResult::Recognized(value) => ProbeResult::Recognized(f(value)),
            ProbeResult::Ambiguous(diagnostic) => ProbeResult::Ambiguous(diagnostic),
        }
    }
}

impl<T> From<Option<T>> for ProbeResult<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => ProbeResult::Recognized(value),
            None => ProbeResult::NotRecognized,
        }
    }
}

/// Options shared by all probes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOptions {
    /// Reject superblocks whose stored checksum does not match
    pub verify_checksums: bool,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            verify_checksums: true,
        }
    }
}

/// Everything a probe needs to look at one partition
#[derive(Clone, Copy)]
pub struct ProbeContext<'a> {
    source: &'a dyn SectorSource,
    partition: Partition,
    options: ProbeOptions,
}

impl<'a> ProbeContext<'a> {
    /// Create a context with default options
    pub fn new(source: &'a dyn SectorSource, partition: Partition) -> Self {
        Self::with_options(source, partition, ProbeOptions::default())
    }

    /// Create a context with explicit options
    pub fn with_options(
        source: &'a dyn SectorSource,
        partition: Partition,
        options: ProbeOptions,
    ) -> Self {
        Self {
            source,
            partition,
            options,
        }
    }

    /// The partition being probed
    pub fn partition(&self) -> Partition {
        self.partition
    }

    /// Length of the partition in bytes
    pub fn partition_length(&self) -> u64 {
        self.partition.length_bytes()
    }

    /// The options in effect
    pub fn options(&self) -> ProbeOptions {
        self.options
    }

    /// Whether checksums should be compared
    pub fn verify_checksums(&self) -> bool {
        self.options.verify_checksums
    }

    /// Read `len` bytes at `offset` from the start of the partition
    ///
    /// Returns `Ok(None)` when the range does not fit inside the partition,
    /// which probes treat as "not this format". Faults from the sector
    /// source are returned as errors.
    pub fn read_at(&self, offset: u64, len: usize) -> Result<Option<Vec<u8>>> {
        if len == 0 || !self.partition.contains_range(offset, len as u64) {
            trace!(
                "read of {} bytes at {} falls outside {}",
                len,
                offset,
                self.partition
            );
            return Ok(None);
        }

        let sector_size = self.partition.sector_size;
        let (first, skip) = BlockAddress::containing(offset, sector_size)
            .ok_or(FsError::InvalidSectorSize(sector_size))?;
        let last = (offset + len as u64 - 1) / u64::from(sector_size);
        let address = BlockAddress::new(self.partition.start + first.block, sector_size);

        // The source rejects an address whose block size differs from its own
        let data = self.source.read(address, last - first.block + 1)?;

        Ok(data.get(skip..skip + len).map(|bytes| bytes.to_vec()))
    }
}

/// A filesystem format that can be recognised on a partition
///
/// Implementations are stateless; the same value may be used concurrently
/// for many partitions.
pub trait FileSystem: Send + Sync {
    /// Which format this probe recognises
    fn kind(&self) -> FileSystemType;

    /// Check whether the partition holds this format
    ///
    /// Only reads the handful of sectors needed for the magic and checksum
    /// checks.
    fn identify(&self, ctx: &ProbeContext<'_>) -> Result<bool>;

    /// Identify the partition and describe the volume
    ///
    /// Returns `Ok(None)` when the format does not match or its geometry is
    /// implausible for the partition.
    fn information(&self, ctx: &ProbeContext<'_>) -> Result<Option<VolumeDescriptor>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::image::MemoryImage;

    #[test]
    fn test_probe_result_helpers() {
        let hit: ProbeResult<u32> = Some(7).into();
        assert!(hit.is_recognized());
        assert_eq!(hit.clone().map(|v| v * 2), ProbeResult::Recognized(14));
        assert_eq!(hit.recognized(), Some(7));

        let miss: ProbeResult<u32> = None.into();
        assert_eq!(miss, ProbeResult::NotRecognized);

        let ambiguous: ProbeResult<u32> = ProbeResult::Ambiguous("two".to_string());
        assert!(!ambiguous.is_recognized());
        assert_eq!(ambiguous.recognized(), None);
    }

    #[test]
    fn test_read_at_is_relative_to_partition() {
        let mut image = MemoryImage::new(512, 64).unwrap();
        image.write_bytes(16 * 512 + 1030, b"MAGIC").unwrap();

        let partition = Partition::new(16, 63, 512);
        let ctx = ProbeContext::new(&image, partition);

        let data = ctx.read_at(1030, 5).unwrap().unwrap();
        assert_eq!(data, b"MAGIC");
    }

    #[test]
    fn test_read_at_outside_partition() {
        let image = MemoryImage::new(512, 64).unwrap();
        let ctx = ProbeContext::new(&image, Partition::new(60, 63, 512));

        assert!(ctx.read_at(1024, 1024).unwrap().is_some());
        assert!(ctx.read_at(1024, 1025).unwrap().is_none());
        assert!(ctx.read_at(u64::MAX - 1, 4).unwrap().is_none());
        assert!(ctx.read_at(0, 0).unwrap().is_none());
    }

    #[test]
    fn test_read_at_propagates_source_faults() {
        // Partition claims more sectors than the image holds
        let image = MemoryImage::new(512, 4).unwrap();
        let ctx = ProbeContext::new(&image, Partition::new(0, 99, 512));

        assert!(ctx.read_at(4096, 512).is_err());
    }

    #[test]
    fn test_read_at_large_sectors() {
        let mut image = MemoryImage::new(4096, 32).unwrap();
        image.write_bytes(1024, &[0x53, 0xEF]).unwrap();

        let ctx = ProbeContext::new(&image, Partition::whole(&image));
        assert_eq!(ctx.read_at(1024, 2).unwrap().unwrap(), vec![0x53, 0xEF]);
    }

    #[test]
    fn test_read_at_rejects_mismatched_sector_size() {
        let image = MemoryImage::new(512, 64).unwrap();
        let ctx = ProbeContext::new(&image, Partition::new(0, 7, 4096));

        assert!(matches!(
            ctx.read_at(0, 512),
            Err(FsError::InvalidSectorSize(4096))
        ));
    }

    /// Source that records the block addresses it is asked for
    struct RecordingSource {
        inner: MemoryImage,
        reads: Mutex<Vec<(BlockAddress, u64)>>,
    }

    impl SectorSource for RecordingSource {
        fn sector_size(&self) -> u32 {
            self.inner.sector_size()
        }

        fn sector_count(&self) -> u64 {
            self.inner.sector_count()
        }

        fn read_sectors(&self, address: u64, count: u64) -> Result<Vec<u8>> {
            self.inner.read_sectors(address, count)
        }

        fn read(&self, address: BlockAddress, count: u64) -> Result<Vec<u8>> {
            self.reads.lock().unwrap().push((address, count));
            self.inner.read(address, count)
        }
    }

    #[test]
    fn test_read_at_reads_by_block_address() {
        let mut inner = MemoryImage::new(512, 64).unwrap();
        inner.write_bytes(16 * 512 + 1020, b"SPLIT").unwrap();
        let source = RecordingSource {
            inner,
            reads: Mutex::new(Vec::new()),
        };
        let ctx = ProbeContext::new(&source, Partition::new(16, 63, 512));

        assert_eq!(ctx.read_at(1020, 5).unwrap().unwrap(), b"SPLIT");
        let reads = source.reads.lock().unwrap();
        assert_eq!(reads.as_slice(), &[(BlockAddress::new(17, 512), 2)]);
    }

    #[test]
    fn test_default_options_verify_checksums() {
        assert!(ProbeOptions::default().verify_checksums);
    }
}

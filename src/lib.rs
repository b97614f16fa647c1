/*!
# fsident

A Rust library for identifying filesystems on disk partitions and reading
their basic volume metadata.

## Features

- Probes for Btrfs, ext2/3/4, F2FS, NILFS2, ReFS and XFS
- Superblock checksum verification, with a lenient mode for damaged media
- Normalised volume description: cluster geometry, label, serial, timestamps
- Read-only sector sources: sparse in-memory images and raw image files
- First-match detection plus an exhaustive survey that reports ambiguity

## Quick Start

```rust,no_run
use fsident::{get_information, identify, RawImage, SectorSource};

let image = RawImage::open("disk.img")?;
let last = image.sector_count() - 1;

if identify(&image, 2048, last)? {
    if let Some(volume) = get_information(&image, 2048, last)? {
        println!("{}", volume);
    }
}
# Ok::<(), fsident::FsError>(())
```

## Modules

- `image`: Sector sources and partition bounds
- `io`: Raw image files on disk
- `filesystem`: Per-format probes and the `FileSystem` trait
- `registry`: Ordered probe dispatch
- `volume`: Volume descriptors
- `error`: Error types and Result alias
*/

#![warn(missing_docs)]

/// Bounds-checked field access and checksums
pub mod codec;
/// Error types and Result alias
pub mod error;
/// Filesystem probes
pub mod filesystem;
/// Sector sources and partition bounds
pub mod image;
/// I/O for raw image files
pub mod io;
/// Ordered probe dispatch
pub mod registry;
/// Label and serial decoding
pub mod text;
/// Volume descriptors
pub mod volume;

// Re-export common types
pub use error::{FsError, Result};
pub use filesystem::{
    BtrfsFileSystem, ExtFileSystem, F2fsFileSystem, FileSystem, Nilfs2FileSystem, ProbeContext,
    ProbeOptions, ProbeResult, RefsFileSystem, XfsFileSystem,
};
pub use image::{BlockAddress, MemoryImage, MemoryImageBuilder, Partition, SectorSource};
pub use io::{is_raw_image, RawImage};
pub use registry::{Detection, Registry, RegistryBuilder};
pub use volume::{FileSystemType, VolumeDescriptor, VolumeDescriptorBuilder};

/// Check whether sectors `start..=end` of `source` hold a known filesystem
///
/// Fails when the bounds do not fit the source or the source cannot be
/// read; an unrecognised partition is `Ok(false)`.
pub fn identify(source: &dyn SectorSource, start: u64, end: u64) -> Result<bool> {
    let partition = Partition::within(source, start, end)?;
    Ok(Registry::new().identify(source, partition)?.is_some())
}

/// Describe the filesystem in sectors `start..=end` of `source`
pub fn get_information(
    source: &dyn SectorSource,
    start: u64,
    end: u64,
) -> Result<Option<VolumeDescriptor>> {
    let partition = Partition::within(source, start, end)?;
    Registry::new().get_information(source, partition)
}

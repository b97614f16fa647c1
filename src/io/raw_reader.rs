/// Raw image reader
///
/// Raw images are flat sector dumps of a disk or partition with no container
/// header:
/// - `.img`, `.raw`, `.bin`, `.dd` files from dd or similar tools
/// - Sector size is not recorded, so it defaults to 512 bytes
/// - A trailing partial sector is ignored

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Mutex;

use log::{debug, trace};

use crate::error::{FsError, Result};
use crate::image::{check_range, check_sector_size, SectorSource};

/// Default sector size for raw images
pub const RAW_SECTOR_SIZE: u32 = 512;

/// File extensions commonly used for raw images
pub const RAW_EXTENSIONS: &[&str] = &["img", "raw", "bin", "dd", "ima"];

/// Check if a file is likely a raw image based on extension
pub fn is_raw_image<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| RAW_EXTENSIONS.iter().any(|ext| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Flat image file used as a sector source
///
/// The file handle is shared behind a mutex so that one image can be probed
/// from several threads; each read seeks and reads under the lock.
#[derive(Debug)]
pub struct RawImage {
    file: Mutex<File>,
    sector_size: u32,
    sector_count: u64,
    filename: Option<String>,
}

impl RawImage {
    /// Open a raw image with 512-byte sectors
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_sector_size(path, RAW_SECTOR_SIZE)
    }

    /// Open a raw image with the given sector size
    pub fn with_sector_size<P: AsRef<Path>>(path: P, sector_size: u32) -> Result<Self> {
        check_sector_size(sector_size)?;

        let filename = path
            .as_ref()
            .file_name()
            .and_then(|n| n.to_str())
            .map(|s| s.to_string());

        let file = File::open(&path)?;
        let length = file.metadata()?.len();
        let sector_count = length / u64::from(sector_size);

        debug!(
            "opened raw image {:?}: {} bytes, {} sectors of {} bytes",
            filename, length, sector_count, sector_size
        );

        Ok(Self {
            file: Mutex::new(file),
            sector_size,
            sector_count,
            filename,
        })
    }

    /// Get the file name the image was opened from
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }
}

impl SectorSource for RawImage {
    fn sector_size(&self) -> u32 {
        self.sector_size
    }

    fn sector_count(&self) -> u64 {
        self.sector_count
    }

    fn read_sectors(&self, address: u64, count: u64) -> Result<Vec<u8>> {
        check_range(address, count, self.sector_count)?;
        trace!("raw image read: {} sectors at {}", count, address);

        let size = u64::from(self.sector_size);
        let mut data = vec![0u8; (count * size) as usize];

        let mut file = self
            .file
            .lock()
            .map_err(|_| FsError::medium("image file lock poisoned"))?;
        file.seek(SeekFrom::Start(address * size))?;
        file.read_exact(&mut data)?;

        Ok(data)
    }
}

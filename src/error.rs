use thiserror::Error;

/// Result type alias for identification operations
pub type Result<T> = std::result::Result<T, FsError>;

/// Faults that abort identification of a partition
///
/// A filesystem that simply isn't the one a probe looks for is never an
/// error; probes report that as `NotRecognized`. Only problems with the
/// sector source or the caller's partition bounds end up here.
#[derive(Debug, Error)]
pub enum FsError {
    /// I/O error occurred while reading the medium
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Read extends past the end of the sector source
    #[error("Read of {count} sectors at {address} is out of range (sectors: {sectors})")]
    OutOfRange {
        /// First sector requested
        address: u64,
        /// Number of sectors requested
        count: u64,
        /// Number of sectors in the source
        sectors: u64,
    },

    /// Partition bounds do not fit the sector source
    #[error("Invalid partition {start}..={end} (sectors: {sectors})")]
    InvalidPartition {
        /// First sector of the partition
        start: u64,
        /// Last sector of the partition
        end: u64,
        /// Number of sectors in the source
        sectors: u64,
    },

    /// Sector size is zero or not a power of two
    #[error("Invalid sector size: {0}")]
    InvalidSectorSize(u32),

    /// Any other fault reported by the medium
    #[error("Medium error: {0}")]
    Medium(String),
}

impl FsError {
    /// Create an out of range error
    pub fn out_of_range(address: u64, count: u64, sectors: u64) -> Self {
        FsError::OutOfRange {
            address,
            count,
            sectors,
        }
    }

    /// Create a medium error
    pub fn medium<S: Into<String>>(message: S) -> Self {
        FsError::Medium(message.into())
    }
}

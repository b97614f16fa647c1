/// Normalised description of an identified volume

use chrono::{DateTime, Utc};
use log::debug;

/// Filesystem formats the crate can identify
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileSystemType {
    /// Btrfs (B-tree filesystem)
    Btrfs,
    /// ext2, ext3 or ext4 (extended filesystem)
    Ext,
    /// F2FS (flash-friendly, log-structured)
    F2fs,
    /// NILFS2 (log-structured)
    Nilfs2,
    /// ReFS (resilient filesystem)
    Refs,
    /// XFS
    Xfs,
}

impl FileSystemType {
    /// All supported formats, in default probing order
    pub const ALL: [FileSystemType; 6] = [
        FileSystemType::Btrfs,
        FileSystemType::Xfs,
        FileSystemType::Refs,
        FileSystemType::F2fs,
        FileSystemType::Nilfs2,
        FileSystemType::Ext,
    ];

    /// Short name as used by mount tools
    pub fn name(&self) -> &'static str {
        match self {
            FileSystemType::Btrfs => "btrfs",
            FileSystemType::Ext => "ext",
            FileSystemType::F2fs => "f2fs",
            FileSystemType::Nilfs2 => "nilfs2",
            FileSystemType::Refs => "refs",
            FileSystemType::Xfs => "xfs",
        }
    }

    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            FileSystemType::Btrfs => "B-tree file system",
            FileSystemType::Ext => "Linux extended file system",
            FileSystemType::F2fs => "Flash-Friendly File System",
            FileSystemType::Nilfs2 => "New Implementation of a Log-structured File System",
            FileSystemType::Refs => "Resilient File System",
            FileSystemType::Xfs => "XFS file system",
        }
    }
}

impl std::fmt::Display for FileSystemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Geometry and identity of a volume
///
/// Built fresh for every successful identification and never modified
/// afterwards. `cluster_size * clusters` never exceeds the length of the
/// partition it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeDescriptor {
    /// Which format matched
    pub kind: FileSystemType,
    /// Format variant or revision (e.g. "ext4", "v5")
    pub variant: Option<String>,
    /// Allocation unit size in bytes (power of two)
    pub cluster_size: u32,
    /// Number of allocation units
    pub clusters: u64,
    /// Free allocation units, when the superblock records them
    pub free_clusters: Option<u64>,
    /// Volume label
    pub volume_name: Option<String>,
    /// Volume serial in the format's conventional rendering
    pub volume_serial: Option<String>,
    /// When the volume was created
    pub created: Option<DateTime<Utc>>,
    /// When the volume was last written
    pub modified: Option<DateTime<Utc>>,
    /// Volume was not cleanly unmounted
    pub dirty: bool,
}

impl VolumeDescriptor {
    /// Create a new builder for a descriptor of the given format
    pub fn builder(kind: FileSystemType) -> VolumeDescriptorBuilder {
        VolumeDescriptorBuilder::new(kind)
    }

    /// Total size covered by the clusters in bytes
    pub fn size_bytes(&self) -> u64 {
        u64::from(self.cluster_size) * self.clusters
    }
}

impl std::fmt::Display for VolumeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.kind.description())?;
        if let Some(variant) = &self.variant {
            writeln!(f, "  Variant: {}", variant)?;
        }
        writeln!(
            f,
            "  Clusters: {} of {} bytes ({} KB)",
            self.clusters,
            self.cluster_size,
            self.size_bytes() / 1024
        )?;
        if let Some(free) = self.free_clusters {
            writeln!(f, "  Free clusters: {}", free)?;
        }
        if let Some(name) = &self.volume_name {
            writeln!(f, "  Volume name: {}", name)?;
        }
        if let Some(serial) = &self.volume_serial {
            writeln!(f, "  Volume serial: {}", serial)?;
        }
        if let Some(created) = &self.created {
            writeln!(f, "  Created: {}", created.format("%Y-%m-%d %H:%M:%S"))?;
        }
        if let Some(modified) = &self.modified {
            writeln!(f, "  Modified: {}", modified.format("%Y-%m-%d %H:%M:%S"))?;
        }
        if self.dirty {
            writeln!(f, "  Volume is dirty")?;
        }
        Ok(())
    }
}

/// Builder that validates geometry before producing a [`VolumeDescriptor`]
#[derive(Debug, Clone)]
pub struct VolumeDescriptorBuilder {
    descriptor: VolumeDescriptor,
}

impl VolumeDescriptorBuilder {
    /// Create a new builder with empty geometry
    pub fn new(kind: FileSystemType) -> Self {
        Self {
            descriptor: VolumeDescriptor {
                kind,
                variant: None,
                cluster_size: 0,
                clusters: 0,
                free_clusters: None,
                volume_name: None,
                volume_serial: None,
                created: None,
                modified: None,
                dirty: false,
            },
        }
    }

    /// Set the format variant
    pub fn variant<S: Into<String>>(mut self, variant: S) -> Self {
        self.descriptor.variant = Some(variant.into());
        self
    }

    /// Set cluster size and count
    pub fn geometry(mut self, cluster_size: u32, clusters: u64) -> Self {
        self.descriptor.cluster_size = cluster_size;
        self.descriptor.clusters = clusters;
        self
    }

    /// Set the free cluster count
    pub fn free_clusters(mut self, free: Option<u64>) -> Self {
        self.descriptor.free_clusters = free;
        self
    }

    /// Set the volume label
    pub fn volume_name(mut self, name: Option<String>) -> Self {
        self.descriptor.volume_name = name;
        self
    }

    /// Set the volume serial
    pub fn volume_serial(mut self, serial: Option<String>) -> Self {
        self.descriptor.volume_serial = serial;
        self
    }

    /// Set the creation time
    pub fn created(mut self, created: Option<DateTime<Utc>>) -> Self {
        self.descriptor.created = created;
        self
    }

    /// Set the last write time
    pub fn modified(mut self, modified: Option<DateTime<Utc>>) -> Self {
        self.descriptor.modified = modified;
        self
    }

    /// Set the dirty flag
    pub fn dirty(mut self, dirty: bool) -> Self {
        self.descriptor.dirty = dirty;
        self
    }

    /// Validate against the partition length and build the descriptor
    ///
    /// Returns `None` when the geometry cannot belong to a real volume of
    /// this size, which means the probe matched by coincidence.
    pub fn build(self, partition_length: u64) -> Option<VolumeDescriptor> {
        let d = self.descriptor;
        let cluster_size = u64::from(d.cluster_size);

        if cluster_size == 0 || !d.cluster_size.is_power_of_two() {
            debug!("{}: cluster size {} is not a power of two", d.kind, d.cluster_size);
            return None;
        }
        if cluster_size > partition_length {
            debug!(
                "{}: cluster size {} exceeds partition length {}",
                d.kind, d.cluster_size, partition_length
            );
            return None;
        }
        if d.clusters == 0 {
            debug!("{}: volume has no clusters", d.kind);
            return None;
        }
        match cluster_size.checked_mul(d.clusters) {
            Some(size) if size <= partition_length => {}
            _ => {
                debug!(
                    "{}: {} clusters of {} bytes overflow partition length {}",
                    d.kind, d.clusters, d.cluster_size, partition_length
                );
                return None;
            }
        }
        if let Some(free) = d.free_clusters {
            if free > d.clusters {
                debug!("{}: free clusters {} exceed total {}", d.kind, free, d.clusters);
                return None;
            }
        }

        Some(d)
    }
}

/// Divide a count of small units into clusters, rejecting remainders
///
/// Used where a format stores its size in sectors and its cluster size as a
/// sector multiple; an uneven split means the fields are not what they seem.
pub fn exact_clusters(units: u64, units_per_cluster: u64) -> Option<u64> {
    let clusters = units.checked_div(units_per_cluster)?;
    if units % units_per_cluster != 0 {
        return None;
    }
    Some(clusters)
}

/// Convert seconds since the Unix epoch, treating zero as unset
pub fn unix_time(seconds: u64) -> Option<DateTime<Utc>> {
    if seconds == 0 {
        return None;
    }
    DateTime::from_timestamp(i64::try_from(seconds).ok()?, 0)
}

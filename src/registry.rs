/// Ordered set of filesystem probes
///
/// Probes run in priority order and the first one that matches wins.
/// Formats whose superblocks sit further into the partition go first, so a
/// stale signature at the start of a reformatted partition does not shadow
/// the filesystem that replaced it.

use log::{debug, warn};

use crate::error::Result;
use crate::filesystem::{
    BtrfsFileSystem, ExtFileSystem, F2fsFileSystem, FileSystem, Nilfs2FileSystem, ProbeContext,
    ProbeOptions, ProbeResult, RefsFileSystem, XfsFileSystem,
};
use crate::image::{Partition, SectorSource};
use crate::volume::{FileSystemType, VolumeDescriptor};

/// Terminal state of a first-match detection run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    /// A probe matched and its volume was described
    Matched {
        /// Position of the probe in the registry
        index: usize,
        /// The described volume
        descriptor: VolumeDescriptor,
    },
    /// Every probe was tried without a match
    Exhausted,
}

impl Detection {
    /// Get the described volume, if any
    pub fn descriptor(self) -> Option<VolumeDescriptor> {
        match self {
            Detection::Matched { descriptor, .. } => Some(descriptor),
            Detection::Exhausted => None,
        }
    }
}

/// Create the built-in probe for a format
pub fn probe_for(kind: FileSystemType) -> Box<dyn FileSystem> {
    match kind {
        FileSystemType::Btrfs => Box::new(BtrfsFileSystem),
        FileSystemType::Ext => Box::new(ExtFileSystem),
        FileSystemType::F2fs => Box::new(F2fsFileSystem),
        FileSystemType::Nilfs2 => Box::new(Nilfs2FileSystem),
        FileSystemType::Refs => Box::new(RefsFileSystem),
        FileSystemType::Xfs => Box::new(XfsFileSystem),
    }
}

/// Immutable, thread-safe list of probes
pub struct Registry {
    probes: Vec<Box<dyn FileSystem>>,
    options: ProbeOptions,
}

impl Registry {
    /// Create a registry with every built-in format in default order
    pub fn new() -> Self {
        RegistryBuilder::new().formats(&FileSystemType::ALL).build()
    }

    /// Create a new registry builder
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Formats in probing order
    pub fn formats(&self) -> Vec<FileSystemType> {
        self.probes.iter().map(|probe| probe.kind()).collect()
    }

    /// Number of probes
    pub fn len(&self) -> usize {
        self.probes.len()
    }

    /// Check if the registry has no probes
    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    /// Options handed to every probe
    pub fn options(&self) -> ProbeOptions {
        self.options
    }

    fn context<'a>(&self, source: &'a dyn SectorSource, partition: Partition) -> ProbeContext<'a> {
        ProbeContext::with_options(source, partition, self.options)
    }

    /// Find the first format whose signature matches
    pub fn identify(
        &self,
        source: &dyn SectorSource,
        partition: Partition,
    ) -> Result<Option<FileSystemType>> {
        let ctx = self.context(source, partition);
        for probe in &self.probes {
            if probe.identify(&ctx)? {
                debug!("{} identified as {}", partition, probe.kind());
                return Ok(Some(probe.kind()));
            }
        }
        Ok(None)
    }

    /// Describe the volume using the first probe that fully matches
    pub fn get_information(
        &self,
        source: &dyn SectorSource,
        partition: Partition,
    ) -> Result<Option<VolumeDescriptor>> {
        Ok(self.detect(source, partition)?.descriptor())
    }

    /// Run probes in order until one produces a descriptor
    ///
    /// A probe whose signature matches but whose geometry does not fit the
    /// partition is passed over, and the next probe is tried.
    pub fn detect(&self, source: &dyn SectorSource, partition: Partition) -> Result<Detection> {
        let ctx = self.context(source, partition);
        for (index, probe) in self.probes.iter().enumerate() {
            if let Some(descriptor) = probe.information(&ctx)? {
                debug!("{} matched {} (probe {})", partition, probe.kind(), index);
                return Ok(Detection::Matched { index, descriptor });
            }
        }
        debug!("{} matched no known format", partition);
        Ok(Detection::Exhausted)
    }

    /// Run every probe and report whether the match is unique
    pub fn survey(
        &self,
        source: &dyn SectorSource,
        partition: Partition,
    ) -> Result<ProbeResult<VolumeDescriptor>> {
        let ctx = self.context(source, partition);
        let mut matches = Vec::new();
        for probe in &self.probes {
            if let Some(descriptor) = probe.information(&ctx)? {
                matches.push(descriptor);
            }
        }

        if matches.len() > 1 {
            let names: Vec<&str> = matches.iter().map(|d| d.kind.name()).collect();
            let diagnostic = format!("{} matches {}", partition, names.join(", "));
            warn!("{}", diagnostic);
            return Ok(ProbeResult::Ambiguous(diagnostic));
        }
        Ok(matches.pop().into())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for a [`Registry`]
pub struct RegistryBuilder {
    probes: Vec<Box<dyn FileSystem>>,
    options: ProbeOptions,
}

impl RegistryBuilder {
    /// Create a builder with no probes
    pub fn new() -> Self {
        Self {
            probes: Vec::new(),
            options: ProbeOptions::default(),
        }
    }

    /// Append built-in probes for these formats, in the order given
    pub fn formats(mut self, kinds: &[FileSystemType]) -> Self {
        self.probes.extend(kinds.iter().map(|&kind| probe_for(kind)));
        self
    }

    /// Append a built-in probe
    pub fn format(self, kind: FileSystemType) -> Self {
        self.probe(probe_for(kind))
    }

    /// Append any probe
    pub fn probe(mut self, probe: Box<dyn FileSystem>) -> Self {
        self.probes.push(probe);
        self
    }

    /// Set whether stored checksums are compared
    pub fn verify_checksums(mut self, verify: bool) -> Self {
        self.options.verify_checksums = verify;
        self
    }

    /// Set all probe options
    pub fn options(mut self, options: ProbeOptions) -> Self {
        self.options = options;
        self
    }

    /// Build the registry
    pub fn build(self) -> Registry {
        Registry {
            probes: self.probes,
            options: self.options,
        }
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

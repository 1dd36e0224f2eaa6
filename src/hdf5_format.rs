//! HDF5 file format for captured digital streams
//!
//! Layout:
//! - `/metadata` group with attributes `start_time`, `sample_rate_in`,
//!   `sample_rate_out`, `kernel_buffers`, `chunk_size`, `n_bits`, `version`
//! - `/capture/samples` resizable `u16` dataset, one entry per input sample

use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use hdf5::types::VarLenUnicode;
use hdf5::{Dataset, File, Group};
use std::path::Path;

const FORMAT_VERSION: &str = "1.0";

/// Acquisition parameters stored alongside a capture
#[derive(Debug, Clone)]
pub struct CaptureMetadata {
    pub start_time: String, // ISO 8601 timestamp
    pub sample_rate_in: u32,
    pub sample_rate_out: u32,
    pub kernel_buffers: u32,
    pub chunk_size: usize,
    pub n_bits: u32,
    pub version: String,
}

impl CaptureMetadata {
    /// Run length a clean capture with these rates should show
    pub fn expected_run_length(&self) -> usize {
        if self.sample_rate_out == 0 {
            return 0;
        }
        (self.sample_rate_in / self.sample_rate_out) as usize
    }
}

fn storage_err(what: &str, e: hdf5::Error) -> StreamError {
    StreamError::Storage(format!("{}: {}", what, e))
}

fn unicode(value: &str) -> Result<VarLenUnicode> {
    value
        .parse()
        .map_err(|e| StreamError::Storage(format!("Invalid attribute string {:?}: {}", value, e)))
}

/// HDF5 writer for captured streams
pub struct CaptureWriter {
    file: File,
    samples: Dataset,
    sample_count: usize,
}

impl CaptureWriter {
    /// Create a new capture file for the given configuration
    pub fn create<P: AsRef<Path>>(path: P, config: &StreamConfig) -> Result<Self> {
        let file = File::create(path).map_err(|e| storage_err("Failed to create HDF5 file", e))?;

        let metadata_group = file
            .create_group("metadata")
            .map_err(|e| storage_err("Failed to create metadata group", e))?;

        let start_time = unicode(&chrono::Local::now().to_rfc3339())?;
        Self::write_attr(&metadata_group, "start_time", &start_time)?;
        Self::write_attr(&metadata_group, "sample_rate_in", &config.sample_rate_in)?;
        Self::write_attr(&metadata_group, "sample_rate_out", &config.sample_rate_out)?;
        Self::write_attr(&metadata_group, "kernel_buffers", &config.kernel_buffers)?;
        Self::write_attr(&metadata_group, "chunk_size", &(config.chunk_size as u64))?;
        Self::write_attr(&metadata_group, "n_bits", &config.n_bits)?;
        Self::write_attr(&metadata_group, "version", &unicode(FORMAT_VERSION)?)?;

        let capture_group = file
            .create_group("capture")
            .map_err(|e| storage_err("Failed to create capture group", e))?;

        // Chunk the dataset like the device chunks the stream, within reason
        let chunk = config.chunk_size.clamp(1024, 1 << 16);
        let samples = capture_group
            .new_dataset::<u16>()
            .shape((0..,))
            .chunk((chunk,))
            .deflate(4)
            .create("samples")
            .map_err(|e| storage_err("Failed to create samples dataset", e))?;

        Ok(Self {
            file,
            samples,
            sample_count: 0,
        })
    }

    fn write_attr<T: hdf5::H5Type>(group: &Group, name: &str, value: &T) -> Result<()> {
        group
            .new_attr::<T>()
            .create(name)
            .and_then(|attr| attr.write_scalar(value))
            .map_err(|e| storage_err(&format!("Failed to write {}", name), e))
    }

    /// Append a block of samples
    pub fn append(&mut self, samples: &[u16]) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let new_size = self.sample_count + samples.len();
        self.samples
            .resize((new_size,))
            .map_err(|e| storage_err("Failed to resize dataset", e))?;
        self.samples
            .write_slice(samples, self.sample_count..)
            .map_err(|e| storage_err("Failed to write to dataset", e))?;

        self.sample_count = new_size;
        Ok(())
    }

    /// Flush data to disk
    pub fn flush(&mut self) -> Result<()> {
        self.file
            .flush()
            .map_err(|e| storage_err("Failed to flush HDF5 file", e))
    }

    /// Get current sample count
    pub fn sample_count(&self) -> usize {
        self.sample_count
    }
}

/// HDF5 reader for offline analysis of captures
pub struct CaptureReader {
    #[allow(dead_code)]
    file: File,
    samples: Dataset,
    metadata: CaptureMetadata,
}

impl CaptureReader {
    /// Open an existing capture file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path).map_err(|e| storage_err("Failed to open HDF5 file", e))?;
        let metadata = Self::read_metadata(&file)?;
        let samples = file
            .dataset("capture/samples")
            .map_err(|e| storage_err("Failed to open samples dataset", e))?;

        Ok(Self {
            file,
            samples,
            metadata,
        })
    }

    fn read_attr<T: hdf5::H5Type>(group: &Group, name: &str) -> Result<T> {
        group
            .attr(name)
            .and_then(|attr| attr.read_scalar::<T>())
            .map_err(|e| storage_err(&format!("Failed to read {}", name), e))
    }

    fn read_metadata(file: &File) -> Result<CaptureMetadata> {
        let group = file
            .group("metadata")
            .map_err(|e| storage_err("Failed to open metadata group", e))?;

        Ok(CaptureMetadata {
            start_time: Self::read_attr::<VarLenUnicode>(&group, "start_time")?.to_string(),
            sample_rate_in: Self::read_attr(&group, "sample_rate_in")?,
            sample_rate_out: Self::read_attr(&group, "sample_rate_out")?,
            kernel_buffers: Self::read_attr(&group, "kernel_buffers")?,
            chunk_size: Self::read_attr::<u64>(&group, "chunk_size")? as usize,
            n_bits: Self::read_attr(&group, "n_bits")?,
            version: Self::read_attr::<VarLenUnicode>(&group, "version")?.to_string(),
        })
    }

    /// Get metadata
    pub fn metadata(&self) -> &CaptureMetadata {
        &self.metadata
    }

    /// Get total number of samples in file
    pub fn total_samples(&self) -> usize {
        self.samples.size()
    }

    /// Read a range of samples
    pub fn read_range(&self, start: usize, count: usize) -> Result<Vec<u16>> {
        let total = self.total_samples();
        if start >= total {
            return Ok(Vec::new());
        }

        let end = start + count.min(total - start);
        let samples = self
            .samples
            .read_slice_1d::<u16, _>(start..end)
            .map_err(|e| storage_err("Failed to read samples", e))?;

        Ok(samples.to_vec())
    }

    /// Read every sample in the file
    pub fn read_all(&self) -> Result<Vec<u16>> {
        self.read_range(0, self.total_samples())
    }
}

//! On-disk format for one cluster's index and its position mapping.
//!
//! Every built cluster is persisted as a matched pair of files:
//! - `cluster_{id}.index`: the normalized member vectors
//! - `cluster_{id}_positions.bin`: local position -> global `ProfileIndex`
//!
//! # Index Blob Format
//!
//! - Header (16 bytes): magic, version, dimension, vector count
//! - Vectors: Contiguous f32 rows in little-endian format, in local position order
//!
//! Blobs are read through a memory map, so opening a snapshot does not copy
//! the file until the rows are materialized into a `FlatIpIndex`.
//!
//! The mapping is a bincode-encoded `Vec<u32>` (standard configuration).

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapOptions};
use thiserror::Error;

use crate::vector::index::FlatIpIndex;
use crate::vector::types::{ClusterId, ProfileIndex, VectorDimension, VectorError};

/// Current blob format version.
const STORAGE_VERSION: u32 = 1;

/// Size of the blob header in bytes.
const HEADER_SIZE: usize = 16;

/// Magic bytes to identify cluster index blobs.
const MAGIC_BYTES: &[u8; 4] = b"TSIX";

/// Number of bytes per f32 value.
const BYTES_PER_F32: usize = 4;

/// Errors specific to cluster file operations.
#[derive(Error, Debug)]
pub enum VectorStorageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid storage format: {0}")]
    InvalidFormat(String),

    #[error("Position mapping encode failed: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("Position mapping decode failed: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("Vector error: {0}")]
    Vector(#[from] VectorError),
}

/// Path of the index blob for a cluster inside a snapshot directory.
#[must_use]
pub fn index_blob_path(base_path: &Path, cluster: ClusterId) -> PathBuf {
    base_path.join(format!("cluster_{}.index", cluster.get()))
}

/// Path of the position mapping for a cluster inside a snapshot directory.
#[must_use]
pub fn position_mapping_path(base_path: &Path, cluster: ClusterId) -> PathBuf {
    base_path.join(format!("cluster_{}_positions.bin", cluster.get()))
}

/// Writes the rows of `index` as a blob at `path`, replacing any existing file.
pub fn write_index_blob(path: &Path, index: &FlatIpIndex) -> Result<(), VectorStorageError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let count = u32::try_from(index.len()).map_err(|_| {
        VectorStorageError::InvalidFormat(format!("Too many vectors for one blob: {}", index.len()))
    })?;

    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(MAGIC_BYTES)?;
    writer.write_all(&STORAGE_VERSION.to_le_bytes())?;
    writer.write_all(&(index.dimension().get() as u32).to_le_bytes())?;
    writer.write_all(&count.to_le_bytes())?;

    for &value in index.as_flat() {
        writer.write_all(&value.to_le_bytes())?;
    }

    writer.flush()?;
    Ok(())
}

/// Memory-mapped, read-only view of a cluster index blob.
#[derive(Debug)]
pub struct MmapIndexBlob {
    /// Path to the blob file.
    path: PathBuf,

    /// Memory-mapped file contents.
    mmap: Mmap,

    /// Vector dimension (all rows share it).
    dimension: VectorDimension,

    /// Number of rows declared in the header.
    vector_count: usize,
}

impl MmapIndexBlob {
    /// Opens and validates a blob.
    ///
    /// Returns an error if the file doesn't exist, has invalid format, or is
    /// shorter than its header claims.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, VectorStorageError> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            return Err(VectorStorageError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("Index blob not found: {path:?}"),
            )));
        }

        let file = File::open(&path)?;
        // SAFETY: snapshot files are written once and never modified in place
        let mmap = unsafe { MmapOptions::new().map(&file)? };

        let (version, dimension, vector_count) = Self::read_header(&mmap)?;

        if version != STORAGE_VERSION {
            return Err(VectorError::VersionMismatch {
                expected: STORAGE_VERSION,
                actual: version,
            }
            .into());
        }

        let expected_len = blob_len(dimension, vector_count).ok_or_else(|| {
            VectorStorageError::InvalidFormat(format!(
                "Blob {path:?} header claims {vector_count} rows of dimension {}, which overflows",
                dimension.get()
            ))
        })?;
        if mmap.len() != expected_len {
            return Err(VectorStorageError::InvalidFormat(format!(
                "Blob {path:?} is {} bytes, header implies {expected_len}",
                mmap.len()
            )));
        }

        Ok(Self {
            path,
            mmap,
            dimension,
            vector_count,
        })
    }

    /// Returns the number of rows stored.
    #[must_use]
    pub fn vector_count(&self) -> usize {
        self.vector_count
    }

    /// Returns the vector dimension.
    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads one row by local position.
    #[must_use]
    pub fn read_row(&self, position: usize) -> Option<Vec<f32>> {
        if position >= self.vector_count {
            return None;
        }
        let row_bytes = self.dimension.get() * BYTES_PER_F32;
        let start = HEADER_SIZE + position * row_bytes;
        Some(decode_f32s(&self.mmap[start..start + row_bytes]))
    }

    /// Materializes every row into an in-memory index.
    pub fn to_index(&self) -> Result<FlatIpIndex, VectorStorageError> {
        let rows = decode_f32s(&self.mmap[HEADER_SIZE..]);
        Ok(FlatIpIndex::from_rows(self.dimension, rows)?)
    }

    fn read_header(mmap: &Mmap) -> Result<(u32, VectorDimension, usize), VectorStorageError> {
        if mmap.len() < HEADER_SIZE {
            return Err(VectorStorageError::InvalidFormat(
                "File too small to contain header".to_string(),
            ));
        }

        if &mmap[0..4] != MAGIC_BYTES {
            return Err(VectorStorageError::InvalidFormat(
                "Invalid magic bytes".to_string(),
            ));
        }

        let version = u32::from_le_bytes([mmap[4], mmap[5], mmap[6], mmap[7]]);

        let dim_value = u32::from_le_bytes([mmap[8], mmap[9], mmap[10], mmap[11]]);
        let dimension = VectorDimension::new(dim_value as usize)?;

        let vector_count = u32::from_le_bytes([mmap[12], mmap[13], mmap[14], mmap[15]]) as usize;

        Ok((version, dimension, vector_count))
    }
}

/// Total file length implied by a header, `None` if it does not fit in `usize`.
fn blob_len(dimension: VectorDimension, vector_count: usize) -> Option<usize> {
    vector_count
        .checked_mul(dimension.get())?
        .checked_mul(BYTES_PER_F32)?
        .checked_add(HEADER_SIZE)
}

fn decode_f32s(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(BYTES_PER_F32)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Writes a cluster's local -> global position mapping.
pub fn write_position_mapping(
    path: &Path,
    positions: &[ProfileIndex],
) -> Result<(), VectorStorageError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let raw: Vec<u32> = positions.iter().map(ProfileIndex::get).collect();
    let bytes = bincode::encode_to_vec(&raw, bincode::config::standard())?;
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Reads a cluster's local -> global position mapping.
pub fn read_position_mapping(path: &Path) -> Result<Vec<ProfileIndex>, VectorStorageError> {
    let bytes = std::fs::read(path)?;
    let (raw, consumed): (Vec<u32>, usize) =
        bincode::decode_from_slice(&bytes, bincode::config::standard())?;

    if consumed != bytes.len() {
        return Err(VectorStorageError::InvalidFormat(format!(
            "Trailing bytes in position mapping {path:?}"
        )));
    }

    Ok(raw.into_iter().map(ProfileIndex::new).collect())
}

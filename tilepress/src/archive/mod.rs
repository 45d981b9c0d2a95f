//! Single-file tile-cache archive.
//!
//! Layout, front to back:
//!
//! ```text
//! +--------------------+  fixed 52-byte header (magic, version, offsets)
//! | header             |
//! +--------------------+  tile blobs, appended as tiles arrive,
//! | tile data          |  deduplicated by SHA-256 of the encoded bytes
//! +--------------------+
//! | metadata (JSON)    |  written once, at finalize
//! +--------------------+
//! | directory          |  fixed-width entries sorted by (zoom, column, row)
//! +--------------------+
//! ```
//!
//! Tiles are addressed by `(zoom, column, row)` with the row origin at the
//! BOTTOM-left of the world — the slicer's top-left rows are flipped on
//! write. That flip is a correctness requirement of the addressing scheme,
//! not a presentation detail.
//!
//! Writes are idempotent per key: re-putting a coordinate replaces the
//! directory entry, and the last write wins. A writer dropped without
//! [`ArchiveWriter::finalize`] leaves the file without a valid header, so a
//! failed run can never be mistaken for a complete archive.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::encode::TileFormat;
use crate::grid::{TileCoord, MAX_ZOOM};

const MAGIC: &[u8; 8] = b"TILEPACK";
const VERSION: u16 = 1;
const HEADER_LEN: u64 = 52;
const ENTRY_LEN: usize = 25;

/// Errors raised by the archive layer.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// The archive file could not be created, read or written.
    #[error("archive I/O: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not a valid archive (bad magic, truncated, corrupt).
    #[error("invalid archive: {0}")]
    Invalid(String),

    /// The archive was written by a newer layout revision.
    #[error("unsupported archive version {0}")]
    Version(u16),

    /// The metadata failed validation or (de)serialization.
    #[error("metadata: {0}")]
    Metadata(String),

    /// The zoom offset moved a tile outside the addressable zoom range.
    #[error("zoom {0} out of range after offset")]
    ZoomOutOfRange(i32),
}

/// Layer kind stored in the metadata table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerType {
    Overlay,
    Baselayer,
}

impl std::fmt::Display for LayerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LayerType::Overlay => f.write_str("overlay"),
            LayerType::Baselayer => f.write_str("baselayer"),
        }
    }
}

/// Archive-level metadata, written exactly once per archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveMetadata {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub layer_type: LayerType,
    pub version: String,
    pub format: TileFormat,
    /// `[left, bottom, right, top]` in WGS 84 degrees.
    pub bounds: Option<[f64; 4]>,
    pub minzoom: u8,
    pub maxzoom: u8,
}

impl ArchiveMetadata {
    /// Validates the metadata before it is committed.
    ///
    /// # Errors
    ///
    /// `ArchiveError::Metadata` for an empty name, crossed zoom bounds, or
    /// geographic bounds outside the world.
    pub fn validate(&self) -> Result<(), ArchiveError> {
        if self.name.is_empty() {
            return Err(ArchiveError::Metadata("name must not be empty".into()));
        }
        if self.minzoom > self.maxzoom {
            return Err(ArchiveError::Metadata(format!(
                "minzoom {} exceeds maxzoom {}",
                self.minzoom, self.maxzoom
            )));
        }
        if let Some([left, bottom, right, top]) = self.bounds {
            let valid = left < right
                && bottom < top
                && left >= -180.0
                && right <= 180.0
                && bottom >= -90.0
                && top <= 90.0;
            if !valid {
                return Err(ArchiveError::Metadata(format!(
                    "invalid bounds: {left},{bottom},{right},{top}"
                )));
            }
        }
        Ok(())
    }
}

/// Streaming archive writer.
///
/// Blobs land in the file as tiles arrive; the directory and metadata are
/// written at finalize and the header rewritten last.
pub struct ArchiveWriter {
    file: File,
    path: PathBuf,
    zoom_offset: i32,
    entries: BTreeMap<(u8, u32, u32), (u64, u64)>,
    blobs: HashMap<[u8; 32], (u64, u64)>,
    cursor: u64,
}

impl ArchiveWriter {
    /// Creates (or truncates) the archive at `path`.
    ///
    /// # Errors
    ///
    /// `ArchiveError::Io` when the file cannot be created.
    pub fn create(path: &Path) -> Result<Self, ArchiveError> {
        let mut file = File::create(path)?;
        // Placeholder header; the real one lands at finalize, so a crashed
        // run leaves a file that will not open as an archive.
        file.write_all(&[0u8; HEADER_LEN as usize])?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
            zoom_offset: 0,
            entries: BTreeMap::new(),
            blobs: HashMap::new(),
            cursor: HEADER_LEN,
        })
    }

    /// Shift stored zoom numbers by `offset` (tiles keep the grid they were
    /// rendered in; only the addressing changes).
    pub fn with_zoom_offset(mut self, offset: i32) -> Self {
        self.zoom_offset = offset;
        self
    }

    /// Number of distinct tile keys written so far.
    pub fn tile_count(&self) -> u64 {
        self.entries.len() as u64
    }

    /// Stores encoded tile bytes at `coord`.
    ///
    /// `coord` uses the slicer's top-left row convention; the row is flipped
    /// here to the archive's bottom-left origin. Writing the same key twice
    /// replaces the earlier entry. Identical byte payloads share one blob.
    ///
    /// # Errors
    ///
    /// `ArchiveError::ZoomOutOfRange` when the zoom offset moves the tile
    /// outside `[0, MAX_ZOOM]`, `ArchiveError::Io` on write failure.
    pub fn put(&mut self, coord: TileCoord, bytes: &[u8]) -> Result<(), ArchiveError> {
        let storage_zoom = i32::from(coord.zoom) + self.zoom_offset;
        if !(0..=i32::from(MAX_ZOOM)).contains(&storage_zoom) {
            return Err(ArchiveError::ZoomOutOfRange(storage_zoom));
        }

        // Flip within the grid the tile was rendered in.
        let flipped_row = (1u32 << coord.zoom) - 1 - coord.row;

        let digest: [u8; 32] = Sha256::digest(bytes).into();
        let location = match self.blobs.get(&digest) {
            Some(&location) => location,
            None => {
                let location = (self.cursor, bytes.len() as u64);
                self.file.write_all(bytes)?;
                self.cursor += bytes.len() as u64;
                self.blobs.insert(digest, location);
                location
            }
        };

        self.entries
            .insert((storage_zoom as u8, coord.column, flipped_row), location);
        Ok(())
    }

    /// Writes metadata and directory, then the real header, and syncs.
    ///
    /// # Errors
    ///
    /// `ArchiveError::Metadata` when validation fails (nothing further is
    /// written), `ArchiveError::Io` on write failure.
    pub fn finalize(mut self, metadata: &ArchiveMetadata) -> Result<(), ArchiveError> {
        metadata.validate()?;

        let metadata_bytes = serde_json::to_vec(metadata)
            .map_err(|e| ArchiveError::Metadata(e.to_string()))?;
        let metadata_offset = self.cursor;
        self.file.write_all(&metadata_bytes)?;
        self.cursor += metadata_bytes.len() as u64;

        let dir_offset = self.cursor;
        let mut directory = Vec::with_capacity(self.entries.len() * ENTRY_LEN);
        for (&(zoom, column, row), &(offset, length)) in &self.entries {
            directory.push(zoom);
            directory.extend_from_slice(&column.to_le_bytes());
            directory.extend_from_slice(&row.to_le_bytes());
            directory.extend_from_slice(&offset.to_le_bytes());
            directory.extend_from_slice(&length.to_le_bytes());
        }
        self.file.write_all(&directory)?;

        let mut header = Vec::with_capacity(HEADER_LEN as usize);
        header.extend_from_slice(MAGIC);
        header.extend_from_slice(&VERSION.to_le_bytes());
        header.extend_from_slice(&0u16.to_le_bytes());
        header.extend_from_slice(&metadata_offset.to_le_bytes());
        header.extend_from_slice(&(metadata_bytes.len() as u64).to_le_bytes());
        header.extend_from_slice(&dir_offset.to_le_bytes());
        header.extend_from_slice(&(self.entries.len() as u64).to_le_bytes());
        header.extend_from_slice(&HEADER_LEN.to_le_bytes());

        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&header)?;
        self.file.sync_all()?;

        info!(
            path = %self.path.display(),
            tiles = self.entries.len(),
            blobs = self.blobs.len(),
            "archive finalized"
        );
        Ok(())
    }
}

/// Read-only view of a finished archive.
pub struct ArchiveReader {
    file: File,
    metadata: ArchiveMetadata,
    entries: BTreeMap<(u8, u32, u32), (u64, u64)>,
}

impl ArchiveReader {
    /// Opens and indexes an archive.
    ///
    /// # Errors
    ///
    /// `ArchiveError::Invalid` for anything that is not a finalized archive
    /// of a known version.
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let mut file = File::open(path)?;
        let mut header = [0u8; HEADER_LEN as usize];
        file.read_exact(&mut header)
            .map_err(|_| ArchiveError::Invalid("file too short for a header".into()))?;

        if &header[..8] != MAGIC {
            return Err(ArchiveError::Invalid("bad magic".into()));
        }
        let version = u16::from_le_bytes([header[8], header[9]]);
        if version != VERSION {
            return Err(ArchiveError::Version(version));
        }

        let read_u64 =
            |at: usize| u64::from_le_bytes(header[at..at + 8].try_into().expect("header slice"));
        let metadata_offset = read_u64(12);
        let metadata_len = read_u64(20);
        let dir_offset = read_u64(28);
        let entry_count = read_u64(36);

        file.seek(SeekFrom::Start(metadata_offset))?;
        let mut metadata_bytes = vec![0u8; metadata_len as usize];
        file.read_exact(&mut metadata_bytes)
            .map_err(|_| ArchiveError::Invalid("truncated metadata".into()))?;
        let metadata: ArchiveMetadata = serde_json::from_slice(&metadata_bytes)
            .map_err(|e| ArchiveError::Metadata(e.to_string()))?;

        file.seek(SeekFrom::Start(dir_offset))?;
        let mut directory = vec![0u8; entry_count as usize * ENTRY_LEN];
        file.read_exact(&mut directory)
            .map_err(|_| ArchiveError::Invalid("truncated directory".into()))?;

        let mut entries = BTreeMap::new();
        for entry in directory.chunks_exact(ENTRY_LEN) {
            let zoom = entry[0];
            let column = u32::from_le_bytes(entry[1..5].try_into().expect("entry slice"));
            let row = u32::from_le_bytes(entry[5..9].try_into().expect("entry slice"));
            let offset = u64::from_le_bytes(entry[9..17].try_into().expect("entry slice"));
            let length = u64::from_le_bytes(entry[17..25].try_into().expect("entry slice"));
            entries.insert((zoom, column, row), (offset, length));
        }

        debug!(tiles = entries.len(), "opened archive");
        Ok(Self {
            file,
            metadata,
            entries,
        })
    }

    pub fn metadata(&self) -> &ArchiveMetadata {
        &self.metadata
    }

    pub fn tile_count(&self) -> u64 {
        self.entries.len() as u64
    }

    /// Tile keys in directory order: zoom, then column, then bottom-origin
    /// row.
    pub fn coords(&self) -> impl Iterator<Item = (u8, u32, u32)> + '_ {
        self.entries.keys().copied()
    }

    /// Reads the tile at `(zoom, column, row)`, row addressed from the
    /// bottom-left.
    ///
    /// # Errors
    ///
    /// `ArchiveError::Io` on read failure; a missing key is `Ok(None)`.
    pub fn tile(
        &mut self,
        zoom: u8,
        column: u32,
        row: u32,
    ) -> Result<Option<Vec<u8>>, ArchiveError> {
        let Some(&(offset, length)) = self.entries.get(&(zoom, column, row)) else {
            return Ok(None);
        };
        self.file.seek(SeekFrom::Start(offset))?;
        let mut bytes = vec![0u8; length as usize];
        self.file
            .read_exact(&mut bytes)
            .map_err(|_| ArchiveError::Invalid("truncated tile data".into()))?;
        Ok(Some(bytes))
    }
}

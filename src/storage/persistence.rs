//! On-disk layout for document indices.
//!
//! ```text
//! <base>/<document_id>/
//!     sections.json   metadata + sections (titles, member ids, representatives)
//!     chunks.bin      chunk records and embeddings, memory-mapped on load
//! ```
//!
//! Both artifacts are written into a staging directory and swapped in with a
//! rename, so readers never observe a half-written pair.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use memmap2::MmapOptions;

use super::error::{StorageError, StorageResult};
use super::metadata::IndexMetadata;
use crate::documents::{ChunkId, DocumentChunk, DocumentIndex, Section};

const SECTIONS_FILE: &str = "sections.json";
const CHUNKS_FILE: &str = "chunks.bin";
const CHUNKS_MAGIC: &[u8; 8] = b"QDCHUNK1";
const CHECKSUM_LEN: usize = 32;
const STAGING_PREFIX: &str = ".staging-";
const BACKUP_PREFIX: &str = ".old-";

/// A persisted index together with what it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredIndex {
    pub metadata: IndexMetadata,
    pub index: DocumentIndex,
}

#[derive(Serialize, Deserialize)]
struct SectionsFile {
    metadata: IndexMetadata,
    sections: Vec<Section>,
}

/// Manages persistence of document indices under one base directory.
#[derive(Debug, Clone)]
pub struct IndexPersistence {
    base_path: PathBuf,
}

impl IndexPersistence {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn document_dir(&self, document_id: &str) -> PathBuf {
        self.base_path.join(document_id)
    }

    /// Check if both artifacts for a document exist
    pub fn exists(&self, document_id: &str) -> bool {
        let dir = self.document_dir(document_id);
        dir.join(SECTIONS_FILE).is_file() && dir.join(CHUNKS_FILE).is_file()
    }

    /// Write both artifacts, replacing any previous pair as a unit.
    #[must_use = "Save errors should be handled to ensure data is persisted"]
    pub fn save(&self, stored: &StoredIndex) -> StorageResult<()> {
        let document_id = &stored.metadata.document_id;
        fs::create_dir_all(&self.base_path)?;

        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&self.base_path)?;

        write_sections(&staging.path().join(SECTIONS_FILE), stored)?;
        write_chunks(
            &staging.path().join(CHUNKS_FILE),
            stored.index.dimension,
            &stored.index.chunks,
        )?;

        let target = self.document_dir(document_id);
        let backup = self
            .base_path
            .join(format!("{BACKUP_PREFIX}{document_id}-{}", std::process::id()));

        let had_previous = target.exists();
        if had_previous {
            if backup.exists() {
                fs::remove_dir_all(&backup)?;
            }
            fs::rename(&target, &backup)?;
        }

        let staged = staging.keep();
        if let Err(e) = fs::rename(&staged, &target) {
            if had_previous {
                let _ = fs::rename(&backup, &target);
            }
            let _ = fs::remove_dir_all(&staged);
            return Err(e.into());
        }

        if had_previous {
            if let Err(e) = fs::remove_dir_all(&backup) {
                tracing::warn!(target: "storage", "failed to remove {}: {e}", backup.display());
            }
        }

        tracing::debug!(
            target: "storage",
            "saved {document_id}: {} sections, {} chunks",
            stored.index.section_count(),
            stored.index.chunk_count()
        );
        Ok(())
    }

    /// Load both artifacts of a document.
    ///
    /// Returns `NotFound` when either file is missing and `Corrupt` when
    /// they fail to decode or disagree with each other.
    #[must_use = "Load errors should be handled appropriately"]
    pub fn load(&self, document_id: &str) -> StorageResult<StoredIndex> {
        let dir = self.document_dir(document_id);
        let sections_path = dir.join(SECTIONS_FILE);
        let chunks_path = dir.join(CHUNKS_FILE);

        if !sections_path.is_file() || !chunks_path.is_file() {
            return Err(StorageError::NotFound(document_id.to_string()));
        }

        let content = fs::read_to_string(&sections_path)?;
        let file: SectionsFile = serde_json::from_str(&content)
            .map_err(|e| StorageError::corrupt(&sections_path, e.to_string()))?;

        let (dimension, chunks) = read_chunks(&chunks_path)?;

        if dimension != file.metadata.dimension {
            return Err(StorageError::corrupt(
                &chunks_path,
                format!(
                    "dimension {dimension} disagrees with metadata {}",
                    file.metadata.dimension
                ),
            ));
        }
        if chunks.len() != file.metadata.chunk_count {
            return Err(StorageError::corrupt(
                &chunks_path,
                format!(
                    "{} chunks, metadata says {}",
                    chunks.len(),
                    file.metadata.chunk_count
                ),
            ));
        }
        for section in &file.sections {
            if section.representative.len() != dimension {
                return Err(StorageError::corrupt(
                    &sections_path,
                    format!("section '{}' has wrong vector length", section.title),
                ));
            }
            if let Some(id) = section
                .chunk_ids
                .iter()
                .find(|id| id.ordinal() >= chunks.len())
            {
                return Err(StorageError::corrupt(
                    &sections_path,
                    format!("section '{}' references missing chunk {}", section.title, id.value()),
                ));
            }
        }

        Ok(StoredIndex {
            metadata: file.metadata,
            index: DocumentIndex {
                dimension,
                sections: file.sections,
                chunks,
            },
        })
    }

    /// Remove a document's artifacts. Returns whether anything was removed.
    pub fn remove(&self, document_id: &str) -> StorageResult<bool> {
        let dir = self.document_dir(document_id);
        if !dir.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(dir)?;
        Ok(true)
    }

    /// Document ids with a persisted index, sorted.
    pub fn list(&self) -> StorageResult<Vec<String>> {
        if !self.base_path.exists() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.base_path)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') || !entry.file_type()?.is_dir() {
                continue;
            }
            if self.exists(&name) {
                ids.push(name);
            }
        }
        ids.sort();
        Ok(ids)
    }
}

fn write_sections(path: &Path, stored: &StoredIndex) -> StorageResult<()> {
    let file = SectionsFile {
        metadata: stored.metadata.clone(),
        sections: stored.index.sections.clone(),
    };
    let content = serde_json::to_string_pretty(&file)
        .map_err(|e| StorageError::Serialization(format!("Failed to serialize sections: {e}")))?;

    let mut out = File::create(path)?;
    out.write_all(content.as_bytes())?;
    out.sync_all()?;
    Ok(())
}

/// Binary layout (little-endian):
/// magic, dimension: u32, count: u32, then per chunk
/// `id, page_index, chunk_index: u32`, three length-prefixed UTF-8 strings
/// (file_id, section_title, content), `dimension` f32 values.
/// A SHA-256 of everything before it closes the file.
fn write_chunks(path: &Path, dimension: usize, chunks: &[DocumentChunk]) -> StorageResult<()> {
    let mut buf = Vec::with_capacity(16 + chunks.len() * (dimension * 4 + 64));
    buf.extend_from_slice(CHUNKS_MAGIC);
    put_u32(&mut buf, dimension_u32(dimension)?);
    put_u32(&mut buf, len_u32(chunks.len())?);

    for chunk in chunks {
        if chunk.embedding.len() != dimension {
            return Err(StorageError::DimensionMismatch {
                expected: dimension,
                actual: chunk.embedding.len(),
            });
        }
        buf.extend_from_slice(&chunk.id.to_bytes());
        put_u32(&mut buf, chunk.page_index);
        put_u32(&mut buf, chunk.chunk_index);
        put_str(&mut buf, &chunk.file_id)?;
        put_str(&mut buf, &chunk.section_title)?;
        put_str(&mut buf, &chunk.content)?;
        for value in &chunk.embedding {
            buf.extend_from_slice(&value.to_le_bytes());
        }
    }

    let checksum = Sha256::digest(&buf);

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&buf)?;
    writer.write_all(&checksum)?;
    let file = writer
        .into_inner()
        .map_err(|e| StorageError::Io(e.into_error()))?;
    file.sync_all()?;
    Ok(())
}

fn read_chunks(path: &Path) -> StorageResult<(usize, Vec<DocumentChunk>)> {
    let file = File::open(path)?;
    let len = file.metadata()?.len() as usize;
    if len < CHUNKS_MAGIC.len() + 8 + CHECKSUM_LEN {
        return Err(StorageError::corrupt(path, "file too short"));
    }

    // SAFETY: the file is only ever replaced by rename, never modified in place.
    let mmap = unsafe { MmapOptions::new().map(&file)? };

    let (body, checksum) = mmap.split_at(mmap.len() - CHECKSUM_LEN);
    if Sha256::digest(body).as_slice() != checksum {
        return Err(StorageError::corrupt(path, "checksum mismatch"));
    }

    let mut reader = ByteReader::new(body, path);
    if reader.take(CHUNKS_MAGIC.len())? != CHUNKS_MAGIC {
        return Err(StorageError::corrupt(path, "bad magic"));
    }
    let dimension = reader.u32()? as usize;
    let count = reader.u32()? as usize;

    let mut chunks = Vec::with_capacity(count.min(body.len() / 16));
    for position in 0..count {
        let raw_id = reader.array()?;
        let id = ChunkId::from_bytes(raw_id)
            .filter(|id| id.ordinal() == position)
            .ok_or_else(|| {
                StorageError::corrupt(
                    path,
                    format!("chunk id {} out of order", u32::from_le_bytes(raw_id)),
                )
            })?;
        let page_index = reader.u32()?;
        let chunk_index = reader.u32()?;
        let file_id = reader.string()?;
        let section_title = reader.string()?;
        let content = reader.string()?;
        let mut embedding = Vec::with_capacity(dimension);
        for _ in 0..dimension {
            embedding.push(f32::from_le_bytes(reader.array()?));
        }

        chunks.push(DocumentChunk {
            id,
            file_id,
            page_index,
            section_title,
            chunk_index,
            content,
            embedding,
        });
    }

    if !reader.is_at_end() {
        return Err(StorageError::corrupt(path, "trailing bytes"));
    }

    Ok((dimension, chunks))
}

fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn put_str(buf: &mut Vec<u8>, value: &str) -> StorageResult<()> {
    put_u32(buf, len_u32(value.len())?);
    buf.extend_from_slice(value.as_bytes());
    Ok(())
}

fn len_u32(len: usize) -> StorageResult<u32> {
    u32::try_from(len).map_err(|_| StorageError::Serialization(format!("length {len} exceeds u32")))
}

fn dimension_u32(dimension: usize) -> StorageResult<u32> {
    u32::try_from(dimension)
        .map_err(|_| StorageError::Serialization(format!("dimension {dimension} exceeds u32")))
}

/// Bounds-checked cursor over a mapped file.
struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    path: &'a Path,
}

impl<'a> ByteReader<'a> {
    fn new(data: &'a [u8], path: &'a Path) -> Self {
        Self { data, pos: 0, path }
    }

    fn take(&mut self, n: usize) -> StorageResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| StorageError::corrupt(self.path, "unexpected end of file"))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> StorageResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u32(&mut self) -> StorageResult<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn string(&mut self) -> StorageResult<String> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| StorageError::corrupt(self.path, "invalid UTF-8"))
    }

    fn is_at_end(&self) -> bool {
        self.pos == self.data.len()
    }
}

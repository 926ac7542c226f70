//! Store
//!
//! Owns the single backing file, the in-memory offset index, and all
//! read/write/delete/compaction logic. This is the only component that
//! performs file I/O.
//!
//! ## Layout
//! The file is `signature || record_1 || ... || record_n` with no padding
//! and no free-list. Removing or resizing one record therefore rewrites
//! every record that follows it (see [`Store::overwrite`]).
//!
//! ## Concurrency
//! A shared advisory lock is held for the Store's lifetime; it admits
//! concurrent readers but does not arbitrate writers. A single Store is
//! not safe for concurrent calls from multiple threads — the
//! truncate-then-append sequence in compaction is not atomic.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::{PackError, Result};
use crate::record::{
    self, RecordMeta, HEADER_SIZE, META_SIZE, SIGNATURE,
};

/// Persistent key-value store over a single flat file
///
/// The index maps each key to the file offset of its record's meta block.
/// It is rebuilt from a full scan on open and after every compaction, so
/// it always reflects the current on-disk contents.
pub struct Store {
    /// Path to the backing file
    path: PathBuf,

    /// Open read/write handle, held (and share-locked) for the lifetime
    file: File,

    /// key bytes → offset of the record's meta block
    index: BTreeMap<Vec<u8>, u64>,
}

impl Store {
    /// Open or create a store file at the given path
    ///
    /// Creates the file with just the signature byte if it does not exist.
    /// Fails with [`PackError::CorruptFile`] if the first byte of a
    /// non-empty file is not the signature; the file is left untouched.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        // Shared lock: readers may coexist, writer coordination is on the
        // callers. Held until drop. Called through the trait so the
        // like-named std inherent method (1.89+) cannot shadow it.
        FileExt::lock_shared(&file)?;

        let mut first = [0u8; 1];
        match file.read_exact(&mut first) {
            Ok(()) => {
                if first[0] != SIGNATURE {
                    return Err(PackError::CorruptFile(format!(
                        "bad signature byte 0x{:02X} in {}",
                        first[0],
                        path.display()
                    )));
                }
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                // Brand new or zero-byte file: stamp the signature.
                file.write_all(&[SIGNATURE])?;
            }
            Err(e) => return Err(e.into()),
        }

        let mut store = Self {
            path,
            file,
            index: BTreeMap::new(),
        };
        store.build_index()?;

        debug!(
            path = %store.path.display(),
            entries = store.index.len(),
            "store opened"
        );

        Ok(store)
    }

    /// Write a value under a key
    ///
    /// An already-indexed key goes through the compaction path so the file
    /// never holds two records for the same key; a new key is appended at
    /// end-of-file.
    pub fn write(&mut self, key: &[u8], value: &Value) -> Result<()> {
        record::check_key(key)?;

        if self.index.contains_key(key) {
            return self.overwrite(key, Some(value));
        }

        let encoded = record::encode_value(value)?;
        let offset = self.file.seek(SeekFrom::End(0))?;

        let mut buf = Vec::with_capacity(META_SIZE + key.len() + encoded.len());
        record::encode_record(&mut buf, key, &encoded)?;
        self.file.write_all(&buf)?;

        self.index.insert(key.to_vec(), offset);
        trace!(key_len = key.len(), value_len = encoded.len(), offset, "record appended");

        Ok(())
    }

    /// Read the value stored under a key
    ///
    /// Returns `Ok(None)` for an absent key. A payload that fails to
    /// decode surfaces as [`PackError::CorruptValue`], distinct from
    /// absence.
    pub fn read(&mut self, key: &[u8]) -> Result<Option<Value>> {
        let offset = match self.index.get(key) {
            Some(&off) => off,
            None => return Ok(None),
        };

        self.file.seek(SeekFrom::Start(offset))?;
        let meta = self.read_meta_at_index(offset)?;

        self.file.seek(SeekFrom::Current(meta.key_len as i64))?;
        let mut value = vec![0u8; meta.value_len as usize];
        self.file.read_exact(&mut value)?;

        record::decode_value(&value).map(Some)
    }

    /// Check whether a key is present — pure index lookup, no I/O
    pub fn exists(&self, key: &[u8]) -> bool {
        self.index.contains_key(key)
    }

    /// Delete a key's record; a no-op if the key is absent
    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        if self.index.contains_key(key) {
            self.overwrite(key, None)?;
        }
        Ok(())
    }

    /// Remove every record, leaving only the signature byte
    pub fn clear(&mut self) -> Result<()> {
        self.file.set_len(HEADER_SIZE)?;
        self.index.clear();
        Ok(())
    }

    /// Iterate over all stored keys (order unspecified)
    pub fn keys(&self) -> impl Iterator<Item = &[u8]> {
        self.index.keys().map(|k| k.as_slice())
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// True if no records are stored
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Current size of the backing file in bytes
    pub fn file_size(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Path to the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    // =========================================================================
    // Serde Sugar
    // =========================================================================

    /// Write any serializable value under a key
    pub fn put<T: Serialize>(&mut self, key: &[u8], value: &T) -> Result<()> {
        let value =
            serde_json::to_value(value).map_err(|e| PackError::CorruptValue(e.to_string()))?;
        self.write(key, &value)
    }

    /// Read and deserialize the value stored under a key
    pub fn get<T: DeserializeOwned>(&mut self, key: &[u8]) -> Result<Option<T>> {
        match self.read(key)? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| PackError::CorruptValue(e.to_string())),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Compaction
    // =========================================================================

    /// Replace or remove the record for an indexed key
    ///
    /// The format has no free-list and no tombstones, so this rebuilds the
    /// whole record region: everything before the target is copied
    /// unchanged, the replacement record (if any) is encoded in its place,
    /// everything after is copied unchanged, then the file is truncated to
    /// the header and the staged bytes are written back. O(file size) per
    /// call. Untouched records are copied byte-for-byte, never re-decoded.
    ///
    /// The index is rebuilt from a full re-scan afterwards: every record
    /// past the target may have shifted.
    fn overwrite(&mut self, key: &[u8], replacement: Option<&Value>) -> Result<()> {
        let target = match self.index.get(key) {
            Some(&off) => off,
            None => return Ok(()),
        };

        let file_len = self.file.metadata()?.len();

        self.file.seek(SeekFrom::Start(target))?;
        let meta = self.read_meta_at_index(target)?;
        let old_len = meta.record_len();

        let mut staged = Vec::with_capacity(file_len as usize);

        // Records before the target, unchanged. Empty when the target is
        // the first record.
        let before_len = (target - HEADER_SIZE) as usize;
        if before_len > 0 {
            let start = staged.len();
            staged.resize(start + before_len, 0);
            self.file.seek(SeekFrom::Start(HEADER_SIZE))?;
            self.file.read_exact(&mut staged[start..])?;
        }

        // The replacement record, or nothing on delete.
        if let Some(value) = replacement {
            let encoded = record::encode_value(value)?;
            record::encode_record(&mut staged, key, &encoded)?;
        }

        // Records after the target, unchanged. Empty when the target is
        // the last record.
        let after_start = target + old_len;
        if after_start < file_len {
            let start = staged.len();
            staged.resize(start + (file_len - after_start) as usize, 0);
            self.file.seek(SeekFrom::Start(after_start))?;
            self.file.read_exact(&mut staged[start..])?;
        }

        // Swap in the staged bytes. Not atomic against interleaved calls;
        // the lifetime lock plus synchronous calls serialize operations on
        // this handle.
        self.file.set_len(HEADER_SIZE)?;
        self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(&staged)?;

        debug!(
            key_len = key.len(),
            removed = old_len,
            rewritten = staged.len(),
            deleted = replacement.is_none(),
            "compacted record region"
        );

        self.build_index()
    }

    // =========================================================================
    // Index Build
    // =========================================================================

    /// Rebuild the index by scanning the record region
    ///
    /// Stops at end-of-file, a short meta block, or a zero length field
    /// (the sentinel). A record with a truncated key is treated as end of
    /// records rather than an error.
    fn build_index(&mut self) -> Result<()> {
        self.index.clear();

        let mut offset = self.file.seek(SeekFrom::Start(HEADER_SIZE))?;
        while let Some(meta) = read_meta(&mut self.file)? {
            if meta.is_sentinel() {
                break;
            }

            let mut key = vec![0u8; meta.key_len as usize];
            match self.file.read_exact(&mut key) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }

            trace!(offset, key_len = meta.key_len, value_len = meta.value_len, "indexed record");
            self.index.insert(key, offset);

            offset = self.file.seek(SeekFrom::Current(meta.value_len as i64))?;
        }

        Ok(())
    }

    /// Read the meta block at an offset the index claims holds a record
    fn read_meta_at_index(&mut self, offset: u64) -> Result<RecordMeta> {
        match read_meta(&mut self.file)? {
            Some(meta) if !meta.is_sentinel() => Ok(meta),
            _ => Err(PackError::InvalidRecord(format!(
                "index offset {} does not hold a record",
                offset
            ))),
        }
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        // Closing the handle would release the lock anyway; being explicit
        // keeps the release visible.
        let _ = FileExt::unlock(&self.file);
    }
}

/// Read the next 8-byte meta block, or `None` if fewer than 8 bytes remain
fn read_meta(file: &mut File) -> Result<Option<RecordMeta>> {
    let mut buf = [0u8; META_SIZE];
    match file.read_exact(&mut buf) {
        Ok(()) => Ok(Some(RecordMeta::parse(buf))),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e.into()),
    }
}

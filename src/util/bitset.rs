//! Liveness bitset for segment-level deletions.
//!
//! A segment never mutates its postings or value bytes; deleting a document
//! only flips a bit in the segment's [`LiveDocs`]. Updates are copy-on-write:
//! marking documents dead produces a new generation, and readers that opened
//! an older generation keep seeing it until they are reopened.

use bit_vec::BitVec;

use crate::error::{PeltaError, Result};
use crate::storage::{Storage, StorageInput, StorageOutput};
use std::io::{Read, Write};
use std::sync::Arc;

/// Magic prefix of a persisted liveness bitset.
const LIVE_DOCS_MAGIC: &[u8; 4] = b"PLIV";

/// Per-segment marker of which document ids are not deleted.
///
/// `None`-equivalent behavior (all documents live) is represented by callers
/// holding no `LiveDocs` at all; an instance always carries an explicit bit
/// per document.
#[derive(Debug, Clone)]
pub struct LiveDocs {
    bits: BitVec,
    live_count: u32,
}

impl LiveDocs {
    /// Create a bitset with all `max_doc` documents live.
    pub fn all_live(max_doc: u32) -> Self {
        LiveDocs {
            bits: BitVec::from_elem(max_doc as usize, true),
            live_count: max_doc,
        }
    }

    /// Number of documents covered (live or dead).
    pub fn len(&self) -> u32 {
        self.bits.len() as u32
    }

    /// True when the bitset covers zero documents.
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Number of live documents.
    pub fn live_count(&self) -> u32 {
        self.live_count
    }

    /// Number of deleted documents.
    pub fn deleted_count(&self) -> u32 {
        self.len() - self.live_count
    }

    /// Whether the given document is live. Out-of-range ids read as dead.
    pub fn is_live(&self, doc: u32) -> bool {
        self.bits.get(doc as usize).unwrap_or(false)
    }

    /// Return a copy with `doc` marked dead.
    ///
    /// The receiver is untouched; in-flight readers holding it never observe
    /// a half-updated bitset.
    pub fn with_deleted(&self, doc: u32) -> Result<LiveDocs> {
        if doc as usize >= self.bits.len() {
            return Err(PeltaError::invalid_operation(format!(
                "document {doc} out of range for live docs of length {}",
                self.bits.len()
            )));
        }
        let mut next = self.clone();
        if next.bits.get(doc as usize) == Some(true) {
            next.bits.set(doc as usize, false);
            next.live_count -= 1;
        }
        Ok(next)
    }

    /// Persist this bitset to `name` in the given storage.
    pub fn write(&self, storage: &Arc<dyn Storage>, name: &str) -> Result<()> {
        let mut output = storage.create_output(name)?;
        self.write_to(&mut output)?;
        output.flush_and_sync()?;
        output.close()?;
        Ok(())
    }

    fn write_to(&self, output: &mut Box<dyn StorageOutput>) -> Result<()> {
        output.write_all(LIVE_DOCS_MAGIC)?;
        output.write_all(&(self.bits.len() as u32).to_le_bytes())?;
        output.write_all(&self.live_count.to_le_bytes())?;
        output.write_all(&self.bits.to_bytes())?;
        Ok(())
    }

    /// Load a persisted bitset.
    pub fn load(storage: &Arc<dyn Storage>, name: &str) -> Result<LiveDocs> {
        let mut input = storage.open_input(name)?;
        let live_docs = Self::read_from(&mut input)?;
        input.close()?;
        Ok(live_docs)
    }

    fn read_from(input: &mut Box<dyn StorageInput>) -> Result<LiveDocs> {
        let mut magic = [0u8; 4];
        input.read_exact(&mut magic)?;
        if &magic != LIVE_DOCS_MAGIC {
            return Err(PeltaError::index("invalid live docs file"));
        }

        let mut len_buf = [0u8; 4];
        input.read_exact(&mut len_buf)?;
        let bit_len = u32::from_le_bytes(len_buf) as usize;

        let mut live_buf = [0u8; 4];
        input.read_exact(&mut live_buf)?;
        let live_count = u32::from_le_bytes(live_buf);

        let mut bytes = vec![0u8; bit_len.div_ceil(8)];
        input.read_exact(&mut bytes)?;

        let mut bits = BitVec::from_bytes(&bytes);
        bits.truncate(bit_len);

        if bits.iter().filter(|b| *b).count() as u32 != live_count {
            return Err(PeltaError::index(
                "live docs count does not match stored bits",
            ));
        }

        Ok(LiveDocs { bits, live_count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, StorageConfig};

    #[test]
    fn test_all_live() {
        let live = LiveDocs::all_live(10);
        assert_eq!(live.len(), 10);
        assert_eq!(live.live_count(), 10);
        assert_eq!(live.deleted_count(), 0);
        assert!(live.is_live(0));
        assert!(live.is_live(9));
        assert!(!live.is_live(10));
    }

    #[test]
    fn test_copy_on_write_delete() {
        let gen0 = LiveDocs::all_live(4);
        let gen1 = gen0.with_deleted(2).unwrap();

        // The old generation is untouched
        assert!(gen0.is_live(2));
        assert_eq!(gen0.live_count(), 4);

        assert!(!gen1.is_live(2));
        assert_eq!(gen1.live_count(), 3);

        // Deleting twice is idempotent
        let gen2 = gen1.with_deleted(2).unwrap();
        assert_eq!(gen2.live_count(), 3);
    }

    #[test]
    fn test_delete_out_of_range() {
        let live = LiveDocs::all_live(4);
        assert!(live.with_deleted(4).is_err());
    }

    #[test]
    fn test_persist_round_trip() {
        let storage: Arc<dyn Storage> =
            Arc::new(MemoryStorage::new(StorageConfig::default()));

        let mut live = LiveDocs::all_live(13);
        live = live.with_deleted(0).unwrap();
        live = live.with_deleted(7).unwrap();
        live = live.with_deleted(12).unwrap();

        live.write(&storage, "seg_0.liv.1").unwrap();
        let loaded = LiveDocs::load(&storage, "seg_0.liv.1").unwrap();

        assert_eq!(loaded.len(), 13);
        assert_eq!(loaded.live_count(), 10);
        for doc in 0..13 {
            assert_eq!(loaded.is_live(doc), live.is_live(doc));
        }
    }
}

//! Segments: immutable batches of documents plus their per-component files.
//!
//! A segment is created by a writer flush, mutated only by copy-on-write
//! liveness updates, and replaced wholesale by merge output. Its metadata,
//! codec manifest included, lives in one JSON file written atomically via
//! temp-file-and-rename.

pub mod check;
pub mod codec;
pub mod reader;
pub mod writer;

pub use check::*;
pub use codec::*;
pub use reader::*;
pub use writer::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PeltaError, Result};
use crate::field::FieldInfos;
use crate::storage::{Storage, StorageInput, StorageOutput};
use std::io::{Read, Write};
use std::sync::Arc;

/// Metadata of one sealed segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentMeta {
    /// Random unique id.
    pub id: String,
    /// Segment name, unique within the index (`seg_<n>`).
    pub name: String,
    /// Number of documents (0..max_doc), live or deleted.
    pub max_doc: u32,
    /// Name of the codec that wrote the segment's files.
    pub codec: String,
    /// When the segment was sealed.
    pub created_at: DateTime<Utc>,
    /// Component file names belonging to this segment.
    pub files: Vec<String>,
    /// Liveness generation; 0 means no deletions.
    pub del_gen: u64,
    /// The sealed field descriptors.
    pub field_infos: FieldInfos,
}

impl SegmentMeta {
    /// The metadata file name for a segment name.
    pub fn meta_file_name(segment_name: &str) -> String {
        format!("{segment_name}.meta.json")
    }

    /// The liveness bitset file for a generation.
    pub fn live_docs_file_name(segment_name: &str, del_gen: u64) -> String {
        format!("{segment_name}.liv.{del_gen}")
    }

    /// The current liveness file, if any documents were deleted.
    pub fn current_live_docs_file(&self) -> Option<String> {
        if self.del_gen == 0 {
            None
        } else {
            Some(Self::live_docs_file_name(&self.name, self.del_gen))
        }
    }

    /// Whether any documents were deleted.
    pub fn has_deletions(&self) -> bool {
        self.del_gen != 0
    }

    /// Persist atomically: write to a temp file, then rename into place.
    pub fn write(&self, storage: &Arc<dyn Storage>) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        let (temp_name, mut output) = storage.create_temp_output(&self.name)?;
        output.write_all(&json)?;
        output.flush_and_sync()?;
        output.close()?;
        storage.rename_file(&temp_name, &Self::meta_file_name(&self.name))?;
        Ok(())
    }

    /// Load a segment's metadata by name.
    pub fn load(storage: &Arc<dyn Storage>, segment_name: &str) -> Result<SegmentMeta> {
        let file_name = Self::meta_file_name(segment_name);
        let mut input = storage.open_input(&file_name)?;
        let mut bytes = Vec::new();
        input.read_to_end(&mut bytes)?;
        input.close()?;

        let meta: SegmentMeta = serde_json::from_slice(&bytes)?;
        if meta.name != segment_name {
            return Err(PeltaError::index(format!(
                "segment meta name mismatch: file {file_name} holds \"{}\"",
                meta.name
            )));
        }
        Ok(meta)
    }

    /// Delete every file belonging to this segment, including metadata and
    /// the current liveness generation. Missing files are ignored.
    pub fn delete_files(&self, storage: &Arc<dyn Storage>) -> Result<()> {
        for file in &self.files {
            let _ = storage.delete_file(file);
        }
        if let Some(liv) = self.current_live_docs_file() {
            let _ = storage.delete_file(&liv);
        }
        let _ = storage.delete_file(&Self::meta_file_name(&self.name));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, StorageConfig};

    fn meta() -> SegmentMeta {
        SegmentMeta {
            id: uuid::Uuid::new_v4().to_string(),
            name: "seg_0".to_string(),
            max_doc: 10,
            codec: "pelta90".to_string(),
            created_at: Utc::now(),
            files: vec!["seg_0.pst".to_string()],
            del_gen: 0,
            field_infos: FieldInfos::default(),
        }
    }

    #[test]
    fn test_meta_round_trip() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new(StorageConfig::default()));
        let meta = meta();
        meta.write(&storage).unwrap();

        let loaded = SegmentMeta::load(&storage, "seg_0").unwrap();
        assert_eq!(loaded.name, "seg_0");
        assert_eq!(loaded.max_doc, 10);
        assert_eq!(loaded.codec, "pelta90");
        assert_eq!(loaded.id, meta.id);
        assert!(!loaded.has_deletions());
    }

    #[test]
    fn test_meta_write_leaves_no_temp_files() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new(StorageConfig::default()));
        meta().write(&storage).unwrap();

        let files = storage.list_files().unwrap();
        assert_eq!(files, vec!["seg_0.meta.json".to_string()]);
    }

    #[test]
    fn test_live_docs_naming() {
        let mut m = meta();
        assert!(m.current_live_docs_file().is_none());
        m.del_gen = 3;
        assert_eq!(
            m.current_live_docs_file().unwrap(),
            "seg_0.liv.3".to_string()
        );
    }

    #[test]
    fn test_delete_files() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new(StorageConfig::default()));
        let m = meta();
        m.write(&storage).unwrap();
        {
            use std::io::Write;
            let mut out = storage.create_output("seg_0.pst").unwrap();
            out.write_all(b"x").unwrap();
            out.close().unwrap();
        }

        m.delete_files(&storage).unwrap();
        assert!(storage.list_files().unwrap().is_empty());
    }
}

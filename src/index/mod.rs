//! Index coordination: the multi-segment writer and reader.
//!
//! An index is a set of sealed segments listed in a `segments.json`
//! manifest, written atomically via temp-file-and-rename so a new segment
//! set becomes visible as a unit. The writer owns the single write path
//! (buffer, flush, delete, merge); readers are point-in-time snapshots of
//! the manifest.

pub mod reader;
pub mod writer;

pub use reader::*;
pub use writer::*;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::{Storage, StorageInput, StorageOutput};
use std::io::{Read, Write};
use std::sync::Arc;

/// Name of the index manifest file.
pub const SEGMENTS_FILE: &str = "segments.json";

/// The committed segment set of an index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentsManifest {
    /// Bumped on every commit.
    pub generation: u64,
    /// Counter for naming new segments.
    pub next_segment: u64,
    /// Names of the live segments, in creation order.
    pub segments: Vec<String>,
}

impl SegmentsManifest {
    /// Load the manifest, or an empty one when the index is new.
    pub fn load(storage: &Arc<dyn Storage>) -> Result<SegmentsManifest> {
        if !storage.file_exists(SEGMENTS_FILE) {
            return Ok(SegmentsManifest::default());
        }
        let mut input = storage.open_input(SEGMENTS_FILE)?;
        let mut bytes = Vec::new();
        input.read_to_end(&mut bytes)?;
        input.close()?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Persist atomically: temp file, then rename over the manifest.
    pub fn write(&self, storage: &Arc<dyn Storage>) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        let (temp_name, mut output) = storage.create_temp_output("segments")?;
        output.write_all(&json)?;
        output.flush_and_sync()?;
        output.close()?;
        storage.rename_file(&temp_name, SEGMENTS_FILE)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, StorageConfig};

    #[test]
    fn test_manifest_round_trip() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new(StorageConfig::default()));

        let empty = SegmentsManifest::load(&storage).unwrap();
        assert_eq!(empty.generation, 0);
        assert!(empty.segments.is_empty());

        let manifest = SegmentsManifest {
            generation: 3,
            next_segment: 5,
            segments: vec!["seg_0".to_string(), "seg_4".to_string()],
        };
        manifest.write(&storage).unwrap();

        let loaded = SegmentsManifest::load(&storage).unwrap();
        assert_eq!(loaded.generation, 3);
        assert_eq!(loaded.next_segment, 5);
        assert_eq!(loaded.segments.len(), 2);

        // No temp droppings
        assert_eq!(storage.list_files().unwrap(), vec![SEGMENTS_FILE.to_string()]);
    }
}

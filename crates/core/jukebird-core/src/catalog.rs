//! Audio catalog
//!
//! Static mapping of clip IDs and aliases to playable audio files, loaded
//! once at startup from a JSON descriptor. The catalog is shared read-only
//! by every voice session for the lifetime of the process.
//!
//! Failure model:
//! - missing clip folder or unreadable descriptor: fatal, the caller is
//!   expected to terminate the process
//! - a single entry whose audio file is missing: warning, entry skipped,
//!   loading continues

use crate::error::{JukebirdError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One playable audio clip. Immutable after catalog load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    /// Unique ID across the catalog
    pub id: String,
    /// Human-readable title
    pub display_name: String,
    /// Alternative names that resolve to this clip
    pub aliases: Vec<String>,
    /// Absolute or folder-relative path of the audio file
    pub path: PathBuf,
}

/// Shape of the JSON descriptor file
#[derive(Debug, Deserialize)]
struct CatalogDescriptor {
    clips: Vec<ClipEntry>,
}

#[derive(Debug, Deserialize)]
struct ClipEntry {
    id: String,
    display_name: String,
    #[serde(default)]
    aliases: Vec<String>,
    file_name: String,
}

/// Read-only registry of audio clips, indexed by ID and by alias.
#[derive(Debug)]
pub struct AudioCatalog {
    clips: HashMap<String, Arc<AudioClip>>,
    alias_index: HashMap<String, String>,
}

impl AudioCatalog {
    /// Loads the catalog from a JSON descriptor, verifying each referenced
    /// file exists under `clip_folder`.
    ///
    /// Entries pointing at a missing file are skipped with a warning.
    /// A duplicate alias silently remaps to the later entry (last one wins);
    /// whether that is desirable is an open point, so the remap is logged
    /// instead of rejected.
    pub fn load(descriptor_path: &Path, clip_folder: &Path) -> Result<Self> {
        if !clip_folder.is_dir() {
            return Err(JukebirdError::Catalog(format!(
                "clip folder not found: {}",
                clip_folder.display()
            )));
        }

        let raw = std::fs::read_to_string(descriptor_path).map_err(|e| {
            JukebirdError::Catalog(format!(
                "cannot read catalog descriptor {}: {e}",
                descriptor_path.display()
            ))
        })?;
        let descriptor: CatalogDescriptor = serde_json::from_str(&raw).map_err(|e| {
            JukebirdError::Catalog(format!(
                "malformed catalog descriptor {}: {e}",
                descriptor_path.display()
            ))
        })?;

        let mut clips: HashMap<String, Arc<AudioClip>> = HashMap::new();
        let mut alias_index: HashMap<String, String> = HashMap::new();

        for entry in descriptor.clips {
            let path = clip_folder.join(&entry.file_name);
            if !path.is_file() {
                warn!(
                    id = %entry.id,
                    file = %path.display(),
                    "missing audio file, skipping catalog entry"
                );
                continue;
            }

            for alias in &entry.aliases {
                if let Some(previous) = alias_index.insert(alias.clone(), entry.id.clone()) {
                    if previous != entry.id {
                        debug!(alias = %alias, from = %previous, to = %entry.id, "alias remapped");
                    }
                }
            }

            let clip = Arc::new(AudioClip {
                id: entry.id.clone(),
                display_name: entry.display_name,
                aliases: entry.aliases,
                path,
            });
            if clips.insert(entry.id.clone(), clip).is_some() {
                warn!(id = %entry.id, "duplicate clip id, later entry replaces earlier");
            }
        }

        info!(clips = clips.len(), "audio catalog loaded");
        Ok(Self { clips, alias_index })
    }

    /// Looks a clip up by its unique ID.
    pub fn resolve_id(&self, id: &str) -> Option<&Arc<AudioClip>> {
        self.clips.get(id)
    }

    /// Looks a clip up by one of its aliases.
    pub fn resolve_alias(&self, alias: &str) -> Option<&Arc<AudioClip>> {
        self.alias_index.get(alias).and_then(|id| self.clips.get(id))
    }

    /// Looks a clip up by alias first, then by ID.
    pub fn resolve(&self, name_or_id: &str) -> Option<&Arc<AudioClip>> {
        self.resolve_alias(name_or_id)
            .or_else(|| self.resolve_id(name_or_id))
    }

    /// Whether any clip answers to the given alias or ID.
    pub fn contains(&self, name_or_id: &str) -> bool {
        self.alias_index.contains_key(name_or_id) || self.clips.contains_key(name_or_id)
    }

    /// Iterates over every registered clip (unordered).
    pub fn clips(&self) -> impl Iterator<Item = &Arc<AudioClip>> {
        self.clips.values()
    }

    /// Number of loaded clips.
    pub fn len(&self) -> usize {
        self.clips.len()
    }

    /// Whether the catalog holds no clips.
    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }
}

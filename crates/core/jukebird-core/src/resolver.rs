//! Locator resolution
//!
//! [`CatalogResolver`] implements the [`ClipResolver`] port on top of the
//! audio catalog, with a filesystem fallback: a locator that is no known
//! clip may still point at an audio file or a folder of them. Filesystem
//! probing runs on the blocking pool.

use crate::catalog::AudioCatalog;
use crate::voice::ports::{ClipResolver, LoadOutcome, Track};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Resolves locators against the catalog first, then the filesystem.
pub struct CatalogResolver {
    catalog: Arc<AudioCatalog>,
}

impl CatalogResolver {
    pub fn new(catalog: Arc<AudioCatalog>) -> Self {
        Self { catalog }
    }

    /// Lists the playable entries of a folder in name order.
    fn read_folder(path: &Path) -> std::io::Result<Vec<Track>> {
        let mut tracks = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let entry_path = entry.path();
            if entry_path.is_file() {
                tracks.push(Track {
                    locator: entry.file_name().to_string_lossy().into_owned(),
                    path: entry_path,
                });
            }
        }
        tracks.sort_by(|a, b| a.locator.cmp(&b.locator));
        Ok(tracks)
    }

    fn resolve_path(locator: &str) -> LoadOutcome {
        let path = PathBuf::from(locator);
        if path.is_file() {
            return LoadOutcome::TrackLoaded(Track {
                locator: locator.to_string(),
                path,
            });
        }
        if path.is_dir() {
            return match Self::read_folder(&path) {
                Ok(tracks) => LoadOutcome::PlaylistLoaded {
                    tracks,
                    selected: None,
                },
                Err(e) => LoadOutcome::LoadFailed(format!(
                    "cannot list folder {}: {e}",
                    path.display()
                )),
            };
        }
        LoadOutcome::NoMatches
    }
}

#[async_trait]
impl ClipResolver for CatalogResolver {
    async fn resolve(&self, locator: &str) -> LoadOutcome {
        if let Some(clip) = self.catalog.resolve(locator) {
            debug!(locator = %locator, clip = %clip.id, "locator resolved via catalog");
            return LoadOutcome::TrackLoaded(Track {
                locator: locator.to_string(),
                path: clip.path.clone(),
            });
        }

        let probe = locator.to_string();
        match tokio::task::spawn_blocking(move || Self::resolve_path(&probe)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(locator = %locator, error = %e, "filesystem probe task failed");
                LoadOutcome::LoadFailed(format!("filesystem probe failed: {e}"))
            }
        }
    }
}

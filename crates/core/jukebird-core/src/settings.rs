//! Per-group settings
//!
//! Small mutable knobs a group can change at runtime: the designated voice
//! channel for reconnects and the designated clip for looped playback.
//! Each group is persisted as one JSON file under the settings directory
//! and cached in memory after first read. A corrupt file is reported and
//! treated as empty rather than taking the group down.

use crate::error::{JukebirdError, Result};
use crate::types::{ChannelRef, GroupId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Settings of one call group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSettings {
    /// Channel used by recovery and by `connect` without an explicit target
    #[serde(default)]
    pub designated_channel: Option<ChannelRef>,
    /// Clip replayed by the loop listener when a track ends naturally
    #[serde(default)]
    pub designated_clip: Option<String>,
}

/// Disk-backed store of [`GroupSettings`], one JSON file per group.
pub struct SettingsStore {
    dir: PathBuf,
    cache: Mutex<HashMap<GroupId, GroupSettings>>,
    /// Serializes disk writes; never held together with `cache`.
    io: Mutex<()>,
}

impl SettingsStore {
    /// Opens the store, creating the settings directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            JukebirdError::Config(format!(
                "cannot create settings directory {}: {e}",
                dir.display()
            ))
        })?;
        Ok(Self {
            dir,
            cache: Mutex::new(HashMap::new()),
            io: Mutex::new(()),
        })
    }

    /// Returns the group's settings, defaults if none were stored yet.
    pub fn get(&self, group: GroupId) -> GroupSettings {
        let mut cache = self.cache.lock();
        cache
            .entry(group)
            .or_insert_with(|| self.load_from_disk(group))
            .clone()
    }

    /// Applies a mutation to the group's settings and persists the result.
    ///
    /// The cache mutex is released before any disk I/O; readers on other
    /// tasks never wait on the filesystem.
    pub fn update(
        &self,
        group: GroupId,
        mutate: impl FnOnce(&mut GroupSettings),
    ) -> Result<GroupSettings> {
        let updated = {
            let mut cache = self.cache.lock();
            let settings = cache
                .entry(group)
                .or_insert_with(|| self.load_from_disk(group));
            mutate(settings);
            settings.clone()
        };
        // re-snapshot under the io lock: the file always ends up holding
        // the newest cache state, whatever order racing updates land in
        let _io = self.io.lock();
        let snapshot = self
            .cache
            .lock()
            .get(&group)
            .cloned()
            .unwrap_or_default();
        self.store_to_disk(group, &snapshot)?;
        Ok(updated)
    }

    /// Sets the designated voice channel.
    pub fn set_designated_channel(&self, group: GroupId, channel: ChannelRef) -> Result<()> {
        self.update(group, |s| s.designated_channel = Some(channel))?;
        Ok(())
    }

    /// Sets (or clears) the designated clip.
    pub fn set_designated_clip(&self, group: GroupId, clip: Option<String>) -> Result<()> {
        self.update(group, |s| s.designated_clip = clip)?;
        Ok(())
    }

    fn file_for(&self, group: GroupId) -> PathBuf {
        self.dir.join(format!("{group}.json"))
    }

    fn load_from_disk(&self, group: GroupId) -> GroupSettings {
        let path = self.file_for(group);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(group = %group, "no stored settings, using defaults");
                return GroupSettings::default();
            }
            Err(e) => {
                warn!(group = %group, file = %path.display(), error = %e, "cannot read settings file, using defaults");
                return GroupSettings::default();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(group = %group, file = %path.display(), error = %e, "corrupt settings file, using defaults");
                GroupSettings::default()
            }
        }
    }

    fn store_to_disk(&self, group: GroupId, settings: &GroupSettings) -> Result<()> {
        let path = self.file_for(group);
        let raw = serde_json::to_string_pretty(settings)?;
        std::fs::write(&path, raw).map_err(|e| {
            JukebirdError::Config(format!(
                "cannot write settings file {}: {e}",
                path.display()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_for_unknown_group() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::open(dir.path()).unwrap();

        assert_eq!(store.get(GroupId(1)), GroupSettings::default());
    }

    #[test]
    fn test_update_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SettingsStore::open(dir.path()).unwrap();
            store.set_designated_channel(GroupId(1), ChannelRef(42)).unwrap();
            store
                .set_designated_clip(GroupId(1), Some("nyan".into()))
                .unwrap();
        }

        // fresh store, cold cache
        let store = SettingsStore::open(dir.path()).unwrap();
        let settings = store.get(GroupId(1));
        assert_eq!(settings.designated_channel, Some(ChannelRef(42)));
        assert_eq!(settings.designated_clip.as_deref(), Some("nyan"));
    }

    #[test]
    fn test_groups_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::open(dir.path()).unwrap();
        store.set_designated_clip(GroupId(1), Some("nyan".into())).unwrap();

        assert_eq!(store.get(GroupId(2)), GroupSettings::default());
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("9.json"), b"{ not json").unwrap();

        let store = SettingsStore::open(dir.path()).unwrap();
        assert_eq!(store.get(GroupId(9)), GroupSettings::default());
    }

    #[test]
    fn test_concurrent_updates_keep_both_fields() {
        use std::sync::Arc;

        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SettingsStore::open(dir.path()).unwrap());

        let a = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                store.set_designated_channel(GroupId(1), ChannelRef(42)).unwrap();
            })
        };
        let b = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                store
                    .set_designated_clip(GroupId(1), Some("nyan".into()))
                    .unwrap();
            })
        };
        a.join().unwrap();
        b.join().unwrap();

        // fresh store, cold cache: the file must hold the merged state
        let store = SettingsStore::open(dir.path()).unwrap();
        let settings = store.get(GroupId(1));
        assert_eq!(settings.designated_channel, Some(ChannelRef(42)));
        assert_eq!(settings.designated_clip.as_deref(), Some("nyan"));
    }

    #[test]
    fn test_clearing_designated_clip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::open(dir.path()).unwrap();
        store.set_designated_clip(GroupId(1), Some("nyan".into())).unwrap();
        store.set_designated_clip(GroupId(1), None).unwrap();

        assert_eq!(store.get(GroupId(1)).designated_clip, None);
    }
}

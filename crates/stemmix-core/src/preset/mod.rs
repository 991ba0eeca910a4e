//! Mix presets
//!
//! A preset is a snapshot of the whole mix of one track: master volume plus
//! every stem's volume, mute, solo and effect settings. All presets of a
//! track live in one JSON document under `mix-presets/{track_id}`:
//!
//! ```json
//! {
//!   "last": { "id": "last", "name": "Last mix", ... },
//!   "presets": [ { "id": "0b7c…", "name": "Acapella", ... } ]
//! }
//! ```
//!
//! `last` is the quick-save slot. It is overwritten on every quick save and
//! never appears in [`MixPresetStore::list_presets`].
//!
//! Loading only returns the snapshot. Re-applying it goes through the same
//! setters as user interaction (see `MixSession::apply_preset`).

mod error;
mod kv;

pub use error::{PresetError, PresetResult};
pub use kv::{FileStore, KeyValueStore, MemoryStore};

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::effect::StemEffects;
use crate::mixer::StemChannelState;
use crate::types::{clamp_unit, StemId};

/// Id of the quick-save snapshot
pub const QUICK_SAVE_ID: &str = "last";

const QUICK_SAVE_NAME: &str = "Last mix";

const KEY_PREFIX: &str = "mix-presets";

/// Channel state and effects of one stem inside a preset
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StemSnapshot {
    pub volume: f32,
    pub muted: bool,
    pub solo: bool,
    #[serde(default)]
    pub effects: StemEffects,
}

impl StemSnapshot {
    pub fn new(channel: StemChannelState, effects: StemEffects) -> Self {
        Self {
            volume: channel.volume,
            muted: channel.muted,
            solo: channel.solo,
            effects,
        }
    }

    pub fn channel(&self) -> StemChannelState {
        StemChannelState {
            volume: self.volume,
            muted: self.muted,
            solo: self.solo,
        }
    }
}

/// Combine channel states and effects into per-stem snapshots
///
/// Stems without stored effects get the defaults.
pub fn snapshot_stems(
    channels: &BTreeMap<StemId, StemChannelState>,
    effects: &BTreeMap<StemId, StemEffects>,
) -> BTreeMap<StemId, StemSnapshot> {
    channels
        .iter()
        .map(|(id, channel)| {
            let fx = effects.get(id).copied().unwrap_or_default();
            (id.clone(), StemSnapshot::new(*channel, fx))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixPreset {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub master_volume: f32,
    pub stems: BTreeMap<StemId, StemSnapshot>,
}

impl MixPreset {
    pub fn is_quick_save(&self) -> bool {
        self.id == QUICK_SAVE_ID
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct PresetDocument {
    last: Option<MixPreset>,
    presets: Vec<MixPreset>,
}

/// Preset storage for one track
pub struct MixPresetStore {
    store: Box<dyn KeyValueStore>,
    track_id: String,
}

impl MixPresetStore {
    pub fn new(store: Box<dyn KeyValueStore>, track_id: impl Into<String>) -> Self {
        Self {
            store,
            track_id: track_id.into(),
        }
    }

    pub fn track_id(&self) -> &str {
        &self.track_id
    }

    /// Point the store at another track's presets
    pub fn set_track(&mut self, track_id: impl Into<String>) {
        self.track_id = track_id.into();
    }

    fn key(&self) -> String {
        format!("{}/{}", KEY_PREFIX, self.track_id)
    }

    fn read(&self) -> PresetResult<PresetDocument> {
        let key = self.key();
        let Some(raw) = self.store.get(&key)? else {
            return Ok(PresetDocument::default());
        };
        match serde_json::from_str(&raw) {
            Ok(document) => Ok(document),
            Err(e) => {
                log::warn!("presets: ignoring corrupt document {}: {}", key, e);
                Ok(PresetDocument::default())
            }
        }
    }

    fn write(&mut self, document: &PresetDocument) -> PresetResult<()> {
        let json = serde_json::to_string_pretty(document)?;
        let key = self.key();
        self.store.set(&key, &json)
    }

    /// Overwrite the quick-save snapshot
    pub fn quick_save(
        &mut self,
        master_volume: f32,
        channels: &BTreeMap<StemId, StemChannelState>,
        effects: &BTreeMap<StemId, StemEffects>,
    ) -> PresetResult<MixPreset> {
        let mut document = self.read()?;
        let now = Utc::now();
        let created_at = document.last.as_ref().map_or(now, |last| last.created_at);

        let preset = MixPreset {
            id: QUICK_SAVE_ID.to_string(),
            name: QUICK_SAVE_NAME.to_string(),
            created_at,
            updated_at: now,
            master_volume: clamp_unit(master_volume),
            stems: snapshot_stems(channels, effects),
        };
        document.last = Some(preset.clone());
        self.write(&document)?;
        log::info!("presets: quick save for track {}", self.track_id);
        Ok(preset)
    }

    /// Save a named snapshot
    ///
    /// Saving under an existing name overwrites that preset, keeping its id
    /// and creation time.
    pub fn save_preset(
        &mut self,
        name: &str,
        master_volume: f32,
        channels: &BTreeMap<StemId, StemChannelState>,
        effects: &BTreeMap<StemId, StemEffects>,
    ) -> PresetResult<MixPreset> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PresetError::EmptyName);
        }

        let mut document = self.read()?;
        let now = Utc::now();
        let stems = snapshot_stems(channels, effects);
        let master_volume = clamp_unit(master_volume);

        let preset = match document.presets.iter_mut().find(|p| p.name == name) {
            Some(existing) => {
                existing.updated_at = now;
                existing.master_volume = master_volume;
                existing.stems = stems;
                log::info!("presets: updated '{}' ({})", name, existing.id);
                existing.clone()
            }
            None => {
                let preset = MixPreset {
                    id: uuid::Uuid::new_v4().to_string(),
                    name: name.to_string(),
                    created_at: now,
                    updated_at: now,
                    master_volume,
                    stems,
                };
                log::info!("presets: saved '{}' ({})", name, preset.id);
                document.presets.push(preset.clone());
                preset
            }
        };

        self.write(&document)?;
        Ok(preset)
    }

    /// Named presets sorted by name. The quick-save slot is never listed.
    pub fn list_presets(&self) -> PresetResult<Vec<MixPreset>> {
        let mut presets = self.read()?.presets;
        presets.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(presets)
    }

    /// Look up a preset by id (`"last"` for the quick-save slot)
    pub fn load_preset(&self, id: &str) -> PresetResult<Option<MixPreset>> {
        let document = self.read()?;
        if id == QUICK_SAVE_ID {
            return Ok(document.last);
        }
        Ok(document.presets.into_iter().find(|p| p.id == id))
    }

    /// Remove a preset. Returns whether anything was deleted.
    pub fn delete_preset(&mut self, id: &str) -> PresetResult<bool> {
        let mut document = self.read()?;
        let removed = if id == QUICK_SAVE_ID {
            document.last.take().is_some()
        } else {
            let before = document.presets.len();
            document.presets.retain(|p| p.id != id);
            document.presets.len() != before
        };

        if removed {
            self.write(&document)?;
            log::info!("presets: deleted {}", id);
        }
        Ok(removed)
    }
}

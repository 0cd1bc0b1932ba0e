//! Registry of loaded constructions.
//!
//! Holds the live aggregates by id, tracks which actor is editing which
//! construction (one editor at a time), and implements the lifecycle
//! operations that span the registry and durable storage: load, save,
//! rename and destroy.

use crate::construction::Construction;
use crate::error::{Result, ValidationError};
use crate::placement::{PlacementEngine, RemovalMode, RemovalReport};
use crate::store::{ConstructionRecord, ConstructionStore};
use crate::types::BlockPos;
use crate::world::World;
use log::{debug, info};
use std::collections::HashMap;

pub struct ConstructionRegistry {
    constructions: HashMap<String, Construction>,
    /// construction id → actor id
    editors: HashMap<String, String>,
}

impl ConstructionRegistry {
    pub fn new() -> Self {
        Self {
            constructions: HashMap::new(),
            editors: HashMap::new(),
        }
    }

    pub fn insert(
        &mut self,
        construction: Construction,
    ) -> std::result::Result<(), ValidationError> {
        if self.constructions.contains_key(construction.id()) {
            return Err(ValidationError::ConstructionExists(construction.id().to_string()));
        }
        self.constructions
            .insert(construction.id().to_string(), construction);
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Option<Construction> {
        self.editors.remove(id);
        self.constructions.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&Construction> {
        self.constructions.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Construction> {
        self.constructions.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.constructions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.constructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructions.is_empty()
    }

    /// Loaded ids in sorted order.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.constructions.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Constructions whose bounds contain `pos`, sorted by id.
    pub fn find_containing(&self, pos: BlockPos) -> Vec<&Construction> {
        let mut found: Vec<&Construction> = self
            .constructions
            .values()
            .filter(|c| c.bounds().contains(pos))
            .collect();
        found.sort_by(|a, b| a.id().cmp(b.id()));
        found
    }

    /// The construction tracking the block at `pos`, if any.
    pub fn owner_of(&self, pos: BlockPos) -> Option<&Construction> {
        self.constructions.values().find(|c| c.contains_block(pos))
    }

    // -----------------------------------------------------------------------
    // Editing locks
    // -----------------------------------------------------------------------

    /// Claim `id` for editing by `actor_id`. Re-claiming by the same actor
    /// succeeds; another actor's claim is reported back as `Err(editor)`.
    pub fn begin_edit(&mut self, id: &str, actor_id: &str) -> std::result::Result<(), String> {
        match self.editors.get(id) {
            Some(editor) if editor != actor_id => Err(editor.clone()),
            _ => {
                self.editors.insert(id.to_string(), actor_id.to_string());
                Ok(())
            }
        }
    }

    pub fn end_edit(&mut self, id: &str) -> Option<String> {
        self.editors.remove(id)
    }

    pub fn is_being_edited(&self, id: &str) -> bool {
        self.editors.contains_key(id)
    }

    pub fn editor_of(&self, id: &str) -> Option<&str> {
        self.editors.get(id).map(String::as_str)
    }

    // -----------------------------------------------------------------------
    // Storage
    // -----------------------------------------------------------------------

    /// Load `id` from `store` unless it is already resident. Returns `false`
    /// when the store has no such construction.
    pub fn load(&mut self, id: &str, store: &dyn ConstructionStore) -> Result<bool> {
        if self.contains(id) {
            return Ok(true);
        }
        let Some(record) = store.load(id)? else {
            return Ok(false);
        };
        let construction = record.into_construction()?;
        debug!(
            "Loaded '{}' ({} blocks, {} rooms)",
            id,
            construction.block_count(),
            construction.room_count()
        );
        self.insert(construction)?;
        Ok(true)
    }

    /// Load every stored construction; returns how many were newly loaded.
    pub fn load_all(&mut self, store: &dyn ConstructionStore) -> Result<usize> {
        let mut loaded = 0;
        for id in store.list()? {
            if self.contains(&id) {
                continue;
            }
            if self.load(&id, store)? {
                loaded += 1;
            }
        }
        info!("Loaded {} constructions from storage", loaded);
        Ok(loaded)
    }

    pub fn save(&self, id: &str, store: &dyn ConstructionStore, world: &dyn World) -> Result<()> {
        let construction = self
            .get(id)
            .ok_or_else(|| ValidationError::UnknownConstruction(id.to_string()))?;
        store.save(&ConstructionRecord::capture(construction, world))?;
        Ok(())
    }

    /// Move a construction to a new id, in memory and in storage.
    pub fn rename(
        &mut self,
        old_id: &str,
        new_id: &str,
        store: &dyn ConstructionStore,
        world: &dyn World,
    ) -> Result<()> {
        let existing = self
            .get(old_id)
            .ok_or_else(|| ValidationError::UnknownConstruction(old_id.to_string()))?;
        if self.contains(new_id) || store.load(new_id)?.is_some() {
            return Err(ValidationError::ConstructionExists(new_id.to_string()).into());
        }
        let renamed = existing.copy_with_new_id(new_id)?;

        store.save(&ConstructionRecord::capture(&renamed, world))?;
        store.delete(old_id)?;
        let editor = self.editors.remove(old_id);
        self.constructions.remove(old_id);
        self.constructions.insert(new_id.to_string(), renamed);
        if let Some(editor) = editor {
            self.editors.insert(new_id.to_string(), editor);
        }
        info!("Renamed construction '{}' to '{}'", old_id, new_id);
        Ok(())
    }

    /// Permanently destroy a construction: its footprint is cleared with
    /// `Destroy` semantics and its stored record deleted.
    pub fn destroy(
        &mut self,
        id: &str,
        engine: &PlacementEngine,
        world: &mut dyn World,
        store: &dyn ConstructionStore,
    ) -> Result<RemovalReport> {
        let mut construction = self
            .remove(id)
            .ok_or_else(|| ValidationError::UnknownConstruction(id.to_string()))?;
        let report = engine.remove(&mut construction, RemovalMode::Destroy, world);
        store.delete(id)?;
        info!(
            "Destroyed construction '{}' ({} blocks cleared)",
            id, report.blocks_cleared
        );
        Ok(report)
    }
}

impl Default for ConstructionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

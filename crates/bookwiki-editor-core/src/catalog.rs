//! Entity catalog: one ordered lookup list over every namespace.
//!
//! The backend serves each namespace as its own collection. `CatalogAdapter`
//! keeps the raw collections and rebuilds the merged `EntityCatalog` only when
//! one of them changes, handing out the same `Arc` otherwise so consumers can
//! compare by pointer.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::entity::{EmoteRef, EntityRef, Namespace, StoryEntity};

/// A story entity as returned by the backend. Extra fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEntity {
    pub id: u64,
    pub name: SmolStr,
}

/// An emote as returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEmote {
    pub id: u64,
    pub name: SmolStr,
    pub image_url: SmolStr,
}

impl From<RawEmote> for EmoteRef {
    fn from(raw: RawEmote) -> Self {
        EmoteRef {
            id: Some(raw.id),
            name: raw.name,
            image_url: raw.image_url,
        }
    }
}

/// Merged, ordered list of every entity the editor can reference.
///
/// Order is characters, items, locations, lore, emotes; within a namespace the
/// backend's order is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityCatalog {
    entries: Vec<EntityRef>,
}

impl EntityCatalog {
    pub fn new(entries: Vec<EntityRef>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[EntityRef] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find a story entity by namespace and numeric id.
    pub fn resolve(&self, namespace: Namespace, id: u64) -> Option<&EntityRef> {
        self.entries
            .iter()
            .find(|e| e.namespace() == namespace && e.story_id() == Some(id))
    }

    /// Reverse lookup of an emote by its image URL.
    pub fn emote_by_url(&self, url: &str) -> Option<&EmoteRef> {
        self.emotes().find(|e| e.image_url == url)
    }

    pub fn emote_by_name(&self, name: &str) -> Option<&EmoteRef> {
        self.emotes().find(|e| e.name == name)
    }

    /// Entities reachable through the `#` trigger, in catalog order.
    pub fn mentionables(&self) -> impl Iterator<Item = &EntityRef> {
        self.entries.iter().filter(|e| e.namespace().is_mentionable())
    }

    pub fn emotes(&self) -> impl Iterator<Item = &EmoteRef> {
        self.entries.iter().filter_map(|e| match e {
            EntityRef::Emote(emote) => Some(emote),
            _ => None,
        })
    }

    /// Whether renaming emote `emote_id` to `name` would collide with another
    /// emote of the same story.
    pub fn emote_name_taken(&self, emote_id: u64, name: &str) -> bool {
        self.emotes()
            .any(|e| e.id != Some(emote_id) && e.name == name)
    }
}

/// Source collections for the catalog, tracked by revision.
#[derive(Debug, Default)]
pub struct CatalogAdapter {
    characters: Vec<RawEntity>,
    items: Vec<RawEntity>,
    locations: Vec<RawEntity>,
    lore: Vec<RawEntity>,
    emotes: Vec<RawEmote>,
    emote_story: Option<u64>,
    revision: u64,
    cached: Option<(u64, Arc<EntityCatalog>)>,
}

impl CatalogAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the collection for one of the four story namespaces.
    ///
    /// Emotes go through [`CatalogAdapter::set_emotes`]; passing
    /// `Namespace::Emote` here is ignored.
    pub fn set_collection(&mut self, namespace: Namespace, entities: Vec<RawEntity>) {
        let slot = match namespace {
            Namespace::Character => &mut self.characters,
            Namespace::Item => &mut self.items,
            Namespace::Location => &mut self.locations,
            Namespace::Lore => &mut self.lore,
            Namespace::Emote => {
                tracing::warn!("emotes must be set per story, ignoring collection");
                return;
            }
        };
        if *slot != entities {
            *slot = entities;
            self.revision += 1;
        }
    }

    /// Replace the emote set for `story_id`.
    pub fn set_emotes(&mut self, story_id: u64, emotes: Vec<RawEmote>) {
        if self.emote_story != Some(story_id) || self.emotes != emotes {
            self.emote_story = Some(story_id);
            self.emotes = emotes;
            self.revision += 1;
        }
    }

    /// Story the current emote set belongs to.
    pub fn emote_story(&self) -> Option<u64> {
        self.emote_story
    }

    /// Drop an emote from the catalog. Documents embedding its image are not
    /// touched and simply lose the name lookup.
    pub fn remove_emote(&mut self, emote_id: u64) -> bool {
        let before = self.emotes.len();
        self.emotes.retain(|e| e.id != emote_id);
        let removed = self.emotes.len() != before;
        if removed {
            self.revision += 1;
        }
        removed
    }

    /// Apply a backend-confirmed rename to the local emote set.
    pub fn rename_emote(&mut self, emote_id: u64, name: impl Into<SmolStr>) -> bool {
        let name = name.into();
        match self.emotes.iter_mut().find(|e| e.id == emote_id) {
            Some(emote) if emote.name != name => {
                emote.name = name;
                self.revision += 1;
                true
            }
            _ => false,
        }
    }

    /// Current merged catalog. Pointer-identical across calls until a source
    /// collection changes.
    pub fn catalog(&mut self) -> Arc<EntityCatalog> {
        if let Some((rev, catalog)) = &self.cached {
            if *rev == self.revision {
                return catalog.clone();
            }
        }

        let catalog = Arc::new(self.build());
        tracing::debug!(
            revision = self.revision,
            entries = catalog.len(),
            "rebuilt entity catalog"
        );
        self.cached = Some((self.revision, catalog.clone()));
        catalog
    }

    fn build(&self) -> EntityCatalog {
        let story = |namespace: Namespace, raw: &[RawEntity]| {
            raw.iter()
                .filter_map(move |r| {
                    EntityRef::story(namespace, StoryEntity::new(r.id, r.name.clone()))
                })
                .collect::<Vec<_>>()
        };

        let mut entries = Vec::with_capacity(
            self.characters.len()
                + self.items.len()
                + self.locations.len()
                + self.lore.len()
                + self.emotes.len(),
        );
        entries.extend(story(Namespace::Character, &self.characters));
        entries.extend(story(Namespace::Item, &self.items));
        entries.extend(story(Namespace::Location, &self.locations));
        entries.extend(story(Namespace::Lore, &self.lore));
        entries.extend(
            self.emotes
                .iter()
                .cloned()
                .map(|e| EntityRef::Emote(e.into())),
        );
        EntityCatalog::new(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(id: u64, name: &str) -> RawEntity {
        RawEntity {
            id,
            name: name.into(),
        }
    }

    fn emote(id: u64, name: &str, url: &str) -> RawEmote {
        RawEmote {
            id,
            name: name.into(),
            image_url: url.into(),
        }
    }

    fn adapter() -> CatalogAdapter {
        let mut adapter = CatalogAdapter::new();
        adapter.set_collection(Namespace::Lore, vec![raw(1, "The Sundering")]);
        adapter.set_collection(Namespace::Character, vec![raw(5, "Mara"), raw(6, "Ilsa")]);
        adapter.set_collection(Namespace::Item, vec![raw(5, "Lantern")]);
        adapter.set_emotes(9, vec![emote(1, "wave", "/uploads/wave.png")]);
        adapter
    }

    #[test]
    fn test_catalog_order_is_by_namespace() {
        let catalog = adapter().catalog();
        let names: Vec<_> = catalog.entries().iter().map(|e| e.display_name()).collect();
        assert_eq!(names, ["Mara", "Ilsa", "Lantern", "The Sundering", "wave"]);
    }

    #[test]
    fn test_resolve_respects_namespace() {
        let catalog = adapter().catalog();
        assert_eq!(
            catalog
                .resolve(Namespace::Character, 5)
                .map(|e| e.display_name()),
            Some("Mara")
        );
        assert_eq!(
            catalog.resolve(Namespace::Item, 5).map(|e| e.display_name()),
            Some("Lantern")
        );
        assert!(catalog.resolve(Namespace::Location, 5).is_none());
    }

    #[test]
    fn test_catalog_is_reference_stable() {
        let mut adapter = adapter();
        let first = adapter.catalog();
        let second = adapter.catalog();
        assert!(Arc::ptr_eq(&first, &second));

        // Same contents again is not a change.
        adapter.set_collection(Namespace::Item, vec![raw(5, "Lantern")]);
        assert!(Arc::ptr_eq(&first, &adapter.catalog()));

        adapter.set_collection(Namespace::Item, vec![raw(5, "Lamp")]);
        let third = adapter.catalog();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(
            third.resolve(Namespace::Item, 5).map(|e| e.display_name()),
            Some("Lamp")
        );
    }

    #[test]
    fn test_emote_lookup_and_removal() {
        let mut adapter = adapter();
        let catalog = adapter.catalog();
        assert_eq!(
            catalog.emote_by_url("/uploads/wave.png").map(|e| e.name.as_str()),
            Some("wave")
        );
        assert_eq!(catalog.mentionables().count(), 4);

        assert!(adapter.remove_emote(1));
        assert!(!adapter.remove_emote(1));
        assert!(adapter.catalog().emote_by_url("/uploads/wave.png").is_none());
    }

    #[test]
    fn test_emote_name_conflicts() {
        let mut adapter = CatalogAdapter::new();
        adapter.set_emotes(
            1,
            vec![
                emote(1, "wave", "/uploads/wave.png"),
                emote(2, "smile", "/uploads/smile.png"),
            ],
        );
        let catalog = adapter.catalog();
        assert!(catalog.emote_name_taken(2, "wave"));
        // Renaming to its own current name is not a conflict.
        assert!(!catalog.emote_name_taken(1, "wave"));
        assert!(!catalog.emote_name_taken(2, "grin"));
    }

    #[test]
    fn test_switching_story_replaces_emotes() {
        let mut adapter = adapter();
        adapter.set_emotes(10, vec![]);
        assert_eq!(adapter.emote_story(), Some(10));
        assert_eq!(adapter.catalog().emotes().count(), 0);
    }

    #[test]
    fn test_raw_emote_wire_format() {
        let json = r#"[{"id":3,"name":"grin","imageUrl":"/uploads/grin.png","story":null}]"#;
        let emotes: Vec<RawEmote> = serde_json::from_str(json).unwrap();
        assert_eq!(emotes[0].image_url, "/uploads/grin.png");

        let json = r#"[{"id":7,"name":"Mara","description":"lead"}]"#;
        let entities: Vec<RawEntity> = serde_json::from_str(json).unwrap();
        assert_eq!(entities[0], raw(7, "Mara"));
    }
}

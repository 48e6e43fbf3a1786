//! Entity references: the five closed namespaces an author can point at.
//!
//! Characters, items, locations and lore are numbered story entities and can
//! be mentioned with a `#{namespace:id}` shortcode. Emotes are keyed by their
//! image URL instead and are only ever embedded as inline images.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// One of the closed set of entity namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    Character,
    Item,
    Location,
    Lore,
    Emote,
}

impl Namespace {
    /// Every namespace, in catalog order.
    pub const ALL: [Namespace; 5] = [
        Namespace::Character,
        Namespace::Item,
        Namespace::Location,
        Namespace::Lore,
        Namespace::Emote,
    ];

    /// Namespaces reachable through the `#` mention trigger.
    pub const MENTIONABLE: [Namespace; 4] = [
        Namespace::Character,
        Namespace::Item,
        Namespace::Location,
        Namespace::Lore,
    ];

    /// Lower-case word used in shortcodes and `data-entity-type` attributes.
    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::Character => "character",
            Namespace::Item => "item",
            Namespace::Location => "location",
            Namespace::Lore => "lore",
            Namespace::Emote => "emote",
        }
    }

    /// Title-case label for user-facing text.
    pub fn label(self) -> &'static str {
        match self {
            Namespace::Character => "Character",
            Namespace::Item => "Item",
            Namespace::Location => "Location",
            Namespace::Lore => "Lore",
            Namespace::Emote => "Emote",
        }
    }

    /// Display glyph shown next to candidates in the suggestion popup.
    pub fn icon(self) -> &'static str {
        match self {
            Namespace::Character => "👤",
            Namespace::Item => "📦",
            Namespace::Location => "📍",
            Namespace::Lore => "📜",
            Namespace::Emote => "😁",
        }
    }

    /// Parse a namespace word, ignoring ASCII case.
    pub fn parse(word: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|ns| ns.as_str().eq_ignore_ascii_case(word))
    }

    /// Whether entities of this namespace can appear in a mention shortcode.
    pub fn is_mentionable(self) -> bool {
        !matches!(self, Namespace::Emote)
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A numbered story entity (character, item, location or lore entry).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoryEntity {
    pub id: u64,
    pub name: SmolStr,
}

impl StoryEntity {
    pub fn new(id: u64, name: impl Into<SmolStr>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// A story emote. The editor identifies emotes by `image_url`; the backend id
/// is only needed for rename/delete calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmoteRef {
    pub id: Option<u64>,
    pub name: SmolStr,
    pub image_url: SmolStr,
}

/// Identity of an entity inside its namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityKey {
    Id(u64),
    ImageUrl(SmolStr),
}

/// A reference to any entity in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "namespace", rename_all = "lowercase")]
pub enum EntityRef {
    Character(StoryEntity),
    Item(StoryEntity),
    Location(StoryEntity),
    Lore(StoryEntity),
    Emote(EmoteRef),
}

impl EntityRef {
    /// Build a story entity reference. Returns `None` for `Namespace::Emote`,
    /// which has no numeric handle.
    pub fn story(namespace: Namespace, entity: StoryEntity) -> Option<Self> {
        match namespace {
            Namespace::Character => Some(EntityRef::Character(entity)),
            Namespace::Item => Some(EntityRef::Item(entity)),
            Namespace::Location => Some(EntityRef::Location(entity)),
            Namespace::Lore => Some(EntityRef::Lore(entity)),
            Namespace::Emote => None,
        }
    }

    pub fn namespace(&self) -> Namespace {
        match self {
            EntityRef::Character(_) => Namespace::Character,
            EntityRef::Item(_) => Namespace::Item,
            EntityRef::Location(_) => Namespace::Location,
            EntityRef::Lore(_) => Namespace::Lore,
            EntityRef::Emote(_) => Namespace::Emote,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            EntityRef::Character(e)
            | EntityRef::Item(e)
            | EntityRef::Location(e)
            | EntityRef::Lore(e) => &e.name,
            EntityRef::Emote(e) => &e.name,
        }
    }

    pub fn key(&self) -> EntityKey {
        match self {
            EntityRef::Character(e)
            | EntityRef::Item(e)
            | EntityRef::Location(e)
            | EntityRef::Lore(e) => EntityKey::Id(e.id),
            EntityRef::Emote(e) => EntityKey::ImageUrl(e.image_url.clone()),
        }
    }

    /// Numeric id for story entities, `None` for emotes.
    pub fn story_id(&self) -> Option<u64> {
        match self.key() {
            EntityKey::Id(id) => Some(id),
            EntityKey::ImageUrl(_) => None,
        }
    }

    pub fn image_url(&self) -> Option<&str> {
        match self {
            EntityRef::Emote(e) => Some(&e.image_url),
            _ => None,
        }
    }

    pub fn icon(&self) -> &'static str {
        self.namespace().icon()
    }
}

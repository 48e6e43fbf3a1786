//! Autocomplete for mentions (`#`) and emotes (`:`).
//!
//! Each trigger has its own candidate pool. Typing the trigger opens a popup,
//! subsequent characters narrow it, and committing a candidate replaces the
//! trigger and query with the node the candidate stands for.

use std::ops::Range;

use crate::catalog::EntityCatalog;
use crate::document::Node;
use crate::entity::{EntityRef, Namespace};
use crate::error::{EditorError, Result};

/// Text shown in place of candidates when nothing matches.
pub const NO_RESULT: &str = "No result";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// `#`: characters, items, locations and lore.
    Mention,
    /// `:`: story emotes.
    Emote,
}

impl Trigger {
    pub const ALL: [Trigger; 2] = [Trigger::Mention, Trigger::Emote];

    pub fn char(self) -> char {
        match self {
            Trigger::Mention => '#',
            Trigger::Emote => ':',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.char() == c)
    }

    /// Whether entities of `namespace` belong to this trigger's pool.
    pub fn accepts(self, namespace: Namespace) -> bool {
        match self {
            Trigger::Mention => namespace.is_mentionable(),
            Trigger::Emote => namespace == Namespace::Emote,
        }
    }
}

/// An active trigger found before the cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerMatch {
    pub trigger: Trigger,
    pub query: String,
    /// Units covering the trigger character and the query.
    pub range: Range<usize>,
}

/// Look for an open trigger ending at `cursor`.
///
/// `text_before` is the text of the current run up to the cursor. A trigger
/// counts only at the start of the run or right after whitespace, and the
/// query is everything after it, which may not contain whitespace or the
/// trigger character itself.
pub fn find_trigger(text_before: &str, cursor: usize) -> Option<TriggerMatch> {
    let chars: Vec<char> = text_before.chars().collect();
    Trigger::ALL.into_iter().find_map(|trigger| {
        let at = chars
            .iter()
            .rposition(|&c| c == trigger.char() || c.is_whitespace())?;
        if chars[at] != trigger.char() {
            return None;
        }
        if at > 0 && !chars[at - 1].is_whitespace() {
            return None;
        }
        let query: String = chars[at + 1..].iter().collect();
        let width = chars.len() - at;
        Some(TriggerMatch {
            trigger,
            query,
            range: cursor.checked_sub(width)?..cursor,
        })
    })
}

/// One entry in the popup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub entity: EntityRef,
}

impl Candidate {
    pub fn name(&self) -> &str {
        self.entity.display_name()
    }

    /// `"{icon} {name} ({namespace})"`, as listed in the popup.
    pub fn render_label(&self) -> String {
        format!(
            "{} {} ({})",
            self.entity.icon(),
            self.entity.display_name(),
            self.entity.namespace()
        )
    }

    /// Nodes that replace the trigger and query on commit. Both kinds are
    /// followed by a space so typing continues outside the node.
    pub fn to_nodes(&self) -> Vec<Node> {
        let node = match &self.entity {
            EntityRef::Emote(emote) => {
                Node::inline_image(emote.image_url.clone(), Some(emote.name.clone()))
            }
            EntityRef::Character(e)
            | EntityRef::Item(e)
            | EntityRef::Location(e)
            | EntityRef::Lore(e) => Node::mention(self.entity.namespace(), e.id, e.name.clone()),
        };
        vec![node, Node::text(" ")]
    }
}

/// Candidates for `trigger` whose name contains `query`, ignoring case, in
/// catalog order. An empty query matches everything.
pub fn filter_candidates(catalog: &EntityCatalog, trigger: Trigger, query: &str) -> Vec<Candidate> {
    let needle = query.to_lowercase();
    catalog
        .entries()
        .iter()
        .filter(|e| trigger.accepts(e.namespace()))
        .filter(|e| needle.is_empty() || e.display_name().to_lowercase().contains(&needle))
        .map(|e| Candidate { entity: e.clone() })
        .collect()
}

/// Keys the popup (and the session around it) reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    ArrowUp,
    ArrowDown,
    Enter,
    Escape,
    /// Ctrl/Cmd+S.
    Save,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    /// Not a popup key; the editor handles it normally.
    Ignored,
    /// Handled by the popup without committing (navigation, or Enter with
    /// nothing to pick).
    Handled,
    Commit(Candidate),
    Dismiss,
}

/// State of an open suggestion popup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestionPopup {
    trigger: Trigger,
    query: String,
    range: Range<usize>,
    items: Vec<Candidate>,
    selected: usize,
}

impl SuggestionPopup {
    pub fn open(found: TriggerMatch, catalog: &EntityCatalog) -> Self {
        let items = filter_candidates(catalog, found.trigger, &found.query);
        tracing::debug!(
            trigger = %found.trigger.char(),
            query = %found.query,
            candidates = items.len(),
            "suggestion popup opened"
        );
        Self {
            trigger: found.trigger,
            query: found.query,
            range: found.range,
            items,
            selected: 0,
        }
    }

    /// Refresh after the query or catalog changed. Every refresh puts the
    /// highlight back on the first item.
    pub fn update(&mut self, found: TriggerMatch, catalog: &EntityCatalog) {
        self.items = filter_candidates(catalog, found.trigger, &found.query);
        self.selected = 0;
        self.trigger = found.trigger;
        self.query = found.query;
        self.range = found.range;
    }

    pub fn trigger(&self) -> Trigger {
        self.trigger
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    pub fn items(&self) -> &[Candidate] {
        &self.items
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn on_key(&mut self, key: Key) -> KeyOutcome {
        let n = self.items.len();
        match key {
            Key::ArrowUp => {
                if n > 0 {
                    self.selected = (self.selected + n - 1) % n;
                }
                KeyOutcome::Handled
            }
            Key::ArrowDown => {
                if n > 0 {
                    self.selected = (self.selected + 1) % n;
                }
                KeyOutcome::Handled
            }
            Key::Enter => match self.items.get(self.selected) {
                Some(candidate) => KeyOutcome::Commit(candidate.clone()),
                None => KeyOutcome::Handled,
            },
            Key::Escape => KeyOutcome::Dismiss,
            Key::Save => KeyOutcome::Ignored,
        }
    }

    /// Pointer click on the item at `index`.
    pub fn click(&self, index: usize) -> Result<Candidate> {
        if self.items.is_empty() {
            return Err(EditorError::EmptySuggestion);
        }
        self.items
            .get(index)
            .cloned()
            .ok_or(EditorError::CandidateOutOfRange {
                index,
                len: self.items.len(),
            })
    }

    /// Popup lines, with the highlighted item marked.
    pub fn render_lines(&self) -> Vec<String> {
        if self.items.is_empty() {
            return vec![NO_RESULT.to_string()];
        }
        self.items
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let marker = if i == self.selected { '>' } else { ' ' };
                format!("{marker} {}", c.render_label())
            })
            .collect()
    }
}

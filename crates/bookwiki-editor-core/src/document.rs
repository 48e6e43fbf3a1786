//! In-editor document tree.
//!
//! A `Document` is a sequence of typed nodes. Positions are measured in
//! *units*: every visible character is one unit, every atomic node (mention,
//! inline image, page break, resizable image) is exactly one unit, and element
//! boundaries have no width. A cursor offset is always a unit boundary, so it
//! can never land inside an atom, and deleting any part of an atom deletes all
//! of it.
//!
//! Nodes parsed from stored markup keep their source text until they are
//! edited, which is what lets an untouched document re-encode byte for byte.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::entity::Namespace;
use crate::error::{EditorError, Result};
use crate::markup;
use crate::media::Dimension;

/// A run of plain text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextNode {
    /// Decoded text.
    pub text: String,
    /// Source markup this run was parsed from, if unedited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl TextNode {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            raw: None,
        }
    }

    pub fn with_raw(text: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            raw: Some(raw.into()),
        }
    }

    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Split at a char index. Source text survives only where it maps 1:1
    /// onto the decoded text.
    fn split_at(self, at: usize) -> (TextNode, TextNode) {
        let idx = byte_index(&self.text, at);
        let verbatim = self.raw.as_deref() == Some(self.text.as_str());
        let (l, r) = self.text.split_at(idx);
        if verbatim {
            (TextNode::with_raw(l, l), TextNode::with_raw(r, r))
        } else {
            (TextNode::new(l), TextNode::new(r))
        }
    }
}

/// An entity mention. Atomic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MentionNode {
    pub namespace: Namespace,
    pub id: u64,
    /// Display label resolved at decode time.
    pub label: SmolStr,
}

/// A small inline emote image. Atomic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineImageNode {
    pub src: SmolStr,
    #[serde(default)]
    pub emote_name: Option<SmolStr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

/// A block image with persisted width and height. Atomic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResizableImageNode {
    pub src: SmolStr,
    #[serde(default)]
    pub alt: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub width: Dimension,
    #[serde(default)]
    pub height: Dimension,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl ResizableImageNode {
    pub fn new(src: impl Into<SmolStr>) -> Self {
        Self {
            src: src.into(),
            alt: None,
            title: None,
            width: Dimension::Auto,
            height: Dimension::Auto,
            raw: None,
        }
    }
}

/// Any other element, kept with its tags verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementNode {
    /// Lower-cased tag name.
    pub name: SmolStr,
    /// Opening tag exactly as written.
    pub open: String,
    /// Closing tag as written. `None` for void elements and for elements the
    /// source never closed.
    #[serde(default)]
    pub close: Option<String>,
    #[serde(default)]
    pub children: Vec<Node>,
}

impl ElementNode {
    pub fn is_void(&self) -> bool {
        markup::is_void(&self.name)
    }

    pub fn is_block(&self) -> bool {
        markup::is_block(&self.name)
    }

    fn width(&self) -> usize {
        self.children.iter().map(Node::width).sum()
    }

    /// Shallow copy of the tags around new children. A half that needs a
    /// closing tag gets one even if the source omitted it.
    fn with_children(&self, children: Vec<Node>) -> ElementNode {
        let close = match &self.close {
            Some(close) => Some(close.clone()),
            None if self.is_void() => None,
            None => Some(format!("</{}>", self.name)),
        };
        ElementNode {
            name: self.name.clone(),
            open: self.open.clone(),
            close,
            children,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    Text(TextNode),
    Mention(MentionNode),
    InlineImage(InlineImageNode),
    PageBreak,
    ResizableImage(ResizableImageNode),
    Element(ElementNode),
    /// Comments, doctypes and unmatched closing tags. Zero width.
    Raw { source: String },
}

impl Node {
    pub fn text(text: impl Into<String>) -> Self {
        Node::Text(TextNode::new(text))
    }

    pub fn mention(namespace: Namespace, id: u64, label: impl Into<SmolStr>) -> Self {
        Node::Mention(MentionNode {
            namespace,
            id,
            label: label.into(),
        })
    }

    pub fn inline_image(src: impl Into<SmolStr>, emote_name: Option<SmolStr>) -> Self {
        Node::InlineImage(InlineImageNode {
            src: src.into(),
            emote_name,
            raw: None,
        })
    }

    /// Width in units.
    pub fn width(&self) -> usize {
        match self {
            Node::Text(t) => t.len(),
            Node::Mention(_) | Node::InlineImage(_) | Node::PageBreak | Node::ResizableImage(_) => 1,
            Node::Element(e) => e.width(),
            Node::Raw { .. } => 0,
        }
    }

    pub fn is_atom(&self) -> bool {
        matches!(
            self,
            Node::Mention(_) | Node::InlineImage(_) | Node::PageBreak | Node::ResizableImage(_)
        )
    }

    /// Atoms that stand on their own line.
    pub fn is_block_atom(&self) -> bool {
        matches!(self, Node::PageBreak | Node::ResizableImage(_))
    }

    fn accepts_children(&self) -> bool {
        matches!(self, Node::Element(e) if !e.is_void())
    }
}

/// Where a unit offset falls inside one child list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    /// Inside text node `index`, at char `at`.
    InText { index: usize, at: usize },
    /// Before child `index` (which may be one past the end).
    Before(usize),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Document {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn into_nodes(self) -> Vec<Node> {
        self.nodes
    }

    /// Total width in units.
    pub fn len(&self) -> usize {
        self.nodes.iter().map(Node::width).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Child list and slot an offset resolves to.
    fn slot_mut(&mut self, offset: usize) -> Result<(&mut Vec<Node>, Slot)> {
        let out_of_range = EditorError::OffsetOutOfRange {
            offset,
            len: self.len(),
        };
        let (path, slot) = locate(&self.nodes, offset).ok_or(out_of_range.clone())?;
        let children = children_at_mut(&mut self.nodes, &path).ok_or(out_of_range)?;
        Ok((children, slot))
    }

    fn check(&self, offset: usize) -> Result<()> {
        let len = self.len();
        if offset > len {
            return Err(EditorError::OffsetOutOfRange { offset, len });
        }
        Ok(())
    }

    /// Insert plain text at `offset`. Returns the offset just past it.
    pub fn insert_text(&mut self, offset: usize, text: &str) -> Result<usize> {
        self.check(offset)?;
        if text.is_empty() {
            return Ok(offset);
        }
        let (children, slot) = self.slot_mut(offset)?;
        match slot {
            Slot::InText { index, at } => {
                if let Node::Text(t) = &mut children[index] {
                    let idx = byte_index(&t.text, at);
                    t.text.insert_str(idx, text);
                    t.raw = None;
                }
            }
            Slot::Before(index) => children.insert(index, Node::text(text)),
        }
        Ok(offset + text.chars().count())
    }

    /// Insert an inline node at `offset`, splitting the text run it lands in.
    /// Returns the offset just past the new node.
    pub fn insert_inline(&mut self, offset: usize, node: Node) -> Result<usize> {
        self.check(offset)?;
        let width = node.width();
        let (children, slot) = self.slot_mut(offset)?;
        match slot {
            Slot::InText { index, at } => {
                let len = children[index].width();
                if at == 0 {
                    children.insert(index, node);
                } else if at >= len {
                    children.insert(index + 1, node);
                } else if let Node::Text(t) = children.remove(index) {
                    let (left, right) = t.split_at(at);
                    children.insert(index, Node::Text(right));
                    children.insert(index, node);
                    children.insert(index, Node::Text(left));
                }
            }
            Slot::Before(index) => children.insert(index, node),
        }
        Ok(offset + width)
    }

    /// Insert a block-level node at `offset`, splitting every element that
    /// encloses the position. Halves left empty by the split are dropped.
    /// Returns the offset just past the new node.
    pub fn insert_block(&mut self, offset: usize, node: Node) -> Result<usize> {
        self.check(offset)?;
        let width = node.width();
        let nodes = std::mem::take(&mut self.nodes);
        let (mut left, right) = split_nodes(nodes, offset);
        left.push(node);
        left.extend(right);
        self.nodes = left;
        Ok(offset + width)
    }

    /// Delete every unit in `range`. Atoms touched by the range go entirely;
    /// elements are removed only when the range covers all of their content.
    pub fn delete(&mut self, range: Range<usize>) -> Result<()> {
        self.check(range.end)?;
        if range.start >= range.end {
            return Ok(());
        }
        delete_in(&mut self.nodes, range.start, range.end);
        Ok(())
    }

    /// Text of the run containing `offset`, up to `offset`. Empty when the
    /// offset is not inside a text run.
    pub fn text_before(&self, offset: usize) -> &str {
        let Some((path, Slot::InText { index, at })) = locate(&self.nodes, offset) else {
            return "";
        };
        match children_at(&self.nodes, &path).get(index) {
            Some(Node::Text(t)) => &t.text[..byte_index(&t.text, at)],
            _ => "",
        }
    }

    /// The atom occupying the unit starting at `offset`.
    pub fn atom_at(&self, offset: usize) -> Option<&Node> {
        let path = atom_path(&self.nodes, offset)?;
        node_at(&self.nodes, &path)
    }

    pub fn atom_at_mut(&mut self, offset: usize) -> Option<&mut Node> {
        let path = atom_path(&self.nodes, offset)?;
        node_at_mut(&mut self.nodes, &path)
    }

    /// Readable text: runs, mention labels, and line breaks at block edges.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        plain_text_into(&self.nodes, &mut out);
        out
    }

    /// Whether the document holds any non-whitespace text.
    pub fn has_text_content(&self) -> bool {
        !self.plain_text().trim().is_empty()
    }

    /// Depth-first visit of every node.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Node)) {
        walk_nodes(&self.nodes, f);
    }

    pub fn walk_mut(&mut self, f: &mut impl FnMut(&mut Node)) {
        walk_nodes_mut(&mut self.nodes, f);
    }

    pub fn page_break_count(&self) -> usize {
        let mut count = 0;
        self.walk(&mut |n| {
            if matches!(n, Node::PageBreak) {
                count += 1;
            }
        });
        count
    }

    /// Unit offsets of every atom, with the atom.
    pub fn atoms(&self) -> Vec<(usize, &Node)> {
        let mut out = Vec::new();
        collect_atoms(&self.nodes, 0, &mut out);
        out
    }
}

fn byte_index(s: &str, chars: usize) -> usize {
    s.char_indices().nth(chars).map_or(s.len(), |(i, _)| i)
}

fn locate(nodes: &[Node], offset: usize) -> Option<(Vec<usize>, Slot)> {
    let mut pos = 0;
    for (i, node) in nodes.iter().enumerate() {
        let width = node.width();
        match node {
            Node::Text(_) if offset <= pos + width => {
                return Some((
                    Vec::new(),
                    Slot::InText {
                        index: i,
                        at: offset - pos,
                    },
                ));
            }
            Node::Element(e) if node.accepts_children() && offset <= pos + width => {
                let (mut path, slot) = locate(&e.children, offset - pos)?;
                path.insert(0, i);
                return Some((path, slot));
            }
            _ if node.is_atom() && offset == pos => return Some((Vec::new(), Slot::Before(i))),
            _ => {}
        }
        pos += width;
    }
    (offset == pos).then(|| (Vec::new(), Slot::Before(nodes.len())))
}

fn children_at<'a>(nodes: &'a [Node], path: &[usize]) -> &'a [Node] {
    match path.split_first() {
        Some((&i, rest)) => match nodes.get(i) {
            Some(Node::Element(e)) => children_at(&e.children, rest),
            _ => &[],
        },
        None => nodes,
    }
}

fn children_at_mut<'a>(nodes: &'a mut Vec<Node>, path: &[usize]) -> Option<&'a mut Vec<Node>> {
    match path.split_first() {
        Some((&i, rest)) => match nodes.get_mut(i)? {
            Node::Element(e) => children_at_mut(&mut e.children, rest),
            _ => None,
        },
        None => Some(nodes),
    }
}

fn atom_path(nodes: &[Node], offset: usize) -> Option<Vec<usize>> {
    let mut pos = 0;
    for (i, node) in nodes.iter().enumerate() {
        let width = node.width();
        if offset < pos + width {
            return match node {
                _ if node.is_atom() => Some(vec![i]),
                Node::Element(e) => {
                    let mut path = atom_path(&e.children, offset - pos)?;
                    path.insert(0, i);
                    Some(path)
                }
                _ => None,
            };
        }
        pos += width;
    }
    None
}

fn node_at<'a>(nodes: &'a [Node], path: &[usize]) -> Option<&'a Node> {
    let (&last, parents) = path.split_last()?;
    children_at(nodes, parents).get(last)
}

fn node_at_mut<'a>(nodes: &'a mut Vec<Node>, path: &[usize]) -> Option<&'a mut Node> {
    let (&last, parents) = path.split_last()?;
    children_at_mut(nodes, parents)?.get_mut(last)
}

/// Split a child list at a unit offset. Zero-width nodes at the offset stay
/// on the left.
fn split_nodes(nodes: Vec<Node>, offset: usize) -> (Vec<Node>, Vec<Node>) {
    let mut left = Vec::new();
    let mut right = Vec::new();
    let mut pos = 0;
    for node in nodes {
        let width = node.width();
        if pos + width <= offset {
            left.push(node);
        } else if pos >= offset {
            right.push(node);
        } else {
            match node {
                Node::Text(t) => {
                    let (l, r) = t.split_at(offset - pos);
                    left.push(Node::Text(l));
                    right.push(Node::Text(r));
                }
                Node::Element(e) => {
                    let (l, r) = split_nodes(e.children.clone(), offset - pos);
                    let l = e.with_children(l);
                    let r = e.with_children(r);
                    if l.width() > 0 {
                        left.push(Node::Element(l));
                    }
                    if r.width() > 0 {
                        right.push(Node::Element(r));
                    }
                }
                // Atoms are one unit wide and cannot straddle an offset.
                other => right.push(other),
            }
        }
        pos += width;
    }
    (left, right)
}

fn delete_in(nodes: &mut Vec<Node>, start: usize, end: usize) {
    let mut pos = 0;
    let mut kept = Vec::with_capacity(nodes.len());
    for mut node in nodes.drain(..) {
        let width = node.width();
        let (node_start, node_end) = (pos, pos + width);
        pos = node_end;

        if node_end <= start || node_start >= end {
            kept.push(node);
            continue;
        }
        match &mut node {
            Node::Text(t) => {
                let from = byte_index(&t.text, start.saturating_sub(node_start));
                let to = byte_index(&t.text, end.min(node_end) - node_start);
                t.text.replace_range(from..to, "");
                t.raw = None;
                if !t.text.is_empty() {
                    kept.push(node);
                }
            }
            Node::Element(e) => {
                if start <= node_start && node_end <= end {
                    continue;
                }
                delete_in(
                    &mut e.children,
                    start.saturating_sub(node_start),
                    end.min(node_end) - node_start,
                );
                kept.push(node);
            }
            // Any overlap with an atom removes the whole atom.
            _ => {}
        }
    }
    *nodes = kept;
    merge_text_runs(nodes);
}

/// Join adjacent text runs left behind by a deletion.
fn merge_text_runs(nodes: &mut Vec<Node>) {
    let mut merged: Vec<Node> = Vec::with_capacity(nodes.len());
    for node in nodes.drain(..) {
        match (merged.last_mut(), node) {
            (Some(Node::Text(prev)), Node::Text(next)) => {
                prev.raw = match (prev.raw.take(), next.raw) {
                    (Some(a), Some(b)) => Some(a + &b),
                    _ => None,
                };
                prev.text.push_str(&next.text);
            }
            (_, node) => merged.push(node),
        }
    }
    *nodes = merged;
}

fn plain_text_into(nodes: &[Node], out: &mut String) {
    let newline = |out: &mut String| {
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
    };
    for node in nodes {
        match node {
            Node::Text(t) => out.push_str(&t.text),
            Node::Mention(m) => out.push_str(&m.label),
            Node::InlineImage(_) | Node::Raw { .. } => {}
            Node::PageBreak | Node::ResizableImage(_) => newline(out),
            Node::Element(e) if e.name == "br" => out.push('\n'),
            Node::Element(e) if e.is_block() => {
                newline(out);
                plain_text_into(&e.children, out);
                newline(out);
            }
            Node::Element(e) => plain_text_into(&e.children, out),
        }
    }
}

fn walk_nodes<'a>(nodes: &'a [Node], f: &mut impl FnMut(&'a Node)) {
    for node in nodes {
        f(node);
        if let Node::Element(e) = node {
            walk_nodes(&e.children, f);
        }
    }
}

fn walk_nodes_mut(nodes: &mut [Node], f: &mut impl FnMut(&mut Node)) {
    for node in nodes {
        f(node);
        if let Node::Element(e) = node {
            walk_nodes_mut(&mut e.children, f);
        }
    }
}

fn collect_atoms<'a>(nodes: &'a [Node], base: usize, out: &mut Vec<(usize, &'a Node)>) {
    let mut pos = base;
    for node in nodes {
        if node.is_atom() {
            out.push((pos, node));
        } else if let Node::Element(e) = node {
            collect_atoms(&e.children, pos, out);
        }
        pos += node.width();
    }
}

//! Shortcode codec: stored chapter text to editor document and back.
//!
//! Stored chapters are HTML-like markup with two textual placeholders:
//! `#{namespace:id}` for an entity mention and `#{pagebreak}` for a page
//! break. Images are stored as literal `<img>` tags. Decoding never fails;
//! anything that does not match a placeholder is kept as literal text.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex_lite::{Captures, Regex};
use smol_str::SmolStr;

use crate::catalog::EntityCatalog;
use crate::document::{
    Document, ElementNode, InlineImageNode, MentionNode, Node, ResizableImageNode, TextNode,
};
use crate::entity::Namespace;
use crate::markup::{self, StartTag, Token};
use crate::media::{Dimension, style_dimension};

/// Stored form of a page break.
pub const PAGE_BREAK_SHORTCODE: &str = "#{pagebreak}";

static MENTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#\{(\w+):(\d+)\}").expect("valid mention pattern"));

static SHORTCODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"#\{(?:(pagebreak)|(\w+):(\d+))\}").expect("valid shortcode pattern")
});

static NBSP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)&(?:nbsp|#0*160|#x0*a0);").expect("valid nbsp pattern")
});

/// Namespace and id of a mention shortcode, if it names a mentionable
/// namespace and the id fits.
fn parse_mention(word: &str, digits: &str) -> Option<(Namespace, u64)> {
    let namespace = Namespace::parse(word).filter(|ns| ns.is_mentionable())?;
    let id = digits.parse().ok()?;
    Some((namespace, id))
}

pub fn mention_shortcode(namespace: Namespace, id: u64) -> String {
    format!("#{{{namespace}:{id}}}")
}

/// Collapse invisible whitespace noise and canonicalise shortcodes.
///
/// Non-breaking spaces in any spelling become plain spaces, zero-width
/// no-break and zero-width spaces are removed, and mention shortcodes are
/// rewritten with a lower-case namespace and an id without leading zeros.
pub fn normalize(s: &str) -> String {
    let stripped: String = s
        .chars()
        .filter(|c| !matches!(c, '\u{feff}' | '\u{200b}'))
        .map(|c| if c == '\u{a0}' { ' ' } else { c })
        .collect();
    let spaced = NBSP_RE.replace_all(&stripped, " ");
    MENTION_RE
        .replace_all(&spaced, |caps: &Captures<'_>| match parse_mention(&caps[1], &caps[2]) {
            Some((namespace, id)) => mention_shortcode(namespace, id),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Label for a mention: the catalog's current name, or a placeholder that
/// keeps the namespace visible.
fn mention_label(catalog: &EntityCatalog, namespace: Namespace, id: u64) -> SmolStr {
    match catalog.resolve(namespace, id) {
        Some(entity) => SmolStr::new(entity.display_name()),
        None => {
            tracing::warn!(%namespace, id, "mention does not resolve in the catalog");
            unknown_label(namespace)
        }
    }
}

fn unknown_label(namespace: Namespace) -> SmolStr {
    SmolStr::new(format!("Unknown {namespace}"))
}

/// Decode stored chapter text into an editable document.
///
/// Labels are resolved against `catalog` now; an unresolved mention gets an
/// `Unknown <namespace>` label but keeps its namespace and id.
pub fn decode(stored: &str, catalog: &EntityCatalog) -> Document {
    let doc = build(&normalize(stored), Labels::Catalog(catalog));
    tracing::debug!(units = doc.len(), nodes = doc.nodes().len(), "decoded chapter");
    doc
}

/// Encode a document to its stored form.
pub fn encode(doc: &Document) -> String {
    let mut out = String::new();
    write_nodes(doc.nodes(), Mode::Storage, &mut out);
    normalize(&out)
}

/// Markup for the editing surface: mention bubbles, page-break blocks, emote
/// and resizable images.
pub fn render_editor_html(doc: &Document) -> String {
    let mut out = String::new();
    write_nodes(doc.nodes(), Mode::Editor, &mut out);
    out
}

/// Convert editing-surface markup straight to stored form.
pub fn html_to_shortcodes(html: &str) -> String {
    encode(&build(&normalize(html), Labels::FromMarkup))
}

/// Replace mention shortcodes with plain display names, for export.
/// Unresolved mentions read `Unknown <Namespace>`. Page breaks are left alone.
pub fn resolve_names(stored: &str, catalog: &EntityCatalog) -> String {
    MENTION_RE
        .replace_all(stored, |caps: &Captures<'_>| {
            let Some((namespace, id)) = parse_mention(&caps[1], &caps[2]) else {
                return caps[0].to_string();
            };
            let name = match catalog.resolve(namespace, id) {
                Some(entity) => Cow::Borrowed(entity.display_name()),
                None => Cow::Owned(format!("Unknown {}", namespace.label())),
            };
            let mut out = String::with_capacity(name.len());
            markup::push_text(&mut out, &name);
            out
        })
        .into_owned()
}

#[derive(Clone, Copy)]
enum Labels<'c> {
    Catalog(&'c EntityCatalog),
    /// Keep whatever label the markup carries; nothing to resolve against.
    FromMarkup,
}

struct Skip {
    name: SmolStr,
    depth: usize,
}

/// Builds the node tree from tokens, recovering from mismatched tags.
struct TreeBuilder<'c> {
    labels: Labels<'c>,
    root: Vec<Node>,
    stack: Vec<ElementNode>,
    skip: Option<Skip>,
}

fn build(src: &str, labels: Labels<'_>) -> Document {
    let mut builder = TreeBuilder {
        labels,
        root: Vec::new(),
        stack: Vec::new(),
        skip: None,
    };
    for token in markup::tokenize(src) {
        match token {
            Token::Text(raw) => builder.text(raw),
            Token::StartTag(tag) => builder.start(tag),
            Token::EndTag { name, raw } => builder.end(&name, raw),
            Token::Comment(raw) => {
                if builder.skip.is_none() {
                    builder.push(Node::Raw {
                        source: raw.to_string(),
                    });
                }
            }
        }
    }
    Document::new(builder.finish())
}

impl TreeBuilder<'_> {
    fn push(&mut self, node: Node) {
        match self.stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => self.root.push(node),
        }
    }

    fn label(&self, namespace: Namespace, id: u64, markup_label: Option<&str>) -> SmolStr {
        match self.labels {
            Labels::Catalog(catalog) => mention_label(catalog, namespace, id),
            Labels::FromMarkup => markup_label
                .map(SmolStr::new)
                .unwrap_or_else(|| unknown_label(namespace)),
        }
    }

    /// Split a text token around its shortcodes.
    fn text(&mut self, raw: &str) {
        if self.skip.is_some() {
            return;
        }
        let mut last = 0;
        for caps in SHORTCODE_RE.captures_iter(raw) {
            let Some(whole) = caps.get(0) else { continue };
            let node = if caps.get(1).is_some() {
                Node::PageBreak
            } else {
                match parse_mention(&caps[2], &caps[3]) {
                    Some((namespace, id)) => Node::Mention(MentionNode {
                        namespace,
                        id,
                        label: self.label(namespace, id, None),
                    }),
                    // Not ours; stays part of the surrounding text.
                    None => continue,
                }
            };
            self.push_text_run(&raw[last..whole.start()]);
            self.push(node);
            last = whole.end();
        }
        self.push_text_run(&raw[last..]);
    }

    fn push_text_run(&mut self, raw: &str) {
        if raw.is_empty() {
            return;
        }
        let text = markup::decode_entities(raw).into_owned();
        self.push(Node::Text(TextNode::with_raw(text, raw)));
    }

    fn start(&mut self, tag: StartTag<'_>) {
        if let Some(skip) = &mut self.skip {
            if tag.name == skip.name && !tag.self_closing && !markup::is_void(&tag.name) {
                skip.depth += 1;
            }
            return;
        }

        if let Some(node) = self.atom_from_tag(&tag) {
            tracing::trace!(tag = %tag.name, "recognised editor markup");
            self.push(node);
            if !tag.self_closing && !markup::is_void(&tag.name) {
                self.skip = Some(Skip {
                    name: tag.name.clone(),
                    depth: 1,
                });
            }
            return;
        }

        let element = ElementNode {
            name: tag.name.clone(),
            open: tag.raw.to_string(),
            close: None,
            children: Vec::new(),
        };
        if tag.self_closing || element.is_void() {
            self.push(Node::Element(element));
        } else {
            self.stack.push(element);
        }
    }

    /// Editor markup that maps onto a typed node.
    fn atom_from_tag(&self, tag: &StartTag<'_>) -> Option<Node> {
        let data_type = tag.attr("data-type");

        if tag.name == "span" && data_type == Some("mention") {
            let (namespace, id) = parse_mention(tag.attr("data-entity-type")?, tag.attr("data-id")?)?;
            let label = self.label(namespace, id, tag.attr("data-label"));
            return Some(Node::Mention(MentionNode {
                namespace,
                id,
                label,
            }));
        }

        // Older editor surface: `.mention` with the namespace in data-type.
        if let (Some(word), Some(id)) = (data_type, tag.attr("data-id")) {
            if let Some((namespace, id)) = parse_mention(word, id) {
                let label = self.label(namespace, id, tag.attr("data-value"));
                return Some(Node::Mention(MentionNode {
                    namespace,
                    id,
                    label,
                }));
            }
        }

        if tag.name == "div" && data_type == Some("page-break") {
            return Some(Node::PageBreak);
        }

        if tag.name != "img" {
            return None;
        }
        if tag.has_class("inline-image-emote") {
            return Some(Node::InlineImage(InlineImageNode {
                src: SmolStr::new(tag.attr("src").unwrap_or_default()),
                emote_name: tag
                    .attr("data-emotename")
                    .filter(|n| !n.is_empty())
                    .map(SmolStr::new),
                raw: Some(tag.raw.to_string()),
            }));
        }
        let src = tag.attr("src")?;
        let dimension = |property: &str| {
            tag.attr("style")
                .and_then(|style| style_dimension(style, property))
                .or_else(|| tag.attr(property).map(Dimension::parse))
                .unwrap_or_default()
        };
        Some(Node::ResizableImage(ResizableImageNode {
            src: SmolStr::new(src),
            alt: tag.attr("alt").map(str::to_string),
            title: tag.attr("title").map(str::to_string),
            width: dimension("width"),
            height: dimension("height"),
            raw: Some(tag.raw.to_string()),
        }))
    }

    fn end(&mut self, name: &str, raw: &str) {
        if let Some(skip) = &mut self.skip {
            if skip.name == name {
                skip.depth -= 1;
                if skip.depth == 0 {
                    self.skip = None;
                }
            }
            return;
        }

        let Some(index) = self.stack.iter().rposition(|e| e.name == name) else {
            tracing::trace!(tag = name, "unmatched closing tag kept verbatim");
            self.push(Node::Raw {
                source: raw.to_string(),
            });
            return;
        };
        while self.stack.len() > index + 1 {
            self.pop_unclosed();
        }
        if let Some(mut element) = self.stack.pop() {
            element.close = Some(raw.to_string());
            self.push(Node::Element(element));
        }
    }

    fn pop_unclosed(&mut self) {
        if let Some(element) = self.stack.pop() {
            self.push(Node::Element(element));
        }
    }

    fn finish(mut self) -> Vec<Node> {
        while !self.stack.is_empty() {
            self.pop_unclosed();
        }
        self.root
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Storage,
    Editor,
}

fn write_nodes(nodes: &[Node], mode: Mode, out: &mut String) {
    for node in nodes {
        write_node(node, mode, out);
    }
}

fn write_node(node: &Node, mode: Mode, out: &mut String) {
    match node {
        Node::Text(t) => match &t.raw {
            Some(raw) => out.push_str(raw),
            None => markup::push_text(out, &t.text),
        },
        Node::Mention(m) => match mode {
            Mode::Storage => out.push_str(&mention_shortcode(m.namespace, m.id)),
            Mode::Editor => {
                out.push_str("<span");
                markup::push_attr(out, "data-type", "mention");
                markup::push_attr(out, "data-id", &m.id.to_string());
                markup::push_attr(out, "data-entity-type", m.namespace.as_str());
                markup::push_attr(out, "data-label", &m.label);
                out.push('>');
                markup::push_text(out, &m.label);
                out.push_str("</span>");
            }
        },
        Node::PageBreak => match mode {
            Mode::Storage => out.push_str(PAGE_BREAK_SHORTCODE),
            Mode::Editor => out.push_str(r#"<div data-type="page-break"></div>"#),
        },
        Node::InlineImage(img) => match &img.raw {
            Some(raw) => out.push_str(raw),
            None => write_inline_image(img, out),
        },
        Node::ResizableImage(img) => match (&img.raw, mode) {
            (Some(raw), Mode::Storage) => out.push_str(raw),
            _ => write_resizable_image(img, out),
        },
        Node::Element(e) => {
            out.push_str(&e.open);
            write_nodes(&e.children, mode, out);
            if let Some(close) = &e.close {
                out.push_str(close);
            }
        }
        Node::Raw { source } => out.push_str(source),
    }
}

fn write_inline_image(img: &InlineImageNode, out: &mut String) {
    out.push_str("<img");
    markup::push_attr(out, "src", &img.src);
    if let Some(name) = &img.emote_name {
        markup::push_attr(out, "data-emotename", name);
    }
    markup::push_attr(out, "class", "inline-image-emote");
    out.push('>');
}

fn write_resizable_image(img: &ResizableImageNode, out: &mut String) {
    out.push_str("<img");
    markup::push_attr(out, "src", &img.src);
    if let Some(alt) = &img.alt {
        markup::push_attr(out, "alt", alt);
    }
    if let Some(title) = &img.title {
        markup::push_attr(out, "title", title);
    }
    let style = format!("width: {}; height: {}", img.width, img.height);
    markup::push_attr(out, "style", &style);
    out.push('>');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogAdapter, RawEntity};

    fn catalog() -> std::sync::Arc<EntityCatalog> {
        let mut adapter = CatalogAdapter::new();
        adapter.set_collection(
            Namespace::Character,
            vec![RawEntity {
                id: 5,
                name: "Mara".into(),
            }],
        );
        adapter.set_collection(
            Namespace::Location,
            vec![RawEntity {
                id: 2,
                name: "Hollow <Keep>".into(),
            }],
        );
        adapter.catalog()
    }

    #[test]
    fn test_normalize() {
        assert_eq!(
            normalize("a&nbsp;b&NBSP;c&#160;d&#xA0;e\u{a0}f\u{feff}g\u{200b}h"),
            "a b c d e fgh"
        );
        assert_eq!(
            normalize("#{Character:005} #{spell:1} #{emote:3} #{pagebreak}"),
            "#{character:5} #{spell:1} #{emote:3} #{pagebreak}"
        );
        // Ids too large for u64 are not shortcodes.
        let huge = "#{item:99999999999999999999999}";
        assert_eq!(normalize(huge), huge);
    }

    #[test]
    fn test_decode_end_to_end() {
        let src = "Hello #{character:5} let's go. #{pagebreak} Chapter two.";
        let doc = decode(src, &catalog());
        assert_eq!(
            doc.nodes(),
            &[
                Node::Text(TextNode::with_raw("Hello ", "Hello ")),
                Node::mention(Namespace::Character, 5, "Mara"),
                Node::Text(TextNode::with_raw(" let's go. ", " let's go. ")),
                Node::PageBreak,
                Node::Text(TextNode::with_raw(" Chapter two.", " Chapter two.")),
            ]
        );
        assert_eq!(encode(&doc), src);
    }

    #[test]
    fn test_unresolved_mention_round_trips() {
        let src = "<p>See #{lore:41}.</p>";
        let doc = decode(src, &catalog());
        let Node::Element(p) = &doc.nodes()[0] else {
            panic!("expected paragraph");
        };
        assert_eq!(p.children[1], Node::mention(Namespace::Lore, 41, "Unknown lore"));
        assert_eq!(encode(&doc), src);
    }

    #[test]
    fn test_malformed_shortcodes_stay_text() {
        let src = "#{character:abc} #{emote:1} #{pagebreak #{ item : 3 }";
        let doc = decode(src, &catalog());
        assert_eq!(doc.nodes().len(), 1);
        assert_eq!(encode(&doc), src);
    }

    #[test]
    fn test_markup_round_trips_byte_for_byte() {
        let src = concat!(
            "<!DOCTYPE html><h1 class='title'>One</h1>",
            "<p>Tom &amp; #{character:5}<br>x &lt; y <b>bold <i>both</b> after</p>",
            r#"<img src="/uploads/map.png" width=300 alt="Map">"#,
            r#"<p>stray </div> <img src="/e/wave.png" class="inline-image-emote"></p>"#,
            "<ul><li>unclosed",
        );
        let doc = decode(src, &catalog());
        assert_eq!(encode(&doc), src);
    }

    #[test]
    fn test_decode_is_idempotent() {
        let src = "<p>A\u{a0}#{Item:07}&nbsp;b</p>#{pagebreak}<p>#{character:5}</p>";
        let cat = catalog();
        let once = decode(src, &cat);
        let twice = decode(&encode(&once), &cat);
        assert_eq!(once, twice);
        assert_eq!(encode(&once), normalize(src));
    }

    #[test]
    fn test_images() {
        let src = concat!(
            r#"<img src="/u/a.png" style="width: 300px; height: 200px">"#,
            r#"<img src="/u/b.png" width="120">"#,
            r#"<img src="/e/wave.png" data-emotename="wave" class="inline-image-emote">"#,
        );
        let doc = decode(src, &catalog());
        match &doc.nodes()[0] {
            Node::ResizableImage(img) => {
                assert_eq!(img.width, Dimension::Px(300.0));
                assert_eq!(img.height, Dimension::Px(200.0));
            }
            other => panic!("expected image, got {other:?}"),
        }
        match &doc.nodes()[1] {
            Node::ResizableImage(img) => {
                assert_eq!(img.width, Dimension::Px(120.0));
                assert_eq!(img.height, Dimension::Auto);
            }
            other => panic!("expected image, got {other:?}"),
        }
        match &doc.nodes()[2] {
            Node::InlineImage(img) => {
                assert_eq!(img.emote_name.as_deref(), Some("wave"));
                assert_eq!(img.alt_text(), "wave");
            }
            other => panic!("expected emote, got {other:?}"),
        }
        assert_eq!(encode(&doc), src);
    }

    #[test]
    fn test_render_editor_html() {
        let mut doc = decode(
            "<p>Hi #{character:5} at #{location:2}</p>#{pagebreak}",
            &catalog(),
        );
        doc.insert_inline(2, Node::inline_image("/e/wave.png", Some("wave".into())))
            .unwrap();
        insta::assert_snapshot!(render_editor_html(&doc), @r#"<p>Hi<img src="/e/wave.png" data-emotename="wave" class="inline-image-emote"> <span data-type="mention" data-id="5" data-entity-type="character" data-label="Mara">Mara</span> at <span data-type="mention" data-id="2" data-entity-type="location" data-label="Hollow &lt;Keep&gt;">Hollow &lt;Keep&gt;</span></p><div data-type="page-break"></div>"#);
    }

    #[test]
    fn test_editor_html_back_to_shortcodes() {
        let html = concat!(
            r#"<p>Hi&nbsp;<span data-type="mention" data-id="5" data-entity-type="character" data-label="Mara">Mara</span>"#,
            r##" and <span class="mention" data-index="0" data-denotation-char="#" data-id="9" data-type="Item" data-value="Lamp">#Lamp</span>"##,
            "\u{feff}</p>",
            r#"<div data-type="page-break"></div><p>End</p>"#,
        );
        assert_eq!(
            html_to_shortcodes(html),
            "<p>Hi #{character:5} and #{item:9}</p>#{pagebreak}<p>End</p>"
        );
    }

    #[test]
    fn test_edited_image_is_rewritten() {
        let mut doc = decode(r#"<img src="/u/a.png" width="120" alt="A">"#, &catalog());
        if let Some(Node::ResizableImage(img)) = doc.atom_at_mut(0) {
            img.set_size(Dimension::Px(337.5), Dimension::Px(225.0));
        }
        insta::assert_snapshot!(encode(&doc), @r#"<img src="/u/a.png" alt="A" style="width: 337.5px; height: 225px">"#);
    }

    #[test]
    fn test_resolve_names() {
        let out = resolve_names(
            "#{character:5} met #{character:6} in #{location:2}. #{pagebreak}",
            &catalog(),
        );
        assert_eq!(
            out,
            "Mara met Unknown Character in Hollow &lt;Keep&gt;. #{pagebreak}"
        );
    }
}

//! End-to-end behaviour through the public API: codec, suggestions, image
//! resizing and pagination.

use std::sync::Arc;
use std::time::Duration;

use bookwiki_editor_core::{
    CatalogAdapter, Document, EditorSession, EntityCatalog, FlowLayout, Key, KeyEffect,
    LayoutMeasurement, MentionNode, Namespace, Node, PageGeometry, PageReport, PaginationObserver,
    Point, RawEmote, RawEntity, ResizeHandle, Size, SuggestionPopup, Trigger, compute_resize,
    decode, encode, filter_candidates, normalize,
};
use web_time::Instant;

fn entities(names: &[(u64, &str)]) -> Vec<RawEntity> {
    names
        .iter()
        .map(|&(id, name)| RawEntity {
            id,
            name: name.into(),
        })
        .collect()
}

fn story_catalog() -> Arc<EntityCatalog> {
    let mut adapter = CatalogAdapter::new();
    adapter.set_collection(Namespace::Character, entities(&[(5, "Mara"), (7, "Tobin")]));
    adapter.set_collection(Namespace::Item, entities(&[(3, "Lantern")]));
    adapter.set_collection(Namespace::Location, entities(&[(2, "Saltmarsh")]));
    adapter.set_collection(Namespace::Lore, entities(&[(11, "The Drowning")]));
    adapter.set_emotes(
        1,
        vec![RawEmote {
            id: 4,
            name: "grin".into(),
            image_url: "/uploads/grin.gif".into(),
        }],
    );
    adapter.catalog()
}

#[test]
fn resolved_documents_round_trip() {
    let catalog = story_catalog();
    let samples = [
        "Plain prose with no shortcodes.",
        "<p>#{character:5} lit the #{item:3}.</p><p>At #{location:2}&nbsp;again.</p>",
        "#{lore:11}#{pagebreak}#{character:7}",
        "<h2>Part\u{a0}One</h2>#{pagebreak}<p>\u{feff}#{Character:0005}</p>",
    ];
    for s in samples {
        assert_eq!(encode(&decode(s, &catalog)), normalize(s), "sample {s:?}");
    }
}

#[test]
fn unresolved_mentions_keep_their_ids() {
    let catalog = story_catalog();
    let s = "<p>#{character:99} found #{item:404}.</p>";
    let doc = decode(s, &catalog);

    let mut mentions = Vec::new();
    doc.walk(&mut |n| {
        if let Node::Mention(m) = n {
            mentions.push(m.clone());
        }
    });
    assert_eq!(
        mentions,
        vec![
            MentionNode {
                namespace: Namespace::Character,
                id: 99,
                label: "Unknown character".into(),
            },
            MentionNode {
                namespace: Namespace::Item,
                id: 404,
                label: "Unknown item".into(),
            },
        ]
    );
    assert_eq!(encode(&doc), s);
}

#[test]
fn decode_is_idempotent() {
    let catalog = story_catalog();
    let s = "<p>a&#160;#{location:2}</p>#{pagebreak}<img src=\"/u/x.png\" width=\"40\">";
    let once = decode(s, &catalog);
    assert_eq!(decode(&encode(&once), &catalog), once);
}

#[test]
fn filtering_keeps_catalog_order() {
    let mut adapter = CatalogAdapter::new();
    adapter.set_collection(
        Namespace::Character,
        entities(&[(1, "Alice"), (2, "Bob"), (3, "Alicia")]),
    );
    let catalog = adapter.catalog();

    let names = |query: &str| -> Vec<String> {
        filter_candidates(&catalog, Trigger::Mention, query)
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    };
    assert_eq!(names("ali"), ["Alice", "Alicia"]);
    assert_eq!(names(""), ["Alice", "Bob", "Alicia"]);
    assert!(filter_candidates(&catalog, Trigger::Emote, "").is_empty());
}

#[test]
fn keyboard_cycling_wraps() {
    let mut adapter = CatalogAdapter::new();
    adapter.set_collection(
        Namespace::Character,
        entities(&[(1, "Alice"), (2, "Bob"), (3, "Alicia")]),
    );
    let catalog = adapter.catalog();
    let found = bookwiki_editor_core::suggest::find_trigger("#", 1).unwrap();
    let mut popup = SuggestionPopup::open(found, &catalog);

    assert_eq!(popup.selected(), 0);
    popup.on_key(Key::ArrowUp);
    assert_eq!(popup.selected(), 2);
    popup.on_key(Key::ArrowDown);
    assert_eq!(popup.selected(), 0);
}

#[test]
fn locked_resize_clamps_to_content_width() {
    let geometry = PageGeometry::default();
    let aspect = 1.5;
    let size = compute_resize(
        ResizeHandle::BottomRight,
        // Doubled horizontally: asks for 300 + 2 * 300 = 900.
        Point::new(300.0, 0.0),
        Size::new(300.0, 200.0),
        aspect,
        false,
        geometry.max_size(),
    );
    assert_eq!(size.width, 674.0);
    assert_eq!(size.height, 674.0 / aspect);
}

struct Markers(usize);

impl LayoutMeasurement for Markers {
    fn page_markers(&self, _doc: &Document) -> usize {
        self.0
    }
}

#[test]
fn pagination_reports() {
    let catalog = story_catalog();
    let text = decode("<p>Some words.</p>", &catalog);
    let empty = decode("<p> </p>", &catalog);
    let mut observer = PaginationObserver::new(Duration::from_millis(1000), 100);

    assert_eq!(observer.measure(&text, &Markers(0)), PageReport::Count(1));
    assert_eq!(observer.measure(&empty, &Markers(0)), PageReport::Count(0));
    assert_eq!(
        observer.measure(&text, &Markers(101)),
        PageReport::Runaway { markers: 101 }
    );

    let t0 = Instant::now();
    observer.notify_mutation(t0);
    assert_eq!(
        observer.poll(t0 + Duration::from_secs(1), &text, &FlowLayout::default()),
        Some(PageReport::Count(1))
    );
}

#[test]
fn end_to_end_chapter() {
    let mut adapter = CatalogAdapter::new();
    adapter.set_collection(Namespace::Character, entities(&[(5, "Mara")]));
    let catalog = adapter.catalog();

    let src = "Hello #{character:5} let's go. #{pagebreak} Chapter two.";
    let doc = decode(src, &catalog);
    let kinds: Vec<_> = doc
        .nodes()
        .iter()
        .map(|n| match n {
            Node::Text(_) => "text",
            Node::Mention(m) if m.namespace == Namespace::Character && m.id == 5 => {
                assert_eq!(m.label, "Mara");
                "mention"
            }
            Node::PageBreak => "page-break",
            _ => "other",
        })
        .collect();
    assert_eq!(kinds, ["text", "mention", "text", "page-break", "text"]);
    assert_eq!(encode(&doc), src);
}

#[test]
fn session_writes_what_it_reads() {
    let catalog = story_catalog();
    let stored = "<p>Dawn over #{location:2}.</p>";
    let mut session = EditorSession::new(stored, catalog, PageGeometry::default());

    session.set_cursor(11).unwrap();
    session.type_text(" with #tob").unwrap();
    assert_eq!(session.popup().unwrap().items().len(), 1);
    assert!(matches!(
        session.key(Key::Enter).unwrap(),
        KeyEffect::Committed(_)
    ));
    session.type_text("and :gr").unwrap();
    session.click_suggestion(0).unwrap();

    let change = session.take_change().unwrap();
    assert_eq!(
        change,
        concat!(
            r#"<p>Dawn over #{location:2} with #{character:7} and "#,
            r#"<img src="/uploads/grin.gif" data-emotename="grin" class="inline-image-emote"> .</p>"#
        )
    );
    assert!(!session.apply_external(&change));
}

//! Tolerant tokenizer for the HTML-like stored chapter markup.
//!
//! This is not an HTML parser. It recognises just enough structure (tags,
//! attributes, comments) to build the document tree, and anything it does not
//! understand is handed back as text so that nothing is ever lost.

use std::borrow::Cow;

use pulldown_cmark_escape::{escape_html, escape_html_body_text};
use smol_str::SmolStr;

/// Elements that never have children or a closing tag.
pub const VOID_ELEMENTS: &[&str] = &["img", "br", "hr", "input", "meta", "link", "wbr", "source"];

pub fn is_void(name: &str) -> bool {
    VOID_ELEMENTS.iter().any(|v| v.eq_ignore_ascii_case(name))
}

/// Elements that start a new line of flow. Used for plain-text extraction and
/// layout estimation.
pub fn is_block(name: &str) -> bool {
    matches!(
        name,
        "p" | "div"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "li"
            | "ul"
            | "ol"
            | "blockquote"
            | "pre"
            | "section"
            | "article"
            | "table"
            | "tr"
    )
}

/// A single attribute. `value` is entity-decoded; `None` for bare attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    pub name: SmolStr,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartTag<'a> {
    /// Lower-cased tag name.
    pub name: SmolStr,
    pub attrs: Vec<Attr>,
    pub self_closing: bool,
    pub raw: &'a str,
}

impl StartTag<'_> {
    /// Value of the first attribute called `name` (ASCII case-insensitive).
    /// Bare attributes yield an empty string.
    pub fn attr(&self, name: &str) -> Option<&str> {
        find_attr(&self.attrs, name)
    }

    pub fn has_class(&self, class: &str) -> bool {
        has_class(&self.attrs, class)
    }
}

pub fn find_attr<'a>(attrs: &'a [Attr], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|a| a.name.eq_ignore_ascii_case(name))
        .map(|a| a.value.as_deref().unwrap_or(""))
}

pub fn has_class(attrs: &[Attr], class: &str) -> bool {
    find_attr(attrs, "class").is_some_and(|c| c.split_ascii_whitespace().any(|c| c == class))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    /// Literal text, still entity-encoded.
    Text(&'a str),
    StartTag(StartTag<'a>),
    EndTag { name: SmolStr, raw: &'a str },
    /// Comments, doctypes and processing instructions, verbatim.
    Comment(&'a str),
}

/// Split `src` into tokens. Never fails: malformed tags come back as text.
pub fn tokenize(src: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut text_start = 0;
    let mut cursor = 0;

    while let Some(rel) = src[cursor..].find('<') {
        let at = cursor + rel;
        match scan_tag(src, at) {
            Some((token, end)) => {
                if text_start < at {
                    tokens.push(Token::Text(&src[text_start..at]));
                }
                tokens.push(token);
                text_start = end;
                cursor = end;
            }
            None => cursor = at + 1,
        }
    }
    if text_start < src.len() {
        tokens.push(Token::Text(&src[text_start..]));
    }
    tracing::trace!(tokens = tokens.len(), "tokenized markup");
    tokens
}

/// Try to read a tag-like construct starting at `src[at] == '<'`. Returns the
/// token and the byte offset just past it.
fn scan_tag(src: &str, at: usize) -> Option<(Token<'_>, usize)> {
    let bytes = src.as_bytes();
    let next = *bytes.get(at + 1)?;

    if next == b'!' || next == b'?' {
        let end = if src[at..].starts_with("<!--") {
            src[at + 4..].find("-->").map(|i| at + 4 + i + 3)?
        } else {
            src[at..].find('>').map(|i| at + i + 1)?
        };
        return Some((Token::Comment(&src[at..end]), end));
    }

    if next == b'/' {
        let first = *bytes.get(at + 2)?;
        if !first.is_ascii_alphabetic() {
            return None;
        }
        let name_end = scan_name(bytes, at + 2);
        let close = src[name_end..].find('>').map(|i| name_end + i + 1)?;
        let name = SmolStr::new(src[at + 2..name_end].to_ascii_lowercase());
        return Some((
            Token::EndTag {
                name,
                raw: &src[at..close],
            },
            close,
        ));
    }

    if !next.is_ascii_alphabetic() {
        return None;
    }

    let name_end = scan_name(bytes, at + 1);
    let name = SmolStr::new(src[at + 1..name_end].to_ascii_lowercase());
    let mut attrs = Vec::new();
    let mut pos = name_end;

    loop {
        pos = skip_ws(bytes, pos);
        match bytes.get(pos)? {
            b'>' => {
                let end = pos + 1;
                let tag = StartTag {
                    name,
                    attrs,
                    self_closing: false,
                    raw: &src[at..end],
                };
                return Some((Token::StartTag(tag), end));
            }
            b'/' => {
                if bytes.get(pos + 1) == Some(&b'>') {
                    let end = pos + 2;
                    let tag = StartTag {
                        name,
                        attrs,
                        self_closing: true,
                        raw: &src[at..end],
                    };
                    return Some((Token::StartTag(tag), end));
                }
                pos += 1;
            }
            _ => {
                let attr_start = pos;
                while let Some(&b) = bytes.get(pos) {
                    if b.is_ascii_whitespace() || b == b'=' || b == b'>' || b == b'/' {
                        break;
                    }
                    pos += 1;
                }
                // A lone quote or similar junk; treat as a one-byte name.
                if pos == attr_start {
                    pos += 1;
                }
                let attr_name = SmolStr::new(src[attr_start..pos].to_ascii_lowercase());
                let after_name = skip_ws(bytes, pos);
                if bytes.get(after_name) != Some(&b'=') {
                    attrs.push(Attr {
                        name: attr_name,
                        value: None,
                    });
                    continue;
                }
                pos = skip_ws(bytes, after_name + 1);
                let value = match *bytes.get(pos)? {
                    quote @ (b'"' | b'\'') => {
                        let close = src[pos + 1..].find(quote as char)? + pos + 1;
                        let value = &src[pos + 1..close];
                        pos = close + 1;
                        value
                    }
                    _ => {
                        let start = pos;
                        while let Some(&b) = bytes.get(pos) {
                            if b.is_ascii_whitespace() || b == b'>' {
                                break;
                            }
                            pos += 1;
                        }
                        &src[start..pos]
                    }
                };
                attrs.push(Attr {
                    name: attr_name,
                    value: Some(decode_entities(value).into_owned()),
                });
            }
        }
    }
}

fn scan_name(bytes: &[u8], mut pos: usize) -> usize {
    while let Some(&b) = bytes.get(pos) {
        if b.is_ascii_alphanumeric() || b == b'-' || b == b':' || b == b'_' {
            pos += 1;
        } else {
            break;
        }
    }
    pos
}

fn skip_ws(bytes: &[u8], mut pos: usize) -> usize {
    while bytes.get(pos).is_some_and(|b| b.is_ascii_whitespace()) {
        pos += 1;
    }
    pos
}

/// Decode the character references the editor surface produces. Unknown or
/// malformed references are left as written.
pub fn decode_entities(s: &str) -> Cow<'_, str> {
    if !s.contains('&') {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        match rest.find(';').filter(|&semi| semi <= 10) {
            Some(semi) => match lookup_entity(&rest[1..semi]) {
                Some(ch) => {
                    out.push(ch);
                    rest = &rest[semi + 1..];
                }
                None => {
                    out.push('&');
                    rest = &rest[1..];
                }
            },
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

fn lookup_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let num = name.strip_prefix('#')?;
            let code = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

/// Append `s` as element text content.
pub fn push_text(out: &mut String, s: &str) {
    // Writing into a String cannot fail.
    escape_html_body_text(out, s).ok();
}

/// Append `s` as a double-quoted attribute value (without the quotes).
pub fn push_attr_value(out: &mut String, s: &str) {
    escape_html(out, s).ok();
}

/// Append ` name="value"`.
pub fn push_attr(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    push_attr_value(out, value);
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start<'a>(token: &'a Token<'a>) -> &'a StartTag<'a> {
        match token {
            Token::StartTag(tag) => tag,
            other => panic!("expected start tag, got {other:?}"),
        }
    }

    #[test]
    fn test_basic_structure() {
        let tokens = tokenize("<p>Hello <b>world</b></p>");
        assert_eq!(tokens.len(), 6);
        assert_eq!(start(&tokens[0]).name, "p");
        assert_eq!(tokens[1], Token::Text("Hello "));
        assert_eq!(tokens[3], Token::Text("world"));
        assert_eq!(
            tokens[5],
            Token::EndTag {
                name: "p".into(),
                raw: "</p>"
            }
        );
    }

    #[test]
    fn test_attribute_forms() {
        let tokens = tokenize(r#"<img src="/a.png" alt='it&#39;s' width=300 hidden/>"#);
        let tag = start(&tokens[0]);
        assert!(tag.self_closing);
        assert_eq!(tag.attr("src"), Some("/a.png"));
        assert_eq!(tag.attr("ALT"), Some("it's"));
        assert_eq!(tag.attr("width"), Some("300"));
        assert_eq!(tag.attr("hidden"), Some(""));
        assert_eq!(tag.attr("title"), None);
    }

    #[test]
    fn test_stray_angle_brackets_are_text() {
        let tokens = tokenize("a < b and 3<4 </ 5");
        let text: String = tokens
            .iter()
            .map(|t| match t {
                Token::Text(s) => *s,
                _ => panic!("unexpected token {t:?}"),
            })
            .collect();
        assert_eq!(text, "a < b and 3<4 </ 5");
    }

    #[test]
    fn test_unterminated_tag_is_text() {
        let tokens = tokenize(r#"x <img src="oops"#);
        assert_eq!(tokens, vec![Token::Text(r#"x <img src="oops"#)]);
    }

    #[test]
    fn test_comments_are_kept() {
        let tokens = tokenize("<!-- a > b --><p>x</p>");
        assert_eq!(tokens[0], Token::Comment("<!-- a > b -->"));
        assert_eq!(start(&tokens[1]).name, "p");
    }

    #[test]
    fn test_classes() {
        let tokens = tokenize(r#"<img class="big inline-image-emote">"#);
        assert!(start(&tokens[0]).has_class("inline-image-emote"));
        assert!(!start(&tokens[0]).has_class("inline"));
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("plain"), "plain");
        assert_eq!(decode_entities("a &amp; b &lt;c&gt;"), "a & b <c>");
        assert_eq!(decode_entities("&#65;&#x42;"), "AB");
        assert_eq!(decode_entities("&bogus; & &amp"), "&bogus; & &amp");
    }

    #[test]
    fn test_escaping() {
        let mut out = String::new();
        push_text(&mut out, "a < b & c");
        assert_eq!(out, "a &lt; b &amp; c");

        let mut out = String::new();
        push_attr(&mut out, "title", r#"say "hi""#);
        assert_eq!(out, r#" title="say &quot;hi&quot;""#);
    }
}

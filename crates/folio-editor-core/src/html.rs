//! Reading and writing the markup held by text blocks.

use html5ever::tendril::TendrilSink as _;
use html5ever::{ParseOpts, parse_document};
use markdown_weaver_escape::escape_html;
use markup5ever_rcdom::{Handle, NodeData, RcDom};

fn parse(html: &str) -> RcDom {
    parse_document(RcDom::default(), ParseOpts::default()).one(html)
}

fn body(handle: &Handle) -> Option<Handle> {
    if let NodeData::Element { name, .. } = &handle.data {
        if &*name.local == "body" {
            return Some(handle.clone());
        }
    }
    handle.children.borrow().iter().find_map(body)
}

fn collect_text(handle: &Handle, out: &mut String) {
    if let NodeData::Text { contents } = &handle.data {
        out.push_str(&contents.borrow());
    }
    for child in handle.children.borrow().iter() {
        collect_text(child, out);
    }
}

/// Text content of an HTML fragment with entities decoded, trimmed.
///
/// Non-breaking spaces read as plain spaces.
pub fn text_content(html: &str) -> String {
    let dom = parse(html);
    let mut out = String::new();
    if let Some(body) = body(&dom.document) {
        collect_text(&body, &mut out);
    }
    out.replace('\u{a0}', " ").trim().to_owned()
}

/// Tag name of the first element in a fragment, `p` when there is none.
pub fn leading_tag(html: &str) -> String {
    let dom = parse(html);
    body(&dom.document)
        .and_then(|body| {
            body.children.borrow().iter().find_map(|child| match &child.data {
                NodeData::Element { name, .. } => Some(name.local.to_string()),
                _ => None,
            })
        })
        .unwrap_or_else(|| "p".to_owned())
}

/// Append `text` to `out`, escaped for use in element content or a
/// double-quoted attribute.
pub fn escape_into(out: &mut String, text: &str) {
    // Writing into a `String` cannot fail.
    let _ = escape_html(&mut *out, text);
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    escape_into(&mut out, text);
    out
}

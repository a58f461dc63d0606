//! Portable-text content blocks and their HTML rendering.
//!
//! Posts store their body as an array of typed blocks. Text blocks carry spans
//! with decorator marks and link annotations; image blocks reference an uploaded
//! asset. Rendering escapes every text node and then passes the assembled
//! markup through an allow-list sanitizer.

use std::collections::HashSet;

use ammonia::Builder as AmmoniaBuilder;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Block styles that contribute entries to the table of contents.
const TOC_STYLES: [&str; 3] = ["h1", "h2", "h3"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_type")]
pub enum ContentBlock {
    #[serde(rename = "block")]
    Text(TextBlock),
    #[serde(rename = "image")]
    Image(ImageBlock),
    /// Block types this renderer does not understand; skipped on output.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextBlock {
    #[serde(rename = "_key", default)]
    pub key: String,
    #[serde(default = "default_style")]
    pub style: String,
    #[serde(default)]
    pub children: Vec<Span>,
    #[serde(default)]
    pub mark_defs: Vec<MarkDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_item: Option<ListKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    #[serde(rename = "_type", default = "span_type")]
    pub kind: String,
    #[serde(rename = "_key", default)]
    pub key: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub marks: Vec<String>,
}

/// Annotation referenced from [`Span::marks`] by key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkDef {
    #[serde(rename = "_key")]
    pub key: String,
    #[serde(rename = "_type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    Bullet,
    Number,
}

impl ListKind {
    fn tag(self) -> &'static str {
        match self {
            ListKind::Bullet => "ul",
            ListKind::Number => "ol",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageBlock {
    #[serde(rename = "_key", default)]
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<AssetRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRef {
    #[serde(rename = "_type", default = "reference_type")]
    pub kind: String,
    #[serde(rename = "_ref")]
    pub reference: String,
}

impl AssetRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            kind: reference_type(),
            reference: reference.into(),
        }
    }
}

fn default_style() -> String {
    "normal".to_string()
}

fn span_type() -> String {
    "span".to_string()
}

fn reference_type() -> String {
    "reference".to_string()
}

fn new_key() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}

impl ContentBlock {
    /// A single `normal` paragraph containing `text`.
    pub fn paragraph(text: impl Into<String>) -> Self {
        ContentBlock::Text(TextBlock {
            key: new_key(),
            style: default_style(),
            children: vec![Span {
                kind: span_type(),
                key: new_key(),
                text: text.into(),
                marks: Vec::new(),
            }],
            mark_defs: Vec::new(),
            list_item: None,
            level: None,
        })
    }

    pub fn image(asset_id: impl Into<String>, alt: Option<String>) -> Self {
        ContentBlock::Image(ImageBlock {
            key: new_key(),
            asset: Some(AssetRef::new(asset_id)),
            alt,
        })
    }
}

impl TextBlock {
    pub fn plain_text(&self) -> String {
        self.children.iter().map(|span| span.text.as_str()).collect()
    }
}

/// Split free text into paragraphs on blank lines.
pub fn from_plain_text(text: &str) -> Vec<ContentBlock> {
    let normalized = text.replace("\r\n", "\n");
    normalized
        .split("\n\n")
        .map(str::trim)
        .filter(|paragraph| !paragraph.is_empty())
        .map(ContentBlock::paragraph)
        .collect()
}

/// Heading texts for the table of contents, in document order. Entry `i`
/// links to the element with id `heading-{i}`.
pub fn table_of_contents(blocks: &[ContentBlock]) -> Vec<String> {
    blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text(text) => toc_heading(text),
            _ => None,
        })
        .collect()
}

/// List items render as `<li>` and never carry a heading id.
fn toc_heading(text: &TextBlock) -> Option<String> {
    if text.list_item.is_some() || !TOC_STYLES.contains(&text.style.as_str()) {
        return None;
    }
    Some(text.plain_text()).filter(|heading| !heading.is_empty())
}

/// Resolves an image asset reference to a displayable URL.
pub trait ImageUrlResolver {
    fn image_url(&self, asset_ref: &str) -> Option<String>;
}

impl<F> ImageUrlResolver for F
where
    F: Fn(&str) -> Option<String>,
{
    fn image_url(&self, asset_ref: &str) -> Option<String> {
        self(asset_ref)
    }
}

static SANITIZER: Lazy<AmmoniaBuilder<'static>> = Lazy::new(build_sanitizer);

fn build_sanitizer() -> AmmoniaBuilder<'static> {
    let mut builder = AmmoniaBuilder::default();

    let tags: HashSet<&'static str> = HashSet::from([
        "a",
        "blockquote",
        "br",
        "code",
        "del",
        "em",
        "figure",
        "h1",
        "h2",
        "h3",
        "h4",
        "h5",
        "h6",
        "img",
        "li",
        "ol",
        "p",
        "s",
        "strong",
        "u",
        "ul",
    ]);
    builder.tags(tags);
    builder.add_tag_attributes("h1", &["id"]);
    builder.add_tag_attributes("h2", &["id"]);
    builder.add_tag_attributes("h3", &["id"]);
    builder.add_tag_attributes("img", &["alt", "loading"]);
    builder.add_url_schemes(["http", "https", "mailto"].iter().copied());
    builder
}

/// Render blocks to sanitized HTML.
pub fn render_html(blocks: &[ContentBlock], images: &dyn ImageUrlResolver) -> String {
    let mut html = String::new();
    let mut lists: Vec<(ListKind, u32)> = Vec::new();
    let mut heading_index = 0usize;

    for block in blocks {
        let list_position = match block {
            ContentBlock::Text(text) => text
                .list_item
                .map(|kind| (kind, text.level.unwrap_or(1).max(1))),
            _ => None,
        };
        adjust_lists(&mut html, &mut lists, list_position);

        match block {
            ContentBlock::Text(text) if list_position.is_some() => {
                html.push_str("<li>");
                render_spans(&mut html, text);
                html.push_str("</li>");
            }
            ContentBlock::Text(text) => {
                let tag = block_tag(&text.style);
                html.push('<');
                html.push_str(tag);
                if toc_heading(text).is_some() {
                    html.push_str(&format!(" id=\"heading-{heading_index}\""));
                    heading_index += 1;
                }
                html.push('>');
                render_spans(&mut html, text);
                html.push_str("</");
                html.push_str(tag);
                html.push('>');
            }
            ContentBlock::Image(image) => {
                let url = image
                    .asset
                    .as_ref()
                    .and_then(|asset| images.image_url(&asset.reference));
                if let Some(url) = url {
                    html.push_str("<figure><img src=\"");
                    html.push_str(&escape_attribute(&url));
                    html.push_str("\" alt=\"");
                    html.push_str(&escape_attribute(image.alt.as_deref().unwrap_or("")));
                    html.push_str("\" loading=\"lazy\"></figure>");
                }
            }
            ContentBlock::Unknown => {}
        }
    }
    adjust_lists(&mut html, &mut lists, None);

    SANITIZER.clean(&html).to_string()
}

fn adjust_lists(html: &mut String, lists: &mut Vec<(ListKind, u32)>, target: Option<(ListKind, u32)>) {
    let depth = target.map_or(0, |(_, level)| level as usize);

    while lists.len() > depth {
        close_list(html, lists);
    }
    if let Some((kind, _)) = target
        && lists.len() == depth
        && lists.last().is_some_and(|(open, _)| *open != kind)
    {
        close_list(html, lists);
    }
    if let Some((kind, _)) = target {
        while lists.len() < depth {
            html.push('<');
            html.push_str(kind.tag());
            html.push('>');
            lists.push((kind, lists.len() as u32 + 1));
        }
    }
}

fn close_list(html: &mut String, lists: &mut Vec<(ListKind, u32)>) {
    if let Some((kind, _)) = lists.pop() {
        html.push_str("</");
        html.push_str(kind.tag());
        html.push('>');
    }
}

fn block_tag(style: &str) -> &'static str {
    match style {
        "h1" => "h1",
        "h2" => "h2",
        "h3" => "h3",
        "h4" => "h4",
        "h5" => "h5",
        "h6" => "h6",
        "blockquote" => "blockquote",
        _ => "p",
    }
}

fn render_spans(html: &mut String, block: &TextBlock) {
    for span in &block.children {
        let mut closers = Vec::new();
        for mark in &span.marks {
            if let Some(tag) = decorator_tag(mark) {
                html.push('<');
                html.push_str(tag);
                html.push('>');
                closers.push(tag);
                continue;
            }
            let href = block
                .mark_defs
                .iter()
                .find(|def| &def.key == mark && def.kind == "link")
                .and_then(|def| def.href.as_deref());
            if let Some(href) = href {
                html.push_str("<a href=\"");
                html.push_str(&escape_attribute(href));
                html.push_str("\">");
                closers.push("a");
            }
        }

        for (index, line) in span.text.split('\n').enumerate() {
            if index > 0 {
                html.push_str("<br>");
            }
            html.push_str(&ammonia::clean_text(line));
        }

        for tag in closers.into_iter().rev() {
            html.push_str("</");
            html.push_str(tag);
            html.push('>');
        }
    }
}

fn decorator_tag(mark: &str) -> Option<&'static str> {
    match mark {
        "strong" => Some("strong"),
        "em" => Some("em"),
        "code" => Some("code"),
        "underline" => Some("u"),
        "strike-through" => Some("s"),
        _ => None,
    }
}

fn escape_attribute(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '\n' | '\r' | '\t' => escaped.push(' '),
            _ => escaped.push(ch),
        }
    }
    escaped
}

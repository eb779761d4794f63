//! Display-independent output of a document build.

use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;

use crate::model::SourceId;

/// Half-open byte range into a document's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct TextRange {
    pub start: usize,
    pub end: usize,
}

impl TextRange {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub const fn point(offset: usize) -> Self {
        Self::new(offset, offset)
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }
}

/// Visual style applied to a span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Style {
    /// A style from the open named vocabulary (`b`, `i`, `h1`, `r`, `url`, ...).
    Named(String),
    /// Literal foreground color carried by a color annotation.
    Foreground(String),
}

impl Style {
    pub fn named(name: impl Into<String>) -> Self {
        Style::Named(name.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Span {
    pub style: Style,
    pub range: TextRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    External,
    Internal,
    Footnote,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LinkTarget {
    External { url: String },
    /// Resolved by the consumer within `source`.
    Internal { source: SourceId, target: String },
    /// Offset of the footnote definition in the same document.
    Footnote { anchor: usize },
}

impl LinkTarget {
    /// Only the literal `http://` prefix counts as external.
    pub fn classify(target: &str, source: &SourceId) -> Self {
        if target.starts_with("http://") {
            LinkTarget::External {
                url: target.to_string(),
            }
        } else {
            LinkTarget::Internal {
                source: source.clone(),
                target: target.to_string(),
            }
        }
    }

    pub fn kind(&self) -> LinkKind {
        match self {
            LinkTarget::External { .. } => LinkKind::External,
            LinkTarget::Internal { .. } => LinkKind::Internal,
            LinkTarget::Footnote { .. } => LinkKind::Footnote,
        }
    }

    pub fn href(&self) -> String {
        match self {
            LinkTarget::External { url } => url.clone(),
            LinkTarget::Internal { source, target } => format!(
                "aard:{}/{}",
                utf8_percent_encode(source.as_str(), NON_ALPHANUMERIC),
                utf8_percent_encode(target, NON_ALPHANUMERIC)
            ),
            LinkTarget::Footnote { anchor } => format!("#note-{anchor}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkSpan {
    pub range: TextRange,
    pub target: LinkTarget,
}

impl LinkSpan {
    pub fn kind(&self) -> LinkKind {
        self.target.kind()
    }
}

/// Tab stops in character columns.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct TabStops(pub Vec<u32>);

impl TabStops {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn columns(&self) -> &[u32] {
        &self.0
    }

    /// Converts columns to presentation units: `column * char_width + padding`.
    pub fn positions(&self, char_width: u32, padding: u32) -> Vec<u32> {
        self.0
            .iter()
            .map(|column| column.saturating_mul(char_width).saturating_add(padding))
            .collect()
    }
}

/// Alternating background of table rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RowTone {
    Even,
    Odd,
}

impl RowTone {
    pub fn for_index(index: usize) -> Self {
        if index % 2 == 0 {
            RowTone::Even
        } else {
            RowTone::Odd
        }
    }

    pub fn background(self) -> &'static str {
        match self {
            RowTone::Even => "#f9f9f9",
            RowTone::Odd => "#f0f0f0",
        }
    }

    /// Vertical padding, in pixels, above and below each row.
    pub fn padding(self) -> u32 {
        1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableRow {
    pub index: usize,
    pub range: TextRange,
    pub tone: RowTone,
    /// Row-specific override; `None` means the table's global stops apply.
    pub tabs: Option<TabStops>,
}

impl TableRow {
    pub fn effective_tabs<'a>(&'a self, table: &'a Table) -> &'a TabStops {
        self.tabs.as_ref().unwrap_or(&table.tabs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Table {
    pub document: Document,
    pub tabs: TabStops,
    pub rows: Vec<TableRow>,
}

/// Zero-width placeholder standing in for an excised table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbeddedBlock {
    pub anchor: usize,
    pub table: Table,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "element", rename_all = "snake_case")]
pub enum Element {
    Span(Span),
    Link(LinkSpan),
    Block(EmbeddedBlock),
}

/// Rendered article: text with table ranges removed, plus elements in
/// annotation order. Later elements layer over earlier ones.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Document {
    pub text: String,
    pub elements: Vec<Element>,
}

impl Document {
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// No text. A table-only document is empty but still has blocks.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn slice(&self, range: TextRange) -> Option<&str> {
        self.text.get(range.start..range.end)
    }

    pub fn spans(&self) -> impl Iterator<Item = &Span> {
        self.elements.iter().filter_map(|element| match element {
            Element::Span(span) => Some(span),
            _ => None,
        })
    }

    pub fn links(&self) -> impl Iterator<Item = &LinkSpan> {
        self.elements.iter().filter_map(|element| match element {
            Element::Link(link) => Some(link),
            _ => None,
        })
    }

    pub fn blocks(&self) -> impl Iterator<Item = &EmbeddedBlock> {
        self.elements.iter().filter_map(|element| match element {
            Element::Block(block) => Some(block),
            _ => None,
        })
    }

    /// Topmost link covering `offset`.
    pub fn link_at(&self, offset: usize) -> Option<&LinkSpan> {
        self.links().filter(|link| link.range.contains(offset)).last()
    }
}

//! Turns flat offset annotations into a [`Document`].
//!
//! One ordered pass over the annotation list, dispatching on the annotation
//! kind. Table annotations carry their own text and annotations, which are
//! built recursively into a nested document; the table's range is cut out of
//! the parent text and replaced by a zero-width [`EmbeddedBlock`].

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use tracing::trace;

use crate::document::{
    Document, Element, EmbeddedBlock, LinkSpan, LinkTarget, RowTone, Span, Style, TabStops, Table,
    TableRow, TextRange,
};
use crate::error::{BuildError, Malformation, MalformedAnnotationError, Result};
use crate::footnote::{FootnoteIndex, FootnoteKey};
use crate::model::{Annotation, AnnotationKind, Article, SourceId};

const DEFAULT_MAX_TABLE_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOptions {
    /// Tables nested deeper than this fail with [`BuildError::TableTooDeep`].
    pub max_table_depth: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            max_table_depth: DEFAULT_MAX_TABLE_DEPTH,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DocumentBuilder {
    options: BuildOptions,
}

impl DocumentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: BuildOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    pub fn build_article(&self, article: &Article) -> Result<Document> {
        self.build(&article.text, &article.annotations, &article.source)
    }

    /// Builds `text` with `annotations`. Internal links are resolved against `source`.
    pub fn build(
        &self,
        text: &str,
        annotations: &[Annotation],
        source: &SourceId,
    ) -> Result<Document> {
        self.build_at(text, annotations, source, 0)
            .map(|built| built.document)
    }

    fn build_at(
        &self,
        text: &str,
        annotations: &[Annotation],
        source: &SourceId,
        depth: usize,
    ) -> Result<Built> {
        if depth > self.options.max_table_depth {
            return Err(BuildError::TableTooDeep {
                limit: self.options.max_table_depth,
            });
        }
        for annotation in annotations {
            validate(text, annotation)?;
        }

        let footnotes = FootnoteIndex::from_annotations(annotations);
        let excision = Excision::new(
            annotations
                .iter()
                .filter(|annotation| annotation.kind() == AnnotationKind::Table)
                .map(range_of),
        );
        let mut elements = Vec::with_capacity(annotations.len());

        for annotation in annotations {
            let kind = annotation.kind();
            if kind == AnnotationKind::Table {
                let table = self.expand_table(annotation, text.len(), source, depth + 1)?;
                elements.push(Element::Block(EmbeddedBlock {
                    anchor: excision.map_offset(annotation.start),
                    table,
                }));
                continue;
            }
            let Some(range) = excision.map_range(range_of(annotation)) else {
                trace!(name = %annotation.name, "annotation lies inside a table, dropped");
                continue;
            };
            match kind {
                AnnotationKind::Link => {
                    if let Some(href) = annotation.attr_str("href") {
                        push_link(&mut elements, range, LinkTarget::classify(&href, source));
                    }
                }
                AnnotationKind::KeywordLink => {
                    let keyword = &text[annotation.start..annotation.end];
                    push_link(&mut elements, range, LinkTarget::classify(keyword, source));
                }
                AnnotationKind::FootnoteRef => {
                    let anchor = FootnoteKey::of(annotation).and_then(|key| footnotes.resolve(&key));
                    match anchor {
                        Some(anchor) => {
                            elements.push(Element::Span(Span {
                                style: Style::named("ref"),
                                range,
                            }));
                            elements.push(Element::Link(LinkSpan {
                                range,
                                target: LinkTarget::Footnote {
                                    anchor: excision.map_offset(anchor),
                                },
                            }));
                        }
                        None => trace!(start = annotation.start, "unresolved footnote reference"),
                    }
                }
                AnnotationKind::Color => {
                    let color = annotation
                        .attr_str("c")
                        .or_else(|| annotation.attr_str("color"));
                    if let Some(color) = color {
                        elements.push(Element::Span(Span {
                            style: Style::Foreground(color.into_owned()),
                            range,
                        }));
                    }
                }
                _ => elements.push(Element::Span(Span {
                    style: Style::Named(annotation.name.clone()),
                    range,
                })),
            }
        }

        Ok(Built {
            document: Document {
                text: excision.apply(text),
                elements,
            },
            excision,
        })
    }

    fn expand_table(
        &self,
        annotation: &Annotation,
        parent_len: usize,
        source: &SourceId,
        depth: usize,
    ) -> Result<Table> {
        let payload = TablePayload::decode(annotation).map_err(|detail| {
            malformed(annotation, parent_len, Malformation::TablePayload(detail))
        })?;
        let built = self.build_at(&payload.text, &payload.annotations, source, depth)?;

        let rows = payload
            .annotations
            .iter()
            .filter(|candidate| candidate.name == "row")
            .enumerate()
            .map(|(index, row)| TableRow {
                index,
                range: TextRange::new(
                    built.excision.map_offset(row.start),
                    built.excision.map_offset(row.end),
                ),
                tone: RowTone::for_index(index),
                tabs: payload.row_tabs.get(&index).cloned(),
            })
            .collect();

        Ok(Table {
            document: built.document,
            tabs: payload.tabs,
            rows,
        })
    }
}

struct Built {
    document: Document,
    excision: Excision,
}

fn range_of(annotation: &Annotation) -> TextRange {
    TextRange::new(annotation.start, annotation.end)
}

fn push_link(elements: &mut Vec<Element>, range: TextRange, target: LinkTarget) {
    let style = match target {
        LinkTarget::External { .. } => "url",
        _ => "r",
    };
    elements.push(Element::Span(Span {
        style: Style::named(style),
        range,
    }));
    elements.push(Element::Link(LinkSpan { range, target }));
}

fn validate(text: &str, annotation: &Annotation) -> std::result::Result<(), MalformedAnnotationError> {
    let reason = if annotation.start > annotation.end {
        Malformation::StartAfterEnd
    } else if annotation.end > text.len() {
        Malformation::EndOutOfBounds
    } else if !text.is_char_boundary(annotation.start) || !text.is_char_boundary(annotation.end) {
        Malformation::NotCharBoundary
    } else {
        return Ok(());
    };
    Err(malformed(annotation, text.len(), reason))
}

fn malformed(annotation: &Annotation, text_len: usize, reason: Malformation) -> MalformedAnnotationError {
    MalformedAnnotationError {
        name: annotation.name.clone(),
        start: annotation.start,
        end: annotation.end,
        text_len,
        reason,
    }
}

/// Own content of a table annotation.
struct TablePayload {
    text: String,
    annotations: Vec<Annotation>,
    tabs: TabStops,
    row_tabs: HashMap<usize, TabStops>,
}

impl TablePayload {
    fn decode(annotation: &Annotation) -> std::result::Result<Self, String> {
        let text = match annotation.attr("text") {
            Some(Value::String(text)) => text.clone(),
            Some(_) => return Err("`text` is not a string".to_string()),
            None => return Err("missing `text`".to_string()),
        };
        let tags = annotation
            .attr("tags")
            .or_else(|| annotation.attr("annotations"))
            .ok_or_else(|| "missing `tags`".to_string())?;
        let annotations =
            Vec::<Annotation>::deserialize(tags).map_err(|err| format!("bad `tags`: {err}"))?;
        let (tabs, row_tabs) = decode_tabs(annotation.attr("tabs"));
        Ok(Self {
            text,
            annotations,
            tabs,
            row_tabs,
        })
    }
}

/// Splits the tab map into the global stops (key `""`) and per-row overrides.
fn decode_tabs(value: Option<&Value>) -> (TabStops, HashMap<usize, TabStops>) {
    let mut global = TabStops::default();
    let mut rows = HashMap::new();
    let Some(Value::Object(map)) = value else {
        return (global, rows);
    };
    for (key, stops) in map {
        if key.is_empty() {
            global = tab_stops(stops);
        } else if let Ok(index) = key.parse::<usize>() {
            rows.insert(index, tab_stops(stops));
        }
    }
    (global, rows)
}

fn tab_stops(value: &Value) -> TabStops {
    let columns = value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_u64)
                .filter_map(|column| u32::try_from(column).ok())
                .collect()
        })
        .unwrap_or_default();
    TabStops(columns)
}

/// Sorted, merged byte ranges removed from a text.
#[derive(Debug, Clone, Default)]
struct Excision {
    cuts: Vec<TextRange>,
}

impl Excision {
    fn new(ranges: impl IntoIterator<Item = TextRange>) -> Self {
        let mut ranges: Vec<_> = ranges.into_iter().filter(|range| !range.is_empty()).collect();
        ranges.sort_by_key(|range| (range.start, range.end));
        let mut cuts: Vec<TextRange> = Vec::with_capacity(ranges.len());
        for range in ranges {
            match cuts.last_mut() {
                Some(last) if range.start <= last.end => last.end = last.end.max(range.end),
                _ => cuts.push(range),
            }
        }
        Self { cuts }
    }

    fn apply(&self, text: &str) -> String {
        if self.cuts.is_empty() {
            return text.to_string();
        }
        let removed: usize = self.cuts.iter().map(TextRange::len).sum();
        let mut out = String::with_capacity(text.len().saturating_sub(removed));
        let mut cursor = 0;
        for cut in &self.cuts {
            out.push_str(&text[cursor..cut.start]);
            cursor = cut.end;
        }
        out.push_str(&text[cursor..]);
        out
    }

    /// Position of `offset` once the cuts are removed. Offsets inside a cut
    /// collapse onto the cut's start.
    fn map_offset(&self, offset: usize) -> usize {
        let mut shift = 0;
        for cut in &self.cuts {
            if cut.start >= offset {
                break;
            }
            if cut.end <= offset {
                shift += cut.len();
            } else {
                return cut.start - shift;
            }
        }
        offset - shift
    }

    /// `None` when a non-empty range vanishes entirely.
    fn map_range(&self, range: TextRange) -> Option<TextRange> {
        let mapped = TextRange::new(self.map_offset(range.start), self.map_offset(range.end));
        if mapped.is_empty() && !range.is_empty() {
            None
        } else {
            Some(mapped)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::LinkKind;
    use proptest::prelude::*;
    use serde_json::json;

    fn source() -> SourceId {
        SourceId::new("wiki")
    }

    fn build(text: &str, annotations: Vec<Annotation>) -> Result<Document> {
        DocumentBuilder::new().build(text, &annotations, &source())
    }

    fn table(start: usize, end: usize, text: &str, tags: Value, tabs: Value) -> Annotation {
        Annotation::new("tbl", start, end)
            .with_attr("text", text)
            .with_attr("tags", tags)
            .with_attr("tabs", tabs)
    }

    fn named_spans(document: &Document) -> Vec<(String, usize, usize)> {
        document
            .spans()
            .filter_map(|span| match &span.style {
                Style::Named(name) => Some((name.clone(), span.range.start, span.range.end)),
                Style::Foreground(_) => None,
            })
            .collect()
    }

    #[test]
    fn passes_style_names_through_in_order() {
        let document = build(
            "Heading body text",
            vec![
                Annotation::new("h1", 0, 7),
                Annotation::new("b", 8, 12),
                Annotation::new("blockquote", 0, 17),
            ],
        )
        .unwrap();
        assert_eq!(document.text, "Heading body text");
        assert_eq!(
            named_spans(&document),
            vec![
                ("h1".to_string(), 0, 7),
                ("b".to_string(), 8, 12),
                ("blockquote".to_string(), 0, 17),
            ]
        );
    }

    #[test]
    fn resolves_footnote_reference_to_definition() {
        let text = "x".repeat(60);
        let document = build(
            &text,
            vec![
                Annotation::new("footnote-ref", 10, 12)
                    .with_attr("group", "g")
                    .with_attr("id", "1"),
                Annotation::new("footnote-def", 50, 55)
                    .with_attr("group", "g")
                    .with_attr("id", "1"),
            ],
        )
        .unwrap();
        let links: Vec<_> = document.links().collect();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].range, TextRange::new(10, 12));
        assert_eq!(links[0].target, LinkTarget::Footnote { anchor: 50 });
        assert!(named_spans(&document).contains(&("ref".to_string(), 10, 12)));
    }

    #[test]
    fn unresolved_footnote_reference_is_dropped() {
        let document = build(
            "see note",
            vec![
                Annotation::new("ref", 4, 8)
                    .with_attr("group", "g")
                    .with_attr("id", "9"),
            ],
        )
        .unwrap();
        assert_eq!(document.links().count(), 0);
        assert!(document.elements.is_empty());
    }

    #[test]
    fn classifies_links_and_styles_them() {
        let text = "one two three";
        let document = build(
            text,
            vec![
                Annotation::new("a", 0, 3).with_attr("href", "http://example.com"),
                Annotation::new("a", 4, 7).with_attr("href", "https://example.com"),
                Annotation::new("iref", 8, 13).with_attr("href", "Berlin"),
            ],
        )
        .unwrap();
        let kinds: Vec<_> = document.links().map(LinkSpan::kind).collect();
        assert_eq!(
            kinds,
            vec![LinkKind::External, LinkKind::Internal, LinkKind::Internal]
        );
        assert_eq!(
            named_spans(&document),
            vec![
                ("url".to_string(), 0, 3),
                ("r".to_string(), 4, 7),
                ("r".to_string(), 8, 13),
            ]
        );
    }

    #[test]
    fn link_without_href_is_dropped() {
        let document = build("plain", vec![Annotation::new("a", 0, 5)]).unwrap();
        assert!(document.elements.is_empty());
    }

    #[test]
    fn keyword_link_targets_its_own_text() {
        let text = "nach Zürich fahren";
        let start = text.find("Zürich").unwrap();
        let end = start + "Zürich".len();
        let document = build(text, vec![Annotation::new("kref", start, end)]).unwrap();
        let link = document.links().next().unwrap();
        assert_eq!(
            link.target,
            LinkTarget::Internal {
                source: source(),
                target: "Zürich".to_string(),
            }
        );
    }

    #[test]
    fn color_needs_attribute() {
        let document = build(
            "red plain",
            vec![
                Annotation::new("c", 0, 3).with_attr("c", "#ff0000"),
                Annotation::new("c", 4, 9),
            ],
        )
        .unwrap();
        let spans: Vec<_> = document.spans().collect();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].style, Style::Foreground("#ff0000".to_string()));
        assert_eq!(spans[0].range, TextRange::new(0, 3));
    }

    #[test]
    fn table_is_excised_and_anchored() {
        let text = "before[TABLE]after";
        let tags = json!([["row", 0, 4], ["b", 0, 1], ["row", 4, 8]]);
        let document = build(
            text,
            vec![
                Annotation::new("i", 0, 6),
                table(6, 13, "a\tb\nc\td\n", tags, json!({"": [0, 12]})),
                Annotation::new("b", 13, 18),
                Annotation::new("u", 3, 15),
                Annotation::new("tt", 7, 10),
            ],
        )
        .unwrap();
        assert_eq!(document.text, "beforeafter");
        assert_eq!(
            named_spans(&document),
            vec![
                ("i".to_string(), 0, 6),
                ("b".to_string(), 6, 11),
                ("u".to_string(), 3, 8),
            ]
        );

        let block = document.blocks().next().unwrap();
        assert_eq!(block.anchor, 6);
        assert_eq!(block.table.document.text, "a\tb\nc\td\n");
        assert_eq!(block.table.tabs, TabStops(vec![0, 12]));
        assert_eq!(block.table.rows.len(), 2);
        assert_eq!(block.table.rows[1].range, TextRange::new(4, 8));
        assert_eq!(block.table.rows[1].tone, RowTone::Odd);
    }

    #[test]
    fn rows_alternate_regardless_of_tab_overrides() {
        let rows: Vec<_> = (0..5).map(|i| json!(["row", i * 4, i * 4 + 4])).collect();
        let document = build(
            "T",
            vec![table(
                0,
                1,
                "a\tb\nc\td\ne\tf\ng\th\ni\tj\n",
                Value::Array(rows),
                json!({"": [0, 8], "1": [0, 20], "4": [2]}),
            )],
        )
        .unwrap();
        let table = &document.blocks().next().unwrap().table;
        let tones: Vec<_> = table.rows.iter().map(|row| row.tone).collect();
        assert_eq!(
            tones,
            vec![
                RowTone::Even,
                RowTone::Odd,
                RowTone::Even,
                RowTone::Odd,
                RowTone::Even
            ]
        );
        assert_eq!(table.rows[0].tabs, None);
        assert_eq!(table.rows[0].effective_tabs(table), &TabStops(vec![0, 8]));
        assert_eq!(table.rows[1].tabs, Some(TabStops(vec![0, 20])));
        assert_eq!(table.rows[4].tabs, Some(TabStops(vec![2])));
    }

    #[test]
    fn empty_table_yields_empty_block() {
        let document = build("[]", vec![table(0, 2, "", json!([]), json!({}))]).unwrap();
        assert_eq!(document.text, "");
        let block = document.blocks().next().unwrap();
        assert_eq!(block.anchor, 0);
        assert_eq!(block.table.document, Document::default());
        assert!(block.table.rows.is_empty());
        assert!(block.table.tabs.is_empty());
    }

    #[test]
    fn tables_nest() {
        let inner = json!(["tbl", 2, 3, {"text": "inner", "tags": [["i", 0, 5]], "tabs": {}}]);
        let document = build(
            "x#y",
            vec![table(1, 2, "ab#", json!([["row", 0, 3], inner]), json!({}))],
        )
        .unwrap();
        let outer = &document.blocks().next().unwrap().table;
        assert_eq!(outer.document.text, "ab");
        assert_eq!(outer.rows[0].range, TextRange::new(0, 2));
        let nested = &outer.document.blocks().next().unwrap().table;
        assert_eq!(nested.document.text, "inner");
        assert_eq!(
            named_spans(&nested.document),
            vec![("i".to_string(), 0, 5)]
        );
    }

    #[test]
    fn footnote_anchor_shifts_past_tables() {
        let text = "ref [T] note";
        let document = build(
            text,
            vec![
                Annotation::new("ref", 0, 3)
                    .with_attr("group", "g")
                    .with_attr("id", 1),
                table(4, 7, "t", json!([]), json!({})),
                Annotation::new("note", 8, 12)
                    .with_attr("group", "g")
                    .with_attr("id", "1"),
            ],
        )
        .unwrap();
        assert_eq!(document.text, "ref  note");
        let link = document.links().next().unwrap();
        assert_eq!(link.target, LinkTarget::Footnote { anchor: 5 });
    }

    #[test]
    fn start_after_end_is_malformed() {
        let err = build("abc", vec![Annotation::new("b", 2, 1)]).unwrap_err();
        match err {
            BuildError::MalformedAnnotation(err) => {
                assert_eq!(err.reason, Malformation::StartAfterEnd);
                assert_eq!(err.name, "b");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn end_past_text_is_malformed() {
        let err = build("abc", vec![Annotation::new("i", 0, 4)]).unwrap_err();
        assert!(matches!(
            err,
            BuildError::MalformedAnnotation(MalformedAnnotationError {
                reason: Malformation::EndOutOfBounds,
                ..
            })
        ));
    }

    #[test]
    fn split_character_is_malformed() {
        let err = build("über", vec![Annotation::new("i", 1, 3)]).unwrap_err();
        assert!(matches!(
            err,
            BuildError::MalformedAnnotation(MalformedAnnotationError {
                reason: Malformation::NotCharBoundary,
                ..
            })
        ));
    }

    #[test]
    fn malformed_annotation_inside_table_fails_the_build() {
        let err = build(
            "T",
            vec![table(0, 1, "ab", json!([["b", 1, 9]]), json!({}))],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            BuildError::MalformedAnnotation(MalformedAnnotationError { text_len: 2, .. })
        ));
    }

    #[test]
    fn table_without_text_is_malformed() {
        let annotation = Annotation::new("table", 0, 1).with_attr("tags", json!([]));
        let err = build("T", vec![annotation]).unwrap_err();
        assert!(matches!(
            err,
            BuildError::MalformedAnnotation(MalformedAnnotationError {
                reason: Malformation::TablePayload(_),
                ..
            })
        ));
    }

    #[test]
    fn nesting_limit_is_enforced() {
        let inner = json!(["tbl", 0, 1, {"text": "z", "tags": []}]);
        let annotations = vec![table(0, 1, "y", json!([inner]), json!({}))];
        let builder = DocumentBuilder::with_options(BuildOptions { max_table_depth: 1 });
        let err = builder.build("x", &annotations, &source()).unwrap_err();
        assert_eq!(err, BuildError::TableTooDeep { limit: 1 });
        assert!(
            DocumentBuilder::new()
                .build("x", &annotations, &source())
                .is_ok()
        );
    }

    #[test]
    fn excision_merges_overlapping_cuts() {
        let excision = Excision::new(vec![
            TextRange::new(2, 5),
            TextRange::new(4, 8),
            TextRange::new(10, 12),
        ]);
        assert_eq!(excision.apply("0123456789abcdef"), "0189cdef");
        assert_eq!(excision.map_offset(1), 1);
        assert_eq!(excision.map_offset(6), 2);
        assert_eq!(excision.map_offset(9), 3);
        assert_eq!(excision.map_offset(14), 6);
        assert_eq!(excision.map_range(TextRange::new(3, 7)), None);
        assert_eq!(
            excision.map_range(TextRange::new(9, 9)),
            Some(TextRange::point(3))
        );
    }

    fn annotation_strategy(len: usize) -> impl Strategy<Value = Annotation> {
        (0..=len, 0..=len, prop::bool::ANY, 0usize..7).prop_map(|(a, b, is_table, style)| {
            let (start, end) = (a.min(b), a.max(b));
            if is_table {
                table(start, end, "cell", json!([["row", 0, 4]]), json!({}))
            } else {
                Annotation::new(["b", "i", "a", "kref", "c", "ref", "note"][style], start, end)
                    .with_attr("href", "Berlin")
                    .with_attr("c", "red")
                    .with_attr("group", "n")
                    .with_attr("id", "1")
            }
        })
    }

    proptest! {
        #[test]
        fn coverage_equals_text_minus_tables(
            (text, annotations) in "[a-z ]{0,40}".prop_flat_map(|text| {
                let len = text.len();
                (Just(text), prop::collection::vec(annotation_strategy(len), 0..12))
            })
        ) {
            let document = build(&text, annotations.clone()).unwrap();
            let mut inside_table = vec![false; text.len()];
            for annotation in annotations.iter().filter(|a| a.kind() == AnnotationKind::Table) {
                inside_table[annotation.start..annotation.end].fill(true);
            }
            let kept: String = text
                .chars()
                .zip(&inside_table)
                .filter(|(_, cut)| !**cut)
                .map(|(ch, _)| ch)
                .collect();
            prop_assert_eq!(document.len(), kept.len());
            prop_assert_eq!(&document.text, &kept);
            for span in document.spans() {
                prop_assert!(span.range.end <= document.len());
            }
            for block in document.blocks() {
                prop_assert!(block.anchor <= document.len());
            }
        }
    }
}

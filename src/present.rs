//! Flattens a [`Document`] into display-ready pieces.
//!
//! Layered spans are cut at every boundary so each run carries a single,
//! composited set of properties. Presentation code only has to paint runs in
//! order and drop tables in where their blocks appear.

use crate::document::{Document, Element, EmbeddedBlock, LinkSpan, TextRange};
use crate::style::{StyleProps, StyleRegistry};

#[derive(Debug, Clone, PartialEq)]
pub struct Run<'a> {
    pub range: TextRange,
    pub text: &'a str,
    pub props: StyleProps,
    /// Topmost link over this run.
    pub link: Option<&'a LinkSpan>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Piece<'a> {
    Text(Run<'a>),
    Block(&'a EmbeddedBlock),
}

/// Runs of uniformly styled text, in text order.
pub fn styled_runs<'a>(document: &'a Document, registry: &StyleRegistry) -> Vec<Run<'a>> {
    let mut bounds = vec![0, document.len()];
    for element in &document.elements {
        match element {
            Element::Span(span) => bounds.extend([span.range.start, span.range.end]),
            Element::Link(link) => bounds.extend([link.range.start, link.range.end]),
            Element::Block(block) => bounds.push(block.anchor),
        }
    }
    bounds.sort_unstable();
    bounds.dedup();

    bounds
        .windows(2)
        .filter_map(|pair| {
            let range = TextRange::new(pair[0], pair[1]);
            let text = document.slice(range)?;
            let covers = |other: &TextRange| other.start <= range.start && range.end <= other.end;
            let props = registry.composite(
                document
                    .spans()
                    .filter(|span| covers(&span.range))
                    .map(|span| &span.style),
            );
            let link = document.links().filter(|link| covers(&link.range)).last();
            Some(Run {
                range,
                text,
                props,
                link,
            })
        })
        .collect()
}

/// Runs interleaved with embedded blocks at their anchors.
pub fn pieces<'a>(document: &'a Document, registry: &StyleRegistry) -> Vec<Piece<'a>> {
    let mut blocks: Vec<&EmbeddedBlock> = document.blocks().collect();
    blocks.sort_by_key(|block| block.anchor);
    let mut blocks = blocks.into_iter().peekable();

    let mut out = Vec::new();
    for run in styled_runs(document, registry) {
        while let Some(block) = blocks.next_if(|block| block.anchor <= run.range.start) {
            out.push(Piece::Block(block));
        }
        out.push(Piece::Text(run));
    }
    out.extend(blocks.map(Piece::Block));
    out
}

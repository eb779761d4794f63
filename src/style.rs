//! Visual properties of the named style vocabulary.
//!
//! The registry is built once per process and handed to presentation code;
//! the document builder never consults it.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::Serialize;

use crate::document::{RowTone, Style};

pub const SCALE_X_SMALL: f32 = 0.694_444;
pub const SCALE_SMALL: f32 = 0.833_333;
pub const SCALE_MEDIUM: f32 = 1.0;
pub const SCALE_LARGE: f32 = 1.2;
pub const SCALE_X_LARGE: f32 = 1.44;

/// Raised/lowered baseline for superscripts and subscripts, in points.
const RISE: i32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Weight {
    Normal,
    SemiBold,
    Bold,
    UltraBold,
}

/// Visual properties; `None` leaves the property to lower layers.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct StyleProps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<Weight>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub italic: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub underline: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreground: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rise: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pixels_above: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pixels_below: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indent: Option<u32>,
}

impl StyleProps {
    fn weight(mut self, weight: Weight) -> Self {
        self.weight = Some(weight);
        self
    }

    fn scale(mut self, scale: f32) -> Self {
        self.scale = Some(scale);
        self
    }

    fn italic(mut self) -> Self {
        self.italic = Some(true);
        self
    }

    fn underline(mut self) -> Self {
        self.underline = Some(true);
        self
    }

    fn family(mut self, family: &str) -> Self {
        self.family = Some(family.to_string());
        self
    }

    fn foreground(mut self, color: &str) -> Self {
        self.foreground = Some(color.to_string());
        self
    }

    fn background(mut self, color: &str) -> Self {
        self.background = Some(color.to_string());
        self
    }

    fn rise(mut self, rise: i32) -> Self {
        self.rise = Some(rise);
        self
    }

    fn spacing(mut self, above: u32, below: u32) -> Self {
        self.pixels_above = Some(above);
        self.pixels_below = Some(below);
        self
    }

    fn below(mut self, pixels: u32) -> Self {
        self.pixels_below = Some(pixels);
        self
    }

    fn indent(mut self, indent: u32) -> Self {
        self.indent = Some(indent);
        self
    }

    /// Puts `over` on top of `self`: properties set in `over` win, the rest
    /// are kept.
    pub fn layer(&mut self, over: &StyleProps) {
        overlay(&mut self.weight, &over.weight);
        overlay(&mut self.scale, &over.scale);
        overlay(&mut self.italic, &over.italic);
        overlay(&mut self.underline, &over.underline);
        overlay(&mut self.family, &over.family);
        overlay(&mut self.foreground, &over.foreground);
        overlay(&mut self.background, &over.background);
        overlay(&mut self.rise, &over.rise);
        overlay(&mut self.pixels_above, &over.pixels_above);
        overlay(&mut self.pixels_below, &over.pixels_below);
        overlay(&mut self.indent, &over.indent);
    }

    pub fn is_plain(&self) -> bool {
        *self == StyleProps::default()
    }

    pub fn is_bold(&self) -> bool {
        matches!(
            self.weight,
            Some(Weight::SemiBold | Weight::Bold | Weight::UltraBold)
        )
    }
}

fn overlay<T: Clone>(slot: &mut Option<T>, over: &Option<T>) {
    if over.is_some() {
        slot.clone_from(over);
    }
}

pub struct StyleRegistry {
    styles: HashMap<&'static str, StyleProps>,
}

static GLOBAL: Lazy<StyleRegistry> = Lazy::new(StyleRegistry::standard);

impl StyleRegistry {
    /// Process-wide registry, built on first use.
    pub fn global() -> &'static StyleRegistry {
        &GLOBAL
    }

    pub fn get(&self, name: &str) -> Option<&StyleProps> {
        self.styles.get(name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.styles.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Properties of a document style. Unknown names resolve to `None`.
    pub fn resolve(&self, style: &Style) -> Option<StyleProps> {
        match style {
            Style::Named(name) => self.get(name).cloned(),
            Style::Foreground(color) => Some(StyleProps::default().foreground(color)),
        }
    }

    /// Layers `styles` in order over plain text.
    pub fn composite<'a>(&self, styles: impl IntoIterator<Item = &'a Style>) -> StyleProps {
        let mut props = StyleProps::default();
        for style in styles {
            if let Some(layer) = self.resolve(style) {
                props.layer(&layer);
            }
        }
        props
    }

    pub fn row(&self, tone: RowTone) -> StyleProps {
        StyleProps::default()
            .background(tone.background())
            .spacing(tone.padding(), tone.padding())
    }

    fn standard() -> Self {
        use Weight::*;

        let plain = StyleProps::default;
        let heading = |weight, scale, above, below| {
            plain().weight(weight).scale(scale).spacing(above, below)
        };
        let entries = [
            ("b", plain().weight(Bold)),
            ("strong", plain().weight(Bold)),
            ("small", plain().scale(SCALE_SMALL)),
            ("big", plain().scale(SCALE_LARGE)),
            ("h1", heading(UltraBold, SCALE_X_LARGE, 12, 6)),
            ("h2", heading(Bold, SCALE_LARGE, 6, 3)),
            ("h3", heading(Bold, SCALE_MEDIUM, 3, 2)),
            ("h4", heading(SemiBold, SCALE_MEDIUM, 3, 2)),
            ("h5", heading(SemiBold, SCALE_MEDIUM, 3, 2).italic()),
            (
                "h6",
                plain().scale(SCALE_MEDIUM).underline().spacing(3, 2),
            ),
            ("row", plain().background("#eeeeee").below(2)),
            ("td", plain().background("#00ee00").below(2)),
            ("i", plain().italic()),
            ("em", plain().italic()),
            ("u", plain().underline()),
            (
                "ref",
                plain()
                    .underline()
                    .rise(RISE)
                    .scale(SCALE_X_SMALL)
                    .foreground("blue"),
            ),
            ("tt", plain().family("monospace")),
            (
                "pos",
                plain().italic().weight(SemiBold).foreground("darkgreen"),
            ),
            ("r", plain().underline().foreground("brown4")),
            ("url", plain().underline().foreground("steelblue4")),
            ("tr", plain().weight(Bold).foreground("darkred")),
            ("p", plain().spacing(3, 3)),
            ("div", plain().spacing(3, 3)),
            ("sup", plain().rise(RISE).scale(SCALE_X_SMALL)),
            ("sub", plain().rise(-RISE).scale(SCALE_X_SMALL)),
            ("blockquote", plain().indent(6)),
            ("cite", plain().italic().family("serif").indent(6)),
            // key phrase
            ("k", heading(Bold, SCALE_LARGE, 6, 3)),
            // direct translation of the key phrase
            ("dtrn", plain().family("monospace")),
            // editorial comment
            ("co", plain().foreground("slategray4").scale(SCALE_SMALL)),
            // example
            (
                "ex",
                plain().italic().family("serif").foreground("darkblue"),
            ),
            (
                "abr",
                plain().weight(SemiBold).italic().foreground("darkred"),
            ),
            // whole article
            ("ar", plain()),
        ];
        Self {
            styles: entries.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_is_shared() {
        let first = StyleRegistry::global() as *const StyleRegistry;
        let second = StyleRegistry::global() as *const StyleRegistry;
        assert_eq!(first, second);
        assert!(StyleRegistry::global().get("h1").is_some());
        assert!(StyleRegistry::global().get("marquee").is_none());
    }

    #[test]
    fn later_layers_win_and_others_accumulate() {
        let registry = StyleRegistry::global();
        let styles = [
            Style::named("r"),
            Style::named("b"),
            Style::Foreground("#123456".to_string()),
        ];
        let props = registry.composite(&styles);
        assert_eq!(props.foreground.as_deref(), Some("#123456"));
        assert_eq!(props.underline, Some(true));
        assert!(props.is_bold());
    }

    #[test]
    fn unknown_styles_are_ignored() {
        let registry = StyleRegistry::global();
        let props = registry.composite(&[Style::named("blink")]);
        assert!(props.is_plain());
    }

    #[test]
    fn rows_use_tone_background() {
        let registry = StyleRegistry::global();
        assert_eq!(
            registry.row(RowTone::Odd).background.as_deref(),
            Some("#f0f0f0")
        );
        assert_eq!(registry.row(RowTone::Even).pixels_above, Some(1));
    }
}

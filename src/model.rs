use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;

/// Key/value attributes attached to an annotation.
pub type Attributes = serde_json::Map<String, Value>;

/// Identity of the dictionary an article came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SourceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Inline markup over the half-open byte range `start..end` of its owning text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawAnnotation")]
pub struct Annotation {
    pub name: String,
    pub start: usize,
    pub end: usize,
    #[serde(skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
}

impl Annotation {
    pub fn new(name: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            name: name.into(),
            start,
            end,
            attributes: Attributes::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Scalar attribute as text. Numbers and booleans use their display form;
    /// null, arrays and objects yield `None`.
    pub fn attr_str(&self, key: &str) -> Option<Cow<'_, str>> {
        self.attr(key).and_then(scalar_text)
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> AnnotationKind {
        AnnotationKind::classify(&self.name)
    }
}

pub(crate) fn scalar_text(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::String(text) => Some(Cow::Borrowed(text.as_str())),
        Value::Number(number) => Some(Cow::Owned(number.to_string())),
        Value::Bool(flag) => Some(Cow::Owned(flag.to_string())),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Semantic kind of an annotation, resolved from its name.
///
/// Both the long names and the short tags used by stored articles are
/// understood. Anything unrecognised is a plain style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationKind {
    Link,
    KeywordLink,
    FootnoteRef,
    FootnoteDef,
    Table,
    Color,
    Style,
}

impl AnnotationKind {
    pub fn classify(name: &str) -> Self {
        match name {
            "link" | "a" | "iref" => AnnotationKind::Link,
            "keyword-link" | "kref" => AnnotationKind::KeywordLink,
            "footnote-ref" | "ref" => AnnotationKind::FootnoteRef,
            "footnote-def" | "note" => AnnotationKind::FootnoteDef,
            "table" | "tbl" => AnnotationKind::Table,
            "color" | "c" => AnnotationKind::Color,
            _ => AnnotationKind::Style,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAnnotation {
    Object {
        name: String,
        start: usize,
        end: usize,
        #[serde(default)]
        attributes: Attributes,
    },
    Full(String, usize, usize, Attributes),
    Short(String, usize, usize),
}

impl From<RawAnnotation> for Annotation {
    fn from(raw: RawAnnotation) -> Self {
        match raw {
            RawAnnotation::Object {
                name,
                start,
                end,
                attributes,
            }
            | RawAnnotation::Full(name, start, end, attributes) => Annotation {
                name,
                start,
                end,
                attributes,
            },
            RawAnnotation::Short(name, start, end) => Annotation::new(name, start, end),
        }
    }
}

/// An already-resolved dictionary article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub text: String,
    #[serde(default, alias = "tags")]
    pub annotations: Vec<Annotation>,
    pub source: SourceId,
}

impl Article {
    pub fn new(
        title: impl Into<String>,
        text: impl Into<String>,
        annotations: Vec<Annotation>,
        source: SourceId,
    ) -> Self {
        Self {
            title: title.into(),
            text: text.into(),
            annotations,
            source,
        }
    }

    /// Stand-in shown when an article redirects to a title that does not exist.
    pub fn redirect_placeholder(title: impl Into<String>, redirect: &str, source: SourceId) -> Self {
        Self::new(
            title,
            format!("Redirect to {redirect} not found"),
            Vec::new(),
            source,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_tuple_and_object_forms() {
        let raw = json!([
            ["b", 0, 4],
            ["a", 5, 9, {"href": "Berlin"}],
            {"name": "i", "start": 1, "end": 2},
        ]);
        let annotations: Vec<Annotation> = serde_json::from_value(raw).unwrap();
        assert_eq!(annotations.len(), 3);
        assert_eq!(annotations[0], Annotation::new("b", 0, 4));
        assert_eq!(annotations[1].attr_str("href").as_deref(), Some("Berlin"));
        assert_eq!(annotations[2].name, "i");
        assert!(annotations[2].attributes.is_empty());
    }

    #[test]
    fn numeric_attributes_read_as_text() {
        let annotation = Annotation::new("ref", 0, 1)
            .with_attr("group", "g")
            .with_attr("id", 7);
        assert_eq!(annotation.attr_str("id").as_deref(), Some("7"));
        assert_eq!(annotation.attr_str("missing"), None);
    }

    #[test]
    fn short_and_long_names_share_a_kind() {
        assert_eq!(AnnotationKind::classify("tbl"), AnnotationKind::Table);
        assert_eq!(AnnotationKind::classify("table"), AnnotationKind::Table);
        assert_eq!(AnnotationKind::classify("kref"), AnnotationKind::KeywordLink);
        assert_eq!(AnnotationKind::classify("note"), AnnotationKind::FootnoteDef);
        assert_eq!(AnnotationKind::classify("h2"), AnnotationKind::Style);
    }

    #[test]
    fn article_accepts_tags_alias() {
        let article: Article = serde_json::from_value(json!({
            "title": "dog",
            "text": "a dog",
            "tags": [["b", 2, 5]],
            "source": "wiki",
        }))
        .unwrap();
        assert_eq!(article.annotations.len(), 1);
        assert_eq!(article.source.as_str(), "wiki");
    }
}

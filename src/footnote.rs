use std::collections::HashMap;

use crate::model::{Annotation, AnnotationKind};

/// `(group, id)` identity shared by a footnote reference and its definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FootnoteKey {
    pub group: String,
    pub id: String,
}

impl FootnoteKey {
    pub fn new(group: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            id: id.into(),
        }
    }

    /// Reads `group` and `id` from the annotation's attributes. Scalars are
    /// compared by their text, so `"id": 1` and `"id": "1"` name the same note.
    pub fn of(annotation: &Annotation) -> Option<Self> {
        let group = annotation.attr_str("group")?;
        let id = annotation.attr_str("id")?;
        Some(Self::new(group.into_owned(), id.into_owned()))
    }
}

/// Footnote definitions of one text, keyed by identity and pointing at the
/// definition's start offset. Scoped to a single annotation list.
#[derive(Debug, Clone, Default)]
pub struct FootnoteIndex {
    anchors: HashMap<FootnoteKey, usize>,
}

impl FootnoteIndex {
    pub fn from_annotations(annotations: &[Annotation]) -> Self {
        let anchors = annotations
            .iter()
            .filter(|annotation| annotation.kind() == AnnotationKind::FootnoteDef)
            .filter_map(|annotation| FootnoteKey::of(annotation).map(|key| (key, annotation.start)))
            .collect();
        Self { anchors }
    }

    pub fn resolve(&self, key: &FootnoteKey) -> Option<usize> {
        self.anchors.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(group: &str, id: &str, start: usize) -> Annotation {
        Annotation::new("note", start, start + 3)
            .with_attr("group", group)
            .with_attr("id", id)
    }

    #[test]
    fn indexes_definitions_only() {
        let annotations = vec![
            def("g", "1", 50),
            Annotation::new("ref", 10, 12)
                .with_attr("group", "g")
                .with_attr("id", "2"),
            Annotation::new("b", 0, 4),
        ];
        let index = FootnoteIndex::from_annotations(&annotations);
        assert_eq!(index.len(), 1);
        assert_eq!(index.resolve(&FootnoteKey::new("g", "1")), Some(50));
        assert_eq!(index.resolve(&FootnoteKey::new("g", "2")), None);
    }

    #[test]
    fn last_duplicate_wins() {
        let annotations = vec![def("g", "1", 20), def("g", "1", 70)];
        let index = FootnoteIndex::from_annotations(&annotations);
        assert_eq!(index.resolve(&FootnoteKey::new("g", "1")), Some(70));
    }

    #[test]
    fn definitions_without_identity_are_skipped() {
        let annotations = vec![
            Annotation::new("footnote-def", 5, 9).with_attr("group", "g"),
            Annotation::new("footnote-def", 9, 12).with_attr("id", "3"),
        ];
        assert!(FootnoteIndex::from_annotations(&annotations).is_empty());
    }

    #[test]
    fn groups_keep_ids_apart() {
        let annotations = vec![def("a", "1", 5), def("b", "1", 15)];
        let index = FootnoteIndex::from_annotations(&annotations);
        assert_eq!(index.resolve(&FootnoteKey::new("a", "1")), Some(5));
        assert_eq!(index.resolve(&FootnoteKey::new("b", "1")), Some(15));
    }

    #[test]
    fn numeric_and_text_ids_match() {
        let annotations = vec![
            Annotation::new("note", 30, 40)
                .with_attr("group", "g")
                .with_attr("id", 1),
        ];
        let index = FootnoteIndex::from_annotations(&annotations);
        let reference = Annotation::new("ref", 0, 2)
            .with_attr("group", "g")
            .with_attr("id", "1");
        let key = FootnoteKey::of(&reference).unwrap();
        assert_eq!(index.resolve(&key), Some(30));
    }
}

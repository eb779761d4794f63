//! Where articles come from.
//!
//! Rendering only ever sees resolved [`Article`] values. [`ArticleSource`] is
//! the seam a real dictionary backend implements; [`JsonDictionary`] is a small
//! file-backed one used by the command line and the tests.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::LookupError;
use crate::model::{Annotation, Article, SourceId};

/// Redirect chains longer than this are treated as unresolved.
pub const MAX_REDIRECT_HOPS: usize = 8;

pub trait ArticleSource {
    fn source(&self) -> &SourceId;

    /// Looks up `word`, following redirects.
    fn read(&self, word: &str) -> Result<Article, LookupError>;
}

/// Reads `word`, substituting a placeholder article for a dangling redirect.
pub fn read_or_placeholder<S>(dictionary: &S, word: &str) -> Result<Article, LookupError>
where
    S: ArticleSource + ?Sized,
{
    match dictionary.read(word) {
        Err(LookupError::RedirectNotFound { article, redirect }) => {
            warn!(
                source = %article.source,
                title = %article.title,
                redirect = %redirect,
                "redirect target missing, showing placeholder"
            );
            let Article { title, source, .. } = *article;
            Ok(Article::redirect_placeholder(title, &redirect, source))
        }
        other => other,
    }
}

#[derive(Debug, Deserialize)]
struct DictionaryFile {
    source: SourceId,
    articles: Vec<StoredArticle>,
}

#[derive(Debug, Clone, Deserialize)]
struct StoredArticle {
    title: String,
    #[serde(default)]
    text: String,
    #[serde(default, alias = "tags")]
    annotations: Vec<Annotation>,
    #[serde(default)]
    redirect: Option<String>,
}

/// Articles loaded from one JSON file, keyed by exact title.
#[derive(Debug)]
pub struct JsonDictionary {
    source: SourceId,
    articles: HashMap<String, StoredArticle>,
}

impl JsonDictionary {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LookupError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        let dictionary = Self::from_json(&raw)?;
        debug!(
            path = %path.display(),
            source = %dictionary.source,
            articles = dictionary.len(),
            "loaded dictionary"
        );
        Ok(dictionary)
    }

    pub fn from_json(raw: &str) -> Result<Self, LookupError> {
        let file: DictionaryFile = serde_json::from_str(raw)?;
        let articles = file
            .articles
            .into_iter()
            .map(|article| (article.title.clone(), article))
            .collect();
        Ok(Self {
            source: file.source,
            articles,
        })
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }

    pub fn titles(&self) -> Vec<&str> {
        let mut titles: Vec<_> = self.articles.keys().map(String::as_str).collect();
        titles.sort_unstable();
        titles
    }

    fn article(&self, stored: &StoredArticle) -> Article {
        Article::new(
            stored.title.clone(),
            stored.text.clone(),
            stored.annotations.clone(),
            self.source.clone(),
        )
    }
}

impl ArticleSource for JsonDictionary {
    fn source(&self) -> &SourceId {
        &self.source
    }

    fn read(&self, word: &str) -> Result<Article, LookupError> {
        let first = self
            .articles
            .get(word)
            .ok_or_else(|| LookupError::NotFound {
                dictionary: self.source.clone(),
                word: word.to_string(),
            })?;

        let mut current = first;
        let mut hops = 0;
        while let Some(target) = &current.redirect {
            match self.articles.get(target) {
                Some(next) if hops < MAX_REDIRECT_HOPS => {
                    current = next;
                    hops += 1;
                }
                _ => {
                    return Err(LookupError::RedirectNotFound {
                        article: Box::new(self.article(first)),
                        redirect: target.clone(),
                    });
                }
            }
        }
        Ok(self.article(current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dictionary() -> JsonDictionary {
        let raw = json!({
            "source": "wiki",
            "articles": [
                {"title": "Berlin", "text": "Berlin is a city", "tags": [["b", 0, 6]]},
                {"title": "berlin", "redirect": "Berlin"},
                {"title": "Atlantis", "redirect": "Nowhere"},
                {"title": "ping", "redirect": "pong"},
                {"title": "pong", "redirect": "ping"},
            ]
        });
        JsonDictionary::from_json(&raw.to_string()).unwrap()
    }

    #[test]
    fn reads_articles_with_tag_alias() {
        let dict = dictionary();
        assert_eq!(dict.len(), 5);
        let article = dict.read("Berlin").unwrap();
        assert_eq!(article.source, SourceId::new("wiki"));
        assert_eq!(article.annotations, vec![Annotation::new("b", 0, 6)]);
    }

    #[test]
    fn follows_redirects() {
        let article = dictionary().read("berlin").unwrap();
        assert_eq!(article.title, "Berlin");
        assert_eq!(article.text, "Berlin is a city");
    }

    #[test]
    fn missing_word_is_not_found() {
        let err = dictionary().read("Paris").unwrap_err();
        assert!(matches!(err, LookupError::NotFound { ref word, .. } if word == "Paris"));
    }

    #[test]
    fn dangling_redirect_becomes_placeholder() {
        let dict = dictionary();
        assert!(matches!(
            dict.read("Atlantis"),
            Err(LookupError::RedirectNotFound { ref redirect, .. }) if redirect == "Nowhere"
        ));
        let placeholder = read_or_placeholder(&dict, "Atlantis").unwrap();
        assert_eq!(placeholder.title, "Atlantis");
        assert_eq!(placeholder.text, "Redirect to Nowhere not found");
        assert!(placeholder.annotations.is_empty());
        assert_eq!(placeholder.source, SourceId::new("wiki"));
    }

    #[test]
    fn redirect_cycles_stop() {
        let dict = dictionary();
        assert!(matches!(
            dict.read("ping"),
            Err(LookupError::RedirectNotFound { .. })
        ));
    }

    #[test]
    fn placeholder_passes_other_errors_through() {
        let dict = dictionary();
        assert!(matches!(
            read_or_placeholder(&dict, "Paris"),
            Err(LookupError::NotFound { .. })
        ));
    }

    #[test]
    fn opens_files() {
        let path = std::env::temp_dir().join(format!("aard-render-dict-{}.json", std::process::id()));
        fs::write(
            &path,
            r#"{"source": "tiny", "articles": [{"title": "a", "text": "letter"}]}"#,
        )
        .unwrap();
        let dict = JsonDictionary::open(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(dict.source(), &SourceId::new("tiny"));
        assert_eq!(dict.titles(), vec!["a"]);
        assert!(matches!(
            JsonDictionary::open(&path),
            Err(LookupError::Io(_))
        ));
        assert!(matches!(
            JsonDictionary::from_json("{}"),
            Err(LookupError::Parse(_))
        ));
    }
}

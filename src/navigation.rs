use std::fmt;

use crate::document::{Document, LinkSpan, LinkTarget};
use crate::model::SourceId;

type InternalHandler = Box<dyn Fn(&SourceId, &str) + Send + Sync>;
type ExternalHandler = Box<dyn Fn(&str) + Send + Sync>;
type FootnoteHandler = Box<dyn Fn(usize) + Send + Sync>;

/// Callbacks the presentation layer invokes when a link is activated.
/// The renderer never navigates on its own.
pub struct LinkHandlers {
    internal: InternalHandler,
    external: ExternalHandler,
    footnote: FootnoteHandler,
}

impl LinkHandlers {
    pub fn new(
        internal: impl Fn(&SourceId, &str) + Send + Sync + 'static,
        external: impl Fn(&str) + Send + Sync + 'static,
        footnote: impl Fn(usize) + Send + Sync + 'static,
    ) -> Self {
        Self {
            internal: Box::new(internal),
            external: Box::new(external),
            footnote: Box::new(footnote),
        }
    }

    pub fn activate(&self, link: &LinkSpan) {
        match &link.target {
            LinkTarget::Internal { source, target } => (self.internal)(source, target),
            LinkTarget::External { url } => (self.external)(url),
            LinkTarget::Footnote { anchor } => (self.footnote)(*anchor),
        }
    }

    /// Activates the topmost link at `offset`. Returns whether one was hit.
    pub fn activate_at(&self, document: &Document, offset: usize) -> bool {
        match document.link_at(offset) {
            Some(link) => {
                self.activate(link);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for LinkHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkHandlers").finish_non_exhaustive()
    }
}

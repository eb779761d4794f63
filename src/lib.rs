mod builder;
mod document;
mod error;
mod footnote;
mod lookup;
mod model;
mod navigation;
pub mod present;
mod scheduler;
mod style;

pub use builder::{BuildOptions, DocumentBuilder};
pub use document::{
    Document, Element, EmbeddedBlock, LinkKind, LinkSpan, LinkTarget, RowTone, Span, Style,
    TabStops, Table, TableRow, TextRange,
};
pub use error::{
    BuildError, LookupError, Malformation, MalformedAnnotationError, Result, SchedulerError,
};
pub use footnote::{FootnoteIndex, FootnoteKey};
pub use lookup::{ArticleSource, JsonDictionary, MAX_REDIRECT_HOPS, read_or_placeholder};
pub use model::{Annotation, AnnotationKind, Article, Attributes, SourceId};
pub use navigation::LinkHandlers;
pub use scheduler::{
    ChannelSink, RenderHandle, RenderOutcome, RenderScheduler, RenderSink, RenderTask,
    SchedulerConfig, TaskState,
};
#[cfg(feature = "async")]
pub use scheduler::AsyncChannelSink;
pub use style::{StyleProps, StyleRegistry, Weight};

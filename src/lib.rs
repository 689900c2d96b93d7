pub mod annotate;
pub mod config;
pub mod deeplink;
pub mod dom;
pub mod layout;
pub mod loader;
pub mod markup;
pub mod model;
pub mod playback;
pub mod render;
pub mod script;
pub mod tree;
pub mod viewer;
pub mod vocab;

pub use annotate::{AnnotationReport, Annotator};
pub use config::{AnnotationConfig, ConfigError, RenderConfig, SourceConfig, ViewerConfig};
pub use dom::{Document, NodeId};
pub use loader::{DirectorySource, LessonSource, LoadError};
#[cfg(feature = "http")]
pub use loader::HttpSource;
pub use markup::MarkupError;
pub use model::{Catalog, CatalogEntry, Lesson, LessonContent, VocabEntry};
pub use playback::{PlaybackController, SharedPlayback, Transition};
pub use render::ContentRenderer;
pub use viewer::{LessonSummary, LoadOutcome, Viewer};
pub use vocab::Vocabulary;

/// Annotates a standalone markup fragment and returns the annotated markup.
pub fn annotate_markup(
    annotator: &Annotator,
    markup: &str,
    vocabulary: &Vocabulary,
) -> Result<(String, AnnotationReport), MarkupError> {
    let mut doc = Document::new();
    let root = doc.root();
    doc.append_markup(root, markup)?;
    let report = annotator.annotate(&mut doc, root, vocabulary);
    Ok((doc.inner_html(root), report))
}

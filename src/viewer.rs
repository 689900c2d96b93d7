//! The page: one document, one playback controller, and the lesson currently shown.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};
use url::Url;

use crate::annotate::{AnnotationReport, Annotator};
use crate::config::{ConfigError, ViewerConfig};
use crate::deeplink::{lesson_from_url, with_lesson};
use crate::dom::{Document, NodeId};
use crate::layout::{DividerKey, Preferences, SplitLayout};
use crate::loader::{LessonSource, LoadError};
use crate::model::{Catalog, Lesson, VocabEntry};
use crate::playback::{
    AudioBackend, AudioHandle, DocumentButtons, PlaybackController, PlaybackEvent, SharedPlayback,
    Transition, playback_button,
};
use crate::render::ContentRenderer;
use crate::vocab::Vocabulary;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LessonSummary {
    pub id: String,
    pub title: String,
    pub shape: &'static str,
    pub buttons: usize,
    pub literal_fallbacks: usize,
    pub annotation: AnnotationReport,
    pub vocabulary: Vec<VocabEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Rendered(LessonSummary),
    /// A newer request started while this one was in flight; nothing was rendered.
    Stale { id: String },
    /// The catalog is empty and no lesson was requested.
    NoLessons,
}

struct Page {
    document: Document,
    location: Url,
    catalog: Catalog,
    active: Option<String>,
    layout: SplitLayout,
    preferences: Preferences,
    notices: Vec<String>,
}

pub struct Viewer<S, A> {
    source: S,
    renderer: ContentRenderer,
    annotator: Annotator,
    lesson_param: String,
    preferences_path: Option<PathBuf>,
    page: Mutex<Page>,
    generation: AtomicU64,
    playback: SharedPlayback<A, NodeId>,
}

impl<S, A> Viewer<S, A>
where
    S: LessonSource,
    A: AudioBackend,
{
    pub fn new(source: S, backend: A, config: &ViewerConfig) -> Result<Self, ConfigError> {
        let location = config.page_location()?;
        let renderer = ContentRenderer::new(config.render.clone());
        let annotator = Annotator::new(config.annotation.clone())?;
        let playback = SharedPlayback::new(PlaybackController::new(
            backend,
            location.clone(),
            config.render.playback_failed_message.clone(),
        ));
        let preferences = config
            .preferences
            .as_deref()
            .map(|path| {
                Preferences::load(path).unwrap_or_else(|err| {
                    warn!(path = %path.display(), error = %err, "failed to read preferences");
                    Preferences::default()
                })
            })
            .unwrap_or_default();
        let layout = preferences.layout();
        let mut document = renderer.skeleton();
        layout.apply(&mut document);
        Ok(Self {
            source,
            renderer,
            annotator,
            lesson_param: config.source.lesson_param.clone(),
            preferences_path: config.preferences.clone(),
            page: Mutex::new(Page {
                document,
                location,
                catalog: Catalog::default(),
                active: None,
                layout,
                preferences,
                notices: Vec::new(),
            }),
            generation: AtomicU64::new(0),
            playback,
        })
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn renderer(&self) -> &ContentRenderer {
        &self.renderer
    }

    pub fn playback(&self) -> &SharedPlayback<A, NodeId> {
        &self.playback
    }

    /// Loads the catalog, fills the selector and shows the deep-linked lesson, or the
    /// first one when the page names none.
    pub async fn start(&self) -> Result<LoadOutcome, LoadError> {
        let catalog = match self.source.catalog().await {
            Ok(catalog) => catalog,
            Err(err) => {
                warn!(error = %err, "failed to load lesson catalog");
                let mut page = self.page.lock();
                self.renderer.show_load_failure(&mut page.document);
                return Err(err);
            }
        };

        let id = {
            let mut page = self.page.lock();
            let id = lesson_from_url(&page.location, &self.lesson_param)
                .or_else(|| catalog.lessons.first().map(|entry| entry.id.clone()));
            self.renderer
                .fill_lesson_select(&mut page.document, &catalog, id.as_deref());
            page.catalog = catalog;
            id
        };
        match id {
            Some(id) => self.load(&id).await,
            None => Ok(LoadOutcome::NoLessons),
        }
    }

    /// A selector change: mirrors the id into the page location, then loads it.
    pub async fn select_lesson(&self, id: &str) -> Result<LoadOutcome, LoadError> {
        {
            let mut page = self.page.lock();
            page.location = with_lesson(&page.location, &self.lesson_param, Some(id));
            let Page {
                document, catalog, ..
            } = &mut *page;
            self.renderer.fill_lesson_select(document, catalog, Some(id));
        }
        self.load(id).await
    }

    pub async fn load(&self, id: &str) -> Result<LoadOutcome, LoadError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(lesson = id, generation, "switching lesson");
        let fetched = self.source.lesson(id).await;

        let mut page = self.page.lock();
        if self.generation.load(Ordering::SeqCst) != generation {
            warn!(lesson = id, generation, "discarding stale lesson response");
            return Ok(LoadOutcome::Stale { id: id.to_string() });
        }
        match fetched {
            Ok(lesson) => {
                let summary = self.present(&mut page.document, &lesson);
                page.active = Some(lesson.id);
                Ok(LoadOutcome::Rendered(summary))
            }
            Err(err) => {
                warn!(lesson = id, error = %err, "failed to load lesson");
                self.renderer.show_load_failure(&mut page.document);
                Err(err)
            }
        }
    }

    fn present(&self, document: &mut Document, lesson: &Lesson) -> LessonSummary {
        let outcome = self.renderer.render(document, lesson);
        let annotation = match outcome.content {
            Some(content) => self.annotator.annotate(
                document,
                content,
                &Vocabulary::new(lesson.vocabulary.clone()),
            ),
            None => AnnotationReport::default(),
        };
        let root = document.root();
        LessonSummary {
            id: lesson.id.clone(),
            title: lesson.display_title().to_string(),
            shape: lesson.content.shape(),
            buttons: self.renderer.playback_buttons(document, root).len(),
            literal_fallbacks: outcome.literal_fallbacks,
            annotation,
            vocabulary: lesson.vocabulary.clone(),
        }
    }

    /// A click anywhere in the page. Only clicks inside a playback button do anything.
    pub fn click(&self, target: NodeId) -> Transition<NodeId> {
        let config = self.renderer.config();
        let mut page = self.page.lock();
        let Page {
            document, notices, ..
        } = &mut *page;
        let Some((button, src)) = playback_button(document, target, &config.audio_attribute)
        else {
            return Transition::Ignored;
        };
        let mut surface = DocumentButtons {
            document,
            play_icon: &config.play_icon,
            pause_icon: &config.pause_icon,
        };
        self.playback
            .toggle(button, Some(&src), &mut surface, notices)
    }

    pub fn media_event(&self, handle: AudioHandle, event: PlaybackEvent) -> Transition<NodeId> {
        let config = self.renderer.config();
        let mut page = self.page.lock();
        let Page {
            document, notices, ..
        } = &mut *page;
        let mut surface = DocumentButtons {
            document,
            play_icon: &config.play_icon,
            pause_icon: &config.pause_icon,
        };
        self.playback
            .handle_event(handle, event, &mut surface, notices)
    }

    /// Moves the pane divider to `percent`.
    pub fn resize(&self, percent: f64) -> SplitLayout {
        self.set_layout(|_| SplitLayout::new(percent))
    }

    /// Divider dragged to `offset` inside a split container `width` wide.
    pub fn drag_divider(&self, offset: f64, width: f64) -> SplitLayout {
        self.set_layout(|_| SplitLayout::from_pointer(offset, width))
    }

    /// Keyboard on the focused divider.
    pub fn nudge_divider(&self, key: DividerKey, coarse: bool) -> SplitLayout {
        self.set_layout(|current| current.nudge(key, coarse))
    }

    /// Writes the new split into the page and saves it when a preferences file is set.
    fn set_layout(&self, next: impl FnOnce(SplitLayout) -> SplitLayout) -> SplitLayout {
        let mut page = self.page.lock();
        let layout = next(page.layout);
        page.layout = layout;
        layout.apply(&mut page.document);
        page.preferences.remember(layout);
        if let Some(path) = &self.preferences_path {
            if let Err(err) = page.preferences.save(path) {
                warn!(path = %path.display(), error = %err, "failed to save preferences");
            }
        }
        layout
    }

    pub fn layout(&self) -> SplitLayout {
        self.page.lock().layout
    }

    pub fn location(&self) -> Url {
        self.page.lock().location.clone()
    }

    pub fn active_lesson(&self) -> Option<String> {
        self.page.lock().active.clone()
    }

    pub fn catalog(&self) -> Catalog {
        self.page.lock().catalog.clone()
    }

    /// Notices raised since the last call.
    pub fn take_notices(&self) -> Vec<String> {
        std::mem::take(&mut self.page.lock().notices)
    }

    pub fn playback_buttons(&self) -> Vec<NodeId> {
        let page = self.page.lock();
        self.renderer
            .playback_buttons(&page.document, page.document.root())
    }

    pub fn read_document<R>(&self, f: impl FnOnce(&Document) -> R) -> R {
        f(&self.page.lock().document)
    }

    pub fn html(&self) -> String {
        self.read_document(|doc| doc.inner_html(doc.root()))
    }

    pub fn region_html(&self, id: &str) -> Option<String> {
        self.read_document(|doc| doc.element_by_id(id).map(|node| doc.inner_html(node)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LessonDocument;
    use crate::playback::{SharedElement, SilentElement};
    use crate::tree::NodeTree;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct MemorySource {
        catalog: Option<String>,
        lessons: HashMap<String, String>,
        gate: Option<(String, Arc<Notify>)>,
    }

    impl MemorySource {
        fn with_lesson(mut self, id: &str, json: &str) -> Self {
            self.lessons.insert(id.to_string(), json.to_string());
            self
        }
    }

    impl LessonSource for MemorySource {
        async fn catalog(&self) -> Result<Catalog, LoadError> {
            let raw = self
                .catalog
                .as_deref()
                .ok_or_else(|| LoadError::Transport("offline".to_string()))?;
            serde_json::from_str(raw).map_err(|source| LoadError::Decode {
                origin: "index.json".to_string(),
                source,
            })
        }

        async fn lesson(&self, id: &str) -> Result<Lesson, LoadError> {
            if let Some((slow, gate)) = &self.gate {
                if slow == id {
                    gate.notified().await;
                }
            }
            let raw = self.lessons.get(id).ok_or_else(|| LoadError::Status {
                url: format!("{id}.json"),
                status: 404,
            })?;
            let document: LessonDocument =
                serde_json::from_str(raw).map_err(|source| LoadError::Decode {
                    origin: format!("{id}.json"),
                    source,
                })?;
            Ok(Lesson::from_document(id, document))
        }
    }

    type TestViewer = Viewer<MemorySource, SharedElement<SilentElement>>;

    fn viewer(source: MemorySource, page_url: &str) -> TestViewer {
        let config = ViewerConfig {
            page_url: page_url.to_string(),
            ..ViewerConfig::default()
        };
        Viewer::new(source, SharedElement::new(SilentElement::default()), &config).unwrap()
    }

    const CATALOG: &str =
        r#"{"lessons": [{"id": "l1", "title": "Greetings"}, {"id": "l2", "title": "Travel"}]}"#;
    const L1: &str = r#"{"title": "Greetings", "paragraphs": [{"text": "你好！", "audio": "audio/l1-1.mp3"}],
        "vocab": [{"hz": "你好", "py": "nǐ hǎo", "en": "hello"}]}"#;
    const L2: &str = r#"{"title": "Travel", "title_audio": "audio/l2.mp3",
        "content_html": "<p>我去北京。<button class=\"play-button\" data-audio=\"audio/l2-1.mp3\" onclick=\"togglePlay(this)\">▶︎</button></p>",
        "vocab": [{"hz": "北京", "py": "Běijīng", "en": "Beijing"}]}"#;

    fn source() -> MemorySource {
        MemorySource {
            catalog: Some(CATALOG.to_string()),
            ..MemorySource::default()
        }
        .with_lesson("l1", L1)
        .with_lesson("l2", L2)
    }

    #[tokio::test]
    async fn start_prefers_the_deep_link_and_annotates() {
        let viewer = viewer(source(), "https://x.test/read/index.html?lesson=l2");
        let outcome = viewer.start().await.unwrap();
        let LoadOutcome::Rendered(summary) = outcome else {
            panic!("expected a render, got {outcome:?}");
        };
        assert_eq!(summary.id, "l2");
        assert_eq!(summary.shape, "legacy");
        assert_eq!(summary.buttons, 2);
        assert_eq!(summary.annotation.occurrences, 1);
        assert_eq!(viewer.active_lesson().as_deref(), Some("l2"));

        let content = viewer.region_html("content").unwrap();
        assert!(content.contains(r#"<span class="vocab" data-translit="Běijīng" data-gloss="Beijing">北京"#));
        let select = viewer.region_html("lessonSelect").unwrap();
        assert!(select.contains(r#"<option value="l2" selected="selected">Travel</option>"#));
    }

    #[tokio::test]
    async fn start_falls_back_to_the_first_lesson() {
        let viewer = viewer(source(), "https://x.test/read/");
        let outcome = viewer.start().await.unwrap();
        assert!(matches!(outcome, LoadOutcome::Rendered(ref s) if s.id == "l1"));

        let empty = self::viewer(
            MemorySource {
                catalog: Some("{}".to_string()),
                ..MemorySource::default()
            },
            "https://x.test/",
        );
        assert_eq!(empty.start().await.unwrap(), LoadOutcome::NoLessons);
    }

    #[tokio::test]
    async fn catalog_failure_shows_the_load_placeholder() {
        let viewer = viewer(MemorySource::default(), "https://x.test/");
        assert!(viewer.start().await.is_err());
        let content = viewer.region_html("content").unwrap();
        assert_eq!(content, viewer.renderer().config().load_failed_message);
    }

    #[tokio::test]
    async fn missing_lesson_shows_the_placeholder_and_keeps_playback() {
        let viewer = viewer(source(), "https://x.test/");
        viewer.start().await.unwrap();
        let button = viewer.playback_buttons()[0];
        viewer.click(button);
        assert!(viewer.load("nope").await.is_err());
        assert_eq!(
            viewer.region_html("content").unwrap(),
            viewer.renderer().config().load_failed_message
        );
        assert_eq!(viewer.playback().state().active_button(), Some(button));
    }

    #[tokio::test]
    async fn stale_response_is_discarded() {
        let gate = Arc::new(Notify::new());
        let source = MemorySource {
            gate: Some(("slow".to_string(), Arc::clone(&gate))),
            ..source()
        }
        .with_lesson("slow", r#"{"paragraphs": [{"text": "slow lesson"}]}"#)
        .with_lesson("fast", r#"{"paragraphs": [{"text": "fast lesson"}]}"#);
        let viewer = viewer(source, "https://x.test/");

        let (slow, fast) = tokio::join!(viewer.load("slow"), async {
            let outcome = viewer.load("fast").await;
            gate.notify_one();
            outcome
        });
        assert_eq!(
            slow.unwrap(),
            LoadOutcome::Stale {
                id: "slow".to_string()
            }
        );
        assert!(matches!(fast.unwrap(), LoadOutcome::Rendered(_)));
        assert_eq!(viewer.active_lesson().as_deref(), Some("fast"));
        assert_eq!(viewer.region_html("content").unwrap(), "<p>fast lesson</p>");
    }

    #[tokio::test]
    async fn selecting_a_lesson_updates_the_deep_link() {
        let viewer = viewer(source(), "https://x.test/read/?lesson=l1&font=big");
        viewer.start().await.unwrap();
        viewer.select_lesson("l2").await.unwrap();
        assert_eq!(
            viewer.location().as_str(),
            "https://x.test/read/?lesson=l2&font=big"
        );
        let select = viewer.region_html("lessonSelect").unwrap();
        assert!(select.contains(r#"<option value="l2" selected="selected">"#));
        assert!(!select.contains(r#"<option value="l1" selected"#));
    }

    #[tokio::test]
    async fn clicks_dispatch_through_the_shared_controller() {
        let viewer = viewer(source(), "https://x.test/read/index.html");
        viewer.start().await.unwrap();
        let button = viewer.playback_buttons()[0];
        let pause = viewer.renderer().config().pause_icon.clone();
        let play = viewer.renderer().config().play_icon.clone();

        let started = viewer.click(button);
        let Transition::Started { source, .. } = started else {
            panic!("expected playback to start, got {started:?}");
        };
        assert_eq!(source.as_str(), "https://x.test/read/audio/l1-1.mp3");
        assert_eq!(viewer.read_document(|doc| doc.text_content(button)), pause);

        let handle = viewer.playback().state().active().unwrap().handle;
        assert_eq!(viewer.media_event(handle, PlaybackEvent::Ended), Transition::Finished(button));
        assert_eq!(viewer.read_document(|doc| doc.text_content(button)), play);

        let title = viewer.read_document(|doc| doc.element_by_id("title").unwrap());
        assert_eq!(viewer.click(title), Transition::Ignored);
    }

    #[test]
    fn resize_clamps_and_updates_the_divider() {
        let viewer = viewer(source(), "https://x.test/");
        assert!(viewer.html().contains(r#"aria-valuenow="62""#));
        let layout = viewer.resize(90.0);
        assert_eq!(layout.percent(), crate::layout::MAX_PERCENT);
        assert_eq!(viewer.layout(), layout);
        assert!(viewer.html().contains(r#"aria-valuenow="80""#));
    }

    #[tokio::test]
    async fn repeated_loads_and_clicks_keep_the_page_bounded() {
        async fn cycle(viewer: &TestViewer) {
            viewer.load("l1").await.unwrap();
            viewer.click(viewer.playback_buttons()[0]);
            viewer.load("l2").await.unwrap();
            let button = viewer.playback_buttons()[1];
            viewer.click(button);
            viewer.click(button);
        }

        let viewer = viewer(source(), "https://x.test/");
        cycle(&viewer).await;
        let settled = viewer.read_document(Document::node_count);
        let html = viewer.html();
        for _ in 0..50 {
            cycle(&viewer).await;
        }
        assert_eq!(viewer.read_document(Document::node_count), settled);
        assert_eq!(viewer.html(), html);
    }

    #[tokio::test]
    async fn buttons_from_a_replaced_lesson_stay_untouched() {
        let viewer = viewer(source(), "https://x.test/");
        viewer.load("l1").await.unwrap();
        let old = viewer.playback_buttons()[0];
        viewer.click(old);
        let handle = viewer.playback().state().active().unwrap().handle;

        viewer.load("l2").await.unwrap();
        let before = viewer.html();
        assert!(!viewer.read_document(|doc| doc.contains(old)));
        assert_eq!(viewer.media_event(handle, PlaybackEvent::Ended), Transition::Finished(old));
        assert_eq!(viewer.click(old), Transition::Ignored);
        assert_eq!(viewer.html(), before);
        assert!(viewer.playback().state().is_idle());
    }

    #[test]
    fn split_is_restored_and_saved_through_preferences() {
        let path = std::env::temp_dir().join(format!(
            "lessongloss-viewer-prefs-{}.json",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        let config = ViewerConfig {
            preferences: Some(path.clone()),
            ..ViewerConfig::default()
        };
        let backend = || SharedElement::new(SilentElement::default());

        let first = Viewer::new(source(), backend(), &config).unwrap();
        assert_eq!(first.layout(), SplitLayout::default());
        first.resize(40.0);

        let second = Viewer::new(source(), backend(), &config).unwrap();
        assert_eq!(second.layout().percent(), 40.0);
        assert!(second.html().contains(r#"style="flex: 0 0 40%""#));

        assert_eq!(second.nudge_divider(DividerKey::Left, true).percent(), 35.0);
        assert_eq!(second.drag_divider(150.0, 300.0).percent(), 50.0);
        let third = Viewer::new(source(), backend(), &config).unwrap();
        assert_eq!(third.layout().percent(), 50.0);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn unreadable_preferences_fall_back_to_the_default_split() {
        let path = std::env::temp_dir().join(format!(
            "lessongloss-viewer-bad-prefs-{}.json",
            std::process::id()
        ));
        std::fs::write(&path, "not json").unwrap();
        let config = ViewerConfig {
            preferences: Some(path.clone()),
            ..ViewerConfig::default()
        };
        let viewer = Viewer::new(source(), SharedElement::new(SilentElement::default()), &config)
            .unwrap();
        assert_eq!(viewer.layout(), SplitLayout::default());
        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn lessons_with_null_fields_still_render() {
        let viewer = viewer(
            source().with_lesson(
                "sparse",
                r#"{"paragraphs": [{"text": "北京"}], "images": [{"src": null, "alt": "map"}],
                    "vocab": [{"hz": null, "py": "x"}, {"hz": "北京", "py": "Běijīng", "en": null}]}"#,
            ),
            "https://x.test/",
        );
        let outcome = viewer.load("sparse").await.unwrap();
        let LoadOutcome::Rendered(summary) = outcome else {
            panic!("expected a render, got {outcome:?}");
        };
        assert_eq!(summary.annotation.occurrences, 1);
        let content = viewer.region_html("content").unwrap();
        assert!(content.contains(r#"<img src="" alt="map">"#));
        assert_ne!(content, viewer.renderer().config().load_failed_message);
    }

    #[tokio::test]
    async fn failed_start_raises_a_notice() {
        let viewer = viewer(
            source().with_lesson("bad", r#"{"paragraphs": [{"text": "x", "audio": "https://[::1"}]}"#),
            "https://x.test/",
        );
        viewer.load("bad").await.unwrap();
        let button = viewer.playback_buttons()[0];
        assert!(matches!(viewer.click(button), Transition::Failed { .. }));
        assert_eq!(
            viewer.take_notices(),
            vec![viewer.renderer().config().playback_failed_message.clone()]
        );
        assert!(viewer.take_notices().is_empty());
    }
}

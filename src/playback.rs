//! Single-instance audio playback: at most one source plays, and the button that
//! started it shows the pause icon until it is paused, finishes or fails.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};
use url::Url;

use crate::dom::{Document, NodeId};
use crate::tree::{NodeTree, closest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Icon {
    Play,
    Pause,
}

/// Wherever playback buttons live; the controller only ever changes their icon.
pub trait ButtonSurface<B> {
    fn set_icon(&mut self, button: B, icon: Icon);
}

/// Receives user-visible playback notices.
pub trait Notifier {
    fn notify(&mut self, message: &str);
}

impl Notifier for Vec<String> {
    fn notify(&mut self, message: &str) {
        self.push(message.to_string());
    }
}

/// Buttons inside a [`Document`], where the icon is the button's whole text.
pub struct DocumentButtons<'a> {
    pub document: &'a mut Document,
    pub play_icon: &'a str,
    pub pause_icon: &'a str,
}

impl ButtonSurface<NodeId> for DocumentButtons<'_> {
    fn set_icon(&mut self, button: NodeId, icon: Icon) {
        let glyph = match icon {
            Icon::Play => self.play_icon,
            Icon::Pause => self.pause_icon,
        };
        self.document.set_text_content(button, glyph);
    }
}

/// Nearest `<button>` at or above `target` that carries `audio_attribute`, with the
/// attribute's value. Clicks anywhere inside a playback button dispatch to it.
pub fn playback_button(
    document: &Document,
    target: NodeId,
    audio_attribute: &str,
) -> Option<(NodeId, String)> {
    let button = closest(document, target, |doc, node| {
        doc.tag(node) == Some("button") && doc.attribute(node, audio_attribute).is_some()
    })?;
    let src = document.attribute(button, audio_attribute)?.to_string();
    Some((button, src))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    InvalidSource { src: String, reason: url::ParseError },
    Rejected(String),
}

impl fmt::Display for PlaybackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackError::InvalidSource { src, reason } => {
                write!(f, "cannot resolve audio source {src:?}: {reason}")
            }
            PlaybackError::Rejected(reason) => write!(f, "playback rejected: {reason}"),
        }
    }
}

impl std::error::Error for PlaybackError {}

/// Identifies one started playback. Every start hands out a new handle, so events
/// from an earlier start can be told apart from the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioHandle(u64);

impl AudioHandle {
    pub fn generation(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    Ended,
    Error,
    /// The asynchronous start of playback was refused.
    Rejected(String),
}

/// A single audio element.
pub trait MediaElement {
    fn src(&self) -> Option<&Url>;
    fn set_src(&mut self, src: Url);
    fn rewind(&mut self);
    fn play(&mut self) -> Result<(), PlaybackError>;
    fn pause(&mut self);
    fn is_paused(&self) -> bool;
}

/// Resource strategy behind the controller.
pub trait AudioBackend {
    /// Starts `src` from the beginning and returns the handle its events will carry.
    fn start(&mut self, src: &Url) -> Result<AudioHandle, PlaybackError>;
    fn pause(&mut self, handle: AudioHandle);
    fn is_playing(&self, handle: AudioHandle) -> bool;
}

/// One element reused for every button. Assigning a new source stops the old one.
#[derive(Debug)]
pub struct SharedElement<M> {
    element: M,
    generation: u64,
}

impl<M: MediaElement> SharedElement<M> {
    pub fn new(element: M) -> Self {
        Self {
            element,
            generation: 0,
        }
    }

    pub fn element(&self) -> &M {
        &self.element
    }

    fn is_current(&self, handle: AudioHandle) -> bool {
        self.generation != 0 && handle.0 == self.generation
    }
}

impl<M: MediaElement> AudioBackend for SharedElement<M> {
    fn start(&mut self, src: &Url) -> Result<AudioHandle, PlaybackError> {
        if self.element.src() != Some(src) {
            self.element.set_src(src.clone());
        }
        self.element.rewind();
        self.generation += 1;
        self.element.play()?;
        Ok(AudioHandle(self.generation))
    }

    fn pause(&mut self, handle: AudioHandle) {
        if self.is_current(handle) {
            self.element.pause();
        }
    }

    fn is_playing(&self, handle: AudioHandle) -> bool {
        self.is_current(handle) && !self.element.is_paused()
    }
}

/// A fresh element per start; the previous one is paused and rewound first.
pub struct ElementPerClick<M, F> {
    factory: F,
    current: Option<(AudioHandle, M)>,
    generation: u64,
}

impl<M, F> ElementPerClick<M, F>
where
    M: MediaElement,
    F: FnMut() -> M,
{
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            current: None,
            generation: 0,
        }
    }

    pub fn current(&self) -> Option<&M> {
        self.current.as_ref().map(|(_, element)| element)
    }

    fn element_for(&self, handle: AudioHandle) -> Option<&M> {
        self.current
            .as_ref()
            .filter(|(current, _)| *current == handle)
            .map(|(_, element)| element)
    }
}

impl<M, F> AudioBackend for ElementPerClick<M, F>
where
    M: MediaElement,
    F: FnMut() -> M,
{
    fn start(&mut self, src: &Url) -> Result<AudioHandle, PlaybackError> {
        if let Some((_, mut previous)) = self.current.take() {
            previous.pause();
            previous.rewind();
        }
        let mut element = (self.factory)();
        element.set_src(src.clone());
        element.rewind();
        self.generation += 1;
        let handle = AudioHandle(self.generation);
        element.play()?;
        self.current = Some((handle, element));
        Ok(handle)
    }

    fn pause(&mut self, handle: AudioHandle) {
        if let Some((current, element)) = self.current.as_mut() {
            if *current == handle {
                element.pause();
            }
        }
    }

    fn is_playing(&self, handle: AudioHandle) -> bool {
        self.element_for(handle)
            .is_some_and(|element| !element.is_paused())
    }
}

/// An element that accepts every source and never produces sound.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SilentElement {
    src: Option<Url>,
    paused: bool,
    position_reset: bool,
}

impl MediaElement for SilentElement {
    fn src(&self) -> Option<&Url> {
        self.src.as_ref()
    }

    fn set_src(&mut self, src: Url) {
        self.src = Some(src);
        self.paused = true;
    }

    fn rewind(&mut self) {
        self.position_reset = true;
    }

    fn play(&mut self) -> Result<(), PlaybackError> {
        if self.src.is_none() {
            return Err(PlaybackError::Rejected("no source assigned".to_string()));
        }
        self.paused = false;
        Ok(())
    }

    fn pause(&mut self) {
        self.paused = true;
    }

    fn is_paused(&self) -> bool {
        self.src.is_none() || self.paused
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivePlayback<B> {
    pub handle: AudioHandle,
    pub button: B,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackState<B> {
    active: Option<ActivePlayback<B>>,
}

impl<B> Default for PlaybackState<B> {
    fn default() -> Self {
        Self { active: None }
    }
}

impl<B: Copy> PlaybackState<B> {
    pub fn active(&self) -> Option<ActivePlayback<B>> {
        self.active
    }

    pub fn active_button(&self) -> Option<B> {
        self.active.map(|active| active.button)
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition<B> {
    /// Nothing changed: no source, or an event from a superseded handle.
    Ignored,
    Paused(B),
    Started {
        button: B,
        source: Url,
        switched_from: Option<B>,
    },
    Finished(B),
    Failed {
        button: B,
        error: PlaybackError,
    },
}

pub struct PlaybackController<A, B> {
    backend: A,
    page_location: Url,
    failure_notice: String,
    state: PlaybackState<B>,
}

impl<A, B> PlaybackController<A, B>
where
    A: AudioBackend,
    B: Copy + Eq + fmt::Debug,
{
    pub fn new(backend: A, page_location: Url, failure_notice: impl Into<String>) -> Self {
        Self {
            backend,
            page_location,
            failure_notice: failure_notice.into(),
            state: PlaybackState::default(),
        }
    }

    pub fn state(&self) -> &PlaybackState<B> {
        &self.state
    }

    pub fn backend(&self) -> &A {
        &self.backend
    }

    pub fn page_location(&self) -> &Url {
        &self.page_location
    }

    pub fn resolve(&self, src: &str) -> Result<Url, PlaybackError> {
        self.page_location
            .join(src)
            .map_err(|reason| PlaybackError::InvalidSource {
                src: src.to_string(),
                reason,
            })
    }

    /// Click on `button`, whose audio reference is `src`.
    pub fn toggle<S, N>(
        &mut self,
        button: B,
        src: Option<&str>,
        surface: &mut S,
        notices: &mut N,
    ) -> Transition<B>
    where
        S: ButtonSurface<B>,
        N: Notifier,
    {
        let Some(src) = src.filter(|src| !src.is_empty()) else {
            return Transition::Ignored;
        };

        if let Some(active) = self.state.active {
            if active.button == button && self.backend.is_playing(active.handle) {
                self.backend.pause(active.handle);
                surface.set_icon(button, Icon::Play);
                self.state.active = None;
                return Transition::Paused(button);
            }
        }

        let switched_from = self
            .state
            .active
            .take()
            .map(|previous| previous.button)
            .filter(|previous| *previous != button);
        if let Some(previous) = switched_from {
            surface.set_icon(previous, Icon::Play);
        }
        surface.set_icon(button, Icon::Pause);

        let started = self
            .resolve(src)
            .and_then(|source| self.backend.start(&source).map(|handle| (handle, source)));
        match started {
            Ok((handle, source)) => {
                debug!(?button, %source, "playback started");
                self.state.active = Some(ActivePlayback { handle, button });
                Transition::Started {
                    button,
                    source,
                    switched_from,
                }
            }
            Err(error) => self.fail(button, error, surface, notices),
        }
    }

    /// Delivers an event raised by the backend for `handle`.
    pub fn handle_event<S, N>(
        &mut self,
        handle: AudioHandle,
        event: PlaybackEvent,
        surface: &mut S,
        notices: &mut N,
    ) -> Transition<B>
    where
        S: ButtonSurface<B>,
        N: Notifier,
    {
        let Some(active) = self.state.active.filter(|active| active.handle == handle) else {
            debug!(generation = handle.generation(), ?event, "ignoring event from superseded audio");
            return Transition::Ignored;
        };
        match event {
            PlaybackEvent::Ended | PlaybackEvent::Error => {
                surface.set_icon(active.button, Icon::Play);
                self.state.active = None;
                Transition::Finished(active.button)
            }
            PlaybackEvent::Rejected(reason) => self.fail(
                active.button,
                PlaybackError::Rejected(reason),
                surface,
                notices,
            ),
        }
    }

    fn fail<S, N>(
        &mut self,
        button: B,
        error: PlaybackError,
        surface: &mut S,
        notices: &mut N,
    ) -> Transition<B>
    where
        S: ButtonSurface<B>,
        N: Notifier,
    {
        warn!(?button, error = %error, "audio playback failed");
        notices.notify(&self.failure_notice);
        surface.set_icon(button, Icon::Play);
        self.state.active = None;
        Transition::Failed { button, error }
    }
}

/// The page-wide dispatch capability every playback button reaches.
pub struct SharedPlayback<A, B> {
    inner: Arc<Mutex<PlaybackController<A, B>>>,
}

impl<A, B> Clone for SharedPlayback<A, B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A, B> SharedPlayback<A, B>
where
    A: AudioBackend,
    B: Copy + Eq + fmt::Debug,
{
    pub fn new(controller: PlaybackController<A, B>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(controller)),
        }
    }

    pub fn toggle<S, N>(
        &self,
        button: B,
        src: Option<&str>,
        surface: &mut S,
        notices: &mut N,
    ) -> Transition<B>
    where
        S: ButtonSurface<B>,
        N: Notifier,
    {
        self.inner.lock().toggle(button, src, surface, notices)
    }

    pub fn handle_event<S, N>(
        &self,
        handle: AudioHandle,
        event: PlaybackEvent,
        surface: &mut S,
        notices: &mut N,
    ) -> Transition<B>
    where
        S: ButtonSurface<B>,
        N: Notifier,
    {
        self.inner.lock().handle_event(handle, event, surface, notices)
    }

    pub fn state(&self) -> PlaybackState<B> {
        *self.inner.lock().state()
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut PlaybackController<A, B>) -> R) -> R {
        f(&mut self.inner.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Default)]
    struct Icons(Vec<(u32, Icon)>);

    impl ButtonSurface<u32> for Icons {
        fn set_icon(&mut self, button: u32, icon: Icon) {
            self.0.push((button, icon));
        }
    }

    /// Media element that records every source assignment.
    #[derive(Debug, Default, Clone)]
    struct Recording {
        inner: SilentElement,
        assigned: Rc<RefCell<Vec<String>>>,
        refuse: bool,
    }

    impl MediaElement for Recording {
        fn src(&self) -> Option<&Url> {
            self.inner.src()
        }
        fn set_src(&mut self, src: Url) {
            self.assigned.borrow_mut().push(src.to_string());
            self.inner.set_src(src);
        }
        fn rewind(&mut self) {
            self.inner.rewind();
        }
        fn play(&mut self) -> Result<(), PlaybackError> {
            if self.refuse {
                return Err(PlaybackError::Rejected("autoplay blocked".to_string()));
            }
            self.inner.play()
        }
        fn pause(&mut self) {
            self.inner.pause();
        }
        fn is_paused(&self) -> bool {
            self.inner.is_paused()
        }
    }

    fn page() -> Url {
        Url::parse("https://lessons.example/reader/index.html").unwrap()
    }

    fn shared_controller() -> (
        PlaybackController<SharedElement<Recording>, u32>,
        Rc<RefCell<Vec<String>>>,
    ) {
        let element = Recording::default();
        let assigned = Rc::clone(&element.assigned);
        (
            PlaybackController::new(SharedElement::new(element), page(), "playback failed"),
            assigned,
        )
    }

    const X: u32 = 1;
    const Y: u32 = 2;

    #[test]
    fn toggling_the_same_button_twice_pauses_without_switching_source() {
        let (mut controller, assigned) = shared_controller();
        let mut icons = Icons::default();
        let mut notices = Vec::new();

        let first = controller.toggle(X, Some("audio/x.mp3"), &mut icons, &mut notices);
        assert!(matches!(first, Transition::Started { button: X, switched_from: None, .. }));
        assert_eq!(controller.state().active_button(), Some(X));

        let second = controller.toggle(X, Some("audio/x.mp3"), &mut icons, &mut notices);
        assert_eq!(second, Transition::Paused(X));
        assert!(controller.state().is_idle());
        assert!(controller.backend().element().is_paused());
        assert_eq!(
            assigned.borrow().as_slice(),
            &["https://lessons.example/reader/audio/x.mp3".to_string()]
        );
        assert_eq!(icons.0, vec![(X, Icon::Pause), (X, Icon::Play)]);
        assert!(notices.is_empty());
    }

    #[test]
    fn other_button_after_pause_leaves_the_first_alone() {
        let (mut controller, _) = shared_controller();
        let mut icons = Icons::default();
        let mut notices = Vec::new();
        controller.toggle(X, Some("x.mp3"), &mut icons, &mut notices);
        controller.toggle(X, Some("x.mp3"), &mut icons, &mut notices);
        icons.0.clear();

        let started = controller.toggle(Y, Some("y.mp3"), &mut icons, &mut notices);
        assert!(matches!(started, Transition::Started { button: Y, switched_from: None, .. }));
        assert_eq!(icons.0, vec![(Y, Icon::Pause)]);
    }

    #[test]
    fn switching_buttons_resets_the_previous_icon() {
        let (mut controller, assigned) = shared_controller();
        let mut icons = Icons::default();
        let mut notices = Vec::new();
        controller.toggle(X, Some("x.mp3"), &mut icons, &mut notices);
        let switched = controller.toggle(Y, Some("y.mp3"), &mut icons, &mut notices);

        assert!(matches!(switched, Transition::Started { button: Y, switched_from: Some(X), .. }));
        assert_eq!(
            icons.0,
            vec![(X, Icon::Pause), (X, Icon::Play), (Y, Icon::Pause)]
        );
        assert_eq!(assigned.borrow().len(), 2);
        assert_eq!(controller.state().active_button(), Some(Y));
    }

    #[test]
    fn paused_button_restarts_without_reassigning_its_source() {
        let (mut controller, assigned) = shared_controller();
        let mut icons = Icons::default();
        let mut notices = Vec::new();
        controller.toggle(X, Some("x.mp3"), &mut icons, &mut notices);
        controller.toggle(X, Some("x.mp3"), &mut icons, &mut notices);
        let again = controller.toggle(X, Some("x.mp3"), &mut icons, &mut notices);
        assert!(matches!(again, Transition::Started { button: X, .. }));
        assert_eq!(assigned.borrow().len(), 1);
    }

    #[test]
    fn stale_end_event_mutates_nothing() {
        let (mut controller, _) = shared_controller();
        let mut icons = Icons::default();
        let mut notices = Vec::new();
        controller.toggle(X, Some("x.mp3"), &mut icons, &mut notices);
        let stale = controller.state().active().unwrap().handle;
        controller.toggle(Y, Some("y.mp3"), &mut icons, &mut notices);
        icons.0.clear();

        let outcome = controller.handle_event(stale, PlaybackEvent::Ended, &mut icons, &mut notices);
        assert_eq!(outcome, Transition::Ignored);
        assert!(icons.0.is_empty());
        assert_eq!(controller.state().active_button(), Some(Y));

        let current = controller.state().active().unwrap().handle;
        let finished =
            controller.handle_event(current, PlaybackEvent::Ended, &mut icons, &mut notices);
        assert_eq!(finished, Transition::Finished(Y));
        assert_eq!(icons.0, vec![(Y, Icon::Play)]);
        assert!(controller.state().is_idle());
    }

    #[test]
    fn rejection_surfaces_a_notice_and_resets() {
        let (mut controller, _) = shared_controller();
        let mut icons = Icons::default();
        let mut notices = Vec::new();
        controller.toggle(X, Some("x.mp3"), &mut icons, &mut notices);
        let handle = controller.state().active().unwrap().handle;

        let outcome = controller.handle_event(
            handle,
            PlaybackEvent::Rejected("NotAllowedError".to_string()),
            &mut icons,
            &mut notices,
        );
        assert!(matches!(outcome, Transition::Failed { button: X, .. }));
        assert_eq!(notices, vec!["playback failed".to_string()]);
        assert_eq!(icons.0.last(), Some(&(X, Icon::Play)));
        assert!(controller.state().is_idle());
    }

    #[test]
    fn synchronous_refusal_and_bad_sources_fail_the_same_way() {
        let element = Recording {
            refuse: true,
            ..Recording::default()
        };
        let mut controller: PlaybackController<_, u32> =
            PlaybackController::new(SharedElement::new(element), page(), "nope");
        let mut icons = Icons::default();
        let mut notices = Vec::new();
        let refused = controller.toggle(X, Some("x.mp3"), &mut icons, &mut notices);
        assert!(matches!(refused, Transition::Failed { error: PlaybackError::Rejected(_), .. }));

        let (mut controller, _) = shared_controller();
        let bad = controller.toggle(Y, Some("https://[::1"), &mut icons, &mut notices);
        assert!(matches!(bad, Transition::Failed { error: PlaybackError::InvalidSource { .. }, .. }));
        assert_eq!(notices.len(), 2);
        assert!(controller.state().is_idle());
    }

    #[test]
    fn missing_or_empty_source_is_ignored() {
        let (mut controller, assigned) = shared_controller();
        let mut icons = Icons::default();
        let mut notices = Vec::new();
        assert_eq!(
            controller.toggle(X, None, &mut icons, &mut notices),
            Transition::Ignored
        );
        assert_eq!(
            controller.toggle(X, Some(""), &mut icons, &mut notices),
            Transition::Ignored
        );
        assert!(icons.0.is_empty());
        assert!(assigned.borrow().is_empty());
    }

    #[test]
    fn per_click_strategy_pauses_the_previous_element() {
        let mut controller: PlaybackController<_, u32> =
            PlaybackController::new(ElementPerClick::new(SilentElement::default), page(), "x");
        let mut icons = Icons::default();
        let mut notices = Vec::new();
        controller.toggle(X, Some("x.mp3"), &mut icons, &mut notices);
        let first = controller.state().active().unwrap().handle;
        controller.toggle(Y, Some("y.mp3"), &mut icons, &mut notices);

        assert!(!controller.backend().is_playing(first));
        let current = controller.backend().current().unwrap();
        assert_eq!(current.src().map(Url::as_str), Some("https://lessons.example/reader/y.mp3"));
        assert!(!current.is_paused());

        assert_eq!(
            controller.handle_event(first, PlaybackEvent::Error, &mut icons, &mut notices),
            Transition::Ignored
        );
        assert_eq!(controller.toggle(Y, Some("y.mp3"), &mut icons, &mut notices), Transition::Paused(Y));
    }

    #[test]
    fn document_buttons_dispatch_from_nested_targets() {
        let mut doc = Document::new();
        let root = doc.root();
        doc.append_markup(
            root,
            r#"<p>Hi <button class="play-button" data-audio="a.mp3" onclick="togglePlay(this)"><b>▶︎</b></button></p>"#,
        )
        .unwrap();
        let bold = doc.element_by_tag(root, "b").unwrap();
        let (button, src) = playback_button(&doc, bold, "data-audio").unwrap();
        assert_eq!(doc.tag(button), Some("button"));
        assert_eq!(src, "a.mp3");
        let para = doc.element_by_tag(root, "p").unwrap();
        assert!(playback_button(&doc, para, "data-audio").is_none());

        let shared = SharedPlayback::new(PlaybackController::new(
            SharedElement::new(SilentElement::default()),
            page(),
            "failed",
        ));
        let mut notices = Vec::new();
        let mut surface = DocumentButtons {
            document: &mut doc,
            play_icon: "▶︎",
            pause_icon: "⏸",
        };
        shared.toggle(button, Some(&src), &mut surface, &mut notices);
        assert_eq!(doc.text_content(button), "⏸");
        assert_eq!(shared.state().active_button(), Some(button));
    }
}

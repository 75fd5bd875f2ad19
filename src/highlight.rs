use serde::Serialize;
use thiserror::Error;

/// Auto-expiry for an active highlight.
pub const EXPIRY_MS: u32 = 10_000;
/// Extra overlay syncs after activation, to absorb post-scroll layout settling.
pub const SETTLE_DELAYS_MS: [u32; 2] = [250, 700];
pub const DEFAULT_NOTE: &str = "Click here";

const ACCENT: &str = "#ff6a00";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HighlightError {
    #[error("Target element not found on page")]
    NotFound { selector: String },
    #[error("Target element is not visible")]
    NotVisible { selector: String },
}

/// Boundary payload answered to a highlight request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HighlightResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<Result<u64, HighlightError>> for HighlightResponse {
    fn from(result: Result<u64, HighlightError>) -> Self {
        match result {
            Ok(_) => HighlightResponse { ok: true, reason: None },
            Err(e) => HighlightResponse {
                ok: false,
                reason: Some(e.to_string()),
            },
        }
    }
}

/// The inline style properties a highlight overrides and later restores.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InlineStyles {
    pub outline: String,
    pub outline_offset: String,
    pub box_shadow: String,
    pub transition: String,
    pub animation: String,
}

impl InlineStyles {
    /// Bordered outline with a pulsing shadow.
    pub fn emphasis() -> Self {
        InlineStyles {
            outline: format!("4px solid {}", ACCENT),
            outline_offset: "3px".to_string(),
            box_shadow: "0 0 0 6px rgba(255, 106, 0, 0.35)".to_string(),
            transition: "box-shadow 120ms ease, outline 120ms ease".to_string(),
            animation: "pageguidePulse 1.2s ease-out 6".to_string(),
        }
    }
}

/// Viewport rectangle of the highlighted element.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// Where the border box and the label tag go for a given target rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayGeometry {
    pub frame: Rect,
    pub tag_left: f64,
    pub tag_top: f64,
}

/// Places the overlay around `rect`; `None` when the target has collapsed to nothing.
pub fn overlay_geometry(rect: Rect) -> Option<OverlayGeometry> {
    if rect.width <= 0.0 || rect.height <= 0.0 {
        return None;
    }
    Some(OverlayGeometry {
        frame: Rect {
            left: (rect.left - 6.0).max(0.0),
            top: (rect.top - 6.0).max(0.0),
            width: rect.width + 12.0,
            height: rect.height + 12.0,
        },
        tag_left: rect.left.max(8.0),
        tag_top: (rect.top - 38.0).max(8.0),
    })
}

/// What the highlight state machine needs from the page.
///
/// Every resource a host hands out (`Overlay`, `Watch`, `Timer`) is handed back
/// exactly once through the matching release call.
pub trait OverlayHost {
    type Target: Clone;
    type Overlay;
    type Watch;
    type Timer;

    fn find(&self, selector: &str) -> Option<Self::Target>;
    fn is_visible(&self, target: &Self::Target) -> bool;
    fn read_styles(&self, target: &Self::Target) -> InlineStyles;
    fn write_styles(&self, target: &Self::Target, styles: &InlineStyles);
    fn scroll_into_center(&self, target: &Self::Target);

    /// Creates the floating border and label nodes, positioned on the target.
    fn mount_overlay(&self, target: &Self::Target, note: &str) -> Self::Overlay;
    fn unmount_overlay(&self, overlay: Self::Overlay);

    /// Schedules the settle-delay syncs and attaches scroll/resize listeners that
    /// only reposition `overlay`.
    fn watch_layout(&self, target: &Self::Target, overlay: &Self::Overlay) -> Self::Watch;
    fn unwatch_layout(&self, watch: Self::Watch);

    fn start_timer(&self, delay_ms: u32, callback: Box<dyn FnOnce()>) -> Self::Timer;
    fn cancel_timer(&self, timer: Self::Timer);
}

struct HighlightSession<H: OverlayHost> {
    id: u64,
    target: H::Target,
    saved: InlineStyles,
    overlay: H::Overlay,
    watch: H::Watch,
    expiry: Option<H::Timer>,
}

/// Owns the one highlight session a page may have.
pub struct HighlightController<H: OverlayHost> {
    host: H,
    session: Option<HighlightSession<H>>,
    next_id: u64,
}

impl<H: OverlayHost> HighlightController<H> {
    pub fn new(host: H) -> Self {
        HighlightController {
            host,
            session: None,
            next_id: 1,
        }
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn active_session(&self) -> Option<u64> {
        self.session.as_ref().map(|s| s.id)
    }

    /// Highlights the element matching `selector`, replacing any current highlight.
    ///
    /// `on_expire` runs with the new session id once `EXPIRY_MS` elapses; it should
    /// route back to [`HighlightController::expire`]. Validation happens before the
    /// old session is torn down, so a failed activation leaves it in place.
    pub fn activate<F>(&mut self, selector: &str, note: &str, on_expire: F) -> Result<u64, HighlightError>
    where
        F: FnOnce(u64) + 'static,
    {
        let target = self.host.find(selector).ok_or_else(|| HighlightError::NotFound {
            selector: selector.to_string(),
        })?;
        if !self.host.is_visible(&target) {
            return Err(HighlightError::NotVisible {
                selector: selector.to_string(),
            });
        }

        self.clear();

        let note = if note.trim().is_empty() { DEFAULT_NOTE } else { note };
        let saved = self.host.read_styles(&target);
        self.host.write_styles(&target, &InlineStyles::emphasis());
        self.host.scroll_into_center(&target);

        let overlay = self.host.mount_overlay(&target, note);
        let watch = self.host.watch_layout(&target, &overlay);

        let id = self.next_id;
        self.next_id += 1;
        let expiry = self
            .host
            .start_timer(EXPIRY_MS, Box::new(move || on_expire(id)));

        self.session = Some(HighlightSession {
            id,
            target,
            saved,
            overlay,
            watch,
            expiry: Some(expiry),
        });
        Ok(id)
    }

    /// Tears down the active session, if any. Safe to call repeatedly.
    pub fn clear(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        if let Some(timer) = session.expiry {
            self.host.cancel_timer(timer);
        }
        self.host.unmount_overlay(session.overlay);
        self.host.write_styles(&session.target, &session.saved);
        self.host.unwatch_layout(session.watch);
    }

    /// Expiry path: clears only if `session_id` is still the active session.
    pub fn expire(&mut self, session_id: u64) {
        if self.active_session() != Some(session_id) {
            return;
        }
        if let Some(session) = self.session.as_mut() {
            // The timer has already fired; nothing left to cancel.
            session.expiry = None;
        }
        self.clear();
    }
}

use crate::agent::PageSnapshot;
use crate::catalog::{build_catalog, ActionCandidate, PageElement, RenderedVisibility, ACTIONABLE_QUERY};
use crate::catalog::collapse_whitespace;
use crate::highlight::{overlay_geometry, InlineStyles, OverlayHost, Rect};
use gloo_timers::callback::Timeout;
use thiserror::Error;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{
    console, Document, Element, HtmlButtonElement, HtmlElement, HtmlInputElement, HtmlSelectElement,
    HtmlTextAreaElement, NodeList, ScrollBehavior, ScrollIntoViewOptions, ScrollLogicalPosition, Window,
};

/// Text nodes shorter than this are treated as chrome (labels, counters) and skipped.
pub const MIN_TEXT_NODE_CHARS: usize = 30;
const SKIPPED_TEXT_CONTAINERS: &str = "script, style, noscript, iframe, svg";
const SHOW_TEXT: u32 = 0x4;

const PULSE_STYLE_ID: &str = "pageguide-pulse-style";
const PULSE_KEYFRAMES: &str = "@keyframes pageguidePulse {\
 0% { box-shadow: 0 0 0 0 rgba(255, 106, 0, 0.55); }\
 70% { box-shadow: 0 0 0 14px rgba(255, 106, 0, 0); }\
 100% { box-shadow: 0 0 0 0 rgba(255, 106, 0, 0); } }";
const FRAME_STYLE: &str = "position: fixed; z-index: 2147483646; pointer-events: none; \
     border: 3px solid #ff6a00; border-radius: 10px; box-sizing: border-box;";
const TAG_STYLE: &str = "position: fixed; z-index: 2147483647; pointer-events: none; \
     background: #ff6a00; color: #fff; font: 600 13px/1.2 sans-serif; \
     padding: 6px 10px; border-radius: 999px; box-shadow: 0 2px 8px rgba(0, 0, 0, 0.25);";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomError {
    #[error("InvalidSelector: Invalid selector '{selector}'. Details: {error}")]
    InvalidSelector { selector: String, error: String },
    #[error("JsError: {message}")]
    JsError { message: String },
}

impl From<JsValue> for DomError {
    fn from(value: JsValue) -> Self {
        DomError::JsError {
            message: value.as_string().unwrap_or_else(|| "Unknown JsValue error".to_string()),
        }
    }
}

impl From<DomError> for JsValue {
    fn from(error: DomError) -> Self {
        JsValue::from_str(&error.to_string())
    }
}

// Helper function to get window and document
pub(crate) fn get_window_document() -> Result<(Window, Document), DomError> {
    let window = web_sys::window().ok_or_else(|| DomError::JsError {
        message: "Failed to get window object".to_string(),
    })?;
    let document = window.document().ok_or_else(|| DomError::JsError {
        message: "Failed to get document object".to_string(),
    })?;
    Ok((window, document))
}

fn html_elements(node_list: &NodeList) -> Vec<HtmlElement> {
    (0..node_list.length())
        .filter_map(|i| node_list.item(i))
        .filter_map(|node| node.dyn_into::<HtmlElement>().ok())
        .collect()
}

/// Visibility facts for a live element: computed style plus layout box.
pub fn visibility_of(element: &Element) -> RenderedVisibility {
    let rect = element.get_bounding_client_rect();
    let mut rendered = RenderedVisibility {
        width: rect.width(),
        height: rect.height(),
        ..Default::default()
    };
    let style = web_sys::window().and_then(|w| w.get_computed_style(element).ok().flatten());
    if let Some(style) = style {
        rendered.display = style.get_property_value("display").unwrap_or_default();
        rendered.visibility = style.get_property_value("visibility").unwrap_or_default();
        rendered.opacity = style.get_property_value("opacity").unwrap_or_default();
    }
    rendered
}

/// A live DOM element seen through the catalog's read-only view.
#[derive(Debug, Clone, PartialEq)]
pub struct WebElement(pub HtmlElement);

impl PageElement for WebElement {
    fn tag_name(&self) -> String {
        self.0.tag_name().to_lowercase()
    }

    fn id(&self) -> String {
        self.0.id()
    }

    fn class_names(&self) -> Vec<String> {
        let list = self.0.class_list();
        (0..list.length()).filter_map(|i| list.item(i)).collect()
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.0.get_attribute(name)
    }

    fn form_value(&self) -> Option<String> {
        if let Some(input) = self.0.dyn_ref::<HtmlInputElement>() {
            Some(input.value())
        } else if let Some(button) = self.0.dyn_ref::<HtmlButtonElement>() {
            Some(button.value())
        } else if let Some(select) = self.0.dyn_ref::<HtmlSelectElement>() {
            Some(select.value())
        } else {
            self.0.dyn_ref::<HtmlTextAreaElement>().map(|t| t.value())
        }
    }

    fn rendered_text(&self) -> String {
        let text = self.0.inner_text();
        if text.trim().is_empty() {
            self.0.text_content().unwrap_or_default()
        } else {
            text
        }
    }

    fn visibility(&self) -> RenderedVisibility {
        visibility_of(&self.0)
    }

    fn parent(&self) -> Option<Self> {
        self.0
            .parent_element()
            .and_then(|p| p.dyn_into::<HtmlElement>().ok())
            .map(WebElement)
    }

    fn same_tag_position(&self) -> Option<(usize, usize)> {
        let parent = self.0.parent_element()?;
        let tag = self.0.tag_name();
        let children = parent.children();
        let siblings: Vec<Element> = (0..children.length())
            .filter_map(|i| children.item(i))
            .filter(|c| c.tag_name() == tag)
            .collect();
        let me: &Element = self.0.as_ref();
        let index = siblings.iter().position(|s| s == me)?;
        Some((index + 1, siblings.len()))
    }
}

/// Catalogs the visible actionable controls of the current document.
pub fn collect_actionable_elements() -> Result<Vec<ActionCandidate>, DomError> {
    let (_window, document) = get_window_document()?;
    let node_list = document
        .query_selector_all(ACTIONABLE_QUERY)
        .map_err(|e| DomError::InvalidSelector {
            selector: ACTIONABLE_QUERY.to_string(),
            error: e.as_string().unwrap_or_else(|| "Unknown querySelectorAll error".to_string()),
        })?;

    let elements = html_elements(&node_list);
    let actions = build_catalog(elements.into_iter().map(WebElement));
    console::log_1(&format!("Collected {} actionable elements", actions.len()).into());
    Ok(actions)
}

/// Readable text of the page body: visible text nodes of `MIN_TEXT_NODE_CHARS` or
/// more, outside scripts, styles and embedded frames, separated by blank lines.
pub fn extract_page_text(document: &Document) -> Result<String, DomError> {
    let Some(body) = document.body() else {
        return Ok(String::new());
    };
    let walker = document.create_tree_walker_with_what_to_show(&body, SHOW_TEXT)?;

    let mut blocks: Vec<String> = Vec::new();
    while let Some(node) = walker.next_node()? {
        let Some(parent) = node.parent_element() else {
            continue;
        };
        let in_skipped_container = parent.closest(SKIPPED_TEXT_CONTAINERS).ok().flatten().is_some();
        if in_skipped_container || !visibility_of(&parent).is_visible() {
            continue;
        }
        let text = collapse_whitespace(&node.text_content().unwrap_or_default());
        if text.chars().count() >= MIN_TEXT_NODE_CHARS {
            blocks.push(text);
        }
    }
    Ok(blocks.join("\n\n"))
}

/// Title, URL and readable text of the current page.
pub fn page_snapshot() -> Result<PageSnapshot, DomError> {
    let (window, document) = get_window_document()?;
    let url = window.location().href().map_err(|e| DomError::JsError {
        message: format!(
            "Failed to get URL: {}",
            e.as_string().unwrap_or_else(|| "Unknown JS error".to_string())
        ),
    })?;
    Ok(PageSnapshot {
        title: document.title(),
        url,
        text: extract_page_text(&document)?,
    })
}

/// Floating border and label nodes for one highlight.
#[derive(Debug, Clone)]
pub struct OverlayNodes {
    frame: HtmlElement,
    tag: HtmlElement,
}

/// Listeners and settle timers keeping an overlay aligned with its target.
pub struct LayoutWatch {
    window: Window,
    listener: Closure<dyn FnMut()>,
    settle: Vec<Timeout>,
}

fn sync_overlay(target: &HtmlElement, overlay: &OverlayNodes) {
    let dom_rect = target.get_bounding_client_rect();
    let rect = Rect {
        left: dom_rect.left(),
        top: dom_rect.top(),
        width: dom_rect.width(),
        height: dom_rect.height(),
    };
    let frame_style = overlay.frame.style();
    let tag_style = overlay.tag.style();
    let Some(geometry) = overlay_geometry(rect) else {
        let _ = frame_style.set_property("display", "none");
        let _ = tag_style.set_property("display", "none");
        return;
    };
    let px = |v: f64| format!("{}px", v.round());
    let _ = frame_style.set_property("display", "block");
    let _ = frame_style.set_property("left", &px(geometry.frame.left));
    let _ = frame_style.set_property("top", &px(geometry.frame.top));
    let _ = frame_style.set_property("width", &px(geometry.frame.width));
    let _ = frame_style.set_property("height", &px(geometry.frame.height));
    let _ = tag_style.set_property("display", "block");
    let _ = tag_style.set_property("left", &px(geometry.tag_left));
    let _ = tag_style.set_property("top", &px(geometry.tag_top));
}

/// `OverlayHost` over the live document.
#[derive(Debug, Clone)]
pub struct BrowserHost {
    window: Window,
    document: Document,
}

impl BrowserHost {
    pub fn new() -> Result<Self, DomError> {
        let (window, document) = get_window_document()?;
        Ok(BrowserHost { window, document })
    }

    fn create_div(&self, style: &str) -> Result<HtmlElement, DomError> {
        let element = self.document.create_element("div")?;
        element.set_attribute("style", style)?;
        element.dyn_into::<HtmlElement>().map_err(|_| DomError::JsError {
            message: "Created div is not an HtmlElement".to_string(),
        })
    }

    fn ensure_pulse_style(&self) -> Result<(), DomError> {
        if self.document.get_element_by_id(PULSE_STYLE_ID).is_some() {
            return Ok(());
        }
        let style = self.document.create_element("style")?;
        style.set_id(PULSE_STYLE_ID);
        style.set_text_content(Some(PULSE_KEYFRAMES));
        if let Some(root) = self.document.document_element() {
            root.append_child(&style)?;
        }
        Ok(())
    }

    fn build_overlay(&self, target: &HtmlElement, note: &str) -> Result<OverlayNodes, DomError> {
        self.ensure_pulse_style()?;
        let frame = self.create_div(FRAME_STYLE)?;
        let tag = self.create_div(TAG_STYLE)?;
        tag.set_text_content(Some(note));

        let body = self.document.body().ok_or_else(|| DomError::JsError {
            message: "Document has no body".to_string(),
        })?;
        body.append_child(&frame)?;
        body.append_child(&tag)?;

        let overlay = OverlayNodes { frame, tag };
        sync_overlay(target, &overlay);
        Ok(overlay)
    }
}

impl OverlayHost for BrowserHost {
    type Target = HtmlElement;
    type Overlay = Option<OverlayNodes>;
    type Watch = Option<LayoutWatch>;
    type Timer = Timeout;

    fn find(&self, selector: &str) -> Option<HtmlElement> {
        match self.document.query_selector(selector) {
            Ok(found) => found.and_then(|e| e.dyn_into::<HtmlElement>().ok()),
            Err(e) => {
                console::warn_1(
                    &format!(
                        "Invalid selector '{}': {}",
                        selector,
                        e.as_string().unwrap_or_else(|| "Unknown querySelector error".to_string())
                    )
                    .into(),
                );
                None
            }
        }
    }

    fn is_visible(&self, target: &HtmlElement) -> bool {
        visibility_of(target).is_visible()
    }

    fn read_styles(&self, target: &HtmlElement) -> InlineStyles {
        let style = target.style();
        let read = |name: &str| style.get_property_value(name).unwrap_or_default();
        InlineStyles {
            outline: read("outline"),
            outline_offset: read("outline-offset"),
            box_shadow: read("box-shadow"),
            transition: read("transition"),
            animation: read("animation"),
        }
    }

    fn write_styles(&self, target: &HtmlElement, styles: &InlineStyles) {
        let style = target.style();
        // An empty value removes the inline declaration.
        let _ = style.set_property("outline", &styles.outline);
        let _ = style.set_property("outline-offset", &styles.outline_offset);
        let _ = style.set_property("box-shadow", &styles.box_shadow);
        let _ = style.set_property("transition", &styles.transition);
        let _ = style.set_property("animation", &styles.animation);
    }

    fn scroll_into_center(&self, target: &HtmlElement) {
        let options = ScrollIntoViewOptions::new();
        options.set_behavior(ScrollBehavior::Smooth);
        options.set_block(ScrollLogicalPosition::Center);
        options.set_inline(ScrollLogicalPosition::Center);
        target.scroll_into_view_with_scroll_into_view_options(&options);
    }

    fn mount_overlay(&self, target: &HtmlElement, note: &str) -> Option<OverlayNodes> {
        match self.build_overlay(target, note) {
            Ok(overlay) => Some(overlay),
            Err(e) => {
                // The outline on the target still shows; only the floating label is lost.
                console::error_1(&format!("Failed to mount highlight overlay: {}", e).into());
                None
            }
        }
    }

    fn unmount_overlay(&self, overlay: Option<OverlayNodes>) {
        if let Some(overlay) = overlay {
            overlay.frame.remove();
            overlay.tag.remove();
        }
    }

    fn watch_layout(&self, target: &HtmlElement, overlay: &Option<OverlayNodes>) -> Option<LayoutWatch> {
        let overlay = overlay.clone()?;

        let settle = crate::highlight::SETTLE_DELAYS_MS
            .iter()
            .map(|delay| {
                let target = target.clone();
                let overlay = overlay.clone();
                Timeout::new(*delay, move || sync_overlay(&target, &overlay))
            })
            .collect();

        let target = target.clone();
        let listener = Closure::<dyn FnMut()>::new(move || sync_overlay(&target, &overlay));
        let callback: &js_sys::Function = listener.as_ref().unchecked_ref();
        for event in ["scroll", "resize"] {
            if let Err(e) = self
                .window
                .add_event_listener_with_callback_and_bool(event, callback, true)
            {
                console::warn_1(&format!("Failed to attach {} listener: {:?}", event, e).into());
            }
        }

        Some(LayoutWatch {
            window: self.window.clone(),
            listener,
            settle,
        })
    }

    fn unwatch_layout(&self, watch: Option<LayoutWatch>) {
        let Some(watch) = watch else {
            return;
        };
        for timeout in watch.settle {
            timeout.cancel();
        }
        let callback: &js_sys::Function = watch.listener.as_ref().unchecked_ref();
        for event in ["scroll", "resize"] {
            let _ = watch
                .window
                .remove_event_listener_with_callback_and_bool(event, callback, true);
        }
    }

    fn start_timer(&self, delay_ms: u32, callback: Box<dyn FnOnce()>) -> Timeout {
        Timeout::new(delay_ms, callback)
    }

    fn cancel_timer(&self, timer: Timeout) {
        timer.cancel();
    }
}

use serde::{Deserialize, Serialize};

/// Upper bound on catalog entries collected per guided request.
pub const MAX_CANDIDATES: usize = 40;
/// Labels shorter than this (in characters) are rejected.
pub const MIN_LABEL_CHARS: usize = 2;
/// Labels longer than this (in characters) are rejected.
pub const MAX_LABEL_CHARS: usize = 120;
/// How many levels (the element itself plus ancestors) a structural selector may span.
pub const MAX_SELECTOR_DEPTH: usize = 5;

/// CSS selector list used to enumerate actionable elements in the live document.
pub const ACTIONABLE_QUERY: &str =
    "button, a, [role='button'], input[type='submit'], input[type='button'], [aria-label], [onclick]";

/// One discoverable on-page control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionCandidate {
    /// Re-locates the element within the current document.
    pub selector: String,
    /// Best-effort human-readable name.
    pub label: String,
    /// Lower-cased tag name, informational only.
    pub tag: String,
}

/// Computed-style and layout facts used to decide whether an element is visible.
///
/// The same predicate gates catalog capture and highlight activation, so an
/// element accepted into the catalog is highlightable unless the page changed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderedVisibility {
    pub display: String,
    pub visibility: String,
    pub opacity: String,
    pub width: f64,
    pub height: f64,
}

impl RenderedVisibility {
    pub fn is_visible(&self) -> bool {
        let transparent = self
            .opacity
            .trim()
            .parse::<f64>()
            .map(|o| o == 0.0)
            .unwrap_or(false);
        self.display != "none"
            && self.visibility != "hidden"
            && !transparent
            && self.width > 0.0
            && self.height > 0.0
    }
}

/// Read-only view of a DOM element, as much of it as catalog building needs.
///
/// The browser adapter implements this over `web_sys::HtmlElement`; tests use an
/// in-memory tree.
pub trait PageElement: Clone {
    /// Lower-cased tag name.
    fn tag_name(&self) -> String;
    /// The `id` attribute, empty when absent.
    fn id(&self) -> String;
    fn class_names(&self) -> Vec<String>;
    fn attribute(&self, name: &str) -> Option<String>;
    /// The form `value` for inputs, buttons, selects and textareas.
    fn form_value(&self) -> Option<String>;
    /// Rendered text (innerText, falling back to textContent).
    fn rendered_text(&self) -> String;
    fn visibility(&self) -> RenderedVisibility;
    fn parent(&self) -> Option<Self>;
    /// 1-based index among the parent's children sharing this tag, and the size of that group.
    /// `None` for the root element.
    fn same_tag_position(&self) -> Option<(usize, usize)>;
}

/// Builds the bounded, de-duplicated catalog from elements given in document order.
///
/// Stops walking as soon as `MAX_CANDIDATES` entries are accepted.
pub fn build_catalog<E, I>(elements: I) -> Vec<ActionCandidate>
where
    E: PageElement,
    I: IntoIterator<Item = E>,
{
    let mut actions: Vec<ActionCandidate> = Vec::new();

    for element in elements {
        if !element.visibility().is_visible() {
            continue;
        }

        let label = element_label(&element);
        let label_chars = label.chars().count();
        if label_chars < MIN_LABEL_CHARS || label_chars > MAX_LABEL_CHARS {
            continue;
        }

        let selector = build_selector(&element);
        if selector.is_empty() || actions.iter().any(|a| a.selector == selector) {
            continue;
        }

        actions.push(ActionCandidate {
            selector,
            label,
            tag: element.tag_name(),
        });
        if actions.len() >= MAX_CANDIDATES {
            break;
        }
    }

    actions
}

/// Derives a label: `aria-label`, then `title`, then form value, then collapsed
/// rendered text, then the tag name.
pub fn element_label<E: PageElement>(element: &E) -> String {
    let non_empty = |value: Option<String>| {
        value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    non_empty(element.attribute("aria-label"))
        .or_else(|| non_empty(element.attribute("title")))
        .or_else(|| non_empty(element.form_value()))
        .or_else(|| Some(collapse_whitespace(&element.rendered_text())).filter(|t| !t.is_empty()))
        .unwrap_or_else(|| element.tag_name())
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Synthesizes a selector: `#id` when an id exists, otherwise a structural path of
/// at most `MAX_SELECTOR_DEPTH` levels such as `div.card > ul > li:nth-of-type(2) > a.cta`.
pub fn build_selector<E: PageElement>(element: &E) -> String {
    let id = element.id();
    if !id.is_empty() {
        return format!("#{}", escape_css_ident(&id));
    }

    let mut parts: Vec<String> = Vec::new();
    let mut current = Some(element.clone());
    while let Some(node) = current {
        if parts.len() >= MAX_SELECTOR_DEPTH {
            break;
        }
        let mut part = node.tag_name();
        for class in node.class_names().iter().filter(|c| !c.is_empty()).take(2) {
            part.push('.');
            part.push_str(&escape_css_ident(class));
        }
        if let Some((index, count)) = node.same_tag_position() {
            if count > 1 {
                part.push_str(&format!(":nth-of-type({})", index));
            }
        }
        parts.push(part);
        current = node.parent();
    }

    parts.reverse();
    parts.join(" > ")
}

/// Serializes `ident` as a CSS identifier, producing the same output as `CSS.escape`.
pub fn escape_css_ident(ident: &str) -> String {
    let chars: Vec<char> = ident.chars().collect();
    let mut out = String::with_capacity(ident.len());

    for (i, &c) in chars.iter().enumerate() {
        let code = c as u32;
        if c == '\0' {
            out.push('\u{FFFD}');
        } else if (0x01..=0x1F).contains(&code)
            || code == 0x7F
            || (i == 0 && c.is_ascii_digit())
            || (i == 1 && c.is_ascii_digit() && chars[0] == '-')
        {
            out.push_str(&format!("\\{:x} ", code));
        } else if i == 0 && c == '-' && chars.len() == 1 {
            out.push_str("\\-");
        } else if code >= 0x80 || c == '-' || c == '_' || c.is_ascii_alphanumeric() {
            out.push(c);
        } else {
            out.push('\\');
            out.push(c);
        }
    }

    out
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashSet;

    #[derive(Clone, Default)]
    pub(crate) struct FakeElement {
        pub tag: String,
        pub id: String,
        pub classes: Vec<String>,
        pub attrs: Vec<(String, String)>,
        pub value: Option<String>,
        pub text: String,
        pub rendered: RenderedVisibility,
        pub parent: Option<Box<FakeElement>>,
        pub position: Option<(usize, usize)>,
    }

    pub(crate) fn shown() -> RenderedVisibility {
        RenderedVisibility {
            display: "block".into(),
            visibility: "visible".into(),
            opacity: "1".into(),
            width: 80.0,
            height: 24.0,
        }
    }

    impl FakeElement {
        pub(crate) fn new(tag: &str, text: &str) -> Self {
            FakeElement {
                tag: tag.to_string(),
                text: text.to_string(),
                rendered: shown(),
                ..Default::default()
            }
        }

        fn with_attr(mut self, name: &str, value: &str) -> Self {
            self.attrs.push((name.to_string(), value.to_string()));
            self
        }

        fn with_id(mut self, id: &str) -> Self {
            self.id = id.to_string();
            self
        }

        fn under(mut self, parent: FakeElement, position: (usize, usize)) -> Self {
            self.parent = Some(Box::new(parent));
            self.position = Some(position);
            self
        }
    }

    impl PageElement for FakeElement {
        fn tag_name(&self) -> String {
            self.tag.clone()
        }
        fn id(&self) -> String {
            self.id.clone()
        }
        fn class_names(&self) -> Vec<String> {
            self.classes.clone()
        }
        fn attribute(&self, name: &str) -> Option<String> {
            self.attrs.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone())
        }
        fn form_value(&self) -> Option<String> {
            self.value.clone()
        }
        fn rendered_text(&self) -> String {
            self.text.clone()
        }
        fn visibility(&self) -> RenderedVisibility {
            self.rendered.clone()
        }
        fn parent(&self) -> Option<Self> {
            self.parent.as_deref().cloned()
        }
        fn same_tag_position(&self) -> Option<(usize, usize)> {
            self.position
        }
    }

    fn body() -> FakeElement {
        let html = FakeElement::new("html", "");
        FakeElement::new("body", "").under(html, (1, 1))
    }

    #[test]
    fn test_label_priority() {
        let el = FakeElement::new("button", "  Send \n  now ")
            .with_attr("title", "Send title")
            .with_attr("aria-label", "Send message");
        assert_eq!(element_label(&el), "Send message");

        let el = FakeElement::new("button", "Send now").with_attr("title", "Send title");
        assert_eq!(element_label(&el), "Send title");

        let mut el = FakeElement::new("input", "");
        el.value = Some("Submit order".into());
        assert_eq!(element_label(&el), "Submit order");

        let el = FakeElement::new("a", "  Read\n\t more  ");
        assert_eq!(element_label(&el), "Read more");

        let el = FakeElement::new("div", "   ");
        assert_eq!(element_label(&el), "div");
    }

    #[test]
    fn test_selector_prefers_escaped_id() {
        let el = FakeElement::new("button", "Go").with_id("1st.button");
        assert_eq!(build_selector(&el), "#\\31 st\\.button");
    }

    #[test]
    fn test_structural_selector_with_nth_of_type() {
        let mut list = FakeElement::new("ul", "").under(body(), (1, 1));
        list.classes = vec!["nav".into(), "main".into(), "extra".into()];
        let item = FakeElement::new("li", "").under(list, (2, 3));
        let link = FakeElement::new("a", "Contact").under(item, (1, 1));

        assert_eq!(
            build_selector(&link),
            "html > body > ul.nav.main > li:nth-of-type(2) > a"
        );
    }

    #[test]
    fn test_structural_selector_depth_is_bounded() {
        let mut node = body();
        for _ in 0..8 {
            node = FakeElement::new("div", "").under(node, (1, 1));
        }
        let button = FakeElement::new("button", "Deep").under(node, (1, 1));
        let selector = build_selector(&button);
        assert_eq!(selector.split(" > ").count(), MAX_SELECTOR_DEPTH);
        assert!(selector.ends_with("div > button"));
    }

    #[test]
    fn test_escape_css_ident_rules() {
        assert_eq!(escape_css_ident("main"), "main");
        assert_eq!(escape_css_ident("-"), "\\-");
        assert_eq!(escape_css_ident("-1a"), "-\\31 a");
        assert_eq!(escape_css_ident("a b"), "a\\ b");
        assert_eq!(escape_css_ident("md:flex"), "md\\:flex");
        assert_eq!(escape_css_ident("caf\u{e9}"), "caf\u{e9}");
        assert_eq!(escape_css_ident("a\u{1}"), "a\\1 ");
    }

    #[test]
    fn test_rendered_visibility() {
        assert!(shown().is_visible());
        assert!(!RenderedVisibility { display: "none".into(), ..shown() }.is_visible());
        assert!(!RenderedVisibility { visibility: "hidden".into(), ..shown() }.is_visible());
        assert!(!RenderedVisibility { opacity: "0".into(), ..shown() }.is_visible());
        assert!(!RenderedVisibility { width: 0.0, ..shown() }.is_visible());
        assert!(!RenderedVisibility { height: 0.0, ..shown() }.is_visible());
        assert!(RenderedVisibility { opacity: "0.4".into(), ..shown() }.is_visible());
    }

    #[test]
    fn test_catalog_filters_hidden_and_bad_labels() {
        let mut hidden = FakeElement::new("button", "Hidden").with_id("hidden");
        hidden.rendered.display = "none".into();
        let too_short = FakeElement::new("a", "x").with_id("short");
        let too_long = FakeElement::new("a", &"y".repeat(121)).with_id("long");
        let ok = FakeElement::new("button", "Book now").with_id("book");

        let catalog = build_catalog(vec![hidden, too_short, too_long, ok]);
        assert_eq!(
            catalog,
            vec![ActionCandidate {
                selector: "#book".into(),
                label: "Book now".into(),
                tag: "button".into(),
            }]
        );
    }

    #[test]
    fn test_catalog_dedupes_selectors_in_document_order() {
        let first = FakeElement::new("button", "First").with_id("dup");
        let second = FakeElement::new("a", "Second").with_id("dup");
        let catalog = build_catalog(vec![first, second]);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].label, "First");
    }

    #[test]
    fn test_catalog_is_capped_with_unique_visible_entries() {
        let elements: Vec<FakeElement> = (0..100)
            .map(|i| FakeElement::new("button", &format!("Action {}", i)).with_id(&format!("a{}", i)))
            .collect();
        let catalog = build_catalog(elements);

        assert_eq!(catalog.len(), MAX_CANDIDATES);
        let unique: HashSet<&str> = catalog.iter().map(|c| c.selector.as_str()).collect();
        assert_eq!(unique.len(), catalog.len());
        assert_eq!(catalog[39].label, "Action 39");
    }

    #[test]
    fn test_empty_document_yields_empty_catalog() {
        let catalog = build_catalog(Vec::<FakeElement>::new());
        assert!(catalog.is_empty());
    }
}

//! Element catalog: flat, ordered list of interactive candidates parsed from markup.
//!
//! Discovery is document order. The list is capped at `max_elements`; anything past the
//! cap is dropped in discovery order, not by importance.

use scraper::node::{Element, Node};
use scraper::{ElementRef, Html};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info};

use crate::config::PilotConfig;
use crate::types::{truncate_chars, ElementDescriptor, ReferenceId};

const INTERACTIVE_TAGS: &[&str] = &["a", "button", "input", "select", "textarea", "label"];

const INTERACTIVE_ROLES: &[&str] = &[
    "button",
    "link",
    "textbox",
    "searchbox",
    "combobox",
    "checkbox",
    "radio",
    "switch",
    "tab",
    "menuitem",
    "menuitemcheckbox",
    "menuitemradio",
    "option",
    "slider",
    "spinbutton",
    "listbox",
    "treeitem",
];

const NON_RENDERED_TAGS: &[&str] = &["script", "style", "noscript", "template", "head"];

const MAX_ELEMENT_TEXT: usize = 100;

/// Result of one catalog pass
#[derive(Debug, Clone)]
pub struct Catalog {
    pub elements: Vec<ElementDescriptor>,
    /// Candidates found before the cap was applied
    pub discovered: usize,
}

impl Catalog {
    /// Number of candidates dropped by the cap
    pub fn truncated(&self) -> usize {
        self.discovered.saturating_sub(self.elements.len())
    }
}

#[derive(Debug, Clone)]
pub struct CatalogBuilder {
    max_elements: usize,
    max_page_text_chars: usize,
}

impl CatalogBuilder {
    pub fn new(max_elements: usize, max_page_text_chars: usize) -> Self {
        Self {
            max_elements,
            max_page_text_chars,
        }
    }

    pub fn from_config(config: &PilotConfig) -> Self {
        Self::new(config.max_elements, config.max_page_text_chars)
    }

    /// Parse once and return both the catalog and the visible page text
    pub fn extract(&self, markup: &str) -> (Catalog, String) {
        let document = Html::parse_document(markup);
        (
            self.build_from(&document),
            self.page_text_from(&document),
        )
    }

    pub fn build(&self, markup: &str) -> Catalog {
        self.build_from(&Html::parse_document(markup))
    }

    pub fn page_text(&self, markup: &str) -> String {
        self.page_text_from(&Html::parse_document(markup))
    }

    fn build_from(&self, document: &Html) -> Catalog {
        let labels = LabelIndex::new(document);
        let mut accepted = HashSet::new();
        let mut elements = Vec::new();
        let mut discovered = 0usize;

        for node in document.root_element().descendants() {
            let Some(element) = ElementRef::wrap(node) else {
                continue;
            };
            if !is_candidate(element.value()) || is_hidden(element) {
                continue;
            }

            let mut enclosing = element
                .ancestors()
                .filter_map(ElementRef::wrap)
                .filter(|ancestor| accepted.contains(&ancestor.id()))
                .peekable();
            if enclosing.peek().is_some() && !has_independent_locator(element.value()) {
                // A named button or link inside a bare onclick wrapper stays reachable by role
                let inside_semantic =
                    enclosing.any(|ancestor| has_semantic_role(ancestor.value()));
                if inside_semantic || !has_semantic_name(element) {
                    debug!(
                        "Skipping <{}> nested inside an interactive ancestor",
                        element.value().name()
                    );
                    continue;
                }
            }

            if !has_identity(element) {
                continue;
            }

            accepted.insert(element.id());
            discovered += 1;

            if elements.len() < self.max_elements {
                let reference = ReferenceId(elements.len() as u32 + 1);
                elements.push(describe(element, reference, &labels));
            }
        }

        let catalog = Catalog {
            elements,
            discovered,
        };

        if catalog.truncated() > 0 {
            info!(
                "Extracted {} actionable elements ({} beyond the cap of {} dropped)",
                catalog.elements.len(),
                catalog.truncated(),
                self.max_elements
            );
        } else {
            info!("Extracted {} actionable elements", catalog.elements.len());
        }

        catalog
    }

    fn page_text_from(&self, document: &Html) -> String {
        let mut lines = Vec::new();

        for node in document.root_element().descendants() {
            let Node::Text(text) = node.value() else {
                continue;
            };

            let rendered = !node
                .ancestors()
                .filter_map(ElementRef::wrap)
                .any(|ancestor| NON_RENDERED_TAGS.contains(&ancestor.value().name()));
            if !rendered {
                continue;
            }

            let line = text.split_whitespace().collect::<Vec<_>>().join(" ");
            if !line.is_empty() {
                lines.push(line);
            }
        }

        truncate_chars(&lines.join("\n"), self.max_page_text_chars)
    }
}

fn is_candidate(element: &Element) -> bool {
    if element.name() == "input" && attr(element, "type").as_deref() == Some("hidden") {
        return false;
    }

    INTERACTIVE_TAGS.contains(&element.name())
        || element
            .attr("role")
            .map(|role| INTERACTIVE_ROLES.contains(&role.trim().to_lowercase().as_str()))
            .unwrap_or(false)
        || is_content_editable(element)
        || element.attr("onclick").is_some()
}

fn is_content_editable(element: &Element) -> bool {
    match element.attr("contenteditable") {
        Some(value) => {
            let value = value.trim().to_lowercase();
            value.is_empty() || value == "true" || value == "plaintext-only"
        }
        None => false,
    }
}

/// Hidden by the element itself or any ancestor
fn is_hidden(element: ElementRef) -> bool {
    std::iter::once(element)
        .chain(element.ancestors().filter_map(ElementRef::wrap))
        .any(|el| hides(el.value()))
}

fn hides(element: &Element) -> bool {
    if NON_RENDERED_TAGS.contains(&element.name()) || element.attr("hidden").is_some() {
        return true;
    }
    if element.attr("aria-hidden") == Some("true") {
        return true;
    }
    match element.attr("style") {
        Some(style) => {
            let style = style.replace(' ', "").to_lowercase();
            style.contains("display:none") || style.contains("visibility:hidden")
        }
        None => false,
    }
}

fn is_form_tag(element: &Element) -> bool {
    matches!(element.name(), "input" | "textarea" | "select")
}

/// Something other than text or position that can locate the element on its own
fn has_independent_locator(element: &Element) -> bool {
    ["id", "name", "aria-label", "placeholder", "data-testid"]
        .iter()
        .any(|key| attr(element, key).is_some())
        || is_form_tag(element)
        || is_content_editable(element)
}

/// Carries an explicit interactive role or one implied by the tag
fn has_semantic_role(element: &Element) -> bool {
    match element.name() {
        "button" | "select" | "textarea" | "option" => true,
        "a" => element.attr("href").is_some(),
        _ => element
            .attr("role")
            .map(|role| INTERACTIVE_ROLES.contains(&role.trim().to_lowercase().as_str()))
            .unwrap_or(false),
    }
}

/// Resolvable by role and accessible name alone
fn has_semantic_name(element: ElementRef) -> bool {
    let value = element.value();
    has_semantic_role(value)
        && (attr(value, "aria-label").is_some() || visible_text(element).is_some())
}

/// Elements with nothing to describe them are not useful to the oracle
fn has_identity(element: ElementRef) -> bool {
    let value = element.value();
    has_independent_locator(value)
        || attr(value, "role").is_some()
        || visible_text(element).is_some()
}

/// Trimmed, non-empty attribute value
fn attr(element: &Element, key: &str) -> Option<String> {
    element
        .attr(key)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn normalize<'a>(parts: impl Iterator<Item = &'a str>) -> Option<String> {
    let joined = parts
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ");
    if joined.is_empty() {
        None
    } else {
        Some(truncate_chars(&joined, MAX_ELEMENT_TEXT))
    }
}

fn visible_text(element: ElementRef) -> Option<String> {
    let value = element.value();
    if value.name() == "input" {
        // Button-like inputs render their value
        return match attr(value, "type").as_deref() {
            Some("submit" | "button" | "reset") => attr(value, "value"),
            _ => None,
        };
    }
    normalize(element.text())
}

/// `nth-of-type` CSS path from the document root
fn structural_path(element: ElementRef) -> String {
    let mut segments = Vec::new();
    let mut current = Some(element);

    while let Some(el) = current {
        let name = el.value().name();
        if name == "html" {
            segments.push(name.to_string());
        } else {
            let position = 1 + el
                .prev_siblings()
                .filter_map(ElementRef::wrap)
                .filter(|sibling| sibling.value().name() == name)
                .count();
            segments.push(format!("{}:nth-of-type({})", name, position));
        }
        current = el.parent().and_then(ElementRef::wrap);
    }

    segments.reverse();
    segments.join(" > ")
}

/// Label text keyed by the id it points at, plus text of every id'd element
struct LabelIndex {
    label_for: HashMap<String, String>,
    text_by_id: HashMap<String, String>,
}

impl LabelIndex {
    fn new(document: &Html) -> Self {
        let mut label_for = HashMap::new();
        let mut text_by_id = HashMap::new();

        for node in document.root_element().descendants() {
            let Some(element) = ElementRef::wrap(node) else {
                continue;
            };
            let value = element.value();

            if value.name() == "label"
                && let Some(target) = attr(value, "for")
                && let Some(text) = normalize(element.text())
            {
                label_for.entry(target).or_insert(text);
            }

            if let Some(id) = attr(value, "id")
                && let Some(text) = normalize(element.text())
            {
                text_by_id.entry(id).or_insert(text);
            }
        }

        Self {
            label_for,
            text_by_id,
        }
    }

    fn nearby_label(&self, element: ElementRef, own_text: Option<&str>) -> Option<String> {
        let value = element.value();

        if let Some(id) = attr(value, "id")
            && let Some(text) = self.label_for.get(&id)
        {
            return Some(text.clone());
        }

        if value.name() != "label"
            && let Some(label) = element
                .ancestors()
                .filter_map(ElementRef::wrap)
                .find(|ancestor| ancestor.value().name() == "label")
            && let Some(text) = normalize(label.text())
        {
            let stripped = match own_text {
                Some(own) => text.replace(own, "").trim().to_string(),
                None => text,
            };
            if !stripped.is_empty() {
                return Some(stripped);
            }
        }

        attr(value, "aria-labelledby").and_then(|ids| {
            let parts: Vec<&str> = ids
                .split_whitespace()
                .filter_map(|id| self.text_by_id.get(id).map(String::as_str))
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(" "))
            }
        })
    }
}

fn describe(element: ElementRef, reference: ReferenceId, labels: &LabelIndex) -> ElementDescriptor {
    let value = element.value();
    let visible_text = visible_text(element);
    let nearby_label = labels
        .nearby_label(element, visible_text.as_deref())
        .filter(|label| Some(label) != visible_text.as_ref());

    let class_list: BTreeSet<String> = value.classes().map(str::to_string).collect();

    ElementDescriptor {
        reference_id: reference,
        tag: value.name().to_string(),
        role: attr(value, "role").map(|role| role.to_lowercase()),
        visible_text,
        aria_label: attr(value, "aria-label"),
        placeholder: attr(value, "placeholder").or_else(|| attr(value, "data-placeholder")),
        name: attr(value, "name"),
        dom_id: attr(value, "id"),
        class_list,
        is_content_editable: is_content_editable(value),
        input_type: attr(value, "type").map(|kind| kind.to_lowercase()),
        href: attr(value, "href"),
        test_id: attr(value, "data-testid"),
        nearby_label,
        disabled: value.attr("disabled").is_some() || value.attr("aria-disabled") == Some("true"),
        structural_path: structural_path(element),
    }
}

#[cfg(test)]
#[path = "catalog_test.rs"]
mod catalog_test;

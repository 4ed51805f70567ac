use super::*;
use pretty_assertions::assert_eq;

const FORM_PAGE: &str = r#"
<!DOCTYPE html>
<html>
<head>
  <title>Issues</title>
  <script>var secret = "not text";</script>
</head>
<body>
  <nav>
    <a href="/home">Home</a>
    <a href="/about" class="nav-link active">About</a>
  </nav>
  <main>
    <h1>New issue</h1>
    <label for="title">Title</label>
    <input id="title" name="title" type="text" placeholder="Issue title">
    <textarea name="body" aria-label="Description"></textarea>
    <div contenteditable="true" id="notes"></div>
    <div role="button" aria-label="Create issue" id="create-btn">Create</div>
    <input type="hidden" name="csrf" value="x">
    <input type="submit" value="Save">
  </main>
</body>
</html>
"#;

fn builder() -> CatalogBuilder {
    CatalogBuilder::new(100, 3000)
}

fn tags(catalog: &Catalog) -> Vec<String> {
    catalog.elements.iter().map(|e| e.tag.clone()).collect()
}

#[test]
fn test_discovery_order_and_unique_ids() {
    let catalog = builder().build(FORM_PAGE);

    assert_eq!(
        tags(&catalog),
        vec!["a", "a", "label", "input", "textarea", "div", "div", "input"]
    );

    let ids: Vec<u32> = catalog.elements.iter().map(|e| e.reference_id.0).collect();
    assert_eq!(ids, (1..=8).collect::<Vec<u32>>());

    let unique: HashSet<_> = catalog.elements.iter().map(|e| e.reference_id).collect();
    assert_eq!(unique.len(), catalog.elements.len());
}

#[test]
fn test_attributes_are_captured() {
    let catalog = builder().build(FORM_PAGE);

    let about = &catalog.elements[1];
    assert_eq!(about.visible_text.as_deref(), Some("About"));
    assert_eq!(about.href.as_deref(), Some("/about"));
    assert!(about.class_list.contains("nav-link"));
    assert!(about.class_list.contains("active"));

    let title = &catalog.elements[3];
    assert_eq!(title.dom_id.as_deref(), Some("title"));
    assert_eq!(title.name.as_deref(), Some("title"));
    assert_eq!(title.placeholder.as_deref(), Some("Issue title"));
    assert_eq!(title.input_type.as_deref(), Some("text"));
    assert_eq!(title.nearby_label.as_deref(), Some("Title"));

    let notes = &catalog.elements[5];
    assert!(notes.is_content_editable);
    assert_eq!(notes.dom_id.as_deref(), Some("notes"));

    let create = &catalog.elements[6];
    assert_eq!(create.role.as_deref(), Some("button"));
    assert_eq!(create.aria_label.as_deref(), Some("Create issue"));
    assert_eq!(create.visible_text.as_deref(), Some("Create"));

    let submit = &catalog.elements[7];
    assert_eq!(submit.visible_text.as_deref(), Some("Save"));
    assert_eq!(submit.effective_role().as_deref(), Some("button"));
}

#[test]
fn test_cap_truncates_by_discovery_order() {
    let catalog = CatalogBuilder::new(3, 3000).build(FORM_PAGE);

    assert_eq!(catalog.elements.len(), 3);
    assert_eq!(catalog.discovered, 8);
    assert_eq!(catalog.truncated(), 5);
    assert_eq!(catalog.elements[0].visible_text.as_deref(), Some("Home"));
    assert_eq!(catalog.elements[2].tag, "label");
}

#[test]
fn test_hidden_elements_are_skipped() {
    let markup = r#"
    <html><body>
      <button hidden>Ghost</button>
      <div style="display: none"><button>Inside hidden</button></div>
      <div aria-hidden="true"><a href="/x">Hidden link</a></div>
      <button>Visible</button>
    </body></html>
    "#;
    let catalog = builder().build(markup);

    assert_eq!(catalog.elements.len(), 1);
    assert_eq!(catalog.elements[0].visible_text.as_deref(), Some("Visible"));
}

#[test]
fn test_nested_candidates_deduplicated() {
    let markup = r#"
    <html><body>
      <a href="/docs"><span role="button">Docs</span></a>
      <label>Email <input name="email" type="email"></label>
      <div onclick="go()"><button>Go</button></div>
    </body></html>
    "#;
    let catalog = builder().build(markup);

    // span inside the link has nothing of its own, so only the link remains;
    // the named input and the button inside the onclick wrapper stay reachable on their own
    assert_eq!(tags(&catalog), vec!["a", "label", "input", "div", "button"]);

    let email = &catalog.elements[2];
    assert_eq!(email.nearby_label.as_deref(), Some("Email"));
}

#[test]
fn test_button_inside_click_wrapper_is_kept() {
    let markup = r#"
    <html><body>
      <div class="card" onclick="open()">
        <h3>Quarterly report</h3>
        <button>Download</button>
        <span>Updated today</span>
      </div>
    </body></html>
    "#;
    let catalog = builder().build(markup);

    assert_eq!(tags(&catalog), vec!["div", "button"]);
    let button = &catalog.elements[1];
    assert_eq!(button.effective_role().as_deref(), Some("button"));
    assert_eq!(button.accessible_name(), Some("Download"));
}

#[test]
fn test_unnamed_button_inside_click_wrapper_is_dropped() {
    let markup = r#"
    <html><body>
      <div onclick="toggle()">Menu <button><svg></svg></button></div>
    </body></html>
    "#;
    let catalog = builder().build(markup);

    assert_eq!(tags(&catalog), vec!["div"]);
}

#[test]
fn test_elements_without_identity_are_dropped() {
    let markup = r#"
    <html><body>
      <a></a>
      <button><svg></svg></button>
      <button aria-label="Close"><svg></svg></button>
      <input>
    </body></html>
    "#;
    let catalog = builder().build(markup);

    assert_eq!(tags(&catalog), vec!["button", "input"]);
    assert_eq!(catalog.elements[0].aria_label.as_deref(), Some("Close"));
}

#[test]
fn test_structural_path() {
    let markup = r#"
    <html><body>
      <div><p>intro</p></div>
      <div>
        <button>One</button>
        <button>Two</button>
      </div>
    </body></html>
    "#;
    let catalog = builder().build(markup);

    assert_eq!(
        catalog.elements[1].structural_path,
        "html > body:nth-of-type(1) > div:nth-of-type(2) > button:nth-of-type(2)"
    );
}

#[test]
fn test_aria_labelledby_resolves_label() {
    let markup = r#"
    <html><body>
      <span id="lbl">Project name</span>
      <div contenteditable="" aria-labelledby="lbl"></div>
    </body></html>
    "#;
    let catalog = builder().build(markup);

    assert_eq!(catalog.elements.len(), 1);
    assert!(catalog.elements[0].is_content_editable);
    assert_eq!(
        catalog.elements[0].nearby_label.as_deref(),
        Some("Project name")
    );
}

#[test]
fn test_page_text_skips_scripts_and_truncates() {
    let text = builder().page_text(FORM_PAGE);
    assert!(text.contains("New issue"));
    assert!(text.contains("Home"));
    assert!(!text.contains("secret"));
    assert!(!text.contains("Issues")); // <title> lives in <head>

    let short = CatalogBuilder::new(100, 10).page_text(FORM_PAGE);
    assert_eq!(short, "Home\nAbout...");
}

#[test]
fn test_extract_matches_separate_passes() {
    let (catalog, text) = builder().extract(FORM_PAGE);
    assert_eq!(catalog.elements, builder().build(FORM_PAGE).elements);
    assert_eq!(text, builder().page_text(FORM_PAGE));
}

#[test]
fn test_empty_markup() {
    let catalog = builder().build("");
    assert!(catalog.elements.is_empty());
    assert_eq!(catalog.discovered, 0);
    assert_eq!(builder().page_text(""), "");
}

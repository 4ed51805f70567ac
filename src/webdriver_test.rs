use super::*;
use crate::types::ReferenceId;

#[test]
fn test_browser_type_from_str() {
    assert_eq!("Firefox".parse::<BrowserType>().unwrap(), BrowserType::Firefox);
    assert_eq!("chromium".parse::<BrowserType>().unwrap(), BrowserType::Chrome);
    assert!("safari".parse::<BrowserType>().is_err());
    assert_eq!(BrowserType::Chrome.default_webdriver_url(), "http://localhost:9515");
}

#[test]
fn test_xpath_literal_quoting() {
    assert_eq!(xpath_literal("Save"), "'Save'");
    assert_eq!(xpath_literal("Don't"), "\"Don't\"");
    assert_eq!(
        xpath_literal(r#"say "it's""#),
        r#"concat('say "it', "'", 's"')"#
    );
}

#[test]
fn test_xpath_tag_sanitized() {
    assert_eq!(xpath_tag("button"), "button");
    assert_eq!(xpath_tag("my-widget"), "my-widget");
    assert_eq!(xpath_tag("a]|//*"), "*");
    assert_eq!(xpath_tag(""), "*");
}

#[test]
fn test_simple_queries() {
    assert_eq!(
        to_xpath(&Query::Marker {
            attribute: "data-bid".to_string(),
            reference: ReferenceId(12),
        }),
        "//*[@data-bid='12']"
    );
    assert_eq!(to_xpath(&Query::DomId("notes".to_string())), "//*[@id = 'notes']");
    assert_eq!(to_xpath(&Query::Name("q".to_string())), "//*[@name = 'q']");
    assert_eq!(
        to_xpath(&Query::TextWithin {
            tag: "a".to_string(),
            text: "Docs".to_string(),
        }),
        "//a[contains(normalize-space(.), 'Docs')]"
    );
}

#[test]
fn test_role_query_includes_implicit_elements() {
    let xpath = to_xpath(&Query::RoleName {
        role: "button".to_string(),
        name: "Create issue".to_string(),
    });
    assert!(xpath.starts_with("(//*[@role='button'] | //button | //input["));
    assert!(xpath.contains("[not(@role) or @role='button']"));
    assert!(xpath.contains("normalize-space(.) = 'Create issue'"));
}

#[test]
fn test_truncated_name_uses_prefix_match() {
    assert_eq!(
        xpath_text_equals(".", "Read the release notes..."),
        "starts-with(normalize-space(.), 'Read the release notes')"
    );
}

#[test]
fn test_key_codes() {
    assert_eq!(key_code("Enter"), Some('\u{E007}'));
    assert_eq!(key_code("ArrowDown"), Some('\u{E015}'));
    assert_eq!(key_code("F13"), None);
}

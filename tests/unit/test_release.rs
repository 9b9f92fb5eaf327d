//! Release polling unit tests

use podgate::release::{is_update, parse_remote, Release};

fn release(tag: &str) -> Release {
    Release {
        tag_name: tag.to_string(),
        name: Some(format!("Release {}", tag)),
        published_at: Some("2024-01-01T00:00:00Z".to_string()),
        html_url: format!("https://github.com/acme/web/releases/tag/{}", tag),
    }
}

#[test]
fn test_parse_remote_variants() {
    let expected = Some(("acme".to_string(), "web".to_string()));

    assert_eq!(parse_remote("https://github.com/acme/web"), expected);
    assert_eq!(parse_remote("http://github.com/acme/web"), expected);
    assert_eq!(parse_remote("https://github.com/acme/web.git"), expected);
    assert_eq!(parse_remote("https://github.com/acme/web/"), expected);
    assert_eq!(parse_remote("github.com/acme/web"), expected);
}

#[test]
fn test_parse_remote_keeps_first_two_segments() {
    assert_eq!(
        parse_remote("https://github.com/acme/web/tree/main"),
        Some(("acme".to_string(), "web".to_string()))
    );
}

#[test]
fn test_parse_remote_rejects_incomplete_urls() {
    assert_eq!(parse_remote("https://github.com/acme"), None);
    assert_eq!(parse_remote("https://github.com/"), None);
    assert_eq!(parse_remote("github.com"), None);
    assert_eq!(parse_remote(""), None);
}

#[test]
fn test_update_detection_is_literal() {
    // No current version: any release counts as an update
    assert!(is_update(None, &release("v1.0.0")));

    // Same tag: no-op
    assert!(!is_update(Some("v1.0.0"), &release("v1.0.0")));

    // Different tag: update, regardless of ordering
    assert!(is_update(Some("v1.0.0"), &release("v1.1.0")));
    assert!(is_update(Some("v1.1.0"), &release("v1.0.0")));

    // The unknown sentinel never matches a real tag
    assert!(is_update(Some("unknown"), &release("v1.0.0")));
}

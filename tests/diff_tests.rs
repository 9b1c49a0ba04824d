use resilient_selectors::diff::structural::{diff_elements, diff_markup};

use crate::common::fixtures::{LOGIN_PAGE, extract};

mod common;

#[test]
fn identical_documents_have_no_differences() {
    let diff = diff_markup(LOGIN_PAGE, LOGIN_PAGE);
    assert!(diff.is_empty());
    assert_eq!(diff.summary(), "0 added, 0 removed, 0 modified");
}

#[test]
fn added_and_removed_swap_when_arguments_swap() {
    let before = r#"<div id="app"><button id="save">Save</button></div>"#;
    let after = r#"<div id="app"><a id="help" href="/help">Help</a></div>"#;

    let forward = diff_markup(before, after);
    let backward = diff_markup(after, before);

    assert_eq!(forward.added, backward.removed);
    assert_eq!(forward.removed, backward.added);
    assert_eq!(forward.added[0].css_path, "#help");
    assert_eq!(forward.removed[0].css_path, "#save");
    assert!(forward.modified.is_empty());
}

#[test]
fn modification_lists_text_then_id_then_classes() {
    let before =
        r#"<div id="app"><button id=":r1:" class="css-aaa111 primary">Save</button></div>"#;
    let after =
        r#"<div id="app"><button id=":r2:" class="css-bbb222 primary">Save draft</button></div>"#;

    let diff = diff_markup(before, after);
    assert!(diff.added.is_empty());
    assert!(diff.removed.is_empty());
    assert_eq!(diff.modified.len(), 1);

    let change = &diff.modified[0];
    assert_eq!(change.before.css_path, "#app > button.primary");
    assert_eq!(change.after.css_path, "#app > button.primary");
    assert_eq!(
        change.changes,
        vec![
            "text: \"Save\" -> \"Save draft\"".to_string(),
            "id: :r1: -> :r2:".to_string(),
            "classes: [css-aaa111 primary] -> [css-bbb222 primary]".to_string(),
        ]
    );
}

#[test]
fn gained_id_reports_none_placeholder() {
    let before = r#"<div id="app"><button id=":r1:">Go</button></div>"#;
    let after = r#"<div id="app"><button>Go</button></div>"#;

    let diff = diff_markup(before, after);
    assert_eq!(diff.modified.len(), 1);
    assert_eq!(diff.modified[0].changes, vec!["id: :r1: -> (none)".to_string()]);
}

#[test]
fn class_order_alone_is_not_a_modification() {
    let before = r#"<button class="css-aaa111 primary">Go</button>"#;
    let after = r#"<button class="primary css-aaa111">Go</button>"#;
    assert!(diff_markup(before, after).is_empty());
}

#[test]
fn new_sibling_shifts_positional_identity() {
    let before = r#"<nav><a href="/" class="nav">Home</a></nav>"#;
    let after = r#"<nav><a href="/" class="nav">Home</a><a href="/shop" class="nav">Shop</a></nav>"#;

    let diff = diff_markup(before, after);

    let removed: Vec<&str> = diff.removed.iter().map(|e| e.css_path.as_str()).collect();
    assert_eq!(removed, vec!["nav > a.nav"]);

    let added: Vec<(&str, &str)> = diff
        .added
        .iter()
        .map(|e| (e.css_path.as_str(), e.text.as_str()))
        .collect();
    assert_eq!(
        added,
        vec![
            ("nav > a.nav:nth-child(1)", "Home"),
            ("nav > a.nav:nth-child(2)", "Shop"),
        ]
    );
    assert!(diff.modified.is_empty());
    assert_eq!(diff.summary(), "2 added, 1 removed, 0 modified");
}

#[test]
fn moved_element_is_a_removal_plus_an_addition() {
    let before = r#"<header><button>Menu</button></header><main></main>"#;
    let after = r#"<header></header><main><button>Menu</button></main>"#;

    let diff = diff_markup(before, after);
    assert_eq!(diff.removed.len(), 1);
    assert_eq!(diff.removed[0].css_path, "header > button");
    assert_eq!(diff.added.len(), 1);
    assert_eq!(diff.added[0].css_path, "main > button");
}

#[test]
fn results_are_ordered_by_css_path() {
    let after = r#"<div id="z"><button>Z</button></div><div id="a"><button>A</button></div>"#;
    let diff = diff_elements(&[], &extract(after));
    let paths: Vec<&str> = diff.added.iter().map(|e| e.css_path.as_str()).collect();
    assert_eq!(paths, vec!["#a > button", "#z > button"]);
}

#[test]
fn empty_documents_diff_cleanly() {
    assert!(diff_markup("", "").is_empty());
    assert_eq!(diff_markup("", LOGIN_PAGE).added.len(), 7);
    assert_eq!(diff_markup(LOGIN_PAGE, "").removed.len(), 7);
}

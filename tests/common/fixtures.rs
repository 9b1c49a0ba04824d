use resilient_selectors::dom::dom_model::{ElementInfo, InteractiveElement};
use resilient_selectors::dom::extractor::extract_interactive_elements;

pub const LOGIN_PAGE: &str = r#"<!doctype html>
<html>
  <body>
    <header><nav><a href="/">Home</a><a href="/help">Help</a></nav></header>
    <main id="content">
      <form id="login" action="/session" method="post">
        <label for="email">Email</label>
        <input id="email" name="email" type="email" required>
        <label>Password <input type="password" name="password"></label>
        <button data-testid="login-btn" type="submit">Log in</button>
      </form>
      <div role="button" aria-label="Close dialog" tabindex="0">x</div>
    </main>
    <footer><a href="/terms">Terms</a></footer>
  </body>
</html>"#;

/// Only structural locators: no test ids, labels, roles or short text.
pub const ANONYMOUS_PAGE: &str = r#"<div>
  <input type="text">
  <select><option>One</option></select>
  <textarea></textarea>
</div>"#;

pub fn extract(markup: &str) -> Vec<InteractiveElement> {
    extract_interactive_elements(markup)
}

/// First extracted element whose text matches.
pub fn by_text(elements: &[InteractiveElement], text: &str) -> ElementInfo {
    elements
        .iter()
        .find(|el| el.element.text == text)
        .map(|el| el.element.clone())
        .unwrap_or_else(|| panic!("no element with text {text:?}"))
}

/// Every string a locator list could use to reference the page.
pub fn all_locator_strings(elements: &[InteractiveElement]) -> Vec<String> {
    elements
        .iter()
        .flat_map(|el| {
            el.element
                .suggested_locators
                .iter()
                .flat_map(|l| [l.value.clone(), l.code_template.clone()])
                .chain([el.element.css_path.clone()])
        })
        .collect()
}

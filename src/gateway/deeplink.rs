//! Messaging app deep links

use regex::Regex;
use std::sync::OnceLock;
use url::Url;

const MESSAGING_APP_BASE: &str = "https://wa.me/";

static NON_DIGITS: OnceLock<Regex> = OnceLock::new();

/// Strip everything but digits from a phone number ("+1 (555) 0100" -> "15550100")
pub fn normalize_phone_number(number: &str) -> String {
    NON_DIGITS
        .get_or_init(|| Regex::new(r"[^0-9]").unwrap())
        .replace_all(number, "")
        .into_owned()
}

/// Build the `wa.me` link for a number, with the message pre-filled when
/// present. Returns None when the number has no digits.
pub fn messaging_app_link(number: &str, message: Option<&str>) -> Option<String> {
    let digits = normalize_phone_number(number);
    if digits.is_empty() {
        return None;
    }

    let mut url = Url::parse(MESSAGING_APP_BASE).ok()?.join(&digits).ok()?;
    if let Some(text) = message.filter(|m| !m.is_empty()) {
        url.query_pairs_mut().append_pair("text", text);
    }
    Some(url.into())
}

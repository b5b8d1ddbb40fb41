//! Contact resolution from vCard exports.
//!
//! Apple Contacts exports a single `.vcf` with one card per person. Every
//! phone number and email on a card with a formatted name (`FN`) is mapped
//! to that name, so message handles can be shown as people.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, warn};

/// Shown for a message whose sender handle is missing entirely.
pub const UNKNOWN_HANDLE: &str = "Unknown";

#[allow(clippy::expect_used)]
static FOLD_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\r?\n[ \t]").expect("valid regex"));

#[allow(clippy::expect_used)]
static NON_DIGIT_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\D").expect("valid regex"));

/// Normalized handle (phone or email) to display name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactMap {
    handles: HashMap<String, String>,
}

impl ContactMap {
    /// Create an empty map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse vCard text into a map.
    #[must_use]
    pub fn parse_vcards(content: &str) -> Self {
        let mut map = Self::new();
        let unfolded = unfold_lines(content);
        let cards = split_cards(&unfolded);

        for card in &cards {
            map.add_card(card);
        }

        debug!(cards = cards.len(), handles = map.len(), "Parsed vCard content");
        map
    }

    /// Read and parse a `.vcf` file.
    ///
    /// A missing or unreadable file yields an empty map rather than an error.
    #[must_use]
    pub fn from_file(path: &Path) -> Self {
        match fs::read(path) {
            Ok(bytes) => {
                let map = Self::parse_vcards(&String::from_utf8_lossy(&bytes));
                info!(path = %path.display(), handles = map.len(), "Loaded contacts");
                map
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not read vCard file");
                Self::new()
            }
        }
    }

    /// Merge another map into this one. Entries from `other` win.
    pub fn merge(&mut self, other: Self) {
        self.handles.extend(other.handles);
    }

    /// Register `name` for a raw phone number, including its US alternate form.
    pub fn insert_phone(&mut self, raw: &str, name: &str) {
        let Some(normalized) = normalize_phone(raw) else {
            return;
        };
        if let Some(alternate) = us_alternate(&normalized) {
            self.handles.insert(alternate, name.to_string());
        }
        self.handles.insert(normalized, name.to_string());
    }

    /// Register `name` for a raw email address.
    pub fn insert_email(&mut self, raw: &str, name: &str) {
        let normalized = normalize_email(raw);
        if !normalized.is_empty() {
            self.handles.insert(normalized, name.to_string());
        }
    }

    /// Look up a handle already in normalized form.
    #[must_use]
    pub fn get(&self, normalized: &str) -> Option<&str> {
        self.handles.get(normalized).map(String::as_str)
    }

    /// Number of handles mapped
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// True when no handles are mapped
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Resolve a message handle to a display name.
    ///
    /// Tries the normalized handle, then the `+1`/10-digit alternate for
    /// phone numbers. Unmatched handles come back unchanged; an empty handle
    /// becomes [`UNKNOWN_HANDLE`].
    #[must_use]
    pub fn resolve(&self, handle: &str) -> String {
        if handle.trim().is_empty() {
            return UNKNOWN_HANDLE.to_string();
        }

        let normalized = normalize_handle(handle);
        if let Some(name) = self.get(&normalized) {
            return name.to_string();
        }

        if !handle.contains('@') {
            if let Some(name) = us_alternate(&normalized).and_then(|alt| self.get(&alt)) {
                return name.to_string();
            }
        }

        handle.to_string()
    }

    fn add_card(&mut self, lines: &[String]) {
        let mut display_name: Option<String> = None;
        let mut phones = Vec::new();
        let mut emails = Vec::new();

        for line in lines {
            let Some((name, value)) = parse_property(line) else {
                continue;
            };
            if value.is_empty() {
                continue;
            }
            match name.as_str() {
                "FN" => display_name = Some(unescape_text(value)),
                "TEL" => phones.push(strip_uri_scheme(value, "tel:")),
                "EMAIL" => emails.push(strip_uri_scheme(value, "mailto:")),
                _ => {}
            }
        }

        let Some(display_name) = display_name.filter(|n| !n.trim().is_empty()) else {
            return;
        };

        for phone in phones {
            self.insert_phone(phone, &display_name);
        }
        for email in emails {
            self.insert_email(email, &display_name);
        }
    }
}

/// Contact card file name looked for next to an export.
pub const CONTACTS_FILE: &str = "contacts.vcf";

/// Find the contact card for an export: inside it, next to it, then `fallback`.
#[must_use]
pub fn find_contacts_vcf(export_path: &Path, fallback: Option<&Path>) -> Option<PathBuf> {
    let local = Some(export_path.join(CONTACTS_FILE));
    let sibling = export_path.parent().map(|parent| parent.join(CONTACTS_FILE));
    let fallback = fallback.map(Path::to_path_buf);

    [local, sibling, fallback].into_iter().flatten().find(|candidate| candidate.is_file())
}

/// Normalize any handle: emails are lowercased, phones reduced to digits.
#[must_use]
pub fn normalize_handle(handle: &str) -> String {
    if handle.contains('@') {
        normalize_email(handle)
    } else {
        normalize_phone(handle).unwrap_or_default()
    }
}

/// Keep only digits, plus a leading `+` when the input starts with one.
#[must_use]
pub fn normalize_phone(phone: &str) -> Option<String> {
    let trimmed = phone.trim();
    let digits = NON_DIGIT_PATTERN.replace_all(trimmed, "");
    if digits.is_empty() {
        return None;
    }
    if trimmed.starts_with('+') {
        Some(format!("+{digits}"))
    } else {
        Some(digits.into_owned())
    }
}

/// Lowercase and trim an email address.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// `+1XXXXXXXXXX` <-> `XXXXXXXXXX` for US numbers.
fn us_alternate(normalized: &str) -> Option<String> {
    if normalized.len() == 12 && normalized.starts_with("+1") {
        Some(normalized[2..].to_string())
    } else if normalized.len() == 10 && !normalized.starts_with('+') {
        Some(format!("+1{normalized}"))
    } else {
        None
    }
}

fn unfold_lines(content: &str) -> String {
    FOLD_PATTERN.replace_all(content, "").into_owned()
}

fn split_cards(content: &str) -> Vec<Vec<String>> {
    let mut cards = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut in_card = false;

    for line in content.lines() {
        let line = line.trim();
        if line.eq_ignore_ascii_case("BEGIN:VCARD") {
            in_card = true;
            current.clear();
        } else if line.eq_ignore_ascii_case("END:VCARD") {
            if in_card && !current.is_empty() {
                cards.push(std::mem::take(&mut current));
            }
            in_card = false;
        } else if in_card && !line.is_empty() {
            current.push(line.to_string());
        }
    }

    cards
}

/// Split `NAME;PARAMS:value` into the uppercased bare name and the value.
///
/// Apple group prefixes (`item1.EMAIL`) are dropped from the name.
fn parse_property(line: &str) -> Option<(String, &str)> {
    let (head, value) = line.split_once(':')?;
    let name = head.split(';').next().unwrap_or(head);
    let name = name.rsplit('.').next().unwrap_or(name);
    Some((name.to_ascii_uppercase(), value.trim()))
}

fn strip_uri_scheme<'a>(value: &'a str, scheme: &str) -> &'a str {
    if value.len() >= scheme.len() && value[..scheme.len()].eq_ignore_ascii_case(scheme) {
        &value[scheme.len()..]
    } else {
        value
    }
}

fn unescape_text(value: &str) -> String {
    value.replace("\\,", ",").replace("\\;", ";").replace("\\\\", "\\").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "BEGIN:VCARD\r\n\
VERSION:3.0\r\n\
N:Smith;Alice;;;\r\n\
FN:Alice Smith\r\n\
TEL;type=CELL;type=VOICE;type=pref:+1 (404) 555-1234\r\n\
item1.EMAIL;type=INTERNET:Alice@Example.COM\r\n\
END:VCARD\r\n\
BEGIN:VCARD\r\n\
VERSION:3.0\r\n\
N:;;;;\r\n\
TEL:+15550000000\r\n\
END:VCARD\r\n";

    #[test]
    fn test_parse_sample() {
        let map = ContactMap::parse_vcards(SAMPLE);
        assert_eq!(map.get("+14045551234"), Some("Alice Smith"));
        assert_eq!(map.get("4045551234"), Some("Alice Smith"));
        assert_eq!(map.get("alice@example.com"), Some("Alice Smith"));
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn test_card_without_name_is_skipped() {
        let map = ContactMap::parse_vcards(SAMPLE);
        assert!(map.get("+15550000000").is_none());
    }

    #[test]
    fn test_folded_lines_are_joined() {
        let folded = "BEGIN:VCARD\nFN:Bartholomew\n  Jones\nTEL:404-555-\n 9876\nEND:VCARD\n";
        let map = ContactMap::parse_vcards(folded);
        assert_eq!(map.get("4045559876"), Some("Bartholomew Jones"));
    }

    #[test]
    fn test_uri_values_and_escapes() {
        let card = "BEGIN:VCARD\nFN:Doe\\, Jane\nTEL;VALUE=uri:tel:+1-404-555-0000\nEMAIL:mailto:jane@doe.org\nEND:VCARD";
        let map = ContactMap::parse_vcards(card);
        assert_eq!(map.get("+14045550000"), Some("Doe, Jane"));
        assert_eq!(map.get("jane@doe.org"), Some("Doe, Jane"));
    }

    #[test]
    fn test_lowercase_markers() {
        let card = "begin:vcard\nfn:Lower Case\ntel:5551234567\nend:vcard";
        let map = ContactMap::parse_vcards(card);
        assert_eq!(map.get("+15551234567"), Some("Lower Case"));
    }

    #[test]
    fn test_resolve_both_forms() {
        let mut map = ContactMap::new();
        map.insert_phone("+14045551234", "Alice");
        assert_eq!(map.resolve("+14045551234"), "Alice");
        assert_eq!(map.resolve("4045551234"), "Alice");
        assert_eq!(map.resolve("(404) 555-1234"), "Alice");
        assert_eq!(map.resolve("+17705550000"), "+17705550000");
    }

    #[test]
    fn test_resolve_email_case_insensitive() {
        let mut map = ContactMap::new();
        map.insert_email("bob@example.com", "Bob");
        assert_eq!(map.resolve("  BOB@Example.com "), "Bob");
        assert_eq!(map.resolve("carol@example.com"), "carol@example.com");
    }

    #[test]
    fn test_resolve_empty_handle() {
        assert_eq!(ContactMap::new().resolve(""), UNKNOWN_HANDLE);
    }

    #[test]
    fn test_merge_last_write_wins() {
        let mut first = ContactMap::new();
        first.insert_phone("4045551234", "Old Name");
        first.insert_email("keep@example.com", "Keep");
        let mut second = ContactMap::new();
        second.insert_phone("+14045551234", "New Name");

        first.merge(second);
        assert_eq!(first.resolve("4045551234"), "New Name");
        assert_eq!(first.resolve("+14045551234"), "New Name");
        assert_eq!(first.resolve("keep@example.com"), "Keep");
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("+1 (404) 555-1234").as_deref(), Some("+14045551234"));
        assert_eq!(normalize_phone("(404) 555-1234").as_deref(), Some("4045551234"));
        assert_eq!(normalize_phone("404.555.1234").as_deref(), Some("4045551234"));
        assert_eq!(normalize_phone("no digits"), None);
    }

    #[test]
    fn test_find_contacts_search_order() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let export = dir.path().join("mac-messages-20240101");
        fs::create_dir_all(&export).unwrap();
        let fallback = dir.path().join("fallback.vcf");

        assert_eq!(find_contacts_vcf(&export, Some(&fallback)), None);

        fs::write(&fallback, "BEGIN:VCARD\nEND:VCARD\n").unwrap();
        assert_eq!(find_contacts_vcf(&export, Some(&fallback)), Some(fallback.clone()));

        fs::write(dir.path().join(CONTACTS_FILE), "").unwrap();
        assert_eq!(find_contacts_vcf(&export, Some(&fallback)), Some(dir.path().join(CONTACTS_FILE)));

        fs::write(export.join(CONTACTS_FILE), "").unwrap();
        assert_eq!(find_contacts_vcf(&export, None), Some(export.join(CONTACTS_FILE)));
    }

    #[test]
    fn test_missing_file_is_empty() {
        let map = ContactMap::from_file(Path::new("/definitely/not/here/contacts.vcf"));
        assert!(map.is_empty());
    }
}

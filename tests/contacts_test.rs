//! Contact card loading and handle resolution

use std::fs;

use memoria_imessage::contacts::{find_contacts_vcf, normalize_handle, ContactMap, UNKNOWN_HANDLE};
use proptest::prelude::*;
use tempfile::tempdir;

fn card(name: &str, tel: &str) -> String {
    format!("BEGIN:VCARD\r\nVERSION:3.0\r\nFN:{name}\r\nTEL;type=CELL:{tel}\r\nEND:VCARD\r\n")
}

fn ten_digits() -> impl Strategy<Value = String> {
    "[2-9][0-9]{9}"
}

proptest! {
    #[test]
    fn phone_punctuation_does_not_matter(digits in ten_digits(), style in 0_usize..4) {
        let formatted = format!("+1 ({}) {}-{}", &digits[..3], &digits[3..6], &digits[6..]);
        let contacts = ContactMap::parse_vcards(&card("Alice Example", &formatted));

        let handle = match style {
            0 => format!("+1{digits}"),
            1 => digits.clone(),
            2 => format!("{}.{}.{}", &digits[..3], &digits[3..6], &digits[6..]),
            _ => format!("+1-{}-{}-{}", &digits[..3], &digits[3..6], &digits[6..]),
        };
        prop_assert_eq!(contacts.resolve(&handle), "Alice Example");
    }

    #[test]
    fn unmatched_handles_come_back_unchanged(handle in "[a-z]{1,8}@[a-z]{1,8}\\.com") {
        let contacts = ContactMap::parse_vcards(&card("Bob", "+14045550000"));
        prop_assert_eq!(contacts.resolve(&handle), handle);
    }

    #[test]
    fn normalization_is_idempotent(handle in "[+]?[0-9 ().-]{1,20}") {
        let once = normalize_handle(&handle);
        prop_assert_eq!(normalize_handle(&once), once);
    }
}

#[test]
fn test_multiple_cards_and_emails() {
    let vcf = "BEGIN:VCARD\nFN:Alice\nTEL:404-555-1234\nEMAIL;type=INTERNET:Alice@Example.com\nEND:VCARD\n\
               BEGIN:VCARD\nFN:Bob\nitem1.TEL:+44 20 7946 0958\nEND:VCARD\n";
    let contacts = ContactMap::parse_vcards(vcf);

    assert_eq!(contacts.resolve("+14045551234"), "Alice");
    assert_eq!(contacts.resolve("alice@example.com"), "Alice");
    assert_eq!(contacts.resolve("+442079460958"), "Bob");
    assert_eq!(contacts.resolve(""), UNKNOWN_HANDLE);
}

#[test]
fn test_later_file_wins_on_merge() {
    let dir = tempdir().expect("Failed to create temp dir");
    let old = dir.path().join("old.vcf");
    let new = dir.path().join("new.vcf");
    fs::write(&old, card("Old Name", "4045551234")).unwrap();
    fs::write(&new, card("New Name", "+14045551234")).unwrap();

    let mut contacts = ContactMap::from_file(&old);
    contacts.merge(ContactMap::from_file(&new));
    assert_eq!(contacts.resolve("4045551234"), "New Name");
}

#[test]
fn test_contacts_file_next_to_export() {
    let dir = tempdir().expect("Failed to create temp dir");
    let export = dir.path().join("mac-messages-20240101");
    fs::create_dir_all(&export).unwrap();
    assert!(find_contacts_vcf(&export, None).is_none());

    fs::write(dir.path().join("contacts.vcf"), card("Alice", "4045551234")).unwrap();
    assert_eq!(
        find_contacts_vcf(&export, None),
        Some(dir.path().join("contacts.vcf"))
    );

    fs::write(export.join("contacts.vcf"), card("Alice", "4045551234")).unwrap();
    assert_eq!(find_contacts_vcf(&export, None), Some(export.join("contacts.vcf")));
}

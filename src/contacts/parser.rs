//! Delimited contact-list parsing.
//!
//! The upload format in the wild is loose: header casing varies per CRM
//! export, so the name and phone columns are resolved by trying an ordered
//! list of known aliases. Rows missing either field are dropped silently;
//! only aggregate counts are reported back to the operator.

use csv::{ReaderBuilder, StringRecord, Trim};

use super::Contact;
use crate::errors::ParseError;

/// Header aliases tried in order for the name column. First match wins.
const NAME_ALIASES: &[&str] = &[
    "Name",
    "name",
    "NAME",
    "Full Name",
    "full name",
    "firstName",
    "FirstName",
    "First Name",
    "first name",
];

/// Header aliases tried in order for the phone column. First match wins.
const PHONE_ALIASES: &[&str] = &[
    "Phone",
    "phone",
    "PHONE",
    "Phone Number",
    "phone number",
    "phoneNumber",
    "PhoneNumber",
];

/// Parser output: the surviving contacts in file order, plus how many rows
/// were dropped for missing a name or phone.
#[derive(Debug)]
pub struct ParsedContacts {
    pub contacts: Vec<Contact>,
    pub skipped: usize,
}

impl ParsedContacts {
    pub fn loaded(&self) -> usize {
        self.contacts.len()
    }
}

/// Parse delimited text with a header row into an ordered contact sequence.
///
/// A file whose rows are all dropped is an error, not an empty success:
/// the operator gets "no valid leads found" rather than a silently empty
/// campaign.
pub fn parse_contacts(input: &str) -> Result<ParsedContacts, ParseError> {
    if input.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(input.as_bytes());

    let headers = reader
        .headers()
        .map_err(|source| ParseError::MalformedRow { row: 0, source })?
        .clone();

    let name_idx = resolve_column(&headers, NAME_ALIASES).ok_or(ParseError::ColumnNotFound {
        field: "name",
        header: join_header(&headers),
    })?;
    let phone_idx = resolve_column(&headers, PHONE_ALIASES).ok_or(ParseError::ColumnNotFound {
        field: "phone",
        header: join_header(&headers),
    })?;

    let mut contacts = Vec::new();
    let mut skipped = 0usize;
    for (row, result) in reader.records().enumerate() {
        let record = result.map_err(|source| ParseError::MalformedRow {
            row: row as u64 + 1,
            source,
        })?;
        let full_name = record.get(name_idx).unwrap_or("").trim();
        let phone = record.get(phone_idx).unwrap_or("").trim();
        if full_name.is_empty() || phone.is_empty() {
            skipped += 1;
            continue;
        }
        contacts.push(Contact::new(full_name, phone));
    }

    if contacts.is_empty() {
        return Err(ParseError::NoValidContacts);
    }

    Ok(ParsedContacts { contacts, skipped })
}

/// Try each alias in order against the header cells; no merging across
/// multiple matching aliases.
fn resolve_column(headers: &StringRecord, aliases: &[&str]) -> Option<usize> {
    aliases
        .iter()
        .find_map(|alias| headers.iter().position(|h| h == *alias))
}

fn join_header(headers: &StringRecord) -> String {
    headers.iter().collect::<Vec<_>>().join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_case_variant_headers() {
        let parsed =
            parse_contacts("Full Name,Phone Number\n\"Jane Doe\",\"+15551234567\"\n").unwrap();
        assert_eq!(parsed.loaded(), 1);
        assert_eq!(parsed.skipped, 0);
        let contact = &parsed.contacts[0];
        assert_eq!(contact.first_name, "Jane");
        assert_eq!(contact.full_name, "Jane Doe");
        assert_eq!(contact.phone, "+15551234567");
    }

    #[test]
    fn first_matching_alias_wins() {
        // Both "Name" and "First Name" are present; "Name" is earlier in the
        // alias order and must be the one used.
        let parsed = parse_contacts(
            "First Name,Name,phone\nWrong,\"Jane Doe\",+15550001111\n",
        )
        .unwrap();
        assert_eq!(parsed.contacts[0].full_name, "Jane Doe");
    }

    #[test]
    fn single_token_name_is_its_own_first_name() {
        let parsed = parse_contacts("name,phone\nMadonna,+15550002222\n").unwrap();
        assert_eq!(parsed.contacts[0].first_name, "Madonna");
        assert_eq!(parsed.contacts[0].full_name, "Madonna");
    }

    #[test]
    fn rows_missing_phone_or_name_are_dropped() {
        let parsed = parse_contacts(
            "Name,Phone\nJane Doe,+15550001111\nNo Phone,\n,+15550003333\nJohn Smith,+15550002222\n",
        )
        .unwrap();
        assert_eq!(parsed.loaded(), 2);
        assert_eq!(parsed.skipped, 2);
        assert_eq!(parsed.contacts[0].full_name, "Jane Doe");
        assert_eq!(parsed.contacts[1].full_name, "John Smith");
    }

    #[test]
    fn whitespace_only_fields_count_as_missing() {
        let err = parse_contacts("Name,Phone\n   ,+15550001111\nJane,   \n").unwrap_err();
        assert!(matches!(err, ParseError::NoValidContacts));
    }

    #[test]
    fn all_rows_dropped_is_an_error_not_empty_success() {
        let err = parse_contacts("Name,Phone\nJane Doe,\n").unwrap_err();
        assert!(matches!(err, ParseError::NoValidContacts));
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(matches!(parse_contacts(""), Err(ParseError::Empty)));
        assert!(matches!(parse_contacts("   \n  "), Err(ParseError::Empty)));
    }

    #[test]
    fn missing_name_column_is_reported() {
        let err = parse_contacts("Email,Phone\na@b.com,+15550001111\n").unwrap_err();
        match err {
            ParseError::ColumnNotFound { field, header } => {
                assert_eq!(field, "name");
                assert!(header.contains("Email"));
            }
            other => panic!("Expected ColumnNotFound, got {:?}", other),
        }
    }

    #[test]
    fn missing_phone_column_is_reported() {
        let err = parse_contacts("Name,Email\nJane,a@b.com\n").unwrap_err();
        assert!(matches!(
            err,
            ParseError::ColumnNotFound { field: "phone", .. }
        ));
    }

    #[test]
    fn file_order_is_preserved() {
        let parsed = parse_contacts(
            "name,phone\nC Last,+3\nA First,+1\nB Middle,+2\n",
        )
        .unwrap();
        let names: Vec<_> = parsed.contacts.iter().map(|c| c.full_name.as_str()).collect();
        assert_eq!(names, vec!["C Last", "A First", "B Middle"]);
    }

    #[test]
    fn short_rows_are_tolerated_and_dropped() {
        // A row with fewer fields than the header lacks a phone cell entirely.
        let parsed = parse_contacts("Name,Phone\nJane Doe\nJohn Smith,+15550002222\n").unwrap();
        assert_eq!(parsed.loaded(), 1);
        assert_eq!(parsed.skipped, 1);
    }
}

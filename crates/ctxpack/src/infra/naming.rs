//! Run identifiers for workspaces and artifacts.

use time::format_description::BorrowedFormatItem;
use time::{OffsetDateTime, PrimitiveDateTime};
use time::error::Format;
use time::macros::format_description;
use uuid::Uuid;

use crate::domain::model::RunId;

const TOKEN_LEN: usize = 8;
const TIMESTAMP_LEN: usize = 19;
const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]-[minute]-[second]");

/// Draw a fresh [`RunId`] from a random token and the current UTC time.
pub fn next_run_id() -> Result<RunId, Format> {
    Ok(RunId::new(random_token(), format_timestamp(OffsetDateTime::now_utc())?))
}

/// Eight lowercase hex digits. Collision resistant, not unique.
pub fn random_token() -> String {
    let mut token = Uuid::new_v4().simple().to_string();
    token.truncate(TOKEN_LEN);
    token
}

/// ISO-like timestamp truncated to seconds with `:` replaced by `-`.
pub fn format_timestamp(at: OffsetDateTime) -> Result<String, Format> {
    at.format(TIMESTAMP_FORMAT)
}

/// Check whether a directory name has the `<8 hex>-<19 char timestamp>` shape.
pub fn is_run_name(name: &str) -> bool {
    let Some((token, timestamp)) = name.split_once('-') else {
        return false;
    };
    token.len() == TOKEN_LEN
        && token.chars().all(|c| c.is_ascii_hexdigit())
        && timestamp.len() == TIMESTAMP_LEN
        && PrimitiveDateTime::parse(timestamp, TIMESTAMP_FORMAT).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    type Result<T> = std::result::Result<T, Format>;

    #[test]
    fn timestamp_is_truncated_and_filesystem_safe() -> Result<()> {
        let formatted = format_timestamp(datetime!(2024-09-25 12:30:45.678 UTC))?;
        assert_eq!(formatted, "2024-09-25T12-30-45");
        assert_eq!(formatted.len(), TIMESTAMP_LEN);
        Ok(())
    }

    #[test]
    fn tokens_are_eight_hex_digits() {
        let token = random_token();
        assert_eq!(token.len(), 8);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn generated_ids_produce_run_names() -> Result<()> {
        let id = next_run_id()?;
        assert!(is_run_name(&id.dir_name()));
        assert!(id.artifact_file_name("xml").ends_with("-pack.xml"));
        Ok(())
    }

    #[test]
    fn rejects_malformed_names() {
        assert!(!is_run_name("results"));
        assert!(!is_run_name("zzzzzzzz-2024-09-25T12-30-45"));
        assert!(!is_run_name("abcd1234-2024-09-25"));
        assert!(!is_run_name("abcd1234-2024-9-25-T12-30-45"));
        assert!(!is_run_name("abcd1234-2024-13-25T12-30-45"));
    }
}

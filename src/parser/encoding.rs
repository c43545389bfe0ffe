//! Input text decoding with a single legacy fallback.

use std::borrow::Cow;

use encoding_rs::{Encoding, GBK, UTF_8};
use tracing::debug;

use super::InputError;

/// Decodes input bytes as UTF-8, falling back to GBK.
///
/// A leading UTF-8 byte-order mark is stripped. Returns the decoded text and
/// the encoding that succeeded. Malformed sequences are never replaced: if
/// neither encoding decodes cleanly the input is rejected.
///
/// # Errors
///
/// Returns [`InputError::Encoding`] when both encodings fail.
pub fn decode_input(bytes: &[u8]) -> Result<(Cow<'_, str>, &'static Encoding), InputError> {
    let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);

    if let Ok(text) = std::str::from_utf8(body) {
        return Ok((Cow::Borrowed(text), UTF_8));
    }

    debug!("input is not UTF-8; trying GBK");
    GBK.decode_without_bom_handling_and_without_replacement(body)
        .map(|text| (text, GBK))
        .ok_or(InputError::Encoding {
            primary: UTF_8.name(),
            fallback: GBK.name(),
        })
}

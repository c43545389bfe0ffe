//! Output file naming for downloaded documents.

use std::path::{Path, PathBuf};

/// Extension given to every downloaded document.
pub const DOCUMENT_EXTENSION: &str = "pdf";

/// Suffix of the in-progress file a download streams into.
const PARTIAL_SUFFIX: &str = ".part";

/// Sanitizes a name for filesystem safety.
///
/// Replaces characters that are invalid on common filesystems
/// (`/ \ : * ? " < > |`) and control characters with `_`.
pub(crate) fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    match sanitized.as_str() {
        "" => "_".to_string(),
        "." | ".." => sanitized.replace('.', "_"),
        _ => sanitized,
    }
}

/// Returns `<dir>/<identifier>-<label>.pdf`, sanitized.
pub(crate) fn document_path(dir: &Path, identifier: &str, label: &str) -> PathBuf {
    let stem = sanitize_filename(&format!("{identifier}-{label}"));
    dir.join(format!("{stem}.{DOCUMENT_EXTENSION}"))
}

/// Returns the temporary path a download of `target` streams into.
pub(crate) fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename_removes_invalid_chars() {
        assert_eq!(sanitize_filename("a/b\\c:d*e?f\"g<h>i|j"), "a_b_c_d_e_f_g_h_i_j");
        assert_eq!(sanitize_filename("tab\there"), "tab_here");
    }

    #[test]
    fn test_sanitize_filename_keeps_cjk() {
        assert_eq!(sanitize_filename("某某科技股份有限公司-注册稿"), "某某科技股份有限公司-注册稿");
    }

    #[test]
    fn test_sanitize_filename_rewrites_dot_segments() {
        assert_eq!(sanitize_filename(".."), "__");
        assert_eq!(sanitize_filename("   "), "_");
    }

    #[test]
    fn test_document_path_joins_identifier_and_label() {
        let path = document_path(Path::new("/out"), "Acme/Holdings", "注册稿");
        assert_eq!(path, PathBuf::from("/out/Acme_Holdings-注册稿.pdf"));
    }

    #[test]
    fn test_partial_path_appends_suffix() {
        let path = partial_path(Path::new("/out/a-b.pdf"));
        assert_eq!(path, PathBuf::from("/out/a-b.pdf.part"));
    }
}

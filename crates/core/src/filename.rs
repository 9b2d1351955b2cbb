//! Filename sanitization for user-supplied upload names.

/// Sanitize an untrusted filename for storage on the local filesystem.
///
/// Only the final path component survives; directory separators and parent
/// references can never reach the disk. Whitespace runs collapse to a single
/// underscore, non-ASCII and control characters are dropped, and leading
/// dots are stripped so the result is never a hidden file.
///
/// Returns an empty string when nothing safe remains; callers must fall back
/// to a generated name in that case.
pub fn sanitize_filename(name: &str) -> String {
    // Keep only the last path component, whichever separator style was used
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("");

    let mut out = String::with_capacity(base.len());
    let mut last_was_underscore = false;
    for c in base.chars() {
        let mapped = match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' => Some(c),
            '_' => Some('_'),
            c if c.is_whitespace() => Some('_'),
            _ => None,
        };
        match mapped {
            Some('_') => {
                if !last_was_underscore {
                    out.push('_');
                    last_was_underscore = true;
                }
            }
            Some(c) => {
                out.push(c);
                last_was_underscore = false;
            }
            None => {}
        }
    }

    // No hidden files, no bare underscore husks
    let trimmed = out.trim_start_matches(['.', '_']).trim_end_matches('_');

    // ".." collapses to empty after trimming; anything left is plain
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_names_pass_through() {
        assert_eq!(sanitize_filename("report.pdf"), "report.pdf");
        assert_eq!(sanitize_filename("scan-2024.png"), "scan-2024.png");
    }

    #[test]
    fn test_path_components_are_stripped() {
        assert_eq!(sanitize_filename("/etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("../../secret.txt"), "secret.txt");
        assert_eq!(sanitize_filename("c:\\windows\\system32\\cmd.exe"), "cmd.exe");
    }

    #[test]
    fn test_whitespace_collapses() {
        assert_eq!(
            sanitize_filename("my report  (final).pdf"),
            "my_report_final.pdf"
        );
    }

    #[test]
    fn test_hidden_files_are_unhidden() {
        assert_eq!(sanitize_filename(".bashrc"), "bashrc");
        assert_eq!(sanitize_filename("..."), "");
    }

    #[test]
    fn test_hostile_input_yields_empty() {
        assert_eq!(sanitize_filename(""), "");
        assert_eq!(sanitize_filename("../.."), "");
        assert_eq!(sanitize_filename("///"), "");
    }

    #[test]
    fn test_non_ascii_dropped() {
        assert_eq!(sanitize_filename("résumé.pdf"), "rsum.pdf");
    }
}

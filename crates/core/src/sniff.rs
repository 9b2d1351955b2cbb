//! Magic-number MIME detection and the upload allow-list policy.

use std::collections::HashSet;

/// Allow-list of MIME types an assembled upload may have.
///
/// Detection works on magic numbers only; a file whose type cannot be
/// detected is rejected, because the browser-supplied content type is not
/// trustworthy.
#[derive(Clone, Debug)]
pub struct MimePolicy {
    allowed: HashSet<String>,
}

impl MimePolicy {
    /// Build a policy from an allow-list of MIME type strings.
    pub fn new(allowed: impl IntoIterator<Item = String>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }

    /// Detect the MIME type of a file from its leading bytes.
    pub fn detect(header: &[u8]) -> Option<&'static str> {
        infer::get(header).map(|kind| kind.mime_type())
    }

    /// Check a file header against the allow-list.
    ///
    /// Returns the verdict together with the detected type, mirroring what
    /// callers need for their error messages.
    pub fn check(&self, header: &[u8]) -> (bool, Option<&'static str>) {
        match Self::detect(header) {
            Some(mime) => (self.is_allowed(mime), Some(mime)),
            None => (false, None),
        }
    }

    /// Check whether a known MIME type is on the allow-list.
    pub fn is_allowed(&self, mime: &str) -> bool {
        self.allowed.contains(mime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PDF_HEADER: &[u8] = b"%PDF-1.7\n%\xe2\xe3\xcf\xd3\n";
    const PNG_HEADER: &[u8] = &[
        0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d,
    ];

    fn policy(types: &[&str]) -> MimePolicy {
        MimePolicy::new(types.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_detects_pdf_and_png() {
        assert_eq!(MimePolicy::detect(PDF_HEADER), Some("application/pdf"));
        assert_eq!(MimePolicy::detect(PNG_HEADER), Some("image/png"));
    }

    #[test]
    fn test_allowed_type_passes() {
        let policy = policy(&["application/pdf"]);
        let (allowed, detected) = policy.check(PDF_HEADER);
        assert!(allowed);
        assert_eq!(detected, Some("application/pdf"));
    }

    #[test]
    fn test_detected_but_not_allowed_fails() {
        let policy = policy(&["application/pdf"]);
        let (allowed, detected) = policy.check(PNG_HEADER);
        assert!(!allowed);
        assert_eq!(detected, Some("image/png"));
    }

    #[test]
    fn test_undetectable_type_fails() {
        let policy = policy(&["application/pdf", "text/plain"]);
        let (allowed, detected) = policy.check(b"just some plain text");
        assert!(!allowed);
        assert_eq!(detected, None);
    }
}

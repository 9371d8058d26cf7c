//! Build-version tagging of resource URLs.

/// Query parameter carrying the build version.
pub const BUILD_PARAM: &str = "build";

/// Resolves `path` against the directory `base` and appends the build
/// version as a cache-busting query parameter.
///
/// `base` always names a directory; a missing trailing `/` is implied.
/// Absolute URLs (`scheme://...`) are not rebased. An absent or empty
/// build version leaves the URL untagged.
pub fn with_build(base: &str, path: &str, build_id: Option<&str>) -> String {
    let mut url = if path.contains("://") || base.is_empty() {
        path.to_string()
    } else {
        let relative = path.trim_start_matches("./");
        format!("{}/{}", base.trim_end_matches('/'), relative)
    };

    if let Some(build) = build_id.filter(|b| !b.is_empty()) {
        url.push(if url.contains('?') { '&' } else { '?' });
        url.push_str(BUILD_PARAM);
        url.push('=');
        url.push_str(&encode_component(build));
    }
    url
}

/// Percent-encodes everything outside the RFC 3986 unreserved set.
///
/// Distinct inputs always give distinct outputs.
pub fn encode_component(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            other => encoded.push_str(&format!("%{:02X}", other)),
        }
    }
    encoded
}

//! Small helpers shared by `cli::command`/`cli::runner`: composite backend
//! URI parsing and output-format plumbing.

/// Default manifest object name used when a URI does not name one
/// explicitly via the composite `manifest_uri,label,data_uri` form.
pub const DEFAULT_MANIFEST_LABEL: &str = "manifest";

/// Default bounded concurrency for the `StorageQueue` driving CLI
/// subcommands.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Split a destination/source URI into `(manifest_uri, label, data_uri)`.
///
/// Persist and materialize accept a composite URI of the form
/// `manifest_uri,label,data_uri`; the manifest and data backends may be
/// the same or different. A plain `scheme:identifier` URI (no commas) is
/// treated as both backends at once, with the manifest stored under
/// `DEFAULT_MANIFEST_LABEL`.
///
/// # Errors
/// Returns an error string if the URI contains exactly one or more than
/// two commas, which is neither the plain nor the 3-part composite form.
pub fn parse_composite(uri: &str) -> Result<(String, String, String), String> {
    let parts: Vec<&str> = uri.split(',').collect();
    match parts.as_slice() {
        [single] => Ok((single.to_string(), DEFAULT_MANIFEST_LABEL.to_string(), single.to_string())),
        [manifest, label, data] => Ok((manifest.to_string(), label.to_string(), data.to_string())),
        _ => Err(format!(
            "expected a plain URI or 'manifest_uri,label,data_uri', got {uri:?} ({} comma-separated parts)",
            parts.len()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_uri_uses_same_backend_for_both() {
        let (m, l, d) = parse_composite("dir:/tmp/store").unwrap();
        assert_eq!(m, "dir:/tmp/store");
        assert_eq!(l, DEFAULT_MANIFEST_LABEL);
        assert_eq!(d, "dir:/tmp/store");
    }

    #[test]
    fn composite_uri_splits_three_ways() {
        let (m, l, d) = parse_composite("dir:/mf,snap1,dir:/blocks").unwrap();
        assert_eq!(m, "dir:/mf");
        assert_eq!(l, "snap1");
        assert_eq!(d, "dir:/blocks");
    }

    #[test]
    fn two_part_uri_is_rejected() {
        assert!(parse_composite("dir:/a,dir:/b").is_err());
    }
}

//! Deterministic, traversal-free names for stored files.
//!
//! Location segments and client filenames are arbitrary text. Before they
//! reach a filesystem path or a blob name they pass through the functions
//! here, which only ever produce `[A-Za-z0-9._-]` plus a hash suffix.

/// Number of hash bytes appended to a sanitized segment.
const SEGMENT_HASH_BYTES: usize = 4;

/// Fallback for filenames that sanitize to nothing.
const EMPTY_FILENAME: &str = "file";

/// Reduce a client-supplied filename to a safe single path component.
///
/// Path separators and runs of whitespace become `_`, every other character
/// outside `[A-Za-z0-9._-]` is dropped, and leading or trailing `.`/`_` are
/// trimmed.
///
/// ```
/// use depot_storage::naming::secure_filename;
///
/// assert_eq!(secure_filename("My cool movie.mov"), "My_cool_movie.mov");
/// assert_eq!(secure_filename("../../../etc/passwd"), "etc_passwd");
/// assert_eq!(secure_filename(".."), "file");
/// ```
pub fn secure_filename(filename: &str) -> String {
    let spaced: String = filename
        .chars()
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let trimmed = kept.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        EMPTY_FILENAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Short BLAKE3 digest of a raw segment, hex encoded.
pub fn segment_hash(segment: &str) -> String {
    let hash = blake3::hash(segment.as_bytes());
    hex::encode(&hash.as_bytes()[..SEGMENT_HASH_BYTES])
}

/// Directory name for a location segment.
///
/// The sanitized text keeps paths readable; the hash suffix keeps segments
/// that sanitize to the same text apart.
///
/// ```
/// use depot_storage::naming::segment_dir_name;
///
/// let a = segment_dir_name("lib/ssl");
/// let b = segment_dir_name("lib_ssl");
/// assert!(a.starts_with("lib_ssl-"));
/// assert_ne!(a, b);
/// ```
pub fn segment_dir_name(segment: &str) -> String {
    let sanitized: String = segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let sanitized = sanitized.trim_start_matches('.');
    let sanitized = if sanitized.is_empty() { "_" } else { sanitized };
    format!("{sanitized}-{}", segment_hash(segment))
}

/// Blob-name component for a location segment. Blob services treat `/` as a
/// virtual directory separator, so it is replaced by `:`, which can never
/// occur inside a segment.
pub fn blob_segment(segment: &str) -> String {
    segment.replace('/', ":")
}

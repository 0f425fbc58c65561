use std::path::Path;

/// Prefixes Windows uses for verbatim and device paths.
const VERBATIM_PREFIXES: &[&str] = &[r"\\?\UNC\", r"\\?\", r"\\.\"];

/// Map a local path to the object key it is stored under remotely.
///
/// The key is independent of the host's path conventions: verbatim prefixes and
/// drive letters are stripped, both `/` and `\` count as separators, empty and
/// `.` segments are dropped, and the result always starts with a single `/`.
///
/// `C:/Users/x/f.txt`, `C:\Users\x\f.txt` and `/Users/x/f.txt` all map to
/// `/Users/x/f.txt`.
pub fn canonical_key(path: &str) -> String {
    let mut rest = path;
    for prefix in VERBATIM_PREFIXES {
        if let Some(stripped) = rest.strip_prefix(prefix) {
            rest = stripped;
            break;
        }
    }

    let bytes = rest.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        rest = &rest[2..];
    }

    let segments: Vec<&str> = rest
        .split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect();

    format!("/{}", segments.join("/"))
}

/// [`canonical_key`] for a `Path`. Non-UTF-8 bytes are replaced lossily.
pub fn canonical_key_for(path: &Path) -> String {
    canonical_key(&path.to_string_lossy())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_drive_letter_and_uses_forward_slashes() {
        assert_eq!(
            canonical_key("C:/Users/test/some/dir/to/file.txt"),
            "/Users/test/some/dir/to/file.txt"
        );
    }

    #[test]
    fn windows_and_unix_spellings_agree() {
        let forward = canonical_key("C:/Users/x/f.txt");
        let backward = canonical_key(r"C:\Users\x\f.txt");
        assert_eq!(forward, backward);
        assert_eq!(forward, canonical_key("/Users/x/f.txt"));
    }

    #[test]
    fn verbatim_prefix_is_stripped() {
        assert_eq!(canonical_key(r"\\?\D:\data\report.pdf"), "/data/report.pdf");
    }

    #[test]
    fn redundant_separators_and_dot_segments_collapse() {
        assert_eq!(canonical_key("/var//lib/./syncs3/"), "/var/lib/syncs3");
    }

    #[test]
    fn relative_paths_become_rooted() {
        assert_eq!(canonical_key("notes/todo.md"), "/notes/todo.md");
    }
}

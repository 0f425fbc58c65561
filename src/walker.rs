use std::collections::HashSet;
use std::path::PathBuf;

use crate::config::WatchPath;

/// List every file under the watched paths, for the initial sync pass.
///
/// Recursive entries are walked fully, non-recursive directories one level
/// deep, and a plain file path yields itself. Hidden files and ignore files
/// are not filtered: the mirror is meant to be complete. Each file appears
/// once even if several watch entries overlap.
pub fn collect_files(paths: &[WatchPath]) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for path in paths {
        collect_from(path, &mut seen, &mut out);
    }
    out
}

fn collect_from(path: &WatchPath, seen: &mut HashSet<PathBuf>, out: &mut Vec<PathBuf>) {
    let max_depth = if path.recursive { None } else { Some(1) };
    let walker = ignore::WalkBuilder::new(&path.root)
        .standard_filters(false)
        .follow_links(false)
        .max_depth(max_depth)
        .build();

    for result in walker {
        let entry = match result {
            Ok(e) => e,
            Err(err) => {
                tracing::warn!(root = %path.root.display(), error = %err, "initial sync walk error");
                continue;
            }
        };

        // Skip directories; only files are mirrored.
        if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }

        let file = entry.into_path();
        if seen.insert(file.clone()) {
            out.push(file);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn tmp() -> TempDir {
        tempfile::tempdir().expect("tempdir")
    }

    fn names(files: &[PathBuf]) -> Vec<String> {
        let mut names: Vec<String> = files
            .iter()
            .map(|f| f.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        names.sort();
        names
    }

    fn tree() -> TempDir {
        let dir = tmp();
        fs::write(dir.path().join("top.txt"), "1").unwrap();
        fs::write(dir.path().join(".hidden"), "2").unwrap();
        fs::write(dir.path().join(".gitignore"), "top.txt\n").unwrap();
        let nested = dir.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("deep.bin"), "3").unwrap();
        dir
    }

    #[test]
    fn recursive_walk_finds_everything() {
        let dir = tree();
        let files = collect_files(&[WatchPath {
            root: dir.path().to_path_buf(),
            recursive: true,
        }]);
        assert_eq!(names(&files), vec![".gitignore", ".hidden", "deep.bin", "top.txt"]);
    }

    #[test]
    fn non_recursive_walk_stays_at_top_level() {
        let dir = tree();
        let files = collect_files(&[WatchPath {
            root: dir.path().to_path_buf(),
            recursive: false,
        }]);
        assert_eq!(names(&files), vec![".gitignore", ".hidden", "top.txt"]);
    }

    #[test]
    fn single_file_entry_yields_itself() {
        let dir = tree();
        let file = dir.path().join("top.txt");
        let files = collect_files(&[WatchPath {
            root: file.clone(),
            recursive: false,
        }]);
        assert_eq!(files, vec![file]);
    }

    #[test]
    fn overlapping_entries_are_deduplicated() {
        let dir = tree();
        let files = collect_files(&[
            WatchPath {
                root: dir.path().to_path_buf(),
                recursive: true,
            },
            WatchPath {
                root: dir.path().join("a"),
                recursive: true,
            },
        ]);
        assert_eq!(files.len(), 4);
    }
}

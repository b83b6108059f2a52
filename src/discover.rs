//! Batch input discovery

use glob::{glob_with, MatchOptions, Pattern};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

const JPEG_PATTERNS: [&str; 2] = ["*.jpg", "*.jpeg"];

#[derive(Debug, Default)]
pub struct Discovered {
    pub images: Vec<PathBuf>,
    /// Files that are not JPEG and paths that do not exist
    pub skipped: Vec<PathBuf>,
}

pub fn is_jpeg_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"))
}

/// Expands directories (non-recursive, extension match in any case) and
/// filters files by extension. Order follows the arguments; each directory's
/// images are sorted.
pub fn discover_images(paths: &[PathBuf]) -> Discovered {
    let mut found = Discovered::default();
    let mut seen = BTreeSet::new();

    for path in paths {
        if path.is_dir() {
            for image in jpegs_in(path) {
                if seen.insert(image.clone()) {
                    found.images.push(image);
                }
            }
        } else if path.is_file() {
            if !is_jpeg_path(path) {
                log::warn!("skipping non-JPEG file: {}", path.display());
                found.skipped.push(path.clone());
            } else if seen.insert(path.clone()) {
                found.images.push(path.clone());
            }
        } else {
            log::warn!("path not found: {}", path.display());
            found.skipped.push(path.clone());
        }
    }
    found
}

fn jpegs_in(dir: &Path) -> Vec<PathBuf> {
    let Some(base) = dir.to_str() else {
        log::warn!("skipping directory with non UTF-8 name: {}", dir.display());
        return Vec::new();
    };
    let options = MatchOptions {
        case_sensitive: false,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };

    let mut images = BTreeSet::new();
    for ext in JPEG_PATTERNS {
        let pattern = format!("{}/{}", Pattern::escape(base), ext);
        let entries = match glob_with(&pattern, options) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("bad glob pattern {}: {}", pattern, e);
                continue;
            }
        };
        for entry in entries {
            match entry {
                Ok(path) if path.is_file() => {
                    images.insert(path);
                }
                Ok(_) => {}
                Err(e) => log::warn!("unreadable entry: {}", e),
            }
        }
    }
    images.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_jpeg_extension_any_case() {
        assert!(is_jpeg_path(Path::new("a.jpg")));
        assert!(is_jpeg_path(Path::new("b.JPEG")));
        assert!(!is_jpeg_path(Path::new("c.png")));
        assert!(!is_jpeg_path(Path::new("jpg")));
    }

    #[test]
    fn test_directory_expanded_non_recursive() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.jpg", "a.JPG", "c.jpeg", "notes.txt"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("d.jpg"), b"x").unwrap();

        let found = discover_images(&[dir.path().to_path_buf()]);
        let names: Vec<String> = found
            .images
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.JPG", "b.jpg", "c.jpeg"]);
        assert!(found.skipped.is_empty());
    }

    #[test]
    fn test_files_filtered_and_missing_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let jpeg = dir.path().join("scan.jpg");
        let text = dir.path().join("scan.txt");
        fs::write(&jpeg, b"x").unwrap();
        fs::write(&text, b"x").unwrap();
        let missing = dir.path().join("gone.jpg");

        let found = discover_images(&[jpeg.clone(), text.clone(), missing.clone(), jpeg.clone()]);
        assert_eq!(found.images, vec![jpeg]);
        assert_eq!(found.skipped, vec![text, missing]);
    }
}

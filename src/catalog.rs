use std::path::{Path, PathBuf};

use rand::seq::IndexedRandom;
use rand::Rng;

use crate::error::RenderResult;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

const CATALOG_DIR_NAME: &str = "backgrounds";

/// Locate the bundled `backgrounds/` directory.
pub fn default_dir() -> PathBuf {
    // Look relative to the executable, then fall back to manifest dir
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()));

    if let Some(ref dir) = exe_dir {
        // target/<profile>/ and target/ layouts during development
        for candidate in dir.ancestors().take(3) {
            let catalog = candidate.join(CATALOG_DIR_NAME);
            if catalog.is_dir() {
                return catalog;
            }
        }
    }

    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(CATALOG_DIR_NAME)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.iter().any(|ext| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Every supported image under `dir`, recursively, in sorted order.
/// A missing directory is an empty catalog.
pub fn scan(dir: &Path) -> RenderResult<Vec<PathBuf>> {
    let mut images = Vec::new();
    if !dir.is_dir() {
        return Ok(images);
    }

    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if is_image(&path) {
                images.push(path);
            }
        }
    }

    images.sort();
    log::debug!("Background catalog {}: {} images", dir.display(), images.len());
    Ok(images)
}

/// Uniform pick from a scanned catalog.
pub fn pick<'a, R: Rng + ?Sized>(images: &'a [PathBuf], rng: &mut R) -> Option<&'a PathBuf> {
    images.choose(rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"x").unwrap();
    }

    #[test]
    fn scans_recursively_and_filters_extensions() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("b.png"));
        touch(&dir.path().join("a.JPG"));
        touch(&dir.path().join("nested/deeper/c.webp"));
        touch(&dir.path().join("nested/d.jpeg"));
        touch(&dir.path().join("notes.txt"));
        touch(&dir.path().join("nested/e.gif"));

        let images = scan(dir.path()).unwrap();
        let names: Vec<_> = images
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(names, ["a.JPG", "b.png", "nested/d.jpeg", "nested/deeper/c.webp"]);
    }

    #[test]
    fn missing_dir_is_empty() {
        assert!(scan(Path::new("/nonexistent/backgrounds")).unwrap().is_empty());
    }

    #[test]
    fn pick_is_seeded_and_total() {
        let images: Vec<PathBuf> = (0..10).map(|i| PathBuf::from(format!("{i}.png"))).collect();
        let a = pick(&images, &mut StdRng::seed_from_u64(7)).cloned();
        let b = pick(&images, &mut StdRng::seed_from_u64(7)).cloned();
        assert_eq!(a, b);
        assert!(images.contains(a.as_ref().unwrap()));
        assert!(pick(&[], &mut StdRng::seed_from_u64(7)).is_none());
    }
}

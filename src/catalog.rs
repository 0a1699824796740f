use rand::{Rng, seq::SliceRandom};
use std::{
    collections::HashSet,
    fs, io,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "webp", "bmp"];

#[derive(Debug, PartialEq, Eq)]
pub enum CatalogState {
    Absent,
    Empty,
    Populated,
}

#[derive(Debug)]
pub struct Catalog {
    pub state: CatalogState,
    pub names: Vec<String>,
}

pub fn is_image_name(name: &str) -> bool {
    let Some((_, ext)) = name.rsplit_once('.') else {
        return false;
    };
    IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known))
}

pub fn scan(dir: &Path) -> Catalog {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            if err.kind() != io::ErrorKind::NotFound {
                warn!(dir = %dir.display(), "cannot read wallpaper directory: {err}");
            }
            return Catalog {
                state: CatalogState::Absent,
                names: Vec::new(),
            };
        }
    };

    let mut names = Vec::new();
    for entry in entries {
        let Ok(entry) = entry else {
            continue;
        };
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if !is_image_name(&name) {
            continue;
        }
        // follows symlinks: a link to a directory is not an image
        match fs::metadata(entry.path()) {
            Ok(meta) if meta.is_file() => names.push(name),
            Ok(_) => {}
            Err(err) => debug!(name = %name, "skipping unreadable entry: {err}"),
        }
    }
    names.sort();

    let state = if names.is_empty() {
        CatalogState::Empty
    } else {
        CatalogState::Populated
    };
    Catalog { state, names }
}

pub fn list_images(dir: &Path) -> Vec<String> {
    let catalog = scan(dir);
    match catalog.state {
        CatalogState::Absent => debug!(dir = %dir.display(), "wallpaper directory absent"),
        CatalogState::Empty => debug!(dir = %dir.display(), "wallpaper directory has no images"),
        CatalogState::Populated => {}
    }
    catalog.names
}

/// Images across several folders, one per file name; earlier folders win.
pub fn collect_images(dirs: &[PathBuf]) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut found = Vec::new();
    for dir in dirs {
        for name in list_images(dir) {
            if seen.insert(name.clone()) {
                found.push((name.clone(), dir.join(name)));
            }
        }
    }
    found.sort_by(|a, b| a.0.cmp(&b.0));
    found.into_iter().map(|(_, path)| path).collect()
}

pub fn pick_random<R: Rng + ?Sized>(dirs: &[PathBuf], rng: &mut R) -> Option<PathBuf> {
    collect_images(dirs).choose(rng).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"x").unwrap();
    }

    #[test]
    fn filters_and_sorts_images() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "A.JPG", "c.txt", "d.webp"] {
            touch(dir.path(), name);
        }
        assert_eq!(list_images(dir.path()), vec!["A.JPG", "b.png", "d.webp"]);

        touch(dir.path(), ".jpg");
        assert_eq!(list_images(dir.path()), vec![".jpg", "A.JPG", "b.png", "d.webp"]);
    }

    #[test]
    fn missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        assert!(list_images(&missing).is_empty());
        assert_eq!(scan(&missing).state, CatalogState::Absent);
        assert_eq!(scan(dir.path()).state, CatalogState::Empty);
    }

    #[test]
    fn skips_directories_and_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("folder.png")).unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        touch(&dir.path().join("nested"), "deep.jpg");
        touch(dir.path(), "top.jpeg");
        assert_eq!(list_images(dir.path()), vec!["top.jpeg"]);
    }

    #[test]
    fn follows_symlinks_to_files_only() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "real.bmp");
        fs::create_dir(dir.path().join("sub")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("real.bmp"), dir.path().join("link.png"))
            .unwrap();
        std::os::unix::fs::symlink(dir.path().join("sub"), dir.path().join("dirlink.png"))
            .unwrap();
        std::os::unix::fs::symlink(dir.path().join("gone"), dir.path().join("dangling.jpg"))
            .unwrap();
        assert_eq!(list_images(dir.path()), vec!["link.png", "real.bmp"]);
    }

    #[test]
    fn extension_matching() {
        assert!(is_image_name("x.JpEg"));
        assert!(is_image_name("archive.tar.png"));
        assert!(!is_image_name("png"));
        assert!(is_image_name(".png"));
        assert!(!is_image_name("photo.tiff"));
        assert!(!is_image_name("photo.png.txt"));
    }

    #[test]
    fn collect_dedupes_by_name() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        touch(first.path(), "same.png");
        touch(second.path(), "same.png");
        touch(second.path(), "other.jpg");
        let dirs = vec![first.path().to_path_buf(), second.path().to_path_buf()];
        assert_eq!(
            collect_images(&dirs),
            vec![second.path().join("other.jpg"), first.path().join("same.png")]
        );
    }

    #[test]
    fn random_pick_comes_from_catalog() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "one.png");
        touch(dir.path(), "two.png");
        let dirs = vec![dir.path().to_path_buf()];
        let mut rng = StdRng::seed_from_u64(7);
        let picked = pick_random(&dirs, &mut rng).unwrap();
        assert!(picked.starts_with(dir.path()));

        let empty = tempfile::tempdir().unwrap();
        assert_eq!(pick_random(&[empty.path().to_path_buf()], &mut rng), None);
    }
}

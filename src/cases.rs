//! Case enumeration.
//!
//! Walks the input root and yields one [`CaseUnit`] per immediate
//! subdirectory. The walk is lazy and does not sort; the order is whatever
//! the filesystem listing returns.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Number of trailing characters of the case directory that identify a case.
pub const CASE_ID_WIDTH: usize = 5;

/// Case enumeration errors.
#[derive(Debug, thiserror::Error)]
pub enum CaseError {
    /// Input root could not be read
    #[error("Cannot read input root {path:?}: {source}")]
    InputRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Input root exists but is not a directory
    #[error("Input root is not a directory: {0:?}")]
    NotADirectory(PathBuf),
}

/// Result type for case enumeration.
pub type Result<T> = std::result::Result<T, CaseError>;

/// One independent workload invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseUnit {
    case_id: String,
    input_path: PathBuf,
    output_path: PathBuf,
}

impl CaseUnit {
    /// Build a case unit from its input directory and the shared output directory.
    pub fn new(input_path: PathBuf, output_path: PathBuf) -> Self {
        let case_id = case_id_for(&input_path);
        Self {
            case_id,
            input_path,
            output_path,
        }
    }

    /// Identifier taken from the trailing characters of the input directory.
    pub fn case_id(&self) -> &str {
        &self.case_id
    }

    /// Absolute path of the case's input directory.
    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    /// Absolute path of the output directory shared by every case.
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }
}

/// Derive the case identifier from the last [`CASE_ID_WIDTH`] characters of
/// the directory name. Shorter names are used whole.
fn case_id_for(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned());

    let skip = name.chars().count().saturating_sub(CASE_ID_WIDTH);
    name.chars().skip(skip).collect()
}

/// Lazy iterator over the case directories of an input root.
///
/// Restart by constructing a new enumerator.
#[derive(Debug)]
pub struct CaseEnumerator {
    entries: fs::ReadDir,
    output_path: PathBuf,
}

impl CaseEnumerator {
    /// Open the input root for enumeration.
    ///
    /// # Errors
    ///
    /// Returns error if the root does not exist, cannot be listed, or is not a directory.
    pub fn new(input_root: &Path, output_path: &Path) -> Result<Self> {
        let root = fs::canonicalize(input_root).map_err(|source| CaseError::InputRoot {
            path: input_root.to_path_buf(),
            source,
        })?;

        if !root.is_dir() {
            return Err(CaseError::NotADirectory(root));
        }

        let entries = fs::read_dir(&root).map_err(|source| CaseError::InputRoot {
            path: root.clone(),
            source,
        })?;

        debug!("Enumerating cases under {:?}", root);

        Ok(Self {
            entries,
            output_path: output_path.to_path_buf(),
        })
    }
}

impl Iterator for CaseEnumerator {
    type Item = CaseUnit;

    fn next(&mut self) -> Option<Self::Item> {
        for entry in self.entries.by_ref() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry in input root: {}", e);
                    continue;
                }
            };

            // Follows symlinks; a linked case directory is still a case.
            if !entry.path().is_dir() {
                continue;
            }

            return Some(CaseUnit::new(entry.path(), self.output_path.clone()));
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_yields_one_unit_per_subdirectory() {
        let root = TempDir::new().unwrap();
        for name in ["BraTS2021_00001", "BraTS2021_00013", "BraTS2021_00500"] {
            fs::create_dir(root.path().join(name)).unwrap();
        }
        fs::write(root.path().join("README.txt"), "not a case").unwrap();

        let mut ids: Vec<String> = CaseEnumerator::new(root.path(), Path::new("/out"))
            .unwrap()
            .map(|unit| unit.case_id().to_string())
            .collect();
        ids.sort();

        assert_eq!(ids, vec!["00001", "00013", "00500"]);
    }

    #[test]
    fn test_does_not_descend_into_case_directories() {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("case_00001").join("nested_99999")).unwrap();

        let units: Vec<CaseUnit> = CaseEnumerator::new(root.path(), Path::new("/out"))
            .unwrap()
            .collect();

        assert_eq!(units.len(), 1);
        assert_eq!(units[0].case_id(), "00001");
        assert!(units[0].input_path().is_absolute());
        assert_eq!(units[0].output_path(), Path::new("/out"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_case_directory_is_a_case() {
        let data = TempDir::new().unwrap();
        let target = data.path().join("scans_00042");
        fs::create_dir(&target).unwrap();

        let root = TempDir::new().unwrap();
        std::os::unix::fs::symlink(&target, root.path().join("BraTS2021_00042")).unwrap();
        std::os::unix::fs::symlink(data.path().join("gone"), root.path().join("dangling_00043"))
            .unwrap();

        let units: Vec<CaseUnit> = CaseEnumerator::new(root.path(), Path::new("/out"))
            .unwrap()
            .collect();

        assert_eq!(units.len(), 1);
        assert_eq!(units[0].case_id(), "00042");
    }

    #[test]
    fn test_short_directory_names_are_used_whole() {
        assert_eq!(case_id_for(Path::new("/input/abc")), "abc");
        assert_eq!(case_id_for(Path::new("/input/BraTS2021_00042")), "00042");
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let root = TempDir::new().unwrap();
        let missing = root.path().join("nope");

        let result = CaseEnumerator::new(&missing, Path::new("/out"));
        assert!(matches!(result, Err(CaseError::InputRoot { .. })));
    }

    #[test]
    fn test_file_root_is_an_error() {
        let root = TempDir::new().unwrap();
        let file = root.path().join("cases.txt");
        fs::write(&file, "").unwrap();

        let result = CaseEnumerator::new(&file, Path::new("/out"));
        assert!(matches!(result, Err(CaseError::NotADirectory(_))));
    }

    #[test]
    fn test_enumeration_restarts_by_reconstruction() {
        let root = TempDir::new().unwrap();
        fs::create_dir(root.path().join("case_00007")).unwrap();

        let first = CaseEnumerator::new(root.path(), Path::new("/out")).unwrap().count();
        let second = CaseEnumerator::new(root.path(), Path::new("/out")).unwrap().count();
        assert_eq!(first, 1);
        assert_eq!(second, 1);
    }
}

// src/file_resolver.rs

use crate::config::Config;
use crate::error::AppError;
use crate::types::{InputResolution, ResolvedFile};
use glob::glob;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

const PYTHON_EXTENSION: &str = "py";

fn is_walkdir_file_entry(entry: &DirEntry) -> bool {
    entry.file_type().is_file()
}

pub fn is_python_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == PYTHON_EXTENSION)
}

/// Attempts to create a ResolvedFile instance from a given path.
fn create_resolved_file(path_to_resolve: &Path, config: &Config) -> Result<ResolvedFile, String> {
    let canonical_path = fs::canonicalize(path_to_resolve)
        .map_err(|e| format!("Failed to canonicalize path {:?}: {}", path_to_resolve, e))?;

    let display_path = pathdiff::diff_paths(&canonical_path, &config.working_dir)
        .unwrap_or_else(|| canonical_path.clone());

    Ok(ResolvedFile::new(display_path, canonical_path))
}

/// Resolves a single `-f` input into the files to annotate.
///
/// 1. Direct Match: a literal file, or a folder whose `.py` files are all taken.
/// 2. Glob Match: otherwise, an input with glob characters is expanded.
///
/// Anything else is reported as a path that does not exist.
pub fn resolve_input_string<'a>(input_str: &'a str, config: &Config) -> InputResolution<'a> {
    // A literal path wins, so "file[1].py" is found even though it looks like a glob.
    let path_to_check = config.working_dir.join(input_str);
    if path_to_check.is_file() {
        return match create_resolved_file(&path_to_check, config) {
            Ok(resolved) => InputResolution::Success(vec![resolved]),
            Err(err_msg) => {
                warn!(input = input_str, %err_msg, "found file but could not resolve it");
                InputResolution::NotFound {
                    input_string: input_str,
                }
            }
        };
    }
    if path_to_check.is_dir() {
        let mut files_in_dir: Vec<ResolvedFile> = WalkDir::new(&path_to_check)
            .min_depth(1)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| is_walkdir_file_entry(e) && is_python_file(e.path()))
            .filter_map(|entry| match create_resolved_file(entry.path(), config) {
                Ok(resolved) => Some(resolved),
                Err(err_msg) => {
                    warn!(path = ?entry.path(), %err_msg, "skipping file in folder");
                    None
                }
            })
            .collect();
        files_in_dir.sort_by(|a, b| a.canonical_path().cmp(b.canonical_path()));
        return if files_in_dir.is_empty() {
            InputResolution::NotFound {
                input_string: input_str,
            }
        } else {
            InputResolution::Success(files_in_dir)
        };
    }

    let is_glob_pattern = input_str.contains(&['*', '?', '['][..]);
    if !is_glob_pattern {
        return InputResolution::PathDoesNotExist {
            input_string: input_str,
            path_tried: path_to_check,
        };
    }

    let pattern = path_to_check.to_string_lossy().into_owned();
    match glob(&pattern) {
        Err(pattern_error) => InputResolution::InvalidGlobPattern {
            input_string: input_str,
            error: pattern_error.to_string(),
        },
        Ok(paths) => {
            let mut resolved_files: Vec<ResolvedFile> = Vec::new();
            for entry in paths {
                match entry {
                    Ok(path) if path.is_file() => match create_resolved_file(&path, config) {
                        Ok(resolved) => resolved_files.push(resolved),
                        Err(err_msg) => {
                            warn!(?path, %err_msg, "glob matched a file that could not be resolved");
                        }
                    },
                    Ok(_) => {}
                    Err(glob_error) => {
                        warn!(input = input_str, %glob_error, "error while reading glob match");
                    }
                }
            }

            if resolved_files.is_empty() {
                InputResolution::NotFound {
                    input_string: input_str,
                }
            } else {
                InputResolution::Success(resolved_files)
            }
        }
    }
}

/// The three folders of watch mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchFolders {
    /// Files dropped here get processed and removed.
    pub drop: PathBuf,
    /// Untouched copies of every dropped file.
    pub originals: PathBuf,
    /// Annotated output, mirroring the drop folder layout.
    pub modified: PathBuf,
}

impl WatchFolders {
    /// Relative folders are taken from the working directory.
    pub fn new(config: &Config, drop: &Path, originals: &Path, modified: &Path) -> Self {
        Self {
            drop: config.working_dir.join(drop),
            originals: config.working_dir.join(originals),
            modified: config.working_dir.join(modified),
        }
    }

    pub fn ensure_exist(&self) -> Result<(), AppError> {
        for dir in [&self.drop, &self.originals, &self.modified] {
            fs::create_dir_all(dir).map_err(|e| {
                AppError::IoError(format!("Failed to create folder {:?}: {}", dir, e))
            })?;
        }
        Ok(())
    }

    /// Files waiting in the drop folder, relative to it, in a stable order.
    pub fn pending_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(&self.drop)
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(is_walkdir_file_entry)
            .filter_map(|entry| pathdiff::diff_paths(entry.path(), &self.drop))
            .collect();
        files.sort();
        files
    }

    /// Removes folders left empty under the drop folder. The drop folder itself stays.
    pub fn prune_empty_dirs(&self) -> Result<(), AppError> {
        let dirs: Vec<PathBuf> = WalkDir::new(&self.drop)
            .min_depth(1)
            .contents_first(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir())
            .map(DirEntry::into_path)
            .collect();
        for dir in dirs {
            let is_empty = fs::read_dir(&dir)
                .map_err(|e| AppError::IoError(format!("Failed to list {:?}: {}", dir, e)))?
                .next()
                .is_none();
            if is_empty {
                debug!(?dir, "removing empty folder");
                fs::remove_dir(&dir).map_err(|e| {
                    AppError::IoError(format!("Failed to remove folder {:?}: {}", dir, e))
                })?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Overrides;

    fn config_in(dir: &Path) -> Config {
        let dir = fs::canonicalize(dir).expect("canonical tempdir");
        Config::from_lookup(dir, &Overrides::default(), |_| None).expect("config")
    }

    #[test]
    fn literal_file_and_missing_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("a.py"), "x = 1\n").expect("write");
        let config = config_in(dir.path());

        match resolve_input_string("a.py", &config) {
            InputResolution::Success(files) => {
                assert_eq!(files.len(), 1);
                assert_eq!(files[0].display_path(), Path::new("a.py"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            resolve_input_string("missing.py", &config),
            InputResolution::PathDoesNotExist { .. }
        ));
    }

    #[test]
    fn glob_and_folder_inputs_expand_to_python_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir(dir.path().join("pkg")).expect("mkdir");
        fs::write(dir.path().join("pkg/b.py"), "").expect("write");
        fs::write(dir.path().join("pkg/a.py"), "").expect("write");
        fs::write(dir.path().join("pkg/notes.txt"), "").expect("write");
        let config = config_in(dir.path());

        for input in ["pkg/*.py", "pkg"] {
            match resolve_input_string(input, &config) {
                InputResolution::Success(files) => {
                    let names: Vec<PathBuf> =
                        files.iter().map(|f| f.display_path().to_path_buf()).collect();
                    assert_eq!(
                        names,
                        vec![PathBuf::from("pkg/a.py"), PathBuf::from("pkg/b.py")],
                        "input {input}"
                    );
                }
                other => panic!("unexpected {other:?} for {input}"),
            }
        }
        assert!(matches!(
            resolve_input_string("pkg/*.rs", &config),
            InputResolution::NotFound { .. }
        ));
    }

    #[test]
    fn watch_folders_are_created_listed_and_pruned() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config_in(dir.path());
        let folders = WatchFolders::new(
            &config,
            Path::new("in"),
            Path::new("orig"),
            Path::new("out"),
        );
        folders.ensure_exist().expect("folders");
        assert!(folders.originals.is_dir() && folders.modified.is_dir());

        fs::create_dir_all(folders.drop.join("sub/deeper")).expect("mkdir");
        fs::write(folders.drop.join("sub/m.py"), "").expect("write");
        fs::write(folders.drop.join("top.py"), "").expect("write");
        assert_eq!(
            folders.pending_files(),
            vec![PathBuf::from("sub/m.py"), PathBuf::from("top.py")]
        );

        fs::remove_file(folders.drop.join("sub/m.py")).expect("remove");
        folders.prune_empty_dirs().expect("prune");
        assert!(!folders.drop.join("sub").exists());
        assert!(folders.drop.is_dir());
    }
}

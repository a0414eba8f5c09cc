//! Object store access through a mounted directory.
//!
//! Keys are `/`-separated paths relative to the mount root, exactly as they
//! appear in the bucket.  A leading `/` is tolerated; any `..` component is
//! rejected so a caller cannot read or write outside the mount.

use std::{
    fs,
    path::{Component, Path, PathBuf},
};

use uuid::Uuid;

use crate::error::SynthesisError;

/// Handle to the storage mount.
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
    output_prefix: String,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>, output_prefix: &str) -> Self {
        Self {
            root: root.into(),
            output_prefix: output_prefix.trim_matches('/').to_string(),
        }
    }

    /// Map a key to its path under the mount without touching the filesystem.
    pub fn resolve(&self, key: &str) -> Result<PathBuf, SynthesisError> {
        let relative = key.trim_start_matches('/');
        if relative.is_empty() {
            return Err(SynthesisError::InvalidKey { key: key.to_string(), reason: "empty key" });
        }
        let mut path = self.root.clone();
        for component in Path::new(relative).components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    return Err(SynthesisError::InvalidKey {
                        key: key.to_string(),
                        reason: "'..' is not allowed",
                    })
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(SynthesisError::InvalidKey {
                        key: key.to_string(),
                        reason: "key must be relative to the storage root",
                    })
                }
            }
        }
        Ok(path)
    }

    /// Resolve a key that must name an existing file.
    pub fn resolve_existing(&self, key: &str) -> Result<PathBuf, SynthesisError> {
        let path = self.resolve(key)?;
        if path.is_file() {
            Ok(path)
        } else {
            Err(SynthesisError::VoiceNotFound { key: key.to_string() })
        }
    }

    /// A fresh `<prefix>/<uuid>.wav` key.  Never reused across calls.
    pub fn new_output_key(&self) -> String {
        format!("{}/{}.wav", self.output_prefix, Uuid::new_v4())
    }

    /// Write `bytes` under `key`, creating parent directories.
    ///
    /// The data goes to a hidden sibling first and is renamed into place, so
    /// readers of the mount see either the whole object or nothing.
    pub fn put(&self, key: &str, bytes: &[u8]) -> Result<PathBuf, SynthesisError> {
        let path = self.resolve(key)?;
        let parent = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(parent)?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let partial = parent.join(format!(".{}.part", file_name));

        if let Err(e) = fs::write(&partial, bytes).and_then(|()| fs::rename(&partial, &path)) {
            let _ = fs::remove_file(&partial);
            return Err(e.into());
        }
        Ok(path)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> (tempfile::TempDir, Storage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path(), "tts");
        (dir, storage)
    }

    #[test]
    fn test_resolve_nested_key() {
        let (dir, s) = storage();
        let p = s.resolve("samples/voices/mark.wav").unwrap();
        assert_eq!(p, dir.path().join("samples").join("voices").join("mark.wav"));
    }

    #[test]
    fn test_resolve_tolerates_leading_slash() {
        let (dir, s) = storage();
        assert_eq!(s.resolve("/a/b.wav").unwrap(), dir.path().join("a").join("b.wav"));
    }

    #[test]
    fn test_resolve_rejects_parent_dir() {
        let (_dir, s) = storage();
        let err = s.resolve("samples/../../etc/passwd").unwrap_err();
        assert!(matches!(err, SynthesisError::InvalidKey { .. }));
    }

    #[test]
    fn test_resolve_rejects_empty() {
        let (_dir, s) = storage();
        assert!(matches!(s.resolve("/").unwrap_err(), SynthesisError::InvalidKey { .. }));
    }

    #[test]
    fn test_resolve_existing_missing_file() {
        let (_dir, s) = storage();
        let err = s.resolve_existing("samples/voices/missing.wav").unwrap_err();
        assert!(matches!(err, SynthesisError::VoiceNotFound { .. }));
    }

    #[test]
    fn test_resolve_existing_rejects_directory() {
        let (dir, s) = storage();
        fs::create_dir_all(dir.path().join("samples")).unwrap();
        assert!(s.resolve_existing("samples").is_err());
    }

    #[test]
    fn test_output_keys_are_unique() {
        let (_dir, s) = storage();
        let a = s.new_output_key();
        let b = s.new_output_key();
        assert_ne!(a, b);
        assert!(a.starts_with("tts/") && a.ends_with(".wav"));
        // "tts/" + 36-char hyphenated UUID + ".wav"
        assert_eq!(a.len(), 4 + 36 + 4);
    }

    #[test]
    fn test_put_creates_directories_and_leaves_no_partial() {
        let (dir, s) = storage();
        let key = s.new_output_key();
        let path = s.put(&key, b"RIFF").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"RIFF");

        let names: Vec<String> = fs::read_dir(dir.path().join("tts"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(!names[0].starts_with('.'));
    }

    #[test]
    fn test_failed_put_leaves_nothing_behind() {
        let (dir, s) = storage();
        // A non-empty directory where the object should go makes the rename fail.
        let blocked = dir.path().join("tts").join("taken.wav");
        fs::create_dir_all(blocked.join("inner")).unwrap();

        let err = s.put("tts/taken.wav", b"RIFF").unwrap_err();
        assert!(matches!(err, SynthesisError::Storage(_)));

        let names: Vec<String> = fs::read_dir(dir.path().join("tts"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["taken.wav"]);
        assert!(blocked.is_dir());
    }
}

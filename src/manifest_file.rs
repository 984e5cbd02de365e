//! Reading and atomically writing `component.json`.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use mcat_core::manifest::ComponentManifest;

use crate::error::IntegrityError;
use crate::scanner::manifest_temp_name;

pub fn manifest_path(dir: &Path, manifest_name: &str) -> PathBuf {
    dir.join(manifest_name)
}

/// Load a component manifest.
///
/// `Ok(None)` when the file does not exist. Unparseable JSON and manifests
/// failing [`ComponentManifest::check`] are `ManifestUnreadable`.
pub fn read_manifest(path: &Path) -> Result<Option<ComponentManifest>, IntegrityError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(IntegrityError::ManifestUnreadable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
        }
    };

    let manifest: ComponentManifest =
        serde_json::from_slice(&bytes).map_err(|e| IntegrityError::ManifestUnreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    manifest
        .check()
        .map_err(|e| IntegrityError::ManifestUnreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    Ok(Some(manifest))
}

/// Write a manifest via temp file + fsync + rename.
///
/// Readers see either the previous file or the complete new one. The temp
/// file is removed if any step fails.
pub fn write_manifest(path: &Path, manifest: &ComponentManifest) -> Result<(), IntegrityError> {
    let write_err = |source: std::io::Error| IntegrityError::ManifestWrite {
        path: path.to_path_buf(),
        source,
    };

    let mut json = serde_json::to_vec_pretty(manifest)
        .map_err(|e| write_err(std::io::Error::other(e)))?;
    json.push(b'\n');

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "component.json".to_string());
    let tmp_path = path.with_file_name(manifest_temp_name(&file_name));

    let result = (|| -> std::io::Result<()> {
        let mut file = File::create(&tmp_path)?;
        file.write_all(&json)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(write_err(e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcat_core::hash::hash_text;
    use mcat_core::manifest::{ArtifactEntry, ComponentCategory};
    use tempfile::TempDir;

    #[test]
    fn missing_manifest_is_none() {
        let tmp = TempDir::new().unwrap();
        let got = read_manifest(&tmp.path().join("component.json")).unwrap();
        assert!(got.is_none());
    }

    #[test]
    fn garbage_manifest_is_unreadable() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("component.json");
        fs::write(&path, "{ not json").unwrap();
        let err = read_manifest(&path).unwrap_err();
        assert!(matches!(err, IntegrityError::ManifestUnreadable { .. }));
    }

    #[test]
    fn invalid_hash_is_unreadable() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("component.json");
        fs::write(
            &path,
            r#"{"id":"c1","identifier":"BP-1","artifacts":[{"path":"a.dxf","hash":"md5:abc"}]}"#,
        )
        .unwrap();
        assert!(matches!(
            read_manifest(&path).unwrap_err(),
            IntegrityError::ManifestUnreadable { .. }
        ));
    }

    #[test]
    fn write_then_read() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("component.json");
        let manifest = ComponentManifest::new("c1", "BP-1042", ComponentCategory::Purchased)
            .with_artifacts(
                vec![ArtifactEntry::new("a.dxf", Some(hash_text("a")))],
                chrono::Utc::now(),
            );

        write_manifest(&path, &manifest).unwrap();
        assert!(!tmp.path().join(".component.json.tmp").exists());

        let loaded = read_manifest(&path).unwrap().unwrap();
        assert_eq!(loaded, manifest);
    }

    #[test]
    fn write_into_missing_dir_fails() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("missing-dir").join("component.json");
        let manifest = ComponentManifest::new("c1", "BP-1", ComponentCategory::Fabricated);
        let err = write_manifest(&path, &manifest).unwrap_err();
        assert!(matches!(err, IntegrityError::ManifestWrite { .. }));
    }
}

//! Version bumping for JSON package manifests

use semver::{BuildMetadata, Prerelease, Version};
use serde_json::Value;
use std::path::{Path, PathBuf};

use rigger_common::BumpLevel;

use crate::error::{HarnessError, HarnessResult};

/// Result of bumping one manifest
#[derive(Debug, Clone)]
pub struct BumpOutcome {
    pub path: PathBuf,
    pub previous: Version,
    pub current: Version,
}

/// Increment one component, resetting the lower ones
pub fn bump_version(version: &Version, level: BumpLevel) -> Version {
    let mut next = version.clone();
    match level {
        BumpLevel::Major => {
            next.major += 1;
            next.minor = 0;
            next.patch = 0;
        }
        BumpLevel::Minor => {
            next.minor += 1;
            next.patch = 0;
        }
        BumpLevel::Patch => next.patch += 1,
    }
    next.pre = Prerelease::EMPTY;
    next.build = BuildMetadata::EMPTY;
    next
}

/// Rewrite the `version` field of a JSON manifest in place
///
/// Key order and every other field are preserved.
pub async fn bump_manifest(path: &Path, level: BumpLevel) -> HarnessResult<BumpOutcome> {
    let content = tokio::fs::read_to_string(path).await?;
    let mut manifest: Value = serde_json::from_str(&content)?;

    let invalid = |reason: &str| HarnessError::InvalidManifest {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    let object = manifest
        .as_object_mut()
        .ok_or_else(|| invalid("top level is not an object"))?;
    let raw = object
        .get("version")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("missing string field \"version\""))?;

    let previous = Version::parse(raw)?;
    let current = bump_version(&previous, level);
    object.insert("version".to_string(), Value::String(current.to_string()));

    let mut rendered = serde_json::to_string_pretty(&manifest)?;
    rendered.push('\n');
    tokio::fs::write(path, rendered).await?;

    Ok(BumpOutcome {
        path: path.to_path_buf(),
        previous,
        current,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use test_case::test_case;

    #[test_case("1.2.3", BumpLevel::Major, "2.0.0" ; "major resets minor and patch")]
    #[test_case("1.2.3", BumpLevel::Minor, "1.3.0" ; "minor resets patch")]
    #[test_case("1.2.3", BumpLevel::Patch, "1.2.4" ; "patch")]
    #[test_case("0.9.9-beta.1+sha.5", BumpLevel::Patch, "0.9.10" ; "prerelease is dropped")]
    fn test_bump_version(input: &str, level: BumpLevel, expected: &str) {
        let version = Version::parse(input).unwrap();
        assert_eq!(bump_version(&version, level).to_string(), expected);
    }

    #[tokio::test]
    async fn test_bump_manifest_preserves_fields() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("package.json");
        std::fs::write(
            &path,
            r#"{"name": "site", "version": "0.4.1", "private": true, "dependencies": {"b": "1", "a": "2"}}"#,
        )
        .unwrap();

        let outcome = bump_manifest(&path, BumpLevel::Minor).await.unwrap();
        assert_eq!(outcome.previous.to_string(), "0.4.1");
        assert_eq!(outcome.current.to_string(), "0.5.0");

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.ends_with("}\n"));
        let name = written.find("\"name\"").unwrap();
        let version = written.find("\"version\": \"0.5.0\"").unwrap();
        let private = written.find("\"private\"").unwrap();
        assert!(name < version && version < private);
        assert!(written.find("\"b\"").unwrap() < written.find("\"a\"").unwrap());
    }

    #[tokio::test]
    async fn test_bump_manifest_without_version() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bower.json");
        std::fs::write(&path, r#"{"name": "site"}"#).unwrap();

        let err = bump_manifest(&path, BumpLevel::Patch).await.unwrap_err();
        assert!(matches!(err, HarnessError::InvalidManifest { .. }));
    }

    #[tokio::test]
    async fn test_bump_manifest_bad_version() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("package.json");
        std::fs::write(&path, r#"{"version": "one"}"#).unwrap();

        let err = bump_manifest(&path, BumpLevel::Patch).await.unwrap_err();
        assert!(matches!(err, HarnessError::Semver(_)));
    }
}

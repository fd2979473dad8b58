use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Storage options applied when the service creates an asset.
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssetCreationOptions {
    #[default]
    None,
    /// Encrypt the asset's files at rest.
    StorageEncrypted,
}

impl Display for AssetCreationOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            AssetCreationOptions::None => write!(f, "none"),
            AssetCreationOptions::StorageEncrypted => write!(f, "storage_encrypted"),
        }
    }
}

/// A single file inside an asset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssetFile {
    pub id: String,
    pub name: String,
    pub size_bytes: u64,
    pub mime_type: Option<String>,
    pub is_primary: bool,
}

impl AssetFile {
    /// Case-insensitive check of the file name's suffix (e.g. ".ism").
    pub fn has_extension(&self, extension: &str) -> bool {
        self.name
            .to_ascii_lowercase()
            .ends_with(&extension.to_ascii_lowercase())
    }
}

/// A named container of files representing one logical media item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Asset {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub options: AssetCreationOptions,
    #[serde(default)]
    pub files: Vec<AssetFile>,
    pub created_at: DateTime<Utc>,
}

impl Asset {
    pub fn primary_file(&self) -> Option<&AssetFile> {
        self.files.iter().find(|f| f.is_primary)
    }

    pub fn file(&self, file_id: &str) -> Option<&AssetFile> {
        self.files.iter().find(|f| f.id == file_id)
    }

    /// Files whose name ends with `extension`, in the asset's file order.
    pub fn files_with_extension<'a, 'e>(
        &'a self,
        extension: &'e str,
    ) -> impl Iterator<Item = &'a AssetFile> + 'e
    where
        'a: 'e,
    {
        self.files.iter().filter(move |f| f.has_extension(extension))
    }

    /// Flag `file_id` as the primary file, clearing the flag on every other file.
    /// Returns false when the file does not belong to this asset.
    pub fn mark_primary(&mut self, file_id: &str) -> bool {
        if self.file(file_id).is_none() {
            return false;
        }
        for file in &mut self.files {
            file.is_primary = file.id == file_id;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(id: &str, name: &str, primary: bool) -> AssetFile {
        AssetFile {
            id: id.to_string(),
            name: name.to_string(),
            size_bytes: 10,
            mime_type: None,
            is_primary: primary,
        }
    }

    fn asset(files: Vec<AssetFile>) -> Asset {
        Asset {
            id: "asset-1".to_string(),
            name: "Bitten by the Frost".to_string(),
            options: AssetCreationOptions::None,
            files,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn mark_primary_keeps_a_single_primary() {
        let mut a = asset(vec![file("f1", "a.mp4", true), file("f2", "b.mp4", false)]);
        assert!(a.mark_primary("f2"));
        assert_eq!(a.files.iter().filter(|f| f.is_primary).count(), 1);
        assert_eq!(a.primary_file().map(|f| f.id.as_str()), Some("f2"));
    }

    #[test]
    fn mark_primary_unknown_file_is_rejected() {
        let mut a = asset(vec![file("f1", "a.mp4", true)]);
        assert!(!a.mark_primary("nope"));
        assert_eq!(a.primary_file().map(|f| f.id.as_str()), Some("f1"));
    }

    #[test]
    fn files_with_extension_ignores_case_and_keeps_order() {
        let a = asset(vec![
            file("f1", "clip_1000.mp4", false),
            file("f2", "clip.ISM", false),
            file("f3", "clip_alt.ism", false),
        ]);
        let names: Vec<_> = a.files_with_extension(".ism").map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["clip.ISM", "clip_alt.ism"]);
    }
}

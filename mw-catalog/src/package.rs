//! Library package format
//!
//! The JSON document used for export files and shared-catalog downloads:
//!
//! ```json
//! {"version": 1, "libraries": [{"name": "CET-4", "description": "",
//!   "words": [{"word": "give up", "definitionCn": "v. 放弃", ...}]}]}
//! ```
//!
//! A bare library object (`{"name": ..., "words": [...]}`) is accepted on
//! read and treated as a one-library package.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use mw_common::{Entry, EntryStore, WordForm};

use crate::error::CatalogError;

pub const PACKAGE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageWord {
    pub word: String,
    #[serde(default)]
    pub phonetic: Option<String>,
    #[serde(default)]
    pub definition_cn: String,
    #[serde(default)]
    pub definition_en: Option<String>,
    #[serde(default)]
    pub example: Option<String>,
    #[serde(default)]
    pub memory_method: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub forms: Vec<WordForm>,
    #[serde(default)]
    pub review_count: i64,
    #[serde(default)]
    pub last_review_time: i64,
}

impl PackageWord {
    fn from_entry(entry: &Entry) -> Self {
        Self {
            word: entry.term.clone(),
            phonetic: entry.phonetic.clone(),
            definition_cn: entry.definition.clone(),
            definition_en: entry.definition_en.clone(),
            example: entry.example.clone(),
            memory_method: entry.mnemonic.clone(),
            forms: entry.forms.clone(),
            review_count: entry.review_count,
            last_review_time: entry.last_review_time,
        }
    }

    /// Unscheduled entry carrying this word's content
    ///
    /// Review counters are kept only when `keep_progress` is set; the
    /// schedule always starts fresh.
    pub fn to_entry(&self, library_id: i64, keep_progress: bool) -> Entry {
        let mut entry = Entry::new(self.word.trim(), library_id);
        entry.phonetic = self.phonetic.clone();
        entry.definition = self.definition_cn.clone();
        entry.definition_en = self.definition_en.clone();
        entry.example = self.example.clone();
        entry.mnemonic = self.memory_method.clone();
        entry.forms = self.forms.clone();
        if keep_progress {
            entry.review_count = self.review_count.max(0);
            entry.last_review_time = self.last_review_time.max(0);
        }
        entry
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryExport {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub words: Vec<PackageWord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportPackage {
    pub version: u32,
    pub libraries: Vec<LibraryExport>,
}

/// Result of installing one packaged library
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledLibrary {
    pub library_id: i64,
    pub name: String,
    pub words: usize,
    pub skipped: usize,
}

impl ExportPackage {
    pub fn new(libraries: Vec<LibraryExport>) -> Self {
        Self { version: PACKAGE_VERSION, libraries }
    }

    pub fn word_count(&self) -> usize {
        self.libraries.iter().map(|l| l.words.len()).sum()
    }

    /// Parse a package or a bare library object
    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| CatalogError::Package(e.to_string()))?;

        let package = if value.get("libraries").is_some() {
            serde_json::from_value::<ExportPackage>(value)
                .map_err(|e| CatalogError::Package(e.to_string()))?
        } else if value.get("words").is_some() {
            let library = serde_json::from_value::<LibraryExport>(value)
                .map_err(|e| CatalogError::Package(e.to_string()))?;
            ExportPackage::new(vec![library])
        } else {
            return Err(CatalogError::Package(
                "expected a `libraries` or `words` field".to_string(),
            ));
        };

        if package.version > PACKAGE_VERSION {
            tracing::warn!(
                version = package.version,
                supported = PACKAGE_VERSION,
                "Reading package written by a newer version"
            );
        }
        Ok(package)
    }

    pub fn to_json(&self) -> Result<String, CatalogError> {
        serde_json::to_string_pretty(self).map_err(|e| CatalogError::Package(e.to_string()))
    }

    /// Base64 of the JSON document, as the upload endpoint expects
    pub fn to_base64(&self) -> Result<String, CatalogError> {
        Ok(BASE64.encode(self.to_json()?))
    }
}

/// Snapshot the given libraries, in the order requested
pub async fn export_libraries(
    store: &dyn EntryStore,
    library_ids: &[i64],
) -> Result<ExportPackage, CatalogError> {
    let all = store.list_libraries().await?;
    let mut libraries = Vec::with_capacity(library_ids.len());

    for id in library_ids {
        let library = all
            .iter()
            .find(|l| l.id == *id)
            .ok_or_else(|| mw_common::Error::NotFound(format!("library {}", id)))?;
        let words = store
            .entries_in_library(*id)
            .await?
            .iter()
            .map(PackageWord::from_entry)
            .collect();
        libraries.push(LibraryExport {
            name: library.name.clone(),
            description: library.description.clone(),
            words,
        });
    }

    Ok(ExportPackage::new(libraries))
}

/// Create one new library per packaged library and fill it
///
/// Words with a blank term are skipped, as are repeats of a term already
/// installed into the same library.
pub async fn install_package(
    store: &dyn EntryStore,
    package: &ExportPackage,
    keep_progress: bool,
) -> Result<Vec<InstalledLibrary>, CatalogError> {
    let mut installed = Vec::with_capacity(package.libraries.len());

    for library in &package.libraries {
        let name = if library.name.trim().is_empty() {
            "Imported library"
        } else {
            library.name.trim()
        };
        let library_id = store.create_library(name, &library.description).await?;

        let mut words = 0;
        let mut skipped = 0;
        for word in &library.words {
            if word.word.trim().is_empty() || store.get_entry(&word.word, library_id).await?.is_some() {
                skipped += 1;
                continue;
            }
            store
                .insert_or_replace_entry(&word.to_entry(library_id, keep_progress))
                .await?;
            words += 1;
        }

        tracing::info!(library_id, name, words, skipped, "Installed library");
        installed.push(InstalledLibrary {
            library_id,
            name: name.to_string(),
            words,
            skipped,
        });
    }

    Ok(installed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_camel_case_words() {
        let raw = r#"{"version": 1, "libraries": [{"name": "CET-4", "description": "core",
            "words": [{"word": "abandon", "phonetic": "/əˈbændən/", "definitionCn": "v. 放弃",
                       "memoryMethod": "a + band + on", "reviewCount": 4, "lastReviewTime": 99,
                       "libraryId": 7, "id": 12}]}]}"#;
        let package = ExportPackage::from_json(raw).unwrap();
        assert_eq!(package.libraries.len(), 1);
        let word = &package.libraries[0].words[0];
        assert_eq!(word.definition_cn, "v. 放弃");
        assert_eq!(word.memory_method.as_deref(), Some("a + band + on"));
        assert_eq!(word.review_count, 4);
    }

    #[test]
    fn test_bare_library_object() {
        let raw = r#"{"name": "Shared", "words": [{"word": "x"}]}"#;
        let package = ExportPackage::from_json(raw).unwrap();
        assert_eq!(package.version, PACKAGE_VERSION);
        assert_eq!(package.libraries[0].name, "Shared");
        assert_eq!(package.word_count(), 1);
    }

    #[test]
    fn test_rejects_unknown_shapes() {
        assert!(matches!(ExportPackage::from_json("[]"), Err(CatalogError::Package(_))));
        assert!(matches!(ExportPackage::from_json("{\"foo\": 1}"), Err(CatalogError::Package(_))));
        assert!(matches!(ExportPackage::from_json("not json"), Err(CatalogError::Package(_))));
    }

    #[test]
    fn test_to_entry_progress() {
        let word = PackageWord {
            word: " give up ".to_string(),
            phonetic: None,
            definition_cn: "v. 放弃".to_string(),
            definition_en: None,
            example: None,
            memory_method: None,
            forms: Vec::new(),
            review_count: 3,
            last_review_time: 1_000,
        };

        let fresh = word.to_entry(2, false);
        assert_eq!(fresh.term, "give up");
        assert_eq!(fresh.review_count, 0);
        assert_eq!(fresh.next_review_time, 0);

        let kept = word.to_entry(2, true);
        assert_eq!(kept.review_count, 3);
        assert_eq!(kept.last_review_time, 1_000);
        assert_eq!(kept.next_review_time, 0);
    }

    #[test]
    fn test_base64_decodes_to_json() {
        let package = ExportPackage::new(vec![LibraryExport {
            name: "A".to_string(),
            description: String::new(),
            words: Vec::new(),
        }]);
        let encoded = package.to_base64().unwrap();
        let decoded = String::from_utf8(BASE64.decode(encoded).unwrap()).unwrap();
        assert_eq!(ExportPackage::from_json(&decoded).unwrap(), package);
    }
}

//! Metadata tagging of discovered files

use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;

/// Tag attached to image files
pub const IMAGE_TAG: &str = "image";

const IMAGE_EXTENSIONS: &[&str] = &["bmp", "gif", "jpg", "jpeg", "pcd", "png", "tif", "tiff"];

/// Classifies a path into a set of metadata tags
pub trait MetadataTagger: Send + Sync {
    /// Tags for `path`; must not touch the filesystem
    fn tags_for(&self, path: &Path) -> BTreeSet<String>;
}

/// Tags files by extension (case-insensitive)
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtensionTagger;

impl MetadataTagger for ExtensionTagger {
    fn tags_for(&self, path: &Path) -> BTreeSet<String> {
        let mut tags = BTreeSet::new();

        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase());

        if let Some(ext) = ext {
            if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
                tags.insert(IMAGE_TAG.to_string());
            }
        }

        tags
    }
}

#[derive(Serialize)]
struct FormatObject<'a> {
    format: Vec<&'a str>,
}

/// Render tags as `{"format":[...]}`, or an empty string when there are none
pub fn meta_tags_json(tags: &BTreeSet<String>) -> String {
    if tags.is_empty() {
        return String::new();
    }

    let object = FormatObject {
        format: tags.iter().map(String::as_str).collect(),
    };
    // A struct of strings cannot fail to serialize
    serde_json::to_string(&object).unwrap_or_default()
}

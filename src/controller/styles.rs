//! Uploaded style resources and their storage names.
//!
//! The original name is the identity of an entry: uploading the same name
//! again replaces the content but keeps the storage name. Storage names are
//! pairwise distinct for the lifetime of the registry.

use crate::protocol::StyleEntry;
use std::collections::HashSet;

/// Storage name used when nothing usable is left of the original name.
pub const FALLBACK_STYLE_NAME: &str = "style.sty";

/// One uploaded file, before naming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleUpload {
    pub name: String,
    pub content: String,
    /// Size of the uploaded file in bytes.
    pub size: u64,
}

impl StyleUpload {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            name: name.into(),
            size: content.len() as u64,
            content,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleResource {
    pub original_name: String,
    pub storage_name: String,
    pub content: String,
    pub size_label: String,
}

impl StyleResource {
    pub fn to_entry(&self) -> StyleEntry {
        StyleEntry {
            name: self.original_name.clone(),
            safe_name: self.storage_name.clone(),
            content: self.content.clone(),
        }
    }
}

/// Replaces path separators and trims. An empty result becomes
/// `style.sty`.
pub fn sanitize_file_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    let trimmed = replaced.trim();
    if trimmed.is_empty() {
        FALLBACK_STYLE_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Returns `name` if unused, else the first free `stem-N.ext` with N from 2.
pub fn unique_safe_name(name: &str, existing: &HashSet<String>) -> String {
    if !existing.contains(name) {
        return name.to_string();
    }
    let (stem, ext) = match name.rfind('.') {
        Some(dot) => name.split_at(dot),
        None => (name, ""),
    };
    (2u64..)
        .map(|i| format!("{}-{}{}", stem, i, ext))
        .find(|candidate| !existing.contains(candidate))
        .unwrap_or_else(|| name.to_string())
}

/// Base-2 kilobytes with one decimal place, e.g. `1.5 KB`.
pub fn format_kib(size: u64) -> String {
    let tenths = (size * 10 + 512) / 1024;
    format!("{}.{} KB", tenths / 10, tenths % 10)
}

/// Ordered map of style resources keyed by original name.
#[derive(Debug, Default, Clone)]
pub struct StyleRegistry {
    entries: Vec<StyleResource>,
}

impl StyleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, original_name: &str) -> Option<&StyleResource> {
        self.entries
            .iter()
            .find(|entry| entry.original_name == original_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StyleResource> {
        self.entries.iter()
    }

    /// Adds a batch of uploads, in order.
    ///
    /// Known names keep their storage name. New names are sanitized and
    /// disambiguated against every assigned name, including names assigned
    /// earlier in the same batch. A name repeated within the batch resolves
    /// to one entry holding the last content.
    pub fn add_batch(&mut self, uploads: Vec<StyleUpload>) -> usize {
        let mut assigned: HashSet<String> = self
            .entries
            .iter()
            .map(|entry| entry.storage_name.clone())
            .collect();

        let count = uploads.len();
        for upload in uploads {
            let size_label = format_kib(upload.size);
            if let Some(existing) = self
                .entries
                .iter_mut()
                .find(|entry| entry.original_name == upload.name)
            {
                existing.content = upload.content;
                existing.size_label = size_label;
                continue;
            }

            let storage_name = unique_safe_name(&sanitize_file_name(&upload.name), &assigned);
            assigned.insert(storage_name.clone());
            self.entries.push(StyleResource {
                original_name: upload.name,
                storage_name,
                content: upload.content,
                size_label,
            });
        }
        count
    }

    /// Removes one entry. Its storage name becomes free again.
    pub fn remove(&mut self, original_name: &str) -> Option<StyleResource> {
        let index = self
            .entries
            .iter()
            .position(|entry| entry.original_name == original_name)?;
        Some(self.entries.remove(index))
    }

    /// Entries as shipped with a compile request.
    pub fn to_entries(&self) -> Vec<StyleEntry> {
        self.entries.iter().map(StyleResource::to_entry).collect()
    }
}

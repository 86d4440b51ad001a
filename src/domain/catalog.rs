//! Catalog contents served by the catalog handler
//!
//! The catalog is loaded once at startup, either from a JSON file or from the
//! built-in defaults, and handed to every new session through `init`.

use std::{collections::HashSet, fs, path::Path};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceEntry {
    pub uri: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptEntry {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Text with `{{argument}}` placeholders.
    pub template: String,
    #[serde(default)]
    pub arguments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CatalogOptions {
    #[serde(default)]
    pub resources: Vec<ResourceEntry>,
    #[serde(default)]
    pub prompts: Vec<PromptEntry>,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("catalog file {path} is not valid catalog JSON: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

fn default_mime_type() -> String {
    "text/plain".to_string()
}

impl Default for CatalogOptions {
    fn default() -> Self {
        Self {
            resources: vec![ResourceEntry {
                uri: "resource://catalog/about".to_string(),
                name: "About".to_string(),
                description: Some("What this server exposes".to_string()),
                mime_type: default_mime_type(),
                text: concat!(
                    env!("CARGO_PKG_NAME"),
                    " serves a static catalog of resources, prompts and tools."
                )
                .to_string(),
            }],
            prompts: vec![PromptEntry {
                name: "summarize".to_string(),
                description: Some("Ask for a short summary of a text".to_string()),
                template: "Summarize the following text in three sentences:\n\n{{text}}"
                    .to_string(),
                arguments: vec!["text".to_string()],
            }],
        }
    }
}

impl CatalogOptions {
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.display().to_string(),
            source,
        })?;

        serde_json::from_str(&raw).map_err(|source| CatalogError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// First structural problem in the catalog, if any.
    pub fn problem(&self) -> Option<String> {
        let mut uris = HashSet::new();
        for resource in &self.resources {
            if resource.uri.trim().is_empty() {
                return Some("resource uri must not be empty".to_string());
            }
            if !uris.insert(resource.uri.as_str()) {
                return Some(format!("duplicate resource uri {}", resource.uri));
            }
        }

        let mut names = HashSet::new();
        for prompt in &self.prompts {
            if !names.insert(prompt.name.as_str()) {
                return Some(format!("duplicate prompt name {}", prompt.name));
            }
        }

        None
    }

    pub fn resource(&self, uri: &str) -> Option<&ResourceEntry> {
        self.resources.iter().find(|resource| resource.uri == uri)
    }

    pub fn prompt(&self, name: &str) -> Option<&PromptEntry> {
        self.prompts.iter().find(|prompt| prompt.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_consistent() {
        assert_eq!(CatalogOptions::default().problem(), None);
    }

    #[test]
    fn parses_minimal_catalog_json() {
        let catalog: CatalogOptions = serde_json::from_str(
            r#"{"resources":[{"uri":"resource://a","name":"A","text":"alpha"}]}"#,
        )
        .expect("valid catalog");

        assert_eq!(catalog.resources[0].mime_type, "text/plain");
        assert!(catalog.prompts.is_empty());
        assert_eq!(
            catalog.resource("resource://a").map(|r| r.text.as_str()),
            Some("alpha")
        );
    }

    #[test]
    fn detects_duplicate_uris() {
        let mut catalog = CatalogOptions::default();
        let first = catalog.resources[0].clone();
        catalog.resources.push(first);

        let problem = catalog.problem().expect("duplicate must be reported");
        assert!(problem.contains("duplicate resource uri"));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let error = CatalogOptions::load(Path::new("/nonexistent/catalog.json"))
            .expect_err("missing file must fail");
        assert!(matches!(error, CatalogError::Read { .. }));
    }
}

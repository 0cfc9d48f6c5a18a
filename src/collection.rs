// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 promptflow contributors

//! Collections of pipelines addressed by their URL

use std::collections::BTreeMap;
use std::path::Path;

use tracing::debug;

use crate::compiler::compile;
use crate::errors::{LogicError, PromptflowError, PromptflowResult};
use crate::pipeline::{Pipeline, PipelineValidator};

/// Source files compiled from the dialect
pub const SOURCE_EXTENSION: &str = "ptbk.md";
/// Already compiled pipelines
pub const COMPILED_EXTENSION: &str = "ptbk.json";

/// Set of validated pipelines with unique URLs
#[derive(Debug, Clone, Default)]
pub struct PipelineCollection {
    pipelines: BTreeMap<String, Pipeline>,
}

impl PipelineCollection {
    /// Empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from compiled pipelines
    ///
    /// Each pipeline must carry a URL, URLs must be unique, and each
    /// pipeline must pass validation.
    pub fn from_pipelines(pipelines: impl IntoIterator<Item = Pipeline>) -> PromptflowResult<Self> {
        let mut collection = Self::new();
        for pipeline in pipelines {
            collection.add(pipeline)?;
        }
        Ok(collection)
    }

    /// Compile dialect sources into a collection
    pub fn from_sources<'a>(sources: impl IntoIterator<Item = &'a str>) -> PromptflowResult<Self> {
        let pipelines = sources
            .into_iter()
            .map(compile)
            .collect::<PromptflowResult<Vec<_>>>()?;
        Self::from_pipelines(pipelines)
    }

    /// Load every `*.ptbk.md` and `*.ptbk.json` below a directory
    pub fn from_directory(dir: &Path) -> PromptflowResult<Self> {
        if !dir.is_dir() {
            return Err(PromptflowError::PipelineNotFound {
                path: dir.to_path_buf(),
            });
        }

        let mut files = Vec::new();
        for extension in [SOURCE_EXTENSION, COMPILED_EXTENSION] {
            let pattern = dir.join("**").join(format!("*.{}", extension));
            for path in glob::glob(&pattern.to_string_lossy())?.flatten() {
                files.push(path);
            }
        }
        files.sort();

        let mut collection = Self::new();
        for path in files {
            debug!(path = %path.display(), "Loading pipeline");
            collection.add(load_pipeline(&path)?)?;
        }
        Ok(collection)
    }

    /// Parse a JSON array of compiled pipelines
    pub fn from_json(json: &str) -> PromptflowResult<Self> {
        let pipelines: Vec<Pipeline> = serde_json::from_str(json)?;
        Self::from_pipelines(pipelines)
    }

    /// JSON array of the pipelines, ordered by URL
    pub fn to_json(&self) -> PromptflowResult<String> {
        let pipelines: Vec<&Pipeline> = self.pipelines.values().collect();
        Ok(serde_json::to_string_pretty(&pipelines)?)
    }

    /// Add one pipeline
    pub fn add(&mut self, pipeline: Pipeline) -> PromptflowResult<()> {
        let Some(url) = pipeline.pipeline_url.clone() else {
            return Err(LogicError::MissingPipelineUrl {
                title: pipeline.title.clone(),
            }
            .into());
        };

        if self.pipelines.contains_key(&url) {
            return Err(LogicError::DuplicatePipelineUrl { url }.into());
        }

        PipelineValidator::new().validate(&pipeline)?;
        self.pipelines.insert(url, pipeline);
        Ok(())
    }

    pub fn pipeline_by_url(&self, url: &str) -> Option<&Pipeline> {
        self.pipelines.get(url)
    }

    pub fn urls(&self) -> Vec<&str> {
        self.pipelines.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pipeline> {
        self.pipelines.values()
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

/// Read one pipeline file, compiling dialect sources
pub fn load_pipeline(path: &Path) -> PromptflowResult<Pipeline> {
    if !path.exists() {
        return Err(PromptflowError::PipelineNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|e| PromptflowError::FileReadError {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;

    let is_compiled = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(".json"));

    if is_compiled {
        Pipeline::from_json(&content)
    } else {
        compile(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn source(url: Option<&str>, output: &str) -> String {
        let url_line = url
            .map(|u| format!("- PIPELINE URL {}\n", u))
            .unwrap_or_default();
        format!(
            "# Copy {output}\n\n{url_line}- PROMPTBOOK VERSION 1.0.0\n\
             - INPUT PARAMETER {{text}}\n- OUTPUT PARAMETER {{{output}}}\n\n\
             ## Copy\n\n- SIMPLE TEMPLATE\n\n```\n{{text}}\n```\n\n-> {{{output}}}\n"
        )
    }

    #[test]
    fn test_from_sources() {
        let a = source(Some("https://example.com/a.ptbk.md"), "a");
        let b = source(Some("https://example.com/b.ptbk.md"), "b");

        let collection = PipelineCollection::from_sources([a.as_str(), b.as_str()]).unwrap();
        assert_eq!(
            collection.urls(),
            vec!["https://example.com/a.ptbk.md", "https://example.com/b.ptbk.md"]
        );
        assert_eq!(
            collection
                .pipeline_by_url("https://example.com/b.ptbk.md")
                .unwrap()
                .title,
            "Copy b"
        );
        assert!(collection.pipeline_by_url("https://example.com/c.ptbk.md").is_none());
    }

    #[test]
    fn test_rejects_missing_and_duplicate_urls() {
        let missing = source(None, "a");
        let err = PipelineCollection::from_sources([missing.as_str()]).unwrap_err();
        assert!(matches!(
            err,
            PromptflowError::Logic(LogicError::MissingPipelineUrl { .. })
        ));

        let a = source(Some("https://example.com/a.ptbk.md"), "a");
        let err = PipelineCollection::from_sources([a.as_str(), a.as_str()]).unwrap_err();
        assert!(matches!(
            err,
            PromptflowError::Logic(LogicError::DuplicatePipelineUrl { .. })
        ));
    }

    #[test]
    fn test_from_directory_and_json() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("nested");
        std::fs::create_dir_all(&nested).unwrap();

        std::fs::write(
            temp_dir.path().join("a.ptbk.md"),
            source(Some("https://example.com/a.ptbk.md"), "a"),
        )
        .unwrap();
        let compiled = compile(&source(Some("https://example.com/b.ptbk.md"), "b")).unwrap();
        std::fs::write(nested.join("b.ptbk.json"), compiled.to_json().unwrap()).unwrap();
        std::fs::write(temp_dir.path().join("notes.md"), "# Not a pipeline").unwrap();

        let collection = PipelineCollection::from_directory(temp_dir.path()).unwrap();
        assert_eq!(collection.len(), 2);

        let restored = PipelineCollection::from_json(&collection.to_json().unwrap()).unwrap();
        assert_eq!(restored.urls(), collection.urls());
        assert_eq!(
            restored.pipeline_by_url("https://example.com/b.ptbk.md"),
            Some(&compiled)
        );
    }
}

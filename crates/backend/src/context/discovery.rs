//! Document discovery against include/exclude/ignore rules.
//!
//! [`PathFilter`] is the single source of truth for "is this path a document
//! we track"; both the startup walk and the file watcher consult it.

use std::path::{Component, Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::{
  WalkBuilder,
  gitignore::{Gitignore, GitignoreBuilder},
};
use tracing::{debug, trace, warn};

use crate::domain::config::{FilesConfig, STATE_DIR};

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
  #[error("Invalid glob pattern '{pattern}': {source}")]
  Glob {
    pattern: String,
    #[source]
    source: globset::Error,
  },
  #[error("Failed to build gitignore: {0}")]
  Gitignore(#[source] ignore::Error),
  #[error("Failed to walk {root}: {source}")]
  Walk {
    root: PathBuf,
    #[source]
    source: ignore::Error,
  },
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, DiscoveryError> {
  let mut builder = GlobSetBuilder::new();
  for pattern in patterns {
    let glob = Glob::new(pattern).map_err(|source| DiscoveryError::Glob {
      pattern: pattern.clone(),
      source,
    })?;
    builder.add(glob);
  }
  builder.build().map_err(|source| DiscoveryError::Glob {
    pattern: patterns.join(", "),
    source,
  })
}

/// Build a gitignore matcher for the given root directory
fn build_gitignore(root: &Path) -> Result<Option<Gitignore>, DiscoveryError> {
  let gitignore_path = root.join(".gitignore");

  if !gitignore_path.exists() {
    debug!(root = %root.display(), "No .gitignore found, all files will be processed");
    return Ok(None);
  }

  let mut builder = GitignoreBuilder::new(root);
  if let Some(err) = builder.add(&gitignore_path) {
    warn!(error = %err, "Error parsing .gitignore, continuing with partial rules");
  }

  let gitignore = builder.build().map_err(DiscoveryError::Gitignore)?;
  Ok(Some(gitignore))
}

/// Root-relative path with `/` separators, or `None` when outside the root.
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
  let rel = path.strip_prefix(root).ok()?;
  let parts: Vec<String> = rel
    .components()
    .filter_map(|c| match c {
      Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
      _ => None,
    })
    .collect();
  (!parts.is_empty()).then(|| parts.join("/"))
}

// ============================================================================
// PathFilter
// ============================================================================

/// Decides whether a path under the root is a tracked document.
#[derive(Debug, Clone)]
pub struct PathFilter {
  root: PathBuf,
  include: GlobSet,
  exclude: GlobSet,
  gitignore: Option<Gitignore>,
}

impl PathFilter {
  pub fn new(root: &Path, files: &FilesConfig) -> Result<Self, DiscoveryError> {
    let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let gitignore = if files.ignore_gitignore {
      build_gitignore(&root)?
    } else {
      None
    };

    Ok(Self {
      include: build_globset(&files.include)?,
      exclude: build_globset(&files.exclude)?,
      gitignore,
      root,
    })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Whether a root-relative path is excluded by the glob rules.
  pub fn should_ignore(&self, rel_path: &str) -> bool {
    if rel_path == STATE_DIR || rel_path.starts_with(&format!("{STATE_DIR}/")) {
      return true;
    }
    // Hidden files and directories are never documents
    if rel_path.split('/').any(|part| part.starts_with('.')) {
      return true;
    }
    self.exclude.is_match(rel_path) || !self.include.is_match(rel_path)
  }

  fn is_gitignored(&self, path: &Path) -> bool {
    match &self.gitignore {
      Some(gitignore) => gitignore.matched_path_or_any_parents(path, false).is_ignore(),
      None => false,
    }
  }

  /// Map an absolute path to its document path if it is tracked.
  ///
  /// Existence is not checked, so deleted files still resolve.
  pub fn document_path(&self, path: &Path) -> Option<String> {
    let rel = relative_path(&self.root, path)?;
    if self.should_ignore(&rel) {
      trace!(path = %rel, "Path excluded by glob rules");
      return None;
    }
    if self.is_gitignored(path) {
      trace!(path = %rel, "Path excluded by .gitignore");
      return None;
    }
    Some(rel)
  }
}

// ============================================================================
// FileDiscovery
// ============================================================================

/// Enumerates tracked documents under the project root.
#[derive(Debug, Clone)]
pub struct FileDiscovery {
  filter: PathFilter,
  respect_gitignore: bool,
}

impl FileDiscovery {
  pub fn new(root: &Path, files: &FilesConfig) -> Result<Self, DiscoveryError> {
    Ok(Self {
      filter: PathFilter::new(root, files)?,
      respect_gitignore: files.ignore_gitignore,
    })
  }

  pub fn filter(&self) -> &PathFilter {
    &self.filter
  }

  pub fn root(&self) -> &Path {
    self.filter.root()
  }

  /// All tracked document paths, root-relative and sorted.
  pub fn find_files(&self) -> Result<Vec<String>, DiscoveryError> {
    let root = self.filter.root().to_path_buf();
    let walker = WalkBuilder::new(&root)
      .hidden(true)
      .git_ignore(self.respect_gitignore)
      .git_exclude(self.respect_gitignore)
      .git_global(false)
      .require_git(false)
      .build();

    let mut files = Vec::new();
    for entry in walker {
      let entry = entry.map_err(|source| DiscoveryError::Walk {
        root: root.clone(),
        source,
      })?;
      if !entry.file_type().is_some_and(|t| t.is_file()) {
        continue;
      }
      if let Some(rel) = self.filter.document_path(entry.path()) {
        files.push(rel);
      }
    }

    files.sort();
    debug!(root = %root.display(), count = files.len(), "Discovered documents");
    Ok(files)
  }

  /// Absolute path for a document path.
  pub fn resolve(&self, document_path: &str) -> PathBuf {
    self.filter.root().join(document_path)
  }
}

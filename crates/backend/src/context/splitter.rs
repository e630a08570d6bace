//! Markdown section splitter.
//!
//! Turns a document into an ordered, pre-order list of [`Section`]s:
//!
//! ```text
//! (document root)        depth 0, only when there is front matter
//! ├── # H1               depth 1, [1]
//! │   ├── ## H2          depth 2, [1, 1]
//! │   │   └── ### H3     depth 3, [1, 1, 1]
//! │   └── ## H2'         depth 2, [1, 2]
//! └── # H1'              depth 1, [2]
//! ```
//!
//! Headings of level 4 and deeper are not split out; their lines stay in the
//! nearest enclosing section. A section's content is its heading line, its own
//! text, and the rendered content of every child, so a parent always contains
//! its descendants. Nodes deeper than `max_depth` fold into their ancestor.

use chrono::Utc;
use tracing::{trace, warn};
use uuid::Uuid;

use super::tokens::count_tokens;
use crate::domain::{Section, config::IndexingConfig};

/// Heading used for the synthetic depth-0 section.
pub const ROOT_HEADING: &str = "(document root)";

/// Deepest heading level tracked as a node.
const TRACKED_LEVELS: u8 = 3;

#[derive(Debug, thiserror::Error)]
pub enum SplitError {
  #[error("max_depth must be between 1 and 3, got {0}")]
  InvalidDepth(u8),
}

/// Splitter settings derived from the indexing config.
#[derive(Debug, Clone)]
pub struct SplitterConfig {
  pub max_depth: u8,
  pub max_tokens_per_section: usize,
}

impl Default for SplitterConfig {
  fn default() -> Self {
    Self::from(&IndexingConfig::default())
  }
}

impl From<&IndexingConfig> for SplitterConfig {
  fn from(config: &IndexingConfig) -> Self {
    Self {
      max_depth: config.max_depth,
      max_tokens_per_section: config.max_tokens_per_section,
    }
  }
}

// ============================================================================
// Block scanning
// ============================================================================

/// A block-level unit of the source, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Block {
  Heading { level: u8, text: String, line: usize },
  Text { text: String, start: usize, end: usize },
}

/// Parse an ATX heading line, returning `(level, text)`.
fn parse_heading(line: &str) -> Option<(u8, String)> {
  let indent = line.len() - line.trim_start_matches(' ').len();
  if indent > 3 {
    return None;
  }
  let rest = &line[indent..];
  let level = rest.bytes().take_while(|b| *b == b'#').count();
  if level == 0 || level > 6 {
    return None;
  }
  let after = &rest[level..];
  if !after.is_empty() && !after.starts_with([' ', '\t']) {
    return None;
  }

  let mut text = after.trim();
  // Closing sequence: only when preceded by whitespace (or the whole text)
  let stripped = text.trim_end_matches('#');
  if stripped.len() != text.len() && (stripped.is_empty() || stripped.ends_with([' ', '\t'])) {
    text = stripped.trim_end();
  }

  Some((level as u8, text.to_string()))
}

/// Opening code fence: returns the fence char and its length.
fn parse_fence(line: &str) -> Option<(char, usize)> {
  let trimmed = line.trim_start_matches(' ');
  if line.len() - trimmed.len() > 3 {
    return None;
  }
  let ch = trimmed.chars().next()?;
  if ch != '`' && ch != '~' {
    return None;
  }
  let len = trimmed.chars().take_while(|c| *c == ch).count();
  (len >= 3).then_some((ch, len))
}

fn closes_fence(line: &str, fence: (char, usize)) -> bool {
  let trimmed = line.trim();
  let len = trimmed.chars().take_while(|c| *c == fence.0).count();
  len >= fence.1 && trimmed.chars().all(|c| c == fence.0)
}

fn flush(buffer: &mut Vec<&str>, start: usize, blocks: &mut Vec<Block>) {
  if buffer.is_empty() {
    return;
  }
  let end = start + buffer.len() - 1;
  let text = buffer.join("\n");
  if !text.trim().is_empty() {
    blocks.push(Block::Text { text, start, end });
  }
  buffer.clear();
}

fn scan_blocks(content: &str) -> Vec<Block> {
  let mut blocks = Vec::new();
  let mut buffer: Vec<&str> = Vec::new();
  let mut buffer_start = 0;
  let mut fence: Option<(char, usize)> = None;

  for (idx, line) in content.lines().enumerate() {
    let line_no = idx + 1;

    if let Some(open) = fence {
      buffer.push(line);
      if closes_fence(line, open) {
        fence = None;
        flush(&mut buffer, buffer_start, &mut blocks);
      }
      continue;
    }

    if let Some(open) = parse_fence(line) {
      flush(&mut buffer, buffer_start, &mut blocks);
      fence = Some(open);
      buffer_start = line_no;
      buffer.push(line);
      continue;
    }

    if line.trim().is_empty() {
      flush(&mut buffer, buffer_start, &mut blocks);
      continue;
    }

    if let Some((level, text)) = parse_heading(line) {
      flush(&mut buffer, buffer_start, &mut blocks);
      if level <= TRACKED_LEVELS {
        blocks.push(Block::Heading {
          level,
          text,
          line: line_no,
        });
      } else {
        blocks.push(Block::Text {
          text: line.trim_end().to_string(),
          start: line_no,
          end: line_no,
        });
      }
      continue;
    }

    if buffer.is_empty() {
      buffer_start = line_no;
    }
    buffer.push(line);
  }

  // An unterminated fence runs to the end of the document
  flush(&mut buffer, buffer_start, &mut blocks);
  blocks
}

// ============================================================================
// Node arena
// ============================================================================

#[derive(Debug)]
struct Node {
  /// `None` for the root
  heading: Option<String>,
  /// Heading level; 0 for the root
  level: u8,
  parent: Option<usize>,
  children: Vec<usize>,
  paragraphs: Vec<String>,
  start_line: usize,
  end_line: usize,
}

impl Node {
  fn new(heading: Option<String>, level: u8, parent: Option<usize>, line: usize) -> Self {
    Self {
      heading,
      level,
      parent,
      children: Vec::new(),
      paragraphs: Vec::new(),
      start_line: line,
      end_line: line,
    }
  }
}

const ROOT: usize = 0;

#[derive(Debug)]
struct Outline {
  nodes: Vec<Node>,
}

impl Outline {
  fn build(blocks: Vec<Block>) -> Self {
    let mut outline = Self {
      nodes: vec![Node::new(None, 0, None, 1)],
    };
    // Open nodes for heading levels 1..=3
    let mut open: [Option<usize>; TRACKED_LEVELS as usize] = [None; TRACKED_LEVELS as usize];

    for block in blocks {
      match block {
        Block::Heading { level, text, line } => {
          let parent = open[..(level - 1) as usize]
            .iter()
            .rev()
            .find_map(|n| *n)
            .unwrap_or(ROOT);
          let id = outline.push(Node::new(Some(text), level, Some(parent), line));
          open[(level - 1) as usize] = Some(id);
          for deeper in open.iter_mut().skip(level as usize) {
            *deeper = None;
          }
          outline.extend_span(parent, line);
        }
        Block::Text { text, start, end } => {
          let target = open.iter().rev().find_map(|n| *n).unwrap_or(ROOT);
          if target == ROOT && outline.nodes[ROOT].paragraphs.is_empty() {
            outline.nodes[ROOT].start_line = start;
          }
          outline.nodes[target].paragraphs.push(text);
          outline.extend_span(target, end);
        }
      }
    }

    outline
  }

  fn push(&mut self, node: Node) -> usize {
    let id = self.nodes.len();
    if let Some(parent) = node.parent {
      self.nodes[parent].children.push(id);
    }
    self.nodes.push(node);
    id
  }

  /// Extend `end_line` of a node and all of its ancestors.
  fn extend_span(&mut self, mut id: usize, line: usize) {
    loop {
      let node = &mut self.nodes[id];
      node.end_line = node.end_line.max(line);
      match node.parent {
        Some(parent) => id = parent,
        None => break,
      }
    }
  }

  fn is_empty(&self) -> bool {
    self.nodes.len() == 1 && self.nodes[ROOT].paragraphs.is_empty()
  }

  /// Heading line, own text, then every child, separated by blank lines.
  fn render(&self, id: usize) -> String {
    let node = &self.nodes[id];
    let mut parts: Vec<String> = Vec::with_capacity(1 + node.paragraphs.len() + node.children.len());
    if let Some(heading) = &node.heading {
      parts.push(format!("{} {}", "#".repeat(node.level.max(1) as usize), heading));
    }
    parts.extend(node.paragraphs.iter().cloned());
    parts.extend(node.children.iter().map(|child| self.render(*child)));
    parts.join("\n\n").trim().to_string()
  }
}

// ============================================================================
// Splitter
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct MarkdownSplitter {
  config: SplitterConfig,
}

struct Emit<'a> {
  document_path: &'a str,
  document_hash: &'a str,
  now: chrono::DateTime<Utc>,
}

impl MarkdownSplitter {
  pub fn new(config: SplitterConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &SplitterConfig {
    &self.config
  }

  /// Split a document into sections (without vectors).
  ///
  /// Empty or whitespace-only input yields no sections.
  pub fn split(&self, content: &str, document_path: &str, document_hash: &str) -> Result<Vec<Section>, SplitError> {
    if self.config.max_depth == 0 || self.config.max_depth > TRACKED_LEVELS {
      return Err(SplitError::InvalidDepth(self.config.max_depth));
    }

    let outline = Outline::build(scan_blocks(content));
    if outline.is_empty() {
      return Ok(Vec::new());
    }

    let emit = Emit {
      document_path,
      document_hash,
      now: Utc::now(),
    };
    let mut sections = Vec::new();

    // The root is materialized only when it carries front matter
    if outline.nodes[ROOT].paragraphs.is_empty() {
      self.emit_children(&outline, ROOT, None, &[], &emit, &mut sections);
    } else {
      self.emit_node(&outline, ROOT, None, 0, Vec::new(), &emit, &mut sections);
    }

    trace!(
      path = document_path,
      sections = sections.len(),
      "Split document into sections"
    );
    Ok(sections)
  }

  fn emit_children(
    &self,
    outline: &Outline,
    id: usize,
    parent_id: Option<&str>,
    number: &[u32],
    emit: &Emit<'_>,
    out: &mut Vec<Section>,
  ) {
    for (order, child) in outline.nodes[id].children.iter().enumerate() {
      let mut child_number = number.to_vec();
      child_number.push(order as u32 + 1);
      self.emit_node(outline, *child, parent_id, order, child_number, emit, out);
    }
  }

  #[allow(clippy::too_many_arguments)]
  fn emit_node(
    &self,
    outline: &Outline,
    id: usize,
    parent_id: Option<&str>,
    order: usize,
    number: Vec<u32>,
    emit: &Emit<'_>,
    out: &mut Vec<Section>,
  ) {
    let node = &outline.nodes[id];
    let content = outline.render(id);
    let token_count = count_tokens(&content);
    let heading = node.heading.clone().unwrap_or_else(|| ROOT_HEADING.to_string());

    if token_count > self.config.max_tokens_per_section {
      warn!(
        path = emit.document_path,
        heading = %heading,
        tokens = token_count,
        max = self.config.max_tokens_per_section,
        "Section exceeds max_tokens_per_section"
      );
    }

    let section_id = Uuid::new_v4().to_string();
    out.push(Section {
      id: section_id.clone(),
      document_path: emit.document_path.to_string(),
      heading,
      depth: node.level.min(self.config.max_depth),
      content,
      token_count,
      vector: None,
      parent_id: parent_id.map(str::to_string),
      order,
      is_dirty: false,
      document_hash: emit.document_hash.to_string(),
      created_at: emit.now,
      updated_at: emit.now,
      summary: None,
      document_summary: None,
      start_line: node.start_line,
      end_line: node.end_line,
      section_number: number.clone(),
    });

    if node.level < self.config.max_depth {
      self.emit_children(outline, id, Some(&section_id), &number, emit, out);
    }
  }
}

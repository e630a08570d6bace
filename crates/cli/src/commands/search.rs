//! Search command

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use searchdocs::domain::{DepthFilter, IndexStatus, IndexStatusFilter, SearchOptions, SortBy};

use super::open_app;

/// Number of content lines shown per result
const PREVIEW_LINES: usize = 3;

#[derive(Args)]
pub struct SearchArgs {
  /// Search query
  query: String,
  #[arg(short, long)]
  limit: Option<usize>,
  /// Project root (default: current directory)
  #[arg(short, long)]
  root: Option<PathBuf>,
  /// Restrict to section depths (0 = whole document), e.g. `--depth 1,2`
  #[arg(long, value_delimiter = ',')]
  depth: Vec<u8>,
  /// Results to skip before the first one shown
  #[arg(long, default_value_t = 0)]
  offset: usize,
  /// Ordering of results: score, depth or path
  #[arg(long, default_value = "score")]
  sort_by: SortBy,
  /// Only return sections whose document is indexed at its current version
  #[arg(long, conflicts_with = "completed_only")]
  latest_only: bool,
  /// Skip sections whose document still has indexing in flight
  #[arg(long)]
  completed_only: bool,
  /// Skip sections flagged for re-embedding
  #[arg(long)]
  clean_only: bool,
  /// Document paths to leave out
  #[arg(long)]
  exclude: Vec<String>,
  /// Output as JSON
  #[arg(long)]
  json: bool,
}

impl SearchArgs {
  fn options(&self) -> SearchOptions {
    let depth = match self.depth.as_slice() {
      [] => None,
      [single] => Some(DepthFilter::One(*single)),
      many => Some(DepthFilter::Many(many.to_vec())),
    };
    SearchOptions {
      query: self.query.clone(),
      limit: self.limit,
      depth,
      include_clean_only: self.clean_only.then_some(true),
      exclude_paths: self.exclude.clone(),
      index_status: if self.latest_only {
        IndexStatusFilter::LatestOnly
      } else if self.completed_only {
        IndexStatusFilter::CompletedOnly
      } else {
        IndexStatusFilter::All
      },
      offset: self.offset,
      sort_by: self.sort_by,
    }
  }
}

fn status_marker(status: IndexStatus) -> &'static str {
  match status {
    IndexStatus::Latest => "",
    IndexStatus::Updating => " [updating]",
    IndexStatus::Outdated => " [outdated]",
  }
}

/// Search indexed sections
pub async fn cmd_search(args: SearchArgs) -> Result<()> {
  let options = args.options();
  let app = open_app(args.root.clone()).await?;
  let result = app.search().search(options).await.context("Search failed");
  app.close().await;
  let response = result?;

  if args.json {
    println!("{}", serde_json::to_string_pretty(&response)?);
    return Ok(());
  }

  if response.results.is_empty() {
    println!("No sections found for: {}", args.query);
    return Ok(());
  }

  println!("Found {} sections ({} ms):\n", response.total, response.took);
  for (i, hit) in response.results.iter().enumerate() {
    println!(
      "{}. {}:{}-{} {}{}",
      args.offset + i + 1,
      hit.document_path,
      hit.start_line,
      hit.end_line,
      hit.heading,
      status_marker(hit.index_status)
    );
    println!("   distance: {:.4}", hit.score);
    for line in hit.content.lines().filter(|l| !l.trim().is_empty()).take(PREVIEW_LINES) {
      println!("   {}", line);
    }
    println!();
  }

  Ok(())
}

//! Index and status commands

use std::path::PathBuf;

use anyhow::{Context, Result};

use super::open_app;

/// Force-index all documents, or only `paths`
pub async fn cmd_index(root: Option<PathBuf>, paths: Vec<String>) -> Result<()> {
  let app = open_app(root).await?;

  let result = async {
    let targets = paths
      .iter()
      .map(|p| app.sync().document_path(p))
      .collect::<Result<Vec<_>, _>>()
      .context("Invalid document path")?;
    app.sync().rebuild_index(Some(targets)).await.context("Failed to rebuild index")
  }
  .await;
  app.close().await;

  let report = result?;
  println!(
    "Indexed {} documents ({} sections)",
    report.documents_processed, report.sections_created
  );
  if report.failed > 0 {
    println!("{} documents failed, see logs for details", report.failed);
  }
  Ok(())
}

/// Print index statistics and request queue counts
pub async fn cmd_status(root: Option<PathBuf>, json_output: bool) -> Result<()> {
  let app = open_app(root).await?;
  let result = app.status().await.context("Failed to get status");
  app.close().await;
  let status = result?;

  if json_output {
    println!("{}", serde_json::to_string_pretty(&status)?);
    return Ok(());
  }

  println!("searchdocs Status");
  println!("=================\n");

  println!("--- Index ---");
  println!("Documents:      {}", status.index.total_documents);
  println!("Sections:       {}", status.index.total_sections);
  println!("Dirty:          {}", status.index.dirty_count);

  println!("\n--- Requests ---");
  println!("Pending:        {}", status.requests.pending);
  println!("Processing:     {}", status.requests.processing);
  println!("Failed:         {}", status.requests.failed);

  println!("\n--- Process ---");
  println!("Version:        {}", status.server.version);
  println!("PID:            {}", status.server.pid);
  println!("Syncing:        {}", if status.worker.syncing { "yes" } else { "no" });

  Ok(())
}

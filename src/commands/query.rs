use anyhow::{bail, Result};
use futures::StreamExt;
use power_logger::{
    config,
    store::{LogStore, QueryOutcome, TimeRange},
};
use std::io::Write;
use std::path::Path;

/// Execute the query command
///
/// Streams the rows of `[from, until)` to stdout as one JSON array.
pub async fn execute(config_path: &Path, from: i64, until: i64, chunk_size: Option<usize>) -> Result<()> {
    let cfg = config::load_config(config_path)?;
    let store = LogStore::new(&cfg.store);
    if !store.recover().await {
        bail!("Log file {} is not accessible", cfg.store.path.display());
    }

    let chunk_size = chunk_size.unwrap_or(cfg.query.chunk_size);
    match store.query(TimeRange::new(from, until)).await? {
        QueryOutcome::Empty => println!("[]"),
        QueryOutcome::Streaming(cursor) => {
            let mut chunks = Box::pin(cursor.into_stream(chunk_size));
            while let Some(chunk) = chunks.next().await {
                std::io::stdout().write_all(&chunk?)?;
            }
            println!();
        }
    }

    Ok(())
}

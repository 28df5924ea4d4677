use crate::output::print_json;
use anyhow::{anyhow, Context};
use pacer_core::config::Config;
use pacer_core::words::remote::RemoteWordList;
use std::path::Path;

/// Fetch the remote word list once and print it.
pub fn run(root: &Path, from: Option<&str>, json: bool) -> anyhow::Result<()> {
    let config = Config::load_or_default(root).context("failed to load config")?;
    let url = from
        .map(str::to_string)
        .or_else(|| config.words.url.clone())
        .ok_or_else(|| anyhow!("no word list URL: set words.url or pass --from"))?;

    let remote = RemoteWordList::new(url.clone(), config.words.timeout());
    let rt = tokio::runtime::Runtime::new()?;
    let words = rt
        .block_on(remote.fetch())
        .with_context(|| format!("failed to fetch {url}"))?;

    if json {
        print_json(&serde_json::json!({
            "source_url": url,
            "count": words.len(),
            "words": words.as_slice(),
        }))?;
    } else {
        println!("{} words from {url}", words.len());
        for word in words.as_slice() {
            println!("  {word}");
        }
    }
    Ok(())
}

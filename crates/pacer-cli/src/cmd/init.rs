use anyhow::Context;
use pacer_core::{config::Config, io, paths};
use std::path::Path;

pub fn run(root: &Path) -> anyhow::Result<()> {
    println!("Initializing pacer in: {}", root.display());

    let dir = paths::pacer_dir(root);
    std::fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

    if paths::config_path(root).exists() {
        println!("  exists:  {}", paths::CONFIG_FILE);
    } else {
        Config::default()
            .save(root)
            .context("failed to write config.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
    }

    if io::ensure_gitignore_entry(root, paths::STATE_DB_FILE)
        .context("failed to update .gitignore")?
    {
        println!("  updated: .gitignore");
    }

    println!("\nNext: pacer run");
    Ok(())
}

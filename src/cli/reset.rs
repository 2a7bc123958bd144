//! CLI `reset-index` command: drop the similarity index after confirmation.

use anyhow::{bail, Result};
use std::io::Write;

use crate::knowledge::KnowledgeBase;

/// Empty the index and delete its snapshot. Notes are kept.
pub fn reset_index(kb: &KnowledgeBase, yes: bool) -> Result<()> {
    if !yes {
        println!("This drops the semantic index and deletes its snapshot. Notes are kept.");
        if let Some(path) = kb.index().snapshot_path() {
            println!("Snapshot: {}", path.display());
        }
        print!("\nType YES to confirm: ");
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if input.trim() != "YES" {
            bail!("reset cancelled");
        }
    }

    kb.reset_index();

    println!("Index reset. Run `noesis consolidate` to rebuild it.");
    Ok(())
}

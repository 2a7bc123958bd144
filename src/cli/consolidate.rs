use anyhow::{bail, Result};

use crate::evolution::ConsolidationOutcome;
use crate::knowledge::KnowledgeBase;

/// Rebuild the similarity index from every stored note.
pub async fn consolidate(kb: &KnowledgeBase) -> Result<()> {
    match kb.consolidate().await {
        ConsolidationOutcome::Rebuilt { notes, indexed } => {
            println!("Index rebuilt: {indexed} of {notes} note(s) indexed.");
            Ok(())
        }
        ConsolidationOutcome::Disabled => {
            bail!("no embedding provider available; check [embedding] in config.toml")
        }
        ConsolidationOutcome::Failed => bail!("consolidation failed; the previous index is unchanged"),
    }
}

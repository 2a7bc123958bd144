//! CLI `inspect` command: display a note with its backlinks.

use anyhow::{bail, Result};

use crate::knowledge::KnowledgeBase;

pub async fn inspect(kb: &KnowledgeBase, id: &str) -> Result<()> {
    let Some(details) = kb.inspect(id).await? else {
        bail!("note not found: {id}");
    };

    let n = &details.note;
    println!("Note: {}", n.title);
    println!("{}", "=".repeat(50));
    println!("  ID:             {}", n.id);
    if let Some(ref vault) = n.vault_id {
        println!("  Vault:          {vault}");
    }
    println!("  Context:        {}", n.context);
    println!("  Importance:     {:.2}", n.importance_score);
    println!("  Retrievals:     {}", n.retrieval_count);
    println!("  Tags:           {}", n.tags.join(", "));
    println!("  Keywords:       {}", n.keywords.join(", "));
    println!("  Created:        {}", n.created_at);
    println!("  Updated:        {}", n.updated_at);
    println!();
    println!("Content:");
    println!("  {}", n.content);

    if !n.links.is_empty() {
        println!();
        println!("Links:");
        for link in &n.links {
            println!("  -> {link}");
        }
    }
    if !details.backlinks.is_empty() {
        println!();
        println!("Backlinks:");
        for bl in &details.backlinks {
            println!("  <- {} ({})", bl.title, bl.id);
        }
    }

    Ok(())
}

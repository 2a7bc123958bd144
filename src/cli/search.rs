use anyhow::Result;

use crate::knowledge::KnowledgeBase;
use crate::search::{SearchMode, SearchRequest};

/// Run a search from the terminal.
pub async fn search(kb: &KnowledgeBase, query: &str, mode: SearchMode, limit: usize) -> Result<()> {
    let results = kb
        .search(SearchRequest {
            query: query.to_string(),
            mode,
            limit,
            vault_id: None,
        })
        .await?;

    if results.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    println!("Found {} result(s) ({mode} search)\n", results.len());

    for (i, result) in results.iter().enumerate() {
        let preview: String = result.note.content.chars().take(120).collect();
        let ellipsis = if result.note.content.chars().count() > 120 { "..." } else { "" };

        println!(
            "  {}. {} [{:?}] (score: {:.3}) {}",
            i + 1,
            result.note.title,
            result.match_kind,
            result.score,
            result.note.id,
        );
        println!("     {preview}{ellipsis}");
        println!();
    }

    Ok(())
}

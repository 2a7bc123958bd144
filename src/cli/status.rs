use anyhow::Result;

use crate::knowledge::KnowledgeBase;

/// Display capability and index state in the terminal.
pub fn status(kb: &KnowledgeBase) -> Result<()> {
    let status = kb.status()?;

    println!("Noesis Status");
    println!("{}", "=".repeat(40));
    println!("  Database:            {}", kb.config().resolved_db_path().display());
    println!(
        "  Embedding model:     {}",
        status.embedding_model.as_deref().unwrap_or("(unavailable)")
    );
    println!(
        "  Completion model:    {}",
        status.completion_model.as_deref().unwrap_or("(unavailable)")
    );
    println!(
        "  Memory evolution:    {}",
        if status.ai_enabled { "enabled" } else { "disabled" }
    );
    println!();
    println!("  Notes:               {}", status.note_count);
    println!("  Indexed documents:   {}", status.indexed_documents);
    println!("  Index generation:    {}", status.index_generation);
    println!(
        "  Until consolidation: {} of {}",
        status.notes_since_consolidation, status.consolidation_threshold
    );
    if status.indexed_documents < status.note_count && status.embedding_model.is_some() {
        println!();
        println!("  Index is behind the store. Run `noesis consolidate` to rebuild it.");
    }

    Ok(())
}

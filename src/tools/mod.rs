pub mod consolidate;
pub mod create_note;
pub mod evolution_status;
pub mod note_inspect;
pub mod search_notes;

use consolidate::ConsolidateParams;
use create_note::CreateNoteParams;
use evolution_status::EvolutionStatusParams;
use note_inspect::NoteInspectParams;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use search_notes::SearchNotesParams;
use serde::Serialize;

use crate::knowledge::{KnowledgeBase, NoteDraft};
use crate::search::{SearchMode, SearchRequest};

/// The Noesis MCP tool handler. Wraps a shared [`KnowledgeBase`] and exposes
/// it via the `#[tool_router]` macro.
#[derive(Clone)]
pub struct NoesisTools {
    tool_router: ToolRouter<Self>,
    kb: KnowledgeBase,
}

#[tool_router]
impl NoesisTools {
    pub fn new(kb: KnowledgeBase) -> Self {
        Self {
            tool_router: Self::tool_router(),
            kb,
        }
    }

    /// Create a note and evolve its neighbours.
    #[tool(description = "Create a note. [[Title]] markers become links. When AI is enabled the note is enriched with keywords, context, tags and importance, and related notes gain links, tags, and context updates.")]
    async fn create_note(
        &self,
        Parameters(params): Parameters<CreateNoteParams>,
    ) -> Result<String, String> {
        tracing::info!(
            title = %params.title,
            content_len = params.content.len(),
            "create_note called"
        );

        let draft = NoteDraft {
            title: params.title,
            content: params.content,
            vault_id: params.vault_id,
            tags: params.tags.unwrap_or_default(),
            keywords: params.keywords.unwrap_or_default(),
            context: params.context,
            importance_score: params.importance_score,
        };
        let created = self
            .kb
            .create_note(draft)
            .await
            .map_err(|e| format!("create failed: {e}"))?;

        to_json(&created)
    }

    /// Search notes by text, similarity, or both.
    #[tool(description = "Search notes. Modes: text (title/content substring), semantic (embedding similarity), hybrid (both, scores summed). Defaults to hybrid.")]
    async fn search_notes(
        &self,
        Parameters(params): Parameters<SearchNotesParams>,
    ) -> Result<String, String> {
        let mode = match params.mode.as_deref() {
            Some(m) => m.parse::<SearchMode>()?,
            None => SearchMode::default(),
        };
        let limit = params
            .limit
            .unwrap_or(self.kb.config().retrieval.default_limit);
        if limit == 0 {
            return Err("limit must be at least 1".into());
        }

        tracing::info!(query = %params.query, mode = %mode, limit, "search_notes called");

        let results = self
            .kb
            .search(SearchRequest {
                query: params.query,
                mode,
                limit,
                vault_id: params.vault_id,
            })
            .await
            .map_err(|e| format!("search failed: {e}"))?;

        to_json(&serde_json::json!({
            "results": results,
            "total": results.len(),
        }))
    }

    /// Inspect a note by ID.
    #[tool(description = "Inspect a note by ID. Returns the full note and its backlinks (notes whose content contains [[Title]]).")]
    async fn note_inspect(
        &self,
        Parameters(params): Parameters<NoteInspectParams>,
    ) -> Result<String, String> {
        tracing::info!(id = %params.id, "note_inspect called");

        match self
            .kb
            .inspect(&params.id)
            .await
            .map_err(|e| format!("inspect failed: {e}"))?
        {
            Some(details) => to_json(&details),
            None => Err(format!("note not found: {}", params.id)),
        }
    }

    /// Rebuild the similarity index from every note.
    #[tool(description = "Rebuild the semantic index from all notes and reset the evolution counter. Requires confirm=true.")]
    async fn consolidate_knowledge_base(
        &self,
        Parameters(params): Parameters<ConsolidateParams>,
    ) -> Result<String, String> {
        if !params.confirm {
            return Err("set confirm=true to rebuild the index".into());
        }
        tracing::info!("consolidate_knowledge_base called");
        to_json(&self.kb.consolidate().await)
    }

    /// Report capability and index state.
    #[tool(description = "Report whether AI evolution is enabled, index size and generation, and progress toward the next consolidation.")]
    async fn evolution_status(
        &self,
        Parameters(_params): Parameters<EvolutionStatusParams>,
    ) -> Result<String, String> {
        let kb = self.kb.clone();
        let status = tokio::task::spawn_blocking(move || kb.status())
            .await
            .map_err(|e| format!("status task failed: {e}"))?
            .map_err(|e| format!("status failed: {e}"))?;
        to_json(&status)
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| format!("serialization failed: {e}"))
}

#[tool_handler]
impl ServerHandler for NoesisTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "Noesis is a personal knowledge base. Use create_note to add notes, \
                 search_notes to find them, and note_inspect to read one with its backlinks."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}

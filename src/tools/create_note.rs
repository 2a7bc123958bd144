use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CreateNoteParams {
    #[schemars(description = "Note title. Other notes link to it with [[Title]].")]
    pub title: String,

    #[schemars(description = "Note body. [[Title]] markers become links.")]
    pub content: String,

    #[schemars(description = "Optional vault (namespace) the note belongs to")]
    pub vault_id: Option<String>,

    #[schemars(description = "Tags to attach. AI-suggested tags are merged in when enabled.")]
    pub tags: Option<Vec<String>>,

    #[schemars(description = "Keywords to attach. AI-extracted keywords are merged in when enabled.")]
    pub keywords: Option<Vec<String>>,

    #[schemars(description = "One-line context. Defaults to the AI summary, or 'General'.")]
    pub context: Option<String>,

    #[schemars(description = "Importance 0.0-2.0. Defaults to the AI score, or 1.0.")]
    pub importance_score: Option<f64>,
}

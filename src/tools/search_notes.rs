use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SearchNotesParams {
    #[schemars(description = "Search query")]
    pub query: String,

    #[schemars(description = "Search mode: 'text', 'semantic', or 'hybrid' (default)")]
    pub mode: Option<String>,

    #[schemars(description = "Maximum number of results")]
    pub limit: Option<usize>,

    #[schemars(description = "Only return notes from this vault")]
    pub vault_id: Option<String>,
}

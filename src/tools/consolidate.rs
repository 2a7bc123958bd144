use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ConsolidateParams {
    #[schemars(description = "Must be true. Rebuilding re-embeds every note.")]
    pub confirm: bool,
}

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct NoteInspectParams {
    #[schemars(description = "ID of the note to inspect")]
    pub id: String,
}

//! MCP `evolution_status` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The tool takes no arguments.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct EvolutionStatusParams {}

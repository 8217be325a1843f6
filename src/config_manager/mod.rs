pub mod agent;
pub mod tools;
pub mod utils;

pub use agent::{AgentConfiguration, KnowledgeDocument, SynthesisModel};
pub use tools::{ToolDefinition, ToolDraft, ToolKind};
pub use utils::ExportFormat;

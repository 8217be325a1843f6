pub mod interface;
pub mod supabase;

pub use interface::{
    CloudError, CloudStore, CloudUser, ConversationRecord, SavedAgentRecord, SignUpOutcome, UsageMetric,
    UserAnalytics,
};
pub use supabase::SupabaseClient;

pub mod client;
pub mod error;
pub mod factory;
pub mod interface;
pub mod types;

pub use client::ElevenLabsClient;
pub use error::ApiError;
pub use factory::ElevenLabsFactory;
pub use interface::{VoiceApi, VoiceApiFactory};

mod traits;
mod ollama;
mod openai;
mod registry;

pub use traits::*;
pub use ollama::OllamaProvider;
pub use openai::OpenAIProvider;
pub use registry::{build_chat_provider, ProviderRegistry};

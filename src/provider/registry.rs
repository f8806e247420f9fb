use std::collections::HashMap;
use std::sync::Arc;

use crate::config::OuroborosConfig;
use crate::types::ProviderKind;

use super::ollama::OllamaProvider;
use super::openai::OpenAIProvider;
use super::traits::ChatProvider;

/// Registry of available chat providers
pub struct ProviderRegistry {
    providers: HashMap<ProviderKind, Arc<dyn ChatProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    pub fn register(&mut self, provider: Arc<dyn ChatProvider>) {
        self.providers.insert(provider.kind(), provider);
    }

    pub fn get(&self, kind: &ProviderKind) -> Option<Arc<dyn ChatProvider>> {
        self.providers.get(kind).cloned()
    }

    pub fn has(&self, kind: &ProviderKind) -> bool {
        self.providers.contains_key(kind)
    }

    pub fn providers(&self) -> Vec<ProviderKind> {
        self.providers.keys().cloned().collect()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the chat provider named by the configuration.
///
/// Custom providers are assumed to speak the OpenAI-compatible protocol.
pub fn build_chat_provider(config: &OuroborosConfig) -> Arc<dyn ChatProvider> {
    let endpoint = config.chat_endpoint();
    let key = config.api_key.clone();
    match &config.provider {
        ProviderKind::Ollama => Arc::new(OllamaProvider::with_endpoint(endpoint, key)),
        ProviderKind::OpenAI => Arc::new(OpenAIProvider::with_base_url(endpoint, key)),
        ProviderKind::DeepSeek => Arc::new(
            OpenAIProvider::with_base_url(endpoint, key).with_kind(ProviderKind::DeepSeek),
        ),
        ProviderKind::Custom(name) => Arc::new(
            OpenAIProvider::with_base_url(endpoint, key)
                .with_kind(ProviderKind::Custom(name.clone())),
        ),
    }
}

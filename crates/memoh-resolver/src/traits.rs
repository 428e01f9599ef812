use async_trait::async_trait;
use memoh_core::error::Result;
use memoh_core::Modality;

use crate::gateway_types::UsableSkill;

/// A model as configured by the operator: which client type serves it, what
/// modalities it accepts natively, and the credentials/base URL the gateway
/// needs to reach its provider. Resolution of `ModelID`/`Provider` against
/// this catalog is explicitly out of scope (§1) — this is the seam.
#[derive(Debug, Clone)]
pub struct ResolvedModel {
    pub model_id: String,
    pub client_type: String,
    pub input_modalities: Vec<Modality>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

#[async_trait]
pub trait ModelCatalog: Send + Sync {
    /// Resolves `(model, provider)` overrides against configured bot/chat
    /// defaults. Returns `FailValidation` if no chat-type model is
    /// configured, or if `provider` doesn't match the resolved model's
    /// client type.
    async fn resolve(&self, model: Option<&str>, provider: Option<&str>) -> Result<ResolvedModel>;
}

#[derive(Debug, Clone, Default)]
pub struct BotSettings {
    pub chat_model_id: Option<String>,
    pub max_context_load_time: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct ChatSettings {
    pub model_id: Option<String>,
    pub max_context_load_time: Option<i64>,
}

#[async_trait]
pub trait SettingsProvider: Send + Sync {
    async fn bot_settings(&self, bot_id: &str) -> Result<BotSettings>;
    async fn chat_settings(&self, bot_id: &str, chat_id: &str) -> Result<ChatSettings>;
}

#[async_trait]
pub trait SkillLoader: Send + Sync {
    /// Loads and normalizes skills by name, substituting fallbacks for
    /// empty description/content (§4.4 step 9).
    async fn load(&self, names: &[String]) -> Result<Vec<UsableSkill>>;
}

/// Minimal in-process implementations used by tests and by the gateway
/// binary until an operator wires real ones. Each bot/chat resolves to a
/// single configured model; skills are loaded as empty-content placeholders.
pub mod fixed {
    use super::*;
    use std::collections::HashMap;

    pub struct FixedModelCatalog {
        pub default: ResolvedModel,
    }

    #[async_trait]
    impl ModelCatalog for FixedModelCatalog {
        async fn resolve(&self, model: Option<&str>, provider: Option<&str>) -> Result<ResolvedModel> {
            let mut resolved = self.default.clone();
            if let Some(m) = model {
                resolved.model_id = m.to_string();
            }
            if let Some(p) = provider {
                if p != resolved.client_type {
                    return Err(memoh_core::error::MemohError::Validation(format!(
                        "model {} does not belong to provider {p}",
                        resolved.model_id
                    )));
                }
            }
            Ok(resolved)
        }
    }

    #[derive(Default)]
    pub struct NoopSettingsProvider;

    #[async_trait]
    impl SettingsProvider for NoopSettingsProvider {
        async fn bot_settings(&self, _bot_id: &str) -> Result<BotSettings> {
            Ok(BotSettings::default())
        }
        async fn chat_settings(&self, _bot_id: &str, _chat_id: &str) -> Result<ChatSettings> {
            Ok(ChatSettings::default())
        }
    }

    #[derive(Default)]
    pub struct StaticSkillLoader {
        pub skills: HashMap<String, UsableSkill>,
    }

    #[async_trait]
    impl SkillLoader for StaticSkillLoader {
        async fn load(&self, names: &[String]) -> Result<Vec<UsableSkill>> {
            Ok(names
                .iter()
                .map(|name| {
                    self.skills.get(name).cloned().unwrap_or_else(|| UsableSkill {
                        name: name.clone(),
                        description: format!("Skill '{name}'"),
                        content: String::new(),
                        metadata: None,
                    })
                })
                .collect())
        }
    }
}

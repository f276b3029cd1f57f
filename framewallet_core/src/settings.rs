use crate::error::CoreError;
use serde::{Deserialize, Serialize};

/// Local/remote name pair identifying one physical postMessage channel.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ChannelNames {
    /// Name this frame listens on.
    pub local: String,
    /// Name the embedder listens on.
    pub remote: String,
}

impl ChannelNames {
    pub fn new(local: impl Into<String>, remote: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            remote: remote.into(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct BridgeSettings {
    #[serde(default = "default_provider_channel")]
    pub provider_channel: ChannelNames,
    #[serde(default = "default_comm_channel")]
    pub comm_channel: ChannelNames,
    /// Target origin for outbound postMessage calls
    #[serde(default = "default_target_origin")]
    pub target_origin: String,
    /// Element clicked when the embedder triggers an OAuth login
    #[serde(default = "default_oauth_button_id")]
    pub oauth_button_id: String,
    #[serde(default = "default_preference_prefix")]
    pub preference_prefix: String,
    #[serde(default = "default_theme")]
    pub default_theme: String,
}

fn default_provider_channel() -> ChannelNames {
    ChannelNames::new("iframe_provider", "embed_provider")
}
fn default_comm_channel() -> ChannelNames {
    ChannelNames::new("iframe_comm", "embed_comm")
}
fn default_target_origin() -> String {
    "*".to_string()
}
fn default_oauth_button_id() -> String {
    "oauth-login".to_string()
}
fn default_preference_prefix() -> String {
    "framewallet_".to_string()
}
fn default_theme() -> String {
    "light".to_string()
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            provider_channel: default_provider_channel(),
            comm_channel: default_comm_channel(),
            target_origin: default_target_origin(),
            oauth_button_id: default_oauth_button_id(),
            preference_prefix: default_preference_prefix(),
            default_theme: default_theme(),
        }
    }
}

impl BridgeSettings {
    #[cfg(feature = "native")]
    pub fn from_file(path: &str) -> Result<Self, CoreError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name(path));
        let cfg = builder.build()?;
        let settings: Self = cfg.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    #[cfg(feature = "native")]
    pub fn save_to_file(&self, path: &str) -> Result<(), CoreError> {
        let toml_string = toml::to_string(self)?;
        std::fs::write(path, toml_string)?;
        Ok(())
    }

    /// Parse settings handed over as JSON (the browser binding's path).
    /// Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        let settings: Self = if json.trim().is_empty() {
            Self::default()
        } else {
            serde_json::from_str(json)?
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Validate channel naming constraints
    pub fn validate(&self) -> Result<(), CoreError> {
        for (label, names) in [("provider_channel", &self.provider_channel), ("comm_channel", &self.comm_channel)] {
            if names.local.is_empty() || names.remote.is_empty() {
                return Err(CoreError::Validation(format!("{} names must not be empty", label)));
            }
            if names.local == names.remote {
                return Err(CoreError::Validation(format!("{} local and remote names must differ", label)));
            }
        }
        if self.provider_channel.local == self.comm_channel.local
            || self.provider_channel.remote == self.comm_channel.remote
        {
            return Err(CoreError::Validation(
                "provider_channel and comm_channel must use distinct names".to_string(),
            ));
        }
        if self.target_origin.is_empty() {
            return Err(CoreError::Validation("target_origin must not be empty".to_string()));
        }
        Ok(())
    }
}

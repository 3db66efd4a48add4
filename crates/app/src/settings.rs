use std::path::{Path, PathBuf};
use std::sync::Arc;

use biblio_llm::{LlmProvider, ProviderConfig, ProviderKind, ProviderResult, create_provider};
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use gpui::{App, Window};
use gpui_component::{Theme, ThemeMode};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use snafu::{ResultExt, Snafu};

pub const DEFAULT_PROVIDER_ID: &str = "gemini";
pub const SETTINGS_DIRECTORY_NAME: &str = "biblio";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const ENV_PREFIX: &str = "BIBLIO_";

const GEMINI_KEY_FALLBACKS: &[&str] = &["GEMINI_API_KEY", "API_KEY"];
const OPENAI_KEY_FALLBACKS: &[&str] = &["OPENAI_API_KEY"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_provider_id")]
    pub provider_id: String,
    #[serde(default)]
    pub api_key: String,
    /// Base URL override; blank keeps the provider default.
    #[serde(default)]
    pub endpoint: String,
    /// Model id override; blank keeps the provider default.
    #[serde(default)]
    pub model: String,
    #[serde(
        default = "default_theme_mode",
        serialize_with = "serialize_theme_mode",
        deserialize_with = "deserialize_theme_mode"
    )]
    pub theme_mode: ThemeMode,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider_id: default_provider_id(),
            api_key: String::new(),
            endpoint: String::new(),
            model: String::new(),
            theme_mode: default_theme_mode(),
        }
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to extract settings on `{stage}`: {source}"))]
    Extract {
        stage: &'static str,
        source: figment::Error,
    },
}

impl Settings {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".biblio"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    /// Defaults, then the JSON file, then `BIBLIO_*` environment variables.
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Json::file(path))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    fn figment_without_file() -> Figment {
        Figment::from(Serialized::defaults(Self::default())).merge(Env::prefixed(ENV_PREFIX))
    }

    pub fn extract(figment: Figment) -> Result<Self, SettingsError> {
        figment
            .extract::<Self>()
            .map(Self::normalized)
            .context(ExtractSnafu {
                stage: "extract-settings",
            })
    }

    pub fn load() -> Self {
        Self::load_from(&Self::default_config_path())
    }

    /// Never fails: a malformed file is skipped with a warning.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            tracing::info!(path = ?path, "settings file not found, using defaults and environment");
        }

        let settings = match Self::extract(Self::figment(path)) {
            Ok(settings) => settings,
            Err(error) => {
                tracing::warn!(path = ?path, error = %error, "ignoring unreadable settings file");
                Self::extract(Self::figment_without_file()).unwrap_or_else(|error| {
                    tracing::warn!(error = %error, "ignoring environment settings");
                    Self::default()
                })
            }
        };

        settings.with_credential_fallback(|name| std::env::var(name).ok())
    }

    pub fn normalized(mut self) -> Self {
        self.provider_id = if self.provider_id.trim().is_empty() {
            default_provider_id()
        } else {
            self.provider_id.trim().to_string()
        };
        self.api_key = self.api_key.trim().to_string();
        self.endpoint = self.endpoint.trim().to_string();
        self.model = self.model.trim().to_string();
        self
    }

    /// Fills an empty API key from the provider's conventional variables.
    pub fn with_credential_fallback(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if !self.api_key.is_empty() {
            return self;
        }

        let names = match ProviderKind::parse(&self.provider_id) {
            Some(ProviderKind::OpenAi) => OPENAI_KEY_FALLBACKS,
            Some(ProviderKind::Gemini) | None => GEMINI_KEY_FALLBACKS,
        };

        if let Some((name, key)) = names.iter().find_map(|name| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .map(|value| (*name, value))
        }) {
            tracing::debug!(variable = name, "using API key from environment fallback");
            self.api_key = key;
        }

        self
    }

    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig::new(&self.provider_id, &self.api_key, &self.endpoint)
    }

    pub fn model_override(&self) -> Option<String> {
        (!self.model.is_empty()).then(|| self.model.clone())
    }

    /// Builds the provider handle for a new session. Errors are surfaced in the session.
    pub fn open_provider(&self) -> ProviderResult<Arc<dyn LlmProvider>> {
        create_provider(self.provider_config())
    }

    pub fn apply_theme(&self, window: Option<&mut Window>, cx: &mut App) {
        Theme::change(self.theme_mode, window, cx);
    }
}

fn default_provider_id() -> String {
    DEFAULT_PROVIDER_ID.to_string()
}

fn default_theme_mode() -> ThemeMode {
    ThemeMode::Light
}

fn serialize_theme_mode<S>(value: &ThemeMode, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(value.name())
}

fn deserialize_theme_mode<'de, D>(deserializer: D) -> Result<ThemeMode, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    Ok(parse_theme_mode(&value))
}

fn parse_theme_mode(value: &str) -> ThemeMode {
    if value.trim().eq_ignore_ascii_case("dark") {
        ThemeMode::Dark
    } else {
        ThemeMode::Light
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use figment::Jail;

    use super::*;

    #[test]
    fn environment_overrides_file_which_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file(
                SETTINGS_FILE_NAME,
                r#"{ "provider_id": "openai", "model": "file-model", "theme_mode": "dark" }"#,
            )?;
            jail.set_env("BIBLIO_MODEL", "env-model");
            jail.set_env("BIBLIO_API_KEY", "env-key");

            let settings = Settings::extract(Settings::figment(Path::new(SETTINGS_FILE_NAME)))
                .map_err(|error| error.to_string())?;

            assert_eq!(settings.provider_id, "openai");
            assert_eq!(settings.model, "env-model");
            assert_eq!(settings.api_key, "env-key");
            assert_eq!(settings.endpoint, "");
            assert_eq!(settings.theme_mode, ThemeMode::Dark);
            Ok(())
        });
    }

    #[test]
    fn missing_file_yields_defaults() {
        Jail::expect_with(|jail| {
            jail.clear_env();

            let settings = Settings::load_from(Path::new("absent.json"));

            assert_eq!(settings, Settings::default());
            assert_eq!(settings.model_override(), None);
            Ok(())
        });
    }

    #[test]
    fn malformed_file_falls_back_but_keeps_environment() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file(SETTINGS_FILE_NAME, "{ provider_id: ")?;
            jail.set_env("BIBLIO_THEME_MODE", "dark");
            jail.set_env("API_KEY", "legacy-key");

            let settings = Settings::load_from(Path::new(SETTINGS_FILE_NAME));

            assert_eq!(settings.provider_id, DEFAULT_PROVIDER_ID);
            assert_eq!(settings.theme_mode, ThemeMode::Dark);
            assert_eq!(settings.api_key, "legacy-key");
            Ok(())
        });
    }

    #[test]
    fn credential_fallback_follows_provider_conventions() {
        let env = HashMap::from([
            ("GEMINI_API_KEY", " gemini-key "),
            ("API_KEY", "generic-key"),
            ("OPENAI_API_KEY", "openai-key"),
        ]);
        let lookup = |name: &str| env.get(name).map(|value| value.to_string());

        let gemini = Settings::default().with_credential_fallback(lookup);
        assert_eq!(gemini.api_key, "gemini-key");

        let openai = Settings {
            provider_id: "openai".to_string(),
            ..Settings::default()
        }
        .with_credential_fallback(lookup);
        assert_eq!(openai.api_key, "openai-key");

        let explicit = Settings {
            api_key: "configured".to_string(),
            ..Settings::default()
        }
        .with_credential_fallback(lookup);
        assert_eq!(explicit.api_key, "configured");
    }

    #[test]
    fn missing_key_surfaces_as_a_configuration_error() {
        let settings = Settings::default().with_credential_fallback(|_| None);

        let error = match settings.open_provider() {
            Ok(_) => panic!("provider should not open without a key"),
            Err(error) => error,
        };
        assert!(error.is_configuration());
    }
}

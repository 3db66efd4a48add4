use crate::provider::ProviderKind;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// Model used when settings do not name one.
pub fn default_model_for(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::Gemini => DEFAULT_GEMINI_MODEL,
        ProviderKind::OpenAi => DEFAULT_OPENAI_MODEL,
    }
}

use crate::args::{BaseArgs, API_URL_ENV, SERVICE_KEY_ENV};
use crate::config::Settings;
use crate::error::ArchiveError;

type Slot = fn(&mut BaseArgs) -> &mut Option<String>;

/// Variable names used by the web app's deployment, accepted as fallbacks,
/// each with the credential field it fills.
const ENV_ALIASES: &[(&str, Slot)] = &[
    ("SUPABASE_URL", api_url_slot),
    ("SUPABASE_SERVICE_ROLE_KEY", service_key_slot),
];

fn api_url_slot(base: &mut BaseArgs) -> &mut Option<String> {
    &mut base.api_url
}

fn service_key_slot(base: &mut BaseArgs) -> &mut Option<String> {
    &mut base.service_key
}

/// Resolved credentials for backend calls. Built once per process and passed explicitly.
pub struct LoginContext {
    pub api_url: String,
    pub service_key: String,
}

impl std::fmt::Debug for LoginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginContext")
            .field("api_url", &self.api_url)
            .field("service_key", &"<redacted>")
            .finish()
    }
}

/// Fill unset credentials from alias variables.
pub fn apply_env_aliases(base: &mut BaseArgs, lookup: impl Fn(&str) -> Option<String>) {
    for &(alias, field) in ENV_ALIASES {
        let slot = field(base);
        if slot.is_none() {
            *slot = lookup(alias).filter(|value| !value.trim().is_empty());
        }
    }
}

pub fn login(base: &BaseArgs, settings: &Settings) -> Result<LoginContext, ArchiveError> {
    let api_url = settings
        .api_url
        .as_ref()
        .map(|resolved| resolved.value.trim().trim_end_matches('/').to_string())
        .filter(|url| !url.is_empty())
        .ok_or(ArchiveError::ConfigMissing(API_URL_ENV))?;

    let service_key = base
        .service_key
        .as_deref()
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .ok_or(ArchiveError::ConfigMissing(SERVICE_KEY_ENV))?
        .to_string();

    Ok(LoginContext {
        api_url,
        service_key,
    })
}

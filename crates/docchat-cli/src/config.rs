use docchat_stream::{ChatConfig, TransportKind};

/// Flag values that override the environment.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub api_url: Option<String>,
    pub transport: Option<String>,
    pub top_k: Option<u32>,
    pub model: Option<String>,
    pub provider: Option<String>,
}

/// Loads `.env` from the working directory, if present.
pub fn init_env() {
    if let Err(err) = dotenvy::dotenv()
        && !err.not_found()
    {
        eprintln!("warning: failed to load .env: {err}");
    }
}

/// Builds the client config from `DOCCHAT_*` variables, then applies flags.
pub fn resolve(overrides: &Overrides) -> anyhow::Result<ChatConfig> {
    let mut config = ChatConfig::from_env()?;
    if let Some(url) = &overrides.api_url {
        config.base_url = url.clone();
    }
    if let Some(kind) = &overrides.transport {
        config.transport = kind.parse::<TransportKind>()?;
    }
    if let Some(top_k) = overrides.top_k {
        config.top_k = top_k;
    }
    if let Some(model) = &overrides.model {
        config.model = Some(model.clone());
    }
    if let Some(provider) = &overrides.provider {
        config.provider = Some(provider.clone());
    }
    config.validate()?;
    tracing::debug!(
        base_url = %config.base_url,
        transport = %config.transport,
        top_k = config.top_k,
        "resolved client config"
    );
    Ok(config)
}

use crate::config::types::{
    Config, OutputConfig, ParserConfig, SitemapConfig, SyncConfig, UserAgentConfig,
};
use crate::ConfigError;
use scraper::Selector;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_sync_config(&config.sync)?;
    validate_sitemap_config(&config.sitemap)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    validate_parser_config(&config.parser)?;
    Ok(())
}

/// Validates sync pass configuration
fn validate_sync_config(config: &SyncConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_fetches < 1 || config.max_concurrent_fetches > 100 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_fetches must be between 1 and 100, got {}",
            config.max_concurrent_fetches
        )));
    }

    if config.request_timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "request_timeout_ms must be >= 100ms, got {}ms",
            config.request_timeout_ms
        )));
    }

    if config.interval_secs == Some(0) {
        return Err(ConfigError::Validation(
            "interval_secs must be greater than zero when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates both sitemap locations
fn validate_sitemap_config(config: &SitemapConfig) -> Result<(), ConfigError> {
    validate_http_url("article_sitemap_url", &config.article_sitemap_url)?;
    validate_http_url("image_sitemap_url", &config.image_sitemap_url)?;
    Ok(())
}

fn validate_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", field, value, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' must use http or https",
            field, value
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Checks that every selector compiles
fn validate_parser_config(config: &ParserConfig) -> Result<(), ConfigError> {
    for (field, selector) in [
        ("body", &config.body),
        ("categories", &config.categories),
        ("tags", &config.tags),
        ("author", &config.author),
        ("published", &config.published),
        ("title", &config.title),
        ("comments", &config.comments),
        ("comment-time", &config.comment_time),
        ("comment-author", &config.comment_author),
        ("comment-text", &config.comment_text),
    ] {
        compile_selector(field, selector)?;
    }
    Ok(())
}

/// Compiles a CSS selector, naming the offending config field on failure
pub(crate) fn compile_selector(field: &'static str, selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector).map_err(|e| ConfigError::InvalidSelector {
        field,
        message: e.to_string(),
    })
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}

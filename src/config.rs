use serde::Deserialize;
use std::str::FromStr;

/// Which text-generation backend is active for this deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAi,
    Gemini,
}

impl FromStr for LlmProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(LlmProvider::OpenAi),
            "gemini" => Ok(LlmProvider::Gemini),
            other => anyhow::bail!("LLM_PROVIDER must be 'openai' or 'gemini', got '{}'", other),
        }
    }
}

/// Which outbound mail transport is active for this deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailProvider {
    Smtp,
    Http,
}

impl FromStr for MailProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "smtp" => Ok(MailProvider::Smtp),
            "http" | "resend" => Ok(MailProvider::Http),
            other => anyhow::bail!("MAIL_PROVIDER must be 'smtp' or 'http', got '{}'", other),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub cors_origin: Option<String>,
    pub llm_provider: LlmProvider,
    pub llm_api_key: String,
    pub llm_model: String,
    pub llm_timeout_secs: u64,
    pub firebase_api_key: String,
    pub mail_provider: MailProvider,
    pub mail_from: String,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub email_user: Option<String>,
    pub email_app_password: Option<String>,
    pub resend_api_key: Option<String>,
    pub test_recipient_email: Option<String>,
    pub lead_copy_email: Option<String>,
    pub db_encryption_key: String,
    pub admin_token: Option<String>,
}

fn required(name: &str) -> anyhow::Result<String> {
    std::env::var(name)
        .map_err(|_| anyhow::anyhow!("{} environment variable required", name))
        .and_then(|value| {
            if value.trim().is_empty() {
                anyhow::bail!("{} cannot be empty", name);
            }
            Ok(value)
        })
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let llm_provider: LlmProvider = optional("LLM_PROVIDER")
            .unwrap_or_else(|| "openai".to_string())
            .parse()?;

        let (llm_api_key, llm_model) = match llm_provider {
            LlmProvider::OpenAi => (
                required("OPENAI_API_KEY")?,
                optional("OPENAI_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
            ),
            LlmProvider::Gemini => (
                required("GEMINI_API_KEY")?,
                optional("GEMINI_MODEL").unwrap_or_else(|| "gemini-1.5-flash".to_string()),
            ),
        };

        let mail_provider: MailProvider = optional("MAIL_PROVIDER")
            .unwrap_or_else(|| "smtp".to_string())
            .parse()?;

        let email_user = optional("EMAIL_USER");
        let email_app_password = optional("EMAIL_APP_PASSWORD");
        if mail_provider == MailProvider::Smtp
            && (email_user.is_none() || email_app_password.is_none())
        {
            anyhow::bail!("EMAIL_USER and EMAIL_APP_PASSWORD are required when MAIL_PROVIDER=smtp");
        }

        let config = Self {
            database_url: std::env::var("DB_URL")
                .or_else(|_| std::env::var("DATABASE_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DB_URL or DATABASE_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DB_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DB_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "4000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            cors_origin: optional("CORS_ORIGIN"),
            llm_provider,
            llm_api_key,
            llm_model,
            llm_timeout_secs: std::env::var("LLM_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("LLM_TIMEOUT_SECS must be a whole number of seconds"))?,
            firebase_api_key: required("FIREBASE_API_KEY")?,
            mail_provider,
            mail_from: optional("MAIL_FROM")
                .or_else(|| email_user.clone())
                .ok_or_else(|| anyhow::anyhow!("MAIL_FROM or EMAIL_USER environment variable required"))?,
            smtp_host: optional("SMTP_HOST").unwrap_or_else(|| "smtp.gmail.com".to_string()),
            smtp_port: std::env::var("SMTP_PORT")
                .unwrap_or_else(|_| "587".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("SMTP_PORT must be a valid number between 1-65535"))?,
            email_user,
            email_app_password,
            resend_api_key: optional("RESEND_API_KEY"),
            test_recipient_email: optional("TEST_RECIPIENT_EMAIL"),
            lead_copy_email: optional("LEAD_COPY_EMAIL"),
            db_encryption_key: required("DB_ENCRYPTION_KEY")?,
            admin_token: optional("ADMIN_TOKEN"),
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            &config.database_url[..20.min(config.database_url.len())]
        );
        tracing::debug!(
            "LLM provider: {:?} ({})",
            config.llm_provider,
            config.llm_model
        );
        tracing::debug!("Mail provider: {:?}", config.mail_provider);
        if let Some(ref recipient) = config.test_recipient_email {
            tracing::warn!("TEST_RECIPIENT_EMAIL set, all leads go to {}", recipient);
        }
        if config.admin_token.is_none() {
            tracing::warn!("ADMIN_TOKEN not set, dealer application admin routes are disabled");
        }
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parsing_is_case_insensitive() {
        assert_eq!("OpenAI".parse::<LlmProvider>().unwrap(), LlmProvider::OpenAi);
        assert_eq!(" gemini ".parse::<LlmProvider>().unwrap(), LlmProvider::Gemini);
        assert!("claude".parse::<LlmProvider>().is_err());
    }

    #[test]
    fn test_mail_provider_aliases() {
        assert_eq!("resend".parse::<MailProvider>().unwrap(), MailProvider::Http);
        assert_eq!("SMTP".parse::<MailProvider>().unwrap(), MailProvider::Smtp);
        assert!("pigeon".parse::<MailProvider>().is_err());
    }
}

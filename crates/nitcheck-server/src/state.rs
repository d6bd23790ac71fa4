use std::sync::Arc;

use crate::clinics::ClinicDirectory;
use crate::config::AppConfig;
use crate::leads::LeadMailer;
use crate::ratelimit::RateLimiter;
use crate::scan::Scanner;

/// Shared application state: config plus the long-lived services every
/// request handler reaches for.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    /// Plain client for simple upstream calls (geocoding, warm-up pings).
    pub http: reqwest::Client,
    pub limiter: Arc<RateLimiter>,
    pub scanner: Arc<Scanner>,
    pub mailer: Arc<LeadMailer>,
    pub clinics: ClinicDirectory,
}

impl AppState {
    pub fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let scanner = Scanner::from_config(&config.scan);
        let mailer = LeadMailer::from_config(&config.leads);
        let clinics = ClinicDirectory::load(&config.clinics.content_dir)?;
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Ok(Self {
            config: Arc::new(config),
            http,
            limiter: Arc::new(RateLimiter::new()),
            scanner: Arc::new(scanner),
            mailer: Arc::new(mailer),
            clinics,
        })
    }
}

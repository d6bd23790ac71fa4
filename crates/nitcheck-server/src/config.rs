use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub leads: LeadsConfig,
    #[serde(default)]
    pub geocode: GeocodeConfig,
    #[serde(default)]
    pub clinics: ClinicsConfig,
}

// Default derived via field defaults

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.body_limit_bytes == 0 {
            return Err("server.body_limit_bytes must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        // Rate-limit validation
        if self.rate_limit.window_ms == 0 {
            return Err("rate_limit.window_ms must be > 0".into());
        }
        if self.rate_limit.max_requests == 0 {
            return Err("rate_limit.max_requests must be > 0".into());
        }
        // Scan validation
        if !(0.0..=1.0).contains(&self.scan.min_confidence) {
            return Err("scan.min_confidence must be within 0..=1".into());
        }
        if self.scan.min_side_px == 0 {
            return Err("scan.min_side_px must be > 0".into());
        }
        if self.scan.min_side_px > self.scan.strong_side_px {
            return Err("scan.min_side_px must be <= scan.strong_side_px".into());
        }
        if self.scan.roboflow.api_key.is_some()
            && self.scan.roboflow.model_id.is_none()
            && (self.scan.roboflow.workspace.is_none()
                || self.scan.roboflow.workflow_id.is_none())
        {
            return Err(
                "scan.roboflow needs either model_id or workspace + workflow_id".into(),
            );
        }
        // Leads validation: the chosen channel must have its credentials
        match self.leads.provider {
            LeadProvider::Resend if self.leads.resend.api_key.is_none() => {
                return Err("leads.provider = resend requires leads.resend.api_key".into());
            }
            LeadProvider::Postmark if self.leads.postmark.server_token.is_none() => {
                return Err(
                    "leads.provider = postmark requires leads.postmark.server_token".into(),
                );
            }
            LeadProvider::Smtp if self.leads.smtp.host.is_none() => {
                return Err("leads.provider = smtp requires leads.smtp.host".into());
            }
            _ => {}
        }
        if self.leads.provider != LeadProvider::None && self.leads.from_email.is_none() {
            return Err("leads.from_email is required when a lead provider is set".into());
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }

    /// Returns the base URL for the server.
    /// If `server.base_url` is configured, returns that; otherwise computes from host:port.
    pub fn base_url(&self) -> String {
        self.server
            .base_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", self.server.host, self.server.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Base URL for the server, used in links and responses.
    /// If not set, defaults to http://{host}:{port}
    #[serde(default)]
    pub base_url: Option<String>,
    /// Body limit sized for photo uploads
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_body_limit() -> usize {
    8 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_url: None,
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Public site identity, used by the origin allow-list and SEO builders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_site_name")]
    pub name: String,
    #[serde(default = "default_site_url")]
    pub base_url: String,
    #[serde(default = "default_support_email")]
    pub support_email: String,
}
fn default_site_name() -> String {
    "NitNot".into()
}
fn default_site_url() -> String {
    "https://nitnot.com".into()
}
fn default_support_email() -> String {
    "support@nitnot.com".into()
}
impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: default_site_name(),
            base_url: default_site_url(),
            support_email: default_support_email(),
        }
    }
}

/// Scan provider configuration. Providers are tried in order:
/// Roboflow, DeepSeek, then the self-hosted detection service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default)]
    pub roboflow: RoboflowConfig,
    #[serde(default)]
    pub deepseek: DeepSeekConfig,
    /// Base URL of the self-hosted detection service (POST {url}/predict)
    #[serde(default)]
    pub detection_url: Option<String>,
    /// Detections below this confidence are dropped
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
    /// Hard floor: images with a shorter side below this are rejected
    #[serde(default = "default_min_side_px")]
    pub min_side_px: u32,
    /// Soft floor: below this the result confidence tier is capped at low
    #[serde(default = "default_strong_side_px")]
    pub strong_side_px: u32,
    /// Upstream request timeout in milliseconds
    #[serde(default = "default_scan_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_min_confidence() -> f32 {
    0.25
}
fn default_min_side_px() -> u32 {
    160
}
fn default_strong_side_px() -> u32 {
    640
}
fn default_scan_timeout_ms() -> u64 {
    30_000
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            roboflow: RoboflowConfig::default(),
            deepseek: DeepSeekConfig::default(),
            detection_url: None,
            min_confidence: default_min_confidence(),
            min_side_px: default_min_side_px(),
            strong_side_px: default_strong_side_px(),
            request_timeout_ms: default_scan_timeout_ms(),
        }
    }
}

impl ScanConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Name of the first configured provider, if any.
    pub fn provider_name(&self) -> Option<&'static str> {
        if self.roboflow.is_configured() {
            Some("roboflow")
        } else if self.deepseek.is_configured() {
            Some("deepseek")
        } else if self.detection_url.is_some() {
            Some("detection")
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoboflowConfig {
    #[serde(default = "default_roboflow_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Workspace + workflow id pair for serverless workflows
    #[serde(default)]
    pub workspace: Option<String>,
    #[serde(default)]
    pub workflow_id: Option<String>,
    /// Hosted model id (e.g. "head-lice-detect/3"), alternative to a workflow
    #[serde(default)]
    pub model_id: Option<String>,
}

fn default_roboflow_api_base() -> String {
    "https://serverless.roboflow.com".into()
}

impl Default for RoboflowConfig {
    fn default() -> Self {
        Self {
            api_base: default_roboflow_api_base(),
            api_key: None,
            workspace: None,
            workflow_id: None,
            model_id: None,
        }
    }
}

impl RoboflowConfig {
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
            && (self.model_id.is_some() || (self.workspace.is_some() && self.workflow_id.is_some()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeepSeekConfig {
    #[serde(default = "default_deepseek_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_deepseek_model")]
    pub model: String,
}

fn default_deepseek_api_base() -> String {
    "https://api.deepseek.com".into()
}
fn default_deepseek_model() -> String {
    "deepseek-chat".into()
}

impl Default for DeepSeekConfig {
    fn default() -> Self {
        Self {
            api_base: default_deepseek_api_base(),
            api_key: None,
            model: default_deepseek_model(),
        }
    }
}

impl DeepSeekConfig {
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_window_ms")]
    pub window_ms: u64,
    #[serde(default = "default_rate_max_requests")]
    pub max_requests: u32,
}
fn default_rate_window_ms() -> u64 {
    60_000
}
fn default_rate_max_requests() -> u32 {
    20
}
impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: default_rate_window_ms(),
            max_requests: default_rate_max_requests(),
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Per-email budget: half the per-IP budget, floored at 3.
    pub fn email_max_requests(&self) -> u32 {
        (self.max_requests / 2).max(3)
    }
}

/// Lead email delivery channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LeadProvider {
    Resend,
    Postmark,
    Smtp,
    #[default]
    None,
}

impl std::fmt::Display for LeadProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resend => write!(f, "resend"),
            Self::Postmark => write!(f, "postmark"),
            Self::Smtp => write!(f, "smtp"),
            Self::None => write!(f, "none"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LeadsConfig {
    #[serde(default)]
    pub provider: LeadProvider,
    /// Sender address for all lead email
    #[serde(default)]
    pub from_email: Option<String>,
    /// Catch-all destination when no clinic email resolves
    #[serde(default)]
    pub fallback_to: Option<String>,
    /// Destination for clinic applications
    #[serde(default)]
    pub apply_to: Option<String>,
    /// Destination for clinic enquiries
    #[serde(default)]
    pub enquiry_to: Option<String>,
    #[serde(default)]
    pub resend: ResendConfig,
    #[serde(default)]
    pub postmark: PostmarkConfig,
    #[serde(default)]
    pub smtp: SmtpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResendConfig {
    #[serde(default = "default_resend_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub api_key: Option<String>,
}
fn default_resend_api_base() -> String {
    "https://api.resend.com".into()
}
impl Default for ResendConfig {
    fn default() -> Self {
        Self {
            api_base: default_resend_api_base(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostmarkConfig {
    #[serde(default = "default_postmark_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub server_token: Option<String>,
}
fn default_postmark_api_base() -> String {
    "https://api.postmarkapp.com".into()
}
impl Default for PostmarkConfig {
    fn default() -> Self {
        Self {
            api_base: default_postmark_api_base(),
            server_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}
fn default_smtp_port() -> u16 {
    587
}
impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: default_smtp_port(),
            username: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodeConfig {
    #[serde(default = "default_mapbox_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub mapbox_token: Option<String>,
}
fn default_mapbox_api_base() -> String {
    "https://api.mapbox.com".into()
}
impl Default for GeocodeConfig {
    fn default() -> Self {
        Self {
            api_base: default_mapbox_api_base(),
            mapbox_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicsConfig {
    /// Directory holding clinics.uk.json and clinics.us.json
    #[serde(default = "default_content_dir")]
    pub content_dir: String,
}
fn default_content_dir() -> String {
    "content".into()
}
impl Default for ClinicsConfig {
    fn default() -> Self {
        Self {
            content_dir: default_content_dir(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        match path {
            Some(p) => {
                let pathbuf = PathBuf::from(p);
                if pathbuf.exists() {
                    builder = builder.add_source(File::from(pathbuf));
                }
            }
            None => {
                // Try default root-level file
                let default_path = PathBuf::from("nitcheck.toml");
                if default_path.exists() {
                    builder = builder.add_source(File::from(default_path));
                }
            }
        }
        // Environment variable overrides, e.g., NITCHECK__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("NITCHECK")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        // Validate
        merged.validate()?;
        Ok(merged)
    }
}

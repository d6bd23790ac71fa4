//! Clinic lead pipeline: the contact, application, and enquiry forms, their
//! field validation, and delivery routing.

pub mod delivery;

use axum::{
    Json,
    extract::State,
    extract::rejection::JsonRejection,
    http::HeaderMap,
};
use serde_json::{Map, Value, json};

use nitcheck_core::clinic::{Clinic, Country, normalize_website};
use nitcheck_core::lead::{
    ClinicApplication, ClinicEnquiry, DeliveryStatus, LeadDestination, LeadSubmission,
};
use nitcheck_core::privacy::{POLICY_VERSION, normalize_email, redact_email};
use nitcheck_core::scan::{ConfidenceLevel, ScanLabel};
use nitcheck_core::{now_rfc3339, reference_id};

use crate::config::LeadsConfig;
use crate::error::{ApiError, Issue};
use crate::middleware::{client_ip, origin_allowed};
use crate::state::AppState;
use delivery::{DeliveryReport, LeadChannel, OutboundEmail, channel_from_config, classify_delivery_error};

// =============================================================================
// Mailer
// =============================================================================

/// Routes lead payloads to the configured delivery channel.
pub struct LeadMailer {
    channel: Box<dyn LeadChannel>,
    from_email: Option<String>,
    fallback_to: Option<String>,
    apply_to: Option<String>,
    enquiry_to: Option<String>,
}

impl LeadMailer {
    pub fn from_config(config: &LeadsConfig) -> Self {
        Self {
            channel: channel_from_config(config),
            from_email: config.from_email.clone(),
            fallback_to: config.fallback_to.clone(),
            apply_to: config.apply_to.clone(),
            enquiry_to: config.enquiry_to.clone(),
        }
    }

    async fn send(&self, to: Option<&str>, subject: &str, text: &str) -> DeliveryReport {
        if self.channel.is_noop() {
            return DeliveryReport::queued(self.channel.name());
        }
        let (Some(from), Some(to)) = (self.from_email.as_deref(), to) else {
            return DeliveryReport::failed(
                self.channel.name(),
                "Missing email routing configuration",
            );
        };
        self.channel
            .send(&OutboundEmail {
                from,
                to,
                subject,
                text,
            })
            .await
    }

    pub async fn deliver_lead(
        &self,
        lead: &LeadSubmission,
        destination: &LeadDestination,
    ) -> DeliveryReport {
        let to = destination.email.as_deref().or(self.fallback_to.as_deref());
        self.send(to, &lead.subject(destination), &lead.text_body(destination))
            .await
    }

    pub async fn deliver_application(&self, application: &ClinicApplication) -> DeliveryReport {
        let to = self.apply_to.as_deref().or(self.fallback_to.as_deref());
        self.send(to, &application.subject(), &application.text_body())
            .await
    }

    pub async fn deliver_enquiry(&self, enquiry: &ClinicEnquiry) -> DeliveryReport {
        let to = self.enquiry_to.as_deref().or(self.fallback_to.as_deref());
        self.send(to, &enquiry.subject(), &enquiry.text_body()).await
    }
}

/// Route a lead to a clinic inbox: explicit clinic id first, then the first
/// directory entry in the region the postcode hints at (leading 5 digits
/// reads as a US ZIP).
pub fn pick_destination(
    clinics: &[Clinic],
    clinic_id: Option<&str>,
    postcode: &str,
) -> LeadDestination {
    if let Some(id) = clinic_id
        && let Some(clinic) = clinics.iter().find(|c| c.active && c.id == id)
    {
        return LeadDestination {
            clinic_id: Some(clinic.id.clone()),
            email: clinic.email.clone(),
            region: clinic.country,
        };
    }

    let normalized = postcode.trim().to_ascii_uppercase();
    let us_hint = normalized.len() >= 5 && normalized.bytes().take(5).all(|b| b.is_ascii_digit());
    let region = if us_hint { Country::Us } else { Country::Uk };

    let fallback = clinics.iter().find(|c| c.active && c.country == region);
    LeadDestination {
        clinic_id: fallback.map(|c| c.id.clone()),
        email: fallback.and_then(|c| c.email.clone()),
        region,
    }
}

// =============================================================================
// Validation helpers
// =============================================================================

fn parse_body(payload: Result<Json<Value>, JsonRejection>) -> Result<Map<String, Value>, ApiError> {
    let Json(value) = payload
        .map_err(|_| ApiError::Validation(vec![Issue::new("", "Invalid JSON body")]))?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ApiError::Validation(vec![Issue::new(
            "",
            "Expected a JSON object",
        )])),
    }
}

fn require_string(
    map: &Map<String, Value>,
    key: &str,
    min_len: usize,
    issues: &mut Vec<Issue>,
) -> Option<String> {
    match map.get(key) {
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.chars().count() < min_len {
                issues.push(Issue::new(
                    key,
                    format!("Must be at least {min_len} characters"),
                ));
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Some(_) => {
            issues.push(Issue::new(key, "Must be a string"));
            None
        }
        None => {
            issues.push(Issue::new(key, "Required"));
            None
        }
    }
}

fn optional_string(
    map: &Map<String, Value>,
    key: &str,
    max_len: Option<usize>,
    issues: &mut Vec<Issue>,
) -> Option<String> {
    match map.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            if let Some(max) = max_len
                && trimmed.chars().count() > max
            {
                issues.push(Issue::new(key, format!("Must be at most {max} characters")));
                return None;
            }
            Some(trimmed.to_string())
        }
        Some(_) => {
            issues.push(Issue::new(key, "Must be a string"));
            None
        }
    }
}

fn require_email(map: &Map<String, Value>, key: &str, issues: &mut Vec<Issue>) -> Option<String> {
    let value = require_string(map, key, 3, issues)?;
    if is_valid_email(&value) {
        Some(value)
    } else {
        issues.push(Issue::new(key, "Must be a valid email address"));
        None
    }
}

pub(crate) fn is_valid_email(s: &str) -> bool {
    if s.contains(char::is_whitespace) {
        return false;
    }
    let Some((name, domain)) = s.split_once('@') else {
        return false;
    };
    !name.is_empty()
        && domain.len() >= 3
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains('@')
}

fn require_consent(map: &Map<String, Value>, issues: &mut Vec<Issue>) {
    if !matches!(map.get("consent"), Some(Value::Bool(true))) {
        issues.push(Issue::new("consent", "Consent is required"));
    }
}

fn reject_unknown_fields(map: &Map<String, Value>, allowed: &[&str], issues: &mut Vec<Issue>) {
    for key in map.keys() {
        if !allowed.contains(&key.as_str()) {
            issues.push(Issue::new(key.clone(), "Unrecognized field"));
        }
    }
}

fn honeypot_tripped(map: &Map<String, Value>) -> bool {
    matches!(map.get("hp_field"), Some(Value::String(s)) if !s.trim().is_empty())
}

fn optional_website(
    map: &Map<String, Value>,
    key: &str,
    issues: &mut Vec<Issue>,
) -> Option<String> {
    let raw = optional_string(map, key, None, issues)?;
    match normalize_website(&raw) {
        Ok(website) => website,
        Err(_) => {
            issues.push(Issue::new(key, "Website must be a valid URL"));
            None
        }
    }
}

fn country_field(map: &Map<String, Value>, key: &str, issues: &mut Vec<Issue>) -> Option<Country> {
    match map.get(key).and_then(Value::as_str) {
        Some("UK") => Some(Country::Uk),
        Some("US") => Some(Country::Us),
        Some(_) => {
            issues.push(Issue::new(key, "Must be UK or US"));
            None
        }
        None => {
            issues.push(Issue::new(key, "Required"));
            None
        }
    }
}

fn confidence_level_field(
    map: &Map<String, Value>,
    key: &str,
    issues: &mut Vec<Issue>,
) -> Option<ConfidenceLevel> {
    match map.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => match s.as_str() {
            "high" => Some(ConfidenceLevel::High),
            "medium" => Some(ConfidenceLevel::Medium),
            "low" => Some(ConfidenceLevel::Low),
            _ => {
                issues.push(Issue::new(key, "Must be high, medium, or low"));
                None
            }
        },
        Some(_) => {
            issues.push(Issue::new(key, "Must be a string"));
            None
        }
    }
}

fn services_field(map: &Map<String, Value>, issues: &mut Vec<Issue>) -> Option<Vec<String>> {
    match map.get("services") {
        Some(Value::Array(items)) => {
            if items.is_empty() || items.len() > 8 {
                issues.push(Issue::new("services", "Select between 1 and 8 services"));
                return None;
            }
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item.as_str().map(str::trim) {
                    Some(s) if s.chars().count() >= 2 => out.push(s.to_string()),
                    _ => {
                        issues.push(Issue::new(
                            "services",
                            "Each service must be at least 2 characters",
                        ));
                        return None;
                    }
                }
            }
            Some(out)
        }
        Some(_) => {
            issues.push(Issue::new("services", "Must be an array"));
            None
        }
        None => {
            issues.push(Issue::new("services", "Required"));
            None
        }
    }
}

fn ensure_origin(headers: &HeaderMap, state: &AppState) -> Result<(), ApiError> {
    if origin_allowed(headers, &state.config.site.base_url) {
        Ok(())
    } else {
        Err(ApiError::OriginForbidden)
    }
}

fn check_form_rate_limit(
    state: &AppState,
    scope: &str,
    ip: &str,
    email: &str,
) -> Result<(), ApiError> {
    let cfg = &state.config.rate_limit;
    let ip_decision =
        state
            .limiter
            .check(&format!("{scope}:ip:{ip}"), cfg.window(), cfg.max_requests);
    let email_key = normalize_email(email);
    let email_decision = state.limiter.check(
        &format!("{scope}:email:{email_key}"),
        cfg.window(),
        cfg.email_max_requests(),
    );

    if !ip_decision.allowed || !email_decision.allowed {
        tracing::info!(scope, ip = %ip, "form rate limited");
        return Err(ApiError::RateLimited);
    }
    Ok(())
}

fn honeypot_response() -> Json<Value> {
    Json(json!({"ok": true, "deliveryStatus": "queued"}))
}

fn submission_response(reference_id: &str, report: &DeliveryReport) -> Result<Json<Value>, ApiError> {
    if report.status == DeliveryStatus::Failed {
        return Err(classify_delivery_error(report.error.as_deref()));
    }
    Ok(Json(json!({
        "ok": true,
        "referenceId": reference_id,
        "deliveryStatus": report.status,
    })))
}

// =============================================================================
// Routes
// =============================================================================

/// `POST /api/contact-clinic` — a parent asking a clinic to follow up after
/// a scan.
pub async fn contact_clinic(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    ensure_origin(&headers, &state)?;
    let body = parse_body(payload)?;

    let mut issues = Vec::new();
    let name = require_string(&body, "name", 2, &mut issues);
    let email = require_email(&body, "email", &mut issues);
    let phone = optional_string(&body, "phone", None, &mut issues);
    let postcode = require_string(&body, "postcode", 3, &mut issues);
    let message = optional_string(&body, "message", Some(500), &mut issues);
    let clinic_id = optional_string(&body, "clinicId", None, &mut issues);
    let scan_label = optional_string(&body, "scanLabel", None, &mut issues)
        .map(|s| ScanLabel::normalize(&s));
    let scan_confidence_level = confidence_level_field(&body, "scanConfidenceLevel", &mut issues);
    require_consent(&body, &mut issues);

    let (Some(name), Some(email), Some(postcode)) = (name, email, postcode) else {
        return Err(ApiError::Validation(issues));
    };
    if !issues.is_empty() {
        return Err(ApiError::Validation(issues));
    }

    let ip = client_ip(&headers);
    check_form_rate_limit(&state, "contact-clinic", &ip, &email)?;

    let clinics = state.clinics.snapshot();
    let destination = pick_destination(&clinics, clinic_id.as_deref(), &postcode);

    let lead = LeadSubmission {
        reference_id: reference_id("lead"),
        name,
        email,
        phone,
        postcode,
        message,
        clinic_id,
        scan_label,
        scan_confidence_level,
        consent_at: now_rfc3339(),
        policy_version: POLICY_VERSION.to_string(),
    };

    let report = state.mailer.deliver_lead(&lead, &destination).await;

    tracing::info!(
        reference_id = %lead.reference_id,
        clinic = destination.clinic_id.as_deref().unwrap_or("auto"),
        region = %destination.region,
        email = %redact_email(&lead.email),
        scan_label = lead.scan_label.map(|l| l.as_str()).unwrap_or("none"),
        delivery_status = %report.status,
        provider = report.provider,
        message_id = report.message_id.as_deref().unwrap_or(""),
        delivery_error = report.error.as_deref().unwrap_or(""),
        ip = %ip,
        "clinic contact lead"
    );

    submission_response(&lead.reference_id, &report)
}

/// `POST /api/clinic-apply` — a clinic applying to join the directory.
pub async fn clinic_apply(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    ensure_origin(&headers, &state)?;
    let body = parse_body(payload)?;

    let mut issues = Vec::new();
    reject_unknown_fields(
        &body,
        &[
            "clinicName",
            "contactName",
            "email",
            "phone",
            "website",
            "country",
            "city",
            "region",
            "postcode",
            "address1",
            "address2",
            "services",
            "message",
            "consent",
            "hp_field",
        ],
        &mut issues,
    );
    let clinic_name = require_string(&body, "clinicName", 2, &mut issues);
    let contact_name = require_string(&body, "contactName", 2, &mut issues);
    let email = require_email(&body, "email", &mut issues);
    let phone = optional_string(&body, "phone", None, &mut issues);
    let website = optional_website(&body, "website", &mut issues);
    let country = country_field(&body, "country", &mut issues);
    let city = require_string(&body, "city", 2, &mut issues);
    let region = require_string(&body, "region", 2, &mut issues);
    let postcode = require_string(&body, "postcode", 2, &mut issues);
    let address1 = require_string(&body, "address1", 3, &mut issues);
    let address2 = optional_string(&body, "address2", None, &mut issues);
    let services = services_field(&body, &mut issues);
    let message = optional_string(&body, "message", Some(1000), &mut issues);
    require_consent(&body, &mut issues);

    let (
        Some(clinic_name),
        Some(contact_name),
        Some(email),
        Some(country),
        Some(city),
        Some(region),
        Some(postcode),
        Some(address1),
        Some(services),
    ) = (
        clinic_name,
        contact_name,
        email,
        country,
        city,
        region,
        postcode,
        address1,
        services,
    )
    else {
        return Err(ApiError::Validation(issues));
    };
    if !issues.is_empty() {
        return Err(ApiError::Validation(issues));
    }

    if honeypot_tripped(&body) {
        return Ok(honeypot_response());
    }

    let ip = client_ip(&headers);
    check_form_rate_limit(&state, "clinic-apply", &ip, &email)?;

    let application = ClinicApplication {
        reference_id: reference_id("apply"),
        clinic_name,
        contact_name,
        email,
        phone,
        website,
        country,
        city,
        region,
        postcode,
        address1,
        address2,
        services,
        message,
        consent_at: now_rfc3339(),
        policy_version: POLICY_VERSION.to_string(),
    };

    let report = state.mailer.deliver_application(&application).await;

    tracing::info!(
        reference_id = %application.reference_id,
        clinic_name = %application.clinic_name,
        email = %redact_email(&application.email),
        country = %application.country,
        city = %application.city,
        services = application.services.len(),
        delivery_status = %report.status,
        provider = report.provider,
        message_id = report.message_id.as_deref().unwrap_or(""),
        delivery_error = report.error.as_deref().unwrap_or(""),
        ip = %ip,
        "clinic application"
    );

    submission_response(&application.reference_id, &report)
}

/// `POST /api/clinic-enquiry` — a lighter partnership enquiry.
pub async fn clinic_enquiry(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    ensure_origin(&headers, &state)?;
    let body = parse_body(payload)?;

    let mut issues = Vec::new();
    reject_unknown_fields(
        &body,
        &[
            "contactName",
            "clinicName",
            "phone",
            "address",
            "email",
            "website",
            "consent",
            "hp_field",
        ],
        &mut issues,
    );
    let contact_name = require_string(&body, "contactName", 2, &mut issues);
    let clinic_name = require_string(&body, "clinicName", 2, &mut issues);
    let phone = optional_string(&body, "phone", None, &mut issues);
    let address = require_string(&body, "address", 3, &mut issues);
    let email = require_email(&body, "email", &mut issues);
    let website = optional_website(&body, "website", &mut issues);
    require_consent(&body, &mut issues);

    let (Some(contact_name), Some(clinic_name), Some(address), Some(email)) =
        (contact_name, clinic_name, address, email)
    else {
        return Err(ApiError::Validation(issues));
    };
    if !issues.is_empty() {
        return Err(ApiError::Validation(issues));
    }

    if honeypot_tripped(&body) {
        return Ok(honeypot_response());
    }

    let ip = client_ip(&headers);
    check_form_rate_limit(&state, "clinic-enquiry", &ip, &email)?;

    let enquiry = ClinicEnquiry {
        reference_id: reference_id("enquiry"),
        contact_name,
        clinic_name,
        phone,
        address,
        email,
        website,
        consent_at: now_rfc3339(),
        policy_version: POLICY_VERSION.to_string(),
    };

    let report = state.mailer.deliver_enquiry(&enquiry).await;

    tracing::info!(
        reference_id = %enquiry.reference_id,
        clinic_name = %enquiry.clinic_name,
        email = %redact_email(&enquiry.email),
        delivery_status = %report.status,
        provider = report.provider,
        message_id = report.message_id.as_deref().unwrap_or(""),
        delivery_error = report.error.as_deref().unwrap_or(""),
        ip = %ip,
        "clinic enquiry"
    );

    submission_response(&enquiry.reference_id, &report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clinic(id: &str, country: Country, email: Option<&str>) -> Clinic {
        Clinic {
            id: id.to_string(),
            name: id.to_string(),
            region: "Region".to_string(),
            country,
            city: "City".to_string(),
            postcode: "AB1 2CD".to_string(),
            address1: "1 High Street".to_string(),
            address2: None,
            phone: "0".to_string(),
            email: email.map(String::from),
            booking_url: None,
            lat: 0.0,
            lng: 0.0,
            services: vec![],
            active: true,
        }
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("jo@example.com"));
        assert!(is_valid_email("jo+tag@sub.example.co.uk"));
        assert!(!is_valid_email("jo@example"));
        assert!(!is_valid_email("jo@.com"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("jo smith@example.com"));
        assert!(!is_valid_email("plainaddress"));
    }

    #[test]
    fn destination_prefers_explicit_clinic() {
        let clinics = vec![
            clinic("uk-a", Country::Uk, Some("a@example.com")),
            clinic("us-b", Country::Us, Some("b@example.com")),
        ];
        let destination = pick_destination(&clinics, Some("us-b"), "HP1 1AA");
        assert_eq!(destination.clinic_id.as_deref(), Some("us-b"));
        assert_eq!(destination.region, Country::Us);
    }

    #[test]
    fn destination_uses_postcode_heuristic() {
        let clinics = vec![
            clinic("uk-a", Country::Uk, Some("a@example.com")),
            clinic("us-b", Country::Us, Some("b@example.com")),
        ];

        let destination = pick_destination(&clinics, None, "73301");
        assert_eq!(destination.region, Country::Us);
        assert_eq!(destination.clinic_id.as_deref(), Some("us-b"));

        let destination = pick_destination(&clinics, None, "HP1 1AA");
        assert_eq!(destination.region, Country::Uk);
        assert_eq!(destination.clinic_id.as_deref(), Some("uk-a"));
    }

    #[test]
    fn destination_skips_inactive_and_unknown_ids() {
        let mut inactive = clinic("uk-a", Country::Uk, Some("a@example.com"));
        inactive.active = false;
        let clinics = vec![inactive, clinic("uk-b", Country::Uk, None)];

        let destination = pick_destination(&clinics, Some("uk-a"), "HP1 1AA");
        // Inactive clinic is not addressable; falls through to region pick
        assert_eq!(destination.clinic_id.as_deref(), Some("uk-b"));
        assert_eq!(destination.email, None);
    }

    #[test]
    fn required_string_validation_collects_issues() {
        let map = json!({"name": "J", "other": 4}).as_object().cloned().unwrap();
        let mut issues = Vec::new();
        assert!(require_string(&map, "name", 2, &mut issues).is_none());
        assert!(require_string(&map, "missing", 2, &mut issues).is_none());
        assert!(require_string(&map, "other", 2, &mut issues).is_none());
        assert_eq!(issues.len(), 3);
    }

    #[test]
    fn optional_string_enforces_max_length() {
        let map = json!({"message": "x".repeat(10)}).as_object().cloned().unwrap();
        let mut issues = Vec::new();
        assert!(optional_string(&map, "message", Some(5), &mut issues).is_none());
        assert_eq!(issues.len(), 1);

        let mut issues = Vec::new();
        assert_eq!(
            optional_string(&map, "message", Some(20), &mut issues).as_deref(),
            Some("xxxxxxxxxx")
        );
        assert!(issues.is_empty());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let map = json!({"email": "a@b.co", "extra": 1}).as_object().cloned().unwrap();
        let mut issues = Vec::new();
        reject_unknown_fields(&map, &["email"], &mut issues);
        assert_eq!(issues, vec![Issue::new("extra", "Unrecognized field")]);
    }

    #[test]
    fn honeypot_detection() {
        let tripped = json!({"hp_field": "bot text"}).as_object().cloned().unwrap();
        assert!(honeypot_tripped(&tripped));

        let blank = json!({"hp_field": "  "}).as_object().cloned().unwrap();
        assert!(!honeypot_tripped(&blank));

        let absent = json!({}).as_object().cloned().unwrap();
        assert!(!honeypot_tripped(&absent));
    }

    #[test]
    fn services_validation_bounds() {
        let mut issues = Vec::new();
        let ok = json!({"services": ["Screening", "Removal"]})
            .as_object()
            .cloned()
            .unwrap();
        assert_eq!(services_field(&ok, &mut issues).unwrap().len(), 2);
        assert!(issues.is_empty());

        let empty = json!({"services": []}).as_object().cloned().unwrap();
        assert!(services_field(&empty, &mut issues).is_none());

        let short = json!({"services": ["x"]}).as_object().cloned().unwrap();
        assert!(services_field(&short, &mut issues).is_none());

        let too_many = json!({"services": vec!["ab"; 9]}).as_object().cloned().unwrap();
        assert!(services_field(&too_many, &mut issues).is_none());
    }
}

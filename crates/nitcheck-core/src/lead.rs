//! Lead submission payloads and the plain-text email bodies routed to
//! clinics and the partnerships inbox.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::clinic::Country;
use crate::scan::{ConfidenceLevel, ScanLabel};

/// Where a lead email ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Queued,
    Failed,
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sent => write!(f, "sent"),
            Self::Queued => write!(f, "queued"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Resolved routing target for a contact-clinic lead.
#[derive(Debug, Clone, PartialEq)]
pub struct LeadDestination {
    pub clinic_id: Option<String>,
    pub email: Option<String>,
    pub region: Country,
}

/// A parent's contact request after a scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadSubmission {
    pub reference_id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub postcode: String,
    pub message: Option<String>,
    pub clinic_id: Option<String>,
    pub scan_label: Option<ScanLabel>,
    pub scan_confidence_level: Option<ConfidenceLevel>,
    pub consent_at: String,
    pub policy_version: String,
}

impl LeadSubmission {
    pub fn text_body(&self, destination: &LeadDestination) -> String {
        [
            format!("Reference: {}", self.reference_id),
            format!(
                "Clinic: {}",
                destination.clinic_id.as_deref().unwrap_or("auto")
            ),
            format!("Region: {}", destination.region),
            format!("Name: {}", self.name),
            format!("Email: {}", self.email),
            format!("Phone: {}", self.phone.as_deref().unwrap_or("N/A")),
            format!("Postcode/ZIP: {}", self.postcode),
            format!(
                "Scan label: {}",
                self.scan_label.map(|l| l.as_str()).unwrap_or("N/A")
            ),
            format!(
                "Scan confidence: {}",
                self.scan_confidence_level
                    .map(|l| l.as_str())
                    .unwrap_or("N/A")
            ),
            format!(
                "Consent: true ({}) policy {}",
                self.consent_at, self.policy_version
            ),
            format!("Message: {}", self.message.as_deref().unwrap_or("N/A")),
        ]
        .join("\n")
    }

    pub fn subject(&self, destination: &LeadDestination) -> String {
        format!(
            "Head lice checker lead {} ({})",
            self.reference_id, destination.region
        )
    }
}

/// A clinic asking to join the directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicApplication {
    pub reference_id: String,
    pub clinic_name: String,
    pub contact_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub country: Country,
    pub city: String,
    pub region: String,
    pub postcode: String,
    pub address1: String,
    pub address2: Option<String>,
    pub services: Vec<String>,
    pub message: Option<String>,
    pub consent_at: String,
    pub policy_version: String,
}

impl ClinicApplication {
    pub fn text_body(&self) -> String {
        [
            format!("Reference: {}", self.reference_id),
            format!("Clinic name: {}", self.clinic_name),
            format!("Contact name: {}", self.contact_name),
            format!("Email: {}", self.email),
            format!("Phone: {}", self.phone.as_deref().unwrap_or("N/A")),
            format!("Website: {}", self.website.as_deref().unwrap_or("N/A")),
            format!("Country: {}", self.country),
            format!("City: {}", self.city),
            format!("Region: {}", self.region),
            format!("Postcode/ZIP: {}", self.postcode),
            format!("Address 1: {}", self.address1),
            format!("Address 2: {}", self.address2.as_deref().unwrap_or("N/A")),
            format!("Services: {}", self.services.join(", ")),
            format!(
                "Consent: true ({}) policy {}",
                self.consent_at, self.policy_version
            ),
            format!("Message: {}", self.message.as_deref().unwrap_or("N/A")),
        ]
        .join("\n")
    }

    pub fn subject(&self) -> String {
        format!(
            "Clinic application {} ({} {})",
            self.reference_id, self.country, self.city
        )
    }
}

/// A lighter-weight partnership enquiry from the for-clinics page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicEnquiry {
    pub reference_id: String,
    pub contact_name: String,
    pub clinic_name: String,
    pub phone: Option<String>,
    pub address: String,
    pub email: String,
    pub website: Option<String>,
    pub consent_at: String,
    pub policy_version: String,
}

impl ClinicEnquiry {
    pub fn text_body(&self) -> String {
        [
            format!("Reference: {}", self.reference_id),
            format!("Contact name: {}", self.contact_name),
            format!("Clinic name: {}", self.clinic_name),
            format!("Phone: {}", self.phone.as_deref().unwrap_or("N/A")),
            format!("Address: {}", self.address),
            format!("Email: {}", self.email),
            format!("Website: {}", self.website.as_deref().unwrap_or("N/A")),
            format!(
                "Consent: true ({}) policy {}",
                self.consent_at, self.policy_version
            ),
        ]
        .join("\n")
    }

    pub fn subject(&self) -> String {
        format!("Clinic enquiry {}", self.reference_id)
    }
}

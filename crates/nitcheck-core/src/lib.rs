pub mod clinic;
pub mod error;
pub mod id;
pub mod lead;
pub mod privacy;
pub mod scan;
pub mod time;

pub use clinic::{Clinic, Country, GeoPoint, distance_miles, normalize_website, slugify};
pub use error::{CoreError, Result};
pub use id::reference_id;
pub use lead::{ClinicApplication, ClinicEnquiry, DeliveryStatus, LeadDestination, LeadSubmission};
pub use privacy::{POLICY_VERSION, normalize_email, redact_email};
pub use scan::{ConfidenceLevel, Detection, ScanLabel, ScanOutcome};
pub use time::{now_rfc3339, now_utc};

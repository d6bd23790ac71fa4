//! Clinic directory records and the geo helpers behind the clinic finder.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, Result};

/// Markets the directory serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Country {
    #[serde(rename = "UK")]
    Uk,
    #[serde(rename = "US")]
    Us,
}

impl Country {
    /// Normalize the free-text country column of the clinic sheet.
    pub fn normalize(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "uk" | "gb" | "united kingdom" | "great britain" => Ok(Self::Uk),
            "us" | "usa" | "united states" | "united states of america" => Ok(Self::Us),
            _ => Err(CoreError::unsupported_country(raw.trim())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uk => "UK",
            Self::Us => "US",
        }
    }

    /// ISO 3166-1 alpha-2 code, as used by geocoding providers.
    pub fn iso_alpha2(&self) -> &'static str {
        match self {
            Self::Uk => "GB",
            Self::Us => "US",
        }
    }
}

impl fmt::Display for Country {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One clinic in the directory. Static reference data synced from the
/// partner sheet; `active` rows are the only ones served.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clinic {
    pub id: String,
    pub name: String,
    pub region: String,
    pub country: Country,
    pub city: String,
    pub postcode: String,
    pub address1: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address2: Option<String>,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_url: Option<String>,
    pub lat: f64,
    pub lng: f64,
    pub services: Vec<String>,
    pub active: bool,
}

/// A geographic origin for distance sorting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// Great-circle distance in miles (haversine).
pub fn distance_miles(a_lat: f64, a_lng: f64, b_lat: f64, b_lng: f64) -> f64 {
    const EARTH_RADIUS_MILES: f64 = 3958.8;

    let d_lat = (b_lat - a_lat).to_radians();
    let d_lng = (b_lng - a_lng).to_radians();
    let lat1 = a_lat.to_radians();
    let lat2 = b_lat.to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_MILES * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Sort clinics nearest-first from `origin`, or alphabetically by city when
/// no origin is known.
pub fn sort_by_nearest(clinics: &mut [Clinic], origin: Option<GeoPoint>) {
    match origin {
        Some(origin) => clinics.sort_by(|a, b| {
            let da = distance_miles(origin.lat, origin.lng, a.lat, a.lng);
            let db = distance_miles(origin.lat, origin.lng, b.lat, b.lng);
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        }),
        None => clinics.sort_by(|a, b| a.city.cmp(&b.city)),
    }
}

/// Resolve a free-text search into an origin by matching the directory
/// itself: the first clinic whose city or postcode contains the query.
pub fn origin_from_query(clinics: &[Clinic], query: &str) -> Option<GeoPoint> {
    let normalized = query.trim().to_ascii_lowercase();
    if normalized.is_empty() {
        return None;
    }

    clinics
        .iter()
        .find(|clinic| {
            clinic.city.to_ascii_lowercase().contains(&normalized)
                || clinic.postcode.to_ascii_lowercase().contains(&normalized)
        })
        .map(|clinic| GeoPoint {
            lat: clinic.lat,
            lng: clinic.lng,
        })
}

/// Normalize a clinic website: blank means none, bare domains get `https://`,
/// anything that still fails to parse is rejected.
pub fn normalize_website(raw: &str) -> Result<Option<String>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    match url::Url::parse(&with_scheme) {
        Ok(parsed) if parsed.host_str().is_some() => Ok(Some(parsed.to_string())),
        _ => Err(CoreError::InvalidWebsite(trimmed.to_string())),
    }
}

/// Slug used for clinic ids: lowercase, alphanumeric runs joined by single
/// dashes, no leading/trailing dashes.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_dash = false;

    for ch in value.trim().to_ascii_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch);
        } else {
            pending_dash = true;
        }
    }

    slug
}

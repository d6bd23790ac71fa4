//! Clinic directory: loading the synced JSON files and serving the finder.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::{Json, extract::Query, extract::State};
use serde::Deserialize;
use serde_json::{Value, json};

use nitcheck_core::clinic::{Clinic, Country, GeoPoint, origin_from_query, sort_by_nearest};

use crate::error::{ApiError, Issue};
use crate::state::AppState;

const DIRECTORY_FILES: [&str; 2] = ["clinics.uk.json", "clinics.us.json"];
const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 100;

/// The in-memory directory. Swapped atomically on reload so requests never
/// see a partially loaded list.
#[derive(Clone)]
pub struct ClinicDirectory {
    clinics: Arc<ArcSwap<Vec<Clinic>>>,
    content_dir: PathBuf,
}

impl ClinicDirectory {
    pub fn load(content_dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let content_dir = content_dir.into();
        let clinics = Self::read_files(&content_dir)?;
        tracing::info!(
            total = clinics.len(),
            dir = %content_dir.display(),
            "clinic directory loaded"
        );
        Ok(Self {
            clinics: Arc::new(ArcSwap::from_pointee(clinics)),
            content_dir,
        })
    }

    fn read_files(content_dir: &Path) -> anyhow::Result<Vec<Clinic>> {
        let mut clinics = Vec::new();
        for file in DIRECTORY_FILES {
            let path = content_dir.join(file);
            if !path.exists() {
                tracing::warn!(path = %path.display(), "clinic file missing, serving without it");
                continue;
            }
            let raw = std::fs::read_to_string(&path)?;
            let parsed: Vec<Clinic> = serde_json::from_str(&raw)
                .map_err(|e| anyhow::anyhow!("{}: {e}", path.display()))?;
            clinics.extend(parsed);
        }
        Ok(clinics)
    }

    pub fn snapshot(&self) -> Arc<Vec<Clinic>> {
        self.clinics.load_full()
    }

    /// Re-read the content dir (after a sync run) and swap the directory.
    pub fn reload(&self) -> anyhow::Result<usize> {
        let clinics = Self::read_files(&self.content_dir)?;
        let total = clinics.len();
        self.clinics.store(Arc::new(clinics));
        Ok(total)
    }
}

#[derive(Debug, Deserialize)]
pub struct ClinicsQuery {
    pub country: Option<String>,
    pub q: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub limit: Option<usize>,
}

/// `GET /api/clinics` — active clinics, filtered by country and sorted
/// nearest-first when an origin is known.
pub async fn list_clinics(
    State(state): State<AppState>,
    Query(query): Query<ClinicsQuery>,
) -> Result<Json<Value>, ApiError> {
    let country = match query.country.as_deref() {
        None | Some("ALL") => None,
        Some("UK") => Some(Country::Uk),
        Some("US") => Some(Country::Us),
        Some(_) => {
            return Err(ApiError::Validation(vec![Issue::new(
                "country",
                "Must be UK, US, or ALL",
            )]));
        }
    };

    let snapshot = state.clinics.snapshot();
    let mut clinics: Vec<Clinic> = snapshot
        .iter()
        .filter(|c| c.active && country.is_none_or(|wanted| c.country == wanted))
        .cloned()
        .collect();

    let origin = match (query.lat, query.lng) {
        (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
        _ => query
            .q
            .as_deref()
            .and_then(|q| origin_from_query(&clinics, q)),
    };
    sort_by_nearest(&mut clinics, origin);

    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    clinics.truncate(limit);

    Ok(Json(json!({
        "clinics": clinics,
        "count": clinics.len(),
    })))
}

/// `POST /api/clinics/reload` — pick up the output of a sync run without a
/// restart.
pub async fn reload_clinics(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    match state.clinics.reload() {
        Ok(total) => {
            tracing::info!(total, "clinic directory reloaded");
            Ok(Json(json!({"ok": true, "total": total})))
        }
        Err(e) => {
            tracing::error!(error = %e, "clinic directory reload failed");
            Err(ApiError::Internal(e.to_string()))
        }
    }
}

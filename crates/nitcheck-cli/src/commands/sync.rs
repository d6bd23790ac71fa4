//! Clinic directory sync: download the partner sheet CSV, validate and
//! normalize every row, geocode addresses (with a persistent cache and
//! polite pacing), and write the per-country directory files.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use nitcheck_core::clinic::{Clinic, Country, normalize_website, slugify};
use nitcheck_core::now_rfc3339;

use crate::cli::SyncArgs;
use crate::output::{print_success, print_warning};

const DEFAULT_SHEET_CSV_URL: &str =
    "https://docs.google.com/spreadsheets/d/1YE-937KWlOp2WB7LhdcPAQ8D5OOtK6X-8AYyn3aeBNU/export?format=csv&gid=0";

const REQUIRED_HEADERS: [&str; 10] = [
    "Name",
    "Address 1",
    "Address 2",
    "Town",
    "County",
    "Postcode",
    "Country",
    "Telephone",
    "Email",
    "Website",
];

const CACHE_FILE: &str = ".clinic-geocode-cache.json";
const GEOCODE_ATTEMPTS: u32 = 3;
const DEFAULT_SERVICES: [&str; 2] = ["Screening", "Removal"];

pub async fn run(args: &SyncArgs) -> Result<()> {
    let csv_url = args.csv_url.as_deref().unwrap_or(DEFAULT_SHEET_CSV_URL);
    println!("[sync:clinics] source={csv_url}");

    let client = reqwest::Client::builder()
        .user_agent("nitcheck-clinic-sync/1.0 (clinic-sync)")
        .build()
        .context("build HTTP client")?;

    let response = client.get(csv_url).send().await.context("download CSV")?;
    if !response.status().is_success() {
        bail!("Failed to download CSV ({})", response.status());
    }
    let csv_raw = response.text().await.context("read CSV body")?;

    let rows = parse_sheet(&csv_raw)?;
    if rows.is_empty() {
        bail!("CSV contains no data rows");
    }

    let mut cache = read_cache(&args.content_dir.join(CACHE_FILE));
    let mut geocoder = Geocoder::new(
        client,
        args.geocode_url.clone(),
        Duration::from_millis(args.geocode_delay_ms),
    );

    let mut output: Vec<Clinic> = Vec::new();
    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut errors: Vec<String> = Vec::new();
    let parsed_rows = rows.len();

    for (row_num, row) in rows {
        let pending = match validate_row(row_num, &row, &mut seen_ids) {
            Ok(pending) => pending,
            Err(message) => {
                if args.lenient {
                    print_warning(&format!("[sync:clinics] {message} (skipped)"));
                } else {
                    errors.push(message);
                }
                continue;
            }
        };

        let cache_key = pending.geocode_query.to_ascii_lowercase();
        let coords = match cache.get(&cache_key) {
            Some(cached) if cached.lat.is_finite() && cached.lng.is_finite() => {
                (cached.lat, cached.lng)
            }
            _ => match geocoder.geocode(&pending.geocode_query).await {
                Ok((lat, lng)) => {
                    cache.insert(
                        cache_key,
                        CachedCoordinates {
                            lat,
                            lng,
                            updated_at: now_rfc3339(),
                        },
                    );
                    (lat, lng)
                }
                Err(e) => {
                    let message = format!(
                        "Row {row_num}: geocode failed for \"{}\" ({e})",
                        pending.geocode_query
                    );
                    if args.lenient {
                        print_warning(&format!("[sync:clinics] {message} (skipped)"));
                    } else {
                        errors.push(message);
                    }
                    continue;
                }
            },
        };

        output.push(pending.into_clinic(coords.0, coords.1));
    }

    if !errors.is_empty() {
        bail!(
            "[sync:clinics] failed with {} error(s)\n{}",
            errors.len(),
            errors
                .iter()
                .map(|e| format!("- {e}"))
                .collect::<Vec<_>>()
                .join("\n")
        );
    }

    output.sort_by(|a, b| a.city.cmp(&b.city).then_with(|| a.name.cmp(&b.name)));
    let uk: Vec<&Clinic> = output.iter().filter(|c| c.country == Country::Uk).collect();
    let us: Vec<&Clinic> = output.iter().filter(|c| c.country == Country::Us).collect();

    println!(
        "[sync:clinics] parsed={parsed_rows} valid={} uk={} us={}",
        output.len(),
        uk.len(),
        us.len()
    );

    if args.check {
        print_success("[sync:clinics] check mode: no files written");
        return Ok(());
    }

    std::fs::create_dir_all(&args.content_dir).context("create content dir")?;
    write_pretty_json(&args.content_dir.join("clinics.uk.json"), &uk)?;
    write_pretty_json(&args.content_dir.join("clinics.us.json"), &us)?;
    write_pretty_json(&args.content_dir.join(CACHE_FILE), &cache)?;

    print_success("[sync:clinics] wrote clinics.uk.json");
    print_success("[sync:clinics] wrote clinics.us.json");
    print_success(&format!("[sync:clinics] wrote {CACHE_FILE}"));
    Ok(())
}

// =============================================================================
// Sheet parsing and row validation
// =============================================================================

#[derive(Debug, Clone, Default)]
struct SheetRow {
    name: String,
    address1: String,
    address2: String,
    town: String,
    county: String,
    postcode: String,
    country_raw: String,
    telephone: String,
    email: String,
    website_raw: String,
}

/// Parse the CSV and return `(row_number, row)` pairs for non-blank rows.
/// Row numbers are 1-based sheet rows (the header is row 1).
fn parse_sheet(csv_raw: &str) -> Result<Vec<(usize, SheetRow)>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(csv_raw.as_bytes());

    let headers = reader.headers().context("read CSV header")?.clone();
    let header_names: Vec<String> = headers.iter().map(|h| h.trim().to_string()).collect();

    let missing: Vec<&str> = REQUIRED_HEADERS
        .iter()
        .filter(|required| !header_names.iter().any(|h| h == *required))
        .copied()
        .collect();
    if !missing.is_empty() {
        bail!("Missing required headers: {}", missing.join(", "));
    }

    let index_of: HashMap<&str, usize> = REQUIRED_HEADERS
        .iter()
        .filter_map(|required| {
            header_names
                .iter()
                .position(|h| h == required)
                .map(|idx| (*required, idx))
        })
        .collect();

    let cell = |record: &csv::StringRecord, header: &str| -> String {
        index_of
            .get(header)
            .and_then(|idx| record.get(*idx))
            .unwrap_or("")
            .trim()
            .to_string()
    };

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("read CSV row {}", i + 2))?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        rows.push((
            i + 2,
            SheetRow {
                name: cell(&record, "Name"),
                address1: cell(&record, "Address 1"),
                address2: cell(&record, "Address 2"),
                town: cell(&record, "Town"),
                county: cell(&record, "County"),
                postcode: cell(&record, "Postcode"),
                country_raw: cell(&record, "Country"),
                telephone: cell(&record, "Telephone"),
                email: cell(&record, "Email"),
                website_raw: cell(&record, "Website"),
            },
        ));
    }
    Ok(rows)
}

/// A validated row waiting on coordinates.
#[derive(Debug)]
struct PendingClinic {
    id: String,
    name: String,
    region: String,
    country: Country,
    city: String,
    postcode: String,
    address1: String,
    address2: Option<String>,
    phone: String,
    email: Option<String>,
    booking_url: Option<String>,
    geocode_query: String,
}

impl PendingClinic {
    fn into_clinic(self, lat: f64, lng: f64) -> Clinic {
        Clinic {
            id: self.id,
            name: self.name,
            region: self.region,
            country: self.country,
            city: self.city,
            postcode: self.postcode,
            address1: self.address1,
            address2: self.address2,
            phone: self.phone,
            email: self.email,
            booking_url: self.booking_url,
            lat,
            lng,
            services: DEFAULT_SERVICES.iter().map(|s| s.to_string()).collect(),
            active: true,
        }
    }
}

fn validate_row(
    row_num: usize,
    row: &SheetRow,
    seen_ids: &mut HashSet<String>,
) -> std::result::Result<PendingClinic, String> {
    let required = [
        ("Name", &row.name),
        ("Address 1", &row.address1),
        ("Town", &row.town),
        ("County", &row.county),
        ("Postcode", &row.postcode),
        ("Country", &row.country_raw),
        ("Telephone", &row.telephone),
    ];
    let missing: Vec<&str> = required
        .iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(field, _)| *field)
        .collect();
    if !missing.is_empty() {
        return Err(format!(
            "Row {row_num}: missing required field(s): {}",
            missing.join(", ")
        ));
    }

    let country = Country::normalize(&row.country_raw)
        .map_err(|_| format!("Row {row_num}: unsupported country \"{}\"", row.country_raw))?;

    let booking_url = normalize_website(&row.website_raw)
        .map_err(|_| format!("Row {row_num}: invalid website URL \"{}\"", row.website_raw))?;

    let id = slugify(&format!("{country}-{}-{}", row.town, row.name));
    if id.is_empty() {
        return Err(format!("Row {row_num}: could not create clinic id"));
    }
    if !seen_ids.insert(id.clone()) {
        return Err(format!("Row {row_num}: duplicate clinic id \"{id}\""));
    }

    let geocode_query = [
        row.address1.as_str(),
        row.address2.as_str(),
        row.town.as_str(),
        row.county.as_str(),
        row.postcode.as_str(),
        country.as_str(),
    ]
    .iter()
    .filter(|part| !part.is_empty())
    .copied()
    .collect::<Vec<_>>()
    .join(", ");

    Ok(PendingClinic {
        id,
        name: row.name.clone(),
        region: row.county.clone(),
        country,
        city: row.town.clone(),
        postcode: row.postcode.clone(),
        address1: row.address1.clone(),
        address2: (!row.address2.is_empty()).then(|| row.address2.clone()),
        phone: row.telephone.clone(),
        email: (!row.email.is_empty()).then(|| row.email.clone()),
        booking_url,
        geocode_query,
    })
}

// =============================================================================
// Geocoding with pacing, retries, and a persistent cache
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedCoordinates {
    lat: f64,
    lng: f64,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    updated_at: String,
}

fn read_cache(path: &Path) -> HashMap<String, CachedCoordinates> {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_default()
}

struct Geocoder {
    client: reqwest::Client,
    url: String,
    delay: Duration,
    last_call: Option<Instant>,
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
}

impl Geocoder {
    fn new(client: reqwest::Client, url: String, delay: Duration) -> Self {
        Self {
            client,
            url,
            delay,
            last_call: None,
        }
    }

    async fn geocode(&mut self, query: &str) -> Result<(f64, f64)> {
        let mut last_error = String::from("Unknown geocoding error");

        for attempt in 1..=GEOCODE_ATTEMPTS {
            if let Some(last) = self.last_call {
                let elapsed = last.elapsed();
                if elapsed < self.delay {
                    tokio::time::sleep(self.delay - elapsed).await;
                }
            }

            let result = self
                .client
                .get(&self.url)
                .query(&[("format", "jsonv2"), ("limit", "1"), ("q", query)])
                .header("accept", "application/json")
                .send()
                .await;
            self.last_call = Some(Instant::now());

            match result {
                Ok(response) if response.status().is_success() => {
                    match response.json::<Vec<NominatimPlace>>().await {
                        Ok(places) => {
                            if let Some(place) = places.first()
                                && let (Ok(lat), Ok(lng)) =
                                    (place.lat.parse::<f64>(), place.lon.parse::<f64>())
                                && lat.is_finite()
                                && lng.is_finite()
                            {
                                return Ok((lat, lng));
                            }
                            last_error = "No coordinates returned".to_string();
                        }
                        Err(e) => last_error = e.to_string(),
                    }
                }
                Ok(response) => last_error = format!("HTTP {}", response.status().as_u16()),
                Err(e) => last_error = e.to_string(),
            }

            if attempt < GEOCODE_ATTEMPTS {
                tokio::time::sleep(Duration::from_millis(300 * attempt as u64)).await;
            }
        }

        bail!(last_error)
    }
}

fn write_pretty_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("serialize output")?;
    std::fs::write(path, format!("{rendered}\n"))
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Name,Address 1,Address 2,Town,County,Postcode,Country,Telephone,Email,Website";

    fn sample_row() -> SheetRow {
        SheetRow {
            name: "Lice Stop".to_string(),
            address1: "1 High Street".to_string(),
            address2: String::new(),
            town: "London".to_string(),
            county: "Greater London".to_string(),
            postcode: "SW1A 1AA".to_string(),
            country_raw: "United Kingdom".to_string(),
            telephone: "020 1234 5678".to_string(),
            email: "hello@licestop.example".to_string(),
            website_raw: "licestop.example".to_string(),
        }
    }

    #[test]
    fn parse_sheet_validates_headers() {
        let err = parse_sheet("Name,Town\nLice Stop,London\n").unwrap_err();
        assert!(err.to_string().contains("Missing required headers"));
        assert!(err.to_string().contains("Address 1"));
    }

    #[test]
    fn parse_sheet_skips_blank_rows_and_numbers_from_the_sheet() {
        let csv = format!(
            "{HEADER}\nLice Stop,1 High St,,London,Greater London,SW1A 1AA,UK,020 1234,,\n,,,,,,,,,\nNit Free,2 Low St,,Leeds,West Yorkshire,LS1 1AA,UK,0113 123,,\n"
        );
        let rows = parse_sheet(&csv).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, 2);
        assert_eq!(rows[1].0, 4);
        assert_eq!(rows[1].1.town, "Leeds");
    }

    #[test]
    fn parse_sheet_handles_quoted_commas() {
        let csv = format!(
            "{HEADER}\n\"Lice, Stop\",\"1 High St, Unit 2\",,London,Greater London,SW1A 1AA,UK,020 1234,,\n"
        );
        let rows = parse_sheet(&csv).unwrap();
        assert_eq!(rows[0].1.name, "Lice, Stop");
        assert_eq!(rows[0].1.address1, "1 High St, Unit 2");
    }

    #[test]
    fn validate_row_builds_a_pending_clinic() {
        let mut seen = HashSet::new();
        let pending = validate_row(2, &sample_row(), &mut seen).unwrap();

        assert_eq!(pending.id, "uk-london-lice-stop");
        assert_eq!(pending.country, Country::Uk);
        assert_eq!(pending.region, "Greater London");
        assert_eq!(
            pending.booking_url.as_deref(),
            Some("https://licestop.example/")
        );
        assert_eq!(
            pending.geocode_query,
            "1 High Street, London, Greater London, SW1A 1AA, UK"
        );

        let clinic = pending.into_clinic(51.5, -0.12);
        assert!(clinic.active);
        assert_eq!(clinic.services, vec!["Screening", "Removal"]);
    }

    #[test]
    fn validate_row_reports_missing_fields() {
        let mut row = sample_row();
        row.telephone = String::new();
        row.postcode = String::new();

        let err = validate_row(3, &row, &mut HashSet::new()).unwrap_err();
        assert!(err.contains("Row 3"));
        assert!(err.contains("Postcode"));
        assert!(err.contains("Telephone"));
    }

    #[test]
    fn validate_row_rejects_unknown_countries_and_bad_websites() {
        let mut row = sample_row();
        row.country_raw = "France".to_string();
        let err = validate_row(2, &row, &mut HashSet::new()).unwrap_err();
        assert!(err.contains("unsupported country"));

        let mut row = sample_row();
        row.website_raw = "https://".to_string();
        let err = validate_row(2, &row, &mut HashSet::new()).unwrap_err();
        assert!(err.contains("invalid website URL"));
    }

    #[test]
    fn validate_row_rejects_duplicate_ids() {
        let mut seen = HashSet::new();
        validate_row(2, &sample_row(), &mut seen).unwrap();
        let err = validate_row(3, &sample_row(), &mut seen).unwrap_err();
        assert!(err.contains("duplicate clinic id"));
    }

    #[test]
    fn cache_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CACHE_FILE);

        let mut cache = HashMap::new();
        cache.insert(
            "1 high street, london".to_string(),
            CachedCoordinates {
                lat: 51.5,
                lng: -0.12,
                updated_at: "2026-03-01T10:00:00Z".to_string(),
            },
        );
        write_pretty_json(&path, &cache).unwrap();

        let loaded = read_cache(&path);
        assert_eq!(loaded.len(), 1);
        assert!((loaded["1 high street, london"].lat - 51.5).abs() < 1e-9);
    }

    #[test]
    fn missing_cache_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_cache(&dir.path().join(CACHE_FILE)).is_empty());
    }
}

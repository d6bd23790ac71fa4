use assert_json_diff::assert_json_include;
use nitcheck_server::{AppConfig, build_app};
use serde_json::{Value, json};
use tokio::task::JoinHandle;

async fn start_server(cfg: AppConfig) -> (String, tokio::sync::oneshot::Sender<()>, JoinHandle<()>) {
    let app = build_app(&cfg).expect("build app");

    // Bind to an ephemeral port
    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await;
    });

    (format!("http://{addr}"), tx, server)
}

fn clinic_json(id: &str, country: &str, city: &str, lat: f64, lng: f64) -> Value {
    json!({
        "id": id,
        "name": format!("{city} Lice Clinic"),
        "region": "Region",
        "country": country,
        "city": city,
        "postcode": "AB1 2CD",
        "address1": "1 High Street",
        "phone": "01234 567890",
        "email": format!("hello@{id}.example"),
        "lat": lat,
        "lng": lng,
        "services": ["Screening", "Removal"],
        "active": true
    })
}

#[tokio::test]
async fn health_and_info_endpoints_work() {
    let (base, shutdown_tx, handle) = start_server(AppConfig::default()).await;
    let client = reqwest::Client::new();

    // GET /
    let resp = client.get(format!("{base}/")).send().await.unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["service"], "NitCheck Server");
    assert_eq!(body["status"], "ok");

    // GET /healthz
    let resp = client.get(format!("{base}/healthz")).send().await.unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");

    // GET /readyz
    let resp = client.get(format!("{base}/readyz")).send().await.unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ready");

    // Responses carry a request id
    let resp = client.get(format!("{base}/healthz")).send().await.unwrap();
    assert!(resp.headers().contains_key("x-request-id"));

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn scan_status_reports_unconfigured() {
    let (base, shutdown_tx, handle) = start_server(AppConfig::default()).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{base}/api/scan/status"))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["configured"], false);
    assert_eq!(body["provider"], "none");

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn warm_inference_without_detection_service() {
    let (base, shutdown_tx, handle) = start_server(AppConfig::default()).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{base}/api/cron/warm-inference"))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["warmed"], false);

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn events_are_validated_and_accepted() {
    let (base, shutdown_tx, handle) = start_server(AppConfig::default()).await;
    let client = reqwest::Client::new();

    // Valid event
    let resp = client
        .post(format!("{base}/api/events"))
        .json(&json!({"event": "scan_result", "label": "nits", "confidenceLevel": "medium"}))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["ok"], true);

    // Unknown event name
    let resp = client
        .post(format!("{base}/api/events"))
        .json(&json!({"event": "made_up"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["ok"], false);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    // Bad confidence level
    let resp = client
        .post(format!("{base}/api/events"))
        .json(&json!({"event": "scan_result", "confidenceLevel": "huge"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn clinic_finder_filters_and_sorts() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("clinics.uk.json"),
        json!([
            clinic_json("uk-manchester", "UK", "Manchester", 53.4808, -2.2426),
            clinic_json("uk-london", "UK", "London", 51.5074, -0.1278),
        ])
        .to_string(),
    )
    .unwrap();
    std::fs::write(
        dir.path().join("clinics.us.json"),
        json!([clinic_json("us-austin", "US", "Austin", 30.2672, -97.7431)]).to_string(),
    )
    .unwrap();

    let mut cfg = AppConfig::default();
    cfg.clinics.content_dir = dir.path().to_string_lossy().to_string();
    let (base, shutdown_tx, handle) = start_server(cfg).await;
    let client = reqwest::Client::new();

    // Country filter
    let resp = client
        .get(format!("{base}/api/clinics?country=UK"))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["count"], 2);

    // Nearest-first from an explicit origin near Manchester
    let resp = client
        .get(format!(
            "{base}/api/clinics?country=UK&lat=53.48&lng=-2.24"
        ))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["clinics"][0]["id"], "uk-manchester");

    // Text query resolves an origin from the directory itself
    let resp = client
        .get(format!("{base}/api/clinics?country=UK&q=london"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["clinics"][0]["id"], "uk-london");

    // Unknown country value
    let resp = client
        .get(format!("{base}/api/clinics?country=FR"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);

    // Reload picks up new files
    std::fs::write(
        dir.path().join("clinics.us.json"),
        json!([
            clinic_json("us-austin", "US", "Austin", 30.2672, -97.7431),
            clinic_json("us-dallas", "US", "Dallas", 32.7767, -96.7970),
        ])
        .to_string(),
    )
    .unwrap();
    let resp = client
        .post(format!("{base}/api/clinics/reload"))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["total"], 4);

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn sitemap_lists_static_blog_and_location_routes() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("clinics.uk.json"),
        json!([clinic_json("uk-london", "UK", "London", 51.5074, -0.1278)]).to_string(),
    )
    .unwrap();
    std::fs::create_dir_all(dir.path().join("blog")).unwrap();
    std::fs::write(
        dir.path().join("blog").join("posts.json"),
        json!([
            {"slug": "spotting-nits-early", "isPublished": true},
            {"slug": "draft", "isPublished": false}
        ])
        .to_string(),
    )
    .unwrap();

    let mut cfg = AppConfig::default();
    cfg.clinics.content_dir = dir.path().to_string_lossy().to_string();
    let (base, shutdown_tx, handle) = start_server(cfg).await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{base}/sitemap.xml")).send().await.unwrap();
    assert!(resp.status().is_success());
    assert!(
        resp.headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("application/xml")
    );
    let body = resp.text().await.unwrap();
    assert!(body.contains("<loc>https://nitnot.com/find-clinics</loc>"));
    assert!(body.contains("<loc>https://nitnot.com/blog/spotting-nits-early</loc>"));
    assert!(!body.contains("/blog/draft"));
    assert!(body.contains("<loc>https://nitnot.com/locations/london</loc>"));

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn seo_site_endpoint_returns_json_ld() {
    let (base, shutdown_tx, handle) = start_server(AppConfig::default()).await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{base}/api/seo/site")).send().await.unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_json_include!(
        actual: body,
        expected: json!({
            "website": {"@type": "WebSite", "name": "NitNot"},
            "organization": {"@type": "Organization"},
        })
    );

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

//! SEO plumbing: JSON-LD builders and the sitemap.
//!
//! The builders are pure functions over the site config so the rendering
//! layer can fetch them ready-made instead of duplicating schema.org shapes.

use std::path::Path;

use axum::{
    Json,
    extract::State,
    http::header::CONTENT_TYPE,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::config::SiteConfig;
use crate::state::AppState;

/// Static routes the marketing site serves; the sitemap adds per-city
/// location pages from the clinic directory on top.
const STATIC_ROUTES: [&str; 17] = [
    "",
    "/how-it-works",
    "/head-lice-symptoms",
    "/nits-vs-dandruff",
    "/find-clinics",
    "/for-clinics",
    "/for-schools",
    "/faq",
    "/blog",
    "/about",
    "/contact",
    "/privacy",
    "/terms",
    "/methodology",
    "/clinical-safety",
    "/editorial-policy",
    "/locations",
];

pub fn canonical(site: &SiteConfig, path: &str) -> String {
    format!("{}{path}", site.base_url.trim_end_matches('/'))
}

pub fn website_json_ld(site: &SiteConfig) -> Value {
    json!({
        "@context": "https://schema.org",
        "@type": "WebSite",
        "name": site.name,
        "url": site.base_url,
        "potentialAction": {
            "@type": "SearchAction",
            "target": canonical(site, "/find-clinics?q={search_term_string}"),
            "query-input": "required name=search_term_string",
        },
    })
}

pub fn organization_json_ld(site: &SiteConfig) -> Value {
    json!({
        "@context": "https://schema.org",
        "@type": "Organization",
        "name": site.name,
        "url": site.base_url,
        "logo": canonical(site, "/images/logo_colour.png"),
        "contactPoint": [{
            "@type": "ContactPoint",
            "contactType": "customer support",
            "email": site.support_email,
        }],
    })
}

pub fn faq_json_ld(items: &[(String, String)]) -> Value {
    json!({
        "@context": "https://schema.org",
        "@type": "FAQPage",
        "mainEntity": items.iter().map(|(question, answer)| json!({
            "@type": "Question",
            "name": question,
            "acceptedAnswer": {
                "@type": "Answer",
                "text": answer,
            },
        })).collect::<Vec<_>>(),
    })
}

/// Metadata for one blog article.
pub struct ArticleMeta<'a> {
    pub slug: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    pub published_at: &'a str,
    pub updated_at: &'a str,
    pub author: &'a str,
    pub keywords: &'a [String],
}

pub fn article_json_ld(site: &SiteConfig, article: &ArticleMeta<'_>) -> Value {
    json!({
        "@context": "https://schema.org",
        "@type": "Article",
        "headline": article.title,
        "description": article.description,
        "datePublished": article.published_at,
        "dateModified": article.updated_at,
        "author": {
            "@type": "Person",
            "name": article.author,
        },
        "keywords": article.keywords.join(", "),
        "mainEntityOfPage": canonical(site, &format!("/blog/{}", article.slug)),
        "publisher": {
            "@type": "Organization",
            "name": site.name,
            "logo": {
                "@type": "ImageObject",
                "url": canonical(site, "/images/logo_colour.png"),
            },
        },
    })
}

/// `GET /api/seo/site` — the site-wide JSON-LD documents.
pub async fn site_json_ld(State(state): State<AppState>) -> Json<Value> {
    let site = &state.config.site;
    Json(json!({
        "website": website_json_ld(site),
        "organization": organization_json_ld(site),
    }))
}

/// One entry of `blog/posts.json` in the content dir; only the fields the
/// sitemap needs.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlogPost {
    slug: String,
    #[serde(default)]
    is_published: bool,
}

/// Slugs of published blog posts, read from the synced content dir. A
/// missing file just means no blog routes.
fn blog_slugs(content_dir: &str) -> Vec<String> {
    let path = Path::new(content_dir).join("blog").join("posts.json");
    let Ok(raw) = std::fs::read_to_string(&path) else {
        return Vec::new();
    };
    match serde_json::from_str::<Vec<BlogPost>>(&raw) {
        Ok(posts) => posts
            .into_iter()
            .filter(|post| post.is_published)
            .map(|post| post.slug)
            .collect(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "unreadable blog posts file");
            Vec::new()
        }
    }
}

/// `GET /sitemap.xml`
pub async fn sitemap(State(state): State<AppState>) -> Response {
    let site = &state.config.site;

    let mut paths: Vec<String> = STATIC_ROUTES.iter().map(|p| p.to_string()).collect();

    paths.extend(
        blog_slugs(&state.config.clinics.content_dir)
            .into_iter()
            .map(|slug| format!("/blog/{slug}")),
    );

    // One location page per city with at least one active clinic
    let clinics = state.clinics.snapshot();
    let mut cities: Vec<String> = clinics
        .iter()
        .filter(|c| c.active)
        .map(|c| nitcheck_core::clinic::slugify(&c.city))
        .filter(|slug| !slug.is_empty())
        .collect();
    cities.sort();
    cities.dedup();
    paths.extend(cities.into_iter().map(|slug| format!("/locations/{slug}")));

    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str("<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n");
    for path in &paths {
        xml.push_str("  <url><loc>");
        xml.push_str(&xml_escape(&canonical(site, path)));
        xml.push_str("</loc></url>\n");
    }
    xml.push_str("</urlset>\n");

    ([(CONTENT_TYPE, "application/xml")], xml).into_response()
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> SiteConfig {
        SiteConfig::default()
    }

    #[test]
    fn canonical_joins_without_double_slash() {
        let mut cfg = site();
        cfg.base_url = "https://nitnot.com/".to_string();
        assert_eq!(canonical(&cfg, "/faq"), "https://nitnot.com/faq");
    }

    #[test]
    fn website_json_ld_has_search_action() {
        let doc = website_json_ld(&site());
        assert_eq!(doc["@type"], "WebSite");
        assert_eq!(doc["potentialAction"]["@type"], "SearchAction");
        assert!(
            doc["potentialAction"]["target"]
                .as_str()
                .unwrap()
                .contains("{search_term_string}")
        );
    }

    #[test]
    fn faq_json_ld_maps_items() {
        let items = vec![
            ("What are nits?".to_string(), "Lice eggs.".to_string()),
            ("Is this a diagnosis?".to_string(), "No.".to_string()),
        ];
        let doc = faq_json_ld(&items);
        assert_eq!(doc["mainEntity"].as_array().unwrap().len(), 2);
        assert_eq!(doc["mainEntity"][0]["name"], "What are nits?");
        assert_eq!(doc["mainEntity"][1]["acceptedAnswer"]["text"], "No.");
    }

    #[test]
    fn article_json_ld_builds_canonical_page_url() {
        let keywords = vec!["lice".to_string(), "nits".to_string()];
        let doc = article_json_ld(
            &site(),
            &ArticleMeta {
                slug: "spotting-nits-early",
                title: "Spotting nits early",
                description: "How to check",
                published_at: "2026-01-10",
                updated_at: "2026-02-01",
                author: "NitNot Editorial",
                keywords: &keywords,
            },
        );
        assert_eq!(
            doc["mainEntityOfPage"],
            "https://nitnot.com/blog/spotting-nits-early"
        );
        assert_eq!(doc["keywords"], "lice, nits");
    }

    #[test]
    fn xml_escaping() {
        assert_eq!(xml_escape("a&b<c>"), "a&amp;b&lt;c&gt;");
    }

    #[test]
    fn blog_slugs_keep_published_posts_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("blog")).unwrap();
        std::fs::write(
            dir.path().join("blog").join("posts.json"),
            json!([
                {"slug": "spotting-nits-early", "isPublished": true},
                {"slug": "unfinished-draft", "isPublished": false},
                {"slug": "no-flag-means-draft"}
            ])
            .to_string(),
        )
        .unwrap();

        let slugs = blog_slugs(&dir.path().to_string_lossy());
        assert_eq!(slugs, vec!["spotting-nits-early"]);
    }

    #[test]
    fn blog_slugs_tolerate_missing_or_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(blog_slugs(&dir.path().to_string_lossy()).is_empty());

        std::fs::create_dir_all(dir.path().join("blog")).unwrap();
        std::fs::write(dir.path().join("blog").join("posts.json"), "not json").unwrap();
        assert!(blog_slugs(&dir.path().to_string_lossy()).is_empty());
    }
}

use crate::entry::CatalogEntry;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::fmt::Write;

pub const PROJECTS_PATH: &str = "/projects";
const PROJECT_PRIORITY: f32 = 0.95;
const XMLNS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeFreq {
    Daily,
    Weekly,
}

impl ChangeFreq {
    fn as_str(self) -> &'static str {
        match self {
            ChangeFreq::Daily => "daily",
            ChangeFreq::Weekly => "weekly",
        }
    }
}

/// One `<url>` of the sitemap. `loc` is a site-relative path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SitemapEntry {
    pub loc: String,
    pub lastmod: Option<DateTime<Utc>>,
    pub changefreq: ChangeFreq,
    pub priority: f32,
}

impl SitemapEntry {
    pub fn project(entry: &CatalogEntry) -> Self {
        Self {
            loc: format!("{}/{}", PROJECTS_PATH, entry.slug),
            lastmod: Some(entry.updated_at),
            changefreq: ChangeFreq::Weekly,
            priority: PROJECT_PRIORITY,
        }
    }

    /// Home page and the project index, stamped with the newest catalog change.
    pub fn index_pages(latest: Option<DateTime<Utc>>) -> Vec<Self> {
        vec![
            Self {
                loc: "/".to_string(),
                lastmod: latest,
                changefreq: ChangeFreq::Daily,
                priority: 1.0,
            },
            Self {
                loc: PROJECTS_PATH.to_string(),
                lastmod: latest,
                changefreq: ChangeFreq::Weekly,
                priority: 0.9,
            },
        ]
    }
}

pub fn render_sitemap(hostname: &str, entries: &[SitemapEntry]) -> String {
    let hostname = hostname.trim().trim_end_matches('/');
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let _ = writeln!(xml, "<urlset xmlns=\"{}\">", XMLNS);
    for entry in entries {
        xml.push_str("  <url>\n");
        let _ = writeln!(xml, "    <loc>{}</loc>", escape(&format!("{}{}", hostname, entry.loc)));
        if let Some(lastmod) = entry.lastmod {
            let _ = writeln!(
                xml,
                "    <lastmod>{}</lastmod>",
                lastmod.to_rfc3339_opts(SecondsFormat::Secs, true)
            );
        }
        let _ = writeln!(xml, "    <changefreq>{}</changefreq>", entry.changefreq.as_str());
        let _ = writeln!(xml, "    <priority>{:.2}</priority>", entry.priority);
        xml.push_str("  </url>\n");
    }
    xml.push_str("</urlset>\n");
    xml
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

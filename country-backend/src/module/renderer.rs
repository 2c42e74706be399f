//! Country summary renderer
//!
//! Fills a fixed-layout SVG template and rasterises it to PNG.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use resvg::tiny_skia;
use resvg::usvg::{fontdb, Options, Tree};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::country::CountryRecord;
use crate::config::RenderConfig;

const SVG_TEMPLATE: &str = include_str!("../../resources/summary_template.svg");

pub const WIDTH: u32 = 800;
pub const HEIGHT: u32 = 600;
const TOP_COUNT: usize = 5;
const FIRST_ROW_Y: f32 = 240.0;
const ROW_HEIGHT: f32 = 40.0;
const X_NAME: f32 = 60.0;
const X_VALUE: f32 = 400.0;
const MAX_NAME_CHARS: usize = 30;

pub const PLACEHOLDER: &str = "No valid GDP data available.";

/// Countries with a usable GDP, highest first, at most `limit`.
pub fn top_by_gdp(records: &[CountryRecord], limit: usize) -> Vec<&CountryRecord> {
    let mut ranked: Vec<&CountryRecord> = records
        .iter()
        .filter(|r| r.estimated_gdp.is_finite() && r.estimated_gdp > 0.0)
        .collect();
    ranked.sort_by(|a, b| b.estimated_gdp.total_cmp(&a.estimated_gdp));
    ranked.truncate(limit);
    ranked
}

/// Label for the image header; `Unknown` before the first refresh.
pub fn timestamp_label(last_refreshed_at: Option<DateTime<Utc>>) -> String {
    last_refreshed_at
        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

fn format_gdp(gdp: f64) -> String {
    format!("${:.2} billion", gdp / 1_000_000_000.0)
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn shorten(name: &str) -> String {
    if name.chars().count() <= MAX_NAME_CHARS {
        name.to_string()
    } else {
        let head: String = name.chars().take(MAX_NAME_CHARS - 1).collect();
        format!("{}…", head.trim_end())
    }
}

/// Build the SVG document for a record set.
pub fn generate_svg(records: &[CountryRecord], timestamp_label: &str) -> String {
    let top = top_by_gdp(records, TOP_COUNT);
    let mut rows = String::new();

    if top.is_empty() {
        rows.push_str(&format!(
            r#"  <text x="{}" y="{}" class="placeholder">{}</text>"#,
            X_NAME, FIRST_ROW_Y, PLACEHOLDER
        ));
        rows.push('\n');
    } else {
        for (i, country) in top.iter().enumerate() {
            let y = FIRST_ROW_Y + ROW_HEIGHT * i as f32;
            rows.push_str(&format!(
                r#"  <text x="{}" y="{}" class="row-name">{}. {}</text>
  <text x="{}" y="{}" class="row-value">{}</text>
"#,
                X_NAME, y, i + 1, escape_xml(&shorten(&country.name)),
                X_VALUE, y, format_gdp(country.estimated_gdp),
            ));
        }
    }

    SVG_TEMPLATE
        .replace("{{WIDTH}}", &WIDTH.to_string())
        .replace("{{HEIGHT}}", &HEIGHT.to_string())
        .replace("{{TIMESTAMP}}", &escape_xml(timestamp_label))
        .replace("{{TOTAL}}", &records.len().to_string())
        .replace("{{ROWS}}", &rows)
}

/// Summary image renderer. Fonts are loaded once at construction.
pub struct SummaryRenderer {
    fontdb: Arc<fontdb::Database>,
    font_family: String,
}

impl SummaryRenderer {
    pub fn new(config: &RenderConfig) -> Self {
        let mut db = fontdb::Database::new();
        if config.load_system_fonts {
            db.load_system_fonts();
        }
        if let Some(dir) = &config.font_dir {
            db.load_fonts_dir(dir);
        }

        if db.is_empty() {
            tracing::warn!("No fonts available; summary images will contain no text");
        } else {
            tracing::debug!("Loaded {} font faces", db.len());
        }

        Self::with_fontdb(db, config.font_family.clone())
    }

    pub fn with_fontdb(db: fontdb::Database, font_family: impl Into<String>) -> Self {
        Self {
            fontdb: Arc::new(db),
            font_family: font_family.into(),
        }
    }

    /// Render the summary to PNG bytes.
    pub fn render(&self, records: &[CountryRecord], timestamp_label: &str) -> Result<Vec<u8>> {
        let svg = generate_svg(records, timestamp_label);

        let mut options = Options::default();
        options.font_family = self.font_family.clone();
        options.fontdb = self.fontdb.clone();

        let tree = Tree::from_str(&svg, &options).context("Failed to parse SVG")?;

        let mut pixmap = tiny_skia::Pixmap::new(WIDTH, HEIGHT)
            .context("Failed to create pixmap")?;
        resvg::render(&tree, tiny_skia::Transform::default(), &mut pixmap.as_mut());

        pixmap.encode_png().context("Failed to encode PNG")
    }

    /// `render` on the blocking pool.
    pub async fn render_blocking(
        self: Arc<Self>,
        records: Vec<CountryRecord>,
        timestamp_label: String,
    ) -> Result<Vec<u8>> {
        tokio::task::spawn_blocking(move || self.render(&records, &timestamp_label))
            .await
            .context("Render task failed")?
    }

    /// Render and write `summary.png` into `output_dir`.
    pub async fn render_to_dir(
        self: Arc<Self>,
        records: Vec<CountryRecord>,
        timestamp_label: String,
        output_dir: impl AsRef<Path>,
    ) -> Result<PathBuf> {
        let output_dir = output_dir.as_ref();
        tokio::fs::create_dir_all(output_dir)
            .await
            .context(format!("Failed to create image directory: {:?}", output_dir))?;

        let png = self.render_blocking(records, timestamp_label).await?;
        let output_path = output_dir.join("summary.png");
        tokio::fs::write(&output_path, png)
            .await
            .context("Failed to write summary image")?;

        tracing::info!("Generated summary image: {:?}", output_path);
        Ok(output_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

    fn record(name: &str, gdp: f64) -> CountryRecord {
        CountryRecord {
            id: 0,
            name: name.to_string(),
            capital: None,
            region: None,
            population: 1,
            currency_code: None,
            exchange_rate: None,
            estimated_gdp: gdp,
            flag_url: None,
            last_refreshed_at: Utc::now(),
        }
    }

    fn renderer() -> Arc<SummaryRenderer> {
        Arc::new(SummaryRenderer::with_fontdb(fontdb::Database::new(), "sans-serif"))
    }

    #[test]
    fn test_top_by_gdp() {
        let records = vec![
            record("A", 1.0),
            record("B", 0.0),
            record("C", 7.0),
            record("D", f64::NAN),
            record("E", 3.0),
            record("F", 5.0),
            record("G", 2.0),
            record("H", 4.0),
        ];
        let names: Vec<_> = top_by_gdp(&records, 5).iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["C", "F", "H", "E", "G"]);
    }

    #[test]
    fn test_timestamp_label() {
        let ts = Utc.with_ymd_and_hms(2025, 10, 28, 12, 18, 50).unwrap();
        assert_eq!(timestamp_label(Some(ts)), "2025-10-28 12:18:50 UTC");
        assert_eq!(timestamp_label(None), "Unknown");
    }

    #[test]
    fn test_escape_and_shorten() {
        assert_eq!(escape_xml("Bosnia & <Herz>"), "Bosnia &amp; &lt;Herz&gt;");
        assert_eq!(shorten("Chad"), "Chad");
        let long = shorten("South Georgia and the South Sandwich Islands");
        assert_eq!(long.chars().count(), MAX_NAME_CHARS);
        assert!(long.ends_with('…'));
    }

    #[test]
    fn test_svg_lists_top_countries() {
        let records = vec![record("Nigeria", 187_500_000_000.0), record("Trinidad & Tobago", 2e9)];
        let svg = generate_svg(&records, "now");
        assert!(svg.contains("1. Nigeria"));
        assert!(svg.contains("$187.50 billion"));
        assert!(svg.contains("2. Trinidad &amp; Tobago"));
        assert!(svg.contains("Total Countries: 2"));
        assert!(!svg.contains(PLACEHOLDER));
        assert!(!svg.contains("{{"));
    }

    #[test]
    fn test_svg_placeholder_without_gdp() {
        let svg = generate_svg(&[record("Atlantis", 0.0)], "Unknown");
        assert!(svg.contains(PLACEHOLDER));
        assert!(svg.contains("Total Countries: 1"));
    }

    #[test]
    fn test_render_empty_is_png() {
        let png = renderer().render(&[], "Unknown").unwrap();
        assert!(png.starts_with(PNG_MAGIC));
    }

    #[tokio::test]
    async fn test_render_to_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = renderer()
            .render_to_dir(vec![record("Ghana", 3e9)], "now".to_string(), dir.path().join("images"))
            .await
            .unwrap();

        assert_eq!(path.file_name().unwrap(), "summary.png");
        let bytes = tokio::fs::read(&path).await.unwrap();
        assert!(bytes.starts_with(PNG_MAGIC));
    }
}

//! Tabular export of analysis results.

use chrono::{DateTime, Utc};
use serde::Serialize;

use tubescout_core::OutlierResult;

pub const CSV_HEADER: &str = "channel,subscribers,video_title,views,outlier_score,brand_fit,detected_game,url,published,analysis_date";

/// One flattened result row, scores pre-formatted to one decimal place.
#[derive(Debug, Clone, Serialize)]
pub struct ExportRow {
    pub channel: String,
    pub subscribers: u64,
    pub video_title: String,
    pub views: u64,
    pub outlier_score: String,
    pub brand_fit: String,
    pub detected_game: String,
    pub url: String,
    pub published: String,
    pub analysis_date: String,
}

impl ExportRow {
    #[must_use]
    pub fn from_result(result: &OutlierResult, analysis_date: DateTime<Utc>) -> Self {
        Self {
            channel: result.channel_title.clone(),
            subscribers: result.subscriber_count,
            video_title: result.video_title.clone(),
            views: result.view_count,
            outlier_score: format!("{:.1}", result.outlier_score),
            brand_fit: format!("{:.1}", result.brand_fit_score),
            detected_game: result.detected_game.clone().unwrap_or_default(),
            url: format!("https://www.youtube.com/watch?v={}", result.video_id),
            published: result.published_at.format("%Y-%m-%d").to_string(),
            analysis_date: analysis_date.format("%Y-%m-%d").to_string(),
        }
    }

    fn to_csv_line(&self) -> String {
        [
            escape(&self.channel),
            self.subscribers.to_string(),
            escape(&self.video_title),
            self.views.to_string(),
            self.outlier_score.clone(),
            self.brand_fit.clone(),
            escape(&self.detected_game),
            self.url.clone(),
            self.published.clone(),
            self.analysis_date.clone(),
        ]
        .join(",")
    }
}

/// Render results as CSV, header included, in the order given.
#[must_use]
pub fn to_csv(results: &[OutlierResult], analysis_date: DateTime<Utc>) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for result in results {
        out.push_str(&ExportRow::from_result(result, analysis_date).to_csv_line());
        out.push('\n');
    }
    out
}

// RFC 4180: quote fields containing separators or quotes, doubling quotes.
fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn result() -> OutlierResult {
        OutlierResult {
            channel_id: "UC1".to_string(),
            channel_title: "Blocky, \"Bros\"".to_string(),
            subscriber_count: 42_000,
            video_id: "abc123".to_string(),
            video_title: "FUNNY Moments #7".to_string(),
            view_count: 310_000,
            published_at: Utc.with_ymd_and_hms(2025, 5, 14, 9, 30, 0).unwrap(),
            duration_seconds: 480,
            outlier_score: 738.095,
            brand_fit_score: 7.5,
            detected_game: Some("doors".to_string()),
        }
    }

    #[test]
    fn scores_are_one_decimal() {
        let row = ExportRow::from_result(&result(), Utc::now());
        assert_eq!(row.outlier_score, "738.1");
        assert_eq!(row.brand_fit, "7.5");
    }

    #[test]
    fn url_is_canonical_watch_link() {
        let row = ExportRow::from_result(&result(), Utc::now());
        assert_eq!(row.url, "https://www.youtube.com/watch?v=abc123");
    }

    #[test]
    fn csv_escapes_commas_and_quotes() {
        let date = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let csv = to_csv(&[result()], date);
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some(CSV_HEADER));
        let row = lines.next().unwrap();
        assert!(row.starts_with("\"Blocky, \"\"Bros\"\"\",42000,"));
        assert!(row.ends_with("2025-05-14,2025-06-01"));
    }

    #[test]
    fn missing_game_is_empty_field() {
        let mut r = result();
        r.detected_game = None;
        let row = ExportRow::from_result(&r, Utc::now());
        assert_eq!(row.detected_game, "");
    }

    #[test]
    fn empty_results_yield_header_only() {
        let csv = to_csv(&[], Utc::now());
        assert_eq!(csv.lines().count(), 1);
    }
}

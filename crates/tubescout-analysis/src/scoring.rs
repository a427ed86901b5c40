//! Pure scoring functions. No I/O, no async, no shared state.
//!
//! - Outlier score measures over-performance relative to channel size:
//!   `(views / subscribers) * 100`, with a zero-subscriber guard so the
//!   result is never NaN or infinite.
//! - Brand fit is a 0–10 heuristic estimating tone compatibility with a
//!   family-friendly gaming audience, driven by the keyword lists in
//!   [`KeywordConfig`].

use tubescout_core::KeywordConfig;

/// `(views / subscribers) * 100`, or 0 when the channel reports no
/// subscribers. Never negative, never NaN.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn outlier_score(view_count: u64, subscriber_count: u64) -> f64 {
    if subscriber_count == 0 {
        return 0.0;
    }
    (view_count as f64 / subscriber_count as f64) * 100.0
}

/// Average-views-per-subscriber expressed as a percentage; same
/// zero-subscriber guard as [`outlier_score`].
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn engagement_rate(avg_views: f64, subscriber_count: u64) -> f64 {
    if subscriber_count == 0 || !avg_views.is_finite() {
        return 0.0;
    }
    (avg_views / subscriber_count as f64) * 100.0
}

/// Heuristic brand-fit score, clamped to `[0, 10]`.
///
/// Starts at 5.0 and applies fixed adjustments:
/// - +1.0 any positive-tone keyword in title or description
/// - +0.5 excited punctuation (`!`) in the title
/// - +0.5 an ALL-CAPS emphasis word in the title
/// - +1.0 any family/kid-audience term
/// - +0.5 moderate duration (60–600 s inclusive)
/// - −2.0 any adult/mature term
/// - −1.0 any horror term, unless "funny" also appears (literal rule)
/// - −1.0 very long duration (> 1800 s)
#[must_use]
pub fn brand_fit(
    title: &str,
    description: &str,
    duration_seconds: u64,
    keywords: &KeywordConfig,
) -> f64 {
    let text = format!("{} {}", title.to_lowercase(), description.to_lowercase());
    let mut score: f64 = 5.0;

    if keywords.positive.iter().any(|k| text.contains(k.as_str())) {
        score += 1.0;
    }
    if title.contains('!') {
        score += 0.5;
    }
    if has_all_caps_word(title) {
        score += 0.5;
    }
    if keywords.family.iter().any(|k| text.contains(k.as_str())) {
        score += 1.0;
    }
    if (60..=600).contains(&duration_seconds) {
        score += 0.5;
    }

    if keywords.adult.iter().any(|k| text.contains(k.as_str())) {
        score -= 2.0;
    }
    if keywords.horror.iter().any(|k| text.contains(k.as_str())) && !text.contains("funny") {
        score -= 1.0;
    }
    if duration_seconds > 1800 {
        score -= 1.0;
    }

    score.clamp(0.0, 10.0)
}

/// A video is a qualifying outlier iff its outlier score meets the threshold,
/// its brand fit meets the minimum, and it is not excluded.
#[must_use]
pub fn is_qualifying_outlier(
    outlier: f64,
    brand_fit: f64,
    excluded: bool,
    outlier_threshold: f64,
    brand_fit_minimum: f64,
) -> bool {
    !excluded && outlier >= outlier_threshold && brand_fit >= brand_fit_minimum
}

// An emphasis word is 3+ consecutive uppercase letters standing alone
// ("FUNNY Moments" counts, "TV" and "McDonald" do not).
fn has_all_caps_word(title: &str) -> bool {
    title
        .split(|c: char| !c.is_alphabetic())
        .any(|word| word.len() >= 3 && word.chars().all(|c| c.is_uppercase()))
}

//! Domain shape of what the responder sends back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentiment score in `[-1, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sentiment(f64);

impl Sentiment {
    /// Wrap a score, clamping it into `[-1, 1]`. NaN becomes neutral.
    #[must_use]
    pub fn new(score: f64) -> Self {
        if score.is_nan() {
            Self(0.0)
        } else {
            Self(score.clamp(-1.0, 1.0))
        }
    }

    #[must_use]
    pub const fn score(self) -> f64 {
        self.0
    }

    /// Human label for the score.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self.0 {
            s if s < -0.5 => "Very Negative",
            s if s < -0.1 => "Negative",
            s if s < 0.1 => "Neutral",
            s if s < 0.5 => "Positive",
            _ => "Very Positive",
        }
    }
}

/// Emotion analysis attached to a reply.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EmotionAnalysis {
    pub detected: Option<String>,
    pub opposite: Option<String>,
    pub sentiment: Option<Sentiment>,
}

impl EmotionAnalysis {
    /// Topic to ask for alternate media about: the target emotion, else the
    /// detected one.
    #[must_use]
    pub fn topic(&self) -> Option<&str> {
        self.opposite.as_deref().or(self.detected.as_deref())
    }
}

/// A successful responder reply.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Reply {
    /// Main reply text.
    pub text: String,
    /// Optional media reference (GIF URL).
    pub media_url: Option<String>,
    /// Optional follow-up or therapeutic hint, already flattened to text.
    pub suggestion: Option<String>,
    pub analysis: EmotionAnalysis,
}

impl Reply {
    /// Reply with text only.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_media(mut self, url: impl Into<String>) -> Self {
        self.media_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    #[must_use]
    pub fn with_analysis(mut self, analysis: EmotionAnalysis) -> Self {
        self.analysis = analysis;
        self
    }
}

/// One past exchange as recorded by the responder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub detected_emotion: String,
    pub opposite_emotion: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub sentiment_score: Option<f64>,
    #[serde(default)]
    pub gif_url: Option<String>,
}

impl HistoryRecord {
    /// "Sad → Happy".
    #[must_use]
    pub fn transition(&self) -> String {
        format!(
            "{} \u{2192} {}",
            capitalize(&self.detected_emotion),
            capitalize(&self.opposite_emotion)
        )
    }

    /// Coarse age relative to `now`: "Just now", "3 minutes ago", "1 day ago".
    #[must_use]
    pub fn age_label(&self, now: DateTime<Utc>) -> String {
        let elapsed = now.signed_duration_since(self.timestamp);
        let (n, unit) = if elapsed.num_days() > 0 {
            (elapsed.num_days(), "day")
        } else if elapsed.num_hours() > 0 {
            (elapsed.num_hours(), "hour")
        } else if elapsed.num_minutes() > 0 {
            (elapsed.num_minutes(), "minute")
        } else {
            return "Just now".to_string();
        };
        let plural = if n > 1 { "s" } else { "" };
        format!("{n} {unit}{plural} ago")
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn test_sentiment_labels_and_clamp() {
        assert_eq!(Sentiment::new(-0.9).label(), "Very Negative");
        assert_eq!(Sentiment::new(-0.5).label(), "Negative");
        assert_eq!(Sentiment::new(-0.1).label(), "Neutral");
        assert_eq!(Sentiment::new(0.0).label(), "Neutral");
        assert_eq!(Sentiment::new(0.1).label(), "Positive");
        assert_eq!(Sentiment::new(0.5).label(), "Very Positive");
        assert!((Sentiment::new(3.0).score() - 1.0).abs() < f64::EPSILON);
        assert!(Sentiment::new(f64::NAN).score().abs() < f64::EPSILON);
    }

    #[test]
    fn test_topic_prefers_opposite() {
        let analysis = EmotionAnalysis {
            detected: Some("sad".into()),
            opposite: Some("happy".into()),
            sentiment: None,
        };
        assert_eq!(analysis.topic(), Some("happy"));

        let detected_only = EmotionAnalysis {
            detected: Some("anxious".into()),
            ..EmotionAnalysis::default()
        };
        assert_eq!(detected_only.topic(), Some("anxious"));
        assert_eq!(EmotionAnalysis::default().topic(), None);
    }

    #[test]
    fn test_history_labels() {
        let now = Utc::now();
        let mut record = HistoryRecord {
            detected_emotion: "sad".into(),
            opposite_emotion: "happy".into(),
            timestamp: now,
            sentiment_score: None,
            gif_url: None,
        };
        assert_eq!(record.transition(), "Sad \u{2192} Happy");
        assert_eq!(record.age_label(now), "Just now");

        record.timestamp = now - Duration::minutes(1);
        assert_eq!(record.age_label(now), "1 minute ago");
        record.timestamp = now - Duration::hours(3);
        assert_eq!(record.age_label(now), "3 hours ago");
        record.timestamp = now - Duration::days(2);
        assert_eq!(record.age_label(now), "2 days ago");
    }
}

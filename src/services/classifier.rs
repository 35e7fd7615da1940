//! Review categorization.
//!
//! Reviews are sorted into a small set of categories that incident
//! detection works on. `KeywordClassifier` is the built-in implementation;
//! a model-backed classifier can be plugged in through `ReviewClassifier`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewCategory {
    PayoutDenied,
    PayoutDelayed,
    /// Account terminated over a claimed rule violation
    AccountBreach,
    PlatformIssue,
    SupportIssue,
    Positive,
    Other,
}

impl ReviewCategory {
    /// Negative categories in tie-break order.
    pub const NEGATIVE: [ReviewCategory; 5] = [
        ReviewCategory::PayoutDenied,
        ReviewCategory::PayoutDelayed,
        ReviewCategory::AccountBreach,
        ReviewCategory::PlatformIssue,
        ReviewCategory::SupportIssue,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewCategory::PayoutDenied => "payout_denied",
            ReviewCategory::PayoutDelayed => "payout_delayed",
            ReviewCategory::AccountBreach => "account_breach",
            ReviewCategory::PlatformIssue => "platform_issue",
            ReviewCategory::SupportIssue => "support_issue",
            ReviewCategory::Positive => "positive",
            ReviewCategory::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        [
            ReviewCategory::PayoutDenied,
            ReviewCategory::PayoutDelayed,
            ReviewCategory::AccountBreach,
            ReviewCategory::PlatformIssue,
            ReviewCategory::SupportIssue,
            ReviewCategory::Positive,
            ReviewCategory::Other,
        ]
        .into_iter()
        .find(|c| c.as_str() == value)
    }

    fn keywords(&self) -> &'static [&'static str] {
        match self {
            ReviewCategory::PayoutDenied => &[
                "denied",
                "refused to pay",
                "won't pay",
                "wont pay",
                "never paid",
                "not paid",
                "didn't pay",
                "withheld",
                "rejected my payout",
                "scam",
            ],
            ReviewCategory::PayoutDelayed => &[
                "delay",
                "still waiting",
                "waiting for my payout",
                "late payout",
                "slow payout",
                "still pending",
                "weeks to pay",
            ],
            ReviewCategory::AccountBreach => &[
                "breach",
                "terminated",
                "account closed",
                "violation",
                "banned",
                "consistency rule",
            ],
            ReviewCategory::PlatformIssue => &[
                "slippage",
                "outage",
                "server down",
                "froze",
                "crashed",
                "requote",
                "execution",
                "spread",
            ],
            ReviewCategory::SupportIssue => &[
                "no response",
                "ignored",
                "unresponsive",
                "ticket",
                "customer service",
                "support is",
            ],
            ReviewCategory::Positive => &[
                "fast payout",
                "paid out",
                "received my payout",
                "got paid",
                "legit",
                "recommend",
                "smooth",
            ],
            ReviewCategory::Other => &[],
        }
    }

    fn score(&self, text: &str) -> usize {
        self.keywords().iter().filter(|k| text.contains(*k)).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Classification {
    pub category: ReviewCategory,
    pub negative: bool,
    /// 0.0 - 1.0
    pub confidence: f32,
}

pub trait ReviewClassifier: Send + Sync {
    fn classify(&self, title: Option<&str>, body: &str, rating: Option<i16>) -> Classification;
}

/// Keyword-count classifier.
///
/// The negative category with the most keyword hits wins unless the review
/// is rated 4+ and has more positive than negative hits. With no keyword
/// hits the star rating alone decides.
#[derive(Debug, Default, Clone)]
pub struct KeywordClassifier;

impl ReviewClassifier for KeywordClassifier {
    fn classify(&self, title: Option<&str>, body: &str, rating: Option<i16>) -> Classification {
        let text = format!("{} {}", title.unwrap_or_default(), body).to_lowercase();

        let mut best = (ReviewCategory::Other, 0usize);
        for category in ReviewCategory::NEGATIVE {
            let score = category.score(&text);
            if score > best.1 {
                best = (category, score);
            }
        }
        let (negative_category, negative_score) = best;
        let positive_score = ReviewCategory::Positive.score(&text);
        let low_rating = rating.is_none_or(|r| r <= 3);

        if negative_score > 0 && (low_rating || negative_score > positive_score) {
            return Classification {
                category: negative_category,
                negative: true,
                confidence: keyword_confidence(negative_score),
            };
        }

        if positive_score > 0 {
            return Classification {
                category: ReviewCategory::Positive,
                negative: false,
                confidence: keyword_confidence(positive_score),
            };
        }

        match rating {
            Some(r) if r >= 4 => Classification {
                category: ReviewCategory::Positive,
                negative: false,
                confidence: 0.4,
            },
            Some(r) if r <= 2 => Classification {
                category: ReviewCategory::Other,
                negative: true,
                confidence: 0.4,
            },
            _ => Classification {
                category: ReviewCategory::Other,
                negative: false,
                confidence: 0.2,
            },
        }
    }
}

fn keyword_confidence(hits: usize) -> f32 {
    (0.5 + 0.15 * hits as f32).min(0.95)
}

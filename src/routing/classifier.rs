//! Phrase-set request classification.
//!
//! Maps free text to a [`Profile`] through an explicit table of phrase sets:
//!
//! | Profile        | Signals                                                   |
//! |----------------|-----------------------------------------------------------|
//! | `DeepAnalysis` | comparative / competitive / completeness language         |
//! | `FastCreative` | copywriting and creative-output language                  |
//! | `Precision`    | technical and quantitative language                       |
//! | `Baseline`     | nothing matched                                           |
//!
//! Each distinct phrase found scores one point for its profile; a workflow
//! stage mapped to a profile scores one more. The highest score wins and
//! ties resolve in table order. Matching is case-insensitive and only
//! counts whole words, so `"vs"` does not fire inside `"canvas"`.

use super::config::{ExtraPhrases, Profile};

const DEEP_ANALYSIS_PHRASES: &[&str] = &[
    "compare",
    "compared",
    "comparing",
    "comparison",
    "versus",
    "vs",
    "competitor",
    "competitors",
    "competitive",
    "competition",
    "comprehensive",
    "thorough",
    "thoroughly",
    "in-depth",
    "in depth",
    "deep dive",
    "analyze",
    "analyse",
    "analysis",
    "landscape",
    "swot",
    "pros and cons",
    "benchmark",
    "market research",
];

const FAST_CREATIVE_PHRASES: &[&str] = &[
    "write",
    "rewrite",
    "draft",
    "slogan",
    "tagline",
    "headline",
    "caption",
    "copy",
    "ad copy",
    "blog post",
    "social post",
    "tweet",
    "email",
    "newsletter",
    "story",
    "creative",
    "brainstorm",
    "catchy",
    "jingle",
    "script",
    "tone of voice",
];

const PRECISION_PHRASES: &[&str] = &[
    "calculate",
    "estimate",
    "budget",
    "roi",
    "percentage",
    "percent",
    "kpi",
    "kpis",
    "metrics",
    "forecast",
    "conversion rate",
    "cpc",
    "cpm",
    "ctr",
    "cac",
    "ltv",
    "statistics",
    "formula",
    "spreadsheet",
    "how many",
    "exact",
    "exactly",
    "technical",
    "api",
    "schema",
    "seo",
];

/// One row of the phrase table.
#[derive(Debug, Clone, PartialEq)]
pub struct PhraseRule {
    /// Profile this row votes for.
    pub profile: Profile,
    /// Lowercase phrases.
    pub phrases: Vec<String>,
}

/// Result of classifying one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// Winning profile.
    pub profile: Profile,
    /// Winning score (0 for [`Profile::Baseline`]).
    pub score: usize,
    /// Phrases that matched for the winning profile.
    pub matched: Vec<String>,
    /// Whether the workflow stage contributed to the winning profile.
    pub stage_bonus: bool,
    /// Score per table row, in table order.
    pub scores: Vec<(Profile, usize)>,
}

/// Ordered phrase-set table. Row order is the tie-break order.
///
/// # Panics
///
/// This type and its methods never panic.
#[derive(Debug, Clone, PartialEq)]
pub struct PhraseTable {
    rules: Vec<PhraseRule>,
}

impl Default for PhraseTable {
    fn default() -> Self {
        let row = |profile, phrases: &[&str]| PhraseRule {
            profile,
            phrases: phrases.iter().map(|p| p.to_string()).collect(),
        };
        Self {
            rules: vec![
                row(Profile::DeepAnalysis, DEEP_ANALYSIS_PHRASES),
                row(Profile::FastCreative, FAST_CREATIVE_PHRASES),
                row(Profile::Precision, PRECISION_PHRASES),
            ],
        }
    }
}

impl PhraseTable {
    /// Build a table from explicit rows.
    pub fn new(rules: Vec<PhraseRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|r| PhraseRule {
                profile: r.profile,
                phrases: normalise(r.phrases),
            })
            .collect();
        Self { rules }
    }

    /// Append operator-configured phrases to the matching rows.
    pub fn with_extra(mut self, extra: &ExtraPhrases) -> Self {
        for rule in &mut self.rules {
            let more = match rule.profile {
                Profile::DeepAnalysis => &extra.deep_analysis,
                Profile::FastCreative => &extra.fast_creative,
                Profile::Precision => &extra.precision,
                Profile::Baseline => continue,
            };
            for phrase in normalise(more.clone()) {
                if !rule.phrases.contains(&phrase) {
                    rule.phrases.push(phrase);
                }
            }
        }
        self
    }

    /// Table rows, in tie-break order.
    pub fn rules(&self) -> &[PhraseRule] {
        &self.rules
    }

    /// Classify `texts` (query, context, stage context, …).
    ///
    /// # Arguments
    ///
    /// * `texts` — Text sources matched as one haystack.
    /// * `stage_profile` — Profile mapped from the workflow stage, if any.
    pub fn classify(&self, texts: &[&str], stage_profile: Option<Profile>) -> Classification {
        let haystack = texts.join("\n").to_lowercase();

        let mut best: Option<(usize, usize, Vec<String>, bool)> = None;
        let mut scores = Vec::with_capacity(self.rules.len());

        for (idx, rule) in self.rules.iter().enumerate() {
            let matched: Vec<String> = rule
                .phrases
                .iter()
                .filter(|p| contains_phrase(&haystack, p))
                .cloned()
                .collect();
            let bonus = stage_profile == Some(rule.profile);
            let score = matched.len() + usize::from(bonus);
            scores.push((rule.profile, score));

            let better = match &best {
                None => score > 0,
                Some((_, best_score, _, _)) => score > *best_score,
            };
            if better {
                best = Some((idx, score, matched, bonus));
            }
        }

        match best {
            Some((idx, score, matched, stage_bonus)) => Classification {
                profile: self.rules[idx].profile,
                score,
                matched,
                stage_bonus,
                scores,
            },
            None => Classification {
                profile: Profile::Baseline,
                score: 0,
                matched: Vec::new(),
                stage_bonus: false,
                scores,
            },
        }
    }
}

fn normalise(phrases: Vec<String>) -> Vec<String> {
    phrases
        .into_iter()
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect()
}

/// `true` if `phrase` occurs in `haystack` bounded by non-alphanumeric
/// characters (or the ends of the string). Both inputs must be lowercase.
fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    haystack.match_indices(phrase).any(|(start, _)| {
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = haystack[start + phrase.len()..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        before_ok && after_ok
    })
}

// ── Tests ──────────────────────────────────────────────────────────────

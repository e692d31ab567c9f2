//! Splitting of delimited group paths and platform inference.

use crate::schema::Platform;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Which delimiter set a path uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathStyle {
    /// `/`, `|` and a standalone ` I `.
    Slashed,
    /// Everything `Slashed` splits on, plus `->` and `→`.
    Arrowed,
}

fn slashed_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*/\s*|\s*\|\s*|\s+I\s+").expect("invalid path regex"))
}

fn arrowed_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\s*/\s*|\s*\|\s*|\s+I\s+|\s*(?:->|→)\s*").expect("invalid arrow path regex")
    })
}

/// The first three levels of a path, plus anything deeper.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HierarchyPath {
    pub levels: [String; 3],
    pub rest: Vec<String>,
}

impl HierarchyPath {
    pub fn level(&self, idx: usize) -> &str {
        self.levels.get(idx).map(String::as_str).unwrap_or("")
    }

    /// Segments past the third level, joined back with ` / `.
    pub fn rest_label(&self) -> String {
        self.rest.join(" / ")
    }
}

/// Splits a group path; missing levels come back as empty strings.
pub fn split_path(path: &str, style: PathStyle) -> HierarchyPath {
    let re = match style {
        PathStyle::Slashed => slashed_re(),
        PathStyle::Arrowed => arrowed_re(),
    };

    let trimmed = path.trim();
    if trimmed.is_empty() {
        return HierarchyPath::default();
    }

    let mut segments = re.split(trimmed).map(|s| s.trim().to_string());
    let levels = [
        segments.next().unwrap_or_default(),
        segments.next().unwrap_or_default(),
        segments.next().unwrap_or_default(),
    ];
    HierarchyPath {
        levels,
        rest: segments.filter(|s| !s.is_empty()).collect(),
    }
}

const LINKEDIN_MARKERS: &[&str] = &[
    "linkedin",
    "convo",
    "spotlight",
    "si ads",
    "thought leadership",
];
const GOOGLE_MARKERS: &[&str] = &[
    "google",
    "search",
    "pmax",
    "performance max",
    "display",
    "rda",
];
const META_MARKERS: &[&str] = &["meta", "facebook", "instagram"];

/// Infers the ad platform from a group path and campaign name.
/// LinkedIn markers are checked first, then Google, then Meta.
pub fn infer_platform(group_path: &str, campaign: &str) -> Platform {
    let text = format!("{} {}", group_path, campaign).to_lowercase();
    let contains_any = |markers: &[&str]| markers.iter().any(|m| text.contains(m));

    if contains_any(LINKEDIN_MARKERS) {
        Platform::LinkedIn
    } else if contains_any(GOOGLE_MARKERS) {
        Platform::Google
    } else if contains_any(META_MARKERS) {
        Platform::Meta
    } else {
        Platform::Other
    }
}

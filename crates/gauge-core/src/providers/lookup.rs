//! Read-only collaborator boundaries: user profiles, question templates,
//! difficulty keywords. The core consumes these through narrow traits; the
//! in-memory implementations back tests and offline runs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

pub const MAX_TEMPLATE_RESULTS: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub self_level: String,
    pub experience_years: u32,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_score: Option<f64>,
}

impl UserProfile {
    /// Safe default when no profile exists: beginner, no interests, no
    /// previous score. Generation still works, just unpersonalized.
    pub fn default_for(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            self_level: "beginner".to_string(),
            experience_years: 0,
            interests: vec![],
            previous_score: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionTemplate {
    pub id: String,
    pub stem_pattern: String,
    pub category: String,
    pub difficulty: u8,
    #[serde(default)]
    pub tags: Vec<String>,
}

pub trait ProfileProvider: Send + Sync {
    fn lookup(&self, user_id: &str) -> Option<UserProfile>;

    fn profile_or_default(&self, user_id: &str) -> UserProfile {
        self.lookup(user_id)
            .unwrap_or_else(|| UserProfile::default_for(user_id))
    }
}

pub trait TemplateCatalog: Send + Sync {
    /// Up to [`MAX_TEMPLATE_RESULTS`] candidates, ranked by interest overlap
    /// (desc) then difficulty distance (asc).
    fn search(&self, interests: &[String], difficulty: u8, category: &str) -> Vec<QuestionTemplate>;
}

pub trait KeywordLookup: Send + Sync {
    fn keywords_for(&self, difficulty: u8, category: &str) -> Vec<String>;
}

#[derive(Default, Clone)]
pub struct InMemoryProfiles {
    profiles: HashMap<String, UserProfile>,
}

impl InMemoryProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(mut self, profile: UserProfile) -> Self {
        self.profiles.insert(profile.user_id.clone(), profile);
        self
    }
}

impl ProfileProvider for InMemoryProfiles {
    fn lookup(&self, user_id: &str) -> Option<UserProfile> {
        self.profiles.get(user_id).cloned()
    }
}

#[derive(Default, Clone)]
pub struct InMemoryTemplates {
    templates: Vec<QuestionTemplate>,
}

impl InMemoryTemplates {
    pub fn new(templates: Vec<QuestionTemplate>) -> Self {
        Self { templates }
    }
}

impl TemplateCatalog for InMemoryTemplates {
    fn search(&self, interests: &[String], difficulty: u8, category: &str) -> Vec<QuestionTemplate> {
        let mut ranked: Vec<(usize, u8, QuestionTemplate)> = self
            .templates
            .iter()
            .filter(|t| category.is_empty() || t.category == category)
            .map(|t| {
                let overlap = t
                    .tags
                    .iter()
                    .filter(|tag| interests.iter().any(|i| i.eq_ignore_ascii_case(tag)))
                    .count();
                let distance = t.difficulty.abs_diff(difficulty);
                (overlap, distance, t.clone())
            })
            .collect();
        ranked.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        ranked
            .into_iter()
            .take(MAX_TEMPLATE_RESULTS)
            .map(|(_, _, t)| t)
            .collect()
    }
}

#[derive(Default, Clone)]
pub struct InMemoryKeywords {
    // (category, difficulty band) -> keywords
    by_category: HashMap<String, Vec<(u8, Vec<String>)>>,
}

impl InMemoryKeywords {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, category: &str, difficulty: u8, keywords: Vec<String>) -> Self {
        self.by_category
            .entry(category.to_string())
            .or_default()
            .push((difficulty, keywords));
        self
    }
}

impl KeywordLookup for InMemoryKeywords {
    fn keywords_for(&self, difficulty: u8, category: &str) -> Vec<String> {
        let Some(entries) = self.by_category.get(category) else {
            return vec![];
        };
        // closest difficulty band wins
        entries
            .iter()
            .min_by_key(|(d, _)| d.abs_diff(difficulty))
            .map(|(_, kws)| kws.clone())
            .unwrap_or_default()
    }
}

/// Bundle handed to tools; read-mostly, cheap to clone.
#[derive(Clone)]
pub struct LookupProviders {
    pub profiles: Arc<dyn ProfileProvider>,
    pub templates: Arc<dyn TemplateCatalog>,
    pub keywords: Arc<dyn KeywordLookup>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(id: &str, difficulty: u8, tags: &[&str]) -> QuestionTemplate {
        QuestionTemplate {
            id: id.to_string(),
            stem_pattern: format!("Explain {{topic}} ({})", id),
            category: "rust".to_string(),
            difficulty,
            tags: tags.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_missing_profile_gets_safe_defaults() {
        let provider = InMemoryProfiles::new();
        let p = provider.profile_or_default("ghost");
        assert_eq!(p.self_level, "beginner");
        assert!(p.interests.is_empty());
        assert!(p.previous_score.is_none());
    }

    #[test]
    fn test_template_ranking_overlap_then_distance() {
        let catalog = InMemoryTemplates::new(vec![
            template("t-far", 9, &["async"]),
            template("t-near", 5, &["async"]),
            template("t-nomatch", 5, &["gui"]),
        ]);
        let hits = catalog.search(&["async".to_string()], 5, "rust");
        assert_eq!(hits[0].id, "t-near");
        assert_eq!(hits[1].id, "t-far");
        assert_eq!(hits[2].id, "t-nomatch");
    }

    #[test]
    fn test_template_result_cap() {
        let many: Vec<QuestionTemplate> =
            (0..20).map(|i| template(&format!("t{}", i), 5, &[])).collect();
        let catalog = InMemoryTemplates::new(many);
        assert_eq!(catalog.search(&[], 5, "rust").len(), MAX_TEMPLATE_RESULTS);
    }

    #[test]
    fn test_keyword_closest_band() {
        let kws = InMemoryKeywords::new()
            .with_entry("rust", 2, vec!["variable".into()])
            .with_entry("rust", 8, vec!["pin".into(), "variance".into()]);
        assert_eq!(kws.keywords_for(7, "rust"), vec!["pin", "variance"]);
        assert_eq!(kws.keywords_for(1, "rust"), vec!["variable"]);
        assert!(kws.keywords_for(5, "python").is_empty());
    }
}

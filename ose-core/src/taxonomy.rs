//! Signal taxonomy and normalizer
//!
//! A taxonomy is a fixed, versioned table mapping free-form article tags to
//! canonical signal categories, each tagged positive or negative:
//! - Built once from configuration, never mutated afterwards
//! - Lookups fold case, accents and separators ("Levée de fonds" == "levee-de-fonds")
//! - Unmapped tags resolve to `None` and never reach the aggregates

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::{ActivityEvent, ConfigError};

/// Direction of a signal category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Positive,
    Negative,
}

/// A canonical signal category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalCategory {
    /// Stable identifier, used in feature names (`[a-z0-9_]+`)
    pub id: String,
    /// Positive or negative signal
    pub polarity: Polarity,
    /// Human-readable label
    #[serde(default)]
    pub label: Option<String>,
    /// Raw tags that map to this category (the id always maps too)
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Taxonomy as written in configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonomyConfig {
    pub version: String,
    pub categories: Vec<SignalCategory>,
}

/// A validated, immutable taxonomy
#[derive(Debug, Clone)]
pub struct Taxonomy {
    version: String,
    /// Sorted by id
    categories: Vec<SignalCategory>,
    /// Folded raw tag -> index into `categories`
    lookup: HashMap<String, usize>,
    fingerprint: String,
}

static SEPARATOR_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\s_\-]+").unwrap());

static CATEGORY_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9_]*$").unwrap());

/// Fold a raw tag into its lookup key
pub fn fold_category(raw: &str) -> String {
    let mut folded = String::with_capacity(raw.len());
    for c in raw.trim().to_lowercase().chars() {
        match c {
            'à' | 'â' | 'ä' | 'á' | 'ã' => folded.push('a'),
            'ç' => folded.push('c'),
            'é' | 'è' | 'ê' | 'ë' => folded.push('e'),
            'î' | 'ï' | 'í' | 'ì' => folded.push('i'),
            'ô' | 'ö' | 'ó' | 'ò' | 'õ' => folded.push('o'),
            'ù' | 'û' | 'ü' | 'ú' => folded.push('u'),
            'ÿ' => folded.push('y'),
            'œ' => folded.push_str("oe"),
            'æ' => folded.push_str("ae"),
            _ => folded.push(c),
        }
    }

    SEPARATOR_REGEX.replace_all(&folded, " ").trim().to_string()
}

impl Taxonomy {
    /// Validate a taxonomy configuration
    pub fn from_config(config: &TaxonomyConfig) -> Result<Self, ConfigError> {
        if config.version.trim().is_empty() {
            return Err(ConfigError::Invalid("taxonomy version is empty".to_string()));
        }
        if config.categories.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "taxonomy {} declares no categories",
                config.version
            )));
        }

        let mut categories = config.categories.clone();
        categories.sort_by(|a, b| a.id.cmp(&b.id));

        for pair in categories.windows(2) {
            if pair[0].id == pair[1].id {
                return Err(ConfigError::Invalid(format!(
                    "duplicate taxonomy category: {}",
                    pair[0].id
                )));
            }
        }

        let mut lookup: HashMap<String, usize> = HashMap::new();
        for (idx, category) in categories.iter().enumerate() {
            if !CATEGORY_ID_REGEX.is_match(&category.id) {
                return Err(ConfigError::Invalid(format!(
                    "invalid category id {:?} (expected [a-z0-9_]+)",
                    category.id
                )));
            }

            let keys = std::iter::once(category.id.as_str())
                .chain(category.aliases.iter().map(String::as_str))
                .map(fold_category)
                .filter(|k| !k.is_empty());

            for key in keys {
                match lookup.get(&key) {
                    Some(&existing) if existing != idx => {
                        return Err(ConfigError::Invalid(format!(
                            "tag {:?} maps to both {} and {}",
                            key, categories[existing].id, category.id
                        )));
                    }
                    _ => {
                        lookup.insert(key, idx);
                    }
                }
            }
        }

        let fingerprint = Self::compute_fingerprint(&config.version, &categories, &lookup);

        Ok(Self {
            version: config.version.clone(),
            categories,
            lookup,
            fingerprint,
        })
    }

    fn compute_fingerprint(
        version: &str,
        categories: &[SignalCategory],
        lookup: &HashMap<String, usize>,
    ) -> String {
        let mut entries: Vec<(&str, &str)> = lookup
            .iter()
            .map(|(key, &idx)| (key.as_str(), categories[idx].id.as_str()))
            .collect();
        entries.sort_unstable();

        let mut hasher = Sha256::new();
        hasher.update(version.as_bytes());
        for category in categories {
            hasher.update(category.id.as_bytes());
            hasher.update([category.polarity as u8]);
        }
        for (key, id) in entries {
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(id.as_bytes());
        }
        format!("{:x}", hasher.finalize())[..16].to_string()
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Content hash of the mapping table
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// All categories, sorted by id
    pub fn categories(&self) -> &[SignalCategory] {
        &self.categories
    }

    pub fn category(&self, id: &str) -> Option<&SignalCategory> {
        self.categories
            .binary_search_by(|c| c.id.as_str().cmp(id))
            .ok()
            .map(|idx| &self.categories[idx])
    }

    pub fn polarity_of(&self, id: &str) -> Option<Polarity> {
        self.category(id).map(|c| c.polarity)
    }

    pub fn by_polarity(&self, polarity: Polarity) -> impl Iterator<Item = &SignalCategory> {
        self.categories.iter().filter(move |c| c.polarity == polarity)
    }

    /// Map a raw tag to its canonical category
    pub fn resolve(&self, raw_category: &str) -> Option<&SignalCategory> {
        self.lookup
            .get(&fold_category(raw_category))
            .map(|&idx| &self.categories[idx])
    }

    /// Return the event with its canonical category filled in (or `None`)
    pub fn normalize(&self, event: &ActivityEvent) -> ActivityEvent {
        let canonical = self.resolve(&event.raw_category).map(|c| c.id.clone());
        ActivityEvent {
            canonical_category: canonical,
            ..event.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn taxonomy() -> Taxonomy {
        Taxonomy::from_config(&TaxonomyConfig {
            version: "test-v1".to_string(),
            categories: vec![
                SignalCategory {
                    id: "recrutement".to_string(),
                    polarity: Polarity::Positive,
                    label: None,
                    aliases: vec!["Recrutement".to_string(), "Embauche".to_string()],
                },
                SignalCategory {
                    id: "investissement".to_string(),
                    polarity: Polarity::Positive,
                    label: None,
                    aliases: vec!["Investissements".to_string(), "Levée de fonds".to_string()],
                },
                SignalCategory {
                    id: "licenciement".to_string(),
                    polarity: Polarity::Negative,
                    label: None,
                    aliases: vec!["Plan social".to_string()],
                },
            ],
        })
        .unwrap()
    }

    #[test]
    fn test_fold_category() {
        assert_eq!(fold_category("  Levée de   fonds "), "levee de fonds");
        assert_eq!(fold_category("levee-de_fonds"), "levee de fonds");
        assert_eq!(fold_category("ŒUVRE"), "oeuvre");
    }

    #[test]
    fn test_resolve_aliases() {
        let taxonomy = taxonomy();
        assert_eq!(taxonomy.resolve("Investissements").unwrap().id, "investissement");
        assert_eq!(taxonomy.resolve("LEVEE DE FONDS").unwrap().id, "investissement");
        assert_eq!(taxonomy.resolve("plan-social").unwrap().polarity, Polarity::Negative);
        assert!(taxonomy.resolve("Météo").is_none());
    }

    #[test]
    fn test_categories_sorted() {
        let taxonomy = taxonomy();
        let ids: Vec<_> = taxonomy.categories().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["investissement", "licenciement", "recrutement"]);
        assert_eq!(taxonomy.by_polarity(Polarity::Positive).count(), 2);
    }

    #[test]
    fn test_normalize_keeps_unrecognized_event() {
        let taxonomy = taxonomy();
        let event = ActivityEvent {
            company_id: "c1".to_string(),
            raw_category: "Inconnu".to_string(),
            canonical_category: None,
            event_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            source: "news".to_string(),
        };
        let normalized = taxonomy.normalize(&event);
        assert_eq!(normalized.canonical_category, None);
        assert_eq!(normalized.raw_category, "Inconnu");
    }

    #[test]
    fn test_alias_collision_rejected() {
        let config = TaxonomyConfig {
            version: "bad".to_string(),
            categories: vec![
                SignalCategory {
                    id: "a".to_string(),
                    polarity: Polarity::Positive,
                    label: None,
                    aliases: vec!["Shared".to_string()],
                },
                SignalCategory {
                    id: "b".to_string(),
                    polarity: Polarity::Negative,
                    label: None,
                    aliases: vec!["shared".to_string()],
                },
            ],
        };
        assert!(Taxonomy::from_config(&config).is_err());
    }

    #[test]
    fn test_fingerprint_stable() {
        assert_eq!(taxonomy().fingerprint(), taxonomy().fingerprint());
        assert_eq!(taxonomy().fingerprint().len(), 16);
    }
}

//! Built-in crop biology table and name matching.
//!
//! Matching runs three passes over the table in declaration order: exact normalized
//! key, then prefix, then substring. The first hit of the earliest pass wins.

use super::CropBiologyProfile;

/// Queries shorter than this never match as a fragment of a longer table key.
const MIN_FRAGMENT_LEN: usize = 3;

const fn profile(
    ideal_temperature_c: f64,
    ideal_humidity_pct: f64,
    temperature_sensitivity: f64,
    humidity_sensitivity: f64,
    shelf_life_days: f64,
) -> CropBiologyProfile {
    CropBiologyProfile {
        ideal_temperature_c,
        ideal_humidity_pct,
        temperature_sensitivity,
        humidity_sensitivity,
        shelf_life_days,
    }
}

const BUILTIN_PROFILES: &[(&str, CropBiologyProfile)] = &[
    ("wheat", profile(12.0, 60.0, 0.08, 0.05, 180.0)),
    ("rice", profile(13.0, 65.0, 0.08, 0.05, 180.0)),
    ("paddy", profile(13.0, 65.0, 0.08, 0.05, 180.0)),
    ("maize", profile(12.0, 60.0, 0.09, 0.06, 150.0)),
    ("corn", profile(12.0, 60.0, 0.09, 0.06, 150.0)),
    ("soybean", profile(10.0, 60.0, 0.08, 0.05, 240.0)),
    ("cotton", profile(20.0, 55.0, 0.04, 0.03, 365.0)),
    ("potato", profile(4.0, 90.0, 0.12, 0.08, 120.0)),
    ("onion", profile(2.0, 68.0, 0.10, 0.06, 150.0)),
    ("tomato", profile(12.0, 90.0, 0.15, 0.10, 14.0)),
    ("banana", profile(14.0, 90.0, 0.18, 0.08, 21.0)),
    ("mango", profile(13.0, 88.0, 0.16, 0.09, 21.0)),
    ("apple", profile(1.0, 92.0, 0.10, 0.06, 180.0)),
];

/// Lowercases, trims and collapses inner whitespace.
pub fn normalize_crop_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

#[derive(Clone, Debug)]
pub struct ProfileIndex {
    entries: Vec<(String, CropBiologyProfile)>,
}

impl Default for ProfileIndex {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ProfileIndex {
    pub fn builtin() -> Self {
        Self::new(BUILTIN_PROFILES.iter().map(|(name, profile)| (*name, *profile)))
    }

    pub fn new<'a>(entries: impl IntoIterator<Item = (&'a str, CropBiologyProfile)>) -> Self {
        let mut index = Self { entries: Vec::new() };
        for (name, profile) in entries {
            let key = normalize_crop_name(name);
            if !key.is_empty() && index.entries.iter().all(|(existing, _)| existing != &key) {
                index.entries.push((key, profile));
            }
        }
        index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the matched table key together with its profile.
    pub fn lookup(&self, crop_name: &str) -> Option<(&str, CropBiologyProfile)> {
        let query = normalize_crop_name(crop_name);
        if query.is_empty() {
            return None;
        }
        let fragment_allowed = query.chars().count() >= MIN_FRAGMENT_LEN;

        let exact = |key: &str| key == query;
        let prefix = |key: &str| {
            query.starts_with(key) || (fragment_allowed && key.starts_with(query.as_str()))
        };
        let substring = |key: &str| {
            query.contains(key) || (fragment_allowed && key.contains(query.as_str()))
        };

        self.find(exact).or_else(|| self.find(prefix)).or_else(|| self.find(substring))
    }

    fn find(&self, matches: impl Fn(&str) -> bool) -> Option<(&str, CropBiologyProfile)> {
        self.entries
            .iter()
            .find(|(key, _)| matches(key))
            .map(|(key, profile)| (key.as_str(), *profile))
    }
}

#[cfg(test)]
mod tests {
    use super::{normalize_crop_name, profile, ProfileIndex};

    #[test]
    fn normalization_is_case_and_whitespace_insensitive() {
        assert_eq!(normalize_crop_name("  Basmati   RICE "), "basmati rice");
        assert_eq!(normalize_crop_name(""), "");
    }

    #[test]
    fn exact_match_is_case_insensitive() {
        let index = ProfileIndex::builtin();
        let (key, found) = index.lookup("WHEAT").expect("wheat should be present");

        assert_eq!(key, "wheat");
        assert_eq!(found.ideal_temperature_c, 12.0);
        assert_eq!(found.shelf_life_days, 180.0);
    }

    #[test]
    fn prefix_pass_runs_before_substring_pass() {
        let index = ProfileIndex::new([
            ("sweet potato", profile(13.0, 85.0, 0.10, 0.05, 120.0)),
            ("potato", profile(4.0, 90.0, 0.12, 0.08, 120.0)),
        ]);

        // "potato" is a substring of the first key but the prefix of the second
        let (key, _) = index.lookup("potatoes").expect("should match");
        assert_eq!(key, "potato");
    }

    #[test]
    fn substring_pass_matches_qualified_names() {
        let index = ProfileIndex::builtin();
        let (key, _) = index.lookup("Basmati Rice").expect("should match rice");

        assert_eq!(key, "rice");
    }

    #[test]
    fn short_fragments_do_not_match_longer_keys() {
        let index = ProfileIndex::builtin();

        assert!(index.lookup("ma").is_none());
        assert!(index.lookup("").is_none());
        assert!(index.lookup("dragonfruit").is_none());
    }

    #[test]
    fn duplicate_keys_keep_the_first_declaration() {
        let index = ProfileIndex::new([
            ("Wheat", profile(12.0, 60.0, 0.08, 0.05, 180.0)),
            ("wheat ", profile(20.0, 40.0, 0.20, 0.10, 30.0)),
        ]);

        assert_eq!(index.len(), 1);
        assert_eq!(index.lookup("wheat").map(|(_, p)| p.ideal_temperature_c), Some(12.0));
    }
}

//! Country Name Normalization
//! Reconciles the different spellings sources use for the same country.
//!
//! A name is first reduced to a normalized form (lower case, `_`/`-` as
//! spaces, punctuation dropped, Latin diacritics folded, whitespace
//! collapsed) and then looked up in an alias table mapping known variants to
//! one canonical normalized name. The built-in table covers the ECDC and
//! ISO 3166 spellings; callers extend it with [`CountryNameNormalizer::add_alias`]
//! (the `[aliases]` section of the config file).

use std::collections::HashMap;

/// Longest alias chain followed when resolving a name; longer chains are
/// cycles.
const MAX_ALIAS_HOPS: usize = 8;

/// Built-in `variant => canonical` pairs. Both sides are normalized on load,
/// so they can be written in any casing or punctuation.
const BUILTIN_ALIASES: &[(&str, &str)] = &[
    // United States
    ("US", "United States of America"),
    ("USA", "United States of America"),
    ("United States", "United States of America"),
    ("United_States_of_America", "United States of America"),
    // United Kingdom
    ("UK", "United Kingdom of Great Britain and Northern Ireland"),
    ("United Kingdom", "United Kingdom of Great Britain and Northern Ireland"),
    ("Great Britain", "United Kingdom of Great Britain and Northern Ireland"),
    // Federations and republics with formal ISO names
    ("Russia", "Russian Federation"),
    ("South Korea", "Korea, Republic of"),
    ("Korea, South", "Korea, Republic of"),
    ("Republic of Korea", "Korea, Republic of"),
    ("North Korea", "Korea, Democratic People's Republic of"),
    ("Iran", "Iran (Islamic Republic of)"),
    ("Syria", "Syrian Arab Republic"),
    ("Vietnam", "Viet Nam"),
    ("Laos", "Lao People's Democratic Republic"),
    ("Moldova", "Moldova, Republic of"),
    ("Republic of Moldova", "Moldova, Republic of"),
    ("Bolivia", "Bolivia (Plurinational State of)"),
    ("Venezuela", "Venezuela (Bolivarian Republic of)"),
    ("Tanzania", "Tanzania, United Republic of"),
    ("United Republic of Tanzania", "Tanzania, United Republic of"),
    ("Brunei", "Brunei Darussalam"),
    ("Taiwan", "Taiwan, Province of China"),
    ("Palestine", "Palestine, State of"),
    ("Micronesia", "Micronesia (Federated States of)"),
    // Congo
    ("Democratic Republic of the Congo", "Congo, Democratic Republic of the"),
    ("DR Congo", "Congo, Democratic Republic of the"),
    ("Congo (Kinshasa)", "Congo, Democratic Republic of the"),
    ("Republic of the Congo", "Congo"),
    ("Congo (Brazzaville)", "Congo"),
    // Spelling variants
    ("Cote dIvoire", "Cote d'Ivoire"),
    ("Ivory Coast", "Cote d'Ivoire"),
    ("Cape Verde", "Cabo Verde"),
    ("Czech Republic", "Czechia"),
    ("Swaziland", "Eswatini"),
    ("Macedonia", "North Macedonia"),
    ("Vatican", "Holy See"),
    ("Vatican City", "Holy See"),
    ("Timor Leste", "Timor-Leste"),
    ("East Timor", "Timor-Leste"),
    ("Guinea Bissau", "Guinea-Bissau"),
    ("Burma", "Myanmar"),
    ("Falkland Islands", "Falkland Islands (Malvinas)"),
    ("Sint Maarten", "Sint Maarten (Dutch part)"),
    ("Saint Martin", "Saint Martin (French part)"),
    ("Bonaire, Saint Eustatius and Saba", "Bonaire, Sint Eustatius and Saba"),
    ("Bonaire", "Bonaire, Sint Eustatius and Saba"),
    ("Turks and Caicos islands", "Turks and Caicos Islands"),
    ("British Virgin Islands", "Virgin Islands (British)"),
    ("United States Virgin Islands", "Virgin Islands (U.S.)"),
    ("Bahamas, The", "Bahamas"),
    ("Gambia, The", "Gambia"),
];

/// Normalize a country name for comparison.
pub fn normalize_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;

    for ch in raw.chars() {
        let ch = fold_diacritic(ch);
        if ch.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(ch.to_lowercase());
        } else if ch.is_whitespace() || ch == '_' || ch == '-' || ch == '/' {
            pending_space = true;
        } else if ch == '(' || ch == ')' || ch == ',' {
            // separators between words, never inside one
            pending_space = true;
        }
        // everything else (apostrophes, periods, ...) is dropped
    }

    out
}

fn fold_diacritic(ch: char) -> char {
    match ch {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' => 'A',
        'ç' => 'c',
        'Ç' => 'C',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'È' | 'É' | 'Ê' | 'Ë' => 'E',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'Ì' | 'Í' | 'Î' | 'Ï' => 'I',
        'ñ' => 'n',
        'Ñ' => 'N',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => 'o',
        'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' => 'O',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'Ù' | 'Ú' | 'Û' | 'Ü' => 'U',
        'ý' | 'ÿ' => 'y',
        other => other,
    }
}

/// Maps country name variants onto one canonical normalized key.
#[derive(Debug, Clone)]
pub struct CountryNameNormalizer {
    aliases: HashMap<String, String>,
}

impl Default for CountryNameNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl CountryNameNormalizer {
    /// Normalizer loaded with the built-in alias table.
    pub fn new() -> Self {
        let mut normalizer = Self {
            aliases: HashMap::with_capacity(BUILTIN_ALIASES.len()),
        };
        for (variant, canonical) in BUILTIN_ALIASES {
            normalizer.add_alias(variant, canonical);
        }
        normalizer
    }

    /// Normalizer extended with user-supplied `variant => canonical` pairs.
    /// User entries override built-in ones.
    pub fn with_aliases<'a, I>(extra: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let mut normalizer = Self::new();
        for (variant, canonical) in extra {
            normalizer.add_alias(variant, canonical);
        }
        normalizer
    }

    pub fn add_alias(&mut self, variant: &str, canonical: &str) {
        let variant = normalize_name(variant);
        let canonical = normalize_name(canonical);
        if variant.is_empty() || canonical.is_empty() || variant == canonical {
            return;
        }
        self.aliases.insert(variant, canonical);
    }

    /// Canonical key for a raw country name.
    ///
    /// Alias targets are themselves resolved, so a user alias pointing at a
    /// common spelling (`"Korea Rep" = "South Korea"`) reaches the ISO name.
    pub fn canonical(&self, raw: &str) -> String {
        let mut key = normalize_name(raw);
        for _ in 0..MAX_ALIAS_HOPS {
            match self.aliases.get(&key) {
                Some(next) if *next != key => key = next.clone(),
                _ => break,
            }
        }
        key
    }

    pub fn alias_count(&self) -> usize {
        self.aliases.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_punctuation_case_and_accents() {
        assert_eq!(normalize_name("United_States_of_America"), "united states of america");
        assert_eq!(normalize_name("  Côte d'Ivoire "), "cote divoire");
        assert_eq!(normalize_name("Guinea-Bissau"), "guinea bissau");
        assert_eq!(
            normalize_name("Iran (Islamic Republic of)"),
            "iran islamic republic of"
        );
        assert_eq!(normalize_name("Korea, Republic of"), "korea republic of");
        assert_eq!(normalize_name("Virgin Islands (U.S.)"), "virgin islands us");
    }

    #[test]
    fn united_states_variants_share_a_key() {
        let normalizer = CountryNameNormalizer::new();
        let expected = "united states of america";
        for variant in ["US", "USA", "United States", "United_States_of_America", "united states of america"] {
            assert_eq!(normalizer.canonical(variant), expected, "variant {variant}");
        }
    }

    #[test]
    fn ecdc_spellings_reach_iso_names() {
        let normalizer = CountryNameNormalizer::new();
        assert_eq!(
            normalizer.canonical("Cote_dIvoire"),
            normalizer.canonical("Côte d'Ivoire")
        );
        assert_eq!(
            normalizer.canonical("Democratic_Republic_of_the_Congo"),
            normalizer.canonical("Congo, Democratic Republic of the")
        );
        assert_eq!(
            normalizer.canonical("South_Korea"),
            normalizer.canonical("Korea, Republic of")
        );
        assert_ne!(normalizer.canonical("Congo"), normalizer.canonical("DR Congo"));
    }

    #[test]
    fn user_aliases_extend_and_override() {
        let mut extra = std::collections::BTreeMap::new();
        extra.insert("Kosovo*".to_string(), "Kosovo".to_string());
        extra.insert("Macedonia".to_string(), "Macedonia, the former Yugoslav Republic of".to_string());
        let normalizer = CountryNameNormalizer::with_aliases(&extra);

        assert_eq!(normalizer.canonical("Kosovo*"), "kosovo");
        assert_eq!(
            normalizer.canonical("Macedonia"),
            "macedonia the former yugoslav republic of"
        );
    }

    #[test]
    fn user_alias_targets_resolve_through_the_table() {
        let mut extra = std::collections::BTreeMap::new();
        extra.insert("Korea Rep".to_string(), "South Korea".to_string());
        let normalizer = CountryNameNormalizer::with_aliases(&extra);

        assert_eq!(normalizer.canonical("Korea Rep"), "korea republic of");
        assert_eq!(
            normalizer.canonical("Korea Rep"),
            normalizer.canonical("Korea, Republic of")
        );
    }

    #[test]
    fn alias_cycles_terminate() {
        let mut extra = std::collections::BTreeMap::new();
        extra.insert("Ruritania".to_string(), "Elbonia".to_string());
        extra.insert("Elbonia".to_string(), "Ruritania".to_string());
        let normalizer = CountryNameNormalizer::with_aliases(&extra);

        let key = normalizer.canonical("Ruritania");
        assert!(key == "ruritania" || key == "elbonia");
    }

    #[test]
    fn unknown_names_pass_through_normalized() {
        let normalizer = CountryNameNormalizer::new();
        assert_eq!(normalizer.canonical("Atlantis"), "atlantis");
        assert_eq!(normalizer.canonical(""), "");
    }
}

//! Taxonomic lineage parsing and display-label formatting.
//!
//! Lineages come from the upstream classifier as `;`-separated rank tokens:
//!
//! ```text
//! k__Bacteria; p__Firmicutes; c__Bacilli; o__Bacillales; f__Bacillaceae; g__Bacillus
//! ```
//!
//! Unassigned ranks appear as a bare prefix (`g__`) or as `__`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Row label for the sum of all non-selected features.
pub const OTHER_LABEL: &str = "Other";

/// Taxonomic rank, ordered from broadest to most specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rank {
    Kingdom,
    Phylum,
    Class,
    Order,
    Family,
    Genus,
    Species,
}

impl Rank {
    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "d" | "k" => Some(Self::Kingdom),
            "p" => Some(Self::Phylum),
            "c" => Some(Self::Class),
            "o" => Some(Self::Order),
            "f" => Some(Self::Family),
            "g" => Some(Self::Genus),
            "s" => Some(Self::Species),
            _ => None,
        }
    }

    /// Parse from a rank name such as `genus` or a prefix such as `g`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "kingdom" | "domain" => Some(Self::Kingdom),
            "phylum" => Some(Self::Phylum),
            "class" => Some(Self::Class),
            "order" => Some(Self::Order),
            "family" => Some(Self::Family),
            "genus" => Some(Self::Genus),
            "species" => Some(Self::Species),
            other => Self::from_prefix(other),
        }
    }

    /// Lower-case rank name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Kingdom => "kingdom",
            Self::Phylum => "phylum",
            Self::Class => "class",
            Self::Order => "order",
            Self::Family => "family",
            Self::Genus => "genus",
            Self::Species => "species",
        }
    }
}

/// Kind of amplicon data, used to label features with no resolved rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SequenceKind {
    Bacterial,
    Fungal,
    #[default]
    Generic,
}

impl SequenceKind {
    /// Label for a feature whose lineage names no taxon.
    pub fn unresolved_label(&self) -> Option<&'static str> {
        match self {
            Self::Bacterial => Some("Bacterial ASV"),
            Self::Fungal => Some("Fungal ASV"),
            Self::Generic => None,
        }
    }
}

/// One `;`-separated token of a lineage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineageToken {
    /// Original trimmed token text.
    pub text: String,
    /// Rank, when the token carries a recognised prefix.
    pub rank: Option<Rank>,
    /// Taxon name after the prefix; empty for unassigned ranks.
    pub name: String,
}

/// A parsed lineage string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lineage {
    pub raw: String,
    pub tokens: Vec<LineageToken>,
}

fn rank_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // pattern is a literal, covered by the parsing tests
    PATTERN.get_or_init(|| Regex::new(r"^([dkpcofgs])__(.*)$").expect("rank pattern is valid"))
}

impl Lineage {
    /// Parse a `;`-separated lineage.
    pub fn parse(raw: &str) -> Self {
        let tokens = raw
            .split(';')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|text| match rank_pattern().captures(text) {
                Some(caps) => LineageToken {
                    text: text.to_string(),
                    rank: Rank::from_prefix(&caps[1]),
                    name: caps[2].trim().to_string(),
                },
                None => LineageToken {
                    text: text.to_string(),
                    rank: None,
                    name: text.trim_start_matches("__").to_string(),
                },
            })
            .collect();
        Self {
            raw: raw.to_string(),
            tokens,
        }
    }

    /// Deepest token with both a rank and a non-empty name.
    pub fn deepest_named(&self) -> Option<&LineageToken> {
        self.tokens
            .iter()
            .filter(|t| t.rank.is_some() && !t.name.is_empty())
            .max_by_key(|t| t.rank)
    }

    /// Whether the lineage names a taxon at or below `rank`.
    pub fn is_resolved_at(&self, rank: Rank) -> bool {
        self.deepest_named()
            .and_then(|t| t.rank)
            .map_or(false, |r| r >= rank)
    }
}

/// Shorten a lineage to a display label.
///
/// Returns the deepest named rank token (e.g. `g__Bacillus`). The `Other`
/// bucket label passes through unchanged. When no rank is named, the `fallback` is
/// used if given, otherwise the first `;`-separated part.
pub fn format_label(lineage: &str, fallback: Option<&str>) -> String {
    if lineage.trim() == OTHER_LABEL {
        return OTHER_LABEL.to_string();
    }
    let parsed = Lineage::parse(lineage);
    if let Some(token) = parsed.deepest_named() {
        return token.text.clone();
    }
    match fallback {
        Some(label) => label.to_string(),
        None => lineage
            .split(';')
            .next()
            .map(str::trim)
            .unwrap_or(lineage)
            .to_string(),
    }
}

/// Whether `lineage` is resolved at `rank`.
pub fn is_resolved_at(lineage: &str, rank: Rank) -> bool {
    Lineage::parse(lineage).is_resolved_at(rank)
}

/// Substring test used to exclude unwanted taxa (e.g. `k__Virus`).
pub fn matches_exclusion(lineage: &str, pattern: &str) -> bool {
    !pattern.is_empty() && lineage.contains(pattern)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BACILLUS: &str =
        "k__Bacteria; p__Firmicutes; c__Bacilli; o__Bacillales; f__Bacillaceae; g__Bacillus";

    #[test]
    fn test_parse_tokens() {
        let lineage = Lineage::parse(BACILLUS);
        assert_eq!(lineage.tokens.len(), 6);
        assert_eq!(lineage.tokens[0].rank, Some(Rank::Kingdom));
        assert_eq!(lineage.tokens[5].name, "Bacillus");
    }

    #[test]
    fn test_format_genus() {
        assert_eq!(format_label(BACILLUS, None), "g__Bacillus");
    }

    #[test]
    fn test_format_skips_unassigned_ranks() {
        let lineage = "k__Bacteria;p__Proteobacteria;c__Gammaproteobacteria;o__;f__;g__";
        assert_eq!(format_label(lineage, None), "c__Gammaproteobacteria");
    }

    #[test]
    fn test_format_silva_style_double_underscore() {
        let lineage = "d__Bacteria; p__Actinobacteriota; __; __";
        assert_eq!(format_label(lineage, None), "p__Actinobacteriota");
    }

    #[test]
    fn test_format_fallbacks() {
        assert_eq!(format_label("Unassigned", None), "Unassigned");
        assert_eq!(
            format_label("k__; p__", SequenceKind::Fungal.unresolved_label()),
            "Fungal ASV"
        );
        assert_eq!(format_label("Other", None), "Other");
    }

    #[test]
    fn test_other_prefix_in_taxon_name_is_formatted() {
        let lineage = "k__Bacteria; p__Proteobacteria; g__Otherbacter";
        assert_eq!(format_label(lineage, None), "g__Otherbacter");
        assert_eq!(format_label(" Other ", None), "Other");
    }

    #[test]
    fn test_short_lineage_does_not_panic() {
        // index-based formatting would read past the end here
        assert_eq!(format_label("g__Streptomyces", None), "g__Streptomyces");
    }

    #[test]
    fn test_resolved_at() {
        assert!(is_resolved_at(BACILLUS, Rank::Genus));
        assert!(is_resolved_at(BACILLUS, Rank::Family));
        assert!(!is_resolved_at("k__Bacteria; p__Firmicutes; g__", Rank::Genus));
        assert!(!is_resolved_at("Unassigned", Rank::Kingdom));
    }

    #[test]
    fn test_rank_parse() {
        assert_eq!(Rank::parse("Genus"), Some(Rank::Genus));
        assert_eq!(Rank::parse("f"), Some(Rank::Family));
        assert_eq!(Rank::parse("tribe"), None);
    }

    #[test]
    fn test_exclusion() {
        assert!(matches_exclusion("k__Viruses; p__Foo", "k__Virus"));
        assert!(!matches_exclusion(BACILLUS, "k__Virus"));
        assert!(!matches_exclusion(BACILLUS, ""));
    }
}

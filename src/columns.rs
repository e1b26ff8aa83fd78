// 🏛️ Column Resolver - Alias Registry
// Maps loosely-named extract headers onto canonical donor fields

use crate::donor::{DonorFlag, FiscalYear};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// CANONICAL FIELDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CanonicalField {
    /// Required: the donor identifier (vanId)
    Identifier,
    Amount(FiscalYear),
    Flag(DonorFlag),
}

impl CanonicalField {
    /// Every canonical field, identifier first, then years newest → oldest, then flags
    pub fn all() -> Vec<CanonicalField> {
        let mut fields = vec![CanonicalField::Identifier];
        fields.extend(FiscalYear::newest_first().map(CanonicalField::Amount));
        fields.extend(DonorFlag::ALL.iter().map(|f| CanonicalField::Flag(*f)));
        fields
    }

    pub fn name(&self) -> &'static str {
        match self {
            CanonicalField::Identifier => "vanId",
            CanonicalField::Amount(year) => year.label(),
            CanonicalField::Flag(flag) => flag.name(),
        }
    }

    pub fn is_required(&self) -> bool {
        matches!(self, CanonicalField::Identifier)
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CanonicalField {
    type Err = ColumnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CanonicalField::all()
            .into_iter()
            .find(|field| field.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ColumnError::UnknownField(s.to_string()))
    }
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnError {
    /// Registry names a field that does not exist
    UnknownField(String),
    /// The required identifier column is not among the source headers
    MissingRequired { field: String, aliases: Vec<String> },
}

impl fmt::Display for ColumnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnError::UnknownField(name) => write!(f, "unknown canonical field: {}", name),
            ColumnError::MissingRequired { field, aliases } => write!(
                f,
                "missing required column '{}' (accepted: {})",
                field,
                aliases.join(", ")
            ),
        }
    }
}

impl std::error::Error for ColumnError {}

// ============================================================================
// ALIAS REGISTRY
// ============================================================================

/// Canonical field → ordered list of accepted header aliases.
///
/// Earlier aliases win when a source carries more than one of them.
/// Serialized as a JSON object keyed by canonical field name:
/// `{"vanId": ["VANID", "Van ID"], "FY25": ["FY25"]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, Vec<String>>", into = "BTreeMap<String, Vec<String>>")]
pub struct AliasRegistry {
    aliases: BTreeMap<CanonicalField, Vec<String>>,
}

impl AliasRegistry {
    /// Registry with no aliases at all
    pub fn empty() -> Self {
        AliasRegistry {
            aliases: BTreeMap::new(),
        }
    }

    /// Column names used by the fiscal-year extracts
    pub fn standard() -> Self {
        let mut registry = AliasRegistry::empty()
            .with_alias(CanonicalField::Identifier, "VANID")
            .with_alias(CanonicalField::Flag(DonorFlag::MidRange), "MidRange_1 0004999_(Public)")
            .with_alias(
                CanonicalField::Flag(DonorFlag::MajorDonorProspect),
                "Major_Donor_Prospect_(Public)",
            );

        for year in FiscalYear::newest_first() {
            registry = registry.with_alias(CanonicalField::Amount(year), year.label());
        }

        registry
    }

    /// Builder: append an alias (lowest priority so far)
    pub fn with_alias(mut self, field: CanonicalField, alias: impl Into<String>) -> Self {
        self.register(field, alias);
        self
    }

    pub fn register(&mut self, field: CanonicalField, alias: impl Into<String>) {
        self.aliases.entry(field).or_default().push(alias.into());
    }

    pub fn aliases_for(&self, field: CanonicalField) -> &[String] {
        self.aliases.get(&field).map(|a| a.as_slice()).unwrap_or(&[])
    }

    pub fn count(&self) -> usize {
        self.aliases.values().map(|a| a.len()).sum()
    }
}

impl Default for AliasRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl TryFrom<BTreeMap<String, Vec<String>>> for AliasRegistry {
    type Error = ColumnError;

    fn try_from(raw: BTreeMap<String, Vec<String>>) -> Result<Self, Self::Error> {
        let mut registry = AliasRegistry::empty();
        for (name, aliases) in raw {
            let field: CanonicalField = name.parse()?;
            for alias in aliases {
                registry.register(field, alias);
            }
        }
        Ok(registry)
    }
}

impl From<AliasRegistry> for BTreeMap<String, Vec<String>> {
    fn from(registry: AliasRegistry) -> Self {
        registry
            .aliases
            .into_iter()
            .map(|(field, aliases)| (field.name().to_string(), aliases))
            .collect()
    }
}

// ============================================================================
// COLUMN MAP
// ============================================================================

/// Result of resolving one source's headers: the exact header string per
/// canonical field, or `None` when the source does not carry that field.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMap {
    resolved: BTreeMap<CanonicalField, Option<String>>,
}

impl ColumnMap {
    pub fn header_for(&self, field: CanonicalField) -> Option<&str> {
        self.resolved.get(&field).and_then(|h| h.as_deref())
    }

    pub fn identifier(&self) -> Option<&str> {
        self.header_for(CanonicalField::Identifier)
    }

    /// Fiscal years whose column exists in this source
    pub fn amount_columns(&self) -> impl Iterator<Item = (FiscalYear, &str)> {
        self.resolved.iter().filter_map(|(field, header)| match (field, header) {
            (CanonicalField::Amount(year), Some(h)) => Some((*year, h.as_str())),
            _ => None,
        })
    }

    /// Flags whose column exists in this source
    pub fn flag_columns(&self) -> impl Iterator<Item = (DonorFlag, &str)> {
        self.resolved.iter().filter_map(|(field, header)| match (field, header) {
            (CanonicalField::Flag(flag), Some(h)) => Some((*flag, h.as_str())),
            _ => None,
        })
    }

    pub fn unresolved(&self) -> Vec<CanonicalField> {
        self.resolved
            .iter()
            .filter(|(_, header)| header.is_none())
            .map(|(field, _)| *field)
            .collect()
    }
}

// ============================================================================
// COLUMN RESOLVER
// ============================================================================

fn normalize(header: &str) -> String {
    header.trim().to_lowercase()
}

pub struct ColumnResolver {
    registry: AliasRegistry,
}

impl ColumnResolver {
    pub fn new(registry: AliasRegistry) -> Self {
        ColumnResolver { registry }
    }

    pub fn registry(&self) -> &AliasRegistry {
        &self.registry
    }

    /// Resolve every canonical field against the given headers.
    ///
    /// Aliases are tried in registry order; for each alias the first header
    /// that matches after trim + lowercase wins. No fuzzy matching.
    pub fn resolve(&self, headers: &[String]) -> ColumnMap {
        let normalized: Vec<String> = headers.iter().map(|h| normalize(h)).collect();

        let resolved = CanonicalField::all()
            .into_iter()
            .map(|field| {
                let header = self
                    .registry
                    .aliases_for(field)
                    .iter()
                    .map(|alias| normalize(alias))
                    .find_map(|alias| {
                        normalized
                            .iter()
                            .position(|h| *h == alias)
                            .map(|idx| headers[idx].clone())
                    });
                (field, header)
            })
            .collect();

        ColumnMap { resolved }
    }

    /// Resolve and insist on the identifier column
    pub fn resolve_required(&self, headers: &[String]) -> Result<ColumnMap, ColumnError> {
        let map = self.resolve(headers);
        if map.identifier().is_none() {
            return Err(ColumnError::MissingRequired {
                field: CanonicalField::Identifier.name().to_string(),
                aliases: self.registry.aliases_for(CanonicalField::Identifier).to_vec(),
            });
        }
        Ok(map)
    }
}

impl Default for ColumnResolver {
    fn default() -> Self {
        Self::new(AliasRegistry::standard())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_resolves_case_and_whitespace_insensitively() {
        let resolver = ColumnResolver::default();
        let map = resolver.resolve(&headers(&[" vanid ", "fy25", "Other"]));

        assert_eq!(map.identifier(), Some(" vanid "));
        assert_eq!(map.header_for(CanonicalField::Amount(FiscalYear::Fy25)), Some("fy25"));
        assert_eq!(map.header_for(CanonicalField::Amount(FiscalYear::Fy24)), None);
    }

    #[test]
    fn test_alias_priority_follows_registry_order() {
        let registry = AliasRegistry::empty()
            .with_alias(CanonicalField::Identifier, "Van ID")
            .with_alias(CanonicalField::Identifier, "VANID");
        let resolver = ColumnResolver::new(registry);

        let map = resolver.resolve(&headers(&["VANID", "Van ID"]));
        assert_eq!(map.identifier(), Some("Van ID"));
    }

    #[test]
    fn test_no_fuzzy_matching() {
        let resolver = ColumnResolver::default();
        let map = resolver.resolve(&headers(&["VAN_ID", "FY 25"]));

        assert_eq!(map.identifier(), None);
        assert_eq!(map.amount_columns().count(), 0);
    }

    #[test]
    fn test_missing_identifier_is_error() {
        let resolver = ColumnResolver::default();
        let err = resolver.resolve_required(&headers(&["FY25"])).unwrap_err();

        assert!(matches!(err, ColumnError::MissingRequired { .. }));
        assert!(err.to_string().contains("vanId"));
    }

    #[test]
    fn test_unresolved_optional_fields_listed() {
        let resolver = ColumnResolver::default();
        let map = resolver.resolve_required(&headers(&["VANID", "FY25"])).unwrap();
        let unresolved = map.unresolved();

        assert!(unresolved.contains(&CanonicalField::Amount(FiscalYear::Fy20)));
        assert!(unresolved.contains(&CanonicalField::Flag(DonorFlag::MidRange)));
        assert!(!unresolved.contains(&CanonicalField::Amount(FiscalYear::Fy25)));
    }

    #[test]
    fn test_registry_from_json() {
        let json = r#"{"vanId": ["Donor ID", "VANID"], "FY25": ["Gift 2025"], "isMidRange": ["Mid"]}"#;
        let registry: AliasRegistry = serde_json::from_str(json).unwrap();

        assert_eq!(registry.aliases_for(CanonicalField::Identifier), ["Donor ID", "VANID"]);
        assert_eq!(registry.count(), 4);

        let bad = serde_json::from_str::<AliasRegistry>(r#"{"FY99": ["x"]}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_standard_registry_covers_every_field() {
        let registry = AliasRegistry::standard();
        for field in CanonicalField::all() {
            assert!(!registry.aliases_for(field).is_empty(), "no alias for {}", field);
        }
    }
}

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tracing::warn;

use super::version::{Version, VersionParseError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SpecifierParseError {
    #[error("missing operator in specifier '{0}'")]
    MissingOperator(String),
    #[error("missing version in specifier '{0}'")]
    MissingVersion(String),
    #[error(transparent)]
    InvalidVersion(#[from] VersionParseError),
    #[error("operator {operator} does not allow a wildcard: '{specifier}'")]
    WildcardNotAllowed { operator: Operator, specifier: String },
    #[error("a wildcard may only follow release segments: '{0}'")]
    InvalidWildcard(String),
    #[error("operator {operator} does not allow a local version: '{specifier}'")]
    LocalNotAllowed { operator: Operator, specifier: String },
    #[error("compatible release needs at least two release segments: '{0}'")]
    CompatibleTooShort(String),
}

/// Comparison operator of a version specifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `~=`
    Compatible,
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `<=`
    LessThanEqual,
    /// `>=`
    GreaterThanEqual,
    /// `<`
    LessThan,
    /// `>`
    GreaterThan,
    /// `===`
    Arbitrary,
}

impl Operator {
    // Longest tokens first so `===` is not read as `==`.
    const TOKENS: [(&'static str, Operator); 8] = [
        ("===", Operator::Arbitrary),
        ("~=", Operator::Compatible),
        ("==", Operator::Equal),
        ("!=", Operator::NotEqual),
        ("<=", Operator::LessThanEqual),
        (">=", Operator::GreaterThanEqual),
        ("<", Operator::LessThan),
        (">", Operator::GreaterThan),
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Compatible => "~=",
            Operator::Equal => "==",
            Operator::NotEqual => "!=",
            Operator::LessThanEqual => "<=",
            Operator::GreaterThanEqual => ">=",
            Operator::LessThan => "<",
            Operator::GreaterThan => ">",
            Operator::Arbitrary => "===",
        }
    }

    fn allows_local(&self) -> bool {
        matches!(
            self,
            Operator::Equal | Operator::NotEqual | Operator::Arbitrary
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single clause such as `~=1.1.0`, `==1.2.*` or `<2`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionSpecifier {
    operator: Operator,
    /// Version text as written, used by `===`
    literal: String,
    /// `None` only for `===` against a non PEP 440 string
    version: Option<Version>,
    wildcard: bool,
}

impl VersionSpecifier {
    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    /// Whether this clause names a pre-release and therefore opts into them.
    pub fn allows_prereleases(&self) -> bool {
        match self.operator {
            Operator::Equal
            | Operator::GreaterThanEqual
            | Operator::LessThanEqual
            | Operator::Compatible
            | Operator::Arbitrary => self
                .version
                .as_ref()
                .is_some_and(|version| version.is_prerelease()),
            Operator::NotEqual | Operator::LessThan | Operator::GreaterThan => false,
        }
    }

    /// Containment under this clause's own pre-release policy.
    pub fn contains(&self, version: &Version) -> bool {
        if !self.allows_prereleases() && version.is_prerelease() {
            return false;
        }
        self.matches(version)
    }

    /// Containment ignoring pre-release policy.
    pub fn matches(&self, candidate: &Version) -> bool {
        let Some(spec) = &self.version else {
            return self.matches_arbitrary(candidate);
        };

        match (self.operator, self.wildcard) {
            (Operator::Equal, true) => prefix_matches(spec, spec.release(), candidate),
            (Operator::NotEqual, true) => !prefix_matches(spec, spec.release(), candidate),
            (Operator::Equal, false) => equal(spec, candidate),
            (Operator::NotEqual, false) => !equal(spec, candidate),
            (Operator::Compatible, _) => {
                let release = spec.release();
                let prefix = &release[..release.len() - 1];
                candidate.public() >= *spec && prefix_matches(spec, prefix, candidate)
            },
            (Operator::LessThanEqual, _) => candidate.public() <= *spec,
            (Operator::GreaterThanEqual, _) => candidate.public() >= *spec,
            (Operator::LessThan, _) => less_than(spec, candidate),
            (Operator::GreaterThan, _) => greater_than(spec, candidate),
            (Operator::Arbitrary, _) => self.matches_arbitrary(candidate),
        }
    }

    fn matches_arbitrary(&self, candidate: &Version) -> bool {
        candidate.to_string().to_lowercase() == self.literal.to_lowercase()
    }
}

/// `==V` ignores the candidate's local label unless `V` carries one.
fn equal(spec: &Version, candidate: &Version) -> bool {
    if spec.is_local() {
        candidate == spec
    } else {
        candidate.public() == *spec
    }
}

/// Wildcard match: same epoch, and the candidate's release (zero padded)
/// starts with `prefix`.
fn prefix_matches(spec: &Version, prefix: &[u64], candidate: &Version) -> bool {
    if spec.epoch() != candidate.epoch() {
        return false;
    }
    let release = candidate.release();
    prefix
        .iter()
        .enumerate()
        .all(|(idx, segment)| release.get(idx).copied().unwrap_or(0) == *segment)
}

/// `<V` must not admit pre-releases of `V` itself unless `V` is one.
fn less_than(spec: &Version, candidate: &Version) -> bool {
    if candidate >= spec {
        return false;
    }
    if !spec.is_prerelease()
        && candidate.is_prerelease()
        && candidate.base_version() == spec.base_version()
    {
        return false;
    }
    true
}

/// `>V` must not admit post-releases or local builds of `V` itself.
fn greater_than(spec: &Version, candidate: &Version) -> bool {
    if candidate <= spec {
        return false;
    }
    let same_base = candidate.base_version() == spec.base_version();
    if !spec.is_postrelease() && candidate.is_postrelease() && same_base {
        return false;
    }
    if candidate.is_local() && same_base {
        return false;
    }
    true
}

impl FromStr for VersionSpecifier {
    type Err = SpecifierParseError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let trimmed = spec.trim();

        let (token, operator) = Operator::TOKENS
            .iter()
            .find(|(token, _)| trimmed.starts_with(token))
            .copied()
            .ok_or_else(|| SpecifierParseError::MissingOperator(spec.to_string()))?;

        let literal = trimmed[token.len()..].trim();
        if literal.is_empty() {
            return Err(SpecifierParseError::MissingVersion(spec.to_string()));
        }

        if operator == Operator::Arbitrary {
            warn!("arbitrary equality (===) is discouraged: {}", trimmed);
            return Ok(VersionSpecifier {
                operator,
                literal: literal.to_string(),
                version: literal.parse().ok(),
                wildcard: false,
            });
        }

        let (text, wildcard) = match literal.strip_suffix(".*") {
            Some(text) => (text, true),
            None => (literal, false),
        };
        let version: Version = text.parse()?;

        if wildcard {
            if !matches!(operator, Operator::Equal | Operator::NotEqual) {
                return Err(SpecifierParseError::WildcardNotAllowed {
                    operator,
                    specifier: spec.to_string(),
                });
            }
            if version.pre().is_some()
                || version.is_postrelease()
                || version.is_devrelease()
                || version.is_local()
            {
                return Err(SpecifierParseError::InvalidWildcard(spec.to_string()));
            }
        }

        if version.is_local() && !operator.allows_local() {
            return Err(SpecifierParseError::LocalNotAllowed {
                operator,
                specifier: spec.to_string(),
            });
        }

        if operator == Operator::Compatible && version.release().len() < 2 {
            return Err(SpecifierParseError::CompatibleTooShort(spec.to_string()));
        }

        Ok(VersionSpecifier {
            operator,
            literal: literal.to_string(),
            version: Some(version),
            wildcard,
        })
    }
}

impl fmt::Display for VersionSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.version, self.operator) {
            (Some(version), op) if op != Operator::Arbitrary => {
                write!(f, "{}{}", op, version)?;
                if self.wildcard {
                    write!(f, ".*")?;
                }
                Ok(())
            },
            _ => write!(f, "{}{}", self.operator, self.literal),
        }
    }
}

/// A comma-separated set of specifiers, e.g. `>=1.16, <2.0`
///
/// A version is contained when every clause matches it. Pre-releases are
/// rejected unless the set opts into them, either explicitly through
/// [`VersionSpecifiers::with_prereleases`] or by naming a pre-release in one of
/// its clauses.
///
/// ```
/// use pyindex::pep440::{Version, VersionSpecifiers};
///
/// let specifiers: VersionSpecifiers = "~= 1.1.0".parse().unwrap();
/// assert!(specifiers.contains(&"1.1.2".parse::<Version>().unwrap()));
/// assert!(!specifiers.contains(&"1.1.1rc1".parse::<Version>().unwrap()));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionSpecifiers {
    specifiers: Vec<VersionSpecifier>,
    prereleases: Option<bool>,
}

impl VersionSpecifiers {
    /// Matches every final release.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_prereleases(mut self, allow: bool) -> Self {
        self.prereleases = Some(allow);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.specifiers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VersionSpecifier> {
        self.specifiers.iter()
    }

    /// Pre-release policy: `None` when nothing decides it.
    pub fn allows_prereleases(&self) -> Option<bool> {
        if self.prereleases.is_some() {
            return self.prereleases;
        }
        if self.specifiers.is_empty() {
            return None;
        }
        Some(self.specifiers.iter().any(|s| s.allows_prereleases()))
    }

    pub fn contains(&self, version: &Version) -> bool {
        let prereleases = self.allows_prereleases().unwrap_or(false);
        if !prereleases && version.is_prerelease() {
            return false;
        }
        self.specifiers.iter().all(|s| s.matches(version))
    }

    /// Parse `version` and test it
    pub fn contains_str(&self, version: &str) -> Result<bool, VersionParseError> {
        Ok(self.contains(&version.parse()?))
    }

    /// Keep the versions this set contains
    ///
    /// When only pre-releases match and the set has no explicit policy, those
    /// pre-releases are returned instead of nothing.
    pub fn filter<'a, I>(&self, versions: I) -> Vec<&'a Version>
    where
        I: IntoIterator<Item = &'a Version>,
    {
        let mut accepted = Vec::new();
        let mut prereleases = Vec::new();

        for version in versions {
            if self.contains(version) {
                accepted.push(version);
            } else if version.is_prerelease()
                && self.specifiers.iter().all(|s| s.matches(version))
            {
                prereleases.push(version);
            }
        }

        if accepted.is_empty() && self.prereleases.is_none() {
            return prereleases;
        }
        accepted
    }
}

impl FromStr for VersionSpecifiers {
    type Err = SpecifierParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let specifiers = s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(VersionSpecifier::from_str)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(VersionSpecifiers {
            specifiers,
            prereleases: None,
        })
    }
}

impl fmt::Display for VersionSpecifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.specifiers.iter().map(|s| s.to_string()).collect();
        write!(f, "{}", parts.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contains(specifiers: &str, version: &str) -> bool {
        let specifiers: VersionSpecifiers = specifiers.parse().unwrap();
        specifiers.contains_str(version).unwrap()
    }

    #[test]
    fn test_compatible_release_table() {
        for accepted in ["1.1", "1.1.0", "1.1.2", "1.1.post1"] {
            assert!(contains("~= 1.1.0", accepted), "{} should be accepted", accepted);
        }
        for rejected in ["1.1.1.dev1", "1.1.1rc1", "1.2", "1.0"] {
            assert!(!contains("~= 1.1.0", rejected), "{} should be rejected", rejected);
        }
    }

    #[test]
    fn test_compatible_two_segments() {
        assert!(contains("~=2.2", "2.3"));
        assert!(contains("~=2.2", "2.9.1"));
        assert!(!contains("~=2.2", "3.0"));
        assert!(!contains("~=2.2", "2.1"));
    }

    #[test]
    fn test_compatible_with_prerelease_opts_in() {
        assert!(contains("~=1.1.0rc1", "1.1.0rc2"));
        assert!(!contains("~=1.1.0rc1", "1.1.0b1"));
    }

    #[test]
    fn test_explicit_prerelease_policy() {
        let specifiers: VersionSpecifiers = "~=1.1.0".parse().unwrap();
        let specifiers = specifiers.with_prereleases(true);
        assert!(specifiers.contains_str("1.1.1rc1").unwrap());
        assert!(specifiers.contains_str("1.1.1.dev1").unwrap());
    }

    #[test]
    fn test_equal_and_wildcards() {
        assert!(contains("==1.1", "1.1.0"));
        assert!(contains("==1.1", "1.1+local"));
        assert!(!contains("==1.1+abc", "1.1+def"));
        assert!(contains("==1.1.*", "1.1.post1"));
        assert!(contains("==1.1.*", "1.1"));
        assert!(!contains("==1.1.*", "1.10"));
        assert!(!contains("!=1.1.*", "1.1.5"));
        assert!(contains("!=1.1.*", "1.2"));
        assert!(contains("!=1.1", "1.1.1"));
    }

    #[test]
    fn test_ordered_comparisons() {
        assert!(contains("<=1.1", "1.1+local"));
        assert!(contains(">=1.1", "1.1"));
        assert!(!contains("<2.0", "2.0rc1"));
        let below_rc2: VersionSpecifier = "<2.0rc2".parse().unwrap();
        assert!(below_rc2.matches(&"2.0rc1".parse().unwrap()));
        assert!(!below_rc2.contains(&"2.0rc1".parse().unwrap()));
        assert!(!contains(">1.1", "1.1.post1"));
        assert!(contains(">1.1.post1", "1.1.post2"));
        assert!(!contains(">1.1", "1.1+local"));
        assert!(contains(">1.1", "1.2"));
    }

    #[test]
    fn test_arbitrary_equality() {
        assert!(contains("===1.0", "1.0"));
        assert!(!contains("===1.0", "1.0.0"));
        let specifier: VersionSpecifier = "===foobar".parse().unwrap();
        assert!(specifier.version().is_none());
    }

    #[test]
    fn test_arbitrary_equality_filter() {
        let specifiers: VersionSpecifiers = "===1.0".parse().unwrap();
        let versions: Vec<Version> = ["1.0", "1.0.0", "2.0", "1.0"]
            .iter()
            .map(|v| v.parse().unwrap())
            .collect();
        let kept: Vec<String> = specifiers
            .filter(&versions)
            .iter()
            .map(|v| v.to_string())
            .collect();
        assert_eq!(kept, vec!["1.0", "1.0"]);
    }

    #[test]
    fn test_multiple_clauses() {
        assert!(contains(">=1.16, <2.0", "1.19"));
        assert!(!contains(">=1.16, <2.0", "2.0"));
        assert!(!contains(">=1.16, <2.0", "1.15"));
    }

    #[test]
    fn test_empty_set() {
        assert!(contains("", "1.0"));
        assert!(!contains("", "1.0a1"));
        assert_eq!(VersionSpecifiers::empty().allows_prereleases(), None);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            "1.0".parse::<VersionSpecifier>(),
            Err(SpecifierParseError::MissingOperator(_))
        ));
        assert!(matches!(
            ">=".parse::<VersionSpecifier>(),
            Err(SpecifierParseError::MissingVersion(_))
        ));
        assert!(matches!(
            "~=1".parse::<VersionSpecifier>(),
            Err(SpecifierParseError::CompatibleTooShort(_))
        ));
        assert!(matches!(
            ">=1.0.*".parse::<VersionSpecifier>(),
            Err(SpecifierParseError::WildcardNotAllowed { .. })
        ));
        assert!(matches!(
            "==1.0rc1.*".parse::<VersionSpecifier>(),
            Err(SpecifierParseError::InvalidWildcard(_))
        ));
        assert!(matches!(
            ">=1.0+abc".parse::<VersionSpecifier>(),
            Err(SpecifierParseError::LocalNotAllowed { .. })
        ));
        assert!(matches!(
            "==1.0.x".parse::<VersionSpecifier>(),
            Err(SpecifierParseError::InvalidVersion(_))
        ));
    }

    #[test]
    fn test_display() {
        let specifiers: VersionSpecifiers = " ~= 1.1.0 , != 1.1.3 , ==1.*".parse().unwrap();
        assert_eq!(specifiers.to_string(), "~=1.1.0,!=1.1.3,==1.*");
    }

    #[test]
    fn test_filter_falls_back_to_prereleases() {
        let versions: Vec<Version> = ["2.0a1", "2.0b1"].iter().map(|v| v.parse().unwrap()).collect();
        let specifiers: VersionSpecifiers = ">=1.0".parse().unwrap();
        let kept = specifiers.filter(&versions);
        assert_eq!(kept.len(), 2);

        let strict = specifiers.clone().with_prereleases(false);
        assert!(strict.filter(&versions).is_empty());
    }

    #[test]
    fn test_filter_prefers_final_releases() {
        let versions: Vec<Version> = ["1.5", "2.0a1"].iter().map(|v| v.parse().unwrap()).collect();
        let specifiers: VersionSpecifiers = ">=1.0".parse().unwrap();
        let kept: Vec<String> = specifiers.filter(&versions).iter().map(|v| v.to_string()).collect();
        assert_eq!(kept, vec!["1.5"]);
    }
}

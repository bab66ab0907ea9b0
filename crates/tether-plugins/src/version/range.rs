//! npm-style version ranges evaluated with `semver` semantics.

use std::fmt;
use std::str::FromStr;

use semver::{Comparator, Op, Version, VersionReq};

use crate::error::PluginError;

const OPERATOR_CHARS: [char; 5] = ['<', '>', '=', '^', '~'];

/// A predicate over plugin versions.
///
/// Accepts the range syntax package registries use: `*`, `x`, `latest` and
/// the empty string (any version); caret and tilde ranges; comparators
/// separated by spaces or commas; hyphen ranges (`1.2.3 - 2.0.0`); `1.x`
/// wildcards; and `||` alternatives. A bare version such as `1.2.3` means
/// exactly that version.
///
/// ```
/// use semver::Version;
/// use tether_plugins::VersionRange;
///
/// let range = VersionRange::parse(">=1.2.0 <2 || 3.x").expect("valid range");
/// assert!(range.satisfies(&Version::new(1, 4, 0)));
/// assert!(range.satisfies(&Version::new(3, 1, 0)));
/// assert!(!range.satisfies(&Version::new(2, 0, 0)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    raw: String,
    alternatives: Vec<VersionReq>,
}

impl VersionRange {
    /// A range matching every release.
    #[must_use]
    pub fn any() -> Self {
        Self {
            raw: String::from("latest"),
            alternatives: vec![VersionReq::STAR],
        }
    }

    /// A range matching exactly `version`.
    #[must_use]
    pub fn exact(version: &Version) -> Self {
        let comparator = Comparator {
            op: Op::Exact,
            major: version.major,
            minor: Some(version.minor),
            patch: Some(version.patch),
            pre: version.pre.clone(),
        };
        Self {
            raw: version.to_string(),
            alternatives: vec![VersionReq {
                comparators: vec![comparator],
            }],
        }
    }

    /// Parses a range expression.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::InvalidVersionSpec`] when any alternative is
    /// not a valid comparator set.
    pub fn parse(input: &str) -> Result<Self, PluginError> {
        let trimmed = input.trim();
        if matches!(trimmed, "" | "*" | "x" | "X" | "latest") {
            return Ok(Self {
                raw: trimmed.to_owned(),
                ..Self::any()
            });
        }
        let invalid = |reason: String| PluginError::InvalidVersionSpec {
            input: input.to_owned(),
            reason,
        };
        let alternatives = trimmed
            .split("||")
            .map(|alternative| {
                let normalised = normalise_alternative(alternative).map_err(&invalid)?;
                VersionReq::parse(&normalised).map_err(|error| invalid(error.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            raw: trimmed.to_owned(),
            alternatives,
        })
    }

    /// Returns true when `version` matches any alternative.
    #[must_use]
    pub fn satisfies(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }

    /// Returns the highest candidate satisfying the range.
    pub fn pick_best<'a, I>(&self, candidates: I) -> Option<&'a Version>
    where
        I: IntoIterator<Item = &'a Version>,
    {
        candidates
            .into_iter()
            .filter(|version| self.satisfies(version))
            .max()
    }

    /// Returns true when the range accepts every release.
    ///
    /// Registries resolve such ranges to their `latest` tag when it exists.
    #[must_use]
    pub fn is_any(&self) -> bool {
        self.alternatives
            .iter()
            .any(|req| req.comparators.is_empty())
    }

    /// Returns the version this range pins, when it is a single exact
    /// comparator naming a full `major.minor.patch`.
    #[must_use]
    pub fn lower_bound(&self) -> Option<Version> {
        let [req] = self.alternatives.as_slice() else {
            return None;
        };
        let [comparator] = req.comparators.as_slice() else {
            return None;
        };
        if comparator.op != Op::Exact {
            return None;
        }
        let mut version = Version::new(comparator.major, comparator.minor?, comparator.patch?);
        version.pre = comparator.pre.clone();
        Some(version)
    }

    /// Returns the expression this range was parsed from.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

fn normalise_alternative(alternative: &str) -> Result<String, String> {
    let alternative = alternative.trim();
    if alternative.is_empty() {
        return Ok(String::from("*"));
    }
    if let Some((lower, upper)) = alternative.split_once(" - ") {
        let lower = normalise_token(&format!(">={}", lower.trim()))?;
        let upper = normalise_token(&format!("<={}", upper.trim()))?;
        return Ok(format!("{lower}, {upper}"));
    }

    let mut tokens: Vec<String> = Vec::new();
    let mut pending_operator = String::new();
    for raw in alternative.split([' ', ',']).filter(|token| !token.is_empty()) {
        if raw.chars().all(|c| OPERATOR_CHARS.contains(&c)) {
            pending_operator.push_str(raw);
            continue;
        }
        let token = format!("{}{raw}", std::mem::take(&mut pending_operator));
        tokens.push(normalise_token(&token)?);
    }
    if !pending_operator.is_empty() {
        return Err(format!("operator '{pending_operator}' has no version"));
    }
    Ok(tokens.join(", "))
}

fn normalise_token(token: &str) -> Result<String, String> {
    let split = token
        .find(|c: char| !OPERATOR_CHARS.contains(&c))
        .ok_or_else(|| format!("operator '{token}' has no version"))?;
    let (operator, version) = token.split_at(split);
    let version = version.strip_prefix(['v', 'V']).unwrap_or(version);
    let version = version
        .split('.')
        .map(|part| if matches!(part, "x" | "X") { "*" } else { part })
        .collect::<Vec<_>>()
        .join(".");
    if version == "*" {
        return Ok(version);
    }
    let operator = match operator {
        "" if version.contains('*') => "",
        "" => "=",
        "~>" => "~",
        other => other,
    };
    Ok(format!("{operator}{version}"))
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for VersionRange {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<&Version> for VersionRange {
    fn from(version: &Version) -> Self {
        Self::exact(version)
    }
}

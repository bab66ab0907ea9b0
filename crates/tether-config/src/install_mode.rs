use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Whether an already downloaded package may be reused for an exact version.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum InstallModeSetting {
    /// Reuse a downloaded package whose version matches exactly.
    #[default]
    UseCache,
    /// Always query the registry and download again.
    NoCache,
}

/// Errors encountered while parsing an [`InstallModeSetting`] from text.
pub type InstallModeParseError = strum::ParseError;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_kebab_case_names() {
        assert_eq!(
            "use-cache".parse::<InstallModeSetting>(),
            Ok(InstallModeSetting::UseCache)
        );
        assert_eq!(
            "no-cache".parse::<InstallModeSetting>(),
            Ok(InstallModeSetting::NoCache)
        );
    }

    #[test]
    fn displays_kebab_case_names() {
        assert_eq!(InstallModeSetting::NoCache.to_string(), "no-cache");
    }
}

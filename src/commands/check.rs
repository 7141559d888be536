use anyhow::Context;
use tracing::{info, warn};

use pyindex::pep440::{Version, VersionSpecifiers};

pub fn check(
    specifier: String,
    versions: Vec<String>,
    prereleases: bool,
    expect_accept: Vec<String>,
    expect_reject: Vec<String>,
) -> anyhow::Result<()> {
    let mut specifiers: VersionSpecifiers = specifier
        .parse()
        .with_context(|| format!("Invalid specifier set '{}'", specifier))?;
    if prereleases {
        specifiers = specifiers.with_prereleases(true);
    }

    for version in &versions {
        match version.parse::<Version>() {
            Ok(parsed) => {
                let verdict = if specifiers.contains(&parsed) {
                    "accept"
                } else {
                    "reject"
                };
                println!("{}\t{}", verdict, version);
            },
            Err(e) => {
                warn!("{}", e);
                println!("invalid\t{}", version);
            },
        }
    }

    verify_expectations(&specifiers, &expect_accept, &expect_reject)?;

    let expectations = expect_accept.len() + expect_reject.len();
    if expectations > 0 {
        info!("All {} expectations hold for '{}'", expectations, specifiers);
    }

    Ok(())
}

/// Fail on the first version whose outcome differs from the expectation
fn verify_expectations(
    specifiers: &VersionSpecifiers,
    expect_accept: &[String],
    expect_reject: &[String],
) -> anyhow::Result<()> {
    let expectations = expect_accept
        .iter()
        .map(|v| (v, true))
        .chain(expect_reject.iter().map(|v| (v, false)));

    for (version, expected) in expectations {
        let accepted = specifiers
            .contains_str(version)
            .with_context(|| format!("Invalid expected version '{}'", version))?;
        if accepted != expected {
            anyhow::bail!(
                "Expected '{}' to {} {}, but it was {}",
                specifiers,
                if expected { "accept" } else { "reject" },
                version,
                if accepted { "accepted" } else { "rejected" }
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_expectations_hold() {
        let specifiers: VersionSpecifiers = "~=1.1.0".parse().unwrap();
        verify_expectations(
            &specifiers,
            &strings(&["1.1", "1.1.0", "1.1.2", "1.1.post1"]),
            &strings(&["1.1.1.dev1", "1.1.1rc1", "1.2", "1.0"]),
        )
        .unwrap();
    }

    #[test]
    fn test_expectation_mismatch_fails() {
        let specifiers: VersionSpecifiers = "~=1.1.0".parse().unwrap();
        let err = verify_expectations(&specifiers, &strings(&["1.2"]), &[]).unwrap_err();
        assert!(err.to_string().contains("to accept 1.2"));
    }

    #[test]
    fn test_invalid_expected_version_fails() {
        let specifiers: VersionSpecifiers = ">=1.0".parse().unwrap();
        assert!(verify_expectations(&specifiers, &[], &strings(&["not a version"])).is_err());
    }

    #[test]
    fn test_invalid_specifier_fails() {
        assert!(check("~=1".to_string(), vec![], false, vec![], vec![]).is_err());
    }
}

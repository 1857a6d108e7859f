use std::cmp::Ordering;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum VersionError {
    #[error("invalid version string '{0}'")]
    Invalid(String),
}

/// Lenient semantic version as used by package catalogues: an optional
/// leading `v`, up to three numeric components and an optional pre-release
/// suffix (`v1.5`, `2.0.1-rc.2`). Build metadata after `+` is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    major: u64,
    minor: u64,
    patch: u64,
    pre: Vec<String>,
}

impl Version {
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let invalid = || VersionError::Invalid(input.to_string());

        let trimmed = input.strip_prefix('v').unwrap_or(input);
        let trimmed = trimmed.split_once('+').map_or(trimmed, |(core, _)| core);
        if trimmed.is_empty() {
            return Err(invalid());
        }

        let (core, pre) = match trimmed.split_once('-') {
            Some((core, pre)) => (core, Some(pre)),
            None => (trimmed, None),
        };

        let mut numbers = [0u64; 3];
        let components: Vec<&str> = core.split('.').collect();
        if components.is_empty() || components.len() > 3 {
            return Err(invalid());
        }
        for (slot, component) in numbers.iter_mut().zip(&components) {
            *slot = component.parse().map_err(|_| invalid())?;
        }

        let pre = match pre {
            Some(pre) => {
                let segments: Vec<String> = pre.split('.').map(str::to_string).collect();
                if segments.iter().any(String::is_empty) {
                    return Err(invalid());
                }
                segments
            }
            None => vec![],
        };

        Ok(Version {
            major: numbers[0],
            minor: numbers[1],
            patch: numbers[2],
            pre,
        })
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            .then_with(|| match (self.pre.is_empty(), other.pre.is_empty()) {
                (true, true) => Ordering::Equal,
                // A release sorts above any of its pre-releases.
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => compare_pre_release(&self.pre, &other.pre),
            })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn compare_pre_release(left: &[String], right: &[String]) -> Ordering {
    for (a, b) in left.iter().zip(right) {
        let ordering = match (a.parse::<u64>(), b.parse::<u64>()) {
            (Ok(a), Ok(b)) => a.cmp(&b),
            // Numeric segments sort below alphanumeric ones.
            (Ok(_), Err(_)) => Ordering::Less,
            (Err(_), Ok(_)) => Ordering::Greater,
            (Err(_), Err(_)) => a.cmp(b),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    left.len().cmp(&right.len())
}

/// Compares two version strings; any unparsable input is a hard error, never
/// a silent skip.
pub fn compare(left: &str, right: &str) -> Result<Ordering, VersionError> {
    Ok(Version::parse(left)?.cmp(&Version::parse(right)?))
}

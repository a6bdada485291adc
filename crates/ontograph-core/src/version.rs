//! Semantic versions for schemas.
//!
//! Minor and patch bumps are backward compatible; a major bump is breaking.
//! Two versions are compatible iff their major components are equal.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::Error;

/// A `major.minor.patch` version. Serialised as the dotted string.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct SemVer {
  pub major: u32,
  pub minor: u32,
  pub patch: u32,
}

/// The kind of change between two schema definitions, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VersionBump {
  None,
  Patch,
  Minor,
  Major,
}

impl SemVer {
  /// Every new lineage starts here.
  pub const INITIAL: SemVer = SemVer { major: 1, minor: 0, patch: 0 };

  pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
    Self { major, minor, patch }
  }

  /// Apply a bump, resetting lower components. Fails if the bumped
  /// component would overflow.
  pub fn bump(self, bump: VersionBump) -> Result<Self, Error> {
    let next = |n: u32| n.checked_add(1).ok_or_else(|| Error::InvalidVersion(format!("{self} + {bump:?}")));
    Ok(match bump {
      VersionBump::None => self,
      VersionBump::Patch => Self { patch: next(self.patch)?, ..self },
      VersionBump::Minor => Self::new(self.major, next(self.minor)?, 0),
      VersionBump::Major => Self::new(next(self.major)?, 0, 0),
    })
  }
}

/// True iff `a` and `b` share a major version.
pub fn is_compatible(a: &SemVer, b: &SemVer) -> bool { a.major == b.major }

impl fmt::Display for SemVer {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
  }
}

impl FromStr for SemVer {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let invalid = || Error::InvalidVersion(s.to_owned());
    let mut parts = s.trim().split('.');
    let mut next = || -> Result<u32, Error> {
      parts.next().ok_or_else(invalid)?.parse().map_err(|_| invalid())
    };
    let version = SemVer::new(next()?, next()?, next()?);
    if parts.next().is_some() {
      return Err(invalid());
    }
    Ok(version)
  }
}

impl TryFrom<String> for SemVer {
  type Error = Error;

  fn try_from(s: String) -> Result<Self, Self::Error> { s.parse() }
}

impl From<SemVer> for String {
  fn from(v: SemVer) -> Self { v.to_string() }
}

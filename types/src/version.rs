use bincode::config::DefaultOptions;
use bincode::config::Options;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

pub static VERSION: Lazy<Version> = Lazy::new(|| {
    let version_string: &str = env!("CARGO_PKG_VERSION");
    match version_string.split('.').collect::<Vec<_>>()[..] {
        [major, minor, patch] => Some(Version {
            major: major.parse().expect("could not parse major version"),
            minor: minor.parse().expect("could not parse minor version"),
            patch: patch.parse().expect("could not parse patch version"),
        }),
        _ => None,
    }
    .unwrap_or_else(|| panic!("could not parse CARGO_PKG_VERSION into Version"))
});

#[derive(Debug, Serialize, Deserialize, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub struct Version {
    pub major: u8,
    pub minor: u16,
    pub patch: u16,
}

impl Version {
    pub fn deserialize_magic_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        let config = DefaultOptions::new()
            .with_fixint_encoding()
            .with_big_endian();
        config.deserialize(bytes)
    }

    pub fn serialize_magic_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        let config = DefaultOptions::new()
            .with_fixint_encoding()
            .with_big_endian();
        config.serialize(self)
    }

    /// Versions are compatible when their major component matches.
    pub fn is_compatible(&self, other: &Self) -> bool {
        self.major == other.major
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_major_is_compatible() {
        let a = Version { major: 1, minor: 0, patch: 0 };
        let b = Version { major: 1, minor: 3, patch: 9 };
        assert!(a.is_compatible(&b));
    }

    #[test]
    fn different_major_is_incompatible() {
        let a = Version { major: 1, minor: 0, patch: 0 };
        let b = Version { major: 2, minor: 0, patch: 0 };
        assert!(!a.is_compatible(&b));
    }
}

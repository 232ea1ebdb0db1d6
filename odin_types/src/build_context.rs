use std::convert::TryFrom;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum BuildContextError {
    #[error("unknown target `{0}` (expected something like `linux_amd64`)")]
    UnknownTarget(String),
    #[error("unknown architecture `{0}`")]
    UnknownArch(String),
}

/// The handful of facts about the target the middle end needs: type
/// sizes, and the values of the `ODIN_*` constants.
#[derive(Clone, Debug, PartialEq)]
pub struct BuildContext {
    pub word_size: i64,
    pub max_align: i64,
    pub os: String,
    pub arch: String,
    pub vendor: String,
    pub version: String,
    pub root: String,
}

impl Default for BuildContext {
    fn default() -> Self {
        Self {
            word_size: 8,
            max_align: 16,
            os: "linux".to_owned(),
            arch: "amd64".to_owned(),
            vendor: "odin".to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
            root: String::new(),
        }
    }
}

impl BuildContext {
    pub fn for_target(os: &str, arch: &str) -> Result<Self, BuildContextError> {
        let word_size = match arch {
            "amd64" | "x86_64" | "arm64" => 8,
            "386" | "x86" | "arm32" => 4,
            other => return Err(BuildContextError::UnknownArch(other.to_owned())),
        };

        Ok(Self {
            word_size,
            max_align: 2 * word_size,
            os: os.to_owned(),
            arch: arch.to_owned(),
            ..Self::default()
        })
    }

    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = root.into();
        self
    }
}

impl TryFrom<&str> for BuildContext {
    type Error = BuildContextError;

    /// Parses `os_arch`, e.g. `windows_amd64` or `linux_386`.
    fn try_from(target: &str) -> Result<Self, Self::Error> {
        match target.split_once('_') {
            Some((os, arch)) if !os.is_empty() => {
                Self::for_target(os, arch).map_err(|_| BuildContextError::UnknownTarget(target.to_owned()))
            },
            _ => Err(BuildContextError::UnknownTarget(target.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_targets() {
        let ctx = BuildContext::try_from("windows_386").unwrap();
        assert_eq!(ctx.word_size, 4);
        assert_eq!(ctx.max_align, 8);
        assert_eq!(ctx.os, "windows");

        let ctx = BuildContext::try_from("linux_amd64").unwrap();
        assert_eq!(ctx.word_size, 8);

        assert_eq!(
            BuildContext::try_from("amd64"),
            Err(BuildContextError::UnknownTarget("amd64".to_owned()))
        );
        assert!(BuildContext::try_from("linux_mips").is_err());
    }
}

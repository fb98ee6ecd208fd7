use std::env;
use std::path::PathBuf;

use emuhost_cothread::DEFAULT_STACK_SIZE;

use crate::error::{BridgeError, Result};

/// Smallest guest stack accepted from the environment.
pub const MIN_STACK_SIZE: usize = 64 * 1024;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Stack size of the guest execution context, in bytes.
    pub guest_stack_size: usize,
    /// Root directory for persistent device state.
    pub nvram_dir: PathBuf,
    /// Device path whose program space backs `read_byte`.
    pub main_cpu: String,
    /// Chunk name reported in script diagnostics.
    pub chunk_name: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            guest_stack_size: DEFAULT_STACK_SIZE,
            nvram_dir: PathBuf::from("nvram"),
            main_cpu: ":maincpu".to_string(),
            chunk_name: "=emuhost".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Defaults overridden by `EMUHOST_STACK_SIZE`, `EMUHOST_NVRAM_DIR` and `EMUHOST_MAIN_CPU`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = non_empty(lookup("EMUHOST_STACK_SIZE")) {
            config.guest_stack_size = raw
                .parse::<usize>()
                .ok()
                .filter(|size| *size >= MIN_STACK_SIZE)
                .ok_or(BridgeError::InvalidConfig {
                    var: "EMUHOST_STACK_SIZE",
                    value: raw,
                })?;
        }
        if let Some(dir) = non_empty(lookup("EMUHOST_NVRAM_DIR")) {
            config.nvram_dir = PathBuf::from(dir);
        }
        if let Some(tag) = non_empty(lookup("EMUHOST_MAIN_CPU")) {
            if !tag.starts_with(':') {
                return Err(BridgeError::InvalidConfig {
                    var: "EMUHOST_MAIN_CPU",
                    value: tag,
                });
            }
            config.main_cpu = tag;
        }

        Ok(config)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let v = v.trim().to_string();
        (!v.is_empty()).then_some(v)
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(
            BridgeConfig::from_lookup(lookup(&[])).unwrap(),
            BridgeConfig::default()
        );
    }

    #[test]
    fn environment_overrides() {
        let config = BridgeConfig::from_lookup(lookup(&[
            ("EMUHOST_STACK_SIZE", "1048576"),
            ("EMUHOST_NVRAM_DIR", " /tmp/nv "),
            ("EMUHOST_MAIN_CPU", ":audiocpu"),
        ]))
        .unwrap();
        assert_eq!(config.guest_stack_size, 1 << 20);
        assert_eq!(config.nvram_dir, PathBuf::from("/tmp/nv"));
        assert_eq!(config.main_cpu, ":audiocpu");
    }

    #[test]
    fn rejects_bad_values() {
        for vars in [
            [("EMUHOST_STACK_SIZE", "lots")],
            [("EMUHOST_STACK_SIZE", "1024")],
            [("EMUHOST_MAIN_CPU", "maincpu")],
        ] {
            assert!(matches!(
                BridgeConfig::from_lookup(lookup(&vars)),
                Err(BridgeError::InvalidConfig { .. })
            ));
        }
    }
}

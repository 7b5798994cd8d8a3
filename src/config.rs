//! Environment-based configuration.
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::cgroup::SubsystemKind;

pub const CGROUPS_VAR: &str = "CGWATCH_CGROUPS";
pub const COLLECTION_INTERVAL_VAR: &str = "CGWATCH_COLLECTION_INTERVAL_MS";
pub const LISTEN_ADDRESS_VAR: &str = "CGWATCH_LISTEN_ADDRESS";
pub const MOUNTINFO_VAR: &str = "CGWATCH_MOUNTINFO";

const DEFAULT_COLLECTION_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:8080";
const DEFAULT_MOUNTINFO: &str = "/proc/self/mountinfo";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("environment variable `{var}` is not valid unicode")]
    NotUnicode { var: &'static str },
    #[error("invalid value `{value}` for `{var}`: {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub cgroups: Vec<String>,
    pub collection_interval: Duration,
    pub listen_address: SocketAddr,
    pub mountinfo: PathBuf,
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(std::env::var)
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&'static str) -> std::result::Result<String, std::env::VarError>,
    {
        let get = |var: &'static str| match lookup(var) {
            Ok(value) if value.trim().is_empty() => Ok(None),
            Ok(value) => Ok(Some(value.trim().to_owned())),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(std::env::VarError::NotUnicode(_)) => Err(Error::NotUnicode { var }),
        };

        let cgroups = match get(CGROUPS_VAR)? {
            Some(value) => parse_cgroups(&value)?,
            None => SubsystemKind::ALL
                .iter()
                .map(|kind| kind.name().to_owned())
                .collect(),
        };

        let collection_interval = match get(COLLECTION_INTERVAL_VAR)? {
            Some(value) => parse_interval(&value)?,
            None => DEFAULT_COLLECTION_INTERVAL,
        };

        let listen_address = get(LISTEN_ADDRESS_VAR)?
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDRESS.to_owned());
        let listen_address = listen_address
            .parse()
            .map_err(|err: std::net::AddrParseError| Error::InvalidValue {
                var: LISTEN_ADDRESS_VAR,
                value: listen_address.clone(),
                reason: err.to_string(),
            })?;

        let mountinfo = get(MOUNTINFO_VAR)?
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MOUNTINFO));

        Ok(Self {
            cgroups,
            collection_interval,
            listen_address,
            mountinfo,
        })
    }
}

fn parse_cgroups(value: &str) -> Result<Vec<String>> {
    let mut cgroups: Vec<String> = Vec::new();
    for name in value.split(',').map(str::trim).filter(|name| !name.is_empty()) {
        if !cgroups.iter().any(|existing| existing == name) {
            cgroups.push(name.to_owned());
        }
    }
    if cgroups.is_empty() {
        return Err(Error::InvalidValue {
            var: CGROUPS_VAR,
            value: value.to_owned(),
            reason: "no subsystem given".to_owned(),
        });
    }
    Ok(cgroups)
}

fn parse_interval(value: &str) -> Result<Duration> {
    let invalid = |reason: String| Error::InvalidValue {
        var: COLLECTION_INTERVAL_VAR,
        value: value.to_owned(),
        reason,
    };
    let millis: u64 = value.parse().map_err(|err| invalid(format!("{err}")))?;
    if millis == 0 {
        return Err(invalid("must be greater than zero".to_owned()));
    }
    Ok(Duration::from_millis(millis))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::env::VarError;

    use super::*;

    fn config_from(vars: &[(&'static str, &str)]) -> Result<Config> {
        let vars: HashMap<&'static str, String> = vars
            .iter()
            .map(|(var, value)| (*var, (*value).to_owned()))
            .collect();
        Config::from_lookup(|var| vars.get(var).cloned().ok_or(VarError::NotPresent))
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.cgroups.len(), 11);
        assert_eq!(config.cgroups[0], "blkio");
        assert_eq!(config.collection_interval, Duration::from_secs(1));
        assert_eq!(config.listen_address, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(config.mountinfo, PathBuf::from("/proc/self/mountinfo"));
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            (CGROUPS_VAR, " cpu, memory ,cpu,"),
            (COLLECTION_INTERVAL_VAR, "250"),
            (LISTEN_ADDRESS_VAR, "127.0.0.1:9100"),
            (MOUNTINFO_VAR, "/rootfs/proc/1/mountinfo"),
        ])
        .unwrap();
        assert_eq!(config.cgroups, vec!["cpu", "memory"]);
        assert_eq!(config.collection_interval, Duration::from_millis(250));
        assert_eq!(config.listen_address.port(), 9100);
        assert_eq!(config.mountinfo, PathBuf::from("/rootfs/proc/1/mountinfo"));
    }

    #[test]
    fn test_empty_value_uses_default() {
        let config = config_from(&[(COLLECTION_INTERVAL_VAR, "  ")]).unwrap();
        assert_eq!(config.collection_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_invalid_values() {
        for (var, value) in [
            (COLLECTION_INTERVAL_VAR, "0"),
            (COLLECTION_INTERVAL_VAR, "soon"),
            (LISTEN_ADDRESS_VAR, "localhost"),
            (CGROUPS_VAR, ",,"),
        ] {
            let err = config_from(&[(var, value)]).unwrap_err();
            assert!(
                matches!(err, Error::InvalidValue { var: v, .. } if v == var),
                "{var}={value}: {err}"
            );
        }
    }
}

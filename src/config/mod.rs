//! Configuration management
//!
//! Handles config.toml (user-defined) and config.lock (generated with all defaults).

mod types;
mod validation;

pub use types::*;
pub use validation::{validate, ValidationResult};

use crate::{Error, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(Error::Io)?;
    parse(&content)
}

pub fn parse(content: &str) -> Result<Config> {
    toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
}

/// Load a generated lock file
pub fn load_lock<P: AsRef<Path>>(path: P) -> Result<ConfigLock> {
    let content = std::fs::read_to_string(path).map_err(Error::Io)?;
    toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))
}

/// Generate a lock file from config, filling in all defaults
pub fn generate_lock(config: &Config, source: &str) -> ConfigLock {
    ConfigLock::from_config(config, source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::icmpv6::OptionNumbering;

    const EXAMPLE: &str = r#"
[interfaces]
mesh = "lowpan0"
ethernet = "eth0"

[gateway]
addresses = ["2001:db8::1"]
max_dad_ns = 5
ra_forward_policy = "pending_and_routers"
authoritative_border_router = true

[[contexts]]
prefix = "2001:db8::"
length = 64

[logging]
level = "debug"
"#;

    #[test]
    fn test_parse_and_lock_defaults() {
        let config = parse(EXAMPLE).unwrap();
        assert_eq!(config.interfaces.mesh, "lowpan0");
        assert_eq!(config.contexts.len(), 1);

        let lock = generate_lock(&config, "config.toml");
        assert_eq!(lock.interfaces.ethernet_mac, "auto");
        assert_eq!(lock.gateway.max_dad_ns, 5);
        assert_eq!(lock.gateway.neighbor_cache_capacity, 25);
        assert_eq!(lock.gateway.context_table_capacity, 4);
        assert_eq!(lock.gateway.tentative_lifetime, 20);
        assert_eq!(lock.gateway.garbage_collectible_lifetime, 600);
        assert!(lock.gateway.sixlowpan_context_option);
        assert!(lock.gateway.authoritative_border_router);
        assert_eq!(lock.gateway.ra_forward_policy, RaForwardPolicyKind::PendingAndRouters);
        assert_eq!(lock.logging.level, "debug");
    }

    #[test]
    fn test_lock_round_trips_through_toml() {
        let lock = generate_lock(&parse(EXAMPLE).unwrap(), "config.toml");
        let text = toml::to_string_pretty(&lock).unwrap();
        let back: ConfigLock = toml::from_str(&text).unwrap();

        assert_eq!(back.gateway.addresses, lock.gateway.addresses);
        assert_eq!(back.contexts[0].length, 64);
        assert_eq!(back.generated_at, lock.generated_at);
    }

    #[test]
    fn test_missing_interfaces_is_error() {
        assert!(matches!(parse("[gateway]\nmax_dad_ns = 1"), Err(Error::Config(_))));
    }

    #[test]
    fn test_option_numbering() {
        let lock = generate_lock(&parse(EXAMPLE).unwrap(), "config.toml");
        assert_eq!(lock.gateway.option_numbering, OptionNumbering::Rfc6775);

        let text = EXAMPLE.replace("[gateway]\n", "[gateway]\noption_numbering = \"draft\"\n");
        let lock = generate_lock(&parse(&text).unwrap(), "config.toml");
        assert_eq!(lock.gateway.option_numbering, OptionNumbering::Draft);

        let back: ConfigLock = toml::from_str(&toml::to_string_pretty(&lock).unwrap()).unwrap();
        assert_eq!(back.gateway.option_numbering, OptionNumbering::Draft);

        let bad = "[interfaces]\nmesh = \"a\"\nethernet = \"b\"\n[gateway]\noption_numbering = \"rfc4944\"";
        assert!(parse(bad).is_err());
    }

    #[test]
    fn test_unknown_policy_is_error() {
        let text = "[interfaces]\nmesh = \"a\"\nethernet = \"b\"\n[gateway]\nra_forward_policy = \"all\"";
        assert!(parse(text).is_err());
    }
}

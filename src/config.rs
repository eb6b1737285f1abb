//! Connection settings for [`Client`](crate::client::Client).

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::wire::Services;
use crate::wire::constants::{
    MAIN_NET_MAGIC, PROTOCOL_VERSION, REG_TEST_MAGIC, SIG_NET_MAGIC, TEST_NET3_MAGIC,
};

/// Bitcoin Core's `-peertimeout` default: how long a peer may take to finish the handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(60);

/// Bitcoin Core's `TIMEOUT_INTERVAL`: peers ping every two minutes, so twenty
/// silent minutes means the connection is dead.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(20 * 60);

pub const DEFAULT_CHANNEL_CAPACITY: usize = 32;

/// The network a client talks to. Fixes the header magic and the default port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Network {
    Mainnet,
    Testnet3,
    #[default]
    Regtest,
    Signet,
}

impl Network {
    pub const fn magic(self) -> u32 {
        match self {
            Network::Mainnet => MAIN_NET_MAGIC,
            Network::Testnet3 => TEST_NET3_MAGIC,
            Network::Regtest => REG_TEST_MAGIC,
            Network::Signet => SIG_NET_MAGIC,
        }
    }

    pub const fn default_port(self) -> u16 {
        match self {
            Network::Mainnet => 8333,
            Network::Testnet3 => 18333,
            Network::Regtest => 18444,
            Network::Signet => 38333,
        }
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" | "main" => Ok(Network::Mainnet),
            "testnet" | "testnet3" | "test" => Ok(Network::Testnet3),
            "regtest" => Ok(Network::Regtest),
            "signet" => Ok(Network::Signet),
            other => Err(format!("unknown network: {other}")),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Network::Mainnet => "mainnet",
            Network::Testnet3 => "testnet3",
            Network::Regtest => "regtest",
            Network::Signet => "signet",
        };
        f.write_str(name)
    }
}

/// What to do with the checksum a peer declares in a frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumPolicy {
    /// Recompute the checksum over the payload and reject mismatches.
    #[default]
    Verify,
    /// Keep the declared checksum as-is.
    Trust,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub network: Network,
    pub protocol_version: i32,
    /// Services advertised for ourselves and for the receiver address block.
    pub services: Services,
    /// Deadline for each read while the handshake runs. `None` waits forever.
    pub handshake_timeout: Option<Duration>,
    /// Deadline for each read once the handshake is done. `None` waits forever.
    pub read_timeout: Option<Duration>,
    pub checksum: ChecksumPolicy,
    /// Bound of the reader -> dispatch message channel.
    pub channel_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            network: Network::default(),
            protocol_version: PROTOCOL_VERSION,
            services: Services::NODE_NETWORK,
            handshake_timeout: Some(DEFAULT_HANDSHAKE_TIMEOUT),
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
            checksum: ChecksumPolicy::default(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl ClientConfig {
    pub fn with_network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    pub fn with_protocol_version(mut self, protocol_version: i32) -> Self {
        self.protocol_version = protocol_version;
        self
    }

    pub fn with_services(mut self, services: Services) -> Self {
        self.services = services;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_checksum(mut self, policy: ChecksumPolicy) -> Self {
        self.checksum = policy;
        self
    }

    /// Zero is bumped to one; tokio channels need room for at least one message.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    pub fn magic(&self) -> u32 {
        self.network.magic()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_targets_regtest() {
        let config = ClientConfig::default();
        assert_eq!(config.network, Network::Regtest);
        assert_eq!(config.magic(), 0xDAB5BFFA);
        assert_eq!(config.network.default_port(), 18444);
        assert_eq!(config.checksum, ChecksumPolicy::Verify);
    }

    #[test]
    fn network_parses_common_names() {
        assert_eq!("mainnet".parse::<Network>(), Ok(Network::Mainnet));
        assert_eq!("Testnet".parse::<Network>(), Ok(Network::Testnet3));
        assert_eq!("signet".parse::<Network>(), Ok(Network::Signet));
        assert!("litecoin".parse::<Network>().is_err());
    }

    #[test]
    fn channel_capacity_never_zero() {
        let config = ClientConfig::default().with_channel_capacity(0);
        assert_eq!(config.channel_capacity, 1);
    }
}

//! Contract addresses, RPC endpoint and target network, loaded from the environment.

use std::env;

use alloy_primitives::{address, hex::FromHexError};
use thiserror::Error;

use crate::model::Address;

pub const TOKEN_ADDRESS_VAR: &str = "BBT_TOKEN_ADDRESS";
pub const FAUCET_ADDRESS_VAR: &str = "BBT_FAUCET_ADDRESS";
pub const RESERVE_TOKEN_ADDRESS_VAR: &str = "RESERVE_TOKEN_ADDRESS";
pub const RPC_URL_VAR: &str = "BBT_RPC_URL";

/// Wrapped AVAX on Fuji.
pub const DEFAULT_RESERVE_TOKEN: Address = address!("0xd00ae08403B9bbb9124bB305C09058E32C39A48c");
pub const FUJI_RPC_URL: &str = "https://api.avax-test.network/ext/bc/C/rpc";
pub const FUJI_CHAIN_ID: u64 = 0xa869;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}: {source}")]
    InvalidAddress { var: &'static str, source: FromHexError },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Network identity, passed verbatim to the wallet when asking it to add or switch networks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    pub chain_id: u64,
    pub chain_name: String,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Vec<String>,
    pub block_explorer_urls: Vec<String>,
}

impl NetworkConfig {
    pub fn fuji() -> Self {
        Self::fuji_with_rpc(FUJI_RPC_URL)
    }

    fn fuji_with_rpc(rpc_url: &str) -> Self {
        Self {
            chain_id: FUJI_CHAIN_ID,
            chain_name: "Avalanche Fuji Testnet".to_string(),
            native_currency: NativeCurrency {
                name: "AVAX".to_string(),
                symbol: "AVAX".to_string(),
                decimals: 18,
            },
            rpc_urls: vec![rpc_url.to_string()],
            block_explorer_urls: vec!["https://testnet.snowtrace.io/".to_string()],
        }
    }

    /// Chain id in the `0x`-prefixed form wallets report.
    pub fn chain_id_hex(&self) -> String {
        format!("{:#x}", self.chain_id)
    }
}

/// Configured contract addresses. A missing token or faucet address puts
/// that feature into synthetic-data mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractAddresses {
    pub token: Option<Address>,
    pub faucet: Option<Address>,
    pub reserve_token: Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub contracts: ContractAddresses,
    pub network: NetworkConfig,
}

impl Config {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Read configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let optional = |var: &'static str| -> Result<Option<Address>, ConfigError> {
            match lookup(var).map(|v| v.trim().to_string()) {
                Some(v) if !v.is_empty() => v
                    .parse()
                    .map(Some)
                    .map_err(|source| ConfigError::InvalidAddress { var, source }),
                _ => Ok(None),
            }
        };

        let token = optional(TOKEN_ADDRESS_VAR)?;
        let faucet = optional(FAUCET_ADDRESS_VAR)?;
        let reserve_token = optional(RESERVE_TOKEN_ADDRESS_VAR)?.unwrap_or(DEFAULT_RESERVE_TOKEN);
        let rpc_url = lookup(RPC_URL_VAR)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| FUJI_RPC_URL.to_string());

        Ok(Self {
            contracts: ContractAddresses {
                token,
                faucet,
                reserve_token,
            },
            network: NetworkConfig::fuji_with_rpc(rpc_url.trim()),
        })
    }

    pub fn contract_addresses(&self) -> &ContractAddresses {
        &self.contracts
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.contracts.token, None);
        assert_eq!(config.contracts.faucet, None);
        assert_eq!(config.contracts.reserve_token, DEFAULT_RESERVE_TOKEN);
        assert_eq!(
            config.contracts.reserve_token.to_string(),
            "0xd00ae08403B9bbb9124bB305C09058E32C39A48c"
        );
        assert_eq!(config.network, NetworkConfig::fuji());
    }

    #[test]
    fn blank_address_means_absent() {
        let config = Config::from_lookup(lookup(&[(TOKEN_ADDRESS_VAR, "  ")])).unwrap();
        assert_eq!(config.contracts.token, None);
    }

    #[test]
    fn addresses_and_rpc_are_read() {
        let token = "0x1111111111111111111111111111111111111111";
        let faucet = "0x2222222222222222222222222222222222222222";
        let config = Config::from_lookup(lookup(&[
            (TOKEN_ADDRESS_VAR, token),
            (FAUCET_ADDRESS_VAR, faucet),
            (RPC_URL_VAR, "http://localhost:9650/ext/bc/C/rpc"),
        ]))
        .unwrap();
        assert_eq!(config.contracts.token, Some(token.parse().unwrap()));
        assert_eq!(config.contracts.faucet, Some(faucet.parse().unwrap()));
        assert_eq!(
            config.network.rpc_urls,
            vec!["http://localhost:9650/ext/bc/C/rpc".to_string()]
        );
    }

    #[test]
    fn invalid_address_is_an_error() {
        let err = Config::from_lookup(lookup(&[(FAUCET_ADDRESS_VAR, "0xnope")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidAddress {
                var: FAUCET_ADDRESS_VAR,
                ..
            }
        ));
    }

    #[test]
    fn fuji_chain_id_hex() {
        assert_eq!(NetworkConfig::fuji().chain_id_hex(), "0xa869");
    }
}

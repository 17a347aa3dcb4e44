use std::fmt::{self, Display};

use alloy_chains::{Chain, NamedChain};

/// Chain id of Monad mainnet, the network every listed token must live on.
pub const DEFAULT_CHAIN_ID: u64 = 143;

/// Public RPC endpoint used when neither the CLI nor the environment name one.
pub const DEFAULT_RPC_URL: &str = "https://rpc.monad.xyz";

/// The single network a token list is validated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Network {
    pub metadata: Chain,
}

impl Network {
    pub fn from_id(id: u64) -> Self {
        Self {
            metadata: Chain::from_id(id),
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.metadata.id()
    }

    pub fn named(&self) -> Option<NamedChain> {
        self.metadata.named()
    }
}

impl Default for Network {
    fn default() -> Self {
        Self::from_id(DEFAULT_CHAIN_ID)
    }
}

impl Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.named() {
            Some(named) => write!(f, "{named} (id={})", self.chain_id()),
            None => write!(f, "chain (id={})", self.chain_id()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_network_is_monad_mainnet_id() {
        let network = Network::default();
        assert_eq!(network.chain_id(), 143);
        assert!(network.to_string().contains("id=143"));
    }

    #[test]
    fn named_chains_display_their_name() {
        let network = Network::from_id(1);
        assert_eq!(network.named(), Some(NamedChain::Mainnet));
        assert_eq!(network.to_string(), "mainnet (id=1)");
    }
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Content-type tag carried in a CID, from the multicodec table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Codec {
    Raw,
    DagPb,
    DagCbor,
    EthBlock,
    EthBlockList,
    EthTxTrie,
    EthTx,
    EthTxReceiptTrie,
    EthTxReceipt,
    EthStateTrie,
    EthAccountSnapshot,
    EthStorageTrie,
    EthReceiptLogTrie,
    EthReceiptLog,
}

impl Default for Codec {
    fn default() -> Self {
        Self::EthStateTrie
    }
}

impl Codec {
    pub const ALL: [Codec; 14] = [
        Self::Raw,
        Self::DagPb,
        Self::DagCbor,
        Self::EthBlock,
        Self::EthBlockList,
        Self::EthTxTrie,
        Self::EthTx,
        Self::EthTxReceiptTrie,
        Self::EthTxReceipt,
        Self::EthStateTrie,
        Self::EthAccountSnapshot,
        Self::EthStorageTrie,
        Self::EthReceiptLogTrie,
        Self::EthReceiptLog,
    ];

    /// The multicodec table code.
    pub const fn code(self) -> u64 {
        match self {
            Self::Raw => 0x55,
            Self::DagPb => 0x70,
            Self::DagCbor => 0x71,
            Self::EthBlock => 0x90,
            Self::EthBlockList => 0x91,
            Self::EthTxTrie => 0x92,
            Self::EthTx => 0x93,
            Self::EthTxReceiptTrie => 0x94,
            Self::EthTxReceipt => 0x95,
            Self::EthStateTrie => 0x96,
            Self::EthAccountSnapshot => 0x97,
            Self::EthStorageTrie => 0x98,
            Self::EthReceiptLogTrie => 0x99,
            Self::EthReceiptLog => 0x9a,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::DagPb => "dag-pb",
            Self::DagCbor => "dag-cbor",
            Self::EthBlock => "eth-block",
            Self::EthBlockList => "eth-block-list",
            Self::EthTxTrie => "eth-tx-trie",
            Self::EthTx => "eth-tx",
            Self::EthTxReceiptTrie => "eth-tx-receipt-trie",
            Self::EthTxReceipt => "eth-tx-receipt",
            Self::EthStateTrie => "eth-state-trie",
            Self::EthAccountSnapshot => "eth-account-snapshot",
            Self::EthStorageTrie => "eth-storage-trie",
            Self::EthReceiptLogTrie => "eth-receipt-log-trie",
            Self::EthReceiptLog => "eth-receipt-log",
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Codec {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| TypeError::UnknownCodec(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_state_trie() {
        assert_eq!(Codec::default(), Codec::EthStateTrie);
        assert_eq!(Codec::default().code(), 0x96);
    }

    #[test]
    fn names_parse_back() {
        for codec in Codec::ALL {
            assert_eq!(codec.name().parse::<Codec>().unwrap(), codec);
        }
        assert!(matches!(
            "eth-nope".parse::<Codec>(),
            Err(TypeError::UnknownCodec(_))
        ));
    }

    #[test]
    fn serde_names_match_display() {
        for codec in Codec::ALL {
            let json = serde_json::to_string(&codec).unwrap();
            assert_eq!(json, format!("\"{codec}\""));
        }
    }
}

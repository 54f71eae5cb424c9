//! Decoded rune records.

use bitcoin::Txid;
use serde::{Deserialize, Serialize};

/// A token definition carried by an issuance message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rune {
    /// Ticker derived from the on-chain symbol bytes
    pub symbol: String,
    /// Precision of fractional units
    pub decimals: u64,
}

/// One transfer line item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Assignment {
    /// Which rune is moved
    pub id: u64,
    /// Index of the transaction output receiving the amount
    pub output: u64,
    /// Quantity, already scaled by the rune's decimals
    pub amount: u64,
}

impl Assignment {
    /// Creates a new assignment
    pub fn new(id: u64, output: u64, amount: u64) -> Self {
        Self { id, output, amount }
    }
}

/// Contents of a rune payload, independent of the carrying transaction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunePayload {
    /// Issuance record, if the payload defines a new rune
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuance: Option<Rune>,
    /// Transfers in encoding order
    pub transfers: Vec<Assignment>,
}

impl RunePayload {
    /// Creates a transfer-only payload
    pub fn transfers(transfers: Vec<Assignment>) -> Self {
        Self {
            issuance: None,
            transfers,
        }
    }

    /// Sets the issuance record
    pub fn with_issuance(mut self, rune: Rune) -> Self {
        self.issuance = Some(rune);
        self
    }
}

/// Decode result for one on-chain transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuneTransaction {
    /// The transaction's identifier
    pub hash: Txid,
    /// Present only if this transaction defines a new rune
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuance: Option<Rune>,
    /// Transfers in encoding order
    pub transfers: Vec<Assignment>,
}

impl RuneTransaction {
    /// Attaches a decoded payload to its transaction id
    pub fn new(hash: Txid, payload: RunePayload) -> Self {
        Self {
            hash,
            issuance: payload.issuance,
            transfers: payload.transfers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::hashes::Hash;
    use serde_json::json;

    #[test]
    fn test_json_omits_missing_issuance() {
        let tx = RuneTransaction::new(
            Txid::all_zeros(),
            RunePayload::transfers(vec![Assignment::new(1, 0, 1000)]),
        );

        let value = serde_json::to_value(&tx).unwrap();
        assert_eq!(
            value,
            json!({
                "hash": Txid::all_zeros().to_string(),
                "transfers": [{ "id": 1, "output": 0, "amount": 1000 }],
            })
        );
    }

    #[test]
    fn test_json_includes_issuance() {
        let tx = RuneTransaction::new(
            Txid::all_zeros(),
            RunePayload::default().with_issuance(Rune {
                symbol: "RUNE".into(),
                decimals: 2,
            }),
        );

        let value = serde_json::to_value(&tx).unwrap();
        assert_eq!(value["issuance"], json!({ "symbol": "RUNE", "decimals": 2 }));
        assert_eq!(value["transfers"], json!([]));
    }
}

//! The four wire messages the network layer exchanges. These mirror the
//! `{type, payload}` message contracts described for the node's gossip
//! channel, carried here as libp2p gossipsub/request-response payloads
//! instead of framed WebSocket JSON, but with identical semantics.

use serde::{Deserialize, Serialize};

use lakha_common::block::Block;
use lakha_common::transaction::Transaction;

/// Gossiped over the transaction and block topics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum GossipMessage {
    Transaction(Transaction),
    Block(Block),
}

/// Request-response protocol used to backfill a missing ancestor block.
/// `request_block`'s payload is just the requested index; the response is
/// `Some(block)` when the responder has it, `None` otherwise (the responder
/// drops the request rather than answering, per the original contract, but
/// request-response needs some reply so an empty option stands in for "no
/// such block").
pub type BlockRequest = u64;
pub type BlockResponse = Option<Block>;

#[cfg(test)]
mod tests {
    use super::*;
    use lakha_common::transaction::TransactionKind;

    #[test]
    fn gossip_message_round_trips_through_json() {
        let tx = Transaction::new(
            "a", "b", 1.0, TransactionKind::Transfer, serde_json::json!({}), 21_000, 1.0, 0,
            1_700_000_000.0,
        );
        let message = GossipMessage::Transaction(tx.clone());
        let bytes = serde_json::to_vec(&message).unwrap();
        let decoded: GossipMessage = serde_json::from_slice(&bytes).unwrap();
        match decoded {
            GossipMessage::Transaction(decoded_tx) => assert_eq!(decoded_tx.hash, tx.hash),
            GossipMessage::Block(_) => panic!("expected transaction variant"),
        }
    }
}

//! The running network node: owns the swarm, dispatches incoming gossip and
//! block-sync traffic into `ChainState`, and exposes a small command handle
//! so the rest of the node can broadcast what it accepts locally.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use libp2p::{gossipsub, identify, request_response, swarm::SwarmEvent, PeerId, Swarm};
use tokio::sync::mpsc;

use lakha_common::block::Block;
use lakha_common::time::now;
use lakha_consensus::ChainState;

use crate::behaviour::{build_swarm, LakhaBehaviour, LakhaBehaviourEvent};
use crate::config::P2pConfig;
use crate::error::P2pError;
use crate::protocol::GossipMessage;

enum P2pCommand {
    Broadcast(GossipMessage),
    Shutdown,
}

/// A cheap, cloneable reference to the running node, used by the rest of the
/// process to broadcast locally-accepted transactions and blocks and to
/// check whether any peers are connected (the mining loop's `has_peers`).
#[derive(Clone)]
pub struct P2pHandle {
    cmd_tx: mpsc::Sender<P2pCommand>,
    peer_count: Arc<AtomicUsize>,
}

impl P2pHandle {
    pub fn has_peers(&self) -> bool {
        self.peer_count.load(Ordering::Relaxed) > 0
    }

    pub fn peer_count(&self) -> usize {
        self.peer_count.load(Ordering::Relaxed)
    }

    pub async fn broadcast_transaction(&self, tx: lakha_common::transaction::Transaction) {
        self.send(GossipMessage::Transaction(tx)).await;
    }

    pub async fn broadcast_block(&self, block: Block) {
        self.send(GossipMessage::Block(block)).await;
    }

    async fn send(&self, message: GossipMessage) {
        if self.cmd_tx.send(P2pCommand::Broadcast(message)).await.is_err() {
            tracing::warn!("p2p node is no longer running, dropped outbound message");
        }
    }

    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(P2pCommand::Shutdown).await;
    }
}

pub struct P2pNode {
    swarm: Swarm<LakhaBehaviour>,
    chain: Arc<ChainState>,
    cfg: P2pConfig,
    cmd_rx: mpsc::Receiver<P2pCommand>,
    peer_count: Arc<AtomicUsize>,
    connected: HashSet<PeerId>,
}

impl P2pNode {
    /// Builds the swarm and spawns the event loop, returning a handle the
    /// rest of the node can use to publish and to read peer liveness.
    pub fn spawn(cfg: P2pConfig, chain: Arc<ChainState>) -> Result<P2pHandle, P2pError> {
        let swarm = build_swarm(&cfg)?;
        let (cmd_tx, cmd_rx) = mpsc::channel(256);
        let peer_count = Arc::new(AtomicUsize::new(0));
        let node = P2pNode {
            swarm,
            chain,
            cfg,
            cmd_rx,
            peer_count: peer_count.clone(),
            connected: HashSet::new(),
        };
        tokio::spawn(node.run());
        Ok(P2pHandle { cmd_tx, peer_count })
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                event = self.swarm.select_next_some() => self.handle_swarm_event(event),
                Some(cmd) = self.cmd_rx.recv() => {
                    match cmd {
                        P2pCommand::Broadcast(message) => self.publish(message),
                        P2pCommand::Shutdown => break,
                    }
                }
            }
        }
    }

    fn publish(&mut self, message: GossipMessage) {
        let topic = match &message {
            GossipMessage::Transaction(_) => self.cfg.tx_topic.clone(),
            GossipMessage::Block(_) => self.cfg.block_topic.clone(),
        };
        let data = match serde_json::to_vec(&message) {
            Ok(data) => data,
            Err(error) => {
                tracing::warn!(%error, "failed to encode outbound gossip message");
                return;
            }
        };
        if let Err(error) = self
            .swarm
            .behaviour_mut()
            .gossipsub
            .publish(gossipsub::IdentTopic::new(topic), data)
        {
            tracing::warn!(%error, "failed to publish gossip message");
        }
    }

    fn handle_swarm_event(&mut self, event: SwarmEvent<LakhaBehaviourEvent>) {
        match event {
            SwarmEvent::ConnectionEstablished { peer_id, .. } => {
                self.connected.insert(peer_id);
                self.peer_count.store(self.connected.len(), Ordering::Relaxed);
            }
            SwarmEvent::ConnectionClosed { peer_id, .. } => {
                self.connected.remove(&peer_id);
                self.peer_count.store(self.connected.len(), Ordering::Relaxed);
            }
            SwarmEvent::Behaviour(LakhaBehaviourEvent::Identify(identify::Event::Received {
                peer_id,
                info,
                ..
            })) => {
                for addr in info.listen_addrs {
                    self.swarm.behaviour_mut().kad.add_address(&peer_id, addr);
                }
            }
            SwarmEvent::Behaviour(LakhaBehaviourEvent::Gossipsub(gossipsub::Event::Message {
                message,
                ..
            })) => self.handle_gossip_bytes(&message.data),
            SwarmEvent::Behaviour(LakhaBehaviourEvent::BlockSync(request_response::Event::Message {
                peer,
                message,
            })) => self.handle_block_sync(peer, message),
            SwarmEvent::Behaviour(_) => {}
            SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                tracing::warn!(?peer_id, %error, "outbound connection failed");
            }
            _ => {}
        }
    }

    fn handle_gossip_bytes(&mut self, data: &[u8]) {
        let message: GossipMessage = match serde_json::from_slice(data) {
            Ok(message) => message,
            Err(error) => {
                tracing::warn!(%error, "dropping malformed gossip message");
                return;
            }
        };
        match message {
            GossipMessage::Transaction(tx) => self.handle_incoming_transaction(tx),
            GossipMessage::Block(block) => self.handle_incoming_block(block),
        }
    }

    fn handle_incoming_transaction(&self, tx: lakha_common::transaction::Transaction) {
        if self.chain.mempool().has_processed(&tx.hash) {
            return;
        }
        let nonce = self.chain.ledger().get_nonce(&tx.from);
        let balance = self.chain.ledger().get_balance(&tx.from);
        if let Err(error) = self.chain.mempool().add_transaction(tx, nonce, balance) {
            tracing::debug!(%error, "rejected gossiped transaction");
        }
    }

    fn handle_incoming_block(&mut self, block: Block) {
        if let Some(existing) = self.chain.get_block(block.index) {
            if existing.hash == block.hash {
                return;
            }
        }
        let tip = self.chain.latest_block();
        if block.previous_hash == tip.hash {
            if !self.chain.add_block(block, now()) {
                tracing::warn!("gossiped block failed validation, discarded");
            }
            return;
        }
        let missing_index = self.chain.chain_length();
        tracing::debug!(missing_index, "requesting missing ancestor block");
        let peers: Vec<PeerId> = self.connected.iter().copied().collect();
        for peer in peers {
            self.swarm
                .behaviour_mut()
                .block_sync
                .send_request(&peer, missing_index);
        }
    }

    fn handle_block_sync(
        &mut self,
        peer: PeerId,
        message: request_response::Message<u64, Option<Block>>,
    ) {
        match message {
            request_response::Message::Request { request, channel, .. } => {
                let response = self.chain.get_block(request);
                let _ = self
                    .swarm
                    .behaviour_mut()
                    .block_sync
                    .send_response(channel, response);
            }
            request_response::Message::Response { response, .. } => {
                let _ = peer;
                if let Some(block) = response {
                    self.handle_incoming_block(block);
                }
            }
        }
    }
}

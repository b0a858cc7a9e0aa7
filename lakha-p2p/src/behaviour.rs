//! The composed libp2p behaviour and the transport/swarm construction that
//! wires it up: noise+yamux over tcp, gossipsub for transaction/block
//! broadcast, kademlia for peer discovery, identify/ping for liveness, and
//! a request-response protocol for backfilling missing blocks.

use libp2p::{
    gossipsub, identify, identity, kad, noise, ping,
    request_response::{self, ProtocolSupport},
    swarm::{Config as SwarmConfig, NetworkBehaviour, Swarm},
    tcp, yamux, Multiaddr, PeerId, StreamProtocol, Transport,
};

use crate::config::P2pConfig;
use crate::error::P2pError;
use crate::protocol::{BlockRequest, BlockResponse};

pub const BLOCK_SYNC_PROTOCOL: &str = "/lakha/blocksync/1";

#[derive(NetworkBehaviour)]
pub struct LakhaBehaviour {
    pub gossipsub: gossipsub::Behaviour,
    pub kad: kad::Behaviour<kad::store::MemoryStore>,
    pub identify: identify::Behaviour,
    pub ping: ping::Behaviour,
    pub block_sync: request_response::json::Behaviour<BlockRequest, BlockResponse>,
}

pub fn build_swarm(cfg: &P2pConfig) -> Result<Swarm<LakhaBehaviour>, P2pError> {
    let keypair = identity::Keypair::generate_ed25519();
    let peer_id = PeerId::from(keypair.public());

    let transport = tcp::tokio::Transport::new(tcp::Config::default())
        .upgrade(libp2p::core::upgrade::Version::V1)
        .authenticate(
            noise::Config::new(&keypair).map_err(|e| P2pError::Transport(e.to_string()))?,
        )
        .multiplex(yamux::Config::default())
        .boxed();

    let gossipsub_config = gossipsub::ConfigBuilder::default()
        .validation_mode(gossipsub::ValidationMode::Strict)
        .build()
        .map_err(|e| P2pError::Gossipsub(e.to_string()))?;
    let mut gossipsub = gossipsub::Behaviour::new(
        gossipsub::MessageAuthenticity::Signed(keypair.clone()),
        gossipsub_config,
    )
    .map_err(|e| P2pError::Gossipsub(e.to_string()))?;

    for topic in [&cfg.tx_topic, &cfg.block_topic] {
        gossipsub
            .subscribe(&gossipsub::IdentTopic::new(topic.clone()))
            .map_err(|e| P2pError::Subscribe(e.to_string()))?;
    }

    let kad = kad::Behaviour::new(peer_id, kad::store::MemoryStore::new(peer_id));

    let identify = identify::Behaviour::new(identify::Config::new(
        "lakha/1.0".to_string(),
        keypair.public(),
    ));

    let ping = ping::Behaviour::default();

    let block_sync = request_response::json::Behaviour::new(
        [(
            StreamProtocol::new(BLOCK_SYNC_PROTOCOL),
            ProtocolSupport::Full,
        )],
        request_response::Config::default(),
    );

    let behaviour = LakhaBehaviour {
        gossipsub,
        kad,
        identify,
        ping,
        block_sync,
    };

    let mut swarm = Swarm::new(
        transport,
        behaviour,
        peer_id,
        SwarmConfig::with_tokio_executor(),
    );

    for addr in &cfg.listen_addrs {
        let multiaddr: Multiaddr = addr
            .parse()
            .map_err(|_| P2pError::InvalidMultiaddr(addr.clone()))?;
        swarm
            .listen_on(multiaddr)
            .map_err(|e| P2pError::Listen(e.to_string()))?;
    }

    for addr in &cfg.bootstrap_peers {
        let multiaddr: Multiaddr = addr
            .parse()
            .map_err(|_| P2pError::InvalidMultiaddr(addr.clone()))?;
        if let Err(error) = swarm.dial(multiaddr.clone()) {
            tracing::warn!(%addr, %error, "failed to dial bootstrap peer");
        }
    }

    Ok(swarm)
}

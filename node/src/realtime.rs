//! Realtime TCP serving — accepts peers, runs the node-id handshake, and
//! dispatches realtime traffic into the core.
//!
//! A fresh connection is `undefined`: its first message decides whether it
//! becomes a bootstrap connection (served by [`BootstrapServer`]) or a
//! realtime channel (handshake, then publish/confirm/keepalive dispatch).

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;

use weave_crypto::KeyPair;
use weave_messages::{ConfirmAck, Keepalive, Message, NodeIdHandshake, KEEPALIVE_PEERS};
use weave_network::{is_reserved, make_response, read_message, write_message, Channel};
use weave_types::Timestamp;

use crate::block_processor::BlockSource;
use crate::node::Node;
use crate::NodeError;

/// Accept loop: one task per incoming connection.
pub async fn run_listener(
    node: Arc<Node>,
    node_key: Arc<KeyPair>,
    listener: TcpListener,
) -> Result<(), NodeError> {
    loop {
        let (stream, remote) = listener.accept().await?;
        if is_reserved(&remote, node.config.allow_local_peers) {
            tracing::debug!(%remote, "rejecting peer in reserved range");
            continue;
        }
        let node = Arc::clone(&node);
        let node_key = Arc::clone(&node_key);
        tokio::spawn(async move {
            if let Err(error) = serve_connection(node, node_key, stream, remote).await {
                tracing::debug!(%error, %remote, "connection closed");
            }
        });
    }
}

/// Serve one undefined connection until its type is decided, then to
/// completion.
pub async fn serve_connection<S>(
    node: Arc<Node>,
    node_key: Arc<KeyPair>,
    mut stream: S,
    remote: SocketAddr,
) -> Result<(), NodeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    node.channels
        .insert(Channel::new(remote, weave_messages::PROTOCOL_VERSION));

    let result = async {
        let (_, first) = read_message(&mut stream, node.config.network).await?;
        match first {
            Message::NodeIdHandshake(handshake) => {
                realtime_session(&node, &node_key, &mut stream, remote, handshake).await
            }
            bootstrap_request @ (Message::BulkPull(_)
            | Message::BulkPullAccount(_)
            | Message::FrontierReq(_)
            | Message::BulkPush) => {
                // Replay the request into the bootstrap server's loop by
                // handling it here, then continue serving.
                dispatch_bootstrap(&node, &mut stream, bootstrap_request).await?;
                let processor = Arc::clone(&node.block_processor);
                node.bootstrap_server
                    .serve(stream, move |block| {
                        processor.add(block, BlockSource::Live);
                    })
                    .await
            }
            other => {
                tracing::debug!(?other, %remote, "unexpected first message");
                Ok(())
            }
        }
    }
    .await;

    node.channels.remove(&remote);
    result
}

async fn dispatch_bootstrap<S>(
    node: &Arc<Node>,
    stream: &mut S,
    request: Message,
) -> Result<(), NodeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    use tokio::io::AsyncWriteExt;
    match request {
        Message::BulkPull(request) => {
            let response = node.bootstrap_server.bulk_pull_response(&request)?;
            stream.write_all(&response).await?;
        }
        Message::BulkPullAccount(request) => {
            let response = node.bootstrap_server.bulk_pull_account_response(&request)?;
            stream.write_all(&response).await?;
        }
        Message::FrontierReq(request) => {
            let response = node.bootstrap_server.frontier_response(&request)?;
            stream.write_all(&response).await?;
        }
        Message::BulkPush => {
            while let Some(block) = crate::bootstrap::read_typed_block(&mut *stream).await? {
                node.block_processor.add(block, BlockSource::Live);
            }
        }
        _ => {}
    }
    Ok(())
}

/// Handshake, promote the channel, then dispatch realtime messages.
async fn realtime_session<S>(
    node: &Arc<Node>,
    node_key: &KeyPair,
    stream: &mut S,
    remote: SocketAddr,
    incoming: NodeIdHandshake,
) -> Result<(), NodeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // Answer the peer's query and attach our own challenge.
    let syn_cookies = weave_network::SynCookies::with_defaults();
    let our_cookie = syn_cookies.assign(&remote);
    if let Some(reply) = make_response(&incoming, our_cookie, node_key) {
        write_message(
            &mut *stream,
            &Message::NodeIdHandshake(reply),
            node.config.network,
        )
        .await?;
    }

    // The peer must answer our challenge before promotion.
    if our_cookie.is_some() {
        let (_, answer) = read_message(&mut *stream, node.config.network).await?;
        let Message::NodeIdHandshake(answer) = answer else {
            return Err(NodeError::Network(weave_network::NetworkError::Handshake(
                "expected handshake response",
            )));
        };
        let Some((node_id, signature)) = answer.response else {
            return Err(NodeError::Network(weave_network::NetworkError::Handshake(
                "handshake response missing",
            )));
        };
        if !syn_cookies.validate(&remote, &node_id, &signature) {
            return Err(NodeError::Network(weave_network::NetworkError::Handshake(
                "invalid cookie signature",
            )));
        }
        node.channels.promote(&remote, node_id);
        tracing::debug!(%remote, %node_id, "channel promoted to realtime");
    }

    // Realtime dispatch loop.
    loop {
        let (_, message) = read_message(&mut *stream, node.config.network).await?;
        node.channels.touch(&remote, Timestamp::now());
        node.stats.increment("messages_received");
        match message {
            Message::Publish(publish) => {
                node.block_processor.add(publish.block, BlockSource::Live);
            }
            Message::Keepalive(keepalive) => {
                // Remember advertised peers as future connection
                // candidates; the peering maintenance probes them before a
                // channel is admitted.
                record_keepalive_peers(node, &keepalive)?;
                // Answer with a random selection of our own peers.
                let mut reply = Keepalive::empty();
                node.channels.random_fill(&mut reply.peers[..KEEPALIVE_PEERS]);
                write_message(&mut *stream, &Message::Keepalive(reply), node.config.network).await?;
            }
            Message::ConfirmAck(ConfirmAck { vote }) => {
                // Vote aggregation is the consensus layer's job; the core
                // refuses invalid signatures and records the newest vote
                // per representative for replay protection.
                if vote.validate() {
                    record_vote(node, &vote)?;
                } else {
                    node.stats.increment("messages_dropped");
                }
            }
            Message::ConfirmReq(_) => {
                // Served by the vote-request aggregator outside the core.
            }
            other => {
                tracing::debug!(?other, %remote, "dropping non-realtime message");
                node.stats.increment("messages_dropped");
            }
        }
    }
}

/// Persist non-reserved keepalive peers so they survive restarts and feed
/// the connection candidates.
fn record_keepalive_peers(node: &Arc<Node>, keepalive: &Keepalive) -> Result<(), NodeError> {
    let candidates: Vec<_> = keepalive
        .peers
        .iter()
        .filter(|peer| !is_reserved(peer, node.config.allow_local_peers))
        .collect();
    if candidates.is_empty() {
        return Ok(());
    }
    let mut txn = node.store.tx_begin_write(weave_store::Writer::Node)?;
    for peer in candidates {
        node.store.peer.put(txn.raw_mut(), peer)?;
    }
    txn.commit()?;
    Ok(())
}

/// Persist the highest-sequence vote per representative for replay
/// protection.
fn record_vote(node: &Arc<Node>, vote: &weave_messages::Vote) -> Result<(), NodeError> {
    let store = &node.store;
    let newer = {
        let txn = store.tx_begin_read()?;
        match store.vote.get(txn.raw(), &vote.account)? {
            Some(existing) => vote.sequence > existing.sequence,
            None => true,
        }
    };
    if !newer {
        node.stats.increment("messages_dropped");
        return Ok(());
    }
    let mut txn = store.tx_begin_write(weave_store::Writer::Node)?;
    store.vote.put(
        txn.raw_mut(),
        &weave_store::StoredVote {
            voter: vote.account,
            sequence: vote.sequence,
            hashes: vote.hashes.clone(),
            signature: vote.signature,
        },
    )?;
    txn.commit()?;
    Ok(())
}

//! Node-id handshake helpers.
//!
//! The initiator sends `node_id_handshake(query=cookie)`; the responder
//! replies with its node id, a signature over the cookie, and its own
//! query; the initiator answers that query in turn. A channel is promoted
//! to realtime only after both directions verify.

use weave_crypto::{sign_message, KeyPair};
use weave_messages::NodeIdHandshake;
use weave_types::{Account, Signature};

/// Sign a peer's cookie with our node key.
pub fn sign_cookie(cookie: &[u8; 32], node_key: &KeyPair) -> (Account, Signature) {
    (
        Account::new(*node_key.public.as_bytes()),
        sign_message(cookie, &node_key.private),
    )
}

/// Build the response to an incoming handshake: answer the peer's query
/// and, when `our_cookie` is present, attach our own query.
pub fn make_response(
    incoming: &NodeIdHandshake,
    our_cookie: Option<[u8; 32]>,
    node_key: &KeyPair,
) -> Option<NodeIdHandshake> {
    let response = incoming.query.as_ref().map(|cookie| sign_cookie(cookie, node_key));
    if response.is_none() && our_cookie.is_none() {
        return None;
    }
    Some(NodeIdHandshake {
        query: our_cookie,
        response,
    })
}

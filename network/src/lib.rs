//! Network layer: peer channels, node-id handshake, reserved address
//! filtering, bandwidth limiting and message framing over TCP.

pub mod bandwidth;
pub mod channels;
pub mod error;
pub mod handshake;
pub mod reserved;
pub mod stream;
pub mod syn_cookies;

pub use bandwidth::BandwidthLimiter;
pub use channels::{Channel, ChannelMode, ChannelTable};
pub use error::NetworkError;
pub use handshake::{make_response, sign_cookie};
pub use reserved::is_reserved;
pub use stream::{read_message, write_message};
pub use syn_cookies::SynCookies;

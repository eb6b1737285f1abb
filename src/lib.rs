//! A minimal Bitcoin P2P client.
//!
//! It connects to one node, performs the `version` / `verack` handshake and
//! then keeps the connection alive by answering `ping` with `pong`. Nothing
//! else: no block or transaction relay, no peer discovery.
//!
//! - [`wire`]: message framing, checksums and the `version` payload
//! - [`handshake`]: the handshake state machine
//! - [`client`]: the connection controller tying both to a TCP socket
//!
//! ```no_run
//! use btc_handshake::client::Client;
//! use btc_handshake::config::ClientConfig;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() {
//! let client = Client::new("127.0.0.1", 18444, ClientConfig::default(), tracing::Span::none());
//! let err = client.connect(CancellationToken::new()).await;
//! if !err.is_cancelled() {
//!     eprintln!("connection error: {err}");
//! }
//! # }
//! ```
pub mod client;
pub mod config;
pub mod error;
pub mod handshake;
pub mod wire;

pub use client::Client;
pub use config::{ChecksumPolicy, ClientConfig, Network};
pub use error::{Error, HandshakeError, WireError};

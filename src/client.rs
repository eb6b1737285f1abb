//! Connection controller: dial, handshake, then serve the peer until told to stop.

use std::io;
use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, info, info_span, warn};

use crate::config::ClientConfig;
use crate::error::{Error, WireError};
use crate::handshake::Handshake;
use crate::wire::{self, Command, Message, ReadOptions};

/// A client for a single Bitcoin node.
///
/// [`Client::connect`] owns one connection for its whole lifetime and
/// [`Client::disconnect`] asks it to end. Share the client behind an `Arc`
/// to disconnect from another task.
pub struct Client {
    host: String,
    port: u16,
    config: ClientConfig,
    span: Span,
    active: Mutex<Option<CancellationToken>>,
}

impl Client {
    pub fn new(host: impl Into<String>, port: u16, config: ClientConfig, span: Span) -> Self {
        Self {
            host: host.into(),
            port,
            config,
            span,
            active: Mutex::new(None),
        }
    }

    /// Connects, performs the handshake and answers pings until the
    /// connection ends.
    ///
    /// This only returns once the connection is torn down, and it always
    /// returns an error: [`Error::Cancelled`] when `cancel` fires or
    /// [`Client::disconnect`] is called, a real failure otherwise. The reader
    /// task has finished and the socket is closed by the time it returns.
    pub async fn connect(&self, cancel: CancellationToken) -> Error {
        let Some(slot) = ActiveSlot::claim(self, &cancel) else {
            return Error::AlreadyConnected;
        };

        self.run(&slot.cancel).instrument(self.span.clone()).await
    }

    /// Requests the active connection to end. Does not wait for it; await
    /// [`Client::connect`] for that. A no-op when nothing is connected.
    pub fn disconnect(&self) {
        if let Some(token) = self.lock_active().as_ref() {
            token.cancel();
        }
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run(&self, cancel: &CancellationToken) -> Error {
        let (mut stream, target) = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Error::Cancelled,
            dialed = self.dial() => match dialed {
                Ok(dialed) => dialed,
                Err(e) => {
                    warn!(error = %e, "dial failed");
                    return e;
                }
            },
        };

        info!(peer = %target, "performing handshake");
        let mut handshake = Handshake::new(&self.config, info_span!("handshake"));
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Error::Cancelled,
            shaken = handshake.run(&mut stream, target) => {
                if let Err(e) = shaken {
                    return Error::Handshake(e);
                }
            }
        }
        info!("handshake successful");

        let (read_half, mut write_half) = stream.into_split();
        let (msg_tx, mut msg_rx) = mpsc::channel(self.config.channel_capacity);
        let (err_tx, mut err_rx) = mpsc::channel(1);

        let options = ReadOptions {
            magic: self.config.magic(),
            checksum: self.config.checksum,
            timeout: self.config.read_timeout,
        };
        let reader_cancel = cancel.child_token();
        let reader = tokio::spawn(
            read_loop(read_half, options, msg_tx, err_tx, reader_cancel.clone())
                .instrument(Span::current()),
        );

        let err = self
            .dispatch(cancel, &mut msg_rx, &mut err_rx, &mut write_half)
            .await;

        reader_cancel.cancel();
        drop(msg_rx);
        drop(err_rx);
        if let Err(e) = reader.await {
            warn!(error = %e, "reader task did not finish cleanly");
        }

        err
    }

    async fn dial(&self) -> Result<(TcpStream, SocketAddr), Error> {
        let addr = format!("{}:{}", self.host, self.port);

        let target = tokio::net::lookup_host(&addr)
            .await
            .and_then(|mut addrs| {
                addrs
                    .next()
                    .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no addresses found"))
            })
            .map_err(|source| Error::Resolve {
                addr: addr.clone(),
                source,
            })?;

        debug!(%target, "dialing");
        let stream = TcpStream::connect(target)
            .await
            .map_err(|source| Error::Dial { addr, source })?;

        Ok((stream, target))
    }

    /// Waits on cancellation, the next decoded message or a reader error,
    /// in that priority, until one of them ends the connection.
    async fn dispatch<W>(
        &self,
        cancel: &CancellationToken,
        messages: &mut mpsc::Receiver<Message>,
        errors: &mut mpsc::Receiver<WireError>,
        writer: &mut W,
    ) -> Error
    where
        W: AsyncWrite + Unpin,
    {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("connection cancelled");
                    return Error::Cancelled;
                }
                msg = messages.recv() => match msg {
                    Some(msg) => {
                        if let Err(e) = self.handle(msg, writer, cancel).await {
                            if e.is_cancelled() {
                                info!("connection cancelled while replying");
                            }
                            return e;
                        }
                    }
                    // The reader queues its error before dropping the message sender.
                    None => {
                        let err = errors.recv().await.unwrap_or_else(reader_gone);
                        return Error::MessageReceive(err);
                    }
                },
                err = errors.recv() => {
                    return Error::MessageReceive(err.unwrap_or_else(reader_gone));
                }
            }
        }
    }

    /// Replies to `msg` if it calls for a reply. A peer that stops reading
    /// stalls the write, so the write also yields to `cancel`.
    async fn handle<W>(
        &self,
        msg: Message,
        writer: &mut W,
        cancel: &CancellationToken,
    ) -> Result<(), Error>
    where
        W: AsyncWrite + Unpin,
    {
        match msg.command() {
            Command::Ping => {
                debug!(len = msg.payload_length(), "ping message received, sending pong");
                // The ping nonce goes back untouched so the peer can match the pong.
                let pong = Message::new(self.config.magic(), Command::Pong, msg.into_payload());
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(Error::Cancelled),
                    sent = wire::write_message(writer, &pong) => sent.map_err(Error::MessageSend),
                }
            }
            command => {
                info!(%command, len = msg.payload_length(), "message received");
                Ok(())
            }
        }
    }
}

/// Marks the connection taken for as long as `connect` runs, including when
/// its future is dropped early.
struct ActiveSlot<'a> {
    client: &'a Client,
    cancel: CancellationToken,
}

impl<'a> ActiveSlot<'a> {
    fn claim(client: &'a Client, parent: &CancellationToken) -> Option<Self> {
        let mut active = client.lock_active();
        if active.is_some() {
            return None;
        }

        let cancel = parent.child_token();
        *active = Some(cancel.clone());
        Some(Self { client, cancel })
    }
}

impl Drop for ActiveSlot<'_> {
    fn drop(&mut self) {
        *self.client.lock_active() = None;
    }
}

fn reader_gone() -> WireError {
    WireError::Io(io::Error::new(
        io::ErrorKind::BrokenPipe,
        "reader task stopped",
    ))
}

/// Reads frames until cancelled, the dispatch side goes away, or a read
/// fails. The first failure is forwarded on `errors` and ends the loop.
async fn read_loop<R>(
    mut reader: R,
    options: ReadOptions,
    messages: mpsc::Sender<Message>,
    errors: mpsc::Sender<WireError>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    loop {
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            read = wire::read_message(&mut reader, &options) => read,
        };

        match read {
            Ok(msg) => {
                if messages.send(msg).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                debug!(error = %e, "read failed, stopping reader");
                let _ = errors.send(e).await;
                return;
            }
        }
    }
}

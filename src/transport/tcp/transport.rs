// src/transport/tcp/transport.rs

//! TCP transport implementation.
//!
//! ## Concurrency model
//!
//! - One **accept task** per listening socket attaches inbound connections.
//! - Every link owns a **writer task** fed by an mpsc channel and a
//!   **reader task** that dispatches inbound frames to the local routes.
//! - Link state is shared behind `Arc<Shared>`; the transport keeps every
//!   task handle and aborts them on `close()` or drop.
//!
//! When a reader task ends (peer closed the socket or sent garbage), the
//! link entry is removed, which drops the writer's sender and ends the
//! writer task as well.
//!
//! Messages are encoded once per publish and links queue the encoded
//! frame. A message too large for one frame is refused by `publish()`
//! before any route or link sees it; the links stay up.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

use super::frame::{encode_frame, read_frame, write_body, write_frame, Frame};
use crate::retry::retry_with_backoff;
use crate::transport::routing::Routes;
use crate::transport::{lock_ignore_poison, Locator};
use crate::{
    //
    log_debug,
    log_info,
    log_warn,
    CongestionControl,
    Config,
    Error,
    Interest,
    KeyExpr,
    Link,
    Message,
    Reliability,
    Result,
    SubscriptionHandle,
    Transport,
    TransportBase,
    TransportPtr,
    WhatAmI,
};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
const ACCEPT_ERROR_DELAY: Duration = Duration::from_millis(100);

struct LinkEntry {
    remote: Link,
    /// Encoded `Frame::Data` bodies waiting for the writer task.
    tx: mpsc::Sender<Bytes>,
}

/// State shared between the transport and its tasks.
struct Shared {
    base: TransportBase,
    routes: Routes,
    links: RwLock<HashMap<u64, LinkEntry>>,
    next_link: AtomicU64,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    /// Set by `close()`; checked under the `links` lock before a link is
    /// added.
    closed: AtomicBool,
}

impl Shared {
    fn new(base: TransportBase) -> Arc<Self> {
        Arc::new(Self {
            base,
            routes: Routes::new(),
            links: RwLock::new(HashMap::new()),
            next_link: AtomicU64::new(1),
            tasks: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = lock_ignore_poison(&self.tasks);
        tasks.retain(|t| !t.is_finished());
        tasks.push(handle);
    }

    fn abort_all(&self) {
        for task in lock_ignore_poison(&self.tasks).drain(..) {
            task.abort();
        }
    }

    /// Queue the encoded frame of `msg` on every link except `except`,
    /// optionally skipping links to routers.
    async fn send_to_links(
        &self,
        msg: &Message,
        frame: &Bytes,
        except: Option<u64>,
        skip_routers: bool,
    ) {
        // ---
        let senders: Vec<(u64, mpsc::Sender<Bytes>)> = {
            let links = self.links.read().await;
            links
                .iter()
                .filter(|(id, entry)| {
                    Some(**id) != except
                        && !(skip_routers && entry.remote.whatami == WhatAmI::Router)
                })
                .map(|(id, entry)| (*id, entry.tx.clone()))
                .collect()
        };

        for (_link_id, tx) in senders {
            let queued = match msg.congestion_control {
                CongestionControl::Drop => tx.try_send(frame.clone()).is_ok(),
                CongestionControl::Block => tx.send(frame.clone()).await.is_ok(),
            };
            if !queued {
                log_debug!(
                    "{}: link {_link_id} did not accept message on {}",
                    self.base.zid,
                    msg.key_expr
                );
            }
        }
    }
}

/// TCP-based implementation of the `Transport` trait.
struct TcpTransport {
    // ---
    shared: Arc<Shared>,
    locators: Vec<String>,
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
    // ---
    fn base(&self) -> &TransportBase {
        &self.shared.base
    }

    /// Deliver `msg` locally and queue it on every link.
    ///
    /// # Errors
    ///
    /// [`Error::FrameTooLarge`] if `msg` does not fit in one frame; nothing
    /// is delivered in that case.
    async fn publish(&self, msg: Message) -> Result<()> {
        // ---
        let frame = encode_frame(&Frame::Data(msg.clone()))?;

        self.shared.routes.dispatch(&msg).await;
        self.shared.send_to_links(&msg, &frame, None, false).await;
        Ok(())
    }

    async fn subscribe(
        &self,
        key_expr: KeyExpr,
        interest: Interest,
        reliability: Reliability,
    ) -> Result<SubscriptionHandle> {
        Ok(self
            .shared
            .routes
            .insert(
                self.zid(),
                key_expr,
                interest,
                reliability,
                self.shared.base.queue_size,
            )
            .await)
    }

    async fn unsubscribe(&self, id: u64) -> Result<bool> {
        Ok(self.shared.routes.remove(self.zid(), id).await)
    }

    async fn links(&self) -> Vec<Link> {
        self.shared
            .links
            .read()
            .await
            .values()
            .map(|entry| entry.remote)
            .collect()
    }

    fn locators(&self) -> Vec<String> {
        self.locators.clone()
    }

    /// Close every link and listener and clear the local routes.
    async fn close(&self) -> Result<()> {
        // ---
        log_debug!("{}: closing tcp transport...", self.zid());

        self.shared.closed.store(true, Ordering::Release);
        self.shared.links.write().await.clear();
        self.shared.abort_all();
        self.shared.routes.clear().await;
        Ok(())
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        // Tasks hold `Arc<Shared>`; aborting them breaks the cycle.
        self.shared.abort_all();
    }
}

/// Exchange `Hello` frames and return the remote side's identity.
async fn handshake(stream: &mut TcpStream, base: &TransportBase) -> Result<Link> {
    // ---
    let hello = Frame::Hello {
        zid: base.zid,
        whatami: base.mode,
    };
    write_frame(stream, &hello).await?;

    match read_frame(stream).await? {
        Some(Frame::Hello { zid, whatami }) => Ok(Link { zid, whatami }),
        Some(Frame::Data(_)) => Err(Error::Transport("expected hello, got data".into())),
        None => Err(Error::Transport("link closed during handshake".into())),
    }
}

/// Handshake on `stream` and start its reader and writer tasks.
async fn attach(shared: Arc<Shared>, mut stream: TcpStream) -> Result<Link> {
    // ---
    stream.set_nodelay(true)?;

    let remote = tokio::time::timeout(HANDSHAKE_TIMEOUT, handshake(&mut stream, &shared.base))
        .await
        .map_err(|_| Error::Timeout)??;

    let (reader, writer) = stream.into_split();
    let (tx, rx) = mpsc::channel(shared.base.queue_size);
    let link_id = shared.next_link.fetch_add(1, Ordering::Relaxed);

    // close() clears the links under this lock before aborting tasks, so a
    // link added here is either seen by close() or never added.
    let mut links = shared.links.write().await;
    if shared.closed.load(Ordering::Acquire) {
        return Err(Error::Transport(format!(
            "transport closed during handshake with {}",
            remote.zid
        )));
    }
    links.insert(link_id, LinkEntry { remote, tx });

    shared.track(tokio::spawn(write_loop(writer, rx)));
    shared.track(tokio::spawn(read_loop(shared.clone(), reader, link_id)));
    drop(links);

    log_info!(
        "{}: link {link_id} up with {} {}",
        shared.base.zid,
        remote.whatami,
        remote.zid
    );

    Ok(remote)
}

async fn write_loop(mut writer: OwnedWriteHalf, mut rx: mpsc::Receiver<Bytes>) {
    // ---
    while let Some(body) = rx.recv().await {
        match write_body(&mut writer, &body).await {
            Ok(()) => {}
            Err(Error::FrameTooLarge(_len)) => {
                log_warn!("link: skipped frame of {_len} bytes");
            }
            Err(_err) => {
                log_warn!("link write failed: {_err}");
                break;
            }
        }
    }
}

async fn read_loop(shared: Arc<Shared>, mut reader: OwnedReadHalf, link_id: u64) {
    // ---
    let forward = shared.base.mode == WhatAmI::Router;

    loop {
        match read_frame(&mut reader).await {
            Ok(Some(Frame::Data(msg))) => {
                shared.routes.dispatch(&msg).await;
                if forward {
                    match encode_frame(&Frame::Data(msg.clone())) {
                        Ok(frame) => {
                            shared.send_to_links(&msg, &frame, Some(link_id), true).await;
                        }
                        Err(_err) => {
                            log_warn!("{}: not forwarding {}: {_err}", shared.base.zid, msg.key_expr);
                        }
                    }
                }
            }
            Ok(Some(Frame::Hello { .. })) => {
                log_warn!("{}: link {link_id}: unexpected hello", shared.base.zid);
            }
            Ok(None) => {
                log_debug!("{}: link {link_id} closed by remote", shared.base.zid);
                break;
            }
            Err(_err) => {
                log_warn!("{}: link {link_id} failed: {_err}", shared.base.zid);
                break;
            }
        }
    }

    shared.links.write().await.remove(&link_id);
}

async fn accept_loop(shared: Arc<Shared>, listener: TcpListener) {
    // ---
    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                log_debug!("{}: accepted connection from {_addr}", shared.base.zid);
                let link_shared = shared.clone();
                shared.track(tokio::spawn(async move {
                    if let Err(_err) = attach(link_shared, stream).await {
                        log_warn!("inbound link rejected: {_err}");
                    }
                }));
            }
            Err(_err) => {
                log_warn!("{}: accept failed: {_err}", shared.base.zid);
                tokio::time::sleep(ACCEPT_ERROR_DELAY).await;
            }
        }
    }
}

fn tcp_addresses(endpoints: &[String]) -> Result<Vec<String>> {
    endpoints
        .iter()
        .map(|e| match e.parse::<Locator>()? {
            Locator::Tcp(addr) => Ok(addr),
            Locator::Memory(_) => Err(Error::InvalidConfig(format!(
                "`{e}` is not a tcp endpoint"
            ))),
        })
        .collect()
}

/// Create a TCP transport: bind every listen endpoint, then connect to
/// every connect endpoint.
///
/// # Errors
///
/// - [`Error::Io`] if a listen endpoint cannot be bound.
/// - In client mode, the last connection error if a connect endpoint stays
///   unreachable after the configured retries. Peers and routers log the
///   failure and carry on, so they can be started in any order.
pub(crate) async fn create_tcp_transport(
    base: TransportBase,
    config: &Config,
) -> Result<TransportPtr> {
    // ---
    let listen = tcp_addresses(&config.listen.endpoints)?;
    let connect = tcp_addresses(&config.connect.endpoints)?;

    let shared = Shared::new(base);

    let mut transport = TcpTransport {
        shared: shared.clone(),
        locators: Vec::new(),
    };

    for addr in &listen {
        let listener = TcpListener::bind(addr.as_str()).await?;
        let local = listener.local_addr()?;
        log_info!("{}: listening on tcp/{local}", shared.base.zid);
        transport.locators.push(format!("tcp/{local}"));
        shared.track(tokio::spawn(accept_loop(shared.clone(), listener)));
    }

    for addr in &connect {
        let connected = retry_with_backoff(&config.connect.retry, || async {
            TcpStream::connect(addr.as_str())
                .await
                .map_err(|e| Error::TransportRetryable(format!("tcp/{addr}: {e}")))
        })
        .await;

        let result = match connected {
            Ok(stream) => attach(shared.clone(), stream).await.map(|_| ()),
            Err(e) => Err(e),
        };

        if let Err(err) = result {
            if shared.base.mode == WhatAmI::Client {
                return Err(err);
            }
            log_warn!("{}: could not connect to tcp/{addr}: {err}", shared.base.zid);
        }
    }

    Ok(Arc::new(transport))
}

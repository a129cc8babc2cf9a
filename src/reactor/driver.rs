//! Tokio-backed reactor
//!
//! Every socket is served by its own driver task. Driver tasks own the
//! stream and perform the actual reads and writes, but they never touch
//! session state: all they do is post [`ReactorEvent`]s onto one channel
//! that a single dispatcher consumes.

use bytes::{Bytes, BytesMut};
use log::{debug, trace, warn};
use socket2::SockRef;
use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpSocket, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use super::{EventKind, Reactor, ReactorEvent, SocketOptions, Token, Transport};
use crate::config::ProxyConfig;

/// Per-socket driver settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverSettings {
    /// Maximum size of one read, and so of one relayed chunk
    pub buffer_size: usize,
    /// How long an outbound connect may take
    pub connect_timeout: Duration,
    /// Inactivity after which a socket reports a timeout; `None` disables it
    pub idle_timeout: Option<Duration>,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self::from(&ProxyConfig::default())
    }
}

impl From<&ProxyConfig> for DriverSettings {
    fn from(config: &ProxyConfig) -> Self {
        Self {
            buffer_size: config.buffer_size,
            connect_timeout: Duration::from_secs(config.connect_timeout),
            idle_timeout: match config.idle_timeout {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }
}

/// Command sent from a [`TokioTransport`] to its driver task
#[derive(Debug)]
enum Command {
    ReadInterest(bool),
    Write(Bytes),
    Configure(SocketOptions),
}

/// Where a driver task gets its stream from
enum Origin {
    Accepted(TcpStream),
    Connect(TcpSocket, SocketAddr),
}

/// Reactor spawning one tokio task per socket
///
/// Must be used from within a tokio runtime.
pub struct TokioReactor {
    events: mpsc::UnboundedSender<ReactorEvent>,
    settings: DriverSettings,
    next_token: u64,
}

impl TokioReactor {
    /// Create a reactor posting its events to `events`
    pub fn new(events: mpsc::UnboundedSender<ReactorEvent>, settings: DriverSettings) -> Self {
        Self { events, settings, next_token: 0 }
    }

    fn spawn(&mut self, origin: Origin) -> TokioTransport {
        self.next_token += 1;
        let token = Token(self.next_token);
        let (commands, receiver) = mpsc::unbounded_channel();
        let task = tokio::spawn(drive(token, origin, receiver, self.events.clone(), self.settings));

        TokioTransport { token, commands, task: Some(task) }
    }
}

impl Reactor for TokioReactor {
    type Socket = TcpStream;

    fn attach(&mut self, socket: TcpStream) -> io::Result<Box<dyn Transport>> {
        Ok(Box::new(self.spawn(Origin::Accepted(socket))))
    }

    fn connect(&mut self, addr: SocketAddr) -> io::Result<Box<dyn Transport>> {
        let socket = if addr.is_ipv4() { TcpSocket::new_v4()? } else { TcpSocket::new_v6()? };
        Ok(Box::new(self.spawn(Origin::Connect(socket, addr))))
    }
}

/// Handle to one driver task
pub struct TokioTransport {
    token: Token,
    commands: mpsc::UnboundedSender<Command>,
    task: Option<JoinHandle<()>>,
}

impl TokioTransport {
    fn send(&self, command: Command) {
        // A driver that already exited has reported its terminal event.
        if self.commands.send(command).is_err() {
            trace!("Driver {} is gone, command dropped", self.token);
        }
    }
}

impl Transport for TokioTransport {
    fn token(&self) -> Token {
        self.token
    }

    fn set_read_interest(&mut self, enabled: bool) {
        self.send(Command::ReadInterest(enabled));
    }

    fn write(&mut self, data: Bytes) {
        self.send(Command::Write(data));
    }

    fn configure(&mut self, options: SocketOptions) {
        self.send(Command::Configure(options));
    }

    fn close(&mut self) {
        // Aborting drops the driver future and with it the socket.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for TokioTransport {
    fn drop(&mut self) {
        self.close();
    }
}

fn post(events: &mpsc::UnboundedSender<ReactorEvent>, event: ReactorEvent) {
    // The dispatcher only goes away at shutdown, when events no longer matter.
    let _ = events.send(event);
}

fn apply_options(token: Token, stream: &TcpStream, options: SocketOptions) {
    if let Err(e) = stream.set_nodelay(options.nodelay) {
        warn!("Failed to set TCP_NODELAY on {}: {}", token, e);
    }
    if let Err(e) = SockRef::from(stream).set_keepalive(options.keepalive) {
        warn!("Failed to set SO_KEEPALIVE on {}: {}", token, e);
    }
}

/// A write in progress; it hands the write half back when done
type WriteFuture = Pin<Box<dyn Future<Output = (OwnedWriteHalf, io::Result<()>)> + Send>>;

fn begin_write(mut writer: OwnedWriteHalf, data: Bytes) -> WriteFuture {
    Box::pin(async move {
        let result = writer.write_all(&data).await;
        (writer, result)
    })
}

async fn finish_write(write: &mut Option<WriteFuture>) -> (OwnedWriteHalf, io::Result<()>) {
    match write {
        Some(write) => write.await,
        None => std::future::pending().await,
    }
}

fn idle_deadline(idle_timeout: Option<Duration>) -> Instant {
    // Without a timeout the branch is disabled and the deadline is unused.
    Instant::now() + idle_timeout.unwrap_or(Duration::from_secs(3600))
}

async fn establish(
    token: Token,
    origin: Origin,
    events: &mpsc::UnboundedSender<ReactorEvent>,
    connect_timeout: Duration,
) -> Option<TcpStream> {
    let (socket, peer) = match origin {
        Origin::Accepted(stream) => return Some(stream),
        Origin::Connect(socket, peer) => (socket, peer),
    };

    let result = match time::timeout(connect_timeout, socket.connect(peer)).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "Connection timed out")),
    };

    match result {
        Ok(stream) => {
            let local = stream.local_addr().ok();
            post(events, ReactorEvent::Connected { token, peer, local, result: Ok(()) });
            Some(stream)
        }
        Err(e) => {
            debug!("Connect {} to {} failed: {}", token, peer, e);
            post(events, ReactorEvent::Connected { token, peer, local: None, result: Err(e) });
            None
        }
    }
}

async fn drive(
    token: Token,
    origin: Origin,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<ReactorEvent>,
    settings: DriverSettings,
) {
    let Some(stream) = establish(token, origin, &events, settings.connect_timeout).await else {
        return;
    };

    let (mut reader, writer) = stream.into_split();
    let mut buffer = BytesMut::with_capacity(settings.buffer_size);
    let mut read_armed = false;

    // The write half lives either here or inside the write in progress,
    // so reads keep being serviced while a write is blocked.
    let mut idle_writer = Some(writer);
    let mut writing: Option<WriteFuture> = None;
    let mut queued: VecDeque<Bytes> = VecDeque::new();

    // The idle clock starts once the relay first arms reading.
    let mut idle_armed = false;
    let idle = time::sleep(Duration::ZERO);
    tokio::pin!(idle);

    loop {
        if writing.is_none() && !queued.is_empty() {
            if let (Some(writer), Some(data)) = (idle_writer.take(), queued.pop_front()) {
                writing = Some(begin_write(writer, data));
            }
        }
        buffer.reserve(settings.buffer_size);

        tokio::select! {
            command = commands.recv() => match command {
                // Handle dropped without close; nobody listens anymore.
                None => break,
                Some(Command::ReadInterest(enabled)) => {
                    read_armed = enabled;
                    if enabled && !idle_armed {
                        idle_armed = true;
                        idle.as_mut().reset(idle_deadline(settings.idle_timeout));
                    }
                }
                Some(Command::Configure(options)) => apply_options(token, reader.as_ref(), options),
                Some(Command::Write(data)) => queued.push_back(data),
            },
            (writer, result) = finish_write(&mut writing), if writing.is_some() => {
                writing = None;
                idle_writer = Some(writer);
                if let Err(e) = result {
                    post(&events, ReactorEvent::Event { token, kind: EventKind::Error, error: Some(e) });
                    break;
                }
                idle.as_mut().reset(idle_deadline(settings.idle_timeout));
                post(&events, ReactorEvent::Writable { token });
            },
            read = reader.read_buf(&mut buffer), if read_armed => match read {
                Ok(0) => {
                    post(&events, ReactorEvent::Event { token, kind: EventKind::EndOfFile, error: None });
                    break;
                }
                Ok(n) => {
                    trace!("Read {} bytes on {}", n, token);
                    read_armed = false;
                    idle.as_mut().reset(idle_deadline(settings.idle_timeout));
                    post(&events, ReactorEvent::Readable { token, data: buffer.split().freeze() });
                }
                Err(e) => {
                    post(&events, ReactorEvent::Event { token, kind: EventKind::Error, error: Some(e) });
                    break;
                }
            },
            () = &mut idle, if idle_armed && settings.idle_timeout.is_some() => {
                post(&events, ReactorEvent::Event { token, kind: EventKind::Timeout, error: None });
                break;
            }
        }
    }
}

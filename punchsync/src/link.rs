//! Device link
//!
//! Owns the connection to one terminal. A connected link runs as its own
//! task: it reads inbound bytes, reassembles and decodes punch records and
//! forwards them, in arrival order, to the coordinator's ingestion queue.
//! Commands from the coordinator arrive over the link's command channel.
//!
//! When the connection fails or closes the link deregisters itself and
//! marks the device disconnected. It never reconnects on its own; the next
//! coordinator sweep does.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use punchsync_core::constants::READ_BUFFER_SIZE;
use punchsync_core::{Command, ConnectionState, LineBuffer, LinkState};
use punchsync_transport::{BoxReader, BoxWriter, Connection, Connector};
use punchsync_types::{DeviceDescriptor, PunchEvent};

use crate::error::{Error, Result};
use crate::registry::{LinkCommand, LinkHandle, LinkRegistry};
use crate::stats::IngestStats;

/// Pending commands per link
const COMMAND_QUEUE: usize = 8;

/// Everything a link shares with the rest of the fleet
#[derive(Clone)]
pub(crate) struct LinkContext {
    pub registry: LinkRegistry,
    pub punches: mpsc::Sender<PunchEvent>,
    pub stats: Arc<IngestStats>,
    pub shutdown: watch::Receiver<bool>,
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
}

/// Link to one device
pub struct DeviceLink {
    descriptor: DeviceDescriptor,
    state: LinkState,
    connector: Arc<dyn Connector>,
}

impl DeviceLink {
    pub fn new(descriptor: DeviceDescriptor, connector: Arc<dyn Connector>) -> Self {
        Self {
            descriptor,
            state: LinkState::new(),
            connector,
        }
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Open the connection and start the link task
    ///
    /// On success the device is Connected and registered. On failure it is
    /// left Disconnected; no retry is scheduled.
    pub(crate) async fn connect(&self, ctx: &LinkContext) -> Result<JoinHandle<()>> {
        let device_id = &self.descriptor.id;

        if !self.state.begin_connect() {
            return Err(Error::LinkBusy(device_id.clone()));
        }

        debug!("Connecting to {}...", self.descriptor);

        let attempt = timeout(
            ctx.connect_timeout,
            self.connector.connect(&self.descriptor.address, self.descriptor.port),
        )
        .await
        .map_err(|_| punchsync_transport::Error::ConnectionTimeout)
        .and_then(|result| result);

        let connection = match attempt {
            Ok(connection) => connection,
            Err(e) => {
                self.state.mark_disconnected();
                return Err(e.into());
            }
        };

        if let Err(e) = self.state.mark_connected() {
            self.state.mark_disconnected();
            return Err(e.into());
        }

        let Connection { reader, writer, peer } = connection;
        let epoch = ctx.registry.next_epoch();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE);

        ctx.registry
            .insert(LinkHandle::new(device_id.clone(), epoch, peer.clone(), command_tx));

        info!("Device {} connected ({}, epoch {})", device_id, peer, epoch);

        let task = LinkTask {
            device_id: device_id.clone(),
            epoch,
            reader,
            writer,
            commands: command_rx,
            state: self.state.clone(),
            ctx: ctx.clone(),
        };

        Ok(tokio::spawn(task.run()))
    }

    /// Write `SYNC` to the device
    ///
    /// Returns `false` when the device is not connected or the write failed;
    /// a failed write also closes the link.
    pub async fn send_sync(&self, registry: &LinkRegistry) -> bool {
        if !self.state.is_connected() {
            return false;
        }

        match registry.get(&self.descriptor.id) {
            Some(handle) => handle.request_sync().await,
            None => false,
        }
    }
}

/// Why a link task ended
#[derive(Debug)]
enum CloseReason {
    Shutdown,
    Released,
    ClosedByPeer,
    ReadFailed(std::io::Error),
    WriteFailed,
    IngestClosed,
}

struct LinkTask {
    device_id: String,
    epoch: u64,
    reader: BoxReader,
    writer: BoxWriter,
    commands: mpsc::Receiver<LinkCommand>,
    state: LinkState,
    ctx: LinkContext,
}

impl LinkTask {
    async fn run(self) {
        let LinkTask {
            device_id,
            epoch,
            mut reader,
            mut writer,
            mut commands,
            state,
            ctx,
        } = self;

        let mut shutdown = ctx.shutdown.clone();
        let mut lines = LineBuffer::new(device_id.clone());
        let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
        // Decoded punches waiting for room in the ingestion queue
        let mut backlog: VecDeque<PunchEvent> = VecDeque::new();

        // Reading pauses while the backlog drains; commands never wait on it
        let reason = loop {
            if *shutdown.borrow() {
                break CloseReason::Shutdown;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break CloseReason::Shutdown;
                    }
                }
                command = commands.recv() => match command {
                    Some(LinkCommand::Send(command, reply)) => {
                        let result = write_command(&mut writer, command, ctx.write_timeout).await;
                        let sent = match result {
                            Ok(()) => {
                                debug!("Sent {} to {}", command, device_id);
                                true
                            }
                            Err(e) => {
                                warn!("Failed to send {} to {}: {}", command, device_id, e);
                                false
                            }
                        };
                        let _ = reply.send(sent);
                        if !sent {
                            break CloseReason::WriteFailed;
                        }
                    }
                    // Every handle dropped: deregistered or replaced
                    None => break CloseReason::Released,
                },
                permit = ctx.punches.reserve(), if !backlog.is_empty() => match permit {
                    Ok(permit) => {
                        if let Some(event) = backlog.pop_front() {
                            permit.send(event);
                        }
                    }
                    Err(_) => break CloseReason::IngestClosed,
                },
                read = reader.read_buf(&mut buf), if backlog.is_empty() => match read {
                    Ok(0) => break CloseReason::ClosedByPeer,
                    Ok(n) => {
                        trace!("Received {} bytes from {}", n, device_id);
                        backlog.extend(lines.push(&buf));
                        buf.clear();
                        ctx.stats.record_malformed(lines.take_skipped());
                    }
                    Err(e) => break CloseReason::ReadFailed(e),
                },
            }
        };

        // Only a clean close from the device guarantees the last record is
        // whole; otherwise it may have been cut off in transit
        if matches!(reason, CloseReason::ClosedByPeer) {
            backlog.extend(lines.finish());
        } else {
            lines.abandon();
        }
        ctx.stats.record_malformed(lines.take_skipped());

        if !matches!(reason, CloseReason::IngestClosed) && !forward(&ctx.punches, backlog).await {
            warn!("Ingestion closed; dropped pending punches from {}", device_id);
        }

        ctx.registry.remove(&device_id, epoch);
        state.mark_disconnected();

        if let Ok(Err(e)) = timeout(ctx.write_timeout, writer.shutdown()).await {
            debug!("Shutdown of {} socket failed: {}", device_id, e);
        }

        match reason {
            CloseReason::Shutdown | CloseReason::Released => {
                info!("Device {} disconnected", device_id)
            }
            CloseReason::ClosedByPeer => warn!("Device {} closed the connection", device_id),
            CloseReason::ReadFailed(e) => warn!("Device {} read failed: {}", device_id, e),
            CloseReason::WriteFailed => warn!("Device {} dropped after failed write", device_id),
            CloseReason::IngestClosed => warn!("Device {} dropped: ingestion stopped", device_id),
        }
    }
}

async fn forward(
    punches: &mpsc::Sender<PunchEvent>,
    events: impl IntoIterator<Item = PunchEvent>,
) -> bool {
    for event in events {
        if punches.send(event).await.is_err() {
            return false;
        }
    }
    true
}

async fn write_command(
    writer: &mut BoxWriter,
    command: Command,
    write_timeout: Duration,
) -> punchsync_transport::Result<()> {
    let write = async {
        writer.write_all(command.as_bytes()).await?;
        writer.flush().await
    };

    timeout(write_timeout, write)
        .await
        .map_err(|_| punchsync_transport::Error::WriteTimeout)??;

    Ok(())
}

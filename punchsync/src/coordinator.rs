//! Sync coordinator
//!
//! Owns the fleet of device links and the single ingestion point every
//! decoded punch flows through.
//!
//! ```text
//!  device ──▶ link task ──┐
//!  device ──▶ link task ──┼──▶ ingestion queue ──▶ ingest task ──▶ Reconciler ──▶ store
//!  device ──▶ link task ──┘        (mpsc)
//!
//!  sweep task (every sweep_interval):
//!      connected    ──▶ SYNC
//!      disconnected ──▶ reconnect
//! ```
//!
//! Per-device state runs `Disconnected -> Connecting -> Connected ->
//! Disconnected`; a dropped device is only dialed again by the next sweep.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use punchsync_core::ConnectionState;
use punchsync_transport::{Connector, TcpConnector};
use punchsync_types::{DeviceDescriptor, PunchEvent};

use crate::config::CoordinatorOptions;
use crate::directory::DeviceDirectory;
use crate::error::{Error, Result};
use crate::link::{DeviceLink, LinkContext};
use crate::reconciler::Reconciler;
use crate::registry::LinkRegistry;
use crate::stats::{IngestSnapshot, IngestStats};

/// Connected part of the fleet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetStatus {
    pub connected_count: usize,
    /// Sorted ids of connected devices
    pub device_ids: Vec<String>,
    pub stats: IngestSnapshot,
}

/// Coordinates device links, sweeps and reconciliation
pub struct SyncCoordinator {
    options: CoordinatorOptions,
    devices: Arc<dyn DeviceDirectory>,
    reconciler: Arc<Reconciler>,
    connector: Arc<dyn Connector>,
    registry: LinkRegistry,
    stats: Arc<IngestStats>,
    fleet: RwLock<Option<Arc<Fleet>>>,
    lifecycle: tokio::sync::Mutex<Option<Running>>,
}

struct Running {
    fleet: Arc<Fleet>,
    shutdown: watch::Sender<bool>,
    finish_ingest: oneshot::Sender<()>,
    sweep: JoinHandle<()>,
    ingest: JoinHandle<()>,
}

impl SyncCoordinator {
    /// Create a coordinator dialing devices over TCP with default options
    pub fn new(devices: Arc<dyn DeviceDirectory>, reconciler: Arc<Reconciler>) -> Self {
        let options = CoordinatorOptions::default();
        Self {
            connector: Arc::new(TcpConnector::new().with_connect_timeout(options.connect_timeout)),
            options,
            devices,
            reconciler,
            registry: LinkRegistry::new(),
            stats: Arc::new(IngestStats::new()),
            fleet: RwLock::new(None),
            lifecycle: tokio::sync::Mutex::new(None),
        }
    }

    /// Set timing options (the TCP connector picks up the connect timeout)
    pub fn with_options(mut self, options: CoordinatorOptions) -> Self {
        self.connector =
            Arc::new(TcpConnector::new().with_connect_timeout(options.connect_timeout));
        self.options = options;
        self
    }

    /// Dial devices through a custom connector
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn registry(&self) -> &LinkRegistry {
        &self.registry
    }

    /// Load devices, connect to each of them and start sweeping
    ///
    /// Connection failures are logged per device and left to the sweep.
    pub async fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.is_some() {
            return Err(Error::AlreadyRunning);
        }

        let descriptors = usable_devices(self.devices.list_devices().await?);

        let (punch_tx, punch_rx) = mpsc::channel(self.options.ingest_queue_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (finish_tx, finish_rx) = oneshot::channel();

        let ingest = tokio::spawn(ingest(
            punch_rx,
            self.reconciler.clone(),
            self.stats.clone(),
            finish_rx,
        ));

        let ctx = LinkContext {
            registry: self.registry.clone(),
            punches: punch_tx,
            stats: self.stats.clone(),
            shutdown: shutdown_rx,
            connect_timeout: self.options.connect_timeout,
            write_timeout: self.options.write_timeout,
        };
        let links = descriptors
            .into_iter()
            .map(|descriptor| Arc::new(DeviceLink::new(descriptor, self.connector.clone())))
            .collect();
        let fleet = Arc::new(Fleet {
            links,
            ctx,
            tasks: Mutex::new(Vec::new()),
        });
        *self.fleet.write() = Some(fleet.clone());

        info!("Starting sync for {} devices", fleet.links.len());
        fleet.connect_all().await;
        info!(
            "{} of {} devices connected",
            self.registry.len(),
            fleet.links.len()
        );

        let sweep = tokio::spawn(run_sweeps(
            fleet.clone(),
            self.options.sweep_interval,
            shutdown_tx.subscribe(),
        ));

        *lifecycle = Some(Running {
            fleet,
            shutdown: shutdown_tx,
            finish_ingest: finish_tx,
            sweep,
            ingest,
        });

        Ok(())
    }

    /// Stop sweeping, close every link and drain decoded punches
    ///
    /// Safe to call when not running.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        let Some(running) = lifecycle.take() else {
            return;
        };

        info!("Stopping sync coordinator...");

        let _ = running.shutdown.send(true);

        if let Err(e) = running.sweep.await {
            warn!("Sweep task ended abnormally: {}", e);
        }

        for task in running.fleet.take_tasks() {
            if let Err(e) = task.await {
                warn!("Link task ended abnormally: {}", e);
            }
        }

        // Links are gone; let ingestion apply what they already queued
        let _ = running.finish_ingest.send(());
        if let Err(e) = running.ingest.await {
            error!("Ingest task ended abnormally: {}", e);
        }

        self.registry.clear();
        *self.fleet.write() = None;

        let stats = self.stats.snapshot();
        info!(
            "Sync coordinator stopped ({} punches applied, {} discarded, {} failed)",
            stats.applied,
            stats.duplicate_punch_in + stats.missing_punch_in + stats.unknown_employee,
            stats.failed
        );
    }

    /// Send SYNC to one device
    ///
    /// Returns whether the command reached the socket; `false` when the
    /// device is not connected.
    pub async fn manual_sync(&self, device_id: &str) -> bool {
        let Some(handle) = self.registry.get(device_id) else {
            debug!("Manual sync skipped: {} is not connected", device_id);
            return false;
        };

        let sent = handle.request_sync().await;
        if sent {
            info!("Manual sync sent to {}", device_id);
        } else {
            warn!("Manual sync to {} failed", device_id);
        }
        sent
    }

    /// Connected devices and ingestion counters
    pub fn status(&self) -> FleetStatus {
        let device_ids = self.registry.device_ids();
        FleetStatus {
            connected_count: device_ids.len(),
            device_ids,
            stats: self.stats.snapshot(),
        }
    }

    /// Every configured device with its connection state
    pub fn device_states(&self) -> Vec<(String, ConnectionState)> {
        self.fleet
            .read()
            .as_ref()
            .map(|fleet| {
                fleet
                    .links
                    .iter()
                    .map(|link| (link.descriptor().id.clone(), link.state()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Connection state of one configured device
    pub fn device_state(&self, device_id: &str) -> Result<ConnectionState> {
        self.fleet
            .read()
            .as_ref()
            .and_then(|fleet| fleet.link(device_id).map(|link| link.state()))
            .ok_or_else(|| Error::UnknownDevice(device_id.to_string()))
    }

    pub fn is_running(&self) -> bool {
        self.fleet.read().is_some()
    }
}

/// Drop invalid and duplicate descriptors, keeping the first of each id
fn usable_devices(descriptors: Vec<DeviceDescriptor>) -> Vec<DeviceDescriptor> {
    let mut usable: Vec<DeviceDescriptor> = Vec::with_capacity(descriptors.len());

    for descriptor in descriptors {
        if let Err(e) = descriptor.validate() {
            warn!("Skipping {}: {}", descriptor, e);
        } else if usable.iter().any(|d| d.id == descriptor.id) {
            warn!("Skipping {}: duplicate device id", descriptor);
        } else {
            usable.push(descriptor);
        }
    }

    usable
}

/// Links of one running session
struct Fleet {
    links: Vec<Arc<DeviceLink>>,
    ctx: LinkContext,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Fleet {
    fn link(&self, device_id: &str) -> Option<&Arc<DeviceLink>> {
        self.links.iter().find(|link| link.descriptor().id == device_id)
    }

    async fn connect(&self, link: &DeviceLink) {
        match link.connect(&self.ctx).await {
            Ok(task) => self.track(task),
            Err(e) if e.is_transport() => warn!("Failed to connect {}: {}", link.descriptor(), e),
            Err(e) => debug!("Skipped connecting {}: {}", link.descriptor(), e),
        }
    }

    async fn connect_all(self: &Arc<Self>) {
        let mut attempts = JoinSet::new();
        for link in &self.links {
            let fleet = self.clone();
            let link = link.clone();
            attempts.spawn(async move { fleet.connect(&link).await });
        }
        while attempts.join_next().await.is_some() {}
    }

    /// Queue one pass over the fleet on `work`
    fn sweep(self: &Arc<Self>, work: &mut JoinSet<()>) {
        for link in &self.links {
            let fleet = self.clone();
            let link = link.clone();

            match link.state() {
                ConnectionState::Connected => {
                    work.spawn(async move {
                        if !link.send_sync(&fleet.ctx.registry).await {
                            warn!("Sweep could not sync {}", link.descriptor().id);
                        }
                    });
                }
                ConnectionState::Disconnected => {
                    work.spawn(async move { fleet.connect(&link).await });
                }
                ConnectionState::Connecting => {}
            }
        }
    }

    fn track(&self, task: JoinHandle<()>) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(task);
    }

    fn take_tasks(&self) -> Vec<JoinHandle<()>> {
        std::mem::take(&mut *self.tasks.lock())
    }
}

async fn run_sweeps(
    fleet: Arc<Fleet>,
    period: std::time::Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut work = JoinSet::new();

    'sweeps: loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }

        fleet.sweep(&mut work);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break 'sweeps,
                next = work.join_next() => {
                    if next.is_none() {
                        break;
                    }
                }
            }
        }

        debug!("Sweep done: {} of {} connected", fleet.ctx.registry.len(), fleet.links.len());
    }

    // Unfinished attempts are aborted; wait until none can still register
    work.shutdown().await;
    debug!("Sweep loop stopped");
}

async fn ingest(
    mut punches: mpsc::Receiver<PunchEvent>,
    reconciler: Arc<Reconciler>,
    stats: Arc<IngestStats>,
    mut finish: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            event = punches.recv() => match event {
                Some(event) => apply(&reconciler, &stats, event).await,
                None => break,
            },
            _ = &mut finish => {
                punches.close();
                while let Some(event) = punches.recv().await {
                    apply(&reconciler, &stats, event).await;
                }
                break;
            }
        }
    }

    debug!("Ingestion stopped");
}

async fn apply(reconciler: &Reconciler, stats: &IngestStats, event: PunchEvent) {
    match reconciler.apply_punch(&event).await {
        Ok(outcome) => {
            debug!("{} -> {}", event, outcome);
            stats.record(&outcome);
        }
        Err(e) => {
            error!("Failed to reconcile {}: {}", event, e);
            stats.record_failure();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::directory::{
        InMemoryAttendanceStore, InMemoryEmployeeDirectory, MockDeviceDirectory,
        StaticDeviceDirectory,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use punchsync_transport::Connection;
    use punchsync_types::Employee;
    use tokio::io::{duplex, split, AsyncReadExt, DuplexStream};
    use tokio::time::sleep;

    /// Connector handing out in-memory pipes
    ///
    /// Refuses the first `refusals` attempts and waits `delay` before every
    /// successful one.
    struct PipeConnector {
        far_ends: mpsc::UnboundedSender<DuplexStream>,
        refusals: usize,
        delay: Duration,
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl Connector for PipeConnector {
        async fn connect(&self, addr: &str, port: u16) -> punchsync_transport::Result<Connection> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.refusals {
                return Err(punchsync_transport::Error::Io(
                    std::io::ErrorKind::ConnectionRefused.into(),
                ));
            }

            sleep(self.delay).await;

            let (near, far) = duplex(1024);
            let _ = self.far_ends.send(far);
            let (reader, writer) = split(near);
            Ok(Connection {
                reader: Box::new(reader),
                writer: Box::new(writer),
                peer: format!("{}:{}", addr, port),
            })
        }
    }

    fn pipe_connector(
        refusals: usize,
        delay: Duration,
    ) -> (Arc<PipeConnector>, mpsc::UnboundedReceiver<DuplexStream>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = PipeConnector {
            far_ends: tx,
            refusals,
            delay,
            attempts: AtomicUsize::new(0),
        };
        (Arc::new(connector), rx)
    }

    fn sweeping_options() -> CoordinatorOptions {
        CoordinatorOptions {
            sweep_interval: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(120),
            write_timeout: Duration::from_secs(5),
            ingest_queue_capacity: 16,
        }
    }

    fn one_device() -> Arc<StaticDeviceDirectory> {
        Arc::new(StaticDeviceDirectory::new(vec![DeviceDescriptor::new("D1", "10.0.0.21", 4370)]))
    }

    fn reconciler() -> Arc<Reconciler> {
        let employees: InMemoryEmployeeDirectory =
            [("U7", Employee::new("emp-42"))].into_iter().collect();
        Arc::new(Reconciler::new(
            Arc::new(employees),
            Arc::new(InMemoryAttendanceStore::new()),
        ))
    }

    fn fast_options() -> CoordinatorOptions {
        CoordinatorOptions {
            sweep_interval: Duration::from_secs(3600),
            connect_timeout: Duration::from_millis(200),
            write_timeout: Duration::from_millis(200),
            ingest_queue_capacity: 16,
        }
    }

    #[test]
    fn test_usable_devices() {
        let devices = usable_devices(vec![
            DeviceDescriptor::new("D1", "10.0.0.21", 4370),
            DeviceDescriptor::new("D1", "10.0.0.99", 4370),
            DeviceDescriptor::new("D2", "10.0.0.22", 0),
            DeviceDescriptor::new("D3", "10.0.0.23", 4370),
        ]);

        let ids: Vec<_> = devices.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["D1", "D3"]);
        assert_eq!(devices[0].address, "10.0.0.21");
    }

    #[tokio::test]
    async fn test_stop_when_not_running() {
        let coordinator = SyncCoordinator::new(
            Arc::new(StaticDeviceDirectory::default()),
            reconciler(),
        );

        coordinator.stop().await;
        coordinator.stop().await;
        assert!(!coordinator.is_running());
        assert_eq!(coordinator.status().connected_count, 0);
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let coordinator = SyncCoordinator::new(
            Arc::new(StaticDeviceDirectory::default()),
            reconciler(),
        )
        .with_options(fast_options());

        coordinator.start().await.unwrap();
        assert!(matches!(coordinator.start().await, Err(Error::AlreadyRunning)));

        coordinator.stop().await;
        assert!(!coordinator.is_running());
    }

    #[tokio::test]
    async fn test_directory_failure_aborts_start() {
        let mut devices = MockDeviceDirectory::new();
        devices
            .expect_list_devices()
            .times(1)
            .returning(|| Err(Error::Directory("unreachable".into())));

        let coordinator = SyncCoordinator::new(Arc::new(devices), reconciler());

        assert!(matches!(coordinator.start().await, Err(Error::Directory(_))));
        assert!(!coordinator.is_running());
    }

    #[tokio::test]
    async fn test_unreachable_device_stays_disconnected() {
        // Reserve a port, then free it so nothing listens there
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let devices =
            StaticDeviceDirectory::new(vec![DeviceDescriptor::new("D1", "127.0.0.1", port)]);
        let coordinator = SyncCoordinator::new(Arc::new(devices), reconciler())
            .with_options(fast_options());

        coordinator.start().await.unwrap();

        assert_eq!(coordinator.device_state("D1").unwrap(), ConnectionState::Disconnected);
        assert!(!coordinator.manual_sync("D1").await);
        assert!(!coordinator.manual_sync("nope").await);
        assert!(matches!(coordinator.device_state("nope"), Err(Error::UnknownDevice(_))));
        assert_eq!(coordinator.status().connected_count, 0);

        coordinator.stop().await;
        assert!(coordinator.device_states().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_reconnects_then_syncs() {
        let (connector, mut far_ends) = pipe_connector(1, Duration::ZERO);
        let coordinator = SyncCoordinator::new(one_device(), reconciler())
            .with_options(sweeping_options())
            .with_connector(connector.clone());

        coordinator.start().await.unwrap();
        assert_eq!(coordinator.device_state("D1").unwrap(), ConnectionState::Disconnected);

        // First sweep dials again
        let mut device = far_ends.recv().await.unwrap();
        while coordinator.status().connected_count == 0 {
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(coordinator.device_state("D1").unwrap(), ConnectionState::Connected);

        // Next sweep finds it connected and syncs
        let mut received = [0u8; 5];
        device.read_exact(&mut received).await.unwrap();
        assert_eq!(&received, b"SYNC\n");
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 2);

        coordinator.stop().await;
        assert_eq!(coordinator.status().connected_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_sweep_connect_leaves_nothing_registered() {
        let (connector, _far_ends) = pipe_connector(1, Duration::from_secs(30));
        let coordinator = SyncCoordinator::new(one_device(), reconciler())
            .with_options(sweeping_options())
            .with_connector(connector.clone());

        coordinator.start().await.unwrap();

        // First sweep at 60s starts a connect that would finish at 90s
        sleep(Duration::from_secs(61)).await;
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(coordinator.device_state("D1").unwrap(), ConnectionState::Connecting);

        coordinator.stop().await;
        assert!(coordinator.registry().is_empty());

        sleep(Duration::from_secs(60)).await;
        assert!(coordinator.registry().is_empty());
        assert_eq!(coordinator.status().connected_count, 0);
    }
}

//! [`MotionKernel`] – the single owner of devices, controllers and taught
//! positions.
//!
//! Every single-device operation in the system goes through here.  The
//! kernel resolves device ids to live controllers and position names to
//! coordinates, delegates to the controller, and flattens any
//! [`MotionError`] into a logged `false` / `None`.
//!
//! # Concurrency
//!
//! Device configuration and the controller registry sit behind separate
//! async `RwLock`s.  Locks are never held across a hardware call: an
//! operation clones the `Arc` handle it needs, drops the guard, then
//! awaits the controller.  That is what lets [`MotionKernel::stop`] reach a
//! device while a move on the same device is still polling.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use motionsvc_hal::{ControllerFactory, ControllerRegistry, DEFAULT_IDLE_TIMEOUT, DeviceController};
use motionsvc_types::{DeviceClass, DeviceConfig, MotionError, Position, PositionTable};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::config_loader;
use crate::position_match::match_position;
use crate::position_store::PositionStore;

/// Match tolerance used by [`MotionKernel::current_position_name`].
pub const KERNEL_MATCH_TOLERANCE: f64 = 0.1;

/// Name of the taught position [`MotionKernel::home`] prefers.
const HOME_POSITION: &str = "Home";

pub struct MotionKernel {
    devices: RwLock<Vec<DeviceConfig>>,
    registry: RwLock<ControllerRegistry>,
    factory: Arc<dyn ControllerFactory>,
    store: Arc<dyn PositionStore>,
}

impl MotionKernel {
    /// Create a kernel over `devices`.
    ///
    /// Duplicate device ids keep the first entry.  Positions already held by
    /// `store` replace the configured positions of the devices they name.
    /// No hardware is touched until [`initialize_all`](Self::initialize_all).
    pub fn new(
        devices: Vec<DeviceConfig>,
        factory: Arc<dyn ControllerFactory>,
        store: Arc<dyn PositionStore>,
    ) -> Self {
        let mut seen = HashSet::new();
        let mut devices: Vec<DeviceConfig> = devices
            .into_iter()
            .filter(|d| {
                let fresh = seen.insert(d.id.clone());
                if !fresh {
                    warn!(device = %d.id, "duplicate device id ignored");
                }
                fresh
            })
            .collect();

        match store.load() {
            Ok(Some(table)) => {
                apply_table(&mut devices, &table);
                info!(devices = table.len(), "persisted positions applied");
            }
            Ok(None) => debug!("no persisted positions; using configured positions"),
            Err(e) => warn!(error = %e, "persisted positions unreadable; using configured positions"),
        }

        Self {
            devices: RwLock::new(devices),
            registry: RwLock::new(ControllerRegistry::new()),
            factory,
            store,
        }
    }

    /// Create a kernel from a JSON device file.  A missing or malformed file
    /// yields a kernel with no devices.
    pub fn from_config_file(
        path: &Path,
        factory: Arc<dyn ControllerFactory>,
        store: Arc<dyn PositionStore>,
    ) -> Self {
        Self::new(config_loader::load_devices(path), factory, store)
    }

    // ── Lifecycle ────────────────────────────────────────────────────────

    /// Build and connect a controller for every enabled device that is not
    /// already connected.  Devices that fail to connect are logged and
    /// left unregistered.  Returns the number of connected devices.
    pub async fn initialize_all(&self) -> usize {
        let devices = self.devices.read().await.clone();
        for device in devices.iter().filter(|d| d.enabled) {
            if self.is_connected(&device.id).await {
                continue;
            }
            let Some(controller) = self.factory.create(device) else {
                warn!(device = %device.id, class = %device.device_class, "no controller for device; skipping");
                continue;
            };
            match controller.initialize().await {
                Ok(()) if controller.is_connected() => {
                    info!(device = %device.id, name = %device.name, "device connected");
                    let previous = self.registry.write().await.register(controller);
                    if let Some(previous) = previous {
                        previous.dispose().await;
                    }
                }
                Ok(()) => {
                    warn!(device = %device.id, "controller initialised but not connected; skipping");
                    controller.dispose().await;
                }
                Err(e) => {
                    warn!(device = %device.id, error = %e, "device failed to connect; skipping");
                    controller.dispose().await;
                }
            }
        }
        let connected = self.registry.read().await.len();
        info!(connected, configured = devices.len(), "initialisation complete");
        connected
    }

    /// Wait until every connected device reports idle, giving up after
    /// [`DEFAULT_IDLE_TIMEOUT`].
    pub async fn wait_for_all_idle(&self) -> bool {
        self.wait_for_all_idle_within(DEFAULT_IDLE_TIMEOUT).await
    }

    /// Wait until every connected device reports idle.  `timeout` bounds the
    /// whole wait, not each device.
    pub async fn wait_for_all_idle_within(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let controllers = self.registry.read().await.controllers();
        let mut all_idle = true;
        for controller in controllers {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let result = controller.wait_for_idle(remaining).await;
            all_idle &= report("wait_for_idle", controller.device_id(), result).is_some();
        }
        all_idle
    }

    /// Disconnect and unregister every controller.
    pub async fn shutdown(&self) {
        let controllers = self.registry.write().await.drain();
        for controller in &controllers {
            controller.dispose().await;
        }
        info!(disposed = controllers.len(), "motion kernel shut down");
    }

    // ── Queries ──────────────────────────────────────────────────────────

    /// Snapshot of every configured device, connected or not.
    pub async fn devices(&self) -> Vec<DeviceConfig> {
        self.devices.read().await.clone()
    }

    pub async fn device(&self, device_id: &str) -> Option<DeviceConfig> {
        self.devices
            .read()
            .await
            .iter()
            .find(|d| d.id == device_id)
            .cloned()
    }

    pub async fn is_connected(&self, device_id: &str) -> bool {
        self.registry
            .read()
            .await
            .get(device_id)
            .is_some_and(|c| c.is_connected())
    }

    /// Ids of registered, connected devices, sorted.
    pub async fn connected_device_ids(&self) -> Vec<String> {
        self.registry.read().await.device_ids()
    }

    /// Coordinates of a taught position.
    pub async fn position(&self, device_id: &str, name: &str) -> Option<Position> {
        self.device(device_id).await?.position(name)
    }

    // ── Motion ───────────────────────────────────────────────────────────

    /// Move a device to one of its taught positions and wait for it to
    /// settle.
    #[instrument(skip(self))]
    pub async fn move_to_named_position(&self, device_id: &str, position_name: &str) -> bool {
        let result = async {
            let controller = self.controller(device_id).await?;
            let target = self.taught_position(device_id, position_name).await?;
            controller.move_to_position(target).await
        }
        .await;
        report("move_to_named_position", device_id, result).is_some()
    }

    /// Absolute move to explicit coordinates.
    pub async fn move_to_position(&self, device_id: &str, target: Position) -> bool {
        let result = async {
            let controller = self.controller(device_id).await?;
            controller.move_to_position(target).await
        }
        .await;
        report("move_to_position", device_id, result).is_some()
    }

    /// Incremental move; `delta` holds up to six components in
    /// `X Y Z U V W` order.
    pub async fn move_relative(&self, device_id: &str, delta: &[f64]) -> bool {
        let result = async {
            let controller = self.controller(device_id).await?;
            controller.move_relative(delta).await
        }
        .await;
        report("move_relative", device_id, result).is_some()
    }

    pub async fn stop(&self, device_id: &str) -> bool {
        let result = async {
            let controller = self.controller(device_id).await?;
            controller.stop().await
        }
        .await;
        report("stop", device_id, result).is_some()
    }

    /// Halt every connected device.  Every device is attempted even if an
    /// earlier one fails; returns `true` only if all stops succeeded.
    pub async fn stop_all(&self) -> bool {
        let controllers = self.registry.read().await.controllers();
        let mut all_stopped = true;
        for controller in controllers {
            let result = controller.stop().await;
            all_stopped &= report("stop_all", controller.device_id(), result).is_some();
        }
        warn!(all_stopped, "stop-all issued");
        all_stopped
    }

    /// Move to the taught "Home" position, or the class default when none
    /// is taught.
    #[instrument(skip(self))]
    pub async fn home(&self, device_id: &str) -> bool {
        let result = async {
            let controller = self.controller(device_id).await?;
            let taught = self.position(device_id, HOME_POSITION).await;
            controller.home(taught).await
        }
        .await;
        report("home", device_id, result).is_some()
    }

    pub async fn current_position(&self, device_id: &str) -> Option<Position> {
        let result = async {
            let controller = self.controller(device_id).await?;
            controller.current_position().await
        }
        .await;
        report("current_position", device_id, result)
    }

    pub async fn speed(&self, device_id: &str) -> Option<f64> {
        let result = async {
            let controller = self.controller(device_id).await?;
            controller.speed().await
        }
        .await;
        report("speed", device_id, result)
    }

    pub async fn set_speed(&self, device_id: &str, speed: f64) -> bool {
        let result = async {
            let controller = self.controller(device_id).await?;
            controller.set_speed(speed).await
        }
        .await;
        report("set_speed", device_id, result).is_some()
    }

    // ── Named positions ──────────────────────────────────────────────────

    /// Record `position` under `name` for a device, replacing any existing
    /// entry.  Rotary axes are dropped for gantries.
    pub async fn teach_position(&self, device_id: &str, name: &str, position: Position) -> bool {
        let result = self.store_position(device_id, name, position).await;
        report("teach_position", device_id, result).is_some()
    }

    /// Record the device's live position under `name`.
    pub async fn teach_current_position(&self, device_id: &str, name: &str) -> bool {
        let result = async {
            let controller = self.controller(device_id).await?;
            let live = controller.current_position().await?;
            self.store_position(device_id, name, live).await
        }
        .await;
        report("teach_current_position", device_id, result).is_some()
    }

    /// Forget a taught position.
    pub async fn remove_position(&self, device_id: &str, name: &str) -> bool {
        let result = async {
            let mut devices = self.devices.write().await;
            let device = devices
                .iter_mut()
                .find(|d| d.id == device_id)
                .ok_or_else(|| MotionError::DeviceNotFound(device_id.to_string()))?;
            device
                .positions
                .remove(name)
                .map(|_| ())
                .ok_or_else(|| MotionError::PositionNotFound {
                    device: device_id.to_string(),
                    position: name.to_string(),
                })
        }
        .await;
        report("remove_position", device_id, result).is_some()
    }

    /// Write every device's taught positions to the store.
    pub async fn save_positions(&self) -> bool {
        let table: PositionTable = self
            .devices
            .read()
            .await
            .iter()
            .map(|d| (d.id.clone(), d.positions.clone()))
            .collect();
        let devices = table.len();
        match self.with_store(move |store| store.save(&table)).await {
            Ok(()) => {
                info!(devices, "positions saved");
                true
            }
            Err(e) => {
                error!(error = %e, "saving positions failed");
                false
            }
        }
    }

    /// Replace in-memory positions with the stored table.  Devices the
    /// table does not mention keep their current positions.
    pub async fn reload_positions(&self) -> bool {
        match self.with_store(|store| store.load()).await {
            Ok(Some(table)) => {
                apply_table(&mut self.devices.write().await, &table);
                info!(devices = table.len(), "positions reloaded");
                true
            }
            Ok(None) => {
                warn!("no saved positions to reload");
                false
            }
            Err(e) => {
                error!(error = %e, "reloading positions failed");
                false
            }
        }
    }

    /// Name of the taught position the device currently sits at, within
    /// [`KERNEL_MATCH_TOLERANCE`].
    pub async fn current_position_name(&self, device_id: &str) -> Option<String> {
        self.current_position_name_within(device_id, KERNEL_MATCH_TOLERANCE)
            .await
    }

    /// Name of the nearest taught position if the device's live position is
    /// within `tolerance` of it.
    pub async fn current_position_name_within(
        &self,
        device_id: &str,
        tolerance: f64,
    ) -> Option<String> {
        let device = self.device(device_id).await;
        let Some(device) = device else {
            warn!(device = %device_id, "unknown device");
            return None;
        };
        let live = self.current_position(device_id).await?;
        let name = match_position(device.device_class, &live, &device.positions, tolerance);
        if name.is_none() {
            debug!(device = %device_id, %live, tolerance, "not at any taught position");
        }
        name
    }

    // ── Internals ────────────────────────────────────────────────────────

    /// Run a store call on the blocking pool; stores do file I/O.
    async fn with_store<R, F>(&self, call: F) -> Result<R, MotionError>
    where
        R: Send + 'static,
        F: FnOnce(&dyn PositionStore) -> Result<R, MotionError> + Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || call(store.as_ref()))
            .await
            .map_err(|e| MotionError::Persistence(format!("position store task failed: {e}")))?
    }

    async fn controller(&self, device_id: &str) -> Result<Arc<dyn DeviceController>, MotionError> {
        if let Some(controller) = self.registry.read().await.get(device_id) {
            return Ok(controller);
        }
        if self.device(device_id).await.is_some() {
            Err(MotionError::NotConnected(device_id.to_string()))
        } else {
            Err(MotionError::DeviceNotFound(device_id.to_string()))
        }
    }

    async fn taught_position(&self, device_id: &str, name: &str) -> Result<Position, MotionError> {
        let device = self
            .device(device_id)
            .await
            .ok_or_else(|| MotionError::DeviceNotFound(device_id.to_string()))?;
        device
            .position(name)
            .ok_or_else(|| MotionError::PositionNotFound {
                device: device_id.to_string(),
                position: name.to_string(),
            })
    }

    async fn store_position(
        &self,
        device_id: &str,
        name: &str,
        position: Position,
    ) -> Result<(), MotionError> {
        if name.trim().is_empty() {
            return Err(MotionError::InvalidArgument("position name is empty".into()));
        }
        if !position.is_finite() {
            return Err(MotionError::InvalidArgument(format!(
                "non-finite coordinates for {name}"
            )));
        }
        let mut devices = self.devices.write().await;
        let device = devices
            .iter_mut()
            .find(|d| d.id == device_id)
            .ok_or_else(|| MotionError::DeviceNotFound(device_id.to_string()))?;
        let position = position.for_class(device.device_class);
        device.positions.insert(name.to_string(), position);
        info!(device = %device_id, name, %position, "position taught");
        Ok(())
    }
}

/// Replace the positions of every device named in `table`.
fn apply_table(devices: &mut [DeviceConfig], table: &PositionTable) {
    for device in devices.iter_mut() {
        if let Some(positions) = table.get(&device.id) {
            let class: DeviceClass = device.device_class;
            device.positions = positions
                .iter()
                .map(|(name, p)| (name.clone(), p.for_class(class)))
                .collect();
        }
    }
    for id in table.keys() {
        if !devices.iter().any(|d| &d.id == id) {
            debug!(device = %id, "stored positions for unconfigured device ignored");
        }
    }
}

/// Log a failed operation at a level matching its cause and discard the
/// error.
fn report<T>(operation: &'static str, device_id: &str, result: Result<T, MotionError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e @ MotionError::Halted(_)) => {
            warn!(operation, device = %device_id, error = %e, "device operation halted");
            None
        }
        Err(e @ (MotionError::HardwareFault { .. } | MotionError::Timeout { .. })) => {
            error!(operation, device = %device_id, error = %e, "device operation failed");
            None
        }
        Err(e) => {
            warn!(operation, device = %device_id, error = %e, "device operation rejected");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position_store::{JsonPositionStore, MemoryPositionStore};
    use motionsvc_hal::SimBackend;

    fn left() -> DeviceConfig {
        DeviceConfig::new("hex-l", "Hexapod Left", DeviceClass::Hexapod)
            .with_endpoint("10.0.0.10", 50000)
            .with_position("Home", Position::ZERO)
            .with_position("LensGrip", Position::new(5.0, 0.0, 1.0, 0.5, 0.0, 0.0))
    }

    fn gantry() -> DeviceConfig {
        DeviceConfig::new("gantry", "Gantry", DeviceClass::Gantry)
            .with_endpoint("10.0.0.20", 701)
            .with_position("Home", Position::linear(10.0, 10.0, 0.0))
            .with_position("Park", Position::linear(50.0, 0.0, 0.0))
    }

    fn kernel_with(
        backend: &SimBackend,
        devices: Vec<DeviceConfig>,
        store: Arc<dyn PositionStore>,
    ) -> MotionKernel {
        let factory = backend.factory().with_poll_interval(Duration::from_millis(1));
        MotionKernel::new(devices, Arc::new(factory), store)
    }

    fn kernel(backend: &SimBackend) -> MotionKernel {
        kernel_with(backend, vec![left(), gantry()], Arc::new(MemoryPositionStore::new()))
    }

    #[tokio::test]
    async fn initialize_registers_only_connected_enabled_devices() {
        let backend = SimBackend::new();
        let disabled = DeviceConfig {
            enabled: false,
            ..DeviceConfig::new("hex-r", "Hexapod Right", DeviceClass::Hexapod)
                .with_endpoint("10.0.0.11", 50000)
        };
        backend.refuse_device(&gantry());
        let k = kernel_with(
            &backend,
            vec![left(), gantry(), disabled],
            Arc::new(MemoryPositionStore::new()),
        );

        assert_eq!(k.initialize_all().await, 1);
        assert!(k.is_connected("hex-l").await);
        assert!(!k.is_connected("gantry").await);
        assert!(!k.is_connected("hex-r").await);
        assert_eq!(k.devices().await.len(), 3);
        assert!(!k.move_to_named_position("gantry", "Park").await);
    }

    #[tokio::test]
    async fn named_move_reaches_taught_coordinates() {
        let backend = SimBackend::new();
        let k = kernel(&backend);
        k.initialize_all().await;

        assert!(k.move_to_named_position("hex-l", "LensGrip").await);
        assert_eq!(
            k.current_position("hex-l").await,
            Some(Position::new(5.0, 0.0, 1.0, 0.5, 0.0, 0.0))
        );
        assert_eq!(k.current_position_name("hex-l").await.as_deref(), Some("LensGrip"));
    }

    #[tokio::test]
    async fn unknown_device_or_position_fails_without_motion() {
        let backend = SimBackend::new();
        let k = kernel(&backend);
        k.initialize_all().await;

        assert!(!k.move_to_named_position("nope", "Home").await);
        assert!(!k.move_to_named_position("hex-l", "Nowhere").await);
        assert!(!k.move_to_named_position("hex-l", "lensgrip").await);
        assert!(!k.move_to_named_position("", "Home").await);
        assert_eq!(backend.moves_issued(&left()), 0);
    }

    #[tokio::test]
    async fn hardware_fault_becomes_false() {
        let backend = SimBackend::new();
        backend.fail_device_moves_to(&gantry(), Position::linear(50.0, 0.0, 0.0));
        let k = kernel(&backend);
        k.initialize_all().await;

        assert!(!k.move_to_named_position("gantry", "Park").await);
        assert!(k.is_connected("gantry").await);
        assert!(k.move_to_named_position("gantry", "Home").await);
    }

    #[tokio::test]
    async fn current_position_name_within_tolerance() {
        let backend = SimBackend::new();
        backend.place_device(&left(), Position::new(5.03, 0.0, 1.0, 0.5, 0.0, 0.0));
        let k = kernel(&backend);
        k.initialize_all().await;

        assert_eq!(
            k.current_position_name_within("hex-l", 0.05).await.as_deref(),
            Some("LensGrip")
        );
        assert_eq!(k.current_position_name_within("hex-l", 0.01).await, None);
    }

    #[tokio::test]
    async fn home_prefers_taught_position() {
        let backend = SimBackend::new();
        let k = kernel(&backend);
        k.initialize_all().await;

        assert!(k.home("gantry").await);
        assert_eq!(k.current_position("gantry").await, Some(Position::linear(10.0, 10.0, 0.0)));

        assert!(k.remove_position("gantry", "Home").await);
        assert!(k.home("gantry").await);
        assert_eq!(k.current_position("gantry").await, Some(Position::ZERO));
    }

    #[tokio::test]
    async fn jog_speed_and_stop() {
        let backend = SimBackend::new();
        let k = kernel(&backend);
        k.initialize_all().await;

        assert!(k.move_relative("hex-l", &[1.0, 2.0, 3.0]).await);
        assert_eq!(k.current_position("hex-l").await, Some(Position::linear(1.0, 2.0, 3.0)));
        assert!(!k.move_relative("hex-l", &[]).await);

        assert!(k.set_speed("gantry", 25.0).await);
        assert_eq!(k.speed("gantry").await, Some(25.0));
        assert!(!k.set_speed("gantry", -1.0).await);

        assert!(k.stop("hex-l").await);
        assert!(k.stop_all().await);
        assert!(!k.stop("nope").await);
        assert!(k.wait_for_all_idle().await);
    }

    #[tokio::test]
    async fn teach_overwrites_and_projects_gantry_axes() {
        let backend = SimBackend::new();
        let k = kernel(&backend);

        assert!(k.teach_position("gantry", "Park", Position::new(1.0, 2.0, 3.0, 4.0, 5.0, 6.0)).await);
        assert_eq!(k.position("gantry", "Park").await, Some(Position::linear(1.0, 2.0, 3.0)));
        assert!(!k.teach_position("gantry", "", Position::ZERO).await);
        assert!(!k.teach_position("gantry", "Bad", Position::linear(f64::NAN, 0.0, 0.0)).await);
        assert!(!k.teach_position("nope", "Park", Position::ZERO).await);
    }

    #[tokio::test]
    async fn teach_current_position_captures_live_coordinates() {
        let backend = SimBackend::new();
        backend.place_device(&left(), Position::new(1.0, 1.0, 1.0, 0.1, 0.2, 0.3));
        let k = kernel(&backend);
        assert!(!k.teach_current_position("hex-l", "Here").await);

        k.initialize_all().await;
        assert!(k.teach_current_position("hex-l", "Here").await);
        assert_eq!(
            k.position("hex-l", "Here").await,
            Some(Position::new(1.0, 1.0, 1.0, 0.1, 0.2, 0.3))
        );
    }

    #[tokio::test]
    async fn save_then_reload_reproduces_taught_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonPositionStore::new(dir.path().join("positions.json")));
        let backend = SimBackend::new();
        let k = kernel_with(&backend, vec![left(), gantry()], store.clone());

        assert!(!k.reload_positions().await);
        assert!(k.teach_position("hex-l", "Probe", Position::new(1.5, -2.0, 0.25, 0.1, 0.0, -0.1)).await);
        assert!(k.save_positions().await);
        let saved = k.devices().await;

        assert!(k.teach_position("hex-l", "Probe", Position::ZERO).await);
        assert!(k.remove_position("gantry", "Park").await);
        assert!(k.reload_positions().await);
        assert_eq!(k.devices().await, saved);

        let restarted = kernel_with(&backend, vec![left(), gantry()], store);
        assert_eq!(restarted.devices().await, saved);
    }

    /// Store whose calls block the calling thread for a while, like a slow
    /// disk.
    struct SlowStore {
        inner: MemoryPositionStore,
        delay: Duration,
    }

    impl PositionStore for SlowStore {
        fn load(&self) -> Result<Option<PositionTable>, MotionError> {
            std::thread::sleep(self.delay);
            self.inner.load()
        }

        fn save(&self, table: &PositionTable) -> Result<(), MotionError> {
            std::thread::sleep(self.delay);
            self.inner.save(table)
        }
    }

    #[tokio::test]
    async fn store_io_does_not_stall_the_runtime() {
        let delay = Duration::from_millis(200);
        let backend = SimBackend::new();
        let slow = Arc::new(SlowStore {
            inner: MemoryPositionStore::new(),
            delay,
        });
        let k = kernel_with(&backend, vec![left(), gantry()], slow);

        // Single-threaded runtime: the ticker only runs on time if the save
        // yields instead of blocking the worker.
        let started = std::time::Instant::now();
        let (saved, ticked) = tokio::join!(k.save_positions(), async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            started.elapsed()
        });
        assert!(saved);
        assert!(ticked < delay, "ticker waited {ticked:?}");

        let started = std::time::Instant::now();
        let (reloaded, ticked) = tokio::join!(k.reload_positions(), async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            started.elapsed()
        });
        assert!(reloaded);
        assert!(ticked < delay, "ticker waited {ticked:?}");
    }

    #[tokio::test]
    async fn duplicate_ids_keep_first_entry() {
        let backend = SimBackend::new();
        let dup = DeviceConfig::new("hex-l", "Other", DeviceClass::Gantry);
        let k = kernel_with(&backend, vec![left(), dup], Arc::new(MemoryPositionStore::new()));
        let devices = k.devices().await;
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].name, "Hexapod Left");
    }

    #[tokio::test]
    async fn shutdown_disconnects_everything() {
        let backend = SimBackend::new();
        let k = kernel(&backend);
        assert_eq!(k.initialize_all().await, 2);
        assert_eq!(k.connected_device_ids().await, vec!["gantry", "hex-l"]);

        k.shutdown().await;
        assert!(k.connected_device_ids().await.is_empty());
        assert_eq!(backend.hexapod.bench().open_sessions(), 0);
        assert!(!k.home("hex-l").await);
    }
}

//! Host state owned by the host thread, and the thread itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use anyhow::Context as _;
use shared::GridSnapshot;
use tracing::info;

use crate::bridge::{self, ExecutionBridge};
use crate::config::HostConfig;
use crate::document::Document;
use crate::measurement::{MeasurementError, MeasurementSession};
use crate::scene::{SceneAccess, SceneError};
use crate::viewport::camera::Viewport;

pub const DEFAULT_DOCUMENT_NAME: &str = "Unnamed";

/// Everything commands operate on. Only ever touched from the host thread.
pub struct HostContext {
    config: HostConfig,
    documents: Vec<Document>,
    active: Option<usize>,
    /// `None` while measurement mode is inactive
    measurement: Option<MeasurementSession>,
}

impl HostContext {
    pub fn new(config: HostConfig) -> Self {
        Self {
            config,
            documents: Vec::new(),
            active: None,
            measurement: None,
        }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    // ── Documents ─────────────────────────────────────────────

    /// Create a document and make it active. Ends any measurement session
    /// first so its markers do not linger in the previous document.
    pub fn new_document(&mut self, name: Option<&str>) -> String {
        self.end_measurement();

        let base = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_DOCUMENT_NAME);
        let mut name = base.to_string();
        let mut i = 1;
        while self.documents.iter().any(|d| d.name() == name) {
            name = format!("{base}{i:03}");
            i += 1;
        }

        let viewport = Viewport::new(self.config.viewport.width, self.config.viewport.height);
        let deflection = self.config.comparison.default_tessellation;
        self.documents.push(Document::new(name.clone(), viewport, deflection));
        self.active = Some(self.documents.len() - 1);
        info!(document = %name, "Created document");
        name
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn active_document(&self) -> Result<&Document, SceneError> {
        self.active
            .and_then(|i| self.documents.get(i))
            .ok_or(SceneError::NoActiveDocument)
    }

    pub fn active_document_mut(&mut self) -> Result<&mut Document, SceneError> {
        self.active
            .and_then(|i| self.documents.get_mut(i))
            .ok_or(SceneError::NoActiveDocument)
    }

    pub fn active_name(&self) -> Option<&str> {
        self.active_document().ok().map(Document::name)
    }

    /// Switch the active document. A running measurement session is ended
    /// when the active document actually changes.
    pub fn set_active_document(&mut self, name: &str) -> Result<(), SceneError> {
        let idx = self.index_of(name)?;
        if self.active != Some(idx) {
            self.end_measurement();
            self.active = Some(idx);
            info!(document = %name, "Activated document");
        }
        Ok(())
    }

    /// Close a document (the active one when `name` is `None`); returns its
    /// name. The most recently created remaining document becomes active.
    pub fn close_document(&mut self, name: Option<&str>) -> Result<String, SceneError> {
        let idx = match name {
            Some(name) => self.index_of(name)?,
            None => self
                .active
                .filter(|i| *i < self.documents.len())
                .ok_or(SceneError::NoActiveDocument)?,
        };

        let was_active = self.active == Some(idx);
        if was_active {
            self.end_measurement();
        }
        let closed = self.documents.remove(idx);
        self.active = match self.active {
            _ if was_active => self.documents.len().checked_sub(1),
            Some(i) if i > idx => Some(i - 1),
            other => other,
        };
        info!(document = %closed.name(), "Closed document");
        Ok(closed.name().to_string())
    }

    fn index_of(&self, name: &str) -> Result<usize, SceneError> {
        self.documents
            .iter()
            .position(|d| d.name() == name)
            .ok_or_else(|| SceneError::DocumentNotFound(name.to_string()))
    }

    /// Active document, creating `Unnamed` when there is none.
    pub fn document_or_create(&mut self) -> &mut Document {
        let idx = match self.active {
            Some(idx) if idx < self.documents.len() => idx,
            _ => {
                self.new_document(None);
                self.documents.len() - 1
            }
        };
        &mut self.documents[idx]
    }

    // ── Measurement ───────────────────────────────────────────

    pub fn measurement(&self) -> Result<&MeasurementSession, MeasurementError> {
        self.measurement.as_ref().ok_or(MeasurementError::NotActive)
    }

    /// Enter measurement mode; a no-op returning the current grid when
    /// already active.
    pub fn start_measurement(&mut self) -> Result<GridSnapshot, MeasurementError> {
        self.active_document()?;
        let grid = &self.config.grid;
        let session = self
            .measurement
            .get_or_insert_with(|| MeasurementSession::new(grid.columns, grid.rows));
        Ok(session.grid().snapshot())
    }

    /// Leave measurement mode, removing its markers. Returns how many
    /// markers were removed; 0 when it was not active.
    pub fn end_measurement(&mut self) -> usize {
        let Some(session) = self.measurement.take() else {
            return 0;
        };
        let removed = match self.active.and_then(|i| self.documents.get_mut(i)) {
            Some(doc) => session.end(doc),
            None => 0,
        };
        info!(markers = removed, "Measurement ended");
        removed
    }

    /// Active session together with the document it draws into
    pub fn measurement_and_scene(
        &mut self,
    ) -> Result<(&mut MeasurementSession, &mut dyn SceneAccess), MeasurementError> {
        let session = self.measurement.as_mut().ok_or(MeasurementError::NotActive)?;
        let doc: &mut dyn SceneAccess = self
            .active
            .and_then(|i| self.documents.get_mut(i))
            .ok_or(SceneError::NoActiveDocument)?;
        Ok((session, doc))
    }

    pub fn measurement_mut(&mut self) -> Result<&mut MeasurementSession, MeasurementError> {
        self.measurement.as_mut().ok_or(MeasurementError::NotActive)
    }
}

/// Host thread running the bridge loop over a [`HostContext`]
pub struct HostThread {
    bridge: ExecutionBridge<HostContext>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

/// Spawn the owning thread and wait until it accepts work.
pub fn spawn_host(config: HostConfig) -> anyhow::Result<HostThread> {
    let (bridge, receiver) = bridge::channel::<HostContext>(&config.bridge);
    let shutdown = Arc::new(AtomicBool::new(false));
    let (ready_tx, ready_rx) = mpsc::channel();

    let flag = Arc::clone(&shutdown);
    let handle = thread::Builder::new()
        .name("cadlink-host".into())
        .spawn(move || {
            let mut ctx = HostContext::new(config);
            receiver.start();
            let _ = ready_tx.send(());
            receiver.run(&mut ctx, &flag);
            info!("Host thread exiting");
        })
        .context("Failed to spawn host thread")?;

    ready_rx
        .recv()
        .context("Host thread exited before becoming ready")?;

    Ok(HostThread {
        bridge,
        shutdown,
        handle: Some(handle),
    })
}

impl HostThread {
    pub fn bridge(&self) -> &ExecutionBridge<HostContext> {
        &self.bridge
    }

    /// Stop the loop and wait for the thread to finish.
    pub fn shutdown(mut self) -> anyhow::Result<()> {
        self.stop()
    }

    fn stop(&mut self) -> anyhow::Result<()> {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| anyhow::anyhow!("Host thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for HostThread {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Primitive;

    #[test]
    fn test_new_document_names() {
        let mut ctx = HostContext::new(HostConfig::default());
        assert_eq!(ctx.new_document(None), "Unnamed");
        assert_eq!(ctx.new_document(Some("Unnamed")), "Unnamed001");
        assert_eq!(ctx.new_document(Some("Part")), "Part");
        assert_eq!(ctx.active_document().unwrap().name(), "Part");
        assert_eq!(ctx.documents().len(), 3);
    }

    #[test]
    fn test_document_or_create() {
        let mut ctx = HostContext::new(HostConfig::default());
        assert!(ctx.active_document().is_err());
        ctx.document_or_create()
            .add_primitive("Ball", Primitive::Sphere { radius: 2.0 })
            .unwrap();
        assert_eq!(ctx.active_document().unwrap().name(), "Unnamed");
    }

    #[test]
    fn test_measurement_requires_document() {
        let mut ctx = HostContext::new(HostConfig::default());
        assert_eq!(
            ctx.start_measurement(),
            Err(MeasurementError::Scene(SceneError::NoActiveDocument))
        );
        ctx.new_document(None);
        let first = ctx.start_measurement().unwrap();
        let again = ctx.start_measurement().unwrap();
        assert_eq!(first, again);
        assert_eq!(ctx.end_measurement(), 0);
        assert_eq!(ctx.end_measurement(), 0);
        assert!(matches!(ctx.measurement(), Err(MeasurementError::NotActive)));
    }

    #[test]
    fn test_switching_document_ends_measurement() {
        let mut ctx = HostContext::new(HostConfig::default());
        ctx.new_document(Some("A"));
        ctx.new_document(Some("B"));
        ctx.start_measurement().unwrap();

        ctx.set_active_document("B").unwrap();
        assert!(ctx.measurement().is_ok());

        ctx.set_active_document("A").unwrap();
        assert_eq!(ctx.active_name(), Some("A"));
        assert!(matches!(ctx.measurement(), Err(MeasurementError::NotActive)));

        assert_eq!(
            ctx.set_active_document("C"),
            Err(SceneError::DocumentNotFound("C".into()))
        );
    }

    #[test]
    fn test_close_document_reselects() {
        let mut ctx = HostContext::new(HostConfig::default());
        ctx.new_document(Some("A"));
        ctx.new_document(Some("B"));
        ctx.new_document(Some("C"));

        ctx.set_active_document("C").unwrap();
        assert_eq!(ctx.close_document(Some("A")).unwrap(), "A");
        assert_eq!(ctx.active_name(), Some("C"));

        assert_eq!(ctx.close_document(None).unwrap(), "C");
        assert_eq!(ctx.active_name(), Some("B"));

        ctx.close_document(None).unwrap();
        assert!(ctx.documents().is_empty());
        assert_eq!(ctx.close_document(None), Err(SceneError::NoActiveDocument));
    }

    #[test]
    fn test_spawn_and_submit() {
        let host = spawn_host(HostConfig::default()).unwrap();
        let name = host
            .bridge()
            .submit(|ctx: &mut HostContext| Ok(serde_json::json!(ctx.new_document(Some("Remote")))))
            .unwrap();
        assert_eq!(name, "Remote");
        host.shutdown().unwrap();
    }
}

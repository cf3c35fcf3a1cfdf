//! Fake terminal surface for protocol-level tests.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use shelldeck_core::protocol::Geometry;
use shelldeck_core::surface::TerminalSurface;
use shelldeck_core::{Error, Result};

#[derive(Default)]
struct Inner {
    mounted: bool,
    mount_count: usize,
    disposed: bool,
    fail_next_mount: bool,
    geometry: Option<Geometry>,
    writes: Vec<Vec<u8>>,
    input_tx: Option<mpsc::UnboundedSender<String>>,
}

/// In-memory terminal surface that records every write and lets tests
/// synthesize keystrokes and script mount failures.
///
/// Clones share state, so a test can hand one clone to the controller and
/// keep another for assertions.
#[derive(Clone, Default)]
pub struct FakeSurface {
    inner: Arc<Mutex<Inner>>,
}

impl FakeSurface {
    /// A fake surface with the default 80x24 geometry.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make the next `mount` call fail, as if no display region were
    /// available.
    pub fn fail_next_mount(&self) {
        self.lock().fail_next_mount = true;
    }

    /// Set the geometry subsequent `fit` calls report.
    pub fn set_geometry(&self, geometry: Geometry) {
        self.lock().geometry = Some(geometry);
    }

    /// Synthesize one unit of user input. Returns false when no subscriber
    /// is active.
    pub fn type_str(&self, unit: &str) -> bool {
        match self.lock().input_tx.as_ref() {
            Some(tx) => tx.send(unit.to_string()).is_ok(),
            None => false,
        }
    }

    /// Every write the surface has received, in order.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.lock().writes.clone()
    }

    /// All written bytes, concatenated.
    pub fn written(&self) -> Vec<u8> {
        self.lock().writes.concat()
    }

    /// All written bytes as a lossy string, for display assertions.
    pub fn written_string(&self) -> String {
        String::from_utf8_lossy(&self.written()).into_owned()
    }

    /// How many times the surface has been mounted.
    pub fn mount_count(&self) -> usize {
        self.lock().mount_count
    }

    /// Whether the surface is currently mounted.
    pub fn is_mounted(&self) -> bool {
        self.lock().mounted
    }

    /// Whether the surface has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.lock().disposed
    }
}

impl TerminalSurface for FakeSurface {
    fn mount(&mut self) -> Result<()> {
        let mut inner = self.lock();
        if inner.fail_next_mount {
            inner.fail_next_mount = false;
            return Err(Error::Mount {
                message: "no display region available".into(),
            });
        }
        inner.mounted = true;
        inner.disposed = false;
        inner.mount_count += 1;
        Ok(())
    }

    fn write(&mut self, data: &[u8]) {
        let mut inner = self.lock();
        // A disposed surface swallows writes, like a torn-down renderer.
        if !inner.disposed {
            inner.writes.push(data.to_vec());
        }
    }

    fn subscribe_input(&mut self) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().input_tx = Some(tx);
        rx
    }

    fn fit(&mut self) -> Geometry {
        self.lock().geometry.unwrap_or_default()
    }

    fn dispose(&mut self) {
        let mut inner = self.lock();
        inner.disposed = true;
        inner.mounted = false;
        inner.input_tx = None;
    }
}

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::error::{Result, SitekeepError};
use crate::transfer::RemoteTransfer;

/// In-memory transfer backend for testing. Thread-safe via Mutex, with
/// knobs to make uploads or removals fail.
pub struct MemoryTransfer {
    files: Mutex<HashMap<String, Vec<u8>>>,
    fail_upload: AtomicBool,
    fail_remove: AtomicBool,
}

impl MemoryTransfer {
    pub fn new() -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
            fail_upload: AtomicBool::new(false),
            fail_remove: AtomicBool::new(false),
        }
    }

    pub fn fail_uploads(&self) {
        self.fail_upload.store(true, Ordering::SeqCst);
    }

    pub fn fail_removes(&self) {
        self.fail_remove.store(true, Ordering::SeqCst);
    }

    pub fn uploaded_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.files.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn contents_of(&self, name: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(name).cloned()
    }
}

impl RemoteTransfer for MemoryTransfer {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn upload(&self, local: &Path, remote_name: &str) -> Result<()> {
        if self.fail_upload.load(Ordering::SeqCst) {
            return Err(SitekeepError::transfer("upload", "injected upload failure"));
        }
        let data = std::fs::read(local)?;
        self.files
            .lock()
            .unwrap()
            .insert(remote_name.to_string(), data);
        Ok(())
    }

    fn remove(&self, remote_name: &str) -> Result<()> {
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(SitekeepError::transfer("remove", "injected remove failure"));
        }
        self.files.lock().unwrap().remove(remote_name);
        Ok(())
    }
}

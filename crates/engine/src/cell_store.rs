//! Cell store facade: per-device/per-cell accessors with completeness
//! tracking.
//!
//! Devices and cells are materialized lazily on first access and memoized
//! for the lifetime of the store: repeated lookups return the same handle
//! identity. The underlying maps are never exposed; all access goes through
//! the `get_or_create` accessors [`CellStore::device`] and
//! [`DeviceHandle::cell`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use cellhub_domain::cell::CellRef;
use cellhub_domain::error::CellHubError;
use cellhub_domain::value::CellValue;

use crate::condition::StrictDepth;
use crate::ports::CellBackend;

/// Facade over the host's cell storage.
pub struct CellStore {
    backend: Arc<dyn CellBackend>,
    strict: Arc<StrictDepth>,
    devices: Mutex<HashMap<String, Arc<DeviceHandle>>>,
}

impl CellStore {
    #[must_use]
    pub fn new(backend: Arc<dyn CellBackend>) -> Self {
        Self {
            backend,
            strict: Arc::new(StrictDepth::default()),
            devices: Mutex::new(HashMap::new()),
        }
    }

    /// The strict-completeness counter shared with the condition wrappers.
    #[must_use]
    pub fn strict(&self) -> Arc<StrictDepth> {
        Arc::clone(&self.strict)
    }

    /// Look up the handle for `name`, creating and caching it on first
    /// access. Repeated calls return the same `Arc`.
    #[must_use]
    pub fn device(&self, name: &str) -> Arc<DeviceHandle> {
        let mut devices = self
            .devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(devices.entry(name.to_string()).or_insert_with(|| {
            Arc::new(DeviceHandle {
                name: name.to_string(),
                backend: Arc::clone(&self.backend),
                strict: Arc::clone(&self.strict),
                cells: Mutex::new(HashMap::new()),
            })
        }))
    }

    /// The handle for one cell.
    #[must_use]
    pub fn cell(&self, cell: &CellRef) -> Arc<CellHandle> {
        self.device(cell.device()).cell_of(cell)
    }

    /// Read a cell by reference.
    ///
    /// # Errors
    ///
    /// Returns [`CellHubError::IncompleteCell`] when strict-completeness
    /// mode is active and the host has not populated the cell yet.
    pub fn read(&self, cell: &CellRef) -> Result<CellValue, CellHubError> {
        self.cell(cell).get()
    }

    /// Read a cell ignoring strict-completeness mode. An unpopulated cell
    /// yields whatever placeholder the host provides.
    #[must_use]
    pub fn peek(&self, cell: &CellRef) -> CellValue {
        self.backend.read(cell.device(), cell.control())
    }

    /// Write a cell by reference. Always delegates to the host store.
    pub fn write(&self, cell: &CellRef, value: CellValue) {
        self.cell(cell).set(value);
    }
}

/// A named grouping of cells, cached for the lifetime of the store.
pub struct DeviceHandle {
    name: String,
    backend: Arc<dyn CellBackend>,
    strict: Arc<StrictDepth>,
    cells: Mutex<HashMap<String, Arc<CellHandle>>>,
}

impl DeviceHandle {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up the handle for `control`, creating and caching it on first
    /// access.
    ///
    /// # Errors
    ///
    /// Returns a definition error when `control` is not a valid control
    /// name.
    pub fn cell(&self, control: &str) -> Result<Arc<CellHandle>, CellHubError> {
        let cell = CellRef::new(&self.name, control).map_err(CellHubError::from)?;
        Ok(self.cell_of(&cell))
    }

    /// Same lookup for an already-validated reference.
    fn cell_of(&self, cell: &CellRef) -> Arc<CellHandle> {
        let mut cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(cells.entry(cell.control().to_string()).or_insert_with(|| {
            Arc::new(CellHandle {
                cell: cell.clone(),
                backend: Arc::clone(&self.backend),
                strict: Arc::clone(&self.strict),
            })
        }))
    }
}

/// One cell: a single named point of automation state.
pub struct CellHandle {
    cell: CellRef,
    backend: Arc<dyn CellBackend>,
    strict: Arc<StrictDepth>,
}

impl CellHandle {
    #[must_use]
    pub fn reference(&self) -> &CellRef {
        &self.cell
    }

    /// Whether the host has supplied a value since process start.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.backend
            .is_complete(self.cell.device(), self.cell.control())
    }

    /// Current value.
    ///
    /// Outside strict-completeness mode this returns whatever placeholder
    /// the host provides for an unpopulated cell.
    ///
    /// # Errors
    ///
    /// Returns [`CellHubError::IncompleteCell`] naming this cell when
    /// strict mode is active and the cell is not complete.
    pub fn get(&self) -> Result<CellValue, CellHubError> {
        if self.strict.is_strict() && !self.is_complete() {
            return Err(CellHubError::IncompleteCell {
                cell: self.cell.clone(),
            });
        }
        Ok(self.backend.read(self.cell.device(), self.cell.control()))
    }

    /// Write a value through to the host store.
    pub fn set(&self, value: CellValue) {
        self.backend
            .write(self.cell.device(), self.cell.control(), value);
    }
}

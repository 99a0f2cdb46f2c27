//! Cell backend port: the host's value store.

use cellhub_domain::value::CellValue;

/// Raw cell storage keyed by `(device, control)`.
///
/// The host owns the device registry and all value lifecycle; the engine
/// never deletes cells. Reading a cell the host has not populated must
/// return whatever default/placeholder the host defines; completeness is
/// reported separately through [`is_complete`](CellBackend::is_complete)
/// and enforced by the engine's cell store facade, not here.
pub trait CellBackend: Send + Sync {
    /// Current value of the cell, or the host's placeholder for an
    /// unpopulated one.
    fn read(&self, device: &str, control: &str) -> CellValue;

    /// Write a value. Always delegates to the host store; the engine keeps
    /// no cache of written values.
    fn write(&self, device: &str, control: &str, value: CellValue);

    /// Whether the host has supplied at least one value since process
    /// start.
    fn is_complete(&self, device: &str, control: &str) -> bool;
}

impl<T: CellBackend> CellBackend for std::sync::Arc<T> {
    fn read(&self, device: &str, control: &str) -> CellValue {
        (**self).read(device, control)
    }

    fn write(&self, device: &str, control: &str, value: CellValue) {
        (**self).write(device, control, value);
    }

    fn is_complete(&self, device: &str, control: &str) -> bool {
        (**self).is_complete(device, control)
    }
}

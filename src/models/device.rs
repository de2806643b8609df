use ndarray::Array3;

use crate::error::Result;

/// Opaque compute placement capability, passed explicitly through a detection call.
///
/// The scoring loop itself always runs on host memory; a device only decides
/// where the prepared sequence lives before it is handed to the predictor.
pub trait ComputeDevice {
    /// Identifier forwarded to the predictor (e.g. `"cpu"`, `"cuda:0"`).
    fn name(&self) -> &str;

    /// Bind a prepared `batch x T x D` tensor to this device.
    fn place(&self, batch: Array3<f64>) -> Result<Array3<f64>>;
}

/// Host memory. Placement is the identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cpu;

impl ComputeDevice for Cpu {
    fn name(&self) -> &str {
        "cpu"
    }

    fn place(&self, batch: Array3<f64>) -> Result<Array3<f64>> {
        Ok(batch)
    }
}

/// A named device whose placement is delegated to the predictor's runtime.
///
/// Used by the Python bindings, where the actual transfer happens inside the
/// caller's model; on the Rust side the data stays on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedDevice {
    name: String,
}

impl NamedDevice {
    pub fn new(name: impl Into<String>) -> Self {
        NamedDevice { name: name.into() }
    }
}

impl ComputeDevice for NamedDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn place(&self, batch: Array3<f64>) -> Result<Array3<f64>> {
        if self.name.trim().is_empty() {
            return Err(crate::error::DetectionError::DeviceBinding(
                "empty device name".to_string(),
            ));
        }
        Ok(batch)
    }
}

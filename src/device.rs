//! Compute device with a bounded memory budget
//!
//! Training runs on a single device. The device does not track live
//! allocations; each training or inference step asks for its peak working
//! set up front and the device either grants it or fails with
//! [`Error::ResourceExhausted`]. The batch size prober relies on this being
//! deterministic and monotone in the requested size.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Execution device for one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Display name (e.g. "cpu:0")
    pub name: String,

    /// Peak bytes a single step may use (None = unbounded)
    pub memory_budget: Option<usize>,
}

impl Device {
    /// Unbounded CPU device
    pub fn cpu() -> Self {
        Self {
            name: "cpu:0".to_string(),
            memory_budget: None,
        }
    }

    /// Device with a fixed memory budget in bytes
    pub fn with_budget(name: impl Into<String>, bytes: usize) -> Self {
        Self {
            name: name.into(),
            memory_budget: Some(bytes),
        }
    }

    /// Build a device from a megabyte budget
    pub fn from_megabytes(memory_mb: Option<usize>) -> Self {
        match memory_mb {
            Some(mb) => Self::with_budget("cpu:0", mb.saturating_mul(1024 * 1024)),
            None => Self::cpu(),
        }
    }

    /// Request `bytes` of working memory for one step
    pub fn reserve(&self, bytes: usize) -> Result<()> {
        match self.memory_budget {
            Some(available) if bytes > available => Err(Error::ResourceExhausted {
                requested: bytes,
                available,
            }),
            _ => Ok(()),
        }
    }
}

impl Default for Device {
    fn default() -> Self {
        Self::cpu()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbounded_device_grants_everything() {
        let device = Device::cpu();
        assert!(device.reserve(usize::MAX).is_ok());
    }

    #[test]
    fn test_budget_enforced() {
        let device = Device::with_budget("test", 1000);
        assert!(device.reserve(1000).is_ok());

        let err = device.reserve(1001).unwrap_err();
        assert!(err.is_resource_exhausted());
    }

    #[test]
    fn test_from_megabytes() {
        let device = Device::from_megabytes(Some(2));
        assert_eq!(device.memory_budget, Some(2 * 1024 * 1024));
        assert_eq!(Device::from_megabytes(None).memory_budget, None);
    }
}

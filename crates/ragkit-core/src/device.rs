use std::fmt;
use std::str::FromStr;

use candle_core::utils::{cuda_is_available, metal_is_available};
use candle_core::{DType, Device};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{CoreError, CoreResult};

/// Where the model should run.
///
/// Parsed from `auto`, `cpu`, `cuda`, `cuda:<ordinal>` or `metal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DevicePreference {
    /// First accelerator that is compiled in and present, else CPU.
    #[default]
    Auto,
    Cpu,
    Cuda(usize),
    Metal,
}

impl FromStr for DevicePreference {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda(0)),
            "metal" | "mps" => Ok(Self::Metal),
            other => other
                .strip_prefix("cuda:")
                .and_then(|ordinal| ordinal.parse().ok())
                .map(Self::Cuda)
                .ok_or_else(|| CoreError::Config {
                    field: "device".to_string(),
                    reason: format!("unknown device '{other}' (expected auto, cpu, cuda[:N] or metal)"),
                }),
        }
    }
}

impl fmt::Display for DevicePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Cpu => f.write_str("cpu"),
            Self::Cuda(ordinal) => write!(f, "cuda:{ordinal}"),
            Self::Metal => f.write_str("metal"),
        }
    }
}

impl TryFrom<String> for DevicePreference {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DevicePreference> for String {
    fn from(value: DevicePreference) -> Self {
        value.to_string()
    }
}

/// Resolve a [`DevicePreference`] to a concrete candle device.
///
/// `Auto` never fails: it tries CUDA, then Metal, and falls back to CPU.
/// Explicit accelerator requests fail with [`CoreError::DeviceUnavailable`].
pub fn select_device(preference: DevicePreference) -> CoreResult<Device> {
    match preference {
        DevicePreference::Cpu => {
            info!("Using CPU device");
            Ok(Device::Cpu)
        }
        DevicePreference::Cuda(ordinal) => {
            let device = Device::new_cuda(ordinal)
                .map_err(|e| CoreError::DeviceUnavailable(format!("cuda:{ordinal}: {e}")))?;
            info!(ordinal, "Using CUDA device");
            Ok(device)
        }
        DevicePreference::Metal => {
            let device = Device::new_metal(0)
                .map_err(|e| CoreError::DeviceUnavailable(format!("metal: {e}")))?;
            info!("Using Metal device");
            Ok(device)
        }
        DevicePreference::Auto => {
            if cuda_is_available() {
                match Device::new_cuda(0) {
                    Ok(device) => {
                        info!("Using CUDA device");
                        return Ok(device);
                    }
                    Err(e) => warn!(error = %e, "CUDA unavailable, falling back"),
                }
            }
            if metal_is_available() {
                match Device::new_metal(0) {
                    Ok(device) => {
                        info!("Using Metal device");
                        return Ok(device);
                    }
                    Err(e) => warn!(error = %e, "Metal unavailable, falling back"),
                }
            }
            info!("Using CPU device");
            Ok(Device::Cpu)
        }
    }
}

/// Half precision on accelerators, full precision on CPU.
pub fn select_dtype(device: &Device) -> DType {
    if device.is_cuda() || device.is_metal() {
        DType::F16
    } else {
        DType::F32
    }
}

pub fn device_name(device: &Device) -> &'static str {
    match device {
        Device::Cpu => "CPU",
        Device::Cuda(_) => "CUDA",
        Device::Metal(_) => "Metal",
    }
}

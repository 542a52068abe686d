use candle_core::utils::{cuda_is_available, metal_is_available};
use candle_core::Device;
use tracing::{info, warn};

/// Device the index lives on.
///
/// With `use_gpu` set this tries CUDA device `cuda_device_id`, then Metal,
/// and falls back to CPU with a warning.
pub fn index_device(use_gpu: bool, cuda_device_id: usize) -> Device {
    if !use_gpu {
        return Device::Cpu;
    }
    if cuda_is_available() {
        match Device::new_cuda(cuda_device_id) {
            Ok(device) => {
                info!(cuda_device_id, "Index placed on CUDA device");
                return device;
            }
            Err(e) => warn!(cuda_device_id, error = %e, "CUDA device unavailable"),
        }
    }
    if metal_is_available() {
        match Device::new_metal(0) {
            Ok(device) => {
                info!("Index placed on Metal device");
                return device;
            }
            Err(e) => warn!(error = %e, "Metal device unavailable"),
        }
    }
    warn!("GPU requested for the index but none is available, using CPU");
    Device::Cpu
}

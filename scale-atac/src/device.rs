use crate::scale_common::*;
use candle_core::Device;
use clap::ValueEnum;
use serde::Serialize;

#[derive(ValueEnum, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[clap(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ComputeDevice {
    Cpu,
    Cuda,
    Metal,
}

impl std::fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComputeDevice::Cpu => write!(f, "cpu"),
            ComputeDevice::Cuda => write!(f, "cuda"),
            ComputeDevice::Metal => write!(f, "metal"),
        }
    }
}

/// Accelerators usable on this host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AvailableDevices {
    pub cuda: bool,
    pub metal: bool,
}

impl AvailableDevices {
    /// A backend counts as available when it was compiled in and a
    /// device with the given ordinal can actually be opened.
    pub fn detect(ordinal: usize) -> Self {
        let cuda = candle_core::utils::cuda_is_available() && Device::new_cuda(ordinal).is_ok();
        let metal = candle_core::utils::metal_is_available() && Device::new_metal(ordinal).is_ok();
        debug!("accelerators: cuda = {}, metal = {}", cuda, metal);
        Self { cuda, metal }
    }

    pub fn cpu_only() -> Self {
        Self::default()
    }
}

/// Map the requested device onto what the host has. An unavailable
/// accelerator falls back to the CPU.
pub fn resolve_device(requested: ComputeDevice, available: &AvailableDevices) -> ComputeDevice {
    match requested {
        ComputeDevice::Cuda if available.cuda => ComputeDevice::Cuda,
        ComputeDevice::Metal if available.metal => ComputeDevice::Metal,
        _ => ComputeDevice::Cpu,
    }
}

/// Open a resolved device and seed its generator where the backend
/// allows it. The CPU backend has no seedable generator; everything
/// random on the CPU path is drawn from our own seeded `StdRng`.
pub fn open_device(device: ComputeDevice, ordinal: usize, seed: u64) -> anyhow::Result<Device> {
    let dev = match device {
        ComputeDevice::Metal => Device::new_metal(ordinal)?,
        ComputeDevice::Cuda => Device::new_cuda(ordinal)?,
        ComputeDevice::Cpu => Device::Cpu,
    };

    if !dev.is_cpu() {
        dev.set_seed(seed)?;
    }
    Ok(dev)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accelerators_fall_back_to_cpu() {
        let none = AvailableDevices::cpu_only();
        assert_eq!(resolve_device(ComputeDevice::Cuda, &none), ComputeDevice::Cpu);
        assert_eq!(resolve_device(ComputeDevice::Metal, &none), ComputeDevice::Cpu);
        assert_eq!(resolve_device(ComputeDevice::Cpu, &none), ComputeDevice::Cpu);
    }

    #[test]
    fn available_accelerator_is_used() {
        let cuda = AvailableDevices {
            cuda: true,
            metal: false,
        };
        assert_eq!(resolve_device(ComputeDevice::Cuda, &cuda), ComputeDevice::Cuda);
        assert_eq!(resolve_device(ComputeDevice::Metal, &cuda), ComputeDevice::Cpu);
        assert_eq!(resolve_device(ComputeDevice::Cpu, &cuda), ComputeDevice::Cpu);

        let metal = AvailableDevices {
            cuda: false,
            metal: true,
        };
        assert_eq!(resolve_device(ComputeDevice::Metal, &metal), ComputeDevice::Metal);
    }

    #[test]
    fn cpu_device_opens_without_seeding() -> anyhow::Result<()> {
        let dev = open_device(ComputeDevice::Cpu, 0, 18)?;
        assert!(dev.is_cpu());
        Ok(())
    }
}

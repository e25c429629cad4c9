//! Device configuration and vendor detection.

use bitflags::bitflags;

bitflags! {
    /// Flags controlling device behavior.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DeviceFlags: u32 {
        /// Log every cache decision and replayed command at trace level.
        const DEBUG_MODE = 1 << 0;
    }
}

/// Parameters used to create a [`Device`](crate::Device).
///
/// # Example
///
/// ```ignore
/// let params = DeviceParameters::new()
///     .with_flags(DeviceFlags::DEBUG_MODE)
///     .with_staging_arena_size(4 * 1024 * 1024)
///     .with_label("main");
/// let device = Device::new(driver, params)?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceParameters {
    /// Debug label for the device.
    pub label: Option<String>,
    /// Behavior flags.
    pub flags: DeviceFlags,
    /// Initial size of each deferred context's staging arena, in bytes.
    pub staging_arena_size: usize,
    /// Initial command capacity of each deferred context.
    pub command_capacity: usize,
    /// Override for the number of texture units the render state tracks.
    ///
    /// The effective value never exceeds what the driver reports.
    pub max_texture_units: Option<u32>,
}

impl DeviceParameters {
    /// Default staging arena size (1 MB).
    pub const DEFAULT_STAGING_ARENA_SIZE: usize = 1024 * 1024;

    /// Default number of commands preallocated per deferred context.
    pub const DEFAULT_COMMAND_CAPACITY: usize = 64;

    /// Create parameters with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_flags(mut self, flags: DeviceFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_staging_arena_size(mut self, size: usize) -> Self {
        self.staging_arena_size = size;
        self
    }

    pub fn with_command_capacity(mut self, capacity: usize) -> Self {
        self.command_capacity = capacity;
        self
    }

    pub fn with_max_texture_units(mut self, units: u32) -> Self {
        self.max_texture_units = Some(units);
        self
    }

    /// Check if debug mode is enabled.
    pub fn debug_mode(&self) -> bool {
        self.flags.contains(DeviceFlags::DEBUG_MODE)
    }
}

impl Default for DeviceParameters {
    fn default() -> Self {
        Self {
            label: None,
            flags: DeviceFlags::empty(),
            staging_arena_size: Self::DEFAULT_STAGING_ARENA_SIZE,
            command_capacity: Self::DEFAULT_COMMAND_CAPACITY,
            max_texture_units: None,
        }
    }
}

/// Hardware vendor detected from the driver's vendor string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Vendor {
    Amd,
    Nvidia,
    Intel,
    /// Software renderer.
    Software,
    #[default]
    Unknown,
}

impl Vendor {
    /// Detect the vendor from a raw vendor string.
    pub fn from_vendor_string(vendor: &str) -> Self {
        if vendor.contains("Microsoft") {
            Self::Software
        } else if vendor.contains("ATI") {
            Self::Amd
        } else if vendor.contains("NVIDIA") {
            Self::Nvidia
        } else if vendor.contains("INTEL") {
            Self::Intel
        } else {
            Self::Unknown
        }
    }
}

impl std::fmt::Display for Vendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Amd => write!(f, "AMD"),
            Self::Nvidia => write!(f, "NVIDIA"),
            Self::Intel => write!(f, "INTEL"),
            Self::Software => write!(f, "SOFTWARE"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_detection() {
        assert_eq!(
            Vendor::from_vendor_string("Microsoft Corporation"),
            Vendor::Software
        );
        assert_eq!(Vendor::from_vendor_string("ATI Technologies Inc."), Vendor::Amd);
        assert_eq!(Vendor::from_vendor_string("NVIDIA Corporation"), Vendor::Nvidia);
        assert_eq!(Vendor::from_vendor_string("INTEL"), Vendor::Intel);
        assert_eq!(Vendor::from_vendor_string("Mesa"), Vendor::Unknown);
    }

    #[test]
    fn test_parameters_builder() {
        let params = DeviceParameters::new()
            .with_label("main")
            .with_flags(DeviceFlags::DEBUG_MODE)
            .with_command_capacity(8)
            .with_max_texture_units(4);
        assert!(params.debug_mode());
        assert_eq!(params.label.as_deref(), Some("main"));
        assert_eq!(params.command_capacity, 8);
        assert_eq!(params.max_texture_units, Some(4));
        assert_eq!(
            params.staging_arena_size,
            DeviceParameters::DEFAULT_STAGING_ARENA_SIZE
        );
    }
}

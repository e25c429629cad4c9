//! Graphics device.
//!
//! The [`Device`] owns the native driver, the UID counters and the device
//! limits. It hands out the single immediate [`RenderContext`] and any
//! number of [`DeferredContext`]s.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::backend::Driver;
use crate::config::{DeviceParameters, Vendor};
use crate::context::RenderContext;
use crate::deferred::DeferredContext;
use crate::error::{DriverResultExt, ErrorKind, GlError};
use crate::uid::UidRegistry;

/// Limits of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceCapabilities {
    /// Number of texture units tracked by the render state.
    pub max_texture_units: u32,
}

/// A graphics device.
///
/// # Thread Safety
///
/// `Device` is `Send + Sync`. Resources hold a strong reference to their
/// device and may be dropped on any thread.
///
/// # Example
///
/// ```ignore
/// let device = Device::new(Arc::new(RecordingDriver::new()), DeviceParameters::default())?;
/// let mut context = device.create_render_context()?;
/// let mut worker = device.create_deferred_context();
/// ```
pub struct Device {
    driver: Arc<dyn Driver>,
    params: DeviceParameters,
    capabilities: DeviceCapabilities,
    vendor: Vendor,
    uids: UidRegistry,
    render_context_active: AtomicBool,
    frame_count: AtomicU64,
}

impl Device {
    /// Create a device on top of `driver`.
    ///
    /// # Errors
    ///
    /// Returns an initialization error if the driver reports no texture
    /// units or the parameters limit them to zero.
    pub fn new(driver: Arc<dyn Driver>, params: DeviceParameters) -> Result<Arc<Self>, GlError> {
        log::info!("Creating Device on driver: {}", driver.name());

        let driver_units = driver.max_texture_units();
        let max_texture_units = params
            .max_texture_units
            .map_or(driver_units, |units| units.min(driver_units));
        if max_texture_units == 0 {
            return Err(GlError::initialization(
                "Device::new",
                format!(
                    "no texture units available (driver `{}` reports {}, limit {:?})",
                    driver.name(),
                    driver_units,
                    params.max_texture_units
                ),
            ));
        }

        let vendor_string = driver.vendor_string();
        let vendor = Vendor::from_vendor_string(&vendor_string);
        log::info!(
            "Device vendor: {} ({:?}), texture units: {}",
            vendor,
            vendor_string,
            max_texture_units
        );

        Ok(Arc::new(Self {
            driver,
            params,
            capabilities: DeviceCapabilities { max_texture_units },
            vendor,
            uids: UidRegistry::new(),
            render_context_active: AtomicBool::new(false),
            frame_count: AtomicU64::new(0),
        }))
    }

    pub(crate) fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    /// Get the UID counters of this device.
    pub fn uids(&self) -> &UidRegistry {
        &self.uids
    }

    pub fn parameters(&self) -> &DeviceParameters {
        &self.params
    }

    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    pub fn vendor(&self) -> Vendor {
        self.vendor
    }

    /// Get the device label, if set.
    pub fn label(&self) -> Option<&str> {
        self.params.label.as_deref()
    }

    pub(crate) fn debug_mode(&self) -> bool {
        self.params.debug_mode()
    }

    /// Create the immediate render context.
    ///
    /// Only one render context may exist at a time; it is released when
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns an initialization error if a render context is already live.
    pub fn create_render_context(self: &Arc<Self>) -> Result<RenderContext, GlError> {
        if self.render_context_active.swap(true, Ordering::AcqRel) {
            return Err(GlError::initialization(
                "Device::create_render_context",
                "a render context already exists for this device",
            ));
        }
        log::debug!("Device: render context created");
        Ok(RenderContext::new(Arc::clone(self)))
    }

    pub(crate) fn release_render_context(&self) {
        self.render_context_active.store(false, Ordering::Release);
        log::debug!("Device: render context released");
    }

    /// Create a deferred context for a producer thread.
    pub fn create_deferred_context(self: &Arc<Self>) -> DeferredContext {
        DeferredContext::new(Arc::clone(self))
    }

    /// Present the finished frame and advance the frame counter.
    ///
    /// Must be called from the thread that owns the render context.
    pub fn end_frame(&self) -> Result<(), GlError> {
        self.driver
            .present()
            .or_gl(ErrorKind::State, "Device::end_frame", "Could not present frame")?;
        let frame = self.frame_count.fetch_add(1, Ordering::Relaxed) + 1;
        log::trace!("Device: frame {frame} presented");
        Ok(())
    }

    /// Number of frames presented so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("driver", &self.driver.name())
            .field("label", &self.params.label)
            .field("vendor", &self.vendor)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

static_assertions::assert_impl_all!(Device: Send, Sync);

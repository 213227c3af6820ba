//! WASAPI backend using Windows Core Audio

mod capture;
mod format;
mod renderer;

pub use capture::{WasapiCaptureStream, WasapiLoopbackEndpoint};
pub use renderer::WasapiRenderStream;

use super::{AudioBackend, LoopbackEndpoint, RenderStream};
use crate::device::DeviceDescriptor;
use crate::error::{LoopbackError, Result};
use tracing::{debug, info};
use windows::{
    core::PCWSTR,
    Win32::{
        Devices::FunctionDiscovery::PKEY_Device_FriendlyName,
        Media::Audio::{
            eConsole, eRender, IMMDevice, IMMDeviceEnumerator, MMDeviceEnumerator,
            DEVICE_STATE_ACTIVE,
        },
        System::Com::{
            CoCreateInstance, CoInitializeEx, CoTaskMemFree, CLSCTX_ALL, COINIT_MULTITHREADED,
            STGM_READ,
        },
    },
};

/// PROPVARIANT type for wide string pointers
const VT_LPWSTR: u16 = 31;

/// Audio backend wrapping the MMDevice API
pub struct WasapiBackend {
    enumerator: IMMDeviceEnumerator,
}

// SAFETY: COM is initialized as MTA and never uninitialized, so interface
// pointers may be used from any thread of the process, including threads
// that did not call CoInitializeEx themselves (implicit MTA).
unsafe impl Send for WasapiBackend {}

impl WasapiBackend {
    /// Create the backend, initializing COM on this thread
    pub fn new() -> Result<Self> {
        unsafe {
            // Ignore error if already initialized
            let _ = CoInitializeEx(None, COINIT_MULTITHREADED);

            let enumerator: IMMDeviceEnumerator =
                CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)?;

            info!("WASAPI backend initialized");
            Ok(Self { enumerator })
        }
    }

    /// Get a device by its ID
    fn device(&self, device_id: &str) -> Result<IMMDevice> {
        unsafe {
            let id_wide: Vec<u16> = device_id.encode_utf16().chain(std::iter::once(0)).collect();
            self.enumerator
                .GetDevice(PCWSTR(id_wide.as_ptr()))
                .map_err(|_| LoopbackError::DeviceNotFound(device_id.to_string()))
        }
    }
}

impl AudioBackend for WasapiBackend {
    fn name(&self) -> &'static str {
        "WASAPI"
    }

    fn enumerate_render_endpoints(&self) -> Result<Vec<DeviceDescriptor>> {
        unsafe {
            let collection = self
                .enumerator
                .EnumAudioEndpoints(eRender, DEVICE_STATE_ACTIVE)?;

            let count = collection.GetCount()?;
            debug!("Found {} render devices", count);

            let mut devices = Vec::with_capacity(count as usize);
            for i in 0..count {
                if let Ok(device) = collection.Item(i) {
                    if let Ok(descriptor) = describe(&device) {
                        devices.push(descriptor);
                    }
                }
            }

            Ok(devices)
        }
    }

    fn default_render_endpoint(&self) -> Result<DeviceDescriptor> {
        let device = unsafe {
            self.enumerator
                .GetDefaultAudioEndpoint(eRender, eConsole)
                .map_err(|e| {
                    LoopbackError::device_error(
                        "default",
                        format!("Failed to get default render device: {}", e),
                    )
                })?
        };
        describe(&device)
    }

    fn open_loopback(&self, device_id: &str) -> Result<Box<dyn LoopbackEndpoint>> {
        let device = self.device(device_id)?;
        let descriptor = describe(&device)?;
        Ok(Box::new(WasapiLoopbackEndpoint::new(&device, descriptor)?))
    }

    fn open_render(&self, device_id: &str) -> Result<Box<dyn RenderStream>> {
        let device = self.device(device_id)?;
        let descriptor = describe(&device)?;
        Ok(Box::new(WasapiRenderStream::new(&device, descriptor)?))
    }
}

/// Id and friendly name of a device
fn describe(device: &IMMDevice) -> Result<DeviceDescriptor> {
    let id = device_id(device)?;
    let name = device_name(device).unwrap_or_else(|| "Unknown Device".to_string());
    Ok(DeviceDescriptor { id, name })
}

fn device_id(device: &IMMDevice) -> Result<String> {
    unsafe {
        let id_ptr = device.GetId()?;
        let id = PCWSTR(id_ptr.0).to_string();
        CoTaskMemFree(Some(id_ptr.0 as *const _));
        id.map_err(|e| LoopbackError::device_error("unknown", format!("Invalid device id: {}", e)))
    }
}

fn device_name(device: &IMMDevice) -> Option<String> {
    unsafe {
        let store = device.OpenPropertyStore(STGM_READ).ok()?;
        let prop = store.GetValue(&PKEY_Device_FriendlyName).ok()?;

        // Extract string from PROPVARIANT using repr(C) struct
        #[repr(C)]
        struct PropVariantRaw {
            vt: u16,
            w_reserved1: u16,
            w_reserved2: u16,
            w_reserved3: u16,
            data: *const u16,
        }

        let raw = &*((&prop) as *const windows_core::PROPVARIANT as *const PropVariantRaw);
        if raw.vt == VT_LPWSTR && !raw.data.is_null() {
            return PCWSTR(raw.data).to_string().ok();
        }
        None
    }
}

//! Input device enumeration, selection and microphone permission state.

use log::{info, warn};

use crate::audio::{AudioHost, DeviceInfo};
use crate::error::CaptureError;

/// Whether the user has granted access to audio input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PermissionState {
    /// Not asked yet.
    #[default]
    Prompt,
    Granted,
    Denied,
}

/// Available capture devices, the user's choice among them, and the
/// permission state that gates starting the tuner.
pub struct DeviceRegistry<H: AudioHost> {
    host: H,
    devices: Vec<DeviceInfo>,
    selected: Option<String>,
    permission: PermissionState,
}

impl<H: AudioHost> DeviceRegistry<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            devices: Vec::new(),
            selected: None,
            permission: PermissionState::Prompt,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn permission(&self) -> PermissionState {
        self.permission
    }

    pub fn devices(&self) -> &[DeviceInfo] {
        &self.devices
    }

    pub fn selected_device(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn selected_device_info(&self) -> Option<&DeviceInfo> {
        let selected = self.selected.as_deref()?;
        self.devices.iter().find(|d| d.id == selected)
    }

    /// Asks for microphone access and enumerates the inputs.
    ///
    /// On success the first device is selected unless a still-present device
    /// already is. On failure the permission state becomes `Denied`.
    pub fn connect(&mut self) -> Result<&[DeviceInfo], CaptureError> {
        let result = self
            .host
            .request_access()
            .and_then(|()| self.host.input_devices());

        match result {
            Ok(devices) => {
                self.devices = devices;
                self.permission = PermissionState::Granted;
                self.reconcile_selection();
                info!(
                    "[DEVICES] Microphone connected, {} input(s), selected {:?}",
                    self.devices.len(),
                    self.selected
                );
                Ok(&self.devices)
            }
            Err(e) => {
                warn!("[DEVICES] Could not enumerate devices: {}", e);
                self.permission = PermissionState::Denied;
                Err(e)
            }
        }
    }

    /// Re-enumerates devices without changing the permission state.
    pub fn refresh(&mut self) -> Result<&[DeviceInfo], CaptureError> {
        self.devices = self.host.input_devices()?;
        self.reconcile_selection();
        Ok(&self.devices)
    }

    /// Records the user's device choice.
    pub fn select_device(&mut self, id: impl Into<String>) {
        self.selected = Some(id.into());
    }

    /// Forgets the choice so the next start uses the default input.
    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn mark_denied(&mut self) {
        self.permission = PermissionState::Denied;
    }

    /// Returns to the un-asked state with no devices or selection.
    pub fn disconnect(&mut self) {
        self.devices.clear();
        self.selected = None;
        self.permission = PermissionState::Prompt;
    }

    fn reconcile_selection(&mut self) {
        let still_present = self
            .selected
            .as_deref()
            .is_some_and(|id| self.devices.iter().any(|d| d.id == id));
        if !still_present {
            self.selected = self.devices.first().map(|d| d.id.clone());
        }
    }
}

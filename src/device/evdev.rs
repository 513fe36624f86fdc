//! Hardware transport: a barcode scanner exposed as a Linux input device.
//!
//! The device is grabbed so its keystrokes do not also reach whatever has
//! keyboard focus, and read through a non-blocking event stream.

use std::path::PathBuf;

use async_trait::async_trait;

use super::{KeyInput, KeySource};
use crate::error::DeviceError;

pub struct HardwareKeySource {
    path: PathBuf,
    #[cfg(target_os = "linux")]
    stream: Option<::evdev::EventStream>,
}

impl HardwareKeySource {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            #[cfg(target_os = "linux")]
            stream: None,
        }
    }
}

#[cfg(target_os = "linux")]
#[async_trait]
impl KeySource for HardwareKeySource {
    async fn open(&mut self) -> Result<(), DeviceError> {
        self.stream = None;
        // open and grab are plain blocking syscalls
        let path = self.path.clone();
        let device = tokio::task::spawn_blocking(move || {
            let mut device = ::evdev::Device::open(&path)
                .map_err(|source| DeviceError::Open { path: path.clone(), source })?;
            device.grab().map_err(|source| DeviceError::Grab { path, source })?;
            Ok::<_, DeviceError>(device)
        })
        .await
        .map_err(|e| DeviceError::Open {
            path: self.path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::Other, e),
        })??;
        // into_event_stream puts the fd into non-blocking mode
        let stream = device
            .into_event_stream()
            .map_err(|source| DeviceError::Open { path: self.path.clone(), source })?;
        self.stream = Some(stream);
        Ok(())
    }

    async fn next_key(&mut self) -> Result<KeyInput, DeviceError> {
        let stream = self.stream.as_mut().ok_or_else(|| {
            DeviceError::Read(std::io::Error::new(std::io::ErrorKind::NotConnected, "device not open"))
        })?;
        loop {
            let ev = stream.next_event().await.map_err(DeviceError::Read)?;
            // value 1 is key-down; 0 is release and 2 autorepeat
            if let ::evdev::InputEventKind::Key(key) = ev.kind() {
                if ev.value() == 1 {
                    return Ok(translate_key(key));
                }
            }
        }
    }

    fn close(&mut self) {
        // dropping the stream closes the fd and releases the grab
        self.stream = None;
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(target_os = "linux")]
pub fn translate_key(key: ::evdev::Key) -> KeyInput {
    use ::evdev::Key;
    match key {
        Key::KEY_0 => KeyInput::Digit(0),
        Key::KEY_1 => KeyInput::Digit(1),
        Key::KEY_2 => KeyInput::Digit(2),
        Key::KEY_3 => KeyInput::Digit(3),
        Key::KEY_4 => KeyInput::Digit(4),
        Key::KEY_5 => KeyInput::Digit(5),
        Key::KEY_6 => KeyInput::Digit(6),
        Key::KEY_7 => KeyInput::Digit(7),
        Key::KEY_8 => KeyInput::Digit(8),
        Key::KEY_9 => KeyInput::Digit(9),
        Key::KEY_ENTER => KeyInput::Enter,
        _ => KeyInput::Other,
    }
}

#[cfg(not(target_os = "linux"))]
#[async_trait]
impl KeySource for HardwareKeySource {
    async fn open(&mut self) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported)
    }

    async fn next_key(&mut self) -> Result<KeyInput, DeviceError> {
        Err(DeviceError::Unsupported)
    }

    fn close(&mut self) {}

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

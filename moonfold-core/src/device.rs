//! Compute device tokens.

use std::{fmt, str::FromStr, sync::Arc};

use crate::error::DeviceError;

/// Identifies the compute target a dataset's storage is placed on.
///
/// A device is a lowercase token such as `cpu`, `cuda`, `cuda:1` or `mps`.
/// Moving a dataset between devices is metadata relocation: indices and
/// labels never change.
///
/// # Examples
/// ```
/// use moonfold_core::Device;
///
/// let device: Device = "CUDA:1".parse()?;
/// assert_eq!(device.as_str(), "cuda:1");
/// assert_eq!(device.name(), "cuda");
/// assert_eq!(device.ordinal(), Some(1));
/// assert!(Device::cpu().is_cpu());
/// # Ok::<(), moonfold_core::DeviceError>(())
/// ```
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Device {
    token: Arc<str>,
}

impl Device {
    /// Returns the host CPU device.
    #[must_use]
    pub fn cpu() -> Self {
        Self {
            token: Arc::from("cpu"),
        }
    }

    /// Parses and normalises a device token.
    ///
    /// # Errors
    /// Returns [`DeviceError::Empty`] for blank input and
    /// [`DeviceError::Malformed`] when the token is not `name` or
    /// `name:ordinal` with an ASCII alphanumeric name.
    pub fn parse(raw: &str) -> Result<Self, DeviceError> {
        let token = raw.trim().to_ascii_lowercase();
        if token.is_empty() {
            return Err(DeviceError::Empty);
        }
        let (name, ordinal) = match token.split_once(':') {
            Some((name, ordinal)) => (name, Some(ordinal)),
            None => (token.as_str(), None),
        };
        let name_ok = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        let ordinal_ok = ordinal.is_none_or(|value| value.parse::<u32>().is_ok());
        if !name_ok || !ordinal_ok {
            return Err(DeviceError::Malformed { token });
        }
        Ok(Self {
            token: Arc::from(token),
        })
    }

    /// Returns the normalised token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.token
    }

    /// Returns the device family without its ordinal.
    #[must_use]
    pub fn name(&self) -> &str {
        self.token
            .split_once(':')
            .map_or(&*self.token, |(name, _)| name)
    }

    /// Returns the ordinal suffix, if one was given.
    #[must_use]
    pub fn ordinal(&self) -> Option<u32> {
        self.token
            .split_once(':')
            .and_then(|(_, ordinal)| ordinal.parse().ok())
    }

    /// Returns whether this is the host CPU.
    #[must_use]
    pub fn is_cpu(&self) -> bool {
        self.name() == "cpu"
    }
}

impl Default for Device {
    fn default() -> Self {
        Self::cpu()
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token)
    }
}

impl FromStr for Device {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

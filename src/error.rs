use thiserror::Error;

/// Failures inside the hotplug machinery.
///
/// None of these reach the application through the listener API: the backend
/// logs them and degrades to "no notifications". They are returned from the
/// native seam so the backend can classify and count them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HotplugError {
    #[error("native context initialization failed: {0}")]
    InitializationFailed(String),
    #[error("hotplug callback registration failed: {0}")]
    RegistrationFailed(String),
    #[error("hotplug is not supported: {0}")]
    Unsupported(&'static str),
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type HotplugResult<T> = std::result::Result<T, HotplugError>;

impl HotplugError {
    /// True for failures that leave the listener without a native context.
    pub fn is_initialization(&self) -> bool {
        matches!(
            self,
            HotplugError::InitializationFailed(_) | HotplugError::Unsupported(_)
        )
    }
}

impl From<rusb::Error> for HotplugError {
    fn from(err: rusb::Error) -> Self {
        match err {
            rusb::Error::NotSupported => HotplugError::Unsupported("libusb reports no hotplug capability"),
            other => HotplugError::RegistrationFailed(other.to_string()),
        }
    }
}

//! Error types and handling for sensorcast

/// Result type alias for sensorcast operations
pub type Result<T> = std::result::Result<T, CaptureError>;

/// Error types for the capture-to-publish pipeline
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// I/O related errors (config files, transport sockets)
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Invalid parameters or configuration values
    #[error("Invalid parameter: {parameter} - {message}")]
    InvalidParameter { parameter: String, message: String },

    /// Configuration file could not be parsed
    #[error("Config error: {message}")]
    Config { message: String },

    /// Camera id is not registered
    #[error("Camera not found: {camera}")]
    CameraNotFound { camera: u32 },

    /// Camera id is already registered
    #[error("Camera already registered: {camera}")]
    CameraExists { camera: u32 },

    /// Render collaborator could not produce a texture for the camera
    #[error("Missing texture for camera {camera}: {message}")]
    MissingTexture { camera: u32, message: String },

    /// GPU to CPU transfer reported a failure
    #[error("Transfer error: {message}")]
    Transfer { message: String },

    /// Returned pixel layout does not match a supported stride
    #[error("Unsupported pixel stride: {bytes} bytes for {pixels} pixels")]
    UnsupportedStride { bytes: usize, pixels: usize },

    /// A readback for the same camera and modality is still in flight
    #[error("Readback pending for camera {camera} ({modality})")]
    ReadbackPending { camera: u32, modality: &'static str },

    /// Serialization into the wire format failed
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Transport rejected or failed to deliver a message
    #[error("Transport error on {topic}: {message}")]
    Transport { topic: String, message: String },

    /// Pipeline is shutting down or already stopped
    #[error("Pipeline shut down")]
    ShutDown,
}

impl CaptureError {
    /// Create an I/O error from a standard I/O error
    pub fn from_io(source: std::io::Error, context: &str) -> Self {
        Self::Io {
            message: format!("{}: {}", context, source),
            source: Some(source),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a missing texture error
    pub fn missing_texture(camera: u32, message: impl Into<String>) -> Self {
        Self::MissingTexture {
            camera,
            message: message.into(),
        }
    }

    /// Create a transfer error
    pub fn transfer(message: impl Into<String>) -> Self {
        Self::Transfer {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            topic: topic.into(),
            message: message.into(),
        }
    }

    /// Whether the error only costs the current frame and capture can continue
    pub fn is_frame_local(&self) -> bool {
        matches!(
            self,
            Self::MissingTexture { .. }
                | Self::Transfer { .. }
                | Self::UnsupportedStride { .. }
                | Self::ReadbackPending { .. }
                | Self::Serialization { .. }
                | Self::Transport { .. }
        )
    }
}

impl From<std::io::Error> for CaptureError {
    fn from(err: std::io::Error) -> Self {
        Self::from_io(err, "I/O operation failed")
    }
}

impl From<bincode::Error> for CaptureError {
    fn from(err: bincode::Error) -> Self {
        Self::serialization(format!("Bincode error: {}", err))
    }
}

impl From<toml::de::Error> for CaptureError {
    fn from(err: toml::de::Error) -> Self {
        Self::config(format!("TOML error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = CaptureError::transfer("readback failed");
        assert!(matches!(err, CaptureError::Transfer { .. }));
        assert!(err.is_frame_local());

        let err = CaptureError::CameraNotFound { camera: 3 };
        assert!(!err.is_frame_local());

        let err = CaptureError::UnsupportedStride { bytes: 10, pixels: 4 };
        assert!(err.is_frame_local());
    }

    #[test]
    fn test_error_display() {
        let err = CaptureError::transport("/cam/depth", "socket closed");
        let display = format!("{}", err);
        assert!(display.contains("Transport error"));
        assert!(display.contains("/cam/depth"));
        assert!(display.contains("socket closed"));
    }
}

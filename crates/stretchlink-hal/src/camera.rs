//! Generic `Camera` trait for image-capture hardware.

use stretchlink_types::LinkError;

/// One capture.  Pixel layout is agreed out of band through configuration
/// (RGB24 color, little-endian `u16` depth).
#[derive(Debug, Clone, PartialEq)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    pub color: Vec<u8>,
    /// Present only on depth-capable sensors.
    pub depth: Option<Vec<u8>>,
}

/// A camera or image-capture device.
pub trait Camera: Send {
    /// Stable identifier, e.g. `"d405"`.
    fn name(&self) -> &str;

    /// `true` when [`read`][Self::read] fills [`CameraFrame::depth`].
    fn has_depth(&self) -> bool;

    /// Block until the next frame is available and return it.
    ///
    /// # Errors
    ///
    /// [`LinkError::Hardware`] if the frame cannot be captured.
    fn read(&mut self) -> Result<CameraFrame, LinkError>;
}

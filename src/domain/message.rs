// src/domain/message.rs

//! Message carried through the fan-out.
//!
//! The publisher never looks inside an [`Image`]; it only hands it to each
//! transport plugin that has subscribers. It carries what encoders need and
//! nothing else.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Stamp and frame metadata attached to every image.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Producer-assigned sequence number.
    pub seq: u32,
    /// Acquisition time in nanoseconds since the Unix epoch.
    pub stamp_nanos: u64,
    /// Coordinate frame the image was captured in.
    pub frame_id: String,
}

/// An uncompressed image.
///
/// `data` is `height * step` bytes. Cloning is cheap because the pixel buffer
/// is reference-counted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub header: Header,
    pub height: u32,
    pub width: u32,
    /// Pixel encoding, e.g. `"rgb8"` or `"mono16"`.
    pub encoding: String,
    pub is_bigendian: bool,
    /// Row length in bytes.
    pub step: u32,
    pub data: Bytes,
}

impl Image {
    /// Create an image with an empty header.
    pub fn new(
        width: u32,
        height: u32,
        encoding: impl Into<String>,
        step: u32,
        data: impl Into<Bytes>,
    ) -> Self {
        // ---
        Self {
            header: Header::default(),
            height,
            width,
            encoding: encoding.into(),
            is_bigendian: false,
            step,
            data: data.into(),
        }
    }

    /// Set the header, consuming and returning the image.
    pub fn with_header(mut self, header: Header) -> Self {
        self.header = header;
        self
    }
}

//! Frame checks run before handing a sequence to the encoder.
//!
//! Every frame must decode far enough to report its size, and all sizes must
//! agree. Catching this here gives a clear error instead of an encoder log.

use std::path::Path;

use log::debug;
use rayon::prelude::*;
use serde::Serialize;

use crate::error::ConversionError;
use crate::validate::SequenceDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
}

impl FrameGeometry {
    /// Size after scaling to `width` with the aspect ratio kept. The height is
    /// rounded and never drops below one pixel.
    pub fn scaled_to_width(&self, width: u32) -> FrameGeometry {
        let height = if self.width == 0 {
            u64::from(self.height)
        } else {
            (u64::from(self.height) * u64::from(width) + u64::from(self.width) / 2)
                / u64::from(self.width)
        };
        FrameGeometry {
            width,
            height: height.clamp(1, u64::from(u32::MAX)) as u32,
        }
    }
}

fn read_geometry(path: &Path) -> Result<FrameGeometry, ConversionError> {
    let (width, height) =
        image::image_dimensions(path).map_err(|e| ConversionError::UnreadableFrame {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
    Ok(FrameGeometry { width, height })
}

/// Read every frame header in parallel and return the shared frame size.
pub fn inspect_frames(descriptor: &SequenceDescriptor) -> Result<FrameGeometry, ConversionError> {
    let sizes: Vec<(&Path, FrameGeometry)> = descriptor
        .frames()
        .par_iter()
        .map(|frame| {
            let path = frame.path.path();
            read_geometry(path).map(|geometry| (path, geometry))
        })
        .collect::<Result<_, _>>()?;

    let (_, expected) = sizes[0];
    if let Some((path, found)) = sizes.iter().find(|(_, geometry)| *geometry != expected) {
        return Err(ConversionError::InconsistentFrameSize {
            path: path.display().to_string(),
            expected: (expected.width, expected.height),
            found: (found.width, found.height),
        });
    }

    debug!(
        "{} frames checked, all {}x{}",
        sizes.len(),
        expected.width,
        expected.height
    );
    Ok(expected)
}

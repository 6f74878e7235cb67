//! Planar frame storage and borrowed input images.

use crate::error::{Error, Result};
use std::fmt;

/// Planar chroma layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum PixelFormat {
    /// Planar YUV 4:2:0 (1 Cr & Cb sample per 2x2 Y samples).
    #[default]
    Yuv420p,
    /// Planar YUV 4:2:2 (1 Cr & Cb sample per 2x1 Y samples).
    Yuv422p,
    /// Planar YUV 4:4:4.
    Yuv444p,
}

impl PixelFormat {
    /// Get the number of planes for this pixel format.
    pub fn num_planes(&self) -> usize {
        3
    }

    /// Get chroma subsampling factors (horizontal, vertical).
    pub fn chroma_subsampling(&self) -> (u32, u32) {
        match self {
            Self::Yuv420p => (2, 2),
            Self::Yuv422p => (2, 1),
            Self::Yuv444p => (1, 1),
        }
    }

    /// Dimensions of `plane` for a frame of `width` x `height` luma samples.
    pub fn plane_dimensions(&self, plane: usize, width: u32, height: u32) -> (u32, u32) {
        if plane == 0 {
            (width, height)
        } else {
            let (hsub, vsub) = self.chroma_subsampling();
            (width / hsub, height / vsub)
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Yuv420p => write!(f, "yuv420p"),
            Self::Yuv422p => write!(f, "yuv422p"),
            Self::Yuv444p => write!(f, "yuv444p"),
        }
    }
}

#[derive(Clone)]
struct PlaneData {
    data: Vec<u8>,
    width: u32,
    height: u32,
    stride: usize,
}

/// An owned three-plane pixel buffer with per-plane strides.
#[derive(Clone)]
pub struct FrameBuffer {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel format.
    pub format: PixelFormat,
    planes: Vec<PlaneData>,
}

impl FrameBuffer {
    /// Create a new frame buffer filled with zeros.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let planes = (0..format.num_planes())
            .map(|plane| {
                let (plane_width, plane_height) = format.plane_dimensions(plane, width, height);
                // Align stride to 32 bytes for SIMD-friendly rows
                let stride = (plane_width as usize + 31) & !31;
                PlaneData {
                    data: vec![0u8; stride * plane_height as usize],
                    width: plane_width,
                    height: plane_height,
                    stride,
                }
            })
            .collect();

        Self {
            width,
            height,
            format,
            planes,
        }
    }

    /// Get the number of planes.
    pub fn num_planes(&self) -> usize {
        self.planes.len()
    }

    /// Get a plane's data.
    pub fn plane(&self, index: usize) -> Option<&[u8]> {
        self.planes.get(index).map(|p| p.data.as_slice())
    }

    /// Get a mutable reference to a plane's data.
    pub fn plane_mut(&mut self, index: usize) -> Option<&mut [u8]> {
        self.planes.get_mut(index).map(|p| p.data.as_mut_slice())
    }

    /// Get the stride for a plane.
    pub fn stride(&self, plane: usize) -> usize {
        self.planes.get(plane).map(|p| p.stride).unwrap_or(0)
    }

    /// Get the dimensions of a plane.
    pub fn plane_dimensions(&self, plane: usize) -> (u32, u32) {
        self.planes
            .get(plane)
            .map(|p| (p.width, p.height))
            .unwrap_or((0, 0))
    }

    /// Fill all planes with a value.
    pub fn fill(&mut self, value: u8) {
        for plane in &mut self.planes {
            plane.data.fill(value);
        }
    }

    /// Copy pixel data from a buffer of identical geometry.
    pub fn copy_from(&mut self, other: &FrameBuffer) -> Result<()> {
        if self.width != other.width || self.height != other.height || self.format != other.format {
            return Err(Error::invalid_param(format!(
                "cannot copy {}x{} {} into {}x{} {}",
                other.width, other.height, other.format, self.width, self.height, self.format
            )));
        }

        for (dst, src) in self.planes.iter_mut().zip(other.planes.iter()) {
            dst.data.copy_from_slice(&src.data);
        }
        Ok(())
    }
}

impl fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("planes", &self.planes.len())
            .finish()
    }
}

/// A borrowed planar Y'CbCr image supplied by the caller.
///
/// Rows are stored top to bottom; strides may exceed the plane width.
#[derive(Debug, Clone, Copy)]
pub struct YuvImage<'a> {
    /// Luma width.
    pub y_width: u32,
    /// Luma height.
    pub y_height: u32,
    /// Luma stride in bytes.
    pub y_stride: usize,
    /// Chroma width.
    pub uv_width: u32,
    /// Chroma height.
    pub uv_height: u32,
    /// Chroma stride in bytes.
    pub uv_stride: usize,
    /// Luma samples.
    pub y: &'a [u8],
    /// Cb samples.
    pub u: &'a [u8],
    /// Cr samples.
    pub v: &'a [u8],
}

impl<'a> YuvImage<'a> {
    /// Wrap tightly packed 4:2:0 planes.
    pub fn new_420(width: u32, height: u32, y: &'a [u8], u: &'a [u8], v: &'a [u8]) -> Self {
        Self {
            y_width: width,
            y_height: height,
            y_stride: width as usize,
            uv_width: width / 2,
            uv_height: height / 2,
            uv_stride: (width / 2) as usize,
            y,
            u,
            v,
        }
    }

    /// Plane data, width, height and stride for `plane` (0 = Y, 1 = Cb, 2 = Cr).
    pub fn plane(&self, plane: usize) -> (&'a [u8], u32, u32, usize) {
        match plane {
            0 => (self.y, self.y_width, self.y_height, self.y_stride),
            1 => (self.u, self.uv_width, self.uv_height, self.uv_stride),
            _ => (self.v, self.uv_width, self.uv_height, self.uv_stride),
        }
    }

    /// Verify every plane slice covers its declared rows.
    pub fn check_planes(&self) -> Result<()> {
        for plane in 0..3 {
            let (data, width, height, stride) = self.plane(plane);
            if height == 0 {
                continue;
            }
            if stride < width as usize {
                return Err(Error::invalid_param(format!(
                    "plane {plane} stride {stride} is smaller than width {width}"
                )));
            }
            let needed = stride * (height as usize - 1) + width as usize;
            if data.len() < needed {
                return Err(Error::BufferTooSmall {
                    needed,
                    available: data.len(),
                });
            }
        }
        Ok(())
    }
}

//! Pixel normalization from raw transfer bytes into pooled buffers

use crate::error::{CaptureError, Result};

/// Pixels handled per iteration by [`rgba_to_rgb_blocked`]
pub const RGBA_BLOCK: usize = 8;

/// Bytes per pixel of a colour transfer.
///
/// Only tightly packed RGB (3) and RGBA (4) are accepted.
pub fn pixel_stride(bytes: usize, pixels: usize) -> Result<usize> {
    if pixels == 0 || bytes % pixels != 0 {
        return Err(CaptureError::UnsupportedStride { bytes, pixels });
    }
    match bytes / pixels {
        stride @ (3 | 4) => Ok(stride),
        _ => Err(CaptureError::UnsupportedStride { bytes, pixels }),
    }
}

/// Drop the alpha channel, one pixel at a time
pub fn rgba_to_rgb_scalar(src: &[u8], dst: &mut [u8]) {
    for (rgb, rgba) in dst.chunks_exact_mut(3).zip(src.chunks_exact(4)) {
        rgb.copy_from_slice(&rgba[..3]);
    }
}

/// Drop the alpha channel eight pixels at a time.
///
/// Produces exactly the same output as [`rgba_to_rgb_scalar`]; the block body
/// is unrolled so the compiler can keep it in registers.
pub fn rgba_to_rgb_blocked(src: &[u8], dst: &mut [u8]) {
    let pixels = (src.len() / 4).min(dst.len() / 3);
    let blocks = pixels / RGBA_BLOCK;

    let (src_blocks, src_tail) = src[..pixels * 4].split_at(blocks * RGBA_BLOCK * 4);
    let (dst_blocks, dst_tail) = dst[..pixels * 3].split_at_mut(blocks * RGBA_BLOCK * 3);

    for (out, inp) in dst_blocks
        .chunks_exact_mut(RGBA_BLOCK * 3)
        .zip(src_blocks.chunks_exact(RGBA_BLOCK * 4))
    {
        for p in 0..RGBA_BLOCK {
            out[p * 3] = inp[p * 4];
            out[p * 3 + 1] = inp[p * 4 + 1];
            out[p * 3 + 2] = inp[p * 4 + 2];
        }
    }

    rgba_to_rgb_scalar(src_tail, dst_tail);
}

/// Copy `pixels` pixels of stride 3 or 4 into packed RGB
pub fn copy_rgb(src: &[u8], stride: usize, dst: &mut [u8]) -> Result<()> {
    let pixels = dst.len() / 3;
    if src.len() < pixels * stride {
        return Err(CaptureError::UnsupportedStride {
            bytes: src.len(),
            pixels,
        });
    }
    match stride {
        3 => dst.copy_from_slice(&src[..pixels * 3]),
        4 => rgba_to_rgb_blocked(&src[..pixels * 4], dst),
        _ => {
            return Err(CaptureError::UnsupportedStride {
                bytes: src.len(),
                pixels,
            })
        }
    }
    Ok(())
}

/// Decode little-endian `f32` samples from `bytes` into `dst`.
///
/// Slots the transfer did not cover are filled with `pad`. Returns the number
/// of samples actually copied.
pub fn copy_depth_samples(bytes: &[u8], dst: &mut [f32], pad: f32) -> usize {
    let mut copied = 0;
    for (sample, raw) in dst.iter_mut().zip(bytes.chunks_exact(4)) {
        *sample = f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        copied += 1;
    }
    dst[copied..].fill(pad);
    copied
}

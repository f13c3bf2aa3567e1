//! Built-in converter for Apple CgBI-encoded PNG icons.
//!
//! CgBI files differ from standard PNGs in three ways: a proprietary `CgBI`
//! chunk precedes IHDR, the IDAT stream is raw DEFLATE with the zlib
//! wrapper stripped, and pixel data is stored byte-swapped (BGRA) with
//! premultiplied alpha. The converter reverses all three and re-encodes
//! the result through the standard PNG encoder.

use crate::error::{RepairError, Result};
use crate::png::{self, ChunkIter};
use flate2::read::DeflateDecoder;
use image::{DynamicImage, ImageFormat, RgbImage, RgbaImage};
use std::io::{Cursor, Read};

const COLOR_TYPE_RGB: u8 = 2;
const COLOR_TYPE_RGBA: u8 = 6;

#[derive(Debug, Clone, Copy)]
struct IconHeader {
    width: u32,
    height: u32,
    color_type: u8,
}

impl IconHeader {
    fn bytes_per_pixel(&self) -> usize {
        match self.color_type {
            COLOR_TYPE_RGB => 3,
            _ => 4,
        }
    }
}

/// Transforms CgBI-encoded bytes into a standards-compliant PNG.
///
/// Any parse, inflate, or pixel-layout error is reported as
/// [`RepairError::InvalidFormat`] so the caller can fall through to the
/// next repair strategy.
pub fn convert(data: &[u8]) -> Result<Vec<u8>> {
    if !png::is_cgbi(data) {
        return Err(RepairError::InvalidFormat(
            "no CgBI marker at the first chunk".into(),
        ));
    }

    let chunks = ChunkIter::new(data)
        .ok_or_else(|| RepairError::InvalidFormat("missing PNG signature".into()))?;

    let mut header: Option<IconHeader> = None;
    let mut idat = Vec::new();

    for chunk in chunks {
        match &chunk.chunk_type {
            b"CgBI" => {
                // The proprietary chunk carries Apple-specific flags; it is
                // dropped entirely.
            }
            b"IHDR" => {
                if !chunk.crc_valid() {
                    return Err(RepairError::InvalidFormat("IHDR CRC mismatch".into()));
                }
                header = Some(parse_ihdr(chunk.payload)?);
            }
            b"IDAT" => {
                if !chunk.crc_valid() {
                    return Err(RepairError::InvalidFormat("IDAT CRC mismatch".into()));
                }
                idat.extend_from_slice(chunk.payload);
            }
            b"IEND" => break,
            _ => {}
        }
    }

    let header = header.ok_or_else(|| RepairError::InvalidFormat("IHDR chunk missing".into()))?;
    if idat.is_empty() {
        return Err(RepairError::InvalidFormat("no IDAT data".into()));
    }

    let width = header.width as usize;
    let height = header.height as usize;
    let bpp = header.bytes_per_pixel();
    let scanline_len = width
        .checked_mul(bpp)
        .and_then(|s| s.checked_add(1))
        .ok_or_else(|| RepairError::InvalidFormat("image dimensions overflow".into()))?;
    let expected = scanline_len
        .checked_mul(height)
        .ok_or_else(|| RepairError::InvalidFormat("image dimensions overflow".into()))?;

    // Apple strips the zlib wrapper, so this is a raw DEFLATE stream. The
    // reader is capped at the scanline budget to keep hostile streams from
    // ballooning memory.
    let mut raw = Vec::with_capacity(expected);
    DeflateDecoder::new(&idat[..])
        .take(expected as u64 + 1)
        .read_to_end(&mut raw)
        .map_err(|e| RepairError::InvalidFormat(format!("raw inflate failed: {e}")))?;

    if raw.len() != expected {
        return Err(RepairError::InvalidFormat(format!(
            "decompressed {} bytes, expected {expected}",
            raw.len()
        )));
    }

    let mut pixels = unfilter_scanlines(&raw, width, height, bpp)?;
    normalize_pixels(&mut pixels, header.color_type);

    let img = match header.color_type {
        COLOR_TYPE_RGB => {
            RgbImage::from_raw(header.width, header.height, pixels).map(DynamicImage::ImageRgb8)
        }
        _ => {
            RgbaImage::from_raw(header.width, header.height, pixels).map(DynamicImage::ImageRgba8)
        }
    }
    .ok_or_else(|| RepairError::InvalidFormat("pixel buffer size mismatch".into()))?;

    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)?;
    Ok(out)
}

fn parse_ihdr(payload: &[u8]) -> Result<IconHeader> {
    if payload.len() != 13 {
        return Err(RepairError::InvalidFormat(format!(
            "IHDR payload is {} bytes, expected 13",
            payload.len()
        )));
    }

    let width = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
    let height = u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);
    let bit_depth = payload[8];
    let color_type = payload[9];
    let interlace = payload[12];

    if width == 0 || height == 0 {
        return Err(RepairError::InvalidFormat("zero image dimension".into()));
    }
    if bit_depth != 8 {
        return Err(RepairError::InvalidFormat(format!(
            "unsupported bit depth {bit_depth}"
        )));
    }
    if color_type != COLOR_TYPE_RGB && color_type != COLOR_TYPE_RGBA {
        return Err(RepairError::InvalidFormat(format!(
            "unsupported color type {color_type}"
        )));
    }
    if interlace != 0 {
        return Err(RepairError::InvalidFormat(
            "interlaced images are not supported".into(),
        ));
    }

    Ok(IconHeader {
        width,
        height,
        color_type,
    })
}

/// Reverses the per-scanline PNG filters, returning bare pixel rows without
/// the leading filter bytes.
fn unfilter_scanlines(raw: &[u8], width: usize, height: usize, bpp: usize) -> Result<Vec<u8>> {
    let stride = width * bpp;
    let mut out = vec![0u8; stride * height];

    for y in 0..height {
        let row_start = y * (stride + 1);
        let filter = raw[row_start];
        let src = &raw[row_start + 1..row_start + 1 + stride];

        let (done, rest) = out.split_at_mut(y * stride);
        let prev = &done[done.len().saturating_sub(stride)..];
        let cur = &mut rest[..stride];
        cur.copy_from_slice(src);

        let above = |prev: &[u8], i: usize| if prev.is_empty() { 0 } else { prev[i] };

        match filter {
            0 => {}
            1 => {
                for i in bpp..stride {
                    cur[i] = cur[i].wrapping_add(cur[i - bpp]);
                }
            }
            2 => {
                for i in 0..stride {
                    cur[i] = cur[i].wrapping_add(above(prev, i));
                }
            }
            3 => {
                for i in 0..stride {
                    let left = if i >= bpp { cur[i - bpp] } else { 0 };
                    let avg = ((left as u16 + above(prev, i) as u16) / 2) as u8;
                    cur[i] = cur[i].wrapping_add(avg);
                }
            }
            4 => {
                for i in 0..stride {
                    let left = if i >= bpp { cur[i - bpp] } else { 0 };
                    let up_left = if i >= bpp { above(prev, i - bpp) } else { 0 };
                    cur[i] = cur[i].wrapping_add(paeth_predictor(left, above(prev, i), up_left));
                }
            }
            other => {
                return Err(RepairError::InvalidFormat(format!(
                    "unknown scanline filter {other} in row {y}"
                )));
            }
        }
    }

    Ok(out)
}

/// Scalar Paeth predictor. The PNG standard mandates the order of these
/// comparisons; it must not be rearranged.
#[inline]
fn paeth_predictor(a: u8, b: u8, c: u8) -> u8 {
    let a = a as i16;
    let b = b as i16;
    let c = c as i16;

    let p = a + b - c;
    let pa = (p - a).abs();
    let pb = (p - b).abs();
    let pc = (p - c).abs();

    if pa <= pb && pa <= pc {
        a as u8
    } else if pb <= pc {
        b as u8
    } else {
        c as u8
    }
}

/// Swaps the BGR(A) byte order back to RGB(A) and reverses Apple's alpha
/// premultiplication.
fn normalize_pixels(pixels: &mut [u8], color_type: u8) {
    if color_type == COLOR_TYPE_RGB {
        for px in pixels.chunks_exact_mut(3) {
            px.swap(0, 2);
        }
        return;
    }

    for px in pixels.chunks_exact_mut(4) {
        px.swap(0, 2);
        let alpha = px[3];
        if alpha > 0 && alpha < 255 {
            for c in &mut px[..3] {
                *c = ((*c as u32 * 255) / alpha as u32).min(255) as u8;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_rejects_non_cgbi_bytes() {
        let err = convert(&[0u8; 64]).unwrap_err();
        assert!(matches!(err, RepairError::InvalidFormat(_)));
    }

    #[test]
    fn test_convert_rejects_marker_without_signature() {
        let mut data = vec![0u8; 64];
        data[12..16].copy_from_slice(b"CgBI");

        let err = convert(&data).unwrap_err();
        assert!(matches!(err, RepairError::InvalidFormat(_)));
    }

    #[test]
    fn test_paeth_predictor_known_cases() {
        assert_eq!(paeth_predictor(0, 0, 0), 0);
        assert_eq!(paeth_predictor(10, 20, 10), 20);
        assert_eq!(paeth_predictor(20, 10, 10), 20);
        assert_eq!(paeth_predictor(100, 200, 255), 100);
    }

    #[test]
    fn test_unfilter_sub_row() {
        // 2x1 RGBA row, Sub-filtered: second pixel stores deltas.
        let raw = [1u8, 10, 20, 30, 40, 5, 5, 5, 5];
        let pixels = unfilter_scanlines(&raw, 2, 1, 4).unwrap();
        assert_eq!(pixels, [10, 20, 30, 40, 15, 25, 35, 45]);
    }

    #[test]
    fn test_unfilter_rejects_unknown_filter() {
        let raw = [9u8, 0, 0, 0, 0];
        let err = unfilter_scanlines(&raw, 1, 1, 4).unwrap_err();
        assert!(matches!(err, RepairError::InvalidFormat(_)));
    }

    #[test]
    fn test_normalize_swaps_and_unpremultiplies() {
        // BGRA (128, 0, 128, 128): premultiplied magenta at half alpha.
        let mut pixels = [128u8, 0, 128, 128];
        normalize_pixels(&mut pixels, COLOR_TYPE_RGBA);
        assert_eq!(pixels, [255, 0, 255, 128]);
    }

    #[test]
    fn test_normalize_leaves_opaque_pixels() {
        let mut pixels = [10u8, 20, 30, 255];
        normalize_pixels(&mut pixels, COLOR_TYPE_RGBA);
        assert_eq!(pixels, [30, 20, 10, 255]);
    }
}

//! End-to-end tests for the built-in CgBI converter, driven by synthetic
//! CgBI files assembled byte-by-byte: raw-DEFLATE IDAT, BGRA byte order,
//! premultiplied alpha.

use flate2::Compression;
use flate2::write::DeflateEncoder;
use iconfix_core::{RepairError, cgbi, png};
use std::io::Write;

const CGBI_FLAGS: [u8; 4] = [0x50, 0x00, 0x20, 0x02];

fn push_chunk(out: &mut Vec<u8>, chunk_type: &[u8; 4], payload: &[u8]) {
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(chunk_type);
    out.extend_from_slice(payload);
    out.extend_from_slice(&png::chunk_crc(chunk_type, payload).to_be_bytes());
}

fn ihdr_payload(width: u32, height: u32, color_type: u8, interlace: u8) -> [u8; 13] {
    let mut payload = [0u8; 13];
    payload[..4].copy_from_slice(&width.to_be_bytes());
    payload[4..8].copy_from_slice(&height.to_be_bytes());
    payload[8] = 8;
    payload[9] = color_type;
    payload[12] = interlace;
    payload
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let (a, b, c) = (a as i16, b as i16, c as i16);
    let p = a + b - c;
    let (pa, pb, pc) = ((p - a).abs(), (p - b).abs(), (p - c).abs());
    if pa <= pb && pa <= pc {
        a as u8
    } else if pb <= pc {
        b as u8
    } else {
        c as u8
    }
}

/// Forward-filters pixel rows the way an encoder would, applying the same
/// filter type to every scanline.
fn filter_rows(rows: &[Vec<u8>], bpp: usize, filter: u8) -> Vec<u8> {
    let zero = vec![0u8; rows[0].len()];
    let mut out = Vec::new();
    let mut prev: &[u8] = &zero;

    for row in rows {
        out.push(filter);
        for (i, &x) in row.iter().enumerate() {
            let a = if i >= bpp { row[i - bpp] } else { 0 };
            let b = prev[i];
            let c = if i >= bpp { prev[i - bpp] } else { 0 };
            let predicted = match filter {
                0 => 0,
                1 => a,
                2 => b,
                3 => ((a as u16 + b as u16) / 2) as u8,
                4 => paeth(a, b, c),
                other => panic!("fixture uses unknown filter {other}"),
            };
            out.push(x.wrapping_sub(predicted));
        }
        prev = row;
    }

    out
}

fn deflate_raw(data: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn assemble_cgbi(ihdr: &[u8; 13], idat: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&png::PNG_SIGNATURE);
    push_chunk(&mut out, &png::CGBI, &CGBI_FLAGS);
    push_chunk(&mut out, &png::IHDR, ihdr);
    push_chunk(&mut out, &png::IDAT, idat);
    push_chunk(&mut out, &png::IEND, &[]);
    out
}

/// Builds a 2x2 CgBI RGBA icon. Channel values are kept at 0 or 255 so the
/// premultiply/unpremultiply pair round-trips exactly.
fn build_rgba_cgbi(filter: u8) -> (Vec<u8>, Vec<[u8; 4]>) {
    let source: [[u8; 4]; 4] = [
        [255, 0, 0, 255],
        [0, 255, 0, 255],
        [0, 0, 255, 128],
        [255, 255, 255, 0],
    ];

    let rows: Vec<Vec<u8>> = source
        .chunks(2)
        .map(|row| {
            row.iter()
                .flat_map(|&[r, g, b, a]| {
                    let premul = |c: u8| ((c as u16 * a as u16) / 255) as u8;
                    [premul(b), premul(g), premul(r), a]
                })
                .collect()
        })
        .collect();

    let idat = deflate_raw(&filter_rows(&rows, 4, filter));
    let file = assemble_cgbi(&ihdr_payload(2, 2, 6, 0), &idat);

    // Fully transparent pixels lose their color channels to the
    // premultiplication; everything else survives exactly.
    let expected = vec![
        [255, 0, 0, 255],
        [0, 255, 0, 255],
        [0, 0, 255, 128],
        [0, 0, 0, 0],
    ];

    (file, expected)
}

fn decoded_rgba_pixels(data: &[u8]) -> Vec<[u8; 4]> {
    image::load_from_memory(data)
        .expect("converted bytes must decode as a standard PNG")
        .to_rgba8()
        .pixels()
        .map(|p| p.0)
        .collect()
}

#[test]
fn test_convert_unfiltered_rgba() {
    let (file, expected) = build_rgba_cgbi(0);

    let converted = cgbi::convert(&file).unwrap();
    assert!(!png::is_cgbi(&converted));
    assert_eq!(decoded_rgba_pixels(&converted), expected);
}

#[test]
fn test_convert_handles_every_filter_type() {
    for filter in 1..=4u8 {
        let (file, expected) = build_rgba_cgbi(filter);

        let converted = cgbi::convert(&file).unwrap();
        assert_eq!(
            decoded_rgba_pixels(&converted),
            expected,
            "filter type {filter}"
        );
    }
}

#[test]
fn test_convert_rgb_color_type() {
    // 2x1 RGB, stored as BGR in the CgBI stream.
    let rows = vec![vec![30u8, 20, 10, 60, 50, 40]];
    let idat = deflate_raw(&filter_rows(&rows, 3, 0));
    let file = assemble_cgbi(&ihdr_payload(2, 1, 2, 0), &idat);

    let converted = cgbi::convert(&file).unwrap();
    let pixels = decoded_rgba_pixels(&converted);
    assert_eq!(pixels, vec![[10, 20, 30, 255], [40, 50, 60, 255]]);
}

#[test]
fn test_convert_rejects_interlaced() {
    let rows = vec![vec![0u8; 8]; 2];
    let idat = deflate_raw(&filter_rows(&rows, 4, 0));
    let file = assemble_cgbi(&ihdr_payload(2, 2, 6, 1), &idat);

    let err = cgbi::convert(&file).unwrap_err();
    assert!(matches!(err, RepairError::InvalidFormat(_)));
}

#[test]
fn test_convert_rejects_garbage_idat() {
    let file = assemble_cgbi(&ihdr_payload(2, 2, 6, 0), &[0xDE, 0xAD, 0xBE, 0xEF]);

    let err = cgbi::convert(&file).unwrap_err();
    assert!(matches!(err, RepairError::InvalidFormat(_)));
}

#[test]
fn test_convert_rejects_short_pixel_data() {
    // Valid raw-DEFLATE stream that inflates to half a scanline.
    let idat = deflate_raw(&[0u8; 5]);
    let file = assemble_cgbi(&ihdr_payload(2, 2, 6, 0), &idat);

    let err = cgbi::convert(&file).unwrap_err();
    assert!(matches!(err, RepairError::InvalidFormat(_)));
}

#[test]
fn test_convert_rejects_missing_ihdr() {
    let mut out = Vec::new();
    out.extend_from_slice(&png::PNG_SIGNATURE);
    push_chunk(&mut out, &png::CGBI, &CGBI_FLAGS);
    push_chunk(&mut out, &png::IEND, &[]);

    let err = cgbi::convert(&out).unwrap_err();
    assert!(matches!(err, RepairError::InvalidFormat(_)));
}

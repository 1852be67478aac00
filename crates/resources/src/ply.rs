//! Gaussian-splat PLY loading.
//!
//! Only the binary little-endian layout written by 3D Gaussian Splatting
//! training is supported: one `vertex` element of 62 float properties
//! (`x y z`, `nx ny nz`, `f_dc_*`, `f_rest_*`, `opacity`, `scale_*`,
//! `rot_*`), stored as packed [`SplatPoint`] records right after
//! `end_header`.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use bytemuck::{Pod, Zeroable};
use tracing::{info, warn};

use crate::error::{ResourceError, ResourceResult};

/// Spherical harmonics degree stored per splat.
pub const SH_DEGREE: usize = 3;
/// Number of SH coefficients: `(degree + 1)^2` per colour channel.
pub const SH_COEFFICIENTS: usize = (SH_DEGREE + 1) * (SH_DEGREE + 1) * 3;

/// One splat as stored on disk. Activations (exp, sigmoid, normalize) are
/// not applied yet.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct SplatPoint {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    /// DC terms first (`sh[0..3]`), then the higher-order rest.
    pub sh: [f32; SH_COEFFICIENTS],
    /// Opacity before the sigmoid.
    pub opacity: f32,
    /// Log-space scale per axis.
    pub scale: [f32; 3],
    /// Unnormalized rotation quaternion, `w` first.
    pub rotation: [f32; 4],
}

/// Size of one packed record on disk.
pub const SPLAT_POINT_SIZE: usize = std::mem::size_of::<SplatPoint>();
const SPLAT_PROPERTY_COUNT: usize = SPLAT_POINT_SIZE / std::mem::size_of::<f32>();

const _: () = assert!(SPLAT_POINT_SIZE == 248);

/// Upper bound on the body buffer reserved from the header's vertex count.
const MAX_PREALLOCATED_BYTES: usize = 64 * 1024 * 1024;

/// Parsed header fields that matter for reading the body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlyHeader {
    pub vertex_count: usize,
    /// Number of `property` lines, or `None` if the header lists none.
    pub property_count: Option<usize>,
}

fn read_header_line<R: BufRead>(reader: &mut R, line: &mut String) -> ResourceResult<bool> {
    line.clear();
    if reader.read_line(line)? == 0 {
        return Ok(false);
    }
    let trimmed = line.trim_end_matches(['\r', '\n']).len();
    line.truncate(trimmed);
    Ok(true)
}

/// Reads the header up to and including `end_header`.
///
/// The first two lines must be `ply` and `format binary_little_endian 1.0`.
/// `comment` and `obj_info` lines may precede `element vertex <N>`, and `N`
/// must be positive.
pub fn read_header<R: BufRead>(reader: &mut R) -> ResourceResult<PlyHeader> {
    let mut line = String::new();

    if !read_header_line(reader, &mut line)? || line != "ply" {
        return Err(ResourceError::InvalidPly(
            "file does not start with 'ply'".to_string(),
        ));
    }

    if !read_header_line(reader, &mut line)? || line != "format binary_little_endian 1.0" {
        return Err(ResourceError::InvalidPly(format!(
            "unsupported format line '{line}'"
        )));
    }

    loop {
        if !read_header_line(reader, &mut line)? {
            return Err(ResourceError::InvalidPly(
                "header ended before 'element vertex'".to_string(),
            ));
        }
        if !(line.starts_with("comment") || line.starts_with("obj_info")) {
            break;
        }
    }

    let mut parts = line.split_whitespace();
    let vertex_count = match (parts.next(), parts.next(), parts.next()) {
        (Some("element"), Some("vertex"), Some(count)) => count.parse::<usize>().ok(),
        _ => None,
    };
    let vertex_count = match vertex_count {
        Some(count) if count > 0 => count,
        _ => {
            return Err(ResourceError::InvalidPly(format!(
                "expected 'element vertex <N>' with N > 0, got '{line}'"
            )));
        }
    };

    let mut properties = 0;
    loop {
        if !read_header_line(reader, &mut line)? {
            return Err(ResourceError::InvalidPly(
                "missing 'end_header'".to_string(),
            ));
        }
        if line == "end_header" {
            break;
        }
        if line.starts_with("property") {
            properties += 1;
        }
    }

    Ok(PlyHeader {
        vertex_count,
        property_count: (properties > 0).then_some(properties),
    })
}

/// Parses a splat PLY from any reader.
///
/// A body shorter than the header promises is not an error: the complete
/// records are kept and a warning is logged.
pub fn parse_splats<R: BufRead>(mut reader: R) -> ResourceResult<Vec<SplatPoint>> {
    let header = read_header(&mut reader)?;

    if let Some(properties) = header.property_count
        && properties != SPLAT_PROPERTY_COUNT
    {
        return Err(ResourceError::InvalidPly(format!(
            "expected {SPLAT_PROPERTY_COUNT} vertex properties, found {properties}"
        )));
    }

    let expected_bytes = header
        .vertex_count
        .checked_mul(SPLAT_POINT_SIZE)
        .ok_or_else(|| {
            ResourceError::InvalidPly(format!(
                "vertex count {} is too large",
                header.vertex_count
            ))
        })?;

    let mut body = Vec::with_capacity(expected_bytes.min(MAX_PREALLOCATED_BYTES));
    reader
        .take(expected_bytes as u64)
        .read_to_end(&mut body)?;

    let points: Vec<SplatPoint> = body
        .chunks_exact(SPLAT_POINT_SIZE)
        .map(bytemuck::pod_read_unaligned)
        .collect();

    if points.len() < header.vertex_count {
        warn!(
            "Could only read {} of {} splats; keeping the complete records",
            points.len(),
            header.vertex_count
        );
    }

    Ok(points)
}

/// Loads a splat PLY file.
///
/// # Errors
///
/// [`ResourceError::Io`] if the file cannot be read, [`ResourceError::InvalidPly`]
/// for an unsupported header and [`ResourceError::Empty`] if not a single
/// complete record follows the header.
pub fn load_splats(path: &Path) -> ResourceResult<Vec<SplatPoint>> {
    let file = File::open(path)?;
    let points = parse_splats(BufReader::new(file))?;

    if points.is_empty() {
        return Err(ResourceError::Empty(path.to_path_buf()));
    }

    info!("'{}' contains {} splats", path.display(), points.len());
    Ok(points)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn splat(seed: f32) -> SplatPoint {
        let mut point = SplatPoint::zeroed();
        point.position = [seed, seed + 1.0, seed + 2.0];
        point.sh[0] = 0.25;
        point.sh[1] = 0.5;
        point.sh[2] = 0.75;
        point.scale = [0.0, -1.0, 1.0];
        point.rotation = [2.0, 0.0, 0.0, 0.0];
        point.opacity = seed;
        point
    }

    pub fn ply_bytes(declared: usize, points: &[SplatPoint]) -> Vec<u8> {
        let mut bytes = format!(
            "ply\nformat binary_little_endian 1.0\ncomment generated\nelement vertex {declared}\n"
        )
        .into_bytes();
        for i in 0..SPLAT_PROPERTY_COUNT {
            bytes.extend_from_slice(format!("property float f_{i}\n").as_bytes());
        }
        bytes.extend_from_slice(b"end_header\n");
        for point in points {
            bytes.extend_from_slice(bytemuck::bytes_of(point));
        }
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{ply_bytes, splat};
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_record_layout() {
        assert_eq!(SPLAT_POINT_SIZE, 248);
        assert_eq!(SH_COEFFICIENTS, 48);
        assert_eq!(std::mem::offset_of!(SplatPoint, sh), 24);
        assert_eq!(std::mem::offset_of!(SplatPoint, opacity), 216);
        assert_eq!(std::mem::offset_of!(SplatPoint, scale), 220);
        assert_eq!(std::mem::offset_of!(SplatPoint, rotation), 232);
    }

    #[test]
    fn test_parse_round_trip() {
        let points = vec![splat(1.0), splat(2.0), splat(3.0)];
        let parsed = parse_splats(Cursor::new(ply_bytes(3, &points))).unwrap();
        assert_eq!(parsed, points);
    }

    #[test]
    fn test_short_body_keeps_complete_records() {
        let points = vec![splat(1.0), splat(2.0)];
        let mut bytes = ply_bytes(5, &points);
        bytes.extend_from_slice(&[0u8; 100]);

        let parsed = parse_splats(Cursor::new(bytes)).unwrap();
        assert_eq!(parsed, points);
    }

    #[test]
    fn test_extra_trailing_bytes_are_ignored() {
        let points = vec![splat(1.0)];
        let mut bytes = ply_bytes(1, &points);
        bytes.extend_from_slice(bytemuck::bytes_of(&splat(9.0)));

        assert_eq!(parse_splats(Cursor::new(bytes)).unwrap().len(), 1);
    }

    #[test]
    fn test_rejects_bad_magic() {
        let err = parse_splats(Cursor::new(b"plyx\n".to_vec())).unwrap_err();
        assert!(matches!(err, ResourceError::InvalidPly(_)));
    }

    #[test]
    fn test_rejects_ascii_format() {
        let bytes = b"ply\nformat ascii 1.0\nelement vertex 1\nend_header\n".to_vec();
        assert!(matches!(
            parse_splats(Cursor::new(bytes)),
            Err(ResourceError::InvalidPly(_))
        ));
    }

    #[test]
    fn test_rejects_zero_vertices() {
        let bytes =
            b"ply\nformat binary_little_endian 1.0\nelement vertex 0\nend_header\n".to_vec();
        assert!(matches!(
            parse_splats(Cursor::new(bytes)),
            Err(ResourceError::InvalidPly(_))
        ));
    }

    #[test]
    fn test_rejects_wrong_property_count() {
        let bytes = b"ply\nformat binary_little_endian 1.0\nelement vertex 1\nproperty float x\nend_header\n".to_vec();
        assert!(matches!(
            parse_splats(Cursor::new(bytes)),
            Err(ResourceError::InvalidPly(_))
        ));
    }

    #[test]
    fn test_huge_vertex_count_is_not_preallocated() {
        let bytes = b"ply\nformat binary_little_endian 1.0\nelement vertex 100000000000000\nend_header\n".to_vec();
        let parsed = parse_splats(Cursor::new(bytes)).unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn test_rejects_overflowing_vertex_count() {
        let bytes = format!(
            "ply\nformat binary_little_endian 1.0\nelement vertex {}\nend_header\n",
            usize::MAX
        )
        .into_bytes();
        assert!(matches!(
            parse_splats(Cursor::new(bytes)),
            Err(ResourceError::InvalidPly(_))
        ));
    }

    #[test]
    fn test_missing_end_header() {
        let bytes = b"ply\nformat binary_little_endian 1.0\nelement vertex 2\n".to_vec();
        assert!(matches!(
            parse_splats(Cursor::new(bytes)),
            Err(ResourceError::InvalidPly(_))
        ));
    }

    #[test]
    fn test_header_accepts_crlf() {
        let bytes =
            b"ply\r\nformat binary_little_endian 1.0\r\nelement vertex 7\r\nend_header\r\n".to_vec();
        let header = read_header(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(
            header,
            PlyHeader {
                vertex_count: 7,
                property_count: None
            }
        );
    }
}

//! Loading assets from files on disk.

use std::io::Write;
use std::path::PathBuf;

use starlight_core::SplatFilter;
use starlight_resources::{MeshData, ResourceError, SplatPoint, SplatStreams, load_splats};

struct TempFile(PathBuf);

impl TempFile {
    fn new(name: &str, contents: &[u8]) -> Self {
        let path = std::env::temp_dir().join(format!("starlight-{}-{name}", std::process::id()));
        let mut file = std::fs::File::create(&path).expect("Failed to create temp file");
        file.write_all(contents).expect("Failed to write temp file");
        Self(path)
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

fn splat_ply(points: &[SplatPoint]) -> Vec<u8> {
    let mut bytes = format!(
        "ply\nformat binary_little_endian 1.0\nelement vertex {}\n",
        points.len()
    )
    .into_bytes();
    for name in ["x", "y", "z", "nx", "ny", "nz"] {
        bytes.extend_from_slice(format!("property float {name}\n").as_bytes());
    }
    for i in 0..3 {
        bytes.extend_from_slice(format!("property float f_dc_{i}\n").as_bytes());
    }
    for i in 0..45 {
        bytes.extend_from_slice(format!("property float f_rest_{i}\n").as_bytes());
    }
    bytes.extend_from_slice(b"property float opacity\n");
    for i in 0..3 {
        bytes.extend_from_slice(format!("property float scale_{i}\n").as_bytes());
    }
    for i in 0..4 {
        bytes.extend_from_slice(format!("property float rot_{i}\n").as_bytes());
    }
    bytes.extend_from_slice(b"end_header\n");
    for point in points {
        bytes.extend_from_slice(bytemuck::bytes_of(point));
    }
    bytes
}

#[test]
fn test_load_splat_file() {
    let points: Vec<SplatPoint> = (0..1000)
        .map(|i| {
            let mut point: SplatPoint = bytemuck::Zeroable::zeroed();
            point.position = [i as f32, 0.0, 0.0];
            point.rotation = [1.0, 0.0, 0.0, 0.0];
            point
        })
        .collect();
    let file = TempFile::new("cloud.ply", &splat_ply(&points));

    let loaded = load_splats(&file.0).expect("Failed to load splats");
    assert_eq!(loaded.len(), 1000);
    assert_eq!(loaded[999].position, [999.0, 0.0, 0.0]);

    let streams = SplatStreams::extract(&loaded, &SplatFilter::default());
    assert_eq!(streams.len(), 1000);
}

#[test]
fn test_empty_and_truncated_files() {
    let file = TempFile::new("empty.ply", b"");
    assert!(matches!(
        load_splats(&file.0),
        Err(ResourceError::InvalidPly(_))
    ));

    let truncated = String::from_utf8(splat_ply(&[]))
        .unwrap()
        .replace("element vertex 0", "element vertex 4")
        .into_bytes();
    let file = TempFile::new("truncated.ply", &truncated);
    assert!(matches!(load_splats(&file.0), Err(ResourceError::Empty(_))));
}

#[test]
fn test_missing_splat_file() {
    let result = load_splats(std::path::Path::new("does/not/exist.ply"));
    assert!(matches!(result, Err(ResourceError::Io(_))));
}

#[test]
fn test_load_obj_quad() {
    let obj = b"v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nvn 0 0 1\nf 1//1 2//1 3//1 4//1\n";
    let file = TempFile::new("quad.obj", obj);

    let mesh = MeshData::load_obj(&file.0).expect("Failed to load OBJ");
    assert_eq!(mesh.indices.len(), 6);
    assert_eq!(mesh.vertices.len(), 4);
    assert!(mesh.vertices.iter().all(|v| v.normal.z == 1.0));
    assert!(mesh.vertices.iter().all(|v| v.color == glam::Vec3::ONE));
}

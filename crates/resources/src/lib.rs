//! CPU-side asset loading.
//!
//! - [`ply`]: Gaussian-splat PLY files into packed [`SplatPoint`] records
//! - [`splat`]: activation and filtering into per-attribute streams
//! - [`mesh`]: OBJ meshes and the built-in cube

mod error;
pub mod mesh;
pub mod ply;
pub mod splat;

pub use error::{ResourceError, ResourceResult};
pub use mesh::{MeshBuilder, MeshData, MeshVertex};
pub use ply::{SPLAT_POINT_SIZE, SplatPoint, load_splats, parse_splats};
pub use splat::{SplatStreams, filter_points, sigmoid};

//! Scene state: camera, transforms, game objects and the movement controller.

pub mod camera;
pub mod controller;
pub mod game_object;
pub mod transform;

pub use camera::Camera;
pub use controller::{KeyMappings, KeyboardMovementController};
pub use game_object::{GameObject, GameObjectId, GameObjectMap, PointLightComponent};
pub use transform::TransformComponent;

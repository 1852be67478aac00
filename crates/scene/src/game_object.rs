//! Game objects keyed by id.
//!
//! The GPU model type is a parameter so this crate stays free of Vulkan.

use std::collections::BTreeMap;
use std::sync::Arc;

use glam::Vec3;

use crate::transform::TransformComponent;

pub type GameObjectId = u32;

/// Marks an object as a point light.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointLightComponent {
    pub light_intensity: f32,
}

impl Default for PointLightComponent {
    fn default() -> Self {
        Self {
            light_intensity: 1.0,
        }
    }
}

/// Scene entity with a transform, a colour and optional model or light.
#[derive(Debug)]
pub struct GameObject<M> {
    id: GameObjectId,
    pub transform: TransformComponent,
    pub color: Vec3,
    pub model: Option<Arc<M>>,
    pub point_light: Option<PointLightComponent>,
}

impl<M> GameObject<M> {
    #[inline]
    pub fn id(&self) -> GameObjectId {
        self.id
    }

    pub fn with_model(mut self, model: Arc<M>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_transform(mut self, transform: TransformComponent) -> Self {
        self.transform = transform;
        self
    }

    pub fn is_point_light(&self) -> bool {
        self.point_light.is_some()
    }
}

/// Owns game objects and hands out increasing ids.
///
/// Iteration is in id order, so render systems see objects in creation order.
#[derive(Debug)]
pub struct GameObjectMap<M> {
    objects: BTreeMap<GameObjectId, GameObject<M>>,
    next_id: GameObjectId,
}

impl<M> Default for GameObjectMap<M> {
    fn default() -> Self {
        Self {
            objects: BTreeMap::new(),
            next_id: 0,
        }
    }
}

impl<M> GameObjectMap<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an object at the origin and returns a mutable reference to it.
    pub fn create(&mut self) -> &mut GameObject<M> {
        let id = self.next_id;
        self.next_id += 1;
        self.objects.entry(id).or_insert(GameObject {
            id,
            transform: TransformComponent::default(),
            color: Vec3::ONE,
            model: None,
            point_light: None,
        })
    }

    /// Creates a point light; the transform's X scale is its radius.
    pub fn create_point_light(
        &mut self,
        intensity: f32,
        radius: f32,
        color: Vec3,
    ) -> &mut GameObject<M> {
        let object = self.create();
        object.color = color;
        object.transform.scale.x = radius;
        object.point_light = Some(PointLightComponent {
            light_intensity: intensity,
        });
        object
    }

    pub fn get(&self, id: GameObjectId) -> Option<&GameObject<M>> {
        self.objects.get(&id)
    }

    pub fn get_mut(&mut self, id: GameObjectId) -> Option<&mut GameObject<M>> {
        self.objects.get_mut(&id)
    }

    pub fn remove(&mut self, id: GameObjectId) -> Option<GameObject<M>> {
        self.objects.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GameObject<M>> {
        self.objects.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut GameObject<M>> {
        self.objects.values_mut()
    }

    pub fn point_lights(&self) -> impl Iterator<Item = (&GameObject<M>, PointLightComponent)> {
        self.objects
            .values()
            .filter_map(|object| object.point_light.map(|light| (object, light)))
    }

    pub fn point_lights_mut(&mut self) -> impl Iterator<Item = &mut GameObject<M>> {
        self.objects
            .values_mut()
            .filter(|object| object.point_light.is_some())
    }
}

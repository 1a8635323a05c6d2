//! Scene management
//!
//! A [`Scene`] is a node arena. Every node is owned by its parent (or is a
//! root), carries a local transform and optionally a renderable or a light.
//! World transforms are derived top-down during [`Scene::traverse`] and are not
//! stored.

mod camera;
mod light;
mod transform;

pub use camera::*;
pub use light::*;
pub use transform::*;

use crate::resources::{Arena, GeometryId, Handle, MaterialId};
use glam::{Mat4, Vec3};

/// Maximum number of joint matrices a skinned renderable can carry
pub const MAX_JOINTS: usize = 16;

/// Geometry drawn with a material
#[derive(Debug, Clone)]
pub struct Renderable {
    pub geometry: GeometryId,
    pub material: MaterialId,
    /// Joint matrices; presence selects the skinning program variant
    pub joints: Option<Vec<Mat4>>,
}

impl Renderable {
    pub fn new(geometry: GeometryId, material: MaterialId) -> Self {
        Self {
            geometry,
            material,
            joints: None,
        }
    }

    pub fn with_joints(mut self, joints: Vec<Mat4>) -> Self {
        if joints.len() > MAX_JOINTS {
            log::warn!(
                "Renderable has {} joints, only the first {} are used",
                joints.len(),
                MAX_JOINTS
            );
        }
        self.joints = Some(joints);
        self
    }
}

/// A node in the scene graph
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub transform: Transform,
    pub renderable: Option<Renderable>,
    pub light: Option<Light>,
    /// Invisible nodes are skipped together with their subtree
    pub visible: bool,
    pub cast_shadow: bool,
}

impl Node {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            transform: Transform::default(),
            renderable: None,
            light: None,
            visible: true,
            cast_shadow: true,
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.transform.position = position;
        self
    }

    pub fn with_renderable(mut self, geometry: GeometryId, material: MaterialId) -> Self {
        self.renderable = Some(Renderable::new(geometry, material));
        self
    }

    pub fn with_light(mut self, light: Light) -> Self {
        self.light = Some(light);
        self
    }

    pub fn with_cast_shadow(mut self, cast_shadow: bool) -> Self {
        self.cast_shadow = cast_shadow;
        self
    }
}

/// Arena slot: a node and its links
pub struct SceneNode {
    node: Node,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

pub type NodeId = Handle<SceneNode>;

/// The scene graph
pub struct Scene {
    nodes: Arena<SceneNode>,
    roots: Vec<NodeId>,
    camera: Option<Camera>,
    pub ambient_light: Vec3,
}

impl Default for Scene {
    fn default() -> Self {
        Self {
            nodes: Arena::default(),
            roots: Vec::new(),
            camera: None,
            ambient_light: Vec3::new(0.03, 0.03, 0.03),
        }
    }
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node under `parent`, or as a root
    ///
    /// A parent that no longer exists is reported and the node becomes a root.
    pub fn add_node(&mut self, parent: Option<NodeId>, node: Node) -> NodeId {
        let parent = parent.filter(|p| {
            let exists = self.nodes.contains(*p);
            if !exists {
                log::warn!("Parent node {:?} does not exist, adding '{}' as a root", p, node.name);
            }
            exists
        });

        let id = self.nodes.insert(SceneNode {
            node,
            parent,
            children: Vec::new(),
        });
        match parent.and_then(|p| self.nodes.get_mut(p)) {
            Some(p) => p.children.push(id),
            None => self.roots.push(id),
        }
        id
    }

    /// Remove a node together with its subtree, returning the node itself
    pub fn remove_node(&mut self, id: NodeId) -> Option<Node> {
        let removed = self.nodes.remove(id)?;
        match removed.parent.and_then(|p| self.nodes.get_mut(p)) {
            Some(parent) => parent.children.retain(|c| *c != id),
            None => self.roots.retain(|r| *r != id),
        }

        let mut stack = removed.children;
        while let Some(child) = stack.pop() {
            if let Some(entry) = self.nodes.remove(child) {
                stack.extend(entry.children);
            }
        }
        Some(removed.node)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id).map(|n| &n.node)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id).map(|n| &mut n.node)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|n| n.parent)
    }

    /// Children in insertion order
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn set_camera(&mut self, camera: Option<Camera>) {
        self.camera = camera;
    }

    pub fn active_camera(&self) -> Option<&Camera> {
        self.camera.as_ref()
    }

    pub fn active_camera_mut(&mut self) -> Option<&mut Camera> {
        self.camera.as_mut()
    }

    /// Depth-first walk over visible nodes with their world transform
    ///
    /// Roots and children are visited in insertion order.
    pub fn traverse<'s>(&'s self, mut visitor: impl FnMut(NodeId, &'s Node, &Mat4)) {
        let mut stack: Vec<(NodeId, Mat4)> = self
            .roots
            .iter()
            .rev()
            .map(|r| (*r, Mat4::IDENTITY))
            .collect();

        while let Some((id, parent_world)) = stack.pop() {
            let Some(entry) = self.nodes.get(id) else {
                continue;
            };
            if !entry.node.visible {
                continue;
            }
            let world = parent_world * entry.node.transform.matrix();
            visitor(id, &entry.node, &world);
            stack.extend(entry.children.iter().rev().map(|c| (*c, world)));
        }
    }

    /// World transform of a single node
    pub fn world_transform(&self, id: NodeId) -> Option<Mat4> {
        let mut world = self.nodes.get(id)?.node.transform.matrix();
        let mut current = self.parent(id);
        while let Some(parent) = current {
            let entry = self.nodes.get(parent)?;
            world = entry.node.transform.matrix() * world;
            current = entry.parent;
        }
        Some(world)
    }
}

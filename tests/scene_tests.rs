//! Scene Graph Tests
//!
//! Tests for:
//! - Hierarchy edits: add, attach, remove subtree
//! - Lazy world matrices after ancestor edits, on deep chains too
//! - Drawable collection and scene bounds
//! - Camera aspect and resolution

mod common;

use std::sync::Arc;

use glam::{Mat4, UVec2, Vec3};
use square::resources::{BoundingBox, MaterialLibrary, MeshBuilder};
use square::scene::{Camera, Light, Node, Scene, Transform};

use common::{LIT, lit_material, simple_program};

const EPSILON: f32 = 1e-5;

fn library() -> MaterialLibrary {
    let mut library = MaterialLibrary::new();
    library.add_program(simple_program(LIT));
    library
}

fn mesh_node(library: &MaterialLibrary, name: &str, position: Vec3) -> Node {
    Node::with_mesh(name, Arc::new(MeshBuilder::cube(2.0)), lit_material(library, name))
        .with_transform(Transform::from_position(position))
}

// ============================================================================
// Hierarchy
// ============================================================================

#[test]
fn nodes_are_added_under_root() {
    let mut scene = Scene::new();
    let a = scene.add_node(Node::new("A"));
    let b = scene.add_child(a, Node::new("B")).unwrap();

    assert_eq!(scene.node(a).unwrap().parent(), Some(scene.root()));
    assert_eq!(scene.node(b).unwrap().parent(), Some(a));
    assert_eq!(scene.node(a).unwrap().children(), [b]);
    assert_eq!(scene.node_count(), 3);
}

#[test]
fn attach_refuses_cycles() {
    let mut scene = Scene::new();
    let a = scene.add_node(Node::new("A"));
    let b = scene.add_child(a, Node::new("B")).unwrap();
    let c = scene.add_child(b, Node::new("C")).unwrap();

    assert!(!scene.attach(a, c));
    assert!(!scene.attach(a, a));
    assert!(!scene.attach(scene.root(), a));
    assert_eq!(scene.node(a).unwrap().parent(), Some(scene.root()));

    // Moving a leaf up is fine.
    assert!(scene.attach(c, a));
    assert_eq!(scene.node(a).unwrap().children(), [b, c]);
    assert!(scene.node(b).unwrap().children().is_empty());
}

#[test]
fn remove_node_drops_the_subtree() {
    let mut scene = Scene::new();
    let a = scene.add_node(Node::new("A"));
    let b = scene.add_child(a, Node::new("B")).unwrap();
    let c = scene.add_child(b, Node::new("C")).unwrap();
    let d = scene.add_node(Node::new("D"));

    assert!(scene.remove_node(b));
    assert!(scene.node(b).is_none());
    assert!(scene.node(c).is_none());
    assert!(scene.node(a).unwrap().children().is_empty());
    assert!(scene.node(d).is_some());

    assert!(!scene.remove_node(scene.root()));
    assert!(!scene.remove_node(b));
}

// ============================================================================
// World Matrices
// ============================================================================

#[test]
fn world_matrix_follows_parent_edits() {
    let mut scene = Scene::new();
    let parent = scene.add_node(
        Node::new("Parent").with_transform(Transform::from_position(Vec3::new(1.0, 0.0, 0.0))),
    );
    let child = scene
        .add_child(
            parent,
            Node::new("Child").with_transform(Transform::from_position(Vec3::new(0.0, 2.0, 0.0))),
        )
        .unwrap();

    let p = scene.world_matrix(child).transform_point3(Vec3::ZERO);
    assert!(p.abs_diff_eq(Vec3::new(1.0, 2.0, 0.0), EPSILON));

    // Only the parent is touched; the child picks it up when read.
    scene.node_mut(parent).unwrap().transform.position = Vec3::new(-3.0, 0.0, 0.0);
    let p = scene.world_matrix(child).transform_point3(Vec3::ZERO);
    assert!(p.abs_diff_eq(Vec3::new(-3.0, 2.0, 0.0), EPSILON));

    scene.node_mut(parent).unwrap().transform.scale = Vec3::splat(2.0);
    let p = scene.world_matrix(child).transform_point3(Vec3::ZERO);
    assert!(p.abs_diff_eq(Vec3::new(-3.0, 4.0, 0.0), EPSILON));
}

#[test]
fn reattached_node_uses_new_parent() {
    let mut scene = Scene::new();
    let left = scene.add_node(
        Node::new("Left").with_transform(Transform::from_position(Vec3::NEG_X)),
    );
    let right = scene.add_node(
        Node::new("Right").with_transform(Transform::from_position(Vec3::X)),
    );
    let child = scene.add_child(left, Node::new("Child")).unwrap();
    assert!(scene.world_matrix(child).abs_diff_eq(Mat4::from_translation(Vec3::NEG_X), EPSILON));

    assert!(scene.attach(child, right));
    assert!(scene.world_matrix(child).abs_diff_eq(Mat4::from_translation(Vec3::X), EPSILON));
}

#[test]
fn deep_chain_resolves_without_recursion() {
    const DEPTH: usize = 20_000;
    let library = library();
    let mut scene = Scene::new();
    let mut parent = scene.root();
    for i in 0..DEPTH {
        let node = if i + 1 == DEPTH {
            mesh_node(&library, "Leaf", Vec3::X)
        } else {
            Node::new("Link").with_transform(Transform::from_position(Vec3::X))
        };
        parent = scene.add_child(parent, node).unwrap();
    }
    let leaf = parent;

    let p = scene.world_matrix(leaf).transform_point3(Vec3::ZERO);
    assert!((p.x - DEPTH as f32).abs() < 1e-1, "{p}");
    assert_eq!(scene.drawables(), [leaf]);
    assert!((scene.scene_bounds().max.x - (DEPTH as f32 + 1.0)).abs() < 1e-1);

    // An edit at the top reaches the leaf on the next read.
    let top = scene.node(scene.root()).unwrap().children()[0];
    scene.node_mut(top).unwrap().transform.position = Vec3::new(1.0, 5.0, 0.0);
    let p = scene.world_matrix(leaf).transform_point3(Vec3::ZERO);
    assert!((p.y - 5.0).abs() < EPSILON, "{p}");
}

#[test]
fn missing_node_has_identity_world() {
    let mut scene = Scene::new();
    let a = scene.add_node(Node::new("A"));
    scene.remove_node(a);
    assert_eq!(scene.world_matrix(a), Mat4::IDENTITY);
}

// ============================================================================
// Drawables & Bounds
// ============================================================================

#[test]
fn drawables_are_listed_in_traversal_order() {
    let library = library();
    let mut scene = Scene::new();
    let a = scene.add_node(mesh_node(&library, "A", Vec3::ZERO));
    let group = scene.add_node(Node::new("Group"));
    let b = scene.add_child(group, mesh_node(&library, "B", Vec3::ZERO)).unwrap();
    let c = scene.add_node(mesh_node(&library, "C", Vec3::ZERO));

    assert_eq!(scene.drawables(), [a, b, c]);

    scene.node_mut(b).unwrap().visible = false;
    assert_eq!(scene.drawables(), [a, c]);
}

#[test]
fn scene_bounds_cover_every_drawable() {
    let library = library();
    let mut scene = Scene::new();
    assert!(scene.scene_bounds().is_empty());

    scene.add_node(mesh_node(&library, "A", Vec3::new(-4.0, 0.0, 0.0)));
    let b = scene.add_node(mesh_node(&library, "B", Vec3::new(3.0, 1.0, 0.0)));

    let bounds = scene.scene_bounds();
    let expected = BoundingBox::new(Vec3::new(-5.0, -1.0, -1.0), Vec3::new(4.0, 2.0, 1.0));
    assert!(bounds.min.abs_diff_eq(expected.min, EPSILON), "{bounds:?}");
    assert!(bounds.max.abs_diff_eq(expected.max, EPSILON), "{bounds:?}");

    scene.remove_node(b);
    assert!(scene.scene_bounds().max.abs_diff_eq(Vec3::new(-3.0, 1.0, 1.0), EPSILON));
}

#[test]
fn lights_keep_insertion_order() {
    let mut scene = Scene::new();
    let sun = scene.add_light(Light::directional(Vec3::NEG_Y, Vec3::ONE, 1.0));
    let bulb = scene.add_light(Light::point(Vec3::Y, Vec3::ONE, 2.0));

    let keys: Vec<_> = scene.lights().map(|(key, _)| key).collect();
    assert_eq!(keys, [sun, bulb]);

    scene.remove_light(sun);
    assert_eq!(scene.light_count(), 1);
    assert!(scene.light(sun).is_none());
}

// ============================================================================
// Camera
// ============================================================================

#[test]
fn camera_aspect_is_width_over_height() {
    let mut camera = Camera::new_perspective(60.0, UVec2::new(800, 400), 0.1, 100.0);
    assert!((camera.aspect() - 2.0).abs() < EPSILON);

    camera.set_resolution(UVec2::new(300, 600));
    assert!((camera.aspect() - 0.5).abs() < EPSILON);
    assert_eq!(camera.uniforms().dimensions.x, 300.0);
}

#[test]
fn camera_view_looks_at_target() {
    let mut camera = Camera::new_perspective(60.0, UVec2::new(640, 480), 0.1, 100.0);
    camera.look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);

    let p = camera.view_projection_matrix().project_point3(Vec3::ZERO);
    assert!(p.x.abs() < EPSILON && p.y.abs() < EPSILON, "{p}");
    assert!(p.z > -1.0 && p.z < 1.0);
}

//! Scene builders shared by the physics benchmarks.

use anyhow::Result;
use glam::Vec2;
use rein2d::physics::{DynamicTree, ProxyId};
use rein2d::{Aabb, BodyDef, ColliderDef, PhysicsConfig, PhysicsWorld, Shape};

/// Static ground box spanning `[-half_width, half_width]` with its top at y = 0.
pub fn add_ground(world: &mut PhysicsWorld, half_width: f32) -> Result<()> {
    let ground = world.create_body(&BodyDef::new_static().with_position(Vec2::new(0.0, -0.5)));
    world.add_collider(Some(ground), &ColliderDef::new(Shape::cuboid(half_width, 0.5)))?;
    Ok(())
}

/// `n` unit boxes stacked in columns of ten on a wide ground.
pub fn setup_box_stacks(n: usize) -> Result<PhysicsWorld> {
    let mut world = PhysicsWorld::new(PhysicsConfig::default());
    let columns = n.div_ceil(10).max(1);
    add_ground(&mut world, columns as f32 * 1.5 + 5.0)?;

    for i in 0..n {
        let column = (i / 10) as f32;
        let row = (i % 10) as f32;
        let x = (column - columns as f32 * 0.5) * 1.5;
        let body = world.create_body(&BodyDef::new_dynamic().with_position(Vec2::new(x, 0.5 + row)));
        world.add_collider(Some(body), &ColliderDef::new(Shape::cuboid(0.5, 0.5)))?;
    }
    Ok(world)
}

/// `n` circles and boxes dropped from a staggered grid.
pub fn setup_mixed_pile(n: usize) -> Result<PhysicsWorld> {
    let mut world = PhysicsWorld::new(PhysicsConfig::default());
    let per_row = 20;
    add_ground(&mut world, per_row as f32 + 5.0)?;

    for i in 0..n {
        let row = (i / per_row) as f32;
        let x = (i % per_row) as f32 * 1.1 - per_row as f32 * 0.55 + (row % 2.0) * 0.3;
        let body = world.create_body(&BodyDef::new_dynamic().with_position(Vec2::new(x, 1.0 + row * 1.2)));
        let shape = if i % 2 == 0 {
            Shape::circle(0.45)
        } else {
            Shape::cuboid(0.4, 0.4)
        };
        world.add_collider(Some(body), &ColliderDef::new(shape))?;
    }
    Ok(world)
}

/// Tight boxes laid out on a grid, `spacing` apart.
pub fn grid_boxes(n: usize, spacing: f32) -> Vec<Aabb> {
    let side = (n as f32).sqrt().ceil().max(1.0) as usize;
    (0..n)
        .map(|i| {
            let center = Vec2::new((i % side) as f32, (i / side) as f32) * spacing;
            Aabb::new(center - Vec2::splat(0.5), center + Vec2::splat(0.5))
        })
        .collect()
}

/// A tree holding one proxy per box, with the proxy ids in box order.
pub fn build_tree(boxes: &[Aabb]) -> (DynamicTree<usize>, Vec<ProxyId>) {
    let mut tree = DynamicTree::new(0.1, 4.0);
    let ids = boxes
        .iter()
        .enumerate()
        .map(|(i, aabb)| tree.insert(i, *aabb))
        .collect();
    (tree, ids)
}

/// Advance a world `steps` times at 60 Hz.
pub fn run_steps(world: &mut PhysicsWorld, steps: usize) {
    for _ in 0..steps {
        world.update(1.0 / 60.0);
    }
}

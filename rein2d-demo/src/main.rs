use glam::Vec2;
use rein2d::physics::LinearDrag;
use rein2d::{
    BodyDef, BodyHandle, ColliderDef, ContactEvent, ContactInfo, ContactListener, PhysicsConfig,
    PhysicsMaterial, PhysicsWorld, Shape,
};

const STACK_HEIGHT: usize = 8;
const SIMULATED_SECONDS: f64 = 6.0;
/// Pretend the host renders at a steady 144 Hz.
const FRAME_TIME: f64 = 1.0 / 144.0;

/// Logs every solid contact as it begins.
struct ImpactLogger;

impl ContactListener for ImpactLogger {
    fn on_contact_begin(&mut self, contact: &ContactInfo) {
        if contact.is_sensor() {
            return;
        }
        let (a, b) = contact.user_data();
        log::debug!("contact begin {a} <-> {b}");
    }
}

struct DemoScene {
    world: PhysicsWorld,
    boxes: Vec<BodyHandle>,
    ball: BodyHandle,
}

fn build_scene() -> anyhow::Result<DemoScene> {
    let config = PhysicsConfig::default().with_iterations(10, 10);
    let mut world = PhysicsWorld::new(config);

    let ground = world.create_body(&BodyDef::new_static());
    world.add_collider(
        Some(ground),
        &ColliderDef::new(Shape::cuboid(20.0, 0.5)).with_user_data(0),
    )?;
    // Slanted ramp built from a free-floating edge.
    world.add_collider(
        None,
        &ColliderDef::new(Shape::edge(Vec2::new(-12.0, 6.0), Vec2::new(-4.0, 0.5))).with_user_data(1),
    )?;

    let mut boxes = Vec::with_capacity(STACK_HEIGHT);
    for i in 0..STACK_HEIGHT {
        let body = world.create_body(
            &BodyDef::new_dynamic()
                .with_position(Vec2::new(3.0, 1.0 + i as f32))
                .with_user_data(10 + i as u64),
        );
        world.add_collider(
            Some(body),
            &ColliderDef::new(Shape::cuboid(0.5, 0.5)).with_user_data(10 + i as u64),
        )?;
        boxes.push(body);
    }

    let ball = world.create_body(&BodyDef::new_dynamic().with_position(Vec2::new(-11.0, 7.0)));
    world.add_collider(
        Some(ball),
        &ColliderDef::new(Shape::circle(0.6))
            .with_material(PhysicsMaterial::rubber())
            .with_user_data(2),
    )?;
    world.add_body_force(Box::new(LinearDrag::new(0.05, 0.01)), ball)?;

    Ok(DemoScene { world, boxes, ball })
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let DemoScene {
        mut world,
        boxes,
        ball,
    } = build_scene()?;
    log::info!(
        "scene: {} bodies, {} colliders",
        world.body_count(),
        world.collider_count()
    );

    world.set_contact_listener(Box::new(ImpactLogger));

    let frames = (SIMULATED_SECONDS / FRAME_TIME) as usize;
    let mut steps = 0u32;
    for frame in 0..frames {
        steps += world.step(FRAME_TIME);

        for event in world.drain_contact_events() {
            if let ContactEvent::End(pair) = event {
                log::trace!("frame {frame}: contact end {:?} <-> {:?}", pair.collider_a, pair.collider_b);
            }
        }

        if frame % 144 == 0 {
            let b = world
                .body(ball)
                .ok_or_else(|| anyhow::anyhow!("ball disappeared"))?;
            log::info!(
                "t = {:.2}s  ball at ({:.2}, {:.2})  contacts {}",
                frame as f64 * FRAME_TIME,
                b.position().x,
                b.position().y,
                world.contact_count()
            );
        }
    }

    let sleeping = boxes
        .iter()
        .filter_map(|&h| world.body(h))
        .filter(|b| !b.is_awake())
        .count();
    let top = boxes
        .last()
        .and_then(|&h| world.body(h))
        .ok_or_else(|| anyhow::anyhow!("stack is empty"))?;
    log::info!(
        "{steps} steps: {sleeping}/{} boxes asleep, top box at y = {:.3}",
        boxes.len(),
        top.position().y
    );
    Ok(())
}

//! Manifold generation for every supported shape pair.
//!
//! All routines share one contract: shapes are given in their owners' local
//! frames, the returned normal points from shape B toward shape A, depths are
//! non-negative and an empty manifold means no contact.

use glam::Vec2;

use crate::geometry::{circles_overlap, closest_point_on_segment, Transform2d};

use super::collider::{Shape, ShapeType};
use super::contact::Manifold;

/// Contact routine: `(shape_a, xf_a, shape_b, xf_b) -> manifold`.
pub type CollideFn = fn(&Shape, &Transform2d, &Shape, &Transform2d) -> Manifold;

/// Prefer shape A as the reference polygon unless B is clearly better.
const REFERENCE_FACE_TOLERANCE: f32 = 0.0005;

/// Which features of the two shapes produced a contact point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContactFeature {
    pub index_a: u8,
    pub index_b: u8,
    pub type_a: FeatureType,
    pub type_b: FeatureType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum FeatureType {
    #[default]
    Vertex = 0,
    Face = 1,
}

impl ContactFeature {
    /// Pack into the id stored on manifold points.
    #[inline]
    pub fn key(&self) -> u32 {
        u32::from(self.index_a)
            | u32::from(self.index_b) << 8
            | (self.type_a as u32) << 16
            | (self.type_b as u32) << 24
    }

    #[inline]
    fn swapped(self) -> Self {
        Self {
            index_a: self.index_b,
            index_b: self.index_a,
            type_a: self.type_b,
            type_b: self.type_a,
        }
    }
}

/// Registered routine for an ordered pair of shape types.
#[derive(Debug, Clone, Copy)]
pub struct ContactRegistration {
    pub collide: CollideFn,
    /// False when the caller must swap the colliders before calling `collide`.
    pub primary: bool,
}

/// Dispatch table indexed by `[ShapeType; 2]`.
#[derive(Debug, Clone)]
pub struct ContactRegistry {
    table: [[Option<ContactRegistration>; ShapeType::COUNT]; ShapeType::COUNT],
}

impl Default for ContactRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ContactRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            table: [[None; ShapeType::COUNT]; ShapeType::COUNT],
        };
        registry.register(collide_circles, ShapeType::Circle, ShapeType::Circle);
        registry.register(collide_box_circle, ShapeType::Box, ShapeType::Circle);
        registry.register(collide_boxes, ShapeType::Box, ShapeType::Box);
        registry.register(collide_edge_circle, ShapeType::Edge, ShapeType::Circle);
        registry.register(collide_edge_box, ShapeType::Edge, ShapeType::Box);
        registry
    }

    fn register(&mut self, collide: CollideFn, type_a: ShapeType, type_b: ShapeType) {
        self.table[type_a.index()][type_b.index()] = Some(ContactRegistration {
            collide,
            primary: true,
        });
        if type_a != type_b {
            self.table[type_b.index()][type_a.index()] = Some(ContactRegistration {
                collide,
                primary: false,
            });
        }
    }

    /// Routine for the ordered pair, or `None` if the pair never collides.
    #[inline]
    pub fn lookup(&self, type_a: ShapeType, type_b: ShapeType) -> Option<ContactRegistration> {
        self.table[type_a.index()][type_b.index()]
    }
}

/// Circle against circle. Coincident centers push along +Y.
pub fn collide_circles(a: &Shape, xf_a: &Transform2d, b: &Shape, xf_b: &Transform2d) -> Manifold {
    let (
        Shape::Circle {
            center: local_a,
            radius: radius_a,
        },
        Shape::Circle {
            center: local_b,
            radius: radius_b,
        },
    ) = (*a, *b)
    else {
        return Manifold::empty();
    };

    let center_a = xf_a.transform_point(local_a);
    let center_b = xf_b.transform_point(local_b);
    if !circles_overlap(center_a, radius_a, center_b, radius_b) {
        return Manifold::empty();
    }

    let d = center_a - center_b;
    let radius = radius_a + radius_b;
    let dist = d.length();
    let normal = if dist > f32::EPSILON { d / dist } else { Vec2::Y };
    let surface_a = center_a - normal * radius_a;
    let surface_b = center_b + normal * radius_b;

    let mut manifold = Manifold::with_normal(normal);
    manifold.push((surface_a + surface_b) * 0.5, radius - dist, 0);
    manifold
}

/// Box (A) against circle (B).
pub fn collide_box_circle(a: &Shape, xf_a: &Transform2d, b: &Shape, xf_b: &Transform2d) -> Manifold {
    let (
        Shape::Box {
            center: box_center,
            half_extents,
        },
        Shape::Circle { center, radius },
    ) = (*a, *b)
    else {
        return Manifold::empty();
    };

    // Circle center in the box frame.
    let c = xf_a.inv_transform_point(xf_b.transform_point(center)) - box_center;
    let closest = c.clamp(-half_extents, half_extents);

    let (local_normal, depth, box_point) = if closest == c {
        // Center inside: push out through the nearest face.
        let dx = half_extents.x - c.x.abs();
        let dy = half_extents.y - c.y.abs();
        let face = if dx < dy {
            Vec2::new(if c.x >= 0.0 { 1.0 } else { -1.0 }, 0.0)
        } else {
            Vec2::new(0.0, if c.y >= 0.0 { 1.0 } else { -1.0 })
        };
        let face_dist = dx.min(dy);
        (-face, radius + face_dist, c + face * face_dist)
    } else {
        let delta = c - closest;
        let dist_sq = delta.length_squared();
        if dist_sq >= radius * radius {
            return Manifold::empty();
        }
        let dist = dist_sq.sqrt();
        (-delta / dist, radius - dist, closest)
    };

    let circle_point = c + local_normal * radius;
    let mid = (box_point + circle_point) * 0.5 + box_center;

    let mut manifold = Manifold::with_normal(xf_a.transform_vector(local_normal));
    manifold.push(xf_a.transform_point(mid), depth, 0);
    manifold
}

/// Edge (A) against circle (B).
pub fn collide_edge_circle(a: &Shape, xf_a: &Transform2d, b: &Shape, xf_b: &Transform2d) -> Manifold {
    let (Shape::Edge { start, end }, Shape::Circle { center, radius }) = (*a, *b) else {
        return Manifold::empty();
    };

    let v1 = xf_a.transform_point(start);
    let v2 = xf_a.transform_point(end);
    let c = xf_b.transform_point(center);

    let (closest, t) = closest_point_on_segment(v1, v2, c);
    let d = closest - c;
    let dist_sq = d.length_squared();
    if dist_sq >= radius * radius {
        return Manifold::empty();
    }

    let dist = dist_sq.sqrt();
    let normal = if dist > f32::EPSILON {
        d / dist
    } else {
        let e = (v2 - v1).normalize_or_zero();
        Vec2::new(e.y, -e.x)
    };

    // Interior points touch the edge face; endpoints touch a vertex.
    let feature = if t <= 0.0 {
        ContactFeature::default()
    } else if t >= 1.0 {
        ContactFeature {
            index_a: 1,
            ..Default::default()
        }
    } else {
        ContactFeature {
            type_a: FeatureType::Face,
            ..Default::default()
        }
    };

    let circle_point = c + normal * radius;
    let mut manifold = Manifold::with_normal(normal);
    manifold.push((closest + circle_point) * 0.5, radius - dist, feature.key());
    manifold
}

/// Box against box: separating axes plus reference-face clipping.
pub fn collide_boxes(a: &Shape, xf_a: &Transform2d, b: &Shape, xf_b: &Transform2d) -> Manifold {
    match (Polygon::from_shape(a, xf_a), Polygon::from_shape(b, xf_b)) {
        (Some(poly_a), Some(poly_b)) => collide_polygons(&poly_a, &poly_b),
        _ => Manifold::empty(),
    }
}

/// Edge (A) against box (B). The edge is a two-sided, two-vertex polygon.
pub fn collide_edge_box(a: &Shape, xf_a: &Transform2d, b: &Shape, xf_b: &Transform2d) -> Manifold {
    match (Polygon::from_shape(a, xf_a), Polygon::from_shape(b, xf_b)) {
        (Some(edge), Some(poly)) => collide_polygons(&edge, &poly),
        _ => Manifold::empty(),
    }
}

/// Convex polygon in world space with outward edge normals.
#[derive(Debug, Clone, Copy)]
struct Polygon {
    vertices: [Vec2; 4],
    normals: [Vec2; 4],
    count: usize,
}

impl Polygon {
    fn from_shape(shape: &Shape, xf: &Transform2d) -> Option<Self> {
        match *shape {
            Shape::Box {
                center,
                half_extents: h,
            } => {
                let local = [
                    Vec2::new(-h.x, -h.y),
                    Vec2::new(h.x, -h.y),
                    Vec2::new(h.x, h.y),
                    Vec2::new(-h.x, h.y),
                ];
                let vertices = local.map(|v| xf.transform_point(center + v));
                let mut normals = [Vec2::ZERO; 4];
                for (i, n) in normals.iter_mut().enumerate() {
                    let e = vertices[(i + 1) % 4] - vertices[i];
                    *n = Vec2::new(e.y, -e.x).normalize_or_zero();
                }
                Some(Self {
                    vertices,
                    normals,
                    count: 4,
                })
            }
            Shape::Edge { start, end } => {
                let v1 = xf.transform_point(start);
                let v2 = xf.transform_point(end);
                let e = (v2 - v1).normalize_or_zero();
                if e == Vec2::ZERO {
                    return None;
                }
                let n = Vec2::new(e.y, -e.x);
                Some(Self {
                    vertices: [v1, v2, Vec2::ZERO, Vec2::ZERO],
                    normals: [n, -n, Vec2::ZERO, Vec2::ZERO],
                    count: 2,
                })
            }
            Shape::Circle { .. } => None,
        }
    }

    #[inline]
    fn vertex(&self, i: usize) -> Vec2 {
        self.vertices[i % self.count]
    }
}

/// Face of `poly1` with the largest separation from `poly2`.
fn find_max_separation(poly1: &Polygon, poly2: &Polygon) -> (usize, f32) {
    let mut best_index = 0;
    let mut max_separation = f32::MIN;
    for i in 0..poly1.count {
        let n = poly1.normals[i];
        let v1 = poly1.vertices[i];
        let si = poly2.vertices[..poly2.count]
            .iter()
            .map(|v2| n.dot(*v2 - v1))
            .fold(f32::MAX, f32::min);
        if si > max_separation {
            max_separation = si;
            best_index = i;
        }
    }
    (best_index, max_separation)
}

#[derive(Debug, Clone, Copy)]
struct ClipVertex {
    v: Vec2,
    id: ContactFeature,
}

/// Edge of `poly2` most anti-parallel to the reference normal, as two clip vertices.
fn find_incident_edge(reference_normal: Vec2, poly1_edge: usize, poly2: &Polygon) -> [ClipVertex; 2] {
    let mut index = 0;
    let mut min_dot = f32::MAX;
    for i in 0..poly2.count {
        let dot = reference_normal.dot(poly2.normals[i]);
        if dot < min_dot {
            min_dot = dot;
            index = i;
        }
    }

    let i1 = index;
    let i2 = (index + 1) % poly2.count;
    let feature = |i: usize| ContactFeature {
        index_a: poly1_edge as u8,
        index_b: i as u8,
        type_a: FeatureType::Face,
        type_b: FeatureType::Vertex,
    };
    [
        ClipVertex {
            v: poly2.vertices[i1],
            id: feature(i1),
        },
        ClipVertex {
            v: poly2.vertices[i2],
            id: feature(i2),
        },
    ]
}

/// Sutherland-Hodgman clip of a segment against the half plane `dot(n, v) <= offset`.
fn clip_segment_to_line(
    input: &[ClipVertex; 2],
    normal: Vec2,
    offset: f32,
    vertex_index_a: usize,
) -> ([ClipVertex; 2], usize) {
    let mut out = input.to_owned();
    let mut count = 0;

    let d0 = normal.dot(input[0].v) - offset;
    let d1 = normal.dot(input[1].v) - offset;

    if d0 <= 0.0 {
        out[count] = input[0];
        count += 1;
    }
    if d1 <= 0.0 {
        out[count] = input[1];
        count += 1;
    }

    if d0 * d1 < 0.0 && count < 2 {
        let interp = d0 / (d0 - d1);
        out[count] = ClipVertex {
            v: input[0].v + (input[1].v - input[0].v) * interp,
            id: ContactFeature {
                index_a: vertex_index_a as u8,
                index_b: input[0].id.index_b,
                type_a: FeatureType::Vertex,
                type_b: FeatureType::Face,
            },
        };
        count += 1;
    }

    (out, count)
}

fn collide_polygons(poly_a: &Polygon, poly_b: &Polygon) -> Manifold {
    let (edge_a, separation_a) = find_max_separation(poly_a, poly_b);
    if separation_a > 0.0 {
        return Manifold::empty();
    }
    let (edge_b, separation_b) = find_max_separation(poly_b, poly_a);
    if separation_b > 0.0 {
        return Manifold::empty();
    }

    let (poly1, poly2, edge1, flip) = if separation_b > separation_a + REFERENCE_FACE_TOLERANCE {
        (poly_b, poly_a, edge_b, true)
    } else {
        (poly_a, poly_b, edge_a, false)
    };

    let incident = find_incident_edge(poly1.normals[edge1], edge1, poly2);

    let v11 = poly1.vertex(edge1);
    let v12 = poly1.vertex(edge1 + 1);
    let tangent = (v12 - v11).normalize_or_zero();
    let normal = Vec2::new(tangent.y, -tangent.x);

    let front_offset = normal.dot(v11);
    let side_offset1 = -tangent.dot(v11);
    let side_offset2 = tangent.dot(v12);

    let (clip1, count1) = clip_segment_to_line(&incident, -tangent, side_offset1, edge1);
    if count1 < 2 {
        return Manifold::empty();
    }
    let (clip2, count2) =
        clip_segment_to_line(&clip1, tangent, side_offset2, (edge1 + 1) % poly1.count);
    if count2 < 2 {
        return Manifold::empty();
    }

    // The reference normal leaves poly1; report it pointing from B toward A.
    let mut manifold = Manifold::with_normal(if flip { normal } else { -normal });
    for cv in &clip2 {
        let separation = normal.dot(cv.v) - front_offset;
        if separation <= 0.0 {
            let position = cv.v - normal * (0.5 * separation);
            let id = if flip { cv.id.swapped() } else { cv.id };
            manifold.push(position, -separation, id.key());
        }
    }
    manifold
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_4;

    const EPS: f32 = 1e-4;

    fn at(x: f32, y: f32) -> Transform2d {
        Transform2d::from_position(Vec2::new(x, y))
    }

    #[test]
    fn test_circle_circle_overlap() {
        let circle = Shape::circle(1.0);
        let m = collide_circles(&circle, &at(0.0, 0.0), &circle, &at(1.5, 0.0));
        assert_eq!(m.point_count(), 1);
        assert!((m.points()[0].penetration - 0.5).abs() < EPS);
        assert!((m.normal - Vec2::new(-1.0, 0.0)).length() < EPS, "normal: {:?}", m.normal);
        assert!((m.points()[0].position - Vec2::new(0.75, 0.0)).length() < EPS);
    }

    #[test]
    fn test_circle_circle_separated_and_coincident() {
        let circle = Shape::circle(1.0);
        assert!(collide_circles(&circle, &at(0.0, 0.0), &circle, &at(2.5, 0.0)).is_empty());
        // Exactly touching circles produce no contact.
        assert!(collide_circles(&circle, &at(0.0, 0.0), &circle, &at(2.0, 0.0)).is_empty());

        let m = collide_circles(&circle, &at(1.0, 1.0), &circle, &at(1.0, 1.0));
        assert_eq!(m.normal, Vec2::Y);
        assert!((m.points()[0].penetration - 2.0).abs() < EPS);
    }

    #[test]
    fn test_box_circle_face_contact() {
        let boxed = Shape::cuboid(1.0, 1.0);
        let circle = Shape::circle(0.5);
        // Circle resting on top of the box, 0.1 deep.
        let m = collide_box_circle(&boxed, &at(0.0, 0.0), &circle, &at(0.0, 1.4));
        assert_eq!(m.point_count(), 1);
        assert!((m.normal - Vec2::new(0.0, -1.0)).length() < EPS, "normal: {:?}", m.normal);
        assert!((m.points()[0].penetration - 0.1).abs() < EPS);
        assert!((m.points()[0].position - Vec2::new(0.0, 0.95)).length() < EPS);
    }

    #[test]
    fn test_box_circle_center_inside() {
        let boxed = Shape::cuboid(2.0, 1.0);
        let circle = Shape::circle(0.5);
        let m = collide_box_circle(&boxed, &at(0.0, 0.0), &circle, &at(0.0, 0.75));
        // Nearest face is the top one, 0.25 away.
        assert!((m.normal - Vec2::new(0.0, -1.0)).length() < EPS);
        assert!((m.points()[0].penetration - 0.75).abs() < EPS);
    }

    #[test]
    fn test_box_circle_corner_miss() {
        let boxed = Shape::cuboid(1.0, 1.0);
        let circle = Shape::circle(0.5);
        assert!(collide_box_circle(&boxed, &at(0.0, 0.0), &circle, &at(1.4, 1.4)).is_empty());
    }

    #[test]
    fn test_box_box_stacked() {
        let boxed = Shape::cuboid(0.5, 0.5);
        let ground = Shape::cuboid(5.0, 0.5);
        // A sits on B with 0.05 overlap.
        let m = collide_boxes(&boxed, &at(0.0, 0.95), &ground, &at(0.0, 0.0));
        assert_eq!(m.point_count(), 2);
        assert!((m.normal - Vec2::Y).length() < EPS, "normal: {:?}", m.normal);
        for p in m.points() {
            assert!((p.penetration - 0.05).abs() < EPS, "depth: {}", p.penetration);
            assert!((p.position.y - 0.475).abs() < EPS);
            assert!((p.position.x.abs() - 0.5).abs() < EPS);
        }
        assert_ne!(m.points()[0].id, m.points()[1].id);
    }

    #[test]
    fn test_box_box_swapped_order_flips_normal() {
        let boxed = Shape::cuboid(0.5, 0.5);
        let ground = Shape::cuboid(5.0, 0.5);
        let m = collide_boxes(&ground, &at(0.0, 0.0), &boxed, &at(0.0, 0.95));
        assert_eq!(m.point_count(), 2);
        assert!((m.normal - Vec2::new(0.0, -1.0)).length() < EPS, "normal: {:?}", m.normal);
    }

    #[test]
    fn test_box_box_separated() {
        let boxed = Shape::cuboid(0.5, 0.5);
        assert!(collide_boxes(&boxed, &at(0.0, 0.0), &boxed, &at(1.2, 0.0)).is_empty());
    }

    #[test]
    fn test_box_box_rotated_corner() {
        let boxed = Shape::cuboid(0.5, 0.5);
        let diamond = Transform2d::new(Vec2::new(0.0, 1.2), FRAC_PI_4);
        let m = collide_boxes(&boxed, &diamond, &boxed, &at(0.0, 0.0));
        // Corner at y = 1.2 - 0.707 = 0.493 dips 0.007 into the top face.
        assert_eq!(m.point_count(), 1);
        assert!((m.normal - Vec2::Y).length() < EPS, "normal: {:?}", m.normal);
        assert!((m.points()[0].penetration - (0.5 - (1.2 - 0.5 * 2f32.sqrt()))).abs() < EPS);
    }

    #[test]
    fn test_edge_circle() {
        let edge = Shape::edge(Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0));
        let circle = Shape::circle(0.5);
        let m = collide_edge_circle(&edge, &Transform2d::IDENTITY, &circle, &at(1.0, 0.4));
        assert_eq!(m.point_count(), 1);
        assert!((m.normal - Vec2::new(0.0, -1.0)).length() < EPS);
        assert!((m.points()[0].penetration - 0.1).abs() < EPS);

        // Beyond the end point: vertex contact.
        let m = collide_edge_circle(&edge, &Transform2d::IDENTITY, &circle, &at(5.3, 0.0));
        assert!((m.normal - Vec2::new(-1.0, 0.0)).length() < EPS);
        assert!(collide_edge_circle(&edge, &Transform2d::IDENTITY, &circle, &at(0.0, 1.0)).is_empty());
    }

    #[test]
    fn test_edge_box() {
        let edge = Shape::edge(Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0));
        let boxed = Shape::cuboid(0.5, 0.5);
        let m = collide_edge_box(&edge, &Transform2d::IDENTITY, &boxed, &at(0.0, 0.48));
        assert_eq!(m.point_count(), 2);
        // The box sits above the edge, so B -> A points down.
        assert!((m.normal - Vec2::new(0.0, -1.0)).length() < EPS, "normal: {:?}", m.normal);
        for p in m.points() {
            assert!((p.penetration - 0.02).abs() < EPS, "depth: {}", p.penetration);
        }

        // Edges are two-sided.
        let m = collide_edge_box(&edge, &Transform2d::IDENTITY, &boxed, &at(0.0, -0.48));
        assert!((m.normal - Vec2::Y).length() < EPS, "normal: {:?}", m.normal);
    }

    #[test]
    fn test_registry() {
        let registry = ContactRegistry::new();
        assert!(registry.lookup(ShapeType::Edge, ShapeType::Edge).is_none());
        assert!(registry.lookup(ShapeType::Box, ShapeType::Circle).unwrap().primary);
        assert!(!registry.lookup(ShapeType::Circle, ShapeType::Box).unwrap().primary);
        assert!(registry.lookup(ShapeType::Box, ShapeType::Box).unwrap().primary);
        assert!(!registry.lookup(ShapeType::Box, ShapeType::Edge).unwrap().primary);
        assert!(!registry.lookup(ShapeType::Circle, ShapeType::Edge).unwrap().primary);
    }
}

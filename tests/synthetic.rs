//! Synthetic subject shared by the integration tests.
//!
//! World space is a 64 mm cube centred on the origin (1 mm voxels, voxel
//! `i` ↔ world `i − 32`). The "brain" is a ball of radius 30 mm: white matter
//! inside 26 mm, a cortical shell from 26 to 30 mm. Surfaces are concentric
//! UV spheres sharing one vertex layout: pial at 30 mm, envelope at 32 mm,
//! `sphere.reg` at 100 mm.
#![allow(dead_code)]

use ieegloc::{
    Hemisphere, InMemoryResources, LookupTable, Matrix4, Mesh, SurfaceType, ValueSelection,
    Vector3, Volume,
};

pub const SUBJECT: &str = "synthetic";
pub const N: usize = 64;
pub const PIAL_RADIUS: f64 = 30.0;
pub const LEPTO_RADIUS: f64 = 32.0;
pub const SPHERE_RADIUS: f64 = 100.0;
pub const WHITE_RADIUS: f64 = 26.0;
pub const CT_THRESHOLD: f32 = 1000.0;

/// Depth lead: five contacts 5 mm apart along x in the left hemisphere.
pub fn lead_centres() -> Vec<Vector3> {
    (0..5)
        .map(|k| Vector3::new(-26.0 + 5.0 * k as f64, 4.0, 2.0))
        .collect()
}

pub fn grid_to_world() -> Matrix4 {
    let mut m = Matrix4::identity();
    for a in 0..3 {
        m[(a, 3)] = -(N as f64 / 2.0);
    }
    m
}

fn world_of(i: usize, j: usize, k: usize) -> Vector3 {
    let half = N as f64 / 2.0;
    Vector3::new(i as f64 - half, j as f64 - half, k as f64 - half)
}

fn fill(f: impl Fn(&Vector3) -> f32) -> Vec<f32> {
    let mut data = vec![0.0f32; N * N * N];
    for k in 0..N {
        for j in 0..N {
            for i in 0..N {
                data[i + N * (j + N * k)] = f(&world_of(i, j, k));
            }
        }
    }
    data
}

/// CT with one Gaussian blob (σ = 1 mm, peak 3000) per contact centre.
pub fn ct_volume(centres: &[Vector3]) -> Volume {
    let data = fill(|p| {
        centres
            .iter()
            .map(|c| 3000.0 * (-(p - c).norm_squared() / 2.0).exp() as f32)
            .fold(0.0f32, f32::max)
    });
    Volume::new(data, [N; 3], grid_to_world())
        .unwrap()
        .with_selection(ValueSelection::at_least(CT_THRESHOLD))
}

/// `aseg`-like segmentation: white matter 2 / 41, cortex 3 / 42.
pub fn aseg_volume() -> Volume {
    let data = fill(|p| {
        let r = p.norm();
        let left = p.x < 0.0;
        match (r < WHITE_RADIUS, r < PIAL_RADIUS, left) {
            (true, _, true) => 2.0,
            (true, _, false) => 41.0,
            (false, true, true) => 3.0,
            (false, true, false) => 42.0,
            _ => 0.0,
        }
    });
    Volume::new(data, [N; 3], grid_to_world()).unwrap()
}

/// `aparc+aseg`-like parcellation: cortex split into 1030 / 2030.
pub fn aparc_volume() -> Volume {
    let data = fill(|p| {
        let r = p.norm();
        let left = p.x < 0.0;
        match (r < WHITE_RADIUS, r < PIAL_RADIUS, left) {
            (true, _, true) => 2.0,
            (true, _, false) => 41.0,
            (false, true, true) => 1030.0,
            (false, true, false) => 2030.0,
            _ => 0.0,
        }
    });
    Volume::new(data, [N; 3], grid_to_world()).unwrap()
}

pub fn aseg_lut() -> LookupTable {
    LookupTable::from_entries([
        (2, "Left-Cerebral-White-Matter"),
        (3, "Left-Cerebral-Cortex"),
        (41, "Right-Cerebral-White-Matter"),
        (42, "Right-Cerebral-Cortex"),
    ])
}

pub fn aparc_lut() -> LookupTable {
    LookupTable::from_entries([
        (2, "Left-Cerebral-White-Matter"),
        (41, "Right-Cerebral-White-Matter"),
        (1030, "ctx-lh-superiortemporal"),
        (2030, "ctx-rh-superiortemporal"),
    ])
}

/// UV sphere with 3° latitude / longitude steps. The vertex layout does not
/// depend on the radius, so spheres of different radii are vertex-aligned.
pub fn uv_sphere(radius: f64) -> Mesh {
    let mut vertices = Vec::new();
    for lat in -30..=30 {
        let theta = (3.0 * lat as f64).to_radians();
        for lon in 0..120 {
            let phi = (3.0 * lon as f64).to_radians();
            vertices.push(Vector3::new(
                radius * theta.cos() * phi.cos(),
                radius * theta.cos() * phi.sin(),
                radius * theta.sin(),
            ));
        }
    }
    Mesh::from_vertices(&vertices, Vec::new())
}

pub fn tkr_to_scanner() -> Matrix4 {
    let mut m = Matrix4::identity();
    m[(0, 3)] = 1.0;
    m[(1, 3)] = 2.0;
    m[(2, 3)] = 3.0;
    m
}

pub fn scanner_to_mni305() -> Matrix4 {
    let mut m = Matrix4::identity();
    for a in 0..3 {
        m[(a, a)] = 1.1;
    }
    m
}

/// Everything a localization run needs, for both hemispheres.
pub fn subject() -> InMemoryResources {
    let mut r = InMemoryResources::new();
    r.insert_volume(SUBJECT, "ct", ct_volume(&lead_centres()))
        .insert_atlas(SUBJECT, "aseg", aseg_volume(), aseg_lut())
        .insert_atlas(SUBJECT, "aparc+aseg", aparc_volume(), aparc_lut())
        .set_tkr_to_scanner(SUBJECT, tkr_to_scanner())
        .set_scanner_to_mni305(SUBJECT, scanner_to_mni305());
    for hemisphere in [Hemisphere::Left, Hemisphere::Right] {
        r.insert_surface(SUBJECT, hemisphere, SurfaceType::Pial, uv_sphere(PIAL_RADIUS))
            .insert_surface(
                SUBJECT,
                hemisphere,
                SurfaceType::PialOuterSmoothed,
                uv_sphere(LEPTO_RADIUS),
            )
            .insert_surface(SUBJECT, hemisphere, SurfaceType::SphereReg, uv_sphere(SPHERE_RADIUS));
    }
    r
}

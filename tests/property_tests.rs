//! Property-based tests for lattice region finding, transforms and location.

use std::f64::consts::PI;
use std::path::Path;

use nalgebra::{Point3, Vector3};
use proptest::prelude::*;

use zonetrack::geometry::Geometry;
use zonetrack::lattice::{ClusterRing, Lattice, LatticeKind};
use zonetrack::locate::locate;
use zonetrack::settings::Settings;
use zonetrack::transform::{EulerConvention, Rotation, Transform, TransformOrder};
use zonetrack::universe::Catalog;

fn lattice(kind: LatticeKind) -> Lattice {
    let count = kind.element_count();
    Lattice::new(kind, [0.0; 3], vec![None; count], vec![])
}

fn convention() -> impl Strategy<Value = EulerConvention> {
    prop_oneof![Just(EulerConvention::XYZ), Just(EulerConvention::ZYZ)]
}

fn order() -> impl Strategy<Value = TransformOrder> {
    prop_oneof![
        Just(TransformOrder::TranslateThenRotate),
        Just(TransformOrder::RotateThenTranslate),
    ]
}

proptest! {
    #[test]
    fn square_lattice_covers_its_extent(
        nx in 1usize..8,
        ny in 1usize..8,
        pitch in 0.5f64..3.0,
        u in 0.001f64..0.999,
        v in 0.001f64..0.999,
    ) {
        let lat = lattice(LatticeKind::Square { nx, ny, pitch });
        let (wx, wy) = (nx as f64 * pitch, ny as f64 * pitch);
        let mut pos = Point3::new((u - 0.5) * wx, (v - 0.5) * wy, 1.0);

        let index = lat.find_region(&mut pos, None);
        prop_assert!(matches!(index, Some(i) if i < nx * ny));
        prop_assert!(pos.x.abs() <= 0.5 * pitch + 1e-9);
        prop_assert!(pos.y.abs() <= 0.5 * pitch + 1e-9);
        prop_assert!((pos.z - 1.0).abs() < 1e-12);
    }

    #[test]
    fn square_lattice_rejects_points_beyond_its_extent(
        nx in 1usize..8,
        ny in 1usize..8,
        pitch in 0.5f64..3.0,
        margin in 0.01f64..10.0,
        y in -1.0f64..1.0,
    ) {
        let lat = lattice(LatticeKind::Square { nx, ny, pitch });
        let edge = 0.5 * nx as f64 * pitch;
        let mut pos = Point3::new(edge + margin, y, 0.0);
        prop_assert_eq!(lat.find_region(&mut pos, None), None);
        let mut pos = Point3::new(-edge - margin, y, 0.0);
        prop_assert_eq!(lat.find_region(&mut pos, None), None);
    }

    #[test]
    fn cluster_sectors_are_uniform(
        count in 1usize..24,
        sector in 0usize..24,
        radius in 0.5f64..5.0,
        tilt in -180.0f64..180.0,
        fraction in -0.49f64..0.49,
    ) {
        let sector = sector % count;
        let width = 2.0 * PI / count as f64;
        let rings = vec![ClusterRing { count, radius, tilt }];
        let lat = lattice(LatticeKind::Cluster { rings });

        let theta = tilt.to_radians() + sector as f64 * width + fraction * width;
        let mut pos = Point3::new(radius * theta.cos(), radius * theta.sin(), 0.0);
        prop_assert_eq!(lat.find_region(&mut pos, None), Some(sector));
        // the sector centre sits on the ring, so the point lands near the local origin
        prop_assert!(pos.coords.norm() <= radius * width * 0.5 + 1e-9);
    }

    #[test]
    fn transforms_invert_exactly(
        angles in prop::array::uniform3(-180.0f64..180.0),
        convention in convention(),
        order in order(),
        t in prop::array::uniform3(-10.0f64..10.0),
        p in prop::array::uniform3(-10.0f64..10.0),
    ) {
        let rotation = Rotation::Euler { angles, convention };
        let transform = Transform::new(Vector3::from(t), rotation, order).unwrap();

        let start = Point3::from(p);
        let mut pos = start;
        let mut dir = Vector3::new(0.6, 0.0, 0.8);
        transform.apply(&mut pos, &mut dir);
        prop_assert!((dir.norm() - 1.0).abs() < 1e-12);
        transform.invert(&mut pos, &mut dir);

        prop_assert!((pos - start).norm() < 1e-9);
        prop_assert!((dir - Vector3::new(0.6, 0.0, 0.8)).norm() < 1e-12);

        let mut local = start;
        let mut dir = Vector3::z();
        transform.apply(&mut local, &mut dir);
        prop_assert!((transform.invert_point(local) - start).norm() < 1e-9);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn location_is_deterministic_across_contexts(
        points in prop::collection::vec(prop::array::uniform3(0.0f64..1.0), 1..32),
    ) {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/pin_cell.json");
        let catalog = Catalog::from_json_file(path).unwrap();
        let [min, max] = catalog.bounds.unwrap();
        let geometry = Geometry::new(catalog, &Settings::default()).unwrap();

        let mut first = geometry.new_context(0);
        let mut second = geometry.new_context(1);
        for u in &points {
            let p = Point3::from([0usize, 1, 2].map(|i| min[i] + u[i] * (max[i] - min[i])));
            let a = locate(&geometry, &mut first, p, Vector3::x()).unwrap();
            let zone = first.last_zone_index();
            prop_assert!(zone <= geometry.max_zone());

            // the other context has seen a different history
            locate(&geometry, &mut second, Point3::origin(), Vector3::y()).unwrap();
            let b = locate(&geometry, &mut second, p, Vector3::x()).unwrap();
            prop_assert_eq!(a, b);
            prop_assert_eq!(zone, second.last_zone_index());
        }
    }
}

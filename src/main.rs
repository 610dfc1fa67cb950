use anyhow::{Context, Result};
use nalgebra::Point3;
use zonetrack::geometry::Geometry;
use zonetrack::output::RunReport;
use zonetrack::search::Aabb;
use zonetrack::settings;
use zonetrack::survey::Survey;
use zonetrack::universe::{Catalog, MaterialId};
use zonetrack::zones::enumerate_zones;

fn main() -> Result<()> {
    env_logger::init();

    let settings = settings::load_config()?;
    println!("{}", settings);

    let catalog = Catalog::from_json_file(&settings.geometry)
        .with_context(|| format!("failed to load geometry {}", settings.geometry))?;
    let bounds = catalog.bounds;
    let geometry = Geometry::new(catalog, &settings)?;

    println!("Enumerating zones...");
    let enumeration = enumerate_zones(&geometry)?;
    println!(
        "{} universes, depth {}, {} leaf placements, zone indices 0..={}",
        geometry.catalog().universes.len(),
        geometry.depth(),
        enumeration.leaves,
        geometry.max_zone()
    );

    let summary = match bounds {
        Some([min, max]) if settings.samples > 0 => {
            println!("Surveying {} points...", settings.samples);
            let bounds = Aabb::new(Point3::from(min), Point3::from(max));
            let summary = Survey::new(&geometry, &enumeration.tables, bounds, &settings)
                .with_progress(true)
                .run()?;
            println!(
                "Time taken: {:.2?}, Time per point: {:.2?}",
                summary.elapsed,
                summary.elapsed / summary.samples.max(1) as u32
            );
            Some(summary)
        }
        Some(_) => None,
        None => {
            println!("Geometry declares no bounds, skipping the survey");
            None
        }
    };

    for (index, material) in geometry.catalog().materials.iter().enumerate() {
        let hits = summary
            .as_ref()
            .map(|s| s.tally.hits[index].to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<16} zones {:>8}  hits {:>10}",
            material.name,
            enumeration.tables.zone_count(MaterialId(index)),
            hits
        );
    }
    if let Some(summary) = &summary {
        println!(
            "  void {}, outside {}, undefined {}, checked {}",
            summary.tally.void, summary.tally.outside, summary.tally.undefined, summary.tally.checked
        );
    }

    if let Some(path) = &settings.report {
        RunReport::new(&settings.geometry, &geometry, &enumeration, summary.as_ref()).write(path)?;
        println!("Report written to {}", path);
    }

    Ok(())
}

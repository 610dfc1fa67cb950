//! Parallel point-location survey over a finalized geometry.
//!
//! The survey samples random points and directions inside a box and locates
//! each one on a rayon pool, one [`ExecutionContext`] per worker. Every
//! located placement of a depletable material is checked against the
//! depletion tables, so an online/offline mismatch in the zone arithmetic
//! fails the run.
//!
//! [`ExecutionContext`]: crate::context::ExecutionContext

use std::f64::consts::PI;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use nalgebra::{Point3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::error::{GeometryError, Result};
use crate::geometry::Geometry;
use crate::locate::{locate, locate_plot};
use crate::search::Aabb;
use crate::settings::Settings;
use crate::universe::Leaf;
use crate::zones::DepletionTables;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_are_reproducible() {
        let bounds = Aabb::new(Point3::new(-1.0, -2.0, 0.0), Point3::new(1.0, 2.0, 5.0));
        let a = sample(&bounds, 50, Some(7));
        let b = sample(&bounds, 50, Some(7));
        assert_eq!(a, b);
        assert!(a.iter().all(|(p, _)| bounds.contains(p)));
        assert!(a.iter().all(|(_, u)| (u.norm() - 1.0).abs() < 1e-12));
    }

    #[test]
    fn tallies_merge() {
        let mut a = Tally::new(2);
        a.add(Leaf::Material(crate::universe::MaterialId(1)), false);
        a.add(Leaf::Void, false);
        let mut b = Tally::new(2);
        b.add(Leaf::Undefined, false);
        b.add(Leaf::Material(crate::universe::MaterialId(1)), true);
        let t = a.merge(b);
        assert_eq!(t.hits, vec![0, 2]);
        assert_eq!((t.void, t.outside, t.undefined, t.checked), (1, 0, 1, 1));
    }
}

/// Counts of what the sampled points landed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tally {
    /// Hits per material.
    pub hits: Vec<u64>,
    pub void: u64,
    pub outside: u64,
    pub undefined: u64,
    /// Hits whose zone index was found in the depletion tables.
    pub checked: u64,
}

impl Tally {
    pub fn new(materials: usize) -> Self {
        Self {
            hits: vec![0; materials],
            void: 0,
            outside: 0,
            undefined: 0,
            checked: 0,
        }
    }

    fn add(&mut self, leaf: Leaf, checked: bool) {
        match leaf {
            Leaf::Material(id) => self.hits[id.0] += 1,
            Leaf::Void => self.void += 1,
            Leaf::Outside => self.outside += 1,
            Leaf::Undefined => self.undefined += 1,
        }
        if checked {
            self.checked += 1;
        }
    }

    fn merge(mut self, other: Tally) -> Tally {
        for (a, b) in self.hits.iter_mut().zip(other.hits) {
            *a += b;
        }
        self.void += other.void;
        self.outside += other.outside;
        self.undefined += other.undefined;
        self.checked += other.checked;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SurveySummary {
    pub samples: usize,
    pub tally: Tally,
    pub elapsed: Duration,
}

/// Random point-location survey.
///
/// **Context**: Locating many random points exercises every branch of the
/// locator the same way transport would, from many threads at once, and
/// cross-checks the online zone arithmetic against the offline tables.
///
/// **How it Works**: Points and isotropic directions are drawn up front from
/// one seeded generator, so the set is reproducible regardless of thread
/// count. Rayon's `map_init` gives each worker its own context; per-worker
/// tallies are reduced at the end.
pub struct Survey<'a> {
    geometry: &'a Geometry,
    tables: &'a DepletionTables,
    bounds: Aabb,
    samples: usize,
    seed: Option<u64>,
    plot: bool,
    progress: bool,
}

impl<'a> Survey<'a> {
    pub fn new(
        geometry: &'a Geometry,
        tables: &'a DepletionTables,
        bounds: Aabb,
        settings: &Settings,
    ) -> Self {
        Self {
            geometry,
            tables,
            bounds,
            samples: settings.samples,
            seed: settings.seed,
            plot: settings.plot,
            progress: false,
        }
    }

    /// Shows a progress bar while running.
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn run(&self) -> Result<SurveySummary> {
        let start = Instant::now();
        let points = sample(&self.bounds, self.samples, self.seed);

        let pb = if self.progress {
            ProgressBar::new(self.samples as u64)
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] {bar:40.green/blue} {pos:>7}/{len:7} {msg} ETA: {eta_precise}",
        ) {
            pb.set_style(style.progress_chars("█▇▆▅▄▃▂▁"));
        }
        pb.set_message("points".to_string());

        let geometry = self.geometry;
        let n_materials = geometry.catalog().materials.len();

        let tally = points
            .par_iter()
            .map_init(
                || geometry.new_context(rayon::current_thread_index().unwrap_or(0)),
                |ctx, (pos, dir)| -> Result<(Leaf, bool)> {
                    ctx.next_collision();
                    let leaf = if self.plot {
                        locate_plot(geometry, ctx, *pos, *dir)
                    } else {
                        locate(geometry, ctx, *pos, *dir)?
                    };
                    let checked = self.check(leaf, ctx.last_zone_index(), pos)?;
                    pb.inc(1);
                    Ok((leaf, checked))
                },
            )
            .try_fold(
                || Tally::new(n_materials),
                |mut tally, item: Result<(Leaf, bool)>| {
                    let (leaf, checked) = item?;
                    tally.add(leaf, checked);
                    Ok::<_, GeometryError>(tally)
                },
            )
            .try_reduce(|| Tally::new(n_materials), |a, b| Ok(a.merge(b)))?;

        pb.finish_and_clear();

        let summary = SurveySummary {
            samples: self.samples,
            tally,
            elapsed: start.elapsed(),
        };
        log::info!(
            "surveyed {} points in {:.2?}, {} checked against the depletion tables",
            summary.samples,
            summary.elapsed,
            summary.tally.checked
        );
        Ok(summary)
    }

    /// Checks a located depletable placement against the tables.
    fn check(&self, leaf: Leaf, zone: u64, pos: &Point3<f64>) -> Result<bool> {
        let Some(material) = leaf.material() else {
            return Ok(false);
        };
        let record = &self.geometry.catalog().materials[material.0];
        if !record.depletable {
            return Ok(false);
        }
        match self.tables.lookup(material, zone) {
            Some(_) => Ok(true),
            None => Err(GeometryError::inconsistency(
                &record.name,
                format!("zone {} located at {} was never enumerated", zone, pos),
            )),
        }
    }
}

/// Draws `n` points uniformly in `bounds` with isotropic directions.
fn sample(bounds: &Aabb, n: usize, seed: Option<u64>) -> Vec<(Point3<f64>, Vector3<f64>)> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_rng(&mut rand::rng()),
    };
    let extent = bounds.extent();
    (0..n)
        .map(|_| {
            let offset = Vector3::new(
                rng.random_range(0.0..=1.0),
                rng.random_range(0.0..=1.0),
                rng.random_range(0.0..=1.0),
            );
            let pos = bounds.min + extent.component_mul(&offset);

            let mu: f64 = rng.random_range(-1.0..=1.0);
            let phi = rng.random_range(0.0..2.0 * PI);
            let s = (1.0 - mu * mu).sqrt();
            (pos, Vector3::new(s * phi.cos(), s * phi.sin(), mu))
        })
        .collect()
}

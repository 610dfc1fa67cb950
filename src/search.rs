//! Spatial acceleration for universes made of many explicit bodies.
//!
//! Pebble beds, tetrahedral meshes and triangulated solids can hold thousands
//! of bodies. Testing each one on every query is too slow, so a uniform grid is
//! laid over their bounding boxes once, and a query only tests the bodies
//! overlapping the grid cell the point falls in.
//!
//! - [`Aabb`]: axis-aligned bounding boxes
//! - [`SearchGrid`]: compressed cell-to-body lists

use nalgebra::{Point3, Vector3};

use crate::settings::{SEARCH_GRID_MAX_DIVISIONS, SEARCH_GRID_OCCUPANCY};


/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl Aabb {
    pub fn new(min: Point3<f64>, max: Point3<f64>) -> Self {
        Self { min, max }
    }

    /// Smallest box holding every point, `None` for no points.
    pub fn from_points<I: IntoIterator<Item = Point3<f64>>>(points: I) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        Some(iter.fold(Self::new(first, first), |acc, p| Self {
            min: acc.min.inf(&p),
            max: acc.max.sup(&p),
        }))
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    #[inline]
    pub fn contains(&self, p: &Point3<f64>) -> bool {
        (0..3).all(|i| p[i] >= self.min[i] && p[i] <= self.max[i])
    }

    pub fn extent(&self) -> Vector3<f64> {
        self.max - self.min
    }
}

/// Uniform grid of body lists in compressed row form.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchGrid {
    bounds: Option<Aabb>,
    divisions: [usize; 3],
    starts: Vec<u32>,
    items: Vec<u32>,
}

impl SearchGrid {
    pub fn build(boxes: &[Aabb]) -> Self {
        let Some(bounds) = boxes.iter().copied().reduce(|a, b| a.union(&b)) else {
            return Self {
                bounds: None,
                divisions: [1; 3],
                starts: vec![0, 0],
                items: Vec::new(),
            };
        };

        let per_axis = (boxes.len() as f64 / SEARCH_GRID_OCCUPANCY).cbrt().ceil() as usize;
        let extent = bounds.extent();
        let divisions = [0, 1, 2].map(|i| {
            if extent[i] > 0.0 {
                per_axis.clamp(1, SEARCH_GRID_MAX_DIVISIONS)
            } else {
                1
            }
        });

        let mut grid = Self {
            bounds: Some(bounds),
            divisions,
            starts: Vec::new(),
            items: Vec::new(),
        };

        let n_cells = divisions.iter().product::<usize>();
        let mut counts = vec![0u32; n_cells + 1];
        for b in boxes {
            grid.for_each_cell(b, |cell| counts[cell + 1] += 1);
        }
        for i in 0..n_cells {
            counts[i + 1] += counts[i];
        }

        let mut fill = counts.clone();
        let mut items = vec![0u32; counts[n_cells] as usize];
        for (index, b) in boxes.iter().enumerate() {
            grid.for_each_cell(b, |cell| {
                items[fill[cell] as usize] = index as u32;
                fill[cell] += 1;
            });
        }

        grid.starts = counts;
        grid.items = items;
        grid
    }

    #[inline]
    fn axis_cell(&self, bounds: &Aabb, axis: usize, x: f64) -> usize {
        let n = self.divisions[axis];
        let extent = bounds.max[axis] - bounds.min[axis];
        if extent <= 0.0 {
            return 0;
        }
        let cell = ((x - bounds.min[axis]) / extent * n as f64).floor();
        (cell.max(0.0) as usize).min(n - 1)
    }

    fn for_each_cell(&self, b: &Aabb, mut f: impl FnMut(usize)) {
        let Some(bounds) = &self.bounds else {
            return;
        };
        let lo = [0, 1, 2].map(|i| self.axis_cell(bounds, i, b.min[i]));
        let hi = [0, 1, 2].map(|i| self.axis_cell(bounds, i, b.max[i]));
        let [nx, ny, _] = self.divisions;
        for k in lo[2]..=hi[2] {
            for j in lo[1]..=hi[1] {
                for i in lo[0]..=hi[0] {
                    f(i + j * nx + k * nx * ny);
                }
            }
        }
    }

    /// Bodies whose boxes overlap the grid cell holding `p`, in ascending order.
    #[inline]
    pub fn candidates(&self, p: &Point3<f64>) -> &[u32] {
        let Some(bounds) = &self.bounds else {
            return &[];
        };
        if !bounds.contains(p) {
            return &[];
        }
        let [nx, ny, _] = self.divisions;
        let cell = self.axis_cell(bounds, 0, p.x)
            + self.axis_cell(bounds, 1, p.y) * nx
            + self.axis_cell(bounds, 2, p.z) * nx * ny;
        &self.items[self.starts[cell] as usize..self.starts[cell + 1] as usize]
    }
}

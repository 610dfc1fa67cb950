use std::{fs::File, io::BufWriter, path::Path};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::geometry::Geometry;
use crate::survey::SurveySummary;
use crate::universe::MaterialId;
use crate::zones::Enumeration;


#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterialReport {
    pub name: String,
    pub depletable: bool,
    pub divided: bool,
    /// Depletion sub-zones of the material.
    pub zones: usize,
    /// Survey hits, when a survey ran.
    pub hits: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurveyReport {
    pub samples: usize,
    pub void: u64,
    pub outside: u64,
    pub undefined: u64,
    pub checked: u64,
    pub elapsed_seconds: f64,
}

impl From<&SurveySummary> for SurveyReport {
    fn from(summary: &SurveySummary) -> Self {
        Self {
            samples: summary.samples,
            void: summary.tally.void,
            outside: summary.tally.outside,
            undefined: summary.tally.undefined,
            checked: summary.tally.checked,
            elapsed_seconds: summary.elapsed.as_secs_f64(),
        }
    }
}

/// Summary of one run: the zone layout, the depletion tables and the survey.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub timestamp: String,
    pub geometry: String,
    pub universes: usize,
    pub depth: usize,
    pub max_zone: u64,
    pub leaves: u64,
    pub materials: Vec<MaterialReport>,
    pub survey: Option<SurveyReport>,
}

impl RunReport {
    pub fn new(
        name: &str,
        geometry: &Geometry,
        enumeration: &Enumeration,
        survey: Option<&SurveySummary>,
    ) -> Self {
        let materials = geometry
            .catalog()
            .materials
            .iter()
            .enumerate()
            .map(|(index, material)| MaterialReport {
                name: material.name.clone(),
                depletable: material.depletable,
                divided: material.divided,
                zones: enumeration.tables.zone_count(MaterialId(index)),
                hits: survey.map(|s| s.tally.hits[index]),
            })
            .collect();

        Self {
            timestamp: chrono::Local::now().to_rfc3339(),
            geometry: name.to_string(),
            universes: geometry.catalog().universes.len(),
            depth: geometry.depth(),
            max_zone: geometry.max_zone(),
            leaves: enumeration.leaves,
            materials,
            survey: survey.map(SurveyReport::from),
        }
    }

    /// Writes the report as pretty-printed JSON.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("failed to create report file {}", path.display()))?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self).context("failed to write report")?;
        Ok(())
    }
}

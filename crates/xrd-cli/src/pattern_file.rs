//! Reader for two-column pattern files.
//!
//! Each data line holds a two-theta angle and an intensity separated by
//! whitespace or commas; further columns are ignored. `#` starts a comment.
//! An optional `wavelength <value>` line overrides the configured wavelength.

use crate::error::{CliError, Result};
use anyhow::{Context, bail};
use std::path::Path;
use tracing::info;
use xrdpp::core::pattern::experimental::ExperimentalPattern;
use xrdpp::core::pattern::{Pattern, PatternSettings};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PatternData {
    pub wavelength: Option<f64>,
    pub angles: Vec<f64>,
    pub intensities: Vec<f64>,
}

pub fn parse(content: &str) -> anyhow::Result<PatternData> {
    let mut data = PatternData::default();
    for (index, raw) in content.lines().enumerate() {
        let line_number = index + 1;
        let line = raw.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }

        let mut fields = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|field| !field.is_empty());
        let Some(first) = fields.next() else {
            continue;
        };

        if first.eq_ignore_ascii_case("wavelength") {
            let value = fields
                .next()
                .with_context(|| format!("line {line_number}: wavelength has no value"))?;
            let wavelength: f64 = value
                .parse()
                .with_context(|| format!("line {line_number}: invalid wavelength '{value}'"))?;
            if !wavelength.is_finite() || wavelength <= 0.0 {
                bail!("line {line_number}: wavelength must be positive, got {wavelength}");
            }
            if data.wavelength.replace(wavelength).is_some() {
                bail!("line {line_number}: wavelength given more than once");
            }
            continue;
        }

        let Some(second) = fields.next() else {
            bail!("line {line_number}: expected two columns, found one");
        };
        let angle: f64 = first
            .parse()
            .with_context(|| format!("line {line_number}: invalid angle '{first}'"))?;
        let intensity: f64 = second
            .parse()
            .with_context(|| format!("line {line_number}: invalid intensity '{second}'"))?;
        data.angles.push(angle);
        data.intensities.push(intensity);
    }
    if data.angles.is_empty() {
        bail!("no data lines");
    }
    Ok(data)
}

/// Reads a reference pattern; a wavelength in the file takes precedence over
/// the one in `settings`.
pub fn load(path: &Path, settings: &PatternSettings) -> Result<Pattern> {
    let content = std::fs::read_to_string(path)?;
    let data = parse(&content).map_err(|source| CliError::PatternFile {
        path: path.to_path_buf(),
        source,
    })?;

    let mut settings = settings.clone();
    if let Some(wavelength) = data.wavelength {
        settings.wavelength = wavelength;
    }
    let pattern = ExperimentalPattern::new(settings, &data.angles, &data.intensities)?;
    info!(
        points = data.angles.len(),
        continuous = pattern.is_continuous(),
        wavelength = pattern.settings().wavelength,
        "Loaded reference pattern from {}",
        path.display()
    );
    Ok(pattern.into())
}

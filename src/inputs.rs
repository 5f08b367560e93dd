//! Loaders for the optional per-sample inputs: display order and names, fill
//! colours, and sample groups coloured by group name.

use crate::error::{Error, Result};
use crate::squares::SampleOrder;
use rustc_hash::FxHashMap;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Read `sample<TAB>display name` lines. The display name column is optional.
pub fn load_order_and_rename(path: &Path) -> Result<SampleOrder> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut order = SampleOrder::new();

    for line in reader.lines() {
        let line = line?;
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }

        let mut parts = line.splitn(2, '\t');
        let sample = parts.next().unwrap_or_default().trim();
        let display = parts
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        order.insert(sample, display);
    }

    Ok(order)
}

/// Read `sample<TAB>colour` lines. Accepted colours are `#rgb`/`#rrggbb`,
/// alphabetic SVG colour names, and `r,g,b` triples (written as
/// `rgb(r,g,b)`); anything else is rejected with its line number.
pub fn load_row_colours(path: &Path) -> Result<FxHashMap<String, String>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut colours = FxHashMap::default();

    for (line_idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() >= 2 {
            let colour = parse_colour(parts[1].trim()).ok_or_else(|| {
                Error::parse(
                    line_idx + 1,
                    format!("invalid colour '{}' for '{}'", parts[1].trim(), parts[0]),
                )
            })?;
            colours.insert(parts[0].to_string(), colour);
        }
    }

    Ok(colours)
}

fn parse_colour(colour: &str) -> Option<String> {
    if let Some(hex) = colour.strip_prefix('#') {
        let valid = matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit());
        return valid.then(|| colour.to_string());
    }
    if !colour.is_empty() && colour.chars().all(|c| c.is_ascii_alphabetic()) {
        return Some(colour.to_string());
    }
    let rgb_parts: Vec<u8> = colour
        .split(',')
        .map(|s| s.trim().parse().ok())
        .collect::<Option<Vec<u8>>>()?;
    (rgb_parts.len() == 3)
        .then(|| format!("rgb({},{},{})", rgb_parts[0], rgb_parts[1], rgb_parts[2]))
}

/// Read `sample<TAB>group` lines, e.g. the treatment or site of each sample.
pub fn load_sample_groups(path: &Path) -> Result<FxHashMap<String, String>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut groups = FxHashMap::default();

    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let parts: Vec<&str> = line.split('\t').map(str::trim).collect();
        if parts.len() >= 2 && !parts[1].is_empty() {
            groups.insert(parts[0].to_string(), parts[1].to_string());
        }
    }

    Ok(groups)
}

/// Group each sample by the part of its name before `separator`
/// (`soil_1`, `soil_2` -> `soil`).
pub fn prefix_groups<'a>(
    samples: impl IntoIterator<Item = &'a str>,
    separator: char,
) -> FxHashMap<String, String> {
    samples
        .into_iter()
        .map(|s| {
            let group = s.split(separator).next().unwrap_or(s);
            (s.to_string(), group.to_string())
        })
        .collect()
}

/// Colour for a sample group: the hue comes from the SHA-256 of the group
/// name, saturation and lightness are fixed so every group stays readable on
/// white.
pub fn group_colour(group: &str) -> String {
    let digest = Sha256::digest(group.as_bytes());
    let hue = u16::from_be_bytes([digest[0], digest[1]]) as f64 % 360.0;
    let (saturation, lightness) = (0.65, 0.45);

    let chroma = (1.0 - (2.0 * lightness - 1.0f64).abs()) * saturation;
    let sector = hue / 60.0;
    let x = chroma * (1.0 - (sector % 2.0 - 1.0).abs());
    let (r, g, b) = match sector as u8 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };
    let m = lightness - chroma / 2.0;
    let channel = |c: f64| ((c + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    format!("#{:02x}{:02x}{:02x}", channel(r), channel(g), channel(b))
}

/// Fill colour for every grouped sample.
pub fn group_colours(groups: &FxHashMap<String, String>) -> FxHashMap<String, String> {
    groups
        .iter()
        .map(|(sample, group)| (sample.clone(), group_colour(group)))
        .collect()
}

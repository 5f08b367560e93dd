//! Reader for PHYLIP-style distance matrices as written by Express Beta
//! Diversity (`.diss`). Both the lower-triangular layout and the full square
//! layout are accepted; only the lower triangle is read.

use crate::error::{Error, Result};
use log::{debug, info};
use rustc_hash::{FxHashMap, FxHashSet};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// Ordered samples with a symmetric pairwise distance lookup.
pub trait Distances {
    fn sample_names(&self) -> &[String];

    /// Distance between two samples, `None` if either name is unknown.
    fn distance(&self, a: &str, b: &str) -> Option<f64>;

    fn contains(&self, name: &str) -> bool {
        self.sample_names().iter().any(|s| s == name)
    }
}

/// A parsed distance matrix.
#[derive(Debug, Clone)]
pub struct DistanceMatrix {
    names: Vec<String>,
    index: FxHashMap<String, usize>,
    // lower[i][j] for j < i
    lower: Vec<Vec<f64>>,
}

impl DistanceMatrix {
    /// Build a matrix from sample names and their lower triangle
    /// (`lower[i]` holds the distances of sample `i` to samples `0..i`).
    pub fn from_lower_triangle(names: Vec<String>, lower: Vec<Vec<f64>>) -> Result<Self> {
        if names.len() != lower.len() {
            return Err(Error::parse(
                0,
                format!("{} names but {} rows", names.len(), lower.len()),
            ));
        }
        let mut index = FxHashMap::default();
        for (i, name) in names.iter().enumerate() {
            if lower[i].len() != i {
                return Err(Error::parse(
                    i + 1,
                    format!("row '{}' has {} values, expected {}", name, lower[i].len(), i),
                ));
            }
            if let Some(d) = lower[i].iter().find(|d| !(0.0..=1.0).contains(*d)) {
                return Err(Error::parse(
                    i + 1,
                    format!("distance {} for '{}' is outside 0..1", d, name),
                ));
            }
            if index.insert(name.clone(), i).is_some() {
                return Err(Error::parse(i + 1, format!("duplicate sample name '{}'", name)));
            }
        }
        Ok(DistanceMatrix { names, index, lower })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let matrix = Self::from_reader(BufReader::new(file))?;
        info!("Parsed in {} samples", matrix.len());
        Ok(matrix)
    }

    pub fn from_reader<R: Read>(reader: BufReader<R>) -> Result<Self> {
        let mut expected: Option<usize> = None;
        let mut names = Vec::new();
        let mut lower = Vec::new();
        let mut square = false;
        let mut seen: FxHashSet<String> = FxHashSet::default();
        let mut last_line = 0;

        for (line_idx, line) in reader.lines().enumerate() {
            let line = line?;
            let line_no = line_idx + 1;
            last_line = line_no;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let n = match expected {
                None => {
                    let n = line.parse::<usize>().map_err(|_| {
                        Error::parse(line_no, format!("expected sample count, found '{}'", line))
                    })?;
                    expected = Some(n);
                    continue;
                }
                Some(n) => n,
            };

            let row = names.len();
            if row >= n {
                return Err(Error::parse(
                    line_no,
                    format!("more rows than the {} samples declared", n),
                ));
            }

            let mut parts = line.split_whitespace();
            let name = parts.next().unwrap_or_default().to_string();
            if !seen.insert(name.clone()) {
                return Err(Error::parse(line_no, format!("duplicate sample name '{}'", name)));
            }
            let values = parts
                .map(|v| match v.parse::<f64>() {
                    Ok(d) if (0.0..=1.0).contains(&d) => Ok(d),
                    Ok(_) => Err(Error::parse(
                        line_no,
                        format!("distance '{}' for '{}' is outside 0..1", v, name),
                    )),
                    Err(_) => Err(Error::parse(
                        line_no,
                        format!("invalid distance '{}' for '{}'", v, name),
                    )),
                })
                .collect::<Result<Vec<f64>>>()?;

            // The first data row decides the layout: no values for lower
            // triangular, n values (diagonal included) for a square matrix.
            if row == 0 {
                square = values.len() == n;
            }
            let wanted = if square { n } else { row };
            if values.len() != wanted {
                return Err(Error::parse(
                    line_no,
                    format!("'{}' has {} distances, expected {}", name, values.len(), wanted),
                ));
            }

            names.push(name);
            lower.push(values[..row].to_vec());
        }

        let n = expected.ok_or_else(|| Error::parse(1, "empty distance matrix file"))?;
        if names.len() != n {
            return Err(Error::parse(
                last_line,
                format!("expected {} samples, found {}", n, names.len()),
            ));
        }
        debug!(
            "Read {} layout distance matrix",
            if square { "square" } else { "lower triangular" }
        );

        Self::from_lower_triangle(names, lower)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Distances for DistanceMatrix {
    fn sample_names(&self) -> &[String] {
        &self.names
    }

    fn distance(&self, a: &str, b: &str) -> Option<f64> {
        let i = *self.index.get(a)?;
        let j = *self.index.get(b)?;
        if i == j {
            Some(0.0)
        } else if i > j {
            Some(self.lower[i][j])
        } else {
            Some(self.lower[j][i])
        }
    }

    fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }
}

//! Beta diversity squares: one square per ordered sample pair, sized by the
//! rescaled similarity of the two samples, with sample names along the left
//! and top edges.

use crate::error::{Error, Result};
use crate::matrix::{DistanceMatrix, Distances};
use crate::svg::{escape_xml, Attributes, SvgWriter};
use log::{debug, warn};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::path::Path;

pub const BOX_SIZE: f64 = 20.0;
pub const BOXES_START_X_OFFSET: f64 = 200.0;
pub const BOXES_START_Y_OFFSET: f64 = 200.0;
pub const WHITE_BREAK_SIZE: f64 = BOX_SIZE;
pub const LABEL_X: f64 = 25.0;
pub const DEFAULT_FILL: &str = "#000000";
const VERTICAL_TRANSFORM: &str = "matrix(0,-1,1,0,0,0)";

/// Ordered `sample -> display name` mapping. Its order defines the order (and
/// subset) of samples drawn; a `None` display name keeps the sample id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleOrder {
    entries: Vec<(String, Option<String>)>,
}

impl SampleOrder {
    pub fn new() -> Self {
        SampleOrder { entries: Vec::new() }
    }

    /// Add a sample at the end, or replace the display name of a sample that
    /// is already listed without moving it.
    pub fn insert(&mut self, sample: impl Into<String>, display: Option<String>) {
        let sample = sample.into();
        match self.entries.iter_mut().find(|(s, _)| *s == sample) {
            Some(entry) => entry.1 = display,
            None => self.entries.push((sample, display)),
        }
    }

    pub fn samples(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(s, _)| s.as_str())
    }

    pub fn display_name(&self, sample: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(s, _)| s == sample)
            .and_then(|(_, d)| d.as_deref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, Option<String>)> for SampleOrder {
    fn from_iter<I: IntoIterator<Item = (S, Option<String>)>>(iter: I) -> Self {
        let mut order = SampleOrder::new();
        for (sample, display) in iter {
            order.insert(sample, display);
        }
        order
    }
}

/// How the similarity range mapped onto `0..BOX_SIZE` is chosen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RangeMethod {
    /// Percentiles (0-100) of the pairwise similarity distribution.
    Percentile { low: f64, high: f64 },
    /// A fixed similarity range.
    Fixed { min: f64, max: f64 },
}

impl Default for RangeMethod {
    fn default() -> Self {
        RangeMethod::Percentile {
            low: 10.0,
            high: 90.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    pub order_and_rename: Option<SampleOrder>,
    /// Fill colour keyed by the column sample of each square.
    pub row_colours: FxHashMap<String, String>,
    pub range: RangeMethod,
}

/// Receives the non-fatal problems found during a render.
pub trait Diagnostics {
    fn warn(&mut self, message: &str);
}

/// Forwards diagnostics to the `log` facade.
pub struct LogDiagnostics;

impl Diagnostics for LogDiagnostics {
    fn warn(&mut self, message: &str) {
        warn!("{}", message);
    }
}

impl Diagnostics for Vec<String> {
    fn warn(&mut self, message: &str) {
        self.push(message.to_string());
    }
}

/// Percentile of an ascending slice, interpolating linearly between the two
/// closest ranks (`rank = p/100 * (n-1)`).
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = (p / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}

/// Similarity range mapped onto square sizes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizationRange {
    pub min: f64,
    pub max: f64,
}

impl NormalizationRange {
    /// Range from a set of similarities. With no similarities there is
    /// nothing to draw and the range collapses to `0..0`.
    pub fn from_similarities(mut similarities: Vec<f64>, method: RangeMethod) -> Result<Self> {
        match method {
            RangeMethod::Fixed { min, max } => {
                if !(min <= max) {
                    return Err(Error::InvalidRange(format!(
                        "fixed minimum {} exceeds maximum {}",
                        min, max
                    )));
                }
                Ok(NormalizationRange { min, max })
            }
            RangeMethod::Percentile { low, high } => {
                if !(0.0..=100.0).contains(&low) || !(0.0..=100.0).contains(&high) || low > high {
                    return Err(Error::InvalidRange(format!(
                        "percentiles {} and {} must satisfy 0 <= low <= high <= 100",
                        low, high
                    )));
                }
                similarities.sort_by(|a, b| a.total_cmp(b));
                let min = percentile(&similarities, low).unwrap_or(0.0);
                let max = percentile(&similarities, high).unwrap_or(0.0);
                Ok(NormalizationRange { min, max })
            }
        }
    }

    /// Side length of the square for one similarity. Values below `min`
    /// collapse to 0; a degenerate range draws everything else full size.
    pub fn square_size(&self, similarity: f64) -> f64 {
        if similarity < self.min {
            0.0
        } else if self.max <= self.min {
            BOX_SIZE
        } else {
            (similarity - self.min) / (self.max - self.min) * BOX_SIZE
        }
    }
}

/// `1 - distance` for every unordered pair, in the matrix's own order.
fn pairwise_similarities<D: Distances + Sync>(matrix: &D) -> Vec<f64> {
    let names = matrix.sample_names();
    let n = names.len();
    (0..n)
        .into_par_iter()
        .flat_map_iter(move |i| {
            (i + 1..n).filter_map(move |j| {
                matrix
                    .distance(&names[i], &names[j])
                    .map(|d| 1.0 - d)
            })
        })
        .collect()
}

/// Load a distance matrix file and render it. Warnings go to the `log` facade.
pub fn render(distances_path: &Path, options: &RenderOptions) -> Result<String> {
    let matrix = DistanceMatrix::from_file(distances_path)?;
    render_matrix(&matrix, options, &mut LogDiagnostics)
}

/// Render an already loaded distance matrix as an SVG document.
pub fn render_matrix<D, W>(matrix: &D, options: &RenderOptions, diagnostics: &mut W) -> Result<String>
where
    D: Distances + Sync,
    W: Diagnostics + ?Sized,
{
    let order: Vec<&str> = match options.order_and_rename {
        Some(ref rename) => rename.samples().collect(),
        None => matrix.sample_names().iter().map(String::as_str).collect(),
    };
    if let Some(missing) = order.iter().find(|s| !matrix.contains(s)) {
        return Err(Error::UnknownSample(missing.to_string()));
    }
    debug!("Found order of samples: {:?}", order);

    let n = order.len() as f64;
    let width = BOXES_START_X_OFFSET + BOX_SIZE * n + WHITE_BREAK_SIZE;
    let height = BOXES_START_Y_OFFSET + BOX_SIZE * n + WHITE_BREAK_SIZE;

    let range = NormalizationRange::from_similarities(pairwise_similarities(matrix), options.range)?;
    debug!("Normalization range: {:.4} - {:.4}", range.min, range.max);

    let mut svg = SvgWriter::new(width, height);

    // Sample names down the left and, rotated, along the top
    for (i, &sample) in order.iter().enumerate() {
        let name = match options.order_and_rename {
            Some(ref rename) => match rename.display_name(sample) {
                Some(display) => display,
                None => {
                    diagnostics.warn(&format!(
                        "No replacement name found for {}, so using {} instead",
                        sample, sample
                    ));
                    sample
                }
            },
            None => sample,
        };
        let name = escape_xml(name);
        let offset = BOX_SIZE * i as f64 + BOX_SIZE / 4.0;

        svg.text(
            &name,
            &Attributes::new()
                .with("x", LABEL_X)
                .with("y", BOXES_START_Y_OFFSET + offset),
        );
        svg.text(
            &name,
            &Attributes::new()
                .with("transform", VERTICAL_TRANSFORM)
                .with("x", LABEL_X - BOXES_START_Y_OFFSET)
                .with("y", BOXES_START_X_OFFSET + offset),
        );
    }

    for (i, &sample1) in order.iter().enumerate() {
        for (j, &sample2) in order.iter().enumerate() {
            if i == j {
                continue;
            }
            let distance = matrix
                .distance(sample1, sample2)
                .ok_or_else(|| Error::UnknownSample(sample2.to_string()))?;
            let size = range.square_size(1.0 - distance);

            let fill = options
                .row_colours
                .get(sample2)
                .map(|c| escape_xml(c))
                .unwrap_or_else(|| DEFAULT_FILL.to_string());

            svg.rect(
                &Attributes::new()
                    .with("x", BOXES_START_X_OFFSET + i as f64 * BOX_SIZE - size / 2.0)
                    .with("y", BOXES_START_Y_OFFSET + j as f64 * BOX_SIZE - size / 2.0)
                    .with("width", size)
                    .with("height", size)
                    .with("fill", fill)
                    .with("shape-rendering", "crispEdges"),
            );
        }
    }

    debug!("Wrote {} elements", svg.element_count());
    Ok(svg.to_svg())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn abc() -> DistanceMatrix {
        DistanceMatrix::from_lower_triangle(
            vec!["A".into(), "B".into(), "C".into()],
            vec![vec![], vec![0.3], vec![0.7, 0.5]],
        )
        .unwrap()
    }

    fn render_quiet(matrix: &DistanceMatrix, options: &RenderOptions) -> (String, Vec<String>) {
        let mut warnings = Vec::new();
        let svg = render_matrix(matrix, options, &mut warnings).unwrap();
        (svg, warnings)
    }

    /// (x, y, width, fill) of every `<rect>` in a document.
    fn rects(svg: &str) -> Vec<(f64, f64, f64, String)> {
        svg.split("<rect")
            .skip(1)
            .map(|l| {
                let attr = |name: &str| {
                    let key = format!(" {}=\"", name);
                    let start = l.find(&key).unwrap() + key.len();
                    let end = start + l[start..].find('"').unwrap();
                    l[start..end].to_string()
                };
                (
                    attr("x").parse::<f64>().unwrap(),
                    attr("y").parse::<f64>().unwrap(),
                    attr("width").parse::<f64>().unwrap(),
                    attr("fill"),
                )
            })
            .collect()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn percentile_interpolates_linearly() {
        let v = [0.3, 0.5, 0.7];
        assert!(close(percentile(&v, 10.0).unwrap(), 0.34));
        assert!(close(percentile(&v, 90.0).unwrap(), 0.66));
        assert!(close(percentile(&v, 50.0).unwrap(), 0.5));
        assert_eq!(percentile(&v, 0.0), Some(0.3));
        assert_eq!(percentile(&v, 100.0), Some(0.7));
        assert_eq!(percentile(&[0.42], 90.0), Some(0.42));
        assert_eq!(percentile(&[], 10.0), None);

        let ten: Vec<f64> = (1..=10).map(|v| v as f64).collect();
        assert!(close(percentile(&ten, 10.0).unwrap(), 1.9));
        assert!(close(percentile(&ten, 90.0).unwrap(), 9.1));
    }

    #[test]
    fn rescales_between_min_and_max() {
        let range = NormalizationRange { min: 0.2, max: 0.6 };
        assert!(close(range.square_size(0.4), 10.0));
        assert!(close(range.square_size(0.6), BOX_SIZE));
        assert_eq!(range.square_size(0.2), 0.0);
    }

    #[test]
    fn clamps_below_min_to_zero() {
        let range = NormalizationRange { min: 0.2, max: 0.6 };
        assert_eq!(range.square_size(0.19), 0.0);
        assert_eq!(range.square_size(0.0), 0.0);
    }

    #[test]
    fn degenerate_range_draws_full_squares() {
        let range = NormalizationRange { min: 0.5, max: 0.5 };
        assert_eq!(range.square_size(0.5), BOX_SIZE);
        assert_eq!(range.square_size(0.4), 0.0);

        let flat = DistanceMatrix::from_lower_triangle(
            vec!["A".into(), "B".into(), "C".into()],
            vec![vec![], vec![0.5], vec![0.5, 0.5]],
        )
        .unwrap();
        let (svg, _) = render_quiet(&flat, &RenderOptions::default());
        assert!(!svg.contains("NaN") && !svg.contains("inf"));
        assert!(rects(&svg).iter().all(|r| r.2 == BOX_SIZE));
    }

    #[test]
    fn range_rejects_bad_configuration() {
        let bad = RangeMethod::Percentile {
            low: 90.0,
            high: 10.0,
        };
        assert!(matches!(
            NormalizationRange::from_similarities(vec![0.1], bad),
            Err(Error::InvalidRange(_))
        ));
        let fixed = RangeMethod::Fixed { min: 0.6, max: 0.2 };
        assert!(NormalizationRange::from_similarities(vec![], fixed).is_err());
    }

    #[test]
    fn fixed_range_ignores_distribution() {
        let range = NormalizationRange::from_similarities(
            vec![0.9, 0.1],
            RangeMethod::Fixed { min: 0.2, max: 0.6 },
        )
        .unwrap();
        assert_eq!(range, NormalizationRange { min: 0.2, max: 0.6 });
    }

    #[test]
    fn three_sample_scenario() {
        let (svg, warnings) = render_quiet(&abc(), &RenderOptions::default());
        assert!(warnings.is_empty());

        // similarities 0.7 (A,B), 0.3 (A,C), 0.5 (B,C); range 0.34..0.66
        let squares = rects(&svg);
        assert_eq!(squares.len(), 6);
        let size_of = |i: usize, j: usize| {
            squares
                .iter()
                .find(|r| {
                    close(r.0 + r.2 / 2.0, 200.0 + 20.0 * i as f64)
                        && close(r.1 + r.2 / 2.0, 200.0 + 20.0 * j as f64)
                })
                .map(|r| r.2)
                .unwrap()
        };
        assert!((size_of(0, 1) - 22.5).abs() < 1e-6);
        assert!((size_of(1, 0) - 22.5).abs() < 1e-6);
        assert_eq!(size_of(0, 2), 0.0);
        assert_eq!(size_of(2, 0), 0.0);
        assert!((size_of(1, 2) - 10.0).abs() < 1e-6);
        assert!((size_of(2, 1) - 10.0).abs() < 1e-6);

        assert!(svg.starts_with(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" version=\"1.1\" width=\"280\" height=\"280\""
        ));
        assert!(svg.ends_with("</svg>"));
    }

    #[test]
    fn zero_size_square_sits_on_cell_centre() {
        let (svg, _) = render_quiet(&abc(), &RenderOptions::default());
        assert!(svg.contains(
            "<rect x=\"200\" y=\"240\" width=\"0\" height=\"0\" fill=\"#000000\" shape-rendering=\"crispEdges\" />"
        ));
    }

    #[test]
    fn counts_squares_and_labels() {
        for n in 1..6usize {
            let names: Vec<String> = (0..n).map(|i| format!("s{}", i)).collect();
            let lower: Vec<Vec<f64>> = (0..n)
                .map(|i| (0..i).map(|j| (i + j) as f64 / (2 * n) as f64).collect())
                .collect();
            let m = DistanceMatrix::from_lower_triangle(names, lower).unwrap();
            let (svg, _) = render_quiet(&m, &RenderOptions::default());
            assert_eq!(svg.matches("<rect").count(), n * (n - 1));
            assert_eq!(svg.matches("<text").count(), 2 * n);
        }
    }

    #[test]
    fn diagonal_is_blank() {
        let (svg, _) = render_quiet(&abc(), &RenderOptions::default());
        for (x, y, w, _) in rects(&svg) {
            assert!(!close(x + w / 2.0, y + w / 2.0));
        }
    }

    #[test]
    fn rendering_is_idempotent() {
        let options = RenderOptions::default();
        let (first, _) = render_quiet(&abc(), &options);
        let (second, _) = render_quiet(&abc(), &options);
        assert_eq!(first, second);
    }

    #[test]
    fn labels_are_placed_on_both_edges() {
        let (svg, _) = render_quiet(&abc(), &RenderOptions::default());
        assert!(svg.contains("<text x=\"25\" y=\"205\">A</text>"));
        assert!(svg.contains("<text x=\"25\" y=\"245\">C</text>"));
        assert!(svg.contains(
            "<text transform=\"matrix(0,-1,1,0,0,0)\" x=\"-175\" y=\"225\">B</text>"
        ));
    }

    #[test]
    fn colour_follows_column_sample() {
        let mut options = RenderOptions::default();
        options.row_colours.insert("B".into(), "#ff0000".into());
        let (svg, _) = render_quiet(&abc(), &options);
        let squares = rects(&svg);
        for (_, y, w, fill) in &squares {
            let j = ((y + w / 2.0 - 200.0) / 20.0).round() as usize;
            if j == 1 {
                assert_eq!(fill, "#ff0000");
            } else {
                assert_eq!(fill, DEFAULT_FILL);
            }
        }
        assert_eq!(squares.iter().filter(|r| r.3 == "#ff0000").count(), 2);
    }

    #[test]
    fn fill_values_cannot_break_out_of_the_attribute() {
        let mut options = RenderOptions::default();
        options
            .row_colours
            .insert("A".into(), "red\" onload=\"x".into());
        let (svg, _) = render_quiet(&abc(), &options);
        assert!(svg.contains("fill=\"red&quot; onload=&quot;x\""));
        assert!(!svg.contains("onload=\"x"));
    }

    #[test]
    fn order_and_rename_reorders_and_relabels() {
        let order: SampleOrder = vec![
            ("C", Some("Gamma".to_string())),
            ("A", Some("Alpha".to_string())),
        ]
        .into_iter()
        .collect();
        let options = RenderOptions {
            order_and_rename: Some(order),
            ..Default::default()
        };
        let (svg, warnings) = render_quiet(&abc(), &options);
        assert!(warnings.is_empty());
        assert!(svg.contains("<text x=\"25\" y=\"205\">Gamma</text>"));
        assert!(svg.contains("<text x=\"25\" y=\"225\">Alpha</text>"));
        assert_eq!(svg.matches("<rect").count(), 2);
        assert!(svg.contains("width=\"260\" height=\"260\""));
    }

    #[test]
    fn rename_fallback_warns() {
        let single = DistanceMatrix::from_lower_triangle(vec!["s1".into()], vec![vec![]]).unwrap();

        let renamed: SampleOrder = vec![("s1", Some("Sample One".to_string()))]
            .into_iter()
            .collect();
        let options = RenderOptions {
            order_and_rename: Some(renamed),
            ..Default::default()
        };
        let (svg, warnings) = render_quiet(&single, &options);
        assert!(svg.contains(">Sample One</text>"));
        assert!(warnings.is_empty());

        let unnamed: SampleOrder = vec![("s1", None::<String>)].into_iter().collect();
        let options = RenderOptions {
            order_and_rename: Some(unnamed),
            ..Default::default()
        };
        let (svg, warnings) = render_quiet(&single, &options);
        assert!(svg.contains("<text x=\"25\" y=\"205\">s1</text>"));
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("s1"));
    }

    #[test]
    fn unknown_sample_in_order_is_an_error() {
        let order: SampleOrder = vec![("A", None::<String>), ("Z", None)].into_iter().collect();
        let options = RenderOptions {
            order_and_rename: Some(order),
            ..Default::default()
        };
        let mut warnings = Vec::new();
        let err = render_matrix(&abc(), &options, &mut warnings).unwrap_err();
        assert!(matches!(err, Error::UnknownSample(ref s) if s == "Z"));
    }

    #[test]
    fn range_uses_all_matrix_pairs_not_display_order() {
        let order: SampleOrder = vec![("A", None::<String>), ("B", None)].into_iter().collect();
        let options = RenderOptions {
            order_and_rename: Some(order),
            ..Default::default()
        };
        let (svg, _) = render_quiet(&abc(), &options);
        // A,B similarity 0.7 against the full-matrix range 0.34..0.66
        assert!(rects(&svg).iter().all(|r| (r.2 - 22.5).abs() < 1e-6));
    }

    #[test]
    fn label_text_is_escaped() {
        let m = DistanceMatrix::from_lower_triangle(
            vec!["a&b".into(), "c".into()],
            vec![vec![], vec![0.1]],
        )
        .unwrap();
        let (svg, _) = render_quiet(&m, &RenderOptions::default());
        assert!(svg.contains(">a&amp;b</text>"));
    }

    #[test]
    fn render_reads_matrix_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "3\nA\nB\t0.3\nC\t0.7\t0.5").unwrap();
        let from_file = render(file.path(), &RenderOptions::default()).unwrap();
        let (in_memory, _) = render_quiet(&abc(), &RenderOptions::default());
        assert_eq!(from_file, in_memory);
    }

    #[test]
    fn render_propagates_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "2\nA\nB\tnot-a-number").unwrap();
        let err = render(file.path(), &RenderOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Parse { line: 3, .. }));
    }
}

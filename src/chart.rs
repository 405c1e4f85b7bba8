use json::{object, JsonValue};
use std::fmt::Display;
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

use crate::dataset::{DatasetStore, Sample};

/// Number of evenly spaced points on the predicted line (20 intervals)
pub const LINE_SAMPLES: usize = 21;

/// An observed sample drawn as a bubble
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BubblePoint {
    pub x: f64,
    pub y: f64,
    pub r: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinePoint {
    pub x: f64,
    pub y: f64,
}

/// Everything the chart shows. Rebuilt from scratch, never patched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChartSeries {
    pub points: Vec<BubblePoint>,
    pub predicted_line: Vec<LinePoint>,
}

impl ChartSeries {
    pub fn to_json(&self) -> JsonValue {
        let mut points = JsonValue::new_array();
        for p in &self.points {
            let mut entry = object! {};
            entry["x"] = p.x.into();
            entry["y"] = p.y.into();
            entry["r"] = p.r.into();
            // Pushing onto a fresh array cannot fail
            let _ = points.push(entry);
        }

        let mut line = JsonValue::new_array();
        for p in &self.predicted_line {
            let mut entry = object! {};
            entry["x"] = p.x.into();
            entry["y"] = p.y.into();
            // As above, `line` is always an array
            let _ = line.push(entry);
        }

        let mut data = object! {};
        data["points"] = points;
        data["predictedLine"] = line;
        data
    }
}

/// Bubble size grows linearly with the magnitude of the second input
pub fn bubble_radius(input2: f64) -> f64 {
    input2.abs() * 2f64 + 5f64
}

pub fn scatter_series(samples: &[Sample]) -> Vec<BubblePoint> {
    samples
        .iter()
        .map(|s| BubblePoint {
            x: s.input1,
            y: s.output,
            r: bubble_radius(s.input2),
        })
        .collect()
}

/// Sample the predictor across `[min input1, max input1]` with input2 pinned to 0.
///
/// Points where the predictor fails are left out. When every sample shares
/// the same input1 all points land on that single x.
pub fn predicted_line_series<P, E>(dataset: &DatasetStore, predictor: P) -> Vec<LinePoint>
where
    P: Fn(f64, f64) -> Result<f64, E>,
    E: Display,
{
    let (Ok(min), Ok(max)) = (dataset.min_input1(), dataset.max_input1()) else {
        return vec![];
    };
    let last = LINE_SAMPLES - 1;

    (0..LINE_SAMPLES)
        .filter_map(|i| {
            // Interpolate instead of stepping: `max - min` overflows for wide domains
            let t = i as f64 / last as f64;
            let x = if i == last {
                max
            } else {
                (min * (1f64 - t) + max * t).clamp(min, max)
            };
            match predictor(x, 0f64) {
                Ok(y) => Some(LinePoint { x, y }),
                Err(e) => {
                    tracing::warn!("Leaving x={} off the predicted line: {}", x, e);
                    None
                }
            }
        })
        .collect()
}

/// Build the full chart. Without a predictor the line is empty.
pub fn project<P, E>(dataset: &DatasetStore, predictor: Option<P>) -> ChartSeries
where
    P: Fn(f64, f64) -> Result<f64, E>,
    E: Display,
{
    ChartSeries {
        points: scatter_series(dataset.samples()),
        predicted_line: predictor
            .map(|p| predicted_line_series(dataset, p))
            .unwrap_or_default(),
    }
}

/// Something that can show a chart
pub trait ChartRenderer {
    fn redraw(&mut self, series: &ChartSeries) -> io::Result<()>;
}

/// Writes each redraw to a JSON file, replacing the previous one
pub struct JsonChartWriter {
    path: PathBuf,
}

impl JsonChartWriter {
    pub fn new(path: impl Into<PathBuf>) -> JsonChartWriter {
        JsonChartWriter { path: path.into() }
    }
}

impl ChartRenderer for JsonChartWriter {
    fn redraw(&mut self, series: &ChartSeries) -> io::Result<()> {
        let mut file = File::create(&self.path)?;
        file.write_all(series.to_json().dump().as_bytes())?;

        tracing::info!(
            "Chart written to {} ({} points, {} line samples)",
            self.path.display(),
            series.points.len(),
            series.predicted_line.len()
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(rows: &[(f64, f64, f64)]) -> DatasetStore {
        let mut store = DatasetStore::new();
        for &(a, b, c) in rows {
            store.add(a, b, c).unwrap();
        }
        store
    }

    fn doubling(x: f64, _: f64) -> Result<f64, String> {
        Ok(2.0 * x)
    }

    #[test]
    fn scatter_encodes_input2_as_radius() {
        let store = store_with(&[(1.0, -3.0, 10.0), (2.0, 0.0, 20.0), (3.0, 0.5, 30.0)]);

        let points = scatter_series(store.samples());

        assert_eq!(
            points,
            vec![
                BubblePoint { x: 1.0, y: 10.0, r: 11.0 },
                BubblePoint { x: 2.0, y: 20.0, r: 5.0 },
                BubblePoint { x: 3.0, y: 30.0, r: 6.0 },
            ]
        );
    }

    #[test]
    fn line_spans_input1_domain_in_twenty_steps() {
        let store = store_with(&[(10.0, 1.0, 0.0), (0.0, 2.0, 0.0), (5.0, 3.0, 0.0)]);

        let line = predicted_line_series(&store, doubling);

        assert_eq!(line.len(), LINE_SAMPLES);
        assert_eq!(line[0], LinePoint { x: 0.0, y: 0.0 });
        assert_eq!(line[20], LinePoint { x: 10.0, y: 20.0 });
        assert!((line[1].x - 0.5).abs() < 1e-12);
    }

    #[test]
    fn line_stays_finite_across_the_widest_domain() {
        let store = store_with(&[
            (-1e308, 0.0, 0.0),
            (0.0, 0.0, 0.0),
            (1.0, 0.0, 0.0),
            (1e308, 0.0, 0.0),
        ]);

        let line = predicted_line_series(&store, |x, _| Ok::<f64, String>(x));

        assert_eq!(line.len(), LINE_SAMPLES);
        assert_eq!(line[0].x, -1e308);
        assert_eq!(line[20].x, 1e308);
        assert!(line
            .iter()
            .all(|p| p.x.is_finite() && (-1e308..=1e308).contains(&p.x)));
        assert!(line.windows(2).all(|w| w[0].x <= w[1].x));
    }

    #[test]
    fn line_pins_input2_to_zero() {
        let store = store_with(&[(0.0, 9.0, 0.0), (1.0, 9.0, 0.0)]);

        let line = predicted_line_series(&store, |_, x2| Ok::<f64, String>(x2));

        assert!(line.iter().all(|p| p.y == 0.0));
    }

    #[test]
    fn identical_input1_collapses_to_one_x() {
        let store = store_with(&[(5.0, 1.0, 1.0), (5.0, 2.0, 2.0), (5.0, 3.0, 3.0)]);

        let line = predicted_line_series(&store, doubling);

        assert_eq!(line.len(), 21);
        assert!(line.iter().all(|p| p.x == 5.0));
    }

    #[test]
    fn failed_predictions_are_omitted() {
        let store = store_with(&[(0.0, 0.0, 0.0), (20.0, 0.0, 0.0)]);

        let line = predicted_line_series(&store, |x, _| {
            if x > 10.0 {
                Err("out of range".to_string())
            } else {
                Ok(x)
            }
        });

        assert_eq!(line.len(), 11);
        assert!(line.iter().all(|p| p.x <= 10.0));
    }

    #[test]
    fn empty_dataset_has_no_line() {
        let store = DatasetStore::new();
        assert!(predicted_line_series(&store, doubling).is_empty());

        let series = project(&store, Some(doubling));
        assert_eq!(series, ChartSeries::default());
    }

    #[test]
    fn project_without_predictor_only_scatters() {
        let store = store_with(&[(1.0, 1.0, 1.0)]);

        let series = project(&store, None::<fn(f64, f64) -> Result<f64, String>>);

        assert_eq!(series.points.len(), 1);
        assert!(series.predicted_line.is_empty());
    }

    #[test]
    fn json_writer_emits_both_series() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chart.json");
        let store = store_with(&[(1.0, 2.0, 3.0), (2.0, 0.0, 4.0)]);
        let series = project(&store, Some(doubling));

        JsonChartWriter::new(&path).redraw(&series).unwrap();

        let written = json::parse(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["points"].len(), 2);
        assert_eq!(written["points"][0]["r"].as_f64(), Some(9.0));
        assert_eq!(written["predictedLine"].len(), 21);
    }
}

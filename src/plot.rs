use anyhow::{Context, Result};
use plotters::prelude::*;
use std::path::Path;

use crate::clustering::Method;
use crate::experiment::{Comparison, DataSource, Sweep};

const COLORS: [RGBColor; 4] = [BLUE, RED, GREEN, MAGENTA];

/// `results_<n>_<p>_<q>` for block models, `results_blobs_<n>_<std>` for
/// blobs. The caller adds the extension.
pub fn results_stem(comparison: &Comparison) -> String {
    let config = &comparison.config;
    match config.source {
        DataSource::Sbm => format!(
            "results_{}_{}_{}",
            config.samples, config.intra_prob, config.inter_prob
        ),
        DataSource::Blobs => format!("results_blobs_{}_{}", config.samples, config.blob_std),
    }
}

pub fn sweep_stem(sweep: &Sweep) -> String {
    let config = &sweep.config;
    match config.source {
        DataSource::Sbm => format!(
            "sweep_{}_{}_{}",
            config.samples, config.intra_prob, config.inter_prob
        ),
        DataSource::Blobs => format!("sweep_blobs_{}_{}", config.samples, config.blob_std),
    }
}

/// Quartiles of a sample with whiskers at the most extreme values inside
/// the 1.5·IQR fences, so whiskers never leave the range of the data.
#[derive(Debug, Clone, PartialEq)]
struct BoxStats {
    whisker_low: f64,
    q1: f64,
    median: f64,
    q3: f64,
    whisker_high: f64,
    outliers: Vec<f64>,
}

fn box_stats(values: &[f64]) -> Option<BoxStats> {
    if values.is_empty() || values.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let [_, q1, median, q3, _] = Quartiles::new(values).values().map(f64::from);
    let iqr = q3 - q1;
    let (low_fence, high_fence) = (q1 - 1.5 * iqr, q3 + 1.5 * iqr);

    let inside = values.iter().copied().filter(|v| (low_fence..=high_fence).contains(v));
    let whisker_low = inside.clone().fold(f64::INFINITY, f64::min).min(q1);
    let whisker_high = inside.fold(f64::NEG_INFINITY, f64::max).max(q3);
    let outliers = values
        .iter()
        .copied()
        .filter(|v| !(low_fence..=high_fence).contains(v))
        .collect();

    Some(BoxStats {
        whisker_low,
        q1,
        median,
        q3,
        whisker_high,
        outliers,
    })
}

/// One box per method over the accuracy of every run.
pub fn plot_boxplot<P: AsRef<Path>>(path: P, comparison: &Comparison) -> Result<()> {
    let config = &comparison.config;
    let pvalue = comparison
        .anova
        .map_or_else(|| "n/a".to_string(), |a| format!("{:.2E}", a.pvalue));

    let root = BitMapBackend::new(path.as_ref(), (1024, 640)).into_drawing_area();
    root.fill(&WHITE)?;

    let slots = Method::ALL.len() as f64;
    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!(
                "Comparing {} runs at n={} p={} q={} T={} p-value(anova)={pvalue}",
                config.runs, config.samples, config.intra_prob, config.inter_prob, config.code_length
            ),
            ("sans-serif", 18),
        )
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(-0.5..(slots - 0.5), 0.0..1.05)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(2 * Method::ALL.len() + 1)
        .x_label_formatter(&|x: &f64| {
            let slot = x.round();
            if (x - slot).abs() > 1e-6 || slot < 0.0 {
                return String::new();
            }
            Method::ALL
                .get(slot as usize)
                .map_or_else(String::new, |m| m.name().to_string())
        })
        .y_desc("Clustering accuracy")
        .draw()?;

    for method in Method::ALL {
        let Some(stats) = box_stats(&comparison.accuracies(method)) else {
            continue;
        };
        let color = COLORS[method.index()];
        let x = method.index() as f64;
        let (half, cap) = (0.2, 0.1);

        chart.draw_series(std::iter::once(Rectangle::new(
            [(x - half, stats.q1), (x + half, stats.q3)],
            color.stroke_width(2),
        )))?;
        chart.draw_series(
            [
                vec![(x - half, stats.median), (x + half, stats.median)],
                vec![(x, stats.q3), (x, stats.whisker_high)],
                vec![(x, stats.q1), (x, stats.whisker_low)],
                vec![(x - cap, stats.whisker_high), (x + cap, stats.whisker_high)],
                vec![(x - cap, stats.whisker_low), (x + cap, stats.whisker_low)],
            ]
            .into_iter()
            .map(|line| PathElement::new(line, color.stroke_width(2))),
        )?;
        chart.draw_series(
            stats
                .outliers
                .iter()
                .map(|&y| Circle::new((x, y), 3, color)),
        )?;
    }

    root.present()
        .with_context(|| format!("failed to write {:?}", path.as_ref()))?;
    Ok(())
}

/// Mean accuracy against the code length, with ± one standard deviation
/// error bars.
pub fn plot_sweep<P: AsRef<Path>>(path: P, sweep: &Sweep) -> Result<()> {
    let config = &sweep.config;
    let lengths = sweep.points.iter().map(|p| p.code_length as f64);
    let x_min = lengths.clone().fold(f64::INFINITY, f64::min);
    let x_max = lengths.fold(f64::NEG_INFINITY, f64::max);
    let pad = ((x_max - x_min) * 0.05).max(1.0);

    let root = BitMapBackend::new(path.as_ref(), (1024, 640)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!(
                "Accuracy vs code length ({} runs, n={} p={} q={})",
                config.runs, config.samples, config.intra_prob, config.inter_prob
            ),
            ("sans-serif", 18),
        )
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d((x_min - pad)..(x_max + pad), 0.0..1.05)?;

    chart
        .configure_mesh()
        .x_desc("Code length T")
        .y_desc("Clustering accuracy")
        .draw()?;

    for method in Method::ALL {
        let color = COLORS[method.index()];
        let points: Vec<(f64, f64, f64)> = sweep
            .points
            .iter()
            .map(|p| {
                let s = p.accuracy[method.index()];
                (p.code_length as f64, s.mean, s.std)
            })
            .collect();

        chart
            .draw_series(LineSeries::new(points.iter().map(|&(x, y, _)| (x, y)), color))?
            .label(method.name())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));

        chart.draw_series(points.iter().map(|&(x, mean, std)| {
            ErrorBar::new_vertical(x, mean - std, mean, mean + std, color.filled(), 8)
        }))?;
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .position(SeriesLabelPosition::LowerRight)
        .draw()?;

    root.present()
        .with_context(|| format!("failed to write {:?}", path.as_ref()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::ExperimentConfig;

    #[test]
    fn test_results_stem() {
        let comparison = Comparison {
            config: ExperimentConfig::default(),
            trials: vec![],
            anova: None,
        };
        assert_eq!(results_stem(&comparison), "results_600_0.01_0.003");

        let blobs = Comparison {
            config: ExperimentConfig {
                source: DataSource::Blobs,
                blob_std: 0.5,
                ..Default::default()
            },
            trials: vec![],
            anova: None,
        };
        assert_eq!(results_stem(&blobs), "results_blobs_600_0.5");
    }

    #[test]
    fn test_sweep_stem() {
        let sweep = Sweep {
            config: ExperimentConfig::default(),
            points: vec![],
        };
        assert_eq!(sweep_stem(&sweep), "sweep_600_0.01_0.003");
    }

    #[test]
    fn test_box_whiskers_stay_within_data() {
        let accuracies = [0.5, 0.9, 0.95, 1.0, 1.0, 1.0, 1.0];
        // Plain 1.5·IQR fences overshoot the largest possible accuracy.
        assert!(Quartiles::new(&accuracies).values()[4] > 1.0);

        let stats = box_stats(&accuracies).unwrap();
        assert_eq!(stats.whisker_high, 1.0);
        assert_eq!(stats.whisker_low, 0.9);
        assert_eq!(stats.median, 1.0);
        assert_eq!(stats.outliers, vec![0.5]);
    }

    #[test]
    fn test_box_stats_of_constant_sample() {
        let stats = box_stats(&[1.0; 5]).unwrap();
        assert_eq!(
            (stats.whisker_low, stats.q1, stats.median, stats.q3, stats.whisker_high),
            (1.0, 1.0, 1.0, 1.0, 1.0)
        );
        assert!(stats.outliers.is_empty());
        assert!(box_stats(&[]).is_none());
    }
}

//! Stacked bar chart of taxon percentages per treatment.

use super::svg::{palette_color, Canvas, Scale};
use crate::topn::OTHER_LABEL;

const LEFT: f64 = 80.0;
const TOP: f64 = 50.0;
const BOTTOM: f64 = 160.0;
const PLOT_HEIGHT: f64 = 360.0;
const SLOT: f64 = 60.0;
const LEGEND_WIDTH: f64 = 260.0;

/// Draw one stacked bar per treatment.
///
/// `series` holds one `(label, values)` pair per taxon, with one value per
/// treatment. The `Other` series sits at the bottom in black; the rest stack
/// from least to most abundant overall. The legend lists the top of the
/// stack first.
pub fn stacked_bar(
    title: &str,
    y_label: &str,
    treatments: &[String],
    series: &[(String, Vec<f64>)],
) -> String {
    let plot_width = SLOT * treatments.len().max(1) as f64;
    let width = LEFT + plot_width + 20.0 + LEGEND_WIDTH;
    let legend_height = TOP + 20.0 * series.len() as f64 + 20.0;
    let height = (TOP + PLOT_HEIGHT + BOTTOM).max(legend_height);
    let mut canvas = Canvas::new(width, height);
    canvas.title(title);

    let mut order: Vec<usize> = (0..series.len()).collect();
    let total = |i: &usize| -> f64 { series[*i].1.iter().filter(|v| v.is_finite()).sum() };
    order.sort_by(|a, b| total(a).total_cmp(&total(b)));
    if let Some(pos) = order.iter().position(|&i| series[i].0 == OTHER_LABEL) {
        let other = order.remove(pos);
        order.insert(0, other);
    }

    let max_stack = (0..treatments.len())
        .map(|t| {
            series
                .iter()
                .filter_map(|(_, values)| values.get(t))
                .filter(|v| v.is_finite())
                .sum::<f64>()
        })
        .fold(0.0, f64::max);
    let scale = Scale::new(
        (0.0, if max_stack > 0.0 { max_stack } else { 100.0 }),
        (TOP + PLOT_HEIGHT, TOP),
    );
    canvas.y_axis(LEFT, &scale, y_label);
    let baseline = TOP + PLOT_HEIGHT;
    canvas.line(LEFT, baseline, LEFT + plot_width, baseline, "black", 1.0);

    let color = |rank: usize, idx: usize| -> String {
        if series[idx].0 == OTHER_LABEL {
            "#000000".to_string()
        } else {
            palette_color(rank).to_string()
        }
    };

    for (t, name) in treatments.iter().enumerate() {
        let x = LEFT + SLOT * t as f64 + SLOT * 0.15;
        let mut offset = 0.0;
        for (rank, &idx) in order.iter().enumerate() {
            let value = series[idx].1.get(t).copied().unwrap_or(0.0);
            if !(value.is_finite() && value > 0.0) {
                continue;
            }
            let y_top = scale.map(offset + value);
            let y_bottom = scale.map(offset);
            canvas.rect(x, y_top, SLOT * 0.7, y_bottom - y_top, &color(rank, idx), None);
            offset += value;
        }
        let cx = LEFT + SLOT * (t as f64 + 0.5);
        canvas.text_rotated(cx + 4.0, baseline + 10.0, name, 12.0, 90.0, "start");
    }

    let legend_x = LEFT + plot_width + 20.0;
    for (row, (rank, &idx)) in order.iter().enumerate().rev().enumerate() {
        let y = TOP + 20.0 * row as f64;
        canvas.rect(legend_x, y, 12.0, 12.0, &color(rank, idx), None);
        canvas.text(legend_x + 18.0, y + 10.0, &series[idx].0, 11.0, "start");
    }

    canvas.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series() -> Vec<(String, Vec<f64>)> {
        vec![
            ("g__Big".to_string(), vec![60.0, 50.0]),
            ("g__Small".to_string(), vec![10.0, 20.0]),
            (OTHER_LABEL.to_string(), vec![30.0, 30.0]),
        ]
    }

    #[test]
    fn test_legend_lists_top_of_stack_first() {
        let treatments = vec!["A".to_string(), "B".to_string()];
        let svg = stacked_bar("Top taxa", "Relative abundance (%)", &treatments, &series());
        let big = svg.find(">g__Big<").unwrap();
        let small = svg.find(">g__Small<").unwrap();
        let other = svg.find(">Other<").unwrap();
        assert!(big < small && small < other);
    }

    #[test]
    fn test_other_is_black() {
        let svg = stacked_bar("Top taxa", "%", &["A".into(), "B".into()], &series());
        // two bar segments and one legend swatch
        assert_eq!(svg.matches(r##"fill="#000000""##).count(), 3);
    }

    #[test]
    fn test_zero_segments_skipped() {
        let data = vec![("g__A".to_string(), vec![0.0, 100.0])];
        let svg = stacked_bar("t", "%", &["A".into(), "B".into()], &data);
        // background, one bar, one swatch
        assert_eq!(svg.matches("<rect").count(), 3);
    }
}

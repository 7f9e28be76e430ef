/// SVG line chart of requests per second.
use crate::aggregate::Bucket;
use crate::config::PlotConfig;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

const MARGIN_LEFT: f64 = 70.0;
const MARGIN_RIGHT: f64 = 30.0;
const MARGIN_TOP: f64 = 50.0;
const MARGIN_BOTTOM: f64 = 90.0;
const Y_TICKS: u64 = 5;
const X_TICKS: usize = 6;

/// Errors from writing the plot file.
#[derive(Debug)]
pub enum PlotError {
    Render(std::fmt::Error),
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl std::fmt::Display for PlotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlotError::Render(e) => write!(f, "failed to render plot: {e}"),
            PlotError::Write { path, source } => {
                write!(f, "failed to write plot {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for PlotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PlotError::Render(e) => Some(e),
            PlotError::Write { source, .. } => Some(source),
        }
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Render buckets (chronological) as a standalone SVG document.
pub fn render_svg(buckets: &[Bucket], config: &PlotConfig) -> Result<String, std::fmt::Error> {
    let mut svg = String::new();
    render_into(&mut svg, buckets, config)?;
    Ok(svg)
}

fn render_into(svg: &mut String, buckets: &[Bucket], config: &PlotConfig) -> std::fmt::Result {
    let width = f64::from(config.width.max(200));
    let height = f64::from(config.height.max(150));
    let plot_w = width - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_h = height - MARGIN_TOP - MARGIN_BOTTOM;

    let first = buckets.first().map(|b| b.second.timestamp()).unwrap_or(0);
    let last = buckets.last().map(|b| b.second.timestamp()).unwrap_or(0);
    let span = (last - first).max(1) as f64;
    let max_count = buckets.iter().map(|b| b.count).max().unwrap_or(0).max(1);

    let x_of = |ts: i64| MARGIN_LEFT + (ts - first) as f64 / span * plot_w;
    let y_of = |count: u64| MARGIN_TOP + plot_h - count as f64 / max_count as f64 * plot_h;

    writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}" font-family="sans-serif" font-size="12">"#
    )?;
    writeln!(svg, r#"<rect width="100%" height="100%" fill="white"/>"#)?;
    writeln!(
        svg,
        r#"<text x="{:.1}" y="30" text-anchor="middle" font-size="16">{}</text>"#,
        width / 2.0,
        escape(&config.title)
    )?;

    // Grid and y labels.
    for i in 0..=Y_TICKS {
        let value = max_count * i / Y_TICKS;
        let y = y_of(value);
        writeln!(
            svg,
            r##"<line x1="{MARGIN_LEFT}" y1="{y:.1}" x2="{:.1}" y2="{y:.1}" stroke="#ddd"/>"##,
            MARGIN_LEFT + plot_w
        )?;
        writeln!(
            svg,
            r#"<text x="{:.1}" y="{:.1}" text-anchor="end">{value}</text>"#,
            MARGIN_LEFT - 8.0,
            y + 4.0
        )?;
    }

    // X labels at evenly spaced buckets.
    if !buckets.is_empty() {
        let step = (buckets.len() / X_TICKS).max(1);
        for bucket in buckets.iter().step_by(step) {
            let x = x_of(bucket.second.timestamp());
            let y = MARGIN_TOP + plot_h + 14.0;
            writeln!(
                svg,
                r#"<text x="{x:.1}" y="{y:.1}" text-anchor="end" transform="rotate(-30 {x:.1} {y:.1})">{}</text>"#,
                bucket.label()
            )?;
        }
    }

    // Axes.
    writeln!(
        svg,
        r#"<line x1="{MARGIN_LEFT}" y1="{MARGIN_TOP}" x2="{MARGIN_LEFT}" y2="{:.1}" stroke="black"/>"#,
        MARGIN_TOP + plot_h
    )?;
    writeln!(
        svg,
        r#"<line x1="{MARGIN_LEFT}" y1="{:.1}" x2="{:.1}" y2="{:.1}" stroke="black"/>"#,
        MARGIN_TOP + plot_h,
        MARGIN_LEFT + plot_w,
        MARGIN_TOP + plot_h
    )?;
    writeln!(
        svg,
        r#"<text x="{:.1}" y="{:.1}" text-anchor="middle">Time</text>"#,
        MARGIN_LEFT + plot_w / 2.0,
        height - 10.0
    )?;
    writeln!(
        svg,
        r#"<text x="18" y="{:.1}" text-anchor="middle" transform="rotate(-90 18 {:.1})">Requests Per Second</text>"#,
        MARGIN_TOP + plot_h / 2.0,
        MARGIN_TOP + plot_h / 2.0
    )?;

    // Series.
    let points: Vec<(f64, f64)> = buckets
        .iter()
        .map(|b| (x_of(b.second.timestamp()), y_of(b.count)))
        .collect();
    if !points.is_empty() {
        let path = points
            .iter()
            .map(|(x, y)| format!("{x:.1},{y:.1}"))
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(
            svg,
            r##"<polyline fill="none" stroke="#1f77b4" stroke-width="1" points="{path}"/>"##
        )?;
        for (x, y) in &points {
            writeln!(
                svg,
                r##"<circle cx="{x:.1}" cy="{y:.1}" r="1.5" fill="#1f77b4"/>"##
            )?;
        }
    }

    svg.push_str("</svg>\n");
    Ok(())
}

/// Write the chart to `path`.
pub fn write_plot(path: &Path, buckets: &[Bucket], config: &PlotConfig) -> Result<(), PlotError> {
    let svg = render_svg(buckets, config).map_err(PlotError::Render)?;
    std::fs::write(path, svg).map_err(|source| PlotError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(path = %path.display(), points = buckets.len(), "plot written");
    Ok(())
}

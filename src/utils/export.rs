use std::fmt::Write as FmtWrite;
use std::path::Path;

use crate::errors::AppError;
use crate::models::history::{ClosePoint, HistoryQuery};

/// Write stored closes to a CSV file, in the order given.
pub fn write_history_csv(points: &[ClosePoint], path: &Path) -> Result<(), AppError> {
    let mut wtr = csv::Writer::from_path(path)
        .map_err(|e| AppError::FileWrite(format!("Cannot create CSV: {}", e)))?;

    wtr.write_record(["Date", "Close"])?;
    for p in points {
        wtr.write_record([p.date.format("%Y-%m-%d").to_string(), format!("{:.2}", p.close)])?;
    }

    wtr.flush().map_err(|e| AppError::FileWrite(e.to_string()))?;
    Ok(())
}

/// Write the history page to a standalone HTML file.
pub fn write_history_html(
    symbol: &str,
    points: &[ClosePoint],
    query: &HistoryQuery,
    path: &Path,
) -> Result<(), AppError> {
    let html = render_history_page(symbol, points, query);
    std::fs::write(path, html)
        .map_err(|e| AppError::FileWrite(format!("Cannot create HTML: {}", e)))
}

/// Full HTML page: filter form, summary line and an inline SVG close chart.
///
/// `points` arrive newest first, as the read query returns them; the chart
/// plots them oldest to newest.
pub fn render_history_page(symbol: &str, points: &[ClosePoint], query: &HistoryQuery) -> String {
    let mut html = String::with_capacity(64 * 1024);
    let symbol = escape(symbol);
    let start = query.start_date.map(|d| d.to_string()).unwrap_or_default();
    let end = query.end_date.map(|d| d.to_string()).unwrap_or_default();

    // ── HTML head ──
    write!(html, r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>{symbol} Stock Data</title>
<style>
body {{ font-family:Arial,sans-serif; max-width:1200px; margin:0 auto; padding:20px; }}
.controls {{ background:#f5f5f5; padding:20px; border-radius:8px; margin-bottom:20px; }}
input[type="date"] {{ padding:8px; margin:0 10px; }}
input[type="number"] {{ padding:8px; margin:0 10px; width:80px; }}
button {{ padding:10px 20px; background:#007bff; color:white; border:none; border-radius:4px; cursor:pointer; margin:0 5px; }}
button:hover {{ background:#0056b3; }}
.summary {{ color:#666; font-size:14px; margin-top:10px; }}
.empty {{ color:#666; padding:40px; text-align:center; }}
svg {{ display:block; }}
</style>
</head>
<body>
<h1>{symbol} Stock Data</h1>
"#).ok();

    // ── Controls ──
    write!(html, r#"<div class="controls">
<form method="GET">
<label>Start Date:</label><input type="date" name="start_date" value="{start}">
<label>End Date:</label><input type="date" name="end_date" value="{end}">
<label>Max Records:</label><input type="number" name="limit" value="{limit}" min="1" max="1000">
<button type="submit">Update Chart</button>
<a href="/"><button type="button">Reset</button></a>
</form>
<div class="summary">{summary}</div>
</div>
"#, limit = query.limit, summary = query.describe(points.len())).ok();

    // ── Close chart ──
    if points.is_empty() {
        html.push_str(r#"<p class="empty">No stored closes in this range.</p>"#);
    } else {
        let chronological: Vec<&ClosePoint> = points.iter().rev().collect();
        write_close_svg(&mut html, &chronological, &symbol);
    }

    html.push_str("</body></html>");
    html
}

/// Render an SVG close-price line into the html string.
fn write_close_svg(html: &mut String, pts: &[&ClosePoint], symbol: &str) {
    if pts.is_empty() { return; }

    let w: f64 = 900.0;
    let h: f64 = 360.0;
    let pad = 60.0;
    let chart_w = w - pad - 10.0;
    let chart_h = h - 50.0;

    let min_c = pts.iter().map(|p| p.close).fold(f64::INFINITY, f64::min);
    let max_c = pts.iter().map(|p| p.close).fold(f64::NEG_INFINITY, f64::max);
    let range = (max_c - min_c).max(0.01);

    let x_step = chart_w / (pts.len() as f64 - 1.0).max(1.0);

    write!(html, r##"<svg width="100%" viewBox="0 0 {} {}" xmlns="http://www.w3.org/2000/svg" style="max-width:{}px" aria-label="{} close price">"##, w, h, w as i64, symbol).ok();

    // Grid lines
    for i in 0..5 {
        let y = 10.0 + chart_h * (i as f64 / 4.0);
        let val = max_c - range * (i as f64 / 4.0);
        write!(html, r##"<line x1="{}" y1="{:.1}" x2="{}" y2="{:.1}" stroke="#dddddd" stroke-dasharray="3,3"/>"##, pad, y, w - 10.0, y).ok();
        write!(html, r##"<text x="{}" y="{:.1}" fill="#666666" font-size="10" text-anchor="end">{}</text>"##, pad - 4.0, y + 3.0, format_number(val)).ok();
    }

    // Date labels: first, middle, last
    let label_idx = [0, pts.len() / 2, pts.len() - 1];
    for (n, &i) in label_idx.iter().enumerate() {
        if n > 0 && i == label_idx[n - 1] { continue; }
        let x = pad + x_step * i as f64;
        write!(html, r##"<text x="{:.1}" y="{:.1}" fill="#666666" font-size="10" text-anchor="middle">{}</text>"##, x, h - 12.0, pts[i].date).ok();
    }

    // Line path
    let mut path = String::with_capacity(pts.len() * 20);
    for (i, pt) in pts.iter().enumerate() {
        let x = pad + x_step * i as f64;
        let y = 10.0 + chart_h * (1.0 - (pt.close - min_c) / range);
        if i == 0 { write!(path, "M{:.1},{:.1}", x, y).ok(); }
        else { write!(path, " L{:.1},{:.1}", x, y).ok(); }
    }
    write!(html, r##"<path d="{}" fill="none" stroke="rgb(75,192,192)" stroke-width="1.5"/>"##, path).ok();

    // Fill area
    let x_end = pad + x_step * (pts.len() - 1) as f64;
    write!(html, r##"<path d="{} L{:.1},{:.1} L{:.1},{:.1} Z" fill="rgb(75,192,192)" fill-opacity="0.1"/>"##,
        path, x_end, 10.0 + chart_h, pad, 10.0 + chart_h).ok();

    html.push_str("</svg>");
}

/// Compact price label for the y axis.
fn format_number(v: f64) -> String {
    let abs = v.abs();
    let sign = if v < 0.0 { "-" } else { "" };
    if abs >= 1_000_000.0 {
        format!("{}{:.1}M", sign, abs / 1_000_000.0)
    } else if abs >= 10_000.0 {
        format!("{}{:.0}K", sign, abs / 1_000.0)
    } else {
        format!("{}{:.2}", sign, abs)
    }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

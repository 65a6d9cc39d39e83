use std::collections::BTreeMap;

use serde_json::{json, Value};

use super::aggregate::Dashboard;
use crate::config::DateWindow;

pub const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";

struct Section {
    heading: &'static str,
    figure: Value,
}

fn layout(title: &str, x: &str, y: &str) -> Value {
    json!({
        "title": { "text": title },
        "template": "seaborn",
        "xaxis": { "title": { "text": x } },
        "yaxis": { "title": { "text": y } },
    })
}

fn daily_figure(dash: &Dashboard) -> Value {
    json!({
        "data": [{
            "type": "scatter",
            "mode": "lines+markers",
            "x": dash.daily.iter().map(|d| d.date.to_string()).collect::<Vec<_>>(),
            "y": dash.daily.iter().map(|d| d.trips).collect::<Vec<_>>(),
            "customdata": dash.daily.iter().map(|d| d.day_of_week.as_str()).collect::<Vec<_>>(),
            "hovertemplate": "Date=%{x}<br>Day of Week=%{customdata}<br>Number of Trips=%{y}<extra></extra>",
        }],
        "layout": layout(
            "Passengers don't take taxis as much at the start of the week.",
            "Date",
            "Number of Trips",
        ),
    })
}

/// One bar trace per day, grouped by hour.
fn hourly_figure(dash: &Dashboard) -> Value {
    let mut per_day: BTreeMap<_, Vec<(u32, u64)>> = BTreeMap::new();
    for h in &dash.hourly {
        per_day.entry(h.date).or_default().push((h.hour, h.trips));
    }
    let traces: Vec<Value> = per_day
        .into_iter()
        .map(|(date, bars)| {
            json!({
                "type": "bar",
                "name": date.to_string(),
                "x": bars.iter().map(|(hour, _)| hour).collect::<Vec<_>>(),
                "y": bars.iter().map(|(_, n)| n).collect::<Vec<_>>(),
            })
        })
        .collect();

    let mut layout = layout("If you hate traffic, drive in the wee hours.", "Hour of the Day", "count");
    layout["barmode"] = json!("group");
    layout["legend"] = json!({ "title": { "text": "Trip Date" } });
    json!({ "data": traces, "layout": layout })
}

fn payment_figure(dash: &Dashboard) -> Value {
    json!({
        "data": [{
            "type": "pie",
            "hole": 0.4,
            "labels": dash.payments.iter().map(|p| p.label.as_str()).collect::<Vec<_>>(),
            "values": dash.payments.iter().map(|p| p.trips).collect::<Vec<_>>(),
        }],
        "layout": { "title": { "text": "Credit card is king." }, "template": "seaborn" },
    })
}

fn tip_figure(dash: &Dashboard) -> Value {
    json!({
        "data": [{
            "type": "bar",
            "x": dash.tips.iter().map(|t| t.label).collect::<Vec<_>>(),
            "y": dash.tips.iter().map(|t| t.mean).collect::<Vec<_>>(),
        }],
        "layout": layout(
            "Passengers from the airport are more generous.",
            "Pickup Type",
            "Average Tip Amount",
        ),
    })
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Figures go inside `<script>`; a literal `</` would end it early.
fn script_safe(figure: &Value) -> String {
    figure.to_string().replace("</", "<\\/")
}

/// A self-contained dashboard page; Plotly itself is loaded from its CDN.
pub fn render_html(dash: &Dashboard, window: &DateWindow) -> String {
    let sections = [
        Section {
            heading: "What is the quietest day of the week? 🤫",
            figure: daily_figure(dash),
        },
        Section {
            heading: "What shift is best for taxi drivers? 🎯",
            figure: hourly_figure(dash),
        },
        Section {
            heading: "How do people pay? 💰",
            figure: payment_figure(dash),
        },
        Section {
            heading: "Do people tip more for airport pickups? 🤑",
            figure: tip_figure(dash),
        },
    ];

    let mut body = String::new();
    for (i, section) in sections.iter().enumerate() {
        body.push_str(&format!(
            "<h2>{heading}</h2>\n<div id=\"fig{i}\"></div>\n<script>\n(function () {{ var fig = {fig}; Plotly.newPlot(\"fig{i}\", fig.data, fig.layout); }})();\n</script>\n",
            heading = escape_html(section.heading),
            i = i,
            fig = script_safe(&section.figure),
        ));
    }

    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>NYC Taxi Trip Analysis</title>\n<script src=\"{cdn}\"></script>\n</head>\n<body>\n<h1>NYC Taxi Trip Analysis 🚖</h1>\n<p>Pickups from {start} to {end}</p>\n{body}</body>\n</html>\n",
        cdn = PLOTLY_CDN,
        start = window.start,
        end = window.end,
        body = body,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::aggregate::{DailyCount, MeanTip, PaymentShare};
    use chrono::NaiveDate;

    fn june() -> DateWindow {
        DateWindow::new(
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
        )
        .unwrap()
    }

    fn dashboard() -> Dashboard {
        Dashboard {
            daily: vec![DailyCount {
                date: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
                day_of_week: "Mon".into(),
                trips: 3,
            }],
            hourly: Vec::new(),
            payments: vec![PaymentShare {
                label: "</script><b>".into(),
                trips: 1,
            }],
            tips: vec![MeanTip {
                label: "Airport Pickup",
                mean: None,
            }],
        }
    }

    #[test]
    fn test_page_has_every_chart() {
        let html = render_html(&dashboard(), &june());
        assert!(html.contains(PLOTLY_CDN));
        assert!(html.contains("Pickups from 2024-06-01 to 2024-06-30"));
        for title in [
            "Passengers don't take taxis as much at the start of the week.",
            "If you hate traffic, drive in the wee hours.",
            "Credit card is king.",
            "Passengers from the airport are more generous.",
        ] {
            assert!(html.contains(title), "missing {}", title);
        }
        assert_eq!(html.matches("Plotly.newPlot").count(), 4);
    }

    #[test]
    fn test_labels_cannot_close_script() {
        let html = render_html(&dashboard(), &june());
        assert!(!html.contains("</script><b>"));
        assert!(html.contains("<\\/script><b>"));
    }

    #[test]
    fn test_missing_mean_is_null() {
        let fig = tip_figure(&dashboard());
        assert_eq!(fig["data"][0]["y"], json!([null]));
    }
}

//! Rendering typed observations into the trip weather report.
//!
//! Pure functions over [`CurrentConditions`] and [`ForecastSlot`] values;
//! no I/O here, which keeps the formatting fully unit-testable.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};

/// Current conditions at the resolved location.
#[derive(Clone, Debug, PartialEq)]
pub struct CurrentConditions {
    /// Air temperature, °C.
    pub temp_c: f64,
    /// Perceived temperature, °C.
    pub feels_like_c: f64,
    /// Relative humidity, percent.
    pub humidity_pct: f64,
    /// Wind speed, m/s.
    pub wind_mps: f64,
    /// Short condition description, e.g. `"light rain"`.
    pub description: String,
}

/// One three-hour forecast slot.
#[derive(Clone, Debug, PartialEq)]
pub struct ForecastSlot {
    /// Slot timestamp.
    pub at: DateTime<Utc>,
    /// Air temperature, °C.
    pub temp_c: f64,
    /// Relative humidity, percent.
    pub humidity_pct: f64,
    /// Wind speed, m/s.
    pub wind_mps: f64,
    /// Short condition description.
    pub description: String,
    /// Whether the slot reports any precipitation volume.
    pub rain: bool,
}

fn fahrenheit(c: f64) -> f64 {
    c * 9.0 / 5.0 + 32.0
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn most_common_description(slots: &[&ForecastSlot]) -> String {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for slot in slots {
        *counts.entry(slot.description.as_str()).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by_key(|&(_, count)| count)
        .map(|(desc, _)| title_case(desc))
        .unwrap_or_default()
}

/// Render the full report: current conditions, a per-day breakdown for the
/// requested range, and a trip overview with an aggregate rain probability.
///
/// Slots outside `[start, end]` are ignored. When no slot falls inside the
/// range (trips further out than the five-day horizon) the daily section is
/// replaced by a short availability note.
#[must_use]
pub fn render_report(
    location: &str,
    start: NaiveDate,
    end: NaiveDate,
    current: &CurrentConditions,
    slots: &[ForecastSlot],
) -> String {
    let mut report = format!("Weather forecast for {location} ({start} to {end}):\n\n");
    report.push_str(&render_current(current));

    let mut by_day: BTreeMap<NaiveDate, Vec<&ForecastSlot>> = BTreeMap::new();
    for slot in slots {
        let day = slot.at.date_naive();
        if day >= start && day <= end {
            by_day.entry(day).or_default().push(slot);
        }
    }

    if by_day.is_empty() {
        report.push_str("Detailed daily forecast: Available for next 5 days only from today.\n");
        report.push_str("For longer-range planning, check closer to your travel dates.\n");
        return report;
    }

    report.push_str("Daily forecast breakdown:\n\n");
    for (day, day_slots) in &by_day {
        report.push_str(&render_day(*day, day_slots));
    }

    let all: Vec<&ForecastSlot> = by_day.values().flatten().copied().collect();
    report.push_str(&render_overview(&all));
    report
}

/// Degraded report used when the requested dates fail to parse.
#[must_use]
pub fn render_current_only(location: &str, current: &CurrentConditions) -> String {
    let mut report =
        format!("Weather forecast for {location}: date range unavailable, current conditions only.\n\n");
    report.push_str(&render_current(current));
    report
}

fn render_current(current: &CurrentConditions) -> String {
    format!(
        "Current conditions:\n\
         - Temperature: {:.1}°C ({:.1}°F), feels like {:.1}°C\n\
         - Conditions: {}\n\
         - Humidity: {:.0}%\n\
         - Wind speed: {:.1} m/s\n\n",
        current.temp_c,
        fahrenheit(current.temp_c),
        current.feels_like_c,
        title_case(&current.description),
        current.humidity_pct,
        current.wind_mps,
    )
}

fn render_day(day: NaiveDate, slots: &[&ForecastSlot]) -> String {
    let temps: Vec<f64> = slots.iter().map(|s| s.temp_c).collect();
    let min = temps.iter().copied().fold(f64::INFINITY, f64::min);
    let max = temps.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let avg_humidity =
        slots.iter().map(|s| s.humidity_pct).sum::<f64>() / slots.len() as f64;
    let avg_wind = slots.iter().map(|s| s.wind_mps).sum::<f64>() / slots.len() as f64;
    let rainy = slots.iter().filter(|s| s.rain).count();

    let mut out = format!("**{}, {}:**\n", day.format("%A"), day.format("%B %d"));
    out.push_str(&format!(
        "  • Temperature: {min:.1}°C to {max:.1}°C ({:.1}°F to {:.1}°F)\n",
        fahrenheit(min),
        fahrenheit(max),
    ));
    out.push_str(&format!("  • Conditions: {}\n", most_common_description(slots)));
    out.push_str(&format!("  • Humidity: {avg_humidity:.0}%\n"));
    out.push_str(&format!("  • Wind: {avg_wind:.1} m/s\n"));
    if rainy > 0 {
        let chance = rainy as f64 / slots.len() as f64 * 100.0;
        out.push_str(&format!("  • Rain: {chance:.0}% chance of precipitation\n"));
    }
    out.push('\n');
    out
}

fn render_overview(slots: &[&ForecastSlot]) -> String {
    let temps: Vec<f64> = slots.iter().map(|s| s.temp_c).collect();
    let min = temps.iter().copied().fold(f64::INFINITY, f64::min);
    let max = temps.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let rainy = slots.iter().filter(|s| s.rain).count();
    let rain_chance = rainy as f64 / slots.len() as f64 * 100.0;

    let outlook = if rain_chance > 50.0 {
        "Rain expected frequently during trip"
    } else if rain_chance > 20.0 {
        "Some rain possible during trip"
    } else {
        "Mostly dry conditions expected"
    };

    format!(
        "Trip overview:\n\
         - Overall temperature range: {min:.1}°C to {max:.1}°C\n\
         - Overall rain probability: {rain_chance:.0}%\n\
         - {outlook}\n"
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

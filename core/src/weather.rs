//! wttr.in `format=j1` payloads and the dashboard's weather summary.

use serde::{Deserialize, Serialize};

pub const DEFAULT_LOCATION: &str = "auto";

#[derive(Debug, Deserialize)]
pub struct WttrResponse {
    #[serde(default)]
    pub current_condition: Vec<CurrentCondition>,
    #[serde(default)]
    pub nearest_area: Vec<NearestArea>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentCondition {
    #[serde(rename = "temp_F")]
    pub temp_f: String,
    #[serde(rename = "temp_C")]
    pub temp_c: String,
    pub weather_code: String,
    #[serde(default)]
    pub weather_desc: Vec<TextValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearestArea {
    #[serde(default)]
    pub area_name: Vec<TextValue>,
}

#[derive(Debug, Deserialize)]
pub struct TextValue {
    pub value: String,
}

/// What `GET /api/weather` returns.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Weather {
    /// Fahrenheit.
    pub temp: i64,
    pub temp_c: i64,
    pub condition: String,
    pub icon: &'static str,
    pub location: String,
}

#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("weather response had no current conditions")]
    MissingConditions,
    #[error("unreadable {field} value '{value}'")]
    BadNumber { field: &'static str, value: String },
}

/// Icon for a wttr.in / WWO weather code. Arms are checked top to bottom, so
/// the thunderstorm range is only reached for codes the rain ranges miss.
#[must_use]
#[allow(unreachable_patterns)]
pub fn weather_icon(code: u32) -> &'static str {
    match code {
        113 => "☀️",
        116 => "⛅",
        119 | 122 => "☁️",
        176..=263 | 266..=317 => "🌧️",
        320..=395 => "❄️",
        200..=232 => "⛈️",
        143 | 248 | 260 => "🌫️",
        _ => "🌤️",
    }
}

fn parse_int(field: &'static str, value: &str) -> Result<i64, WeatherError> {
    value
        .trim()
        .parse()
        .map_err(|_| WeatherError::BadNumber {
            field,
            value: value.to_string(),
        })
}

impl WttrResponse {
    /// Condenses the first current-condition entry. `fallback_location` is
    /// used when wttr.in does not name the area.
    pub fn summarize(&self, fallback_location: &str) -> Result<Weather, WeatherError> {
        let current = self
            .current_condition
            .first()
            .ok_or(WeatherError::MissingConditions)?;
        let code = u32::try_from(parse_int("weatherCode", &current.weather_code)?).unwrap_or(0);
        let condition = current
            .weather_desc
            .first()
            .map(|d| d.value.trim().to_string())
            .unwrap_or_default();
        let location = self
            .nearest_area
            .first()
            .and_then(|a| a.area_name.first())
            .map(|n| n.value.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| fallback_location.to_string());

        Ok(Weather {
            temp: parse_int("temp_F", &current.temp_f)?,
            temp_c: parse_int("temp_C", &current.temp_c)?,
            condition,
            icon: weather_icon(code),
            location,
        })
    }
}

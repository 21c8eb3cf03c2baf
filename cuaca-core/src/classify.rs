//! Keyword classification of condition descriptions into display categories.

use serde::{Deserialize, Serialize};

/// Coarse grouping of a condition description, used for iconography.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Thunderstorm,
    Drizzle,
    Rain,
    Snow,
    /// Mist, smoke, haze, fog.
    Atmospheric,
    /// Sand, dust, ash, squall, tornado.
    Particulate,
    Clear,
    FewClouds,
    ScatteredClouds,
    /// Broken or overcast clouds.
    Overcast,
    Unknown,
}

impl Category {
    pub fn label(&self) -> &'static str {
        match self {
            Category::Thunderstorm => "Thunderstorm",
            Category::Drizzle => "Drizzle",
            Category::Rain => "Rain",
            Category::Snow => "Snow",
            Category::Atmospheric => "Mist/Haze",
            Category::Particulate => "Dust/Squall",
            Category::Clear => "Clear",
            Category::FewClouds => "Few clouds",
            Category::ScatteredClouds => "Scattered clouds",
            Category::Overcast => "Overcast",
            Category::Unknown => "Unknown",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Category::Thunderstorm => "⛈️",
            Category::Drizzle => "🌦️",
            Category::Rain => "🌧️",
            Category::Snow => "❄️",
            Category::Atmospheric => "🌫️",
            Category::Particulate => "🌪️",
            Category::Clear => "☀️",
            Category::FewClouds => "🌤️",
            Category::ScatteredClouds => "🌥️",
            Category::Overcast => "☁️",
            Category::Unknown => "❓",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// Order matters: a description may combine qualifiers ("thunderstorm with
// broken clouds"), the first group that matches decides.
const KEYWORD_GROUPS: &[(Category, &[&str])] = &[
    (Category::Thunderstorm, &["thunderstorm"]),
    (Category::Drizzle, &["drizzle"]),
    (Category::Rain, &["rain"]),
    (Category::Snow, &["snow"]),
    (Category::Atmospheric, &["mist", "smoke", "haze", "fog"]),
    (Category::Particulate, &["sand", "dust", "ash", "squall", "tornado"]),
    (Category::Clear, &["clear"]),
    (Category::FewClouds, &["few clouds"]),
    (Category::ScatteredClouds, &["scattered clouds"]),
    (Category::Overcast, &["broken clouds", "overcast clouds"]),
];

/// Map a free-text condition to its [`Category`]. Never fails.
pub fn classify(condition_text: &str) -> Category {
    let text = condition_text.to_lowercase();

    KEYWORD_GROUPS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| text.contains(k)))
        .map(|(category, _)| *category)
        .unwrap_or(Category::Unknown)
}

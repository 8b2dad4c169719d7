use std::fmt;

use serde::{Deserialize, Serialize};

use crate::interpreter::QueryInputs;

/// The three pipeline roles, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageKind {
    Planner,
    Forecaster,
    Recommender,
}

/// Who a stage speaks as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageProfile {
    pub role: &'static str,
    pub goal: &'static str,
    pub backstory: &'static str,
}

impl StageProfile {
    /// System text sent with every request for this stage.
    pub fn system_text(&self) -> String {
        format!(
            "You are {}. Your goal is to {} Backstory: {}",
            self.role, self.goal, self.backstory
        )
    }
}

/// Outputs gathered from earlier stages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageOutputs {
    pub plan: Option<String>,
    pub forecast: Option<String>,
}

impl StageOutputs {
    pub fn record(&mut self, kind: StageKind, output: String) {
        match kind {
            StageKind::Planner => self.plan = Some(output),
            StageKind::Forecaster => self.forecast = Some(output),
            StageKind::Recommender => {}
        }
    }
}

impl StageKind {
    pub const ALL: [StageKind; 3] = [StageKind::Planner, StageKind::Forecaster, StageKind::Recommender];

    pub fn profile(&self) -> StageProfile {
        match self {
            StageKind::Planner => StageProfile {
                role: "Event Planner",
                goal: "identify events based on location, date, preferences, and specific event names or programs.",
                backstory: "You're tasked with finding events in the user's area that match their \
                            preferences, timing, and optionally a specific event or program.",
            },
            StageKind::Forecaster => StageProfile {
                role: "Weather Forecaster",
                goal: "provide accurate weather forecasts for specific locations and dates.",
                backstory: "You're responsible for checking weather conditions for the events \
                            suggested by the Event Planner.",
            },
            StageKind::Recommender => StageProfile {
                role: "Activity Recommender",
                goal: "suggest activities or events combining user preferences, weather data, and specific interests.",
                backstory: "You work with the Event Planner and Weather Forecaster to recommend \
                            the best options to the user.",
            },
        }
    }

    pub fn expected_output(&self) -> &'static str {
        match self {
            StageKind::Planner => {
                "A list of events with details (name, location, date, type, relevance to user input)."
            }
            StageKind::Forecaster => {
                "Weather forecast data for the specified location and date \
                 (temperature, conditions, suitability for outdoor activities)."
            }
            StageKind::Recommender => {
                "A list of tailored event recommendations for the user, prioritized by interest."
            }
        }
    }

    /// Build the user message for this stage.
    pub fn prompt(&self, inputs: &QueryInputs, outputs: &StageOutputs) -> String {
        let task = match self {
            StageKind::Planner => format!(
                "Find events based on the following inputs:\n\
                 - Location: {}\n\
                 - Date: {}\n\
                 - Preferences: {}\n\
                 - Event Name: {}\n\
                 Return a list of events matching these inputs.",
                inputs.location,
                inputs.date,
                inputs.preferences_text(),
                inputs.event_name
            ),
            StageKind::Forecaster => format!(
                "Fetch weather conditions for the following:\n\
                 - Location: {}\n\
                 - Date: {}\n\
                 Return weather data (temperature, conditions, suitability for outdoor activities).",
                inputs.location, inputs.date
            ),
            StageKind::Recommender => format!(
                "Based on event details, weather data, and user inputs, provide activity recommendations \
                 for {} on {}:\n\
                 - Suggest events matching the user's interest in: {}.\n\
                 - Suggest alternatives if the exact match is unavailable.\n\
                 - Include options suitable for the weather.\n\
                 - User preferences: {}.\n\n\
                 Event details:\n{}\n\n\
                 Weather data:\n{}",
                inputs.location,
                inputs.date,
                inputs.event_name,
                inputs.preferences_text(),
                outputs.plan.as_deref().unwrap_or("No event details available."),
                outputs.forecast.as_deref().unwrap_or("No weather data available."),
            ),
        };

        format!(
            "{}\n\nThis is the expected criteria for your final answer: {}",
            task,
            self.expected_output()
        )
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.profile().role)
    }
}

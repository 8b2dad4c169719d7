use std::time::Duration;

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::UIConfig;
use crate::event_source::{EventFeed, FetchError};
use crate::orchestrator::FinalRecommendation;

pub const EXAMPLE_REQUEST: &str =
    "I want to find outdoor family-friendly events in Dhaka on 2025-02-15 about music festivals";

/// Console output for one run.
pub struct UIHandler {
    spinner: bool,
}

impl UIHandler {
    pub fn new(config: &UIConfig) -> Self {
        colored::control::set_override(config.colorful);
        Self { spinner: config.spinner }
    }

    pub fn prompt_text() -> String {
        format!("Tell me what you're looking for (e.g., '{}'): ", EXAMPLE_REQUEST)
    }

    pub fn show_events(&self, feed: &Result<EventFeed, FetchError>) {
        println!("{}", render_events(feed));
        if let Ok(feed) = feed {
            println!("{}", "Raw Events Payload:".bright_white().bold());
            println!(
                "{}",
                serde_json::to_string_pretty(&feed.raw).unwrap_or_else(|_| feed.raw.to_string())
            );
        }
    }

    pub fn show_recommendation(&self, result: &FinalRecommendation) {
        println!("\n{}\n", "Workflow Result:".bright_green().bold());
        println!("{}", result.recommendation);
    }

    pub fn show_error(&self, message: &str) {
        eprintln!("{} {}", "Error:".red().bold(), message);
    }

    /// Spinner shown while the stages run; `None` when disabled.
    pub fn start_spinner(&self, message: &str) -> Option<ProgressBar> {
        if !self.spinner {
            return None;
        }
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed}] {msg}") {
            bar.set_style(style);
        }
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(120));
        Some(bar)
    }
}

/// Plain-text listing of a fetch result.
pub fn render_events(feed: &Result<EventFeed, FetchError>) -> String {
    let feed = match feed {
        Ok(feed) => feed,
        Err(e) => return format!("Error: {}", e),
    };
    if feed.events.is_empty() {
        return "No events found for the given criteria.".to_string();
    }

    let mut output = String::from("\nFetched Events:\n\n");
    for event in &feed.events {
        output.push_str(&format!("Title: {}\n", event.title));
        output.push_str(&format!("Date: {}\n", event.date));
        output.push_str(&format!("Address: {}\n", event.address));
        output.push_str(&format!("Description: {}\n", event.description));
        output.push_str(&format!("Thumbnail: {}\n", event.thumbnail_url));
        output.push_str(&format!("Link: {}\n\n", event.link));
        output.push_str(&"-".repeat(50));
        output.push('\n');
    }
    output
}

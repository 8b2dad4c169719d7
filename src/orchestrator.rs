use log::{error, info, warn};
use serde::Serialize;
use thiserror::Error;

use crate::context::{Message, PipelineContext};
use crate::event_source::{EventFeed, EventSource, FetchError};
use crate::interpreter::{ParsedQuery, QueryInputs};
use crate::llm_manager::LLMManager;
use crate::stages::{StageKind, StageOutputs};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{field} is required. Please specify a location (e.g., 'in Dhaka').")]
    MissingRequiredField { field: &'static str },

    #[error("{stage} stage failed: {message}")]
    Backend { stage: StageKind, message: String },
}

/// What the pipeline concluded for one request.
#[derive(Debug, Clone, Serialize)]
pub struct FinalRecommendation {
    pub recommendation: String,
    pub event_plan: String,
    pub weather: String,
    pub messages_exchanged: usize,
}

/// Sequences the event lookup and the planning, forecasting and
/// recommending stages for a single request.
pub struct Orchestrator<'a> {
    llm_manager: &'a LLMManager,
    events: &'a dyn EventSource,
}

impl<'a> Orchestrator<'a> {
    pub fn new(llm_manager: &'a LLMManager, events: &'a dyn EventSource) -> Self {
        Self { llm_manager, events }
    }

    /// Handle one request end to end. The event lookup result is passed to
    /// `on_events` before any stage runs; a failed lookup does not stop the
    /// stages.
    pub async fn handle<F>(
        &self,
        parsed: &ParsedQuery,
        on_events: F,
    ) -> Result<FinalRecommendation, PipelineError>
    where
        F: FnOnce(&Result<EventFeed, FetchError>),
    {
        let inputs = QueryInputs::from_parsed(parsed)?;

        let feed = self
            .events
            .fetch(
                &inputs.location,
                &inputs.date,
                &inputs.preferences,
                Some(inputs.event_name.as_str()),
            )
            .await;
        if let Err(e) = &feed {
            warn!("Event lookup failed, continuing with the pipeline: {}", e);
        }
        on_events(&feed);

        self.run(parsed).await
    }

    /// Run the three stages for a parsed request.
    pub async fn run(&self, parsed: &ParsedQuery) -> Result<FinalRecommendation, PipelineError> {
        let inputs = QueryInputs::from_parsed(parsed)?;
        self.run_stages(&inputs).await
    }

    async fn run_stages(&self, inputs: &QueryInputs) -> Result<FinalRecommendation, PipelineError> {
        let mut context = PipelineContext::new();
        let mut outputs = StageOutputs::default();
        info!("Starting pipeline {} for {}", context.id(), inputs.location);

        for kind in StageKind::ALL {
            let (next, output) = self.run_stage(kind, inputs, &outputs, context).await?;
            context = next;
            outputs.record(kind, output);
        }

        let recommendation = context.last_reply().unwrap_or_default().to_string();
        info!(
            "Pipeline {} finished: {} messages, ~{} tokens",
            context.id(),
            context.len(),
            context.total_tokens()
        );

        Ok(FinalRecommendation {
            recommendation,
            event_plan: outputs.plan.unwrap_or_default(),
            weather: outputs.forecast.unwrap_or_default(),
            messages_exchanged: context.len(),
        })
    }

    /// One stage: append its prompt, ask the backend once, append the reply.
    async fn run_stage(
        &self,
        kind: StageKind,
        inputs: &QueryInputs,
        outputs: &StageOutputs,
        context: PipelineContext,
    ) -> Result<(PipelineContext, String), PipelineError> {
        info!("Running {} stage", kind);
        let profile = kind.profile().system_text();
        let context = context.push(Message::user(kind.prompt(inputs, outputs)));

        let reply = self
            .llm_manager
            .complete(&profile, context.messages())
            .await
            .map_err(|e| {
                error!("{} stage failed: {:#}", kind, e);
                PipelineError::Backend {
                    stage: kind,
                    message: format!("{:#}", e),
                }
            })?;

        info!("{} stage complete ({} chars)", kind, reply.len());
        let context = context.push(Message::assistant(reply.clone()));
        Ok((context, reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::MessageRole;
    use crate::interpreter::Interpreter;
    use crate::llm_manager::{CompletionRequest, LLMProvider, LocalProvider};
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    /// Records every request and answers with "<role>: <last user prompt>".
    #[derive(Clone, Default)]
    struct ScriptedProvider {
        calls: Arc<Mutex<Vec<(String, Vec<MessageRole>)>>>,
        fail_on_call: Option<usize>,
    }

    #[async_trait]
    impl LLMProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String> {
            let mut calls = self.calls.lock().unwrap();
            calls.push((
                request.profile.to_string(),
                request.messages.iter().map(|m| m.role).collect(),
            ));
            if self.fail_on_call == Some(calls.len()) {
                return Err(anyhow!("backend unavailable"));
            }
            let last = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(format!("{} says: {}", request.profile.split('.').next().unwrap_or(""), last))
        }
    }

    /// (location, date, preferences, event name) of one lookup.
    type Lookup = (String, String, Vec<String>, Option<String>);

    struct StaticEvents {
        result: fn() -> Result<EventFeed, FetchError>,
        calls: Mutex<Vec<Lookup>>,
    }

    impl StaticEvents {
        fn new(result: fn() -> Result<EventFeed, FetchError>) -> Self {
            Self { result, calls: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl EventSource for StaticEvents {
        async fn fetch(
            &self,
            location: &str,
            date: &str,
            preferences: &[String],
            event_name: Option<&str>,
        ) -> std::result::Result<EventFeed, FetchError> {
            self.calls.lock().unwrap().push((
                location.to_string(),
                date.to_string(),
                preferences.to_vec(),
                event_name.map(str::to_string),
            ));
            (self.result)()
        }
    }

    fn one_event() -> std::result::Result<EventFeed, FetchError> {
        Ok(EventFeed::from_payload(json!({"events": [{"title": "Dhaka Music Fest"}]})))
    }

    fn server_error() -> std::result::Result<EventFeed, FetchError> {
        Err(FetchError::Status { status: 500, message: "Internal Server Error".to_string() })
    }

    const REQUEST: &str =
        "I want outdoor family-friendly events in Dhaka on 2025-02-15 about music festivals";

    #[tokio::test]
    async fn test_end_to_end() {
        let provider = ScriptedProvider::default();
        let calls = provider.calls.clone();
        let manager = LLMManager::new(Box::new(provider), 300, 0.7);
        let events = StaticEvents::new(one_event);
        let orchestrator = Orchestrator::new(&manager, &events);

        let mut shown = 0;
        let result = orchestrator
            .handle(&Interpreter::parse(REQUEST), |feed| {
                shown = feed.as_ref().map(|f| f.events.len()).unwrap_or(0);
            })
            .await
            .unwrap();

        assert_eq!(shown, 1);
        assert!(!result.recommendation.is_empty());
        assert!(result.recommendation.contains("Dhaka"));
        assert!(result.recommendation.contains("2025-02-15"));
        assert!(result.recommendation.starts_with("You are Activity Recommender"));
        assert_eq!(result.messages_exchanged, 6);

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert!(calls[0].0.contains("Event Planner"));
        assert!(calls[1].0.contains("Weather Forecaster"));
        assert!(calls[2].0.contains("Activity Recommender"));
        // each stage sees everything before it plus its own prompt
        assert_eq!(calls[0].1, vec![MessageRole::User]);
        assert_eq!(calls[1].1.len(), 3);
        assert_eq!(calls[2].1.len(), 5);

        let lookups = events.calls.lock().unwrap();
        assert_eq!(lookups.len(), 1);
        let (location, date, preferences, event_name) = &lookups[0];
        assert_eq!(location, "Dhaka");
        assert_eq!(date, "2025-02-15");
        assert_eq!(preferences, &vec!["outdoor".to_string(), "family-friendly".to_string()]);
        assert_eq!(event_name.as_deref(), Some("music festivals"));
    }

    #[tokio::test]
    async fn test_lookup_uses_fallbacks() {
        let manager = LLMManager::new(Box::new(LocalProvider), 300, 0.7);
        let events = StaticEvents::new(one_event);
        let orchestrator = Orchestrator::new(&manager, &events);

        orchestrator
            .handle(&Interpreter::parse("events in Dhaka"), |_| {})
            .await
            .unwrap();

        let lookups = events.calls.lock().unwrap();
        assert_eq!(lookups.len(), 1);
        let (location, date, preferences, event_name) = &lookups[0];
        assert_eq!(location, "Dhaka");
        assert_eq!(date, "today");
        assert_eq!(preferences, &vec!["any".to_string()]);
        assert_eq!(event_name.as_deref(), Some("general events"));
    }

    #[tokio::test]
    async fn test_recommender_sees_prior_outputs() {
        let manager = LLMManager::new(Box::new(ScriptedProvider::default()), 300, 0.7);
        let events = StaticEvents::new(one_event);
        let orchestrator = Orchestrator::new(&manager, &events);

        let result = orchestrator.run(&Interpreter::parse(REQUEST)).await.unwrap();
        assert!(result.event_plan.starts_with("You are Event Planner"));
        assert!(result.weather.starts_with("You are Weather Forecaster"));
        assert!(result.recommendation.contains(&result.event_plan));
        assert!(result.recommendation.contains(&result.weather));
        // run() does not touch the event source
        assert!(events.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_location_makes_no_calls() {
        let provider = ScriptedProvider::default();
        let calls = provider.calls.clone();
        let manager = LLMManager::new(Box::new(provider), 300, 0.7);
        let events = StaticEvents::new(one_event);
        let orchestrator = Orchestrator::new(&manager, &events);

        let mut shown = false;
        let err = orchestrator
            .handle(&Interpreter::parse("I want something fun"), |_| shown = true)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::MissingRequiredField { field: "location" }));
        assert!(!shown);
        assert!(events.calls.lock().unwrap().is_empty());
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_still_runs_stages() {
        let provider = ScriptedProvider::default();
        let calls = provider.calls.clone();
        let manager = LLMManager::new(Box::new(provider), 300, 0.7);
        let events = StaticEvents::new(server_error);
        let orchestrator = Orchestrator::new(&manager, &events);

        let mut fetch_failed = false;
        let result = orchestrator
            .handle(&Interpreter::parse("music in Dhaka"), |feed| fetch_failed = feed.is_err())
            .await;

        assert!(fetch_failed);
        assert!(result.is_ok());
        assert_eq!(calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_backend_failure_is_fatal() {
        let provider = ScriptedProvider { fail_on_call: Some(2), ..ScriptedProvider::default() };
        let calls = provider.calls.clone();
        let manager = LLMManager::new(Box::new(provider), 300, 0.7);
        let events = StaticEvents::new(one_event);
        let orchestrator = Orchestrator::new(&manager, &events);

        let err = orchestrator.run(&Interpreter::parse("events in Dhaka")).await.unwrap_err();
        match err {
            PipelineError::Backend { stage, message } => {
                assert_eq!(stage, StageKind::Forecaster);
                assert!(message.contains("backend unavailable"));
            }
            other => panic!("unexpected error: {other}"),
        }
        // no retry, and the recommender never runs
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_fallbacks_reach_the_prompts() {
        let manager = LLMManager::new(Box::new(LocalProvider), 300, 0.7);
        let events = StaticEvents::new(one_event);
        let orchestrator = Orchestrator::new(&manager, &events);

        let result = orchestrator.run(&Interpreter::parse("events in Dhaka")).await.unwrap();
        assert!(result.event_plan.contains("- Date: today"));
        assert!(result.event_plan.contains("- Preferences: any"));
        assert!(result.event_plan.contains("- Event Name: general events"));
    }
}

//! Metered talk-starter generation.
//!
//! Generation is the only paid feature. The gate works in three steps:
//! reject up front when the ledger is empty, generate, then consume exactly
//! one unit after the generation succeeded. Consumption is never
//! speculative, so an abandoned request leaves the ledger untouched.

use indoc::formatdoc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use crate::error::{CoreError, Result};
use crate::identity::DeviceIdentity;
use crate::ledger::CreditLedger;
use crate::storage::{Database, LlmConfig};

/// Interactions fed into the generation prompt.
const CONTEXT_LIMIT: usize = 5;
/// Longest `context_used` echo returned to the caller.
const CONTEXT_ECHO_CHARS: usize = 200;
const MAX_STARTERS: usize = 5;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Generated conversation starters plus the context that produced them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TalkStarters {
    pub starters: Vec<String>,
    pub context_used: String,
}

/// Talk-starter generator backed by a chat-completions proxy.
pub struct StarterGenerator {
    proxy_url: String,
    api_key: String,
    model: String,
    client: Client,
}

impl StarterGenerator {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            proxy_url: config.proxy_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            client: Client::new(),
        }
    }

    /// Generate starters for a friend, consuming one ledger unit.
    ///
    /// Rejects with `InsufficientBalance` before any work when the device
    /// has no credit, and with `NotFound` when the friend belongs to another
    /// device. LLM failures degrade to canned starters rather than failing
    /// the request.
    pub async fn generate(
        &self,
        db: &Database,
        ledger: &CreditLedger,
        identity: &DeviceIdentity,
        friend_id: &str,
        language: &str,
    ) -> Result<TalkStarters> {
        if !ledger.has_balance(identity)? {
            return Err(CoreError::InsufficientBalance);
        }

        let friend = db
            .get_friend(identity.as_str(), friend_id)?
            .ok_or_else(|| CoreError::NotFound {
                resource: "friend",
                id: friend_id.to_string(),
            })?;

        let context = interaction_context(db, friend_id)?;
        let starters = self
            .fetch_starters(&friend.name, friend.relation_type.as_str(), &context, language)
            .await;

        // The unit is spent only once generation has produced something.
        ledger.consume_one(identity)?;

        Ok(TalkStarters {
            starters,
            context_used: truncate_chars(&context, CONTEXT_ECHO_CHARS),
        })
    }

    async fn fetch_starters(
        &self,
        friend_name: &str,
        relation_type: &str,
        context: &str,
        language: &str,
    ) -> Vec<String> {
        if self.api_key.is_empty() {
            return default_starters();
        }

        let prompt = build_prompt(friend_name, relation_type, context, language);
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": 0.8,
            "max_tokens": 500,
        });

        let result = self
            .client
            .post(format!("{}/v1/chat/completions", self.proxy_url))
            .bearer_auth(&self.api_key)
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => match resp.json::<serde_json::Value>().await
            {
                Ok(data) => parse_completion(&data).unwrap_or_else(default_starters),
                Err(_) => default_starters(),
            },
            _ => default_starters(),
        }
    }
}

/// Render the last few interactions into prompt context.
pub fn interaction_context(db: &Database, friend_id: &str) -> Result<String> {
    let interactions = db.interactions_for(friend_id, CONTEXT_LIMIT)?;
    if interactions.is_empty() {
        return Ok("No previous interactions recorded.".to_string());
    }

    let mut lines = Vec::new();
    for interaction in interactions {
        let date = interaction.contacted_at.format("%Y-%m-%d");
        let summary = interaction.summary.as_deref().unwrap_or("No summary");
        lines.push(format!("- {date}: {summary}"));
        if let Some(topics) = &interaction.next_topics {
            if !topics.is_empty() {
                lines.push(format!("  Topics to follow up: {}", topics.join(", ")));
            }
        }
    }
    Ok(lines.join("\n"))
}

fn build_prompt(friend_name: &str, relation_type: &str, context: &str, language: &str) -> String {
    let target_language = language_name(language);
    formatdoc! {r#"
        You are helping someone with ADHD reconnect with their {relation_type} named {friend_name}.

        Based on their previous interactions:
        {context}

        Generate 5 natural, warm conversation starters that:
        1. Reference previous topics if available
        2. Are open-ended to encourage real connection
        3. Feel genuine, not forced or awkward
        4. Account for the time passed since last contact

        Respond in {target_language}.

        Format: Return ONLY a JSON array of 5 strings, no other text.
        Example: ["How did the project you mentioned go?", "I was thinking about you when...", ...]"#
    }
}

fn language_name(code: &str) -> &'static str {
    match code {
        "zh" => "Chinese (Simplified)",
        "ja" => "Japanese",
        "de" => "German",
        "fr" => "French",
        "ko" => "Korean",
        "es" => "Spanish",
        _ => "English",
    }
}

/// Pull the starter list out of a chat-completions response.
///
/// The model is asked for a bare JSON array but sometimes wraps it in prose;
/// slice from the first `[` to the last `]` before parsing. A reply with no
/// array at all is used verbatim as a single starter.
fn parse_completion(data: &serde_json::Value) -> Option<Vec<String>> {
    let content = data["choices"][0]["message"]["content"].as_str()?.trim();

    if let (Some(start), Some(end)) = (content.find('['), content.rfind(']')) {
        if start < end {
            if let Ok(starters) = serde_json::from_str::<Vec<String>>(&content[start..=end]) {
                return Some(starters.into_iter().take(MAX_STARTERS).collect());
            }
        }
    }

    if content.is_empty() {
        None
    } else {
        Some(vec![content.to_string()])
    }
}

fn default_starters() -> Vec<String> {
    vec![
        "How have you been lately?".to_string(),
        "What's new in your life?".to_string(),
        "Any exciting plans coming up?".to_string(),
    ]
}

fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let cut: String = text.chars().take(limit).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contacts::{NewFriend, NewInteraction};

    fn setup() -> (Database, CreditLedger, DeviceIdentity, String) {
        let db = Database::open_memory().unwrap();
        let ledger = CreditLedger::open_memory(3).unwrap();
        let identity = DeviceIdentity::new("dev-test".to_string());
        let friend = db
            .insert_friend(
                identity.as_str(),
                &NewFriend {
                    name: "Alex".to_string(),
                    ..Default::default()
                },
            )
            .unwrap();
        (db, ledger, identity, friend.id)
    }

    fn generator_for(url: &str, key: &str) -> StarterGenerator {
        StarterGenerator::new(&LlmConfig {
            proxy_url: url.to_string(),
            api_key: key.to_string(),
            model: "gpt-4o-mini".to_string(),
        })
    }

    #[tokio::test]
    async fn empty_ledger_rejects_before_any_work() {
        let (db, _, identity, friend_id) = setup();
        let ledger = CreditLedger::open_memory(0).unwrap();
        let generator = generator_for("http://127.0.0.1:1", "");

        let err = generator
            .generate(&db, &ledger, &identity, &friend_id, "en")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InsufficientBalance));

        // No ledger mutation on rejection.
        assert_eq!(ledger.balance(&identity).unwrap().total(), 0);
    }

    #[tokio::test]
    async fn unknown_friend_is_not_found_and_consumes_nothing() {
        let (db, ledger, identity, _) = setup();
        let generator = generator_for("http://127.0.0.1:1", "");

        let err = generator
            .generate(&db, &ledger, &identity, "nope", "en")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
        assert_eq!(ledger.balance(&identity).unwrap().total(), 3);
    }

    #[tokio::test]
    async fn unconfigured_key_returns_defaults_and_consumes_one() {
        let (db, ledger, identity, friend_id) = setup();
        let generator = generator_for("http://127.0.0.1:1", "");

        let result = generator
            .generate(&db, &ledger, &identity, &friend_id, "en")
            .await
            .unwrap();
        assert_eq!(result.starters, default_starters());
        assert_eq!(result.context_used, "No previous interactions recorded.");
        assert_eq!(ledger.balance(&identity).unwrap().total(), 2);
    }

    #[tokio::test]
    async fn successful_generation_parses_array_reply() {
        let (db, ledger, identity, friend_id) = setup();
        db.insert_interaction(
            &friend_id,
            &NewInteraction {
                summary: Some("talked about the marathon".to_string()),
                next_topics: Some(vec!["race day".to_string()]),
                ..Default::default()
            },
        )
        .unwrap();

        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "choices": [{"message": {"content": "[\"How was race day?\", \"Still running?\"]"}}]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let generator = generator_for(&server.url(), "sk-test");
        let result = generator
            .generate(&db, &ledger, &identity, &friend_id, "en")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result.starters, vec!["How was race day?", "Still running?"]);
        assert!(result.context_used.contains("talked about the marathon"));
        assert!(result.context_used.contains("race day"));
        assert_eq!(ledger.balance(&identity).unwrap().total(), 2);
    }

    #[tokio::test]
    async fn proxy_failure_degrades_to_defaults() {
        let (db, ledger, identity, friend_id) = setup();

        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(500)
            .create_async()
            .await;

        let generator = generator_for(&server.url(), "sk-test");
        let result = generator
            .generate(&db, &ledger, &identity, &friend_id, "en")
            .await
            .unwrap();
        assert_eq!(result.starters, default_starters());
        assert_eq!(ledger.balance(&identity).unwrap().total(), 2);
    }

    #[test]
    fn parse_completion_slices_array_out_of_prose() {
        let data = json!({
            "choices": [{"message": {"content": "Sure! Here you go: [\"a\", \"b\"] hope that helps"}}]
        });
        assert_eq!(
            parse_completion(&data),
            Some(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn parse_completion_caps_at_five() {
        let data = json!({
            "choices": [{"message": {"content": "[\"1\",\"2\",\"3\",\"4\",\"5\",\"6\",\"7\"]"}}]
        });
        assert_eq!(parse_completion(&data).unwrap().len(), 5);
    }

    #[test]
    fn parse_completion_falls_back_to_raw_text() {
        let data = json!({
            "choices": [{"message": {"content": "Just ask how they are doing."}}]
        });
        assert_eq!(
            parse_completion(&data),
            Some(vec!["Just ask how they are doing.".to_string()])
        );
    }

    #[test]
    fn context_echo_is_truncated() {
        let long = "x".repeat(500);
        let echoed = truncate_chars(&long, CONTEXT_ECHO_CHARS);
        assert_eq!(echoed.chars().count(), CONTEXT_ECHO_CHARS + 3);
        assert!(echoed.ends_with("..."));
    }
}

//! OpenAI-backed draft generation adapter.

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

use prospector_types::{ProspectorError, Result};

use crate::boundary::{
    classify_status, classify_transport, DraftReply, DraftRequest, GenerationService,
};

const DEFAULT_TIMEOUT_MS: u64 = 60_000;

#[derive(Debug)]
pub struct OpenAiGenerator {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
    model: String,
    timeout_ms: u64,
}

impl OpenAiGenerator {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
            base_url: "https://api.openai.com".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn from_env() -> Result<Self> {
        let key = std::env::var("OPENAI_API_KEY").map_err(|_| ProspectorError::AuthError {
            service: "generation".into(),
        })?;
        Ok(Self::new(key))
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    fn build_prompt(request: &DraftRequest) -> String {
        let mut prompt = format!(
            "Draft a concise outreach email from {sender} at {org} to {company}.\n\
             Value proposition: {value_prop}\n\
             Company description: {description}\n\
             ICP tier: {tier}\n",
            sender = request.persona.sender_name,
            org = request.persona.org_name,
            company = request.company_name,
            value_prop = request.persona.value_prop,
            description = request.company_description,
            tier = request.tier,
        );
        if request.facts.is_empty() {
            prompt.push_str("Known facts: none. Do not invent any specifics.\n");
        } else {
            prompt.push_str("Known facts (use ONLY these, never invent others):\n");
            for (name, value) in &request.facts {
                prompt.push_str(&format!("  - {name}: {value}\n"));
            }
        }
        if let Some(ref feedback) = request.feedback {
            prompt.push_str(&format!(
                "A previous draft was rejected for: {feedback}. Fix that.\n"
            ));
        }
        prompt.push_str(
            "End the body with the literal placeholder {{signature}} on its own line.\n\
             Respond with JSON: {\"subject\": ..., \"body\": ...}.",
        );
        prompt
    }

    /// Extract `{subject, body}` from the model output. Falls back to
    /// treating the whole text as the body when it is not valid JSON.
    fn parse_reply(&self, request: &DraftRequest, text: &str) -> Result<DraftReply> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ProspectorError::GenerationEmpty);
        }
        // Strip markdown code fences if present.
        let stripped = text
            .strip_prefix("```json")
            .or_else(|| text.strip_prefix("```"))
            .and_then(|s| s.strip_suffix("```"))
            .unwrap_or(text)
            .trim();

        let (subject, body) = match serde_json::from_str::<serde_json::Value>(stripped) {
            Ok(v) => (
                v["subject"].as_str().unwrap_or("").to_string(),
                v["body"].as_str().unwrap_or("").to_string(),
            ),
            Err(_) => (
                format!("Collaboration with {}", request.company_name),
                stripped.to_string(),
            ),
        };
        if subject.trim().is_empty() || body.trim().is_empty() {
            return Err(ProspectorError::GenerationEmpty);
        }
        Ok(DraftReply {
            subject,
            body,
            model: self.model.clone(),
        })
    }
}

#[async_trait]
impl GenerationService for OpenAiGenerator {
    async fn draft(&self, request: &DraftRequest) -> Result<DraftReply> {
        let prompt = Self::build_prompt(request);
        tracing::info!(
            company = %request.company_name,
            regeneration = request.feedback.is_some(),
            "Generation request"
        );

        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": "You are a sales development representative writing short, honest outreach emails."},
                {"role": "user", "content": prompt},
            ],
            "temperature": 0.7,
        });

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .timeout(Duration::from_millis(self.timeout_ms))
            .send()
            .await
            .map_err(|e| classify_transport("generation", self.timeout_ms, &e))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(classify_status("generation", status, &message));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| classify_transport("generation", self.timeout_ms, &e))?;
        let text = payload["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("");

        self.parse_reply(request, text)
    }

    fn name(&self) -> &str {
        "generation"
    }
}

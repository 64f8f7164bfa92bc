//! On-demand translation of catalog content through an LLM completion API.
//!
//! Serbian is the source language. Only variants that are missing are
//! filled; existing translations are never overwritten. Nothing here runs
//! automatically, an editor triggers it per document or in bulk.

use super::{
    ServiceError, ServiceResult, product_service::ProductService,
    project_service::ProjectService,
};
use crate::models::localized::{Language, LocalizedTags, LocalizedText};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";
const TEMPERATURE: f32 = 0.1;
const MAX_TOKENS: u32 = 1000;

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("completion API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("completion API returned no text")]
    Empty,
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: SecretString,
    pub model: String,
    pub base_url: String,
}

#[derive(Clone)]
pub struct OpenAiClient {
    inner: Arc<OpenAiClientInner>,
}

struct OpenAiClientInner {
    client: reqwest::Client,
    config: OpenAiConfig,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: String,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, CompletionError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            inner: Arc::new(OpenAiClientInner { client, config }),
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    #[instrument(skip(self, prompt), fields(model = %self.inner.config.model))]
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let config = &self.inner.config;
        let request = ChatRequest {
            model: &config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let response = self
            .inner
            .client
            .post(format!(
                "{}/chat/completions",
                config.base_url.trim_end_matches('/')
            ))
            .bearer_auth(config.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(CompletionError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: ChatResponse = response.json().await?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or(CompletionError::Empty)
    }
}

fn prompt(text: &str, from: Language, to: Language) -> String {
    format!(
        "Translate the following text from {} to {}. Maintain the original meaning and context. \
         Only return the translated text, no additional explanations:\n\n{}",
        from.display_name(),
        to.display_name(),
        text
    )
}

pub async fn translate_text(
    client: &dyn CompletionClient,
    text: &str,
    from: Language,
    to: Language,
) -> Result<String, CompletionError> {
    client.complete(&prompt(text, from, to)).await
}

/// Fill the missing `targets` of `text` from its Serbian variant, recording
/// `{path}.{lang}` for each filled slot.
async fn fill_text(
    client: &dyn CompletionClient,
    text: &mut LocalizedText,
    path: &str,
    targets: &[Language],
    filled: &mut Vec<String>,
) -> Result<(), CompletionError> {
    let Some(source) = text.get(Language::Sr).map(str::to_string) else {
        return Ok(());
    };
    for &lang in targets {
        if text.is_missing(lang) {
            let translated = translate_text(client, &source, Language::Sr, lang).await?;
            text.set(lang, translated);
            filled.push(format!("{path}.{lang}"));
        }
    }
    Ok(())
}

/// Tags are translated one by one, and only for languages with no tags.
async fn fill_tags(
    client: &dyn CompletionClient,
    tags: &mut LocalizedTags,
    path: &str,
    targets: &[Language],
    filled: &mut Vec<String>,
) -> Result<(), CompletionError> {
    if tags.sr.is_empty() {
        return Ok(());
    }
    let source = tags.sr.clone();
    for &lang in targets {
        if tags.get(lang).is_empty() {
            let mut translated = Vec::with_capacity(source.len());
            for tag in &source {
                translated.push(translate_text(client, tag, Language::Sr, lang).await?);
            }
            tags.set(lang, translated);
            filled.push(format!("{path}.{lang}"));
        }
    }
    Ok(())
}

/// Normalize a requested language list: Serbian is the source, never a
/// target, and an empty request means every target language.
pub fn target_languages(requested: Option<Vec<Language>>) -> Vec<Language> {
    let mut langs: Vec<Language> = requested
        .unwrap_or_default()
        .into_iter()
        .filter(|l| *l != Language::Sr)
        .collect();
    langs.dedup();
    if langs.is_empty() {
        Language::translation_targets()
    } else {
        langs
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TranslationReport {
    pub translated_fields: Vec<String>,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem {
    pub id: Uuid,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TranslationReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct Translator {
    client: Option<Arc<dyn CompletionClient>>,
    products: ProductService,
    projects: ProjectService,
}

impl Translator {
    pub fn new(
        client: Option<Arc<dyn CompletionClient>>,
        products: ProductService,
        projects: ProjectService,
    ) -> Self {
        Self {
            client,
            products,
            projects,
        }
    }

    fn client(&self) -> ServiceResult<&dyn CompletionClient> {
        self.client
            .as_deref()
            .ok_or_else(|| ServiceError::Unavailable("Translation service is not configured".into()))
    }

    #[instrument(skip(self, languages))]
    pub async fn translate_product(
        &self,
        id: Uuid,
        languages: &[Language],
    ) -> ServiceResult<TranslationReport> {
        let client = self.client()?;
        let mut product = self.products.get(id).await?;
        let mut filled = Vec::new();

        fill_text(client, &mut product.title, "title", languages, &mut filled).await?;
        fill_text(client, &mut product.description, "description", languages, &mut filled).await?;
        fill_text(client, &mut product.catalog.category, "catalog.category", languages, &mut filled)
            .await?;
        fill_text(
            client,
            &mut product.catalog.subcategory,
            "catalog.subcategory",
            languages,
            &mut filled,
        )
        .await?;
        fill_tags(client, &mut product.catalog.tags, "catalog.tags", languages, &mut filled).await?;
        for (i, color) in product.colors.iter_mut().enumerate() {
            let path = format!("colors.{i}.name");
            fill_text(client, &mut color.name, &path, languages, &mut filled).await?;
        }
        for (i, size) in product.sizes.iter_mut().enumerate() {
            let path = format!("sizes.{i}.name");
            fill_text(client, &mut size.name, &path, languages, &mut filled).await?;
        }

        if !filled.is_empty() {
            self.products.persist(&product).await?;
        }
        info!(fields = filled.len(), "product translated");
        Ok(TranslationReport {
            translated_fields: filled,
        })
    }

    #[instrument(skip(self, languages))]
    pub async fn translate_project(
        &self,
        id: Uuid,
        languages: &[Language],
    ) -> ServiceResult<TranslationReport> {
        let client = self.client()?;
        let mut project = self.projects.get(id).await?;
        let mut filled = Vec::new();

        fill_text(client, &mut project.title, "title", languages, &mut filled).await?;
        fill_text(client, &mut project.description, "description", languages, &mut filled).await?;
        fill_text(client, &mut project.category, "category", languages, &mut filled).await?;
        fill_text(client, &mut project.client, "client", languages, &mut filled).await?;
        fill_text(client, &mut project.location, "location", languages, &mut filled).await?;
        fill_tags(client, &mut project.tags, "tags", languages, &mut filled).await?;

        if !filled.is_empty() {
            self.projects.persist(&project).await?;
        }
        info!(fields = filled.len(), "project translated");
        Ok(TranslationReport {
            translated_fields: filled,
        })
    }

    /// Translate every product in turn. One failure does not stop the run.
    pub async fn translate_all_products(&self, languages: &[Language]) -> ServiceResult<Vec<BatchItem>> {
        self.client()?;
        let mut results = Vec::new();
        for id in self.products.all_ids().await? {
            results.push(batch_item(id, self.translate_product(id, languages).await));
        }
        Ok(results)
    }

    pub async fn translate_all_projects(&self, languages: &[Language]) -> ServiceResult<Vec<BatchItem>> {
        self.client()?;
        let mut results = Vec::new();
        for id in self.projects.all_ids().await? {
            results.push(batch_item(id, self.translate_project(id, languages).await));
        }
        Ok(results)
    }
}

fn batch_item(id: Uuid, result: ServiceResult<TranslationReport>) -> BatchItem {
    match result {
        Ok(report) => BatchItem {
            id,
            success: true,
            result: Some(report),
            error: None,
        },
        Err(err) => {
            warn!(%id, error = %err, "batch translation item failed");
            BatchItem {
                id,
                success: false,
                result: None,
                error: Some(err.to_string()),
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::EchoCompletion;
    use super::*;
    use httpmock::prelude::*;

    #[test]
    fn prompt_names_both_languages() {
        let p = prompt("Vrata", Language::Sr, Language::De);
        assert!(p.starts_with("Translate the following text from Serbian to German."));
        assert!(p.ends_with("\n\nVrata"));
    }

    #[test]
    fn serbian_is_never_a_target() {
        assert_eq!(target_languages(None), vec![Language::En, Language::De]);
        assert_eq!(
            target_languages(Some(vec![Language::Sr, Language::De])),
            vec![Language::De]
        );
        assert_eq!(
            target_languages(Some(vec![Language::Sr])),
            vec![Language::En, Language::De]
        );
    }

    #[tokio::test]
    async fn fill_text_only_touches_missing_slots() {
        let client = EchoCompletion::default();
        let mut text = LocalizedText {
            sr: Some("Prozor".into()),
            en: Some("Window".into()),
            de: None,
        };
        let mut filled = Vec::new();
        fill_text(&client, &mut text, "title", &Language::translation_targets(), &mut filled)
            .await
            .unwrap();
        assert_eq!(filled, vec!["title.de"]);
        assert_eq!(text.en.as_deref(), Some("Window"));
        assert_eq!(text.de.as_deref(), Some("[de] Prozor"));
        assert_eq!(client.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn fill_tags_translates_each_tag() {
        let client = EchoCompletion::default();
        let mut tags = LocalizedTags {
            sr: vec!["aluminijum".into(), "fasada".into()],
            en: vec!["existing".into()],
            de: Vec::new(),
        };
        let mut filled = Vec::new();
        fill_tags(&client, &mut tags, "tags", &Language::translation_targets(), &mut filled)
            .await
            .unwrap();
        assert_eq!(filled, vec!["tags.de"]);
        assert_eq!(tags.de, vec!["[de] aluminijum", "[de] fasada"]);
        assert_eq!(tags.en, vec!["existing"]);
    }

    #[tokio::test]
    async fn openai_client_posts_chat_completion() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .header("authorization", "Bearer sk-test")
                .body_includes(r#""model":"gpt-3.5-turbo""#)
                .body_includes(r#""max_tokens":1000"#);
            then.status(200).json_body(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "  Door \n"}}]
            }));
        });

        let client = OpenAiClient::new(OpenAiConfig {
            api_key: SecretString::from("sk-test"),
            model: DEFAULT_OPENAI_MODEL.into(),
            base_url: server.base_url(),
        })
        .unwrap();
        let out = translate_text(&client, "Vrata", Language::Sr, Language::En)
            .await
            .unwrap();

        mock.assert();
        assert_eq!(out, "Door");
    }

    #[tokio::test]
    async fn openai_errors_are_surfaced() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(401)
                .json_body(serde_json::json!({"error": {"message": "Incorrect API key"}}));
        });
        let client = OpenAiClient::new(OpenAiConfig {
            api_key: SecretString::from("bad"),
            model: DEFAULT_OPENAI_MODEL.into(),
            base_url: server.base_url(),
        })
        .unwrap();
        let err = client.complete("x").await.unwrap_err();
        assert!(matches!(err, CompletionError::Api { status: 401, .. }));
    }
}

//! `ai` module: chat completions against OpenAI or Anthropic
//!
//! The API key and default endpoint come from the function's own
//! environment. Without a key the call fails before anything is sent.

use std::collections::BTreeMap;

use mlua::{Lua, Result as LuaResult, Table, Value as LuaValue};
use serde::{Deserialize, Serialize};

use super::{cancelled_error, fail, field, lua_number, lua_string, ok, Fallible, ModuleEnv};
use crate::functions::Cancelled;

pub const DEFAULT_OPENAI_ENDPOINT: &str = "https://api.openai.com/v1";
pub const DEFAULT_ANTHROPIC_ENDPOINT: &str = "https://api.anthropic.com";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Supported providers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Anthropic,
}

impl Provider {
    pub fn parse(name: &str) -> Result<Self, String> {
        match name {
            "openai" => Ok(Provider::OpenAi),
            "anthropic" => Ok(Provider::Anthropic),
            other => Err(format!(
                "unsupported provider: {} (use openai or anthropic)",
                other
            )),
        }
    }

    fn key_var(&self) -> &'static str {
        match self {
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    fn endpoint_var(&self) -> &'static str {
        match self {
            Provider::OpenAi => "OPENAI_ENDPOINT",
            Provider::Anthropic => "ANTHROPIC_ENDPOINT",
        }
    }

    fn default_endpoint(&self) -> &'static str {
        match self {
            Provider::OpenAi => DEFAULT_OPENAI_ENDPOINT,
            Provider::Anthropic => DEFAULT_ANTHROPIC_ENDPOINT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Validated `ai.chat` options
#[derive(Debug, Clone, PartialEq)]
pub struct ChatOptions {
    pub provider: Provider,
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    /// Sent only when positive
    pub temperature: f64,
    /// Overrides the environment/default endpoint when non-empty
    pub endpoint: String,
}

impl ChatOptions {
    /// Read and validate the guest's options table
    pub fn from_table(options: &Table) -> Result<Self, String> {
        let provider = lua_string(&field(options, "provider"));
        let model = lua_string(&field(options, "model"));
        let messages = field(options, "messages");

        if provider.is_empty() {
            return Err("provider is required (openai or anthropic)".into());
        }
        if model.is_empty() {
            return Err("model is required".into());
        }
        let LuaValue::Table(messages) = messages else {
            return Err("messages is required and must be a table".into());
        };

        let messages: Vec<ChatMessage> = messages
            .sequence_values::<LuaValue>()
            .filter_map(Result::ok)
            .filter_map(|v| match v {
                LuaValue::Table(msg) => {
                    let role = lua_string(&field(&msg, "role"));
                    let content = lua_string(&field(&msg, "content"));
                    (!role.is_empty() && !content.is_empty())
                        .then_some(ChatMessage { role, content })
                }
                _ => None,
            })
            .collect();
        if messages.is_empty() {
            return Err("messages cannot be empty".into());
        }

        let max_tokens = lua_number(&field(options, "max_tokens"));
        let temperature = lua_number(&field(options, "temperature"));
        let endpoint = lua_string(&field(options, "endpoint"));

        Ok(Self {
            provider: Provider::parse(&provider)?,
            model,
            messages,
            max_tokens: if max_tokens >= 1.0 {
                max_tokens as u32
            } else {
                DEFAULT_MAX_TOKENS
            },
            temperature,
            endpoint,
        })
    }
}

/// Canonical chat result handed back to the guest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChatResponse {
    pub content: String,
    pub model: String,
    pub usage: Usage,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub input_tokens: i64,
    pub output_tokens: i64,
}

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<&'a ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: OpenAiUsage,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: i64,
    #[serde(default)]
    completion_tokens: i64,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    content: Vec<AnthropicBlock>,
    #[serde(default)]
    usage: AnthropicUsage,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct AnthropicBlock {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: i64,
    #[serde(default)]
    output_tokens: i64,
}

/// Raw provider reply, one variant per wire shape
#[derive(Debug)]
enum ProviderResponse {
    OpenAi(OpenAiResponse),
    Anthropic(AnthropicResponse),
}

impl ProviderResponse {
    fn parse(provider: Provider, body: &str) -> Result<Self, String> {
        let parsed = match provider {
            Provider::OpenAi => serde_json::from_str(body).map(ProviderResponse::OpenAi),
            Provider::Anthropic => serde_json::from_str(body).map(ProviderResponse::Anthropic),
        };
        parsed.map_err(|e| format!("failed to parse response: {}", e))
    }

    fn into_chat(self) -> Result<ChatResponse, String> {
        match self {
            ProviderResponse::OpenAi(resp) => {
                if let Some(err) = resp.error {
                    return Err(format!("OpenAI API error: {}", err.message));
                }
                let choice = resp
                    .choices
                    .into_iter()
                    .next()
                    .ok_or_else(|| "no response from OpenAI".to_string())?;
                Ok(ChatResponse {
                    content: choice.message.content.unwrap_or_default(),
                    model: resp.model,
                    usage: Usage {
                        input_tokens: resp.usage.prompt_tokens,
                        output_tokens: resp.usage.completion_tokens,
                    },
                })
            }
            ProviderResponse::Anthropic(resp) => {
                if let Some(err) = resp.error {
                    return Err(format!("anthropic API error: {}", err.message));
                }
                if resp.content.is_empty() {
                    return Err("no response from Anthropic".into());
                }
                let content = resp
                    .content
                    .iter()
                    .filter(|block| block.kind == "text")
                    .map(|block| block.text.as_str())
                    .collect();
                Ok(ChatResponse {
                    content,
                    model: resp.model,
                    usage: Usage {
                        input_tokens: resp.usage.input_tokens,
                        output_tokens: resp.usage.output_tokens,
                    },
                })
            }
        }
    }
}

/// Build the provider request: URL, headers and JSON body
fn build_request(
    options: &ChatOptions,
    api_key: &str,
    endpoint: &str,
) -> (String, BTreeMap<String, String>, serde_json::Value) {
    let endpoint = endpoint.trim_end_matches('/');
    let temperature = (options.temperature > 0.0).then_some(options.temperature);

    match options.provider {
        Provider::OpenAi => {
            let body = OpenAiRequest {
                model: &options.model,
                messages: &options.messages,
                max_tokens: options.max_tokens,
                temperature,
            };
            (
                format!("{}/chat/completions", endpoint),
                BTreeMap::from([("Authorization".to_string(), format!("Bearer {}", api_key))]),
                serde_json::to_value(body).unwrap_or_default(),
            )
        }
        Provider::Anthropic => {
            let system = options
                .messages
                .iter()
                .filter(|m| m.role == "system")
                .map(|m| m.content.as_str())
                .last();
            let body = AnthropicRequest {
                model: &options.model,
                max_tokens: options.max_tokens,
                system,
                messages: options.messages.iter().filter(|m| m.role != "system").collect(),
                temperature,
            };
            (
                format!("{}/v1/messages", endpoint),
                BTreeMap::from([
                    ("x-api-key".to_string(), api_key.to_string()),
                    ("anthropic-version".to_string(), ANTHROPIC_VERSION.to_string()),
                ]),
                serde_json::to_value(body).unwrap_or_default(),
            )
        }
    }
}

/// Run one chat call
///
/// The outer error is cancellation; the inner one is reported to the guest.
pub async fn chat(
    env: &ModuleEnv,
    options: ChatOptions,
) -> Result<Result<ChatResponse, String>, Cancelled> {
    let provider = options.provider;
    let api_key = match env.env_var(provider.key_var()) {
        Ok(Some(key)) => key,
        Ok(None) => {
            return Ok(Err(format!(
                "{} not set in function environment",
                provider.key_var()
            )))
        }
        Err(e) => return Ok(Err(e.to_string())),
    };

    let endpoint = if options.endpoint.is_empty() {
        match env.env_var(provider.endpoint_var()) {
            Ok(configured) => {
                configured.unwrap_or_else(|| provider.default_endpoint().to_string())
            }
            Err(e) => return Ok(Err(e.to_string())),
        }
    } else {
        options.endpoint.clone()
    };

    let (url, headers, body) = build_request(&options, &api_key, &endpoint);
    let http = std::sync::Arc::clone(&env.http);
    let response = env
        .cancel
        .race(async move { http.post_json(&url, headers, &body).await })
        .await?;

    let response = match response {
        Ok(r) => r,
        Err(e) => return Ok(Err(e.to_string())),
    };

    Ok(ProviderResponse::parse(provider, &response.body).and_then(ProviderResponse::into_chat))
}

fn response_table(lua: &Lua, resp: ChatResponse) -> LuaResult<Table> {
    let table = lua.create_table()?;
    table.set("content", resp.content)?;
    table.set("model", resp.model)?;

    let usage = lua.create_table()?;
    usage.set("input_tokens", resp.usage.input_tokens)?;
    usage.set("output_tokens", resp.usage.output_tokens)?;
    table.set("usage", usage)?;
    Ok(table)
}

pub fn module(lua: &Lua, env: &ModuleEnv) -> LuaResult<Table> {
    let table = lua.create_table()?;

    let env = env.clone();
    table.set(
        "chat",
        lua.create_async_function(move |lua, options: LuaValue| {
            let env = env.clone();
            async move {
                let LuaValue::Table(options) = options else {
                    return Ok(fail::<Table>("options must be a table"));
                };
                let options = match ChatOptions::from_table(&options) {
                    Ok(o) => o,
                    Err(e) => return Ok(fail(e)),
                };

                let result: Fallible<Table> =
                    match chat(&env, options).await.map_err(cancelled_error)? {
                        Ok(resp) => ok(response_table(&lua, resp)?),
                        Err(e) => fail(e),
                    };
                Ok(result)
            }
        })?,
    )?;

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::testing::{
        fixture, fixture_with, fixture_with_env, BrokenStore, RecordingClient,
    };
    use std::sync::Arc;
    use crate::kv::NamespacedStore;
    use serde_json::json;

    async fn run(lua: &Lua, code: &str) -> (Option<Table>, Option<String>) {
        lua.load(code).eval_async().await.unwrap()
    }

    #[tokio::test]
    async fn test_openai_without_key_makes_no_call() {
        let fx = fixture();
        let (resp, err) = run(
            &fx.lua,
            r#"return ai.chat({provider = "openai", model = "gpt-4o",
                messages = {{role = "user", content = "hi"}}})"#,
        )
        .await;

        assert!(resp.is_none());
        assert_eq!(err.unwrap(), "OPENAI_API_KEY not set in function environment");
        assert!(fx.client.sent().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_environment_is_reported_not_missing() {
        let fx = fixture_with_env(
            RecordingClient::responding(200, "{}"),
            "fn_ai",
            Arc::new(BrokenStore),
        );
        let (resp, err) = run(
            &fx.lua,
            r#"return ai.chat({provider = "anthropic", model = "claude-x",
                messages = {{role = "user", content = "hi"}}})"#,
        )
        .await;

        assert!(resp.is_none());
        assert_eq!(err.as_deref(), Some("store error: disk on fire"));
        assert!(fx.client.sent().is_empty());
    }

    #[tokio::test]
    async fn test_empty_key_counts_as_unset() {
        let fx = fixture_with(RecordingClient::responding(200, "{}"), "fn_ai");
        fx.env.env.set("fn_ai", "OPENAI_API_KEY", "").unwrap();
        let (_, err) = run(
            &fx.lua,
            r#"return ai.chat({provider = "openai", model = "m",
                messages = {{role = "user", content = "hi"}}})"#,
        )
        .await;

        assert_eq!(err.unwrap(), "OPENAI_API_KEY not set in function environment");
        assert!(fx.client.sent().is_empty());
    }

    #[tokio::test]
    async fn test_validation_messages() {
        let fx = fixture();
        let cases = [
            (r#"{model = "m", messages = {}}"#, "provider is required (openai or anthropic)"),
            (r#"{provider = "openai", messages = {}}"#, "model is required"),
            (r#"{provider = "openai", model = "m"}"#, "messages is required and must be a table"),
            (
                r#"{provider = "openai", model = "m", messages = {{role = "user", content = ""}}}"#,
                "messages cannot be empty",
            ),
            (
                r#"{provider = "cohere", model = "m", messages = {{role = "user", content = "x"}}}"#,
                "unsupported provider: cohere (use openai or anthropic)",
            ),
        ];

        for (options, expected) in cases {
            let (resp, err) = run(&fx.lua, &format!("return ai.chat({})", options)).await;
            assert!(resp.is_none());
            assert_eq!(err.as_deref(), Some(expected));
        }
        assert!(fx.client.sent().is_empty());
    }

    #[tokio::test]
    async fn test_openai_request_and_response() {
        let body = json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o-2024",
            "choices": [{"message": {"content": "hello there"}}],
            "usage": {"prompt_tokens": 5, "completion_tokens": 2}
        });
        let fx = fixture_with(RecordingClient::responding(200, &body.to_string()), "fn_ai");
        fx.env.env.set("fn_ai", "OPENAI_API_KEY", "sk-test").unwrap();

        let (content, model, input, output): (String, String, i64, i64) = fx
            .lua
            .load(
                r#"
                local r, err = ai.chat({provider = "openai", model = "gpt-4o",
                    messages = {{role = "system", content = "be brief"}, {role = "user", content = "hi"}}})
                return r.content, r.model, r.usage.input_tokens, r.usage.output_tokens
                "#,
            )
            .eval_async()
            .await
            .unwrap();

        assert_eq!(content, "hello there");
        assert_eq!(model, "gpt-4o-2024");
        assert_eq!((input, output), (5, 2));

        let sent = fx.client.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].url, "https://api.openai.com/v1/chat/completions");
        assert_eq!(sent[0].headers["Authorization"], "Bearer sk-test");
        let payload: serde_json::Value =
            serde_json::from_str(sent[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(payload["max_tokens"], 1024);
        assert_eq!(payload["messages"].as_array().unwrap().len(), 2);
        assert!(payload.get("temperature").is_none());
    }

    #[tokio::test]
    async fn test_anthropic_system_split_and_endpoint_from_env() {
        let body = json!({
            "id": "msg_1",
            "model": "claude-x",
            "content": [{"type": "text", "text": "a"}, {"type": "text", "text": "b"}],
            "usage": {"input_tokens": 9, "output_tokens": 4}
        });
        let fx = fixture_with(RecordingClient::responding(200, &body.to_string()), "fn_ai");
        fx.env.env.set("fn_ai", "ANTHROPIC_API_KEY", "ak").unwrap();
        fx.env
            .env
            .set("fn_ai", "ANTHROPIC_ENDPOINT", "http://proxy.local/")
            .unwrap();

        let (resp, err) = run(
            &fx.lua,
            r#"return ai.chat({provider = "anthropic", model = "claude", max_tokens = 50,
                temperature = 0.5,
                messages = {{role = "system", content = "sys"}, {role = "user", content = "q"}}})"#,
        )
        .await;
        assert!(err.is_none());
        let resp = resp.unwrap();
        assert_eq!(resp.get::<String>("content").unwrap(), "ab");

        let sent = fx.client.sent();
        assert_eq!(sent[0].url, "http://proxy.local/v1/messages");
        assert_eq!(sent[0].headers["x-api-key"], "ak");
        assert_eq!(sent[0].headers["anthropic-version"], ANTHROPIC_VERSION);

        let payload: serde_json::Value =
            serde_json::from_str(sent[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(payload["system"], "sys");
        assert_eq!(payload["max_tokens"], 50);
        assert_eq!(payload["temperature"], 0.5);
        assert_eq!(payload["messages"], json!([{"role": "user", "content": "q"}]));
    }

    #[tokio::test]
    async fn test_provider_error_and_transport_error() {
        let body = json!({"error": {"message": "invalid key"}});
        let fx = fixture_with(RecordingClient::responding(401, &body.to_string()), "fn_ai");
        fx.env.env.set("fn_ai", "OPENAI_API_KEY", "bad").unwrap();

        let call = r#"return ai.chat({provider = "openai", model = "m",
            messages = {{role = "user", content = "x"}}})"#;
        let (_, err) = run(&fx.lua, call).await;
        assert_eq!(err.unwrap(), "OpenAI API error: invalid key");

        let fx = fixture_with(RecordingClient::default(), "fn_ai");
        fx.env.env.set("fn_ai", "OPENAI_API_KEY", "k").unwrap();
        let (_, err) = run(&fx.lua, call).await;
        assert_eq!(err.unwrap(), "HTTP request failed: connection refused");
    }

    #[test]
    fn test_unparsable_body() {
        let err = ProviderResponse::parse(Provider::Anthropic, "<html>").unwrap_err();
        assert!(err.starts_with("failed to parse response:"));
    }
}

//! Anthropic-native Messages API provider. Distinct wire format from the
//! OpenAI-compatible dialect (`system` as a top-level field, content
//! blocks instead of a flat string, `tool_use`/`tool_result` blocks
//! instead of `tool_calls`), so it gets its own client rather than
//! reusing `OpenAIProvider`.

use anyhow::Result;
use async_trait::async_trait;
use futures_util::stream::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error};

use crate::{
    CacheControl, CompletionChunk, CompletionRequest, CompletionResponse, CompletionStream,
    LLMProvider, Message, MessageRole, Tool, ToolCall, Usage,
};

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Clone)]
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
    temperature: Option<f32>,
    name: String,
    /// `Authorization: Bearer` for the OAuth token variant, `x-api-key`
    /// for a direct console API key.
    auth_style: AuthStyle,
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum AuthStyle {
    ApiKeyHeader,
    BearerToken,
}

impl AnthropicProvider {
    pub fn new(
        api_key: String,
        model: Option<String>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Result<Self> {
        Ok(Self {
            client: Client::new(),
            api_key,
            model: model.unwrap_or_else(|| "claude-sonnet-4-5".to_string()),
            base_url: "https://api.anthropic.com/v1".to_string(),
            max_tokens: max_tokens.unwrap_or(8192),
            temperature,
            name: "anthropic".to_string(),
            auth_style: AuthStyle::ApiKeyHeader,
        })
    }

    pub fn with_oauth_token(mut self, token: String) -> Self {
        self.api_key = token;
        self.auth_style = AuthStyle::BearerToken;
        self.name = "anthropic-oauth".to_string();
        self
    }

    fn auth_header(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth_style {
            AuthStyle::ApiKeyHeader => req.header("x-api-key", &self.api_key),
            AuthStyle::BearerToken => req.header("Authorization", format!("Bearer {}", self.api_key)),
        }
        .header("anthropic-version", ANTHROPIC_VERSION)
    }

    fn build_body(&self, request: &CompletionRequest, stream: bool) -> serde_json::Value {
        let (system, messages) = split_system(&request.messages);
        let mut body = json!({
            "model": self.model,
            "max_tokens": request.max_tokens.unwrap_or(self.max_tokens),
            "messages": messages,
            "stream": stream,
        });
        if !system.is_empty() {
            body["system"] = json!(system);
        }
        if let Some(temperature) = request.temperature.or(self.temperature) {
            body["temperature"] = json!(temperature);
        }
        if let Some(tools) = &request.tools {
            if !tools.is_empty() {
                body["tools"] = json!(convert_tools(tools));
            }
        }
        body
    }
}

/// Anthropic keeps system content out of the `messages` array entirely,
/// so every leading `System` message is collected and joined; the rest
/// become the `messages` array converted to Anthropic's content-block
/// shape.
fn split_system(messages: &[Message]) -> (String, Vec<serde_json::Value>) {
    let mut system_parts = Vec::new();
    let mut out = Vec::new();
    for msg in messages {
        match msg.role {
            MessageRole::System => system_parts.push(msg.content.clone()),
            MessageRole::User => out.push(json!({ "role": "user", "content": msg.content })),
            MessageRole::Assistant => {
                if msg.tool_calls.is_empty() {
                    out.push(json!({ "role": "assistant", "content": msg.content }));
                } else {
                    let mut blocks = Vec::new();
                    if !msg.content.is_empty() {
                        blocks.push(json!({ "type": "text", "text": msg.content }));
                    }
                    for tc in &msg.tool_calls {
                        blocks.push(json!({
                            "type": "tool_use",
                            "id": tc.id,
                            "name": tc.tool,
                            "input": tc.args,
                        }));
                    }
                    out.push(json!({ "role": "assistant", "content": blocks }));
                }
            }
            MessageRole::Tool => {
                let call_id = msg.tool_call_id.clone().unwrap_or_default();
                out.push(json!({
                    "role": "user",
                    "content": [{
                        "type": "tool_result",
                        "tool_use_id": call_id,
                        "content": msg.content,
                    }],
                }));
            }
        }
    }
    (system_parts.join("\n\n"), out)
}

fn convert_tools(tools: &[Tool]) -> Vec<serde_json::Value> {
    tools
        .iter()
        .map(|t| {
            json!({
                "name": t.name,
                "description": t.description,
                "input_schema": t.input_schema,
            })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContentBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: serde_json::Value },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
    #[serde(default)]
    cache_creation_input_tokens: u32,
    #[serde(default)]
    cache_read_input_tokens: u32,
}

#[async_trait]
impl LLMProvider for AnthropicProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let body = self.build_body(&request, false);
        let response = self
            .auth_header(self.client.post(format!("{}/messages", self.base_url)))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Anthropic API error {}: {}", status, text));
        }

        let parsed: AnthropicResponse = response.json().await?;
        let mut content = String::new();
        let mut tool_calls = Vec::new();
        for block in parsed.content {
            match block {
                AnthropicContentBlock::Text { text } => content.push_str(&text),
                AnthropicContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(ToolCall { id, tool: name, args: input });
                }
                AnthropicContentBlock::Other => {}
            }
        }

        Ok(CompletionResponse {
            content,
            usage: Usage {
                prompt_tokens: parsed.usage.input_tokens,
                completion_tokens: parsed.usage.output_tokens,
                total_tokens: parsed.usage.input_tokens + parsed.usage.output_tokens,
                cache_creation_tokens: parsed.usage.cache_creation_input_tokens,
                cache_read_tokens: parsed.usage.cache_read_input_tokens,
            },
            model: self.model.clone(),
            tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
        })
    }

    async fn stream(&self, request: CompletionRequest) -> Result<CompletionStream> {
        let body = self.build_body(&request, true);
        let response = self
            .auth_header(self.client.post(format!("{}/messages", self.base_url)))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Anthropic API error {}: {}", status, text));
        }

        let mut byte_stream = response.bytes_stream();
        let (tx, rx) = mpsc::channel(100);

        tokio::spawn(async move {
            let mut buffer = String::new();
            let mut content = String::new();
            let mut current_tool: Option<(String, String, String)> = None; // (id, name, json args)
            let mut usage = Usage {
                prompt_tokens: 0,
                completion_tokens: 0,
                total_tokens: 0,
                cache_creation_tokens: 0,
                cache_read_tokens: 0,
            };

            while let Some(chunk) = byte_stream.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        error!("Anthropic stream error: {e}");
                        let _ = tx.send(Err(anyhow::anyhow!("stream error: {e}"))).await;
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim().to_string();
                    buffer.drain(..=line_end);
                    let Some(data) = line.strip_prefix("data: ") else { continue };
                    let Ok(event) = serde_json::from_str::<serde_json::Value>(data) else { continue };
                    let event_type = event["type"].as_str().unwrap_or("");

                    match event_type {
                        "content_block_start" => {
                            if event["content_block"]["type"] == "tool_use" {
                                current_tool = Some((
                                    event["content_block"]["id"].as_str().unwrap_or_default().to_string(),
                                    event["content_block"]["name"].as_str().unwrap_or_default().to_string(),
                                    String::new(),
                                ));
                            }
                        }
                        "content_block_delta" => {
                            if let Some(text) = event["delta"]["text"].as_str() {
                                content.push_str(text);
                                let _ = tx
                                    .send(Ok(CompletionChunk {
                                        content: text.to_string(),
                                        finished: false,
                                        tool_calls: None,
                                        usage: None,
                                        stop_reason: None,
                                        tool_call_streaming: None,
                                    }))
                                    .await;
                            }
                            if let Some(partial) = event["delta"]["partial_json"].as_str() {
                                if let Some((_, _, args)) = current_tool.as_mut() {
                                    args.push_str(partial);
                                }
                            }
                        }
                        "message_delta" => {
                            if let Some(out_tokens) = event["usage"]["output_tokens"].as_u64() {
                                usage.completion_tokens = out_tokens as u32;
                                usage.total_tokens = usage.prompt_tokens + usage.completion_tokens;
                            }
                        }
                        "message_start" => {
                            let message_usage = &event["message"]["usage"];
                            if let Some(in_tokens) = message_usage["input_tokens"].as_u64() {
                                usage.prompt_tokens = in_tokens as u32;
                            }
                            if let Some(creation) = message_usage["cache_creation_input_tokens"].as_u64() {
                                usage.cache_creation_tokens = creation as u32;
                            }
                            if let Some(read) = message_usage["cache_read_input_tokens"].as_u64() {
                                usage.cache_read_tokens = read as u32;
                            }
                        }
                        "message_stop" => {
                            let tool_calls = current_tool.take().map(|(id, name, args)| {
                                vec![ToolCall {
                                    id,
                                    tool: name,
                                    args: serde_json::from_str(&args).unwrap_or(serde_json::Value::Null),
                                }]
                            });
                            let _ = tx
                                .send(Ok(CompletionChunk {
                                    content: String::new(),
                                    finished: true,
                                    tool_calls,
                                    usage: Some(usage.clone()),
                                    stop_reason: None,
                                    tool_call_streaming: None,
                                }))
                                .await;
                            debug!("anthropic stream finished, {} chars accumulated", content.len());
                            return;
                        }
                        _ => {}
                    }
                }
            }
        });

        Ok(ReceiverStream::new(rx))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn has_native_tool_calling(&self) -> bool {
        true
    }

    fn supports_cache_control(&self) -> bool {
        true
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    fn temperature(&self) -> f32 {
        self.temperature.unwrap_or(1.0)
    }
}

/// Attach an Anthropic prompt-cache breakpoint to a message, used by the
/// agent loop when the provider advertises cache support.
pub fn with_cache_breakpoint(message: Message, cache: CacheControl) -> Message {
    Message::with_cache_control(message.role, message.content, cache)
}

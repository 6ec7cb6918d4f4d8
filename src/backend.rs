use anyhow::{anyhow, bail, Result};
use futures::stream::BoxStream;
use ollama_rs::generation::completion::request::GenerationRequest;
use ollama_rs::generation::completion::GenerationResponseStream;
use ollama_rs::models::ModelOptions;
use ollama_rs::Ollama;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

// Low-variance generation: favor speed and consistency over creative
// diversity when the model is enumerating search hits.
const STREAM_TEMPERATURE: f32 = 0.1;

const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com";

pub struct GeminiBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    web_search: bool,
}

pub struct OllamaBackend {
    url: String,
    model: String,
}

// The stream source behind a search. Either variant yields text chunks whose
// concatenation is expected to be newline-delimited JSON records; chunk
// boundaries carry no meaning.
pub enum Backend {
    Gemini(GeminiBackend),
    Ollama(OllamaBackend),
    #[cfg(test)]
    Scripted(Vec<String>),
}

impl Backend {
    pub fn gemini(
        base_url: String,
        api_key: String,
        model: String,
        web_search: bool,
    ) -> Result<Self> {
        let base_url = if base_url.is_empty() {
            DEFAULT_GEMINI_URL.to_string()
        } else {
            base_url
        };
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Backend::Gemini(GeminiBackend {
            client,
            base_url,
            api_key,
            model,
            web_search,
        }))
    }

    pub fn ollama(url: String, model: String) -> Self {
        Backend::Ollama(OllamaBackend { url, model })
    }

    pub fn describe(&self) -> String {
        match self {
            Backend::Gemini(b) => format!(
                "gemini ({}, web search {})",
                b.model,
                if b.web_search { "on" } else { "off" }
            ),
            Backend::Ollama(b) => format!("ollama ({} at {})", b.model, b.url),
            #[cfg(test)]
            Backend::Scripted(_) => "scripted".to_string(),
        }
    }

    pub async fn open(&self, system: &str, prompt: &str) -> Result<ChunkStream> {
        match self {
            Backend::Gemini(b) => b.open(system, prompt).await,
            Backend::Ollama(b) => b.open(system, prompt).await,
            #[cfg(test)]
            Backend::Scripted(chunks) => Ok(ChunkStream::Scripted(chunks.clone().into())),
        }
    }
}

impl GeminiBackend {
    async fn open(&self, system: &str, prompt: &str) -> Result<ChunkStream> {
        use futures::StreamExt;

        if self.api_key.trim().is_empty() {
            bail!("no Gemini API key configured (set GEMINI_API_KEY or --api-key)");
        }

        let mut body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "systemInstruction": { "parts": [{ "text": system }] },
            "generationConfig": { "temperature": STREAM_TEMPERATURE },
        });
        if self.web_search {
            body["tools"] = json!([{ "google_search": {} }]);
        }

        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", self.api_key.trim())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            bail!("Gemini returned {}: {}", status, body);
        }

        let bytes = response
            .bytes_stream()
            .map(|item| item.map(|b| b.to_vec()))
            .boxed();
        Ok(ChunkStream::Sse {
            buf: Vec::new(),
            bytes,
        })
    }
}

impl OllamaBackend {
    async fn open(&self, system: &str, prompt: &str) -> Result<ChunkStream> {
        let ollama = Ollama::try_new(self.url.clone())
            .map_err(|e| anyhow!("invalid Ollama URL {}: {}", self.url, e))?;
        // No separate system slot here; the instruction rides the prompt.
        let prompt = format!("{}\n\n{}", system, prompt);
        let request = GenerationRequest::new(self.model.clone(), prompt)
            .options(ModelOptions::default().temperature(STREAM_TEMPERATURE));
        let stream = ollama
            .generate_stream(request)
            .await
            .map_err(|e| anyhow!("Ollama request failed: {}", e))?;
        Ok(ChunkStream::Ollama(stream))
    }
}

// Server-sent event payload from Gemini; only the streamed text matters here.
#[derive(Debug, Default, Deserialize)]
struct SseEvent {
    #[serde(default)]
    candidates: Vec<SseCandidate>,
}

#[derive(Debug, Default, Deserialize)]
struct SseCandidate {
    #[serde(default)]
    content: SseContent,
}

#[derive(Debug, Default, Deserialize)]
struct SseContent {
    #[serde(default)]
    parts: Vec<SsePart>,
}

#[derive(Debug, Default, Deserialize)]
struct SsePart {
    #[serde(default)]
    text: String,
}

// One in-flight response stream, already stripped down to text chunks.
pub enum ChunkStream {
    Sse {
        // SSE lines are split at the byte level so a multi-byte character on
        // a chunk boundary can never corrupt the decode.
        buf: Vec<u8>,
        bytes: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    },
    Ollama(GenerationResponseStream),
    #[cfg(test)]
    Scripted(std::collections::VecDeque<String>),
}

impl ChunkStream {
    /// Next text chunk, or None once the stream is exhausted.
    pub async fn next_chunk(&mut self) -> Option<Result<String>> {
        use tokio_stream::StreamExt;

        match self {
            ChunkStream::Sse { buf, bytes } => loop {
                match bytes.next().await {
                    Some(Ok(data)) => {
                        buf.extend_from_slice(&data);
                        let mut out = String::new();
                        while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                            let line: Vec<u8> = buf.drain(..=pos).collect();
                            append_sse_text(&line, &mut out);
                        }
                        if !out.is_empty() {
                            return Some(Ok(out));
                        }
                        // Keep pulling: this network chunk held no complete
                        // data line yet.
                    }
                    Some(Err(e)) => return Some(Err(e.into())),
                    None => return None,
                }
            },
            ChunkStream::Ollama(stream) => match stream.next().await {
                Some(Ok(responses)) => {
                    let text: String = responses.into_iter().map(|r| r.response).collect();
                    Some(Ok(text))
                }
                Some(Err(_)) => Some(Err(anyhow!("Ollama stream broke mid-generation"))),
                None => None,
            },
            #[cfg(test)]
            ChunkStream::Scripted(chunks) => chunks.pop_front().map(Ok),
        }
    }
}

fn append_sse_text(line: &[u8], out: &mut String) {
    let line = String::from_utf8_lossy(line);
    let line = line.trim_end();
    let Some(data) = line.strip_prefix("data:") else {
        return;
    };
    let data = data.trim();
    if data.is_empty() {
        return;
    }
    // A data line that is not the expected shape is simply skipped; the
    // record layer has its own tolerance for gaps.
    if let Ok(event) = serde_json::from_str::<SseEvent>(data) {
        for candidate in event.candidates {
            for part in candidate.content.parts {
                out.push_str(&part.text);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sse_lines_split_across_network_chunks() {
        use futures::StreamExt;

        let frames: Vec<reqwest::Result<Vec<u8>>> = vec![
            Ok(b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"hel".to_vec()),
            Ok(b"lo\"}]}}]}\n\ndata: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\" world\"}]}}]}\n\n".to_vec()),
        ];
        let mut stream = ChunkStream::Sse {
            buf: Vec::new(),
            bytes: futures::stream::iter(frames).boxed(),
        };

        let mut text = String::new();
        while let Some(chunk) = stream.next_chunk().await {
            text.push_str(&chunk.unwrap());
        }
        // The first frame ends mid-line, so nothing is emitted until the
        // terminator arrives in the second frame.
        assert_eq!(text, "hello world");
    }

    #[tokio::test]
    async fn non_data_sse_lines_are_ignored() {
        use futures::StreamExt;

        let frames: Vec<reqwest::Result<Vec<u8>>> = vec![Ok(
            b": keepalive\nevent: ping\ndata: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"x\"}]}}]}\n".to_vec(),
        )];
        let mut stream = ChunkStream::Sse {
            buf: Vec::new(),
            bytes: futures::stream::iter(frames).boxed(),
        };
        assert_eq!(stream.next_chunk().await.unwrap().unwrap(), "x");
        assert!(stream.next_chunk().await.is_none());
    }
}

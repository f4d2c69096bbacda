use crate::error::{AppError, AppResult};
use crate::models::ChatMessage;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

pub const TEMPERATURE: f32 = 0.7;
pub const MAX_TOKENS: u32 = 2000;

/// Fixed directive prepended to every conversation
pub const SYSTEM_PROMPT: &str = "You are a Pyth Network expert and DeFi trading assistant. Your role is to:

1. Explain the functionality of Pyth Price Feeds and Pyth Entropy in clear, accessible terms.
2. Provide tips and strategies for builders creating dApps with Pyth data.
3. Analyze trading strategies and explain how real-time, high-fidelity data from Pyth can be used for DeFi protocols, on-chain games, and prediction markets.
4. Suggest ways to combine Price Feeds and Entropy for novel applications (e.g., randomized NFT traits based on market conditions, fair lottery systems tied to asset volatility, dynamic game mechanics that respond to real-world market data).
5. Be enthusiastic and encouraging to builders, offering specific technical guidance when appropriate.

Keep your responses concise, practical, and focused on actionable insights for developers.";

pub const WELCOME_MESSAGE: &str = "Welcome to the Pyth oracle dashboard assistant!

I can help you with:

- **Pyth Price Feeds**: real-time oracle data for 400+ assets
- **Pyth Entropy**: verifiable on-chain randomness
- **Build ideas**: use cases combining both
- **Technical implementation**: best practices and integration guidance

What would you like to know about building with Pyth?";

const PRICE_FEED_REPLY: &str = "Pyth Price Feeds are pull-based oracles that provide high-fidelity, real-time financial market data. Unlike traditional push oracles, Pyth uses a Pull model where:

1. **Fetch**: You retrieve price update data from Hermes (Pyth's data service)
2. **Update**: You submit this data to the on-chain Pyth contract, paying the update fee
3. **Consume**: Your smart contract reads the fresh price data

This gives you control over data freshness and keeps gas costs down. Popular use cases include:
- Decentralized perpetual futures
- Lending protocols with accurate collateral pricing
- Options and derivatives platforms
- Dynamic NFT pricing based on real-world assets

What specific use case are you building?";

const RANDOMNESS_REPLY: &str = "Pyth Entropy generates verifiable random numbers on-chain. Here's how it works:

1. **Request**: Your contract requests a random number with a user commitment and pays the provider fee
2. **Generate**: The provider combines your commitment with its own secret
3. **Reveal**: The final random number is computed on-chain and can be verified

Applications for Entropy:
- **Fair lotteries**: provably random winner selection
- **Gaming**: unpredictable loot drops, enemy spawns, or map generation
- **NFTs**: randomized traits at mint time
- **Prediction markets**: random sampling for resolution

Tip: combine Price Feeds and Entropy, e.g. higher volatility means rarer drops in a game.";

const COMBINATION_REPLY: &str = "Ways to combine Pyth Price Feeds and Entropy:

**Volatility-based game mechanics**
- Use price volatility to adjust loot drop rates
- Higher market volatility gives better rewards

**Dynamic NFT collections**
- Generate traits from the BTC/ETH price at mint time
- Randomize trait rarity with Entropy, weighted by market conditions

**Fair prediction markets**
- Use Entropy for random sampling of data points
- Price Feeds provide the market data for settlement

**DeFi**
- Random yield boosts tied to market performance
- Lottery-style savings with odds based on TVL

The key is letting real-world data shape on-chain randomness in meaningful ways.";

const FALLBACK_REPLY: &str = "Pyth Network offers two primitives for your dApp:

**Pyth Price Feeds** provide real-time financial data for 400+ assets across crypto, equities, FX, and commodities.

**Pyth Entropy** generates secure random numbers on-chain for gaming, NFTs, lotteries, and anything needing verifiable randomness.

Ask me about:
- How the pull oracle workflow works
- Creative use cases for Entropy
- Ways to combine Price Feeds and randomness
- Best practices for your application

What are you building?";

/// Offline keyword-matched reply used when no API key is configured
pub fn demo_reply(user_text: &str) -> &'static str {
    let lower = user_text.to_lowercase();

    if lower.contains("price feed") || lower.contains("oracle") {
        PRICE_FEED_REPLY
    } else if lower.contains("entropy") || lower.contains("random") {
        RANDOMNESS_REPLY
    } else if lower.contains("combine") || lower.contains("innovative") {
        COMBINATION_REPLY
    } else {
        FALLBACK_REPLY
    }
}

/// Chat-completion backend
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send `transcript` behind the system directive and return the assistant text
    async fn converse(&self, transcript: &[ChatMessage], api_key: &str) -> AppResult<String>;
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: ChatMessage,
}

/// Extract the first choice's text from a completion response body
pub fn parse_completion(body: &str) -> AppResult<String> {
    let response: CompletionResponse = serde_json::from_str(body)
        .map_err(|e| AppError::UpstreamUnavailable(format!("malformed chat response: {}", e)))?;

    response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .ok_or(AppError::EmptyCompletion)
}

/// OpenAI-compatible chat-completion client
pub struct ChatClient {
    client: Client,
    api_url: String,
    model: String,
    timeout: Duration,
}

impl ChatClient {
    pub fn new(api_url: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_url,
            model,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn build_request(&self, transcript: &[ChatMessage]) -> CompletionRequest<'_> {
        let mut messages = Vec::with_capacity(transcript.len() + 1);
        messages.push(ChatMessage::system(SYSTEM_PROMPT));
        messages.extend_from_slice(transcript);

        CompletionRequest {
            model: &self.model,
            messages,
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        }
    }
}

#[async_trait]
impl ChatBackend for ChatClient {
    async fn converse(&self, transcript: &[ChatMessage], api_key: &str) -> AppResult<String> {
        let request = self.build_request(transcript);
        debug!("Sending {} message(s) to {}", request.messages.len(), self.model);

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(api_key)
            .json(&request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("chat request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::UpstreamUnavailable(format!(
                "chat endpoint returned {}",
                status
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("chat read failed: {}", e)))?;

        let reply = parse_completion(&body)?;
        info!("Chat completion received ({} chars)", reply.len());
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChatRole;

    #[test]
    fn test_demo_reply_categories() {
        assert!(demo_reply("tell me about price feeds").contains("Pull"));
        assert!(demo_reply("How does the ORACLE work?").contains("Pull"));
        assert_eq!(demo_reply("random numbers?"), RANDOMNESS_REPLY);
        assert_eq!(demo_reply("Explain Entropy"), RANDOMNESS_REPLY);
        assert_eq!(demo_reply("something innovative"), COMBINATION_REPLY);
        assert_eq!(demo_reply("hello"), FALLBACK_REPLY);
    }

    #[test]
    fn test_request_prepends_system_prompt() {
        let client = ChatClient::new("http://localhost".to_string(), "test-model".to_string());
        let transcript = vec![ChatMessage::assistant("hi"), ChatMessage::user("what is pyth?")];

        let request = client.build_request(&transcript);
        assert_eq!(request.messages.len(), 3);
        assert_eq!(request.messages[0].role, ChatRole::System);
        assert_eq!(request.messages[2].content, "what is pyth?");

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "test-model");
        assert_eq!(json["max_tokens"], 2000);
        assert!((json["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_parse_completion() {
        let body = r#"{"id": "x", "choices": [{"message": {"role": "assistant", "content": "Pull it."}, "finish_reason": "stop"}]}"#;
        assert_eq!(parse_completion(body).unwrap(), "Pull it.");

        assert!(matches!(
            parse_completion(r#"{"choices": []}"#),
            Err(AppError::EmptyCompletion)
        ));
        assert!(matches!(
            parse_completion(r#"{"id": "x"}"#),
            Err(AppError::EmptyCompletion)
        ));
    }
}

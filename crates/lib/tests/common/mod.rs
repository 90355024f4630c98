//! Test doubles shared by the gateway integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use relay::channels::{ChannelError, ChannelSender, ConversationReference, OutboundActivity};
use relay::gateway::{self, GatewayState};
use relay::llm::{Responder, ResponderOutcome};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const ERROR_REPLY: &str = "Error querying the model.";

/// Echoes the utterance after an optional delay and counts calls.
#[derive(Default)]
pub struct EchoResponder {
    pub delay: Duration,
    pub calls: AtomicUsize,
}

impl EchoResponder {
    pub fn delayed(delay: Duration) -> Self {
        Self {
            delay,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Responder for EchoResponder {
    async fn respond(&self, utterance: &str) -> ResponderOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        ResponderOutcome::Success {
            text: format!("echo: {}", utterance),
        }
    }
}

#[derive(Default)]
pub struct RecordingChannel {
    pub sent: Mutex<Vec<(ConversationReference, OutboundActivity)>>,
}

impl RecordingChannel {
    pub fn texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, a)| a.text.clone())
            .collect()
    }
}

#[async_trait]
impl ChannelSender for RecordingChannel {
    async fn send_activity(
        &self,
        reference: &ConversationReference,
        activity: &OutboundActivity,
    ) -> Result<(), ChannelError> {
        self.sent
            .lock()
            .unwrap()
            .push((reference.clone(), activity.clone()));
        Ok(())
    }
}

pub fn message_body(conversation_id: &str, text: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "message",
        "id": format!("act-{}", conversation_id),
        "text": text,
        "channelId": "emulator",
        "serviceUrl": "http://localhost:50000",
        "conversation": { "id": conversation_id },
        "from": { "id": "user-1" },
        "recipient": { "id": "bot-1" }
    })
}

/// Serve `state` on a free loopback port; returns the base URL. The server task outlives the test body.
pub async fn spawn_gateway(state: GatewayState) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind free port");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, gateway::router(state)).await;
    });
    format!("http://{}", addr)
}

//! One webhook call: verify, parse, ask the responder, deliver exactly one reply.

use axum::http::{HeaderMap, StatusCode};

use crate::channels::{InboundActivity, OutboundActivity};
use crate::gateway::GatewayState;
use crate::llm::ResponderOutcome;

/// What a message turn ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnReport {
    /// Reply delivered to the channel.
    Delivered,
    /// Reply built but the channel refused or was unreachable.
    DeliveryFailed,
}

/// Map a responder outcome to the user-visible reply. Failure detail is logged, never sent.
pub fn reply_for(outcome: ResponderOutcome, error_reply: &str) -> OutboundActivity {
    match outcome {
        ResponderOutcome::Success { text } => OutboundActivity::message(text),
        ResponderOutcome::Failure { kind, detail } => {
            log::warn!("responder failed ({:?}): {}", kind, detail);
            OutboundActivity::message(error_reply)
        }
    }
}

/// Handle one webhook request body.
///
/// 401 when verification fails and 400 for a malformed activity; neither reaches the responder.
/// Everything else is 200: responder failures are reported inside the chat reply so the
/// framework never retries the webhook and duplicates the message.
///
/// Each message gets exactly one send attempt, even when the responder fails or panics. A send
/// that errors or panics is logged as a delivery failure and is not retried.
pub async fn handle(state: &GatewayState, headers: &HeaderMap, body: &[u8]) -> StatusCode {
    if let Err(e) = state.verifier.verify(headers).await {
        log::warn!("webhook: rejected request: {}", e);
        return StatusCode::UNAUTHORIZED;
    }
    let activity = match InboundActivity::from_slice(body) {
        Ok(a) => a,
        Err(e) => {
            log::debug!("webhook: {}", e);
            return StatusCode::BAD_REQUEST;
        }
    };
    if !activity.is_message() {
        log::debug!(
            "webhook: acknowledging {:?} activity on {}",
            activity.activity_type,
            activity.channel_id()
        );
        return StatusCode::OK;
    }

    // Runs to completion even if the caller drops this request.
    let turn = tokio::spawn(run_turn(state.clone(), activity));
    match turn.await {
        Ok(TurnReport::Delivered) => log::debug!("webhook: turn delivered"),
        Ok(TurnReport::DeliveryFailed) => log::debug!("webhook: turn finished without delivery"),
        Err(e) => log::error!("webhook: turn task failed, reply not delivered: {}", e),
    }
    StatusCode::OK
}

/// Ask the responder and send its reply. Exactly one send per call.
pub async fn run_turn(state: GatewayState, activity: InboundActivity) -> TurnReport {
    let responder = state.responder.clone();
    let utterance = activity.text.clone();
    let reply = match tokio::spawn(async move { responder.respond(&utterance).await }).await {
        Ok(outcome) => reply_for(outcome, &state.error_reply),
        Err(e) => {
            log::error!("responder task failed: {}", e);
            OutboundActivity::message(state.error_reply.as_ref())
        }
    };

    match state
        .channel
        .send_activity(&activity.reference, &reply)
        .await
    {
        Ok(()) => {
            log::debug!(
                "turn: replied on {} conversation {}",
                activity.channel_id(),
                activity.reference.conversation_id
            );
            TurnReport::Delivered
        }
        Err(e) => {
            log::warn!(
                "turn: send to {} conversation {} failed: {}",
                activity.channel_id(),
                activity.reference.conversation_id,
                e
            );
            TurnReport::DeliveryFailed
        }
    }
}

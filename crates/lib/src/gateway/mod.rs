//! Gateway: HTTP webhook endpoint for chat activities.
//!
//! Each message activity is answered by exactly one reply sent through the channel; the webhook
//! itself is acknowledged with 200 unless the request was unauthenticated or malformed.

mod server;
mod turn;

pub use server::{router, run_gateway, GatewayState, MESSAGES_PATH};
pub use turn::{handle, reply_for, run_turn, TurnReport};

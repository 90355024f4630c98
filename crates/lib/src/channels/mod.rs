//! Chat channel plumbing: activity model, inbound verification and reply delivery.
//!
//! The gateway parses an [`InboundActivity`] from each webhook call and answers it with at most one
//! [`OutboundActivity`], delivered through a [`ChannelSender`].

mod activity;
mod auth;
mod connector;

pub use activity::{
    ActivityType, ChannelAccount, ConversationReference, InboundActivity, MalformedActivity,
    OutboundActivity, MESSAGE_TYPE,
};
pub use auth::{verifier_for, AuthError, BearerVerifier, NoVerification, RequestVerifier};
pub use connector::{activities_url, ChannelError, ChannelSender, ConnectorClient};

// src/core/handler/actions/pubsub.rs

use crate::connection::{ConnectionHandle, ReplyQueue, SessionState};
use crate::core::handler::command_router::RouteResponse;
use crate::core::pubsub::Broker;
use crate::core::{RespGateError, RespValue};
use bytes::Bytes;

pub fn handle_publish(
    broker: &Broker,
    channel: Bytes,
    message: Bytes,
) -> Result<RouteResponse, RespGateError> {
    let receivers = broker.publish(&channel, message);
    Ok(RouteResponse::Single(RespValue::Integer(receivers as i64)))
}

/// Each confirmation waits for room in the connection's own queue before the
/// broker registers the channel and fills it, so nothing is returned here.
pub async fn handle_subscribe(
    channels: Vec<Bytes>,
    session: &mut SessionState,
    broker: &Broker,
    conn: &ConnectionHandle,
    replies: &mut ReplyQueue,
) -> Result<RouteResponse, RespGateError> {
    for name in channels {
        let ack = replies.reserve().await?;
        session.update_subscriptions(broker.subscribe(conn, name, ack));
    }
    Ok(RouteResponse::NoOp)
}

pub async fn handle_psubscribe(
    patterns: Vec<Bytes>,
    session: &mut SessionState,
    broker: &Broker,
    conn: &ConnectionHandle,
    replies: &mut ReplyQueue,
) -> Result<RouteResponse, RespGateError> {
    for pattern in patterns {
        let ack = replies.reserve().await?;
        session.update_subscriptions(broker.psubscribe(conn, pattern, ack));
    }
    Ok(RouteResponse::NoOp)
}

/// Without arguments every channel subscription is dropped. A name the
/// connection was not subscribed to is still acknowledged.
pub fn handle_unsubscribe(
    channels: Vec<Bytes>,
    session: &mut SessionState,
    broker: &Broker,
    conn: &ConnectionHandle,
) -> Result<RouteResponse, RespGateError> {
    let id = conn.id();
    let to_process = if channels.is_empty() {
        broker.channels_of(id)
    } else {
        channels
    };

    let responses = if to_process.is_empty() {
        vec![RespValue::subscription_ack(
            "unsubscribe",
            None,
            broker.subscription_count(id),
        )]
    } else {
        to_process
            .into_iter()
            .map(|name| {
                let remaining = broker
                    .unsubscribe(id, &name)
                    .unwrap_or_else(|| broker.subscription_count(id));
                RespValue::subscription_ack("unsubscribe", Some(name), remaining)
            })
            .collect()
    };

    session.update_subscriptions(broker.subscription_count(id));
    Ok(RouteResponse::Multiple(responses))
}

pub fn handle_punsubscribe(
    patterns: Vec<Bytes>,
    session: &mut SessionState,
    broker: &Broker,
    conn: &ConnectionHandle,
) -> Result<RouteResponse, RespGateError> {
    let id = conn.id();
    let to_process = if patterns.is_empty() {
        broker.patterns_of(id)
    } else {
        patterns
    };

    let responses = if to_process.is_empty() {
        vec![RespValue::subscription_ack(
            "punsubscribe",
            None,
            broker.subscription_count(id),
        )]
    } else {
        to_process
            .into_iter()
            .map(|pattern| {
                let remaining = broker
                    .punsubscribe(id, &pattern)
                    .unwrap_or_else(|| broker.subscription_count(id));
                RespValue::subscription_ack("punsubscribe", Some(pattern), remaining)
            })
            .collect()
    };

    session.update_subscriptions(broker.subscription_count(id));
    Ok(RouteResponse::Multiple(responses))
}

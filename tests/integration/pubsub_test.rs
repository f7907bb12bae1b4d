// tests/integration/pubsub_test.rs

//! Integration tests for publish/subscribe over real connections.

use super::test_helpers::{
    TestServer, ack, bulk, error, message, pmessage, simple, test_config, wait_until,
};
use respgate::core::protocol::RespFrame;
use std::time::Duration;

#[tokio::test]
async fn test_subscribe_confirms_each_channel_in_order() {
    let server = TestServer::start().await;
    let mut sub = server.connect().await;

    sub.send(&["SUBSCRIBE", "a", "b", "a"]).await;
    assert_eq!(sub.read().await, ack("subscribe", Some("a"), 1));
    assert_eq!(sub.read().await, ack("subscribe", Some("b"), 2));
    // Re-subscribing is idempotent but still confirmed.
    assert_eq!(sub.read().await, ack("subscribe", Some("a"), 2));

    sub.send(&["PSUBSCRIBE", "news.*"]).await;
    assert_eq!(sub.read().await, ack("psubscribe", Some("news.*"), 3));

    server.stop().await;
}

#[tokio::test]
async fn test_publish_delivers_to_every_subscriber_once() {
    let server = TestServer::start().await;
    let mut sub1 = server.connect().await;
    let mut sub2 = server.connect().await;
    let mut publisher = server.connect().await;

    sub1.command(&["SUBSCRIBE", "chat"]).await;
    sub2.command(&["SUBSCRIBE", "chat"]).await;

    assert_eq!(
        publisher.command(&["PUBLISH", "chat", "hello"]).await,
        RespFrame::Integer(2)
    );
    assert_eq!(sub1.read().await, message("chat", "hello"));
    assert_eq!(sub2.read().await, message("chat", "hello"));
    sub1.expect_silence(Duration::from_millis(100)).await;

    server.stop().await;
}

#[tokio::test]
async fn test_publish_without_subscribers_returns_zero() {
    let server = TestServer::start().await;
    let mut publisher = server.connect().await;

    assert_eq!(
        publisher.command(&["PUBLISH", "void", "anyone?"]).await,
        RespFrame::Integer(0)
    );

    server.stop().await;
}

#[tokio::test]
async fn test_pattern_matching_and_exact_channels() {
    let server = TestServer::start().await;
    let mut pattern_sub = server.connect().await;
    let mut exact_sub = server.connect().await;
    let mut publisher = server.connect().await;

    pattern_sub.command(&["PSUBSCRIBE", "news.*"]).await;
    exact_sub.command(&["SUBSCRIBE", "news.sports"]).await;

    assert_eq!(
        publisher.command(&["PUBLISH", "news.sports", "goal"]).await,
        RespFrame::Integer(2)
    );
    assert_eq!(pattern_sub.read().await, pmessage("news.*", "news.sports", "goal"));
    assert_eq!(exact_sub.read().await, message("news.sports", "goal"));

    // Only the pattern matches news.football.
    assert_eq!(
        publisher.command(&["PUBLISH", "news.football", "offside"]).await,
        RespFrame::Integer(1)
    );
    assert_eq!(
        pattern_sub.read().await,
        pmessage("news.*", "news.football", "offside")
    );
    exact_sub.expect_silence(Duration::from_millis(100)).await;

    // "newsletter" has no dot after "news".
    assert_eq!(
        publisher.command(&["PUBLISH", "newsletter", "weekly"]).await,
        RespFrame::Integer(0)
    );
    pattern_sub.expect_silence(Duration::from_millis(100)).await;

    server.stop().await;
}

#[tokio::test]
async fn test_connection_matching_many_ways_receives_one_copy() {
    let server = TestServer::start().await;
    let mut sub = server.connect().await;
    let mut pattern_only = server.connect().await;
    let mut publisher = server.connect().await;

    sub.send(&["SUBSCRIBE", "news.sports"]).await;
    sub.read().await;
    sub.send(&["PSUBSCRIBE", "news.*", "*"]).await;
    sub.read().await;
    sub.read().await;

    pattern_only.send(&["PSUBSCRIBE", "n*", "news.*"]).await;
    pattern_only.read().await;
    pattern_only.read().await;

    assert_eq!(
        publisher.command(&["PUBLISH", "news.sports", "x"]).await,
        RespFrame::Integer(2)
    );
    // A direct subscription wins over patterns.
    assert_eq!(sub.read().await, message("news.sports", "x"));
    // Otherwise the first matching pattern in byte order is reported.
    assert_eq!(
        pattern_only.read().await,
        pmessage("n*", "news.sports", "x")
    );
    sub.expect_silence(Duration::from_millis(100)).await;
    pattern_only.expect_silence(Duration::from_millis(100)).await;

    server.stop().await;
}

#[tokio::test]
async fn test_subscriber_mode_allows_only_pubsub_commands() {
    let server = TestServer::start().await;
    let mut client = server.connect().await;

    assert_eq!(client.command(&["GET", "k"]).await, RespFrame::Null);
    assert_eq!(
        client.command(&["SUBSCRIBE", "events"]).await,
        ack("subscribe", Some("events"), 1)
    );

    assert_eq!(
        client.command(&["SET", "k", "v"]).await,
        error(
            "ERR Can't execute 'set': only (P)SUBSCRIBE / (P)UNSUBSCRIBE / PING / QUIT are allowed in this context"
        )
    );
    assert_eq!(
        client.command(&["publish", "events", "self"]).await,
        error(
            "ERR Can't execute 'publish': only (P)SUBSCRIBE / (P)UNSUBSCRIBE / PING / QUIT are allowed in this context"
        )
    );
    assert_eq!(
        client.command(&["PING"]).await,
        RespFrame::Array(vec![bulk("pong"), bulk("")])
    );

    // Leaving the last subscription returns the connection to normal mode.
    assert_eq!(
        client.command(&["UNSUBSCRIBE"]).await,
        ack("unsubscribe", Some("events"), 0)
    );
    assert_eq!(client.command(&["SET", "k", "v"]).await, simple("OK"));
    assert_eq!(client.command(&["PING"]).await, simple("PONG"));

    server.stop().await;
}

#[tokio::test]
async fn test_publisher_and_subscriber_on_same_connection() {
    let server = TestServer::start().await;
    let mut client = server.connect().await;
    let mut other = server.connect().await;

    // Publishing is a normal-mode command...
    assert_eq!(
        client.command(&["PUBLISH", "loop", "before"]).await,
        RespFrame::Integer(0)
    );
    client.command(&["SUBSCRIBE", "loop"]).await;

    // ...so once subscribed the connection keeps reading but only receives.
    assert_eq!(
        client.command(&["PUBLISH", "loop", "mine"]).await,
        error(
            "ERR Can't execute 'publish': only (P)SUBSCRIBE / (P)UNSUBSCRIBE / PING / QUIT are allowed in this context"
        )
    );
    assert_eq!(
        other.command(&["PUBLISH", "loop", "theirs"]).await,
        RespFrame::Integer(1)
    );
    assert_eq!(client.read().await, message("loop", "theirs"));

    // Replies and pushes share one stream.
    assert_eq!(
        client.command(&["PING"]).await,
        RespFrame::Array(vec![bulk("pong"), bulk("")])
    );
    assert_eq!(
        other.command(&["PUBLISH", "loop", "after-ping"]).await,
        RespFrame::Integer(1)
    );
    assert_eq!(client.read().await, message("loop", "after-ping"));

    server.stop().await;
}

#[tokio::test]
async fn test_unsubscribe_variants() {
    let server = TestServer::start().await;
    let mut client = server.connect().await;

    // Nothing to leave yet.
    assert_eq!(
        client.command(&["UNSUBSCRIBE"]).await,
        ack("unsubscribe", None, 0)
    );
    assert_eq!(
        client.command(&["PUNSUBSCRIBE"]).await,
        ack("punsubscribe", None, 0)
    );

    client.send(&["SUBSCRIBE", "a", "b"]).await;
    client.read().await;
    client.read().await;
    client.command(&["PSUBSCRIBE", "p.*"]).await;

    assert_eq!(
        client.command(&["UNSUBSCRIBE", "b", "missing"]).await,
        ack("unsubscribe", Some("b"), 2)
    );
    assert_eq!(client.read().await, ack("unsubscribe", Some("missing"), 2));

    client.send(&["UNSUBSCRIBE"]).await;
    assert_eq!(client.read().await, ack("unsubscribe", Some("a"), 1));

    assert_eq!(
        client.command(&["PUNSUBSCRIBE", "p.*"]).await,
        ack("punsubscribe", Some("p.*"), 0)
    );
    server.wait_for_empty_broker().await;

    server.stop().await;
}

#[tokio::test]
async fn test_closed_subscriber_leaves_no_ghost_subscription() {
    let server = TestServer::start().await;
    let mut publisher = server.connect().await;

    {
        let mut sub = server.connect().await;
        sub.command(&["SUBSCRIBE", "c"]).await;
        sub.command(&["PSUBSCRIBE", "c*"]).await;
        assert_eq!(
            publisher.command(&["PUBLISH", "c", "m"]).await,
            RespFrame::Integer(1)
        );
        // Dropped without QUIT.
    }

    server.wait_for_empty_broker().await;
    assert_eq!(
        publisher.command(&["PUBLISH", "c", "m"]).await,
        RespFrame::Integer(0)
    );

    server.stop().await;
}

#[tokio::test]
async fn test_quit_from_subscriber_mode_cleans_up() {
    let server = TestServer::start().await;
    let mut sub = server.connect().await;

    sub.command(&["SUBSCRIBE", "x", "y"]).await;
    sub.read().await;
    assert_eq!(server.state.broker.channel_count(), 2);

    assert_eq!(sub.command(&["QUIT"]).await, simple("OK"));
    assert!(sub.is_closed().await);
    server.wait_for_empty_broker().await;

    server.stop().await;
}

#[tokio::test]
async fn test_many_subscribers_closing_concurrently() {
    let server = TestServer::start().await;
    let mut subs = Vec::new();
    for i in 0..20 {
        let mut sub = server.connect().await;
        let channel = format!("room-{}", i % 4);
        sub.command(&["SUBSCRIBE", &channel, "lobby"]).await;
        sub.read().await;
        subs.push(sub);
    }
    wait_until(|| server.state.broker.subscribed_connection_count() == 20).await;

    let mut publisher = server.connect().await;
    assert_eq!(
        publisher.command(&["PUBLISH", "lobby", "hi"]).await,
        RespFrame::Integer(20)
    );

    drop(subs);
    server.wait_for_empty_broker().await;
    assert_eq!(
        publisher.command(&["PUBLISH", "lobby", "hi"]).await,
        RespFrame::Integer(0)
    );

    server.stop().await;
}

#[tokio::test]
async fn test_subscribe_with_more_channels_than_queue_capacity() {
    let mut config = test_config();
    config.outbound_queue_capacity = 4;
    let server = TestServer::with_config(config).await;
    let mut sub = server.connect().await;

    let channels: Vec<String> = (0..50).map(|i| format!("ch-{i}")).collect();
    let mut parts = vec!["SUBSCRIBE"];
    parts.extend(channels.iter().map(String::as_str));
    sub.send(&parts).await;
    for (i, channel) in channels.iter().enumerate() {
        assert_eq!(
            sub.read().await,
            ack("subscribe", Some(channel.as_str()), i as i64 + 1)
        );
    }

    let patterns: Vec<String> = (0..50).map(|i| format!("p-{i}.*")).collect();
    let mut parts = vec!["PSUBSCRIBE"];
    parts.extend(patterns.iter().map(String::as_str));
    sub.send(&parts).await;
    for (i, pattern) in patterns.iter().enumerate() {
        assert_eq!(
            sub.read().await,
            ack("psubscribe", Some(pattern.as_str()), i as i64 + 51)
        );
    }

    // Still connected and still receiving.
    let mut publisher = server.connect().await;
    assert_eq!(
        publisher.command(&["PUBLISH", "ch-49", "hi"]).await,
        RespFrame::Integer(1)
    );
    assert_eq!(sub.read().await, message("ch-49", "hi"));

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_subscribe_larger_than_default_queue() {
    let server = TestServer::start().await;
    let mut sub = server.connect().await;

    let channels: Vec<String> = (0..5000).map(|i| format!("topic.{i}")).collect();
    let mut parts = vec!["SUBSCRIBE"];
    parts.extend(channels.iter().map(String::as_str));
    sub.send(&parts).await;
    for (i, channel) in channels.iter().enumerate() {
        assert_eq!(
            sub.read().await,
            ack("subscribe", Some(channel.as_str()), i as i64 + 1)
        );
    }
    assert_eq!(server.state.broker.channel_count(), 5000);

    server.stop().await;
}

#[tokio::test]
async fn test_subscribe_after_pipelined_commands() {
    let mut config = test_config();
    config.outbound_queue_capacity = 4;
    let server = TestServer::with_config(config).await;
    let mut client = server.connect().await;

    // Everything goes out in one write before any reply is read.
    let mut pipeline = Vec::new();
    for _ in 0..20 {
        pipeline.extend_from_slice(b"*1\r\n$4\r\nPING\r\n");
    }
    pipeline.extend_from_slice(
        b"*4\r\n$9\r\nSUBSCRIBE\r\n$1\r\na\r\n$1\r\nb\r\n$1\r\nc\r\n",
    );
    client.send_raw(&pipeline).await;

    for _ in 0..20 {
        assert_eq!(client.read().await, simple("PONG"));
    }
    assert_eq!(client.read().await, ack("subscribe", Some("a"), 1));
    assert_eq!(client.read().await, ack("subscribe", Some("b"), 2));
    assert_eq!(client.read().await, ack("subscribe", Some("c"), 3));

    assert_eq!(
        client.command(&["PING"]).await,
        RespFrame::Array(vec![bulk("pong"), bulk("")])
    );

    server.stop().await;
}

// tests/property/store_consistency_test.rs

//! Property-based tests for store forwarding through a live gateway.

use crate::test_helpers::{TestServer, simple};
use bytes::Bytes;
use proptest::prelude::*;
use respgate::core::protocol::RespFrame;
use std::collections::HashMap;

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 24,
        max_shrink_iters: 200,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_last_write_wins_per_key(
        writes in prop::collection::vec(
            ("[a-c]{1,2}", prop::collection::vec(any::<u8>(), 0..128)),
            1..32
        )
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let server = TestServer::start().await;
            let mut client = server.connect().await;
            let mut expected: HashMap<String, Vec<u8>> = HashMap::new();

            for (key, value) in &writes {
                let frame = RespFrame::command([
                    Bytes::from_static(b"SET"),
                    Bytes::copy_from_slice(key.as_bytes()),
                    Bytes::copy_from_slice(value),
                ]);
                client.send_frame(frame).await;
                assert_eq!(client.read().await, simple("OK"));
                expected.insert(key.clone(), value.clone());
            }

            for (key, value) in &expected {
                assert_eq!(
                    client.command(&["GET", key.as_str()]).await,
                    RespFrame::BulkString(Bytes::copy_from_slice(value))
                );
            }
            assert_eq!(client.command(&["GET", "zzz"]).await, RespFrame::Null);

            server.stop().await;
        });
    }
}

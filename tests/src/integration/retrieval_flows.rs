//! Full-pipeline scenarios: fixture service, range service, source
//! fall-through, fail-fast validation, and verification rejections.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use shared_types::{NodeConfig, RetrievalUpstream};
    use st_04_fetchers::{Fetcher, PeerTierFetcher};
    use st_05_gateway::build_router;
    use tower::ServiceExt;

    use crate::support::{car_bytes, raw_block, test_node, StubSource};

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn fixture_served_byte_exact_with_version_header() {
        let node = test_node(NodeConfig::for_tests(), Vec::new());
        let expected = node.state.fixture.car().clone();
        let fixture_id = node.state.fixture.id().canonical().to_string();
        let router = build_router(node.state);

        let response = router
            .oneshot(get(&format!("/ipfs/{fixture_id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("stratus-node-version"));
        assert_eq!(response.headers()["accept-ranges"], "bytes");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, expected);
    }

    #[tokio::test]
    async fn fixture_range_served_as_partial_content() {
        let node = test_node(NodeConfig::for_tests(), Vec::new());
        let expected = node.state.fixture.car().slice(10..=20);
        let total = node.state.fixture.car().len();
        let fixture_id = node.state.fixture.id().canonical().to_string();
        let router = build_router(node.state);

        let request = Request::builder()
            .uri(format!("/ipfs/{fixture_id}"))
            .header("range", "bytes=10-20")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            response.headers()["content-range"],
            format!("bytes 10-20/{total}")
        );
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, expected);
    }

    #[tokio::test]
    async fn invalid_identifier_rejected_without_touching_sources() {
        let (cid, payload) = raw_block(b"unreached");
        let stub = StubSource::new(
            RetrievalUpstream::PublicGateway,
            car_bytes(&[cid], &[(cid, &payload)]),
        );
        let node = test_node(
            NodeConfig::for_tests(),
            vec![Arc::clone(&stub) as Arc<dyn Fetcher>],
        );
        let router = build_router(node.state);

        let response = router.oneshot(get("/ipfs/not-a-cid")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn peer_timeout_falls_through_to_next_source() {
        let (cid, payload) = raw_block(b"served after the peer window");
        let stub = StubSource::new(
            RetrievalUpstream::RetrievalService,
            car_bytes(&[cid], &[(cid, &payload)]),
        );
        let config = NodeConfig::for_tests();
        let window = config.solicitation_timeout;

        let node = test_node(config, Vec::new());
        let sources: Vec<Arc<dyn Fetcher>> = vec![
            Arc::new(PeerTierFetcher::new(Arc::clone(&node.peers))),
            Arc::clone(&stub) as Arc<dyn Fetcher>,
        ];
        let state = st_05_gateway::AppState {
            sources: Arc::new(sources),
            ..node.state
        };
        let router = build_router(state);

        let started = Instant::now();
        let response = router
            .oneshot(get(&format!("/ipfs/{cid}?format=car")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        // the unanswered solicitation waited out exactly one window first
        assert!(started.elapsed() >= window);
        assert!(started.elapsed() < window + Duration::from_millis(100));
        assert_eq!(stub.calls(), 1);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body.as_ref(), car_bytes(&[cid], &[(cid, &payload)]));
    }

    #[tokio::test]
    async fn two_root_archive_is_rejected_and_nothing_cached() {
        let (cid_a, payload_a) = raw_block(b"first root");
        let (cid_b, _) = raw_block(b"second root");
        let stub = StubSource::new(
            RetrievalUpstream::RetrievalService,
            car_bytes(&[cid_a, cid_b], &[(cid_a, &payload_a)]),
        );
        let node = test_node(
            NodeConfig::for_tests(),
            vec![Arc::clone(&stub) as Arc<dyn Fetcher>],
        );
        let cache = Arc::clone(&node.cache);
        let router = build_router(node.state);

        let response = router
            .oneshot(get(&format!("/ipfs/{cid_a}?format=raw")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(stub.calls(), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn two_root_archive_rejected_for_archive_format() {
        let (cid_a, payload_a) = raw_block(b"first root");
        let (cid_b, _) = raw_block(b"second root");
        let stub = StubSource::new(
            RetrievalUpstream::RetrievalService,
            car_bytes(&[cid_a, cid_b], &[(cid_a, &payload_a)]),
        );
        let node = test_node(
            NodeConfig::for_tests(),
            vec![Arc::clone(&stub) as Arc<dyn Fetcher>],
        );
        let router = build_router(node.state);

        // the rejection happens before the status is committed, so the
        // client sees a gateway error, not an aborted 200
        let response = router
            .oneshot(get(&format!("/ipfs/{cid_a}?format=car")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test]
    async fn raw_fetch_serves_first_block_and_caches_siblings() {
        let (cid_a, payload_a) = raw_block(b"the requested block");
        let (cid_b, payload_b) = raw_block(b"a sibling block");
        let stub = StubSource::new(
            RetrievalUpstream::RetrievalService,
            car_bytes(&[cid_a], &[(cid_a, &payload_a), (cid_b, &payload_b)]),
        );
        let node = test_node(
            NodeConfig::for_tests(),
            vec![Arc::clone(&stub) as Arc<dyn Fetcher>],
        );
        let cache = Arc::clone(&node.cache);
        let router = build_router(node.state);

        let response = router
            .clone()
            .oneshot(get(&format!("/ipfs/{cid_a}?format=raw")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "application/vnd.ipld.raw");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body.as_ref(), payload_a.as_slice());

        // both the requested block and the verified sibling are resident
        assert_eq!(cache.len(), 2);

        // a second request is a cache hit and never consults the source again
        let response = router
            .oneshot(get(&format!("/ipfs/{cid_a}?format=raw")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test]
    async fn mutated_archive_entry_aborts_the_streamed_body() {
        let (cid_a, payload_a) = raw_block(b"good entry");
        let (cid_b, _) = raw_block(b"entry before mutation");
        let stub = StubSource::new(
            RetrievalUpstream::RetrievalService,
            car_bytes(&[cid_a], &[(cid_a, &payload_a), (cid_b, b"mutated entry bytes!!")]),
        );
        let node = test_node(
            NodeConfig::for_tests(),
            vec![Arc::clone(&stub) as Arc<dyn Fetcher>],
        );
        let router = build_router(node.state);

        let response = router
            .oneshot(get(&format!("/ipfs/{cid_a}?format=car")))
            .await
            .unwrap();
        // headers were already committed when the bad entry surfaced
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.into_body().collect().await.is_err());
    }

    #[tokio::test]
    async fn peer_delivery_served_and_verified_end_to_end() {
        let (cid, payload) = raw_block(b"peer-provided content");
        let car = car_bytes(&[cid], &[(cid, &payload)]);

        let node = test_node(NodeConfig::for_tests(), Vec::new());
        let peers = Arc::clone(&node.peers);
        let sources: Vec<Arc<dyn Fetcher>> =
            vec![Arc::new(PeerTierFetcher::new(Arc::clone(&peers)))];
        let state = st_05_gateway::AppState {
            sources: Arc::new(sources),
            ..node.state
        };
        let router = build_router(state);

        let request_task = {
            let router = router.clone();
            let uri = format!("/ipfs/{cid}?format=car");
            tokio::spawn(async move { router.oneshot(get(&uri)).await.unwrap() })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;

        let delivery = Request::builder()
            .method("POST")
            .uri(format!("/data/{cid}"))
            .body(Body::from(car.clone()))
            .unwrap();
        let delivery_response = router.oneshot(delivery).await.unwrap();
        assert_eq!(delivery_response.status(), StatusCode::OK);

        let response = request_task.await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body.as_ref(), car.as_slice());
    }
}

use bytes::BytesMut;
use http::header::{HeaderName, HeaderValue};
use http::{Method, StatusCode};
use proptest::prelude::*;
use reqecho::common::spawn_test_server;
use reqecho::http::{EchoHandler, EchoOptions, EchoRequest, HttpEchoClient, RequestFrame, ServerCodec};
use tokio_util::codec::Decoder;

fn header_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,6}(-[a-z0-9]{1,6}){0,2}"
}

fn header_value() -> impl Strategy<Value = String> {
    "[ -~&&[^,]]{0,20}".prop_map(|value| value.trim().to_string())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Property: the Body section reproduces the request body byte for byte
    #[test]
    fn body_section_preserves_bytes(body in prop::collection::vec(any::<u8>(), 0..2048)) {
        let handler = EchoHandler::default();
        let request = EchoRequest::new(Method::POST, "/").with_body(body.clone());

        let page = handler.render(&request);
        let mut expected = b"<h1>Body:</h1>\n<pre>\n".to_vec();
        expected.extend_from_slice(&body);
        expected.extend_from_slice(b"</pre>");
        prop_assert!(page.ends_with(&expected));
    }

    /// Property: every distinct header name is listed exactly once, sorted or not
    #[test]
    fn headers_listed_exactly_once(
        headers in prop::collection::vec((header_name(), header_value()), 0..12),
        sort_headers in any::<bool>(),
    ) {
        let mut request = EchoRequest::new(Method::GET, "/");
        for (name, value) in &headers {
            request.headers.append(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }

        let handler = EchoHandler::new(EchoOptions { sort_headers, ..EchoOptions::default() });
        let page = String::from_utf8(handler.render(&request).to_vec()).unwrap();
        let start = page.find("<pre>\n").unwrap() + "<pre>\n".len();
        let end = page[start..].find("</pre>").unwrap() + start;
        let listed: Vec<&str> = page[start..end]
            .lines()
            .map(|line| line.split_once(": ").map(|(name, _)| name).unwrap_or(line))
            .collect();

        let mut distinct: Vec<String> = request.headers.keys().map(|name| name.as_str().to_string()).collect();
        distinct.sort();
        let mut listed_lower: Vec<String> = listed.iter().map(|name| name.to_ascii_lowercase()).collect();
        listed_lower.sort();
        prop_assert_eq!(listed_lower, distinct);

        if sort_headers {
            prop_assert!(listed.windows(2).all(|pair| pair[0] <= pair[1]));
        }
    }

    /// Property: a request survives being split at any point on the wire
    #[test]
    fn decoder_handles_any_split(split in 0usize..64, body in "[a-z]{0,16}") {
        let raw = format!(
            "POST /split HTTP/1.1\r\nHost: x\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        let split = split.min(raw.len());
        let mut codec = ServerCodec::new(8192);
        let mut buf = BytesMut::from(&raw.as_bytes()[..split]);

        let first = codec.decode(&mut buf).unwrap();
        let request = match first {
            Some(RequestFrame::Request(request)) => request,
            Some(RequestFrame::Continue) => return Err(TestCaseError::fail("no Expect header was sent")),
            None => {
                buf.extend_from_slice(&raw.as_bytes()[split..]);
                match codec.decode(&mut buf).unwrap() {
                    Some(RequestFrame::Request(request)) => request,
                    other => return Err(TestCaseError::fail(format!("expected a request, got {other:?}"))),
                }
            }
        };
        prop_assert_eq!(request.target.as_str(), "/split");
        prop_assert_eq!(&request.body[..], body.as_bytes());
    }

    /// Property: any final status requested by query comes back, framed so
    /// the connection stays usable; informational codes fall back to 200
    #[test]
    fn status_code_round_trips_over_the_wire(code in 100u16..600) {
        tokio_test::block_on(async {
            let server = spawn_test_server(EchoOptions::default()).await
                .map_err(|e| TestCaseError::fail(format!("Server setup failed: {}", e)))?;

            let mut client = HttpEchoClient::connect(server.addr).await
                .map_err(|e| TestCaseError::fail(format!("Client connection failed: {}", e)))?;
            let response = client.get(&format!("/?status_code={code}")).await
                .map_err(|e| TestCaseError::fail(format!("Request failed: {}", e)))?;
            let follow_up = client.get("/follow-up").await
                .map_err(|e| TestCaseError::fail(format!("Follow-up request failed: {}", e)))?;

            server.shutdown().await
                .map_err(|e| TestCaseError::fail(format!("Shutdown failed: {}", e)))?;

            let requested = StatusCode::from_u16(code).unwrap();
            let expected = if requested.is_informational() { StatusCode::OK } else { requested };
            prop_assert_eq!(response.status(), expected);
            let literal = code.to_string();
            prop_assert_eq!(response.headers()["x-status-code"].to_str().unwrap(), literal.as_str());

            let bodiless = expected == StatusCode::NO_CONTENT || expected == StatusCode::NOT_MODIFIED;
            prop_assert_eq!(response.body().is_empty(), bodiless);
            if expected == StatusCode::NO_CONTENT {
                prop_assert!(!response.headers().contains_key("content-length"));
            }

            prop_assert_eq!(follow_up.status(), StatusCode::OK);
            prop_assert_eq!(follow_up.headers()["x-request-uri"].to_str().unwrap(), "/follow-up");
            Ok(())
        })?;
    }
}

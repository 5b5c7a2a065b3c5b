use bytes::BytesMut;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use http::Method;
use http::header::{HeaderName, HeaderValue};
use reqecho::common::spawn_test_server;
use reqecho::http::{EchoHandler, EchoOptions, EchoRequest, HttpEchoClient, ServerCodec};
use tokio::runtime::Runtime;
use tokio_util::codec::Decoder;

fn sample_request(body_size: usize) -> EchoRequest {
    let mut request = EchoRequest::new(Method::POST, "/bench?status_code=201").with_body(vec![b'x'; body_size]);
    for (name, value) in [
        ("host", "localhost"),
        ("user-agent", "bench/1.0"),
        ("accept", "*/*"),
        ("x-forwarded-for", "10.0.0.1"),
        ("x-request-id", "5b3c9a"),
    ] {
        request
            .headers
            .append(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
    request
}

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render");

    for size in [64, 1024, 16384] {
        let request = sample_request(size);
        group.throughput(Throughput::Bytes(size as u64));

        let plain = EchoHandler::default();
        group.bench_with_input(BenchmarkId::new("plain", size), &request, |b, request| {
            b.iter(|| plain.render(black_box(request)))
        });

        let sorted = EchoHandler::new(EchoOptions {
            sort_headers: true,
            include_connection_fields: true,
            enable_fault_injection: false,
        });
        group.bench_with_input(BenchmarkId::new("sorted", size), &request, |b, request| {
            b.iter(|| sorted.render(black_box(request)))
        });
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let raw = b"POST /bench HTTP/1.1\r\nHost: localhost\r\nUser-Agent: bench/1.0\r\n\
                Accept: */*\r\nContent-Length: 11\r\n\r\nhello world";

    c.bench_function("decode_request", |b| {
        b.iter(|| {
            let mut codec = ServerCodec::new(8192);
            let mut buf = BytesMut::from(&raw[..]);
            codec.decode(black_box(&mut buf)).unwrap()
        })
    });
}

fn bench_round_trip(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let server = rt.block_on(spawn_test_server(EchoOptions::default())).unwrap();
    let mut client = rt.block_on(HttpEchoClient::connect(server.addr)).unwrap();

    c.bench_function("round_trip_get", |b| {
        b.iter(|| rt.block_on(client.get("/bench")).unwrap())
    });

    drop(client);
    rt.block_on(server.shutdown()).unwrap();
}

criterion_group!(benches, bench_render, bench_decode, bench_round_trip);
criterion_main!(benches);

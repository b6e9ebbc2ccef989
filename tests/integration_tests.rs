//! Integration tests using wiremock to simulate HTTP servers.

use futures::StreamExt;
use restbind::{
    callback, Args, Body, Client, Error, ErrorKind, MethodMetadata, RequestFacade, ReqwestTransport,
    Response, Service, ServiceDefinition, TypeRef,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::runtime::Handle;
use wiremock::matchers::{body_json, body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct TestData {
    id: u32,
    name: String,
}

fn client(uri: &str) -> Client {
    Client::builder()
        .endpoint(uri)
        .unwrap()
        .transport(ReqwestTransport::new(Handle::current()).unwrap())
        .build()
        .unwrap()
}

fn service(client: &Client, method: MethodMetadata) -> Service {
    client
        .create(ServiceDefinition::new("Test").method(method))
        .unwrap()
}

/// Blocking calls wait on the calling thread, so they run off the runtime.
async fn call(
    service: &Service,
    method: &'static str,
    args: Args,
) -> restbind::Result<Response<Value>> {
    let service = service.clone();
    tokio::task::spawn_blocking(move || service.call(method, args))
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_get_with_path_and_query() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/category/books"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1, "name": "Dune"}])))
        .mount(&mock_server)
        .await;

    let service = service(
        &client(&mock_server.uri()),
        MethodMetadata::new("category")
            .get("/category/{cat}")
            .path("cat")
            .query("page")
            .returns(TypeRef::of::<Vec<TestData>>()),
    );

    let response = call(&service, "category", Args::new().with("books").with(2))
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    assert!(response.raw.url().ends_with("/category/books?page=2"));
    let items = response.decode::<Vec<TestData>>().unwrap();
    assert_eq!(
        items.data,
        vec![TestData {
            id: 1,
            name: "Dune".to_string()
        }]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_post_json_body() {
    let mock_server = MockServer::start().await;

    let request_data = TestData {
        id: 0,
        name: "New".to_string(),
    };

    Mock::given(method("POST"))
        .and(path("/test"))
        .and(header("content-type", "application/json; charset=UTF-8"))
        .and(body_json(&request_data))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 1, "name": "New"})))
        .mount(&mock_server)
        .await;

    let service = service(
        &client(&mock_server.uri()),
        MethodMetadata::new("create")
            .post("/test")
            .body("data")
            .returns(TypeRef::of::<TestData>()),
    );

    let args = Args::new().with_serialized(&request_data).unwrap();
    let response = call(&service, "create", args).await.unwrap();

    assert_eq!(response.status().as_u16(), 201);
    assert_eq!(response.data, json!({"id": 1, "name": "New"}));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_http_error_keeps_body_and_type() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/test"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "boom"})))
        .mount(&mock_server)
        .await;

    let service = service(
        &client(&mock_server.uri()),
        MethodMetadata::new("get").get("/test").returns(TypeRef::of::<TestData>()),
    );

    let result = call(&service, "get", Args::new()).await;

    match result {
        Err(e @ Error::Http { .. }) => {
            assert_eq!(e.status().map(|s| s.as_u16()), Some(500));
            assert_eq!(e.success_type(), Some(&TypeRef::of::<TestData>()));
            assert_eq!(
                e.body_as(&TypeRef::named("ApiError")).unwrap(),
                Some(json!({"error": "boom"}))
            );
        }
        other => panic!("Expected Http error, got {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_conversion_error_drops_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/test"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&mock_server)
        .await;

    let service = service(
        &client(&mock_server.uri()),
        MethodMetadata::new("get").get("/test").returns(TypeRef::of::<TestData>()),
    );

    match call(&service, "get", Args::new()).await {
        Err(Error::Conversion { response, .. }) => {
            let response = response.expect("decode failures keep the response");
            assert_eq!(response.status().as_u16(), 200);
            assert!(response.body().is_none());
        }
        other => panic!("Expected Conversion error, got {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_static_header_param_and_interceptor() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/test"))
        .and(header("accept", "application/json"))
        .and(header("x-request-tag", "abc"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = Client::builder()
        .endpoint(mock_server.uri())
        .unwrap()
        .transport(ReqwestTransport::new(Handle::current()).unwrap())
        .request_interceptor(|request: &mut RequestFacade<'_>| {
            request.set_header("Authorization", "Bearer secret");
        })
        .build()
        .unwrap();
    let service = service(
        &client,
        MethodMetadata::new("get")
            .get("/test")
            .header("Accept: application/json")
            .header_param("X-Request-Tag")
            .returns(TypeRef::default()),
    );

    let response = call(&service, "get", Args::new().with("abc")).await.unwrap();
    assert_eq!(response.data, json!({"ok": true}));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_form_url_encoded_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/login"))
        .and(header("content-type", "application/x-www-form-urlencoded; charset=UTF-8"))
        .and(body_string("user=jake&scope=r&scope=w"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock_server)
        .await;

    let service = service(
        &client(&mock_server.uri()),
        MethodMetadata::new("login")
            .post("/login")
            .form_url_encoded()
            .field("user")
            .field("scope")
            .returns(TypeRef::default()),
    );

    let response = call(&service, "login", Args::new().with("jake").with(json!(["r", "w"])))
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);
    assert_eq!(response.data, Value::Null);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_pre_encoded_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/blob"))
        .and(header("content-type", "text/plain"))
        .and(body_string("raw bytes"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let service = service(
        &client(&mock_server.uri()),
        MethodMetadata::new("put").put("/blob").body("blob").returns(TypeRef::default()),
    );

    let args = Args::new().with_body(Body::from_bytes(Some("text/plain"), "raw bytes"));
    let response = call(&service, "put", args).await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_raw_response() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .mount(&mock_server)
        .await;

    let service = service(
        &client(&mock_server.uri()),
        MethodMetadata::new("page").get("/page").returns(TypeRef::raw()),
    );

    let response = call(&service, "page", Args::new()).await.unwrap();
    assert_eq!(response.data, Value::Null);
    assert_eq!(response.raw.text().as_deref(), Some("<html></html>"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_callback_mode() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 7, "name": "cb"})))
        .mount(&mock_server)
        .await;

    let service = service(
        &client(&mock_server.uri()),
        MethodMetadata::new("get").get("/test").callback(TypeRef::of::<TestData>()),
    );

    let (tx, rx) = tokio::sync::oneshot::channel();
    service.enqueue(
        "get",
        Args::new(),
        callback::from_result(move |result| {
            let _ = tx.send(result);
        }),
    );

    let response = rx.await.unwrap().unwrap();
    assert_eq!(response.data["name"], "cb");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stream_mode() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/test"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&mock_server)
        .await;

    let service = service(
        &client(&mock_server.uri()),
        MethodMetadata::new("get").get("/test").returns_stream(TypeRef::of::<TestData>()),
    );

    // Nothing is sent until subscription; each subscription sends once.
    let observable = service.observe("get", Args::new());
    let mut stream = observable.subscribe();
    let item = stream.next().await.unwrap();
    assert_eq!(item.unwrap_err().kind(), ErrorKind::Http);
    assert!(stream.next().await.is_none());

    let mut stream = service.observe("get", Args::new()).subscribe();
    assert!(stream.next().await.unwrap().is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_network_error() {
    let client = client("http://127.0.0.1:1");
    let service = service(
        &client,
        MethodMetadata::new("get").get("/test").returns(TypeRef::default()),
    );

    let err = call(&service, "get", Args::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Network);
    assert_eq!(err.url(), "http://127.0.0.1:1/test");
    assert!(err.response().is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_dynamic_endpoint() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/ping"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!("pong")))
        .mount(&mock_server)
        .await;

    let base = format!("{}/v2", mock_server.uri());
    let client = Client::builder()
        .dynamic_endpoint(move || base.clone())
        .transport(ReqwestTransport::new(Handle::current()).unwrap())
        .build()
        .unwrap();
    let service = service(
        &client,
        MethodMetadata::new("ping").get("/ping").returns(TypeRef::default()),
    );

    let response = call(&service, "ping", Args::new()).await.unwrap();
    assert_eq!(response.data, json!("pong"));
}

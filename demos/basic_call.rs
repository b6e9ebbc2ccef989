//! Basic example declaring a small service and calling it three ways.
//!
//! This example shows how to:
//! - Declare methods with path, query and body bindings
//! - Call a blocking method and decode its response
//! - Enqueue a callback method
//! - Subscribe to a stream method
//! - Turn on traffic logging
//!
//! Run with: `cargo run --example basic_call`

use futures::StreamExt;
use restbind::{
    callback, Args, Client, LogLevel, MethodMetadata, ReqwestTransport, ServiceDefinition,
    ThreadExecutor, TokioExecutor, TypeRef,
};
use serde::{Deserialize, Serialize};
use std::sync::mpsc;

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Post {
    #[serde(rename = "userId")]
    user_id: u32,
    id: u32,
    title: String,
    body: String,
}

#[derive(Debug, Serialize)]
struct NewPost {
    title: String,
    body: String,
    #[serde(rename = "userId")]
    user_id: u32,
}

fn posts() -> ServiceDefinition {
    ServiceDefinition::new("Posts")
        .method(
            MethodMetadata::new("post")
                .get("/posts/{id}")
                .header("Accept: application/json")
                .path("id")
                .returns(TypeRef::of::<Post>()),
        )
        .method(
            MethodMetadata::new("by_user")
                .get("/posts")
                .query("userId")
                .callback(TypeRef::of::<Vec<Post>>()),
        )
        .method(
            MethodMetadata::new("create")
                .post("/posts")
                .body("post")
                .returns_stream(TypeRef::of::<Post>()),
        )
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("restbind=debug,basic_call=info")
        .init();

    let runtime = tokio::runtime::Runtime::new()?;
    let handle = runtime.handle().clone();

    let client = Client::builder()
        .endpoint("https://jsonplaceholder.typicode.com")?
        .transport(ReqwestTransport::new(handle.clone())?)
        .http_executor(TokioExecutor::new(handle))
        .callback_executor(ThreadExecutor::new())
        .log_level(LogLevel::Basic)
        .build()?;
    let posts = client.create(posts())?;

    println!("=== Blocking ===");
    let response = posts.call("post", Args::new().with(1))?.decode::<Post>()?;
    println!("Post ID: {}", response.data.id);
    println!("Title: {}", response.data.title);
    println!("Request latency: {:?}", response.latency);
    println!("Content-Type: {:?}", response.header("content-type"));
    println!();

    println!("=== Callback ===");
    let (tx, rx) = mpsc::channel();
    posts.enqueue(
        "by_user",
        Args::new().with(1),
        callback::from_result(move |result| {
            let _ = tx.send(result);
        }),
    );
    let response = rx.recv()??.decode::<Vec<Post>>()?;
    println!("User 1 wrote {} posts", response.data.len());
    println!();

    println!("=== Stream ===");
    client.set_log_level(LogLevel::HeadersAndArgs);
    let new_post = NewPost {
        title: "My New Post".to_string(),
        body: "This is the content of my new post!".to_string(),
        user_id: 1,
    };
    let mut stream = posts
        .observe("create", Args::new().with_serialized(&new_post)?)
        .subscribe();
    while let Some(outcome) = runtime.block_on(stream.next()) {
        let response = outcome?.decode::<Post>()?;
        println!("Created post ID: {}", response.data.id);
        println!("Status: {}", response.status());
    }

    Ok(())
}

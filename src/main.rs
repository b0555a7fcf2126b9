//! Fireball demo server.
//!
//! Serves two functions on `FIREBALL_HOST:FIREBALL_PORT`:
//!
//! - `POST /hello`: generic encoding
//! - `POST /hi`: encoded through a serializer compiled from its response schema

use fireball::logger::init_tracing;
use fireball::prelude::*;
use serde::Serialize;
use serde_json::json;

#[fireball_function(name = "hello", description = "Greets the caller")]
async fn hello(_req: RawRequest, ctx: RequestContext) -> Result<Envelope, HandlerError> {
    ctx.logger.info("hello from function");
    Ok(success(json!({ "message": "hello world" })))
}

#[derive(Serialize)]
struct Greeting {
    message: String,
}

async fn hi(req: RawRequest, _ctx: RequestContext) -> Result<Envelope, HandlerError> {
    let name = req.header("x-name").unwrap_or("world");
    let greeting = Greeting {
        message: format!("hi {}", name),
    };
    Ok(Envelope::success_json(&greeting)?)
}

fn hi_schema() -> FunctionSchema {
    FunctionSchema::new(json!({
        "type": "object",
        "properties": {
            "message": { "type": "string" }
        },
        "required": ["message"]
    }))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = ServerConfig::from_env();
    init_tracing(config.log_format)?;

    let mut server = Server::new(config);
    server
        .register(HelloFunction::NAME, HelloFunction)
        .register_with_schema("hi", hi_schema(), hi)?;

    let handle = server.listen().await?;
    if let Some(addr) = handle.local_addr() {
        tracing::info!("fireball listening on http://{}", addr);
    }

    handle.close_on_signal().await??;
    handle.wait_drained().await?;
    tracing::info!("server closed");
    Ok(())
}

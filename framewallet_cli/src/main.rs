mod harness;

use std::path::Path;
use std::sync::Arc;

use framewallet_core::{
    error::CoreError, is_transaction_selected, select_latest, BridgeContext, BridgeSettings, CommChannel,
    MemoryPort, Multiplex, PayloadTransform, QueueSnapshot, RequestQueue, RpcRequest, RpcResponse, TransportBridge,
};
use futures::{FutureExt, StreamExt};
use harness::{EchoProvider, LoggingOAuth};
use log::{info, warn};
use serde_json::{json, Value};

type AppError = CoreError;

/// Referrer the loopback embedder pretends to be.
const HARNESS_REFERRER: &str = "https://dapp.localhost/";

const USAGE: &str = "usage: framewallet <arbitrate QUEUE.json | transform ENVELOPES.json | replay ENVELOPES.json>";

#[tokio::main]
async fn main() -> Result<(), AppError> {
    env_logger::init();
    // Print an unconditional startup line so users see the binary started
    // even when RUST_LOG is not set.
    println!(
        "framewallet starting (pid {}), RUST_LOG={:?}",
        std::process::id(),
        std::env::var("RUST_LOG").ok()
    );

    let config_path = std::env::var("FRAMEWALLET_CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let settings = if Path::new(&config_path).exists() {
        BridgeSettings::from_file(&config_path)?
    } else {
        warn!("{} not found; using default settings", config_path);
        BridgeSettings::default()
    };

    let args: Vec<String> = std::env::args().skip(1).collect();
    match (args.first().map(String::as_str), args.get(1)) {
        (Some("arbitrate"), Some(path)) => arbitrate(path),
        (Some("transform"), Some(path)) => transform(&settings, path),
        (Some("replay"), Some(path)) => replay(&settings, path).await,
        _ => Err(AppError::Validation(USAGE.to_string())),
    }
}

fn read_json(path: &str) -> Result<Value, AppError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn read_envelopes(path: &str) -> Result<Vec<Value>, AppError> {
    match read_json(path)? {
        Value::Array(envelopes) => Ok(envelopes),
        _ => Err(AppError::Validation(format!("{} must contain a JSON array of envelopes", path))),
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<(), AppError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print the request that would be presented next.
fn arbitrate(path: &str) -> Result<(), AppError> {
    let snapshot: QueueSnapshot = serde_json::from_value(read_json(path)?)?;
    let queue = RequestQueue::from_snapshot(snapshot);
    info!("Loaded {} pending requests", queue.len());

    print_json(&json!({
        "selected": select_latest(&queue),
        "isTransactionSelected": is_transaction_selected(&queue),
    }))
}

/// Run each envelope through the payload transform alone.
fn transform(settings: &BridgeSettings, path: &str) -> Result<(), AppError> {
    let (port, mut announcements) = MemoryPort::channel();
    let comm = CommChannel::open(&Multiplex::new(settings.comm_channel.local.clone(), port))?;
    let transform = PayloadTransform::new(comm, HARNESS_REFERRER);

    for envelope in read_envelopes(path)? {
        match RpcRequest::from_value(envelope) {
            Ok(request) => print_json(&transform.apply(request).to_value())?,
            Err(e) => println!("rejected: {}", e),
        }
        while let Some(Some(frame)) = announcements.next().now_or_never() {
            println!("announced: {}", frame);
        }
    }
    Ok(())
}

/// Drive the full provider loop over loopback ports and print every frame
/// the embedder would receive.
async fn replay(settings: &BridgeSettings, path: &str) -> Result<(), AppError> {
    let envelopes = read_envelopes(path)?;
    let expected = envelopes.iter().filter(|e| RpcRequest::id_hint(e).is_some()).count();

    let (provider_port, mut provider_out) = MemoryPort::channel();
    let (comm_port, mut comm_out) = MemoryPort::channel();
    let context = BridgeContext::new(
        Multiplex::new(settings.provider_channel.local.clone(), provider_port),
        Multiplex::new(settings.comm_channel.local.clone(), comm_port),
        HARNESS_REFERRER,
    );
    let bridge = TransportBridge::new(&context, Arc::new(EchoProvider { block_number: 1 }))?;

    let driver = async {
        for envelope in envelopes {
            context.provider.route(json!({ "name": "provider", "data": envelope }));
        }

        let mut answered = 0;
        while answered < expected {
            futures::select! {
                frame = provider_out.next() => match frame {
                    Some(frame) => {
                        if frame.get("name").and_then(Value::as_str) == Some("provider")
                            && serde_json::from_value::<RpcResponse>(frame["data"].clone()).is_ok()
                        {
                            answered += 1;
                        }
                        println!("{} <- {}", settings.provider_channel.remote, frame);
                    }
                    None => break,
                },
                frame = comm_out.next() => match frame {
                    Some(frame) => println!("{} <- {}", settings.comm_channel.remote, frame),
                    None => break,
                },
            }
        }
        while let Some(Some(frame)) = comm_out.next().now_or_never() {
            println!("{} <- {}", settings.comm_channel.remote, frame);
        }

        context.provider.fail("replay finished");
        context.comm.fail("replay finished");
    };

    futures::join!(bridge.run(LoggingOAuth), driver);
    info!("Replayed {} responses", expected);
    Ok(())
}

use tokio_bayeux::client::Client;
use tokio_bayeux::config::Config;
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    #[derive(Debug, serde::Serialize, serde::Deserialize)]
    struct Greeting {
        hello: i32,
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            Targets::new()
                .with_default(LevelFilter::INFO)
                .with_target("tokio_bayeux", LevelFilter::TRACE),
        )
        .init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "http://localhost:8080/cometd".to_string());
    let client = Client::from_url(&url, Config::new())?;

    client.on_state_changed(|e| {
        log::info!("state: {:?} -> {:?}", e.from, e.to);
    });
    client.on_connection_failed(|e| {
        log::info!("{} failed (status={:?}): {}", e.request.channel(), e.status, e.error);
    });
    client.on_data_failed(|e| {
        log::info!("{} failed (status={:?}): {}", e.request.channel(), e.status, e.error);
    });
    client.register(
        "/demo/**",
        |channel, _, message, _| {
            let greeting = message
                .data
                .clone()
                .map(serde_json::from_value::<Greeting>);
            log::info!("event on {}: {:?}", channel, greeting);
        },
        None,
    )?;

    client.handshake().await?;
    client.subscribe("/demo/greetings").await?;

    for i in 0..10 {
        client
            .publish("/demo/greetings", serde_json::to_value(Greeting { hello: i })?)
            .await?;
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    }

    client.disconnect().await?;
    Ok(())
}

//! Echo bot: replies to every channel message with the same text.
//!
//! ```text
//! NEBOLOOP_GATEWAY=wss://comms.example.com/ws \
//! NEBOLOOP_BOT_ID=bot-1 \
//! NEBOLOOP_TOKEN=... \
//! RUST_LOG=info,neboloop_comms=debug \
//! cargo run --example echo_bot
//! ```
//!
//! `NEBOLOOP_API_KEY` may be set instead of `NEBOLOOP_TOKEN`, and
//! `NEBOLOOP_DEVICE_ID` is passed through when present.

use std::env;

use neboloop_comms::{ChannelMessage, Client, CommsError, Config, Credential, TaskResult, TaskSubmission};
use tracing_subscriber::EnvFilter;

fn config_from_env() -> Result<Config, CommsError> {
    let var = |name: &str| {
        env::var(name).map_err(|_| CommsError::Protocol(format!("{name} is not set")))
    };

    let credential = match (env::var("NEBOLOOP_TOKEN"), env::var("NEBOLOOP_API_KEY")) {
        (Ok(token), _) => Credential::Token(token),
        (Err(_), Ok(key)) => Credential::ApiKey(key),
        _ => {
            return Err(CommsError::Protocol(
                "set NEBOLOOP_TOKEN or NEBOLOOP_API_KEY".to_string(),
            ))
        }
    };

    let mut config = Config::new(var("NEBOLOOP_GATEWAY")?, var("NEBOLOOP_BOT_ID")?, credential);
    if let Ok(device_id) = env::var("NEBOLOOP_DEVICE_ID") {
        config = config.with_device_id(device_id);
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let client = Client::builder(config_from_env()?)
        .on_channel_message(|msg: ChannelMessage, client| async move {
            tracing::info!(
                channel = %msg.channel_type,
                from = msg.sender_name.as_deref().unwrap_or(&msg.meta.sender_id),
                "echoing"
            );
            let reply = ChannelMessage {
                text: msg.text.clone(),
                reply_to: Some(msg.meta.message_id.to_string()),
                ..msg.clone()
            };
            client.send_channel_message(msg.meta.conversation_id, &reply).await?;
            Ok(())
        })
        .on_task(|task: TaskSubmission, client| async move {
            let result = TaskResult {
                task_id: task.task_id.clone(),
                correlation_id: task.correlation_id.clone(),
                status: "completed".to_string(),
                output: Some(task.input.clone()),
                ..TaskResult::default()
            };
            client.send_task_result(task.meta.conversation_id, &result).await?;
            Ok(())
        })
        .on_reconnect(|client| async move {
            tracing::info!(session_id = ?client.session_id(), "back online");
            client.set_presence("online").await
        })
        .connect()
        .await?;

    tracing::info!(session_id = ?client.session_id(), "echo bot running, ctrl-c to stop");
    tokio::signal::ctrl_c().await?;

    client.close().await?;
    Ok(())
}

/// Bazaar chat - open a conversation about a product request and chat from the terminal
use bazaar_core::chat::WsConnector;
use bazaar_core::{ChatContext, ChatSession, Config, SessionState};
use std::env;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let (config, rest) = Config::from_args(&args)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    if rest.len() < 3 {
        eprintln!(
            "Usage: {} [--socket-url <ws-url>] [--ack-timeout-ms <ms>] <sender> <recipient> <product title>",
            args.first().map(String::as_str).unwrap_or("bazaar")
        );
        return Ok(());
    }
    let context = ChatContext::new(rest[0].clone(), rest[1].clone(), rest[2..].join(" "));

    info!("Connecting to {}", config.socket_url);
    let connector = Arc::new(WsConnector::from_config(&config));
    let session = ChatSession::mount(connector, context, &config);

    // Render every snapshot of the conversation
    let mut messages = session.messages();
    let renderer = tokio::spawn(async move {
        while messages.changed().await.is_ok() {
            let snapshot = messages.borrow_and_update().clone();
            println!("──── {} message(s) ────", snapshot.len());
            for msg in snapshot {
                println!(
                    "[{}] {}: {}",
                    msg.created_at.format("%H:%M"),
                    msg.author,
                    msg.body
                );
            }
        }
    });

    let mut states = session.states();
    let state_logger = tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            info!("Chat state: {:?}", state);
            if matches!(state, SessionState::Disconnected | SessionState::Unmounted) {
                break;
            }
        }
    });

    println!("Type a message and press enter. /quit to leave.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) if line.trim() == "/quit" => break,
                    Some(line) if line.trim().is_empty() => continue,
                    Some(line) => {
                        // Sending waits for the room, so keep Ctrl+C responsive
                        tokio::select! {
                            sent = session.send(&line) => {
                                if let Err(e) = sent {
                                    error!("Send failed: {}", e);
                                    eprintln!("✗ {}", e.user_message());
                                }
                            }
                            _ = tokio::signal::ctrl_c() => {
                                info!("Ctrl+C received");
                                break;
                            }
                        }
                    }
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received");
                break;
            }
        }
    }

    session.unmount().await;
    renderer.abort();
    let _ = state_logger.await;
    Ok(())
}

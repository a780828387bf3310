//! `search-chat`: a line-oriented terminal front end for the search agent

use search_chat::config::LogFormat;
use search_chat::render::TerminalRenderer;
use search_chat::transport::{HttpTransport, LoggingTransport};
use search_chat::{ChatHandle, ClientConfig, SubmitOutcome};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const QUIT_COMMAND: &str = "/quit";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ClientConfig::from_env()?;

    // Logs go to stderr so they never interleave with the answer text
    let (json_layer, text_layer) = match config.log_format {
        LogFormat::Json => (
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_span_list(false)
                    .with_writer(std::io::stderr),
            ),
            None,
        ),
        LogFormat::Text => (
            None,
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
        ),
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "search_chat=info".into()),
        )
        .with(json_layer)
        .with(text_layer)
        .init();

    tracing::info!(
        api_url = %config.api_url,
        writing_delay_ms = %config.writing_delay.as_millis(),
        "Search chat starting"
    );

    let transport = LoggingTransport::new(HttpTransport::new());
    let chat = ChatHandle::spawn(&config, transport);
    let mut renderer = TerminalRenderer::new();
    let mut stdout = std::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim() == QUIT_COMMAND {
            break;
        }
        match chat.submit(&line).await? {
            SubmitOutcome::Ignored => continue,
            SubmitOutcome::Accepted(turn_id) => {
                tracing::debug!(turn_id = %turn_id, "Turn accepted");
            }
        }

        // Follow the turn until it completes or fails
        let mut updates = chat.subscribe();
        loop {
            let snapshot = updates.borrow_and_update().clone();
            renderer.render(&snapshot, &mut stdout)?;
            if !snapshot.busy || updates.changed().await.is_err() {
                break;
            }
        }
    }

    let last = chat.shutdown().await?;
    renderer.render(&last, &mut stdout)?;
    tracing::info!(turns = last.transcript.len(), "Search chat stopped");
    Ok(())
}

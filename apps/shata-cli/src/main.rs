use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

use shata_data_channel::{MemoryNetwork, generate_code};
use shata_session::{ReceiverSession, SenderSession, SessionConfig, SessionEvent, SessionEvents};
use shata_transfer::{FileSource, ReceivedFile, format_size};

#[derive(Parser, Debug)]
#[command(name = "shata-cli", version)]
#[command(about = "Single-file transfers paired by a short code", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sends a file to a receiver in this process over the in-memory transport
    SendLocal {
        /// File to send
        file: PathBuf,
        /// Directory the received copy is written to
        #[arg(long)]
        out: PathBuf,
        /// MIME type announced to the receiver
        #[arg(long, default_value = "application/octet-stream")]
        mime: String,
        /// JSON session config
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Prints a freshly generated pairing code
    Code,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,shata=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::SendLocal {
            file,
            out,
            mime,
            config,
        } => {
            let received = send_local(&file, &out, &mime, config.as_deref()).await?;
            println!("Saved to {}", received.display());
        }
        Command::Code => println!("{}", generate_code()),
    }
    Ok(())
}

/// Runs a sender and a receiver against one in-memory network and saves the
/// received copy into `out`. Returns the path written.
async fn send_local(
    file: &Path,
    out: &Path,
    mime: &str,
    config: Option<&Path>,
) -> anyhow::Result<PathBuf> {
    let config = match config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };
    let source = FileSource::open(file, mime)
        .await
        .with_context(|| format!("failed to open {}", file.display()))?;
    let network = MemoryNetwork::new();

    let mut sender = SenderSession::new(network.clone(), config.clone());
    let sender_printer = spawn_printer("send", sender.take_events())?;
    let code = sender.register().await?;
    let send_task = tokio::spawn(async move { sender.serve(source).await });

    let mut receiver = ReceiverSession::new(network, config);
    let receiver_printer = spawn_printer("recv", receiver.take_events())?;

    let result = receiver.receive_file(&code).await;
    drop(receiver);
    receiver_printer.await?;

    let received = match result {
        Ok(received) => received,
        Err(e) => {
            send_task.abort();
            bail!("{}", e.user_message());
        }
    };
    let sent = send_task.await??;
    sender_printer.await?;
    tracing::debug!(sent, "sender finished");

    save(&received, out).await
}

async fn save(received: &ReceivedFile, out: &Path) -> anyhow::Result<PathBuf> {
    if !received.size_matches() {
        tracing::warn!(
            expected = received.metadata.size,
            actual = received.data.len(),
            missing_chunks = received.missing_chunks,
            "saving an incomplete file"
        );
    }
    tokio::fs::create_dir_all(out)
        .await
        .with_context(|| format!("failed to create {}", out.display()))?;
    Ok(received.save_to(out).await?)
}

/// Renders a session's events until the session is dropped.
fn spawn_printer(
    side: &'static str,
    events: Option<SessionEvents>,
) -> anyhow::Result<JoinHandle<()>> {
    let mut events = events.with_context(|| format!("{side} events already taken"))?;
    Ok(tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            render(side, &event);
        }
    }))
}

fn render(side: &str, event: &SessionEvent) {
    match event {
        SessionEvent::StateChanged(state) => tracing::debug!(side, ?state, "state changed"),
        SessionEvent::CodeAssigned(code) => println!("Pairing code: {code}"),
        SessionEvent::MetadataReceived(metadata) => {
            let mime = if metadata.mime_type.is_empty() {
                "unknown type"
            } else {
                metadata.mime_type.as_str()
            };
            println!(
                "Receiving {} ({}, {mime})",
                metadata.name,
                format_size(metadata.size)
            );
        }
        SessionEvent::Progress(progress) => println!(
            "{side} {:5.1}%  {}  {}",
            progress.percent,
            progress.label,
            progress.speed_label().unwrap_or_default()
        ),
        SessionEvent::Completed(_) => println!("{side} complete"),
        SessionEvent::Failed { message, .. } => eprintln!("{side} error: {message}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_local() {
        let cli = Cli::try_parse_from([
            "shata-cli",
            "send-local",
            "photo.jpg",
            "--out",
            "downloads",
            "--mime",
            "image/jpeg",
        ])
        .unwrap();
        match cli.command {
            Command::SendLocal {
                file,
                out,
                mime,
                config,
            } => {
                assert_eq!(file, PathBuf::from("photo.jpg"));
                assert_eq!(out, PathBuf::from("downloads"));
                assert_eq!(mime, "image/jpeg");
                assert!(config.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn send_local_requires_out() {
        assert!(Cli::try_parse_from(["shata-cli", "send-local", "photo.jpg"]).is_err());
    }

    #[tokio::test]
    async fn send_local_copies_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.bin");
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 256) as u8).collect();
        std::fs::write(&input, &data).unwrap();
        let out = dir.path().join("received");

        let path = send_local(&input, &out, "application/octet-stream", None)
            .await
            .unwrap();
        assert_eq!(path, out.join("input.bin"));
        assert_eq!(std::fs::read(path).unwrap(), data);
    }

    #[tokio::test]
    async fn send_local_reports_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let result = send_local(&dir.path().join("absent"), dir.path(), "", None).await;
        assert!(result.is_err());
    }
}

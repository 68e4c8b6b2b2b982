//! Speech synthesis daemon — Unix socket, line-delimited JSON.
//!
//! Keeps the generator and codec resident across requests. Each client
//! connection sends one JSON job line and receives one JSON envelope line,
//! then closes.
//!
//! # Socket path
//!
//! Default: `/tmp/maya-tts.sock`. Override with `--socket` or `TTS_SOCKET`.
//!
//! # Protocol
//!
//! **Job** (one JSON line):
//! ```json
//! {
//!   "id": "job-42",                                  // optional, default "unknown"
//!   "input": {
//!     "text": "Hello there <laugh> welcome back!",
//!     "voice_description": "Female, 30s, warm",     // optional
//!     "temperature": 0.7,                            // optional
//!     "max_new_tokens": 2000,                        // optional
//!     "upload_requested": true,                      // optional
//!     "upload_destination_id": "user123"             // required when uploading
//!   }
//! }
//! ```
//!
//! **Envelope on success** (one JSON line):
//! ```json
//! {"correlation_id": "job-42", "status": "COMPLETED", "audio_base64": "UklGR...",
//!  "sampling_rate": 24000, "duration": 2.39, "format": "wav", "content_type": "audio/wav"}
//! ```
//!
//! **Envelope on error** (one JSON line):
//! ```json
//! {"correlation_id": "job-42", "status": "FAILED", "error": "Text input is required"}
//! ```
//!
//! # Example (shell)
//!
//! ```sh
//! echo '{"id":"1","input":{"text":"Hi!"}}' | socat - UNIX-CONNECT:/tmp/maya-tts.sock
//! ```

use std::path::PathBuf;

use clap::Parser;
use maya_tts_rs::{
    config::{ModelSource, StorageConfig},
    manager::{ManagerConfig, SynthesisManager},
    pipeline::Job,
    response::ResponseEnvelope,
};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{UnixListener, UnixStream},
};

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "tts-daemon",
    about = "Speech synthesis daemon — resident models, Unix socket JSON interface"
)]
struct Args {
    /// Unix socket path to listen on.
    #[arg(long, env = "TTS_SOCKET", default_value = "/tmp/maya-tts.sock")]
    socket: PathBuf,

    /// CUDA device ordinal (0 = first GPU).
    #[arg(long, default_value_t = 0)]
    device: usize,

    /// HuggingFace repo of the speech LM.
    #[arg(long, env = "MODEL_NAME", default_value = "maya-research/maya1")]
    model: String,

    /// Jobs allowed to wait for the worker.
    #[arg(long, default_value_t = 64)]
    queue_depth: usize,
}

// ── Main ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    // Remove stale socket file if present.
    if args.socket.exists() {
        std::fs::remove_file(&args.socket)?;
    }

    // Bind the socket immediately so callers can connect right away.
    // Connections that arrive before loading completes wait in the backlog.
    let listener = UnixListener::bind(&args.socket)?;
    tracing::info!("Listening on {:?} (loading models...)", args.socket);

    let config = ManagerConfig {
        cuda_device: args.device,
        model: ModelSource {
            generator_repo: args.model,
            ..ModelSource::default()
        },
        storage: StorageConfig::from_env(),
        queue_depth: args.queue_depth,
    };
    let manager = SynthesisManager::start(config).await?;

    tracing::info!("Models ready");

    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let manager = manager.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, manager).await {
                        tracing::warn!("connection error: {e}");
                    }
                });
            }
            Err(e) => {
                tracing::error!("accept error: {e}");
            }
        }
    }
}

// ── Connection handler ────────────────────────────────────────────────────────

async fn handle_connection(stream: UnixStream, manager: SynthesisManager) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    // Read exactly one line (the JSON job).
    let line = match lines.next_line().await? {
        Some(l) if !l.trim().is_empty() => l,
        _ => {
            let response = ResponseEnvelope::failed("unknown", "empty request");
            send_response(&mut writer, &response).await?;
            return Ok(());
        }
    };

    let response = process_job(&line, &manager).await;
    send_response(&mut writer, &response).await?;
    Ok(())
}

async fn process_job(line: &str, manager: &SynthesisManager) -> ResponseEnvelope {
    let job: Job = match serde_json::from_str(line) {
        Ok(job) => job,
        Err(e) => {
            return ResponseEnvelope::failed(
                correlation_id_of(line),
                format!("invalid JSON request: {e}"),
            );
        }
    };

    let id = job.id.clone();
    tracing::info!(correlation_id = %id, chars = job.input.text.chars().count(), "job received");

    match manager.synthesize(job).await {
        Ok(envelope) => envelope,
        Err(ref e) if e.to_string().contains("manager has shut down") => {
            // The worker thread is gone. Exit so a supervisor can restart
            // the process and reload the models.
            tracing::error!("synthesis manager has shut down — exiting for restart");
            std::process::exit(1);
        }
        Err(e) => ResponseEnvelope::failed(id, e.to_string()),
    }
}

/// Best-effort `id` from a job line that did not parse as a [`Job`].
fn correlation_id_of(line: &str) -> String {
    serde_json::from_str::<serde_json::Value>(line)
        .ok()
        .and_then(|value| value.get("id")?.as_str().map(str::to_string))
        .unwrap_or_else(|| "unknown".into())
}

async fn send_response(
    writer: &mut tokio::net::unix::OwnedWriteHalf,
    response: &ResponseEnvelope,
) -> anyhow::Result<()> {
    let mut json = serde_json::to_string(response)?;
    json.push('\n');
    writer.write_all(json.as_bytes()).await?;
    Ok(())
}

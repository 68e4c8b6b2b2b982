//! Simple command-line client for the speech synthesis daemon.
//!
//! Connects to the Unix socket, sends a JSON job, waits for the envelope,
//! writes the decoded WAV and exits 0 on success or 1 on error.
//!
//! # Usage
//!
//! ```sh
//! tts-client \
//!   --text "Welcome to the show! <laugh> This is incredible." \
//!   --voice "Female, in her 30s with an American accent, energetic" \
//!   --output /tmp/welcome.wav
//!
//! # With storage upload:
//! tts-client --text "Saved to the cloud." --upload user123 --output /tmp/cloud.wav
//! ```

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, bail};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use clap::Parser;
use maya_tts_rs::{
    audio::read_wav_bytes,
    pipeline::{Job, SynthesisRequest},
    response::{Outcome, ResponseEnvelope, UploadReport},
};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::UnixStream,
    time::timeout,
};

#[derive(Parser)]
#[command(name = "tts-client", about = "Send a synthesis job to the TTS daemon")]
struct Args {
    /// Text to speak; inline tags like <laugh> or <sigh> are allowed
    #[arg(long)]
    text: String,

    /// Natural-language voice description
    #[arg(long, default_value = "neutral voice, clear speech")]
    voice: String,

    /// Sampling temperature
    #[arg(long, default_value_t = 0.7)]
    temperature: f64,

    /// Generation budget in tokens (7 tokens ≈ 85 ms of audio)
    #[arg(long, default_value_t = 2000)]
    max_new_tokens: usize,

    /// Upload the result to storage under this destination id
    #[arg(long)]
    upload: Option<String>,

    /// Correlation id (default: cli-<unix millis>)
    #[arg(long)]
    id: Option<String>,

    /// Where to write the WAV file
    #[arg(long)]
    output: Option<PathBuf>,

    /// Socket path
    #[arg(long, env = "TTS_SOCKET", default_value = "/tmp/maya-tts.sock")]
    socket: PathBuf,

    /// Timeout in seconds to wait for synthesis
    #[arg(long, default_value = "300")]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let id = args.id.unwrap_or_else(|| {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        format!("cli-{ts}")
    });
    let job = Job::new(
        id,
        SynthesisRequest {
            text: args.text,
            voice_description: args.voice,
            temperature: args.temperature,
            max_new_tokens: args.max_new_tokens,
            upload_requested: args.upload.is_some(),
            upload_destination_id: args.upload.unwrap_or_default(),
        },
    );

    let request_line = serde_json::to_string(&job)? + "\n";

    let stream = timeout(Duration::from_secs(10), UnixStream::connect(&args.socket))
        .await
        .context("timed out connecting to daemon socket")?
        .with_context(|| format!("failed to connect to {}", args.socket.display()))?;

    let (reader, mut writer) = stream.into_split();

    writer
        .write_all(request_line.as_bytes())
        .await
        .context("failed to send request")?;
    writer.flush().await?;
    // Signal EOF so the daemon knows we're done writing.
    drop(writer);

    let mut reader = BufReader::new(reader);
    let mut response_line = String::new();

    timeout(Duration::from_secs(args.timeout_secs), reader.read_line(&mut response_line))
        .await
        .context("timed out waiting for daemon response")?
        .context("failed to read response")?;

    if response_line.is_empty() {
        bail!("daemon closed connection without sending a response");
    }

    let envelope: ResponseEnvelope =
        serde_json::from_str(response_line.trim()).context("failed to parse daemon response")?;

    let output = match envelope.outcome {
        Outcome::Completed(output) => output,
        Outcome::Failed { error } => {
            bail!("synthesis failed ({}): {error}", envelope.correlation_id);
        }
    };

    let wav = STANDARD
        .decode(output.audio_base64.as_bytes())
        .context("audio_base64 is not valid base64")?;
    let (samples, sample_rate, _) = read_wav_bytes(&wav).context("payload is not a WAV file")?;
    eprintln!(
        "{}: {:.2}s of audio ({} samples at {sample_rate} Hz)",
        envelope.correlation_id,
        output.duration,
        samples.len()
    );

    match output.upload {
        Some(UploadReport::Stored { upload_url, .. }) => eprintln!("uploaded → {upload_url}"),
        Some(UploadReport::Failed { upload_error }) => eprintln!("upload failed: {upload_error}"),
        None => {}
    }

    if let Some(path) = args.output {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, &wav).with_context(|| format!("failed to write {}", path.display()))?;
        println!("{}", path.display());
    }

    Ok(())
}

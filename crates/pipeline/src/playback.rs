//! Local audio players

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use companion_core::{AudioPayload, AudioPlayer, PlaybackOutcome};

use crate::PipelineError;

/// Plays audio by piping it into an external player process
///
/// The default command is `mpv --no-terminal --really-quiet -`; any program
/// that reads the clip from stdin and exits when done will work. The child is
/// killed as soon as playback is cancelled.
#[derive(Debug, Clone)]
pub struct CommandPlayer {
    program: String,
    args: Vec<String>,
}

impl CommandPlayer {
    pub fn new(command: &[String]) -> Result<Self, PipelineError> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| PipelineError::Configuration("player command is empty".to_string()))?;

        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl AudioPlayer for CommandPlayer {
    async fn play(&self, audio: AudioPayload, cancel: CancellationToken) -> PlaybackOutcome {
        if cancel.is_cancelled() {
            return PlaybackOutcome::Stopped;
        }

        let mut child = match Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => return PlaybackOutcome::Failed(format!("failed to start {}: {}", self.program, e)),
        };

        let Some(mut stdin) = child.stdin.take() else {
            return PlaybackOutcome::Failed("player stdin unavailable".to_string());
        };

        // stdin is dropped at the end of the write so the player sees EOF
        let write = async move {
            stdin.write_all(&audio.data).await?;
            stdin.shutdown().await
        };

        let written = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = write => Some(result),
        };
        match written {
            None => {
                let _ = child.kill().await;
                return PlaybackOutcome::Stopped;
            },
            // players may exit before reading everything
            Some(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {},
            Some(Err(e)) => {
                let _ = child.kill().await;
                return PlaybackOutcome::Failed(format!("failed to write audio: {}", e));
            },
            Some(Ok(())) => {},
        }

        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            status = child.wait() => Some(status),
        };
        match status {
            None => {
                let _ = child.kill().await;
                tracing::debug!(program = %self.program, "Player killed");
                PlaybackOutcome::Stopped
            },
            Some(Ok(status)) if status.success() => PlaybackOutcome::Completed,
            Some(Ok(status)) => PlaybackOutcome::Failed(format!("{} exited with {}", self.program, status)),
            Some(Err(e)) => PlaybackOutcome::Failed(format!("failed to wait for {}: {}", self.program, e)),
        }
    }
}

/// Discards audio
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPlayer;

#[async_trait]
impl AudioPlayer for NullPlayer {
    async fn play(&self, _audio: AudioPayload, cancel: CancellationToken) -> PlaybackOutcome {
        if cancel.is_cancelled() {
            PlaybackOutcome::Stopped
        } else {
            PlaybackOutcome::Completed
        }
    }
}

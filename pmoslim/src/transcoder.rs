//! Transcodeur externe (ffmpeg)
//!
//! Le processus lit l'URL de la source et écrit du PCM brut sur sa sortie
//! standard, recopiée dans le relais audio. L'annulation tue le processus
//! et attend sa fin : aucun zombie ne reste derrière une piste abandonnée.

use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, SlimError};
use crate::relay::RelayWriter;

const READ_CHUNK: usize = 16 * 1024;

/// Arguments ffmpeg : PCM 16 bits little-endian, stéréo, sur stdout
pub fn ffmpeg_args(url: &str, sample_rate: u32) -> Vec<String> {
    let rate = sample_rate.to_string();
    [
        "-reconnect",
        "1",
        "-reconnect_streamed",
        "1",
        "-reconnect_delay_max",
        "5",
        "-i",
        url,
        "-f",
        "s16le",
        "-ar",
        rate.as_str(),
        "-ac",
        "2",
        "-loglevel",
        "warning",
        "-vn",
        "-",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

pub struct Transcoder {
    task: JoinHandle<()>,
    token: CancellationToken,
}

impl Transcoder {
    /// Lance `program` et recopie sa sortie dans `writer` jusqu'à la fin
    /// du processus, l'annulation de `token` ou le remplacement du relais.
    pub fn spawn(
        program: &str,
        args: &[String],
        writer: RelayWriter,
        token: CancellationToken,
    ) -> Result<Self> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SlimError::Transcoder(format!("cannot start {}: {}", program, e)))?;

        let pid = child.id();
        info!(program, ?pid, "🎚️ transcoder started");

        let task_token = token.clone();
        let task = tokio::spawn(async move {
            pump(&mut child, writer, task_token).await;
            reap(&mut child).await;
        });

        Ok(Self { task, token })
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Attend l'arrêt complet du processus.
    #[cfg(test)]
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!("transcoder task failed: {}", e);
        }
    }
}

async fn pump(child: &mut Child, writer: RelayWriter, token: CancellationToken) {
    let Some(mut stdout) = child.stdout.take() else {
        warn!("transcoder has no stdout");
        return;
    };
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                debug!("transcoder cancelled");
                return;
            }
            read = stdout.read(&mut buf) => match read {
                Ok(0) => {
                    debug!("transcoder output ended");
                    return;
                }
                Ok(n) => {
                    if !writer.write(&buf[..n]) {
                        debug!("relay moved on, dropping transcoder output");
                        return;
                    }
                }
                Err(e) => {
                    warn!("transcoder read failed: {}", e);
                    return;
                }
            }
        }
    }
}

async fn reap(child: &mut Child) {
    match child.try_wait() {
        Ok(Some(status)) => debug!(%status, "transcoder exited"),
        _ => {
            if let Err(e) = child.kill().await {
                warn!("cannot kill transcoder: {}", e);
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::relay::AudioRelay;
    use std::time::Duration;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".into(), script.into()]
    }

    #[test]
    fn test_ffmpeg_args() {
        let args = ffmpeg_args("http://src", 48_000);
        assert_eq!(args[7], "http://src");
        assert!(args.windows(2).any(|w| w[0] == "-f" && w[1] == "s16le"));
        assert!(args.windows(2).any(|w| w[0] == "-ar" && w[1] == "48000"));
        assert_eq!(args.last().map(String::as_str), Some("-"));
    }

    #[tokio::test]
    async fn test_output_lands_in_relay() {
        let relay = AudioRelay::new();
        let transcoder =
            Transcoder::spawn("sh", &sh("printf hello"), relay.reset(), CancellationToken::new())
                .unwrap();
        transcoder.join().await;

        let mut buf = [0u8; 16];
        let n = relay.read(&mut buf);
        assert_eq!(&buf[..n], b"hello");
    }

    #[tokio::test]
    async fn test_cancel_kills_process() {
        let relay = AudioRelay::new();
        let token = CancellationToken::new();
        let transcoder = Transcoder::spawn("sh", &sh("sleep 30"), relay.reset(), token.clone())
            .unwrap();
        assert!(!transcoder.is_finished());

        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), transcoder.join())
            .await
            .expect("transcoder must stop once cancelled");
    }

    #[tokio::test]
    async fn test_missing_program_is_an_error() {
        let relay = AudioRelay::new();
        let result = Transcoder::spawn(
            "/nonexistent/ffmpeg",
            &[],
            relay.reset(),
            CancellationToken::new(),
        );
        assert!(matches!(result, Err(SlimError::Transcoder(_))));
    }
}

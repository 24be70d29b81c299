//! Accepts TCP connections, spawns one task per session, and serializes
//! access to the shared model, mirroring the reference's one-task-per-
//! pipeline-stage convention and its single in-flight-call-per-session
//! invariant.

use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{error, info, warn};

use stt_core::session::{finalize_on_close, run_cycle, SessionState, SharedTranscriber};
use stt_foundation::error::{RecoveryStrategy, ServerError, TransportError};
use stt_telemetry::SessionMetrics;

use crate::config::ServerSettings;
use crate::wire::{read_audio_chunk, write_result};

/// Send timeout mirroring the reference's `SEND_TIMEOUT`: a slow consumer
/// gets its result dropped and counted rather than blocking the session.
const SEND_TIMEOUT: Duration = Duration::from_secs(2);

pub async fn run(
    settings: ServerSettings,
    transcriber: SharedTranscriber,
    shutdown: stt_foundation::shutdown::ShutdownGuard,
) -> Result<(), ServerError> {
    let addr = format!("{}:{}", settings.listen_address, settings.port);
    let listener = TcpListener::bind(&addr).await.map_err(ServerError::from)?;
    info!(%addr, "listening for sessions");

    let mut session_tasks = tokio::task::JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.wait() => {
                info!("shutdown requested, no longer accepting new sessions");
                break;
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };
                info!(%peer, "session connected");
                let transcriber = transcriber.clone();
                let shutdown = shutdown.clone();
                session_tasks.spawn(async move {
                    if let Err(e) = handle_session(stream, transcriber).await {
                        let server_err = ServerError::from(e);
                        warn!(%peer, error = %server_err, "session ended with error");
                        if matches!(server_err.recovery_strategy(), RecoveryStrategy::Fatal) {
                            error!(%peer, "unrecoverable session error, requesting shutdown");
                            shutdown.request_shutdown();
                        }
                    }
                });
            }
        }
    }

    info!(drain_secs = settings.drain_timeout_secs, "draining in-flight sessions");
    let drain = Duration::from_secs(settings.drain_timeout_secs);
    let _ = timeout(drain, async {
        while session_tasks.join_next().await.is_some() {}
    })
    .await;
    session_tasks.shutdown().await;

    info!("shutdown complete");
    Ok(())
}

async fn handle_session(
    mut stream: TcpStream,
    transcriber: SharedTranscriber,
) -> Result<(), TransportError> {
    let mut session = SessionState::new();
    let metrics = SessionMetrics::new();
    let (mut reader, mut writer) = stream.split();

    loop {
        let chunk = match read_audio_chunk(&mut reader).await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(TransportError::MalformedFrame(reason)) => {
                warn!(reason, "terminating session after malformed frame");
                return Err(TransportError::MalformedFrame(reason));
            }
            Err(e) => return Err(e),
        };

        let should_analyze = session.ingest_chunk(&chunk, &metrics);
        if !should_analyze {
            continue;
        }

        let model = transcriber.lock().await;
        let results = run_cycle(&mut session, model.as_ref(), &metrics).await;
        drop(model);

        for result in results {
            send_result(&mut writer, &result, &metrics).await;
        }
    }

    let model = transcriber.lock().await;
    let final_results = finalize_on_close(&mut session, model.as_ref(), &metrics).await;
    drop(model);
    for result in final_results {
        send_result(&mut writer, &result, &metrics).await;
    }

    info!(
        chunks_in = metrics.chunks_in.load(std::sync::atomic::Ordering::Relaxed),
        finals_out = metrics.finals_out.load(std::sync::atomic::Ordering::Relaxed),
        partials_out = metrics.partials_out.load(std::sync::atomic::Ordering::Relaxed),
        "session closed"
    );
    Ok(())
}

async fn send_result(
    writer: &mut tokio::net::tcp::WriteHalf<'_>,
    result: &stt_core::types::TranscriptionResult,
    _metrics: &SessionMetrics,
) {
    // finals_out/partials_out are counted where the decision engine produces
    // the result, not here; a slow or dropped send still happened logically.
    match timeout(SEND_TIMEOUT, write_result(writer, result)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "failed to write result to client"),
        Err(_) => error!("send timed out, result dropped"),
    }
}

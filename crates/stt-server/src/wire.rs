//! Length-prefixed JSON framing over TCP: one connection per session.
//!
//! Frames are a 4-byte little-endian length prefix followed by a JSON body.
//! Audio payloads are base64-encoded inside the JSON body, which keeps the
//! wire format dependency-light and trivially portable to a binary framing
//! later (protocol-buffer codegen is out of scope for this service).

use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use stt_core::types::{AudioChunk, TranscriptionResult};
use stt_foundation::error::TransportError;

/// Generous but finite: guards against a malicious or corrupt length
/// prefix turning one frame into an unbounded allocation.
const MAX_FRAME_BYTES: u32 = 64 * 1024 * 1024;

#[derive(Debug, Serialize, Deserialize)]
struct WireAudioChunk {
    data: String,
    sample_rate: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireTranscriptionResult {
    text: String,
    is_final: bool,
    start_time: f64,
}

/// Reads one inbound `AudioChunk` frame, or `Ok(None)` on clean EOF.
pub async fn read_audio_chunk<R>(reader: &mut R) -> Result<Option<AudioChunk>, TransportError>
where
    R: AsyncRead + Unpin,
{
    let Some(body) = read_frame(reader).await? else {
        return Ok(None);
    };
    let wire: WireAudioChunk = serde_json::from_slice(&body)
        .map_err(|e| TransportError::MalformedFrame(format!("invalid AudioChunk JSON: {e}")))?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(wire.data)
        .map_err(|e| TransportError::MalformedFrame(format!("invalid base64 audio payload: {e}")))?;
    if bytes.len() % 4 != 0 {
        return Err(TransportError::MalformedFrame(
            "audio payload length is not a multiple of 4 bytes".to_string(),
        ));
    }
    let data = bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    Ok(Some(AudioChunk { data, sample_rate: wire.sample_rate }))
}

/// Writes one outbound `TranscriptionResult` frame.
pub async fn write_result<W>(writer: &mut W, result: &TranscriptionResult) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let wire = WireTranscriptionResult {
        text: result.text.clone(),
        is_final: result.is_final,
        start_time: result.start_time,
    };
    let body = serde_json::to_vec(&wire)
        .map_err(|e| TransportError::MalformedFrame(format!("failed to encode result: {e}")))?;
    write_frame(writer, &body).await
}

async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(TransportError::Io(e)),
    }
    let len = u32::from_le_bytes(len_bytes);
    if len > MAX_FRAME_BYTES {
        return Err(TransportError::MalformedFrame(format!(
            "frame length {len} exceeds the {MAX_FRAME_BYTES}-byte cap"
        )));
    }
    let mut body = vec![0u8; len as usize];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|e| TransportError::MalformedFrame(format!("truncated frame body: {e}")))?;
    Ok(Some(body))
}

async fn write_frame<W>(writer: &mut W, body: &[u8]) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let len = u32::try_from(body.len())
        .map_err(|_| TransportError::MalformedFrame("frame body too large to encode".to_string()))?;
    writer.write_all(&len.to_le_bytes()).await.map_err(TransportError::Io)?;
    writer.write_all(body).await.map_err(TransportError::Io)?;
    writer.flush().await.map_err(TransportError::Io)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn round_trips_an_audio_chunk() {
        let samples: Vec<f32> = vec![0.1, -0.2, 0.3];
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let wire = WireAudioChunk {
            data: base64::engine::general_purpose::STANDARD.encode(&bytes),
            sample_rate: 16000,
        };
        let body = serde_json::to_vec(&wire).unwrap();
        let mut framed = Vec::new();
        framed.extend_from_slice(&(body.len() as u32).to_le_bytes());
        framed.extend_from_slice(&body);

        let mut cursor = Cursor::new(framed);
        let chunk = read_audio_chunk(&mut cursor).await.unwrap().unwrap();
        assert_eq!(chunk.sample_rate, 16000);
        assert!((chunk.data[0] - 0.1).abs() < 1e-6);
    }

    #[tokio::test]
    async fn read_returns_none_on_clean_eof() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        assert!(read_audio_chunk(&mut cursor).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejects_oversized_length_prefix() {
        let mut framed = Vec::new();
        framed.extend_from_slice(&(MAX_FRAME_BYTES + 1).to_le_bytes());
        let mut cursor = Cursor::new(framed);
        assert!(read_audio_chunk(&mut cursor).await.is_err());
    }

    #[tokio::test]
    async fn writes_a_well_formed_result_frame() {
        let mut buf = Vec::new();
        let result = TranscriptionResult { text: "hi".to_string(), is_final: true, start_time: 1.5 };
        write_result(&mut buf, &result).await.unwrap();

        let mut cursor = Cursor::new(buf);
        let mut len_bytes = [0u8; 4];
        cursor.read_exact(&mut len_bytes).await.unwrap();
        let len = u32::from_le_bytes(len_bytes) as usize;
        let mut body = vec![0u8; len];
        cursor.read_exact(&mut body).await.unwrap();
        let wire: WireTranscriptionResult = serde_json::from_slice(&body).unwrap();
        assert_eq!(wire.text, "hi");
        assert!(wire.is_final);
    }
}

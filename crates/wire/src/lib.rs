// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job payload wire format (spec §6): a self-delimited, length-prefixed
//! byte framing used wherever a job is written across an I/O boundary —
//! the store backends serialize through this so both the in-memory and
//! Redis implementations agree on one byte layout.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload.

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use wq_core::Job;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame exceeds max size: {0} > {1}")]
    FrameTooLarge(usize, usize),
}

/// Largest single frame this codec will accept, guarding against a
/// corrupt length prefix turning into an unbounded allocation.
pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// Encode a job to raw JSON bytes (no length prefix).
pub fn encode(job: &Job) -> Result<Vec<u8>, WireError> {
    Ok(serde_json::to_vec(job)?)
}

/// Decode a job from raw JSON bytes.
///
/// A decode failure is the spec's "payload error" (poison pill): callers
/// must not retry the same bytes, only log and drop (spec §4.3/§7).
pub fn decode(bytes: &[u8]) -> Result<Job, WireError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Write a length-prefixed frame: 4-byte big-endian length + raw bytes.
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    data: &[u8],
) -> Result<(), WireError> {
    if data.len() > MAX_FRAME_BYTES {
        return Err(WireError::FrameTooLarge(data.len(), MAX_FRAME_BYTES));
    }
    writer.write_all(&(data.len() as u32).to_be_bytes()).await?;
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a length-prefixed frame written by [`write_message`].
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, WireError> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(WireError::FrameTooLarge(len, MAX_FRAME_BYTES));
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Write a job as a length-prefixed JSON frame.
pub async fn write_job<W: AsyncWrite + Unpin>(writer: &mut W, job: &Job) -> Result<(), WireError> {
    write_message(writer, &encode(job)?).await
}

/// Read a length-prefixed JSON frame and decode it as a job.
pub async fn read_job<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Job, WireError> {
    let bytes = read_message(reader).await?;
    decode(&bytes)
}

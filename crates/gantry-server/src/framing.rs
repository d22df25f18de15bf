//! Reading and writing whole frames on a byte stream.
//!
//! A frame is the encoded packet produced by [`gantry_core::wire::encode`]:
//! a u32 little-endian size followed by exactly `size` bytes. The size does
//! not count its own four bytes.

use gantry_core::wire::SIZE_LEN;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Errors that can occur while moving frames over a stream.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The stream ended, either between frames or part way through one.
    #[error("connection closed")]
    Closed,

    /// The declared size exceeds the configured maximum.
    #[error("frame size {size} exceeds maximum {max}")]
    TooLarge { size: u32, max: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn map_eof(e: std::io::Error) -> FrameError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        FrameError::Closed
    } else {
        FrameError::Io(e)
    }
}

/// Read one frame and return the bytes after the size prefix.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_frame_bytes: u32,
) -> Result<Vec<u8>, FrameError> {
    let mut prefix = [0u8; SIZE_LEN];
    reader.read_exact(&mut prefix).await.map_err(map_eof)?;

    let size = u32::from_le_bytes(prefix);
    if size > max_frame_bytes {
        return Err(FrameError::TooLarge {
            size,
            max: max_frame_bytes,
        });
    }

    let mut content = vec![0u8; size as usize];
    if size > 0 {
        reader.read_exact(&mut content).await.map_err(map_eof)?;
    }
    Ok(content)
}

/// Write an already-encoded frame.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &[u8],
) -> Result<(), FrameError> {
    writer.write_all(frame).await?;
    writer.flush().await?;
    Ok(())
}

//! Exact-length send and receive over a byte stream.
//!
//! TCP keeps no message boundaries and a single read or write may move
//! fewer bytes than asked. Every exchange with the aggregator goes through
//! these primitives, which loop until the full count has moved or the
//! stream fails. A peer that closes early is an error, never a short buffer.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use lottery_core::wire::ACK_LEN;

/// Write all of `buf`, looping on partial writes, then flush.
pub async fn send_all<W>(writer: &mut W, buf: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut written = 0;
    while written < buf.len() {
        let n = writer.write(&buf[written..]).await?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("peer stopped accepting data after {written} of {} bytes", buf.len()),
            ));
        }
        written += n;
    }
    writer.flush().await
}

/// Fill `buf` completely, looping on short reads.
pub async fn recv_into<R>(reader: &mut R, buf: &mut [u8]) -> io::Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("peer closed after {filled} of {} bytes", buf.len()),
            ));
        }
        filled += n;
    }
    Ok(())
}

/// Read exactly `n` bytes.
pub async fn recv_exact<R>(reader: &mut R, n: usize) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = vec![0u8; n];
    recv_into(reader, &mut buf).await?;
    Ok(buf)
}

/// Read a big-endian u32.
pub async fn recv_u32<R>(reader: &mut R) -> io::Result<u32>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut raw = [0u8; 4];
    recv_into(reader, &mut raw).await?;
    Ok(u32::from_be_bytes(raw))
}

/// Read a 2-byte acknowledgement.
pub async fn recv_ack<R>(reader: &mut R) -> io::Result<[u8; ACK_LEN]>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut ack = [0u8; ACK_LEN];
    recv_into(reader, &mut ack).await?;
    Ok(ack)
}

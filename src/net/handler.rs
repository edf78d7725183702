//! Per-connection session: line reader, writer task, cleanup

use std::net::SocketAddr;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::GameMatch;
use crate::util::rate_limit::PlayerRateLimiter;

use super::hub::Registration;
use super::protocol::{ClientMsg, ProtocolError, ServerMsg};

/// Longest inbound line accepted, excluding the newline
pub const MAX_LINE_BYTES: usize = 1024;

/// Fresh connection id, `PLAYER_` plus 8 hex digits
pub fn new_connection_id() -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("PLAYER_{}", &uuid[..8])
}

/// Drive one accepted connection until the peer leaves or the socket fails
pub async fn handle_connection(mut stream: TcpStream, peer: SocketAddr, state: AppState) {
    let conn_id = new_connection_id();

    let Some(Registration { outbound, evicted }) = state.hub.try_register(&conn_id, state.config.max_players) else {
        warn!(peer = %peer, max_players = state.config.max_players, "Server full, rejecting connection");
        let notice = format!(
            "{}\n",
            ServerMsg::System {
                text: "Server is full".to_string()
            }
        );
        let _ = stream.write_all(notice.as_bytes()).await;
        let _ = stream.shutdown().await;
        return;
    };

    info!(conn_id = %conn_id, peer = %peer, connections = state.hub.len(), "New connection");

    let (reader, writer) = stream.into_split();
    let writer_handle = tokio::spawn(write_lines(conn_id.clone(), writer, outbound));

    tokio::select! {
        result = read_lines(&conn_id, reader, &state.game) => {
            if let Err(e) = result {
                debug!(conn_id = %conn_id, error = %e, "Connection read failed");
            }
        }
        _ = evicted.notified() => {
            warn!(conn_id = %conn_id, "Dropping connection that stopped reading");
        }
    }

    // Unregister first so the departure broadcasts skip this socket
    state.hub.unregister(&conn_id);
    state.game.leave(&conn_id);
    writer_handle.abort();

    info!(conn_id = %conn_id, "Connection closed");
}

/// Reader loop: socket lines -> match
///
/// Malformed lines are logged and dropped, the connection stays open.
/// Lines longer than `MAX_LINE_BYTES` are skipped without being buffered
/// whole. Bytes that are not UTF-8 are replaced rather than treated as a
/// failure.
pub async fn read_lines<R>(conn_id: &str, reader: R, game: &GameMatch) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let rate_limiter = PlayerRateLimiter::new();
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(MAX_LINE_BYTES + 1);

    loop {
        buf.clear();
        let n = (&mut reader)
            .take(MAX_LINE_BYTES as u64 + 1)
            .read_until(b'\n', &mut buf)
            .await?;
        if n == 0 {
            debug!(conn_id = %conn_id, "Peer closed the stream");
            return Ok(());
        }

        if buf.len() > MAX_LINE_BYTES && buf.last() != Some(&b'\n') {
            let skipped = n + skip_line(&mut reader).await?;
            warn!(conn_id = %conn_id, bytes = skipped, max = MAX_LINE_BYTES, "Dropped oversized line");
            continue;
        }

        if !rate_limiter.check_input() {
            warn!(conn_id = %conn_id, "Rate limited input line");
            continue;
        }

        let line = String::from_utf8_lossy(&buf);
        match line.parse::<ClientMsg>() {
            Ok(ClientMsg::Leave) => {
                info!(conn_id = %conn_id, "Client requested disconnect");
                return Ok(());
            }
            Ok(msg) => game.handle(conn_id, msg),
            Err(ProtocolError::Empty) => {}
            Err(e) => {
                warn!(conn_id = %conn_id, error = %e, line = %line.trim_end(), "Failed to parse client line");
            }
        }
    }
}

/// Consume the rest of the current line straight out of the read buffer.
/// Returns the number of bytes discarded.
async fn skip_line<R>(reader: &mut R) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut skipped = 0;
    loop {
        let chunk = reader.fill_buf().await?;
        if chunk.is_empty() {
            return Ok(skipped);
        }
        match chunk.iter().position(|b| *b == b'\n') {
            Some(end) => {
                reader.consume(end + 1);
                return Ok(skipped + end + 1);
            }
            None => {
                let len = chunk.len();
                reader.consume(len);
                skipped += len;
            }
        }
    }
}

/// Writer task: outbound channel -> socket, one line per message
pub async fn write_lines<W>(conn_id: String, mut writer: W, mut outbound: mpsc::Receiver<String>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(mut line) = outbound.recv().await {
        line.push('\n');
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            debug!(conn_id = %conn_id, error = %e, "Socket write failed");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatchTimings;
    use crate::net::hub::BroadcastHub;
    use std::sync::Arc;
    use tokio::io::duplex;

    #[test]
    fn connection_ids_are_prefixed_hex() {
        let id = new_connection_id();
        assert_eq!(id.len(), "PLAYER_".len() + 8);
        assert!(id.starts_with("PLAYER_"));
        assert!(id[7..].chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, new_connection_id());
    }

    #[tokio::test]
    async fn malformed_lines_do_not_end_the_session() {
        let hub = Arc::new(BroadcastHub::new());
        let mut inbox = hub.try_register("P1", 4).unwrap().outbound;
        let game = GameMatch::new(hub.clone(), MatchTimings::default(), 1);

        let (mut client, server) = duplex(1024);
        client
            .write_all(b"JOIN:alice\nMOVE:abc:1\nFLY:1:2\n\xff\xfe\n\nCHAT:hi\r\nLEAVE\n")
            .await
            .unwrap();
        read_lines("P1", server, &game).await.unwrap();

        assert!(game.players().contains("P1"));
        let mut lines = Vec::new();
        while let Ok(line) = inbox.try_recv() {
            lines.push(line);
        }
        assert_eq!(lines.first().unwrap(), "JOINED:P1");
        assert_eq!(lines.last().unwrap(), "CHAT:alice: hi");
    }

    #[tokio::test]
    async fn writer_terminates_lines() {
        let (tx, rx) = mpsc::channel(4);
        tx.try_send("GAME_RESET".to_string()).unwrap();
        tx.try_send("ALL_SELECTED".to_string()).unwrap();
        drop(tx);

        let socket = tokio_test::io::Builder::new()
            .write(b"GAME_RESET\n")
            .write(b"ALL_SELECTED\n")
            .build();
        write_lines("P1".into(), socket, rx).await;
    }

    #[tokio::test]
    async fn oversized_lines_are_skipped_not_dispatched() {
        let hub = Arc::new(BroadcastHub::new());
        let mut inbox = hub.try_register("P1", 4).unwrap().outbound;
        let game = GameMatch::new(hub.clone(), MatchTimings::default(), 1);

        let mut input = b"JOIN:alice\nCHAT:".to_vec();
        input.extend(std::iter::repeat(b'x').take(64 * 1024));
        input.extend_from_slice(b"\nCHAT:");
        input.extend(std::iter::repeat(b'y').take(MAX_LINE_BYTES - "CHAT:".len()));
        input.extend_from_slice(b"\nCHAT:after\nLEAVE\n");

        let (mut client, server) = duplex(256 * 1024);
        client.write_all(&input).await.unwrap();
        read_lines("P1", server, &game).await.unwrap();

        let mut chats = Vec::new();
        while let Ok(line) = inbox.try_recv() {
            assert!(!line.contains("xxxx"));
            if line.starts_with("CHAT:") {
                chats.push(line);
            }
        }
        assert_eq!(chats.len(), 2);
        assert_eq!(chats[0].len(), "CHAT:alice: ".len() + MAX_LINE_BYTES - "CHAT:".len());
        assert_eq!(chats[1], "CHAT:alice: after");
    }

    #[tokio::test]
    async fn unterminated_flood_is_not_buffered() {
        let hub = Arc::new(BroadcastHub::new());
        let mut inbox = hub.try_register("P1", 4).unwrap().outbound;
        let game = GameMatch::new(hub.clone(), MatchTimings::default(), 1);

        let mut input = b"JOIN:alice\nCHAT:".to_vec();
        input.extend(std::iter::repeat(b'z').take(32 * 1024));

        let (mut client, server) = duplex(64 * 1024);
        client.write_all(&input).await.unwrap();
        drop(client);
        read_lines("P1", server, &game).await.unwrap();

        while let Ok(line) = inbox.try_recv() {
            assert!(!line.starts_with("CHAT:"));
        }
    }
}

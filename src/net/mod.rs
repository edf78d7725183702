//! Game listener: newline-delimited text protocol over TCP

pub mod handler;
pub mod hub;
pub mod protocol;

use std::future::Future;

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::app::AppState;

/// Accept connections until `shutdown` resolves. Each connection runs in its
/// own task.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        warn!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
                    }
                    tokio::spawn(handler::handle_connection(stream, peer, state.clone()));
                }
                Err(e) => {
                    warn!(error = %e, "Accept failed");
                }
            },
            _ = &mut shutdown => {
                info!("Game listener stopping");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, MatchTimings};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
    use tokio::net::tcp::OwnedReadHalf;
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    fn test_config(max_players: usize) -> Config {
        Config {
            server_addr: "127.0.0.1:0".parse().unwrap(),
            http_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "debug".into(),
            max_players,
            match_seed: Some(7),
            timings: MatchTimings::default(),
        }
    }

    async fn spawn_server(max_players: usize) -> (std::net::SocketAddr, oneshot::Sender<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = AppState::new(test_config(max_players));
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        tokio::spawn(serve(listener, state, async {
            let _ = stop_rx.await;
        }));
        (addr, stop_tx)
    }

    async fn connect(addr: std::net::SocketAddr) -> (Lines<BufReader<OwnedReadHalf>>, tokio::net::tcp::OwnedWriteHalf) {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, writer) = stream.into_split();
        (BufReader::new(reader).lines(), writer)
    }

    async fn next_matching(lines: &mut Lines<BufReader<OwnedReadHalf>>, prefix: &str) -> String {
        loop {
            let line = lines.next_line().await.unwrap().expect("stream closed");
            if line.starts_with(prefix) {
                return line;
            }
        }
    }

    #[tokio::test]
    async fn two_clients_share_a_lobby() {
        let (addr, _stop) = spawn_server(4).await;

        let (mut alice_in, mut alice_out) = connect(addr).await;
        alice_out.write_all(b"JOIN:alice\n").await.unwrap();
        let joined = next_matching(&mut alice_in, "JOINED:").await;
        assert!(joined.starts_with("JOINED:PLAYER_"));

        let (mut bob_in, mut bob_out) = connect(addr).await;
        bob_out.write_all(b"JOIN:bob\n").await.unwrap();
        assert_eq!(next_matching(&mut alice_in, "PLAYER_LIST:").await, "PLAYER_LIST:alice");
        assert_eq!(next_matching(&mut alice_in, "PLAYER_LIST:").await, "PLAYER_LIST:alice,bob");

        bob_out.write_all(b"MOVE:nope\nCHAT:hello\n").await.unwrap();
        assert_eq!(next_matching(&mut alice_in, "CHAT:").await, "CHAT:bob: hello");
        assert_eq!(next_matching(&mut bob_in, "CHAT:").await, "CHAT:bob: hello");

        bob_out.write_all(b"LEAVE\n").await.unwrap();
        assert_eq!(next_matching(&mut alice_in, "PLAYER_LIST:").await, "PLAYER_LIST:alice");
    }

    #[tokio::test]
    async fn connections_beyond_capacity_are_refused() {
        let (addr, _stop) = spawn_server(1).await;

        let (mut first_in, mut first_out) = connect(addr).await;
        first_out.write_all(b"JOIN:first\n").await.unwrap();
        next_matching(&mut first_in, "JOINED:").await;

        let (mut second_in, _second_out) = connect(addr).await;
        assert_eq!(
            second_in.next_line().await.unwrap().as_deref(),
            Some("SYSTEM:Server is full")
        );
        assert_eq!(second_in.next_line().await.unwrap(), None);
    }
}

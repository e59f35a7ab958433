//! koko terminal channel transport
//!
//! Opens the WebSocket with the web session's cookies and adapts it to a
//! typed frame sink/stream pair for [`run_session`].

use std::pin::Pin;

use futures_util::{future, Sink, SinkExt, Stream, StreamExt};
use reqwest::Url;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::COOKIE;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};

use super::error::TerminalError;
#[cfg(unix)]
use super::multiplexer::run_session;
use super::protocol::ChannelMessage;
use crate::bastion::BastionSession;
#[cfg(unix)]
use crate::bastion::{Asset, RemoteIdentity};

const TERMINAL_PATH: &str = "/koko/ws/terminal/";

pub type FrameSink = Pin<Box<dyn Sink<ChannelMessage, Error = TerminalError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<ChannelMessage, TerminalError>> + Send>>;

/// Terminal channel URL for an asset/system-user pair on `endpoint`.
pub fn terminal_url(
    endpoint: &Url,
    asset_id: &str,
    identity_id: &str,
) -> Result<Url, TerminalError> {
    let scheme = match endpoint.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => {
            return Err(TerminalError::InvalidUrl(format!(
                "unsupported scheme {}",
                other
            )))
        }
    };
    let host = endpoint
        .host_str()
        .ok_or_else(|| TerminalError::InvalidUrl(format!("{}: missing host", endpoint)))?;
    let authority = match endpoint.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };

    let mut url = Url::parse(&format!("{}://{}{}", scheme, authority, TERMINAL_PATH))
        .map_err(|e| TerminalError::InvalidUrl(e.to_string()))?;
    url.query_pairs_mut()
        .append_pair("target_id", asset_id)
        .append_pair("type", "asset")
        .append_pair("system_user_id", identity_id);
    Ok(url)
}

/// Open the terminal channel for `asset_id` as `identity_id`.
///
/// WebSocket control frames are handled by the transport and never surface
/// on the returned stream.
pub async fn connect_terminal(
    session: &BastionSession,
    asset_id: &str,
    identity_id: &str,
) -> Result<(FrameSink, FrameStream), TerminalError> {
    let url = terminal_url(session.endpoint(), asset_id, identity_id)?;
    let mut request = url.as_str().into_client_request()?;
    if let Some(cookie) = session.cookie_header() {
        let value = HeaderValue::from_bytes(cookie.as_bytes())
            .map_err(|e| TerminalError::Protocol(format!("invalid cookie header: {}", e)))?;
        request.headers_mut().insert(COOKIE, value);
    }

    debug!("Opening terminal channel {}", url);
    let (ws_stream, response) = tokio_tungstenite::connect_async(request).await?;
    info!(
        "Terminal channel established (HTTP {})",
        response.status().as_u16()
    );

    let (write, read) = ws_stream.split();

    let sink = write.with(|frame: ChannelMessage| {
        future::ready(frame.encode().map(Message::Text))
    });

    let frames = read.filter_map(|message| {
        future::ready(match message {
            Ok(Message::Text(text)) => Some(ChannelMessage::decode(&text)),
            Ok(Message::Binary(bytes)) => Some(
                std::str::from_utf8(&bytes)
                    .map_err(|e| TerminalError::Protocol(format!("non-UTF-8 frame: {}", e)))
                    .and_then(ChannelMessage::decode),
            ),
            Ok(_) => None,
            Err(e) => Some(Err(e.into())),
        })
    });

    Ok((Box::pin(sink), Box::pin(frames)))
}

/// Attach this process's terminal to `asset` as `identity` until the remote
/// side closes the channel.
#[cfg(unix)]
pub async fn connect_asset(
    session: &BastionSession,
    asset: &Asset,
    identity: &RemoteIdentity,
) -> Result<(), TerminalError> {
    let (sink, frames) = connect_terminal(session, &asset.id, &identity.id).await?;
    let terminal = super::local::StdTerminal::new()?;
    run_session(terminal, sink, frames).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::protocol::{MessageType, TerminalGeometry};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    #[test]
    fn test_terminal_url_https() {
        let endpoint = Url::parse("https://jump.example.com").unwrap();
        let url = terminal_url(&endpoint, "a1", "su1").unwrap();
        assert_eq!(
            url.as_str(),
            "wss://jump.example.com/koko/ws/terminal/?target_id=a1&type=asset&system_user_id=su1"
        );
    }

    #[test]
    fn test_terminal_url_keeps_port() {
        let endpoint = Url::parse("http://10.0.0.5:8080/").unwrap();
        let url = terminal_url(&endpoint, "a1", "su1").unwrap();
        assert_eq!(url.scheme(), "ws");
        assert_eq!(url.port(), Some(8080));
        assert_eq!(url.path(), TERMINAL_PATH);
    }

    #[test]
    fn test_terminal_url_rejects_other_schemes() {
        let endpoint = Url::parse("ftp://jump.example.com").unwrap();
        assert!(matches!(
            terminal_url(&endpoint, "a1", "su1"),
            Err(TerminalError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_channel_frames_round_trip_through_websocket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (uri_tx, uri_rx) = oneshot::channel();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_hdr_async(
                tcp,
                move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                    let _ = uri_tx.send(req.uri().to_string());
                    Ok(resp)
                },
            )
            .await
            .unwrap();

            ws.send(Message::Ping(vec![1, 2, 3])).await.unwrap();
            ws.send(Message::Text(
                r#"{"id":"abc","type":"CONNECT","data":""}"#.to_string(),
            ))
            .await
            .unwrap();

            loop {
                match ws.next().await {
                    Some(Ok(Message::Text(text))) => return text,
                    Some(Ok(_)) => continue,
                    other => panic!("unexpected client message: {:?}", other),
                }
            }
        });

        let session = BastionSession::new(&format!("http://{}", addr)).unwrap();
        let (mut sink, mut frames) = connect_terminal(&session, "a1", "su1").await.unwrap();

        let connect = frames.next().await.unwrap().unwrap();
        assert_eq!(connect.kind, MessageType::Connect);
        assert_eq!(connect.id, "abc");

        sink.send(ChannelMessage::terminal_init(
            "abc",
            TerminalGeometry::new(100, 30),
        ))
        .await
        .unwrap();

        let received = ChannelMessage::decode(&server.await.unwrap()).unwrap();
        assert_eq!(received.kind, MessageType::TerminalInit);
        assert_eq!(received.geometry().unwrap(), TerminalGeometry::new(100, 30));

        let uri = uri_rx.await.unwrap();
        assert!(uri.starts_with(TERMINAL_PATH));
        assert!(uri.contains("target_id=a1"));
        assert!(uri.contains("system_user_id=su1"));
    }
}

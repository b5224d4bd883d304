//! Thin JSON framer over the voice gateway's websocket.

use crate::model::Event;

use async_tungstenite::{
    tokio::{connect_async, ConnectStream},
    tungstenite::{
        client::IntoClientRequest,
        error::Error as TungsteniteError,
        http::header::{HeaderValue, USER_AGENT},
        protocol::CloseFrame,
        Message,
    },
    WebSocketStream,
};
use futures::{SinkExt, StreamExt};
use serde_json::Error as JsonError;
use tokio::time::{timeout, Duration};
use tracing::debug;
use url::Url;

pub type Result<T> = std::result::Result<T, Error>;

const IDENT: &str = concat!("warbler/", env!("CARGO_PKG_VERSION"));

#[derive(Debug)]
pub enum Error {
    Json(JsonError),

    /// The voice gateway does not support or offer zlib compression.
    /// As a result, only text messages are expected.
    UnexpectedBinaryMessage(Vec<u8>),

    Ws(TungsteniteError),

    WsClosed(Option<CloseFrame<'static>>),
}

impl From<JsonError> for Error {
    fn from(e: JsonError) -> Error {
        Error::Json(e)
    }
}

impl From<TungsteniteError> for Error {
    fn from(e: TungsteniteError) -> Error {
        Error::Ws(e)
    }
}

pub(crate) struct WsStream {
    inner: WebSocketStream<ConnectStream>,
}

impl WsStream {
    pub(crate) async fn connect(url: Url) -> Result<Self> {
        let mut request = url.as_str().into_client_request()?;
        request
            .headers_mut()
            .insert(USER_AGENT, HeaderValue::from_static(IDENT));

        let (inner, _) = connect_async(request).await?;

        Ok(Self { inner })
    }

    pub(crate) async fn recv_json(&mut self) -> Result<Option<Event>> {
        const TIMEOUT: Duration = Duration::from_millis(500);

        let ws_message = match timeout(TIMEOUT, self.inner.next()).await {
            Ok(Some(Ok(v))) => Some(v),
            Ok(Some(Err(e))) => return Err(e.into()),
            Ok(None) | Err(_) => None,
        };

        convert_ws_message(ws_message)
    }

    pub(crate) async fn recv_json_no_timeout(&mut self) -> Result<Option<Event>> {
        match self.inner.next().await {
            Some(Ok(v)) => convert_ws_message(Some(v)),
            Some(Err(e)) => Err(e.into()),
            // Stream exhausted without a close frame.
            None => Err(Error::WsClosed(None)),
        }
    }

    pub(crate) async fn send_json(&mut self, value: &Event) -> Result<()> {
        Ok(serde_json::to_string(value)
            .map(Message::Text)
            .map_err(Error::from)
            .map(|m| self.inner.send(m))?
            .await?)
    }
}

#[inline]
fn convert_ws_message(message: Option<Message>) -> Result<Option<Event>> {
    Ok(match message {
        Some(Message::Text(payload)) => serde_json::from_str(&payload)
            .map_err(|e| {
                debug!("Unexpected JSON {payload:?}: {e:?}.");
                e
            })
            .ok(),
        Some(Message::Binary(bytes)) => {
            return Err(Error::UnexpectedBinaryMessage(bytes));
        },
        Some(Message::Close(Some(frame))) => {
            return Err(Error::WsClosed(Some(frame)));
        },
        // Ping/Pong message behaviour is internally handled by tungstenite.
        _ => None,
    })
}

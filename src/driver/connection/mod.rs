pub mod error;

use super::{
    tasks::{message::*, player, udp_rx, ws as ws_task},
    SharedState,
};
use crate::{
    constants::*,
    model::{
        payload::{Identify, ProtocolData, Resume, SelectProtocol},
        Event as GatewayEvent,
    },
    speakers::SpeakerRegistry,
    ws::WsStream,
    Config,
    ConnectionInfo,
};
use discortp::discord::{IpDiscoveryPacket, IpDiscoveryType, MutableIpDiscoveryPacket};
use error::{Error, Result};
use flume::Sender;
use std::{net::IpAddr, str::FromStr, sync::Arc};
use tokio::{net::UdpSocket, spawn, time::timeout};
use tracing::{debug, info};
use url::Url;

pub(crate) struct Connection {
    pub(crate) info: ConnectionInfo,
    pub(crate) ssrc: u32,
    pub(crate) ws: Sender<WsMessage>,
    pub(crate) player: Sender<PlayerMessage>,
    pub(crate) udp_rx: Sender<UdpRxMessage>,
}

impl Connection {
    pub(crate) async fn new(
        info: ConnectionInfo,
        interconnect: &Interconnect,
        config: &Config,
        shared: &Arc<SharedState>,
        speakers: &Arc<SpeakerRegistry>,
    ) -> Result<Connection> {
        if let Some(t) = config.driver_timeout {
            timeout(t, Connection::new_inner(info, interconnect, config, shared, speakers)).await?
        } else {
            Connection::new_inner(info, interconnect, config, shared, speakers).await
        }
    }

    async fn new_inner(
        mut info: ConnectionInfo,
        interconnect: &Interconnect,
        config: &Config,
        shared: &Arc<SharedState>,
        speakers: &Arc<SpeakerRegistry>,
    ) -> Result<Connection> {
        let url = generate_url(&mut info.endpoint)?;

        let mut client = WsStream::connect(url).await?;

        let mut hello = None;
        let mut ready = None;

        client
            .send_json(&GatewayEvent::from(Identify {
                server_id: info.guild_id,
                session_id: info.session_id.clone(),
                token: info.token.clone(),
                user_id: info.user_id,
            }))
            .await?;

        loop {
            let Some(value) = client.recv_json().await? else {
                continue;
            };

            match value {
                GatewayEvent::Ready(r) => {
                    ready = Some(r);
                    if hello.is_some() {
                        break;
                    }
                },
                GatewayEvent::Hello(h) => {
                    hello = Some(h);
                    if ready.is_some() {
                        break;
                    }
                },
                other => {
                    debug!("Expected ready/hello; got: {:?}", other);
                },
            }
        }

        let hello =
            hello.expect("Hello packet expected in connection initialisation, but not found.");
        let ready =
            ready.expect("Ready packet expected in connection initialisation, but not found.");

        if !has_valid_mode(&ready.modes, config.crypto_mode) {
            return Err(Error::CryptoModeUnavailable);
        }

        let udp = UdpSocket::bind("0.0.0.0:0").await?;
        udp.connect((ready.ip, ready.port)).await?;

        // Learn the NAT-observed endpoint before advertising it upstream.
        let (address, port) = discover_external_address(&udp, ready.ssrc).await?;

        client
            .send_json(&GatewayEvent::from(SelectProtocol {
                protocol: "udp".into(),
                data: ProtocolData {
                    address,
                    mode: config.crypto_mode.to_request_str().into(),
                    port,
                },
            }))
            .await?;

        let cipher = init_cipher(&mut client, config).await?;

        info!("Connected to: {}", info.endpoint);
        info!("WS heartbeat duration {}ms.", hello.heartbeat_interval);

        let ssrc = ready.ssrc;
        let udp = Arc::new(udp);

        let (ws_msg_tx, ws_msg_rx) = flume::unbounded();
        let (player_tx, player_rx) = flume::unbounded();
        let (udp_rx_tx, udp_rx_rx) = flume::unbounded();

        let ws_state = ws_task::AuxNetwork::new(
            ws_msg_rx,
            client,
            ssrc,
            hello.heartbeat_interval,
            shared.clone(),
            speakers.clone(),
        );

        spawn(ws_task::runner(interconnect.clone(), ws_state));

        spawn(udp_rx::runner(
            interconnect.clone(),
            udp_rx_rx,
            cipher.clone(),
            config.clone(),
            Arc::clone(&udp),
            speakers.clone(),
        ));

        spawn(player::runner(
            interconnect.clone(),
            player_rx,
            ws_msg_tx.clone(),
            Arc::clone(&udp),
            cipher,
            config.crypto_mode,
            ssrc,
            shared.clone(),
        ));

        Ok(Connection {
            info,
            ssrc,
            ws: ws_msg_tx,
            player: player_tx,
            udp_rx: udp_rx_tx,
        })
    }

    pub(crate) async fn reconnect(&mut self, config: &Config) -> Result<()> {
        if let Some(t) = config.driver_timeout {
            timeout(t, self.reconnect_inner()).await?
        } else {
            self.reconnect_inner().await
        }
    }

    async fn reconnect_inner(&mut self) -> Result<()> {
        let url = generate_url(&mut self.info.endpoint)?;

        let mut client = WsStream::connect(url).await?;

        client
            .send_json(&GatewayEvent::from(Resume {
                server_id: self.info.guild_id,
                session_id: self.info.session_id.clone(),
                token: self.info.token.clone(),
            }))
            .await?;

        let mut hello = None;
        let mut resumed = None;

        loop {
            let Some(value) = client.recv_json().await? else {
                continue;
            };

            match value {
                GatewayEvent::Resumed => {
                    resumed = Some(());
                    if hello.is_some() {
                        break;
                    }
                },
                GatewayEvent::Hello(h) => {
                    hello = Some(h);
                    if resumed.is_some() {
                        break;
                    }
                },
                other => {
                    debug!("Expected resumed/hello; got: {:?}", other);
                },
            }
        }

        let hello =
            hello.expect("Hello packet expected in connection resumption, but not found.");

        self.ws
            .send(WsMessage::SetKeepalive(hello.heartbeat_interval))
            .map_err(|_| Error::AttemptDiscarded)?;
        self.ws
            .send(WsMessage::Ws(Box::new(client)))
            .map_err(|_| Error::AttemptDiscarded)?;

        info!("Reconnected to: {}", &self.info.endpoint);
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        drop(self.ws.send(WsMessage::Poison));
        drop(self.player.send(PlayerMessage::Poison));
        drop(self.udp_rx.send(UdpRxMessage::Poison));
        info!("Disconnected");
    }
}

/// Performs one IP discovery exchange on a freshly connected socket.
///
/// Unrelated datagrams arriving during this phase are discarded; there is
/// no retry, as the surrounding state machine recovers via full reconnect.
async fn discover_external_address(udp: &UdpSocket, ssrc: u32) -> Result<(IpAddr, u16)> {
    let mut bytes = [0; IpDiscoveryPacket::const_packet_size()];

    {
        let mut view = MutableIpDiscoveryPacket::new(&mut bytes[..]).expect(
            "Too few bytes in 'bytes' for IPDiscovery packet.\
                (Blame: IpDiscoveryPacket::const_packet_size()?)",
        );
        view.set_pkt_type(IpDiscoveryType::Request);
        view.set_length(70);
        view.set_ssrc(ssrc);
    }

    udp.send(&bytes).await?;

    loop {
        let len = udp.recv(&mut bytes).await?;

        let Some(view) = IpDiscoveryPacket::new(&bytes[..len]) else {
            continue;
        };

        if view.get_pkt_type() != IpDiscoveryType::Response {
            continue;
        }

        // We could do something clever like binary search,
        // but possibility of UDP spoofing precludes us from
        // making the assumption we can find a "left edge" of '\0's.
        let nul_byte_index = view
            .get_address_raw()
            .iter()
            .position(|&b| b == 0)
            .ok_or(Error::IllegalIp)?;

        let address_str = std::str::from_utf8(&view.get_address_raw()[..nul_byte_index])
            .map_err(|_| Error::IllegalIp)?;

        let address = IpAddr::from_str(address_str).map_err(|_| Error::IllegalIp)?;

        return Ok((address, view.get_port()));
    }
}

fn generate_url(endpoint: &mut String) -> Result<Url> {
    if endpoint.ends_with(":80") {
        let len = endpoint.len();

        endpoint.truncate(len - 3);
    }

    Url::parse(&format!("wss://{endpoint}/?v={VOICE_GATEWAY_VERSION}")).or(Err(Error::EndpointUrl))
}

#[inline]
async fn init_cipher(client: &mut WsStream, config: &Config) -> Result<super::crypto::Cipher> {
    loop {
        let Some(value) = client.recv_json().await? else {
            continue;
        };

        match value {
            GatewayEvent::SessionDescription(desc) => {
                if desc.mode != config.crypto_mode.to_request_str() {
                    return Err(Error::CryptoModeInvalid);
                }

                if desc.secret_key.len() != super::crypto::KEY_SIZE {
                    return Err(Error::CryptoInvalidLength);
                }

                return config
                    .crypto_mode
                    .cipher_from_key(&desc.secret_key)
                    .map_err(|_| Error::CryptoInvalidLength);
            },
            other => {
                debug!(
                    "Expected session description for key; got: op{}/v{:?}",
                    u8::from(other.kind()),
                    other
                );
            },
        }
    }
}

#[inline]
fn has_valid_mode<T, It>(modes: It, mode: super::CryptoMode) -> bool
where
    T: for<'a> PartialEq<&'a str>,
    It: IntoIterator<Item = T>,
{
    modes.into_iter().any(|s| s == mode.to_request_str())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::driver::CryptoMode;

    #[test]
    fn url_keeps_given_port_but_strips_80() {
        let mut endpoint = "eu-west42.example.gg:80".to_string();
        let url = generate_url(&mut endpoint).unwrap();
        assert_eq!(url.as_str(), "wss://eu-west42.example.gg/?v=4");

        let mut endpoint = "eu-west42.example.gg:443".to_string();
        let url = generate_url(&mut endpoint).unwrap();
        assert_eq!(url.as_str(), "wss://eu-west42.example.gg:443/?v=4");
    }

    #[test]
    fn mode_check_needs_exact_name() {
        assert!(has_valid_mode(
            vec!["xsalsa20_poly1305", "xsalsa20_poly1305_lite"],
            CryptoMode::Lite
        ));
        assert!(!has_valid_mode(
            vec!["xsalsa20_poly1305_lite_rtpsize"],
            CryptoMode::Lite
        ));
    }

    fn discovery_response(ip: &[u8], port: u16) -> [u8; 74] {
        let mut resp = [0u8; 74];
        resp[..4].copy_from_slice(&[0x00, 0x02, 0x00, 0x46]);
        resp[8..8 + ip.len()].copy_from_slice(ip);
        resp[72..].copy_from_slice(&port.to_be_bytes());
        resp
    }

    #[tokio::test]
    async fn discovery_round_trip() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.connect(server_addr).await.unwrap();

        let responder = tokio::spawn(async move {
            let mut buf = [0u8; IpDiscoveryPacket::const_packet_size()];
            let (len, addr) = server.recv_from(&mut buf).await.unwrap();

            // 74-byte request: type 1, length 70, ssrc, then zeroes.
            assert_eq!(len, 74);
            assert_eq!(&buf[..8], &[0x00, 0x01, 0x00, 0x46, 0x00, 0x00, 0x00, 0x7b]);
            assert!(buf[8..].iter().all(|&b| b == 0));

            let resp = discovery_response(b"5.6.7.8\0", 50_000);
            server.send_to(&resp, addr).await.unwrap();
        });

        let (address, port) = discover_external_address(&client, 123).await.unwrap();

        assert_eq!(address, "5.6.7.8".parse::<IpAddr>().unwrap());
        assert_eq!(port, 50_000);
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn discovery_discards_unrelated_datagrams() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.connect(server_addr).await.unwrap();

        let responder = tokio::spawn(async move {
            let mut buf = [0u8; IpDiscoveryPacket::const_packet_size()];
            let (_len, addr) = server.recv_from(&mut buf).await.unwrap();

            // Noise first: too short, then an echo of the request itself.
            server.send_to(&[0x80, 0x78, 0x01], addr).await.unwrap();
            server.send_to(&buf, addr).await.unwrap();

            let resp = discovery_response(b"10.0.40.1\0", 4_242);
            server.send_to(&resp, addr).await.unwrap();
        });

        let (address, port) = discover_external_address(&client, 1).await.unwrap();

        assert_eq!(address, "10.0.40.1".parse::<IpAddr>().unwrap());
        assert_eq!(port, 4_242);
        responder.await.unwrap();
    }
}

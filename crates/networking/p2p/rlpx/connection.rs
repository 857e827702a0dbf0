use crate::{
    rlpx::{
        capabilities::{CapabilityName, ProtocolTable, MIN_ETH_REQUEST_VERSION},
        eth::backend,
        eth::status::StatusMessage,
        handshake::{
            decode_ack_message, decode_auth_message, decode_legacy_ack_message,
            decode_legacy_auth_message, encode_ack_message, encode_auth_message,
            LEGACY_ACK_MSG_SIZE, LEGACY_AUTH_MSG_SIZE,
        },
        message::{Message, CODE_DISCONNECT, CODE_HELLO},
        p2p::{DisconnectMessage, DisconnectReason, HelloMessage, PingMessage, PongMessage},
        utils::{ecdh_xchng, id2pubkey, snappy_compress, snappy_decompress},
    },
    snap::{
        process_account_range_request, process_byte_codes_request, process_storage_ranges_request,
        process_trie_nodes_request,
    },
    NetworkEvent, P2PContext,
};

use super::{error::RLPxError, frame};
use aes::cipher::KeyIvInit;
use arclight_core::{H256, H512};
use arclight_rlp::{decode::RLPDecode, encode::RLPEncode};
use k256::{PublicKey, SecretKey};
use sha3::{Digest, Keccak256};
use std::collections::{HashMap, VecDeque};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, WriteHalf},
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, trace};

pub(crate) type Aes256Ctr64BE = ctr::Ctr64BE<aes::Aes256>;

/// Bound of the per-session command queue; a full queue surfaces
/// `WriteQueueOverflow` to non-blocking senders.
pub(crate) const SESSION_COMMAND_BUFFER: usize = 64;

/// Commands posted to a session task by its handles.
pub enum SessionCommand {
    /// Fire-and-forget message (announcements, responses of our own).
    Send(Message),
    /// A correlated request; the session assigns the request id and
    /// completes `reply` exactly once.
    Request {
        message: Message,
        reply: oneshot::Sender<Result<Message, RLPxError>>,
    },
    /// Graceful close, optionally telling the peer why.
    Close(Option<DisconnectReason>),
}

/// An RLPx connection being brought up: ECIES handshake, then Hello, then
/// (via [`RLPxConnection::run_session`]) the live session.
pub(crate) struct RLPxConnection<S> {
    context: P2PContext,
    state: RLPxConnectionState,
    stream: S,
    protocols: ProtocolTable,
    snappy_enabled: bool,
    remote_client_id: String,
}

impl<S: AsyncWrite + AsyncRead + std::marker::Unpin> RLPxConnection<S> {
    fn new(context: P2PContext, stream: S, state: RLPxConnectionState) -> Self {
        Self {
            context,
            state,
            stream,
            protocols: ProtocolTable::default(),
            snappy_enabled: false,
            remote_client_id: String::new(),
        }
    }

    /// An inbound connection, waiting for the remote's Auth.
    pub fn receiver(context: P2PContext, stream: S) -> Self {
        let mut rng = rand::thread_rng();
        let state = RLPxConnectionState::Receiver(Receiver::new(
            H256::random_using(&mut rng),
            SecretKey::random(&mut rng),
        ));
        Self::new(context, stream, state)
    }

    /// An outbound connection to a known node id.
    pub fn initiator(context: P2PContext, stream: S, remote_node_id: H512) -> Self {
        let mut rng = rand::thread_rng();
        let state = RLPxConnectionState::Initiator(Initiator::new(
            H256::random_using(&mut rng),
            SecretKey::random(&mut rng),
            remote_node_id,
        ));
        Self::new(context, stream, state)
    }

    pub fn remote_node_id(&self) -> Result<H512, RLPxError> {
        match &self.state {
            RLPxConnectionState::Initiator(state) => Ok(state.remote_node_id),
            RLPxConnectionState::InitiatedAuth(state) => Ok(state.remote_node_id),
            RLPxConnectionState::ReceivedAuth(state) => Ok(state.remote_node_id),
            RLPxConnectionState::Established(state) => Ok(state.remote_node_id),
            _ => Err(RLPxError::InvalidState),
        }
    }

    pub fn remote_client_id(&self) -> &str {
        &self.remote_client_id
    }

    /// Runs the ECIES Auth/Ack exchange and derives the frame secrets.
    pub async fn handshake(&mut self) -> Result<(), RLPxError> {
        match &self.state {
            RLPxConnectionState::Initiator(_) => {
                self.send_auth().await?;
                self.receive_ack().await?;
            }
            RLPxConnectionState::Receiver(_) => {
                self.receive_auth().await?;
                self.send_ack().await?;
            }
            _ => return Err(RLPxError::InvalidState),
        };
        trace!("completed ECIES handshake");
        Ok(())
    }

    /// Sends our Hello and processes the peer's, negotiating capabilities
    /// and the compression toggle. The Hello frames themselves are never
    /// compressed.
    pub async fn exchange_hello_messages(&mut self) -> Result<(), RLPxError> {
        let config = self.context.config.clone();
        let mut hello = HelloMessage::new(
            config.client_id.clone(),
            config.capabilities.clone(),
            config.listen_addr.port(),
            self.context.local_node_id,
        );
        if !config.use_snappy_compression {
            // a node that won't compress must not advertise p2p/5
            hello.protocol_version = 4;
        }
        self.send(Message::Hello(hello)).await?;

        let message = time::timeout(config.handshake_timeout, self.receive())
            .await
            .map_err(|_| RLPxError::HelloTimeout)??;
        match message {
            Message::Hello(hello) => {
                if hello.node_id == self.context.local_node_id {
                    return Err(RLPxError::IdentityClash);
                }
                if hello.node_id != self.remote_node_id()? {
                    return Err(RLPxError::ProtocolError(
                        "hello node id differs from handshake identity".to_string(),
                    ));
                }
                self.remote_client_id = hello.client_id;
                self.protocols =
                    ProtocolTable::negotiate(&config.capabilities, &hello.capabilities);
                if self.protocols.is_empty() {
                    return Err(RLPxError::NoSharedCapability);
                }
                // compression applies from the next frame on, iff both
                // sides speak p2p/5
                self.snappy_enabled =
                    config.use_snappy_compression && hello.protocol_version >= 5;
                debug!(
                    peer = %self.remote_client_id,
                    snappy = self.snappy_enabled,
                    "hello complete"
                );
                Ok(())
            }
            Message::Disconnect(msg) => Err(RLPxError::DisconnectRequested(msg.reason)),
            other => Err(RLPxError::ProtocolError(format!(
                "expected Hello, got {other}"
            ))),
        }
    }

    /// Tells the peer to go away before the session ever starts (capacity
    /// refusals and the like).
    pub async fn send_disconnect(&mut self, reason: DisconnectReason) {
        let _ = self
            .send(Message::Disconnect(DisconnectMessage::new(Some(reason))))
            .await;
    }

    async fn send_auth(&mut self) -> Result<(), RLPxError> {
        match &self.state {
            RLPxConnectionState::Initiator(initiator_state) => {
                let secret_key = self.context.signer.clone();
                let peer_pk =
                    id2pubkey(initiator_state.remote_node_id).ok_or(RLPxError::InvalidPeerId)?;

                let previous_state = initiator_state.clone();

                let msg = encode_auth_message(
                    &secret_key,
                    previous_state.nonce,
                    &peer_pk,
                    &previous_state.ephemeral_key,
                )?;

                self.send_handshake_msg(&msg).await?;

                self.state =
                    RLPxConnectionState::InitiatedAuth(InitiatedAuth::new(previous_state, msg));
                Ok(())
            }
            _ => Err(RLPxError::InvalidState),
        }
    }

    async fn send_ack(&mut self) -> Result<(), RLPxError> {
        match &self.state {
            RLPxConnectionState::ReceivedAuth(received_auth_state) => {
                let peer_pk = id2pubkey(received_auth_state.remote_node_id)
                    .ok_or(RLPxError::InvalidPeerId)?;

                let previous_state = received_auth_state.clone();

                let msg = encode_ack_message(
                    &previous_state.local_ephemeral_key,
                    previous_state.local_nonce,
                    &peer_pk,
                )?;

                self.send_handshake_msg(&msg).await?;

                self.state = RLPxConnectionState::Established(Box::new(Established::for_receiver(
                    previous_state,
                    msg,
                )));
                Ok(())
            }
            _ => Err(RLPxError::InvalidState),
        }
    }

    async fn receive_auth(&mut self) -> Result<(), RLPxError> {
        match &self.state {
            RLPxConnectionState::Receiver(receiver_state) => {
                let secret_key = self.context.signer.clone();
                let previous_state = receiver_state.clone();
                let (msg_bytes, legacy) =
                    self.receive_handshake_msg(LEGACY_AUTH_MSG_SIZE).await?;
                let (auth, remote_ephemeral_key) = if legacy {
                    decode_legacy_auth_message(&secret_key, &msg_bytes)?
                } else {
                    decode_auth_message(&secret_key, &msg_bytes[2..], &msg_bytes[..2])?
                };

                self.state = RLPxConnectionState::ReceivedAuth(ReceivedAuth::new(
                    previous_state,
                    auth.node_id,
                    msg_bytes,
                    auth.nonce,
                    remote_ephemeral_key,
                ));
                Ok(())
            }
            _ => Err(RLPxError::InvalidState),
        }
    }

    async fn receive_ack(&mut self) -> Result<(), RLPxError> {
        match &self.state {
            RLPxConnectionState::InitiatedAuth(initiated_auth_state) => {
                let secret_key = self.context.signer.clone();
                let previous_state = initiated_auth_state.clone();
                let (msg_bytes, legacy) =
                    self.receive_handshake_msg(LEGACY_ACK_MSG_SIZE).await?;
                let ack = if legacy {
                    decode_legacy_ack_message(&secret_key, &msg_bytes)?
                } else {
                    decode_ack_message(&secret_key, &msg_bytes[2..], &msg_bytes[..2])?
                };
                let remote_ephemeral_key = ack
                    .get_ephemeral_pubkey()
                    .ok_or(RLPxError::NotFound("remote ephemeral key".to_string()))?;
                self.state = RLPxConnectionState::Established(Box::new(
                    Established::for_initiator(
                        previous_state,
                        msg_bytes,
                        ack.nonce,
                        remote_ephemeral_key,
                    ),
                ));
                Ok(())
            }
            _ => Err(RLPxError::InvalidState),
        }
    }

    async fn send_handshake_msg(&mut self, msg: &[u8]) -> Result<(), RLPxError> {
        self.stream
            .write_all(msg)
            .await
            .map_err(|e| RLPxError::ConnectionError(format!("could not send message: {e}")))?;
        Ok(())
    }

    /// Reads one handshake message. EIP-8 messages start with a two-byte
    /// big-endian size; pre-EIP-8 ones with the uncompressed-point marker
    /// 0x04, at a fixed total size.
    async fn receive_handshake_msg(
        &mut self,
        legacy_size: usize,
    ) -> Result<(Vec<u8>, bool), RLPxError> {
        let mut prefix = [0; 2];
        self.stream
            .read_exact(&mut prefix)
            .await
            .map_err(|e| RLPxError::ConnectionError(format!("connection dropped: {e}")))?;

        if prefix[0] == 0x04 {
            let mut buf = vec![0; legacy_size];
            buf[..2].copy_from_slice(&prefix);
            self.stream
                .read_exact(&mut buf[2..])
                .await
                .map_err(|e| RLPxError::ConnectionError(format!("connection dropped: {e}")))?;
            Ok((buf, true))
        } else {
            let msg_size = u16::from_be_bytes(prefix) as usize;
            let mut buf = vec![0; msg_size + 2];
            buf[..2].copy_from_slice(&prefix);
            self.stream
                .read_exact(&mut buf[2..])
                .await
                .map_err(|e| RLPxError::ConnectionError(format!("connection dropped: {e}")))?;
            Ok((buf, false))
        }
    }

    async fn send(&mut self, message: Message) -> Result<(), RLPxError> {
        match &mut self.state {
            RLPxConnectionState::Established(state) => {
                let frame_data =
                    encode_frame_data(&message, &self.protocols, self.snappy_enabled)?;
                frame::write(frame_data, &mut state.egress, &mut self.stream).await
            }
            _ => Err(RLPxError::InvalidState),
        }
    }

    async fn receive(&mut self) -> Result<Message, RLPxError> {
        match &mut self.state {
            RLPxConnectionState::Established(state) => {
                let frame_data = frame::read(&mut state.ingress, &mut self.stream).await?;
                decode_frame_data(&frame_data, &self.protocols, self.snappy_enabled)
            }
            _ => Err(RLPxError::InvalidState),
        }
    }

    /// If ETH was negotiated, exchanges STATUS: ours goes out immediately,
    /// and only base-protocol frames are tolerated until the peer's STATUS
    /// arrives.
    async fn exchange_eth_status(&mut self) -> Result<Option<StatusMessage>, RLPxError> {
        let Some(eth_version) = self.protocols.eth_version() else {
            return Ok(None);
        };
        let local = backend::local_status(self.context.backends.chain.as_ref(), eth_version);
        self.send(Message::Status(local.clone())).await?;

        let deadline = Instant::now() + self.context.config.handshake_timeout;
        loop {
            let message = time::timeout_at(deadline, self.receive())
                .await
                .map_err(|_| RLPxError::StatusTimeout)??;
            match message {
                Message::Status(remote) => {
                    backend::validate_status(&remote, &local)?;
                    return Ok(Some(remote));
                }
                Message::Ping(_) => self.send(Message::Pong(PongMessage::new())).await?,
                Message::Pong(_) => {}
                Message::Disconnect(msg) => {
                    return Err(RLPxError::DisconnectRequested(msg.reason))
                }
                other => {
                    return Err(RLPxError::ProtocolError(format!(
                        "expected eth Status, got {other}"
                    )))
                }
            }
        }
    }
}

impl<S> RLPxConnection<S>
where
    S: AsyncWrite + AsyncRead + std::marker::Unpin + Send + 'static,
{
    /// Completes the subprotocol handshakes and runs the session until it
    /// closes. Consumes the connection; pending requests are failed with
    /// `SessionClosed` on the way out.
    pub async fn run_session(
        mut self,
        commands: mpsc::Receiver<SessionCommand>,
    ) -> Result<(), RLPxError> {
        let node_id = self.remote_node_id()?;
        let remote_status = match self.exchange_eth_status().await {
            Ok(status) => status,
            Err(error) => {
                if !matches!(error, RLPxError::DisconnectRequested(_)) {
                    if let Some(reason) = error.disconnect_reason() {
                        self.send_disconnect(reason).await;
                    }
                }
                return Err(error);
            }
        };

        let _ = self
            .context
            .events
            .send(NetworkEvent::PeerConnected { node_id });
        if let Some(status) = &remote_status {
            let _ = self.context.events.send(NetworkEvent::EthStatus {
                node_id,
                status: status.clone(),
            });
        }

        let session = self.into_session(commands)?;
        session.run().await
    }

    fn into_session(
        self,
        commands: mpsc::Receiver<SessionCommand>,
    ) -> Result<PeerSession<S>, RLPxError> {
        let RLPxConnection {
            context,
            state,
            stream,
            protocols,
            snappy_enabled,
            ..
        } = self;
        let RLPxConnectionState::Established(established) = state else {
            return Err(RLPxError::InvalidState);
        };
        let Established {
            remote_node_id,
            ingress,
            egress,
        } = *established;

        let (read_half, write_half) = tokio::io::split(stream);
        // one decoded frame in flight at a time; the session task provides
        // the back-pressure
        let (inbound_tx, inbound_rx) = mpsc::channel(1);
        let reader = tokio::spawn(ingress_loop(
            read_half,
            ingress,
            protocols.clone(),
            snappy_enabled,
            inbound_tx,
        ));

        Ok(PeerSession {
            context,
            node_id: remote_node_id,
            writer: write_half,
            egress,
            protocols,
            snappy_enabled,
            inbound: inbound_rx,
            commands,
            reader,
            next_request_id: 0,
            pending_requests: HashMap::new(),
            request_deadlines: VecDeque::new(),
            inflight_by_key: HashMap::new(),
            pong_deadline: None,
        })
    }
}

/// The ingress half: reads, authenticates and decodes frames, handing each
/// message to the session task in wire order.
async fn ingress_loop<R: AsyncRead + std::marker::Unpin>(
    mut reader: R,
    mut ingress: IngressState,
    protocols: ProtocolTable,
    snappy_enabled: bool,
    out: mpsc::Sender<Result<Message, RLPxError>>,
) {
    loop {
        let result = match frame::read(&mut ingress, &mut reader).await {
            Ok(frame_data) => decode_frame_data(&frame_data, &protocols, snappy_enabled),
            Err(error) => Err(error),
        };
        let failed = result.is_err();
        if out.send(result).await.is_err() {
            break;
        }
        if failed {
            break;
        }
    }
}

fn encode_frame_data(
    message: &Message,
    protocols: &ProtocolTable,
    snappy_enabled: bool,
) -> Result<Vec<u8>, RLPxError> {
    let code = message.absolute_code(protocols)?;
    let mut frame_data = vec![];
    code.encode(&mut frame_data);
    let mut payload = vec![];
    message.encode_payload(&mut payload, protocols)?;
    if snappy_enabled && code != CODE_HELLO {
        payload = snappy_compress(&payload)?;
    }
    frame_data.extend_from_slice(&payload);
    Ok(frame_data)
}

fn decode_frame_data(
    frame_data: &[u8],
    protocols: &ProtocolTable,
    snappy_enabled: bool,
) -> Result<Message, RLPxError> {
    let (code, payload): (u8, &[u8]) = u8::decode_unfinished(frame_data)?;
    if snappy_enabled && code != CODE_HELLO {
        match snappy_decompress(payload) {
            Ok(data) => Message::decode(protocols, code, &data),
            // some clients send Disconnect uncompressed even on snappy
            // connections
            Err(_) if code == CODE_DISCONNECT => Message::decode(protocols, code, payload),
            Err(error) => Err(error),
        }
    } else {
        Message::decode(protocols, code, payload)
    }
}

struct PendingRequest {
    kind: String,
    dedupe_key: Option<String>,
    waiters: Vec<oneshot::Sender<Result<Message, RLPxError>>>,
}

/// A live peer session: owns the egress half, the pending-request table and
/// the keepalive state. Everything here runs on one task; incoming frames
/// are processed to completion, one at a time.
struct PeerSession<S> {
    context: P2PContext,
    node_id: H512,
    writer: WriteHalf<S>,
    egress: EgressState,
    protocols: ProtocolTable,
    snappy_enabled: bool,
    inbound: mpsc::Receiver<Result<Message, RLPxError>>,
    commands: mpsc::Receiver<SessionCommand>,
    reader: JoinHandle<()>,
    next_request_id: u64,
    pending_requests: HashMap<u64, PendingRequest>,
    request_deadlines: VecDeque<(Instant, u64)>,
    inflight_by_key: HashMap<String, u64>,
    pong_deadline: Option<Instant>,
}

impl<S: AsyncWrite + Send + 'static> PeerSession<S> {
    async fn run(mut self) -> Result<(), RLPxError> {
        let result = self.session_loop().await;
        self.teardown(&result).await;
        result
    }

    async fn session_loop(&mut self) -> Result<(), RLPxError> {
        let mut ping_interval = time::interval(self.context.config.keepalive_ping_interval);
        ping_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick fires immediately
        ping_interval.tick().await;

        loop {
            let request_deadline = self.request_deadlines.front().map(|(at, _)| *at);
            let pong_deadline = self.pong_deadline;
            let event = tokio::select! {
                command = self.commands.recv() => SessionEvent::Command(command),
                inbound = self.inbound.recv() => SessionEvent::Inbound(inbound),
                _ = ping_interval.tick() => SessionEvent::PingDue,
                _ = sleep_until_optional(pong_deadline), if pong_deadline.is_some() => {
                    SessionEvent::PongOverdue
                }
                _ = sleep_until_optional(request_deadline), if request_deadline.is_some() => {
                    SessionEvent::RequestsDue
                }
            };

            match event {
                SessionEvent::Command(Some(SessionCommand::Send(message))) => {
                    self.send(message).await?
                }
                SessionEvent::Command(Some(SessionCommand::Request { message, reply })) => {
                    self.handle_outgoing_request(message, reply).await?
                }
                SessionEvent::Command(Some(SessionCommand::Close(reason))) => {
                    if let Some(reason) = reason {
                        let _ = self
                            .send(Message::Disconnect(DisconnectMessage::new(Some(reason))))
                            .await;
                    }
                    return Ok(());
                }
                // every handle is gone; the pool let go of this peer
                SessionEvent::Command(None) => return Ok(()),
                SessionEvent::Inbound(Some(Ok(message))) => self.handle_message(message).await?,
                SessionEvent::Inbound(Some(Err(error))) => return Err(error),
                SessionEvent::Inbound(None) => {
                    return Err(RLPxError::ConnectionError("ingress loop ended".to_string()))
                }
                SessionEvent::PingDue => {
                    self.send(Message::Ping(PingMessage::new())).await?;
                    if self.pong_deadline.is_none() {
                        self.pong_deadline =
                            Some(Instant::now() + self.context.config.keepalive_pong_timeout);
                    }
                }
                SessionEvent::PongOverdue => return Err(RLPxError::KeepaliveTimeout),
                SessionEvent::RequestsDue => self.expire_requests(),
            }
        }
    }

    async fn teardown(&mut self, result: &Result<(), RLPxError>) {
        self.reader.abort();

        for (_, pending) in self.pending_requests.drain() {
            for waiter in pending.waiters {
                let _ = waiter.send(Err(RLPxError::SessionClosed));
            }
        }
        self.inflight_by_key.clear();
        self.request_deadlines.clear();

        let reason = match result {
            // the peer told us to go; never reciprocate the Disconnect
            Err(RLPxError::DisconnectRequested(reason)) => *reason,
            Err(error) => {
                if let Some(reason) = error.disconnect_reason() {
                    let _ = self
                        .send(Message::Disconnect(DisconnectMessage::new(Some(reason))))
                        .await;
                    Some(reason)
                } else {
                    None
                }
            }
            Ok(()) => None,
        };

        let _ = self.context.events.send(NetworkEvent::PeerDisconnected {
            node_id: self.node_id,
            reason,
        });
    }

    async fn send(&mut self, message: Message) -> Result<(), RLPxError> {
        let frame_data = encode_frame_data(&message, &self.protocols, self.snappy_enabled)?;
        frame::write(frame_data, &mut self.egress, &mut self.writer).await
    }

    async fn handle_outgoing_request(
        &mut self,
        mut message: Message,
        reply: oneshot::Sender<Result<Message, RLPxError>>,
    ) -> Result<(), RLPxError> {
        if !message.is_request() {
            let _ = reply.send(Err(RLPxError::ProtocolError(
                "not a request message".to_string(),
            )));
            return Ok(());
        }
        // requests need correlated responses; refuse peers that can't
        match message.capability() {
            Some(CapabilityName::Eth) => match self.protocols.eth_version() {
                Some(version) if version >= MIN_ETH_REQUEST_VERSION => {}
                Some(version) => {
                    let _ = reply.send(Err(RLPxError::IncompatibleProtocol(format!(
                        "eth/{version} does not carry request ids"
                    ))));
                    return Ok(());
                }
                None => {
                    let _ = reply.send(Err(RLPxError::IncompatibleProtocol(
                        "eth is not negotiated".to_string(),
                    )));
                    return Ok(());
                }
            },
            Some(CapabilityName::Snap) if self.protocols.snap_version().is_none() => {
                let _ = reply.send(Err(RLPxError::IncompatibleProtocol(
                    "snap is not negotiated".to_string(),
                )));
                return Ok(());
            }
            _ => {}
        }

        // identical in-flight query: attach to it instead of re-sending
        let dedupe_key = message.dedupe_key();
        let existing_id = dedupe_key
            .as_ref()
            .and_then(|key| self.inflight_by_key.get(key))
            .copied();
        if let Some(id) = existing_id {
            if let Some(pending) = self.pending_requests.get_mut(&id) {
                trace!(peer = %self.node_id, kind = %pending.kind, id, "joining in-flight request");
                pending.waiters.push(reply);
                return Ok(());
            }
        }

        let id = self.next_request_id;
        self.next_request_id += 1;
        message.set_request_id(id);
        let kind = message.to_string();
        if let Some(key) = &dedupe_key {
            self.inflight_by_key.insert(key.clone(), id);
        }
        self.pending_requests.insert(
            id,
            PendingRequest {
                kind,
                dedupe_key,
                waiters: vec![reply],
            },
        );
        self.request_deadlines
            .push_back((Instant::now() + self.context.config.request_timeout, id));
        self.send(message).await
    }

    async fn handle_message(&mut self, message: Message) -> Result<(), RLPxError> {
        trace!(peer = %self.node_id, %message, "received message");
        match message {
            Message::Ping(_) => {
                self.send(Message::Pong(PongMessage::new())).await?;
            }
            Message::Pong(_) => self.pong_deadline = None,
            Message::Disconnect(msg) => {
                debug!(peer = %self.node_id, reason = ?msg.reason, "peer disconnected us");
                return Err(RLPxError::DisconnectRequested(msg.reason));
            }
            Message::Hello(_) => {
                return Err(RLPxError::ProtocolError(
                    "unexpected Hello on a live session".to_string(),
                ))
            }
            Message::Status(_) => {
                return Err(RLPxError::ProtocolError(
                    "Status is processed exactly once per connection".to_string(),
                ))
            }
            // eth serving
            Message::GetBlockHeaders(req) => {
                let response =
                    backend::serve_block_headers(&req, self.context.backends.chain.as_ref());
                self.send(Message::BlockHeaders(response)).await?;
            }
            Message::GetBlockBodies(req) => {
                let response =
                    backend::serve_block_bodies(&req, self.context.backends.chain.as_ref());
                self.send(Message::BlockBodies(response)).await?;
            }
            Message::GetReceipts(req) => {
                let response =
                    backend::serve_receipts(&req, self.context.backends.receipts.as_ref());
                self.send(Message::Receipts(response)).await?;
            }
            Message::GetPooledTransactions(req) => {
                let response = backend::serve_pooled_transactions(
                    &req,
                    self.context.backends.tx_pool.as_ref(),
                );
                self.send(Message::PooledTransactions(response)).await?;
            }
            Message::GetNodeData(req) => {
                let response = backend::serve_node_data(&req);
                self.send(Message::NodeData(response)).await?;
            }
            // eth announcements
            Message::NewBlockHashes(msg) => {
                self.context
                    .backends
                    .synchronizer
                    .handle_new_block_hashes(msg.block_hashes.clone(), self.node_id);
                self.emit_protocol_message(Message::NewBlockHashes(msg));
            }
            Message::NewBlock(msg) => {
                self.context
                    .backends
                    .synchronizer
                    .handle_new_block(msg.block.clone(), self.node_id);
                self.emit_protocol_message(Message::NewBlock(msg));
            }
            Message::Transactions(msg) => {
                self.context
                    .backends
                    .tx_pool
                    .handle_announced_txs(msg.transactions.clone(), self.node_id);
                self.emit_protocol_message(Message::Transactions(msg));
            }
            Message::NewPooledTransactionHashes(msg) => {
                self.context
                    .backends
                    .tx_pool
                    .handle_announced_tx_hashes(msg.transaction_hashes.clone(), self.node_id);
                self.emit_protocol_message(Message::NewPooledTransactionHashes(msg));
            }
            // snap serving
            Message::GetAccountRange(req) => {
                let response = process_account_range_request(&req);
                self.send(Message::AccountRange(response)).await?;
            }
            Message::GetStorageRanges(req) => {
                let response = process_storage_ranges_request(&req);
                self.send(Message::StorageRanges(response)).await?;
            }
            Message::GetByteCodes(req) => {
                let response = process_byte_codes_request(&req);
                self.send(Message::ByteCodes(response)).await?;
            }
            Message::GetTrieNodes(req) => {
                let response = process_trie_nodes_request(&req);
                self.send(Message::TrieNodes(response)).await?;
            }
            // responses
            other if other.response_id().is_some() => self.resolve_response(other),
            other => {
                return Err(RLPxError::ProtocolError(format!(
                    "unhandled message {other}"
                )))
            }
        }
        Ok(())
    }

    fn emit_protocol_message(&self, message: Message) {
        let _ = self.context.events.send(NetworkEvent::ProtocolMessage {
            node_id: self.node_id,
            message,
        });
    }

    fn resolve_response(&mut self, message: Message) {
        let Some(id) = message.response_id() else {
            return;
        };
        match self.pending_requests.remove(&id) {
            Some(pending) => {
                if let Some(key) = pending.dedupe_key {
                    self.inflight_by_key.remove(&key);
                }
                self.request_deadlines.retain(|(_, pending_id)| *pending_id != id);
                for waiter in pending.waiters {
                    let _ = waiter.send(Ok(message.clone()));
                }
            }
            None => {
                debug!(peer = %self.node_id, %message, id, "discarding response with no pending request");
            }
        }
    }

    fn expire_requests(&mut self) {
        let now = Instant::now();
        while let Some((deadline, id)) = self.request_deadlines.front().copied() {
            if deadline > now {
                break;
            }
            self.request_deadlines.pop_front();
            if let Some(pending) = self.pending_requests.remove(&id) {
                debug!(peer = %self.node_id, kind = %pending.kind, id, "request timed out");
                if let Some(key) = pending.dedupe_key {
                    self.inflight_by_key.remove(&key);
                }
                for waiter in pending.waiters {
                    let _ = waiter.send(Err(RLPxError::RequestTimeout));
                }
            }
        }
    }
}

enum SessionEvent {
    Command(Option<SessionCommand>),
    Inbound(Option<Result<Message, RLPxError>>),
    PingDue,
    PongOverdue,
    RequestsDue,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer_channels::PeerHandle;
    use crate::rlpx::eth::blocks::HashOrNumber;
    use crate::rlpx::snap::ByteCodes;
    use crate::test_utils::{test_backends, test_context, test_context_with, TestChain};
    use arclight_core::types::BlockHeader;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{duplex, DuplexStream};
    use tokio::task::JoinHandle as TaskHandle;

    use crate::NetworkEvent;

    /// Runs the ECIES handshake and the Hello exchange over an in-process
    /// duplex pipe, with A as the listener side.
    async fn hello_pair(
        context_a: P2PContext,
        context_b: P2PContext,
    ) -> (RLPxConnection<DuplexStream>, RLPxConnection<DuplexStream>) {
        let (stream_a, stream_b) = duplex(1 << 20);
        let mut conn_a = RLPxConnection::receiver(context_a.clone(), stream_a);
        let mut conn_b =
            RLPxConnection::initiator(context_b, stream_b, context_a.local_node_id);
        let (result_a, result_b) = tokio::join!(conn_a.handshake(), conn_b.handshake());
        result_a.unwrap();
        result_b.unwrap();
        let (result_a, result_b) = tokio::join!(
            conn_a.exchange_hello_messages(),
            conn_b.exchange_hello_messages()
        );
        result_a.unwrap();
        result_b.unwrap();
        (conn_a, conn_b)
    }

    fn spawn_session(
        conn: RLPxConnection<DuplexStream>,
    ) -> (PeerHandle, TaskHandle<Result<(), RLPxError>>) {
        let node_id = conn.remote_node_id().unwrap();
        let (commands, command_rx) = mpsc::channel(SESSION_COMMAND_BUFFER);
        let handle = PeerHandle::new(node_id, commands);
        let task = tokio::spawn(conn.run_session(command_rx));
        (handle, task)
    }

    /// A hand-driven remote: completes STATUS, answers pings, hands every
    /// other message to `on_message`.
    fn spawn_scripted_peer<F>(
        mut conn: RLPxConnection<DuplexStream>,
        mut on_message: F,
    ) -> TaskHandle<()>
    where
        F: FnMut(Message) -> Option<Message> + Send + 'static,
    {
        tokio::spawn(async move {
            let _ = conn.exchange_eth_status().await;
            loop {
                match conn.receive().await {
                    Ok(Message::Ping(_)) => {
                        if conn.send(Message::Pong(PongMessage::new())).await.is_err() {
                            break;
                        }
                    }
                    Ok(message) => {
                        if let Some(response) = on_message(message) {
                            if conn.send(response).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(_) => break,
                }
            }
        })
    }

    #[tokio::test]
    async fn hello_negotiates_identical_tables() {
        let context_a = test_context(test_backends(TestChain::single_genesis()));
        let context_b = test_context(test_backends(TestChain::single_genesis()));
        let (conn_a, conn_b) = hello_pair(context_a, context_b).await;

        assert_eq!(conn_a.protocols, conn_b.protocols);
        assert_eq!(conn_a.protocols.eth_version(), Some(68));
        assert_eq!(conn_a.protocols.snap_version(), Some(1));
        assert!(conn_a.snappy_enabled);
        assert!(conn_b.snappy_enabled);
    }

    #[tokio::test]
    async fn two_nodes_reach_ready_and_emit_events() {
        let context_a = test_context(test_backends(TestChain::single_genesis()));
        let context_b = test_context(test_backends(TestChain::single_genesis()));
        let mut events_a = context_a.events.subscribe();
        let mut events_b = context_b.events.subscribe();

        let (conn_a, conn_b) = hello_pair(context_a, context_b).await;
        let (handle_a, task_a) = spawn_session(conn_a);
        let (handle_b, task_b) = spawn_session(conn_b);

        let deadline = Duration::from_secs(2);
        for events in [&mut events_a, &mut events_b] {
            let connected = time::timeout(deadline, events.recv()).await.unwrap().unwrap();
            assert!(matches!(connected, NetworkEvent::PeerConnected { .. }));
            let status = time::timeout(deadline, events.recv()).await.unwrap().unwrap();
            match status {
                NetworkEvent::EthStatus { status, .. } => {
                    assert_eq!(status.eth_version, 68);
                    assert_eq!(status.network_id, 1);
                    assert!(status.fork_id.is_some());
                }
                other => panic!("expected EthStatus, got {other:?}"),
            }
        }

        drop(handle_a);
        drop(handle_b);
        task_a.await.unwrap().unwrap();
        task_b.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn block_headers_request_roundtrips() {
        let context_a = test_context(test_backends(TestChain::single_genesis()));
        let context_b = test_context(test_backends(TestChain::single_genesis()));
        let (conn_a, conn_b) = hello_pair(context_a, context_b).await;
        let (_handle_a, _task_a) = spawn_session(conn_a);
        let (handle_b, _task_b) = spawn_session(conn_b);

        let headers = time::timeout(
            Duration::from_secs(1),
            handle_b.get_block_headers(HashOrNumber::Number(0), 5, 0, false),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(headers, vec![BlockHeader::default()]);
    }

    #[tokio::test]
    async fn request_past_head_resolves_empty() {
        let context_a = test_context(test_backends(TestChain::single_genesis()));
        let context_b = test_context(test_backends(TestChain::single_genesis()));
        let (conn_a, conn_b) = hello_pair(context_a, context_b).await;
        let (_handle_a, _task_a) = spawn_session(conn_a);
        let (handle_b, _task_b) = spawn_session(conn_b);

        let headers = time::timeout(
            Duration::from_secs(1),
            handle_b.get_block_headers(HashOrNumber::Number(1), 1, 0, false),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(headers.is_empty());
    }

    #[tokio::test]
    async fn unanswered_request_times_out() {
        let context_a = test_context(test_backends(TestChain::single_genesis()));
        let context_b = test_context_with(test_backends(TestChain::single_genesis()), |c| {
            c.request_timeout = Duration::from_millis(200);
        });
        let (conn_a, conn_b) = hello_pair(context_a, context_b).await;
        // swallow every request
        let _peer = spawn_scripted_peer(conn_a, |_| None);
        let (handle_b, _task_b) = spawn_session(conn_b);

        let started = std::time::Instant::now();
        let result = handle_b.get_block_bodies(vec![H256::repeat_byte(1)]).await;
        assert!(matches!(result, Err(RLPxError::RequestTimeout)));
        assert!(started.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn genesis_mismatch_disconnects_both_sides() {
        let context_a = test_context(test_backends(TestChain::single_genesis()));
        let other_genesis = BlockHeader {
            extra_data: Bytes::from_static(b"other chain"),
            ..Default::default()
        };
        let context_b = test_context(test_backends(TestChain::with_genesis(other_genesis)));
        let (conn_a, conn_b) = hello_pair(context_a, context_b).await;
        let (_handle_a, task_a) = spawn_session(conn_a);
        let (_handle_b, task_b) = spawn_session(conn_b);

        let result_a = time::timeout(Duration::from_millis(500), task_a)
            .await
            .unwrap()
            .unwrap();
        let result_b = time::timeout(Duration::from_millis(500), task_b)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result_a, Err(RLPxError::GenesisMismatch)));
        assert!(matches!(result_b, Err(RLPxError::GenesisMismatch)));
    }

    #[tokio::test]
    async fn concurrent_identical_requests_share_one_exchange() {
        let context_a = test_context(test_backends(TestChain::single_genesis()));
        let context_b = test_context(test_backends(TestChain::single_genesis()));
        let (conn_a, conn_b) = hello_pair(context_a, context_b).await;

        let requests_seen = Arc::new(AtomicUsize::new(0));
        let seen = requests_seen.clone();
        let mut conn_a = conn_a;
        let _peer = tokio::spawn(async move {
            let _ = conn_a.exchange_eth_status().await;
            loop {
                match conn_a.receive().await {
                    Ok(Message::GetByteCodes(req)) => {
                        seen.fetch_add(1, Ordering::SeqCst);
                        // delay the answer so the second caller joins the
                        // in-flight request
                        time::sleep(Duration::from_millis(100)).await;
                        let response = ByteCodes {
                            id: req.id,
                            codes: vec![Bytes::from_static(&[0x60])],
                        };
                        if conn_a.send(Message::ByteCodes(response)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Ping(_)) => {
                        let _ = conn_a.send(Message::Pong(PongMessage::new())).await;
                    }
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        });

        let (handle_b, _task_b) = spawn_session(conn_b);
        let hashes = vec![H256::repeat_byte(1), H256::repeat_byte(2)];
        let (first, second) = tokio::join!(
            handle_b.get_byte_codes(hashes.clone()),
            handle_b.get_byte_codes(hashes.clone())
        );
        assert_eq!(first.unwrap(), vec![Bytes::from_static(&[0x60])]);
        assert_eq!(second.unwrap(), vec![Bytes::from_static(&[0x60])]);
        assert_eq!(requests_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_pongs_abort_the_session() {
        let context_a = test_context(test_backends(TestChain::single_genesis()));
        let context_b = test_context_with(test_backends(TestChain::single_genesis()), |c| {
            c.keepalive_ping_interval = Duration::from_millis(100);
            c.keepalive_pong_timeout = Duration::from_millis(200);
        });
        let (conn_a, conn_b) = hello_pair(context_a, context_b).await;

        // a peer that never answers pings
        let mut conn_a = conn_a;
        let _peer = tokio::spawn(async move {
            let _ = conn_a.exchange_eth_status().await;
            while conn_a.receive().await.is_ok() {}
        });

        let (_handle_b, task_b) = spawn_session(conn_b);
        let result = time::timeout(Duration::from_secs(2), task_b)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(RLPxError::KeepaliveTimeout)));
    }

    #[tokio::test]
    async fn close_fails_pending_requests_with_session_closed() {
        let context_a = test_context(test_backends(TestChain::single_genesis()));
        let context_b = test_context(test_backends(TestChain::single_genesis()));
        let (conn_a, conn_b) = hello_pair(context_a, context_b).await;
        let _peer = spawn_scripted_peer(conn_a, |_| None);
        let (handle_b, task_b) = spawn_session(conn_b);

        let pending = tokio::spawn({
            let handle_b = handle_b.clone();
            async move { handle_b.get_block_bodies(vec![H256::repeat_byte(9)]).await }
        });
        time::sleep(Duration::from_millis(100)).await;
        handle_b.close(None).await;

        let result = pending.await.unwrap();
        assert!(matches!(result, Err(RLPxError::SessionClosed)));
        assert!(task_b.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn orphan_responses_are_discarded() {
        let context_a = test_context(test_backends(TestChain::single_genesis()));
        let context_b = test_context(test_backends(TestChain::single_genesis()));
        let (conn_a, conn_b) = hello_pair(context_a, context_b).await;

        // the remote injects a response nobody asked for before every real
        // answer
        let mut conn_a = conn_a;
        let _peer = tokio::spawn(async move {
            let _ = conn_a.exchange_eth_status().await;
            loop {
                match conn_a.receive().await {
                    Ok(Message::GetByteCodes(req)) => {
                        let orphan = Message::ByteCodes(ByteCodes {
                            id: req.id + 1000,
                            codes: vec![],
                        });
                        let answer = Message::ByteCodes(ByteCodes {
                            id: req.id,
                            codes: vec![],
                        });
                        if conn_a.send(orphan).await.is_err()
                            || conn_a.send(answer).await.is_err()
                        {
                            break;
                        }
                    }
                    Ok(Message::Ping(_)) => {
                        let _ = conn_a.send(Message::Pong(PongMessage::new())).await;
                    }
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        });
        let (handle_b, _task_b) = spawn_session(conn_b);

        // the orphan is dropped and the request still resolves
        let codes = time::timeout(
            Duration::from_secs(1),
            handle_b.get_byte_codes(vec![H256::repeat_byte(3)]),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(codes.is_empty());
    }

    #[tokio::test]
    async fn requests_are_refused_without_a_negotiated_capability() {
        let context_a = test_context_with(test_backends(TestChain::single_genesis()), |c| {
            // eth only, no snap
            c.capabilities = vec![crate::rlpx::capabilities::Capability::eth(68)];
        });
        let context_b = test_context_with(test_backends(TestChain::single_genesis()), |c| {
            c.capabilities = vec![crate::rlpx::capabilities::Capability::eth(68)];
        });
        let (conn_a, conn_b) = hello_pair(context_a, context_b).await;
        let (_handle_a, _task_a) = spawn_session(conn_a);
        let (handle_b, _task_b) = spawn_session(conn_b);

        let result = handle_b.get_byte_codes(vec![H256::repeat_byte(1)]).await;
        assert!(matches!(result, Err(RLPxError::IncompatibleProtocol(_))));
    }
}

async fn sleep_until_optional(deadline: Option<Instant>) {
    match deadline {
        Some(at) => time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

enum RLPxConnectionState {
    Initiator(Initiator),
    Receiver(Receiver),
    ReceivedAuth(ReceivedAuth),
    InitiatedAuth(InitiatedAuth),
    Established(Box<Established>),
}

#[derive(Clone)]
struct Receiver {
    pub(crate) nonce: H256,
    pub(crate) ephemeral_key: SecretKey,
}

impl Receiver {
    pub fn new(nonce: H256, ephemeral_key: SecretKey) -> Self {
        Self {
            nonce,
            ephemeral_key,
        }
    }
}

#[derive(Clone)]
struct Initiator {
    pub(crate) nonce: H256,
    pub(crate) ephemeral_key: SecretKey,
    pub(crate) remote_node_id: H512,
}

impl Initiator {
    pub fn new(nonce: H256, ephemeral_key: SecretKey, remote_node_id: H512) -> Self {
        Self {
            nonce,
            ephemeral_key,
            remote_node_id,
        }
    }
}

#[derive(Clone)]
struct ReceivedAuth {
    pub(crate) local_nonce: H256,
    pub(crate) local_ephemeral_key: SecretKey,
    pub(crate) remote_node_id: H512,
    pub(crate) remote_nonce: H256,
    pub(crate) remote_ephemeral_key: PublicKey,
    pub(crate) remote_init_message: Vec<u8>,
}

impl ReceivedAuth {
    pub fn new(
        previous_state: Receiver,
        remote_node_id: H512,
        remote_init_message: Vec<u8>,
        remote_nonce: H256,
        remote_ephemeral_key: PublicKey,
    ) -> Self {
        Self {
            local_nonce: previous_state.nonce,
            local_ephemeral_key: previous_state.ephemeral_key,
            remote_node_id,
            remote_nonce,
            remote_ephemeral_key,
            remote_init_message,
        }
    }
}

#[derive(Clone)]
struct InitiatedAuth {
    pub(crate) remote_node_id: H512,
    pub(crate) local_nonce: H256,
    pub(crate) local_ephemeral_key: SecretKey,
    pub(crate) local_init_message: Vec<u8>,
}

impl InitiatedAuth {
    pub fn new(previous_state: Initiator, local_init_message: Vec<u8>) -> Self {
        Self {
            remote_node_id: previous_state.remote_node_id,
            local_nonce: previous_state.nonce,
            local_ephemeral_key: previous_state.ephemeral_key,
            local_init_message,
        }
    }
}

/// The ingress half of the frame secrets.
pub(crate) struct IngressState {
    pub mac_key: H256,
    pub ingress_mac: Keccak256,
    pub ingress_aes: Aes256Ctr64BE,
}

/// The egress half of the frame secrets.
pub(crate) struct EgressState {
    pub mac_key: H256,
    pub egress_mac: Keccak256,
    pub egress_aes: Aes256Ctr64BE,
}

pub(crate) struct Established {
    pub remote_node_id: H512,
    pub ingress: IngressState,
    pub egress: EgressState,
}

impl Established {
    fn for_receiver(previous_state: ReceivedAuth, init_message: Vec<u8>) -> Self {
        // keccak256(nonce || initiator-nonce); remote node is the initiator
        let hashed_nonces = Keccak256::digest(
            [previous_state.local_nonce.0, previous_state.remote_nonce.0].concat(),
        )
        .into();

        Self::derive(
            previous_state.remote_node_id,
            init_message,
            previous_state.local_nonce,
            previous_state.local_ephemeral_key,
            hashed_nonces,
            previous_state.remote_init_message,
            previous_state.remote_nonce,
            previous_state.remote_ephemeral_key,
        )
    }

    fn for_initiator(
        previous_state: InitiatedAuth,
        remote_init_message: Vec<u8>,
        remote_nonce: H256,
        remote_ephemeral_key: PublicKey,
    ) -> Self {
        // keccak256(nonce || initiator-nonce); the local node is the initiator
        let hashed_nonces =
            Keccak256::digest([remote_nonce.0, previous_state.local_nonce.0].concat()).into();

        Self::derive(
            previous_state.remote_node_id,
            previous_state.local_init_message,
            previous_state.local_nonce,
            previous_state.local_ephemeral_key,
            hashed_nonces,
            remote_init_message,
            remote_nonce,
            remote_ephemeral_key,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn derive(
        remote_node_id: H512,
        local_init_message: Vec<u8>,
        local_nonce: H256,
        local_ephemeral_key: SecretKey,
        hashed_nonces: [u8; 32],
        remote_init_message: Vec<u8>,
        remote_nonce: H256,
        remote_ephemeral_key: PublicKey,
    ) -> Self {
        let ephemeral_key_secret = ecdh_xchng(&local_ephemeral_key, &remote_ephemeral_key);

        // shared-secret = keccak256(ephemeral-key || keccak256(nonce || initiator-nonce))
        let shared_secret =
            Keccak256::digest([ephemeral_key_secret, hashed_nonces].concat()).into();
        // aes-secret = keccak256(ephemeral-key || shared-secret)
        let aes_key =
            H256(Keccak256::digest([ephemeral_key_secret, shared_secret].concat()).into());
        // mac-secret = keccak256(ephemeral-key || aes-secret)
        let mac_key = H256(Keccak256::digest([ephemeral_key_secret, aes_key.0].concat()).into());

        // egress-mac = keccak256.init((mac-secret ^ remote-nonce) || local-init-msg)
        let egress_mac = Keccak256::default()
            .chain_update(mac_key ^ remote_nonce)
            .chain_update(&local_init_message);

        // ingress-mac = keccak256.init((mac-secret ^ local-nonce) || remote-init-msg)
        let ingress_mac = Keccak256::default()
            .chain_update(mac_key ^ local_nonce)
            .chain_update(&remote_init_message);

        let ingress_aes = <Aes256Ctr64BE as KeyIvInit>::new(&aes_key.0.into(), &[0; 16].into());
        let egress_aes = ingress_aes.clone();

        Self {
            remote_node_id,
            ingress: IngressState {
                mac_key,
                ingress_mac,
                ingress_aes,
            },
            egress: EgressState {
                mac_key,
                egress_mac,
                egress_aes,
            },
        }
    }
}

//! WebSocket Mint Server
//!
//! Async WebSocket server in front of a single `MintContract`.
//! Handles authentication, request routing and event fan-out.
//!
//! All operations go through one `Mutex`, so they apply in arrival order
//! and each runs to completion before the next starts. Events committed by
//! an operation are broadcast while the lock is still held, which keeps the
//! broadcast order equal to the commit order.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::time::sleep;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::core::types::Address;
use crate::mint::contract::{CallContext, MintContract, MintReceipt};
use crate::mint::error::MintError;
use crate::mint::events::ContractEvent;
use crate::network::auth::{validate_token, AuthConfig, AuthError};
use crate::network::protocol::{
    AffiliateMintRequest, AuthRequest, AuthResult, ClientMessage, ConfigUpdate, ErrorCode,
    MintForAddressRequest, MintRequest, QueryAnswer, QueryRequest, Receipt, ReceiptOutcome,
    ServerError, ServerMessage,
};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Close connections that send nothing for this long.
    pub idle_timeout: Duration,
    /// Events buffered per subscriber before it lags.
    pub event_buffer: usize,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            idle_timeout: Duration::from_secs(300),
            event_buffer: 256,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: std::env::var("MINT_BIND_ADDR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.bind_addr),
            max_connections: std::env::var("MINT_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_connections),
            ..defaults
        }
    }
}

/// Mint server errors.
#[derive(Debug, thiserror::Error)]
pub enum MintServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),
}

/// Per-connection protocol state.
#[derive(Debug, Default)]
pub struct ClientSession {
    /// Caller address once authenticated.
    pub address: Option<Address>,
    /// Receives committed events.
    pub subscribed: bool,
}

/// Connected client bookkeeping.
struct ConnectedClient {
    address: Option<Address>,
    connected_at: Instant,
}

type ClientMap = Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>;

fn server_time_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

// =============================================================================
// REQUEST HANDLING
// =============================================================================

/// Request router shared by every connection.
///
/// Cheap to clone. Transport-free, so it can be driven directly.
#[derive(Clone)]
pub struct MintService {
    contract: Arc<Mutex<MintContract>>,
    auth: Arc<AuthConfig>,
    events_tx: broadcast::Sender<ContractEvent>,
    version: String,
}

impl MintService {
    /// Wrap a contract.
    pub fn new(contract: MintContract, auth: AuthConfig, event_buffer: usize, version: String) -> Self {
        let (events_tx, _) = broadcast::channel(event_buffer.max(1));
        Self {
            contract: Arc::new(Mutex::new(contract)),
            auth: Arc::new(auth),
            events_tx,
            version,
        }
    }

    /// New receiver for committed events.
    pub fn subscribe(&self) -> broadcast::Receiver<ContractEvent> {
        self.events_tx.subscribe()
    }

    /// Handle one client message.
    ///
    /// Returns None when there is nothing to send back.
    pub async fn handle_message(&self, session: &mut ClientSession, msg: ClientMessage) -> Option<ServerMessage> {
        let address = match (&msg, session.address) {
            (ClientMessage::Auth(auth), _) => return Some(self.handle_auth(session, auth)),
            (ClientMessage::Ping { timestamp }, _) => {
                return Some(ServerMessage::Pong {
                    timestamp: *timestamp,
                    server_time: server_time_millis(),
                })
            }
            (_, Some(address)) => address,
            (_, None) => {
                return Some(ServerMessage::Error(ServerError::new(
                    ErrorCode::NotAuthenticated,
                    "Authenticate first",
                )))
            }
        };

        let reply = match msg {
            ClientMessage::Mint(req) => self.handle_mint(address, req).await,
            ClientMessage::AffiliateMint(req) => self.handle_affiliate_mint(address, req).await,
            ClientMessage::MintForAddress(req) => self.handle_mint_for_address(address, req).await,
            ClientMessage::Withdraw => self.handle_withdraw(address).await,
            ClientMessage::Configure { update } => self.handle_configure(address, update).await,
            ClientMessage::Query { query } => self.handle_query(query).await,
            ClientMessage::Subscribe => {
                session.subscribed = true;
                debug!("{} subscribed to events", address.short());
                return None;
            }
            ClientMessage::Auth(_) | ClientMessage::Ping { .. } => return None,
        };

        Some(match reply {
            Ok(msg) => msg,
            Err(err) => ServerMessage::Error(ServerError::from(&err)),
        })
    }

    fn handle_auth(&self, session: &mut ClientSession, auth: &AuthRequest) -> ServerMessage {
        let result = validate_token(&auth.token, &self.auth).and_then(|claims| claims.address());
        match result {
            Ok(address) => {
                session.address = Some(address);
                info!("Client authenticated as {} (client {})", address.short(), auth.client_version);
                ServerMessage::AuthResult(AuthResult {
                    success: true,
                    address: Some(address),
                    error: None,
                    server_version: self.version.clone(),
                })
            }
            Err(e) => {
                warn!("Authentication failed: {}", e);
                let code = match e {
                    AuthError::Expired => ErrorCode::TokenExpired,
                    AuthError::NotConfigured => ErrorCode::AuthFailed,
                    _ => ErrorCode::InvalidToken,
                };
                ServerMessage::Error(ServerError::new(code, e.to_string()))
            }
        }
    }

    /// Run `op` under the contract lock and broadcast what it committed.
    async fn execute<T>(
        &self,
        op: impl FnOnce(&mut MintContract) -> Result<T, MintError>,
    ) -> Result<T, MintError> {
        let mut contract = self.contract.lock().await;
        let from = contract.events().len() as u64;
        let result = op(&mut *contract)?;
        for event in contract.events_since(from) {
            // No receivers is fine
            let _ = self.events_tx.send(event.clone());
        }
        Ok(result)
    }

    fn minted(receipt: MintReceipt) -> ServerMessage {
        ServerMessage::Receipt(Receipt::new(ReceiptOutcome::Minted {
            tokens: receipt.tokens,
            paid: receipt.paid,
            referral_tax: receipt.referral_tax,
        }))
    }

    async fn handle_mint(&self, address: Address, req: MintRequest) -> Result<ServerMessage, MintError> {
        let ctx = CallContext::direct(address, req.value);
        self.execute(|c| c.mint(ctx, req.amount)).await.map(Self::minted)
    }

    async fn handle_affiliate_mint(
        &self,
        address: Address,
        req: AffiliateMintRequest,
    ) -> Result<ServerMessage, MintError> {
        let ctx = CallContext::direct(address, req.value);
        self.execute(|c| c.affiliate_mint(ctx, &req.proof, req.secret, req.amount, req.referred))
            .await
            .map(Self::minted)
    }

    async fn handle_mint_for_address(
        &self,
        address: Address,
        req: MintForAddressRequest,
    ) -> Result<ServerMessage, MintError> {
        let ctx = CallContext::direct(address, 0);
        self.execute(|c| c.mint_for_address(ctx, req.amount, req.receiver))
            .await
            .map(Self::minted)
    }

    async fn handle_withdraw(&self, address: Address) -> Result<ServerMessage, MintError> {
        let amount = self.execute(|c| c.withdraw(CallContext::direct(address, 0))).await?;
        Ok(ServerMessage::Receipt(Receipt::new(ReceiptOutcome::Withdrawn { amount })))
    }

    async fn handle_configure(&self, address: Address, update: ConfigUpdate) -> Result<ServerMessage, MintError> {
        let ctx = CallContext::direct(address, 0);
        let applied = update.clone();
        self.execute(|c| match update {
            ConfigUpdate::UnitPrice(v) => c.set_unit_price(ctx, v),
            ConfigUpdate::GlobalSupplyCap(v) => c.set_global_supply_cap(ctx, v),
            ConfigUpdate::PerWalletCap(v) => c.set_per_wallet_cap(ctx, v),
            ConfigUpdate::BaseUri(v) => c.set_base_uri(ctx, v),
            ConfigUpdate::UriSuffix(v) => c.set_uri_suffix(ctx, v),
            ConfigUpdate::MerkleRoot(v) => c.set_merkle_root(ctx, v),
            ConfigUpdate::MerkleDepth(v) => c.set_merkle_depth(ctx, v),
            ConfigUpdate::Paused(v) => c.set_paused(ctx, v),
            ConfigUpdate::Owner(v) => c.transfer_ownership(ctx, v),
        })
        .await?;
        Ok(ServerMessage::Receipt(Receipt::new(ReceiptOutcome::Configured { update: applied })))
    }

    async fn handle_query(&self, query: QueryRequest) -> Result<ServerMessage, MintError> {
        let contract = self.contract.lock().await;
        let answer = match query {
            QueryRequest::Config => QueryAnswer::Config(contract.config().clone()),
            QueryRequest::Owner => QueryAnswer::Owner(contract.owner()),
            QueryRequest::Balance => QueryAnswer::Balance(contract.balance()),
            QueryRequest::TotalIssued => QueryAnswer::TotalIssued(contract.total_issued()),
            QueryRequest::MintedBy { wallet } => QueryAnswer::MintedBy(contract.minted_by(&wallet)),
            QueryRequest::IsRedeemed { secret } => QueryAnswer::IsRedeemed(contract.is_redeemed(&secret)),
            QueryRequest::TokenUri { token_id } => QueryAnswer::TokenUri(contract.token_uri(token_id)?),
            QueryRequest::OwnerOf { token_id } => QueryAnswer::OwnerOf(contract.owner_of(token_id)?),
            QueryRequest::TokensOfOwner { wallet } => QueryAnswer::TokensOfOwner(contract.tokens_of_owner(&wallet)),
            QueryRequest::StateHash => QueryAnswer::StateHash(contract.state_hash()),
            QueryRequest::Events { since } => QueryAnswer::Events(contract.events_since(since).to_vec()),
        };
        Ok(ServerMessage::QueryResult { answer })
    }
}

// =============================================================================
// SERVER
// =============================================================================

/// The mint server.
pub struct MintServer {
    /// Server configuration.
    config: ServerConfig,
    /// Request router.
    service: MintService,
    /// Connected clients.
    clients: ClientMap,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl MintServer {
    /// Create a server around a contract.
    pub fn new(config: ServerConfig, auth: AuthConfig, contract: MintContract) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let service = MintService::new(contract, auth, config.event_buffer, config.version.clone());

        Self {
            config,
            service,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Request router (for in-process callers).
    pub fn service(&self) -> &MintService {
        &self.service
    }

    /// Run the server until `shutdown` is called.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), MintServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Mint server listening on {}", self.config.bind_addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => self.admit(stream, addr).await,
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Register a new connection, or turn it away when the server is full.
    async fn admit(&self, stream: TcpStream, addr: SocketAddr) {
        {
            let mut clients = self.clients.write().await;
            if clients.len() >= self.config.max_connections {
                warn!("Connection limit reached, rejecting {}", addr);
                tokio::spawn(reject_overloaded(stream, addr));
                return;
            }
            clients.insert(addr, ConnectedClient {
                address: None,
                connected_at: Instant::now(),
            });
        }

        info!("New connection from {}", addr);
        let clients = self.clients.clone();
        let service = self.service.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();
        let idle_timeout = self.config.idle_timeout;

        tokio::spawn(async move {
            serve_connection(stream, addr, service, clients.clone(), shutdown_rx, idle_timeout).await;

            if let Some(client) = clients.write().await.remove(&addr) {
                info!(
                    "Client {} ({:?}) cleaned up after {:?}",
                    addr,
                    client.address.map(|a| a.short()),
                    client.connected_at.elapsed()
                );
            }
        });
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }
}

/// Drive one WebSocket connection until it closes, idles out or the
/// server shuts down.
async fn serve_connection(
    stream: TcpStream,
    addr: SocketAddr,
    service: MintService,
    clients: ClientMap,
    mut shutdown_rx: broadcast::Receiver<()>,
    idle_timeout: Duration,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            error!("WebSocket handshake failed for {}: {}", addr, e);
            return;
        }
    };

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);

    let sender_task = tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            let text = match msg.to_json() {
                Ok(t) => t,
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(text)).await.is_err() {
                return;
            }
        }
        let _ = ws_sender.close().await;
    });

    let mut session = ClientSession::default();
    let mut events_rx: Option<broadcast::Receiver<ContractEvent>> = None;
    let idle = sleep(idle_timeout);
    tokio::pin!(idle);

    loop {
        tokio::select! {
            msg = ws_receiver.next() => {
                idle.as_mut().reset(tokio::time::Instant::now() + idle_timeout);

                let client_msg = match msg {
                    Some(Ok(Message::Text(text))) => match ClientMessage::from_json(&text) {
                        Ok(m) => m,
                        Err(e) => {
                            debug!("Invalid message from {}: {}", addr, e);
                            let _ = msg_tx.send(ServerMessage::Error(ServerError::new(
                                ErrorCode::InvalidInput,
                                "Invalid message format",
                            ))).await;
                            continue;
                        }
                    },
                    // Binary frames carry a bare public mint request
                    Some(Ok(Message::Binary(data))) => match MintRequest::from_bytes(&data) {
                        Ok(req) => ClientMessage::Mint(req),
                        Err(e) => {
                            debug!("Invalid binary message from {}: {}", addr, e);
                            continue;
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Client {} disconnected", addr);
                        break;
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error for {}: {}", addr, e);
                        break;
                    }
                    _ => continue,
                };

                let was_authenticated = session.address.is_some();
                let reply = service.handle_message(&mut session, client_msg).await;

                if !was_authenticated && session.address.is_some() {
                    if let Some(client) = clients.write().await.get_mut(&addr) {
                        client.address = session.address;
                    }
                }
                if session.subscribed && events_rx.is_none() {
                    events_rx = Some(service.subscribe());
                }
                if let Some(reply) = reply {
                    if msg_tx.send(reply).await.is_err() {
                        break;
                    }
                }
            }
            event = next_event(&mut events_rx) => {
                match event {
                    Ok(event) => {
                        if msg_tx.send(ServerMessage::Event(event)).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Subscriber {} lagged, skipped {} events", addr, skipped);
                    }
                    Err(RecvError::Closed) => {
                        events_rx = None;
                    }
                }
            }
            () = &mut idle => {
                info!("Closing idle client {}", addr);
                break;
            }
            _ = shutdown_rx.recv() => {
                let _ = msg_tx.send(ServerMessage::Shutdown {
                    reason: "Server shutting down".to_string(),
                }).await;
                break;
            }
        }
    }

    // Let queued replies flush before tearing down
    drop(msg_tx);
    let _ = sender_task.await;
}

/// Complete the handshake only to report that the server is full.
async fn reject_overloaded(stream: TcpStream, addr: SocketAddr) {
    let mut ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!("Handshake with rejected client {} failed: {}", addr, e);
            return;
        }
    };
    let msg = ServerMessage::Error(ServerError::new(ErrorCode::ServerOverloaded, "Too many connections"));
    if let Ok(text) = msg.to_json() {
        let _ = ws.send(Message::Text(text)).await;
    }
    let _ = ws.close(None).await;
}

/// Next event from an optional subscription. Pends forever when absent.
async fn next_event(rx: &mut Option<broadcast::Receiver<ContractEvent>>) -> Result<ContractEvent, RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Secret;
    use crate::mint::config::{ContractSettings, MintConfiguration};
    use crate::mint::events::ContractEventData;
    use crate::mint::ledger::TokenIdRange;
    use crate::network::auth::TokenClaims;
    use crate::proof::merkle::MerkleTree;
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    const SECRET: &str = "server-test-secret-0123456789!!";
    const OWNER: Address = Address::new([0x01; 20]);
    const ALICE: Address = Address::new([0xa1; 20]);
    const BOB: Address = Address::new([0xb0; 20]);

    fn token_for(wallet: Address) -> String {
        let claims = TokenClaims {
            sub: format!("user-{}", wallet),
            wallet: Some(wallet.to_string()),
            exp: chrono::Utc::now().timestamp() as u64 + 3600,
            iat: 0,
            iss: None,
            aud: None,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
    }

    fn secrets() -> Vec<Secret> {
        (1u64..=4).map(|i| Secret::new(i.to_be_bytes())).collect()
    }

    fn service() -> (MintService, MerkleTree) {
        let tree = MerkleTree::from_secrets(&secrets());
        let config = MintConfiguration {
            unit_price: 100,
            global_supply_cap: 20,
            per_wallet_cap: 5,
            paused: false,
            merkle_root: tree.root(),
            ..Default::default()
        };
        let contract = MintContract::new(
            OWNER,
            config,
            Default::default(),
            Default::default(),
        );
        let auth = AuthConfig { secret: Some(SECRET.into()), ..Default::default() };
        (MintService::new(contract, auth, 16, "test".into()), tree)
    }

    async fn login(service: &MintService, wallet: Address) -> ClientSession {
        let mut session = ClientSession::default();
        let msg = ClientMessage::Auth(AuthRequest { token: token_for(wallet), client_version: "t".into() });
        match service.handle_message(&mut session, msg).await {
            Some(ServerMessage::AuthResult(r)) => assert_eq!(r.address, Some(wallet)),
            other => panic!("unexpected reply: {:?}", other),
        }
        session
    }

    fn rejection(reply: Option<ServerMessage>) -> String {
        match reply {
            Some(ServerMessage::Error(ServerError { code: ErrorCode::Rejected, reason: Some(r), .. })) => r,
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.bind_addr.port(), 8080);
    }

    #[tokio::test]
    async fn test_server_creation_and_shutdown() {
        let config = ServerConfig { bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)), ..Default::default() };
        let contract = MintContract::from_settings(ContractSettings { owner: OWNER, config: MintConfiguration::default() });
        let server = MintServer::new(config, AuthConfig::default(), contract);
        assert_eq!(server.connection_count().await, 0);
        server.shutdown();
    }

    #[tokio::test]
    async fn test_requires_authentication() {
        let (service, _) = service();
        let mut session = ClientSession::default();
        let msg = ClientMessage::Mint(MintRequest { amount: 1, value: 100 });
        match service.handle_message(&mut session, msg).await {
            Some(ServerMessage::Error(e)) => assert_eq!(e.code, ErrorCode::NotAuthenticated),
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bad_token_rejected() {
        let (service, _) = service();
        let mut session = ClientSession::default();
        let msg = ClientMessage::Auth(AuthRequest { token: "not.a.jwt".into(), client_version: "t".into() });
        match service.handle_message(&mut session, msg).await {
            Some(ServerMessage::Error(e)) => assert_eq!(e.code, ErrorCode::InvalidToken),
            other => panic!("unexpected reply: {:?}", other),
        }
        assert!(session.address.is_none());
    }

    #[tokio::test]
    async fn test_mint_receipt_and_event_broadcast() {
        let (service, _) = service();
        let mut events = service.subscribe();
        let mut alice = login(&service, ALICE).await;

        let msg = ClientMessage::Mint(MintRequest { amount: 2, value: 100 });
        match service.handle_message(&mut alice, msg).await {
            Some(ServerMessage::Receipt(r)) => {
                assert!(matches!(r.outcome, ReceiptOutcome::Minted { paid: 100, referral_tax: 0, .. }));
            }
            other => panic!("unexpected reply: {:?}", other),
        }

        let event = events.recv().await.unwrap();
        assert_eq!(event.seq, 0);
        assert!(matches!(event.data, ContractEventData::Minted { receiver, .. } if receiver == ALICE));
    }

    #[tokio::test]
    async fn test_affiliate_mint_over_service() {
        let (service, tree) = service();
        let mut alice = login(&service, ALICE).await;

        let req = AffiliateMintRequest {
            amount: 1,
            value: 100,
            secret: secrets()[2],
            proof: tree.proof(2).unwrap(),
            referred: BOB,
        };
        match service.handle_message(&mut alice, ClientMessage::AffiliateMint(req.clone())).await {
            Some(ServerMessage::Receipt(r)) => {
                assert!(matches!(r.outcome, ReceiptOutcome::Minted { referral_tax: 15, .. }));
            }
            other => panic!("unexpected reply: {:?}", other),
        }

        // Second use of the same secret
        let reply = service.handle_message(&mut alice, ClientMessage::AffiliateMint(req)).await;
        assert_eq!(rejection(reply), MintError::AlreadyRedeemed.code());
    }

    /// Send a message through its JSON form and parse the reply back.
    async fn over_json(service: &MintService, session: &mut ClientSession, msg: ClientMessage) -> ServerMessage {
        let msg = ClientMessage::from_json(&msg.to_json().unwrap()).unwrap();
        let reply = service.handle_message(session, msg).await.unwrap();
        ServerMessage::from_json(&reply.to_json().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_json_requests_end_to_end() {
        let (service, tree) = service();
        let mut alice = login(&service, ALICE).await;

        let mint = ClientMessage::from_json(r#"{"type":"mint","amount":2,"value":"100"}"#).unwrap();
        let reply = service.handle_message(&mut alice, mint).await.unwrap();
        match ServerMessage::from_json(&reply.to_json().unwrap()).unwrap() {
            ServerMessage::Receipt(r) => assert_eq!(
                r.outcome,
                ReceiptOutcome::Minted { tokens: TokenIdRange { first: 1, count: 2 }, paid: 100, referral_tax: 0 }
            ),
            other => panic!("unexpected reply: {:?}", other),
        }

        let req = AffiliateMintRequest {
            amount: 1,
            value: 100,
            secret: secrets()[0],
            proof: tree.proof(0).unwrap(),
            referred: BOB,
        };
        match over_json(&service, &mut alice, ClientMessage::AffiliateMint(req)).await {
            ServerMessage::Receipt(r) => {
                assert!(matches!(r.outcome, ReceiptOutcome::Minted { paid: 100, referral_tax: 15, .. }));
            }
            other => panic!("unexpected reply: {:?}", other),
        }

        let query = ClientMessage::Query { query: QueryRequest::Balance };
        match over_json(&service, &mut alice, query).await {
            ServerMessage::QueryResult { answer } => assert_eq!(answer, QueryAnswer::Balance(185)),
            other => panic!("unexpected reply: {:?}", other),
        }

        let mut owner = login(&service, OWNER).await;
        let price = ClientMessage::Configure { update: ConfigUpdate::UnitPrice(u128::MAX) };
        assert!(matches!(over_json(&service, &mut owner, price).await, ServerMessage::Receipt(_)));
        match over_json(&service, &mut owner, ClientMessage::Withdraw).await {
            ServerMessage::Receipt(r) => assert_eq!(r.outcome, ReceiptOutcome::Withdrawn { amount: 185 }),
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_owner_operations() {
        let (service, _) = service();
        let mut alice = login(&service, ALICE).await;
        let mut owner = login(&service, OWNER).await;

        let pause = ClientMessage::Configure { update: ConfigUpdate::Paused(true) };
        let reply = service.handle_message(&mut alice, pause.clone()).await;
        assert_eq!(rejection(reply), MintError::Unauthorized.code());
        assert!(matches!(
            service.handle_message(&mut owner, pause).await,
            Some(ServerMessage::Receipt(_))
        ));

        let mint = ClientMessage::Mint(MintRequest { amount: 1, value: 100 });
        let reply = service.handle_message(&mut alice, mint).await;
        assert_eq!(rejection(reply), MintError::Paused.code());

        let airdrop = ClientMessage::MintForAddress(MintForAddressRequest { amount: 3, receiver: ALICE });
        assert!(matches!(
            service.handle_message(&mut owner, airdrop).await,
            Some(ServerMessage::Receipt(_))
        ));

        let query = ClientMessage::Query { query: QueryRequest::TokensOfOwner { wallet: ALICE } };
        match service.handle_message(&mut alice, query).await {
            Some(ServerMessage::QueryResult { answer }) => assert_eq!(answer, QueryAnswer::TokensOfOwner(vec![1, 2, 3])),
            other => panic!("unexpected reply: {:?}", other),
        }

        let reply = service.handle_message(&mut owner, ClientMessage::Withdraw).await;
        assert_eq!(rejection(reply), MintError::ZeroBalance.code());
    }

    #[tokio::test]
    async fn test_query_nonexistent_token() {
        let (service, _) = service();
        let mut alice = login(&service, ALICE).await;
        let query = ClientMessage::Query { query: QueryRequest::TokenUri { token_id: 9 } };
        let reply = service.handle_message(&mut alice, query).await;
        assert_eq!(rejection(reply), MintError::NonexistentToken(9).code());
    }

    #[tokio::test]
    async fn test_subscribe_and_ping() {
        let (service, _) = service();
        let mut alice = login(&service, ALICE).await;

        assert!(service.handle_message(&mut alice, ClientMessage::Subscribe).await.is_none());
        assert!(alice.subscribed);

        match service.handle_message(&mut alice, ClientMessage::Ping { timestamp: 77 }).await {
            Some(ServerMessage::Pong { timestamp, .. }) => assert_eq!(timestamp, 77),
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    // ---- live connections ----

    fn local_server(config: ServerConfig) -> MintServer {
        let contract = MintContract::from_settings(ContractSettings { owner: OWNER, config: MintConfiguration::default() });
        let auth = AuthConfig { secret: Some(SECRET.into()), ..Default::default() };
        MintServer::new(config, auth, contract)
    }

    /// Open a client connection and hand the server side to `admit`.
    async fn connect(server: &MintServer) -> WebSocketStream<MaybeTlsStream<TcpStream>> {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let local = listener.local_addr().unwrap();
        let client = tokio::spawn(async move { connect_async(format!("ws://{}", local)).await });
        let (stream, peer) = listener.accept().await.unwrap();
        server.admit(stream, peer).await;
        client.await.unwrap().unwrap().0
    }

    async fn wait_for_connections(server: &MintServer, expected: usize) {
        for _ in 0..500 {
            if server.connection_count().await == expected {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("connection count never reached {}", expected);
    }

    async fn next_text(ws: &mut WebSocketStream<MaybeTlsStream<TcpStream>>) -> ServerMessage {
        loop {
            match tokio::time::timeout(Duration::from_secs(5), ws.next()).await.unwrap() {
                Some(Ok(Message::Text(text))) => return ServerMessage::from_json(&text).unwrap(),
                Some(Ok(_)) => continue,
                other => panic!("connection ended early: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_idle_connection_is_closed() {
        let server = local_server(ServerConfig { idle_timeout: Duration::from_millis(100), ..Default::default() });
        let mut ws = connect(&server).await;
        assert_eq!(server.connection_count().await, 1);

        let closed = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match ws.next().await {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => continue,
                }
            }
        })
        .await;
        assert!(closed.is_ok(), "idle connection stayed open");
        wait_for_connections(&server, 0).await;
    }

    #[tokio::test]
    async fn test_activity_keeps_connection_open() {
        let server = local_server(ServerConfig { idle_timeout: Duration::from_millis(1000), ..Default::default() });
        let mut ws = connect(&server).await;

        for timestamp in 0..4 {
            sleep(Duration::from_millis(300)).await;
            let ping = ClientMessage::Ping { timestamp }.to_json().unwrap();
            ws.send(Message::Text(ping)).await.unwrap();
            match next_text(&mut ws).await {
                ServerMessage::Pong { timestamp: t, .. } => assert_eq!(t, timestamp),
                other => panic!("unexpected reply: {:?}", other),
            }
        }
        assert_eq!(server.connection_count().await, 1);
    }

    #[tokio::test]
    async fn test_connection_limit_sends_overloaded() {
        let server = local_server(ServerConfig { max_connections: 1, ..Default::default() });
        let _first = connect(&server).await;
        let mut second = connect(&server).await;

        match next_text(&mut second).await {
            ServerMessage::Error(e) => assert_eq!(e.code, ErrorCode::ServerOverloaded),
            other => panic!("unexpected reply: {:?}", other),
        }
        assert_eq!(server.connection_count().await, 1);
    }
}

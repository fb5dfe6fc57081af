//! MQTT transport built on `rumqttc`.
//!
//! Each session runs a pump task that polls the rumqttc event loop and
//! posts [`TransportEvent`]s back to the manager. Reconnecting after a
//! network failure happens here, with backoff; the manager only sees the
//! resulting `Disconnected`/`Connected` events.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rumqttc::{
    AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet,
    TlsConfiguration,
};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::transport::{
    MqttConfig, Transport, TransportError, TransportErrorKind, TransportEvent,
    TransportEventSender, TransportFailure, TransportSession, TrustAnchors,
};
use crate::types::ReconnectConfig;

const MQTT_PORT: u16 = 1883;
const MQTTS_PORT: u16 = 8883;

/// rumqttc rejects shorter keep-alive intervals.
const MIN_KEEP_ALIVE: Duration = Duration::from_secs(5);

/// Tuning for [`MqttTransport`] sessions.
#[derive(Debug, Clone)]
pub struct MqttTransportSettings {
    pub keep_alive: Duration,
    pub reconnect: ReconnectConfig,
    /// Request queue capacity of the rumqttc client.
    pub capacity: usize,
}

impl Default for MqttTransportSettings {
    fn default() -> Self {
        Self {
            keep_alive: Duration::from_secs(30),
            reconnect: ReconnectConfig::default(),
            capacity: 10,
        }
    }
}

/// [`Transport`] implementation backed by `rumqttc`.
#[derive(Debug, Clone, Default)]
pub struct MqttTransport {
    settings: MqttTransportSettings,
}

impl MqttTransport {
    pub fn new(settings: MqttTransportSettings) -> Self {
        Self { settings }
    }
}

impl Transport for MqttTransport {
    type Session = MqttSession;

    /// Must be called from within a tokio runtime; the pump task is
    /// spawned on it.
    fn init(
        &mut self,
        config: &MqttConfig,
        events: TransportEventSender,
    ) -> Result<MqttSession, TransportError> {
        let runtime = Handle::try_current().map_err(|_| TransportError::NoRuntime)?;
        validate(config)?;
        Ok(MqttSession {
            config: config.clone(),
            settings: self.settings.clone(),
            events,
            runtime,
            client: None,
            pump: None,
            connected: Arc::new(AtomicBool::new(false)),
        })
    }
}

/// A rumqttc client plus the task polling its event loop.
pub struct MqttSession {
    config: MqttConfig,
    settings: MqttTransportSettings,
    events: TransportEventSender,
    runtime: Handle,
    client: Option<AsyncClient>,
    pump: Option<CancellationToken>,
    connected: Arc<AtomicBool>,
}

impl MqttSession {
    /// Replaces any running pump with a fresh client and event loop.
    fn spawn_pump(&mut self) -> Result<(), TransportError> {
        self.stop_pump();
        let options = mqtt_options(&self.config, &self.settings)?;
        let (client, eventloop) = AsyncClient::new(options, self.settings.capacity);
        let cancel = CancellationToken::new();
        let connected = Arc::new(AtomicBool::new(false));

        self.runtime.spawn(pump(
            eventloop,
            self.events.clone(),
            self.settings.reconnect.clone(),
            connected.clone(),
            cancel.clone(),
        ));
        self.client = Some(client);
        self.pump = Some(cancel);
        self.connected = connected;
        Ok(())
    }

    fn stop_pump(&mut self) {
        if let Some(cancel) = self.pump.take() {
            cancel.cancel();
        }
        self.client = None;
        self.connected.store(false, Ordering::Relaxed);
    }

    fn post_disconnected(&self) {
        if let Err(e) = self.events.try_send(TransportEvent::Disconnected) {
            warn!("failed to post disconnect event: {e}");
        }
    }
}

impl TransportSession for MqttSession {
    fn start(&mut self) {
        if let Err(e) = self.spawn_pump() {
            warn!(error = %e, "failed starting mqtt session");
        }
    }

    fn reconfigure(&mut self, config: &MqttConfig) -> Result<(), TransportError> {
        validate(config)?;
        self.config = config.clone();
        Ok(())
    }

    fn force_reconnect(&mut self) -> Result<(), TransportError> {
        self.spawn_pump()
    }

    fn disconnect(&mut self) {
        // A live connection gets a proper DISCONNECT; the pump reports it.
        let requested = match self.client.as_ref() {
            Some(client) if self.connected.load(Ordering::Relaxed) => client
                .try_disconnect()
                .map_err(|e| warn!(error = %e, "mqtt disconnect request failed"))
                .is_ok(),
            _ => false,
        };
        if !requested {
            self.stop_pump();
            self.post_disconnected();
        }
    }
}

impl Drop for MqttSession {
    fn drop(&mut self) {
        self.stop_pump();
    }
}

/// One poll of an MQTT event loop.
trait PollEvents: Send {
    fn poll(&mut self) -> impl Future<Output = Result<Event, ConnectionError>> + Send;
}

impl PollEvents for EventLoop {
    fn poll(&mut self) -> impl Future<Output = Result<Event, ConnectionError>> + Send {
        EventLoop::poll(self)
    }
}

/// What the pump does once the events of a poll are posted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AfterPoll {
    Poll,
    Stop,
    Backoff,
}

/// Translates one poll result into the events to post and the next step.
fn translate(polled: Result<Event, ConnectionError>) -> (Vec<TransportEvent>, AfterPoll) {
    match polled {
        Ok(Event::Incoming(Packet::ConnAck(_))) => {
            (vec![TransportEvent::Connected], AfterPoll::Poll)
        }
        Ok(Event::Incoming(Packet::Disconnect)) => {
            (vec![TransportEvent::Disconnected], AfterPoll::Poll)
        }
        Ok(Event::Incoming(packet)) => (
            incoming_event(&packet).into_iter().collect(),
            AfterPoll::Poll,
        ),
        Ok(Event::Outgoing(Outgoing::Disconnect)) => {
            (vec![TransportEvent::Disconnected], AfterPoll::Stop)
        }
        Ok(Event::Outgoing(_)) => (Vec::new(), AfterPoll::Poll),
        Err(e) => (
            vec![
                TransportEvent::Error(failure_from(&e)),
                TransportEvent::Disconnected,
            ],
            AfterPoll::Backoff,
        ),
    }
}

/// Posts `event` unless the pump is cancelled first.
///
/// Returns false once the pump should exit.
async fn post(
    events: &TransportEventSender,
    cancel: &CancellationToken,
    event: TransportEvent,
) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = events.send(event) => {
            if sent.is_err() {
                debug!("transport event receiver dropped, stopping pump");
            }
            sent.is_ok()
        }
    }
}

/// Polls `source` until cancelled, told to stop, or the manager goes away.
async fn pump<S: PollEvents>(
    mut source: S,
    events: TransportEventSender,
    reconnect: ReconnectConfig,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    let mut rng = StdRng::from_entropy();
    let mut attempt: u32 = 0;

    if post(&events, &cancel, TransportEvent::BeforeConnect).await {
        loop {
            let polled = tokio::select! {
                _ = cancel.cancelled() => break,
                polled = source.poll() => polled,
            };

            let (posted, next) = translate(polled);
            let mut delivered = true;
            for event in posted {
                match event {
                    TransportEvent::Connected => {
                        attempt = 0;
                        connected.store(true, Ordering::Relaxed);
                        info!("mqtt connected");
                    }
                    TransportEvent::Disconnected => connected.store(false, Ordering::Relaxed),
                    _ => {}
                }
                if !post(&events, &cancel, event).await {
                    delivered = false;
                    break;
                }
            }
            if !delivered {
                break;
            }

            match next {
                AfterPoll::Poll => {}
                AfterPoll::Stop => break,
                AfterPoll::Backoff => {
                    attempt = attempt.saturating_add(1);
                    let delay = reconnect.delay_for_attempt(attempt, &mut rng);
                    debug!(
                        attempt,
                        delay_secs = format_args!("{:.1}", delay.as_secs_f64()),
                        "mqtt reconnect scheduled"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    if !post(&events, &cancel, TransportEvent::BeforeConnect).await {
                        break;
                    }
                }
            }
        }
    }

    connected.store(false, Ordering::Relaxed);
}

/// Maps an inbound packet to the event reported for it, if any.
fn incoming_event(packet: &Packet) -> Option<TransportEvent> {
    match packet {
        Packet::SubAck(ack) => Some(TransportEvent::Subscribed { msg_id: ack.pkid }),
        Packet::UnsubAck(ack) => Some(TransportEvent::Unsubscribed { msg_id: ack.pkid }),
        Packet::PubAck(ack) => Some(TransportEvent::Published { msg_id: ack.pkid }),
        Packet::PubComp(comp) => Some(TransportEvent::Published { msg_id: comp.pkid }),
        Packet::Publish(publish) => Some(TransportEvent::Data {
            topic_len: publish.topic.len(),
            data_len: publish.payload.len(),
        }),
        _ => None,
    }
}

/// Classifies a rumqttc connection error.
fn failure_from(err: &ConnectionError) -> TransportFailure {
    match err {
        ConnectionError::Io(e) => TransportFailure {
            kind: TransportErrorKind::TcpTransport,
            code: e.raw_os_error(),
            reason: e.to_string(),
        },
        ConnectionError::Tls(e) => TransportFailure {
            kind: TransportErrorKind::TcpTransport,
            code: None,
            reason: e.to_string(),
        },
        ConnectionError::NetworkTimeout | ConnectionError::FlushTimeout => TransportFailure {
            kind: TransportErrorKind::TcpTransport,
            code: None,
            reason: err.to_string(),
        },
        ConnectionError::ConnectionRefused(code) => TransportFailure {
            kind: TransportErrorKind::ConnectionRefused,
            code: Some(*code as i32),
            reason: format!("{code:?}"),
        },
        other => TransportFailure {
            kind: TransportErrorKind::Unknown,
            code: None,
            reason: other.to_string(),
        },
    }
}

/// Checks a configuration without touching the network or TLS roots.
fn validate(config: &MqttConfig) -> Result<(), TransportError> {
    parse_broker_uri(&config.uri)?;
    if config.client_id.is_empty() || config.client_id.starts_with(' ') {
        return Err(TransportError::InvalidClientId(config.client_id.clone()));
    }
    Ok(())
}

/// Builds rumqttc options from a session configuration.
fn mqtt_options(
    config: &MqttConfig,
    settings: &MqttTransportSettings,
) -> Result<MqttOptions, TransportError> {
    validate(config)?;
    let (host, port, use_tls) = parse_broker_uri(&config.uri)?;

    let mut options = MqttOptions::new(config.client_id.clone(), host, port);
    options
        .set_keep_alive(settings.keep_alive.max(MIN_KEEP_ALIVE))
        .set_credentials(config.username.clone(), config.password.as_str());

    if use_tls {
        let tls = match &config.trust_anchors {
            TrustAnchors::Platform => TlsConfiguration::default(),
            TrustAnchors::Pem(ca) => TlsConfiguration::Simple {
                ca: ca.clone(),
                alpn: None,
                client_auth: None,
            },
        };
        options.set_transport(rumqttc::Transport::Tls(tls));
    }

    Ok(options)
}

/// Splits `scheme://host[:port]` into host, port and whether TLS is used.
fn parse_broker_uri(uri: &str) -> Result<(String, u16, bool), TransportError> {
    let (scheme, rest) = uri.split_once("://").unwrap_or(("mqtt", uri));
    let use_tls = match scheme.to_ascii_lowercase().as_str() {
        "mqtts" | "ssl" => true,
        "mqtt" | "tcp" => false,
        other => {
            return Err(TransportError::InvalidUri(format!(
                "unsupported scheme {other:?}"
            )));
        }
    };

    let (host, port) = match rest.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse()
                .map_err(|_| TransportError::InvalidUri(format!("bad port in {uri:?}")))?;
            (host, port)
        }
        None => (rest, if use_tls { MQTTS_PORT } else { MQTT_PORT }),
    };
    if host.is_empty() {
        return Err(TransportError::InvalidUri(format!("missing host in {uri:?}")));
    }

    Ok((host.to_string(), port, use_tls))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use rumqttc::{ConnAck, ConnectReturnCode, PubAck, Publish, QoS, SubAck};
    use tokio::sync::mpsc;
    use tokio::time::Instant;
    use zeroize::Zeroizing;

    /// Event source replaying canned poll results, then pending forever.
    struct ScriptedLoop {
        polls: VecDeque<Result<Event, ConnectionError>>,
    }

    impl ScriptedLoop {
        fn new(polls: Vec<Result<Event, ConnectionError>>) -> Self {
            Self {
                polls: polls.into(),
            }
        }
    }

    impl PollEvents for ScriptedLoop {
        fn poll(&mut self) -> impl Future<Output = Result<Event, ConnectionError>> + Send {
            let next = self.polls.pop_front();
            async move {
                match next {
                    Some(polled) => polled,
                    None => std::future::pending().await,
                }
            }
        }
    }

    fn conn_ack() -> Result<Event, ConnectionError> {
        Ok(Event::Incoming(Packet::ConnAck(ConnAck::new(
            ConnectReturnCode::Success,
            false,
        ))))
    }

    fn fixed_backoff(delay: Duration) -> ReconnectConfig {
        ReconnectConfig {
            initial_delay: delay,
            max_delay: delay,
            backoff_factor: 1.0,
            jitter: 0.0,
        }
    }

    fn config(uri: &str) -> MqttConfig {
        MqttConfig {
            uri: uri.into(),
            client_id: "dev1".into(),
            username: "h/dev1/?api-version=2018-06-30".into(),
            password: Zeroizing::new("SharedAccessSignature sr=x".into()),
            trust_anchors: TrustAnchors::Platform,
        }
    }

    #[test]
    fn parse_uri_defaults_ports() {
        assert_eq!(
            parse_broker_uri("mqtts://myhub.azure-devices.net").unwrap(),
            ("myhub.azure-devices.net".to_string(), 8883, true)
        );
        assert_eq!(
            parse_broker_uri("mqtt://localhost").unwrap(),
            ("localhost".to_string(), 1883, false)
        );
        assert_eq!(
            parse_broker_uri("localhost:1884").unwrap(),
            ("localhost".to_string(), 1884, false)
        );
    }

    #[test]
    fn parse_uri_rejects_garbage() {
        assert!(matches!(
            parse_broker_uri("http://h"),
            Err(TransportError::InvalidUri(_))
        ));
        assert!(matches!(
            parse_broker_uri("mqtts://"),
            Err(TransportError::InvalidUri(_))
        ));
        assert!(matches!(
            parse_broker_uri("mqtt://h:99999"),
            Err(TransportError::InvalidUri(_))
        ));
    }

    #[test]
    fn options_carry_identity() {
        let options = mqtt_options(&config("mqtt://broker:1999"), &Default::default()).unwrap();
        assert_eq!(options.broker_address(), ("broker".to_string(), 1999));
        assert_eq!(options.client_id(), "dev1");
    }

    #[test]
    fn empty_client_id_is_rejected() {
        let mut cfg = config("mqtts://h");
        cfg.client_id = String::new();
        assert!(matches!(
            validate(&cfg),
            Err(TransportError::InvalidClientId(_))
        ));
    }

    #[test]
    fn init_outside_runtime_fails() {
        let (tx, _rx) = mpsc::channel(4);
        let result = MqttTransport::default().init(&config("mqtts://h"), tx);
        assert!(matches!(result, Err(TransportError::NoRuntime)));
    }

    #[tokio::test]
    async fn init_validates_uri() {
        let (tx, _rx) = mpsc::channel(4);
        let result = MqttTransport::default().init(&config("ftp://h"), tx);
        assert!(matches!(result, Err(TransportError::InvalidUri(_))));
    }

    #[tokio::test]
    async fn disconnect_before_connect_reports_disconnected() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut session = MqttTransport::default()
            .init(&config("mqtts://h"), tx)
            .unwrap();
        session.disconnect();
        assert_eq!(rx.recv().await, Some(TransportEvent::Disconnected));
    }

    #[tokio::test]
    async fn reconfigure_rejects_invalid_config() {
        let (tx, _rx) = mpsc::channel(4);
        let mut session = MqttTransport::default()
            .init(&config("mqtts://h"), tx)
            .unwrap();
        assert!(session.reconfigure(&config("bogus://h")).is_err());
        assert!(session.reconfigure(&config("mqtts://other")).is_ok());
    }

    #[test]
    fn incoming_packets_map_to_events() {
        assert_eq!(
            incoming_event(&Packet::SubAck(SubAck::new(7, vec![]))),
            Some(TransportEvent::Subscribed { msg_id: 7 })
        );
        assert_eq!(
            incoming_event(&Packet::PubAck(PubAck::new(9))),
            Some(TransportEvent::Published { msg_id: 9 })
        );
        assert_eq!(
            incoming_event(&Packet::Publish(Publish::new(
                "devices/dev1/messages/devicebound/",
                QoS::AtMostOnce,
                vec![1u8, 2, 3],
            ))),
            Some(TransportEvent::Data {
                topic_len: 34,
                data_len: 3
            })
        );
        assert_eq!(incoming_event(&Packet::PingResp), None);
    }

    #[test]
    fn connection_errors_are_classified() {
        let refused =
            failure_from(&ConnectionError::ConnectionRefused(ConnectReturnCode::NotAuthorized));
        assert_eq!(refused.kind, TransportErrorKind::ConnectionRefused);
        assert_eq!(refused.code, Some(5));

        let io = failure_from(&ConnectionError::Io(std::io::Error::from_raw_os_error(111)));
        assert_eq!(io.kind, TransportErrorKind::TcpTransport);
        assert_eq!(io.code, Some(111));

        let timeout = failure_from(&ConnectionError::NetworkTimeout);
        assert_eq!(timeout.kind, TransportErrorKind::TcpTransport);
        assert_eq!(timeout.code, None);

        let other = failure_from(&ConnectionError::RequestsDone);
        assert_eq!(other.kind, TransportErrorKind::Unknown);
    }

    #[test]
    fn translate_conn_ack_reports_connected() {
        assert_eq!(
            translate(conn_ack()),
            (vec![TransportEvent::Connected], AfterPoll::Poll)
        );
    }

    #[test]
    fn translate_disconnects() {
        assert_eq!(
            translate(Ok(Event::Incoming(Packet::Disconnect))),
            (vec![TransportEvent::Disconnected], AfterPoll::Poll)
        );
        assert_eq!(
            translate(Ok(Event::Outgoing(Outgoing::Disconnect))),
            (vec![TransportEvent::Disconnected], AfterPoll::Stop)
        );
    }

    #[test]
    fn translate_quiet_packets() {
        assert_eq!(
            translate(Ok(Event::Outgoing(Outgoing::PingReq))),
            (Vec::new(), AfterPoll::Poll)
        );
        assert_eq!(
            translate(Ok(Event::Incoming(Packet::PingResp))),
            (Vec::new(), AfterPoll::Poll)
        );
        assert_eq!(
            translate(Ok(Event::Incoming(Packet::PubAck(PubAck::new(3))))),
            (vec![TransportEvent::Published { msg_id: 3 }], AfterPoll::Poll)
        );
    }

    #[test]
    fn translate_failure_backs_off() {
        let (posted, next) = translate(Err(ConnectionError::NetworkTimeout));
        assert_eq!(next, AfterPoll::Backoff);
        assert_eq!(
            posted,
            vec![
                TransportEvent::Error(failure_from(&ConnectionError::NetworkTimeout)),
                TransportEvent::Disconnected,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn pump_backs_off_after_failure() {
        let (tx, mut rx) = mpsc::channel(16);
        let connected = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();
        let source = ScriptedLoop::new(vec![Err(ConnectionError::NetworkTimeout), conn_ack()]);
        let task = tokio::spawn(pump(
            source,
            tx,
            fixed_backoff(Duration::from_secs(2)),
            connected.clone(),
            cancel.clone(),
        ));

        assert_eq!(rx.recv().await, Some(TransportEvent::BeforeConnect));
        assert!(matches!(
            rx.recv().await,
            Some(TransportEvent::Error(f)) if f.kind == TransportErrorKind::TcpTransport
        ));
        assert_eq!(rx.recv().await, Some(TransportEvent::Disconnected));

        let waiting = Instant::now();
        assert_eq!(rx.recv().await, Some(TransportEvent::BeforeConnect));
        let waited = waiting.elapsed();
        assert!(
            waited >= Duration::from_secs(2) && waited < Duration::from_millis(2_100),
            "waited {waited:?}"
        );

        assert_eq!(rx.recv().await, Some(TransportEvent::Connected));
        assert!(connected.load(Ordering::Relaxed));

        cancel.cancel();
        task.await.unwrap();
        assert!(!connected.load(Ordering::Relaxed));
    }

    #[tokio::test(start_paused = true)]
    async fn outgoing_disconnect_ends_pump() {
        let (tx, mut rx) = mpsc::channel(16);
        let connected = Arc::new(AtomicBool::new(false));
        let source = ScriptedLoop::new(vec![
            conn_ack(),
            Ok(Event::Outgoing(Outgoing::Disconnect)),
        ]);
        let task = tokio::spawn(pump(
            source,
            tx,
            ReconnectConfig::default(),
            connected.clone(),
            CancellationToken::new(),
        ));

        task.await.unwrap();

        assert_eq!(rx.recv().await, Some(TransportEvent::BeforeConnect));
        assert_eq!(rx.recv().await, Some(TransportEvent::Connected));
        assert_eq!(rx.recv().await, Some(TransportEvent::Disconnected));
        assert_eq!(rx.recv().await, None);
        assert!(!connected.load(Ordering::Relaxed));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_backoff() {
        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(pump(
            ScriptedLoop::new(vec![Err(ConnectionError::NetworkTimeout)]),
            tx,
            fixed_backoff(Duration::from_secs(60)),
            Arc::new(AtomicBool::new(false)),
            cancel.clone(),
        ));

        assert_eq!(rx.recv().await, Some(TransportEvent::BeforeConnect));
        assert!(matches!(rx.recv().await, Some(TransportEvent::Error(_))));
        assert_eq!(rx.recv().await, Some(TransportEvent::Disconnected));

        let start = Instant::now();
        cancel.cancel();
        task.await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(60));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_pump_drops_pending_events() {
        // One slot: the second Connected waits for room in the channel.
        let (tx, mut rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(pump(
            ScriptedLoop::new(vec![conn_ack(), conn_ack()]),
            tx,
            ReconnectConfig::default(),
            Arc::new(AtomicBool::new(false)),
            cancel.clone(),
        ));

        assert_eq!(rx.recv().await, Some(TransportEvent::BeforeConnect));
        // Lets the pump run until it blocks on the full channel.
        tokio::time::sleep(Duration::from_millis(1)).await;

        cancel.cancel();
        task.await.unwrap();

        assert_eq!(rx.recv().await, Some(TransportEvent::Connected));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn force_reconnect_replaces_pump() {
        let (tx, _rx) = mpsc::channel(64);
        let mut session = MqttTransport::default()
            .init(&config("mqtt://127.0.0.1:1"), tx)
            .unwrap();

        session.start();
        let first = session.pump.clone().unwrap();
        session.force_reconnect().unwrap();
        let second = session.pump.clone().unwrap();

        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());

        drop(session);
        assert!(second.is_cancelled());
    }
}

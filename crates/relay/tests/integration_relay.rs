//! Integration-Tests fuer das Relay (echte TCP-Sockets auf 127.0.0.1)

use futures_util::{SinkExt, StreamExt};
use pulse_protocol::{
    AuthResponseFrame, ChatMessage, FrameCodec, PresenceFrame, RelayFrame, TypingFrame,
};
use pulse_relay::{RelayConfig, RelayServer, RelayState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_util::codec::Framed;

type Client = Framed<TcpStream, FrameCodec>;

const WARTEZEIT: Duration = Duration::from_secs(3);

struct Relay {
    addr: SocketAddr,
    state: Arc<RelayState>,
    shutdown_tx: watch::Sender<bool>,
}

async fn relay_starten(config: RelayConfig) -> Relay {
    let state = RelayState::neu(config);
    let server = RelayServer::binden(Arc::clone(&state), "127.0.0.1:0".parse().unwrap())
        .await
        .expect("Relay konnte nicht binden");
    let addr = server.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(server.starten(shutdown_rx));
    Relay {
        addr,
        state,
        shutdown_tx,
    }
}

async fn roh_verbinden(addr: SocketAddr) -> Client {
    let stream = TcpStream::connect(addr).await.expect("TCP-Verbindung fehlgeschlagen");
    Framed::new(stream, FrameCodec::new())
}

async fn empfangen(client: &mut Client) -> Option<RelayFrame> {
    tokio::time::timeout(WARTEZEIT, client.next())
        .await
        .expect("Zeitueberschreitung beim Warten auf einen Frame")
        .map(|r| r.expect("Frame-Lesefehler"))
}

/// Verbindet, beansprucht `name` und erwartet eine erfolgreiche Zulassung
async fn anmelden(addr: SocketAddr, name: &str) -> Client {
    let mut client = roh_verbinden(addr).await;
    client.send(RelayFrame::connect(name, None)).await.unwrap();
    match empfangen(&mut client).await {
        Some(RelayFrame::AuthResponse(AuthResponseFrame { success: true, .. })) => client,
        andere => panic!("Zulassung erwartet, erhalten: {andere:?}"),
    }
}

/// Ueberspringt Presence-Frames und liefert den naechsten anderen Frame
async fn naechster_ohne_presence(client: &mut Client) -> RelayFrame {
    loop {
        match empfangen(client).await {
            Some(RelayFrame::Presence(_)) => continue,
            Some(frame) => return frame,
            None => panic!("Verbindung unerwartet geschlossen"),
        }
    }
}

/// Wartet auf eine Presence-Aenderung fuer `name`
async fn warte_auf_presence(client: &mut Client, name: &str) -> PresenceFrame {
    loop {
        match empfangen(client).await {
            Some(RelayFrame::Presence(p)) if p.user_id == name => return p,
            Some(_) => continue,
            None => panic!("Verbindung unerwartet geschlossen"),
        }
    }
}

async fn warte_bis_geschlossen(client: &mut Client) -> Vec<RelayFrame> {
    let mut frames = Vec::new();
    loop {
        match tokio::time::timeout(WARTEZEIT, client.next())
            .await
            .expect("Verbindung wurde nicht geschlossen")
        {
            Some(Ok(frame)) => frames.push(frame),
            Some(Err(_)) | None => return frames,
        }
    }
}

async fn warte_bis<F: Fn() -> bool>(bedingung: F) {
    tokio::time::timeout(WARTEZEIT, async {
        while !bedingung() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Bedingung nicht rechtzeitig erfuellt");
}

fn nachricht(an: &str) -> RelayFrame {
    RelayFrame::ChatMessage(ChatMessage {
        id: "msg-1".into(),
        chat_id: "chat-ab".into(),
        sender_id: "gefaelscht".into(),
        content: r#"{"v":1,"alg":"aes256gcm","nonce":"","ciphertext":""}"#.into(),
        timestamp: 1_700_000_000_000,
        reply_to_id: None,
        recipient_id: Some(an.into()),
        sender_name: Some("Alice".into()),
    })
}

fn uid(s: &str) -> pulse_core::UserId {
    pulse_core::UserId::parse(s).unwrap()
}

// ---------------------------------------------------------------------------
// Szenarien
// ---------------------------------------------------------------------------

#[tokio::test]
async fn nachricht_und_zustellbestaetigung() {
    let relay = relay_starten(RelayConfig::default()).await;
    let mut alice = anmelden(relay.addr, "alice").await;
    let mut bob = anmelden(relay.addr, "bob").await;

    alice.send(nachricht("bob")).await.unwrap();

    match naechster_ohne_presence(&mut bob).await {
        RelayFrame::ChatMessage(m) => {
            assert_eq!(m.id, "msg-1");
            assert_eq!(m.sender_id, "alice");
            assert_eq!(m.sender_name.as_deref(), Some("Alice"));
        }
        andere => panic!("Nachricht erwartet, erhalten: {andere:?}"),
    }

    match naechster_ohne_presence(&mut alice).await {
        RelayFrame::DeliveryReceipt(r) => {
            assert_eq!(r.message_id, "msg-1");
            assert_eq!(r.chat_id, "chat-ab");
            assert_eq!(r.delivered_to, "bob");
        }
        andere => panic!("Zustellbestaetigung erwartet, erhalten: {andere:?}"),
    }
}

#[tokio::test]
async fn abrupter_abbruch_verteilt_offline_mit_last_seen() {
    let relay = relay_starten(RelayConfig::default()).await;
    let mut alice = anmelden(relay.addr, "alice").await;
    let bob = anmelden(relay.addr, "bob").await;

    let online = warte_auf_presence(&mut alice, "bob").await;
    assert!(online.is_online);
    assert!(online.last_seen.is_none());

    // Socket ohne Abmeldung schliessen
    drop(bob);

    let offline = warte_auf_presence(&mut alice, "bob").await;
    assert!(!offline.is_online);
    assert!(offline.last_seen.is_some());

    warte_bis(|| !relay.state.registry.snapshot().contains(&uid("bob"))).await;
    assert!(!relay.state.registry.presence().ist_online(&uid("bob")));
}

#[tokio::test]
async fn neue_verbindung_erhaelt_presence_snapshot() {
    let relay = relay_starten(RelayConfig::default()).await;
    let _alice = anmelden(relay.addr, "alice").await;
    let _carol = anmelden(relay.addr, "carol").await;
    let mut bob = anmelden(relay.addr, "bob").await;

    let mut online = Vec::new();
    for _ in 0..2 {
        let p = match empfangen(&mut bob).await {
            Some(RelayFrame::Presence(p)) => p,
            andere => panic!("Presence erwartet, erhalten: {andere:?}"),
        };
        assert!(p.is_online);
        assert!(p.snapshot);
        online.push(p.user_id);
    }
    online.sort();
    assert_eq!(online, vec!["alice", "carol"]);
}

#[tokio::test]
async fn erster_frame_muss_connect_sein() {
    let relay = relay_starten(RelayConfig::default()).await;
    let mut client = roh_verbinden(relay.addr).await;

    client
        .send(RelayFrame::Typing(TypingFrame {
            chat_id: "c".into(),
            user_id: "x".into(),
            is_typing: true,
        }))
        .await
        .unwrap();

    let frames = warte_bis_geschlossen(&mut client).await;
    assert!(matches!(frames.as_slice(), [RelayFrame::Error(_)]));
    assert!(relay.state.registry.snapshot().is_empty());
}

#[tokio::test]
async fn leere_identitaet_wird_abgelehnt() {
    let relay = relay_starten(RelayConfig::default()).await;
    let mut client = roh_verbinden(relay.addr).await;
    client.send(RelayFrame::connect("", None)).await.unwrap();

    let frames = warte_bis_geschlossen(&mut client).await;
    assert!(matches!(
        frames.as_slice(),
        [
            RelayFrame::AuthResponse(AuthResponseFrame { success: false, .. }),
            RelayFrame::Error(_)
        ]
    ));
}

#[tokio::test]
async fn falsches_token_wird_abgelehnt() {
    let relay = relay_starten(RelayConfig {
        auth_tokens: vec!["geheim".into()],
        ..Default::default()
    })
    .await;

    let mut ohne = roh_verbinden(relay.addr).await;
    ohne.send(RelayFrame::connect("alice", Some("falsch".into())))
        .await
        .unwrap();
    let frames = warte_bis_geschlossen(&mut ohne).await;
    assert!(matches!(
        frames.first(),
        Some(RelayFrame::AuthResponse(AuthResponseFrame { success: false, .. }))
    ));

    let mut mit = roh_verbinden(relay.addr).await;
    mit.send(RelayFrame::connect("alice", Some("geheim".into())))
        .await
        .unwrap();
    assert!(matches!(
        empfangen(&mut mit).await,
        Some(RelayFrame::AuthResponse(AuthResponseFrame { success: true, .. }))
    ));
}

#[tokio::test]
async fn schweigender_client_wird_nach_frist_getrennt() {
    let relay = relay_starten(RelayConfig {
        auth_timeout: Duration::from_millis(200),
        ..Default::default()
    })
    .await;
    let mut client = roh_verbinden(relay.addr).await;

    let frames = warte_bis_geschlossen(&mut client).await;
    assert!(matches!(frames.as_slice(), [RelayFrame::Error(_)]));
}

#[tokio::test]
async fn zweite_verbindung_verdraengt_die_erste() {
    let relay = relay_starten(RelayConfig::default()).await;
    let mut beobachter = anmelden(relay.addr, "beobachter").await;
    let mut alt = anmelden(relay.addr, "alice").await;
    assert!(warte_auf_presence(&mut beobachter, "alice").await.is_online);

    let _neu = anmelden(relay.addr, "alice").await;

    // Genau eine Offline-dann-Online-Folge
    assert!(!warte_auf_presence(&mut beobachter, "alice").await.is_online);
    assert!(warte_auf_presence(&mut beobachter, "alice").await.is_online);

    // Alte Verbindung wird geschlossen
    warte_bis_geschlossen(&mut alt).await;
    assert_eq!(relay.state.registry.anzahl(), 2);
    assert!(relay.state.registry.presence().ist_online(&uid("alice")));
}

#[tokio::test]
async fn kaputter_frame_trennt_nur_diese_verbindung() {
    let relay = relay_starten(RelayConfig::default()).await;
    let mut bob = anmelden(relay.addr, "bob").await;
    let mut alice = anmelden(relay.addr, "alice").await;
    assert!(warte_auf_presence(&mut bob, "alice").await.is_online);

    let payload = b"{kein json";
    let mut roh = (payload.len() as u32).to_be_bytes().to_vec();
    roh.extend_from_slice(payload);
    alice.get_mut().write_all(&roh).await.unwrap();

    let frames = warte_bis_geschlossen(&mut alice).await;
    assert!(frames.iter().any(|f| matches!(f, RelayFrame::Error(_))));

    assert!(!warte_auf_presence(&mut bob, "alice").await.is_online);

    // bob ist weiterhin verbunden
    let _carol = anmelden(relay.addr, "carol").await;
    assert!(warte_auf_presence(&mut bob, "carol").await.is_online);
}

#[tokio::test]
async fn shutdown_trennt_alle_verbindungen() {
    let relay = relay_starten(RelayConfig::default()).await;
    let mut alice = anmelden(relay.addr, "alice").await;
    let mut bob = anmelden(relay.addr, "bob").await;

    relay.shutdown_tx.send(true).unwrap();

    let frames = warte_bis_geschlossen(&mut alice).await;
    assert!(frames.iter().any(|f| matches!(f, RelayFrame::Error(_))));
    warte_bis_geschlossen(&mut bob).await;

    warte_bis(|| relay.state.registry.anzahl() == 0).await;
    assert!(!relay.state.registry.presence().ist_online(&uid("alice")));
    assert!(!relay.state.registry.presence().ist_online(&uid("bob")));
}

#[tokio::test]
async fn verstummte_verbindung_wird_nach_keepalive_timeout_offline() {
    let relay = relay_starten(RelayConfig {
        keepalive: Duration::from_millis(50),
        verbindungs_timeout: Duration::from_millis(300),
        ..Default::default()
    })
    .await;
    let mut alice = anmelden(relay.addr, "alice").await;
    // bob bleibt verbunden, liest aber nichts und beantwortet keinen Ping
    let mut bob = anmelden(relay.addr, "bob").await;

    let offline = loop {
        match empfangen(&mut alice).await {
            Some(RelayFrame::Ping(ping)) => alice.send(RelayFrame::pong(&ping)).await.unwrap(),
            Some(RelayFrame::Presence(p)) if p.user_id == "bob" && !p.is_online => break p,
            Some(_) => continue,
            None => panic!("alice wurde unerwartet getrennt"),
        }
    };
    assert!(offline.last_seen.is_some());

    let snapshot = relay.state.registry.snapshot();
    assert!(!snapshot.contains(&uid("bob")));
    assert!(snapshot.contains(&uid("alice")));

    // bobs Socket wurde geschlossen, vorher kamen nur Pings
    let frames = warte_bis_geschlossen(&mut bob).await;
    assert!(frames.iter().any(|f| matches!(f, RelayFrame::Ping(_))));
    assert!(frames
        .iter()
        .all(|f| matches!(f, RelayFrame::Ping(_) | RelayFrame::Presence(_))));
}

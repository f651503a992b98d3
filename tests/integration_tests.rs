//! End-to-end client behavior over the in-memory transport.

use palaver_core::{AuthMethod, ClientError, ConnectionState, Event};
use palaver_crypto::{KeyPair, SessionKeys, wrap_secret};
use palaver_integration_tests::{
    TestServer, memory_client, no_event_within, test_config, wait_for_event,
};
use palaver_proto::Node;
use palaver_transport::memory::MemoryListener;
use rand_core::OsRng;
use serde_json::json;
use std::time::Duration;

/// Drive a fresh connection up to the handshake: accept, consume the init
/// message, and send the connected status.
async fn open_handshake(listener: &mut MemoryListener) -> (TestServer, serde_json::Value) {
    let mut server = TestServer::accept(listener).await;
    let init = server.recv_structured().await;
    assert_eq!(init["type"], "init");
    server.send_json(&json!({"status": "connected"})).await;
    (server, init)
}

/// Complete the handshake with a bare success message and wait for Ready.
async fn drive_to_ready(
    server: &mut TestServer,
    events: &mut tokio::sync::mpsc::UnboundedReceiver<Event>,
) {
    server
        .send_json(&json!({
            "type": "success",
            "session": "S1",
            "clientToken": "C1",
            "wid": "123@s",
        }))
        .await;
    wait_for_event(events, |event| matches!(event, Event::Ready)).await;
}

// ═══════════════════════════════════════════════════════════════════════════
// Connection lifecycle
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn scenario_a_connected_status_enters_authentication() {
    let (client, mut listener) = memory_client(test_config());
    let mut events = client.subscribe();

    client.connect().await.unwrap();

    // connect() walks Disconnected -> Connecting -> Connected.
    let mut transitions = Vec::new();
    for _ in 0..2 {
        if let Event::StateChange { from, to } =
            wait_for_event(&mut events, |e| matches!(e, Event::StateChange { .. })).await
        {
            transitions.push((from, to));
        }
    }
    assert_eq!(
        transitions,
        vec![
            (ConnectionState::Disconnected, ConnectionState::Connecting),
            (ConnectionState::Connecting, ConnectionState::Connected),
        ]
    );

    let (_server, init) = open_handshake(&mut listener).await;
    assert_eq!(init["resume"], false);
    assert!(init["clientId"].as_str().is_some_and(|id| !id.is_empty()));

    let change = wait_for_event(&mut events, |e| {
        matches!(e, Event::StateChange { to: ConnectionState::Authenticating, .. })
    })
    .await;
    if let Event::StateChange { from, .. } = change {
        assert_eq!(from, ConnectionState::Connected);
    }
    assert_eq!(client.state(), ConnectionState::Authenticating);

    client.disconnect().await;
}

#[tokio::test]
async fn scenario_c_success_authenticates_then_settles_ready() {
    let (client, mut listener) = memory_client(test_config());
    let mut events = client.subscribe();

    client.connect().await.unwrap();
    let (mut server, _) = open_handshake(&mut listener).await;

    server
        .send_json(&json!({
            "type": "success",
            "session": "S1",
            "clientToken": "C1",
            "wid": "123@s",
        }))
        .await;

    let authenticated =
        wait_for_event(&mut events, |e| matches!(e, Event::Authenticated { .. })).await;
    let Event::Authenticated { user, session } = authenticated else {
        unreachable!()
    };
    assert_eq!(session.server_token, "S1");
    assert_eq!(session.client_token, "C1");
    assert_eq!(user.id, "123@s");
    assert_eq!(client.state(), ConnectionState::Authenticated);

    // Ready only after the settle delay.
    wait_for_event(&mut events, |e| matches!(e, Event::Ready)).await;
    assert_eq!(client.state(), ConnectionState::Ready);

    client.disconnect().await;
}

#[tokio::test]
async fn explicit_disconnect_closes_normally_and_never_reconnects() {
    let (client, mut listener) = memory_client(test_config());
    let mut events = client.subscribe();

    client.connect().await.unwrap();
    let (server, _) = open_handshake(&mut listener).await;

    client.disconnect().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(server.client_closed());

    let disconnected =
        wait_for_event(&mut events, |e| matches!(e, Event::Disconnected { .. })).await;
    let Event::Disconnected { code, .. } = disconnected else {
        unreachable!()
    };
    assert_eq!(code, Some(1000));

    // No reconnection attempt follows an explicit disconnect.
    assert!(
        tokio::time::timeout(Duration::from_millis(120), listener.accept())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn normal_close_from_server_does_not_reconnect() {
    let (client, mut listener) = memory_client(test_config());
    let mut events = client.subscribe();

    client.connect().await.unwrap();
    let (server, _) = open_handshake(&mut listener).await;

    server.close(1000, "going away").await;
    wait_for_event(&mut events, |e| matches!(e, Event::Disconnected { .. })).await;
    assert_eq!(client.state(), ConnectionState::Disconnected);

    assert!(
        tokio::time::timeout(Duration::from_millis(120), listener.accept())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn server_timeout_status_enters_timeout_state() {
    let (client, mut listener) = memory_client(test_config());

    client.connect().await.unwrap();
    let (mut server, _) = open_handshake(&mut listener).await;

    server.send_json(&json!({"status": "timeout"})).await;
    // The transition is observable shortly after delivery.
    for _ in 0..50 {
        if client.state() == ConnectionState::Timeout {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(client.state(), ConnectionState::Timeout);

    client.disconnect().await;
}

#[tokio::test]
async fn undecodable_frames_do_not_tear_down_the_connection() {
    let (client, mut listener) = memory_client(test_config());
    let mut events = client.subscribe();

    client.connect().await.unwrap();
    let mut server = TestServer::accept(&mut listener).await;
    let _init = server.recv_structured().await;

    // Garbage, wrong magic, truncated header.
    server.send_raw(b"garbage".to_vec()).await;
    server.send_raw(b"XXtrash-frame".to_vec()).await;
    server.send_raw(vec![0x50]).await;
    for _ in 0..3 {
        wait_for_event(&mut events, |e| matches!(e, Event::ConnectionError { .. })).await;
    }

    // The connection still works.
    server.send_json(&json!({"status": "connected"})).await;
    wait_for_event(&mut events, |e| {
        matches!(e, Event::StateChange { to: ConnectionState::Authenticating, .. })
    })
    .await;

    client.disconnect().await;
}

// ═══════════════════════════════════════════════════════════════════════════
// Visual-code handshake
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn visual_code_payload_composed_from_reference_and_key_material() {
    let (client, mut listener) = memory_client(test_config());
    let mut events = client.subscribe();

    client.connect().await.unwrap();
    let (mut server, init) = open_handshake(&mut listener).await;

    server.send_json(&json!({"type": "ref", "ref": "1@abc"})).await;

    let qr = wait_for_event(&mut events, |e| matches!(e, Event::Qr { .. })).await;
    let Event::Qr {
        reference,
        client_id,
        public_key,
        expires_in_seconds,
    } = qr
    else {
        unreachable!()
    };
    assert_eq!(reference, "1@abc");
    assert_eq!(Some(client_id.as_str()), init["clientId"].as_str());
    use base64::Engine as _;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(&public_key)
        .unwrap();
    assert_eq!(decoded.len(), 32);
    assert!(expires_in_seconds <= 1); // shrunk test timer

    client.disconnect().await;
}

#[tokio::test]
async fn visual_code_expiry_retries_then_goes_fatal() {
    let config = palaver_core::ClientConfig {
        qr_max_retries: 2,
        ..test_config()
    };
    let (client, mut listener) = memory_client(config);
    let mut events = client.subscribe();

    client.connect().await.unwrap();
    let (mut server, _) = open_handshake(&mut listener).await;

    // First reference expires: exactly one qr_expired, then the client
    // waits for a fresh reference.
    server.send_json(&json!({"type": "ref", "ref": "1@a"})).await;
    wait_for_event(&mut events, |e| matches!(e, Event::Qr { .. })).await;
    wait_for_event(&mut events, |e| matches!(e, Event::QrExpired)).await;

    // Second reference expires: the retry budget is gone.
    server.send_json(&json!({"type": "ref", "ref": "1@b"})).await;
    wait_for_event(&mut events, |e| matches!(e, Event::Qr { .. })).await;
    wait_for_event(&mut events, |e| matches!(e, Event::QrMaxRetries)).await;

    wait_for_event(&mut events, |e| matches!(e, Event::Disconnected { .. })).await;
    assert_eq!(client.state(), ConnectionState::Disconnected);

    // Fatal handshake failure is not a reconnect trigger.
    assert!(
        tokio::time::timeout(Duration::from_millis(120), listener.accept())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn success_cancels_the_expiry_timer() {
    let (client, mut listener) = memory_client(test_config());
    let mut events = client.subscribe();

    client.connect().await.unwrap();
    let (mut server, _) = open_handshake(&mut listener).await;

    server.send_json(&json!({"type": "ref", "ref": "1@a"})).await;
    wait_for_event(&mut events, |e| matches!(e, Event::Qr { .. })).await;
    drive_to_ready(&mut server, &mut events).await;

    // Outlive the code lifetime: the canceled timer must not fire.
    tokio::time::sleep(Duration::from_millis(150)).await;
    while let Ok(event) = events.try_recv() {
        assert!(!matches!(event, Event::QrExpired | Event::QrMaxRetries));
    }
    assert_eq!(client.state(), ConnectionState::Ready);

    client.disconnect().await;
}

#[tokio::test]
async fn secret_blob_unwraps_into_session_keys() {
    let (client, mut listener) = memory_client(test_config());
    let mut events = client.subscribe();

    client.connect().await.unwrap();
    let (mut server, _) = open_handshake(&mut listener).await;

    server.send_json(&json!({"type": "ref", "ref": "1@abc"})).await;
    let qr = wait_for_event(&mut events, |e| matches!(e, Event::Qr { .. })).await;
    let Event::Qr { public_key, .. } = qr else {
        unreachable!()
    };

    use base64::Engine as _;
    let engine = base64::engine::general_purpose::STANDARD;
    let client_public: [u8; 32] = engine.decode(&public_key).unwrap().try_into().unwrap();

    let server_pair = KeyPair::generate(&mut OsRng);
    let keys = SessionKeys {
        enc: [3u8; 32],
        mac: [4u8; 32],
    };
    let blob = wrap_secret(&server_pair, &client_public, &keys, &mut OsRng).unwrap();

    server
        .send_json(&json!({
            "type": "success",
            "session": "S1",
            "clientToken": "C1",
            "wid": "123@s",
            "pushname": "Ana",
            "secret": engine.encode(blob),
        }))
        .await;

    let authenticated =
        wait_for_event(&mut events, |e| matches!(e, Event::Authenticated { .. })).await;
    let Event::Authenticated { session, user } = authenticated else {
        unreachable!()
    };
    assert_eq!(user.name.as_deref(), Some("Ana"));
    let material = session.key_material.expect("secret must yield key material");
    assert_eq!(material.enc, [3u8; 32]);
    assert_eq!(material.mac, [4u8; 32]);

    client.disconnect().await;
}

// ═══════════════════════════════════════════════════════════════════════════
// Short-code handshake
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn scenario_b_pairing_error_surfaces_without_retry() {
    let config = palaver_core::ClientConfig {
        auth_method: AuthMethod::ShortCode,
        ..test_config()
    };
    let (client, mut listener) = memory_client(config);
    let mut events = client.subscribe();

    client.connect().await.unwrap();
    let (mut server, _) = open_handshake(&mut listener).await;
    wait_for_event(&mut events, |e| {
        matches!(e, Event::StateChange { to: ConnectionState::Authenticating, .. })
    })
    .await;

    client
        .request_pairing_code("+40 712-345-678")
        .await
        .unwrap();

    // Exactly one structured request, with the normalized phone and a
    // fresh reference.
    let request = server.recv_structured().await;
    assert_eq!(request["type"], "pair_request");
    assert_eq!(request["phone"], "40712345678");
    use base64::Engine as _;
    let engine = base64::engine::general_purpose::STANDARD;
    assert_eq!(
        engine.decode(request["ref"].as_str().unwrap()).unwrap().len(),
        16
    );
    assert_eq!(
        engine
            .decode(request["publicKey"].as_str().unwrap())
            .unwrap()
            .len(),
        32
    );

    let request_event = wait_for_event(&mut events, |e| {
        matches!(e, Event::PairingCodeRequest { .. })
    })
    .await;
    let Event::PairingCodeRequest { phone } = request_event else {
        unreachable!()
    };
    assert_eq!(phone, "40712345678");

    server
        .send_json(&json!({"type": "pair_error", "reason": "missing"}))
        .await;
    let error = wait_for_event(&mut events, |e| {
        matches!(e, Event::PairingCodeError { .. })
    })
    .await;
    let Event::PairingCodeError { reason } = error else {
        unreachable!()
    };
    assert_eq!(reason, "missing");

    // No automatic retry: the caller decides whether to request again.
    assert!(server.silent_for(Duration::from_millis(150)).await);
    assert_eq!(client.state(), ConnectionState::Authenticating);

    client.disconnect().await;
}

#[tokio::test]
async fn pairing_code_success_is_delivered() {
    let config = palaver_core::ClientConfig {
        auth_method: AuthMethod::ShortCode,
        ..test_config()
    };
    let (client, mut listener) = memory_client(config);
    let mut events = client.subscribe();

    client.connect().await.unwrap();
    let (mut server, _) = open_handshake(&mut listener).await;
    wait_for_event(&mut events, |e| {
        matches!(e, Event::StateChange { to: ConnectionState::Authenticating, .. })
    })
    .await;

    client.request_pairing_code("40712345678").await.unwrap();
    let _request = server.recv_structured().await;

    server
        .send_json(&json!({"type": "pair_code", "code": "1234-5678"}))
        .await;
    let delivered = wait_for_event(&mut events, |e| matches!(e, Event::PairingCode { .. })).await;
    let Event::PairingCode { code } = delivered else {
        unreachable!()
    };
    assert_eq!(code, "1234-5678");

    client.disconnect().await;
}

#[tokio::test]
async fn pairing_request_guarded_by_method_and_state() {
    // Visual-code configuration rejects pairing requests outright.
    let (client, _listener) = memory_client(test_config());
    let err = client.request_pairing_code("40712345678").await.unwrap_err();
    assert!(matches!(err, ClientError::State(_)));

    // Short-code configuration still requires a handshake in progress.
    let config = palaver_core::ClientConfig {
        auth_method: AuthMethod::ShortCode,
        ..test_config()
    };
    let (client, _listener) = memory_client(config);
    let err = client.request_pairing_code("40712345678").await.unwrap_err();
    assert!(matches!(err, ClientError::State(_)));
}

// ═══════════════════════════════════════════════════════════════════════════
// Tagged request correlation
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn tagged_request_resolves_with_matching_reply() {
    let (client, mut listener) = memory_client(test_config());
    let mut events = client.subscribe();

    client.connect().await.unwrap();
    let (mut server, _) = open_handshake(&mut listener).await;
    drive_to_ready(&mut server, &mut events).await;

    let request_client = client.clone();
    let pending = tokio::spawn(async move {
        request_client
            .send_tagged(Node::new("query").with_attr("kind", "profile"))
            .await
    });

    let (tag, node) = server.recv_tagged().await;
    assert_eq!(node.description, "query");
    assert_eq!(node.attr("kind"), Some("profile"));

    let reply = Node::new("response").with_attr("status", "200");
    server.send_tagged(&tag, &reply).await;

    let resolved = pending.await.unwrap().unwrap();
    assert_eq!(resolved.attr("status"), Some("200"));
    assert_eq!(client.pending_requests(), 0);

    // A duplicate reply for the same tag is dropped silently.
    server.send_tagged(&tag, &reply).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(client.pending_requests(), 0);

    client.disconnect().await;
}

#[tokio::test]
async fn tagged_request_times_out_without_affecting_connection() {
    let (client, mut listener) = memory_client(test_config());
    let mut events = client.subscribe();

    client.connect().await.unwrap();
    let (mut server, _) = open_handshake(&mut listener).await;
    drive_to_ready(&mut server, &mut events).await;

    let err = client
        .send_tagged_with_timeout(Node::new("query"), Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Timeout(_)));
    assert_eq!(client.pending_requests(), 0);

    // The timeout touched only that caller.
    assert_eq!(client.state(), ConnectionState::Ready);
    let _ignored = server.recv_tagged().await;

    client.disconnect().await;
}

#[tokio::test]
async fn teardown_rejects_pending_requests() {
    let (client, mut listener) = memory_client(test_config());
    let mut events = client.subscribe();

    client.connect().await.unwrap();
    let (mut server, _) = open_handshake(&mut listener).await;
    drive_to_ready(&mut server, &mut events).await;

    let request_client = client.clone();
    let pending = tokio::spawn(async move {
        request_client
            .send_tagged_with_timeout(Node::new("query"), Duration::from_secs(5))
            .await
    });
    // Wait until the request is on the wire (and therefore registered).
    let _ = server.recv_tagged().await;
    assert_eq!(client.pending_requests(), 1);

    client.disconnect().await;

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)));
    assert_eq!(client.pending_requests(), 0);
}

// ═══════════════════════════════════════════════════════════════════════════
// Reconnection policy
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn abnormal_close_reconnects_until_exhausted() {
    let config = palaver_core::ClientConfig {
        max_reconnects: 2,
        ..test_config()
    };
    let (client, mut listener) = memory_client(config);
    let mut events = client.subscribe();

    client.connect().await.unwrap();
    let mut server = TestServer::accept(&mut listener).await;
    let _ = server.recv_structured().await;

    // Attempt 1.
    server.close(1006, "abnormal").await;
    wait_for_event(&mut events, |e| matches!(e, Event::Disconnected { .. })).await;
    let mut server = TestServer::accept(&mut listener).await;
    let _ = server.recv_structured().await;

    // Attempt 2.
    server.close(1006, "abnormal").await;
    wait_for_event(&mut events, |e| matches!(e, Event::Disconnected { .. })).await;
    let server = TestServer::accept(&mut listener).await;

    // Budget is spent: the next abnormal close gives up.
    server.close(1006, "abnormal").await;
    wait_for_event(&mut events, |e| matches!(e, Event::ReconnectFailed)).await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(
        tokio::time::timeout(Duration::from_millis(120), listener.accept())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn reaching_ready_resets_the_reconnect_budget() {
    let config = palaver_core::ClientConfig {
        max_reconnects: 1,
        ..test_config()
    };
    let (client, mut listener) = memory_client(config);
    let mut events = client.subscribe();

    client.connect().await.unwrap();
    let (mut server, _) = open_handshake(&mut listener).await;
    drive_to_ready(&mut server, &mut events).await;

    // Spends the single reconnect attempt.
    server.close(1006, "abnormal").await;
    let mut server = TestServer::accept(&mut listener).await;
    let init = server.recv_structured().await;
    // The surviving session resumes instead of pairing again.
    assert_eq!(init["resume"], true);
    assert_eq!(init["serverToken"], "S1");
    server.send_json(&json!({"status": "connected"})).await;
    drive_to_ready(&mut server, &mut events).await;

    // Ready reset the counter, so another attempt is available.
    server.close(1006, "abnormal").await;
    assert!(
        tokio::time::timeout(Duration::from_secs(2), listener.accept())
            .await
            .is_ok()
    );

    client.disconnect().await;
}

// ═══════════════════════════════════════════════════════════════════════════
// Session restore
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn restored_session_resumes_and_skips_the_handshake() {
    let (client, mut listener) = memory_client(test_config());
    let mut events = client.subscribe();

    let record = serde_json::json!({
        "clientId": "Y2xpZW50",
        "serverToken": "S-old",
        "clientToken": "C-old",
        "identity": {"id": "123@s", "name": "Ana", "phone": "40712345678"},
    });
    client
        .restore_session(serde_json::from_value(record).unwrap())
        .unwrap();

    client.connect().await.unwrap();
    let mut server = TestServer::accept(&mut listener).await;

    let init = server.recv_structured().await;
    assert_eq!(init["resume"], true);
    assert_eq!(init["clientId"], "Y2xpZW50");
    assert_eq!(init["serverToken"], "S-old");
    assert_eq!(init["clientToken"], "C-old");

    // The server validates the tokens and answers with success directly:
    // Connecting -> Connected -> Authenticated without Authenticating.
    server
        .send_json(&json!({
            "type": "success",
            "session": "S-new",
            "clientToken": "C-old",
            "wid": "123@s",
        }))
        .await;

    let authenticated =
        wait_for_event(&mut events, |e| matches!(e, Event::Authenticated { .. })).await;
    let Event::Authenticated { session, .. } = authenticated else {
        unreachable!()
    };
    assert_eq!(session.server_token, "S-new");
    assert_eq!(session.client_id, "Y2xpZW50");

    wait_for_event(&mut events, |e| matches!(e, Event::Ready)).await;
    client.disconnect().await;
}

#[tokio::test]
async fn logout_clears_the_session() {
    let (client, mut listener) = memory_client(test_config());
    let mut events = client.subscribe();

    client.connect().await.unwrap();
    let (mut server, _) = open_handshake(&mut listener).await;
    drive_to_ready(&mut server, &mut events).await;
    assert!(client.session().is_some());

    let logout_client = client.clone();
    let logout = tokio::spawn(async move { logout_client.logout().await });

    // The server sees the logout notification before the close.
    let goodbye = server.recv_structured().await;
    assert_eq!(goodbye["type"], "logout");

    logout.await.unwrap();
    assert!(client.session().is_none());
    assert_eq!(client.state(), ConnectionState::Disconnected);

    // A fresh connect starts a new handshake rather than a resume.
    client.connect().await.unwrap();
    let mut server = TestServer::accept(&mut listener).await;
    let init = server.recv_structured().await;
    assert_eq!(init["resume"], false);

    client.disconnect().await;
}

#[tokio::test]
async fn session_record_survives_serde_roundtrip_through_storage() {
    let (client, mut listener) = memory_client(test_config());
    let mut events = client.subscribe();

    client.connect().await.unwrap();
    let (mut server, _) = open_handshake(&mut listener).await;
    drive_to_ready(&mut server, &mut events).await;

    let session = client.session().unwrap();
    let stored = serde_json::to_string(&session).unwrap();
    client.disconnect().await;

    // A brand-new client restores from the opaque record.
    let (restored, mut listener2) = memory_client(test_config());
    restored
        .restore_session(serde_json::from_str(&stored).unwrap())
        .unwrap();
    restored.connect().await.unwrap();

    let mut server2 = TestServer::accept(&mut listener2).await;
    let init = server2.recv_structured().await;
    assert_eq!(init["resume"], true);
    assert_eq!(init["serverToken"], "S1");

    restored.disconnect().await;
}

#[tokio::test]
async fn no_events_after_idle_disconnect() {
    let (client, mut listener) = memory_client(test_config());
    let mut events = client.subscribe();

    client.connect().await.unwrap();
    let (_server, _) = open_handshake(&mut listener).await;
    client.disconnect().await;

    // Drain what the teardown produced, then expect silence: no timer or
    // stale-epoch task may fire afterwards.
    wait_for_event(&mut events, |e| matches!(e, Event::Disconnected { .. })).await;
    assert!(no_event_within(&mut events, Duration::from_millis(200)).await);
    assert_eq!(client.pending_requests(), 0);
}

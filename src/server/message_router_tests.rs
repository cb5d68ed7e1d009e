use crate::config::RoomConfig;
use crate::metrics::ServerMetrics;
use crate::net::SessionHandler;
use crate::persistence::{InMemoryPersistence, PersistenceResult, PersistenceService};
use crate::pool::Pool;
use crate::protocol::{Packet, PacketError, PacketHeader, RankEntry, RecordEntry};
use crate::server::RoomServer;
use crate::session::{Session, SessionId, Transport};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::{timeout, Duration};

/// Every call fails the way an unreachable backend would.
struct UnavailablePersistence;

fn unavailable() -> crate::persistence::PersistenceError {
    std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "backend down").into()
}

#[async_trait]
impl PersistenceService for UnavailablePersistence {
    async fn check_account(&self, _name: &str, _password: &str) -> PersistenceResult<bool> {
        Err(unavailable())
    }

    async fn create_user(&self, _name: &str, _password: &str) -> PersistenceResult<()> {
        Err(unavailable())
    }

    async fn create_record(&self, _user_name: &str, _kill_count: i32) -> PersistenceResult<()> {
        Err(unavailable())
    }

    async fn get_rank(&self, _limit: usize) -> PersistenceResult<Vec<RankEntry>> {
        Err(unavailable())
    }

    async fn get_record(&self, _name: &str, _limit: usize) -> PersistenceResult<Vec<RecordEntry>> {
        Err(unavailable())
    }
}

fn create_test_server(persistence: Arc<dyn PersistenceService>) -> RoomServer {
    create_test_server_with_config(RoomConfig::default(), persistence)
}

fn create_test_server_with_config(config: RoomConfig, persistence: Arc<dyn PersistenceService>) -> RoomServer {
    RoomServer::new(config, persistence, Arc::new(ServerMetrics::new()))
}

fn in_memory_server() -> RoomServer {
    create_test_server(Arc::new(InMemoryPersistence::new()))
}

fn connect(id: SessionId) -> Arc<Session> {
    let packets = Pool::builder(|| Packet::with_capacity(1024))
        .name("test-packet")
        .capacity(8)
        .on_despawn(Packet::reset)
        .build();
    Arc::new(Session::new(id, Transport::Memory, Arc::new(packets)))
}

fn request<F>(header: PacketHeader, build: F) -> Packet
where
    F: FnOnce(&mut Packet) -> Result<(), PacketError>,
{
    let mut packet = Packet::with_capacity(1024);
    build(&mut packet).expect("request fits");
    packet.set_header(header);
    packet
}

fn drain(session: &Session) -> Vec<Packet> {
    std::iter::from_fn(|| session.pop_outbound()).collect()
}

/// Wait for a reply produced by a spawned persistence task.
async fn next_reply(session: &Session) -> Packet {
    timeout(Duration::from_secs(2), async {
        loop {
            if let Some(packet) = session.pop_outbound() {
                return packet;
            }
            session.outbound_ready().await;
        }
    })
    .await
    .expect("reply within timeout")
}

async fn send(server: &RoomServer, session: &Arc<Session>, mut packet: Packet) {
    server.on_packet(session, &mut packet).await;
}

async fn join_pair(server: &RoomServer) -> (Arc<Session>, Arc<Session>) {
    let a = connect(1);
    let b = connect(2);
    send(server, &a, request(PacketHeader::RequestRoomJoin, |_| Ok(()))).await;
    send(server, &b, request(PacketHeader::RequestRoomJoin, |_| Ok(()))).await;
    drain(&a);
    drain(&b);
    (a, b)
}

#[tokio::test]
async fn ping_replies_with_session_id() {
    let server = in_memory_server();
    let session = connect(42);

    send(&server, &session, request(PacketHeader::Ping, |_| Ok(()))).await;

    let mut replies = drain(&session);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].header().unwrap(), PacketHeader::Pong);
    assert_eq!(replies[0].read_u32().unwrap(), 42);
}

#[tokio::test]
async fn join_request_carries_optional_display_name() {
    let server = in_memory_server();
    let session = connect(5);

    send(
        &server,
        &session,
        request(PacketHeader::RequestRoomJoin, |p| p.write_string("Maverick")),
    )
    .await;

    assert!(server.room_of(5).is_some());
    assert_eq!(session.display_name(), "Maverick");
}

#[tokio::test]
async fn empty_sync_relays_nothing() {
    let server = in_memory_server();
    let (a, b) = join_pair(&server).await;

    send(&server, &a, request(PacketHeader::RequestObjectSync, |_| Ok(()))).await;

    assert!(drain(&a).is_empty());
    assert!(drain(&b).is_empty());
}

#[tokio::test]
async fn sync_body_is_relayed_verbatim_to_others() {
    let server = in_memory_server();
    let (a, b) = join_pair(&server).await;
    let payload = [9u8, 8, 7, 6, 5];

    send(
        &server,
        &a,
        request(PacketHeader::RequestObjectSync, |p| p.copy_buffer(&payload)),
    )
    .await;

    let relayed = drain(&b);
    assert_eq!(relayed.len(), 1);
    assert_eq!(relayed[0].header().unwrap(), PacketHeader::ObjectSync);
    assert_eq!(relayed[0].body(), &payload);
    assert!(drain(&a).is_empty());
}

#[tokio::test]
async fn chat_is_tagged_with_sender_and_skips_sender() {
    let server = in_memory_server();
    let (a, b) = join_pair(&server).await;

    send(&server, &b, request(PacketHeader::Chat, |p| p.write_string("gg héllo 🚀"))).await;

    let mut relayed = drain(&a);
    assert_eq!(relayed.len(), 1);
    assert_eq!(relayed[0].header().unwrap(), PacketHeader::Chat);
    assert_eq!(relayed[0].read_u32().unwrap(), 2);
    assert_eq!(relayed[0].read_string().unwrap(), "gg héllo 🚀");
    assert!(drain(&b).is_empty());
}

#[tokio::test]
async fn rpc_payload_is_opaque() {
    let server = in_memory_server();
    let (a, b) = join_pair(&server).await;

    send(
        &server,
        &a,
        request(PacketHeader::Rpc, |p| {
            p.write_i16(3)?;
            p.write_f32(0.5)
        }),
    )
    .await;

    let relayed = drain(&b);
    assert_eq!(relayed[0].header().unwrap(), PacketHeader::Rpc);
    assert_eq!(relayed[0].body(), &[0, 3, 0, 0, 0, 0x3f]);
}

#[tokio::test]
async fn server_opcodes_from_clients_are_ignored() {
    let server = in_memory_server();
    let (a, b) = join_pair(&server).await;

    send(&server, &a, request(PacketHeader::SetHostClient, |p| p.write_u32(1))).await;
    send(&server, &a, request(PacketHeader::ObjectSpawn, |_| Ok(()))).await;

    assert!(drain(&a).is_empty());
    assert!(drain(&b).is_empty());
    assert_eq!(server.metrics().snapshot().traffic.packets_dropped, 2);
}

#[tokio::test]
async fn unknown_opcode_is_counted_as_dropped() {
    let server = in_memory_server();
    let session = connect(1);

    let mut packet = Packet::with_capacity(64);
    packet.set_header(999i16);
    server.on_packet(&session, &mut packet).await;

    assert!(drain(&session).is_empty());
    assert_eq!(server.metrics().snapshot().traffic.packets_dropped, 1);
}

#[tokio::test]
async fn malformed_body_is_dropped_without_side_effects() {
    let server = in_memory_server();
    let (a, b) = join_pair(&server).await;

    // A spawn cut off after the network id.
    send(
        &server,
        &a,
        request(PacketHeader::RequestObjectSpawn, |p| p.write_i32(7)),
    )
    .await;

    assert!(drain(&b).is_empty());
    let room = server.room_of(1).unwrap();
    assert!(server.room_view(room).await.unwrap().spawned_objects.is_empty());
}

#[tokio::test]
async fn disconnect_leaves_room_through_handler() {
    let server = in_memory_server();
    let (a, b) = join_pair(&server).await;

    server.on_disconnected(&a).await;

    let mut received = drain(&b);
    let kinds: Vec<_> = received.iter().map(|p| p.header().unwrap()).collect();
    assert_eq!(kinds, vec![PacketHeader::RoomLeave, PacketHeader::SetHostClient]);
    assert_eq!(received[0].read_u32().unwrap(), 1);
    assert_eq!(received[1].read_u32().unwrap(), 2);
    assert_eq!(server.room_of(1), None);

    // Not being in a room is not an error on disconnect.
    server.on_disconnected(&connect(99)).await;
}

#[tokio::test]
async fn sign_up_then_sign_in_stores_user_name() {
    let server = in_memory_server();
    let session = connect(1);

    let mut sign_up = request(PacketHeader::RequestSignUp, |p| {
        p.write_string("ace")?;
        p.write_string("hunter2")
    });
    server
        .handle_sign_up(&session, &mut sign_up)
        .unwrap()
        .await
        .unwrap();
    let mut reply = next_reply(&session).await;
    assert_eq!(reply.header().unwrap(), PacketHeader::SignUpAllow);
    assert_eq!(reply.read_string().unwrap(), "ace");

    let mut wrong = request(PacketHeader::RequestSignIn, |p| {
        p.write_string("ace")?;
        p.write_string("nope")
    });
    server.handle_sign_in(&session, &mut wrong).unwrap().await.unwrap();
    assert_eq!(next_reply(&session).await.header().unwrap(), PacketHeader::SignInDeny);
    assert_eq!(session.user_name(), None);

    let mut right = request(PacketHeader::RequestSignIn, |p| {
        p.write_string("ace")?;
        p.write_string("hunter2")
    });
    server.handle_sign_in(&session, &mut right).unwrap().await.unwrap();
    let mut reply = next_reply(&session).await;
    assert_eq!(reply.header().unwrap(), PacketHeader::SignInAllow);
    assert_eq!(reply.read_string().unwrap(), "ace");
    assert_eq!(session.user_name().as_deref(), Some("ace"));
}

#[tokio::test]
async fn duplicate_sign_up_is_denied_without_counting_a_failure() {
    let server = in_memory_server();
    let session = connect(1);

    for expected in [PacketHeader::SignUpAllow, PacketHeader::SignUpDeny] {
        let mut sign_up = request(PacketHeader::RequestSignUp, |p| {
            p.write_string("ace")?;
            p.write_string("pw")
        });
        server.handle_sign_up(&session, &mut sign_up).unwrap().await.unwrap();
        assert_eq!(next_reply(&session).await.header().unwrap(), expected);
    }
    assert_eq!(server.metrics().snapshot().persistence_failures, 0);
}

#[tokio::test]
async fn records_feed_rank_and_record_queries() {
    let server = in_memory_server();
    let session = connect(1);

    for (name, kills) in [("ace", 4), ("bee", 9), ("ace", 12)] {
        let mut create = request(PacketHeader::RequestCreateRecord, |p| {
            p.write_string(name)?;
            p.write_i32(kills)
        });
        server.handle_create_record(&session, &mut create).unwrap().await.unwrap();
    }
    assert!(drain(&session).is_empty());

    server.handle_rank_request(&session).await.unwrap();
    let mut rank = next_reply(&session).await;
    assert_eq!(rank.header().unwrap(), PacketHeader::Rank);
    let entries: Vec<RankEntry> = rank.read_list().unwrap();
    assert_eq!(
        entries
            .iter()
            .map(|e| (e.rank, e.name.as_str(), e.kill_count))
            .collect::<Vec<_>>(),
        vec![(1, "ace", 12), (2, "bee", 9)]
    );

    let mut query = request(PacketHeader::RequestRecord, |p| p.write_string("ace"));
    server.handle_record_request(&session, &mut query).unwrap().await.unwrap();
    let mut record = next_reply(&session).await;
    assert_eq!(record.header().unwrap(), PacketHeader::Record);
    let records: Vec<RecordEntry> = record.read_list().unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.name == "ace"));
}

#[tokio::test]
async fn long_record_history_still_gets_a_reply() {
    let config = RoomConfig {
        record_limit: 500,
        ..RoomConfig::default()
    };
    let server = create_test_server_with_config(config, Arc::new(InMemoryPersistence::new()));
    let session = connect(1);

    for kills in 0..120 {
        let mut create = request(PacketHeader::RequestCreateRecord, |p| {
            p.write_string("ace")?;
            p.write_i32(kills)
        });
        server.handle_create_record(&session, &mut create).unwrap().await.unwrap();
    }

    let mut query = request(PacketHeader::RequestRecord, |p| p.write_string("ace"));
    server.handle_record_request(&session, &mut query).unwrap().await.unwrap();
    let mut record = next_reply(&session).await;
    assert_eq!(record.header().unwrap(), PacketHeader::Record);
    let records: Vec<RecordEntry> = record.read_list().unwrap();
    assert!(!records.is_empty());
    assert!(records.len() < 120);
    assert_eq!(record.remaining(), 0);
    // The newest records survive the cut.
    assert_eq!(records[0].kill_count, 119);
}

#[tokio::test]
async fn record_reply_honours_configured_limit() {
    let server = in_memory_server();
    let session = connect(1);

    for kills in 0..30 {
        let mut create = request(PacketHeader::RequestCreateRecord, |p| {
            p.write_string("ace")?;
            p.write_i32(kills)
        });
        server.handle_create_record(&session, &mut create).unwrap().await.unwrap();
    }

    let mut query = request(PacketHeader::RequestRecord, |p| p.write_string("ace"));
    server.handle_record_request(&session, &mut query).unwrap().await.unwrap();
    let records: Vec<RecordEntry> = next_reply(&session).await.read_list().unwrap();
    assert!(records.len() <= RoomConfig::default().record_limit);
    assert!(!records.is_empty());
}

#[tokio::test]
async fn long_rank_board_still_gets_a_reply() {
    let config = RoomConfig {
        rank_limit: 500,
        ..RoomConfig::default()
    };
    let server = create_test_server_with_config(config, Arc::new(InMemoryPersistence::new()));
    let session = connect(1);

    for index in 0..120 {
        let name = format!("pilot-{index:03}");
        let mut create = request(PacketHeader::RequestCreateRecord, |p| {
            p.write_string(&name)?;
            p.write_i32(index)
        });
        server.handle_create_record(&session, &mut create).unwrap().await.unwrap();
    }

    server.handle_rank_request(&session).await.unwrap();
    let mut rank = next_reply(&session).await;
    let entries: Vec<RankEntry> = rank.read_list().unwrap();
    assert!(!entries.is_empty());
    assert!(entries.len() < 120);
    assert_eq!(rank.remaining(), 0);
    assert_eq!((entries[0].rank, entries[0].kill_count), (1, 119));
}

#[tokio::test]
async fn persistence_failure_becomes_deny_or_empty_reply() {
    let server = create_test_server(Arc::new(UnavailablePersistence));
    let session = connect(1);

    let mut sign_in = request(PacketHeader::RequestSignIn, |p| {
        p.write_string("ace")?;
        p.write_string("pw")
    });
    server.handle_sign_in(&session, &mut sign_in).unwrap().await.unwrap();
    assert_eq!(next_reply(&session).await.header().unwrap(), PacketHeader::SignInDeny);

    let mut sign_up = request(PacketHeader::RequestSignUp, |p| {
        p.write_string("ace")?;
        p.write_string("pw")
    });
    server.handle_sign_up(&session, &mut sign_up).unwrap().await.unwrap();
    assert_eq!(next_reply(&session).await.header().unwrap(), PacketHeader::SignUpDeny);

    server.handle_rank_request(&session).await.unwrap();
    let mut rank = next_reply(&session).await;
    assert_eq!(rank.header().unwrap(), PacketHeader::Rank);
    assert_eq!(rank.read_i32().unwrap(), 0);

    let mut query = request(PacketHeader::RequestRecord, |p| p.write_string("ace"));
    server.handle_record_request(&session, &mut query).unwrap().await.unwrap();
    let mut record = next_reply(&session).await;
    assert_eq!(record.read_i32().unwrap(), 0);

    let mut create = request(PacketHeader::RequestCreateRecord, |p| {
        p.write_string("ace")?;
        p.write_i32(1)
    });
    server.handle_create_record(&session, &mut create).unwrap().await.unwrap();
    assert!(drain(&session).is_empty());

    assert_eq!(server.metrics().snapshot().persistence_failures, 5);
}

#[tokio::test]
async fn persistence_requests_route_through_handler() {
    let server = in_memory_server();
    let session = connect(1);

    send(&server, &session, request(PacketHeader::RequestRank, |_| Ok(()))).await;

    let mut rank = next_reply(&session).await;
    assert_eq!(rank.header().unwrap(), PacketHeader::Rank);
    assert_eq!(rank.read_i32().unwrap(), 0);
}

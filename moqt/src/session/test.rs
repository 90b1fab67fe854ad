use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::FutureExt;

use super::*;
use crate::announce::AnnouncementTree;
use crate::message::{Announce, GroupOrder, GroupRange};
use crate::transport::{memory::MemoryConnection, TransportError};
use tokio::time::Instant;
use crate::{GroupErrorCode, SessionErrorCode};

async fn pair(client: SessionConfig, server: SessionConfig) -> (Session, Session) {
	let (a, b) = MemoryConnection::pair();
	let (client, server) = tokio::join!(Session::connect(a, client), Session::accept(b, server));
	(client.unwrap(), server.unwrap())
}

fn info(order: GroupOrder) -> message::Info {
	message::Info {
		priority: 0,
		latest: 0,
		order,
		expires: Duration::ZERO,
	}
}

fn config(min: u64, max: u64) -> SubscribeConfig {
	SubscribeConfig {
		order: GroupOrder::Ascending,
		range: GroupRange::new(min, max),
		..Default::default()
	}
}

// Subscribe on the client and accept on the server, returning both handles.
async fn subscribe(client: &Session, server: &Session, path: &str, config: SubscribeConfig) -> (Subscribe, Subscribed) {
	let accept = async {
		let mut subscribed = server.accept_subscribe().await?;
		subscribed.accept(info(GroupOrder::Default)).await?;
		Ok::<_, Error>(subscribed)
	};

	let (subscribe, subscribed) = tokio::join!(client.subscribe(Path::from(path), config), accept);
	(subscribe.unwrap(), subscribed.unwrap())
}

// With time paused, sleeping lets every other task run until they're all idle.
async fn settle() {
	tokio::time::sleep(Duration::from_millis(10)).await;
}

// Play the client by hand, returning the setup stream which must be kept open.
async fn play_client(conn: &MemoryConnection) -> Result<Stream, Error> {
	let mut setup = Stream::open(conn, StreamType::Session).await?;
	let client = message::SessionClient {
		versions: Versions::default(),
		params: Parameters::new(),
	};
	setup.writer.encode(&client).await?;
	let _: message::SessionServer = setup.reader.decode().await?;

	Ok(setup)
}

// Play the server by hand, agreeing to the client's first version.
async fn play_server(conn: &MemoryConnection) -> Result<Stream, Error> {
	let (send, recv) = conn.accept_bi().await?;
	let mut setup = Stream {
		writer: Writer::new(send, StreamType::Session),
		reader: Reader::new(recv, StreamType::Session),
	};

	assert_eq!(setup.reader.decode_silent::<StreamType>().await?, StreamType::Session);
	let client: message::SessionClient = setup.reader.decode().await?;

	let server = message::SessionServer {
		version: client.versions[0],
		params: Parameters::new(),
	};
	setup.writer.encode(&server).await?;

	Ok(setup)
}

fn request(id: u64, path: &str) -> message::Subscribe {
	message::Subscribe {
		id,
		path: Path::from(path),
		priority: 0,
		order: GroupOrder::Ascending,
		expires: Duration::ZERO,
		range: GroupRange::new(1, 100),
		params: Parameters::new(),
	}
}

#[tokio::test]
async fn setup() {
	let mut client = SessionConfig::default();
	client.parameters.set_string(Parameters::PATH, "/live");

	let (client, server) = pair(client, SessionConfig::default()).await;

	assert_eq!(client.version(), Version::DEVELOP);
	assert_eq!(server.version(), Version::DEVELOP);
	assert_eq!(server.client_parameters().path(), Some("/live"));
}

#[tokio::test]
async fn version_mismatch() {
	let client = SessionConfig {
		versions: [Version(1)].into(),
		..Default::default()
	};

	let (a, b) = MemoryConnection::pair();
	let (client, server) = tokio::join!(
		Session::connect(a, client),
		Session::accept(b, SessionConfig::default())
	);

	assert!(matches!(server.err(), Some(Error::Version(..))));

	let code = SessionErrorCode::ProtocolViolation.into();
	assert!(matches!(
		client.err(),
		Some(Error::Transport(TransportError::Closed { code: c, .. })) if c == code
	));
}

#[tokio::test]
async fn announce() {
	let (client, server) = pair(SessionConfig::default(), SessionConfig::default()).await;

	let mut announced = client.announced(Path::from(["room", "42"]), Parameters::new()).await.unwrap();

	let mut announce = server.accept_announce().await.unwrap();
	assert_eq!(announce.prefix(), &Path::from(["room", "42"]));

	announce.active(Path::from(["alice"]), Parameters::new()).await.unwrap();
	announce.active(Path::from(["bob"]), Parameters::new()).await.unwrap();
	announce.live(Parameters::new()).await.unwrap();

	let tracks = announced.receive_announcements().await.unwrap();
	assert_eq!(tracks, vec![Path::from(["alice"]), Path::from(["bob"])]);

	announce.ended(Path::from(["alice"]), Parameters::new()).await.unwrap();

	let mut statuses = Vec::new();
	for _ in 0..4 {
		statuses.push(announced.next().await.unwrap().unwrap().status());
	}

	use message::AnnounceStatus::*;
	assert_eq!(statuses, vec![Active, Active, Live, Ended]);
	assert_eq!(announced.announced().unwrap(), vec![Path::from(["bob"])]);

	// Local validation catches mistakes before they hit the wire.
	assert!(announce.ended(Path::from(["alice"]), Parameters::new()).await.is_err());
	assert!(announce.live(Parameters::new()).await.is_err());
}

#[tokio::test]
async fn duplicate_interest() {
	tokio::time::pause();

	let (client, server) = pair(SessionConfig::default(), SessionConfig::default()).await;

	let _first = client.announced(Path::from(["room"]), Parameters::new()).await.unwrap();
	let _accepted = server.accept_announce().await.unwrap();

	let mut second = client.announced(Path::from(["room"]), Parameters::new()).await.unwrap();
	assert!(matches!(second.live().await, Err(Error::Remote(0x2))));

	// Only the one stream was affected.
	settle().await;
	assert!(server.accept_announce().now_or_never().is_none());
}

#[tokio::test]
async fn announce_tree() {
	let (client, server) = pair(SessionConfig::default(), SessionConfig::default()).await;

	let tree = AnnouncementTree::new();
	tree.announce(Path::from(["room", "42", "alice"]), Parameters::new()).unwrap();
	tree.announce(Path::from(["room", "7", "carol"]), Parameters::new()).unwrap();

	let mut announced = client.announced(Path::from(["room", "42"]), Parameters::new()).await.unwrap();
	let interest = server.accept_announce().await.unwrap();

	let serve = tree.clone();
	tokio::spawn(async move { interest.serve(&serve).await });

	assert_eq!(announced.receive_announcements().await.unwrap(), vec![Path::from(["alice"])]);

	tree.announce(Path::from(["room", "42", "bob"]), Parameters::new()).unwrap();
	tree.unannounce(&Path::from(["room", "42", "alice"])).unwrap();

	loop {
		let announce = announced.next().await.unwrap().unwrap();
		if let Announce::Ended { suffix, .. } = announce {
			assert_eq!(suffix, Path::from(["alice"]));
			break;
		}
	}

	assert_eq!(announced.announced().unwrap(), vec![Path::from(["bob"])]);
}

#[tokio::test]
async fn ordered_groups() {
	tokio::time::pause();

	let (client, server) = pair(SessionConfig::default(), SessionConfig::default()).await;
	let (subscribe, mut subscribed) = subscribe(&client, &server, "room/42/alice", config(1, 100)).await;

	assert_eq!(subscribed.path(), &Path::from(["room", "42", "alice"]));

	for (sequence, payload) in [(5, "X"), (3, "Y"), (4, "Z")] {
		let mut group = subscribed.open_group(sequence, 0).await.unwrap();
		group.write_frame(Bytes::from(payload)).await.unwrap();
		group.close().unwrap();
	}

	settle().await;
	assert_eq!(subscribe.pending(), 3);

	let mut received = Vec::new();
	for _ in 0..3 {
		let mut group = subscribe.accept_group().await.unwrap();
		let frames = group.read_all().await.unwrap();
		received.push((group.sequence(), frames));
	}

	assert_eq!(
		received,
		vec![
			(3, vec![Bytes::from("Y")]),
			(4, vec![Bytes::from("Z")]),
			(5, vec![Bytes::from("X")]),
		]
	);
}

#[tokio::test]
async fn out_of_range() {
	tokio::time::pause();

	let (client, server) = pair(SessionConfig::default(), SessionConfig::default()).await;
	let (subscribe, mut subscribed) = subscribe(&client, &server, "room/42/alice", config(1, 100)).await;

	let mut group = subscribed.open_group(200, 0).await.unwrap();
	settle().await;

	let code = GroupErrorCode::OutOfRange.into();
	assert_eq!(group.write_frame(Bytes::from("late")).await, Err(Error::Remote(code)));
	assert_eq!(subscribe.pending(), 0);
}

#[tokio::test]
async fn narrowing_update() {
	tokio::time::pause();

	let (client, server) = pair(SessionConfig::default(), SessionConfig::default()).await;
	let (mut subscribe, mut subscribed) = subscribe(&client, &server, "room/42/alice", config(1, 100)).await;

	subscribe.update(config(10, 50)).await.unwrap();

	let current = subscribed.updated().await.unwrap();
	assert_eq!(current.range, GroupRange::new(10, 50));

	assert_eq!(subscribe.update(config(5, 50)).await, Err(Error::InvalidRange));
	assert_eq!(subscribe.config().range, GroupRange::new(10, 50));

	// Groups outside the narrowed range are now rejected.
	let mut group = subscribed.open_group(60, 0).await.unwrap();
	settle().await;

	let code = GroupErrorCode::OutOfRange.into();
	assert_eq!(group.write_frame(Bytes::from("late")).await, Err(Error::Remote(code)));
}

#[tokio::test]
async fn widening_update_rejected_by_publisher() {
	let (a, b) = MemoryConnection::pair();

	// Play the client by hand so we can skip the local range check.
	let (server, setup) = tokio::join!(Session::accept(b, SessionConfig::default()), play_client(&a));
	let (server, _setup) = (server.unwrap(), setup.unwrap());

	let mut stream = Stream::open(&a, StreamType::Subscribe).await.unwrap();
	stream.writer.encode(&request(0, "a")).await.unwrap();

	let mut subscribed = server.accept_subscribe().await.unwrap();
	subscribed.accept(info(GroupOrder::Default)).await.unwrap();
	let _: message::Info = stream.reader.decode().await.unwrap();

	stream.writer.encode(&config(0, 0)).await.unwrap();

	assert_eq!(subscribed.updated().await, None);
	assert_eq!(subscribed.current().range, GroupRange::new(1, 100));

	let code = u32::from(crate::SubscribeErrorCode::InvalidRange);
	let res = stream.reader.decode_maybe::<message::SubscribeGap>().await;
	assert_eq!(res.err(), Some(Error::Remote(code)));
}

#[tokio::test]
async fn gaps() {
	let (client, server) = pair(SessionConfig::default(), SessionConfig::default()).await;
	let (mut subscribe, mut subscribed) = subscribe(&client, &server, "room/42/alice", config(1, 100)).await;

	subscribed.gap(2, 3, GroupErrorCode::Expires).await.unwrap();

	let gap = subscribe.next_gap().await.unwrap();
	assert_eq!((gap.start, gap.count), (2, 3));
	assert_eq!(gap.code, u32::from(GroupErrorCode::Expires));

	// Closing the subscription ends the gap stream.
	subscribed.close().await.unwrap();
	assert!(subscribe.next_gap().await.is_none());
	assert_eq!(subscribe.accept_group().await.err(), Some(Error::Closed));
}

#[tokio::test]
async fn publisher_order() {
	tokio::time::pause();

	let (client, server) = pair(SessionConfig::default(), SessionConfig::default()).await;

	let accept = async {
		let mut subscribed = server.accept_subscribe().await?;
		subscribed.accept(info(GroupOrder::Descending)).await?;
		Ok::<_, Error>(subscribed)
	};

	let (subscribe, subscribed) = tokio::join!(client.subscribe(Path::from("a"), config(0, 0)), accept);
	let (subscribe, mut subscribed) = (subscribe.unwrap(), subscribed.unwrap());

	// The publisher's order wins over the subscriber's.
	assert_eq!(subscribe.config().order, GroupOrder::Descending);

	for sequence in [1, 3, 2] {
		subscribed.open_group(sequence, 0).await.unwrap().close().unwrap();
	}

	settle().await;

	let mut sequences = Vec::new();
	for _ in 0..3 {
		sequences.push(subscribe.accept_group().await.unwrap().sequence());
	}

	assert_eq!(sequences, vec![3, 2, 1]);
}

#[tokio::test]
async fn duplicate_active() {
	tokio::time::pause();

	let (a, b) = MemoryConnection::pair();

	// Play the server by hand so we can misbehave.
	let (client, setup) = tokio::join!(Session::connect(a, SessionConfig::default()), play_server(&b));
	let (client, _setup) = (client.unwrap(), setup.unwrap());

	let mut announced = client.announced(Path::from(["room", "42"]), Parameters::new()).await.unwrap();

	let (send, recv) = b.accept_bi().await.unwrap();
	let mut reader = Reader::new(recv, StreamType::Announce);
	let mut writer = Writer::new(send, StreamType::Announce);

	assert_eq!(reader.decode_silent::<StreamType>().await.unwrap(), StreamType::Announce);
	let _: message::AnnouncePlease = reader.decode().await.unwrap();

	let active = Announce::Active {
		suffix: Path::from(["alice"]),
		params: Parameters::new(),
	};
	writer.encode(&active).await.unwrap();
	writer.encode(&active).await.unwrap();

	assert!(matches!(announced.live().await, Err(Error::ProtocolViolation(_))));

	let code = SessionErrorCode::ProtocolViolation.into();
	assert!(matches!(b.closed().await, TransportError::Closed { code: c, .. } if c == code));
}

#[tokio::test]
async fn too_many_subscribes() {
	tokio::time::pause();

	let mut server = SessionConfig::default();
	server.parameters.set_uint(Parameters::MAX_SUBSCRIBE_ID, 1);

	let (client, server) = pair(SessionConfig::default(), server).await;
	let (_subscribe, _subscribed) = subscribe(&client, &server, "a", config(0, 0)).await;

	// The cap is enforced before anything is sent.
	let res = client.subscribe(Path::from("b"), config(0, 0)).await;
	assert_eq!(res.err(), Some(Error::TooManySubscribes));

	settle().await;
	assert!(server.accept_subscribe().now_or_never().is_none());
}

#[tokio::test]
async fn goaway_timeout() {
	tokio::time::pause();

	let (client, server) = pair(SessionConfig::default(), SessionConfig::default()).await;

	assert!(client.go_away("https://elsewhere", Duration::from_secs(1)).await.is_err());
	server.go_away("https://elsewhere", Duration::from_secs(5)).await.unwrap();

	assert_eq!(client.goaway().await.as_deref(), Some("https://elsewhere"));

	// We didn't leave in time.
	let code = SessionErrorCode::GoAwayTimeout.into();
	let err = client.closed().await;
	assert!(matches!(err, Error::Transport(TransportError::Closed { code: c, .. }) if c == code));
}

#[tokio::test]
async fn bitrate() {
	tokio::time::pause();

	let (client, server) = pair(SessionConfig::default(), SessionConfig::default()).await;
	assert_eq!(server.peer_bitrate(), None);

	client.update(2_000_000).await.unwrap();
	settle().await;

	assert_eq!(server.peer_bitrate(), Some(2_000_000));
}

#[tokio::test]
async fn info_request() {
	let (client, server) = pair(SessionConfig::default(), SessionConfig::default()).await;

	let respond = async {
		let request = server.accept_info().await?;
		assert_eq!(request.path(), &Path::from("room/42"));

		request
			.respond(message::Info {
				latest: 9,
				..info(GroupOrder::Ascending)
			})
			.await
	};

	let (info, res) = tokio::join!(client.info(Path::from("room/42")), respond);
	res.unwrap();

	assert_eq!(info.unwrap().latest, 9);
}

#[tokio::test]
async fn info_missing() {
	let (client, server) = pair(SessionConfig::default(), SessionConfig::default()).await;

	let reject = async {
		let request = server.accept_info().await.unwrap();
		request.reject(Error::NotFound);
	};

	let (info, _) = tokio::join!(client.info(Path::from("nope")), reject);
	assert_eq!(info.err(), Some(Error::Remote(0x1)));
}

#[tokio::test]
async fn fetch() {
	let (client, server) = pair(SessionConfig::default(), SessionConfig::default()).await;

	let request = message::Fetch {
		path: Path::from("room/42/alice"),
		priority: 1,
		group: 7,
		frame: 2,
	};

	let serve = async {
		let fetch = server.accept_fetch().await?;
		assert_eq!(fetch.request().group, 7);

		let mut group = fetch.accept(3).await?;
		assert_eq!(group.frame_sequence(), 2);

		group.write_frame(Bytes::from("c")).await?;
		group.write_frame(Bytes::from("d")).await?;
		assert_eq!(group.frame_sequence(), 4);

		group.close()
	};

	let (reader, res) = tokio::join!(client.fetch(request), serve);
	res.unwrap();

	let mut reader = reader.unwrap();
	assert_eq!(reader.info().sequence, 7);
	assert_eq!(reader.info().priority, 3);
	assert_eq!(reader.frame_sequence(), 2);

	assert_eq!(reader.read_all().await.unwrap(), vec![Bytes::from("c"), Bytes::from("d")]);
	assert_eq!(reader.frame_sequence(), 4);
}

#[tokio::test]
async fn datagrams() {
	let (client, server) = pair(SessionConfig::default(), SessionConfig::default()).await;
	let (subscribe, subscribed) = subscribe(&client, &server, "room/42/alice", config(1, 100)).await;

	subscribed.send_datagram(4, 0, Bytes::from("hi")).unwrap();

	let datagram = subscribe.accept_datagram().await.unwrap();
	assert_eq!(datagram.info.sequence, 4);
	assert_eq!(datagram.payload, Bytes::from("hi"));
}

#[tokio::test]
async fn terminate() {
	let (client, server) = pair(SessionConfig::default(), SessionConfig::default()).await;

	server.terminate(Error::Unauthorized);

	let code = SessionErrorCode::Unauthorized.into();
	assert!(matches!(client.closed().await, Error::Transport(TransportError::Closed { code: c, .. }) if c == code));
	assert_eq!(client.accept_subscribe().await.err(), Some(Error::Closed));
}

#[tokio::test]
async fn group_priority_across_subscriptions() {
	tokio::time::pause();

	let (a, b) = MemoryConnection::pair();
	let (server, setup) = tokio::join!(Session::accept(b, SessionConfig::default()), play_client(&a));
	let (server, _setup) = (server.unwrap(), setup.unwrap());

	// Both subscriptions have the same track priority.
	let mut first = Stream::open(&a, StreamType::Subscribe).await.unwrap();
	first.writer.encode(&request(0, "a")).await.unwrap();
	let mut lazy = server.accept_subscribe().await.unwrap();
	lazy.accept(info(GroupOrder::Default)).await.unwrap();

	let mut second = Stream::open(&a, StreamType::Subscribe).await.unwrap();
	second.writer.encode(&request(1, "b")).await.unwrap();
	let mut urgent = server.accept_subscribe().await.unwrap();
	urgent.accept(info(GroupOrder::Default)).await.unwrap();

	let mut low = Box::pin(lazy.open_group(1, 9));
	let mut high = Box::pin(urgent.open_group(2, 0));

	// Queue both before the scheduler gets a chance to run.
	assert!((&mut low).now_or_never().is_none());
	assert!((&mut high).now_or_never().is_none());

	let (low, high) = tokio::join!(low, high);
	let (_low, _high) = (low.unwrap(), high.unwrap());

	let mut opened = Vec::new();
	for _ in 0..2 {
		let mut reader = Reader::new(a.accept_uni().await.unwrap(), StreamType::Group);
		assert_eq!(reader.decode_silent::<StreamType>().await.unwrap(), StreamType::Group);

		let group: message::Group = reader.decode().await.unwrap();
		opened.push((group.subscribe, group.priority));
	}

	assert_eq!(opened, vec![(1, 0), (0, 9)]);
}

#[tokio::test]
async fn announce_backlog() {
	tokio::time::pause();

	let (client, server) = pair(SessionConfig::default(), SessionConfig::default()).await;

	let mut announced = client.announced(Path::from("room"), Parameters::new()).await.unwrap();
	let mut sender = server.accept_announce().await.unwrap();

	let total = super::announce::MAX_EVENTS + 10;
	for i in 0..total {
		sender.active(Path::from(i.to_string().as_str()), Parameters::new()).await.unwrap();
	}
	sender.live(Parameters::new()).await.unwrap();

	// Nobody called next(), but the current set is still complete.
	assert_eq!(announced.receive_announcements().await.unwrap().len(), total);

	sender.close().unwrap();

	let mut events = Vec::new();
	while let Some(event) = announced.next().await.unwrap() {
		events.push(event);
	}

	// Only the most recent messages were kept.
	assert_eq!(events.len(), super::announce::MAX_EVENTS);
	assert_eq!(
		events.first(),
		Some(&Announce::Active {
			suffix: Path::from("11"),
			params: Parameters::new(),
		})
	);
	assert_eq!(
		events.last(),
		Some(&Announce::Live {
			params: Parameters::new()
		})
	);
}

#[tokio::test]
async fn unknown_subscribe_id() {
	tokio::time::pause();

	let (a, b) = MemoryConnection::pair();
	let (client, setup) = tokio::join!(Session::connect(a, SessionConfig::default()), play_server(&b));
	let (_client, _setup) = (client.unwrap(), setup.unwrap());

	// We never subscribed, so there's no id 5.
	let mut group = Writer::new(b.open_uni().await.unwrap(), StreamType::Group);
	group.encode_silent(&StreamType::Group).await.unwrap();
	group
		.encode(&message::Group {
			subscribe: 5,
			sequence: 0,
			priority: 0,
		})
		.await
		.unwrap();

	let code = SessionErrorCode::ProtocolViolation.into();
	assert!(matches!(b.closed().await, TransportError::Closed { code: c, .. } if c == code));
}

#[tokio::test]
async fn closed_subscribe_id() {
	tokio::time::pause();

	let (a, b) = MemoryConnection::pair();
	let (client, setup) = tokio::join!(Session::connect(a, SessionConfig::default()), play_server(&b));
	let (client, _setup) = (client.unwrap(), setup.unwrap());

	let serve = async {
		let (send, recv) = b.accept_bi().await?;
		let mut stream = Stream {
			writer: Writer::new(send, StreamType::Subscribe),
			reader: Reader::new(recv, StreamType::Subscribe),
		};

		assert_eq!(stream.reader.decode_silent::<StreamType>().await?, StreamType::Subscribe);
		let request: message::Subscribe = stream.reader.decode().await?;
		stream.writer.encode(&info(GroupOrder::Default)).await?;

		Ok::<_, Error>((request, stream))
	};

	let (subscribe, res) = tokio::join!(client.subscribe(Path::from("a"), config(1, 100)), serve);
	let (request, _stream) = res.unwrap();
	drop(subscribe.unwrap());
	settle().await;

	// A group that raced the unsubscribe.
	let mut group = Writer::new(b.open_uni().await.unwrap(), StreamType::Group);
	group.encode_silent(&StreamType::Group).await.unwrap();
	group
		.encode(&message::Group {
			subscribe: request.id,
			sequence: 1,
			priority: 0,
		})
		.await
		.unwrap();

	settle().await;

	let code = GroupErrorCode::Closed.into();
	let frame = message::Frame {
		payload: Bytes::from("late"),
	};
	assert_eq!(group.encode(&frame).await, Err(Error::Remote(code)));

	// Only the group was cancelled.
	assert!(client.closed().now_or_never().is_none());
}

#[tokio::test]
async fn unknown_stream_type() {
	tokio::time::pause();

	for bidi in [true, false] {
		let (a, b) = MemoryConnection::pair();
		let (server, setup) = tokio::join!(Session::accept(b, SessionConfig::default()), play_client(&a));
		let (_server, _setup) = (server.unwrap(), setup.unwrap());

		let send = match bidi {
			true => a.open_bi().await.unwrap().0,
			false => a.open_uni().await.unwrap(),
		};

		let mut writer = Writer::new(send, StreamType::Session);
		writer.encode_silent(&0x2au8).await.unwrap();

		let code = SessionErrorCode::ProtocolViolation.into();
		assert!(matches!(a.closed().await, TransportError::Closed { code: c, .. } if c == code));
	}
}

#[tokio::test]
async fn duplicate_subscribe_id() {
	tokio::time::pause();

	let (a, b) = MemoryConnection::pair();
	let (server, setup) = tokio::join!(Session::accept(b, SessionConfig::default()), play_client(&a));
	let (server, _setup) = (server.unwrap(), setup.unwrap());

	let mut first = Stream::open(&a, StreamType::Subscribe).await.unwrap();
	first.writer.encode(&request(0, "a")).await.unwrap();
	let mut subscribed = server.accept_subscribe().await.unwrap();
	subscribed.accept(info(GroupOrder::Default)).await.unwrap();

	let mut second = Stream::open(&a, StreamType::Subscribe).await.unwrap();
	second.writer.encode(&request(0, "b")).await.unwrap();

	let code = u32::from(crate::SubscribeErrorCode::DuplicatedId);
	let res = second.reader.decode::<message::Info>().await;
	assert_eq!(res.err(), Some(Error::Remote(code)));

	// The first subscription is untouched.
	let _: message::Info = first.reader.decode().await.unwrap();
	settle().await;
	assert!(server.accept_subscribe().now_or_never().is_none());
	assert!(subscribed.open_group(1, 0).await.is_ok());
}

#[tokio::test]
async fn read_deadline() {
	tokio::time::pause();

	let (client, server) = pair(SessionConfig::default(), SessionConfig::default()).await;
	let (subscribe, mut subscribed) = subscribe(&client, &server, "a", config(1, 100)).await;

	let mut writer = subscribed.open_group(1, 0).await.unwrap();
	let mut group = subscribe.accept_group().await.unwrap();

	group.set_deadline(Some(Instant::now() + Duration::from_secs(1)));
	assert_eq!(group.read_frame().await, Err(Error::Timeout));

	settle().await;

	let code = GroupErrorCode::SendInterrupted.into();
	assert_eq!(writer.write_frame(Bytes::from("late")).await, Err(Error::Remote(code)));
}

// Never accepts a byte, like a stream out of flow control credit.
struct Stalled(Arc<std::sync::Mutex<Option<u32>>>);

#[async_trait::async_trait]
impl crate::transport::SendStream for Stalled {
	async fn write(&mut self, _buf: &[u8]) -> Result<usize, TransportError> {
		std::future::pending::<Result<usize, TransportError>>().await
	}

	fn set_priority(&mut self, _priority: i32) {}

	fn finish(&mut self) -> Result<(), TransportError> {
		Ok(())
	}

	fn reset(&mut self, code: u32) {
		*self.0.lock().unwrap() = Some(code);
	}
}

#[tokio::test]
async fn write_deadline() {
	tokio::time::pause();

	let reset = Arc::new(std::sync::Mutex::new(None));
	let info = message::Group {
		subscribe: 0,
		sequence: 1,
		priority: 0,
	};

	let writer = Writer::new(Box::new(Stalled(reset.clone())), StreamType::Group);
	let mut group = GroupWriter::new(info, writer);

	group.set_deadline(Some(Instant::now() + Duration::from_secs(1)));
	assert_eq!(group.write_frame(Bytes::from("stuck")).await, Err(Error::Timeout));

	let code = GroupErrorCode::SendInterrupted.into();
	assert_eq!(*reset.lock().unwrap(), Some(code));
}

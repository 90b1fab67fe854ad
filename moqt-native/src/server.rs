use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::{fs, net, sync::Arc};

use anyhow::Context;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use ring::digest::{digest, SHA256};
use rustls::crypto::ring::sign::any_supported_type;
use rustls::pki_types::{CertificateDer, PrivatePkcs8KeyDer, ServerName};
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use url::Url;

use crate::{client::transport_config, Connection, ALPN_MOQT, ALPN_WEBTRANSPORT};

/// A PEM certificate chain and its private key.
#[derive(clap::Args, Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerTlsCert {
	pub chain: PathBuf,
	pub key: PathBuf,
}

impl ServerTlsCert {
	// Parses `chain.pem:key.pem` for the command line.
	pub fn parse(s: &str) -> anyhow::Result<Self> {
		let (chain, key) = s.split_once(':').context("expected <chain>:<key>")?;
		Ok(Self {
			chain: PathBuf::from(chain),
			key: PathBuf::from(key),
		})
	}
}

#[derive(clap::Args, Clone, Default, Debug, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerTlsConfig {
	/// Load a certificate chain and key from disk, as `<chain>:<key>`.
	#[arg(long = "tls-cert", value_parser = ServerTlsCert::parse)]
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub cert: Vec<ServerTlsCert>,

	/// Generate a self-signed certificate for these hostnames.
	///
	/// Clients must disable verification or pin the fingerprint.
	#[arg(long = "tls-generate", value_delimiter = ',')]
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub generate: Vec<String>,
}

#[derive(clap::Args, Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ServerConfig {
	/// Listen for UDP packets on the given address, `[::]:443` by default.
	#[arg(long)]
	pub listen: Option<net::SocketAddr>,

	#[command(flatten)]
	#[serde(default)]
	pub tls: ServerTlsConfig,
}

impl ServerConfig {
	pub fn init(self) -> anyhow::Result<Server> {
		Server::new(self)
	}
}

/// Accepts both raw QUIC and WebTransport connections on the same port.
pub struct Server {
	quic: quinn::Endpoint,
	accept: FuturesUnordered<BoxFuture<'static, anyhow::Result<Connection>>>,
	fingerprints: Vec<String>,
}

impl Server {
	pub fn new(config: ServerConfig) -> anyhow::Result<Self> {
		let mut certs = ServeCerts::default();
		for cert in &config.tls.cert {
			certs.load(&cert.chain, &cert.key)?;
		}

		if !config.tls.generate.is_empty() {
			certs.generate(&config.tls.generate)?;
		}

		anyhow::ensure!(!certs.is_empty(), "no TLS certificates configured");
		let fingerprints = certs.fingerprints();

		let provider = Arc::new(rustls::crypto::ring::default_provider());
		let mut tls = rustls::ServerConfig::builder_with_provider(provider)
			.with_protocol_versions(&[&rustls::version::TLS13])?
			.with_no_client_auth()
			.with_cert_resolver(Arc::new(certs));

		tls.alpn_protocols = vec![ALPN_WEBTRANSPORT.to_vec(), ALPN_MOQT.to_vec()];

		let tls: quinn::crypto::rustls::QuicServerConfig = tls.try_into()?;
		let mut tls = quinn::ServerConfig::with_crypto(Arc::new(tls));
		tls.transport_config(Arc::new(transport_config()?));

		let listen = config
			.listen
			.unwrap_or_else(|| net::SocketAddr::from((net::Ipv6Addr::UNSPECIFIED, 443)));
		let socket = std::net::UdpSocket::bind(listen).context("failed to bind UDP socket")?;

		let runtime = quinn::default_runtime().context("no async runtime")?;
		let quic = quinn::Endpoint::new(quinn::EndpointConfig::default(), Some(tls), socket, runtime)
			.context("failed to create QUIC endpoint")?;

		Ok(Self {
			quic,
			accept: Default::default(),
			fingerprints,
		})
	}

	/// Hex-encoded SHA-256 fingerprints of our certificates.
	pub fn fingerprints(&self) -> &[String] {
		&self.fingerprints
	}

	/// Returns the next established connection, or None on shutdown.
	pub async fn accept(&mut self) -> Option<Connection> {
		loop {
			tokio::select! {
				res = self.quic.accept() => {
					let incoming = res?;
					self.accept.push(Self::accept_connection(incoming).boxed());
				}
				Some(res) = self.accept.next() => match res {
					Ok(conn) => return Some(conn),
					Err(err) => tracing::warn!(?err, "failed to accept connection"),
				},
				_ = tokio::signal::ctrl_c() => {
					self.close();
					return None;
				}
			}
		}
	}

	async fn accept_connection(incoming: quinn::Incoming) -> anyhow::Result<Connection> {
		let mut connecting = incoming.accept()?;

		let handshake = connecting
			.handshake_data()
			.await?
			.downcast::<quinn::crypto::rustls::HandshakeData>()
			.ok()
			.context("missing handshake data")?;

		let alpn = handshake.protocol.context("missing ALPN")?;
		let host = handshake.server_name.unwrap_or_default();

		tracing::debug!(%host, ip = %connecting.remote_address(), alpn = %String::from_utf8_lossy(&alpn), "accepting");

		let conn = connecting.await.context("failed to establish QUIC connection")?;

		match alpn.as_slice() {
			ALPN_WEBTRANSPORT => {
				let request = web_transport_quinn::accept(conn)
					.await
					.context("failed to receive WebTransport request")?;

				let url = request.url().clone();
				let session = request
					.ok()
					.await
					.context("failed to respond to WebTransport request")?;

				Ok(Connection::new(session, url))
			}
			ALPN_MOQT => {
				// Raw QUIC has no request, so make up a URL for consistency.
				let url = Url::parse(&format!("moqt://{}", host)).context("invalid server name")?;
				Ok(Connection::new(conn.into(), url))
			}
			_ => anyhow::bail!("unsupported ALPN: {}", String::from_utf8_lossy(&alpn)),
		}
	}

	pub fn local_addr(&self) -> anyhow::Result<net::SocketAddr> {
		self.quic.local_addr().context("failed to get local address")
	}

	pub fn close(&mut self) {
		self.quic.close(quinn::VarInt::from_u32(0), b"server shutdown");
	}
}

#[derive(Debug, Default)]
struct ServeCerts {
	certs: Vec<Arc<CertifiedKey>>,
}

impl ServeCerts {
	fn is_empty(&self) -> bool {
		self.certs.is_empty()
	}

	fn load(&mut self, chain: &Path, key: &Path) -> anyhow::Result<()> {
		let chain = fs::File::open(chain).context("failed to open cert file")?;
		let chain: Vec<CertificateDer> = rustls_pemfile::certs(&mut io::BufReader::new(chain))
			.collect::<Result<_, _>>()
			.context("failed to read certs")?;

		anyhow::ensure!(!chain.is_empty(), "could not find certificate");

		let mut buf = Vec::new();
		fs::File::open(key)
			.context("failed to open key file")?
			.read_to_end(&mut buf)?;

		let key = rustls_pemfile::private_key(&mut Cursor::new(&buf))?.context("missing private key")?;
		let key = any_supported_type(&key)?;

		self.certs.push(Arc::new(CertifiedKey::new(chain, key)));
		Ok(())
	}

	fn generate(&mut self, hostnames: &[String]) -> anyhow::Result<()> {
		let key_pair = rcgen::KeyPair::generate()?;
		let mut params = rcgen::CertificateParams::new(hostnames.to_vec())?;

		// WebTransport only accepts self-signed certificates valid for at most two weeks.
		params.not_before = time::OffsetDateTime::now_utc() - time::Duration::days(1);
		params.not_after = params.not_before + time::Duration::days(14);

		let cert = params.self_signed(&key_pair)?;

		let key = PrivatePkcs8KeyDer::from(key_pair.serialized_der().to_vec());
		let key = any_supported_type(&key.into())?;

		self.certs.push(Arc::new(CertifiedKey::new(vec![cert.into()], key)));
		Ok(())
	}

	fn fingerprints(&self) -> Vec<String> {
		self.certs
			.iter()
			.filter_map(|ck| ck.cert.first())
			.map(|cert| hex::encode(digest(&SHA256, cert.as_ref())))
			.collect()
	}

	// The first certificate valid for the requested server name.
	fn best(&self, server_name: &str) -> Option<Arc<CertifiedKey>> {
		let name = ServerName::try_from(server_name).ok()?;

		self.certs
			.iter()
			.find(|ck| {
				let Ok(leaf) = ck.end_entity_cert() else {
					return false;
				};

				webpki::EndEntityCert::try_from(leaf)
					.map(|cert| cert.verify_is_valid_for_subject_name(&name).is_ok())
					.unwrap_or(false)
			})
			.cloned()
	}
}

impl ResolvesServerCert for ServeCerts {
	fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
		if let Some(cert) = client_hello.server_name().and_then(|name| self.best(name)) {
			return Some(cert);
		}

		tracing::warn!(server_name = ?client_hello.server_name(), "no matching certificate, using the first");
		self.certs.first().cloned()
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn generate() {
		let mut certs = ServeCerts::default();
		certs.generate(&["localhost".to_string()]).unwrap();

		assert_eq!(certs.fingerprints().len(), 1);
		assert_eq!(certs.fingerprints()[0].len(), 64);
		assert!(certs.best("localhost").is_some());
		assert!(certs.best("example.com").is_none());
	}

	#[test]
	fn parse_cert() {
		let cert = ServerTlsCert::parse("chain.pem:key.pem").unwrap();
		assert_eq!(cert.chain, PathBuf::from("chain.pem"));
		assert_eq!(cert.key, PathBuf::from("key.pem"));
		assert!(ServerTlsCert::parse("chain.pem").is_err());
	}

	// Both handshakes over a real UDP socket, then a session on top.
	#[tokio::test]
	async fn loopback() {
		let mut server = ServerConfig {
			listen: Some("127.0.0.1:0".parse().unwrap()),
			tls: ServerTlsConfig {
				generate: vec!["localhost".to_string()],
				..Default::default()
			},
		}
		.init()
		.unwrap();
		let port = server.local_addr().unwrap().port();

		let client = crate::ClientConfig {
			bind: "127.0.0.1:0".parse().unwrap(),
			tls_fingerprints: server.fingerprints().to_vec(),
			..Default::default()
		}
		.init()
		.unwrap();

		for (url, path) in [
			(format!("https://127.0.0.1:{port}/room"), "/room"),
			(format!("moqt://127.0.0.1:{port}"), ""),
		] {
			let url = Url::parse(&url).unwrap();
			let (outbound, inbound) = tokio::join!(client.connect(url.clone()), server.accept());
			let (outbound, inbound) = (outbound.unwrap(), inbound.unwrap());

			assert_eq!(outbound.url(), &url);
			assert_eq!(inbound.url().scheme(), url.scheme());
			assert_eq!(inbound.url().path(), path);

			let (a, b) = tokio::join!(
				moqt::Session::connect(outbound, moqt::SessionConfig::default()),
				moqt::Session::accept(inbound, moqt::SessionConfig::default())
			);
			a.unwrap();
			b.unwrap();
		}

		server.close();
	}
}

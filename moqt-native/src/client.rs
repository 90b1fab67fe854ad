use std::path::PathBuf;
use std::{fs, io, net, sync::Arc, time::Duration};

use anyhow::Context;
use ring::digest::{digest, SHA256};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use url::Url;

use crate::{Connection, ALPN_MOQT, ALPN_WEBTRANSPORT};

// The port used when the URL doesn't carry one, for both schemes.
const DEFAULT_PORT: u16 = 443;

#[derive(Clone, Debug, clap::Args, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ClientConfig {
	/// The local UDP address, any port by default.
	#[arg(long = "client-bind", default_value = "[::]:0")]
	pub bind: net::SocketAddr,

	/// PEM files of trusted roots, replacing the platform store.
	#[arg(long = "tls-root")]
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub tls_roots: Vec<PathBuf>,

	/// Accept a server whose leaf certificate has this hex SHA-256 fingerprint, signed by anybody.
	///
	/// Pairs with a relay started with `--tls-generate`, which logs its fingerprints.
	#[arg(long = "tls-fingerprint")]
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub tls_fingerprints: Vec<String>,

	/// Danger: accept any server certificate.
	#[arg(long)]
	pub tls_disable_verify: bool,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			bind: net::SocketAddr::from((net::Ipv6Addr::UNSPECIFIED, 0)),
			tls_roots: Vec::new(),
			tls_fingerprints: Vec::new(),
			tls_disable_verify: false,
		}
	}
}

impl ClientConfig {
	pub fn init(self) -> anyhow::Result<Client> {
		Client::new(self)
	}
}

/// Dials MoQ Transport servers over raw QUIC or WebTransport.
#[derive(Clone)]
pub struct Client {
	quic: quinn::Endpoint,
	tls: rustls::ClientConfig,
	transport: Arc<quinn::TransportConfig>,
}

impl Client {
	pub fn new(config: ClientConfig) -> anyhow::Result<Self> {
		let provider = Arc::new(rustls::crypto::ring::default_provider());
		let builder = rustls::ClientConfig::builder_with_provider(provider.clone())
			.with_protocol_versions(&[&rustls::version::TLS13])?;

		let tls = if config.tls_disable_verify {
			tracing::warn!("TLS verification disabled");
			let verifier = PinnedVerifier::new(provider, Vec::new());
			builder.dangerous().with_custom_certificate_verifier(Arc::new(verifier))
		} else if !config.tls_fingerprints.is_empty() {
			let fingerprints = config
				.tls_fingerprints
				.iter()
				.map(|fingerprint| hex::decode(fingerprint).context("invalid fingerprint"))
				.collect::<anyhow::Result<Vec<_>>>()?;

			let verifier = PinnedVerifier::new(provider, fingerprints);
			builder.dangerous().with_custom_certificate_verifier(Arc::new(verifier))
		} else {
			builder.with_root_certificates(load_roots(&config.tls_roots)?)
		};
		let tls = tls.with_no_client_auth();

		let socket = std::net::UdpSocket::bind(config.bind).context("failed to bind UDP socket")?;
		let runtime = quinn::default_runtime().context("no async runtime")?;
		let quic = quinn::Endpoint::new(quinn::EndpointConfig::default(), None, socket, runtime)
			.context("failed to create QUIC endpoint")?;

		Ok(Self {
			quic,
			tls,
			transport: Arc::new(transport_config()?),
		})
	}

	/// Connect to `https://` for WebTransport or `moqt://` for raw QUIC.
	#[tracing::instrument("connect", skip_all, fields(%url, id = tracing::field::Empty))]
	pub async fn connect(&self, url: Url) -> anyhow::Result<Connection> {
		let alpn = alpn(&url)?;

		let host = url.host_str().context("missing host")?.to_string();
		let port = url.port().unwrap_or(DEFAULT_PORT);

		let addr = tokio::net::lookup_host((host.as_str(), port))
			.await
			.context("failed DNS lookup")?
			.next()
			.context("no DNS entries")?;

		let mut tls = self.tls.clone();
		tls.alpn_protocols = vec![alpn.to_vec()];

		let tls: quinn::crypto::rustls::QuicClientConfig = tls.try_into()?;
		let mut config = quinn::ClientConfig::new(Arc::new(tls));
		config.transport_config(self.transport.clone());

		tracing::debug!(%addr, alpn = %String::from_utf8_lossy(alpn), "dialing");

		let conn = self.quic.connect_with(config, addr, &host)?.await?;
		tracing::Span::current().record("id", conn.stable_id());

		let session = match alpn {
			ALPN_WEBTRANSPORT => web_transport_quinn::connect_with(conn, &url)
				.await
				.context("WebTransport handshake failed")?,
			_ => conn.into(),
		};

		Ok(Connection::new(session, url))
	}
}

fn alpn(url: &Url) -> anyhow::Result<&'static [u8]> {
	match url.scheme() {
		"https" => Ok(ALPN_WEBTRANSPORT),
		"moqt" => Ok(ALPN_MOQT),
		scheme => anyhow::bail!("unsupported scheme: {}", scheme),
	}
}

// The platform store, unless specific roots were configured.
fn load_roots(paths: &[PathBuf]) -> anyhow::Result<rustls::RootCertStore> {
	let mut roots = rustls::RootCertStore::empty();

	if paths.is_empty() {
		let native = rustls_native_certs::load_native_certs();
		for err in native.errors {
			tracing::warn!(?err, "skipping platform root");
		}

		let (added, ignored) = roots.add_parsable_certificates(native.certs);
		tracing::debug!(added, ignored, "loaded platform roots");
	}

	for path in paths {
		let file = fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;

		for cert in rustls_pemfile::certs(&mut io::BufReader::new(file)) {
			roots.add(cert.context("invalid PEM")?).context("invalid root")?;
		}
	}

	anyhow::ensure!(!roots.is_empty(), "no TLS roots available");
	Ok(roots)
}

pub(crate) fn transport_config() -> anyhow::Result<quinn::TransportConfig> {
	let mut transport = quinn::TransportConfig::default();
	transport.max_idle_timeout(Some(Duration::from_secs(10).try_into()?));
	transport.keep_alive_interval(Some(Duration::from_secs(4)));
	transport.congestion_controller_factory(Arc::new(quinn::congestion::BbrConfig::default()));
	transport.mtu_discovery_config(None);

	Ok(transport)
}

// Skips the chain of trust, optionally requiring a known leaf certificate.
#[derive(Debug)]
struct PinnedVerifier {
	provider: Arc<CryptoProvider>,

	// SHA-256 of the accepted leaf certificates; empty accepts anything.
	fingerprints: Vec<Vec<u8>>,
}

impl PinnedVerifier {
	fn new(provider: Arc<CryptoProvider>, fingerprints: Vec<Vec<u8>>) -> Self {
		Self { provider, fingerprints }
	}

	fn accepts(&self, cert: &CertificateDer<'_>) -> bool {
		if self.fingerprints.is_empty() {
			return true;
		}

		let fingerprint = digest(&SHA256, cert.as_ref());
		self.fingerprints.iter().any(|f| f.as_slice() == fingerprint.as_ref())
	}
}

impl ServerCertVerifier for PinnedVerifier {
	fn verify_server_cert(
		&self,
		end_entity: &CertificateDer<'_>,
		_intermediates: &[CertificateDer<'_>],
		_server_name: &ServerName<'_>,
		_ocsp: &[u8],
		_now: UnixTime,
	) -> Result<ServerCertVerified, rustls::Error> {
		match self.accepts(end_entity) {
			true => Ok(ServerCertVerified::assertion()),
			false => Err(rustls::Error::General("certificate fingerprint mismatch".to_string())),
		}
	}

	fn verify_tls12_signature(
		&self,
		message: &[u8],
		cert: &CertificateDer<'_>,
		dss: &rustls::DigitallySignedStruct,
	) -> Result<HandshakeSignatureValid, rustls::Error> {
		let algs = &self.provider.signature_verification_algorithms;
		rustls::crypto::verify_tls12_signature(message, cert, dss, algs)
	}

	fn verify_tls13_signature(
		&self,
		message: &[u8],
		cert: &CertificateDer<'_>,
		dss: &rustls::DigitallySignedStruct,
	) -> Result<HandshakeSignatureValid, rustls::Error> {
		let algs = &self.provider.signature_verification_algorithms;
		rustls::crypto::verify_tls13_signature(message, cert, dss, algs)
	}

	fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
		self.provider.signature_verification_algorithms.supported_schemes()
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn schemes() {
		assert_eq!(alpn(&Url::parse("https://relay.example/live").unwrap()).unwrap(), ALPN_WEBTRANSPORT);
		assert_eq!(alpn(&Url::parse("moqt://relay.example:4443").unwrap()).unwrap(), ALPN_MOQT);
		assert!(alpn(&Url::parse("http://relay.example").unwrap()).is_err());
	}

	#[test]
	fn pinned() {
		let provider = Arc::new(rustls::crypto::ring::default_provider());
		let cert = CertificateDer::from(vec![1, 2, 3]);
		let fingerprint = digest(&SHA256, &[1, 2, 3]).as_ref().to_vec();

		assert!(PinnedVerifier::new(provider.clone(), Vec::new()).accepts(&cert));
		assert!(PinnedVerifier::new(provider.clone(), vec![fingerprint]).accepts(&cert));
		assert!(!PinnedVerifier::new(provider, vec![vec![0; 32]]).accepts(&cert));
	}
}

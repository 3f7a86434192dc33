//! Shared test infrastructure: fixture zones served over loopback UDP, and
//! helpers for spinning up agents.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::op::ResponseCode;
use hickory_proto::rr::rdata::{CNAME, NS, SOA};
use hickory_proto::rr::{DNSClass, LowerName, Name, RData, Record, RecordSet, RecordType};
use hickory_server::authority::{
    Authority, AuthorityObject, Catalog, LookupControlFlow, LookupError, LookupOptions,
    LookupRecords, MessageRequest, UpdateResult, ZoneType,
};
use hickory_server::server::RequestInfo;
use hickory_server::ServerFuture;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use dvpp::messages::{ValidationRequest, ValidationResult};
use dvpp::validation::Validator;

// --- Constants ---

pub const ORIGIN: &str = "example.com.";
pub const CHALLENGE: &str = "_validate.example.com.";
pub const TARGET: &str = "target.example.com.";
/// Nameserver name served for the zone. A literal address so discovery
/// needs no hosts file.
pub const NS_HOST: &str = "127.0.0.1.";
pub const TTL: u32 = 300;

// --- Fixture zone ---

/// Static zone answering from a fixed record table.
pub struct FixtureZone {
    origin: LowerName,
    records: HashMap<(LowerName, RecordType), Arc<RecordSet>>,
}

impl FixtureZone {
    pub fn new(origin: &str) -> Self {
        Self {
            origin: LowerName::from(Name::from_ascii(origin).unwrap()),
            records: HashMap::new(),
        }
    }

    /// The standard validation zone: NS, SOA and the challenge CNAME.
    pub fn standard() -> Self {
        Self::new(ORIGIN)
            .with_ns(ORIGIN, NS_HOST)
            .with_soa(ORIGIN, NS_HOST)
            .with_cname(CHALLENGE, TARGET)
    }

    fn insert(mut self, owner: &str, rdata: RData) -> Self {
        let name = Name::from_ascii(owner).unwrap();
        let rtype = rdata.record_type();
        let mut record_set = RecordSet::new(name.clone(), rtype, 0);
        let mut record = Record::from_rdata(name.clone(), TTL, rdata);
        record.set_dns_class(DNSClass::IN);
        record_set.insert(record, 0);
        self.records
            .insert((LowerName::from(name), rtype), Arc::new(record_set));
        self
    }

    pub fn with_ns(self, owner: &str, host: &str) -> Self {
        self.insert(owner, RData::NS(NS(Name::from_ascii(host).unwrap())))
    }

    pub fn with_soa(self, owner: &str, mname: &str) -> Self {
        let soa = SOA::new(
            Name::from_ascii(mname).unwrap(),
            Name::from_ascii("hostmaster.example.com.").unwrap(),
            1,
            3600,
            600,
            604800,
            60,
        );
        self.insert(owner, RData::SOA(soa))
    }

    pub fn with_cname(self, owner: &str, target: &str) -> Self {
        self.insert(owner, RData::CNAME(CNAME(Name::from_ascii(target).unwrap())))
    }
}

#[async_trait]
impl Authority for FixtureZone {
    type Lookup = LookupRecords;

    fn zone_type(&self) -> ZoneType {
        ZoneType::Primary
    }

    fn is_axfr_allowed(&self) -> bool {
        false
    }

    fn origin(&self) -> &LowerName {
        &self.origin
    }

    async fn lookup(
        &self,
        name: &LowerName,
        rtype: RecordType,
        lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        match self.records.get(&(name.clone(), rtype)) {
            Some(record_set) => LookupControlFlow::Break(Ok(LookupRecords::new(
                lookup_options,
                Arc::clone(record_set),
            ))),
            // NOERROR with an empty answer and the SOA in the authority section.
            None => LookupControlFlow::Break(Err(LookupError::NameExists)),
        }
    }

    async fn search(
        &self,
        request_info: RequestInfo<'_>,
        lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        Authority::lookup(
            self,
            request_info.query.name(),
            request_info.query.query_type(),
            lookup_options,
        )
        .await
    }

    async fn get_nsec_records(
        &self,
        _name: &LowerName,
        _lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        LookupControlFlow::Break(Err(LookupError::ResponseCode(ResponseCode::NoError)))
    }

    async fn update(&self, _update: &MessageRequest) -> UpdateResult<bool> {
        Err(ResponseCode::NotImp)
    }
}

// --- Fixture server ---

/// A hickory-server instance on a loopback UDP port.
pub struct FixtureDns {
    pub addr: SocketAddr,
    task: JoinHandle<()>,
}

impl Drop for FixtureDns {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Serve `zone` on 127.0.0.1 at an ephemeral port.
pub async fn serve_zone(zone: FixtureZone) -> FixtureDns {
    let origin = Authority::origin(&zone).clone();
    let authority: Arc<dyn AuthorityObject> = Arc::new(zone);
    let mut catalog = Catalog::new();
    catalog.upsert(origin, vec![authority]);

    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();

    let mut server = ServerFuture::new(catalog);
    server.register_socket(socket);
    let task = tokio::spawn(async move {
        let _ = server.block_until_done().await;
    });

    FixtureDns { addr, task }
}

// --- Log capture ---

/// Collects formatted log output for assertions.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// Install a thread-local subscriber writing into this buffer.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::TRACE)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// --- Agent helpers ---

/// Validator answering every request with a fixed result.
pub struct StaticValidator {
    pub result: ValidationResult,
    pub seen: std::sync::Mutex<Vec<ValidationRequest>>,
}

impl StaticValidator {
    pub fn new(result: ValidationResult) -> Self {
        Self {
            result,
            seen: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn success(response: &str) -> Self {
        Self::new(ValidationResult {
            success: true,
            response: response.to_string(),
            errors: Vec::new(),
        })
    }
}

#[async_trait]
impl Validator for StaticValidator {
    async fn validate(&self, request: &ValidationRequest) -> ValidationResult {
        self.seen.lock().unwrap().push(request.clone());
        self.result.clone()
    }
}

/// Self-signed certificate for `localhost` and `127.0.0.1`, as PEM strings.
pub fn self_signed() -> (String, String) {
    let generated =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string(), "127.0.0.1".to_string()])
            .unwrap();
    (generated.cert.pem(), generated.key_pair.serialize_pem())
}

/// A free loopback port.
pub fn free_port() -> u16 {
    StdTcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Wait until something accepts TCP connections on `addr`.
pub async fn wait_for_listener(addr: SocketAddr) {
    for _ in 0..100 {
        if tokio::net::TcpStream::connect(addr).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("nothing listening on {}", addr);
}

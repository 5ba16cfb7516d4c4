//! Shared test helpers for client tests.

#![allow(dead_code)]

use devauth_client::{
    AuthClient, CacheStore, ClientConfig, DeviceFacts, HeartbeatTransport, TransportError,
    TransportResponse,
};
use devauth_crypto::WireCipher;
use devauth_types::{DeviceId, EncryptedEnvelope, HeartbeatRequest, HeartbeatResponse};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const SERVER: &str = "http://auth.test:8000";
pub const SECRET: &str = "test-shared-secret";
pub const DEVICE: &str = "0123456789abcdef0123456789abcdef";
pub const HOUR: f64 = 3600.0;
pub const DAY: f64 = 86_400.0;

/// What the fake server answers.
#[derive(Debug, Clone)]
pub enum Reply {
    /// 200 with a sealed verdict.
    Verdict { authorized: bool, message: String },
    /// 200 with a verdict sealed under another secret.
    WrongSecret,
    /// Any status with a raw body.
    Raw { status: u16, body: String },
    /// No response at all.
    ConnectionRefused,
    /// Transport failure that is not a connection problem.
    Broken,
}

impl Reply {
    pub fn authorized() -> Self {
        Self::Verdict {
            authorized: true,
            message: "device authorized".into(),
        }
    }

    pub fn not_authorized() -> Self {
        Self::Verdict {
            authorized: false,
            message: "device not authorized".into(),
        }
    }

    pub fn forbidden(detail: &str) -> Self {
        Self::Raw {
            status: 403,
            body: format!(r#"{{"detail":"{detail}"}}"#),
        }
    }
}

/// Handle for inspecting and steering a [`FakeTransport`] after it was
/// moved into a client.
#[derive(Clone)]
pub struct Recorder {
    reply: Arc<Mutex<Reply>>,
    requests: Arc<Mutex<Vec<HeartbeatRequest>>>,
}

impl Recorder {
    pub fn set_reply(&self, reply: Reply) {
        *self.reply.lock().unwrap() = reply;
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<HeartbeatRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

/// In-process stand-in for the heartbeat endpoint.
pub struct FakeTransport {
    cipher: WireCipher,
    recorder: Recorder,
}

impl FakeTransport {
    pub fn new(reply: Reply) -> (Box<dyn HeartbeatTransport>, Recorder) {
        let recorder = Recorder {
            reply: Arc::new(Mutex::new(reply)),
            requests: Arc::new(Mutex::new(Vec::new())),
        };
        let transport = Self {
            cipher: WireCipher::new(SECRET).unwrap(),
            recorder: recorder.clone(),
        };
        (Box::new(transport), recorder)
    }
}

impl HeartbeatTransport for FakeTransport {
    fn post_heartbeat(
        &self,
        envelope: &EncryptedEnvelope,
    ) -> Result<TransportResponse, TransportError> {
        if let Some(request) = self.cipher.open::<HeartbeatRequest>(&envelope.encrypted_data) {
            self.recorder.requests.lock().unwrap().push(request);
        }
        let reply = self.recorder.reply.lock().unwrap().clone();
        match reply {
            Reply::Verdict {
                authorized,
                message,
            } => Ok(sealed(&self.cipher, authorized, &message)),
            Reply::WrongSecret => {
                let other = WireCipher::new("some-other-secret").unwrap();
                Ok(sealed(&other, true, "device authorized"))
            }
            Reply::Raw { status, body } => Ok(TransportResponse::new(status, body)),
            Reply::ConnectionRefused => Err(TransportError::Connection(
                "tcp connect error: Connection refused (os error 111)".into(),
            )),
            Reply::Broken => Err(TransportError::Other("builder error".into())),
        }
    }
}

fn sealed(cipher: &WireCipher, authorized: bool, message: &str) -> TransportResponse {
    let token = cipher
        .seal(&HeartbeatResponse {
            authorized,
            message: message.to_string(),
        })
        .unwrap();
    let body = serde_json::to_string(&EncryptedEnvelope::new(token)).unwrap();
    TransportResponse::new(200, body)
}

/// Facts of a made-up Linux box.
pub fn sample_facts() -> DeviceFacts {
    DeviceFacts {
        system: Some("Linux".into()),
        release: Some("6.8.0".into()),
        version: Some("#1 SMP".into()),
        machine: Some("x86_64".into()),
        processor: Some("Test CPU".into()),
        hostname: Some("test-host".into()),
        ip_address: Some("192.168.1.20".into()),
        cpu_count: Some(8),
        cpu_freq_mhz: Some(2400.0),
        memory_total_gb: Some(15.55),
        disk_id: Some("/dev/nvme0n1p2".into()),
        disk_total_gb: Some(465.76),
        mac: Some("00:1a:2b:3c:4d:5e".into()),
        username: Some("tester".into()),
    }
}

/// Temporary cache and identity directories for one test.
pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn cache_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("cache")
    }

    pub fn identity_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("identity")
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig::new(SERVER)
            .with_secret(SECRET)
            .with_device_id(DEVICE)
            .with_software_name("test-app")
            .with_cache_dir(self.cache_dir())
            .with_identity_dir(self.identity_dir())
    }

    pub fn client(&self, reply: Reply) -> (AuthClient, Recorder) {
        self.client_with(self.config(), reply)
    }

    pub fn client_with(&self, config: ClientConfig, reply: Reply) -> (AuthClient, Recorder) {
        let (transport, recorder) = FakeTransport::new(reply);
        let client = AuthClient::with_transport(config, sample_facts(), transport).unwrap();
        (client, recorder)
    }

    /// A store reading the same file the default client writes.
    pub fn cache(&self) -> CacheStore {
        CacheStore::new(
            self.cache_dir(),
            &DeviceId::new(DEVICE).unwrap(),
            SERVER,
            7,
            2,
        )
    }
}

pub fn now() -> f64 {
    devauth_types::unix_now()
}

//! In-memory collaborators for boot sequence tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use wgs_core::config::{LinkConfig, SupervisorConfig, TunnelConfig, WorkloadConfig};
use wgs_core::error::{LinkError, StoreError, TimeSyncError, TunnelError, WorkloadError};
use wgs_core::traits::{
    LinkDriver, LinkEventSender, SettingsStore, TimeSource, TunnelService, WorkloadService,
};
use wgs_core::LinkEvent;

pub const KEY_A: &str = "yAnz5TF+lXXJte14tji3zlMNq+hd2rYUIgJBgB3fBmk=";
pub const KEY_B: &str = "xTIBA5rboUvnH4htodjb6e697QjLERt1NAB4mZqp8Dg=";

/// Configuration that passes validation
pub fn test_config() -> SupervisorConfig {
    let mut config = SupervisorConfig::default();
    config.link.ssid = "test-ap".to_string();
    config.link.password = "hunter22".to_string();
    config.link.max_retries = 3;
    config.tunnel = TunnelConfig {
        private_key: KEY_A.to_string(),
        peer_public_key: KEY_B.to_string(),
        endpoint: "peer.example.net".to_string(),
        ..Default::default()
    };
    config
}

/// Settings store that can fail its first `init`
#[derive(Default)]
pub struct MemoryStore {
    first_init: Mutex<Option<StoreError>>,
    pub inits: AtomicU32,
    pub erases: AtomicU32,
    always_fail: bool,
}

impl MemoryStore {
    pub fn failing_once(error: StoreError) -> Self {
        Self {
            first_init: Mutex::new(Some(error)),
            ..Default::default()
        }
    }

    pub fn broken() -> Self {
        Self {
            always_fail: true,
            ..Default::default()
        }
    }
}

impl SettingsStore for MemoryStore {
    fn init(&self) -> Result<(), StoreError> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        if self.always_fail {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            )));
        }
        match self.first_init.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn erase(&self) -> Result<(), StoreError> {
        self.erases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// What the access point does with one connect request
#[derive(Debug, Clone, Copy)]
pub enum Association {
    Accept,
    Reject,
}

/// Link driver replaying a script of association outcomes.
///
/// Once the script runs out every request is rejected.
#[derive(Default)]
pub struct ScriptedLink {
    script: Mutex<VecDeque<Association>>,
    events: Mutex<Option<LinkEventSender>>,
    pub configures: AtomicU32,
    pub connects: AtomicU32,
}

impl ScriptedLink {
    pub fn new(script: impl IntoIterator<Item = Association>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            ..Default::default()
        }
    }

    pub fn address() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 168, 1, 42))
    }

    fn sender(&self) -> Result<LinkEventSender, LinkError> {
        self.events
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| LinkError::Connect("not started".to_string()))
    }
}

#[async_trait]
impl LinkDriver for ScriptedLink {
    async fn configure(&self, _config: &LinkConfig) -> Result<(), LinkError> {
        self.configures.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn start(&self, events: LinkEventSender) -> Result<(), LinkError> {
        *self.events.lock().unwrap() = Some(events.clone());
        events
            .send(LinkEvent::SessionStarted)
            .await
            .map_err(|_| LinkError::EventChannelClosed)
    }

    async fn connect(&self) -> Result<(), LinkError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Association::Reject);
        let event = match outcome {
            Association::Accept => LinkEvent::AddressAcquired {
                address: Self::address(),
            },
            Association::Reject => LinkEvent::Disconnected { reason: Some(201) },
        };
        self.sender()?
            .send(event)
            .await
            .map_err(|_| LinkError::EventChannelClosed)
    }
}

/// Tunnel whose peer answers after a number of status checks
pub struct FakeTunnel {
    pub fail_connect: bool,
    pub up_after: Option<u32>,
    pub checks: Arc<AtomicU32>,
}

impl FakeTunnel {
    pub fn up_after(checks: u32) -> Self {
        Self {
            fail_connect: false,
            up_after: Some(checks),
            checks: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn never_up() -> Self {
        Self {
            up_after: None,
            ..Self::up_after(0)
        }
    }

    pub fn refusing() -> Self {
        Self {
            fail_connect: true,
            ..Self::never_up()
        }
    }
}

#[async_trait]
impl TunnelService for FakeTunnel {
    type Context = String;

    async fn init(&self, config: &TunnelConfig) -> Result<String, TunnelError> {
        Ok(config.endpoint_address())
    }

    async fn connect(&self, _ctx: &mut String) -> Result<(), TunnelError> {
        if self.fail_connect {
            Err(TunnelError::Connect("handshake refused".to_string()))
        } else {
            Ok(())
        }
    }

    async fn peer_is_up(&self, _ctx: &String) -> Result<bool, TunnelError> {
        let checks = self.checks.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(matches!(self.up_after, Some(n) if checks >= n))
    }

    async fn disconnect(&self, _ctx: String) -> Result<(), TunnelError> {
        Ok(())
    }
}

/// Workload that only counts calls
#[derive(Default)]
pub struct CountingWorkload {
    pub starts: AtomicU32,
    pub stops: AtomicU32,
}

impl CountingWorkload {
    pub fn starts(&self) -> u32 {
        self.starts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkloadService for CountingWorkload {
    async fn start(&self, _config: &WorkloadConfig) -> Result<(), WorkloadError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), WorkloadError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Clock returning a fixed time, or failing
pub struct FixedClock {
    pub reachable: bool,
}

impl FixedClock {
    pub fn now() -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_700_000_000)
    }
}

#[async_trait]
impl TimeSource for FixedClock {
    async fn obtain_time(&self) -> Result<SystemTime, TimeSyncError> {
        if self.reachable {
            Ok(Self::now())
        } else {
            Err(TimeSyncError::Exhausted { attempts: 10 })
        }
    }
}

/// Layer recording the target of every ERROR event
#[derive(Clone, Default)]
pub struct ErrorLog {
    targets: Arc<Mutex<Vec<String>>>,
}

impl ErrorLog {
    pub fn count_from(&self, target: &str) -> usize {
        self.targets
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.as_str() == target)
            .count()
    }
}

impl<S: Subscriber> Layer<S> for ErrorLog {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::ERROR {
            self.targets
                .lock()
                .unwrap()
                .push(event.metadata().target().to_string());
        }
    }
}

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use super::error::RegistryError;

/// 服务实例地址，注册表只存储不解析
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceAddress {
    pub host: String,
    pub port: u16,
}

impl ServiceAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for ServiceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// 实例存活状态
///
/// 注册表中的实例总是 `Alive`，`Evicted` 只出现在注销/驱逐事件携带的快照上。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Liveness {
    Alive,
    Evicted,
}

// 服务实例信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub id: String,
    pub service_name: String,
    pub address: ServiceAddress,
    pub metadata: HashMap<String, String>,
    pub last_seen: SystemTime,
    pub liveness: Liveness,
}

impl ServiceInstance {
    /// 距离上次心跳是否已达到 TTL，时钟回拨时视为未过期
    pub fn is_expired(&self, now: SystemTime, ttl: Duration) -> bool {
        match now.duration_since(self.last_seen) {
            Ok(elapsed) => elapsed >= ttl,
            Err(_) => false,
        }
    }

    pub(crate) fn refresh(&mut self, now: SystemTime) {
        self.last_seen = now;
        self.liveness = Liveness::Alive;
    }

    pub(crate) fn into_evicted(mut self) -> Self {
        self.liveness = Liveness::Evicted;
        self
    }
}

/// 注册请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub service_name: String,
    pub id: String,
    pub address: ServiceAddress,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Registration {
    pub fn new(
        service_name: impl Into<String>,
        id: impl Into<String>,
        address: ServiceAddress,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            id: id.into(),
            address,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub(crate) fn validate(&self) -> Result<(), RegistryError> {
        if self.service_name.trim().is_empty() {
            return Err(RegistryError::InvalidArgument(
                "service name must not be empty".into(),
            ));
        }
        if self.id.trim().is_empty() {
            return Err(RegistryError::InvalidArgument(
                "instance id must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn into_instance(self, now: SystemTime) -> ServiceInstance {
        ServiceInstance {
            id: self.id,
            service_name: self.service_name,
            address: self.address,
            metadata: self.metadata,
            last_seen: now,
            liveness: Liveness::Alive,
        }
    }
}

/// 注册表配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// 心跳超时，超过该时长未续约的实例会被清理
    pub ttl: Duration,
    /// 清理任务执行间隔
    pub sweep_interval: Duration,
    /// 事件广播通道容量
    pub event_channel_capacity: usize,
}

impl RegistryConfig {
    pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;

    /// 以 `ttl / 2` 作为默认清理间隔
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sweep_interval: ttl / 2,
            event_channel_capacity: Self::DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }

    pub fn with_sweep_interval(mut self, sweep_interval: Duration) -> Self {
        self.sweep_interval = sweep_interval;
        self
    }

    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.ttl.is_zero() {
            return Err(RegistryError::InvalidConfig("ttl must be greater than zero".into()));
        }
        if self.sweep_interval.is_zero() {
            return Err(RegistryError::InvalidConfig(
                "sweep interval must be greater than zero".into(),
            ));
        }
        if self.sweep_interval > self.ttl {
            return Err(RegistryError::InvalidConfig(format!(
                "sweep interval ({:?}) must not exceed ttl ({:?})",
                self.sweep_interval, self.ttl
            )));
        }
        if self.event_channel_capacity == 0 {
            return Err(RegistryError::InvalidConfig(
                "event channel capacity must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

/// 注册表变更事件
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    Registered {
        instance: ServiceInstance,
        /// 是否覆盖了同 ID 的已有实例
        replaced: bool,
    },
    Deregistered {
        instance: ServiceInstance,
    },
    Evicted {
        instance: ServiceInstance,
    },
}

impl RegistryEvent {
    pub fn instance(&self) -> &ServiceInstance {
        match self {
            RegistryEvent::Registered { instance, .. }
            | RegistryEvent::Deregistered { instance }
            | RegistryEvent::Evicted { instance } => instance,
        }
    }
}

// 注册表统计信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub registered_services: usize,
    pub active_instances: usize,
}

// 服务名 -> 实例列表
pub(crate) type InstancesByService = HashMap<String, Vec<ServiceInstance>>;

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::{CancellationToken, DropGuard};
use tokio_util::task::TaskTracker;

use super::clock::{Clock, SystemClock};
use super::error::RegistryError;
use super::types::{
    InstancesByService, Registration, RegistryConfig, RegistryEvent, RegistryStats,
    ServiceInstance,
};

/// 基于心跳续约和 TTL 清理的服务注册表
///
/// 所有写操作（注册、心跳、注销以及后台清理）共享同一把读写锁，
/// 读操作返回的都是快照副本。克隆出的句柄共享同一份状态，
/// 最后一个句柄被释放时后台清理任务随之停止。
#[derive(Debug, Clone)]
pub struct ServiceRegistry {
    pub(super) services: Arc<RwLock<InstancesByService>>,
    pub(super) config: RegistryConfig,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) events: broadcast::Sender<RegistryEvent>,
    pub(super) shutdown: CancellationToken,
    pub(super) task_tracker: TaskTracker,
    _sweeper_guard: Arc<DropGuard>,
}

impl ServiceRegistry {
    /// 使用系统时钟创建注册表并启动清理任务，必须在 tokio 运行时中调用
    pub fn new(config: RegistryConfig) -> Result<Self, RegistryError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: RegistryConfig, clock: Arc<dyn Clock>) -> Result<Self, RegistryError> {
        config.validate()?;
        let handle = Handle::try_current()?;

        let (events, _) = broadcast::channel(config.event_channel_capacity);
        let shutdown = CancellationToken::new();

        let registry = Self {
            services: Arc::new(RwLock::new(HashMap::new())),
            config,
            clock,
            events,
            _sweeper_guard: Arc::new(shutdown.clone().drop_guard()),
            shutdown,
            task_tracker: TaskTracker::new(),
        };

        // 启动定期清理任务
        registry.start_sweeper(&handle);

        tracing::info!(
            ttl_ms = registry.config.ttl.as_millis() as u64,
            sweep_interval_ms = registry.config.sweep_interval.as_millis() as u64,
            "Service registry started"
        );

        Ok(registry)
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    // 注册或覆盖服务实例
    pub fn register(&self, registration: Registration) -> Result<(), RegistryError> {
        registration.validate()?;

        let (instance, replaced) = {
            let mut services = self.write_services();
            let instance = registration.into_instance(self.clock.now());
            let instances = services.entry(instance.service_name.clone()).or_default();

            let replaced = match instances.iter_mut().find(|existing| existing.id == instance.id) {
                Some(existing) => {
                    *existing = instance.clone();
                    true
                }
                None => {
                    instances.push(instance.clone());
                    false
                }
            };
            (instance, replaced)
        };

        tracing::info!(
            service_name = %instance.service_name,
            instance_id = %instance.id,
            address = %instance.address,
            replaced,
            "Registered service instance"
        );

        self.publish(RegistryEvent::Registered { instance, replaced });
        Ok(())
    }

    // 心跳续约
    pub fn heartbeat(&self, service_name: &str, instance_id: &str) -> Result<(), RegistryError> {
        {
            let mut services = self.write_services();
            let now = self.clock.now();
            let instances = services
                .get_mut(service_name)
                .ok_or_else(|| RegistryError::ServiceNotFound(service_name.to_string()))?;
            let instance = instances
                .iter_mut()
                .find(|instance| instance.id == instance_id)
                .ok_or_else(|| RegistryError::instance_not_found(service_name, instance_id))?;
            instance.refresh(now);
        }

        tracing::debug!(
            service_name = %service_name,
            instance_id = %instance_id,
            "Heartbeat received"
        );
        Ok(())
    }

    // 注销服务实例，不受 TTL 影响立即生效
    pub fn deregister(&self, service_name: &str, instance_id: &str) -> Result<(), RegistryError> {
        let removed = {
            let mut services = self.write_services();
            let instances = services
                .get_mut(service_name)
                .ok_or_else(|| RegistryError::ServiceNotFound(service_name.to_string()))?;
            let position = instances
                .iter()
                .position(|instance| instance.id == instance_id)
                .ok_or_else(|| RegistryError::instance_not_found(service_name, instance_id))?;

            let removed = instances.remove(position);
            if instances.is_empty() {
                services.remove(service_name);
            }
            removed
        };

        tracing::info!(
            service_name = %service_name,
            instance_id = %instance_id,
            "Deregistered service instance"
        );

        self.publish(RegistryEvent::Deregistered {
            instance: removed.into_evicted(),
        });
        Ok(())
    }

    /// 获取服务的全部存活实例
    ///
    /// 服务从未注册和当前没有实例一样返回 `ServiceNotFound`。
    pub fn discover(&self, service_name: &str) -> Result<Vec<ServiceInstance>, RegistryError> {
        let services = self.read_services();
        match services.get(service_name) {
            Some(instances) if !instances.is_empty() => Ok(instances.clone()),
            _ => Err(RegistryError::ServiceNotFound(service_name.to_string())),
        }
    }

    // 获取单个实例信息
    pub fn instance(
        &self,
        service_name: &str,
        instance_id: &str,
    ) -> Result<ServiceInstance, RegistryError> {
        let services = self.read_services();
        let instances = services
            .get(service_name)
            .ok_or_else(|| RegistryError::ServiceNotFound(service_name.to_string()))?;
        instances
            .iter()
            .find(|instance| instance.id == instance_id)
            .cloned()
            .ok_or_else(|| RegistryError::instance_not_found(service_name, instance_id))
    }

    // 获取所有服务的快照
    pub fn list_all(&self) -> HashMap<String, Vec<ServiceInstance>> {
        self.read_services()
            .iter()
            .filter(|(_, instances)| !instances.is_empty())
            .map(|(name, instances)| (name.clone(), instances.clone()))
            .collect()
    }

    pub fn service_count(&self) -> usize {
        self.read_services().len()
    }

    pub fn stats(&self) -> RegistryStats {
        let services = self.read_services();
        RegistryStats {
            registered_services: services.len(),
            active_instances: services.values().map(Vec::len).sum(),
        }
    }

    /// 订阅注册表变更事件
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// 以流的形式订阅事件，落后丢失的事件直接跳过
    pub fn watch(&self) -> impl Stream<Item = RegistryEvent> + Send + use<> {
        BroadcastStream::new(self.events.subscribe()).filter_map(|result| match result {
            Ok(event) => Some(event),
            Err(err) => {
                tracing::warn!(error = %err, "Registry event watcher lagged behind");
                None
            }
        })
    }

    /// 停止后台清理任务并等待其退出
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;
        tracing::info!("Service registry sweeper stopped");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub(super) fn publish(&self, event: RegistryEvent) {
        Self::publish_to(&self.events, event);
    }

    pub(super) fn publish_to(events: &broadcast::Sender<RegistryEvent>, event: RegistryEvent) {
        // 没有订阅者时 send 返回错误，忽略即可
        let _ = events.send(event);
    }

    fn read_services(&self) -> RwLockReadGuard<'_, InstancesByService> {
        self.services.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_services(&self) -> RwLockWriteGuard<'_, InstancesByService> {
        write_lock(&self.services)
    }
}

pub(super) fn write_lock(
    services: &RwLock<InstancesByService>,
) -> RwLockWriteGuard<'_, InstancesByService> {
    services.write().unwrap_or_else(PoisonError::into_inner)
}

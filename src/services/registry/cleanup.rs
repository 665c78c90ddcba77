use std::sync::RwLock;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

use super::clock::Clock;
use super::service::{ServiceRegistry, write_lock};
use super::types::{InstancesByService, RegistryEvent, ServiceInstance};

impl ServiceRegistry {
    // 启动清理任务
    pub(super) fn start_sweeper(&self, handle: &Handle) {
        let services = self.services.clone();
        let clock = self.clock.clone();
        let events = self.events.clone();
        let shutdown = self.shutdown.clone();
        let ttl = self.config.ttl;
        let sweep_interval = self.config.sweep_interval;

        self.task_tracker.spawn_on(
            async move {
                let mut interval = tokio::time::interval(sweep_interval);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = shutdown.cancelled() => {
                            tracing::debug!("Sweeper received shutdown signal");
                            break;
                        }
                        _ = interval.tick() => {
                            tracing::debug!("Executing instance expiration check...");
                            Self::sweep_expired(&services, clock.as_ref(), ttl, &events);
                        }
                    }
                }
            },
            handle,
        );
    }

    /// 立即执行一次过期清理，返回被驱逐实例的快照
    pub fn evict_expired(&self) -> Vec<ServiceInstance> {
        Self::sweep_expired(&self.services, self.clock.as_ref(), self.config.ttl, &self.events)
    }

    // 清理过期的实例
    fn sweep_expired(
        services: &RwLock<InstancesByService>,
        clock: &dyn Clock,
        ttl: Duration,
        events: &broadcast::Sender<RegistryEvent>,
    ) -> Vec<ServiceInstance> {
        let mut evicted = Vec::new();

        let now = {
            let mut services = write_lock(services);
            let now = clock.now();
            services.retain(|_, instances| {
                instances.retain(|instance| {
                    if instance.is_expired(now, ttl) {
                        evicted.push(instance.clone().into_evicted());
                        false
                    } else {
                        true
                    }
                });
                // 空列表连同服务名一起移除
                !instances.is_empty()
            });
            now
        };

        if evicted.is_empty() {
            return evicted;
        }

        for instance in &evicted {
            let elapsed_ms = now
                .duration_since(instance.last_seen)
                .unwrap_or_default()
                .as_millis() as u64;
            tracing::warn!(
                service_name = %instance.service_name,
                instance_id = %instance.id,
                elapsed_ms,
                ttl_ms = ttl.as_millis() as u64,
                "Instance expired due to heartbeat timeout, removed from registry"
            );
            Self::publish_to(
                events,
                RegistryEvent::Evicted {
                    instance: instance.clone(),
                },
            );
        }

        tracing::info!(
            expired_count = evicted.len(),
            "Cleanup check completed"
        );

        evicted
    }
}

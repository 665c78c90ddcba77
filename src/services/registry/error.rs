use tokio::runtime::TryCurrentError;

/// 注册表错误类型
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Service not found: {0}")]
    ServiceNotFound(String),
    #[error("Instance not found: {service_name}/{instance_id}")]
    InstanceNotFound {
        service_name: String,
        instance_id: String,
    },
    #[error("Invalid registry config: {0}")]
    InvalidConfig(String),
    #[error("Registry requires a tokio runtime: {0}")]
    Runtime(#[from] TryCurrentError),
}

impl RegistryError {
    /// 服务或实例不存在，调用方可重新注册或稍后重试
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RegistryError::ServiceNotFound(_) | RegistryError::InstanceNotFound { .. }
        )
    }

    pub(crate) fn instance_not_found(service_name: &str, instance_id: &str) -> Self {
        RegistryError::InstanceNotFound {
            service_name: service_name.to_string(),
            instance_id: instance_id.to_string(),
        }
    }
}

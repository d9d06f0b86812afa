//! Service registry — validation, dependency ordering, start/stop.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::IndexerError;
use crate::service::Service;

/// The ordered set of registered services.
///
/// Construction validates the plugin contract (unique names, resolvable
/// dependencies) and topologically sorts the services so that every service
/// runs after everything it depends on. Declaration order is preserved among
/// services with no ordering constraint between them.
pub struct ServiceRegistry {
    services: Vec<Arc<dyn Service>>,
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.services.iter().map(|s| s.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl ServiceRegistry {
    pub fn new(declared: Vec<Arc<dyn Service>>) -> Result<Self, IndexerError> {
        let mut names = HashSet::new();
        for svc in &declared {
            if !names.insert(svc.name().to_string()) {
                return Err(IndexerError::ServiceContract {
                    service: svc.name().to_string(),
                    reason: "duplicate service name".into(),
                });
            }
        }
        for svc in &declared {
            for dep in svc.dependencies() {
                if !names.contains(*dep) {
                    return Err(IndexerError::ServiceContract {
                        service: svc.name().to_string(),
                        reason: format!("depends on unknown service '{dep}'"),
                    });
                }
            }
        }
        let services = Self::topo_sort(declared)?;
        Ok(Self { services })
    }

    /// Kahn's algorithm, scanning in declaration order so the result is
    /// deterministic.
    fn topo_sort(declared: Vec<Arc<dyn Service>>) -> Result<Vec<Arc<dyn Service>>, IndexerError> {
        let mut emitted: HashSet<String> = HashSet::new();
        let mut remaining: Vec<Arc<dyn Service>> = declared;
        let mut ordered = Vec::with_capacity(remaining.len());

        while !remaining.is_empty() {
            let ready = remaining.iter().position(|svc| {
                svc.dependencies().iter().all(|dep| emitted.contains(*dep))
            });
            match ready {
                Some(i) => {
                    let svc = remaining.remove(i);
                    emitted.insert(svc.name().to_string());
                    ordered.push(svc);
                }
                None => {
                    // Every remaining service waits on another remaining one.
                    return Err(IndexerError::DependencyCycle(
                        remaining[0].name().to_string(),
                    ));
                }
            }
        }
        Ok(ordered)
    }

    /// Services in dependency order.
    pub fn services(&self) -> &[Arc<dyn Service>] {
        &self.services
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Start every service in dependency order. The first failure aborts.
    pub async fn start_all(&self) -> Result<(), IndexerError> {
        for svc in &self.services {
            tracing::info!(service = svc.name(), "starting service");
            svc.start().await?;
        }
        Ok(())
    }

    /// Stop every service in reverse dependency order. All services are
    /// stopped even if some fail; the first failure is returned.
    pub async fn stop_all(&self) -> Result<(), IndexerError> {
        let mut first_err = None;
        for svc in self.services.iter().rev() {
            tracing::info!(service = svc.name(), "stopping service");
            if let Err(err) = svc.stop().await {
                tracing::error!(service = svc.name(), error = %err, "service stop failed");
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

//! Watch-based condition waiting.
//!
//! Waits block on a Kubernetes watch rather than polling, bounded by a single
//! timeout. There is no retry: a watch error ends the wait.

use std::fmt::Debug;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Namespace;
use kube::Resource;
use kube::api::Api;
use kube::runtime::watcher::{self, Event};
use serde::de::DeserializeOwned;
use tokio::time::timeout;

use crate::error::ClusterError;

/// Wait for a resource to satisfy a condition.
///
/// # Arguments
/// * `api` - API client for the resource type
/// * `name` - Name of the resource to watch
/// * `condition` - Closure that returns true when the condition is met
/// * `timeout_duration` - Maximum time to wait
///
/// # Returns
/// The resource when the condition is satisfied, or an error on timeout.
pub async fn wait_for_condition<K, F>(
    api: &Api<K>,
    name: &str,
    condition: F,
    timeout_duration: Duration,
) -> Result<K, ClusterError>
where
    K: Resource + Clone + Debug + DeserializeOwned + Send + 'static,
    <K as Resource>::DynamicType: Default,
    F: Fn(&K) -> bool,
{
    let field_selector = format!("metadata.name={}", name);

    let watch_future = async {
        let mut stream =
            watcher::watcher(api.clone(), watcher::Config::default().fields(&field_selector))
                .boxed();

        // The resource may already be there
        if let Ok(resource) = api.get(name).await
            && condition(&resource)
        {
            return Ok(resource);
        }

        while let Some(event) = stream.next().await {
            match event {
                Ok(Event::Apply(resource)) | Ok(Event::InitApply(resource)) => {
                    if condition(&resource) {
                        return Ok(resource);
                    }
                }
                Ok(Event::Delete(_)) => {
                    return Err(ClusterError::ResourceDeleted);
                }
                Ok(Event::Init) | Ok(Event::InitDone) => {}
                Err(e) => {
                    return Err(ClusterError::Watcher(e));
                }
            }
        }

        Err(ClusterError::StreamEnded)
    };

    timeout(timeout_duration, watch_future)
        .await
        .map_err(|_| ClusterError::Timeout(timeout_duration))?
}

/// Wait for a resource to be deleted.
pub async fn wait_for_deletion<K>(
    api: &Api<K>,
    name: &str,
    timeout_duration: Duration,
) -> Result<(), ClusterError>
where
    K: Resource + Clone + Debug + DeserializeOwned + Send + 'static,
    <K as Resource>::DynamicType: Default,
{
    let wait_future = async {
        match api.get(name).await {
            Err(kube::Error::Api(e)) if e.code == 404 => {
                return Ok(());
            }
            Err(e) => return Err(ClusterError::Kube(e)),
            Ok(_) => {}
        }

        let mut stream = watcher::watcher(
            api.clone(),
            watcher::Config::default().fields(&format!("metadata.name={}", name)),
        )
        .boxed();

        while let Some(event) = stream.next().await {
            match event {
                Ok(Event::Delete(_)) => {
                    return Ok(());
                }
                Ok(_) => continue,
                Err(e) => {
                    return Err(ClusterError::Watcher(e));
                }
            }
        }

        Err(ClusterError::StreamEnded)
    };

    timeout(timeout_duration, wait_future)
        .await
        .map_err(|_| ClusterError::Timeout(timeout_duration))?
}

/// Check if a namespace exists and is not terminating.
pub fn namespace_is_active(namespace: &Namespace) -> bool {
    namespace
        .status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .map(|phase| phase == "Active")
        .unwrap_or(false)
}

//! The Pool Reconciler: keeps each template's warm pod pool sized correctly
//!
//! Classifies every pool pod by phase and occupancy, then expands, shrinks
//! or aborts the whole pool depending on what that classification finds.

use rand::distr::Alphanumeric;
use rand::Rng;
use std::sync::Arc;
use store::models::TaskTemplate;
use store::Error;
use tracing::{event, instrument, Level};

use crate::k8s::{Orchestrator, PoolPod};

/// The outcome of classifying a template's current pool pods
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolClassification {
    /// Pods that are `Running` or `Pending` and not being deleted
    pub base_count: u32,
    /// Pods counted in `base_count` with spare lease capacity
    pub usable_count: u32,
    /// Names of running, unoccupied pods — shrink candidates
    pub idle: Vec<String>,
    /// True if any pod has reached a terminal phase, meaning the template
    /// itself is unrunnable and its whole pool should be torn down
    pub has_error: bool,
}

/// Classify a template's pods in a single pass, building `base_count`/
/// `usable_count`/`idle`, bailing out to `has_error` the moment any pod is
/// found in a terminal phase.
pub fn classify(template: &TaskTemplate, pods: &[PoolPod]) -> PoolClassification {
    let mut base_count = 0;
    let mut usable_count = 0;
    let mut idle = Vec::new();
    for pod in pods {
        match pod.phase.as_deref() {
            Some("Running") => {
                base_count += 1;
                if pod.occupied < template.max_sharing_users {
                    usable_count += 1;
                    if pod.occupied == 0 {
                        idle.push(pod.name.clone());
                    }
                }
            }
            Some("Pending") => {
                base_count += 1;
                usable_count += 1;
            }
            Some("Succeeded") | Some("Failed") | Some("Unknown") => {
                return PoolClassification {
                    base_count,
                    usable_count,
                    idle,
                    has_error: true,
                };
            }
            _ => {}
        }
    }
    PoolClassification {
        base_count,
        usable_count,
        idle,
        has_error: false,
    }
}

/// The action the reconciler should take against a template's pool this tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolAction {
    /// The pool is healthy as-is
    NoOp,
    /// The whole pool should be torn down; the template is unrunnable
    Abort,
    /// Create this many more pods
    Expand(u32),
    /// Delete this one idle pod
    Shrink(String),
}

/// Decide what to do about a template's pool from its classification
///
/// Three independent checks in order: bootstrap up to `replica`, expand
/// again if nothing is usable, then shrink one idle pod if there are more
/// than half the base count sitting idle above `replica`.
pub fn decide(template: &TaskTemplate, classification: &PoolClassification) -> PoolAction {
    if classification.has_error {
        return PoolAction::Abort;
    }
    if classification.base_count <= template.replica {
        let deficit = template.replica - classification.base_count;
        if deficit > 0 {
            return PoolAction::Expand(deficit);
        }
    }
    if classification.usable_count < 1 {
        return PoolAction::Expand(classification.base_count);
    }
    if classification.base_count > template.replica
        && classification.idle.len() as u32 > classification.base_count / 2
    {
        if let Some(name) = classification.idle.first() {
            return PoolAction::Shrink(name.clone());
        }
    }
    PoolAction::NoOp
}

/// Generate a short random suffix for pod names, an 8-character lowercase
/// alphanumeric tag akin to a truncated uuid4
fn short_suffix() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(8)
        .map(char::from)
        .collect::<String>()
        .to_lowercase()
}

/// Reconciles the warm pool of pods backing a single task template
pub struct PoolReconciler<O: Orchestrator> {
    orchestrator: Arc<O>,
    namespace: String,
    webshell_image: String,
}

impl<O: Orchestrator> PoolReconciler<O> {
    /// Build a new reconciler
    pub fn new(orchestrator: Arc<O>, namespace: String, webshell_image: String) -> Self {
        PoolReconciler { orchestrator, namespace, webshell_image }
    }

    /// Run one reconciliation pass for a single template
    #[instrument(name = "PoolReconciler::reconcile", skip_all, fields(template = %template.uuid))]
    pub async fn reconcile(&self, template: &TaskTemplate) -> Result<PoolAction, Error> {
        let pods = self
            .orchestrator
            .list_pool_pods(&self.namespace, &template.pool_label())
            .await?;
        let classification = classify(template, &pods);
        let action = decide(template, &classification);
        match &action {
            PoolAction::NoOp => {}
            PoolAction::Abort => {
                event!(Level::ERROR, template = %template.uuid, "template pool is unrunnable, tearing down");
                for pod in &pods {
                    self.orchestrator.delete_pool_pod(&self.namespace, &pod.name).await?;
                }
            }
            PoolAction::Expand(count) => {
                event!(Level::INFO, template = %template.uuid, count, "expanding pool");
                for _ in 0..*count {
                    let name = format!("task-storage-{}-{}", template.uuid, short_suffix());
                    let pod = PoolPod::new(name, template.pool_label(), self.webshell_image.clone());
                    self.orchestrator.create_pool_pod(&self.namespace, &pod).await?;
                }
            }
            PoolAction::Shrink(name) => {
                event!(Level::INFO, template = %template.uuid, pod = name.as_str(), "shrinking pool");
                self.orchestrator.delete_pool_pod(&self.namespace, name).await?;
            }
        }
        Ok(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn template(replica: u32, max_sharing_users: u32) -> TaskTemplate {
        TaskTemplate {
            uuid: Uuid::new_v4(),
            container_config: json!({}),
            replica,
            max_sharing_users,
            ttl_interval: 30,
            time_limit: 60,
        }
    }

    fn pod(name: &str, occupied: u32, phase: &str) -> PoolPod {
        let mut pod = PoolPod::new(name.to_string(), "tmpl".to_string(), "image".to_string());
        pod.occupied = occupied;
        pod.phase = Some(phase.to_string());
        pod
    }

    #[test]
    fn empty_pool_expands_to_replica() {
        let template = template(3, 2);
        let classification = classify(&template, &[]);
        assert_eq!(decide(&template, &classification), PoolAction::Expand(3));
    }

    #[test]
    fn full_and_occupied_pool_is_noop() {
        let template = template(2, 2);
        let pods = vec![pod("a", 0, "Running"), pod("b", 1, "Running")];
        let classification = classify(&template, &pods);
        assert_eq!(decide(&template, &classification), PoolAction::NoOp);
    }

    #[test]
    fn all_pods_saturated_forces_expand() {
        let template = template(2, 1);
        let pods = vec![pod("a", 1, "Running"), pod("b", 1, "Running")];
        let classification = classify(&template, &pods);
        assert_eq!(decide(&template, &classification), PoolAction::Expand(2));
    }

    #[test]
    fn excess_idle_pods_shrink_one() {
        let template = template(2, 2);
        let pods = vec![
            pod("a", 0, "Running"),
            pod("b", 0, "Running"),
            pod("c", 0, "Running"),
        ];
        let classification = classify(&template, &pods);
        assert_eq!(decide(&template, &classification), PoolAction::Shrink("a".to_string()));
    }

    #[test]
    fn zero_replica_empty_pool_is_noop() {
        let template = template(0, 2);
        let classification = classify(&template, &[]);
        assert_eq!(decide(&template, &classification), PoolAction::Expand(0));
    }

    #[test]
    fn terminal_pod_triggers_abort() {
        let template = template(2, 2);
        let pods = vec![pod("a", 0, "Running"), pod("b", 0, "Failed")];
        let classification = classify(&template, &pods);
        assert!(classification.has_error);
        assert_eq!(decide(&template, &classification), PoolAction::Abort);
    }
}

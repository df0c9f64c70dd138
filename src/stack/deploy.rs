//! CloudFormation runtime: create or update each synthesized stack and wait for it
//! to settle. All waiting is paced by the provider; there is no timeout of our own.

use std::collections::{BTreeMap, HashMap};

use aws_sdk_cloudformation::types::{Capability, OnFailure, Parameter, Stack, StackEvent, StackStatus};
use tracing::{debug, info, warn};

use super::synth::SynthesizedStack;
use crate::error::{Error, Result};
use crate::graph::StackRole;

const POLL_INTERVAL_MS: u64 = 5000;

pub async fn client_for_region(region: &str) -> aws_sdk_cloudformation::Client {
    let shared_config = aws_config::from_env()
        .region(aws_sdk_cloudformation::config::Region::new(region.to_string()))
        .load()
        .await;
    aws_sdk_cloudformation::Client::new(&shared_config)
}

fn provisioning_error(stack: &str, e: impl std::fmt::Debug) -> Error {
    Error::Provisioning { stack: stack.to_string(), message: format!("{:#?}", e) }
}

/// what a create-or-update call actually started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackChange {
    Created,
    Updated,
    /// the template and parameters match what is deployed. nothing was started.
    Unchanged,
}

/// where a stack is in its lifecycle, as far as waiting is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackProgress {
    Settled,
    InProgress,
    /// an update failed and the previous version is running again.
    RolledBack,
    Failed,
}

pub fn classify_status(status: &StackStatus) -> StackProgress {
    match status {
        StackStatus::CreateComplete |
        StackStatus::UpdateComplete |
        StackStatus::ImportComplete => StackProgress::Settled,

        StackStatus::CreateInProgress |
        StackStatus::DeleteInProgress |
        StackStatus::ImportInProgress |
        StackStatus::ImportRollbackInProgress |
        StackStatus::ReviewInProgress |
        StackStatus::RollbackInProgress |
        StackStatus::UpdateCompleteCleanupInProgress |
        StackStatus::UpdateInProgress |
        StackStatus::UpdateRollbackCompleteCleanupInProgress |
        StackStatus::UpdateRollbackInProgress => StackProgress::InProgress,

        StackStatus::UpdateRollbackComplete => StackProgress::RolledBack,

        _ => StackProgress::Failed,
    }
}

/// A rolled back stack is only a failure of this run if this run changed it.
/// When nothing was started, whatever status the stack already has is its settled state.
pub fn progress_after(change: StackChange, status: &StackStatus) -> StackProgress {
    match (change, classify_status(status)) {
        (StackChange::Unchanged, StackProgress::RolledBack) => StackProgress::Settled,
        (_, progress) => progress,
    }
}

/// current status, or None when no stack with this name exists.
pub async fn current_status(client: &aws_sdk_cloudformation::Client, name: &str) -> Result<Option<StackStatus>> {
    match client.describe_stacks().stack_name(name).send().await {
        Ok(d) => Ok(d.stacks().unwrap_or_default().first().and_then(|s| s.stack_status().cloned())),
        Err(e) => {
            let e_str = format!("{:#?}", e);
            if e_str.contains("does not exist") {
                return Ok(None);
            }
            Err(provisioning_error(name, e_str))
        }
    }
}

/// The reason of the earliest failed resource in the stack's most recent operation.
/// `events` are newest first, as `DescribeStackEvents` returns them.
pub fn first_failure_reason(stack_name: &str, events: &[StackEvent]) -> Option<String> {
    let mut earliest = None;
    for event in events {
        let status = event.resource_status().map(|s| s.as_str()).unwrap_or_default();
        if status.ends_with("_FAILED") {
            if let Some(reason) = event.resource_status_reason() {
                let resource = event.logical_resource_id().unwrap_or("unknown resource");
                earliest = Some(format!("{resource}: {reason}"));
            }
        }
        let is_stack = event.logical_resource_id() == Some(stack_name);
        if is_stack && (status == "CREATE_IN_PROGRESS" || status == "UPDATE_IN_PROGRESS") {
            break;
        }
    }
    earliest
}

async fn failure_reason(client: &aws_sdk_cloudformation::Client, name: &str, stack: &Stack) -> String {
    let from_events = match client.describe_stack_events().stack_name(name).send().await {
        Ok(resp) => first_failure_reason(name, resp.stack_events().unwrap_or_default()),
        Err(e) => {
            warn!(stack = %name, error = ?e, "could not read stack events");
            None
        }
    };
    from_events
        .or_else(|| stack.stack_status_reason().map(|r| r.to_string()))
        .unwrap_or_else(|| "Failed to get stack failure reason".to_string())
}

/// Ok(None) while the stack is still changing.
pub async fn describe_stack(client: &aws_sdk_cloudformation::Client, name: &str, change: StackChange) -> Result<Option<Stack>> {
    let d = client.describe_stacks().stack_name(name).send().await
        .map_err(|e| provisioning_error(name, e))?;
    let first = d.stacks().unwrap_or_default().first().ok_or_else(|| Error::Lookup {
        what: "stack",
        name: name.to_string(),
        message: "describe_stacks returned no stacks".into(),
    })?;
    let status = first.stack_status().ok_or_else(|| Error::Lookup {
        what: "stack",
        name: name.to_string(),
        message: "stack has no status".into(),
    })?;
    match progress_after(change, status) {
        StackProgress::Settled => Ok(Some(first.clone())),
        StackProgress::InProgress => Ok(None),
        StackProgress::RolledBack | StackProgress::Failed => Err(Error::StackFailed {
            stack: name.to_string(),
            status: status.as_str().to_string(),
            reason: failure_reason(client, name, first).await,
        }),
    }
}

pub fn collect_outputs(stack: &Stack) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for output in stack.outputs().unwrap_or_default() {
        if let (Some(key), Some(val)) = (output.output_key(), output.output_value()) {
            out.insert(key.to_string(), val.to_string());
        }
    }
    out
}

pub async fn wait_for_output(client: &aws_sdk_cloudformation::Client, name: &str, change: StackChange) -> Result<HashMap<String, String>> {
    loop {
        // an unchanged stack is read as is, there is nothing to wait for.
        if change != StackChange::Unchanged {
            tokio::time::sleep(tokio::time::Duration::from_millis(POLL_INTERVAL_MS)).await;
        }
        match describe_stack(client, name, change).await? {
            Some(stack) => {
                info!(stack = %name, ?change, "stack settled");
                return Ok(collect_outputs(&stack));
            }
            None => debug!(stack = %name, "still waiting on stack"),
        }
    }
}

/// A failed create leaves the stack in ROLLBACK_COMPLETE, which can only be deleted.
async fn delete_failed_stack(client: &aws_sdk_cloudformation::Client, name: &str) -> Result<()> {
    warn!(stack = %name, "deleting stack left behind by a failed create");
    client.delete_stack().stack_name(name).send().await
        .map_err(|e| provisioning_error(name, e))?;
    loop {
        tokio::time::sleep(tokio::time::Duration::from_millis(POLL_INTERVAL_MS)).await;
        match current_status(client, name).await? {
            None | Some(StackStatus::DeleteComplete) => return Ok(()),
            Some(StackStatus::DeleteFailed) => {
                return Err(Error::StackFailed {
                    stack: name.to_string(),
                    status: StackStatus::DeleteFailed.as_str().to_string(),
                    reason: "the stack left by a failed create could not be deleted".into(),
                });
            }
            Some(_) => debug!(stack = %name, "still deleting stack"),
        }
    }
}

pub async fn create_or_update_stack(
    client: &aws_sdk_cloudformation::Client,
    name: &str,
    body: &str,
    parameters: &[(String, String)],
) -> Result<StackChange> {
    let params: Vec<Parameter> = parameters.iter().map(|(key, value)| {
        Parameter::builder().parameter_key(key).parameter_value(value).build()
    }).collect();
    let mut status = current_status(client, name).await?;
    if status == Some(StackStatus::RollbackComplete) {
        delete_failed_stack(client, name).await?;
        status = None;
    }
    if status.is_some() {
        info!(stack = %name, "updating stack");
        let res = client
            .update_stack()
            .capabilities(Capability::CapabilityNamedIam)
            .capabilities(Capability::CapabilityIam)
            .stack_name(name)
            .template_body(body)
            .set_parameters(Some(params))
            .send()
            .await;
        if let Err(e) = res {
            let e_str = format!("{:#?}", e);
            if e_str.contains("No updates are to be performed") {
                info!(stack = %name, "stack is already up to date");
                return Ok(StackChange::Unchanged);
            }
            return Err(provisioning_error(name, e_str));
        }
        Ok(StackChange::Updated)
    } else {
        info!(stack = %name, "creating stack");
        // roll back rather than delete, so the failure reason stays readable.
        client
            .create_stack()
            .on_failure(OnFailure::Rollback)
            .capabilities(Capability::CapabilityNamedIam)
            .capabilities(Capability::CapabilityIam)
            .stack_name(name)
            .template_body(body)
            .set_parameters(Some(params))
            .send()
            .await
            .map_err(|e| provisioning_error(name, e))?;
        Ok(StackChange::Created)
    }
}

/// look up each declared parameter in the outputs of stacks deployed earlier.
pub fn resolve_parameters(
    stack: &SynthesizedStack,
    deployed: &BTreeMap<StackRole, HashMap<String, String>>,
) -> Result<Vec<(String, String)>> {
    let mut out = vec![];
    for source in &stack.parameters {
        let value = deployed.get(&source.stack)
            .and_then(|outputs| outputs.get(&source.output_key))
            .ok_or_else(|| Error::Lookup {
                what: "stack output",
                name: source.output_key.clone(),
                message: format!("parameter {} of stack {} needs it, but it was not produced by a previously deployed stack", source.parameter, stack.name),
            })?;
        out.push((source.parameter.clone(), value.clone()));
    }
    Ok(out)
}

/// Deploy stacks in the given order, threading outputs into later stacks' parameters.
/// Any failure aborts the remaining stacks; rollback is left to cloudformation.
pub async fn deploy_stacks(stacks: &[SynthesizedStack]) -> Result<BTreeMap<StackRole, HashMap<String, String>>> {
    let mut deployed = BTreeMap::new();
    for stack in stacks {
        let client = client_for_region(&stack.region).await;
        let parameters = resolve_parameters(stack, &deployed)?;
        let body = stack.template_body()?;
        info!(stack = %stack.name, region = %stack.region, "about to deploy stack");
        let change = match create_or_update_stack(&client, &stack.name, &body, &parameters).await {
            Ok(change) => change,
            Err(e) => {
                warn!(stack = %stack.name, "stack deployment was rejected");
                return Err(e);
            }
        };
        let outputs = wait_for_output(&client, &stack.name, change).await?;
        deployed.insert(stack.role, outputs);
    }
    Ok(deployed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_cloudformation::types::ResourceStatus;
    use crate::stack::synth::ParameterSource;
    use crate::stack::template::SavedTemplate;

    #[test]
    fn statuses_are_classified() {
        assert_eq!(classify_status(&StackStatus::CreateComplete), StackProgress::Settled);
        assert_eq!(classify_status(&StackStatus::UpdateComplete), StackProgress::Settled);
        assert_eq!(classify_status(&StackStatus::UpdateInProgress), StackProgress::InProgress);
        assert_eq!(classify_status(&StackStatus::RollbackComplete), StackProgress::Failed);
        assert_eq!(classify_status(&StackStatus::UpdateRollbackComplete), StackProgress::RolledBack);
        assert_eq!(classify_status(&StackStatus::CreateFailed), StackProgress::Failed);
    }

    #[test]
    fn unchanged_stack_after_an_old_rollback_is_settled() {
        let status = StackStatus::UpdateRollbackComplete;
        assert_eq!(progress_after(StackChange::Unchanged, &status), StackProgress::Settled);
        assert_eq!(progress_after(StackChange::Updated, &status), StackProgress::RolledBack);
        // a stack that never got created stays a failure either way
        assert_eq!(progress_after(StackChange::Unchanged, &StackStatus::RollbackComplete), StackProgress::Failed);
        assert_eq!(progress_after(StackChange::Unchanged, &StackStatus::UpdateComplete), StackProgress::Settled);
    }

    fn event(logical_id: &str, status: ResourceStatus, reason: Option<&str>) -> StackEvent {
        StackEvent::builder()
            .logical_resource_id(logical_id)
            .resource_status(status)
            .set_resource_status_reason(reason.map(|r| r.to_string()))
            .build()
    }

    #[test]
    fn failure_reason_is_the_root_cause_of_the_latest_operation() {
        // newest first
        let events = vec![
            event("Site", ResourceStatus::from("ROLLBACK_COMPLETE"), None),
            event("SiteDistribution", ResourceStatus::CreateFailed, Some("Resource creation cancelled")),
            event("SiteBucket", ResourceStatus::CreateFailed, Some("example-site already exists")),
            event("SiteBucket", ResourceStatus::CreateInProgress, None),
            event("Site", ResourceStatus::CreateInProgress, Some("User Initiated")),
            event("SiteBucket", ResourceStatus::CreateFailed, Some("from an older deployment")),
        ];
        assert_eq!(first_failure_reason("Site", &events).as_deref(), Some("SiteBucket: example-site already exists"));
    }

    #[test]
    fn no_failed_events_means_no_reason() {
        let events = vec![
            event("Site", ResourceStatus::UpdateComplete, None),
            event("Site", ResourceStatus::UpdateInProgress, Some("User Initiated")),
        ];
        assert_eq!(first_failure_reason("Site", &events), None);
    }

    fn main_stack() -> SynthesizedStack {
        SynthesizedStack {
            name: "Site".into(),
            region: "eu-west-1".into(),
            role: StackRole::Main,
            template: SavedTemplate::default(),
            parameters: vec![ParameterSource {
                parameter: "CertificateArn".into(),
                stack: StackRole::Certificate,
                output_key: "CertificateArn".into(),
            }],
        }
    }

    #[test]
    fn parameters_resolve_from_earlier_outputs() {
        let mut deployed = BTreeMap::new();
        let mut cert_outputs = HashMap::new();
        cert_outputs.insert("CertificateArn".to_string(), "arn:aws:acm:us-east-1:1:certificate/x".to_string());
        deployed.insert(StackRole::Certificate, cert_outputs);
        let params = resolve_parameters(&main_stack(), &deployed).unwrap();
        assert_eq!(params, vec![("CertificateArn".to_string(), "arn:aws:acm:us-east-1:1:certificate/x".to_string())]);
    }

    #[test]
    fn missing_upstream_output_is_a_lookup_error() {
        let err = resolve_parameters(&main_stack(), &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, Error::Lookup { what: "stack output", .. }));
    }
}

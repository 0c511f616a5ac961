//! Deployment collaborator: stack submission and change-set planning.
//!
//! Consumes the finished resource graph as a rendered template. Supports
//! a direct create-or-update deployment based on the remote stack
//! status, and a "plan" mode that creates a change set, polls its status
//! with bounded backoff, and hands the change table back for display.

use aws_sdk_cloudformation::error::DisplayErrorContext;
use aws_sdk_cloudformation::types::{Capability, ChangeSetType, Parameter};
use aws_sdk_cloudformation::Client;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{CloudError, DeployError, Result, StacksmithError};

/// Templates above this size must be submitted by URL.
pub const TEMPLATE_BODY_LIMIT: usize = 51_200;

/// Maximum change-set polling attempts.
const MAX_POLL_ATTEMPTS: u32 = 60;

/// Initial polling delay in seconds.
const POLL_BASE_DELAY_SECS: u64 = 2;

/// Polling delay ceiling in seconds; backoff is bounded, never unbounded
/// blocking.
const POLL_MAX_DELAY_SECS: u64 = 15;

/// Stack statuses from which an update may proceed.
const UPDATABLE_STATUSES: &[&str] = &[
    "CREATE_COMPLETE",
    "UPDATE_COMPLETE",
    "UPDATE_ROLLBACK_COMPLETE",
    "IMPORT_COMPLETE",
];

/// Deployment configuration.
#[derive(Debug, Clone)]
pub struct DeployOptions {
    /// Stack name.
    pub name: String,
    /// Target region.
    pub region: Option<String>,
    /// Disables rollback on failure.
    pub disable_rollback: bool,
    /// Stack parameter values (e.g. resolved VPC and subnet ids).
    pub parameters: Vec<(String, String)>,
}

/// Builds the remote parameter list from the options.
fn stack_parameters(options: &DeployOptions) -> Vec<Parameter> {
    options
        .parameters
        .iter()
        .map(|(key, value)| {
            Parameter::builder()
                .parameter_key(key)
                .parameter_value(value)
                .build()
        })
        .collect()
}

/// How the template reaches the remote API.
#[derive(Debug, Clone)]
pub enum TemplateSource {
    /// Inline template body.
    Body(String),
    /// URL of an uploaded template.
    Url(String),
}

/// One entry of a change-set diff.
#[derive(Debug, Clone)]
pub struct PlannedChange {
    /// Change action (Add, Modify, Remove).
    pub action: String,
    /// Logical resource id.
    pub logical_id: String,
    /// Resource type.
    pub resource_type: String,
    /// Replacement indication, when reported.
    pub replacement: Option<String>,
}

/// A created change set, ready for execution or cleanup.
#[derive(Debug)]
pub struct ChangeSetPlan {
    /// Stack name the change set belongs to.
    pub stack_name: String,
    /// Change set name.
    pub change_set_name: String,
    /// Planned changes.
    pub changes: Vec<PlannedChange>,
    /// True when the change set contains no changes.
    pub is_empty: bool,
}

/// Deployment collaborator against the remote orchestration API.
#[derive(Debug)]
pub struct StackDeployer {
    /// Remote API client.
    client: Client,
}

impl StackDeployer {
    /// Creates a deployer against the configured region.
    pub async fn new(region: Option<&str>) -> Self {
        let config = if let Some(region_str) = region {
            aws_config::from_env()
                .region(aws_config::Region::new(region_str.to_string()))
                .load()
                .await
        } else {
            aws_config::load_from_env().await
        };
        Self {
            client: Client::new(&config),
        }
    }

    /// Creates a deployer with an existing client.
    #[must_use]
    pub const fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Returns the remote status of a stack, or `None` when the stack
    /// does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error on any other API failure.
    pub async fn stack_status(&self, name: &str) -> Result<Option<String>> {
        let response = self
            .client
            .describe_stacks()
            .stack_name(name)
            .send()
            .await;

        match response {
            Ok(output) => Ok(output
                .stacks()
                .first()
                .and_then(|stack| stack.stack_status())
                .map(|status| status.as_str().to_string())),
            Err(e) => {
                let rendered = format!("{}", DisplayErrorContext(&e));
                if rendered.contains("does not exist") {
                    Ok(None)
                } else {
                    Err(StacksmithError::Cloud(CloudError::api(format!(
                        "DescribeStacks failed: {rendered}"
                    ))))
                }
            }
        }
    }

    /// Deploys the template, creating or updating based on the remote
    /// stack status. Returns the stack identifier.
    ///
    /// # Errors
    ///
    /// Returns an error on remote rejection or when the stack is in a
    /// state that allows neither create nor update.
    pub async fn deploy(
        &self,
        options: &DeployOptions,
        template: &TemplateSource,
    ) -> Result<String> {
        match self.stack_status(&options.name).await? {
            None => self.create_stack(options, template).await,
            Some(status) if UPDATABLE_STATUSES.contains(&status.as_str()) => {
                self.update_stack(options, template).await
            }
            Some(status) => Err(StacksmithError::Deploy(DeployError::InvalidStackState {
                stack: options.name.clone(),
                status,
            })),
        }
    }

    /// Creates a new stack.
    async fn create_stack(
        &self,
        options: &DeployOptions,
        template: &TemplateSource,
    ) -> Result<String> {
        info!("Creating stack {}", options.name);
        let mut request = self
            .client
            .create_stack()
            .stack_name(&options.name)
            .disable_rollback(options.disable_rollback)
            .capabilities(Capability::CapabilityIam)
            .set_parameters(Some(stack_parameters(options)));
        request = match template {
            TemplateSource::Body(body) => request.template_body(body),
            TemplateSource::Url(url) => request.template_url(url),
        };

        let response = request.send().await.map_err(|e| {
            StacksmithError::Deploy(DeployError::StackRejected {
                stack: options.name.clone(),
                message: format!("{}", DisplayErrorContext(&e)),
            })
        })?;

        Ok(response
            .stack_id()
            .map_or_else(|| options.name.clone(), ToString::to_string))
    }

    /// Updates an existing stack.
    async fn update_stack(
        &self,
        options: &DeployOptions,
        template: &TemplateSource,
    ) -> Result<String> {
        info!("Updating stack {}", options.name);
        let mut request = self
            .client
            .update_stack()
            .stack_name(&options.name)
            .disable_rollback(options.disable_rollback)
            .capabilities(Capability::CapabilityIam)
            .set_parameters(Some(stack_parameters(options)));
        request = match template {
            TemplateSource::Body(body) => request.template_body(body),
            TemplateSource::Url(url) => request.template_url(url),
        };

        match request.send().await {
            Ok(response) => Ok(response
                .stack_id()
                .map_or_else(|| options.name.clone(), ToString::to_string)),
            Err(e) => {
                let rendered = format!("{}", DisplayErrorContext(&e));
                if rendered.contains("No updates are to be performed") {
                    info!("{} - No updates are to be performed.", options.name);
                    Ok(options.name.clone())
                } else {
                    Err(StacksmithError::Deploy(DeployError::StackRejected {
                        stack: options.name.clone(),
                        message: rendered,
                    }))
                }
            }
        }
    }

    /// Creates a change set and polls it until ready, returning the
    /// change table.
    ///
    /// # Errors
    ///
    /// Returns an error when creation fails, the change set ends in a
    /// failed state, or polling exceeds the attempt budget.
    pub async fn plan(
        &self,
        options: &DeployOptions,
        template: &TemplateSource,
    ) -> Result<ChangeSetPlan> {
        let change_set_type = if self.stack_status(&options.name).await?.is_some() {
            ChangeSetType::Update
        } else {
            ChangeSetType::Create
        };
        let change_set_name = format!("stacksmith-{}", Uuid::new_v4());
        info!(
            "Creating change set {change_set_name} for stack {} ({change_set_type:?})",
            options.name
        );

        let mut request = self
            .client
            .create_change_set()
            .stack_name(&options.name)
            .change_set_name(&change_set_name)
            .change_set_type(change_set_type)
            .capabilities(Capability::CapabilityIam)
            .set_parameters(Some(stack_parameters(options)));
        request = match template {
            TemplateSource::Body(body) => request.template_body(body),
            TemplateSource::Url(url) => request.template_url(url),
        };

        request.send().await.map_err(|e| {
            StacksmithError::Deploy(DeployError::StackRejected {
                stack: options.name.clone(),
                message: format!("{}", DisplayErrorContext(&e)),
            })
        })?;

        self.wait_for_change_set(&options.name, &change_set_name)
            .await
    }

    /// Polls a change set until it is ready or failed, with bounded
    /// backoff.
    async fn wait_for_change_set(
        &self,
        stack_name: &str,
        change_set_name: &str,
    ) -> Result<ChangeSetPlan> {
        let mut delay = POLL_BASE_DELAY_SECS;

        for attempt in 0..MAX_POLL_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_secs(delay)).await;
                delay = (delay * 2).min(POLL_MAX_DELAY_SECS);
            }

            let response = self
                .client
                .describe_change_set()
                .stack_name(stack_name)
                .change_set_name(change_set_name)
                .send()
                .await
                .map_err(|e| {
                    StacksmithError::Cloud(CloudError::api(format!(
                        "DescribeChangeSet failed: {}",
                        DisplayErrorContext(&e)
                    )))
                })?;

            let status = response
                .status()
                .map_or_else(String::new, |status| status.as_str().to_string());
            debug!("Change set {change_set_name} status: {status}");

            match status.as_str() {
                "CREATE_COMPLETE" => {
                    let changes = response
                        .changes()
                        .iter()
                        .filter_map(|change| change.resource_change())
                        .map(|change| PlannedChange {
                            action: change
                                .action()
                                .map_or_else(String::new, |a| a.as_str().to_string()),
                            logical_id: change
                                .logical_resource_id()
                                .unwrap_or_default()
                                .to_string(),
                            resource_type: change
                                .resource_type()
                                .unwrap_or_default()
                                .to_string(),
                            replacement: change
                                .replacement()
                                .map(|r| r.as_str().to_string()),
                        })
                        .collect();
                    return Ok(ChangeSetPlan {
                        stack_name: stack_name.to_string(),
                        change_set_name: change_set_name.to_string(),
                        changes,
                        is_empty: false,
                    });
                }
                "FAILED" => {
                    let reason = response.status_reason().unwrap_or_default().to_string();
                    if reason.contains("didn't contain changes")
                        || reason.contains("No updates are to be performed")
                    {
                        info!("{stack_name} - Change set contains no changes.");
                        return Ok(ChangeSetPlan {
                            stack_name: stack_name.to_string(),
                            change_set_name: change_set_name.to_string(),
                            changes: Vec::new(),
                            is_empty: true,
                        });
                    }
                    return Err(StacksmithError::Deploy(DeployError::ChangeSetFailed {
                        name: change_set_name.to_string(),
                        reason,
                    }));
                }
                _ => {
                    // Still pending; keep polling.
                }
            }
        }

        warn!("Change set {change_set_name} did not settle within the attempt budget");
        Err(StacksmithError::Deploy(DeployError::Timeout {
            stack: stack_name.to_string(),
            operation: String::from("change set creation"),
        }))
    }

    /// Executes a ready change set.
    ///
    /// # Errors
    ///
    /// Returns an error if the execution request is rejected.
    pub async fn execute_change_set(&self, plan: &ChangeSetPlan) -> Result<()> {
        info!(
            "Executing change set {} on stack {}",
            plan.change_set_name, plan.stack_name
        );
        self.client
            .execute_change_set()
            .stack_name(&plan.stack_name)
            .change_set_name(&plan.change_set_name)
            .send()
            .await
            .map_err(|e| {
                StacksmithError::Deploy(DeployError::StackRejected {
                    stack: plan.stack_name.clone(),
                    message: format!("{}", DisplayErrorContext(&e)),
                })
            })?;
        Ok(())
    }

    /// Deletes a change set without executing it.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion request fails.
    pub async fn delete_change_set(&self, plan: &ChangeSetPlan) -> Result<()> {
        info!(
            "Deleting change set {} on stack {}",
            plan.change_set_name, plan.stack_name
        );
        self.client
            .delete_change_set()
            .stack_name(&plan.stack_name)
            .change_set_name(&plan.change_set_name)
            .send()
            .await
            .map_err(|e| {
                StacksmithError::Cloud(CloudError::api(format!(
                    "DeleteChangeSet failed: {}",
                    DisplayErrorContext(&e)
                )))
            })?;
        Ok(())
    }
}

/// Picks the template source for a rendered body: inline below the
/// direct-submission limit, uploaded otherwise.
///
/// # Errors
///
/// Returns an error when the body is over the limit and no uploader is
/// available.
pub async fn template_source(
    body: String,
    uploader: Option<&super::uploader::TemplateUploader>,
) -> Result<TemplateSource> {
    if body.len() <= TEMPLATE_BODY_LIMIT {
        return Ok(TemplateSource::Body(body));
    }
    match uploader {
        Some(uploader) => Ok(TemplateSource::Url(uploader.upload(&body).await?)),
        None => Err(StacksmithError::Deploy(DeployError::TemplateTooLarge {
            size: body.len(),
            limit: TEMPLATE_BODY_LIMIT,
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_source_inline_below_limit() {
        let body = String::from("{\"Resources\":{}}");
        let source = tokio_test::block_on(template_source(body.clone(), None)).unwrap();
        assert!(matches!(source, TemplateSource::Body(b) if b == body));
    }

    #[test]
    fn test_template_source_over_limit_without_bucket_errors() {
        let body = "x".repeat(TEMPLATE_BODY_LIMIT + 1);
        let result = tokio_test::block_on(template_source(body, None));
        assert!(matches!(
            result,
            Err(StacksmithError::Deploy(DeployError::TemplateTooLarge { .. }))
        ));
    }

    #[test]
    fn test_updatable_statuses() {
        assert!(UPDATABLE_STATUSES.contains(&"CREATE_COMPLETE"));
        assert!(!UPDATABLE_STATUSES.contains(&"ROLLBACK_COMPLETE"));
    }
}

//! Create, confirm and delete: the whole life of one resource.

use std::fmt;
use std::io::{self, BufRead, Write};
use std::sync::Mutex;

use thiserror::Error;
use tracing::info;

use crate::config::LifecycleConfig;
use crate::resource::error::ResourceClientError;
use crate::resource::key_vault::{self, VaultOptions};
use crate::resource::{GenericResource, ResourceClient, ResourceDescriptor};
use crate::{TokenRetriever, TokenRetrieverError};

#[derive(Error, Debug)]
pub enum ConfirmationError {
    #[error("reading confirmation: `{0}`")]
    Read(String),
}

/// Gate between the creation and the deletion of the resource.
pub trait Confirmation {
    /// Blocks until the deletion may proceed.
    fn confirm(&self) -> Result<(), ConfirmationError>;
}

// Accept closures as Confirmation implementations
impl<F> Confirmation for F
where
    F: Fn() -> Result<(), ConfirmationError>,
{
    fn confirm(&self) -> Result<(), ConfirmationError> {
        self()
    }
}

/// Proceeds right away.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoConfirm;

impl Confirmation for AutoConfirm {
    fn confirm(&self) -> Result<(), ConfirmationError> {
        Ok(())
    }
}

/// Waits for a line on the reader, whatever its content and encoding. There is no timeout. A
/// closed reader counts as confirmation.
#[derive(Debug)]
pub struct LineConfirmation<R> {
    reader: Mutex<R>,
}

impl<R: BufRead> LineConfirmation<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: Mutex::new(reader),
        }
    }
}

impl LineConfirmation<io::StdinLock<'static>> {
    pub fn stdin() -> Self {
        Self::new(io::stdin().lock())
    }
}

impl<R: BufRead> Confirmation for LineConfirmation<R> {
    fn confirm(&self) -> Result<(), ConfirmationError> {
        let mut reader = self
            .reader
            .lock()
            .map_err(|_| ConfirmationError::Read("reader lock poisoned".to_string()))?;
        reader
            .read_until(b'\n', &mut Vec::new())
            .map_err(|e| ConfirmationError::Read(e.to_string()))?;
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("authentication error: {0}")]
    Authentication(#[from] TokenRetrieverError),
    #[error("remote API error: {0}")]
    RemoteApi(#[from] ResourceClientError),
    #[error("confirmation error: {0}")]
    Confirmation(#[from] ConfirmationError),
    #[error("writing output: `{0}`")]
    Output(String),
}

impl From<io::Error> for LifecycleError {
    fn from(err: io::Error) -> Self {
        Self::Output(err.to_string())
    }
}

impl From<serde_json::Error> for LifecycleError {
    fn from(err: serde_json::Error) -> Self {
        Self::Output(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Start,
    Created,
    Deleted,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Created => write!(f, "created"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

/// The resource a lifecycle run works on: where it lives and what is sent to create it.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecyclePlan {
    pub descriptor: ResourceDescriptor,
    pub resource: GenericResource,
}

impl LifecyclePlan {
    /// Plan for the Key Vault described by `vault`, inside the configured resource group.
    pub fn key_vault(config: &LifecycleConfig, vault: &VaultOptions) -> Self {
        Self {
            descriptor: key_vault::descriptor(&config.resource_group, &vault.name),
            resource: key_vault::parameters(config.identity.tenant_id.as_deref(), &vault.location),
        }
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleReport {
    pub state: LifecycleState,
    /// The resource as returned by the creation.
    pub created: GenericResource,
}

/// Runs `Start → Created → (confirmation) → Deleted` for one resource.
///
/// The token is retrieved once and reused for every call. Any failure ends the run where it
/// happened: a failed creation never reaches the confirmation nor the deletion.
pub struct LifecycleOrchestrator<T, R, P>
where
    T: TokenRetriever,
    R: ResourceClient,
    P: Confirmation,
{
    plan: LifecyclePlan,
    token_retriever: T,
    resource_client: R,
    confirmation: P,
}

impl<T, R, P> LifecycleOrchestrator<T, R, P>
where
    T: TokenRetriever,
    R: ResourceClient,
    P: Confirmation,
{
    pub fn new(plan: LifecyclePlan, token_retriever: T, resource_client: R, confirmation: P) -> Self {
        Self {
            plan,
            token_retriever,
            resource_client,
            confirmation,
        }
    }

    /// Runs the lifecycle writing the progress for humans to `out`.
    pub fn run<W: Write>(&self, out: &mut W) -> Result<LifecycleReport, LifecycleError> {
        let descriptor = &self.plan.descriptor;
        let mut state = LifecycleState::Start;
        info!(%state, %descriptor, "starting resource lifecycle");

        let token = self.token_retriever.retrieve()?;

        writeln!(out, "Creating key vault account with MSI Identity...")?;
        let created = self
            .resource_client
            .create_or_update(&token, descriptor, &self.plan.resource)?;
        state = LifecycleState::Created;
        info!(%state, "resource created");

        writeln!(out, "{}\n", serde_json::to_string_pretty(&created.properties)?)?;
        writeln!(out, "Now that we have created a Key Vault, lets delete it.")?;
        writeln!(out, "Press any key to continue")?;
        out.flush()?;
        self.confirmation.confirm()?;

        writeln!(out, "Deleting key vault account with MSI Identity...")?;
        self.resource_client.delete(&token, descriptor)?;
        state = LifecycleState::Deleted;
        info!(%state, "resource deleted");

        writeln!(
            out,
            "Thanks for learning about managing resources via Managed Service Identity."
        )?;

        Ok(LifecycleReport { state, created })
    }
}

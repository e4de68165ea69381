//! Effective command sequence resolution
//!
//! Every step other than the case's login step runs behind the login step's
//! commands. The login step is the one the case names, or else the step with
//! the lowest ordinal.

use crate::store::{CaseRecord, StepRecord, StepStore, StoreError};
use steprunner_shared::{validate, Command, StepId, ValidationError};
use thiserror::Error;

/// A validated run of one step
#[derive(Debug, Clone)]
pub struct Plan {
    pub target: StepRecord,
    /// Login commands followed by the target's own commands
    pub commands: Vec<Command>,
    /// How many leading commands come from the login step
    pub login_prefix: usize,
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("step {0} not found")]
    StepNotFound(StepId),

    #[error("login step {0} no longer exists")]
    LoginStepMissing(StepId),

    #[error("step {step_id}: {source}")]
    Validation {
        step_id: StepId,
        #[source]
        source: ValidationError,
    },

    #[error("store error: {0}")]
    Store(StoreError),
}

impl PlanError {
    /// Store failures are infrastructure; everything else is bad data
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

impl From<StoreError> for PlanError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::StepNotFound(id) => Self::StepNotFound(id),
            other => Self::Store(other),
        }
    }
}

/// Pick the case's login step among its current steps
pub fn resolve_login_step(case: &CaseRecord, steps: &[StepRecord]) -> Result<Option<StepId>, PlanError> {
    match case.login_step_id {
        Some(id) if steps.iter().any(|s| s.id == id) => Ok(Some(id)),
        Some(id) => Err(PlanError::LoginStepMissing(id)),
        None => Ok(steps.iter().min_by_key(|s| (s.ordinal, s.id)).map(|s| s.id)),
    }
}

fn commands_of(step: &StepRecord) -> Result<Vec<Command>, PlanError> {
    step.commands_raw
        .as_deref()
        .map_or(Err(ValidationError::Empty), validate)
        .map_err(|source| PlanError::Validation {
            step_id: step.id,
            source,
        })
}

/// Validate `target` and prefix it with `login` unless it is the login step
pub fn build_plan(target: StepRecord, login: Option<&StepRecord>) -> Result<Plan, PlanError> {
    let own = commands_of(&target)?;

    let prefix = match login {
        Some(login) if login.id != target.id => commands_of(login)?,
        _ => Vec::new(),
    };

    let login_prefix = prefix.len();
    let mut commands = prefix;
    commands.extend(own);

    Ok(Plan {
        target,
        commands,
        login_prefix,
    })
}

/// Load a step and its case, then build its plan
pub async fn plan_step(store: &dyn StepStore, step_id: StepId) -> Result<Plan, PlanError> {
    let target = store.step(step_id).await?;
    let case = store.case(target.test_case_id).await?;
    let steps = store.steps_for_case(case.id).await?;

    let login_id = resolve_login_step(&case, &steps)?;
    let login = login_id.and_then(|id| steps.iter().find(|s| s.id == id));
    build_plan(target, login)
}
